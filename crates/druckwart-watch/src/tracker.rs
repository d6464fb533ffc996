// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The job tracking loop.
//
// Each poll cycle runs two phases in fixed order:
//
//   1. scan-and-admit: list every configured device's queue; for each job
//      not yet tracked, ask the reservation service for an allow/deny
//      decision.  Admitted jobs are released to print and tracked; denied
//      jobs are removed from the queue.
//   2. status-check: re-read the status of every job that was already
//      tracked when the cycle began.  Finished jobs confirm their
//      reservation, errored and timed-out jobs cancel it (refund), and the
//      tracking entry is destroyed either way.
//
// Jobs admitted in phase 1 are deliberately not status-checked until the
// next cycle, so a job is never admitted and reaped on the same stale read.
//
// Device queues are kept paused except while at least one tracked job is in
// flight for them; an un-reserved job sitting in the same hardware queue
// therefore cannot print between polls.
//
// Errors are contained at the device or job they occur at: a failed device
// scan skips that device for the cycle, a failed reservation call leaves the
// job untracked for retry, and a failed device command after a committed
// financial decision is logged for manual reconciliation rather than rolled
// back.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use druckwart_core::error::DruckwartError;
use druckwart_core::types::JobClass;
use druckwart_spool::{QueuedJob, SpoolerAdapter, StatusClass};

use crate::client::ReservationApi;

/// Wall-clock ceiling for an admitted job; non-terminal past this is
/// cancelled and refunded.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Working state for one admitted job.  In-memory only; a restart loses
/// tracking and leaves the pending transaction to the server's startup
/// sweep.
#[derive(Debug, Clone)]
struct TrackedJob {
    /// Pending transaction to settle, `None` for free accounts.
    transaction_id: Option<i64>,
    user_id: String,
    /// Monotonic admission point for the timeout.
    admitted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Confirm,
    Cancel,
}

/// The poll-cycle state machine.
///
/// Owns the tracked-job map outright; the loop is the only writer, so no
/// locking is needed anywhere in here.
pub struct JobTracker<S, R> {
    spooler: S,
    api: R,
    /// Configured devices with the job class each is priced as, in stable
    /// enumeration order.
    devices: Vec<(String, JobClass)>,
    job_timeout: Duration,
    /// Keyed by (device id, device-local job id).
    tracked: HashMap<(String, i32), TrackedJob>,
}

impl<S: SpoolerAdapter, R: ReservationApi> JobTracker<S, R> {
    pub fn new(spooler: S, api: R, devices: Vec<(String, JobClass)>) -> Self {
        Self {
            spooler,
            api,
            devices,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            tracked: HashMap::new(),
        }
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Number of jobs currently tracked (reported at shutdown).
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Pause every configured device queue.
    ///
    /// Run once at startup: queues must start paused so jobs submitted while
    /// no watcher was running cannot print unevaluated.
    pub async fn pause_all_devices(&self) {
        for (device_id, _) in &self.devices {
            if let Err(e) = self.spooler.pause_device(device_id).await {
                warn!(device = %device_id, error = %e, "startup pause failed");
            }
        }
    }

    /// One complete poll cycle.  Never returns an error and never panics the
    /// process over a single device or job; failures are logged and the
    /// affected item is skipped until the next cycle.
    #[instrument(skip(self), fields(tracked = self.tracked.len()))]
    pub async fn run_cycle(&mut self) {
        // Snapshot before admitting so phase 2 only sees jobs that are at
        // least one cycle old.
        let to_check: Vec<(String, i32)> = self.tracked.keys().cloned().collect();

        self.scan_and_admit().await;
        self.check_tracked(to_check).await;
    }

    // -- Phase 1: scan-and-admit --------------------------------------------

    async fn scan_and_admit(&mut self) {
        let devices = self.devices.clone();
        for (device_id, job_class) in devices {
            let jobs = match self.spooler.list_queued_jobs(&device_id).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(device = %device_id, error = %e, "device scan failed; skipping this cycle");
                    continue;
                }
            };

            for job in jobs {
                let key = (job.device_id.clone(), job.job_id);
                if self.tracked.contains_key(&key) {
                    continue;
                }
                self.admit(job, job_class).await;
            }
        }
    }

    /// Decide a newly discovered job: reserve, then release or remove.
    async fn admit(&mut self, job: QueuedJob, job_class: JobClass) {
        let response = match self.api.reserve(&job.owner, job.pages, job_class).await {
            Ok(response) => response,
            Err(e) => {
                // Left untracked on purpose: still "discovered" next cycle.
                warn!(
                    device = %job.device_id,
                    job_id = job.job_id,
                    owner = %job.owner,
                    error = %e,
                    "reservation call failed; job left for retry"
                );
                return;
            }
        };

        if !response.allowed {
            info!(
                device = %job.device_id,
                job_id = job.job_id,
                owner = %job.owner,
                pages = job.pages,
                reason = response.reason.as_deref().unwrap_or("denied"),
                "job denied; removing from queue"
            );
            if let Err(e) = self.spooler.remove_job(&job.device_id, job.job_id).await {
                warn!(
                    device = %job.device_id,
                    job_id = job.job_id,
                    error = %e,
                    "removing denied job failed; manual reconciliation needed"
                );
            }
            return;
        }

        let is_free = response.is_free.unwrap_or(false);
        info!(
            device = %job.device_id,
            job_id = job.job_id,
            owner = %job.owner,
            pages = job.pages,
            is_free,
            transaction_id = response.transaction_id,
            "job admitted"
        );

        // The reservation is committed; a failing device command below is
        // logged but never rolls it back.
        if let Err(e) = self.spooler.resume_job(&job.device_id, job.job_id).await {
            warn!(device = %job.device_id, job_id = job.job_id, error = %e, "resume job failed");
        }
        if let Err(e) = self.spooler.resume_device(&job.device_id).await {
            warn!(device = %job.device_id, error = %e, "resume device failed");
        }

        self.tracked.insert(
            (job.device_id, job.job_id),
            TrackedJob {
                transaction_id: response.transaction_id,
                user_id: job.owner,
                admitted_at: Instant::now(),
            },
        );
    }

    // -- Phase 2: status-check ----------------------------------------------

    async fn check_tracked(&mut self, to_check: Vec<(String, i32)>) {
        for key in to_check {
            // The entry can only have been removed by this loop itself, but
            // skip defensively rather than index.
            if !self.tracked.contains_key(&key) {
                continue;
            }

            let (device_id, job_id) = &key;
            let status = match self.spooler.job_status(device_id, *job_id).await {
                Ok(status) => status,
                Err(e) => {
                    // The cancel needs only the reservation API, so an
                    // unreachable device must not block the timeout refund.
                    let timed_out = self
                        .tracked
                        .get(&key)
                        .is_some_and(|job| job.admitted_at.elapsed() >= self.job_timeout);
                    if timed_out {
                        warn!(
                            device = %device_id,
                            job_id,
                            error = %e,
                            "status unavailable past timeout; cancelling"
                        );
                        self.finish(&key, Settle::Cancel, true).await;
                    } else {
                        warn!(device = %device_id, job_id, error = %e, "status check failed; retrying next cycle");
                    }
                    continue;
                }
            };

            match status {
                None => {
                    // Dequeued by the spooler: the job printed.
                    debug!(device = %device_id, job_id, "job no longer in queue; treating as printed");
                    self.finish(&key, Settle::Confirm, false).await;
                }
                Some(raw) => match StatusClass::classify(&raw) {
                    StatusClass::Finished => {
                        debug!(device = %device_id, job_id, raw_status = %raw, "job finished");
                        self.finish(&key, Settle::Confirm, true).await;
                    }
                    StatusClass::Error => {
                        info!(device = %device_id, job_id, raw_status = %raw, "job errored; refunding");
                        self.finish(&key, Settle::Cancel, true).await;
                    }
                    StatusClass::InFlight => {
                        let elapsed = match self.tracked.get(&key) {
                            Some(job) => job.admitted_at.elapsed(),
                            None => continue,
                        };
                        if elapsed >= self.job_timeout {
                            warn!(
                                device = %device_id,
                                job_id,
                                elapsed_secs = elapsed.as_secs(),
                                raw_status = %raw,
                                "job exceeded timeout; cancelling"
                            );
                            self.finish(&key, Settle::Cancel, true).await;
                        }
                    }
                },
            }
        }
    }

    /// Settle a tracked job's reservation, optionally remove the residual
    /// queue entry, destroy the tracking entry, and re-pause the device if it
    /// has no tracked work left.
    ///
    /// On a transient settlement failure the entry is kept so the settle is
    /// retried next cycle; exactly one of confirm/cancel eventually lands.
    async fn finish(&mut self, key: &(String, i32), settle: Settle, remove_entry: bool) {
        let Some(job) = self.tracked.get(key) else {
            return;
        };

        if let Some(transaction_id) = job.transaction_id {
            let result = match settle {
                Settle::Confirm => self.api.confirm(transaction_id).await,
                Settle::Cancel => self.api.cancel(transaction_id).await,
            };
            match result {
                Ok(()) => {
                    info!(
                        transaction_id,
                        user_id = %job.user_id,
                        op = ?settle,
                        "reservation settled"
                    );
                }
                Err(
                    e @ (DruckwartError::TransactionNotFound(_)
                    | DruckwartError::TransactionNotPending { .. }),
                ) => {
                    // State conflict: retrying cannot succeed.  Drop the
                    // tracking entry and flag for manual reconciliation.
                    error!(
                        transaction_id,
                        user_id = %job.user_id,
                        op = ?settle,
                        error = %e,
                        "settlement state conflict; manual reconciliation needed"
                    );
                }
                Err(e) => {
                    warn!(
                        transaction_id,
                        op = ?settle,
                        error = %e,
                        "settlement failed; retrying next cycle"
                    );
                    return;
                }
            }
        }

        let (device_id, job_id) = key;
        if remove_entry {
            if let Err(e) = self.spooler.remove_job(device_id, *job_id).await {
                warn!(
                    device = %device_id,
                    job_id,
                    error = %e,
                    "removing finished job failed; manual reconciliation needed"
                );
            }
        }

        self.tracked.remove(key);

        let device_still_active = self
            .tracked
            .keys()
            .any(|(tracked_device, _)| tracked_device == device_id);
        if !device_still_active {
            debug!(device = %device_id, "no tracked jobs remain; pausing device");
            if let Err(e) = self.spooler.pause_device(device_id).await {
                warn!(device = %device_id, error = %e, "pausing idle device failed");
            }
        }
    }
}
