// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The spooler adapter contract consumed by the job watcher.

use druckwart_core::error::Result;

/// A job sitting in a device queue, as reported by the spooler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Device (printer queue) the job belongs to.
    pub device_id: String,
    /// Device-local job identifier. Only unique per device.
    pub job_id: i32,
    /// Account name of whoever submitted the job.
    pub owner: String,
    /// Sheet count reported by the spooler.
    pub pages: i64,
    /// Raw spooler status string, classified via [`crate::StatusClass`].
    pub raw_status: String,
}

/// Operations the job watcher needs from a print spooler.
///
/// Commands are fire-and-confirm: calling them on a job or device already in
/// the target state is not an error.  An empty queue is a normal result, not
/// an error; implementations fail only on genuine device-unreachable
/// conditions.
pub trait SpoolerAdapter {
    /// List non-terminal jobs queued on a device.
    async fn list_queued_jobs(&self, device_id: &str) -> Result<Vec<QueuedJob>>;

    /// Current raw status of a job, or `None` if the spooler no longer knows
    /// it (normally because it finished printing and was dequeued).
    async fn job_status(&self, device_id: &str, job_id: i32) -> Result<Option<String>>;

    /// Release a held job so it can print once its device is unpaused.
    async fn resume_job(&self, device_id: &str, job_id: i32) -> Result<()>;

    /// Remove a job from the queue.
    async fn remove_job(&self, device_id: &str, job_id: i32) -> Result<()>;

    /// Pause a device queue so queued jobs cannot advance.
    async fn pause_device(&self, device_id: &str) -> Result<()>;

    /// Unpause a device queue.
    async fn resume_device(&self, device_id: &str) -> Result<()>;
}
