// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory spooler fake for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use druckwart_core::error::{DruckwartError, Result};

use crate::adapter::{QueuedJob, SpoolerAdapter};
use crate::status::StatusClass;

#[derive(Debug, Clone)]
struct FakeJob {
    owner: String,
    pages: i64,
    raw_status: String,
    released: bool,
}

#[derive(Debug, Default)]
struct FakeDevice {
    jobs: BTreeMap<i32, FakeJob>,
    paused: bool,
    unreachable: bool,
}

#[derive(Debug, Default)]
struct Inner {
    devices: BTreeMap<String, FakeDevice>,
    // Every adapter call, recorded as "op device" or "op device#job".
    calls: Vec<String>,
}

/// Scriptable spooler for exercising the watcher without hardware.
///
/// Tests enqueue jobs, flip statuses, and mark devices unreachable between
/// poll cycles, then assert on the recorded command log.  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySpooler {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySpooler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning cannot happen: no panics while holding the lock.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueue a job. The device is created (paused) on first use.
    pub fn add_job(&self, device_id: &str, job_id: i32, owner: &str, pages: i64, status: &str) {
        let mut inner = self.lock();
        let device = inner.devices.entry(device_id.to_string()).or_default();
        device.jobs.insert(
            job_id,
            FakeJob {
                owner: owner.to_string(),
                pages,
                raw_status: status.to_string(),
                released: false,
            },
        );
    }

    /// Overwrite a job's raw status.
    pub fn set_status(&self, device_id: &str, job_id: i32, status: &str) {
        let mut inner = self.lock();
        if let Some(job) = inner
            .devices
            .get_mut(device_id)
            .and_then(|d| d.jobs.get_mut(&job_id))
        {
            job.raw_status = status.to_string();
        }
    }

    /// Dequeue a job as a real spooler would after printing it.
    pub fn finish_job(&self, device_id: &str, job_id: i32) {
        let mut inner = self.lock();
        if let Some(device) = inner.devices.get_mut(device_id) {
            device.jobs.remove(&job_id);
        }
    }

    /// Make every adapter call against this device fail.
    pub fn set_unreachable(&self, device_id: &str, unreachable: bool) {
        let mut inner = self.lock();
        inner
            .devices
            .entry(device_id.to_string())
            .or_default()
            .unreachable = unreachable;
    }

    pub fn is_paused(&self, device_id: &str) -> bool {
        self.lock()
            .devices
            .get(device_id)
            .map(|d| d.paused)
            .unwrap_or(false)
    }

    pub fn job_exists(&self, device_id: &str, job_id: i32) -> bool {
        self.lock()
            .devices
            .get(device_id)
            .is_some_and(|d| d.jobs.contains_key(&job_id))
    }

    pub fn was_released(&self, device_id: &str, job_id: i32) -> bool {
        self.lock()
            .devices
            .get(device_id)
            .and_then(|d| d.jobs.get(&job_id))
            .is_some_and(|j| j.released)
    }

    /// The command log: `"op device"` or `"op device#job"` entries in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn check_reachable(inner: &Inner, device_id: &str) -> Result<()> {
        if inner
            .devices
            .get(device_id)
            .is_some_and(|d| d.unreachable)
        {
            return Err(DruckwartError::Spooler(format!(
                "device unreachable: {device_id}"
            )));
        }
        Ok(())
    }
}

impl SpoolerAdapter for MemorySpooler {
    async fn list_queued_jobs(&self, device_id: &str) -> Result<Vec<QueuedJob>> {
        let mut inner = self.lock();
        inner.calls.push(format!("list {device_id}"));
        Self::check_reachable(&inner, device_id)?;

        let Some(device) = inner.devices.get(device_id) else {
            return Ok(Vec::new());
        };
        Ok(device
            .jobs
            .iter()
            .filter(|(_, job)| !StatusClass::classify(&job.raw_status).is_terminal())
            .map(|(id, job)| QueuedJob {
                device_id: device_id.to_string(),
                job_id: *id,
                owner: job.owner.clone(),
                pages: job.pages,
                raw_status: job.raw_status.clone(),
            })
            .collect())
    }

    async fn job_status(&self, device_id: &str, job_id: i32) -> Result<Option<String>> {
        let mut inner = self.lock();
        inner.calls.push(format!("status {device_id}#{job_id}"));
        Self::check_reachable(&inner, device_id)?;

        Ok(inner
            .devices
            .get(device_id)
            .and_then(|d| d.jobs.get(&job_id))
            .map(|j| j.raw_status.clone()))
    }

    async fn resume_job(&self, device_id: &str, job_id: i32) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("resume_job {device_id}#{job_id}"));
        Self::check_reachable(&inner, device_id)?;

        if let Some(job) = inner
            .devices
            .get_mut(device_id)
            .and_then(|d| d.jobs.get_mut(&job_id))
        {
            job.released = true;
        }
        Ok(())
    }

    async fn remove_job(&self, device_id: &str, job_id: i32) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("remove_job {device_id}#{job_id}"));
        Self::check_reachable(&inner, device_id)?;

        if let Some(device) = inner.devices.get_mut(device_id) {
            device.jobs.remove(&job_id);
        }
        Ok(())
    }

    async fn pause_device(&self, device_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("pause {device_id}"));
        Self::check_reachable(&inner, device_id)?;

        inner
            .devices
            .entry(device_id.to_string())
            .or_default()
            .paused = true;
        Ok(())
    }

    async fn resume_device(&self, device_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(format!("unpause {device_id}"));
        Self::check_reachable(&inner, device_id)?;

        inner
            .devices
            .entry(device_id.to_string())
            .or_default()
            .paused = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_non_terminal_jobs() {
        let spooler = MemorySpooler::new();
        spooler.add_job("dev", 1, "alice", 3, "pending");
        spooler.add_job("dev", 2, "bob", 1, "Printed");

        let jobs = spooler.list_queued_jobs("dev").await.expect("list");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, 1);
        assert_eq!(jobs[0].owner, "alice");
    }

    #[tokio::test]
    async fn status_none_after_finish() {
        let spooler = MemorySpooler::new();
        spooler.add_job("dev", 1, "alice", 3, "processing");

        assert_eq!(
            spooler.job_status("dev", 1).await.expect("status"),
            Some("processing".to_string())
        );
        spooler.finish_job("dev", 1);
        assert_eq!(spooler.job_status("dev", 1).await.expect("status"), None);
    }

    #[tokio::test]
    async fn unreachable_device_errors() {
        let spooler = MemorySpooler::new();
        spooler.set_unreachable("dev", true);

        assert!(spooler.list_queued_jobs("dev").await.is_err());
        assert!(spooler.pause_device("dev").await.is_err());

        spooler.set_unreachable("dev", false);
        assert!(spooler.list_queued_jobs("dev").await.is_ok());
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let spooler = MemorySpooler::new();
        spooler.pause_device("dev").await.expect("pause");
        spooler.resume_device("dev").await.expect("unpause");

        assert_eq!(spooler.calls(), vec!["pause dev", "unpause dev"]);
        assert!(!spooler.is_paused("dev"));
    }
}
