// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP implementation of the spooler adapter.
//
// Device identifiers are printer URIs (ipp:// or ipps://).  Uses the `ipp`
// crate's async API to send standard IPP operations:
//   - Get-Jobs            (RFC 8011 §4.2.6)
//   - Get-Job-Attributes  (RFC 8011 §4.3.4)
//   - Release-Job         (RFC 8011 §4.3.6)
//   - Cancel-Job          (RFC 8011 §4.3.3)
//   - Pause-Printer       (RFC 8011 §4.2.7)
//   - Resume-Printer      (RFC 8011 §4.2.8)

use ipp::prelude::*;
use tracing::{debug, error, info, instrument};

use druckwart_core::error::{DruckwartError, Result};

use crate::adapter::{QueuedJob, SpoolerAdapter};
use crate::status::StatusClass;

/// Operation attribute name on job-targeted requests.
const JOB_ID_ATTR: &str = "job-id";

/// `requesting-user-name` sent with every request.
const REQUESTING_USER: &str = "druckwart";

/// Async IPP spooler adapter.
///
/// Stateless: each call parses the device URI and opens a fresh connection,
/// so one instance serves any number of devices.  All methods require a
/// Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct IppSpooler;

impl IppSpooler {
    pub fn new() -> Self {
        Self
    }

    fn parse_uri(&self, device_id: &str) -> Result<Uri> {
        device_id
            .parse()
            .map_err(|e| DruckwartError::Spooler(format!("invalid device URI '{device_id}': {e}")))
    }

    /// Build a bare request for `operation` targeting `uri`, with the
    /// standard requesting-user-name operation attribute.
    fn base_request(&self, operation: Operation, uri: &Uri) -> IppRequestResponse {
        let mut request =
            IppRequestResponse::new(IppVersion::v1_1(), operation, Some(uri.clone()));
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "requesting-user-name",
                IppValue::NameWithoutLanguage(REQUESTING_USER.to_string()),
            ),
        );
        request
    }

    /// Send a job-targeted command and treat "already in the target state"
    /// responses as success.
    async fn send_job_command(
        &self,
        operation: Operation,
        op_name: &str,
        device_id: &str,
        job_id: i32,
    ) -> Result<()> {
        let uri = self.parse_uri(device_id)?;
        let mut request = self.base_request(operation, &uri);
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(JOB_ID_ATTR, IppValue::Integer(job_id)),
        );

        let client = AsyncIppClient::new(uri);
        let response = client
            .send(request)
            .await
            .map_err(|e| DruckwartError::Spooler(format!("{op_name}({job_id}): {e}")))?;

        let code = response.header().status_code();
        if !code.is_success() && !already_in_target_state(code) {
            error!(status = ?code, job_id, "{op_name} failed");
            return Err(DruckwartError::Spooler(format!(
                "{op_name}({job_id}) returned status {code:?}"
            )));
        }
        Ok(())
    }

    async fn send_device_command(
        &self,
        operation: Operation,
        op_name: &str,
        device_id: &str,
    ) -> Result<()> {
        let uri = self.parse_uri(device_id)?;
        let request = self.base_request(operation, &uri);

        let client = AsyncIppClient::new(uri);
        let response = client
            .send(request)
            .await
            .map_err(|e| DruckwartError::Spooler(format!("{op_name}: {e}")))?;

        let code = response.header().status_code();
        if !code.is_success() && !already_in_target_state(code) {
            error!(status = ?code, device = %device_id, "{op_name} failed");
            return Err(DruckwartError::Spooler(format!(
                "{op_name} returned status {code:?}"
            )));
        }
        Ok(())
    }
}

impl SpoolerAdapter for IppSpooler {
    #[instrument(skip(self), fields(device = %device_id))]
    async fn list_queued_jobs(&self, device_id: &str) -> Result<Vec<QueuedJob>> {
        let uri = self.parse_uri(device_id)?;
        let mut request = self.base_request(Operation::GetJobs, &uri);
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "requested-attributes",
                IppValue::Array(vec![
                    IppValue::Keyword("job-id".to_string()),
                    IppValue::Keyword("job-state".to_string()),
                    IppValue::Keyword("job-originating-user-name".to_string()),
                    IppValue::Keyword("job-impressions".to_string()),
                    IppValue::Keyword("job-media-sheets".to_string()),
                ]),
            ),
        );

        let client = AsyncIppClient::new(uri);
        debug!("sending Get-Jobs");
        let response = client
            .send(request)
            .await
            .map_err(|e| DruckwartError::Spooler(format!("Get-Jobs: {e}")))?;

        if !response.header().status_code().is_success() {
            let code = response.header().status_code();
            error!(status = ?code, "Get-Jobs failed");
            return Err(DruckwartError::Spooler(format!(
                "Get-Jobs returned status {code:?}"
            )));
        }

        let jobs = parse_jobs(device_id, response.attributes());
        debug!(count = jobs.len(), "received job list");
        Ok(jobs)
    }

    #[instrument(skip(self), fields(device = %device_id, job_id))]
    async fn job_status(&self, device_id: &str, job_id: i32) -> Result<Option<String>> {
        let uri = self.parse_uri(device_id)?;
        let mut request = self.base_request(Operation::GetJobAttributes, &uri);
        request.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(JOB_ID_ATTR, IppValue::Integer(job_id)),
        );

        let client = AsyncIppClient::new(uri);
        let response = client
            .send(request)
            .await
            .map_err(|e| DruckwartError::Spooler(format!("Get-Job-Attributes({job_id}): {e}")))?;

        let code = response.header().status_code();
        if code == StatusCode::ClientErrorNotFound {
            // Dequeued: the usual fate of a job that printed.
            return Ok(None);
        }
        if !code.is_success() {
            error!(status = ?code, job_id, "Get-Job-Attributes failed");
            return Err(DruckwartError::Spooler(format!(
                "Get-Job-Attributes({job_id}) returned status {code:?}"
            )));
        }

        for group in response.attributes().groups_of(DelimiterTag::JobAttributes) {
            if let Some(attr) = group.attributes().get("job-state") {
                return Ok(Some(job_state_string(attr.value())));
            }
        }
        Ok(Some("unknown".to_string()))
    }

    #[instrument(skip(self), fields(device = %device_id, job_id))]
    async fn resume_job(&self, device_id: &str, job_id: i32) -> Result<()> {
        info!(job_id, "sending Release-Job");
        self.send_job_command(Operation::ReleaseJob, "Release-Job", device_id, job_id)
            .await
    }

    #[instrument(skip(self), fields(device = %device_id, job_id))]
    async fn remove_job(&self, device_id: &str, job_id: i32) -> Result<()> {
        info!(job_id, "sending Cancel-Job");
        self.send_job_command(Operation::CancelJob, "Cancel-Job", device_id, job_id)
            .await
    }

    #[instrument(skip(self), fields(device = %device_id))]
    async fn pause_device(&self, device_id: &str) -> Result<()> {
        info!("sending Pause-Printer");
        self.send_device_command(Operation::PausePrinter, "Pause-Printer", device_id)
            .await
    }

    #[instrument(skip(self), fields(device = %device_id))]
    async fn resume_device(&self, device_id: &str) -> Result<()> {
        info!("sending Resume-Printer");
        self.send_device_command(Operation::ResumePrinter, "Resume-Printer", device_id)
            .await
    }
}

// ---------------------------------------------------------------------------
// Helper functions for parsing IPP responses
// ---------------------------------------------------------------------------

/// Responses meaning "the job or device is already where you wanted it".
///
/// Cancel-Job on a dequeued job reports not-found; Release-Job on a job that
/// was never held reports not-possible.  Both commands are fire-and-confirm.
fn already_in_target_state(code: StatusCode) -> bool {
    matches!(
        code,
        StatusCode::ClientErrorNotFound | StatusCode::ClientErrorNotPossible
    )
}

/// Render a `job-state` value as its RFC 8011 keyword.
///
/// Printers send job-state as an enum; a few send the keyword directly.
fn job_state_string(value: &IppValue) -> String {
    match value {
        IppValue::Enum(state) => match state {
            3 => "pending".to_string(),
            4 => "pending-held".to_string(),
            5 => "processing".to_string(),
            6 => "processing-stopped".to_string(),
            7 => "canceled".to_string(),
            8 => "aborted".to_string(),
            9 => "completed".to_string(),
            other => format!("job-state-{other}"),
        },
        other => format!("{other}"),
    }
}

/// Parse a Get-Jobs response into queued jobs, dropping entries already in a
/// terminal state.  Each job arrives as its own Job Attributes group.
fn parse_jobs(device_id: &str, attrs: &IppAttributes) -> Vec<QueuedJob> {
    let mut jobs = Vec::new();

    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        let attributes = group.attributes();

        let Some(job_id) = attributes.get(JOB_ID_ATTR).and_then(|a| {
            if let IppValue::Integer(id) = a.value() {
                Some(*id)
            } else {
                None
            }
        }) else {
            continue;
        };

        let raw_status = attributes
            .get("job-state")
            .map(|a| job_state_string(a.value()))
            .unwrap_or_else(|| "unknown".to_string());

        if StatusClass::classify(&raw_status).is_terminal() {
            continue;
        }

        let owner = attributes
            .get("job-originating-user-name")
            .map(|a| format!("{}", a.value()))
            .unwrap_or_default();

        // job-impressions is the page count; job-media-sheets is the
        // fallback for printers that only report sheets.  Spoolers report 0
        // before counting a job's pages; a queued job is at least one page.
        let pages = ["job-impressions", "job-media-sheets"]
            .iter()
            .find_map(|name| {
                attributes.get(*name).and_then(|a| {
                    if let IppValue::Integer(n) = a.value() {
                        Some(i64::from(*n))
                    } else {
                        None
                    }
                })
            })
            .unwrap_or(1)
            .max(1);

        jobs.push(QueuedJob {
            device_id: device_id.to_string(),
            job_id,
            owner,
            pages,
            raw_status,
        });
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uri_rejects_garbage() {
        let spooler = IppSpooler::new();
        assert!(spooler.parse_uri("not a valid uri %%%").is_err());
        assert!(
            spooler
                .parse_uri("ipp://192.168.1.50:631/printers/pool-sw")
                .is_ok()
        );
    }

    #[test]
    fn job_state_enum_renders_keyword() {
        assert_eq!(job_state_string(&IppValue::Enum(5)), "processing");
        assert_eq!(job_state_string(&IppValue::Enum(9)), "completed");
        assert_eq!(job_state_string(&IppValue::Enum(42)), "job-state-42");
    }

    #[test]
    fn parse_jobs_clamps_zero_page_count() {
        // Spoolers report job-impressions 0 while a job is still being
        // counted; it must never surface as a zero-page job.
        let mut attrs = IppAttributes::default();
        attrs.add(
            DelimiterTag::JobAttributes,
            IppAttribute::new(JOB_ID_ATTR, IppValue::Integer(4)),
        );
        attrs.add(
            DelimiterTag::JobAttributes,
            IppAttribute::new("job-state", IppValue::Enum(4)),
        );
        attrs.add(
            DelimiterTag::JobAttributes,
            IppAttribute::new("job-impressions", IppValue::Integer(0)),
        );

        let jobs = parse_jobs("ipp://sw", &attrs);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].pages, 1);
    }

    #[test]
    fn target_state_codes() {
        assert!(already_in_target_state(StatusCode::ClientErrorNotFound));
        assert!(already_in_target_state(StatusCode::ClientErrorNotPossible));
        assert!(!already_in_target_state(StatusCode::ServerErrorBusy));
    }
}
