// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Classification of raw spooler status strings.

/// What a raw spooler status means for a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The job printed (or was dispatched to hardware and will not return).
    Finished,
    /// The job will not progress: device error, offline, out of paper,
    /// cancelled, or mid-deletion.
    Error,
    /// Still queued or printing; check again next cycle.
    InFlight,
}

impl StatusClass {
    /// Classify a raw status string by substring match, case-insensitively.
    ///
    /// Spoolers are inconsistent about status vocabulary: CUPS reports IPP
    /// job-state keywords ("processing", "completed", "aborted"), Windows
    /// queues report display strings ("Printing", "Printed", "Paper Out").
    /// Substring matching over the lowercased form covers both families.
    /// Order matters: error patterns are checked first so "deleting" and
    /// "canceled" never read as finished.
    pub fn classify(raw_status: &str) -> Self {
        let lower = raw_status.to_ascii_lowercase();

        if lower.contains("error")
            || lower.contains("offline")
            || lower.contains("paper out")
            || lower.contains("paperout")
            || lower.contains("media-empty")
            || lower.contains("deleting")
            || lower.contains("aborted")
            || lower.contains("canceled")
            || lower.contains("cancelled")
        {
            return Self::Error;
        }

        // "pending-held" must not match here, so "sent" is matched as a
        // whole word rather than a substring.
        if lower.contains("printed")
            || lower.contains("completed")
            || lower == "sent"
            || lower.contains("sent to printer")
        {
            return Self::Finished;
        }

        Self::InFlight
    }

    /// A terminal status is one the job cannot leave.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InFlight)
    }
}
