//! Daily report scheduling.
//!
//! Reports are evaluated against one configured IANA timezone so the
//! schedule does not depend on where the process runs. The cursor lives in
//! memory only: a restart during the report hour can send a second report.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

/// True when `now` falls in `hour` (in `tz`) on a day without a report yet.
pub fn is_report_due(
    now: DateTime<Utc>,
    hour: u32,
    tz: Tz,
    last_sent: Option<NaiveDate>,
) -> bool {
    let local = now.with_timezone(&tz);
    local.hour() == hour && last_sent != Some(local.date_naive())
}

/// A report slot taken by the caller. Hand it back through
/// `ReportScheduler::release` if delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportClaim {
    pub date: NaiveDate,
    previous: Option<NaiveDate>,
}

/// Tracks the last report date for a single monitor process.
#[derive(Debug, Clone)]
pub struct ReportScheduler {
    hour: u32,
    tz: Tz,
    last_sent: Option<NaiveDate>,
}

impl ReportScheduler {
    pub fn new(hour: u32, tz: Tz) -> Self {
        Self {
            hour,
            tz,
            last_sent: None,
        }
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    #[cfg(test)]
    pub fn last_sent(&self) -> Option<NaiveDate> {
        self.last_sent
    }

    /// Advances the cursor to today's date if a report is due.
    ///
    /// The cursor moves before the send so a slow delivery cannot cause a
    /// duplicate when the next poll lands in the same hour.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Option<ReportClaim> {
        if !is_report_due(now, self.hour, self.tz, self.last_sent) {
            return None;
        }
        let date = now.with_timezone(&self.tz).date_naive();
        let claim = ReportClaim {
            date,
            previous: self.last_sent,
        };
        self.last_sent = Some(date);
        Some(claim)
    }

    /// Restores the cursor after a failed delivery so the report is retried
    /// on the next poll within the hour.
    pub fn release(&mut self, claim: ReportClaim) {
        if self.last_sent == Some(claim.date) {
            self.last_sent = claim.previous;
        }
    }
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;
