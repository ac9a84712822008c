use chrono::{DateTime, Duration, NaiveTime, Utc};
use summary_core::{FilingReport, StatementRecord};

const STATEMENT_TTL_DAYS: i64 = 1;
const FILING_TTL_DAYS: i64 = 7;

/// How current a stored collection is relative to its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

/// Decides whether stored data can be served as-is or needs a refetch.
///
/// Statement sets age from the newest record's date (midnight UTC, since
/// statement dates carry no time of day); filings age from `retrieved_at`.
/// Only `Fresh` short-circuits a fetch. `Stale` and `Missing` both refetch.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    statement_ttl: Duration,
    filing_ttl: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            statement_ttl: Duration::days(STATEMENT_TTL_DAYS),
            filing_ttl: Duration::days(FILING_TTL_DAYS),
        }
    }
}

impl FreshnessPolicy {
    pub fn new(statement_ttl: Duration, filing_ttl: Duration) -> Self {
        Self {
            statement_ttl,
            filing_ttl,
        }
    }

    pub fn statements(&self, records: &[StatementRecord]) -> Freshness {
        self.statements_at(records, Utc::now())
    }

    pub fn filing(&self, report: Option<&FilingReport>) -> Freshness {
        self.filing_at(report, Utc::now())
    }

    fn statements_at(&self, records: &[StatementRecord], now: DateTime<Utc>) -> Freshness {
        let Some(newest) = records.iter().map(|r| r.date()).max() else {
            return Freshness::Missing;
        };
        let stamp = newest.and_time(NaiveTime::MIN).and_utc();
        if now - stamp < self.statement_ttl {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    fn filing_at(&self, report: Option<&FilingReport>, now: DateTime<Utc>) -> Freshness {
        let Some(report) = report else {
            return Freshness::Missing;
        };
        if now - report.retrieved_at < self.filing_ttl {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use summary_core::{FilingKind, IncomeStatement};

    fn income_dated(y: i32, m: u32, d: u32) -> StatementRecord {
        StatementRecord::Income(IncomeStatement {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            ..Default::default()
        })
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn empty_collection_is_missing() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.statements(&[]), Freshness::Missing);
    }

    #[test]
    fn twelve_hour_old_records_are_fresh() {
        let policy = FreshnessPolicy::default();
        let records = vec![income_dated(2024, 6, 2)];
        let now = at(2024, 6, 2, 12);
        assert_eq!(policy.statements_at(&records, now), Freshness::Fresh);
    }

    #[test]
    fn thirty_six_hour_old_records_are_stale() {
        let policy = FreshnessPolicy::default();
        let records = vec![income_dated(2024, 6, 2)];
        let now = at(2024, 6, 3, 12);
        assert_eq!(policy.statements_at(&records, now), Freshness::Stale);
    }

    #[test]
    fn exactly_ttl_old_is_stale() {
        let policy = FreshnessPolicy::default();
        let records = vec![income_dated(2024, 6, 2)];
        let now = at(2024, 6, 3, 0);
        assert_eq!(policy.statements_at(&records, now), Freshness::Stale);
    }

    #[test]
    fn newest_record_decides() {
        let policy = FreshnessPolicy::default();
        let records = vec![income_dated(2023, 6, 2), income_dated(2024, 6, 2)];
        let now = at(2024, 6, 2, 12);
        assert_eq!(policy.statements_at(&records, now), Freshness::Fresh);
    }

    #[test]
    fn filing_ages_from_retrieved_at() {
        let policy = FreshnessPolicy::default();
        let report = FilingReport {
            symbol: "AAPL".into(),
            kind: FilingKind::TenK,
            url: "https://example.com/10-K".into(),
            retrieved_at: at(2024, 6, 1, 0),
            text: "body".into(),
            truncated: false,
            full_text_length: 4,
        };

        assert_eq!(
            policy.filing_at(Some(&report), at(2024, 6, 3, 0)),
            Freshness::Fresh
        );
        assert_eq!(
            policy.filing_at(Some(&report), at(2024, 6, 9, 0)),
            Freshness::Stale
        );
        assert_eq!(policy.filing_at(None, at(2024, 6, 3, 0)), Freshness::Missing);
    }
}
