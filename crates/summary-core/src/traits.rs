use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    CompanyProfile, Error, FilingKind, FilingReport, FiscalPeriod, PricePoint, RealTimeQuote,
    StatementKind, StatementRecord,
};

/// Upstream market-data provider
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, Error>;

    async fn fetch_quote(&self, symbol: &str) -> Result<RealTimeQuote, Error>;

    /// Daily bars for the inclusive date range, ascending by date.
    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, Error>;

    /// Statement rows as the provider serves them, newest first.
    async fn fetch_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        period: FiscalPeriod,
        limit: u32,
    ) -> Result<Vec<StatementRecord>, Error>;
}

/// Owned, versioned statement sets per (symbol, kind). `replace` is the
/// only mutation; there is no append.
#[async_trait]
pub trait StatementRepository: Send + Sync {
    /// Stored records, newest first. Empty when nothing is stored.
    async fn load(&self, symbol: &str, kind: StatementKind) -> Result<Vec<StatementRecord>, Error>;

    /// Swap the whole set, returning the new version number.
    async fn replace(
        &self,
        symbol: &str,
        kind: StatementKind,
        records: Vec<StatementRecord>,
    ) -> Result<u64, Error>;

    async fn load_filing(
        &self,
        symbol: &str,
        kind: FilingKind,
    ) -> Result<Option<FilingReport>, Error>;

    async fn store_filing(&self, report: &FilingReport) -> Result<(), Error>;
}

/// Boundary to the filing scraper; implementations live elsewhere.
#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn fetch_filing(&self, symbol: &str, kind: FilingKind) -> Result<FilingReport, Error>;
}
