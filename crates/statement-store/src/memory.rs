use async_trait::async_trait;
use dashmap::DashMap;
use summary_core::{
    sort_newest_first, Error, FilingKind, FilingReport, StatementKind, StatementRecord,
    StatementRepository,
};

struct VersionedSet {
    version: u64,
    records: Vec<StatementRecord>,
}

/// In-memory `StatementRepository`. Each `replace` installs a new generation
/// of the whole set; nothing is appended to an existing one.
#[derive(Default)]
pub struct MemoryStatementStore {
    sets: DashMap<(String, StatementKind), VersionedSet>,
    filings: DashMap<(String, FilingKind), FilingReport>,
}

impl MemoryStatementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of a stored set, if any.
    pub fn version(&self, symbol: &str, kind: StatementKind) -> Option<u64> {
        self.sets
            .get(&(symbol.to_string(), kind))
            .map(|set| set.version)
    }
}

#[async_trait]
impl StatementRepository for MemoryStatementStore {
    async fn load(&self, symbol: &str, kind: StatementKind) -> Result<Vec<StatementRecord>, Error> {
        Ok(self
            .sets
            .get(&(symbol.to_string(), kind))
            .map(|set| set.records.clone())
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        symbol: &str,
        kind: StatementKind,
        mut records: Vec<StatementRecord>,
    ) -> Result<u64, Error> {
        sort_newest_first(&mut records);
        let mut set = self
            .sets
            .entry((symbol.to_string(), kind))
            .or_insert_with(|| VersionedSet {
                version: 0,
                records: Vec::new(),
            });
        set.version += 1;
        set.records = records;
        Ok(set.version)
    }

    async fn load_filing(
        &self,
        symbol: &str,
        kind: FilingKind,
    ) -> Result<Option<FilingReport>, Error> {
        Ok(self
            .filings
            .get(&(symbol.to_string(), kind))
            .map(|report| report.clone()))
    }

    async fn store_filing(&self, report: &FilingReport) -> Result<(), Error> {
        self.filings
            .insert((report.symbol.clone(), report.kind), report.clone());
        Ok(())
    }
}
