use super::*;
use async_trait::async_trait;
use statement_store::MemoryStatementStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use summary_core::FILING_TEXT_CAP;

fn days_ago(days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(days)
}

fn income(symbol: &str, date: NaiveDate, period: FiscalPeriod, eps: f64) -> StatementRecord {
    StatementRecord::Income(IncomeStatement {
        symbol: symbol.to_string(),
        date,
        period,
        eps: Some(eps),
        ebitda: Some(130.0e9),
        net_income: Some(95.0e9),
        revenue: Some(391.0e9),
        ..Default::default()
    })
}

fn balance(symbol: &str, date: NaiveDate, period: FiscalPeriod) -> StatementRecord {
    StatementRecord::BalanceSheet(BalanceSheet {
        symbol: symbol.to_string(),
        date,
        period,
        total_debt: Some(100.0e9),
        total_stockholders_equity: Some(60.0e9),
        total_assets: Some(350.0e9),
        ..Default::default()
    })
}

fn cash_flow(symbol: &str, date: NaiveDate, period: FiscalPeriod, dividends: f64) -> StatementRecord {
    StatementRecord::CashFlow(CashFlowStatement {
        symbol: symbol.to_string(),
        date,
        period,
        dividends_paid: Some(dividends),
        free_cash_flow: Some(100.0e9),
        operating_cash_flow: Some(110.0e9),
        capital_expenditure: Some(-10.0e9),
        ..Default::default()
    })
}

fn key_metrics(symbol: &str, date: NaiveDate, period: FiscalPeriod, pe: f64) -> StatementRecord {
    StatementRecord::KeyMetrics(KeyMetricsRecord {
        symbol: symbol.to_string(),
        date,
        period,
        pe_ratio: Some(pe),
        roic: Some(0.99),
        dividend_yield: Some(0.0044),
        ..Default::default()
    })
}

/// Two periods per cadence; the newest quarter is double-sent the way a
/// flaky provider would.
fn mock_statements(symbol: &str, kind: StatementKind, period: FiscalPeriod) -> Vec<StatementRecord> {
    let (newest, older) = match period {
        FiscalPeriod::Annual => (days_ago(80), days_ago(445)),
        FiscalPeriod::Quarter => (days_ago(10), days_ago(100)),
    };
    let build = |date: NaiveDate, latest: bool| match kind {
        StatementKind::Income => income(symbol, date, period, if latest { 6.0 } else { 5.0 }),
        StatementKind::BalanceSheet => balance(symbol, date, period),
        StatementKind::CashFlow => {
            cash_flow(symbol, date, period, if latest { -15.2e9 } else { -14.0e9 })
        }
        StatementKind::KeyMetrics => {
            key_metrics(symbol, date, period, if latest { 34.2 } else { 27.0 })
        }
    };

    let mut records = vec![build(newest, true), build(older, false)];
    if period == FiscalPeriod::Quarter {
        records.push(build(newest, true));
    }
    records
}

struct MockSource {
    history_len: usize,
    quote_eps: Option<f64>,
    fail_quote: bool,
    fail_quarterly: bool,
    fail_statements: bool,
    fail_symbols: Vec<String>,
    statement_calls: AtomicUsize,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            history_len: 260,
            quote_eps: None,
            fail_quote: false,
            fail_quarterly: false,
            fail_statements: false,
            fail_symbols: Vec::new(),
            statement_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, Error> {
        Ok(CompanyProfile {
            symbol: symbol.to_string(),
            company_name: Some("Mock Corp".into()),
            sector: Some("Technology".into()),
            industry: Some("Consumer Electronics".into()),
            price: Some(100.0),
            beta: Some(1.2),
            mkt_cap: Some(3.0e12),
            ..Default::default()
        })
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<RealTimeQuote, Error> {
        if self.fail_quote {
            return Err(Error::Remote("quote endpoint down".into()));
        }
        Ok(RealTimeQuote {
            symbol: symbol.to_string(),
            price: Some(101.5),
            previous_close: Some(99.8),
            pe: Some(30.0),
            eps: self.quote_eps,
            volume: Some(48_000_000),
            year_low: Some(80.0),
            year_high: Some(120.0),
            ..Default::default()
        })
    }

    async fn fetch_history(
        &self,
        _symbol: &str,
        _start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, Error> {
        let len = self.history_len;
        Ok((0..len)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                PricePoint {
                    date: end - Duration::days((len - 1 - i) as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000_000 + i as u64 * 1_000,
                }
            })
            .collect())
    }

    async fn fetch_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        period: FiscalPeriod,
        _limit: u32,
    ) -> Result<Vec<StatementRecord>, Error> {
        self.statement_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_statements || self.fail_symbols.iter().any(|s| s == symbol) {
            return Err(Error::Remote(format!("provider outage for {}", symbol)));
        }
        if period == FiscalPeriod::Quarter && self.fail_quarterly {
            return Err(Error::Remote("quarterly endpoint down".into()));
        }
        Ok(mock_statements(symbol, kind, period))
    }
}

struct MockFilings {
    text_len: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl Default for MockFilings {
    fn default() -> Self {
        Self {
            text_len: 64,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FilingSource for MockFilings {
    async fn fetch_filing(&self, symbol: &str, kind: FilingKind) -> Result<FilingReport, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Remote("filing index unreachable".into()));
        }
        Ok(FilingReport {
            symbol: symbol.to_string(),
            kind,
            url: format!("https://example.com/{}", kind.as_label()),
            retrieved_at: Utc::now(),
            text: "f".repeat(self.text_len),
            truncated: false,
            full_text_length: 0,
        })
    }
}

fn assembler_with(source: Arc<MockSource>) -> (SummaryAssembler, Arc<MemoryStatementStore>) {
    let store = Arc::new(MemoryStatementStore::new());
    let assembler = SummaryAssembler::new(source, store.clone());
    (assembler, store)
}

#[tokio::test]
async fn summary_merges_profile_quote_indicators_and_ratios() {
    let (assembler, _) = assembler_with(Arc::new(MockSource::default()));
    let summary = assembler.get_summary("AAPL").await.unwrap();

    assert_eq!(summary.get("symbol").and_then(|v| v.as_str()), Some("AAPL"));
    assert_eq!(
        summary.get("company_name").and_then(|v| v.as_str()),
        Some("Mock Corp")
    );
    // Quote price beats the profile's.
    assert_eq!(summary.get_f64("current_price"), Some(101.5));

    for key in [
        "rsi",
        "50_day_ma",
        "200_day_ma",
        "20_day_ema",
        "macd",
        "macd_signal",
        "macd_histogram",
        "bollinger_upper",
        "bollinger_middle",
        "bollinger_lower",
        "stochastic_k",
        "stochastic_d",
        "atr",
        "obv",
    ] {
        assert!(summary.contains(key), "missing indicator key {}", key);
    }

    // Latest annual cash-flow fields flow through.
    assert_eq!(summary.get_f64("free_cash_flow"), Some(100.0e9));
    assert_eq!(summary.get_f64("dividends_paid"), Some(-15.2e9));

    // Key-metrics pe_ratio overwrites the quote's 30.0.
    assert_eq!(summary.get_f64("pe_ratio"), Some(34.2));

    // Computed roic overwrites the provider's 0.99.
    let expected_roic = (95.0e9 - -15.2e9) / (100.0e9 + 60.0e9 - -15.2e9);
    let got_roic = summary.get_f64("roic").unwrap();
    assert!((got_roic - expected_roic).abs() < 1e-9);
    assert!((got_roic - 0.99).abs() > 0.1);

    let growth = summary.get_f64("earnings_growth").unwrap();
    assert!((growth - 0.2).abs() < 1e-9);

    let peg = summary.get_f64("peg_ratio").unwrap();
    assert!((peg - 34.2 / 0.2).abs() < 1e-6);

    let leverage = summary.get_f64("debt_to_ebitda").unwrap();
    assert!((leverage - 100.0 / 130.0).abs() < 1e-9);

    let expected_dgr = (15.2f64 / 14.0).sqrt() - 1.0;
    let dgr = summary.get_f64("dividend_growth_rate").unwrap();
    assert!((dgr - expected_dgr).abs() < 1e-9);
}

#[tokio::test]
async fn summary_omits_eps_when_quote_lacks_it() {
    let (assembler, _) = assembler_with(Arc::new(MockSource::default()));
    let summary = assembler.get_summary("AAPL").await.unwrap();
    assert!(!summary.contains("eps"));

    let (assembler, _) = assembler_with(Arc::new(MockSource {
        quote_eps: Some(6.1),
        ..Default::default()
    }));
    let summary = assembler.get_summary("AAPL").await.unwrap();
    assert_eq!(summary.get_f64("eps"), Some(6.1));
}

#[tokio::test]
async fn quote_failure_degrades_to_partial_summary() {
    let (assembler, _) = assembler_with(Arc::new(MockSource {
        fail_quote: true,
        ..Default::default()
    }));
    let summary = assembler.get_summary("AAPL").await.unwrap();

    assert_eq!(summary.get("symbol").and_then(|v| v.as_str()), Some("AAPL"));
    assert!(summary.contains("rsi"));
    assert!(!summary.contains("previous_close"));
    // Without a quote the profile price stands.
    assert_eq!(summary.get_f64("current_price"), Some(100.0));
}

#[tokio::test]
async fn empty_history_is_not_found() {
    let (assembler, _) = assembler_with(Arc::new(MockSource {
        history_len: 0,
        ..Default::default()
    }));
    let err = assembler.get_summary("AAPL").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn quarterly_leg_failure_keeps_annual_records() {
    let (assembler, store) = assembler_with(Arc::new(MockSource {
        fail_quarterly: true,
        ..Default::default()
    }));

    let records = assembler
        .get_statements("AAPL", StatementKind::Income, 5)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.period() == FiscalPeriod::Annual));
    assert_eq!(store.version("AAPL", StatementKind::Income), Some(1));
}

#[tokio::test]
async fn whole_refetch_failure_serves_stored_records() {
    let source = Arc::new(MockSource {
        fail_statements: true,
        ..Default::default()
    });
    let (assembler, store) = assembler_with(source.clone());
    store
        .replace(
            "AAPL",
            StatementKind::Income,
            vec![income("AAPL", days_ago(10), FiscalPeriod::Annual, 5.5)],
        )
        .await
        .unwrap();

    let records = assembler
        .get_statements("AAPL", StatementKind::Income, 5)
        .await
        .unwrap();

    assert!(source.statement_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].date(), days_ago(10));
    assert_eq!(store.version("AAPL", StatementKind::Income), Some(1));
}

#[tokio::test]
async fn fresh_records_short_circuit_the_source() {
    let source = Arc::new(MockSource::default());
    let (assembler, store) = assembler_with(source.clone());
    store
        .replace(
            "AAPL",
            StatementKind::Income,
            vec![income("AAPL", days_ago(0), FiscalPeriod::Annual, 6.0)],
        )
        .await
        .unwrap();

    let records = assembler
        .get_statements("AAPL", StatementKind::Income, 5)
        .await
        .unwrap();

    assert_eq!(source.statement_calls.load(Ordering::SeqCst), 0);
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn stale_records_trigger_refetch_and_replace() {
    let source = Arc::new(MockSource::default());
    let (assembler, store) = assembler_with(source.clone());
    store
        .replace(
            "AAPL",
            StatementKind::Income,
            vec![income("AAPL", days_ago(10), FiscalPeriod::Annual, 5.5)],
        )
        .await
        .unwrap();

    let records = assembler
        .get_statements("AAPL", StatementKind::Income, 5)
        .await
        .unwrap();

    // Annual and quarterly legs each hit the source once.
    assert_eq!(source.statement_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.version("AAPL", StatementKind::Income), Some(2));
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn zero_ttl_policy_always_refetches() {
    let source = Arc::new(MockSource::default());
    let store = Arc::new(MemoryStatementStore::new());
    let assembler = SummaryAssembler::new(source.clone(), store.clone())
        .with_policy(FreshnessPolicy::new(Duration::zero(), Duration::days(7)));
    store
        .replace(
            "AAPL",
            StatementKind::Income,
            vec![income("AAPL", days_ago(0), FiscalPeriod::Annual, 6.0)],
        )
        .await
        .unwrap();

    assembler
        .get_statements("AAPL", StatementKind::Income, 5)
        .await
        .unwrap();

    assert_eq!(source.statement_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn consecutive_refreshes_leave_no_duplicates() {
    let (assembler, store) = assembler_with(Arc::new(MockSource::default()));
    assembler.refresh_symbol("AAPL").await.unwrap();
    assembler.refresh_symbol("AAPL").await.unwrap();

    let records = store.load("AAPL", StatementKind::CashFlow).await.unwrap();
    assert_eq!(records.len(), 4);
    for pair in records.windows(2) {
        assert!(pair[0].date() > pair[1].date());
    }

    let mut keys: Vec<(NaiveDate, FiscalPeriod)> =
        records.iter().map(|r| (r.date(), r.period())).collect();
    keys.dedup();
    assert_eq!(keys.len(), records.len());
    assert_eq!(store.version("AAPL", StatementKind::CashFlow), Some(2));
}

#[tokio::test]
async fn refresh_all_isolates_per_symbol_failures() {
    let source = Arc::new(MockSource {
        fail_symbols: vec!["BAD".to_string()],
        ..Default::default()
    });
    let (assembler, store) = assembler_with(source);

    let symbols = vec!["AAPL".to_string(), "BAD".to_string(), "MSFT".to_string()];
    let report = assembler.refresh_all(&symbols).await;

    assert_eq!(report.refreshed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(store.version("MSFT", StatementKind::Income), Some(1));
    assert_eq!(store.version("BAD", StatementKind::Income), None);
}

#[tokio::test]
async fn years_filter_limits_returned_records() {
    let (assembler, _) = assembler_with(Arc::new(MockSource::default()));

    let five = assembler
        .get_statements("AAPL", StatementKind::Income, 5)
        .await
        .unwrap();
    assert_eq!(five.len(), 4);

    let one = assembler
        .get_statements("AAPL", StatementKind::Income, 1)
        .await
        .unwrap();
    assert_eq!(one.len(), 3);
}

#[tokio::test]
async fn key_metrics_narrow_to_one_period() {
    let (assembler, _) = assembler_with(Arc::new(MockSource::default()));

    let all = assembler.get_key_metrics("AAPL", 5, None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|m| m.pe_ratio.is_some()));

    let quarters = assembler
        .get_key_metrics("AAPL", 5, Some(FiscalPeriod::Quarter))
        .await
        .unwrap();
    assert_eq!(quarters.len(), 2);
    assert!(quarters.iter().all(|m| m.period == FiscalPeriod::Quarter));
}

#[tokio::test]
async fn filing_not_found_without_source_or_cache() {
    let (assembler, _) = assembler_with(Arc::new(MockSource::default()));
    let err = assembler
        .get_filing_report("AAPL", FilingKind::TenK)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn filing_fetch_caps_stores_and_caches() {
    let filings = Arc::new(MockFilings {
        text_len: FILING_TEXT_CAP + 5,
        ..Default::default()
    });
    let store = Arc::new(MemoryStatementStore::new());
    let assembler = SummaryAssembler::new(Arc::new(MockSource::default()), store.clone())
        .with_filing_source(filings.clone());

    let report = assembler
        .get_filing_report("AAPL", FilingKind::TenK)
        .await
        .unwrap();
    assert!(report.truncated);
    assert_eq!(report.text.chars().count(), FILING_TEXT_CAP);
    assert_eq!(report.full_text_length, FILING_TEXT_CAP + 5);

    let stored = store
        .load_filing("AAPL", FilingKind::TenK)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.truncated);

    // Second read is served from the repository.
    assembler
        .get_filing_report("AAPL", FilingKind::TenK)
        .await
        .unwrap();
    assert_eq!(filings.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_filing_refetches() {
    let filings = Arc::new(MockFilings {
        text_len: 8,
        ..Default::default()
    });
    let store = Arc::new(MemoryStatementStore::new());
    let assembler = SummaryAssembler::new(Arc::new(MockSource::default()), store.clone())
        .with_filing_source(filings.clone());
    store
        .store_filing(&FilingReport {
            symbol: "AAPL".into(),
            kind: FilingKind::TenQ,
            url: "https://example.com/old".into(),
            retrieved_at: Utc::now() - Duration::days(8),
            text: "old body".into(),
            truncated: false,
            full_text_length: 8,
        })
        .await
        .unwrap();

    let report = assembler
        .get_filing_report("AAPL", FilingKind::TenQ)
        .await
        .unwrap();

    assert_eq!(filings.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.text, "f".repeat(8));
}

#[tokio::test]
async fn filing_fetch_failure_serves_stored_report() {
    let filings = Arc::new(MockFilings {
        fail: true,
        ..Default::default()
    });
    let store = Arc::new(MemoryStatementStore::new());
    let assembler = SummaryAssembler::new(Arc::new(MockSource::default()), store.clone())
        .with_filing_source(filings.clone());
    store
        .store_filing(&FilingReport {
            symbol: "AAPL".into(),
            kind: FilingKind::EightK,
            url: "https://example.com/old".into(),
            retrieved_at: Utc::now() - Duration::days(30),
            text: "old body".into(),
            truncated: false,
            full_text_length: 8,
        })
        .await
        .unwrap();

    let report = assembler
        .get_filing_report("AAPL", FilingKind::EightK)
        .await
        .unwrap();
    assert_eq!(report.text, "old body");

    // Nothing stored for this kind, so the failure propagates.
    let err = assembler
        .get_filing_report("AAPL", FilingKind::TenK)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote(_)));
}
