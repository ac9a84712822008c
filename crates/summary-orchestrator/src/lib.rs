use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Months, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use financial_ratios::{debt_to_ebitda, dividend_growth_rate, earnings_growth, peg_ratio, roic};
use statement_store::{Freshness, FreshnessPolicy};
use summary_core::{
    dedup_newest_first, BalanceSheet, CashFlowStatement, CompanyProfile, Error, FilingKind,
    FilingReport, FilingSource, FiscalPeriod, IncomeStatement, KeyMetricsRecord, MarketDataSource,
    PricePoint, RealTimeQuote, StatementKind, StatementRecord, StatementRepository, Summary,
};
use technical_indicators::{atr, bollinger_bands, ema, macd, obv, rsi, sma, stochastic};

#[cfg(test)]
mod assembler_tests;

/// Daily history window feeding the indicators.
const HISTORY_DAYS: i64 = 365;
/// Statement refetch depth.
const LOOKBACK_YEARS: u32 = 5;

/// Outcome counts from a bulk refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
    pub elapsed: std::time::Duration,
}

/// Builds per-symbol summaries from a market-data source, a statement
/// repository and the indicator/ratio engines.
///
/// Profile and price history are the primary legs of a summary; the quote
/// and the statement refreshes degrade to partial output on failure.
/// Refreshes of the same symbol serialize on a per-symbol lock; distinct
/// symbols proceed independently.
pub struct SummaryAssembler {
    source: Arc<dyn MarketDataSource>,
    repository: Arc<dyn StatementRepository>,
    filings: Option<Arc<dyn FilingSource>>,
    policy: FreshnessPolicy,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SummaryAssembler {
    pub fn new(source: Arc<dyn MarketDataSource>, repository: Arc<dyn StatementRepository>) -> Self {
        Self {
            source,
            repository,
            filings: None,
            policy: FreshnessPolicy::default(),
            symbol_locks: DashMap::new(),
        }
    }

    pub fn with_filing_source(mut self, filings: Arc<dyn FilingSource>) -> Self {
        self.filings = Some(filings);
        self
    }

    pub fn with_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Assemble the flat metric map for one symbol.
    ///
    /// Merge order, later entries overwriting earlier ones on key collision:
    /// profile, quote, indicators, latest annual cash-flow fields, latest
    /// annual key-metrics fields, computed ratios. Undefined values are
    /// omitted, never null.
    pub async fn get_summary(&self, symbol: &str) -> Result<Summary, Error> {
        tracing::info!("assembling summary for {}", symbol);

        let end = Utc::now().date_naive();
        let start = end - Duration::days(HISTORY_DAYS);
        let (profile, history) = tokio::join!(
            self.source.fetch_profile(symbol),
            self.source.fetch_history(symbol, start, end),
        );
        let profile = profile?;
        let history = history?;
        if history.is_empty() {
            return Err(Error::NotFound(format!("no price history for {}", symbol)));
        }

        let quote = match self.source.fetch_quote(symbol).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                tracing::warn!("quote fetch failed for {}: {}", symbol, e);
                None
            }
        };

        let mut bundle = StatementBundle::default();
        {
            let lock = self.symbol_lock(symbol);
            let _guard = lock.lock().await;
            for kind in StatementKind::ALL {
                match self.refreshed_records(symbol, kind).await {
                    Ok(records) => bundle.set(kind, records),
                    Err(e) => {
                        tracing::warn!("{} records unavailable for {}: {}", kind.as_str(), symbol, e)
                    }
                }
            }
        }

        let mut summary = Summary::new();
        profile_fields(&mut summary, &profile);
        if let Some(quote) = &quote {
            quote_fields(&mut summary, quote);
        }
        indicator_fields(&mut summary, &history);
        if let Some(cash_flow) = bundle.latest_annual_cash_flow() {
            cash_flow_fields(&mut summary, cash_flow);
        }
        if let Some(metrics) = bundle.latest_annual_key_metrics() {
            key_metrics_fields(&mut summary, metrics);
        }
        ratio_fields(&mut summary, quote.as_ref(), &bundle);

        tracing::info!("summary for {} carries {} fields", symbol, summary.len());
        Ok(summary)
    }

    /// Freshness-checked statement read, filtered to the requested lookback.
    pub async fn get_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        years: u32,
    ) -> Result<Vec<StatementRecord>, Error> {
        let records = {
            let lock = self.symbol_lock(symbol);
            let _guard = lock.lock().await;
            self.refreshed_records(symbol, kind).await?
        };
        let cutoff = lookback_cutoff(years);
        Ok(records.into_iter().filter(|r| r.date() >= cutoff).collect())
    }

    /// Key-metrics records, optionally narrowed to one fiscal period.
    pub async fn get_key_metrics(
        &self,
        symbol: &str,
        years: u32,
        period: Option<FiscalPeriod>,
    ) -> Result<Vec<KeyMetricsRecord>, Error> {
        let records = self
            .get_statements(symbol, StatementKind::KeyMetrics, years)
            .await?;
        Ok(records
            .into_iter()
            .filter(|r| period.map_or(true, |p| r.period() == p))
            .filter_map(|r| match r {
                StatementRecord::KeyMetrics(metrics) => Some(metrics),
                _ => None,
            })
            .collect())
    }

    /// Cached filing text, refetched through the configured source once the
    /// stored report ages out.
    pub async fn get_filing_report(
        &self,
        symbol: &str,
        kind: FilingKind,
    ) -> Result<FilingReport, Error> {
        let stored = self.repository.load_filing(symbol, kind).await?;
        if let Some(report) = &stored {
            if self.policy.filing(Some(report)) == Freshness::Fresh {
                tracing::debug!("{} {} filing cache hit", symbol, kind.as_label());
                return Ok(report.clone());
            }
        }

        let Some(source) = &self.filings else {
            return match stored {
                Some(report) => Ok(report),
                None => Err(Error::NotFound(format!(
                    "no {} filing stored for {}",
                    kind.as_label(),
                    symbol
                ))),
            };
        };

        match source.fetch_filing(symbol, kind).await {
            Ok(report) => {
                let report = report.capped();
                self.repository.store_filing(&report).await?;
                Ok(report)
            }
            Err(e) => match stored {
                Some(report) => {
                    tracing::warn!(
                        "filing fetch failed for {} {}: {}; serving stored report",
                        symbol,
                        kind.as_label(),
                        e
                    );
                    Ok(report)
                }
                None => Err(e),
            },
        }
    }

    /// Force-refresh all statement kinds for one symbol.
    pub async fn refresh_symbol(&self, symbol: &str) -> Result<(), Error> {
        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;

        for kind in StatementKind::ALL {
            let records = self.refetch(symbol, kind).await?;
            let version = self.repository.replace(symbol, kind, records).await?;
            tracing::debug!("{} {} replaced at v{}", symbol, kind.as_str(), version);
        }
        Ok(())
    }

    /// Sequential bulk refresh. One symbol's failure is logged and counted,
    /// never aborts the batch.
    pub async fn refresh_all(&self, symbols: &[String]) -> RefreshReport {
        let started = Instant::now();
        let mut refreshed = 0;
        let mut failed = 0;

        for symbol in symbols {
            match self.refresh_symbol(symbol).await {
                Ok(()) => {
                    tracing::info!("refreshed statements for {}", symbol);
                    refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!("refresh failed for {}: {}", symbol, e);
                    failed += 1;
                }
            }
        }

        RefreshReport {
            refreshed,
            failed,
            elapsed: started.elapsed(),
        }
    }

    /// Serve stored records while fresh; otherwise refetch and replace,
    /// falling back to the stored set when the refetch fails outright.
    async fn refreshed_records(
        &self,
        symbol: &str,
        kind: StatementKind,
    ) -> Result<Vec<StatementRecord>, Error> {
        let stored = self.repository.load(symbol, kind).await?;
        if self.policy.statements(&stored) == Freshness::Fresh {
            tracing::debug!("{} {} cache hit", symbol, kind.as_str());
            return Ok(stored);
        }

        match self.refetch(symbol, kind).await {
            Ok(records) => {
                self.repository.replace(symbol, kind, records.clone()).await?;
                Ok(records)
            }
            Err(e) => {
                tracing::warn!(
                    "{} refetch failed for {}: {}; serving stored records",
                    kind.as_str(),
                    symbol,
                    e
                );
                Ok(stored)
            }
        }
    }

    /// Annual plus quarterly pull over the lookback window, deduped by
    /// (date, period) and ordered newest first. A quarterly failure
    /// degrades to annual-only.
    async fn refetch(
        &self,
        symbol: &str,
        kind: StatementKind,
    ) -> Result<Vec<StatementRecord>, Error> {
        let annual = self
            .source
            .fetch_statements(symbol, kind, FiscalPeriod::Annual, LOOKBACK_YEARS)
            .await?;

        let quarterly = match self
            .source
            .fetch_statements(symbol, kind, FiscalPeriod::Quarter, LOOKBACK_YEARS * 4)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    "quarterly {} fetch failed for {}: {}; keeping annual only",
                    kind.as_str(),
                    symbol,
                    e
                );
                Vec::new()
            }
        };

        let cutoff = lookback_cutoff(LOOKBACK_YEARS);
        let mut records: Vec<StatementRecord> = annual
            .into_iter()
            .chain(quarterly)
            .filter(|r| r.date() >= cutoff)
            .collect();
        dedup_newest_first(&mut records);
        Ok(records)
    }

    fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.symbol_locks
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }
}

fn lookback_cutoff(years: u32) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

/// Newest-first record sets for all four statement kinds.
#[derive(Default)]
struct StatementBundle {
    income: Vec<StatementRecord>,
    balance: Vec<StatementRecord>,
    cash_flow: Vec<StatementRecord>,
    key_metrics: Vec<StatementRecord>,
}

impl StatementBundle {
    fn set(&mut self, kind: StatementKind, records: Vec<StatementRecord>) {
        match kind {
            StatementKind::Income => self.income = records,
            StatementKind::BalanceSheet => self.balance = records,
            StatementKind::CashFlow => self.cash_flow = records,
            StatementKind::KeyMetrics => self.key_metrics = records,
        }
    }

    fn latest_annual_income(&self) -> Option<&IncomeStatement> {
        self.income.iter().find_map(|r| match r {
            StatementRecord::Income(inner) if inner.period == FiscalPeriod::Annual => Some(inner),
            _ => None,
        })
    }

    fn latest_annual_balance(&self) -> Option<&BalanceSheet> {
        self.balance.iter().find_map(|r| match r {
            StatementRecord::BalanceSheet(inner) if inner.period == FiscalPeriod::Annual => {
                Some(inner)
            }
            _ => None,
        })
    }

    fn latest_annual_cash_flow(&self) -> Option<&CashFlowStatement> {
        self.cash_flow.iter().find_map(|r| match r {
            StatementRecord::CashFlow(inner) if inner.period == FiscalPeriod::Annual => Some(inner),
            _ => None,
        })
    }

    fn latest_annual_key_metrics(&self) -> Option<&KeyMetricsRecord> {
        self.key_metrics.iter().find_map(|r| match r {
            StatementRecord::KeyMetrics(inner) if inner.period == FiscalPeriod::Annual => {
                Some(inner)
            }
            _ => None,
        })
    }

    /// Annual EPS values, oldest first.
    fn annual_eps(&self) -> Vec<f64> {
        let mut series: Vec<f64> = self
            .income
            .iter()
            .filter_map(|r| match r {
                StatementRecord::Income(inner) if inner.period == FiscalPeriod::Annual => inner.eps,
                _ => None,
            })
            .collect();
        series.reverse();
        series
    }

    /// Annual dividends paid, oldest first.
    fn annual_dividends(&self) -> Vec<f64> {
        let mut series: Vec<f64> = self
            .cash_flow
            .iter()
            .filter_map(|r| match r {
                StatementRecord::CashFlow(inner) if inner.period == FiscalPeriod::Annual => {
                    inner.dividends_paid
                }
                _ => None,
            })
            .collect();
        series.reverse();
        series
    }
}

fn profile_fields(summary: &mut Summary, profile: &CompanyProfile) {
    summary.put_str("symbol", Some(&profile.symbol));
    summary.put_str("company_name", profile.company_name.as_deref());
    summary.put_str("sector", profile.sector.as_deref());
    summary.put_str("industry", profile.industry.as_deref());
    summary.put_str("exchange", profile.exchange.as_deref());
    summary.put_str("currency", profile.currency.as_deref());
    summary.put_f64("current_price", profile.price);
    summary.put_f64("beta", profile.beta);
    summary.put_f64("market_cap", profile.mkt_cap);
    summary.put_f64("last_dividend", profile.last_div);
    summary.put_u64("average_volume", profile.vol_avg);
}

fn quote_fields(summary: &mut Summary, quote: &RealTimeQuote) {
    summary.put_f64("current_price", quote.price);
    summary.put_f64("change", quote.change);
    summary.put_f64("changes_percentage", quote.changes_percentage);
    summary.put_f64("day_low", quote.day_low);
    summary.put_f64("day_high", quote.day_high);
    summary.put_f64("52_week_low", quote.year_low);
    summary.put_f64("52_week_high", quote.year_high);
    summary.put_f64("market_cap", quote.market_cap);
    summary.put_f64("50_day_ma", quote.price_avg_50);
    summary.put_f64("200_day_ma", quote.price_avg_200);
    summary.put_u64("volume", quote.volume);
    summary.put_u64("average_volume", quote.avg_volume);
    summary.put_f64("open", quote.open);
    summary.put_f64("previous_close", quote.previous_close);
    summary.put_f64("eps", quote.eps);
    summary.put_f64("pe_ratio", quote.pe);
    summary.put_f64("shares_outstanding", quote.shares_outstanding);
}

fn indicator_fields(summary: &mut Summary, history: &[PricePoint]) {
    let closes: Vec<f64> = history.iter().map(|p| p.close).collect();
    let highs: Vec<f64> = history.iter().map(|p| p.high).collect();
    let lows: Vec<f64> = history.iter().map(|p| p.low).collect();
    let volumes: Vec<u64> = history.iter().map(|p| p.volume).collect();

    summary.put_f64("50_day_ma", sma(&closes, 50).ok().flatten());
    summary.put_f64("200_day_ma", sma(&closes, 200).ok().flatten());
    summary.put_f64("20_day_ema", ema(&closes, 20).ok().flatten());
    summary.put_f64("rsi", rsi(&closes, 14).ok().flatten());

    if let Ok(Some(m)) = macd(&closes, 12, 26, 9) {
        summary.put_f64("macd", Some(m.macd));
        summary.put_f64("macd_signal", Some(m.signal));
        summary.put_f64("macd_histogram", Some(m.histogram));
    }
    if let Ok(Some(bands)) = bollinger_bands(&closes, 20, 2.0) {
        summary.put_f64("bollinger_upper", Some(bands.upper));
        summary.put_f64("bollinger_middle", Some(bands.middle));
        summary.put_f64("bollinger_lower", Some(bands.lower));
    }
    if let Ok(Some(stoch)) = stochastic(&closes, &lows, &highs, 14) {
        summary.put_f64("stochastic_k", Some(stoch.k));
        summary.put_f64("stochastic_d", Some(stoch.d));
    }
    summary.put_f64("atr", atr(&highs, &lows, &closes, 14).ok().flatten());
    summary.put_i64("obv", obv(&closes, &volumes).ok().flatten());
}

fn cash_flow_fields(summary: &mut Summary, cf: &CashFlowStatement) {
    summary.put_f64("net_income", cf.net_income);
    summary.put_f64("depreciation_and_amortization", cf.depreciation_and_amortization);
    summary.put_f64("stock_based_compensation", cf.stock_based_compensation);
    summary.put_f64("change_in_working_capital", cf.change_in_working_capital);
    summary.put_f64(
        "net_cash_provided_by_operating_activities",
        cf.net_cash_provided_by_operating_activities,
    );
    summary.put_f64(
        "investments_in_property_plant_and_equipment",
        cf.investments_in_property_plant_and_equipment,
    );
    summary.put_f64("acquisitions_net", cf.acquisitions_net);
    summary.put_f64(
        "net_cash_used_for_investing_activities",
        cf.net_cash_used_for_investing_activities,
    );
    summary.put_f64("debt_repayment", cf.debt_repayment);
    summary.put_f64("common_stock_issued", cf.common_stock_issued);
    summary.put_f64("common_stock_repurchased", cf.common_stock_repurchased);
    summary.put_f64("dividends_paid", cf.dividends_paid);
    summary.put_f64(
        "net_cash_used_provided_by_financing_activities",
        cf.net_cash_used_provided_by_financing_activities,
    );
    summary.put_f64("net_change_in_cash", cf.net_change_in_cash);
    summary.put_f64("cash_at_end_of_period", cf.cash_at_end_of_period);
    summary.put_f64("cash_at_beginning_of_period", cf.cash_at_beginning_of_period);
    summary.put_f64("operating_cash_flow", cf.operating_cash_flow);
    summary.put_f64("capital_expenditure", cf.capital_expenditure);
    summary.put_f64("free_cash_flow", cf.free_cash_flow);
}

fn key_metrics_fields(summary: &mut Summary, metrics: &KeyMetricsRecord) {
    summary.put_f64("revenue_per_share", metrics.revenue_per_share);
    summary.put_f64("net_income_per_share", metrics.net_income_per_share);
    summary.put_f64(
        "operating_cash_flow_per_share",
        metrics.operating_cash_flow_per_share,
    );
    summary.put_f64("free_cash_flow_per_share", metrics.free_cash_flow_per_share);
    summary.put_f64("cash_per_share", metrics.cash_per_share);
    summary.put_f64("book_value_per_share", metrics.book_value_per_share);
    summary.put_f64("market_cap", metrics.market_cap);
    summary.put_f64("enterprise_value", metrics.enterprise_value);
    summary.put_f64("pe_ratio", metrics.pe_ratio);
    summary.put_f64("price_to_sales_ratio", metrics.price_to_sales_ratio);
    summary.put_f64("pb_ratio", metrics.pb_ratio);
    summary.put_f64("ev_to_sales", metrics.ev_to_sales);
    summary.put_f64(
        "enterprise_value_over_ebitda",
        metrics.enterprise_value_over_ebitda,
    );
    summary.put_f64("ev_to_free_cash_flow", metrics.ev_to_free_cash_flow);
    summary.put_f64("earnings_yield", metrics.earnings_yield);
    summary.put_f64("free_cash_flow_yield", metrics.free_cash_flow_yield);
    summary.put_f64("debt_to_equity", metrics.debt_to_equity);
    summary.put_f64("debt_to_assets", metrics.debt_to_assets);
    summary.put_f64("net_debt_to_ebitda", metrics.net_debt_to_ebitda);
    summary.put_f64("current_ratio", metrics.current_ratio);
    summary.put_f64("interest_coverage", metrics.interest_coverage);
    summary.put_f64("income_quality", metrics.income_quality);
    summary.put_f64("dividend_yield", metrics.dividend_yield);
    summary.put_f64("payout_ratio", metrics.payout_ratio);
    summary.put_f64(
        "research_and_development_to_revenue",
        metrics.research_and_development_to_revenue,
    );
    summary.put_f64(
        "intangibles_to_total_assets",
        metrics.intangibles_to_total_assets,
    );
    summary.put_f64(
        "capex_to_operating_cash_flow",
        metrics.capex_to_operating_cash_flow,
    );
    summary.put_f64("capex_to_revenue", metrics.capex_to_revenue);
    summary.put_f64("graham_number", metrics.graham_number);
    summary.put_f64("roic", metrics.roic);
    summary.put_f64(
        "return_on_tangible_assets",
        metrics.return_on_tangible_assets,
    );
    summary.put_f64("working_capital", metrics.working_capital);
    summary.put_f64("invested_capital", metrics.invested_capital);
    summary.put_f64("roe", metrics.roe);
    summary.put_f64("capex_per_share", metrics.capex_per_share);
}

fn ratio_fields(summary: &mut Summary, quote: Option<&RealTimeQuote>, bundle: &StatementBundle) {
    let income = bundle.latest_annual_income();
    let balance = bundle.latest_annual_balance();
    let cash_flow = bundle.latest_annual_cash_flow();
    let metrics = bundle.latest_annual_key_metrics();

    let eps_series = bundle.annual_eps();
    let growth = earnings_growth(&eps_series);
    summary.put_f64("earnings_growth", growth);

    let pe = metrics
        .and_then(|m| m.pe_ratio)
        .or_else(|| quote.and_then(|q| q.pe));
    summary.put_f64("peg_ratio", peg_ratio(pe, growth));

    summary.put_f64(
        "debt_to_ebitda",
        debt_to_ebitda(
            balance.and_then(|b| b.total_debt),
            income.and_then(|i| i.ebitda),
        ),
    );

    summary.put_f64(
        "roic",
        roic(
            income.and_then(|i| i.net_income),
            cash_flow.and_then(|c| c.dividends_paid),
            balance.and_then(|b| b.total_debt),
            balance.and_then(|b| b.total_stockholders_equity),
        ),
    );

    let dividends = bundle.annual_dividends();
    summary.put_f64(
        "dividend_growth_rate",
        dividend_growth_rate(&dividends, dividends.len()),
    );
}
