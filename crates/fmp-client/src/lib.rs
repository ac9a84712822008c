use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use summary_core::{
    BalanceSheet, CashFlowStatement, CompanyProfile, Error, FiscalPeriod, IncomeStatement,
    KeyMetricsRecord, MarketDataSource, PricePoint, RealTimeQuote, StatementKind, StatementRecord,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

/// Sliding-window rate limiter: at most `limit` requests per `window`.
#[derive(Clone)]
struct RateLimiter {
    stamps: Arc<Mutex<VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            stamps: Arc::new(Mutex::new(VecDeque::new())),
            limit,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut stamps = self.stamps.lock().await;
            let now = Instant::now();

            while let Some(&oldest) = stamps.front() {
                if now.duration_since(oldest) >= self.window {
                    stamps.pop_front();
                } else {
                    break;
                }
            }

            if stamps.len() < self.limit {
                stamps.push_back(now);
                return;
            }

            // Sleep until the oldest stamp ages out, with a small cushion.
            let oldest = stamps[0];
            let wait = self.window.saturating_sub(now.duration_since(oldest))
                + Duration::from_millis(50);
            drop(stamps);
            tracing::debug!("rate limit reached, waiting {:.1}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

/// Market-data client for an FMP-style REST API.
///
/// Reads `FMP_BASE_URL` and `FMP_RATE_LIMIT` from the environment; the key
/// comes from the caller or `FMP_API_KEY` via [`FmpClient::from_env`].
#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl FmpClient {
    pub fn new(api_key: String) -> Self {
        // Free-tier keys should set FMP_RATE_LIMIT well below the default.
        let rate_limit: usize = std::env::var("FMP_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300)
            .max(1);

        let base_url =
            std::env::var("FMP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("FMP_API_KEY")
            .map_err(|_| Error::Invalid("FMP_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client
            .get(url)
            .query(&[("apikey", self.api_key.as_str())])
    }

    /// Send with rate limiting and capped 429 retries; 404 maps to
    /// `NotFound`, other non-success statuses to `Remote`.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let request = builder
            .build()
            .map_err(|e| Error::Remote(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let cloned = request
                .try_clone()
                .ok_or_else(|| Error::Remote("request cannot be retried".to_string()))?;
            let response = self
                .client
                .execute(cloned)
                .await
                .map_err(|e| Error::Remote(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                tracing::warn!("throttled upstream, retry {}/3 in 15s", attempt + 1);
                tokio::time::sleep(Duration::from_secs(15)).await;
                continue;
            }
            if status.as_u16() == 404 {
                return Err(Error::NotFound(request.url().path().to_string()));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Remote(format!("HTTP {}: {}", status, body)));
            }
            return Ok(response);
        }

        Err(Error::Remote(
            "still throttled after 3 retries".to_string(),
        ))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, Error> {
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Invalid(format!("unparseable payload: {e}")))
    }
}

#[async_trait]
impl MarketDataSource for FmpClient {
    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, Error> {
        let response = self.send(self.get(&format!("profile/{symbol}"))).await?;
        let rows: Vec<ProfileRow> = Self::decode(response).await?;

        rows.into_iter()
            .next()
            .map(ProfileRow::into_profile)
            .ok_or_else(|| Error::NotFound(format!("no profile for {symbol}")))
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<RealTimeQuote, Error> {
        let response = self.send(self.get(&format!("quote/{symbol}"))).await?;
        let rows: Vec<QuoteRow> = Self::decode(response).await?;

        rows.into_iter()
            .next()
            .map(QuoteRow::into_quote)
            .ok_or_else(|| Error::NotFound(format!("no quote for {symbol}")))
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, Error> {
        let builder = self
            .get(&format!("historical-price-full/{symbol}"))
            .query(&[
                ("from", start.format("%Y-%m-%d").to_string()),
                ("to", end.format("%Y-%m-%d").to_string()),
            ]);
        let response = self.send(builder).await?;
        let body: HistoryResponse = Self::decode(response).await?;

        // The provider serves newest-first; indicators want chronological.
        let mut points: Vec<PricePoint> = body
            .historical
            .into_iter()
            .map(|row| PricePoint {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            })
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    async fn fetch_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        period: FiscalPeriod,
        limit: u32,
    ) -> Result<Vec<StatementRecord>, Error> {
        let path = match kind {
            StatementKind::Income => "income-statement",
            StatementKind::BalanceSheet => "balance-sheet-statement",
            StatementKind::CashFlow => "cash-flow-statement",
            StatementKind::KeyMetrics => "key-metrics",
        };
        let builder = self.get(&format!("{path}/{symbol}")).query(&[
            ("period", period.as_str().to_string()),
            ("limit", limit.to_string()),
        ]);
        let response = self.send(builder).await?;

        let records = match kind {
            StatementKind::Income => {
                let rows: Vec<IncomeRow> = Self::decode(response).await?;
                rows.into_iter().map(IncomeRow::into_record).collect()
            }
            StatementKind::BalanceSheet => {
                let rows: Vec<BalanceRow> = Self::decode(response).await?;
                rows.into_iter().map(BalanceRow::into_record).collect()
            }
            StatementKind::CashFlow => {
                let rows: Vec<CashFlowRow> = Self::decode(response).await?;
                rows.into_iter().map(CashFlowRow::into_record).collect()
            }
            StatementKind::KeyMetrics => {
                let rows: Vec<KeyMetricsRow> = Self::decode(response).await?;
                rows.into_iter().map(KeyMetricsRow::into_record).collect()
            }
        };
        Ok(records)
    }
}

/// Reporting labels vary by endpoint ("FY", "Q3", "annual"); anything
/// quarterly starts with 'Q'.
fn parse_period(label: &str) -> FiscalPeriod {
    if label.starts_with('Q') || label.eq_ignore_ascii_case("quarter") {
        FiscalPeriod::Quarter
    } else {
        FiscalPeriod::Annual
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRow {
    symbol: String,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    beta: Option<f64>,
    #[serde(default)]
    vol_avg: Option<u64>,
    #[serde(default)]
    mkt_cap: Option<f64>,
    #[serde(default)]
    last_div: Option<f64>,
}

impl ProfileRow {
    fn into_profile(self) -> CompanyProfile {
        CompanyProfile {
            symbol: self.symbol,
            company_name: self.company_name,
            sector: self.sector,
            industry: self.industry,
            exchange: self.exchange,
            currency: self.currency,
            website: self.website,
            description: self.description,
            price: self.price,
            beta: self.beta,
            vol_avg: self.vol_avg,
            mkt_cap: self.mkt_cap,
            last_div: self.last_div,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRow {
    symbol: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    change: Option<f64>,
    #[serde(default)]
    changes_percentage: Option<f64>,
    #[serde(default)]
    day_low: Option<f64>,
    #[serde(default)]
    day_high: Option<f64>,
    #[serde(default)]
    year_low: Option<f64>,
    #[serde(default)]
    year_high: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    price_avg_50: Option<f64>,
    #[serde(default)]
    price_avg_200: Option<f64>,
    #[serde(default)]
    volume: Option<u64>,
    #[serde(default)]
    avg_volume: Option<u64>,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    eps: Option<f64>,
    #[serde(default)]
    pe: Option<f64>,
    #[serde(default)]
    shares_outstanding: Option<f64>,
}

impl QuoteRow {
    fn into_quote(self) -> RealTimeQuote {
        RealTimeQuote {
            symbol: self.symbol,
            price: self.price,
            change: self.change,
            changes_percentage: self.changes_percentage,
            day_low: self.day_low,
            day_high: self.day_high,
            year_low: self.year_low,
            year_high: self.year_high,
            market_cap: self.market_cap,
            price_avg_50: self.price_avg_50,
            price_avg_200: self.price_avg_200,
            volume: self.volume,
            avg_volume: self.avg_volume,
            open: self.open,
            previous_close: self.previous_close,
            eps: self.eps,
            pe: self.pe,
            shares_outstanding: self.shares_outstanding,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    historical: Vec<HistoryRow>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeRow {
    symbol: String,
    date: NaiveDate,
    period: String,
    #[serde(default)]
    revenue: Option<f64>,
    #[serde(default)]
    cost_of_revenue: Option<f64>,
    #[serde(default)]
    gross_profit: Option<f64>,
    #[serde(default)]
    gross_profit_ratio: Option<f64>,
    #[serde(default)]
    operating_expenses: Option<f64>,
    #[serde(default)]
    operating_income: Option<f64>,
    #[serde(default)]
    operating_income_ratio: Option<f64>,
    #[serde(default)]
    ebitda: Option<f64>,
    #[serde(default)]
    interest_expense: Option<f64>,
    #[serde(default)]
    income_before_tax: Option<f64>,
    #[serde(default)]
    income_tax_expense: Option<f64>,
    #[serde(default)]
    net_income: Option<f64>,
    #[serde(default)]
    net_income_ratio: Option<f64>,
    #[serde(default)]
    eps: Option<f64>,
    #[serde(default)]
    eps_diluted: Option<f64>,
    #[serde(default)]
    weighted_average_shs_out: Option<f64>,
}

impl IncomeRow {
    fn into_record(self) -> StatementRecord {
        StatementRecord::Income(IncomeStatement {
            period: parse_period(&self.period),
            symbol: self.symbol,
            date: self.date,
            revenue: self.revenue,
            cost_of_revenue: self.cost_of_revenue,
            gross_profit: self.gross_profit,
            gross_profit_ratio: self.gross_profit_ratio,
            operating_expenses: self.operating_expenses,
            operating_income: self.operating_income,
            operating_income_ratio: self.operating_income_ratio,
            ebitda: self.ebitda,
            interest_expense: self.interest_expense,
            income_before_tax: self.income_before_tax,
            income_tax_expense: self.income_tax_expense,
            net_income: self.net_income,
            net_income_ratio: self.net_income_ratio,
            eps: self.eps,
            eps_diluted: self.eps_diluted,
            weighted_average_shs_out: self.weighted_average_shs_out,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRow {
    symbol: String,
    date: NaiveDate,
    period: String,
    #[serde(default)]
    cash_and_cash_equivalents: Option<f64>,
    #[serde(default)]
    short_term_investments: Option<f64>,
    #[serde(default)]
    net_receivables: Option<f64>,
    #[serde(default)]
    inventory: Option<f64>,
    #[serde(default)]
    total_current_assets: Option<f64>,
    #[serde(default)]
    property_plant_equipment_net: Option<f64>,
    #[serde(default)]
    goodwill: Option<f64>,
    #[serde(default)]
    intangible_assets: Option<f64>,
    #[serde(default)]
    total_non_current_assets: Option<f64>,
    #[serde(default)]
    total_assets: Option<f64>,
    #[serde(default)]
    account_payables: Option<f64>,
    #[serde(default)]
    short_term_debt: Option<f64>,
    #[serde(default)]
    total_current_liabilities: Option<f64>,
    #[serde(default)]
    long_term_debt: Option<f64>,
    #[serde(default)]
    total_non_current_liabilities: Option<f64>,
    #[serde(default)]
    total_liabilities: Option<f64>,
    #[serde(default)]
    retained_earnings: Option<f64>,
    #[serde(default)]
    total_stockholders_equity: Option<f64>,
    #[serde(default)]
    total_debt: Option<f64>,
    #[serde(default)]
    net_debt: Option<f64>,
}

impl BalanceRow {
    fn into_record(self) -> StatementRecord {
        StatementRecord::BalanceSheet(BalanceSheet {
            period: parse_period(&self.period),
            symbol: self.symbol,
            date: self.date,
            cash_and_cash_equivalents: self.cash_and_cash_equivalents,
            short_term_investments: self.short_term_investments,
            net_receivables: self.net_receivables,
            inventory: self.inventory,
            total_current_assets: self.total_current_assets,
            property_plant_equipment_net: self.property_plant_equipment_net,
            goodwill: self.goodwill,
            intangible_assets: self.intangible_assets,
            total_non_current_assets: self.total_non_current_assets,
            total_assets: self.total_assets,
            account_payables: self.account_payables,
            short_term_debt: self.short_term_debt,
            total_current_liabilities: self.total_current_liabilities,
            long_term_debt: self.long_term_debt,
            total_non_current_liabilities: self.total_non_current_liabilities,
            total_liabilities: self.total_liabilities,
            retained_earnings: self.retained_earnings,
            total_stockholders_equity: self.total_stockholders_equity,
            total_debt: self.total_debt,
            net_debt: self.net_debt,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashFlowRow {
    symbol: String,
    date: NaiveDate,
    period: String,
    #[serde(default)]
    net_income: Option<f64>,
    #[serde(default)]
    depreciation_and_amortization: Option<f64>,
    #[serde(default)]
    stock_based_compensation: Option<f64>,
    #[serde(default)]
    change_in_working_capital: Option<f64>,
    #[serde(default)]
    net_cash_provided_by_operating_activities: Option<f64>,
    #[serde(default)]
    investments_in_property_plant_and_equipment: Option<f64>,
    #[serde(default)]
    acquisitions_net: Option<f64>,
    #[serde(default)]
    net_cash_used_for_investing_activities: Option<f64>,
    #[serde(default)]
    debt_repayment: Option<f64>,
    #[serde(default)]
    common_stock_issued: Option<f64>,
    #[serde(default)]
    common_stock_repurchased: Option<f64>,
    #[serde(default)]
    dividends_paid: Option<f64>,
    #[serde(default)]
    net_cash_used_provided_by_financing_activities: Option<f64>,
    #[serde(default)]
    net_change_in_cash: Option<f64>,
    #[serde(default)]
    cash_at_end_of_period: Option<f64>,
    #[serde(default)]
    cash_at_beginning_of_period: Option<f64>,
    #[serde(default)]
    operating_cash_flow: Option<f64>,
    #[serde(default)]
    capital_expenditure: Option<f64>,
    #[serde(default)]
    free_cash_flow: Option<f64>,
}

impl CashFlowRow {
    fn into_record(self) -> StatementRecord {
        StatementRecord::CashFlow(CashFlowStatement {
            period: parse_period(&self.period),
            symbol: self.symbol,
            date: self.date,
            net_income: self.net_income,
            depreciation_and_amortization: self.depreciation_and_amortization,
            stock_based_compensation: self.stock_based_compensation,
            change_in_working_capital: self.change_in_working_capital,
            net_cash_provided_by_operating_activities: self
                .net_cash_provided_by_operating_activities,
            investments_in_property_plant_and_equipment: self
                .investments_in_property_plant_and_equipment,
            acquisitions_net: self.acquisitions_net,
            net_cash_used_for_investing_activities: self.net_cash_used_for_investing_activities,
            debt_repayment: self.debt_repayment,
            common_stock_issued: self.common_stock_issued,
            common_stock_repurchased: self.common_stock_repurchased,
            dividends_paid: self.dividends_paid,
            net_cash_used_provided_by_financing_activities: self
                .net_cash_used_provided_by_financing_activities,
            net_change_in_cash: self.net_change_in_cash,
            cash_at_end_of_period: self.cash_at_end_of_period,
            cash_at_beginning_of_period: self.cash_at_beginning_of_period,
            operating_cash_flow: self.operating_cash_flow,
            capital_expenditure: self.capital_expenditure,
            free_cash_flow: self.free_cash_flow,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyMetricsRow {
    symbol: String,
    date: NaiveDate,
    period: String,
    #[serde(default)]
    revenue_per_share: Option<f64>,
    #[serde(default)]
    net_income_per_share: Option<f64>,
    #[serde(default)]
    operating_cash_flow_per_share: Option<f64>,
    #[serde(default)]
    free_cash_flow_per_share: Option<f64>,
    #[serde(default)]
    cash_per_share: Option<f64>,
    #[serde(default)]
    book_value_per_share: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    enterprise_value: Option<f64>,
    #[serde(default)]
    pe_ratio: Option<f64>,
    #[serde(default)]
    price_to_sales_ratio: Option<f64>,
    #[serde(default)]
    pb_ratio: Option<f64>,
    #[serde(default)]
    ev_to_sales: Option<f64>,
    #[serde(default)]
    enterprise_value_over_ebitda: Option<f64>,
    #[serde(default)]
    ev_to_free_cash_flow: Option<f64>,
    #[serde(default)]
    earnings_yield: Option<f64>,
    #[serde(default)]
    free_cash_flow_yield: Option<f64>,
    #[serde(default)]
    debt_to_equity: Option<f64>,
    #[serde(default)]
    debt_to_assets: Option<f64>,
    #[serde(default)]
    net_debt_to_ebitda: Option<f64>,
    #[serde(default)]
    current_ratio: Option<f64>,
    #[serde(default)]
    interest_coverage: Option<f64>,
    #[serde(default)]
    income_quality: Option<f64>,
    #[serde(default)]
    dividend_yield: Option<f64>,
    #[serde(default)]
    payout_ratio: Option<f64>,
    #[serde(default)]
    research_and_development_to_revenue: Option<f64>,
    #[serde(default)]
    intangibles_to_total_assets: Option<f64>,
    #[serde(default)]
    capex_to_operating_cash_flow: Option<f64>,
    #[serde(default)]
    capex_to_revenue: Option<f64>,
    #[serde(default)]
    graham_number: Option<f64>,
    #[serde(default)]
    roic: Option<f64>,
    #[serde(default)]
    return_on_tangible_assets: Option<f64>,
    #[serde(default)]
    working_capital: Option<f64>,
    #[serde(default)]
    invested_capital: Option<f64>,
    #[serde(default)]
    roe: Option<f64>,
    #[serde(default)]
    capex_per_share: Option<f64>,
}

impl KeyMetricsRow {
    fn into_record(self) -> StatementRecord {
        StatementRecord::KeyMetrics(KeyMetricsRecord {
            period: parse_period(&self.period),
            symbol: self.symbol,
            date: self.date,
            revenue_per_share: self.revenue_per_share,
            net_income_per_share: self.net_income_per_share,
            operating_cash_flow_per_share: self.operating_cash_flow_per_share,
            free_cash_flow_per_share: self.free_cash_flow_per_share,
            cash_per_share: self.cash_per_share,
            book_value_per_share: self.book_value_per_share,
            market_cap: self.market_cap,
            enterprise_value: self.enterprise_value,
            pe_ratio: self.pe_ratio,
            price_to_sales_ratio: self.price_to_sales_ratio,
            pb_ratio: self.pb_ratio,
            ev_to_sales: self.ev_to_sales,
            enterprise_value_over_ebitda: self.enterprise_value_over_ebitda,
            ev_to_free_cash_flow: self.ev_to_free_cash_flow,
            earnings_yield: self.earnings_yield,
            free_cash_flow_yield: self.free_cash_flow_yield,
            debt_to_equity: self.debt_to_equity,
            debt_to_assets: self.debt_to_assets,
            net_debt_to_ebitda: self.net_debt_to_ebitda,
            current_ratio: self.current_ratio,
            interest_coverage: self.interest_coverage,
            income_quality: self.income_quality,
            dividend_yield: self.dividend_yield,
            payout_ratio: self.payout_ratio,
            research_and_development_to_revenue: self.research_and_development_to_revenue,
            intangibles_to_total_assets: self.intangibles_to_total_assets,
            capex_to_operating_cash_flow: self.capex_to_operating_cash_flow,
            capex_to_revenue: self.capex_to_revenue,
            graham_number: self.graham_number,
            roic: self.roic,
            return_on_tangible_assets: self.return_on_tangible_assets,
            working_capital: self.working_capital,
            invested_capital: self.invested_capital,
            roe: self.roe,
            capex_per_share: self.capex_per_share,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_labels_parse_by_prefix() {
        assert_eq!(parse_period("FY"), FiscalPeriod::Annual);
        assert_eq!(parse_period("annual"), FiscalPeriod::Annual);
        assert_eq!(parse_period("Q1"), FiscalPeriod::Quarter);
        assert_eq!(parse_period("Q4"), FiscalPeriod::Quarter);
        assert_eq!(parse_period("quarter"), FiscalPeriod::Quarter);
    }

    #[test]
    fn income_row_keeps_absent_fields_absent() {
        let json = r#"[{
            "symbol": "AAPL",
            "date": "2024-09-28",
            "period": "FY",
            "revenue": 391035000000.0,
            "netIncome": 93736000000.0,
            "eps": 6.11
        }]"#;
        let rows: Vec<IncomeRow> = serde_json::from_str(json).unwrap();
        let record = rows.into_iter().next().unwrap().into_record();

        match record {
            StatementRecord::Income(income) => {
                assert_eq!(income.period, FiscalPeriod::Annual);
                assert_eq!(income.eps, Some(6.11));
                assert_eq!(income.ebitda, None);
                assert_eq!(income.cost_of_revenue, None);
            }
            other => panic!("wrong variant: {:?}", other.kind()),
        }
    }

    #[test]
    fn cash_flow_row_maps_dividends() {
        let json = r#"[{
            "symbol": "AAPL",
            "date": "2024-06-29",
            "period": "Q3",
            "dividendsPaid": -3895000000.0,
            "freeCashFlow": 26713000000.0
        }]"#;
        let rows: Vec<CashFlowRow> = serde_json::from_str(json).unwrap();
        let record = rows.into_iter().next().unwrap().into_record();

        assert_eq!(record.period(), FiscalPeriod::Quarter);
        match record {
            StatementRecord::CashFlow(cf) => {
                assert_eq!(cf.dividends_paid, Some(-3_895_000_000.0));
                assert_eq!(cf.operating_cash_flow, None);
            }
            other => panic!("wrong variant: {:?}", other.kind()),
        }
    }

    #[test]
    fn history_converts_to_ascending_points() {
        let json = r#"{
            "symbol": "AAPL",
            "historical": [
                {"date": "2024-06-03", "open": 192.9, "high": 194.99, "low": 192.52, "close": 194.03, "volume": 50080500},
                {"date": "2024-05-31", "open": 191.44, "high": 192.57, "low": 189.91, "close": 192.25, "volume": 75158300}
            ]
        }"#;
        let body: HistoryResponse = serde_json::from_str(json).unwrap();
        let mut points: Vec<PricePoint> = body
            .historical
            .into_iter()
            .map(|row| PricePoint {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            })
            .collect();
        points.sort_by_key(|p| p.date);

        assert_eq!(points.len(), 2);
        assert!(points[0].date < points[1].date);
        assert_eq!(points[1].close, 194.03);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_defers_over_limit_calls() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let begin = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(begin.elapsed() < Duration::from_secs(1));

        // Third slot only opens once the first stamp ages out of the window.
        limiter.acquire().await;
        assert!(begin.elapsed() >= Duration::from_secs(60));
    }
}
