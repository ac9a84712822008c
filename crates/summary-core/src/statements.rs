use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Reporting cadence of a statement record
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FiscalPeriod {
    #[default]
    Annual,
    Quarter,
}

impl FiscalPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiscalPeriod::Annual => "annual",
            FiscalPeriod::Quarter => "quarter",
        }
    }
}

/// Statement variants served by the provider's bulk endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Income,
    BalanceSheet,
    CashFlow,
    KeyMetrics,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::Income,
        StatementKind::BalanceSheet,
        StatementKind::CashFlow,
        StatementKind::KeyMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Income => "income_statement",
            StatementKind::BalanceSheet => "balance_sheet",
            StatementKind::CashFlow => "cash_flow",
            StatementKind::KeyMetrics => "key_metrics",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income_statement" => Some(StatementKind::Income),
            "balance_sheet" => Some(StatementKind::BalanceSheet),
            "cash_flow" => Some(StatementKind::CashFlow),
            "key_metrics" => Some(StatementKind::KeyMetrics),
            _ => None,
        }
    }
}

/// Income statement record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub symbol: String,
    pub date: NaiveDate,
    pub period: FiscalPeriod,
    pub revenue: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub gross_profit_ratio: Option<f64>,
    pub operating_expenses: Option<f64>,
    pub operating_income: Option<f64>,
    pub operating_income_ratio: Option<f64>,
    pub ebitda: Option<f64>,
    pub interest_expense: Option<f64>,
    pub income_before_tax: Option<f64>,
    pub income_tax_expense: Option<f64>,
    pub net_income: Option<f64>,
    pub net_income_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub eps_diluted: Option<f64>,
    pub weighted_average_shs_out: Option<f64>,
}

/// Balance sheet record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub symbol: String,
    pub date: NaiveDate,
    pub period: FiscalPeriod,
    pub cash_and_cash_equivalents: Option<f64>,
    pub short_term_investments: Option<f64>,
    pub net_receivables: Option<f64>,
    pub inventory: Option<f64>,
    pub total_current_assets: Option<f64>,
    pub property_plant_equipment_net: Option<f64>,
    pub goodwill: Option<f64>,
    pub intangible_assets: Option<f64>,
    pub total_non_current_assets: Option<f64>,
    pub total_assets: Option<f64>,
    pub account_payables: Option<f64>,
    pub short_term_debt: Option<f64>,
    pub total_current_liabilities: Option<f64>,
    pub long_term_debt: Option<f64>,
    pub total_non_current_liabilities: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub retained_earnings: Option<f64>,
    pub total_stockholders_equity: Option<f64>,
    pub total_debt: Option<f64>,
    pub net_debt: Option<f64>,
}

/// Cash flow statement record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub symbol: String,
    pub date: NaiveDate,
    pub period: FiscalPeriod,
    pub net_income: Option<f64>,
    pub depreciation_and_amortization: Option<f64>,
    pub stock_based_compensation: Option<f64>,
    pub change_in_working_capital: Option<f64>,
    pub net_cash_provided_by_operating_activities: Option<f64>,
    pub investments_in_property_plant_and_equipment: Option<f64>,
    pub acquisitions_net: Option<f64>,
    pub net_cash_used_for_investing_activities: Option<f64>,
    pub debt_repayment: Option<f64>,
    pub common_stock_issued: Option<f64>,
    pub common_stock_repurchased: Option<f64>,
    pub dividends_paid: Option<f64>,
    pub net_cash_used_provided_by_financing_activities: Option<f64>,
    pub net_change_in_cash: Option<f64>,
    pub cash_at_end_of_period: Option<f64>,
    pub cash_at_beginning_of_period: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

/// Provider-computed per-share, valuation and quality metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyMetricsRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub period: FiscalPeriod,
    pub revenue_per_share: Option<f64>,
    pub net_income_per_share: Option<f64>,
    pub operating_cash_flow_per_share: Option<f64>,
    pub free_cash_flow_per_share: Option<f64>,
    pub cash_per_share: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub price_to_sales_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ev_to_sales: Option<f64>,
    pub enterprise_value_over_ebitda: Option<f64>,
    pub ev_to_free_cash_flow: Option<f64>,
    pub earnings_yield: Option<f64>,
    pub free_cash_flow_yield: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub debt_to_assets: Option<f64>,
    pub net_debt_to_ebitda: Option<f64>,
    pub current_ratio: Option<f64>,
    pub interest_coverage: Option<f64>,
    pub income_quality: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub research_and_development_to_revenue: Option<f64>,
    pub intangibles_to_total_assets: Option<f64>,
    pub capex_to_operating_cash_flow: Option<f64>,
    pub capex_to_revenue: Option<f64>,
    pub graham_number: Option<f64>,
    pub roic: Option<f64>,
    pub return_on_tangible_assets: Option<f64>,
    pub working_capital: Option<f64>,
    pub invested_capital: Option<f64>,
    pub roe: Option<f64>,
    pub capex_per_share: Option<f64>,
}

/// A single dated record of any statement kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementRecord {
    Income(IncomeStatement),
    BalanceSheet(BalanceSheet),
    CashFlow(CashFlowStatement),
    KeyMetrics(KeyMetricsRecord),
}

impl StatementRecord {
    pub fn kind(&self) -> StatementKind {
        match self {
            StatementRecord::Income(_) => StatementKind::Income,
            StatementRecord::BalanceSheet(_) => StatementKind::BalanceSheet,
            StatementRecord::CashFlow(_) => StatementKind::CashFlow,
            StatementRecord::KeyMetrics(_) => StatementKind::KeyMetrics,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            StatementRecord::Income(r) => &r.symbol,
            StatementRecord::BalanceSheet(r) => &r.symbol,
            StatementRecord::CashFlow(r) => &r.symbol,
            StatementRecord::KeyMetrics(r) => &r.symbol,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            StatementRecord::Income(r) => r.date,
            StatementRecord::BalanceSheet(r) => r.date,
            StatementRecord::CashFlow(r) => r.date,
            StatementRecord::KeyMetrics(r) => r.date,
        }
    }

    pub fn period(&self) -> FiscalPeriod {
        match self {
            StatementRecord::Income(r) => r.period,
            StatementRecord::BalanceSheet(r) => r.period,
            StatementRecord::CashFlow(r) => r.period,
            StatementRecord::KeyMetrics(r) => r.period,
        }
    }
}

/// Orders records newest first; annual sorts ahead of quarterly when dates tie.
pub fn sort_newest_first(records: &mut [StatementRecord]) {
    records.sort_by(|a, b| {
        b.date()
            .cmp(&a.date())
            .then_with(|| a.period().cmp(&b.period()))
    });
}

/// Sorts newest first and drops later records sharing a (date, period) key
/// with an earlier one.
pub fn dedup_newest_first(records: &mut Vec<StatementRecord>) {
    sort_newest_first(records);
    records.dedup_by(|a, b| a.date() == b.date() && a.period() == b.period());
}

/// Filing form types the pipeline caches reports for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingKind {
    TenK,
    TenQ,
    EightK,
    ProxyStatement,
    S1,
    Form4,
    Sc13d,
    Sc13g,
    TwentyF,
}

impl FilingKind {
    /// Form label as it appears on the filing index
    pub fn as_label(&self) -> &'static str {
        match self {
            FilingKind::TenK => "10-K",
            FilingKind::TenQ => "10-Q",
            FilingKind::EightK => "8-K",
            FilingKind::ProxyStatement => "DEF 14A",
            FilingKind::S1 => "S-1",
            FilingKind::Form4 => "4",
            FilingKind::Sc13d => "SC 13D",
            FilingKind::Sc13g => "SC 13G",
            FilingKind::TwentyF => "20-F",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "10-K" => Some(FilingKind::TenK),
            "10-Q" => Some(FilingKind::TenQ),
            "8-K" => Some(FilingKind::EightK),
            "DEF 14A" => Some(FilingKind::ProxyStatement),
            "S-1" => Some(FilingKind::S1),
            "4" => Some(FilingKind::Form4),
            "SC 13D" => Some(FilingKind::Sc13d),
            "SC 13G" => Some(FilingKind::Sc13g),
            "20-F" => Some(FilingKind::TwentyF),
            _ => None,
        }
    }
}

/// Report text longer than this is truncated at ingest.
pub const FILING_TEXT_CAP: usize = 500_000;

/// Extracted text of one filing, cached with its retrieval time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingReport {
    pub symbol: String,
    pub kind: FilingKind,
    pub url: String,
    pub retrieved_at: DateTime<Utc>,
    pub text: String,
    pub truncated: bool,
    pub full_text_length: usize,
}

impl FilingReport {
    /// Apply the text cap, recording the original length.
    pub fn capped(mut self) -> Self {
        let chars = self.text.chars().count();
        self.full_text_length = chars;
        if chars > FILING_TEXT_CAP {
            let cut = self
                .text
                .char_indices()
                .nth(FILING_TEXT_CAP)
                .map(|(i, _)| i)
                .unwrap_or(self.text.len());
            self.text.truncate(cut);
            self.truncated = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn record_accessors_match_variant() {
        let rec = StatementRecord::Income(IncomeStatement {
            symbol: "AAPL".into(),
            date: date(2024, 9, 28),
            period: FiscalPeriod::Annual,
            eps: Some(6.13),
            ..Default::default()
        });
        assert_eq!(rec.kind(), StatementKind::Income);
        assert_eq!(rec.symbol(), "AAPL");
        assert_eq!(rec.date(), date(2024, 9, 28));
        assert_eq!(rec.period(), FiscalPeriod::Annual);
    }

    fn income(d: NaiveDate, period: FiscalPeriod, eps: Option<f64>) -> StatementRecord {
        StatementRecord::Income(IncomeStatement {
            symbol: "AAPL".into(),
            date: d,
            period,
            eps,
            ..Default::default()
        })
    }

    #[test]
    fn records_sort_newest_first_annual_ahead_on_ties() {
        let mut records = vec![
            income(date(2023, 9, 30), FiscalPeriod::Annual, None),
            income(date(2024, 9, 28), FiscalPeriod::Quarter, None),
            income(date(2024, 9, 28), FiscalPeriod::Annual, None),
        ];
        sort_newest_first(&mut records);

        assert_eq!(records[0].date(), date(2024, 9, 28));
        assert_eq!(records[0].period(), FiscalPeriod::Annual);
        assert_eq!(records[1].period(), FiscalPeriod::Quarter);
        assert_eq!(records[2].date(), date(2023, 9, 30));
    }

    #[test]
    fn dedup_drops_repeated_date_period_pairs() {
        let mut records = vec![
            income(date(2024, 9, 28), FiscalPeriod::Annual, Some(6.13)),
            income(date(2024, 9, 28), FiscalPeriod::Annual, Some(9.99)),
            income(date(2024, 9, 28), FiscalPeriod::Quarter, None),
            income(date(2023, 9, 30), FiscalPeriod::Annual, None),
        ];
        dedup_newest_first(&mut records);

        assert_eq!(records.len(), 3);
        // Stable sort keeps the earliest-listed record for a duplicated key.
        match &records[0] {
            StatementRecord::Income(r) => assert_eq!(r.eps, Some(6.13)),
            other => panic!("wrong variant: {:?}", other.kind()),
        }
    }

    #[test]
    fn filing_labels_round_trip() {
        for kind in [
            FilingKind::TenK,
            FilingKind::TenQ,
            FilingKind::EightK,
            FilingKind::ProxyStatement,
            FilingKind::S1,
            FilingKind::Form4,
            FilingKind::Sc13d,
            FilingKind::Sc13g,
            FilingKind::TwentyF,
        ] {
            assert_eq!(FilingKind::from_label(kind.as_label()), Some(kind));
        }
        assert_eq!(FilingKind::from_label("13F"), None);
    }

    #[test]
    fn filing_text_cap_applies() {
        let report = FilingReport {
            symbol: "AAPL".into(),
            kind: FilingKind::TenK,
            url: "https://example.com/10-K".into(),
            retrieved_at: Utc::now(),
            text: "x".repeat(FILING_TEXT_CAP + 10),
            truncated: false,
            full_text_length: 0,
        }
        .capped();
        assert!(report.truncated);
        assert_eq!(report.text.chars().count(), FILING_TEXT_CAP);
        assert_eq!(report.full_text_length, FILING_TEXT_CAP + 10);
    }

    #[test]
    fn short_filing_text_is_untouched() {
        let report = FilingReport {
            symbol: "AAPL".into(),
            kind: FilingKind::EightK,
            url: "https://example.com/8-K".into(),
            retrieved_at: Utc::now(),
            text: "short body".into(),
            truncated: false,
            full_text_length: 0,
        }
        .capped();
        assert!(!report.truncated);
        assert_eq!(report.text, "short body");
        assert_eq!(report.full_text_length, 10);
    }

    #[test]
    fn period_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FiscalPeriod::Annual).unwrap(),
            r#""annual""#
        );
        assert_eq!(
            serde_json::to_string(&FiscalPeriod::Quarter).unwrap(),
            r#""quarter""#
        );
    }
}
