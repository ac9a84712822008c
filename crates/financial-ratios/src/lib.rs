//! Null-safe fundamental ratios.
//!
//! Operands arrive straight from statement fields, so every function takes
//! `Option<f64>` and answers with `Option<f64>`: a missing operand, a zero
//! denominator or a non-finite result all come back as `None`. Nothing here
//! errors or panics.

fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Price/earnings-to-growth. Undefined for zero growth.
pub fn peg_ratio(pe: Option<f64>, earnings_growth: Option<f64>) -> Option<f64> {
    let pe = pe?;
    let growth = earnings_growth?;
    if growth == 0.0 {
        return None;
    }
    finite(pe / growth)
}

pub fn debt_to_ebitda(total_debt: Option<f64>, ebitda: Option<f64>) -> Option<f64> {
    let debt = total_debt?;
    let ebitda = ebitda?;
    if ebitda == 0.0 {
        return None;
    }
    finite(debt / ebitda)
}

/// Return on invested capital: earnings retained after dividends over the
/// invested base (debt plus equity less dividends).
pub fn roic(
    net_income: Option<f64>,
    dividends_paid: Option<f64>,
    total_debt: Option<f64>,
    total_equity: Option<f64>,
) -> Option<f64> {
    let net_income = net_income?;
    let dividends = dividends_paid?;
    let invested = total_debt? + total_equity? - dividends;
    if invested == 0.0 {
        return None;
    }
    finite((net_income - dividends) / invested)
}

/// Compound annual growth over a chronological (oldest-first) dividend
/// series. Undefined below two points, for a span under one year, a zero
/// starting value, or a growth ratio that is not positive.
pub fn dividend_growth_rate(dividends: &[f64], years: usize) -> Option<f64> {
    if dividends.len() < 2 || years < 1 {
        return None;
    }
    let first = dividends[0];
    let last = dividends[dividends.len() - 1];
    if first == 0.0 {
        return None;
    }

    let ratio = last / first;
    if ratio <= 0.0 || !ratio.is_finite() {
        return None;
    }
    finite(ratio.powf(1.0 / years as f64) - 1.0)
}

/// Year-over-year growth from the two newest values of a chronological
/// EPS series.
pub fn earnings_growth(eps: &[f64]) -> Option<f64> {
    if eps.len() < 2 {
        return None;
    }
    let prior = eps[eps.len() - 2];
    let latest = eps[eps.len() - 1];
    if prior == 0.0 {
        return None;
    }
    finite(latest / prior - 1.0)
}
