//! Latest-value indicators over aligned price/volume series.
//!
//! Every function follows the same contract: `Ok(Some(_))` carries the most
//! recent value, `Ok(None)` means the series is too short (or the value is
//! undefined for the window), and `Err(Invalid)` is reserved for malformed
//! input such as a zero window or mismatched series lengths. Short input
//! never panics and never errors.

use summary_core::Error;

/// Simple moving average of the trailing `window` closes.
pub fn sma(prices: &[f64], window: usize) -> Result<Option<f64>, Error> {
    if window == 0 {
        return Err(Error::Invalid("sma window must be positive".into()));
    }
    if prices.len() < window {
        return Ok(None);
    }

    let sum: f64 = prices[prices.len() - window..].iter().sum();
    Ok(Some(sum / window as f64))
}

/// Exponential moving average, seeded from the first sample.
///
/// Non-adjusted recursive form: each step folds the new sample in with
/// weight 2/(period+1), so a single sample is its own EMA.
pub fn ema(prices: &[f64], period: usize) -> Result<Option<f64>, Error> {
    if period == 0 {
        return Err(Error::Invalid("ema period must be positive".into()));
    }
    Ok(ema_series(prices, period).last().copied())
}

fn ema_series(data: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = match data.first() {
        Some(&first) => first,
        None => return Vec::new(),
    };

    let mut out = Vec::with_capacity(data.len());
    out.push(current);
    for &p in &data[1..] {
        current = alpha * p + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

/// Relative Strength Index with Wilder's smoothing.
///
/// Needs `period + 1` samples. Seed averages come from the first `period`
/// deltas; later deltas are folded in recursively. A tail with no losses
/// pins the index to 100; a tail with neither gains nor losses leaves it
/// undefined.
pub fn rsi(prices: &[f64], period: usize) -> Result<Option<f64>, Error> {
    if period == 0 {
        return Err(Error::Invalid("rsi period must be positive".into()));
    }
    if prices.len() < period + 1 {
        return Ok(None);
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for pair in prices.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        if avg_gain > 0.0 {
            return Ok(Some(100.0));
        }
        return Ok(None);
    }

    let rs = avg_gain / avg_loss;
    Ok(Some(100.0 - 100.0 / (1.0 + rs)))
}

pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD line, signal line and histogram at the newest sample.
///
/// Both EMAs are seeded from the first sample, so the lines align
/// index-by-index across the whole series.
pub fn macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Result<Option<MacdOutput>, Error> {
    if fast == 0 || slow == 0 || signal_period == 0 {
        return Err(Error::Invalid("macd periods must be positive".into()));
    }
    if fast >= slow {
        return Err(Error::Invalid(
            "macd fast period must be shorter than the slow period".into(),
        ));
    }

    let ema_fast = ema_series(prices, fast);
    let ema_slow = ema_series(prices, slow);
    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd_line, signal_period);

    match (macd_line.last(), signal_line.last()) {
        (Some(&m), Some(&s)) => Ok(Some(MacdOutput {
            macd: m,
            signal: s,
            histogram: m - s,
        })),
        _ => Ok(None),
    }
}

pub struct BollingerOutput {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands at `width` population standard deviations around the
/// trailing SMA. Undefined until `period` samples exist.
pub fn bollinger_bands(
    prices: &[f64],
    period: usize,
    width: f64,
) -> Result<Option<BollingerOutput>, Error> {
    if period == 0 {
        return Err(Error::Invalid("bollinger period must be positive".into()));
    }
    if prices.len() < period {
        return Ok(None);
    }

    let window = &prices[prices.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();

    Ok(Some(BollingerOutput {
        upper: mean + width * std,
        middle: mean,
        lower: mean - width * std,
    }))
}

pub struct StochasticOutput {
    pub k: f64,
    pub d: f64,
}

/// Stochastic oscillator %K over the trailing window.
///
/// A single snapshot carries no %K history to average, so %D degenerates
/// to %K here. A window with no range leaves the oscillator undefined.
pub fn stochastic(
    closes: &[f64],
    lows: &[f64],
    highs: &[f64],
    period: usize,
) -> Result<Option<StochasticOutput>, Error> {
    if period == 0 {
        return Err(Error::Invalid("stochastic period must be positive".into()));
    }
    if closes.len() != lows.len() || closes.len() != highs.len() {
        return Err(Error::Invalid(format!(
            "stochastic series lengths differ: close {}, low {}, high {}",
            closes.len(),
            lows.len(),
            highs.len()
        )));
    }
    if closes.len() < period {
        return Ok(None);
    }

    let start = closes.len() - period;
    let highest = highs[start..]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let lowest = lows[start..].iter().copied().fold(f64::INFINITY, f64::min);
    if highest == lowest {
        return Ok(None);
    }

    let k = 100.0 * (closes[closes.len() - 1] - lowest) / (highest - lowest);
    Ok(Some(StochasticOutput { k, d: k }))
}

/// Average True Range: arithmetic mean of the trailing `period` true
/// ranges. The first bar has no prior close, so its range stands alone.
pub fn atr(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
) -> Result<Option<f64>, Error> {
    if period == 0 {
        return Err(Error::Invalid("atr period must be positive".into()));
    }
    if highs.len() != lows.len() || highs.len() != closes.len() {
        return Err(Error::Invalid(format!(
            "atr series lengths differ: high {}, low {}, close {}",
            highs.len(),
            lows.len(),
            closes.len()
        )));
    }
    if highs.len() < period {
        return Ok(None);
    }

    let mut true_ranges = Vec::with_capacity(highs.len());
    true_ranges.push(highs[0] - lows[0]);
    for i in 1..highs.len() {
        let high_low = highs[i] - lows[i];
        let high_close = (highs[i] - closes[i - 1]).abs();
        let low_close = (lows[i] - closes[i - 1]).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let tail = &true_ranges[true_ranges.len() - period..];
    Ok(Some(tail.iter().sum::<f64>() / period as f64))
}

/// On-Balance Volume, anchored at the first bar's volume: rising closes
/// add volume, falling closes subtract it, flat closes hold.
pub fn obv(closes: &[f64], volumes: &[u64]) -> Result<Option<i64>, Error> {
    if closes.len() != volumes.len() {
        return Err(Error::Invalid(format!(
            "obv series lengths differ: close {}, volume {}",
            closes.len(),
            volumes.len()
        )));
    }
    if closes.is_empty() {
        return Ok(None);
    }

    let mut total = volumes[0] as i64;
    for i in 1..closes.len() {
        if closes[i] > closes[i - 1] {
            total += volumes[i] as i64;
        } else if closes[i] < closes[i - 1] {
            total -= volumes[i] as i64;
        }
    }
    Ok(Some(total))
}
