/// Smoothing factor for an EMA of the given period
pub fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Calculate the Exponential Moving Average (EMA) for every price
///
/// The series is seeded with the first observed price rather than an SMA
/// warm-up, so early values lean toward `prices[0]`:
/// `ema[0] = p[0]`, `ema[t] = p[t] * alpha + ema[t-1] * (1 - alpha)`.
///
/// Returns an empty vector for empty input or a zero period.
pub fn calculate_ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() || period == 0 {
        return Vec::new();
    }

    let alpha = ema_alpha(period);
    let mut series = Vec::with_capacity(prices.len());
    let mut ema = prices[0];
    series.push(ema);

    for price in &prices[1..] {
        ema = price * alpha + ema * (1.0 - alpha);
        series.push(ema);
    }

    series
}

/// Latest EMA value, `None` when there is nothing to average
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    calculate_ema_series(prices, period).last().copied()
}
