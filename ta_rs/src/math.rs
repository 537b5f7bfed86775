//! Series primitives shared by the indicator engine.
//!
//! Every function returns a vector the same length as its input. Positions
//! without enough history hold `f64::NAN`; callers never see zeros standing
//! in for missing values.

pub(crate) fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut result = vec![f64::NAN; len];
    if period == 0 || period > len {
        return result;
    }
    // Each window is summed on its own so the value at a bar never depends
    // on how much history precedes the window.
    for i in period - 1..len {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_finite()) {
            result[i] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}

/// Exponential average seeded with the simple mean of the first `period`
/// finite values.
pub(crate) fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut result = vec![f64::NAN; len];
    if period == 0 {
        return result;
    }
    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return result;
    };
    if len - start < period {
        return result;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period;
    let seed = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;
    let mut prev = seed;
    for i in seed_end..len {
        let val = values[i];
        if !val.is_finite() {
            result[i] = prev;
            continue;
        }
        prev = alpha * val + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Wilder's smoothing. Undefined until the first finite value, which seeds
/// the average; gaps repeat the previous average.
pub(crate) fn rma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    let alpha = 1.0 / period as f64;
    values
        .iter()
        .scan(f64::NAN, |avg, &value| {
            if value.is_finite() {
                *avg = if avg.is_nan() {
                    value
                } else {
                    *avg + alpha * (value - *avg)
                };
            }
            Some(*avg)
        })
        .collect()
}

/// Sample standard deviation (n - 1) over each full trailing window.
pub(crate) fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || period > values.len() {
        return result;
    }
    for (end, window) in (period - 1..).zip(values.windows(period)) {
        if !window.iter().all(|v| v.is_finite()) {
            continue;
        }
        result[end] = if period == 1 {
            0.0
        } else {
            let mean = window.iter().sum::<f64>() / period as f64;
            let squares = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (squares / (period - 1) as f64).sqrt()
        };
    }
    result
}

pub(crate) fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let len = close.len();
    let mut tr = vec![f64::NAN; len];
    for i in 1..len {
        let high_low = high[i] - low[i];
        let high_close = (high[i] - close[i - 1]).abs();
        let low_close = (low[i] - close[i - 1]).abs();
        tr[i] = high_low.max(high_close).max(low_close);
    }
    tr
}

pub(crate) fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let mut values = rma(&true_range(high, low, close), period);
    mask_warmup(&mut values, period);
    values
}

pub(crate) fn rsi(close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut gains = vec![f64::NAN; len];
    let mut losses = vec![f64::NAN; len];
    for i in 1..len {
        let change = close[i] - close[i - 1];
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }

    let avg_gain = rma(&gains, period);
    let avg_loss = rma(&losses, period);
    let mut values: Vec<f64> = avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(gain, loss)| {
            if !gain.is_finite() || !loss.is_finite() {
                f64::NAN
            } else if *loss == 0.0 {
                100.0
            } else {
                100.0 - (100.0 / (1.0 + gain / loss))
            }
        })
        .collect();
    mask_warmup(&mut values, period);
    values
}

pub(crate) struct DirectionalIndex {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub(crate) fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> DirectionalIndex {
    let len = close.len();
    let mut plus_dm = vec![f64::NAN; len];
    let mut minus_dm = vec![f64::NAN; len];

    for i in 1..len {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        plus_dm[i] = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
    }

    let atr_values = rma(&true_range(high, low, close), period);
    let plus_smoothed = rma(&plus_dm, period);
    let minus_smoothed = rma(&minus_dm, period);
    let to_di = |smoothed: &[f64]| -> Vec<f64> {
        smoothed
            .iter()
            .zip(atr_values.iter())
            .map(|(dm, atr)| {
                if !dm.is_finite() || !atr.is_finite() {
                    f64::NAN
                } else if atr.abs() < f64::EPSILON {
                    0.0
                } else {
                    (dm / atr) * 100.0
                }
            })
            .collect()
    };
    let mut plus_di = to_di(&plus_smoothed);
    let mut minus_di = to_di(&minus_smoothed);
    mask_warmup(&mut plus_di, period);
    mask_warmup(&mut minus_di, period);

    let dx = plus_di
        .iter()
        .zip(minus_di.iter())
        .map(|(p, m)| {
            if !p.is_finite() || !m.is_finite() {
                f64::NAN
            } else if (p + m).abs() < f64::EPSILON {
                0.0
            } else {
                ((p - m).abs() / (p + m)) * 100.0
            }
        })
        .collect::<Vec<_>>();
    let mut adx = rma(&dx, period);
    mask_warmup(&mut adx, (2 * period).saturating_sub(1));

    DirectionalIndex {
        adx,
        plus_di,
        minus_di,
    }
}

pub(crate) struct BollingerBands {
    pub lower: Vec<f64>,
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub bandwidth: Vec<f64>,
    pub percent: Vec<f64>,
}

pub(crate) fn bollinger(close: &[f64], period: usize, std_mult: f64) -> BollingerBands {
    let middle = sma(close, period);
    let std = rolling_std(close, period);
    let upper: Vec<f64> = middle
        .iter()
        .zip(std.iter())
        .map(|(m, s)| m + s * std_mult)
        .collect();
    let lower: Vec<f64> = middle
        .iter()
        .zip(std.iter())
        .map(|(m, s)| m - s * std_mult)
        .collect();
    let bandwidth = lower
        .iter()
        .zip(middle.iter().zip(upper.iter()))
        .map(|(l, (m, u))| {
            if !m.is_finite() || m.abs() < f64::EPSILON {
                f64::NAN
            } else {
                (u - l) / m * 100.0
            }
        })
        .collect();
    let percent = close
        .iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(c, (l, u))| {
            if !l.is_finite() || !u.is_finite() {
                f64::NAN
            } else if (u - l).abs() < f64::EPSILON {
                0.5
            } else {
                (c - l) / (u - l)
            }
        })
        .collect();
    BollingerBands {
        lower,
        middle,
        upper,
        bandwidth,
        percent,
    }
}

pub(crate) struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub(crate) fn macd(close: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let ema_fast = ema(close, fast);
    let ema_slow = ema(close, slow);
    let mut line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();
    mask_warmup(&mut line, slow.max(fast).saturating_sub(1));

    let signal = ema(&line, signal_period);
    let histogram = line
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| {
            if l.is_finite() && s.is_finite() {
                l - s
            } else {
                f64::NAN
            }
        })
        .collect();

    Macd {
        line,
        signal,
        histogram,
    }
}

/// Cumulative on-balance volume starting from zero at the first bar.
pub(crate) fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let len = close.len();
    let mut result = vec![f64::NAN; len];
    if len == 0 {
        return result;
    }
    let mut running = 0.0;
    result[0] = running;
    for i in 1..len {
        if close[i] > close[i - 1] {
            running += volume[i];
        } else if close[i] < close[i - 1] {
            running -= volume[i];
        }
        result[i] = running;
    }
    result
}

pub(crate) fn mask_warmup(values: &mut [f64], warmup: usize) {
    for value in values.iter_mut().take(warmup) {
        *value = f64::NAN;
    }
}
