//! Data preprocessing: feature derivation over aligned price/volume series.
//!
//! The processor turns a raw `(price, volume)` pair into the [`Processed`]
//! bundle every analyzer consumes. Rolling statistics use one-pass windowed
//! sums; leading warmup entries of rolling fields are NaN, while the
//! categorical classifications fall back to their neutral variants so
//! downstream code never branches on missing values.

use std::sync::Arc;

use crate::params::Parameters;
use crate::series::{align, BarSeries, Processed, VolumeSeries, EPSILON};
use crate::{AnalysisError, CandleClass, PriceDirection, Result, VolumeClass, VolumeDirection};

// ============================================================
// ROLLING HELPERS
// ============================================================

/// Trailing simple mean over `window` entries; NaN for the first
/// `window - 1` positions.
pub(crate) fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    out
}

/// Exponential moving average with span semantics (`alpha = 2 / (span + 1)`),
/// seeded with the first value.
pub(crate) fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut current = values[0];
    out.push(current);
    for &value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

// ============================================================
// PROCESSOR
// ============================================================

/// Derives the per-bar feature bundle from raw price and volume.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    params: Arc<Parameters>,
}

impl DataProcessor {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Align price and volume and derive all features.
    ///
    /// Fails with [`AnalysisError::DataIntegrity`] on malformed input and
    /// [`AnalysisError::InsufficientData`] when the aligned series is
    /// shorter than the engine-wide minimum.
    pub fn preprocess(&self, price: &BarSeries, volume: &VolumeSeries) -> Result<Processed> {
        let aligned = align(price, volume)?;

        let need = self.params.min_required_bars();
        if aligned.len() < need {
            return Err(AnalysisError::InsufficientData { need, got: aligned.len() });
        }

        let n = aligned.len();
        let mut processed = Processed {
            timestamps: aligned.timestamps,
            open: aligned.open,
            high: aligned.high,
            low: aligned.low,
            close: aligned.close,
            volume: aligned.volume,
            ..Processed::default()
        };

        // Candle properties.
        processed.spread = Vec::with_capacity(n);
        processed.body_percent = Vec::with_capacity(n);
        processed.upper_wick = Vec::with_capacity(n);
        processed.lower_wick = Vec::with_capacity(n);
        for i in 0..n {
            let (o, h, l, c) = (
                processed.open[i],
                processed.high[i],
                processed.low[i],
                processed.close[i],
            );
            let spread = (c - o).abs();
            let range = h - l;
            processed.spread.push(spread);
            processed
                .body_percent
                .push(if range > EPSILON { spread / range } else { 0.0 });
            processed.upper_wick.push(h - o.max(c));
            processed.lower_wick.push(o.min(c) - l);
        }

        // Volume metrics.
        processed.avg_volume = rolling_mean(&processed.volume, self.params.volume.lookback_period);
        processed.volume_ratio = processed
            .volume
            .iter()
            .zip(&processed.avg_volume)
            .map(|(&v, &avg)| if avg.is_nan() || avg <= EPSILON { f64::NAN } else { v / avg })
            .collect();

        // Classifications.
        processed.volume_class = processed
            .volume_ratio
            .iter()
            .map(|&ratio| self.classify_volume(ratio))
            .collect();
        processed.candle_class = self.classify_candles(&processed);

        // Volatility and direction.
        processed.atr = self.calculate_atr(&processed.high, &processed.low, &processed.close);
        processed.price_direction =
            self.calculate_price_direction(&processed.close, &processed.atr);
        processed.obv = calculate_obv(&processed.close, &processed.volume);
        processed.volume_direction = self.calculate_volume_direction(&processed.obv);

        Ok(processed)
    }

    /// Map a volume ratio onto its class. NaN (warmup or zero baseline)
    /// classifies as `Average`.
    pub fn classify_volume(&self, ratio: f64) -> VolumeClass {
        let v = &self.params.volume;
        if ratio.is_nan() {
            VolumeClass::Average
        } else if ratio >= v.very_high_threshold - EPSILON {
            VolumeClass::VeryHigh
        } else if ratio >= v.high_threshold - EPSILON {
            VolumeClass::High
        } else if ratio >= v.low_threshold - EPSILON {
            VolumeClass::Average
        } else if ratio >= v.very_low_threshold - EPSILON {
            VolumeClass::Low
        } else {
            VolumeClass::VeryLow
        }
    }

    fn classify_candles(&self, processed: &Processed) -> Vec<CandleClass> {
        let c = &self.params.candle;
        let avg_spread = rolling_mean(&processed.spread, c.lookback_period);

        (0..processed.len())
            .map(|i| {
                let spread = processed.spread[i];
                let body = processed.body_percent[i];
                let avg = avg_spread[i];
                if avg.is_nan() {
                    return CandleClass::Neutral;
                }
                if body >= c.wide_body_threshold - EPSILON
                    && spread >= c.wide_spread_threshold * avg - EPSILON
                {
                    CandleClass::Wide
                } else if body <= c.narrow_body_threshold + EPSILON
                    && spread <= c.narrow_spread_threshold * avg + EPSILON
                {
                    CandleClass::Narrow
                } else if processed.upper_wick[i].max(processed.lower_wick[i])
                    > c.wick_ratio * spread
                {
                    CandleClass::Wick
                } else {
                    CandleClass::Neutral
                }
            })
            .collect()
    }

    /// Rolling mean of the true range over `atr_period`.
    pub fn calculate_atr(&self, high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
        let n = high.len();
        let mut tr = Vec::with_capacity(n);
        for i in 0..n {
            let mut range = high[i] - low[i];
            if i > 0 {
                let prev_close = close[i - 1];
                range = range
                    .max((high[i] - prev_close).abs())
                    .max((low[i] - prev_close).abs());
            }
            tr.push(range);
        }
        rolling_mean(&tr, self.params.trend.atr_period)
    }

    fn calculate_price_direction(&self, close: &[f64], atr: &[f64]) -> Vec<PriceDirection> {
        let t = &self.params.trend;
        let lookback = t.lookback_period;
        let smoothed_atr = rolling_mean(atr, lookback);
        let close_ema = if t.use_ema { ema(close, lookback) } else { Vec::new() };

        (0..close.len())
            .map(|i| {
                let change = if t.use_ema {
                    close[i] - close_ema[i]
                } else if i >= lookback {
                    close[i] - close[i - lookback]
                } else {
                    return PriceDirection::Sideways;
                };
                let threshold = smoothed_atr[i] * (t.direction_threshold_pct / 100.0);
                if threshold.is_nan() {
                    PriceDirection::Sideways
                } else if change > threshold + EPSILON {
                    PriceDirection::Up
                } else if change < -threshold - EPSILON {
                    PriceDirection::Down
                } else {
                    PriceDirection::Sideways
                }
            })
            .collect()
    }

    fn calculate_volume_direction(&self, obv: &[f64]) -> Vec<VolumeDirection> {
        let lookback = self.params.volume.lookback_period;
        let threshold_pct = self.params.trend.volume_change_threshold_pct;
        let avg_obv = rolling_mean(obv, lookback);

        (0..obv.len())
            .map(|i| {
                if i < lookback {
                    return VolumeDirection::Flat;
                }
                let change = obv[i] - obv[i - lookback];
                let threshold = avg_obv[i].abs() * (threshold_pct / 100.0);
                if threshold.is_nan() {
                    VolumeDirection::Flat
                } else if change > threshold + EPSILON {
                    VolumeDirection::Increasing
                } else if change < -threshold - EPSILON {
                    VolumeDirection::Decreasing
                } else {
                    VolumeDirection::Flat
                }
            })
            .collect()
    }
}

/// On-balance volume: signed running volume sum keyed on the close-to-close
/// change, seeded to zero.
pub fn calculate_obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut obv = Vec::with_capacity(close.len());
    if close.is_empty() {
        return obv;
    }
    obv.push(0.0);
    for i in 1..close.len() {
        let prev = obv[i - 1];
        let next = if close[i] > close[i - 1] {
            prev + volume[i]
        } else if close[i] < close[i - 1] {
            prev - volume[i]
        } else {
            prev
        };
        obv.push(next);
    }
    obv
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> Arc<Parameters> {
        let mut params = Parameters::default();
        // Short windows so small fixtures clear the warmup.
        params.volume.lookback_period = 3;
        params.candle.lookback_period = 3;
        params.trend.lookback_period = 2;
        params.trend.atr_period = 3;
        params.wyckoff.vol_lookback = 3;
        params.wyckoff.swing_n = 2;
        Arc::new(params)
    }

    fn flat_series(n: usize) -> (BarSeries, VolumeSeries) {
        let mut price = BarSeries::new();
        let mut volume = VolumeSeries::new();
        for i in 0..n {
            price.push(i as i64, 100.0, 101.0, 99.0, 100.0);
            volume.push(i as i64, 1000.0);
        }
        (price, volume)
    }

    #[test]
    fn test_feature_lengths_match() {
        let (price, volume) = flat_series(20);
        let processor = DataProcessor::new(test_params());
        let processed = processor.preprocess(&price, &volume).unwrap();

        let n = processed.len();
        assert_eq!(processed.spread.len(), n);
        assert_eq!(processed.body_percent.len(), n);
        assert_eq!(processed.upper_wick.len(), n);
        assert_eq!(processed.lower_wick.len(), n);
        assert_eq!(processed.avg_volume.len(), n);
        assert_eq!(processed.volume_ratio.len(), n);
        assert_eq!(processed.volume_class.len(), n);
        assert_eq!(processed.candle_class.len(), n);
        assert_eq!(processed.atr.len(), n);
        assert_eq!(processed.obv.len(), n);
        assert_eq!(processed.price_direction.len(), n);
        assert_eq!(processed.volume_direction.len(), n);
    }

    #[test]
    fn test_wick_spread_identity() {
        let mut price = BarSeries::new();
        let mut volume = VolumeSeries::new();
        for i in 0..20 {
            price.push(i as i64, 100.0, 104.0, 97.0, 102.0);
            volume.push(i as i64, 1000.0);
        }
        let processed = DataProcessor::new(test_params()).preprocess(&price, &volume).unwrap();
        for i in 0..processed.len() {
            let total =
                processed.upper_wick[i] + processed.lower_wick[i] + processed.spread[i];
            let range = processed.high[i] - processed.low[i];
            assert!((total - range).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&processed.body_percent[i]));
            assert!(processed.upper_wick[i] >= 0.0);
            assert!(processed.lower_wick[i] >= 0.0);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let (price, volume) = flat_series(4);
        let err = DataProcessor::new(test_params()).preprocess(&price, &volume).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_minimum_length_boundary() {
        let params = test_params();
        let need = params.min_required_bars();
        let processor = DataProcessor::new(params);

        let (price, volume) = flat_series(need);
        assert!(processor.preprocess(&price, &volume).is_ok());

        let (price, volume) = flat_series(need - 1);
        assert!(matches!(
            processor.preprocess(&price, &volume),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_zero_volume_classifies_average() {
        let mut price = BarSeries::new();
        let mut volume = VolumeSeries::new();
        for i in 0..20 {
            price.push(i as i64, 100.0, 101.0, 99.0, 100.0);
            volume.push(i as i64, 0.0);
        }
        let processed = DataProcessor::new(test_params()).preprocess(&price, &volume).unwrap();
        assert!(processed.volume_class.iter().all(|&c| c == VolumeClass::Average));
        assert!(processed.obv.iter().all(|&v| v == 0.0));
        assert!(processed.volume_direction.iter().all(|&d| d == VolumeDirection::Flat));
    }

    #[test]
    fn test_constant_price_is_sideways() {
        let (price, volume) = flat_series(30);
        let processed = DataProcessor::new(test_params()).preprocess(&price, &volume).unwrap();
        assert!(processed.price_direction.iter().all(|&d| d == PriceDirection::Sideways));
    }

    #[test]
    fn test_volume_classification_thresholds() {
        let processor = DataProcessor::new(test_params());
        assert_eq!(processor.classify_volume(2.5), VolumeClass::VeryHigh);
        assert_eq!(processor.classify_volume(2.0), VolumeClass::VeryHigh);
        assert_eq!(processor.classify_volume(1.5), VolumeClass::High);
        assert_eq!(processor.classify_volume(1.0), VolumeClass::Average);
        assert_eq!(processor.classify_volume(0.6), VolumeClass::Average);
        assert_eq!(processor.classify_volume(0.4), VolumeClass::Low);
        assert_eq!(processor.classify_volume(0.1), VolumeClass::VeryLow);
        assert_eq!(processor.classify_volume(f64::NAN), VolumeClass::Average);
    }

    #[test]
    fn test_classification_monotone_in_ratio() {
        let processor = DataProcessor::new(test_params());
        let ratios = [0.05, 0.2, 0.45, 0.8, 1.1, 1.4, 1.9, 2.3, 3.0];
        let ranks: Vec<u8> = ratios.iter().map(|&r| processor.classify_volume(r).rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_rolling_mean_warmup() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let means = rolling_mean(&values, 3);
        assert!(means[0].is_nan());
        assert!(means[1].is_nan());
        assert!((means[2] - 2.0).abs() < 1e-12);
        assert!((means[3] - 3.0).abs() < 1e-12);
        assert!((means[4] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_obv_signs() {
        let close = [10.0, 11.0, 10.5, 10.5, 12.0];
        let volume = [100.0, 200.0, 300.0, 400.0, 500.0];
        let obv = calculate_obv(&close, &volume);
        assert_eq!(obv, vec![0.0, 200.0, -100.0, -100.0, 400.0]);
    }

    #[test]
    fn test_ema_converges_towards_latest() {
        let values = [1.0, 1.0, 1.0, 10.0, 10.0, 10.0, 10.0, 10.0];
        let out = ema(&values, 3);
        assert_eq!(out[0], 1.0);
        assert!(out.last().unwrap() > &9.0);
    }

    #[test]
    fn test_determinism() {
        let (price, volume) = flat_series(30);
        let processor = DataProcessor::new(test_params());
        let first = processor.preprocess(&price, &volume).unwrap();
        let second = processor.preprocess(&price, &volume).unwrap();
        assert_eq!(first.volume_class, second.volume_class);
        assert_eq!(first.candle_class, second.candle_class);
        assert_eq!(first.price_direction, second.price_direction);
        assert_eq!(first.volume_direction, second.volume_direction);
        assert_eq!(first.obv, second.obv);
        // Rolling fields carry NaN during warmup, so compare bitwise.
        assert!(first
            .avg_volume
            .iter()
            .zip(&second.avg_volume)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}
