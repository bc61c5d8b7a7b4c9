//! Columnar bar series and the processed feature bundle.
//!
//! Price and volume arrive as two independently indexed series; everything
//! downstream operates on a single aligned, columnar [`Processed`] bundle in
//! which every field shares the timestamp index. Keeping the features as a
//! struct of arrays makes the alignment invariant structural: a `Processed`
//! value cannot hold series of differing lengths without a bug in this
//! module.

use crate::{AnalysisError, CandleClass, PriceDirection, Result, VolumeClass, VolumeDirection};

/// Absolute tolerance for floating-point threshold comparisons.
pub const EPSILON: f64 = 1e-9;

// ============================================================
// RAW SERIES
// ============================================================

/// OHLC price series indexed by ascending epoch-second timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarSeries {
    pub timestamps: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(n),
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, timestamp: i64, open: f64, high: f64, low: f64, close: f64) {
        self.timestamps.push(timestamp);
        self.open.push(open);
        self.high.push(high);
        self.low.push(low);
        self.close.push(close);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// A copy containing only bars at or before `cutoff`.
    pub fn truncated_at(&self, cutoff: i64) -> Self {
        let n = self.timestamps.partition_point(|&ts| ts <= cutoff);
        Self {
            timestamps: self.timestamps[..n].to_vec(),
            open: self.open[..n].to_vec(),
            high: self.high[..n].to_vec(),
            low: self.low[..n].to_vec(),
            close: self.close[..n].to_vec(),
        }
    }

    /// Check timestamp ordering and price sanity.
    pub fn validate(&self) -> Result<()> {
        check_index(&self.timestamps)?;
        for i in 0..self.len() {
            for value in [self.open[i], self.high[i], self.low[i], self.close[i]] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(AnalysisError::DataIntegrity {
                        index: i,
                        reason: "non-finite or non-positive price",
                    });
                }
            }
            if self.high[i] < self.low[i] {
                return Err(AnalysisError::DataIntegrity { index: i, reason: "high below low" });
            }
        }
        Ok(())
    }
}

/// Volume series indexed by ascending epoch-second timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeSeries {
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl VolumeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, timestamp: i64, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// A copy containing only entries at or before `cutoff`.
    pub fn truncated_at(&self, cutoff: i64) -> Self {
        let n = self.timestamps.partition_point(|&ts| ts <= cutoff);
        Self { timestamps: self.timestamps[..n].to_vec(), values: self.values[..n].to_vec() }
    }

    pub fn validate(&self) -> Result<()> {
        check_index(&self.timestamps)?;
        for (i, &value) in self.values.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::DataIntegrity {
                    index: i,
                    reason: "non-finite or negative volume",
                });
            }
        }
        Ok(())
    }
}

fn check_index(timestamps: &[i64]) -> Result<()> {
    for i in 1..timestamps.len() {
        if timestamps[i] == timestamps[i - 1] {
            return Err(AnalysisError::DataIntegrity { index: i, reason: "duplicate timestamp" });
        }
        if timestamps[i] < timestamps[i - 1] {
            return Err(AnalysisError::DataIntegrity {
                index: i,
                reason: "timestamps not ascending",
            });
        }
    }
    Ok(())
}

// ============================================================
// ALIGNMENT
// ============================================================

/// Price and volume joined on their shared timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedBars {
    pub timestamps: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl AlignedBars {
    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Inner-join price and volume on timestamp, dropping unmatched rows.
///
/// Both inputs are validated first; duplicate or out-of-order timestamps and
/// bad values surface as [`AnalysisError::DataIntegrity`]. An empty join
/// result is reported as [`AnalysisError::InsufficientData`].
pub fn align(price: &BarSeries, volume: &VolumeSeries) -> Result<AlignedBars> {
    price.validate()?;
    volume.validate()?;

    let mut aligned = AlignedBars::default();
    let (mut i, mut j) = (0, 0);
    while i < price.len() && j < volume.len() {
        let (pt, vt) = (price.timestamps[i], volume.timestamps[j]);
        if pt == vt {
            aligned.timestamps.push(pt);
            aligned.open.push(price.open[i]);
            aligned.high.push(price.high[i]);
            aligned.low.push(price.low[i]);
            aligned.close.push(price.close[i]);
            aligned.volume.push(volume.values[j]);
            i += 1;
            j += 1;
        } else if pt < vt {
            i += 1;
        } else {
            j += 1;
        }
    }

    if aligned.is_empty() {
        return Err(AnalysisError::InsufficientData { need: 1, got: 0 });
    }
    Ok(aligned)
}

// ============================================================
// PROCESSED BUNDLE
// ============================================================

/// All per-bar features derived by the processor, columnar and aligned.
///
/// Only the leading `lookback - 1` entries of rolling fields may be NaN;
/// categorical fields default to their neutral variants during warmup, so
/// consumers never need to special-case missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Processed {
    pub timestamps: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub spread: Vec<f64>,
    pub body_percent: Vec<f64>,
    pub upper_wick: Vec<f64>,
    pub lower_wick: Vec<f64>,
    pub avg_volume: Vec<f64>,
    pub volume_ratio: Vec<f64>,
    pub volume_class: Vec<VolumeClass>,
    pub candle_class: Vec<CandleClass>,
    pub atr: Vec<f64>,
    pub obv: Vec<f64>,
    pub price_direction: Vec<PriceDirection>,
    pub volume_direction: Vec<VolumeDirection>,
}

impl Processed {
    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Index of the most recent bar.
    pub fn last_index(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    /// Bounds-checked close accessor.
    pub fn close_at(&self, index: usize) -> Result<f64> {
        self.close
            .get(index)
            .copied()
            .ok_or(AnalysisError::IndexOutOfRange { index, len: self.len() })
    }

    /// True when the bar closed above its open.
    pub fn is_up_bar(&self, index: usize) -> bool {
        index < self.len() && self.close[index] > self.open[index]
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn price(rows: &[(i64, f64, f64, f64, f64)]) -> BarSeries {
        let mut series = BarSeries::new();
        for &(ts, o, h, l, c) in rows {
            series.push(ts, o, h, l, c);
        }
        series
    }

    fn volume(rows: &[(i64, f64)]) -> VolumeSeries {
        let mut series = VolumeSeries::new();
        for &(ts, v) in rows {
            series.push(ts, v);
        }
        series
    }

    #[test]
    fn test_align_inner_join_drops_unmatched() {
        let p = price(&[
            (1, 10.0, 11.0, 9.0, 10.5),
            (2, 10.5, 11.5, 10.0, 11.0),
            (3, 11.0, 12.0, 10.5, 11.5),
        ]);
        let v = volume(&[(2, 100.0), (3, 200.0), (4, 300.0)]);

        let aligned = align(&p, &v).unwrap();
        assert_eq!(aligned.timestamps, vec![2, 3]);
        assert_eq!(aligned.volume, vec![100.0, 200.0]);
        assert_eq!(aligned.close, vec![11.0, 11.5]);
    }

    #[test]
    fn test_align_empty_join_is_insufficient_data() {
        let p = price(&[(1, 10.0, 11.0, 9.0, 10.5)]);
        let v = volume(&[(2, 100.0)]);
        assert!(matches!(
            align(&p, &v),
            Err(AnalysisError::InsufficientData { got: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let p = price(&[(1, 10.0, 11.0, 9.0, 10.5), (1, 10.5, 11.5, 10.0, 11.0)]);
        let v = volume(&[(1, 100.0)]);
        assert!(matches!(align(&p, &v), Err(AnalysisError::DataIntegrity { .. })));
    }

    #[test]
    fn test_out_of_order_timestamp_rejected() {
        let p = price(&[(2, 10.0, 11.0, 9.0, 10.5), (1, 10.5, 11.5, 10.0, 11.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_bad_prices_rejected() {
        let p = price(&[(1, 10.0, 9.0, 11.0, 10.5)]); // high < low
        assert!(p.validate().is_err());

        let p = price(&[(1, f64::NAN, 11.0, 9.0, 10.5)]);
        assert!(p.validate().is_err());

        let p = price(&[(1, -5.0, 11.0, 9.0, 10.5)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_negative_volume_rejected() {
        let v = volume(&[(1, -1.0)]);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_truncated_at() {
        let p = price(&[
            (1, 10.0, 11.0, 9.0, 10.5),
            (2, 10.5, 11.5, 10.0, 11.0),
            (3, 11.0, 12.0, 10.5, 11.5),
        ]);
        let cut = p.truncated_at(2);
        assert_eq!(cut.len(), 2);
        assert_eq!(cut.timestamps, vec![1, 2]);

        let v = volume(&[(1, 10.0), (2, 20.0), (3, 30.0)]);
        assert_eq!(v.truncated_at(2).values, vec![10.0, 20.0]);
    }
}
