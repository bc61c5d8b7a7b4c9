//! Support and resistance levels from clustered close pivots.

use std::sync::Arc;

use crate::params::Parameters;
use crate::series::{Processed, EPSILON};
use crate::Result;

/// One clustered price level.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Median price of the contributing pivots.
    pub price: f64,
    /// Summed volume at the contributing pivots.
    pub weight: f64,
    /// Timestamp of the most recent contributing pivot.
    pub last_timestamp: i64,
    /// Number of pivots merged into this level.
    pub touches: usize,
}

/// Volume traded around a retained level.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAtLevel {
    pub level: f64,
    pub candle_count: usize,
    pub total_volume: f64,
    pub avg_volume: f64,
}

/// Clustered support/resistance levels for one timeframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupportResistance {
    pub support: Vec<Level>,
    pub resistance: Vec<Level>,
    pub volume_at_levels: Vec<VolumeAtLevel>,
}

#[derive(Debug, Clone, Copy)]
struct Pivot {
    price: f64,
    timestamp: i64,
    volume: f64,
}

/// Derives clustered pivot levels from recent swings and volume peaks.
#[derive(Debug, Clone)]
pub struct SupportResistanceAnalyzer {
    params: Arc<Parameters>,
}

impl SupportResistanceAnalyzer {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Build levels from the trailing lookback window of the bundle.
    pub fn analyze(&self, processed: &Processed) -> Result<SupportResistance> {
        let sr = &self.params.support_resistance;
        let n = processed.len();
        if n == 0 {
            return Ok(SupportResistance::default());
        }
        let start = n.saturating_sub(sr.lookback);
        let current_price = processed.close[n - 1];

        let lows = self.find_pivots(processed, start, true);
        let highs = self.find_pivots(processed, start, false);

        let mut support = self.cluster(&lows);
        let mut resistance = self.cluster(&highs);

        support.retain(|level| level.price < current_price);
        resistance.retain(|level| level.price > current_price);
        rank(&mut support);
        rank(&mut resistance);
        support.truncate(sr.max_levels);
        resistance.truncate(sr.max_levels);

        let volume_at_levels = self.volume_at_levels(processed, start, &support, &resistance);

        Ok(SupportResistance { support, resistance, volume_at_levels })
    }

    /// Local close extrema over a symmetric window of `pivot_window` bars.
    fn find_pivots(&self, processed: &Processed, start: usize, lows: bool) -> Vec<Pivot> {
        let k = self.params.support_resistance.pivot_window;
        let n = processed.len();
        let mut pivots = Vec::new();

        for i in (start + k)..n.saturating_sub(k) {
            let value = processed.close[i];
            let before = &processed.close[i - k..i];
            let after = &processed.close[i + 1..=i + k];
            let is_pivot = if lows {
                before.iter().all(|&c| value < c) && after.iter().all(|&c| value < c)
            } else {
                before.iter().all(|&c| value > c) && after.iter().all(|&c| value > c)
            };
            if is_pivot {
                pivots.push(Pivot {
                    price: value,
                    timestamp: processed.timestamps[i],
                    volume: processed.volume[i],
                });
            }
        }
        pivots
    }

    /// Merge pivots within the cluster tolerance into a single level whose
    /// price is the cluster median.
    fn cluster(&self, pivots: &[Pivot]) -> Vec<Level> {
        let tolerance = self.params.support_resistance.cluster_tolerance_pct;
        let mut sorted: Vec<Pivot> = pivots.to_vec();
        sorted.sort_by(|a, b| a.price.total_cmp(&b.price));

        let mut levels = Vec::new();
        let mut cluster: Vec<Pivot> = Vec::new();

        for pivot in sorted {
            let belongs = cluster.first().is_some_and(|anchor| {
                anchor.price > EPSILON
                    && (pivot.price - anchor.price).abs() / anchor.price <= tolerance
            });
            if cluster.is_empty() || belongs {
                cluster.push(pivot);
            } else {
                levels.push(close_cluster(&cluster));
                cluster = vec![pivot];
            }
        }
        if !cluster.is_empty() {
            levels.push(close_cluster(&cluster));
        }
        levels
    }

    fn volume_at_levels(
        &self,
        processed: &Processed,
        start: usize,
        support: &[Level],
        resistance: &[Level],
    ) -> Vec<VolumeAtLevel> {
        let mut prices: Vec<f64> =
            support.iter().chain(resistance.iter()).map(|level| level.price).collect();
        prices.sort_by(f64::total_cmp);

        prices
            .into_iter()
            .map(|price| {
                let mut candle_count = 0;
                let mut total_volume = 0.0;
                for i in start..processed.len() {
                    if processed.low[i] <= price && price <= processed.high[i] {
                        candle_count += 1;
                        total_volume += processed.volume[i];
                    }
                }
                let avg_volume =
                    if candle_count > 0 { total_volume / candle_count as f64 } else { 0.0 };
                VolumeAtLevel { level: price, candle_count, total_volume, avg_volume }
            })
            .collect()
    }
}

fn close_cluster(cluster: &[Pivot]) -> Level {
    let mut prices: Vec<f64> = cluster.iter().map(|p| p.price).collect();
    prices.sort_by(f64::total_cmp);
    let mid = prices.len() / 2;
    let median = if prices.len() % 2 == 1 {
        prices[mid]
    } else {
        (prices[mid - 1] + prices[mid]) / 2.0
    };
    Level {
        price: median,
        weight: cluster.iter().map(|p| p.volume).sum(),
        last_timestamp: cluster.iter().map(|p| p.timestamp).max().unwrap_or(0),
        touches: cluster.len(),
    }
}

/// Heaviest level first; recency breaks ties.
fn rank(levels: &mut [Level]) {
    levels.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| b.last_timestamp.cmp(&a.last_timestamp))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CandleClass, PriceDirection, VolumeClass, VolumeDirection};

    fn bundle(rows: Vec<(f64, f64, f64, f64, f64)>) -> Processed {
        let n = rows.len();
        let mut processed = Processed {
            timestamps: (0..n as i64).collect(),
            volume_class: vec![VolumeClass::Average; n],
            candle_class: vec![CandleClass::Neutral; n],
            price_direction: vec![PriceDirection::Sideways; n],
            volume_direction: vec![VolumeDirection::Flat; n],
            avg_volume: vec![f64::NAN; n],
            volume_ratio: vec![f64::NAN; n],
            atr: vec![f64::NAN; n],
            obv: vec![0.0; n],
            ..Processed::default()
        };
        for (o, h, l, c, v) in rows {
            processed.open.push(o);
            processed.high.push(h);
            processed.low.push(l);
            processed.close.push(c);
            processed.volume.push(v);
            processed.spread.push((c - o).abs());
            processed.body_percent.push(0.5);
            processed.upper_wick.push(h - o.max(c));
            processed.lower_wick.push(o.min(c) - l);
        }
        processed
    }

    /// Closes with a valley at 95 (twice) and a peak at 110, ending at 100.
    fn pivot_rows() -> Vec<(f64, f64, f64, f64, f64)> {
        let closes = [
            100.0, 98.0, 95.0, 98.0, 101.0, 105.0, 110.0, 106.0, 101.0, 98.0, 95.2, 98.5, 100.0,
            100.5, 100.0,
        ];
        closes.iter().map(|&c| (c, c + 1.0, c - 1.0, c, 1000.0)).collect()
    }

    fn analyzer() -> SupportResistanceAnalyzer {
        SupportResistanceAnalyzer::new(Arc::new(Parameters::default()))
    }

    #[test]
    fn test_pivot_levels_found() {
        let processed = bundle(pivot_rows());
        let sr = analyzer().analyze(&processed).unwrap();

        assert!(!sr.support.is_empty());
        assert!(!sr.resistance.is_empty());
        // The two valley closes (95.0, 95.2) cluster into one level below
        // the current price; the 110 peak sits above it.
        let valley = &sr.support[0];
        assert!((valley.price - 95.1).abs() < 0.2);
        assert_eq!(valley.touches, 2);
        assert!((sr.resistance[0].price - 110.0).abs() < EPSILON);
    }

    #[test]
    fn test_levels_split_by_current_price() {
        let processed = bundle(pivot_rows());
        let sr = analyzer().analyze(&processed).unwrap();
        let current = processed.last_close().unwrap();
        assert!(sr.support.iter().all(|level| level.price < current));
        assert!(sr.resistance.iter().all(|level| level.price > current));
    }

    #[test]
    fn test_volume_at_levels_counts_overlapping_bars() {
        let processed = bundle(pivot_rows());
        let sr = analyzer().analyze(&processed).unwrap();
        for entry in &sr.volume_at_levels {
            assert!(entry.candle_count > 0);
            assert!(entry.total_volume > 0.0);
            assert!((entry.avg_volume - entry.total_volume / entry.candle_count as f64).abs()
                < EPSILON);
        }
    }

    #[test]
    fn test_cluster_weight_sums_volume() {
        let mut rows = pivot_rows();
        // Boost volume at the second valley pivot (index 10).
        rows[10].4 = 5000.0;
        let processed = bundle(rows);
        let sr = analyzer().analyze(&processed).unwrap();
        assert!((sr.support[0].weight - 6000.0).abs() < EPSILON);
    }

    #[test]
    fn test_empty_bundle_yields_no_levels() {
        let processed = bundle(vec![]);
        let sr = analyzer().analyze(&processed).unwrap();
        assert!(sr.support.is_empty());
        assert!(sr.resistance.is_empty());
    }
}
