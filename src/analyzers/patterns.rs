//! Window-based pattern recognition: accumulation, distribution, testing
//! and climactic action.
//!
//! All detectors vote over a trailing window ending at the bar under
//! analysis; thresholds come from [`PatternParameters`].
//!
//! [`PatternParameters`]: crate::params::PatternParameters

use std::sync::Arc;

use crate::params::Parameters;
use crate::series::{Processed, EPSILON};
use crate::{AnalysisError, CandleClass, LevelTestKind, Result, VolumeClass};

/// Fraction of the body a climax wick must exceed.
const CLIMAX_WICK_FRACTION: f64 = 0.25;

/// Nearby-bar horizon when matching a level test against prior extremes.
const TEST_LOOKBEHIND: usize = 5;

/// Detection outcome for a single pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDetection {
    pub detected: bool,
    pub strength: u32,
    pub details: String,
}

impl PatternDetection {
    fn absent(details: impl Into<String>) -> Self {
        Self { detected: false, strength: 0, details: details.into() }
    }
}

/// One support/resistance test inside the window.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTest {
    pub timestamp: i64,
    pub kind: LevelTestKind,
    pub price: f64,
}

/// Testing-pattern outcome: the individual tests plus a capped strength.
#[derive(Debug, Clone, PartialEq)]
pub struct TestingDetection {
    pub detected: bool,
    pub strength: u32,
    pub details: String,
    pub tests: Vec<LevelTest>,
}

/// All pattern detections for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternAnalysis {
    pub accumulation: PatternDetection,
    pub distribution: PatternDetection,
    pub testing: TestingDetection,
    pub buying_climax: PatternDetection,
    pub selling_climax: PatternDetection,
}

/// Recognizes volume-price patterns over a trailing window.
#[derive(Debug, Clone)]
pub struct PatternRecognizer {
    params: Arc<Parameters>,
}

impl PatternRecognizer {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Run all detectors over the window ending at `index`.
    pub fn identify_patterns(&self, processed: &Processed, index: usize) -> Result<PatternAnalysis> {
        if index >= processed.len() {
            return Err(AnalysisError::IndexOutOfRange { index, len: processed.len() });
        }
        let start = index.saturating_sub(self.params.pattern.pattern_window);

        Ok(PatternAnalysis {
            accumulation: self.detect_accumulation(processed, start, index),
            distribution: self.detect_distribution(processed, start, index),
            testing: self.detect_testing(processed, start, index),
            buying_climax: self.detect_buying_climax(processed, start, index),
            selling_climax: self.detect_selling_climax(processed, start, index),
        })
    }

    fn is_sideways(&self, processed: &Processed, start: usize, end: usize) -> bool {
        let closes = &processed.close[start..=end];
        let max = closes.iter().cloned().fold(f64::MIN, f64::max);
        let min = closes.iter().cloned().fold(f64::MAX, f64::min);
        let mean = closes.iter().sum::<f64>() / closes.len() as f64;
        if mean.abs() <= EPSILON {
            return false;
        }
        (max - min) / mean <= self.params.pattern.sideways_pct + EPSILON
    }

    fn high_volume_count(&self, processed: &Processed, start: usize, end: usize) -> usize {
        processed.volume_class[start..=end]
            .iter()
            .filter(|c| matches!(c, VolumeClass::High | VolumeClass::VeryHigh))
            .count()
    }

    /// Bars whose low touches the running support (prefix low) within the
    /// tolerance and close back above it.
    fn count_support_tests(&self, processed: &Processed, start: usize, end: usize) -> usize {
        let tolerance = self.params.pattern.touch_tolerance_pct;
        let mut support = processed.low[start];
        let mut tests = 0;
        for i in start + 1..=end {
            let low = processed.low[i];
            if support > EPSILON
                && (low - support).abs() / support <= tolerance
                && processed.close[i] > support
            {
                tests += 1;
            }
            support = support.min(low);
        }
        tests
    }

    fn count_resistance_tests(&self, processed: &Processed, start: usize, end: usize) -> usize {
        let tolerance = self.params.pattern.touch_tolerance_pct;
        let mut resistance = processed.high[start];
        let mut tests = 0;
        for i in start + 1..=end {
            let high = processed.high[i];
            if resistance > EPSILON
                && (high - resistance).abs() / resistance <= tolerance
                && processed.close[i] < resistance
            {
                tests += 1;
            }
            resistance = resistance.max(high);
        }
        tests
    }

    fn vote_strength(&self, votes: usize) -> u32 {
        (votes / self.params.pattern.strength_scale).clamp(1, 3) as u32
    }

    fn detect_accumulation(&self, processed: &Processed, start: usize, end: usize) -> PatternDetection {
        let p = &self.params.pattern;
        let sideways = self.is_sideways(processed, start, end);
        let high_volume = self.high_volume_count(processed, start, end);
        let support_tests = self.count_support_tests(processed, start, end);

        let detected = high_volume >= p.min_high_vol && support_tests >= p.min_tests;
        let details = format!(
            "sideways: {sideways}, high volume bars: {high_volume}, support tests: {support_tests}"
        );
        if detected {
            PatternDetection {
                detected,
                strength: self.vote_strength(high_volume.min(support_tests)),
                details,
            }
        } else {
            PatternDetection::absent(details)
        }
    }

    fn detect_distribution(&self, processed: &Processed, start: usize, end: usize) -> PatternDetection {
        let p = &self.params.pattern;
        let sideways = self.is_sideways(processed, start, end);
        let high_volume = self.high_volume_count(processed, start, end);
        let resistance_tests = self.count_resistance_tests(processed, start, end);

        let detected = high_volume >= p.min_high_vol && resistance_tests >= p.min_tests;
        let details = format!(
            "sideways: {sideways}, high volume bars: {high_volume}, resistance tests: \
             {resistance_tests}"
        );
        if detected {
            PatternDetection {
                detected,
                strength: self.vote_strength(high_volume.min(resistance_tests)),
                details,
            }
        } else {
            PatternDetection::absent(details)
        }
    }

    fn detect_testing(&self, processed: &Processed, start: usize, end: usize) -> TestingDetection {
        let tolerance = self.params.pattern.touch_tolerance_pct;
        let mut tests = Vec::new();

        for i in start + 1..=end {
            let behind = i.saturating_sub(TEST_LOOKBEHIND).max(start);

            // A low revisiting a recent low on quiet volume.
            let low = processed.low[i];
            let retests_low = (behind..i).any(|j| {
                let prior = processed.low[j];
                prior > EPSILON && (low - prior).abs() / prior < tolerance
            });
            if retests_low && processed.volume_class[i].is_low() {
                tests.push(LevelTest {
                    timestamp: processed.timestamps[i],
                    kind: LevelTestKind::SupportTest,
                    price: low,
                });
            }

            // A high revisiting a recent high on quiet volume.
            let high = processed.high[i];
            let retests_high = (behind..i).any(|j| {
                let prior = processed.high[j];
                prior > EPSILON && (high - prior).abs() / prior < tolerance
            });
            if retests_high && processed.volume_class[i].is_low() {
                tests.push(LevelTest {
                    timestamp: processed.timestamps[i],
                    kind: LevelTestKind::ResistanceTest,
                    price: high,
                });
            }
        }

        tests.sort_by_key(|t| t.timestamp);
        let strength = tests.len().min(self.params.pattern.max_tests) as u32;
        TestingDetection {
            detected: !tests.is_empty(),
            strength,
            details: format!("found {} level tests", tests.len()),
            tests,
        }
    }

    fn detect_buying_climax(&self, processed: &Processed, start: usize, end: usize) -> PatternDetection {
        let band = self.params.pattern.climax_band_pct;
        let window_high =
            processed.high[start..=end].iter().cloned().fold(f64::MIN, f64::max);

        let near_high = processed.close[end] >= window_high * (1.0 - band) - EPSILON;
        let very_high_volume = processed.volume_class[end] == VolumeClass::VeryHigh;
        let wide_up =
            processed.candle_class[end] == CandleClass::Wide && processed.is_up_bar(end);
        let upper_wick =
            processed.upper_wick[end] > processed.spread[end] * CLIMAX_WICK_FRACTION;

        let strength =
            [near_high, very_high_volume, wide_up, upper_wick].iter().filter(|&&c| c).count()
                as u32;
        PatternDetection {
            detected: strength >= 3,
            strength,
            details: format!(
                "near high: {near_high}, very high volume: {very_high_volume}, wide up candle: \
                 {wide_up}, upper wick: {upper_wick}"
            ),
        }
    }

    fn detect_selling_climax(&self, processed: &Processed, start: usize, end: usize) -> PatternDetection {
        let band = self.params.pattern.climax_band_pct;
        let window_low = processed.low[start..=end].iter().cloned().fold(f64::MAX, f64::min);

        let near_low = processed.close[end] <= window_low * (1.0 + band) + EPSILON;
        let very_high_volume = processed.volume_class[end] == VolumeClass::VeryHigh;
        let wide_down = processed.candle_class[end] == CandleClass::Wide
            && processed.close[end] < processed.open[end];
        let lower_wick =
            processed.lower_wick[end] > processed.spread[end] * CLIMAX_WICK_FRACTION;

        let strength =
            [near_low, very_high_volume, wide_down, lower_wick].iter().filter(|&&c| c).count()
                as u32;
        PatternDetection {
            detected: strength >= 3,
            strength,
            details: format!(
                "near low: {near_low}, very high volume: {very_high_volume}, wide down candle: \
                 {wide_down}, lower wick: {lower_wick}"
            ),
        }
    }
}
