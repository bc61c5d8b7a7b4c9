//! Signal synthesis and risk assessment.
//!
//! The signal generator collapses the multi-timeframe report into a single
//! typed signal with supporting evidence; the risk assessor turns a
//! buy/sell signal plus the primary timeframe's levels into stop, target,
//! R:R and position size. Neither ever fails: a synthesis problem degrades
//! to `NO_ACTION` with an explanatory detail string.

use std::sync::Arc;

use tracing::debug;

use crate::analyzers::SupportResistance;
use crate::multi_timeframe::{Confirmations, MultiTimeframeReport, TimeframeAnalysis};
use crate::params::Parameters;
use crate::series::EPSILON;
use crate::{SignalBias, SignalStrength, SignalType, TrendDirection, VolumeClass};

// ============================================================
// SIGNAL GENERATOR
// ============================================================

/// Per-timeframe excerpt carried as signal evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeEvidence {
    pub timeframe: String,
    pub trend_direction: TrendDirection,
    pub volume_class: VolumeClass,
    pub candle_signal: SignalType,
    pub patterns: Vec<String>,
    pub details: String,
}

/// Structured evidence behind a signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalEvidence {
    pub per_timeframe: Vec<TimeframeEvidence>,
    pub confirmations: Confirmations,
    /// Weighted average of per-timeframe bullishness, in [0, 1].
    pub confidence_score: f64,
}

/// The consolidated multi-timeframe signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub details: String,
    pub evidence: SignalEvidence,
}

impl Signal {
    /// The degraded signal used when synthesis cannot complete.
    pub fn no_action(details: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::NoAction,
            strength: SignalStrength::Neutral,
            details: details.into(),
            evidence: SignalEvidence::default(),
        }
    }
}

/// Collapses per-timeframe analyses into one typed signal.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    params: Arc<Parameters>,
}

impl SignalGenerator {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Apply the alignment rule ladder. Never fails; an empty report yields
    /// `NO_ACTION`.
    pub fn generate(&self, report: &MultiTimeframeReport) -> Signal {
        if report.analyses.is_empty() {
            return Signal::no_action("no timeframe produced a usable analysis");
        }

        let s = &self.params.signal;
        let c = &report.confirmations;

        let (signal_type, strength, details) = if c.bullish_alignment
            >= s.strong_alignment_pct - EPSILON
            && c.volume_confirmation
            && c.bullish_pattern_confirmation
        {
            (
                SignalType::Buy,
                SignalStrength::Strong,
                "Strong buy signal confirmed across multiple timeframes",
            )
        } else if c.bearish_alignment >= s.strong_alignment_pct - EPSILON
            && c.volume_confirmation
            && c.bearish_pattern_confirmation
        {
            (
                SignalType::Sell,
                SignalStrength::Strong,
                "Strong sell signal confirmed across multiple timeframes",
            )
        } else if c.bullish_alignment >= s.moderate_alignment_pct - EPSILON
            && (c.volume_confirmation || c.bullish_pattern_confirmation)
        {
            (
                SignalType::Buy,
                SignalStrength::Moderate,
                "Moderate buy signal with partial timeframe confirmation",
            )
        } else if c.bearish_alignment >= s.moderate_alignment_pct - EPSILON
            && (c.volume_confirmation || c.bearish_pattern_confirmation)
        {
            (
                SignalType::Sell,
                SignalStrength::Moderate,
                "Moderate sell signal with partial timeframe confirmation",
            )
        } else {
            (SignalType::NoAction, SignalStrength::Neutral, "No clear signal detected")
        };

        debug!(?signal_type, ?strength, "signal generated");
        Signal {
            signal_type,
            strength,
            details: details.to_string(),
            evidence: self.gather_evidence(report),
        }
    }

    fn gather_evidence(&self, report: &MultiTimeframeReport) -> SignalEvidence {
        let per_timeframe = report
            .analyses
            .iter()
            .map(|(timeframe, analysis)| {
                let mut patterns = Vec::new();
                let p = &analysis.pattern_analysis;
                if p.accumulation.detected {
                    patterns.push("accumulation".to_string());
                }
                if p.distribution.detected {
                    patterns.push("distribution".to_string());
                }
                if p.buying_climax.detected {
                    patterns.push("buying climax".to_string());
                }
                if p.selling_climax.detected {
                    patterns.push("selling climax".to_string());
                }
                if p.testing.detected {
                    patterns.push(format!("{} level tests", p.testing.tests.len()));
                }
                TimeframeEvidence {
                    timeframe: timeframe.clone(),
                    trend_direction: analysis.trend_analysis.trend_direction,
                    volume_class: analysis
                        .processed_data
                        .volume_class
                        .last()
                        .copied()
                        .unwrap_or(VolumeClass::Average),
                    candle_signal: analysis.candle_analysis.signal_type,
                    patterns,
                    details: analysis.trend_analysis.details.clone(),
                }
            })
            .collect();

        SignalEvidence {
            per_timeframe,
            confirmations: report.confirmations.clone(),
            confidence_score: confidence_score(&report.analyses),
        }
    }
}

/// Average per-timeframe bullishness mapped onto [0, 1]; 0.5 is neutral.
fn confidence_score(analyses: &[(String, TimeframeAnalysis)]) -> f64 {
    if analyses.is_empty() {
        return 0.5;
    }
    let total: f64 = analyses
        .iter()
        .map(|(_, analysis)| {
            let mut score: f64 = 0.0;
            let weight = match analysis.candle_analysis.strength {
                SignalStrength::Strong => 1.0,
                SignalStrength::Moderate => 0.6,
                SignalStrength::Neutral => 0.0,
            };
            match analysis.candle_analysis.signal_type {
                SignalType::Buy => score += weight,
                SignalType::Sell => score -= weight,
                SignalType::NoAction => {}
            }
            match analysis.trend_analysis.signal_strength {
                SignalBias::Bullish => score += 0.5,
                SignalBias::Bearish => score -= 0.5,
                SignalBias::Neutral => {}
            }
            let p = &analysis.pattern_analysis;
            if p.accumulation.detected {
                score += 0.5;
            }
            if p.selling_climax.detected {
                score += 0.5;
            }
            if p.distribution.detected {
                score -= 0.5;
            }
            if p.buying_climax.detected {
                score -= 0.5;
            }
            score.clamp(-1.0, 1.0)
        })
        .sum();
    let mean = total / analyses.len() as f64;
    (mean + 1.0) / 2.0
}

// ============================================================
// RISK ASSESSOR
// ============================================================

/// Stop, target and sizing for an actionable signal.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub position_size: f64,
    pub risk_per_share: f64,
}

/// Derives a risk assessment from a signal, the current price and the
/// primary timeframe's support/resistance levels.
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    params: Arc<Parameters>,
}

impl RiskAssessor {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// `None` for a `NO_ACTION` signal; otherwise a full assessment.
    pub fn assess(
        &self,
        signal: &Signal,
        current_price: f64,
        support_resistance: &SupportResistance,
    ) -> Option<RiskAssessment> {
        let r = &self.params.risk;

        let (stop_loss, take_profit) = match signal.signal_type {
            SignalType::NoAction => return None,
            SignalType::Buy => {
                // Stop below the nearest support; target just under the
                // nearest resistance.
                let stop = nearest_below(&support_resistance.support, current_price)
                    .map(|level| level * (1.0 - r.stop_buffer_pct))
                    .unwrap_or(current_price * (1.0 - r.default_stop_pct));
                let target = nearest_above(&support_resistance.resistance, current_price)
                    .map(|level| level * (1.0 - r.stop_buffer_pct))
                    .unwrap_or(
                        current_price * (1.0 + r.default_stop_pct * r.default_risk_reward),
                    );
                (stop, target)
            }
            SignalType::Sell => {
                let stop = nearest_above(&support_resistance.resistance, current_price)
                    .map(|level| level * (1.0 + r.stop_buffer_pct))
                    .unwrap_or(current_price * (1.0 + r.default_stop_pct));
                let target = nearest_below(&support_resistance.support, current_price)
                    .map(|level| level * (1.0 + r.stop_buffer_pct))
                    .unwrap_or(
                        current_price * (1.0 - r.default_stop_pct * r.default_risk_reward),
                    );
                (stop, target)
            }
        };

        let risk_per_share = (current_price - stop_loss).abs();
        let position_size = if risk_per_share > EPSILON {
            (self.params.account.account_equity * r.default_risk_percent / risk_per_share)
                .floor()
                .max(0.0)
        } else {
            0.0
        };
        let risk_reward_ratio = if risk_per_share > EPSILON {
            (take_profit - current_price).abs() / risk_per_share
        } else {
            0.0
        };

        Some(RiskAssessment {
            stop_loss,
            take_profit,
            risk_reward_ratio,
            position_size,
            risk_per_share,
        })
    }
}

fn nearest_below(levels: &[crate::analyzers::Level], price: f64) -> Option<f64> {
    levels
        .iter()
        .map(|level| level.price)
        .filter(|&p| p < price)
        .max_by(f64::total_cmp)
}

fn nearest_above(levels: &[crate::analyzers::Level], price: f64) -> Option<f64> {
    levels
        .iter()
        .map(|level| level.price)
        .filter(|&p| p > price)
        .min_by(f64::total_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::Level;

    fn level(price: f64) -> Level {
        Level { price, weight: 1000.0, last_timestamp: 0, touches: 1 }
    }

    fn buy_signal() -> Signal {
        Signal {
            signal_type: SignalType::Buy,
            strength: SignalStrength::Moderate,
            details: String::new(),
            evidence: SignalEvidence::default(),
        }
    }

    fn sell_signal() -> Signal {
        Signal { signal_type: SignalType::Sell, ..buy_signal() }
    }

    fn assessor(stop_pct: f64, reward: f64) -> RiskAssessor {
        let mut params = Parameters::default();
        params.risk.default_stop_pct = stop_pct;
        params.risk.default_risk_reward = reward;
        RiskAssessor::new(Arc::new(params))
    }

    #[test]
    fn test_no_action_has_no_assessment() {
        let assessment = assessor(0.02, 2.0).assess(
            &Signal::no_action("nothing"),
            100.0,
            &SupportResistance::default(),
        );
        assert!(assessment.is_none());
    }

    #[test]
    fn test_buy_fallback_with_no_levels() {
        // No support/resistance: 3% stop, 2x reward target.
        let assessment = assessor(0.03, 2.0)
            .assess(&buy_signal(), 100.0, &SupportResistance::default())
            .unwrap();
        assert!((assessment.stop_loss - 97.0).abs() < 1e-9);
        assert!((assessment.take_profit - 106.0).abs() < 1e-9);
        assert!((assessment.risk_reward_ratio - 2.0).abs() < 1e-9);
        assert!((assessment.risk_per_share - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_uses_nearest_support_and_resistance() {
        let sr = SupportResistance {
            support: vec![level(95.0), level(90.0)],
            resistance: vec![level(108.0), level(115.0)],
            volume_at_levels: Vec::new(),
        };
        let assessment = assessor(0.02, 2.0).assess(&buy_signal(), 100.0, &sr).unwrap();
        // Stop sits just under the nearest support (95), target just under
        // the nearest resistance (108).
        assert!((assessment.stop_loss - 95.0 * 0.995).abs() < 1e-9);
        assert!((assessment.take_profit - 108.0 * 0.995).abs() < 1e-9);
        assert!(assessment.risk_per_share > 0.0);
    }

    #[test]
    fn test_sell_uses_nearest_resistance_and_support() {
        let sr = SupportResistance {
            support: vec![level(41.87)],
            resistance: vec![level(52.57), level(60.0)],
            volume_at_levels: Vec::new(),
        };
        let assessment = assessor(0.02, 2.0).assess(&sell_signal(), 51.56, &sr).unwrap();
        assert!((assessment.stop_loss - 52.57 * 1.005).abs() < 1e-9);
        assert!((assessment.take_profit - 41.87 * 1.005).abs() < 1e-9);
        assert!(assessment.risk_reward_ratio > 5.0);
    }

    #[test]
    fn test_position_size_floors() {
        // Equity 10_000, risk 1% -> $100; risk per share 3 -> 33 shares.
        let assessment = assessor(0.03, 2.0)
            .assess(&buy_signal(), 100.0, &SupportResistance::default())
            .unwrap();
        assert!((assessment.position_size - 33.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_risk_yields_zero_ratio() {
        // A support level exactly at the current price with no buffer.
        let mut params = Parameters::default();
        params.risk.stop_buffer_pct = 0.0;
        let assessor = RiskAssessor::new(Arc::new(params));
        let sr = SupportResistance {
            support: vec![level(100.0 - 1e-12)],
            resistance: Vec::new(),
            volume_at_levels: Vec::new(),
        };
        let assessment = assessor.assess(&buy_signal(), 100.0, &sr).unwrap();
        assert_eq!(assessment.risk_reward_ratio, 0.0);
        assert_eq!(assessment.position_size, 0.0);
    }
}
