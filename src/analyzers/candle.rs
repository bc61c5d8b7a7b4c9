//! Single-bar candle analysis.

use crate::series::Processed;
use crate::{
    AnalysisError, CandleClass, Result, SignalStrength, SignalType, PriceDirection, VolumeClass,
};

/// Signal derived from a single bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSignal {
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub candle_class: CandleClass,
    pub volume_class: VolumeClass,
    pub price_direction: PriceDirection,
    pub details: String,
}

/// Classifies one bar from its candle class, volume class and local
/// direction. The rules read only the precomputed classifications and are
/// evaluated top-down; the first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleAnalyzer;

impl CandleAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_bar(&self, index: usize, processed: &Processed) -> Result<BarSignal> {
        if index >= processed.len() {
            return Err(AnalysisError::IndexOutOfRange { index, len: processed.len() });
        }

        let candle_class = processed.candle_class[index];
        let volume_class = processed.volume_class[index];
        let price_direction = processed.price_direction[index];
        let high_volume = volume_class.is_high();
        let low_volume = volume_class.is_low();
        let lower_wick_dominant = processed.lower_wick[index] > processed.upper_wick[index];

        let (signal_type, strength, details) = match candle_class {
            CandleClass::Wide if high_volume && price_direction == PriceDirection::Up => (
                SignalType::Buy,
                SignalStrength::Strong,
                "Wide spread up candle with high volume confirms bullish sentiment",
            ),
            CandleClass::Wide if high_volume && price_direction == PriceDirection::Down => (
                SignalType::Sell,
                SignalStrength::Strong,
                "Wide spread down candle with high volume confirms bearish sentiment",
            ),
            CandleClass::Wick if high_volume && lower_wick_dominant => (
                SignalType::Buy,
                SignalStrength::Moderate,
                "Lower wick with high volume shows buying pressure at the lows",
            ),
            CandleClass::Wick if high_volume => (
                SignalType::Sell,
                SignalStrength::Moderate,
                "Upper wick with high volume shows selling pressure at the highs",
            ),
            CandleClass::Narrow if low_volume => (
                SignalType::NoAction,
                SignalStrength::Neutral,
                "Narrow spread candle with low volume indicates contraction",
            ),
            _ => (
                SignalType::NoAction,
                SignalStrength::Neutral,
                "No clear single-bar signal",
            ),
        };

        Ok(BarSignal {
            signal_type,
            strength,
            candle_class,
            volume_class,
            price_direction,
            details: details.to_string(),
        })
    }
}
