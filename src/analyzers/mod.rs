//! Per-timeframe analyzers
//!
//! Each analyzer consumes the processed feature bundle and produces one
//! facet of the timeframe's picture:
//!
//! - **candle**: single-bar signal from candle/volume classes
//! - **trend**: windowed direction and volume confirmation
//! - **patterns**: accumulation, distribution, testing, climaxes
//! - **support_resistance**: clustered pivot levels with volume weights

pub mod candle;
pub mod patterns;
pub mod support_resistance;
pub mod trend;

pub use candle::{BarSignal, CandleAnalyzer};
pub use patterns::{
    LevelTest, PatternAnalysis, PatternDetection, PatternRecognizer, TestingDetection,
};
pub use support_resistance::{Level, SupportResistance, SupportResistanceAnalyzer, VolumeAtLevel};
pub use trend::{TrendAnalyzer, TrendResult};
