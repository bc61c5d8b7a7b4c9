//! Wyckoff method analysis: event detection, trading ranges and phases.
//!
//! The analyzer walks the processed bundle bar by bar, maintaining a market
//! context and at most one active trading range. Climactic bars open a
//! cycle, the automatic rally/reaction defines the range, secondary tests
//! widen it, a spring or upthrust marks the test phase, and a sign of
//! strength/weakness closes the range and flips the context. Event
//! timestamps are emitted in non-decreasing order; the analyzer never fails
//! on "no pattern".

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::params::Parameters;
use crate::processor::rolling_mean;
use crate::series::{Processed, EPSILON};
use crate::{AnalysisError, Result};

// ============================================================
// EVENT / PHASE / CONTEXT TYPES
// ============================================================

/// Wyckoff event kinds, with their conventional wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WyckoffEventKind {
    #[serde(rename = "PS")]
    Ps,
    #[serde(rename = "SC")]
    Sc,
    #[serde(rename = "AR")]
    Ar,
    #[serde(rename = "AUTO_REACTION")]
    AutoReaction,
    #[serde(rename = "ST")]
    St,
    #[serde(rename = "SPRING")]
    Spring,
    #[serde(rename = "TEST")]
    Test,
    #[serde(rename = "SOS")]
    Sos,
    #[serde(rename = "LPS")]
    Lps,
    #[serde(rename = "UT")]
    Ut,
    #[serde(rename = "UTAD")]
    Utad,
    #[serde(rename = "BC")]
    Bc,
    #[serde(rename = "SOW")]
    Sow,
    #[serde(rename = "LPSY")]
    Lpsy,
    #[serde(rename = "JAC")]
    Jac,
}

/// Wyckoff phase labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WyckoffPhase {
    A,
    B,
    C,
    D,
    E,
}

/// Running market context maintained across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketContext {
    #[default]
    Undetermined,
    Downtrend,
    Accumulation,
    Uptrend,
    Distribution,
}

/// Whether a trading range accumulates or distributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeKind {
    Accumulation,
    Distribution,
}

/// A detected event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WyckoffEvent {
    pub timestamp: i64,
    pub kind: WyckoffEventKind,
    pub price: f64,
    pub volume: f64,
    pub details: String,
}

/// A trading range; `end_timestamp` is `None` while the range is ongoing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRange {
    pub start_timestamp: i64,
    pub end_timestamp: Option<i64>,
    pub kind: RangeKind,
    pub support: f64,
    pub resistance: f64,
}

/// A contiguous span of bars assigned to one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpan {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub phase: WyckoffPhase,
}

/// Full output of one analyzer run on one timeframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WyckoffResult {
    pub events: Vec<WyckoffEvent>,
    pub trading_ranges: Vec<TradingRange>,
    pub phases: Vec<PhaseSpan>,
    pub final_context: MarketContext,
}

// ============================================================
// INTERNAL STATE
// ============================================================

/// The range currently being built, with working state that never reaches
/// the public result.
struct ActiveRange {
    kind: RangeKind,
    start_idx: usize,
    support: f64,
    resistance: f64,
    climax_volume: f64,
    climax_price: f64,
    /// Index into the result's trading_ranges vector.
    slot: usize,
    /// Set once an ST confirmed the range.
    seen_secondary_test: bool,
    /// Extreme of the spring/upthrust bar, for the follow-up test.
    shakeout_price: Option<f64>,
    shakeout_tested: bool,
}

/// A climax waiting for its automatic rally/reaction.
#[derive(Clone, Copy)]
struct PendingClimax {
    idx: usize,
    kind: RangeKind,
}

/// A completed breakout waiting for its last point of support/supply.
#[derive(Clone, Copy)]
struct PendingBreakout {
    idx: usize,
    level: f64,
    kind: RangeKind,
}

/// Per-bar view over the precomputed market dynamics.
struct BarView {
    idx: usize,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    vol_spike: f64,
    range_spike: f64,
    vol_ma: f64,
    is_swing_high: bool,
    is_swing_low: bool,
}

// ============================================================
// ANALYZER
// ============================================================

/// Per-run Wyckoff state machine. Owns its state for the duration of a
/// single timeframe run; a new run starts from scratch.
#[derive(Debug, Clone)]
pub struct WyckoffAnalyzer {
    params: Arc<Parameters>,
}

impl WyckoffAnalyzer {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Run the full event/range/phase analysis over one processed bundle.
    pub fn run(&self, processed: &Processed) -> Result<WyckoffResult> {
        let w = &self.params.wyckoff;
        let n = processed.len();
        let need = w.vol_lookback + w.swing_n;
        if n < need {
            return Err(AnalysisError::InsufficientData { need, got: n });
        }

        // Market dynamics: bar range and spike ratios against their rolling
        // baselines. Warmup ratios default to 1.0 (no spike).
        let range: Vec<f64> = (0..n).map(|i| processed.high[i] - processed.low[i]).collect();
        let vol_ma = rolling_mean(&processed.volume, w.vol_lookback);
        let range_ma = rolling_mean(&range, w.vol_lookback);
        let (swing_high, swing_low) = find_swing_points(processed, w.swing_n);

        let mut run = RunState::new(processed);
        for i in w.vol_lookback..n {
            let bar = BarView {
                idx: i,
                open: processed.open[i],
                high: processed.high[i],
                low: processed.low[i],
                close: processed.close[i],
                volume: processed.volume[i],
                vol_spike: spike_ratio(processed.volume[i], vol_ma[i]),
                range_spike: spike_ratio(range[i], range_ma[i]),
                vol_ma: vol_ma[i],
                is_swing_high: swing_high[i],
                is_swing_low: swing_low[i],
            };

            if run.active.is_none() && run.pending_climax.is_none() {
                self.detect_climax(&mut run, &bar);
            } else if run.pending_climax.is_some() {
                self.detect_reaction(&mut run, &bar);
            }

            if run.active.is_some() {
                self.detect_in_range(&mut run, &bar);
            }

            if run.breakout.is_some() {
                self.detect_last_point(&mut run, &bar);
            }
        }

        debug!(
            events = run.result.events.len(),
            ranges = run.result.trading_ranges.len(),
            "wyckoff run complete"
        );
        Ok(run.finish())
    }

    /// Climax bars and their preliminary warnings, outside any range.
    fn detect_climax(&self, run: &mut RunState, bar: &BarView) {
        let w = &self.params.wyckoff;
        let spiked = bar.vol_spike >= w.climax_vol_multiplier - EPSILON
            && bar.range_spike >= w.climax_range_multiplier - EPSILON;

        let sc_context =
            matches!(run.context, MarketContext::Undetermined | MarketContext::Downtrend);
        let bc_context =
            matches!(run.context, MarketContext::Undetermined | MarketContext::Uptrend);

        if sc_context && bar.is_swing_low && spiked && bar.close < bar.open {
            run.push_event(
                bar.idx,
                WyckoffEventKind::Sc,
                format!("selling climax, volume spike {:.1}x", bar.vol_spike),
            );
            run.context = MarketContext::Accumulation;
            run.pending_climax =
                Some(PendingClimax { idx: bar.idx, kind: RangeKind::Accumulation });
            run.set_phase(WyckoffPhase::A, bar.idx);
            return;
        }

        if bc_context && bar.is_swing_high && spiked && bar.close > bar.open {
            run.push_event(
                bar.idx,
                WyckoffEventKind::Bc,
                format!("buying climax, volume spike {:.1}x", bar.vol_spike),
            );
            run.context = MarketContext::Distribution;
            run.pending_climax =
                Some(PendingClimax { idx: bar.idx, kind: RangeKind::Distribution });
            run.set_phase(WyckoffPhase::A, bar.idx);
            return;
        }

        // High-volume down bar that stops short of a full climax.
        if sc_context && bar.close < bar.open && bar.vol_spike >= w.climax_vol_multiplier - EPSILON
        {
            run.push_event(
                bar.idx,
                WyckoffEventKind::Ps,
                "preliminary support, high volume without climactic spread".to_string(),
            );
        }
    }

    /// Automatic rally (after SC) or automatic reaction (after BC).
    fn detect_reaction(&self, run: &mut RunState, bar: &BarView) {
        let w = &self.params.wyckoff;
        let Some(pending) = run.pending_climax else { return };
        if bar.idx - pending.idx > w.ar_window {
            // The reaction never came; abandon the cycle.
            run.pending_climax = None;
            run.context = MarketContext::Undetermined;
            run.clear_phase(bar.idx);
            return;
        }

        let climax_idx = pending.idx;
        let climax_volume = run.processed.volume[climax_idx];
        match pending.kind {
            RangeKind::Accumulation if bar.is_swing_high => {
                let support = run.processed.low[climax_idx];
                let resistance = bar.high;
                if support + EPSILON >= resistance {
                    return;
                }
                run.pending_climax = None;
                run.push_event(bar.idx, WyckoffEventKind::Ar, "automatic rally".to_string());
                run.open_range(
                    RangeKind::Accumulation,
                    climax_idx,
                    support,
                    resistance,
                    support,
                    climax_volume,
                );
                run.set_phase(WyckoffPhase::B, bar.idx);
            }
            RangeKind::Distribution if bar.is_swing_low => {
                let support = bar.low;
                let resistance = run.processed.high[climax_idx];
                if support + EPSILON >= resistance {
                    return;
                }
                run.pending_climax = None;
                run.push_event(
                    bar.idx,
                    WyckoffEventKind::AutoReaction,
                    "automatic reaction".to_string(),
                );
                run.open_range(
                    RangeKind::Distribution,
                    climax_idx,
                    support,
                    resistance,
                    resistance,
                    climax_volume,
                );
                run.set_phase(WyckoffPhase::B, bar.idx);
            }
            _ => {}
        }
    }

    /// Secondary tests, springs/upthrusts and breakouts inside a range.
    fn detect_in_range(&self, run: &mut RunState, bar: &BarView) {
        let w = &self.params.wyckoff;
        let Some(active) = run.active.as_ref() else { return };
        let kind = active.kind;
        let support = active.support;
        let resistance = active.resistance;
        let climax_price = active.climax_price;
        let climax_volume = active.climax_volume;
        let seen_st = active.seen_secondary_test;
        let shakeout_price = active.shakeout_price;
        let shakeout_tested = active.shakeout_tested;
        let matured = bar.idx - active.start_idx >= w.range_min_length;
        let slot = active.slot;
        let i = bar.idx;

        match kind {
            RangeKind::Accumulation => {
                let pierce = support - bar.low;
                if bar.low < support
                    && pierce <= support * w.spring_pct + EPSILON
                    && bar.close > support
                    && bar.vol_spike >= w.spring_vol_multiplier - EPSILON
                {
                    let subtype = if bar.vol_spike >= w.breakout_vol_multiplier {
                        "terminal shakeout on heavy volume"
                    } else if bar.vol_spike > 1.0 {
                        "spring needing a test"
                    } else {
                        "low volume spring"
                    };
                    if let Some(active) = run.active.as_mut() {
                        active.shakeout_price = Some(bar.low);
                        active.shakeout_tested = false;
                    }
                    run.push_event(i, WyckoffEventKind::Spring, subtype.to_string());
                    run.set_phase(WyckoffPhase::C, i);
                } else if bar.is_swing_low
                    && near(bar.low, climax_price, w.test_band_pct)
                    && bar.volume < climax_volume
                {
                    let widened = support.min(bar.low);
                    if let Some(active) = run.active.as_mut() {
                        active.support = widened;
                        active.seen_secondary_test = true;
                    }
                    run.result.trading_ranges[slot].support = widened;
                    run.push_event(i, WyckoffEventKind::St, "secondary test of the low".to_string());
                } else if let Some(shakeout) = shakeout_price {
                    if !shakeout_tested
                        && near(bar.low, shakeout, w.test_band_pct)
                        && !bar.vol_ma.is_nan()
                        && bar.volume < bar.vol_ma
                    {
                        if let Some(active) = run.active.as_mut() {
                            active.shakeout_tested = true;
                        }
                        run.push_event(
                            i,
                            WyckoffEventKind::Test,
                            "low volume test of the spring".to_string(),
                        );
                    }
                }

                // Sign of strength: decisive break above resistance.
                if matured
                    && bar.close > resistance
                    && bar.close > bar.open
                    && bar.vol_spike >= w.breakout_vol_multiplier - EPSILON
                    && bar.range_spike >= 1.0 - EPSILON
                {
                    run.push_event(i, WyckoffEventKind::Sos, "sign of strength".to_string());
                    if bar.close > resistance * (1.0 + w.jac_gap_pct) {
                        run.push_event(
                            i,
                            WyckoffEventKind::Jac,
                            "jumped across the creek".to_string(),
                        );
                    }
                    run.close_range(i);
                    run.context = MarketContext::Uptrend;
                    run.breakout = Some(PendingBreakout {
                        idx: i,
                        level: resistance,
                        kind: RangeKind::Accumulation,
                    });
                    run.set_phase(WyckoffPhase::D, i);
                }
            }
            RangeKind::Distribution => {
                let pierce = bar.high - resistance;
                if bar.high > resistance
                    && pierce <= resistance * w.spring_pct + EPSILON
                    && bar.close < resistance
                    && bar.vol_spike >= w.spring_vol_multiplier - EPSILON
                {
                    // A late upthrust, after the range has been confirmed by
                    // a secondary test, is the UTAD form.
                    let event = if seen_st { WyckoffEventKind::Utad } else { WyckoffEventKind::Ut };
                    if let Some(active) = run.active.as_mut() {
                        active.shakeout_price = Some(bar.high);
                        active.shakeout_tested = false;
                    }
                    run.push_event(i, event, "upthrust above resistance".to_string());
                    run.set_phase(WyckoffPhase::C, i);
                } else if bar.is_swing_high
                    && near(bar.high, climax_price, w.test_band_pct)
                    && bar.volume < climax_volume
                {
                    let widened = resistance.max(bar.high);
                    if let Some(active) = run.active.as_mut() {
                        active.resistance = widened;
                        active.seen_secondary_test = true;
                    }
                    run.result.trading_ranges[slot].resistance = widened;
                    run.push_event(
                        i,
                        WyckoffEventKind::St,
                        "secondary test of the high".to_string(),
                    );
                }

                // Sign of weakness: decisive break below support.
                if matured
                    && bar.close < support
                    && bar.close < bar.open
                    && bar.vol_spike >= w.breakout_vol_multiplier - EPSILON
                    && bar.range_spike >= 1.0 - EPSILON
                {
                    run.push_event(i, WyckoffEventKind::Sow, "sign of weakness".to_string());
                    run.close_range(i);
                    run.context = MarketContext::Downtrend;
                    run.breakout = Some(PendingBreakout {
                        idx: i,
                        level: support,
                        kind: RangeKind::Distribution,
                    });
                    run.set_phase(WyckoffPhase::D, i);
                }
            }
        }
    }

    /// Last point of support/supply after a breakout.
    fn detect_last_point(&self, run: &mut RunState, bar: &BarView) {
        let w = &self.params.wyckoff;
        let Some(breakout) = run.breakout else { return };
        if bar.idx <= breakout.idx {
            return;
        }
        let quiet = !bar.vol_ma.is_nan() && bar.volume < bar.vol_ma;

        match breakout.kind {
            RangeKind::Accumulation => {
                if bar.low > breakout.level
                    && near(bar.low, breakout.level, w.test_band_pct)
                    && quiet
                {
                    run.push_event(
                        bar.idx,
                        WyckoffEventKind::Lps,
                        "low volume pullback to the broken resistance".to_string(),
                    );
                    run.breakout = None;
                    run.set_phase(WyckoffPhase::E, bar.idx);
                }
            }
            RangeKind::Distribution => {
                if bar.high < breakout.level
                    && near(bar.high, breakout.level, w.test_band_pct)
                    && quiet
                {
                    run.push_event(
                        bar.idx,
                        WyckoffEventKind::Lpsy,
                        "low volume rally to the broken support".to_string(),
                    );
                    run.breakout = None;
                    run.set_phase(WyckoffPhase::E, bar.idx);
                }
            }
        }
    }
}

// ============================================================
// RUN STATE
// ============================================================

struct RunState<'a> {
    processed: &'a Processed,
    result: WyckoffResult,
    context: MarketContext,
    active: Option<ActiveRange>,
    pending_climax: Option<PendingClimax>,
    breakout: Option<PendingBreakout>,
    phase_open: Option<(WyckoffPhase, usize)>,
}

impl<'a> RunState<'a> {
    fn new(processed: &'a Processed) -> Self {
        Self {
            processed,
            result: WyckoffResult::default(),
            context: MarketContext::Undetermined,
            active: None,
            pending_climax: None,
            breakout: None,
            phase_open: None,
        }
    }

    fn push_event(&mut self, idx: usize, kind: WyckoffEventKind, details: String) {
        self.result.events.push(WyckoffEvent {
            timestamp: self.processed.timestamps[idx],
            kind,
            price: self.processed.close[idx],
            volume: self.processed.volume[idx],
            details,
        });
    }

    fn open_range(
        &mut self,
        kind: RangeKind,
        climax_idx: usize,
        support: f64,
        resistance: f64,
        climax_price: f64,
        climax_volume: f64,
    ) {
        let slot = self.result.trading_ranges.len();
        self.result.trading_ranges.push(TradingRange {
            start_timestamp: self.processed.timestamps[climax_idx],
            end_timestamp: None,
            kind,
            support,
            resistance,
        });
        self.active = Some(ActiveRange {
            kind,
            start_idx: climax_idx,
            support,
            resistance,
            climax_volume,
            climax_price,
            slot,
            seen_secondary_test: false,
            shakeout_price: None,
            shakeout_tested: false,
        });
    }

    fn close_range(&mut self, idx: usize) {
        if let Some(active) = self.active.take() {
            self.result.trading_ranges[active.slot].end_timestamp =
                Some(self.processed.timestamps[idx]);
        }
    }

    fn set_phase(&mut self, phase: WyckoffPhase, idx: usize) {
        match self.phase_open {
            Some((current, start)) if current != phase => {
                self.result.phases.push(PhaseSpan {
                    start_timestamp: self.processed.timestamps[start],
                    end_timestamp: self.processed.timestamps[idx],
                    phase: current,
                });
                self.phase_open = Some((phase, idx));
            }
            None => self.phase_open = Some((phase, idx)),
            _ => {}
        }
    }

    fn clear_phase(&mut self, idx: usize) {
        if let Some((phase, start)) = self.phase_open.take() {
            self.result.phases.push(PhaseSpan {
                start_timestamp: self.processed.timestamps[start],
                end_timestamp: self.processed.timestamps[idx],
                phase,
            });
        }
    }

    fn finish(mut self) -> WyckoffResult {
        if let Some(last) = self.processed.len().checked_sub(1) {
            self.clear_phase(last);
        }
        self.result.final_context = self.context;
        self.result
    }
}

// ============================================================
// HELPERS
// ============================================================

fn spike_ratio(value: f64, baseline: f64) -> f64 {
    if baseline.is_nan() || baseline <= EPSILON {
        1.0
    } else {
        value / baseline
    }
}

fn near(value: f64, reference: f64, tolerance_pct: f64) -> bool {
    reference.abs() > EPSILON && (value - reference).abs() / reference.abs() <= tolerance_pct
}

/// Swing highs/lows over a symmetric window of `n` bars: a swing high beats
/// every high before it in the window and strictly beats every high after.
fn find_swing_points(processed: &Processed, n: usize) -> (Vec<bool>, Vec<bool>) {
    let len = processed.len();
    let mut highs = vec![false; len];
    let mut lows = vec![false; len];
    if len < 2 * n + 1 {
        return (highs, lows);
    }
    for i in n..len - n {
        let high = processed.high[i];
        let low = processed.low[i];
        let before_high = processed.high[i - n..i].iter().cloned().fold(f64::MIN, f64::max);
        let after_high = processed.high[i + 1..=i + n].iter().cloned().fold(f64::MIN, f64::max);
        if high >= before_high && high > after_high {
            highs[i] = true;
        }
        let before_low = processed.low[i - n..i].iter().cloned().fold(f64::MAX, f64::min);
        let after_low = processed.low[i + 1..=i + n].iter().cloned().fold(f64::MAX, f64::min);
        if low <= before_low && low < after_low {
            lows[i] = true;
        }
    }
    (highs, lows)
}

// ============================================================
// TESTS
// ============================================================
