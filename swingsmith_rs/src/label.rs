//! Triple-barrier labeling.
//!
//! A bar is a buy (1) when, within the forward window, some later close
//! reaches the profit barrier before any close reaches the stop barrier.
//! Stops and window expiry both label 0. When one step satisfies both
//! barriers the profit barrier wins; this ordering is a modeling assumption
//! and only matters for degenerate barrier settings.

use serde::{Deserialize, Serialize};

use crate::config::LabelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarrierOutcome {
    /// Profit barrier touched `step` bars after entry.
    Profit { step: usize },
    /// Stop barrier touched `step` bars after entry.
    Stop { step: usize },
    /// Neither barrier touched inside the window.
    Expired,
}

impl BarrierOutcome {
    pub fn label(self) -> u8 {
        match self {
            BarrierOutcome::Profit { .. } => 1,
            BarrierOutcome::Stop { .. } | BarrierOutcome::Expired => 0,
        }
    }
}

/// True when bar `index` has a full forward window after it.
pub fn is_labelable(len: usize, index: usize, config: &LabelConfig) -> bool {
    index
        .checked_add(config.forward_window)
        .is_some_and(|last| last < len)
}

/// Race the two barriers forward from `index`. Returns `None` when fewer
/// than `forward_window` bars follow.
pub fn scan_barriers(closes: &[f64], index: usize, config: &LabelConfig) -> Option<BarrierOutcome> {
    if !is_labelable(closes.len(), index, config) {
        return None;
    }
    let entry = closes[index];
    let profit_price = entry * (1.0 + config.profit_target);
    let loss_price = entry * (1.0 - config.stop_loss);

    for step in 1..=config.forward_window {
        let close = closes[index + step];
        if close >= profit_price {
            return Some(BarrierOutcome::Profit { step });
        }
        if close <= loss_price {
            return Some(BarrierOutcome::Stop { step });
        }
    }
    Some(BarrierOutcome::Expired)
}

/// Barrier outcome for every bar; `None` where the forward window is short.
pub fn barrier_outcomes(closes: &[f64], config: &LabelConfig) -> Vec<Option<BarrierOutcome>> {
    (0..closes.len())
        .map(|index| scan_barriers(closes, index, config))
        .collect()
}

pub fn labels_from_outcomes(outcomes: &[Option<BarrierOutcome>]) -> Vec<Option<u8>> {
    outcomes
        .iter()
        .map(|outcome| outcome.map(BarrierOutcome::label))
        .collect()
}

/// Label every bar. The last `forward_window` entries are always `None`.
pub fn triple_barrier_labels(closes: &[f64], config: &LabelConfig) -> Vec<Option<u8>> {
    labels_from_outcomes(&barrier_outcomes(closes, config))
}

/// Outcome counts over one labeled series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub labeled: usize,
    pub unlabeled: usize,
    pub profit: usize,
    pub stop: usize,
    pub expired: usize,
}

impl LabelSummary {
    pub fn from_closes(closes: &[f64], config: &LabelConfig) -> Self {
        Self::from_outcomes(&barrier_outcomes(closes, config))
    }

    pub fn from_outcomes(outcomes: &[Option<BarrierOutcome>]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome {
                None => summary.unlabeled += 1,
                Some(BarrierOutcome::Profit { .. }) => summary.profit += 1,
                Some(BarrierOutcome::Stop { .. }) => summary.stop += 1,
                Some(BarrierOutcome::Expired) => summary.expired += 1,
            }
            summary.labeled = summary.profit + summary.stop + summary.expired;
            summary
        })
    }

    pub fn positive_rate(&self) -> f64 {
        if self.labeled == 0 {
            0.0
        } else {
            self.profit as f64 / self.labeled as f64
        }
    }
}
