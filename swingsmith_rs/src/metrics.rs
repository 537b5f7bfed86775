use std::fmt;

use serde::{Deserialize, Serialize};

/// Binary confusion counts with class 1 as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionCounts {
    pub fn new(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut counts = Self::default();
        for (&truth, &pred) in y_true.iter().zip(y_pred.iter()) {
            match (truth, pred) {
                (1, 1) => counts.tp += 1,
                (1, _) => counts.fn_ += 1,
                (_, 1) => counts.fp += 1,
                _ => counts.tn += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Metrics for class `label`, treating it as the positive class.
    pub fn class_metrics(&self, label: u8) -> ClassMetrics {
        let (tp, fp, fn_) = if label == 1 {
            (self.tp, self.fp, self.fn_)
        } else {
            (self.tn, self.fn_, self.fp)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        ClassMetrics {
            label,
            precision,
            recall,
            f1: harmonic_mean(precision, recall),
            support: tp + fn_,
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }
}

/// Undefined ratios count as zero.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn harmonic_mean(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// F1 of the positive class.
pub fn f1_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    ConfusionCounts::new(y_true, y_pred).class_metrics(1).f1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation: per-class precision, recall, F1 and support plus
/// accuracy, macro and support-weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub confusion: ConfusionCounts,
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
}

impl ClassificationReport {
    pub fn new(y_true: &[u8], y_pred: &[u8]) -> Self {
        let confusion = ConfusionCounts::new(y_true, y_pred);
        let classes = vec![confusion.class_metrics(0), confusion.class_metrics(1)];
        let support: usize = classes.iter().map(|c| c.support).sum();

        let mean = |field: fn(&ClassMetrics) -> f64| {
            classes.iter().map(field).sum::<f64>() / classes.len() as f64
        };
        let weighted = |field: fn(&ClassMetrics) -> f64| {
            if support == 0 {
                0.0
            } else {
                classes
                    .iter()
                    .map(|c| field(c) * c.support as f64)
                    .sum::<f64>()
                    / support as f64
            }
        };
        let macro_avg = AveragedMetrics {
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
            support,
        };
        let weighted_avg = AveragedMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support,
        };
        Self {
            confusion,
            accuracy: confusion.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WIDTH: usize = 12;
        writeln!(
            f,
            "{:>WIDTH$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>WIDTH$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>WIDTH$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>WIDTH$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        Ok(())
    }
}
