use anyhow::{Context, Result, anyhow, ensure};
use itertools::iproduct;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ParamGrid, SearchConfig};
use crate::gbm::{GbmClassifier, GbmParams};
use crate::metrics::f1_score;

/// Every grid combination. Learning rate varies slowest and tree count
/// fastest; ties in score resolve to the earliest candidate in this order.
pub fn expand_grid(grid: &ParamGrid, min_samples_leaf: usize) -> Vec<GbmParams> {
    iproduct!(
        grid.learning_rate.iter(),
        grid.max_depth.iter(),
        grid.n_estimators.iter()
    )
    .map(|(&learning_rate, &max_depth, &n_estimators)| GbmParams {
        n_estimators,
        max_depth,
        learning_rate,
        min_samples_leaf,
        ..GbmParams::default()
    })
    .collect()
}

/// Stratified k-fold assignment without shuffling. Returns the test rows of
/// each fold. Within a class, rows keep their order and fill folds in
/// contiguous blocks whose sizes differ by at most one.
pub fn stratified_folds(y: &[u8], k: usize) -> Result<Vec<Vec<usize>>> {
    ensure!(k >= 2, "cross-validation needs at least 2 folds, got {k}");
    ensure!(
        k <= y.len(),
        "cannot split {} rows into {k} folds",
        y.len()
    );

    let mut sorted = y.to_vec();
    sorted.sort_unstable();
    // allocation[fold][class]: how many rows of each class land in each fold.
    let allocation: Vec<[usize; 2]> = (0..k)
        .map(|fold| {
            let mut counts = [0usize; 2];
            for &label in sorted.iter().skip(fold).step_by(k) {
                counts[usize::from(label.min(1))] += 1;
            }
            counts
        })
        .collect();

    let mut folds = vec![Vec::new(); k];
    for class in 0..2u8 {
        let mut members = (0..y.len()).filter(|&i| y[i].min(1) == class);
        for (fold, counts) in allocation.iter().enumerate() {
            folds[fold].extend(members.by_ref().take(counts[usize::from(class)]));
        }
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    Ok(folds)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: GbmParams,
    pub mean_f1: f64,
    pub std_f1: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: CandidateScore,
    pub scores: Vec<CandidateScore>,
    /// Winner refit on every training row.
    pub model: GbmClassifier,
}

fn take_rows(x: &[Vec<f64>], y: &[u8], rows: &[usize]) -> (Vec<Vec<f64>>, Vec<u8>) {
    (
        rows.iter().map(|&i| x[i].clone()).collect(),
        rows.iter().map(|&i| y[i]).collect(),
    )
}

fn score_candidate(
    x: &[Vec<f64>],
    y: &[u8],
    folds: &[Vec<usize>],
    params: &GbmParams,
) -> Result<CandidateScore> {
    let mut in_test = vec![false; y.len()];
    let mut fold_scores = Vec::with_capacity(folds.len());
    for test_rows in folds {
        in_test.iter_mut().for_each(|flag| *flag = false);
        for &i in test_rows {
            in_test[i] = true;
        }
        let train_rows: Vec<usize> = (0..y.len()).filter(|&i| !in_test[i]).collect();
        let (x_fit, y_fit) = take_rows(x, y, &train_rows);
        let (x_val, y_val) = take_rows(x, y, test_rows);
        let model = GbmClassifier::fit(&x_fit, &y_fit, params)?;
        let predicted = model.predict_batch(&x_val)?;
        fold_scores.push(f1_score(&y_val, &predicted));
    }
    let n = fold_scores.len() as f64;
    let mean_f1 = fold_scores.iter().sum::<f64>() / n;
    let std_f1 = (fold_scores
        .iter()
        .map(|score| (score - mean_f1).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    debug!(
        n_estimators = params.n_estimators,
        max_depth = params.max_depth,
        learning_rate = params.learning_rate,
        mean_f1,
        "candidate scored"
    );
    Ok(CandidateScore {
        params: *params,
        mean_f1,
        std_f1,
    })
}

/// Cross-validated grid search scored by positive-class F1. Candidates are
/// evaluated in parallel; the result does not depend on the worker count.
pub fn grid_search(x: &[Vec<f64>], y: &[u8], config: &SearchConfig) -> Result<SearchOutcome> {
    let candidates = expand_grid(&config.grid, config.min_samples_leaf);
    ensure!(!candidates.is_empty(), "parameter grid is empty");
    let folds = stratified_folds(y, config.cv_folds)?;

    let mut builder = ThreadPoolBuilder::new();
    if config.n_workers > 0 {
        builder = builder.num_threads(config.n_workers);
    }
    let pool = builder.build().context("Failed to build worker pool")?;
    info!(
        candidates = candidates.len(),
        folds = folds.len(),
        workers = pool.current_num_threads(),
        rows = y.len(),
        "starting grid search"
    );

    let scores: Vec<CandidateScore> = pool
        .install(|| {
            candidates
                .par_iter()
                .map(|params| score_candidate(x, y, &folds, params))
                .collect::<Result<Vec<_>>>()
        })
        .context("Cross-validation failed")?;

    let best = scores
        .iter()
        .copied()
        .reduce(|best, next| if next.mean_f1 > best.mean_f1 { next } else { best })
        .ok_or_else(|| anyhow!("no candidate was scored"))?;
    info!(
        n_estimators = best.params.n_estimators,
        max_depth = best.params.max_depth,
        learning_rate = best.params.learning_rate,
        cv_f1 = best.mean_f1,
        "best parameters selected"
    );

    let model = GbmClassifier::fit(x, y, &best.params).context("Failed to refit best candidate")?;
    Ok(SearchOutcome {
        best,
        scores,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_has_twelve_candidates_in_stable_order() {
        let grid = ParamGrid::default();
        let candidates = expand_grid(&grid, 1);
        assert_eq!(candidates.len(), 12);
        assert_eq!(candidates[0].learning_rate, 0.01);
        assert_eq!(candidates[0].max_depth, 3);
        assert_eq!(candidates[0].n_estimators, 100);
        assert_eq!(candidates[1].n_estimators, 200);
        assert_eq!(candidates[11].learning_rate, 0.1);
    }

    #[test]
    fn folds_partition_rows_and_preserve_class_ratio() {
        let y: Vec<u8> = (0..30).map(|i| u8::from(i % 3 == 0)).collect();
        let folds = stratified_folds(&y, 3).unwrap();
        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..30).collect::<Vec<_>>());
        for fold in &folds {
            let positives = fold.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(fold.len(), 10);
            assert!(positives == 3 || positives == 4, "{positives}");
        }
        // Unshuffled: the first fold holds the earliest rows of each class.
        assert!(folds[0].contains(&0));
        assert!(folds[0].contains(&1));
    }

    #[test]
    fn fold_count_is_validated() {
        assert!(stratified_folds(&[0, 1], 1).is_err());
        assert!(stratified_folds(&[0, 1], 3).is_err());
    }

    #[test]
    fn search_is_independent_of_worker_count() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let a = (i as f64 * 0.37).sin();
            let b = (i as f64 * 0.11).cos();
            x.push(vec![a, b]);
            y.push(u8::from(a + 0.3 * b > 0.2));
        }
        let mut config = SearchConfig {
            grid: ParamGrid {
                n_estimators: vec![5, 10],
                max_depth: vec![1, 2],
                learning_rate: vec![0.3],
            },
            ..SearchConfig::default()
        };
        config.n_workers = 1;
        let serial = grid_search(&x, &y, &config).unwrap();
        config.n_workers = 3;
        let parallel = grid_search(&x, &y, &config).unwrap();
        assert_eq!(serial.scores, parallel.scores);
        assert_eq!(serial.best, parallel.best);
        assert_eq!(serial.model, parallel.model);
        assert!(serial.best.mean_f1 > 0.5);
    }
}
