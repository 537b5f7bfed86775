//! Synthetic minority oversampling (SMOTE).
//!
//! Each synthetic row lies on the segment between a randomly chosen minority
//! row and one of its `k` nearest minority neighbours (Euclidean distance).
//! Rows are generated until both classes have equal counts and are appended
//! after the original rows.

use anyhow::{Result, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::config::OversampleConfig;

#[derive(Debug, Clone)]
pub struct Resampled {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u8>,
    pub synthetic: usize,
}

pub fn smote(x: &[Vec<f64>], y: &[u8], config: &OversampleConfig) -> Result<Resampled> {
    ensure!(
        x.len() == y.len(),
        "{} feature rows but {} labels",
        x.len(),
        y.len()
    );
    let positives: Vec<usize> = (0..y.len()).filter(|&i| y[i] == 1).collect();
    let negatives: Vec<usize> = (0..y.len()).filter(|&i| y[i] != 1).collect();
    let (minority_label, minority, majority_len) = if positives.len() <= negatives.len() {
        (1u8, positives, negatives.len())
    } else {
        (0u8, negatives, positives.len())
    };

    let mut out = Resampled {
        x: x.to_vec(),
        y: y.to_vec(),
        synthetic: 0,
    };
    let needed = majority_len - minority.len();
    if needed == 0 {
        return Ok(out);
    }
    if minority.is_empty() {
        warn!(
            rows = y.len(),
            "training partition holds a single class; oversampling skipped"
        );
        return Ok(out);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    out.x.reserve(needed);
    out.y.reserve(needed);

    if minority.len() == 1 {
        warn!(needed, "single minority row; duplicating it instead of interpolating");
        let row = &x[minority[0]];
        for _ in 0..needed {
            out.x.push(row.clone());
            out.y.push(minority_label);
        }
        out.synthetic = needed;
        return Ok(out);
    }

    let k = config.k_neighbors.min(minority.len() - 1).max(1);
    if k < config.k_neighbors {
        warn!(
            requested = config.k_neighbors,
            used = k,
            "minority class too small for requested neighbour count"
        );
    }
    let neighbours: Vec<Vec<usize>> = minority
        .iter()
        .map(|&row| nearest_neighbours(x, &minority, row, k))
        .collect();

    for _ in 0..needed {
        let pick = rng.gen_range(0..minority.len() * k);
        let (anchor_pos, neighbour_pos) = (pick / k, pick % k);
        let anchor = &x[minority[anchor_pos]];
        let neighbour = &x[neighbours[anchor_pos][neighbour_pos]];
        let gap: f64 = rng.r#gen();
        let synthetic = anchor
            .iter()
            .zip(neighbour.iter())
            .map(|(a, b)| a + gap * (b - a))
            .collect();
        out.x.push(synthetic);
        out.y.push(minority_label);
    }
    out.synthetic = needed;
    info!(
        minority_label,
        original = minority.len(),
        synthetic = needed,
        k,
        "oversampled minority class"
    );
    Ok(out)
}

/// The `k` closest members of `pool` to `row`, excluding `row` itself. Ties
/// break on row index.
fn nearest_neighbours(x: &[Vec<f64>], pool: &[usize], row: usize, k: usize) -> Vec<usize> {
    let mut candidates: Vec<(f64, usize)> = pool
        .iter()
        .filter(|&&other| other != row)
        .map(|&other| (squared_distance(&x[row], &x[other]), other))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates.into_iter().take(k).map(|(_, idx)| idx).collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassCounts;

    fn imbalanced() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            x.push(vec![i as f64, 0.0]);
            y.push(0);
        }
        for i in 0..4 {
            x.push(vec![100.0 + i as f64, 10.0 * i as f64]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn balances_classes_and_keeps_originals_first() {
        let (x, y) = imbalanced();
        let out = smote(&x, &y, &OversampleConfig::default()).unwrap();
        assert_eq!(out.synthetic, 16);
        assert!(ClassCounts::from_labels(&out.y).is_balanced());
        assert_eq!(&out.x[..x.len()], x.as_slice());
        assert_eq!(&out.y[..y.len()], y.as_slice());
    }

    #[test]
    fn synthetic_rows_stay_inside_minority_hull() {
        let (x, y) = imbalanced();
        let out = smote(&x, &y, &OversampleConfig::default()).unwrap();
        for row in &out.x[x.len()..] {
            assert!((100.0..=103.0).contains(&row[0]), "{row:?}");
            assert!((0.0..=30.0).contains(&row[1]), "{row:?}");
        }
    }

    #[test]
    fn same_seed_same_rows() {
        let (x, y) = imbalanced();
        let a = smote(&x, &y, &OversampleConfig::default()).unwrap();
        let b = smote(&x, &y, &OversampleConfig::default()).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn degenerate_minorities_fall_back() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let out = smote(&x, &[0, 0, 0], &OversampleConfig::default()).unwrap();
        assert_eq!(out.synthetic, 0);
        assert_eq!(out.x.len(), 3);

        let out = smote(&x, &[0, 0, 1], &OversampleConfig::default()).unwrap();
        assert_eq!(out.synthetic, 1);
        assert_eq!(out.x[3], vec![2.0]);
        assert_eq!(out.y, vec![0, 0, 1, 1]);
    }
}
