//! 特徴量ごとの標準化
//!
//! 統計量は train サブセットのみから計算し、train/test の両方に同じ変換を適用する。
//! test から再計算してはならない。

use serde::Serialize;

use crate::split::Subset;

/// 除算時に std に足す値
pub const STD_EPSILON: f64 = 1e-9;

/// 位置ごとの (mean, std)。std は母標準偏差。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardizationStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl StandardizationStats {
    /// train サブセットから計算する（f64 で累積）
    pub fn fit(train: &Subset, dim: usize) -> Self {
        let n = train.len();
        let mut sum = vec![0.0f64; dim];
        for row in &train.features {
            debug_assert_eq!(row.len(), dim);
            for (s, &x) in sum.iter_mut().zip(row) {
                *s += x as f64;
            }
        }
        let mean: Vec<f64> = if n == 0 {
            vec![0.0; dim]
        } else {
            sum.iter().map(|s| s / n as f64).collect()
        };

        let mut sq = vec![0.0f64; dim];
        for row in &train.features {
            for ((acc, &x), m) in sq.iter_mut().zip(row).zip(&mean) {
                let d = x as f64 - m;
                *acc += d * d;
            }
        }
        let std: Vec<f64> = if n == 0 {
            vec![0.0; dim]
        } else {
            sq.iter().map(|s| (s / n as f64).sqrt()).collect()
        };

        Self {
            mean: mean.iter().map(|&m| m as f32).collect(),
            std: std.iter().map(|&s| s as f32).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / (std + eps)`
    pub fn apply_row(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(&x, (&m, &s))| ((x as f64 - m as f64) / (s as f64 + STD_EPSILON)) as f32)
            .collect()
    }

    /// サブセット全体に適用（ラベルはそのまま）
    pub fn apply(&self, subset: &Subset) -> Subset {
        Subset {
            features: subset.features.iter().map(|r| self.apply_row(r)).collect(),
            labels: subset.labels.clone(),
        }
    }
}

/// train で fit した統計量を train/test の両方に適用する
pub fn standardize(train: &Subset, test: &Subset, dim: usize) -> (StandardizationStats, Subset, Subset) {
    let stats = StandardizationStats::fit(train, dim);
    log::info!("Applying standard normalization (train mean/std).");
    let train_norm = stats.apply(train);
    let test_norm = stats.apply(test);
    (stats, train_norm, test_norm)
}
