//! 層化 train/test 分割
//!
//! クラスごとに独立してシャッフルし、`max(1, floor(n * ratio))` 件を test に回す。
//! サンプル数の少ないクラスは test 比率が大きくなるが、全クラスが test に
//! 最低1件含まれることを優先する。

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::types::Sample;

/// 特徴量とラベルが同じ並びで対応するサブセット
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subset {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
}

impl Subset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn gather(samples: &[Sample], indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| samples[i].features.clone()).collect(),
            labels: indices.iter().map(|&i| samples[i].label).collect(),
        }
    }

    /// クラスごとの件数
    pub fn class_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_default() += 1;
        }
        counts
    }
}

/// 分割結果
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub train: Subset,
    pub test: Subset,
}

/// 層化分割を行う
///
/// `rng` はパイプライン全体で共有する単一のシード付き乱数源。
pub fn stratified_split<R: Rng + ?Sized>(
    samples: &[Sample],
    test_ratio: f64,
    rng: &mut R,
) -> Result<DatasetSplit> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, sample) in samples.iter().enumerate() {
        by_class.entry(sample.label).or_default().push(i);
    }

    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();
    for (_, mut idxs) in by_class {
        idxs.shuffle(rng);
        let n_test = ((idxs.len() as f64 * test_ratio).floor() as usize).max(1);
        let (test, train) = idxs.split_at(n_test.min(idxs.len()));
        test_idx.extend_from_slice(test);
        train_idx.extend_from_slice(train);
    }

    // クラス順の偏りを消す
    train_idx.shuffle(rng);
    test_idx.shuffle(rng);

    log::info!("Train samples: {}, Test samples: {}", train_idx.len(), test_idx.len());

    Ok(DatasetSplit {
        train: Subset::gather(samples, &train_idx),
        test: Subset::gather(samples, &test_idx),
    })
}
