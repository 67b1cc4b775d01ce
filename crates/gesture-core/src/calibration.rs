//! 量子化キャリブレーション用サンプル
//!
//! 標準化済み train サブセットから上限 `num_samples` 件を非復元抽出する。
//! コーデックは複数回走査することがあるため、`batches()` は何度でも呼べる。

use rand::Rng;
use rand::seq::index;

use crate::split::Subset;

/// デフォルトのキャリブレーション件数
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 100;

/// 形状 `[1, dim]` の単一サンプルバッチ
#[derive(Debug, Clone, Copy)]
pub struct CalibrationBatch<'a> {
    data: &'a [f32],
}

impl<'a> CalibrationBatch<'a> {
    pub fn shape(&self) -> [usize; 2] {
        [1, self.data.len()]
    }

    /// 行優先で平坦化された値
    pub fn data(&self) -> &'a [f32] {
        self.data
    }
}

/// 有限かつ再走査可能なキャリブレーション集合
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    samples: Vec<Vec<f32>>,
}

impl CalibrationSet {
    /// train から最大 `num_samples` 件を抽出する
    pub fn sample<R: Rng + ?Sized>(train: &Subset, num_samples: usize, rng: &mut R) -> Self {
        let samples = if train.len() > num_samples {
            // 非復元・一様抽出。取り出し順は乱数に従う
            index::sample(rng, train.len(), num_samples)
                .into_iter()
                .map(|i| train.features[i].clone())
                .collect()
        } else {
            train.features.clone()
        };
        log::info!(
            "Calibration set: {} of {} train samples (cap {num_samples})",
            samples.len(),
            train.len()
        );
        Self { samples }
    }

    pub fn from_samples(samples: Vec<Vec<f32>>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// バッチ列を先頭から走査する
    pub fn batches(&self) -> impl Iterator<Item = CalibrationBatch<'_>> + '_ {
        self.samples.iter().map(|s| CalibrationBatch { data: s })
    }
}

impl<'a> IntoIterator for &'a CalibrationSet {
    type Item = CalibrationBatch<'a>;
    type IntoIter = Box<dyn Iterator<Item = CalibrationBatch<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.batches())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn train(n: usize) -> Subset {
        Subset {
            features: (0..n).map(|i| vec![i as f32, 0.5]).collect(),
            labels: vec![0; n],
        }
    }

    #[test]
    fn small_train_is_used_entirely() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let set = CalibrationSet::sample(&train(40), 100, &mut rng);
        assert_eq!(set.len(), 40);
        assert_eq!(set.batches().count(), 40);
    }

    #[test]
    fn large_train_is_capped_without_replacement() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let set = CalibrationSet::sample(&train(250), 100, &mut rng);
        assert_eq!(set.len(), 100);
        let mut firsts: Vec<i64> = set.batches().map(|b| b.data()[0] as i64).collect();
        firsts.sort();
        firsts.dedup();
        assert_eq!(firsts.len(), 100);
    }

    #[test]
    fn batches_are_reiterable_with_unit_batch_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let set = CalibrationSet::sample(&train(5), 100, &mut rng);
        let first: Vec<Vec<f32>> = set.batches().map(|b| b.data().to_vec()).collect();
        let second: Vec<Vec<f32>> = (&set).into_iter().map(|b| b.data().to_vec()).collect();
        assert_eq!(first, second);
        assert!(set.batches().all(|b| b.shape() == [1, 2]));
    }
}
