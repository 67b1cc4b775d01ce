//! データセット構築
//!
//! ラベル表 → target_length 決定 → サンプル化 の順で組み立てる。
//! ラベル表は分割より前に確定させ、train/test で同じIDを使う。

use crate::error::Result;
use crate::label::LabelMap;
use crate::sequence::{build_samples, mode_length, resolve_target_length};
use crate::take::TakeSet;
use crate::types::Sample;

/// サンプル全体とメタ情報
#[derive(Debug, Clone)]
pub struct Dataset {
    pub samples: Vec<Sample>,
    pub label_map: LabelMap,
    pub target_length: usize,
    pub feature_count: usize,
}

impl Dataset {
    /// 集約済みテイクからデータセットを作成
    pub fn build(takes: &TakeSet, target_length: Option<usize>) -> Result<Self> {
        let label_map = LabelMap::from_takes(takes)?;

        let lengths = takes.lengths();
        if let (Some(min), Some(max), Some(mode)) = (
            lengths.iter().min(),
            lengths.iter().max(),
            mode_length(&lengths),
        ) {
            log::info!("Take lengths (min, mode, max): {min}, {mode}, {max}");
        }

        let target_length = resolve_target_length(takes, target_length)?;
        log::info!("Using target sequence length per take = {target_length}");
        log::info!("Label map: {label_map}");

        let samples = build_samples(takes, &label_map, target_length)?;
        log::info!(
            "Built dataset: {} samples x {} features",
            samples.len(),
            target_length * takes.feature_count()
        );

        Ok(Self {
            samples,
            label_map,
            target_length,
            feature_count: takes.feature_count(),
        })
    }

    /// 1サンプルの次元 (`target_length * F`)
    pub fn input_dim(&self) -> usize {
        self.target_length * self.feature_count
    }

    pub fn num_classes(&self) -> usize {
        self.label_map.num_classes()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::take::TakeAggregator;
    use crate::types::Row;

    fn takes_with(spec: &[(&str, &str, usize)]) -> TakeSet {
        let mut agg = TakeAggregator::new(2).unwrap();
        let mut line = 1;
        for &(label, take, len) in spec {
            for seq in 1..=len {
                line += 1;
                agg.push(
                    line,
                    Row {
                        label: label.to_string(),
                        take_id: take.to_string(),
                        sequence_index: seq as u64,
                        values: vec![seq as f32, -(seq as f32)],
                    },
                )
                .unwrap();
            }
        }
        agg.finish().unwrap()
    }

    #[test]
    fn scenario_mode_length_and_padding() {
        let takes = takes_with(&[
            ("wave", "1", 8),
            ("wave", "2", 10),
            ("wave", "3", 10),
            ("punch", "4", 10),
            ("punch", "5", 9),
        ]);
        let ds = Dataset::build(&takes, None).unwrap();
        assert_eq!(ds.target_length, 10);
        assert_eq!(ds.label_map.id("punch"), Some(0));
        assert_eq!(ds.label_map.id("wave"), Some(1));
        assert_eq!(ds.input_dim(), 20);
        for s in &ds.samples {
            assert_eq!(s.features.len(), 20);
        }

        // wave#1 (長さ8) は末尾2行がゼロ
        let wave1 = &ds.samples[0];
        assert_eq!(wave1.label, 1);
        assert_eq!(&wave1.features[14..16], &[8.0, -8.0]);
        assert!(wave1.features[16..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn explicit_target_length_overrides_mode() {
        let takes = takes_with(&[("a", "1", 4), ("b", "2", 6)]);
        let ds = Dataset::build(&takes, Some(5)).unwrap();
        assert_eq!(ds.target_length, 5);
        assert!(ds.samples.iter().all(|s| s.features.len() == 10));
    }

    #[test]
    fn single_class_fails_before_sampling() {
        let takes = takes_with(&[("wave", "1", 3), ("wave", "2", 3)]);
        assert!(matches!(
            Dataset::build(&takes, None),
            Err(Error::InsufficientClasses { found: 1, .. })
        ));
    }
}
