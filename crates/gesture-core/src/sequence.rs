//! シーケンス正規化
//!
//! 可変長のテイクを `target_length` 行にゼロパディング／切り詰めし、
//! `target_length * F` の1次元ベクトルに平坦化する。

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::label::LabelMap;
use crate::take::{Take, TakeSet};
use crate::types::Sample;

/// テイク長の最頻値（同数の場合は最小の長さ）
pub fn mode_length(lengths: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &len in lengths {
        *counts.entry(len).or_default() += 1;
    }
    // BTreeMap は長さの昇順。最大カウントを厳密に上回った時だけ更新する
    let mut best: Option<(usize, usize)> = None;
    for (len, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((len, count));
        }
    }
    best.map(|(len, _)| len)
}

/// 明示指定がなければ最頻値から target_length を決める
pub fn resolve_target_length(takes: &TakeSet, explicit: Option<usize>) -> Result<usize> {
    match explicit {
        Some(0) => Err(Error::InvalidConfig("target_length must be at least 1".into())),
        Some(n) => Ok(n),
        None => mode_length(&takes.lengths()).ok_or(Error::NoTakes),
    }
}

/// 1テイクを固定長の平坦ベクトルに変換する
pub fn normalize_take(take: &Take, target_length: usize, feature_count: usize) -> Vec<f32> {
    let mut flat = Vec::with_capacity(target_length * feature_count);
    for (_, values) in take.rows.iter().take(target_length) {
        flat.extend_from_slice(values);
    }
    // 不足分は末尾にゼロベクトル
    flat.resize(target_length * feature_count, 0.0);
    flat
}

/// 全テイクをサンプル化する（テイクの順序を保持）
pub fn build_samples(
    takes: &TakeSet,
    labels: &LabelMap,
    target_length: usize,
) -> Result<Vec<Sample>> {
    let feature_count = takes.feature_count();
    takes
        .takes()
        .iter()
        .map(|take| {
            let label = labels.id(&take.key.label).ok_or_else(|| {
                Error::InvalidConfig(format!("label {:?} missing from label map", take.key.label))
            })?;
            Ok(Sample {
                features: normalize_take(take, target_length, feature_count),
                label,
            })
        })
        .collect()
}
