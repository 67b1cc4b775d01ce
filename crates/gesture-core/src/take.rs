//! テイク集約
//!
//! 行ストリームを `(label, take_id)` ごとにまとめ、シーケンス番号順に並べる。
//! 特徴量数 F は集約開始時に一度だけ宣言し、全行をそれに対して検査する。

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{Row, TakeKey};

/// 1テイク分の行（シーケンス番号, 特徴量）
#[derive(Debug, Clone)]
pub struct Take {
    pub key: TakeKey,
    pub rows: Vec<(u64, Vec<f32>)>,
}

impl Take {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 集約済みのテイク集合（キーの初出順）
#[derive(Debug, Clone)]
pub struct TakeSet {
    feature_count: usize,
    takes: Vec<Take>,
}

impl TakeSet {
    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn takes(&self) -> &[Take] {
        &self.takes
    }

    pub fn len(&self) -> usize {
        self.takes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }

    /// 各テイクの行数
    pub fn lengths(&self) -> Vec<usize> {
        self.takes.iter().map(Take::len).collect()
    }
}

/// テイクアグリゲータ
pub struct TakeAggregator {
    feature_count: usize,
    takes: Vec<Take>,
    index: HashMap<TakeKey, usize>,
    rows_consumed: usize,
}

impl TakeAggregator {
    /// 特徴量数 F を宣言して作成
    pub fn new(feature_count: usize) -> Result<Self> {
        if feature_count == 0 {
            return Err(Error::InvalidConfig("feature count must be at least 1".into()));
        }
        Ok(Self {
            feature_count,
            takes: Vec::new(),
            index: HashMap::new(),
            rows_consumed: 0,
        })
    }

    /// 1行を追加する。`line` はエラー報告用の行番号。
    pub fn push(&mut self, line: usize, row: Row) -> Result<()> {
        if row.values.len() != self.feature_count {
            return Err(Error::schema(
                line,
                format!(
                    "expected {} values, found {} (take {}#{})",
                    self.feature_count,
                    row.values.len(),
                    row.label,
                    row.take_id
                ),
            ));
        }
        if row.sequence_index == 0 {
            return Err(Error::schema(line, "sequence_index must be >= 1"));
        }

        let key = TakeKey::new(row.label, row.take_id);
        let slot = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.takes.len();
                self.index.insert(key.clone(), i);
                self.takes.push(Take {
                    key,
                    rows: Vec::new(),
                });
                i
            }
        };
        self.takes[slot].rows.push((row.sequence_index, row.values));
        self.rows_consumed += 1;
        Ok(())
    }

    pub fn rows_consumed(&self) -> usize {
        self.rows_consumed
    }

    /// 集約を終了し、各テイクをシーケンス番号で安定ソートする
    pub fn finish(mut self) -> Result<TakeSet> {
        if self.rows_consumed == 0 {
            return Err(Error::EmptyInput);
        }
        if self.takes.is_empty() {
            return Err(Error::NoTakes);
        }
        // 重複したシーケンス番号は到着順を保持する（sort_by_key は安定ソート）
        for take in &mut self.takes {
            take.rows.sort_by_key(|(seq, _)| *seq);
        }
        Ok(TakeSet {
            feature_count: self.feature_count,
            takes: self.takes,
        })
    }
}

/// `(行番号, Row)` のストリームを集約する
pub fn aggregate<I>(feature_count: usize, rows: I) -> Result<TakeSet>
where
    I: IntoIterator<Item = Result<(usize, Row)>>,
{
    let mut aggregator = TakeAggregator::new(feature_count)?;
    for item in rows {
        let (line, row) = item?;
        aggregator.push(line, row)?;
    }
    let takes = aggregator.finish()?;
    log::info!(
        "Aggregated {} takes from {} gestures",
        takes.len(),
        takes
            .takes()
            .iter()
            .map(|t| t.key.label.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .len()
    );
    Ok(takes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: &str, take: &str, seq: u64, v: f32) -> Row {
        Row {
            label: label.to_string(),
            take_id: take.to_string(),
            sequence_index: seq,
            values: vec![v, v],
        }
    }

    #[test]
    fn rows_are_grouped_and_sorted() {
        let mut agg = TakeAggregator::new(2).unwrap();
        agg.push(2, row("wave", "1", 3, 3.0)).unwrap();
        agg.push(3, row("punch", "2", 1, 10.0)).unwrap();
        agg.push(4, row("wave", "1", 1, 1.0)).unwrap();
        agg.push(5, row("wave", "1", 2, 2.0)).unwrap();

        let set = agg.finish().unwrap();
        assert_eq!(set.len(), 2);
        // キーの初出順
        assert_eq!(set.takes()[0].key, TakeKey::new("wave", "1"));
        let seqs: Vec<u64> = set.takes()[0].rows.iter().map(|(s, _)| *s).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(set.lengths(), vec![3, 1]);
    }

    #[test]
    fn duplicate_sequence_index_keeps_arrival_order() {
        let mut agg = TakeAggregator::new(2).unwrap();
        agg.push(2, row("wave", "1", 2, 20.0)).unwrap();
        agg.push(3, row("wave", "1", 1, 10.0)).unwrap();
        agg.push(4, row("wave", "1", 2, 21.0)).unwrap();

        let set = agg.finish().unwrap();
        let values: Vec<f32> = set.takes()[0].rows.iter().map(|(_, v)| v[0]).collect();
        assert_eq!(values, vec![10.0, 20.0, 21.0]);
    }

    #[test]
    fn mismatched_value_count_is_schema_error() {
        let mut agg = TakeAggregator::new(3).unwrap();
        let err = agg.push(7, row("wave", "1", 1, 1.0)).unwrap_err();
        match err {
            Error::Schema { line, reason } => {
                assert_eq!(line, 7);
                assert!(reason.contains("expected 3 values, found 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_sequence_index_is_rejected() {
        let mut agg = TakeAggregator::new(2).unwrap();
        assert!(matches!(
            agg.push(2, row("wave", "1", 0, 1.0)),
            Err(Error::Schema { line: 2, .. })
        ));
    }

    #[test]
    fn empty_input_is_an_error() {
        let agg = TakeAggregator::new(2).unwrap();
        assert!(matches!(agg.finish(), Err(Error::EmptyInput)));
    }

    #[test]
    fn schema_error_aborts_stream_aggregation() {
        let rows = vec![
            Ok((2, row("wave", "1", 1, 1.0))),
            Ok((
                3,
                Row {
                    label: "wave".into(),
                    take_id: "1".into(),
                    sequence_index: 2,
                    values: vec![1.0],
                },
            )),
            Ok((4, row("punch", "2", 1, 1.0))),
        ];
        assert!(matches!(aggregate(2, rows), Err(Error::Schema { line: 3, .. })));
    }

    #[test]
    fn zero_feature_count_is_rejected() {
        assert!(matches!(TakeAggregator::new(0), Err(Error::InvalidConfig(_))));
    }
}
