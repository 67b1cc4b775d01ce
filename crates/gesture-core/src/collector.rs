//! テイク収録（上流データ生成側）
//!
//! センサ側の行プロトコルを `Row` に変換し、学習側が読むCSVとして書き出す。
//!
//! - `@<label>`: 新しいテイクの開始（テイク番号は全ラベル通しで +1）
//! - `#<seq>\t<v1>\t...\t<vF>`: データ行。シーケンス番号は受信順に振り直す
//! - それ以外: 無視

use std::io::{self, Write};

use crate::types::Row;

/// センサが送る特徴量数の既定値
pub const DEFAULT_FEATURE_COUNT: usize = 6;

/// 1行を処理した結果
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// 新しいテイクが始まった
    TakeStarted { label: String, take_number: u64 },
    /// データ行
    Row(Row),
    /// 値が足りない、または数値でないデータ行
    Malformed { line: String, reason: String },
    /// 空行・テイク開始前のデータ行・未知の行
    Ignored(String),
}

/// 行プロトコルの状態機械
pub struct TakeRecorder {
    feature_count: usize,
    take_number: u64,
    label: Option<String>,
    seq: u64,
}

impl TakeRecorder {
    pub fn new(feature_count: usize) -> Self {
        Self {
            feature_count,
            take_number: 0,
            label: None,
            seq: 0,
        }
    }

    /// 収録済みテイク数
    pub fn takes(&self) -> u64 {
        self.take_number
    }

    pub fn feed(&mut self, raw: &str) -> LineEvent {
        let line = raw.trim();
        if line.is_empty() {
            return LineEvent::Ignored(String::new());
        }

        if let Some(label) = line.strip_prefix('@') {
            let label = label.trim();
            if label.is_empty() {
                return LineEvent::Ignored(line.to_string());
            }
            self.take_number += 1;
            self.seq = 0;
            self.label = Some(label.to_string());
            return LineEvent::TakeStarted {
                label: label.to_string(),
                take_number: self.take_number,
            };
        }

        let Some(label) = self.label.as_ref() else {
            return LineEvent::Ignored(line.to_string());
        };
        if !line.starts_with('#') {
            return LineEvent::Ignored(line.to_string());
        }

        // 先頭列はセンサ側のシーケンス番号。使わない
        let parts: Vec<&str> = line.split('\t').skip(1).collect();
        if parts.len() < self.feature_count {
            return LineEvent::Malformed {
                line: line.to_string(),
                reason: format!(
                    "not enough values: expected {}, found {}",
                    self.feature_count,
                    parts.len()
                ),
            };
        }
        let mut values = Vec::with_capacity(self.feature_count);
        for v in &parts[..self.feature_count] {
            match v.trim().parse::<f32>() {
                Ok(x) => values.push(x),
                Err(_) => {
                    return LineEvent::Malformed {
                        line: line.to_string(),
                        reason: format!("invalid value {v:?}"),
                    };
                }
            }
        }

        self.seq += 1;
        LineEvent::Row(Row {
            label: label.clone(),
            take_id: self.take_number.to_string(),
            sequence_index: self.seq,
            values,
        })
    }
}

/// テイク内でこのシーケンス番号ごとに進捗を出す
pub const PROGRESS_INTERVAL: u64 = 10;

/// 進捗ログを出す行か（テイク内のシーケンス番号で判定する）
pub fn is_progress_row(row: &Row) -> bool {
    row.sequence_index % PROGRESS_INTERVAL == 0
}

/// 学習側が読むCSVのヘッダ
pub fn csv_header(feature_count: usize) -> Vec<String> {
    let mut header: Vec<String> = ["gesture_name", "take_number", "seq_num"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend((1..=feature_count).map(|i| format!("val{i}")));
    header
}

/// 1行ごとに flush するCSVライタ（途中で中断されても書いた分は残る）
///
/// ラベルに `,` や `"` が含まれる場合はクォートされる。
pub struct CsvRowWriter<W: Write> {
    inner: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> CsvRowWriter<W> {
    pub fn new(inner: W, feature_count: usize) -> io::Result<Self> {
        let mut inner = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        inner.write_record(csv_header(feature_count))?;
        inner.flush()?;
        Ok(Self { inner, rows: 0 })
    }

    pub fn write_row(&mut self, row: &Row) -> io::Result<()> {
        let mut record = Vec::with_capacity(3 + row.values.len());
        record.push(row.label.clone());
        record.push(row.take_id.clone());
        record.push(row.sequence_index.to_string());
        record.extend(row.values.iter().map(|v| v.to_string()));
        self.inner.write_record(&record)?;
        self.inner.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}
