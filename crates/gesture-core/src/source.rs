//! 入力CSVの選択と読み込み
//!
//! ヘッダ: `label, take_id, sequence_index, value_1 .. value_F`
//! F はヘッダの列数から決まる。値の個数の検査はテイク集約時に行う。
//! フィールドは CSV のクォート規則に従う（`"wave, fast"` は1列）。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{Error, Result};
use crate::types::Row;

/// label, take_id, sequence_index の3列
const KEY_COLUMNS: usize = 3;

/// 入力CSVを決める
///
/// `identifier` 指定時は `<data_dir>/<identifier>.csv` が必須。
/// 未指定時は stem を整数として解釈できるCSVのうち最大のもの。
pub fn select_input(data_dir: &Path, identifier: Option<&str>) -> Result<PathBuf> {
    if let Some(id) = identifier.map(str::trim).filter(|s| !s.is_empty()) {
        let path = data_dir.join(format!("{id}.csv"));
        if !path.is_file() {
            return Err(Error::InputNotFound(format!(
                "requested CSV {} not found",
                path.display()
            )));
        }
        return Ok(path);
    }

    let entries = std::fs::read_dir(data_dir).map_err(|e| {
        Error::InputNotFound(format!("cannot read data dir {}: {e}", data_dir.display()))
    })?;

    let mut best: Option<(i128, PathBuf)> = None;
    let mut csv_seen = 0usize;
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        csv_seen += 1;
        let Some(n) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i128>().ok())
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(b, _)| n > *b) {
            best = Some((n, path));
        }
    }

    match best {
        Some((_, path)) => Ok(path),
        None if csv_seen == 0 => Err(Error::InputNotFound(format!(
            "no CSV files found in {}",
            data_dir.display()
        ))),
        None => Err(Error::InputNotFound(format!(
            "no numerically-named CSVs found in {}",
            data_dir.display()
        ))),
    }
}

/// 1データ行をパースする（値の個数はここでは検査しない）
pub fn parse_record(line_no: usize, record: &StringRecord) -> Result<Row> {
    if record.len() < KEY_COLUMNS {
        return Err(Error::schema(
            line_no,
            format!("expected at least {KEY_COLUMNS} key columns, found {}", record.len()),
        ));
    }
    let seq = &record[2];
    let sequence_index = seq
        .parse::<u64>()
        .map_err(|_| Error::schema(line_no, format!("invalid sequence_index {seq:?}")))?;
    let values = record
        .iter()
        .skip(KEY_COLUMNS)
        .map(|v| {
            v.parse::<f32>()
                .map_err(|_| Error::schema(line_no, format!("invalid value {v:?}")))
        })
        .collect::<Result<Vec<f32>>>()?;
    Ok(Row {
        label: record[0].to_string(),
        take_id: record[1].to_string(),
        sequence_index,
        values,
    })
}

/// CSV行リーダ。`(行番号, Row)` を順に返す。
///
/// レコードは1行1件。行番号は空行も含めて数える。
pub struct RowReader<R: BufRead> {
    inner: R,
    fields: ReaderBuilder,
    buf: Vec<u8>,
    record: StringRecord,
    line_no: usize,
    feature_count: usize,
}

impl RowReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Loading CSV: {}", path.display());
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> RowReader<R> {
    /// ヘッダを読み、F を決める
    pub fn new(inner: R) -> Result<Self> {
        let mut fields = ReaderBuilder::new();
        // 列数の検査はテイク集約に任せる
        fields.has_headers(false).flexible(true).trim(Trim::All);
        let mut reader = Self {
            inner,
            fields,
            buf: Vec::new(),
            record: StringRecord::new(),
            line_no: 0,
            feature_count: 0,
        };
        if !reader.read_line()? {
            return Err(Error::EmptyInput);
        }
        let columns = reader.record.iter().filter(|c| !c.is_empty()).count();
        if columns <= KEY_COLUMNS {
            return Err(Error::schema(
                1,
                format!("header declares no value columns: {:?}", reader.record),
            ));
        }
        reader.feature_count = columns - KEY_COLUMNS;
        Ok(reader)
    }

    /// ヘッダから決まった特徴量数
    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// 次の1行を `self.record` に読む。EOF なら false
    fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        let mut fields = self.fields.from_reader(self.buf.as_slice());
        match fields.read_record(&mut self.record) {
            Ok(true) => {}
            // 空行
            Ok(false) => self.record.clear(),
            Err(e) => return Err(Error::schema(self.line_no, e.to_string())),
        }
        Ok(true)
    }
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = Result<(usize, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
            if self.record.iter().all(str::is_empty) {
                continue;
            }
            let line_no = self.line_no;
            return Some(parse_record(line_no, &self.record).map(|row| (line_no, row)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_declares_feature_count() {
        let csv = "gesture_name,take_number,seq_num,val1,val2\nwave,1,1,0.5,-1\n\nwave,1,2, 1.5 ,2\n";
        let reader = RowReader::new(csv.as_bytes()).unwrap();
        assert_eq!(reader.feature_count(), 2);
        let rows: Vec<(usize, Row)> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        // 空行も行番号に数える
        assert_eq!(rows[1].0, 4);
        assert_eq!(rows[1].1.values, vec![1.5, 2.0]);
        assert_eq!(rows[1].1.take_id, "1");
    }

    #[test]
    fn empty_file_is_empty_input() {
        assert!(matches!(RowReader::new("".as_bytes()), Err(Error::EmptyInput)));
    }

    #[test]
    fn bad_sequence_index_names_the_line() {
        let csv = "label,take_id,sequence_index,v1\nwave,1,x,0.1\n";
        let mut reader = RowReader::new(csv.as_bytes()).unwrap();
        match reader.next() {
            Some(Err(Error::Schema { line, reason })) => {
                assert_eq!(line, 2);
                assert!(reason.contains("sequence_index"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn header_without_values_is_rejected() {
        assert!(matches!(
            RowReader::new("label,take_id,sequence_index\n".as_bytes()),
            Err(Error::Schema { line: 1, .. })
        ));
    }

    #[test]
    fn quoted_label_round_trips_through_writer() {
        use crate::collector::CsvRowWriter;

        let row = Row {
            label: "wave, fast".into(),
            take_id: "1".into(),
            sequence_index: 1,
            values: vec![1.0, 0.5, 1.0],
        };
        let mut buf = Vec::new();
        CsvRowWriter::new(&mut buf, 3).unwrap().write_row(&row).unwrap();

        let reader = RowReader::new(buf.as_slice()).unwrap();
        assert_eq!(reader.feature_count(), 3);
        let rows: Vec<(usize, Row)> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![(2, row)]);
    }

    #[test]
    fn invalid_utf8_row_names_the_line() {
        let mut csv = b"label,take_id,sequence_index,v1\nwave,1,1,0.1\n".to_vec();
        csv.extend_from_slice(b"w\xffve,1,2,0.2\n");
        let results: Vec<Result<(usize, Row)>> = RowReader::new(csv.as_slice()).unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Schema { line: 3, .. })), "{results:?}");
    }
}
