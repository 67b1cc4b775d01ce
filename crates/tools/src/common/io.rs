//! ファイルI/Oユーティリティ

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

const READER_BUF_CAP: usize = 8 * 1024;

/// 入力を開く。`-` は標準入力
///
/// シリアルデバイスも通常のファイルとして開く（ボーレート等は事前に設定しておく）。
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// 1行読む。UTF-8 として不正なバイトは U+FFFD に置き換える
///
/// EOF なら `None`。置き換えが起きた行は `Cow::Owned` で返る。
pub fn read_line_lossy<'a>(
    reader: &mut dyn BufRead,
    buf: &'a mut Vec<u8>,
) -> io::Result<Option<Cow<'a, str>>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf)))
}

/// `<data_dir>/<unix_seconds>.csv` を作成する
pub fn create_session_file(data_dir: &Path, unix_seconds: i64) -> io::Result<(PathBuf, BufWriter<File>)> {
    fs::create_dir_all(data_dir)?;
    let path = data_dir.join(format!("{unix_seconds}.csv"));
    let file = File::options().write(true).create_new(true).open(&path)?;
    Ok((path, BufWriter::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn session_file_is_named_by_unix_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let (path, _writer) = create_session_file(&data, 1_700_000_000).unwrap();
        assert_eq!(path, data.join("1700000000.csv"));
        assert!(path.is_file());

        // 同じ秒のセッションは上書きしない
        let err = create_session_file(&data, 1_700_000_000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn reader_opens_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "@wave\n").unwrap();
        let mut s = String::new();
        open_reader(&path).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "@wave\n");
    }

    #[test]
    fn invalid_utf8_lines_are_replaced_not_rejected() {
        let mut input: &[u8] = b"@wave\n\xff\xfe\n#1\t1";
        let mut buf = Vec::new();
        let mut lines = Vec::new();
        while let Some(line) = read_line_lossy(&mut input, &mut buf).unwrap() {
            lines.push((line.trim_end().to_string(), matches!(line, Cow::Owned(_))));
        }
        assert_eq!(
            lines,
            vec![
                ("@wave".to_string(), false),
                ("\u{FFFD}\u{FFFD}".to_string(), true),
                ("#1\t1".to_string(), false),
            ]
        );
    }
}
