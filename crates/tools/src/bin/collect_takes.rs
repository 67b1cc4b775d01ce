//! テイク収録ツール
//!
//! センサの行プロトコル（`@<label>` でテイク開始、`#<seq>\t<v1>\t...` がデータ）を
//! 読み、`data/<unix_seconds>.csv` に書き出す。Ctrl-C で終了する。

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;

use gesture_core::collector::{
    CsvRowWriter, DEFAULT_FEATURE_COUNT, LineEvent, TakeRecorder, is_progress_row,
};
use tools::common::{io, logging};

#[derive(Parser, Debug)]
#[command(name = "collect_takes")]
#[command(about = "センサのテイクを受信して学習用CSVに保存する")]
struct Cli {
    /// 入力（シリアルデバイス、ファイル、または標準入力の `-`）
    #[arg(default_value = "-")]
    input: PathBuf,

    /// 出力ディレクトリ
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// 1行あたりの値の数
    #[arg(long, default_value_t = DEFAULT_FEATURE_COUNT)]
    features: usize,
}

fn main() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();
    if cli.features == 0 {
        bail!("--features must be >= 1");
    }

    let mut reader = io::open_reader(&cli.input)
        .with_context(|| format!("failed to open {}", cli.input.display()))?;
    let (path, file) = io::create_session_file(&cli.data_dir, Utc::now().timestamp())
        .with_context(|| format!("failed to create session file in {}", cli.data_dir.display()))?;
    let mut writer = CsvRowWriter::new(file, cli.features)?;
    log::info!("Recording to {}", path.display());

    // 行ごとに flush 済みなので、中断時はそのまま終了してよい
    let rows = Arc::new(AtomicU64::new(0));
    {
        let rows = Arc::clone(&rows);
        let path = path.clone();
        ctrlc::set_handler(move || {
            log::info!(
                "Stopped; {} rows saved to {}",
                rows.load(Ordering::Relaxed),
                path.display()
            );
            std::process::exit(0);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let mut recorder = TakeRecorder::new(cli.features);
    let mut buf = Vec::new();
    while let Some(line) =
        io::read_line_lossy(reader.as_mut(), &mut buf).context("failed to read input")?
    {
        if let Cow::Owned(_) = line {
            log::warn!("Input line is not valid UTF-8; invalid bytes replaced");
        }
        match recorder.feed(&line) {
            LineEvent::TakeStarted { label, take_number } => {
                log::info!("Take {take_number}: {label}");
            }
            LineEvent::Row(row) => {
                writer.write_row(&row)?;
                let n = writer.rows_written();
                rows.store(n, Ordering::Relaxed);
                if is_progress_row(&row) {
                    log::info!("{}#{} seq {} ({n} rows)", row.label, row.take_id, row.sequence_index);
                }
            }
            LineEvent::Malformed { line, reason } => {
                log::warn!("Skipping line {line:?}: {reason}");
            }
            LineEvent::Ignored(line) => {
                if !line.is_empty() {
                    log::debug!("Ignored: {line}");
                }
            }
        }
    }

    log::info!(
        "Input closed; {} takes, {} rows saved to {}",
        recorder.takes(),
        writer.rows_written(),
        path.display()
    );
    Ok(())
}
