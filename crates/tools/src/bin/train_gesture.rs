//! ジェスチャ分類器の学習と int8 エクスポート
//!
//! `data/` の CSV（省略時は数値名が最大のもの）から固定長サンプルを作り、
//! MLP を学習して `models/<YYYYMMDD_HHMMSS>.gq8` に完全整数量子化モデルを書き出す。
//! 設定はカレントディレクトリの `gesture.toml` があれば読む。

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use gesture_core::{CONFIG_FILE_NAME, PipelineConfig};
use gesture_nn::{Int8Codec, MlpClassifier, TrainConfig};
use tools::common::logging;

#[derive(Parser, Debug)]
#[command(name = "train_gesture")]
#[command(about = "収録済みテイクから分類器を学習し int8 モデルを書き出す")]
struct Cli {
    /// 使用するデータセット ID（data/<ID>.csv）。省略時は最新
    dataset_id: Option<String>,
}

fn run(cli: &Cli) -> Result<()> {
    let config = PipelineConfig::load_or_default(Path::new(CONFIG_FILE_NAME))
        .context("failed to load configuration")?;

    let model = MlpClassifier::new(TrainConfig::from_training(&config.training, config.seed));
    let report =
        gesture_core::pipeline::run(&config, cli.dataset_id.as_deref(), model, &Int8Codec::new())?;

    log::info!(
        "Trained on {} ({} train / {} test, {} calibration samples)",
        report.input.display(),
        report.train_samples,
        report.test_samples,
        report.calibration_samples
    );
    log::info!("Saved quantized model to {}", report.artifact.display());
    println!("{}", report.artifact.display());
    Ok(())
}

fn main() {
    logging::init("info");
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
