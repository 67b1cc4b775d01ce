//! パイプライン全体
//!
//! ```text
//! CSV → テイク集約 → ラベル表 + 正規化 → 層化分割 → 標準化
//!     → 学習 → キャリブレーション抽出 → 量子化エクスポート
//! ```
//!
//! 乱数源はシードから一度だけ作り、分割 → キャリブレーション抽出の順に明示的に渡す。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::calibration::CalibrationSet;
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::export::{QuantizationCodec, QuantizationExporter};
use crate::label::LabelMap;
use crate::model::{Evaluation, ModelShape, TrainableModel, evaluate};
use crate::source::{RowReader, select_input};
use crate::split::{Subset, stratified_split};
use crate::standardize::{StandardizationStats, standardize};
use crate::take::aggregate;

/// 学習直前までの前処理結果
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub label_map: LabelMap,
    pub target_length: usize,
    pub feature_count: usize,
    pub stats: StandardizationStats,
    /// 標準化済み
    pub train: Subset,
    /// 標準化済み
    pub test: Subset,
}

impl PreparedData {
    pub fn input_dim(&self) -> usize {
        self.target_length * self.feature_count
    }

    pub fn shape(&self) -> ModelShape {
        ModelShape {
            input_dim: self.input_dim(),
            num_classes: self.label_map.num_classes(),
        }
    }
}

/// 実行結果
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub input: PathBuf,
    pub artifact: PathBuf,
    pub metadata: PathBuf,
    pub evaluation: Evaluation,
    pub train_samples: usize,
    pub test_samples: usize,
    pub calibration_samples: usize,
}

/// 成果物と一緒に保存する入力変換の情報
#[derive(Debug, Serialize)]
struct ArtifactMetadata<'a> {
    artifact: String,
    source_csv: String,
    seed: u64,
    labels: &'a LabelMap,
    target_length: usize,
    feature_count: usize,
    input_dim: usize,
    standardization: &'a StandardizationStats,
    train_samples: usize,
    test_samples: usize,
    calibration_samples: usize,
    test_evaluation: Evaluation,
}

/// 読み込み済みの行ストリームから前処理を行う
pub fn prepare_rows<I, R>(
    rows: I,
    feature_count: usize,
    config: &PipelineConfig,
    rng: &mut R,
) -> Result<PreparedData>
where
    I: IntoIterator<Item = Result<(usize, crate::types::Row)>>,
    R: Rng + ?Sized,
{
    let takes = aggregate(feature_count, rows)?;
    let dataset = Dataset::build(&takes, config.target_length)?;
    let split = stratified_split(&dataset.samples, config.test_ratio, rng)?;
    let (stats, train, test) = standardize(&split.train, &split.test, dataset.input_dim());

    Ok(PreparedData {
        label_map: dataset.label_map,
        target_length: dataset.target_length,
        feature_count: dataset.feature_count,
        stats,
        train,
        test,
    })
}

/// CSVファイルから前処理を行う
pub fn prepare_file<R: Rng + ?Sized>(
    path: &Path,
    config: &PipelineConfig,
    rng: &mut R,
) -> Result<PreparedData> {
    let reader = RowReader::open(path)?;
    let feature_count = match config.feature_count {
        Some(declared) if declared != reader.feature_count() => {
            return Err(Error::Schema {
                line: 1,
                reason: format!(
                    "header declares {} value columns but feature_count = {declared}",
                    reader.feature_count()
                ),
            });
        }
        Some(declared) => declared,
        None => reader.feature_count(),
    };
    prepare_rows(reader, feature_count, config, rng)
}

/// パイプラインを最後まで実行する
pub fn run<M, C>(
    config: &PipelineConfig,
    identifier: Option<&str>,
    model: M,
    codec: &C,
) -> Result<PipelineReport>
where
    M: TrainableModel,
    C: QuantizationCodec,
{
    config.validate()?;
    let input = select_input(&config.data_dir, identifier)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let prepared = prepare_file(&input, config, &mut rng)?;
    let shape = prepared.shape();

    log::info!(
        "Starting training: epochs={}, batch_size={}",
        config.training.epochs,
        config.training.batch_size
    );
    let trained = model
        .fit(shape, &prepared.train, &prepared.test)
        .map_err(|e| Error::Training { source: Box::new(e) })?;

    let evaluation = evaluate(&trained, &prepared.test);
    log::info!(
        "Final evaluation on test set: loss={:.4}, acc={:.4}",
        evaluation.loss,
        evaluation.accuracy
    );

    let calibration = CalibrationSet::sample(&prepared.train, config.calibration_samples, &mut rng);
    let exporter = QuantizationExporter::new(codec, &config.models_dir);
    let artifact = exporter.export(&trained, &calibration)?;

    let metadata = write_metadata(&artifact, &input, config, &prepared, &calibration, evaluation)?;

    Ok(PipelineReport {
        input,
        artifact,
        metadata,
        evaluation,
        train_samples: prepared.train.len(),
        test_samples: prepared.test.len(),
        calibration_samples: calibration.len(),
    })
}

fn write_metadata(
    artifact: &Path,
    input: &Path,
    config: &PipelineConfig,
    prepared: &PreparedData,
    calibration: &CalibrationSet,
    evaluation: Evaluation,
) -> Result<PathBuf> {
    let path = artifact.with_extension("json");
    let meta = ArtifactMetadata {
        artifact: artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source_csv: input.display().to_string(),
        seed: config.seed,
        labels: &prepared.label_map,
        target_length: prepared.target_length,
        feature_count: prepared.feature_count,
        input_dim: prepared.input_dim(),
        standardization: &prepared.stats,
        train_samples: prepared.train.len(),
        test_samples: prepared.test.len(),
        calibration_samples: calibration.len(),
        test_evaluation: evaluation,
    };
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, &meta)?;
    writeln!(writer)?;
    writer.flush()?;
    log::info!("Saved metadata to {}", path.display());
    Ok(path)
}
