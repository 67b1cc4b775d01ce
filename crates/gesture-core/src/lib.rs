//! ジェスチャ分類器のデータセット構築と int8 エクスポート
//!
//! センサの「テイク」単位で収録された行を固定長サンプルに変換し、
//! 層化分割・標準化したうえで学習し、実データでキャリブレーションした
//! 完全整数量子化モデルを書き出す。
//!
//! # 構成
//! - `take`: 行 → テイク集約
//! - `sequence` / `dataset`: 固定長化とラベル付け
//! - `label`: ラベル表
//! - `split`: 層化 train/test 分割
//! - `standardize`: train 統計による標準化
//! - `calibration`: キャリブレーションサンプル
//! - `export`: 量子化コーデック呼び出しと成果物保存
//! - `model`: 学習可能モデルの trait
//! - `source` / `collector`: CSV の読み書きと入力選択
//! - `pipeline`: 全体の実行

pub mod calibration;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod label;
pub mod model;
pub mod pipeline;
pub mod sequence;
pub mod source;
pub mod split;
pub mod standardize;
pub mod take;
pub mod types;

pub use calibration::{CalibrationBatch, CalibrationSet, DEFAULT_CALIBRATION_SAMPLES};
pub use config::{CONFIG_FILE_NAME, PipelineConfig, TrainingConfig};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use export::{
    ARTIFACT_EXTENSION, NumericType, QuantizationCodec, QuantizationExporter, QuantizationOptions,
};
pub use label::LabelMap;
pub use model::{Evaluation, ModelShape, TrainableModel, TrainedModel};
pub use pipeline::{PipelineReport, PreparedData};
pub use split::{DatasetSplit, Subset};
pub use standardize::StandardizationStats;
pub use take::{Take, TakeAggregator, TakeSet};
pub use types::{Row, Sample, TakeKey};
