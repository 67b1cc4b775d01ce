//! 量子化エクスポート
//!
//! 学習済みモデルをステージングディレクトリに書き出し、外部コーデックで
//! 完全整数 (int8) 量子化した成果物を `<models_dir>/<YYYYMMDD_HHMMSS>.gq8` に保存する。
//! ステージングは成功・失敗どちらの経路でも削除される。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::calibration::CalibrationSet;
use crate::error::{Error, Result};
use crate::model::TrainedModel;

/// 成果物の拡張子
pub const ARTIFACT_EXTENSION: &str = "gq8";

/// 成果物ファイル名のタイムスタンプ形式
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const STAGING_PREFIX: &str = ".staging-";

/// テンソルの数値型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    Float32,
    Int8,
}

/// コーデックへの量子化要求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantizationOptions {
    pub weights: NumericType,
    pub activations: NumericType,
    pub input: NumericType,
    pub output: NumericType,
}

impl QuantizationOptions {
    /// 重み・活性・入出力すべて int8
    pub fn full_integer() -> Self {
        Self {
            weights: NumericType::Int8,
            activations: NumericType::Int8,
            input: NumericType::Int8,
            output: NumericType::Int8,
        }
    }

    pub fn is_full_integer(&self) -> bool {
        *self == Self::full_integer()
    }
}

/// 外部量子化コーデック
pub trait QuantizationCodec {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `saved_model` にエクスポートされたモデルを量子化し、成果物のバイト列を返す。
    /// `calibration` は複数回走査してよい。
    fn quantize(
        &self,
        saved_model: &Path,
        calibration: &CalibrationSet,
        options: &QuantizationOptions,
    ) -> std::result::Result<Vec<u8>, Self::Error>;
}

/// タイムスタンプから成果物ファイル名を作る
pub fn artifact_file_name(timestamp: &NaiveDateTime) -> String {
    format!("{}.{ARTIFACT_EXTENSION}", timestamp.format(TIMESTAMP_FORMAT))
}

/// 量子化エクスポータ
pub struct QuantizationExporter<'a, C: QuantizationCodec> {
    codec: &'a C,
    models_dir: PathBuf,
}

impl<'a, C: QuantizationCodec> QuantizationExporter<'a, C> {
    pub fn new(codec: &'a C, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            codec,
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// 現在時刻のタイムスタンプでエクスポート
    pub fn export<M: TrainedModel + ?Sized>(
        &self,
        model: &M,
        calibration: &CalibrationSet,
    ) -> Result<PathBuf> {
        self.export_at(model, calibration, Local::now().naive_local())
    }

    /// 指定タイムスタンプでエクスポート
    pub fn export_at<M: TrainedModel + ?Sized>(
        &self,
        model: &M,
        calibration: &CalibrationSet,
        timestamp: NaiveDateTime,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.models_dir)?;
        let output_path = self.models_dir.join(artifact_file_name(&timestamp));
        log::info!("Converting final model to int8 -> {}", output_path.display());

        // TempDir は Drop で削除されるので、途中の `?` でもステージングは残らない
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.models_dir)?;
        log::debug!("Staging export at {}", staging.path().display());

        model.export_saved_model(staging.path())?;

        let artifact = self
            .codec
            .quantize(staging.path(), calibration, &QuantizationOptions::full_integer())
            .map_err(|e| {
                log::error!("Quantization failed: {e}");
                Error::Quantization { source: Box::new(e) }
            })?;

        fs::write(&output_path, &artifact)?;
        log::info!(
            "Saved quantized model to {} ({} bytes)",
            output_path.display(),
            artifact.len()
        );

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            log::warn!("Failed to remove staging dir {}: {e}", staging_path.display());
        }
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn artifact_name_uses_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2026, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 1)
            .unwrap();
        assert_eq!(artifact_file_name(&ts), "20260307_090501.gq8");
    }

    #[test]
    fn full_integer_requests_int8_everywhere() {
        let opts = QuantizationOptions::full_integer();
        assert!(opts.is_full_integer());
        assert_eq!(opts.input, NumericType::Int8);
        let mixed = QuantizationOptions {
            output: NumericType::Float32,
            ..opts
        };
        assert!(!mixed.is_full_integer());
    }
}
