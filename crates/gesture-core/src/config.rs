//! パイプライン設定
//!
//! カレントディレクトリの `gesture.toml` があれば読み込み、なければデフォルト値を使う。
//!
//! ```toml
//! data_dir = "data"
//! models_dir = "models"
//! seed = 42
//! test_ratio = 0.2
//!
//! [training]
//! epochs = 20
//! batch_size = 8
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::calibration::DEFAULT_CALIBRATION_SAMPLES;
use crate::error::{Error, Result};

/// 既定の設定ファイル名
pub const CONFIG_FILE_NAME: &str = "gesture.toml";

/// モデル学習の設定
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// エポック数
    pub epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 隠れ層のユニット数
    pub hidden_units: usize,
    /// 学習率
    pub learning_rate: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 8,
            hidden_units: 64,
            learning_rate: 0.001,
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// 入力CSVのディレクトリ
    pub data_dir: PathBuf,
    /// 成果物の出力先
    pub models_dir: PathBuf,
    /// 乱数シード（分割・キャリブレーション抽出・モデル初期化）
    pub seed: u64,
    /// test に回す割合 (0, 1)
    pub test_ratio: f64,
    /// キャリブレーションサンプル数の上限
    pub calibration_samples: usize,
    /// テイクの固定長（省略時は最頻値）
    pub target_length: Option<usize>,
    /// 1行あたりの特徴量数（省略時はCSVヘッダから決定）
    pub feature_count: Option<usize>,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            seed: 42,
            test_ratio: 0.2,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            target_length: None,
            feature_count: None,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// TOML 文字列から読み込む
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|source| Error::Config {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが存在すれば読み込み、なければデフォルト
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        log::info!("Loaded config from {}", path.display());
        Self::from_toml_str(&text, path)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.calibration_samples == 0 {
            return Err(Error::InvalidConfig("calibration_samples must be at least 1".into()));
        }
        if self.target_length == Some(0) {
            return Err(Error::InvalidConfig("target_length must be at least 1".into()));
        }
        if self.feature_count == Some(0) {
            return Err(Error::InvalidConfig("feature_count must be at least 1".into()));
        }
        if self.training.batch_size == 0 {
            return Err(Error::InvalidConfig("training.batch_size must be at least 1".into()));
        }
        if self.training.hidden_units == 0 {
            return Err(Error::InvalidConfig("training.hidden_units must be at least 1".into()));
        }
        Ok(())
    }
}
