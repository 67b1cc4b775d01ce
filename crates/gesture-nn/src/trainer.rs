//! 学習ループ
//!
//! ミニバッチ Adam で sparse categorical cross-entropy を最小化する。
//! 初期化とエポックごとのシャッフルは `seed` から作った乱数で行うため、
//! 同じ入力・同じシードなら同じ重みになる。

use gesture_core::model::evaluate;
use gesture_core::{Evaluation, ModelShape, Subset, TrainableModel, TrainedModel, TrainingConfig};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::network::Mlp;
use crate::optimizer::{Adam, Optimizer};

/// 学習設定
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// バッチサイズ
    pub batch_size: usize,
    /// エポック数
    pub epochs: usize,
    /// 学習率
    pub learning_rate: f32,
    /// 隠れ層のユニット数
    pub hidden_units: usize,
    /// シード値
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            epochs: 20,
            learning_rate: 0.001,
            hidden_units: 64,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn from_training(training: &TrainingConfig, seed: u64) -> Self {
        Self {
            batch_size: training.batch_size,
            epochs: training.epochs,
            learning_rate: training.learning_rate,
            hidden_units: training.hidden_units,
            seed,
        }
    }
}

/// 学習時のエラー
#[derive(thiserror::Error, Debug)]
pub enum TrainError {
    #[error("training subset is empty")]
    EmptyTrainingSet,

    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("sample {index} has {actual} features, model expects {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("label {label} is out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    #[error("training diverged at epoch {epoch} (loss is not finite)")]
    Diverged { epoch: usize },
}

/// エポックごとの記録
#[derive(Debug, Clone, Copy)]
pub struct EpochStats {
    pub epoch: usize,
    pub train: Evaluation,
    pub validation: Evaluation,
}

/// 学習済み分類器
#[derive(Debug, Clone)]
pub struct TrainedMlp {
    network: Mlp,
    history: Vec<EpochStats>,
}

impl TrainedMlp {
    pub fn network(&self) -> &Mlp {
        &self.network
    }

    pub fn history(&self) -> &[EpochStats] {
        &self.history
    }
}

impl TrainedModel for TrainedMlp {
    fn input_dim(&self) -> usize {
        self.network.input_dim()
    }

    fn num_classes(&self) -> usize {
        self.network.num_classes()
    }

    fn predict(&self, input: &[f32]) -> Vec<f32> {
        self.network.predict(input)
    }

    fn export_saved_model(&self, dir: &std::path::Path) -> std::io::Result<()> {
        self.network.export_saved_model(dir)
    }
}

/// 未学習の分類器
#[derive(Debug, Clone, Default)]
pub struct MlpClassifier {
    config: TrainConfig,
}

impl MlpClassifier {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    fn check_subset(&self, shape: ModelShape, subset: &Subset) -> Result<(), TrainError> {
        for (index, (x, &y)) in subset.features.iter().zip(&subset.labels).enumerate() {
            if x.len() != shape.input_dim {
                return Err(TrainError::DimensionMismatch {
                    index,
                    expected: shape.input_dim,
                    actual: x.len(),
                });
            }
            if y >= shape.num_classes {
                return Err(TrainError::LabelOutOfRange {
                    label: y,
                    num_classes: shape.num_classes,
                });
            }
        }
        Ok(())
    }
}

impl TrainableModel for MlpClassifier {
    type Trained = TrainedMlp;
    type Error = TrainError;

    fn fit(
        self,
        shape: ModelShape,
        train: &Subset,
        validation: &Subset,
    ) -> Result<TrainedMlp, TrainError> {
        let config = &self.config;
        if config.batch_size == 0 || config.epochs == 0 || config.hidden_units == 0 {
            return Err(TrainError::InvalidConfig(format!(
                "batch_size={}, epochs={}, hidden_units={} must all be positive",
                config.batch_size, config.epochs, config.hidden_units
            )));
        }
        if train.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }
        self.check_subset(shape, train)?;
        self.check_subset(shape, validation)?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut network = Mlp::new(shape.input_dim, config.hidden_units, shape.num_classes);
        network.init_random(&mut rng);
        let mut optimizer = Adam::new(&network, config.learning_rate);

        log::info!(
            "Training with {} samples ({} validation)",
            train.len(),
            validation.len()
        );
        log::info!("  Batch size: {}", config.batch_size);
        log::info!("  Epochs: {}", config.epochs);
        log::info!("  Learning rate: {}", optimizer.get_lr());
        log::info!("  Parameters: {}", network.param_count());

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(config.epochs);

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);
            let avg_loss = train_epoch(&mut network, &mut optimizer, train, &order, config);
            if !avg_loss.is_finite() {
                return Err(TrainError::Diverged { epoch: epoch + 1 });
            }

            let train_eval = evaluate(&network, train);
            let val_eval = evaluate(&network, validation);
            log::info!(
                "Epoch {}/{}: loss={:.4}, accuracy={:.4}, val_loss={:.4}, val_accuracy={:.4}",
                epoch + 1,
                config.epochs,
                avg_loss,
                train_eval.accuracy,
                val_eval.loss,
                val_eval.accuracy
            );
            history.push(EpochStats {
                epoch: epoch + 1,
                train: Evaluation {
                    loss: avg_loss,
                    accuracy: train_eval.accuracy,
                },
                validation: val_eval,
            });
        }

        Ok(TrainedMlp { network, history })
    }
}

/// 1エポックの学習。バッチ平均損失のサンプル加重平均を返す
fn train_epoch<O: Optimizer>(
    network: &mut Mlp,
    optimizer: &mut O,
    train: &Subset,
    order: &[usize],
    config: &TrainConfig,
) -> f32 {
    let num_batches = order.len().div_ceil(config.batch_size);

    let progress = ProgressBar::new(num_batches as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} loss:{msg}")
            .expect("valid template"),
    );

    let mut total_loss = 0.0;
    let mut total_samples = 0;

    for (batch_idx, batch) in order.chunks(config.batch_size).enumerate() {
        network.zero_grad();

        let batch_loss = accumulate_batch(network, train, batch);
        optimizer.step(network);

        total_loss += batch_loss * batch.len() as f32;
        total_samples += batch.len();

        if batch_idx % 10 == 0 {
            progress.set_message(format!("{:.6}", total_loss / total_samples as f32));
        }
        progress.inc(1);
    }

    progress.finish_and_clear();

    if total_samples > 0 {
        total_loss / total_samples as f32
    } else {
        0.0
    }
}

/// バッチの平均損失を計算し、勾配を累積する
fn accumulate_batch(network: &mut Mlp, train: &Subset, batch: &[usize]) -> f32 {
    const EPS: f32 = 1e-7;
    let scale = 1.0 / batch.len() as f32;
    let mut total_loss = 0.0;

    for &i in batch {
        let x = &train.features[i];
        let y = train.labels[i];
        let cache = network.forward(x);
        total_loss -= cache.probs[y].clamp(EPS, 1.0 - EPS).ln();

        // softmax + cross-entropy の勾配は (p - onehot)
        let grad: Vec<f32> = cache
            .probs
            .iter()
            .enumerate()
            .map(|(k, &p)| (p - if k == y { 1.0 } else { 0.0 }) * scale)
            .collect();
        network.backward(x, &cache, &grad);
    }

    total_loss * scale
}
