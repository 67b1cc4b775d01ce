//! 学習可能モデルの抽象
//!
//! パイプラインはモデルの内部構造を見ない。`fit` で学習し、学習済みモデルは
//! 推論と、量子化コーデックが読むためのエクスポートだけを提供する。

use std::path::Path;

use crate::split::Subset;

/// モデルの入出力次元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelShape {
    pub input_dim: usize,
    pub num_classes: usize,
}

/// 学習済みモデル
pub trait TrainedModel {
    fn input_dim(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// 1サンプルに対するクラス確率
    fn predict(&self, input: &[f32]) -> Vec<f32>;

    /// 量子化コーデックが読める形式で `dir` に書き出す
    fn export_saved_model(&self, dir: &Path) -> std::io::Result<()>;
}

/// 学習可能モデル
pub trait TrainableModel {
    type Trained: TrainedModel;
    type Error: std::error::Error + Send + Sync + 'static;

    /// train で学習し、validation は各エポックの監視に使う
    fn fit(
        self,
        shape: ModelShape,
        train: &Subset,
        validation: &Subset,
    ) -> Result<Self::Trained, Self::Error>;
}

/// 評価結果（sparse categorical cross-entropy と正解率）
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// サブセット全体で評価する
pub fn evaluate<M: TrainedModel + ?Sized>(model: &M, subset: &Subset) -> Evaluation {
    const EPS: f32 = 1e-7;
    if subset.is_empty() {
        return Evaluation {
            loss: 0.0,
            accuracy: 0.0,
        };
    }
    let mut loss = 0.0f32;
    let mut correct = 0usize;
    for (x, &y) in subset.features.iter().zip(&subset.labels) {
        let probs = model.predict(x);
        let p = probs.get(y).copied().unwrap_or(0.0).clamp(EPS, 1.0 - EPS);
        loss -= p.ln();
        if argmax(&probs) == Some(y) {
            correct += 1;
        }
    }
    Evaluation {
        loss: loss / subset.len() as f32,
        accuracy: correct as f32 / subset.len() as f32,
    }
}

/// 最大値の添字（同値は先勝ち）
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}
