//! ジェスチャ分類用の小さな MLP と int8 量子化コーデック
//!
//! - `network`: Dense-ReLU-Dense-softmax の順伝播・逆伝播と float 保存
//! - `optimizer`: Adam
//! - `trainer`: `gesture_core::TrainableModel` 実装
//! - `quant` / `codec`: `gesture_core::QuantizationCodec` 実装と成果物フォーマット

pub mod codec;
pub mod network;
pub mod optimizer;
pub mod quant;
pub mod trainer;

pub use codec::{CodecError, Int8Codec, QuantizedMlp};
pub use network::Mlp;
pub use trainer::{MlpClassifier, TrainConfig, TrainError, TrainedMlp};
