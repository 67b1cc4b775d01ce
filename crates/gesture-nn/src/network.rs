//! 学習可能な MLP
//!
//! `入力 → Dense(hidden, ReLU) → Dense(num_classes) → softmax` を f32 で実装し、
//! 順伝播・逆伝播をサポートする。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use gesture_core::TrainedModel;
use rand::Rng;

/// エクスポートされる float モデルのファイル名
pub const SAVED_MODEL_FILE: &str = "model.bin";

/// float モデルファイルのマジック
pub const MODEL_MAGIC: [u8; 4] = *b"GMLP";

/// float モデルファイルのバージョン
pub const MODEL_VERSION: u32 = 1;

/// 学習可能な全結合層
#[derive(Clone, Debug)]
pub struct Dense {
    pub input_dim: usize,
    pub output_dim: usize,
    /// 重み [output][input]
    pub weights: Vec<f32>,
    /// バイアス [output]
    pub biases: Vec<f32>,
    /// 重みの勾配
    pub weight_grads: Vec<f32>,
    /// バイアスの勾配
    pub bias_grads: Vec<f32>,
}

impl Dense {
    /// 新しい層を作成（ゼロ初期化）
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            weights: vec![0.0; output_dim * input_dim],
            biases: vec![0.0; output_dim],
            weight_grads: vec![0.0; output_dim * input_dim],
            bias_grads: vec![0.0; output_dim],
        }
    }

    /// Glorot一様初期化（バイアスはゼロ）
    pub fn init_glorot<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let limit = (6.0 / (self.input_dim + self.output_dim) as f32).sqrt();
        for w in &mut self.weights {
            *w = rng.random::<f32>() * 2.0 * limit - limit;
        }
        self.biases.fill(0.0);
    }

    /// 順伝播
    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.input_dim);
        debug_assert_eq!(output.len(), self.output_dim);

        for (j, out) in output.iter_mut().enumerate() {
            let row = &self.weights[j * self.input_dim..(j + 1) * self.input_dim];
            let mut sum = self.biases[j];
            for (&w, &x) in row.iter().zip(input) {
                sum += w * x;
            }
            *out = sum;
        }
    }

    /// 逆伝播（出力勾配から重み勾配を累積し、入力勾配を返す）
    pub fn backward(&mut self, input: &[f32], output_grad: &[f32], input_grad: &mut [f32]) {
        debug_assert_eq!(input.len(), self.input_dim);
        debug_assert_eq!(output_grad.len(), self.output_dim);
        debug_assert_eq!(input_grad.len(), self.input_dim);

        input_grad.fill(0.0);

        for (j, &grad) in output_grad.iter().enumerate() {
            self.bias_grads[j] += grad;
            let offset = j * self.input_dim;
            for i in 0..self.input_dim {
                self.weight_grads[offset + i] += grad * input[i];
                input_grad[i] += grad * self.weights[offset + i];
            }
        }
    }

    /// 勾配をゼロにリセット
    pub fn zero_grad(&mut self) {
        self.weight_grads.fill(0.0);
        self.bias_grads.fill(0.0);
    }

    /// パラメータ数
    pub fn param_count(&self) -> usize {
        self.output_dim * self.input_dim + self.output_dim
    }
}

/// 数値安定化した softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// 順伝播時の中間値キャッシュ
#[derive(Debug, Clone)]
pub struct ForwardCache {
    pub hidden_out: Vec<f32>,
    pub hidden_relu: Vec<f32>,
    pub logits: Vec<f32>,
    pub probs: Vec<f32>,
}

/// Dense-ReLU-Dense-softmax 分類器
#[derive(Clone, Debug)]
pub struct Mlp {
    pub hidden: Dense,
    pub output: Dense,
}

impl Mlp {
    pub fn new(input_dim: usize, hidden_units: usize, num_classes: usize) -> Self {
        Self {
            hidden: Dense::new(input_dim, hidden_units),
            output: Dense::new(hidden_units, num_classes),
        }
    }

    /// ランダム初期化
    pub fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.hidden.init_glorot(rng);
        self.output.init_glorot(rng);
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden.output_dim
    }

    /// 順伝播
    pub fn forward(&self, input: &[f32]) -> ForwardCache {
        let mut hidden_out = vec![0.0; self.hidden.output_dim];
        self.hidden.forward(input, &mut hidden_out);
        let hidden_relu: Vec<f32> = hidden_out.iter().map(|&v| v.max(0.0)).collect();

        let mut logits = vec![0.0; self.output.output_dim];
        self.output.forward(&hidden_relu, &mut logits);
        let probs = softmax(&logits);

        ForwardCache {
            hidden_out,
            hidden_relu,
            logits,
            probs,
        }
    }

    /// 逆伝播
    ///
    /// `logits_grad` は softmax + cross-entropy を合わせた logits に対する勾配。
    pub fn backward(&mut self, input: &[f32], cache: &ForwardCache, logits_grad: &[f32]) {
        let mut relu_grad = vec![0.0; self.hidden.output_dim];
        self.output.backward(&cache.hidden_relu, logits_grad, &mut relu_grad);

        for (g, &pre) in relu_grad.iter_mut().zip(&cache.hidden_out) {
            if pre <= 0.0 {
                *g = 0.0;
            }
        }

        // 入力勾配は使わない
        let mut input_grad = vec![0.0; self.hidden.input_dim];
        self.hidden.backward(input, &relu_grad, &mut input_grad);
    }

    /// 勾配をゼロにリセット
    pub fn zero_grad(&mut self) {
        self.hidden.zero_grad();
        self.output.zero_grad();
    }

    /// パラメータ数
    pub fn param_count(&self) -> usize {
        self.hidden.param_count() + self.output.param_count()
    }

    /// float のまま保存
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&MODEL_MAGIC)?;
        writer.write_u32::<LittleEndian>(MODEL_VERSION)?;
        writer.write_u32::<LittleEndian>(self.hidden.input_dim as u32)?;
        writer.write_u32::<LittleEndian>(self.hidden.output_dim as u32)?;
        writer.write_u32::<LittleEndian>(self.output.output_dim as u32)?;

        for layer in [&self.hidden, &self.output] {
            for &w in &layer.weights {
                writer.write_f32::<LittleEndian>(w)?;
            }
            for &b in &layer.biases {
                writer.write_f32::<LittleEndian>(b)?;
            }
        }
        Ok(())
    }

    /// `save` の形式から読み込む
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MODEL_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a GMLP model file"));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != MODEL_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported model version {version}"),
            ));
        }
        let input_dim = reader.read_u32::<LittleEndian>()? as usize;
        let hidden_units = reader.read_u32::<LittleEndian>()? as usize;
        let num_classes = reader.read_u32::<LittleEndian>()? as usize;

        let mut network = Self::new(input_dim, hidden_units, num_classes);
        for layer in [&mut network.hidden, &mut network.output] {
            reader.read_f32_into::<LittleEndian>(&mut layer.weights)?;
            reader.read_f32_into::<LittleEndian>(&mut layer.biases)?;
        }
        Ok(network)
    }

    /// エクスポート先ディレクトリから読み込む
    pub fn load_from_dir(dir: &Path) -> io::Result<Self> {
        let file = File::open(dir.join(SAVED_MODEL_FILE))?;
        Self::load(&mut BufReader::new(file))
    }
}

impl TrainedModel for Mlp {
    fn input_dim(&self) -> usize {
        self.hidden.input_dim
    }

    fn num_classes(&self) -> usize {
        self.output.output_dim
    }

    fn predict(&self, input: &[f32]) -> Vec<f32> {
        self.forward(input).probs
    }

    fn export_saved_model(&self, dir: &Path) -> io::Result<()> {
        let file = File::create(dir.join(SAVED_MODEL_FILE))?;
        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer.flush()
    }
}
