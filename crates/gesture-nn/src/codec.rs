//! 完全整数（int8）量子化コーデック
//!
//! エクスポートされた float モデルを読み込み、キャリブレーション集合で
//! 入力・隠れ層・logits の値域を観測してから量子化する。
//!
//! # 成果物フォーマット（リトルエンディアン）
//! ```text
//! magic "GQ8\0" | version u32 | input_dim u32 | hidden u32 | classes u32
//! input QuantParams
//! hidden layer  : weight_scales f32[hidden]  weights i8[hidden*input]  biases i32[hidden]  output QuantParams
//! logits layer  : weight_scales f32[classes] weights i8[classes*hidden] biases i32[classes] output QuantParams
//! softmax output QuantParams
//! ```
//! QuantParams は `scale f32 | zero_point i32`。

use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use gesture_core::model::argmax;
use gesture_core::{CalibrationSet, QuantizationCodec, QuantizationOptions};

use crate::network::{Dense, Mlp, softmax};
use crate::quant::{ActivationRange, QuantParams, quantize_bias_i32, quantize_symmetric_i8};

/// 成果物のマジック
pub const ARTIFACT_MAGIC: [u8; 4] = *b"GQ8\0";

/// 成果物のバージョン
pub const ARTIFACT_VERSION: u32 = 1;

/// 量子化時のエラー
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("unsupported quantization options: {0}")]
    Unsupported(String),

    #[error("calibration set is empty")]
    EmptyCalibration,

    #[error("calibration batch {index} has shape {actual:?}, model expects [1, {expected}]")]
    CalibrationMismatch {
        index: usize,
        expected: usize,
        actual: [usize; 2],
    },

    #[error("cannot quantize {layer}: {reason}")]
    Layer { layer: &'static str, reason: String },

    #[error("model I/O failed: {0}")]
    Model(#[from] io::Error),
}

/// 量子化済み全結合層
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedDense {
    pub input_dim: usize,
    pub output_dim: usize,
    pub weight_scales: Vec<f32>,
    pub weights: Vec<i8>,
    pub biases: Vec<i32>,
    pub output: QuantParams,
}

impl QuantizedDense {
    fn from_dense(
        layer: &Dense,
        name: &'static str,
        input: QuantParams,
        output: QuantParams,
    ) -> Result<Self, CodecError> {
        let (weights, weight_scales) = quantize_symmetric_i8(&layer.weights, layer.output_dim)
            .map_err(|reason| CodecError::Layer { layer: name, reason })?;
        if let Some(bad) = layer.biases.iter().find(|b| !b.is_finite()) {
            return Err(CodecError::Layer {
                layer: name,
                reason: format!("non-finite bias {bad}"),
            });
        }
        let biases = quantize_bias_i32(&layer.biases, input.scale, &weight_scales);
        Ok(Self {
            input_dim: layer.input_dim,
            output_dim: layer.output_dim,
            weight_scales,
            weights,
            biases,
            output,
        })
    }

    /// 整数演算で順伝播し、出力を再量子化する
    ///
    /// `relu` のときは zero_point 未満を切り上げる。
    fn forward(&self, input: &[i8], input_params: QuantParams, relu: bool) -> Vec<i8> {
        let mut out = Vec::with_capacity(self.output_dim);
        for j in 0..self.output_dim {
            let row = &self.weights[j * self.input_dim..(j + 1) * self.input_dim];
            let mut acc = self.biases[j] as i64;
            for (&w, &x) in row.iter().zip(input) {
                acc += (x as i64 - input_params.zero_point as i64) * w as i64;
            }
            let real = acc as f64 * input_params.scale as f64 * self.weight_scales[j] as f64;
            let q = (real / self.output.scale as f64).round() as i64 + self.output.zero_point as i64;
            let lower = if relu { self.output.zero_point as i64 } else { -128 };
            out.push(q.clamp(lower.max(-128), 127) as i8);
        }
        out
    }

    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for &s in &self.weight_scales {
            writer.write_f32::<LittleEndian>(s)?;
        }
        for &w in &self.weights {
            writer.write_i8(w)?;
        }
        for &b in &self.biases {
            writer.write_i32::<LittleEndian>(b)?;
        }
        write_params(writer, self.output)
    }

    fn read<R: Read>(reader: &mut R, input_dim: usize, output_dim: usize) -> io::Result<Self> {
        let mut weight_scales = vec![0.0; output_dim];
        reader.read_f32_into::<LittleEndian>(&mut weight_scales)?;
        let mut weights = vec![0i8; output_dim * input_dim];
        reader.read_i8_into(&mut weights)?;
        let mut biases = vec![0i32; output_dim];
        reader.read_i32_into::<LittleEndian>(&mut biases)?;
        let output = read_params(reader)?;
        Ok(Self {
            input_dim,
            output_dim,
            weight_scales,
            weights,
            biases,
            output,
        })
    }
}

fn write_params<W: Write>(writer: &mut W, params: QuantParams) -> io::Result<()> {
    writer.write_f32::<LittleEndian>(params.scale)?;
    writer.write_i32::<LittleEndian>(params.zero_point)
}

fn read_params<R: Read>(reader: &mut R) -> io::Result<QuantParams> {
    Ok(QuantParams {
        scale: reader.read_f32::<LittleEndian>()?,
        zero_point: reader.read_i32::<LittleEndian>()?,
    })
}

/// 完全整数化された MLP
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedMlp {
    pub input: QuantParams,
    pub hidden: QuantizedDense,
    pub logits: QuantizedDense,
    pub output: QuantParams,
}

impl QuantizedMlp {
    pub fn input_dim(&self) -> usize {
        self.hidden.input_dim
    }

    pub fn num_classes(&self) -> usize {
        self.logits.output_dim
    }

    /// float 入力を量子化
    pub fn quantize_input(&self, input: &[f32]) -> Vec<i8> {
        input.iter().map(|&v| self.input.quantize(v)).collect()
    }

    /// int8 入力から int8 のクラス確率を返す
    pub fn predict_int8(&self, input: &[i8]) -> Vec<i8> {
        let hidden = self.hidden.forward(input, self.input, true);
        let logits = self.logits.forward(&hidden, self.hidden.output, false);
        let real: Vec<f32> = logits
            .iter()
            .map(|&q| self.logits.output.dequantize(q))
            .collect();
        softmax(&real)
            .into_iter()
            .map(|p| self.output.quantize(p))
            .collect()
    }

    /// float 入力を量子化して推論し、確率を float に戻す
    pub fn predict(&self, input: &[f32]) -> Vec<f32> {
        self.predict_int8(&self.quantize_input(input))
            .into_iter()
            .map(|q| self.output.dequantize(q))
            .collect()
    }

    /// 最大クラス
    pub fn classify(&self, input: &[f32]) -> Option<usize> {
        argmax(&self.predict(input))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&ARTIFACT_MAGIC)?;
        writer.write_u32::<LittleEndian>(ARTIFACT_VERSION)?;
        writer.write_u32::<LittleEndian>(self.hidden.input_dim as u32)?;
        writer.write_u32::<LittleEndian>(self.hidden.output_dim as u32)?;
        writer.write_u32::<LittleEndian>(self.logits.output_dim as u32)?;
        write_params(writer, self.input)?;
        self.hidden.write(writer)?;
        self.logits.write(writer)?;
        write_params(writer, self.output)
    }

    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ARTIFACT_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a GQ8 artifact"));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != ARTIFACT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported artifact version {version}"),
            ));
        }
        let input_dim = reader.read_u32::<LittleEndian>()? as usize;
        let hidden_units = reader.read_u32::<LittleEndian>()? as usize;
        let num_classes = reader.read_u32::<LittleEndian>()? as usize;
        let input = read_params(reader)?;
        let hidden = QuantizedDense::read(reader, input_dim, hidden_units)?;
        let logits = QuantizedDense::read(reader, hidden_units, num_classes)?;
        let output = read_params(reader)?;
        Ok(Self {
            input,
            hidden,
            logits,
            output,
        })
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// キャリブレーションで観測した値域
#[derive(Debug, Clone, Copy, Default)]
struct Ranges {
    input: ActivationRange,
    hidden: ActivationRange,
    logits: ActivationRange,
}

/// float の MLP を完全整数化するコーデック
#[derive(Debug, Clone, Copy, Default)]
pub struct Int8Codec;

impl Int8Codec {
    pub fn new() -> Self {
        Self
    }

    /// 読み込み済みのネットワークを量子化する
    pub fn quantize_network(
        &self,
        network: &Mlp,
        calibration: &CalibrationSet,
    ) -> Result<QuantizedMlp, CodecError> {
        if calibration.is_empty() {
            return Err(CodecError::EmptyCalibration);
        }
        let input_dim = network.hidden.input_dim;

        // 1回目: 値域の観測
        let mut ranges = Ranges::default();
        for (index, batch) in calibration.batches().enumerate() {
            if batch.shape() != [1, input_dim] {
                return Err(CodecError::CalibrationMismatch {
                    index,
                    expected: input_dim,
                    actual: batch.shape(),
                });
            }
            let cache = network.forward(batch.data());
            ranges.input.observe(batch.data());
            ranges.hidden.observe(&cache.hidden_relu);
            ranges.logits.observe(&cache.logits);
        }
        log::debug!(
            "Calibration ranges: input=[{:.4}, {:.4}] hidden=[{:.4}, {:.4}] logits=[{:.4}, {:.4}]",
            ranges.input.min,
            ranges.input.max,
            ranges.hidden.min,
            ranges.hidden.max,
            ranges.logits.min,
            ranges.logits.max
        );

        let input = ranges.input.params();
        let hidden_params = ranges.hidden.params();
        let hidden = QuantizedDense::from_dense(&network.hidden, "hidden", input, hidden_params)?;
        let logits =
            QuantizedDense::from_dense(&network.output, "logits", hidden_params, ranges.logits.params())?;
        let quantized = QuantizedMlp {
            input,
            hidden,
            logits,
            output: QuantParams::SOFTMAX_OUTPUT,
        };

        // 2回目: float との一致率
        let mut agree = 0usize;
        for batch in calibration.batches() {
            let float_top = argmax(&network.forward(batch.data()).probs);
            if quantized.classify(batch.data()) == float_top {
                agree += 1;
            }
        }
        log::info!(
            "Int8 top-1 agreement with float model on calibration set: {agree}/{} ({:.1}%)",
            calibration.len(),
            100.0 * agree as f64 / calibration.len() as f64
        );

        Ok(quantized)
    }
}

impl QuantizationCodec for Int8Codec {
    type Error = CodecError;

    fn quantize(
        &self,
        saved_model: &Path,
        calibration: &CalibrationSet,
        options: &QuantizationOptions,
    ) -> Result<Vec<u8>, CodecError> {
        if !options.is_full_integer() {
            return Err(CodecError::Unsupported(format!(
                "only full-integer int8 is supported, got {options:?}"
            )));
        }
        let network = Mlp::load_from_dir(saved_model)?;
        let quantized = self.quantize_network(&network, calibration)?;
        let bytes = quantized.to_bytes()?;
        log::info!(
            "Quantized model: {} -> {} bytes",
            network.param_count() * std::mem::size_of::<f32>(),
            bytes.len()
        );
        Ok(bytes)
    }
}
