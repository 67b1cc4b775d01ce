//! int8 量子化の基本演算

/// int8 重みの対称量子化上限
pub const I8_QMAX: i32 = 127;

/// 0.5 を 0 から遠ざける方向に丸める
#[inline]
pub fn round_away_from_zero(val: f32) -> i32 {
    debug_assert!(val.is_finite(), "round_away_from_zero expects finite input, got {val}");
    if !val.is_finite() {
        return 0;
    }
    if val >= 0.0 {
        (val + 0.5).floor() as i32
    } else {
        (val - 0.5).ceil() as i32
    }
}

/// 出力チャネルごとの対称 int8 量子化
///
/// `weights` は `[channels][stride]` の行優先。スケールは `max_abs / 127`、
/// 全要素が 0 のチャネルはスケール 1.0。
pub fn quantize_symmetric_i8(
    weights: &[f32],
    channels: usize,
) -> Result<(Vec<i8>, Vec<f32>), String> {
    if channels == 0 {
        return Err("per-channel quantization requires channels > 0".into());
    }
    if weights.len() % channels != 0 {
        return Err(format!(
            "weights len {} not divisible by channels {channels}",
            weights.len()
        ));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
        return Err(format!("non-finite weight {bad}"));
    }

    let stride = weights.len() / channels;
    let mut scales = Vec::with_capacity(channels);
    let mut quantized = Vec::with_capacity(weights.len());
    if stride == 0 {
        return Ok((quantized, vec![1.0; channels]));
    }
    for slice in weights.chunks_exact(stride) {
        let max_abs = slice.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        let scale = if max_abs == 0.0 {
            1.0
        } else {
            max_abs / I8_QMAX as f32
        };
        scales.push(scale);
        quantized.extend(
            slice
                .iter()
                .map(|&w| round_away_from_zero(w / scale).clamp(-I8_QMAX, I8_QMAX) as i8),
        );
    }
    Ok((quantized, scales))
}

/// バイアスを `input_scale * weight_scale[i]` のスケールで int32 に量子化
pub fn quantize_bias_i32(bias: &[f32], input_scale: f32, weight_scales: &[f32]) -> Vec<i32> {
    debug_assert_eq!(bias.len(), weight_scales.len());
    bias.iter()
        .zip(weight_scales)
        .map(|(&b, &ws)| {
            let scale = input_scale * ws;
            if scale == 0.0 {
                0
            } else {
                let q = (b / scale).round() as f64;
                q.clamp(i32::MIN as f64, i32::MAX as f64) as i32
            }
        })
        .collect()
}

/// 非対称 int8 量子化パラメータ（`real = (q - zero_point) * scale`）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    /// softmax 出力の固定パラメータ（[0, 1) を 256 段階）
    pub const SOFTMAX_OUTPUT: Self = Self {
        scale: 1.0 / 256.0,
        zero_point: -128,
    };

    /// 観測範囲から決める。範囲は必ず 0 を含むように広げる
    pub fn from_range(min: f32, max: f32) -> Self {
        let min = min.min(0.0);
        let max = max.max(0.0);
        let range = max - min;
        if range <= f32::EPSILON {
            return Self {
                scale: 1.0,
                zero_point: 0,
            };
        }
        let scale = range / 255.0;
        let zero_point = (-128.0 - min / scale).round() as i32;
        Self {
            scale,
            zero_point: zero_point.clamp(-128, 127),
        }
    }

    #[inline]
    pub fn quantize(&self, value: f32) -> i8 {
        let q = (value / self.scale).round() as i32 + self.zero_point;
        q.clamp(-128, 127) as i8
    }

    #[inline]
    pub fn dequantize(&self, q: i8) -> f32 {
        (q as i32 - self.zero_point) as f32 * self.scale
    }
}

/// キャリブレーション中に観測した値の範囲
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationRange {
    pub min: f32,
    pub max: f32,
}

impl Default for ActivationRange {
    fn default() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }
}

impl ActivationRange {
    pub fn observe(&mut self, values: &[f32]) {
        for &v in values {
            if v.is_finite() {
                self.min = self.min.min(v);
                self.max = self.max.max(v);
            }
        }
    }

    pub fn is_observed(&self) -> bool {
        self.min <= self.max
    }

    pub fn params(&self) -> QuantParams {
        if self.is_observed() {
            QuantParams::from_range(self.min, self.max)
        } else {
            QuantParams::from_range(0.0, 0.0)
        }
    }
}
