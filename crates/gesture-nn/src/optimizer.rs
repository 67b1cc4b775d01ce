//! オプティマイザ

use crate::network::{Dense, Mlp};

/// オプティマイザ trait
pub trait Optimizer {
    /// パラメータを更新
    fn step(&mut self, network: &mut Mlp);

    /// 現在の学習率を取得
    fn get_lr(&self) -> f32;
}

/// 1層分のモーメント
#[derive(Debug, Clone)]
struct LayerMoments {
    m_weights: Vec<f32>,
    v_weights: Vec<f32>,
    m_biases: Vec<f32>,
    v_biases: Vec<f32>,
}

impl LayerMoments {
    fn for_layer(layer: &Dense) -> Self {
        Self {
            m_weights: vec![0.0; layer.weights.len()],
            v_weights: vec![0.0; layer.weights.len()],
            m_biases: vec![0.0; layer.biases.len()],
            v_biases: vec![0.0; layer.biases.len()],
        }
    }
}

/// Adam オプティマイザ
pub struct Adam {
    /// 学習率
    pub lr: f32,
    /// β1（一次モーメントの減衰率）
    pub beta1: f32,
    /// β2（二次モーメントの減衰率）
    pub beta2: f32,
    /// 数値安定性のための小さな値
    pub epsilon: f32,

    /// ステップ数
    t: usize,
    hidden: LayerMoments,
    output: LayerMoments,
}

impl Adam {
    /// 新しいAdamオプティマイザを作成
    pub fn new(network: &Mlp, lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            hidden: LayerMoments::for_layer(&network.hidden),
            output: LayerMoments::for_layer(&network.output),
        }
    }

    pub fn steps(&self) -> usize {
        self.t
    }
}

/// Adamの更新式を適用（借用エラー回避のため独立関数として実装）
fn adam_update_params(
    params: &mut [f32],
    grads: &[f32],
    m: &mut [f32],
    v: &mut [f32],
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    lr_t: f32,
) {
    for i in 0..params.len() {
        let g = grads[i];

        m[i] = beta1 * m[i] + (1.0 - beta1) * g;
        v[i] = beta2 * v[i] + (1.0 - beta2) * g * g;

        params[i] -= lr_t * m[i] / (v[i].sqrt() + epsilon);
    }
}

fn update_layer(layer: &mut Dense, moments: &mut LayerMoments, adam: (f32, f32, f32, f32)) {
    let (beta1, beta2, epsilon, lr_t) = adam;
    adam_update_params(
        &mut layer.weights,
        &layer.weight_grads,
        &mut moments.m_weights,
        &mut moments.v_weights,
        beta1,
        beta2,
        epsilon,
        lr_t,
    );
    adam_update_params(
        &mut layer.biases,
        &layer.bias_grads,
        &mut moments.m_biases,
        &mut moments.v_biases,
        beta1,
        beta2,
        epsilon,
        lr_t,
    );
}

impl Optimizer for Adam {
    fn get_lr(&self) -> f32 {
        self.lr
    }

    fn step(&mut self, network: &mut Mlp) {
        self.t += 1;

        // バイアス補正付き学習率
        let lr_t = self.lr * (1.0 - self.beta2.powi(self.t as i32)).sqrt()
            / (1.0 - self.beta1.powi(self.t as i32));
        let params = (self.beta1, self.beta2, self.epsilon, lr_t);

        update_layer(&mut network.hidden, &mut self.hidden, params);
        update_layer(&mut network.output, &mut self.output, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adam_step_moves_against_gradient() {
        let mut network = Mlp::new(2, 2, 2);
        network.hidden.weights = vec![0.5; 4];
        network.hidden.weight_grads = vec![1.0, -1.0, 0.0, 2.0];

        let mut adam = Adam::new(&network, 0.01);
        adam.step(&mut network);

        assert_eq!(adam.steps(), 1);
        assert!(network.hidden.weights[0] < 0.5);
        assert!(network.hidden.weights[1] > 0.5);
        assert_eq!(network.hidden.weights[2], 0.5);
        // 初回ステップは |Δ| ≈ lr
        assert!((0.5 - network.hidden.weights[3] - 0.01).abs() < 1e-4);
    }

    #[test]
    fn learning_rate_is_fixed_across_steps() {
        let mut network = Mlp::new(1, 1, 2);
        let mut adam = Adam::new(&network, 0.001);
        adam.step(&mut network);
        assert_eq!(adam.get_lr(), 0.001);
        assert_eq!(adam.steps(), 1);
    }
}
