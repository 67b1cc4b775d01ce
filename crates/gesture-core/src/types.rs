//! 基本データ型
//!
//! 上流のコレクタが出力する行 (`Row`)、テイクのキー、固定長サンプル。

/// 1行分のセンサ読み取り値
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// ジェスチャ名
    pub label: String,
    /// テイクID（コレクタが振る通し番号。文字列として扱う）
    pub take_id: String,
    /// テイク内の順序（1始まり、連続である必要はない）
    pub sequence_index: u64,
    /// F個の特徴量
    pub values: Vec<f32>,
}

/// テイクを識別するキー
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TakeKey {
    pub label: String,
    pub take_id: String,
}

impl TakeKey {
    pub fn new(label: impl Into<String>, take_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            take_id: take_id.into(),
        }
    }
}

impl std::fmt::Display for TakeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.label, self.take_id)
    }
}

/// 固定長に正規化・平坦化されたサンプル
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// 長さ `target_length * F`
    pub features: Vec<f32>,
    /// クラスID
    pub label: usize,
}
