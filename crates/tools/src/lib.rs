//! ジェスチャ収録・学習ツールの共通部品

pub mod common;
