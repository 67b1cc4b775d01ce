//! バイナリ間で共有する I/O とログ初期化

pub mod io;
pub mod logging;
