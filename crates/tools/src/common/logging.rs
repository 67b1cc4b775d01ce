//! env_logger の初期化

use std::io::Write;

/// `[LEVEL] target: message` 形式で stderr に出す。`RUST_LOG` が優先
pub fn init(default_level: &str) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, default_level),
    );
    builder
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Stderr)
        .init();
}
