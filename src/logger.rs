//! 日志初始化
//!
//! 默认级别 info，可以通过 `RUST_LOG` 覆盖。重复调用不会报错。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局日志
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}
