//! # Logging Module / 日志模块
//!
//! User-facing progress goes to stdout through `println!`; this configures the
//! `tracing` output on stderr. An explicit `--log-level` wins over `RUST_LOG`.
//!
//! 面向用户的进度信息通过 `println!` 输出到标准输出；此模块配置标准错误上的
//! `tracing` 诊断输出。显式的 `--log-level` 优先于 `RUST_LOG`。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the stderr subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("case_runner={level},warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("case_runner=warn,warn")),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .compact(),
        )
        .try_init();
}
