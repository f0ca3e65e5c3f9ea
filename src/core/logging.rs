//! 日志初始化
//!
//! 所有组件通过 `tracing` 宏记录日志，target 固定为
//! `binding`、`reflection`、`dispatch`、`remote`、`runtime`。

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogLevel, LoggingConfig};

impl LogLevel {
    /// 转换为 `EnvFilter` 可识别的指令
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// 安装全局 tracing 订阅者
///
/// `RUST_LOG` 优先于配置中的级别。已经安装过订阅者时返回 `false`，
/// 重复调用不会出错。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    if config.log_to_file {
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file_path)
        {
            Ok(file) => file,
            Err(e) => {
                eprintln!(
                    "Failed to open log file {}: {}",
                    config.log_file_path, e
                );
                return false;
            }
        };

        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .is_ok();
    }

    if !config.log_to_console {
        return false;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
