//! 核心模块
//!
//! 包含桥接层的基础设施：
//! - `error` - 错误类型定义
//! - `logging` - tracing 日志初始化
//! - `utils` - 时间戳与校验和工具
//! - `macros` - 配置类型的样板宏

pub mod error;
pub mod logging;
pub mod utils;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{
    BridgeError, BridgeResult, ChannelError, ChannelResult, DispatchError, DispatchResult,
    GenerationError, GenerationResult, RegistrationError, RegistrationResult, UpdateRejection,
};

pub use logging::init_logging;
pub use utils::{current_timestamp_ms, sha256_hex};
