//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **生成期错误** (`GenerationError`): 绑定生成器一次运行的致命错误，不影响运行中的进程
//! - **注册错误** (`RegistrationError`): 只拒绝出错的那一次注册
//! - **分派错误** (`DispatchError`): 总是可恢复，以值的形式返回给调用方运行时
//! - **更新拒绝** (`UpdateRejection`): 通过协议报告给外部工具，注册表保持不变
//! - **通道错误** (`ChannelError`): 连接级错误，导致重连，不会破坏注册表状态
//!
//! `BridgeError` 可以同时承载以上所有错误。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::ObjectHandle;

/// 桥接层顶层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Update rejected: {0}")]
    Update(#[from] UpdateRejection),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 绑定生成器错误（使整次生成失败）
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Duplicate class name {name}: declared by {first} and {second}")]
    DuplicateClass {
        name: String,
        first: String,
        second: String,
    },

    #[error("Duplicate bindable name {name} in class {class}")]
    DuplicateName { class: String, name: String },

    #[error("Class {class} extends undeclared superclass {superclass}")]
    MissingSuperclass { class: String, superclass: String },

    #[error("Superclass cycle through class {0}")]
    SuperclassCycle(String),

    #[error("Malformed binding table artifact: {0}")]
    MalformedArtifact(String),

    #[error("Binding table serialization failed: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 注册错误（只拒绝出错的注册）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Class already registered: {0}")]
    DuplicateClass(String),

    #[error("Class {class} extends unknown class {superclass}")]
    UnknownSuperclass { class: String, superclass: String },

    #[error("Superclass cycle through class {0}")]
    SuperclassCycle(String),

    #[error("Duplicate slot {name} in class {class}")]
    DuplicateSlot { class: String, name: String },

    #[error("Override {class}.{method} is incompatible with its ancestor: {detail}")]
    IncompatibleOverride {
        class: String,
        method: String,
        detail: String,
    },

    #[error("No native thunk bound for {class}.{method}")]
    MissingThunk { class: String, method: String },

    #[error("Mirror class {class} is invalid: {detail}")]
    InvalidMirror { class: String, detail: String },

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Script class {class} does not descend from host class {host_class}")]
    NotAScriptSubclass { class: String, host_class: String },

    #[error("Script compile error: {0}")]
    Compile(String),
}

/// 跨运行时调用错误
///
/// 所有变体都可恢复：调用失败以值的形式返回给调用方运行时，而不是中止进程。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Stale object handle {0}")]
    StaleHandle(ObjectHandle),

    #[error("Method not found: {class}.{method}")]
    MethodNotFound { class: String, method: String },

    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Reentrant call limit exceeded at depth {0}")]
    ReentrantCallLimitExceeded(u32),

    #[error("Property not found: {class}.{property}")]
    PropertyNotFound { class: String, property: String },

    #[error("Property {property} is not {access}")]
    PropertyAccess { property: String, access: String },

    #[error("Invocation failed: {0}")]
    Invocation(String),
}

impl DispatchError {
    pub(crate) fn shape_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        DispatchError::ShapeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// 实时更新被拒绝的原因
///
/// 通过 `UpdateResult` 发送给外部工具，因此可序列化。
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRejection {
    #[error("Protocol version mismatch: runtime speaks {expected}, tool sent {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Binding table checksum mismatch: runtime {expected}, tool {found}")]
    ChecksumMismatch { expected: String, found: String },

    #[error("Validation failed for class {class_name}: {detail}")]
    ValidationFailure { class_name: String, detail: String },

    #[error("Superseded by a newer payload touching class {class_name}")]
    Superseded { class_name: String },

    #[error("Update could not be delivered to the runtime")]
    Unavailable,
}

impl UpdateRejection {
    pub fn validation(class_name: impl Into<String>, detail: impl Into<String>) -> Self {
        UpdateRejection::ValidationFailure {
            class_name: class_name.into(),
            detail: detail.into(),
        }
    }

    /// 出错的类名（如果拒绝与某个具体类相关）
    pub fn class_name(&self) -> Option<&str> {
        match self {
            UpdateRejection::ValidationFailure { class_name, .. }
            | UpdateRejection::Superseded { class_name } => Some(class_name),
            _ => None,
        }
    }
}

/// 实时更新通道的连接级错误
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame codec error: {0}")]
    Codec(String),

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Handshake refused: {0}")]
    HandshakeRefused(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Connection closed")]
    Closed,

    #[error("Live update channel already running")]
    AlreadyRunning,
}

impl From<bincode::Error> for ChannelError {
    fn from(err: bincode::Error) -> Self {
        ChannelError::Codec(err.to_string())
    }
}

/// 桥接层结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
pub type RegistrationResult<T> = Result<T, RegistrationError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
pub type ChannelResult<T> = Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = RegistrationError::DuplicateClass("Actor".to_string());
        let bridge_err: BridgeError = err.into();
        assert!(matches!(bridge_err, BridgeError::Registration(_)));

        let err = UpdateRejection::Unavailable;
        let bridge_err: BridgeError = err.into();
        assert!(matches!(bridge_err, BridgeError::Update(_)));
    }

    #[test]
    fn test_error_display() {
        let err = DispatchError::MethodNotFound {
            class: "Actor".to_string(),
            method: "jump".to_string(),
        };
        assert_eq!(err.to_string(), "Method not found: Actor.jump");

        let err = UpdateRejection::validation("Boss", "superclass Enemy is not registered");
        assert_eq!(
            err.to_string(),
            "Validation failed for class Boss: superclass Enemy is not registered"
        );
    }

    #[test]
    fn test_rejection_class_name() {
        let err = UpdateRejection::validation("Boss", "bad");
        assert_eq!(err.class_name(), Some("Boss"));
        assert_eq!(UpdateRejection::Unavailable.class_name(), None);
    }
}
