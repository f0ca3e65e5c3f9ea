//! 脚本引擎边界
//!
//! 桥把脚本语言的编译器和解释器当作不透明的协作者，只通过
//! [`ScriptEngine`] 的编译、调用和自省操作与之交互。脚本在执行期间
//! 通过 [`HostGateway`] 回调宿主。

pub mod native;

use thiserror::Error;

use crate::binding::ClassId;
use crate::core::error::{DispatchError, DispatchResult};
use crate::dispatch::{ObjectHandle, ScriptValue};
use crate::reflection::ScriptClassDescriptor;

pub use native::{RustScriptEngine, ScriptContext};

/// 编译错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// 脚本执行失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptFault {
    /// 脚本自身的运行时错误
    #[error("Script runtime error: {0}")]
    Runtime(String),

    /// 脚本回调宿主时的分派错误，原样传回调用方
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// 一次宿主到脚本的调用
#[derive(Debug)]
pub struct ScriptCall<'a> {
    /// 声明该方法实现的类
    pub class: &'a ClassId,
    pub method: &'a str,
    pub receiver: ObjectHandle,
    /// 接收者的有效类
    pub receiver_class: &'a ClassId,
    pub args: Vec<ScriptValue>,
}

/// 脚本执行期间回调宿主的入口
pub trait HostGateway {
    fn call(
        &self,
        receiver: ObjectHandle,
        method: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue>;

    fn get_property(&self, receiver: ObjectHandle, name: &str) -> DispatchResult<ScriptValue>;

    fn set_property(
        &self,
        receiver: ObjectHandle,
        name: &str,
        value: ScriptValue,
    ) -> DispatchResult<()>;

    fn class_of(&self, receiver: ObjectHandle) -> DispatchResult<ClassId>;
}

/// 脚本引擎
///
/// `invoke` 只借用 `&self`：脚本回调宿主、宿主再调用脚本时引擎会被重入。
pub trait ScriptEngine {
    fn compile(&mut self, source: &str) -> Result<ScriptClassDescriptor, CompileError>;

    fn invoke(
        &self,
        call: ScriptCall<'_>,
        host: &dyn HostGateway,
    ) -> Result<ScriptValue, ScriptFault>;

    fn enumerate_classes(&self) -> Vec<ScriptClassDescriptor>;

    /// 实时更新被注册表接受后通知引擎
    fn classes_updated(&mut self, _installed: &[ScriptClassDescriptor], _removed: &[ClassId]) {}
}
