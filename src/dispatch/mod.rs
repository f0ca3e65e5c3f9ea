//! Dispatch Bridge
//!
//! 宿主调用与脚本调用之间的转换层：
//!
//! - [`handle`]：跨运行时的对象句柄竞技场
//! - [`value`]：两侧的值模型
//! - [`marshal`]：按形状双向封送参数
//! - [`cache`]：方法槽解析缓存
//! - [`bridge`]：分派入口

pub mod bridge;
pub mod cache;
pub mod handle;
mod marshal;
pub mod value;


pub use bridge::{DispatchBridge, DispatchScope, LiveHandle};
pub use cache::{CacheStats, MethodCache};
pub use handle::{HandleEntry, HandleTable, HostObject, HostObjectRef, ObjectHandle, ObjectId};
pub use value::{HostTransform, HostValue, ScriptValue};
