//! Reflection Registry
//!
//! 进程内的类型表：由绑定表和脚本引擎的类自省共同构建，
//! 负责类与方法槽的解析，以及实时更新的原子应用。

pub mod descriptor;
pub mod registry;
pub mod update;


pub use descriptor::{
    ClassKind, ClassView, GetterThunk, HostClassDescriptor, MethodImpl, MethodSlot, NativeBindings,
    NativeThunk, PropertySlot, ScriptClassDescriptor, ScriptMethodDecl, SetterThunk,
};
pub use registry::{ReflectionRegistry, SkippedClass};
pub use update::{AffectedClasses, UpdatePayload};
