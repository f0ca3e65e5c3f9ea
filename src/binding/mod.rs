//! Binding Generator
//!
//! 把宿主对象系统的类型元数据转换为声明式的绑定表：
//!
//! ```text
//! HostMetadataSource ──> BindingGenerator ──> BindingTable ──> artifact (json | binary)
//!                            │                    │
//!                            └─ naming / shape     └─ checksum (handshake)
//! ```
//!
//! 绑定表在进程启动时加载一次，之后只读。

pub mod generator;
pub mod metadata;
pub mod naming;
pub mod shape;
pub mod table;

pub use generator::{BindingGenerator, GenerationReport, GenerationWarning, GeneratorOptions};
pub use metadata::{
    HostClassMeta, HostEnumMeta, HostEnumValue, HostMetadata, HostMetadataSource, HostMethodMeta,
    HostParamMeta, HostPropertyMeta, HostType, JsonMetadataFile,
};
pub use shape::{CallDirection, ClassId, Param, Shape, Signature};
pub use table::{
    BindingTable, ClassBinding, EnumBinding, EnumMember, MethodBinding, PropertyBinding,
    ARTIFACT_MAGIC, ARTIFACT_VERSION,
};
