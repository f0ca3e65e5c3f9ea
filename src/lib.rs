//! # Script Bridge
//!
//! Binding, reflection and live-update bridge between an embedded interpreted
//! scripting language and a host object system.
//!
//! ## Features
//!
//! - **Binding Generator**: scans host metadata and emits a declarative binding table
//! - **Reflection Registry**: one namespace for host and script classes, with atomic live updates
//! - **Dispatch Bridge**: host ⇄ script calls with shape-checked marshalling and generational handles
//! - **Live Update Channel**: TCP protocol that lets an external tool hot-swap script classes
//!
//! ## Architecture Design
//!
//! ```text
//! host metadata ──► BindingGenerator ──► BindingTable ──► ReflectionRegistry
//!                                                              ▲       │
//!                         LiveUpdateServer ──TickRequest──► BridgeRuntime ──► DispatchBridge
//! ```
//!
//! 注册表和分派桥只在 tick 线程上访问；实时更新通道运行在自己的线程，
//! 通过队列把负载交给 tick 线程。
//!
//! ### Example
//!
//! ```ignore
//! use script_bridge::prelude::*;
//!
//! let mut runtime = BridgeRuntime::new(BridgeConfig::default(), Box::new(RustScriptEngine::new()));
//! runtime.load_binding_table(&table, &natives)?;
//! let handle = runtime.on_object_constructed(&actor, Some("Boss".into()))?;
//! runtime.invoke_from_host(handle, "take_damage", &[HostValue::Integer(10)])?;
//! ```
//!
//! ## Modules
//!
//! - [`binding`]: Binding generator and binding table
//! - [`reflection`]: Runtime class registry
//! - [`dispatch`]: Cross-runtime call dispatch
//! - [`remote`]: Live update protocol, server and client
//! - [`runtime`]: Tick-thread owner of all of the above

/// Error types, logging and utilities
pub mod core;
/// Configuration system
pub mod config;
/// Binding generator: host metadata to binding table
pub mod binding;
/// Reflection registry for host and script classes
pub mod reflection;
/// Dispatch bridge between host and script calls
pub mod dispatch;
/// Script engine boundary
pub mod scripting;
/// Live update channel
pub mod remote;
/// Bridge runtime and ECS integration
pub mod runtime;

/// Commonly used types
pub mod prelude {
    pub use crate::binding::{
        BindingGenerator, BindingTable, CallDirection, ClassId, GeneratorOptions, HostMetadata,
        Shape, Signature,
    };
    pub use crate::config::BridgeConfig;
    pub use crate::core::error::{BridgeError, BridgeResult, DispatchError, UpdateRejection};
    pub use crate::dispatch::{HostObject, HostObjectRef, HostValue, ObjectHandle, ObjectId, ScriptValue};
    pub use crate::reflection::{
        HostClassDescriptor, NativeBindings, ReflectionRegistry, ScriptClassDescriptor, UpdatePayload,
    };
    pub use crate::remote::RemoteClient;
    pub use crate::runtime::{BridgeRuntime, DebugNotifier, TickReport};
    pub use crate::scripting::{RustScriptEngine, ScriptEngine};
}
