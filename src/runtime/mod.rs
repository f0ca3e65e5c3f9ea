//! Bridge Runtime
//!
//! 在 tick 线程上拥有注册表、分派桥和脚本引擎。实时更新通道把请求放进队列，
//! 每次 [`BridgeRuntime::tick`] 排空一次，因此更新总在下一次分派之前同步生效。

pub mod system;

use std::net::SocketAddr;
use std::path::Path;

use tokio::sync::broadcast;

use crate::binding::{BindingTable, ClassId};
use crate::config::BridgeConfig;
use crate::core::error::{
    BridgeResult, ChannelError, DispatchResult, RegistrationError, RegistrationResult, UpdateRejection,
};
use crate::dispatch::{
    CacheStats, DispatchBridge, HostObjectRef, HostValue, ObjectHandle, ObjectId, ScriptValue,
};
use crate::reflection::{
    AffectedClasses, HostClassDescriptor, NativeBindings, ReflectionRegistry, ScriptClassDescriptor,
    SkippedClass, UpdatePayload,
};
use crate::remote::{
    request_queue, DebugEvent, DebugEventKind, InspectedHandle, LiveUpdateServer, RequestReceiver,
    RequestSender, TickRequest,
};
use crate::scripting::ScriptEngine;

pub use system::{install_live_updates, live_update_system, LiveUpdateStats};

/// 一次 tick 的处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub applied: usize,
    pub rejected: usize,
    pub superseded: usize,
    pub inspected: usize,
    /// 宿主对象已释放而被回收的句柄
    pub purged: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// 调试事件的发布端，可以克隆到脚本引擎或宿主的任何地方
#[derive(Debug, Clone)]
pub struct DebugNotifier {
    sender: broadcast::Sender<DebugEvent>,
}

impl DebugNotifier {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 尽力发送；没有连接的工具时事件被丢弃。返回接收者数量
    pub fn notify(&self, kind: DebugEventKind, context: impl Into<String>) -> usize {
        self.sender.send(DebugEvent::new(kind, context)).unwrap_or(0)
    }

    pub fn breakpoint(&self, context: impl Into<String>) -> usize {
        self.notify(DebugEventKind::Breakpoint, context)
    }

    pub fn paused(&self, context: impl Into<String>) -> usize {
        self.notify(DebugEventKind::Paused, context)
    }

    pub fn resumed(&self, context: impl Into<String>) -> usize {
        self.notify(DebugEventKind::Resumed, context)
    }

    pub fn log(&self, message: impl Into<String>) -> usize {
        self.notify(DebugEventKind::Log, message)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.sender.subscribe()
    }
}

/// 桥接运行时
pub struct BridgeRuntime {
    config: BridgeConfig,
    registry: ReflectionRegistry,
    bridge: DispatchBridge,
    engine: Box<dyn ScriptEngine>,
    checksum: Option<String>,
    requests: Option<RequestReceiver>,
    server: Option<LiveUpdateServer>,
    notifier: DebugNotifier,
}

impl BridgeRuntime {
    pub fn new(config: BridgeConfig, engine: Box<dyn ScriptEngine>) -> Self {
        let bridge = DispatchBridge::new(&config.dispatch);
        let notifier = DebugNotifier::new(config.channel.debug_event_capacity);
        Self {
            config,
            registry: ReflectionRegistry::new(),
            bridge,
            engine,
            checksum: None,
            requests: None,
            server: None,
            notifier,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ReflectionRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &DispatchBridge {
        &self.bridge
    }

    pub fn engine(&self) -> &dyn ScriptEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn ScriptEngine {
        self.engine.as_mut()
    }

    pub fn notifier(&self) -> DebugNotifier {
        self.notifier.clone()
    }

    /// 当前绑定表的校验和
    pub fn binding_checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// 用绑定表重建注册表，返回被跳过的类
    pub fn load_binding_table(
        &mut self,
        table: &BindingTable,
        natives: &NativeBindings,
    ) -> BridgeResult<Vec<SkippedClass>> {
        let checksum = table.checksum()?;
        let (registry, skipped) = ReflectionRegistry::from_binding_table(table, natives);
        if self.server.is_some() {
            tracing::warn!(
                target: "runtime",
                "Binding table replaced while the live update channel is running; tools must reconnect"
            );
        }
        self.registry = registry;
        tracing::info!(
            target: "runtime",
            classes = table.len(),
            skipped = skipped.len(),
            checksum = %checksum,
            "Binding table loaded"
        );
        self.checksum = Some(checksum);
        Ok(skipped)
    }

    pub fn load_binding_table_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        natives: &NativeBindings,
    ) -> BridgeResult<Vec<SkippedClass>> {
        let table = BindingTable::load(path)?;
        self.load_binding_table(&table, natives)
    }

    /// 加载配置中指定的绑定表；未配置时返回 `false`
    pub fn load_configured_table(&mut self, natives: &NativeBindings) -> BridgeResult<bool> {
        match self.config.binding.table_path.clone() {
            Some(path) => {
                self.load_binding_table_file(path, natives)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn register_host(&mut self, descriptor: HostClassDescriptor) -> RegistrationResult<()> {
        self.registry.register_host(descriptor)
    }

    pub fn register_script(&mut self, descriptor: ScriptClassDescriptor) -> RegistrationResult<()> {
        self.registry.register_script(descriptor)
    }

    /// 编译源码并注册产生的脚本类
    pub fn compile_and_register(&mut self, source: &str) -> RegistrationResult<ClassId> {
        let descriptor = self
            .engine
            .compile(source)
            .map_err(|e| RegistrationError::Compile(e.to_string()))?;
        let id = descriptor.id.clone();
        if let Err(error) = self.registry.register_script(descriptor) {
            // 引擎中只保留注册表接受过的类
            let accepted: Vec<ScriptClassDescriptor> = self
                .registry
                .script_classes()
                .filter(|class| class.id == id)
                .cloned()
                .collect();
            self.engine.classes_updated(&accepted, std::slice::from_ref(&id));
            return Err(error);
        }
        Ok(id)
    }

    /// 把引擎当前的全部类作为一次更新应用
    pub fn sync_from_engine(&mut self) -> Result<AffectedClasses, UpdateRejection> {
        let payload = UpdatePayload {
            classes: self.engine.enumerate_classes(),
            removed: Vec::new(),
        };
        self.apply_update(&payload)
    }

    /// 原子地应用更新，使受影响的分派缓存失效并通知引擎和工具
    pub fn apply_update(&mut self, payload: &UpdatePayload) -> Result<AffectedClasses, UpdateRejection> {
        let affected = self.registry.apply_update(payload)?;
        self.bridge.invalidate(&affected);
        self.engine.classes_updated(&payload.classes, &payload.removed);

        let names: Vec<&str> = affected.classes.iter().map(ClassId::as_str).collect();
        self.notifier
            .notify(DebugEventKind::ClassUpdated, names.join(","));
        Ok(affected)
    }

    pub fn wrap(&self, object: &HostObjectRef) -> ObjectHandle {
        self.bridge.wrap(object)
    }

    pub fn on_object_constructed(
        &self,
        object: &HostObjectRef,
        script_class: Option<ClassId>,
    ) -> RegistrationResult<ObjectHandle> {
        self.bridge
            .on_object_constructed(&self.registry, object, script_class)
    }

    pub fn on_object_destroyed(&self, object_id: ObjectId) -> Option<ObjectHandle> {
        self.bridge.on_object_destroyed(object_id)
    }

    pub fn class_of(&self, handle: ObjectHandle) -> DispatchResult<ClassId> {
        self.bridge.class_of(&self.registry, handle)
    }

    pub fn invoke_from_host(&self, handle: ObjectHandle, name: &str, args: &[HostValue]) -> DispatchResult<HostValue> {
        self.bridge
            .invoke_from_host(&self.registry, self.engine.as_ref(), handle, name, args)
    }

    pub fn invoke_from_script(
        &self,
        handle: ObjectHandle,
        name: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        self.bridge
            .invoke_from_script(&self.registry, self.engine.as_ref(), handle, name, args)
    }

    pub fn get_property(&self, handle: ObjectHandle, name: &str) -> DispatchResult<ScriptValue> {
        self.bridge.get_property(&self.registry, handle, name)
    }

    pub fn set_property(&self, handle: ObjectHandle, name: &str, value: ScriptValue) -> DispatchResult<()> {
        self.bridge.set_property(&self.registry, handle, name, value)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.bridge.cache_stats()
    }

    /// 检视某个类的存活对象
    pub fn inspect(&self, class: &str) -> Vec<InspectedHandle> {
        self.bridge
            .live_handles_of(&self.registry, class)
            .into_iter()
            .map(|live| InspectedHandle {
                handle: live.handle,
                object_id: live.object_id,
                class: live.class,
            })
            .collect()
    }

    pub(crate) fn open_queue(&mut self) -> RequestSender {
        let (sender, receiver) = request_queue(self.config.channel.queue_capacity);
        self.requests = Some(receiver);
        sender
    }

    /// 排空请求队列：按顺序应用更新、回答检视请求
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let (requests, superseded) = match &self.requests {
            Some(receiver) => receiver.drain(),
            None => (Vec::new(), 0),
        };
        report.superseded = superseded;

        for request in requests {
            match request {
                TickRequest::Update { payload, reply } => {
                    let result = self.apply_update(&payload);
                    match &result {
                        Ok(_) => report.applied += 1,
                        Err(_) => report.rejected += 1,
                    }
                    if reply.send(result).is_err() {
                        tracing::debug!(target: "runtime", "Tool went away before the update result");
                    }
                }
                TickRequest::Inspect { class, reply } => {
                    let _ = reply.send(self.inspect(class.as_str()));
                    report.inspected += 1;
                }
            }
        }

        report.purged = self.bridge.purge_dead();
        if !report.is_idle() {
            tracing::debug!(target: "runtime", ?report, "Tick processed live update requests");
        }
        report
    }

    /// 启动实时更新通道，返回实际监听地址
    pub fn start_live_updates(&mut self) -> BridgeResult<SocketAddr> {
        if self.server.is_some() {
            return Err(ChannelError::AlreadyRunning.into());
        }
        self.config.channel.validate()?;
        let checksum = match &self.checksum {
            Some(checksum) => checksum.clone(),
            None => BindingTable::new().checksum()?,
        };

        let sender = self.open_queue();
        let server = LiveUpdateServer::start(
            &self.config.channel,
            checksum,
            sender,
            self.notifier.sender.clone(),
        )?;
        let address = server.local_addr();
        self.server = Some(server);
        Ok(address)
    }

    /// 按配置决定是否启动通道
    pub fn start_if_enabled(&mut self) -> BridgeResult<Option<SocketAddr>> {
        if self.config.channel.enabled {
            self.start_live_updates().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn stop_live_updates(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        self.requests = None;
    }

    pub fn live_update_address(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(LiveUpdateServer::local_addr)
    }
}

impl Drop for BridgeRuntime {
    fn drop(&mut self) {
        self.stop_live_updates();
    }
}
