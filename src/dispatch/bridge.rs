//! 分派桥
//!
//! 在宿主调用和脚本调用之间转换，负责参数封送和句柄生命周期。
//! 所有入口都只借用 `&self`，脚本回调宿主时可以安全重入；
//! 调用线程拥有桥，不跨越引擎或原生实现持有任何 `RefCell` 借用。

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::cache::{CacheStats, MethodCache};
use super::handle::{HandleTable, HostObjectRef, ObjectHandle, ObjectId};
use super::marshal::{effective_class, Marshaller};
use super::value::{HostValue, ScriptValue};
use crate::binding::{CallDirection, ClassId};
use crate::config::DispatchConfig;
use crate::core::error::{DispatchError, DispatchResult, RegistrationError, RegistrationResult};
use crate::reflection::{AffectedClasses, MethodImpl, MethodSlot, ReflectionRegistry};
use crate::scripting::{HostGateway, ScriptCall, ScriptEngine, ScriptFault};

/// 一个存活句柄的检视结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveHandle {
    pub handle: ObjectHandle,
    pub object_id: ObjectId,
    /// 有效类
    pub class: ClassId,
}

/// 调用深度守卫，离开作用域时恢复深度
struct DepthGuard<'a> {
    depth: &'a Cell<u32>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl From<ScriptFault> for DispatchError {
    fn from(fault: ScriptFault) -> Self {
        match fault {
            ScriptFault::Dispatch(err) => err,
            ScriptFault::Runtime(message) => DispatchError::Invocation(message),
        }
    }
}

/// 分派桥
pub struct DispatchBridge {
    handles: RefCell<HandleTable>,
    cache: RefCell<MethodCache>,
    depth: Cell<u32>,
    max_depth: u32,
}

impl DispatchBridge {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            handles: RefCell::new(HandleTable::new()),
            cache: RefCell::new(MethodCache::new(config.cache_enabled)),
            depth: Cell::new(0),
            max_depth: config.max_call_depth,
        }
    }

    fn marshaller<'a>(&'a self, registry: &'a ReflectionRegistry) -> Marshaller<'a> {
        Marshaller {
            registry,
            handles: &self.handles,
        }
    }

    fn enter(&self) -> DispatchResult<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            tracing::warn!(target: "dispatch", depth, "Reentrant call limit exceeded");
            return Err(DispatchError::ReentrantCallLimitExceeded(self.max_depth));
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard { depth: &self.depth })
    }

    /// 当前的跨运行时调用深度
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    pub fn wrap(&self, object: &HostObjectRef) -> ObjectHandle {
        self.handles.borrow_mut().wrap(object)
    }

    pub fn unwrap(&self, handle: ObjectHandle) -> DispatchResult<HostObjectRef> {
        self.handles.borrow().unwrap(handle)
    }

    pub fn handle_of(&self, object_id: ObjectId) -> Option<ObjectHandle> {
        self.handles.borrow().handle_of(object_id)
    }

    /// 宿主对象构造通知；可以为对象附加一个继承其宿主类的脚本类
    pub fn on_object_constructed(
        &self,
        registry: &ReflectionRegistry,
        object: &HostObjectRef,
        script_class: Option<ClassId>,
    ) -> RegistrationResult<ObjectHandle> {
        let host_class = object.host_class();
        if !registry.contains(host_class.as_str()) {
            return Err(RegistrationError::UnknownClass(host_class.to_string()));
        }
        if let Some(class) = &script_class {
            if !registry.contains(class.as_str()) {
                return Err(RegistrationError::UnknownClass(class.to_string()));
            }
            if !registry.is_a(class.as_str(), host_class.as_str()) {
                return Err(RegistrationError::NotAScriptSubclass {
                    class: class.to_string(),
                    host_class: host_class.to_string(),
                });
            }
        }

        let mut handles = self.handles.borrow_mut();
        let handle = handles.wrap(object);
        handles
            .set_script_class(handle, script_class.clone())
            .map_err(|_| RegistrationError::UnknownClass(host_class.to_string()))?;
        tracing::debug!(
            target: "dispatch",
            %handle,
            object_id = %object.object_id(),
            host_class = %host_class,
            script_class = ?script_class.as_ref().map(ClassId::as_str),
            "Object constructed"
        );
        Ok(handle)
    }

    /// 宿主对象销毁通知；之前发出的句柄全部失效
    pub fn on_object_destroyed(&self, object_id: ObjectId) -> Option<ObjectHandle> {
        let released = self.handles.borrow_mut().release(object_id);
        if let Some(handle) = released {
            tracing::debug!(target: "dispatch", %handle, %object_id, "Object destroyed");
        }
        released
    }

    /// 对象的有效类
    pub fn class_of(&self, registry: &ReflectionRegistry, handle: ObjectHandle) -> DispatchResult<ClassId> {
        let handles = self.handles.borrow();
        let entry = handles.entry(handle)?;
        Ok(effective_class(
            registry,
            &entry.host_class,
            entry.script_class.as_ref(),
        ))
    }

    fn resolve(
        &self,
        registry: &ReflectionRegistry,
        class: &ClassId,
        name: &str,
        direction: CallDirection,
    ) -> DispatchResult<Arc<MethodSlot>> {
        {
            let mut cache = self.cache.borrow_mut();
            cache.sync(registry.generation());
            if let Some(slot) = cache.get(class.as_str(), name, direction) {
                return Ok(slot);
            }
        }

        let slot = registry
            .resolve_method(class.as_str(), name, direction)
            .ok_or_else(|| DispatchError::MethodNotFound {
                class: class.to_string(),
                method: name.to_string(),
            })?;
        self.cache
            .borrow_mut()
            .insert(class, name, direction, slot.clone());
        Ok(slot)
    }

    fn run_script(
        &self,
        registry: &ReflectionRegistry,
        engine: &dyn ScriptEngine,
        slot: &MethodSlot,
        receiver: ObjectHandle,
        receiver_class: &ClassId,
        args: Vec<ScriptValue>,
    ) -> DispatchResult<ScriptValue> {
        let scope = DispatchScope {
            bridge: self,
            registry,
            engine,
        };
        let call = ScriptCall {
            class: &slot.owner,
            method: &slot.name,
            receiver,
            receiver_class,
            args,
        };
        engine.invoke(call, &scope).map_err(DispatchError::from)
    }

    /// 宿主调用对象上的方法；脚本覆盖优先于宿主实现
    pub fn invoke_from_host(
        &self,
        registry: &ReflectionRegistry,
        engine: &dyn ScriptEngine,
        handle: ObjectHandle,
        name: &str,
        args: &[HostValue],
    ) -> DispatchResult<HostValue> {
        let _guard = self.enter()?;
        let class = self.class_of(registry, handle)?;
        let slot = self.resolve(registry, &class, name, CallDirection::FromHost)?;
        let context = format!("{}.{}", slot.owner, slot.name);
        let marshaller = self.marshaller(registry);

        tracing::trace!(target: "dispatch", %handle, class = %class, method = name, owner = %slot.owner, "Host call");
        match &slot.implementation {
            MethodImpl::Script => {
                let script_args = marshaller.args_to_script(&slot.signature, args, &context)?;
                let result = self.run_script(registry, engine, &slot, handle, &class, script_args)?;
                marshaller.return_to_host(&result, slot.signature.returns.as_ref(), &context)
            }
            MethodImpl::Native(thunk) => {
                marshaller.check_host_args(&slot.signature, args, &context)?;
                let receiver = self.unwrap(handle)?;
                let result = thunk.call(&receiver, args)?;
                marshaller
                    .return_to_script(&result, slot.signature.returns.as_ref(), &context)
                    .map(|_| result)
            }
        }
    }

    /// 脚本调用对象上的方法
    pub fn invoke_from_script(
        &self,
        registry: &ReflectionRegistry,
        engine: &dyn ScriptEngine,
        handle: ObjectHandle,
        name: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        let _guard = self.enter()?;
        let class = self.class_of(registry, handle)?;
        let slot = self.resolve(registry, &class, name, CallDirection::FromScript)?;
        let context = format!("{}.{}", slot.owner, slot.name);
        let marshaller = self.marshaller(registry);

        tracing::trace!(target: "dispatch", %handle, class = %class, method = name, owner = %slot.owner, "Script call");
        match &slot.implementation {
            MethodImpl::Native(thunk) => {
                let host_args = marshaller.args_to_host(&slot.signature, args, &context)?;
                let receiver = self.unwrap(handle)?;
                let result = thunk.call(&receiver, &host_args)?;
                marshaller.return_to_script(&result, slot.signature.returns.as_ref(), &context)
            }
            MethodImpl::Script => {
                marshaller.check_script_args(&slot.signature, args, &context)?;
                let result = self.run_script(registry, engine, &slot, handle, &class, args.to_vec())?;
                marshaller
                    .return_to_host(&result, slot.signature.returns.as_ref(), &context)
                    .map(|_| result)
            }
        }
    }

    pub fn get_property(
        &self,
        registry: &ReflectionRegistry,
        handle: ObjectHandle,
        name: &str,
    ) -> DispatchResult<ScriptValue> {
        let class = self.class_of(registry, handle)?;
        let slot = registry
            .resolve_property(class.as_str(), name)
            .ok_or_else(|| DispatchError::PropertyNotFound {
                class: class.to_string(),
                property: name.to_string(),
            })?;
        let getter = slot.getter.as_ref().ok_or_else(|| DispatchError::PropertyAccess {
            property: name.to_string(),
            access: "readable".to_string(),
        })?;
        let receiver = self.unwrap(handle)?;
        let value = getter.call(&receiver)?;
        self.marshaller(registry)
            .to_script(&value, &slot.shape, &format!("{}.{}", slot.owner, slot.name))
    }

    pub fn set_property(
        &self,
        registry: &ReflectionRegistry,
        handle: ObjectHandle,
        name: &str,
        value: ScriptValue,
    ) -> DispatchResult<()> {
        let class = self.class_of(registry, handle)?;
        let slot = registry
            .resolve_property(class.as_str(), name)
            .ok_or_else(|| DispatchError::PropertyNotFound {
                class: class.to_string(),
                property: name.to_string(),
            })?;
        let setter = slot.setter.as_ref().ok_or_else(|| DispatchError::PropertyAccess {
            property: name.to_string(),
            access: "writable".to_string(),
        })?;
        let host_value = self
            .marshaller(registry)
            .to_host(&value, &slot.shape, &format!("{}.{}", slot.owner, slot.name))?;
        let receiver = self.unwrap(handle)?;
        setter.call(&receiver, host_value)
    }

    /// 实时更新之后丢弃受影响类的缓存条目
    pub fn invalidate(&self, affected: &AffectedClasses) {
        self.cache
            .borrow_mut()
            .invalidate_classes(&affected.classes, affected.generation);
        tracing::debug!(
            target: "dispatch",
            classes = affected.classes.len(),
            generation = affected.generation,
            "Invalidated dispatch cache"
        );
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    /// 有效类为 `class` 或其子类的存活句柄，按句柄排序
    pub fn live_handles_of(&self, registry: &ReflectionRegistry, class: &str) -> Vec<LiveHandle> {
        let handles = self.handles.borrow();
        let mut live: Vec<LiveHandle> = handles
            .live()
            .map(|(handle, entry)| LiveHandle {
                handle,
                object_id: entry.object_id,
                class: effective_class(registry, &entry.host_class, entry.script_class.as_ref()),
            })
            .filter(|live| registry.is_a(live.class.as_str(), class))
            .collect();
        live.sort_by_key(|live| live.handle);
        live
    }

    pub fn purge_dead(&self) -> usize {
        self.handles.borrow_mut().purge_dead()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }
}

/// 一次脚本执行期间交给引擎的宿主入口
pub struct DispatchScope<'a> {
    pub bridge: &'a DispatchBridge,
    pub registry: &'a ReflectionRegistry,
    pub engine: &'a dyn ScriptEngine,
}

impl HostGateway for DispatchScope<'_> {
    fn call(&self, receiver: ObjectHandle, method: &str, args: &[ScriptValue]) -> DispatchResult<ScriptValue> {
        self.bridge
            .invoke_from_script(self.registry, self.engine, receiver, method, args)
    }

    fn get_property(&self, receiver: ObjectHandle, name: &str) -> DispatchResult<ScriptValue> {
        self.bridge.get_property(self.registry, receiver, name)
    }

    fn set_property(&self, receiver: ObjectHandle, name: &str, value: ScriptValue) -> DispatchResult<()> {
        self.bridge.set_property(self.registry, receiver, name, value)
    }

    fn class_of(&self, receiver: ObjectHandle) -> DispatchResult<ClassId> {
        self.bridge.class_of(self.registry, receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Shape, Signature};
    use crate::dispatch::handle::test_support::TestObject;
    use crate::reflection::{GetterThunk, HostClassDescriptor, NativeThunk, ScriptClassDescriptor, SetterThunk, UpdatePayload};
    use crate::scripting::RustScriptEngine;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn take_damage() -> Signature {
        Signature::new().param("amount", Shape::Integer)
    }

    fn setup(log: &Log) -> (ReflectionRegistry, RustScriptEngine) {
        let mut registry = ReflectionRegistry::new();
        let host_log = log.clone();
        let tag_log = log.clone();
        registry
            .register_host(
                HostClassDescriptor::new("Actor")
                    .method(
                        "take_damage",
                        take_damage(),
                        CallDirection::Both,
                        NativeThunk::new(move |_, args| {
                            host_log
                                .lock()
                                .unwrap()
                                .push(format!("Actor.take_damage({})", args[0].as_integer().unwrap_or(-1)));
                            Ok(HostValue::Nil)
                        }),
                    )
                    .method(
                        "health",
                        Signature::new().returning(Shape::Integer),
                        CallDirection::FromScript,
                        NativeThunk::new(|_, _| Ok(HostValue::Integer(100))),
                    )
                    .property(
                        "max_health",
                        Shape::Real,
                        Some(GetterThunk::new(|_| Ok(HostValue::Real(250.0)))),
                        None,
                    )
                    .property(
                        "tag",
                        Shape::Name,
                        None,
                        Some(SetterThunk::new(move |_, value| {
                            tag_log.lock().unwrap().push(format!("tag={:?}", value));
                            Ok(())
                        })),
                    ),
            )
            .unwrap();
        registry
            .register_script(
                ScriptClassDescriptor::new("Boss")
                    .extends("Actor")
                    .method("take_damage", take_damage())
                    .method("recurse", Signature::new()),
            )
            .unwrap();

        let mut engine = RustScriptEngine::new();
        let script_log = log.clone();
        engine
            .define("Boss", "take_damage", move |ctx| {
                let health = ctx.host.call(ctx.receiver, "health", &[])?;
                script_log.lock().unwrap().push(format!(
                    "Boss.take_damage({}) health={}",
                    ctx.integer(0)?,
                    health.as_integer().unwrap_or(-1)
                ));
                Ok(ScriptValue::Nil)
            })
            .define("Boss", "recurse", |ctx| {
                ctx.host.call(ctx.receiver, "recurse", &[])?;
                Ok(ScriptValue::Nil)
            });
        (registry, engine)
    }

    fn bridge() -> DispatchBridge {
        DispatchBridge::new(&DispatchConfig {
            max_call_depth: 8,
            cache_enabled: true,
        })
    }

    #[test]
    fn test_host_call_routes_into_script_override() {
        let log = Log::default();
        let (registry, engine) = setup(&log);
        let bridge = bridge();
        let boss = TestObject::new(1, "Actor");
        let handle = bridge
            .on_object_constructed(&registry, &boss, Some(ClassId::from("Boss")))
            .unwrap();

        let result = bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(10)])
            .unwrap();
        assert!(matches!(result, HostValue::Nil));
        assert_eq!(*log.lock().unwrap(), vec!["Boss.take_damage(10) health=100".to_string()]);
        assert_eq!(bridge.depth(), 0);
    }

    #[test]
    fn test_plain_actor_uses_native_implementation() {
        let log = Log::default();
        let (registry, engine) = setup(&log);
        let bridge = bridge();
        let actor = TestObject::new(2, "Actor");
        let handle = bridge.on_object_constructed(&registry, &actor, None).unwrap();

        bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(3)])
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["Actor.take_damage(3)".to_string()]);
    }

    #[test]
    fn test_removed_script_class_falls_back_to_host_class() {
        let log = Log::default();
        let (mut registry, engine) = setup(&log);
        let bridge = bridge();
        let boss = TestObject::new(1, "Actor");
        let handle = bridge
            .on_object_constructed(&registry, &boss, Some(ClassId::from("Boss")))
            .unwrap();
        bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(1)])
            .unwrap();

        let affected = registry
            .apply_update(&UpdatePayload::new().removing("Boss"))
            .unwrap();
        bridge.invalidate(&affected);

        assert_eq!(bridge.class_of(&registry, handle).unwrap().as_str(), "Actor");
        bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(2)])
            .unwrap();
        assert_eq!(log.lock().unwrap().last().unwrap(), "Actor.take_damage(2)");
    }

    #[test]
    fn test_stale_handle_after_destroy() {
        let log = Log::default();
        let (registry, engine) = setup(&log);
        let bridge = bridge();
        let actor = TestObject::new(5, "Actor");
        let handle = bridge.on_object_constructed(&registry, &actor, None).unwrap();

        assert_eq!(bridge.on_object_destroyed(ObjectId(5)), Some(handle));
        let err = bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(1)])
            .unwrap_err();
        assert_eq!(err, DispatchError::StaleHandle(handle));
        assert_eq!(bridge.unwrap(handle).err(), Some(DispatchError::StaleHandle(handle)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reentrancy_limit_is_recoverable() {
        let log = Log::default();
        let (registry, engine) = setup(&log);
        let bridge = bridge();
        let boss = TestObject::new(1, "Actor");
        let handle = bridge
            .on_object_constructed(&registry, &boss, Some(ClassId::from("Boss")))
            .unwrap();

        let err = bridge
            .invoke_from_host(&registry, &engine, handle, "recurse", &[])
            .unwrap_err();
        assert_eq!(err, DispatchError::ReentrantCallLimitExceeded(8));
        assert_eq!(bridge.depth(), 0);

        assert!(bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(1)])
            .is_ok());
    }

    #[test]
    fn test_errors_are_values() {
        let log = Log::default();
        let (registry, engine) = setup(&log);
        let bridge = bridge();
        let actor = TestObject::new(1, "Actor");
        let handle = bridge.on_object_constructed(&registry, &actor, None).unwrap();

        assert!(matches!(
            bridge.invoke_from_host(&registry, &engine, handle, "jump", &[]),
            Err(DispatchError::MethodNotFound { .. })
        ));
        assert!(matches!(
            bridge.invoke_from_script(
                &registry,
                &engine,
                handle,
                "take_damage",
                &[ScriptValue::String("ten".into())]
            ),
            Err(DispatchError::ShapeMismatch { .. })
        ));
        // 仅供脚本调用的方法对宿主不可见
        assert!(matches!(
            bridge.invoke_from_host(&registry, &engine, handle, "health", &[]),
            Err(DispatchError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_properties() {
        let log = Log::default();
        let (registry, _engine) = setup(&log);
        let bridge = bridge();
        let boss = TestObject::new(1, "Actor");
        let handle = bridge
            .on_object_constructed(&registry, &boss, Some(ClassId::from("Boss")))
            .unwrap();

        assert_eq!(
            bridge.get_property(&registry, handle, "max_health").unwrap(),
            ScriptValue::Real(250.0)
        );
        assert!(matches!(
            bridge.set_property(&registry, handle, "max_health", ScriptValue::Real(1.0)),
            Err(DispatchError::PropertyAccess { .. })
        ));
        assert!(matches!(
            bridge.get_property(&registry, handle, "tag"),
            Err(DispatchError::PropertyAccess { .. })
        ));
        bridge
            .set_property(&registry, handle, "tag", ScriptValue::Name("elite".into()))
            .unwrap();
        assert!(matches!(
            bridge.get_property(&registry, handle, "armor"),
            Err(DispatchError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn test_cache_hits_and_same_tick_update() {
        let log = Log::default();
        let (mut registry, mut engine) = setup(&log);
        let bridge = bridge();
        let actor = TestObject::new(1, "Actor");
        let handle = bridge
            .on_object_constructed(&registry, &actor, Some(ClassId::from("Boss")))
            .unwrap();

        for _ in 0..3 {
            bridge
                .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(1)])
                .unwrap();
        }
        assert!(bridge.cache_stats().hits >= 2);

        let affected = registry
            .apply_update(&UpdatePayload::new().with_class(
                ScriptClassDescriptor::new("Boss")
                    .extends("Actor")
                    .method("take_damage", take_damage())
                    .method("taunt", Signature::new()),
            ))
            .unwrap();
        bridge.invalidate(&affected);
        let taunt_log = log.clone();
        engine.define("Boss", "taunt", move |_| {
            taunt_log.lock().unwrap().push("Boss.taunt".to_string());
            Ok(ScriptValue::Nil)
        });

        bridge
            .invoke_from_host(&registry, &engine, handle, "taunt", &[])
            .unwrap();
        assert_eq!(log.lock().unwrap().last().unwrap(), "Boss.taunt");
    }

    #[test]
    fn test_registration_outside_update_is_not_masked_by_later_update() {
        let log = Log::default();
        let (mut registry, mut engine) = setup(&log);
        let bridge = bridge();
        let actor = TestObject::new(3, "Actor");
        let handle = bridge.on_object_constructed(&registry, &actor, None).unwrap();

        bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(1)])
            .unwrap();
        assert_eq!(log.lock().unwrap().last().unwrap(), "Actor.take_damage(1)");

        // 镜像脚本类直接注册，不经过 apply_update
        registry
            .register_script(
                ScriptClassDescriptor::new("Actor").method("take_damage", take_damage()),
            )
            .unwrap();
        let mirror_log = log.clone();
        engine.define("Actor", "take_damage", move |ctx| {
            mirror_log
                .lock()
                .unwrap()
                .push(format!("mirror.take_damage({})", ctx.integer(0)?));
            Ok(ScriptValue::Nil)
        });

        let affected = registry
            .apply_update(&UpdatePayload::new().with_class(
                ScriptClassDescriptor::new("Minion").extends("Actor"),
            ))
            .unwrap();
        assert!(!affected.contains("Actor"));
        bridge.invalidate(&affected);

        bridge
            .invoke_from_host(&registry, &engine, handle, "take_damage", &[HostValue::Integer(2)])
            .unwrap();
        assert_eq!(log.lock().unwrap().last().unwrap(), "mirror.take_damage(2)");
    }

    #[test]
    fn test_construction_rejects_unrelated_script_class() {
        let log = Log::default();
        let (mut registry, _engine) = setup(&log);
        registry
            .register_host(HostClassDescriptor::new("Light"))
            .unwrap();
        let bridge = bridge();
        let light = TestObject::new(9, "Light");

        assert_eq!(
            bridge.on_object_constructed(&registry, &light, Some(ClassId::from("Boss"))),
            Err(RegistrationError::NotAScriptSubclass {
                class: "Boss".to_string(),
                host_class: "Light".to_string(),
            })
        );
        let live = bridge.live_handles_of(&registry, "Actor");
        assert!(live.is_empty());
    }

    #[test]
    fn test_live_handles_of_class() {
        let log = Log::default();
        let (registry, _engine) = setup(&log);
        let bridge = bridge();
        let a = TestObject::new(1, "Actor");
        let b = TestObject::new(2, "Actor");
        bridge.on_object_constructed(&registry, &a, None).unwrap();
        bridge
            .on_object_constructed(&registry, &b, Some(ClassId::from("Boss")))
            .unwrap();

        assert_eq!(bridge.live_handles_of(&registry, "Actor").len(), 2);
        let bosses = bridge.live_handles_of(&registry, "Boss");
        assert_eq!(bosses.len(), 1);
        assert_eq!(bosses[0].object_id, ObjectId(2));

        drop(a);
        assert_eq!(bridge.purge_dead(), 1);
        assert_eq!(bridge.handle_count(), 1);
    }
}
