//! 反射注册表
//!
//! 宿主类与脚本类共用一个名称空间。与宿主类同名的脚本类是“镜像”：
//! 解析方法时先查脚本部分，再查宿主部分，然后沿宿主父类链继续。
//! 每次成功的注册或更新都会使 `generation` 递增，分派缓存以此判断是否过期。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::descriptor::{
    ClassView, HostClassDescriptor, MethodSlot, NativeBindings, PropertySlot, ScriptClassDescriptor,
};
use crate::binding::{BindingTable, CallDirection, ClassId, EnumBinding, Signature};
use crate::core::error::{RegistrationError, RegistrationResult};

#[derive(Debug, Clone)]
pub(super) struct HostEntry {
    pub(super) descriptor: HostClassDescriptor,
    pub(super) version: u64,
}

#[derive(Debug, Clone)]
pub(super) struct ScriptEntry {
    pub(super) descriptor: ScriptClassDescriptor,
    pub(super) slots: Vec<Arc<MethodSlot>>,
    pub(super) version: u64,
}

impl ScriptEntry {
    pub(super) fn new(descriptor: ScriptClassDescriptor, version: u64) -> Self {
        Self {
            slots: descriptor.slots(),
            descriptor,
            version,
        }
    }
}

pub(super) type HostMap = HashMap<ClassId, HostEntry>;
pub(super) type ScriptMap = HashMap<ClassId, ScriptEntry>;

/// 绑定表中没能注册的类
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedClass {
    pub class: ClassId,
    pub error: RegistrationError,
}

/// 运行时反射注册表
#[derive(Debug, Default)]
pub struct ReflectionRegistry {
    pub(super) host: HostMap,
    pub(super) script: ScriptMap,
    pub(super) enums: HashMap<String, EnumBinding>,
    /// 类 -> 最近的宿主祖先（含自身）
    pub(super) host_ancestors: HashMap<ClassId, ClassId>,
    pub(super) generation: u64,
}

impl ReflectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按父类在前的顺序注册绑定表中的所有枚举和类
    ///
    /// 注册失败的类被跳过并记录在返回的列表中；它的子类因父类缺失同样被跳过，
    /// 其余的类照常注册。
    pub fn from_binding_table(table: &BindingTable, natives: &NativeBindings) -> (Self, Vec<SkippedClass>) {
        let mut registry = Self::new();
        let mut skipped = Vec::new();
        for binding in table.enums() {
            registry.register_enum(binding.clone());
        }
        for binding in table.registration_order() {
            let registered = HostClassDescriptor::from_binding(binding, natives)
                .and_then(|descriptor| registry.register_host(descriptor));
            if let Err(error) = registered {
                tracing::warn!(
                    target: "reflection",
                    class = %binding.name,
                    error = %error,
                    "Skipped class from binding table"
                );
                skipped.push(SkippedClass {
                    class: ClassId::new(binding.name.clone()),
                    error,
                });
            }
        }
        tracing::info!(
            target: "reflection",
            classes = registry.host.len(),
            enums = registry.enums.len(),
            skipped = skipped.len(),
            "Registry built from binding table"
        );
        (registry, skipped)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn register_enum(&mut self, binding: EnumBinding) {
        self.enums.insert(binding.name.clone(), binding);
    }

    pub fn enum_binding(&self, name: &str) -> Option<&EnumBinding> {
        self.enums.get(name)
    }

    /// 注册宿主类；父类必须已经注册为宿主类
    pub fn register_host(&mut self, descriptor: HostClassDescriptor) -> RegistrationResult<()> {
        let id = descriptor.id.clone();
        if self.host.contains_key(&id) || self.script.contains_key(&id) {
            return Err(RegistrationError::DuplicateClass(id.to_string()));
        }
        if let Some(parent) = &descriptor.superclass {
            if !self.host.contains_key(parent) {
                return Err(RegistrationError::UnknownSuperclass {
                    class: id.to_string(),
                    superclass: parent.to_string(),
                });
            }
        }

        check_unique(&id, descriptor.methods.iter().map(|m| m.name.as_str()))?;
        check_unique(&id, descriptor.properties.iter().map(|p| p.name.as_str()))?;
        for slot in &descriptor.methods {
            if let Some(ancestor) =
                find_slot(&self.host, &self.script, descriptor.superclass.as_ref(), &slot.name)
            {
                check_override(&id, &slot.name, &slot.signature, &ancestor.signature)?;
            }
        }

        self.generation += 1;
        self.host.insert(
            id.clone(),
            HostEntry {
                descriptor,
                version: self.generation,
            },
        );
        self.rebuild_index();
        tracing::debug!(target: "reflection", class = %id, "Registered host class");
        Ok(())
    }

    /// 注册新的脚本类；替换已有脚本类需要走 `apply_update`
    pub fn register_script(&mut self, descriptor: ScriptClassDescriptor) -> RegistrationResult<()> {
        let id = descriptor.id.clone();
        if self.script.contains_key(&id) {
            return Err(RegistrationError::DuplicateClass(id.to_string()));
        }

        let mut staged = self.script.clone();
        staged.insert(id.clone(), ScriptEntry::new(descriptor, self.generation + 1));
        validate_script_class(&self.host, &staged, &self.enums, &id)?;

        self.generation += 1;
        self.script = staged;
        self.stamp(&[id.clone()]);
        self.rebuild_index();
        tracing::debug!(target: "reflection", class = %id, "Registered script class");
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.host.contains_key(id) || self.script.contains_key(id)
    }

    pub fn resolve_class(&self, id: &str) -> Option<ClassView<'_>> {
        let host = self.host.get_key_value(id);
        let script = self.script.get_key_value(id);
        let key = host.map(|(k, _)| k).or(script.map(|(k, _)| k))?;
        Some(ClassView {
            id: key,
            host: host.map(|(_, entry)| &entry.descriptor),
            script: script.map(|(_, entry)| &entry.descriptor),
            version: host
                .map(|(_, e)| e.version)
                .max(script.map(|(_, e)| e.version))
                .unwrap_or(0),
        })
    }

    pub fn superclass_of(&self, id: &str) -> Option<&ClassId> {
        superclass_in(&self.host, &self.script, id)
    }

    /// 沿父类链查找第一个名称匹配且允许该调用方向的方法槽
    pub fn resolve_method(
        &self,
        class: &str,
        name: &str,
        direction: CallDirection,
    ) -> Option<Arc<MethodSlot>> {
        let mut current = Some(class);
        let mut steps = 0;
        while let Some(id) = current {
            if let Some(entry) = self.script.get(id) {
                if let Some(slot) = entry
                    .slots
                    .iter()
                    .find(|s| s.name == name && s.direction.permits(direction))
                {
                    return Some(slot.clone());
                }
            }
            if let Some(entry) = self.host.get(id) {
                if let Some(slot) = entry
                    .descriptor
                    .methods
                    .iter()
                    .find(|s| s.name == name && s.direction.permits(direction))
                {
                    return Some(slot.clone());
                }
            }
            steps += 1;
            if steps > self.host.len() + self.script.len() {
                break;
            }
            current = self.superclass_of(id).map(ClassId::as_str);
        }
        None
    }

    /// 属性只存在于宿主类上
    pub fn resolve_property(&self, class: &str, name: &str) -> Option<Arc<PropertySlot>> {
        let mut current = self.nearest_host_ancestor(class).map(ClassId::as_str);
        while let Some(id) = current {
            let entry = self.host.get(id)?;
            if let Some(slot) = entry.descriptor.properties.iter().find(|p| p.name == name) {
                return Some(slot.clone());
            }
            current = entry.descriptor.superclass.as_ref().map(ClassId::as_str);
        }
        None
    }

    /// 最近的宿主祖先（宿主类和镜像类返回自身）
    pub fn nearest_host_ancestor(&self, class: &str) -> Option<&ClassId> {
        self.host_ancestors.get(class)
    }

    /// `class` 是否为 `ancestor` 或其子类
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return self.contains(id);
            }
            steps += 1;
            if steps > self.host.len() + self.script.len() {
                return false;
            }
            current = self.superclass_of(id).map(ClassId::as_str);
        }
        false
    }

    /// 所有直接和间接子类，按名称排序
    pub fn subclasses_of(&self, class: &str) -> Vec<ClassId> {
        self.class_names()
            .into_iter()
            .filter(|id| id.as_str() != class && self.is_a(id.as_str(), class))
            .collect()
    }

    pub fn class_names(&self) -> Vec<ClassId> {
        let names: BTreeSet<&ClassId> = self.host.keys().chain(self.script.keys()).collect();
        names.into_iter().cloned().collect()
    }

    pub fn script_classes(&self) -> impl Iterator<Item = &ScriptClassDescriptor> {
        self.script.values().map(|entry| &entry.descriptor)
    }

    pub fn is_script_class(&self, id: &str) -> bool {
        self.script.contains_key(id)
    }

    pub(super) fn stamp(&mut self, classes: &[ClassId]) {
        for id in classes {
            if let Some(entry) = self.host.get_mut(id) {
                entry.version = self.generation;
            }
            if let Some(entry) = self.script.get_mut(id) {
                entry.version = self.generation;
            }
        }
    }

    pub(super) fn rebuild_index(&mut self) {
        let mut index = HashMap::with_capacity(self.host.len() + self.script.len());
        for id in self.host.keys().chain(self.script.keys()) {
            let mut current = Some(id);
            let mut steps = 0;
            while let Some(candidate) = current {
                if self.host.contains_key(candidate) {
                    index.insert(id.clone(), candidate.clone());
                    break;
                }
                steps += 1;
                if steps > self.host.len() + self.script.len() {
                    break;
                }
                current = superclass_in(&self.host, &self.script, candidate.as_str());
            }
        }
        self.host_ancestors = index;
    }
}

pub(super) fn superclass_in<'a>(host: &'a HostMap, script: &'a ScriptMap, id: &str) -> Option<&'a ClassId> {
    match host.get(id) {
        Some(entry) => entry.descriptor.superclass.as_ref(),
        None => script.get(id).and_then(|e| e.descriptor.superclass.as_ref()),
    }
}

/// 从 `start` 开始（含）按名称查找任意方向的槽
fn find_slot<'a>(
    host: &'a HostMap,
    script: &'a ScriptMap,
    start: Option<&'a ClassId>,
    name: &str,
) -> Option<&'a Arc<MethodSlot>> {
    let mut current = start.map(ClassId::as_str);
    let mut steps = 0;
    while let Some(id) = current {
        if let Some(slot) = script
            .get(id)
            .and_then(|e| e.slots.iter().find(|s| s.name == name))
        {
            return Some(slot);
        }
        if let Some(slot) = host
            .get(id)
            .and_then(|e| e.descriptor.methods.iter().find(|s| s.name == name))
        {
            return Some(slot);
        }
        steps += 1;
        if steps > host.len() + script.len() {
            return None;
        }
        current = superclass_in(host, script, id).map(ClassId::as_str);
    }
    None
}

fn check_unique<'a>(
    class: &ClassId,
    names: impl Iterator<Item = &'a str>,
) -> RegistrationResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(RegistrationError::DuplicateSlot {
                class: class.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn check_override(
    class: &ClassId,
    method: &str,
    ours: &Signature,
    ancestor: &Signature,
) -> RegistrationResult<()> {
    ours.check_override(ancestor)
        .map_err(|detail| RegistrationError::IncompatibleOverride {
            class: class.to_string(),
            method: method.to_string(),
            detail,
        })
}

/// 针对暂存的脚本类集合验证其中一个类
pub(super) fn validate_script_class(
    host: &HostMap,
    script: &ScriptMap,
    enums: &HashMap<String, EnumBinding>,
    id: &ClassId,
) -> RegistrationResult<()> {
    let Some(entry) = script.get(id) else {
        return Err(RegistrationError::UnknownClass(id.to_string()));
    };
    let descriptor = &entry.descriptor;

    // 镜像类的父类必须与宿主类一致
    let mirrored = host.get(id);
    match (mirrored, &descriptor.superclass) {
        (Some(host_entry), Some(parent))
            if host_entry.descriptor.superclass.as_ref() != Some(parent) =>
        {
            return Err(RegistrationError::InvalidMirror {
                class: id.to_string(),
                detail: format!(
                    "declares superclass {} but host class extends {}",
                    parent,
                    host_entry
                        .descriptor
                        .superclass
                        .as_ref()
                        .map(ClassId::as_str)
                        .unwrap_or("nothing")
                ),
            });
        }
        (None, Some(parent)) if !host.contains_key(parent) && !script.contains_key(parent) => {
            return Err(RegistrationError::UnknownSuperclass {
                class: id.to_string(),
                superclass: parent.to_string(),
            });
        }
        _ => {}
    }

    let mut current = superclass_in(host, script, id.as_str());
    let mut steps = 0;
    while let Some(parent) = current {
        steps += 1;
        if parent == id || steps > host.len() + script.len() {
            return Err(RegistrationError::SuperclassCycle(id.to_string()));
        }
        current = superclass_in(host, script, parent.as_str());
    }

    check_unique(id, descriptor.methods.iter().map(|m| m.name.as_str()))?;

    for method in &descriptor.methods {
        let shapes = method
            .signature
            .params
            .iter()
            .map(|p| &p.shape)
            .chain(method.signature.returns.as_ref());
        for shape in shapes {
            for name in shape.referenced_types() {
                let known = match shape {
                    crate::binding::Shape::Enum(_) => enums.contains_key(name),
                    _ => {
                        enums.contains_key(name)
                            || host.contains_key(name)
                            || script.contains_key(name)
                    }
                };
                if !known {
                    return Err(RegistrationError::UnknownClass(name.to_string()));
                }
            }
        }

        // 镜像类先与自身的宿主槽比较
        let ancestor = match mirrored {
            Some(host_entry) => host_entry
                .descriptor
                .methods
                .iter()
                .find(|s| s.name == method.name)
                .or_else(|| {
                    find_slot(host, script, host_entry.descriptor.superclass.as_ref(), &method.name)
                }),
            None => find_slot(host, script, descriptor.superclass.as_ref(), &method.name),
        };
        if let Some(ancestor) = ancestor {
            check_override(id, &method.name, &method.signature, &ancestor.signature)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ClassBinding, MethodBinding, Shape};
    use crate::dispatch::HostValue;
    use crate::reflection::descriptor::{ClassKind, MethodImpl, NativeThunk};

    fn noop() -> NativeThunk {
        NativeThunk::new(|_, _| Ok(HostValue::Nil))
    }

    fn damage() -> Signature {
        Signature::new().param("amount", Shape::Integer)
    }

    fn registry() -> ReflectionRegistry {
        let mut registry = ReflectionRegistry::new();
        registry
            .register_host(
                HostClassDescriptor::new("Entity").method(
                    "name",
                    Signature::new().returning(Shape::String),
                    CallDirection::Both,
                    noop(),
                ),
            )
            .unwrap();
        registry
            .register_host(
                HostClassDescriptor::new("Actor")
                    .extends("Entity")
                    .method("take_damage", damage(), CallDirection::Both, noop())
                    .method("move", Signature::new(), CallDirection::FromScript, noop()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_host_registration_rules() {
        let mut registry = registry();
        assert_eq!(
            registry.register_host(HostClassDescriptor::new("Actor")),
            Err(RegistrationError::DuplicateClass("Actor".to_string()))
        );
        assert!(matches!(
            registry.register_host(HostClassDescriptor::new("Pawn").extends("Missing")),
            Err(RegistrationError::UnknownSuperclass { .. })
        ));
        assert!(matches!(
            registry.register_host(
                HostClassDescriptor::new("Pawn")
                    .method("jump", Signature::new(), CallDirection::Both, noop())
                    .method("jump", Signature::new(), CallDirection::Both, noop())
            ),
            Err(RegistrationError::DuplicateSlot { .. })
        ));
        assert!(matches!(
            registry.register_host(HostClassDescriptor::new("Pawn").extends("Actor").method(
                "take_damage",
                Signature::new().param("amount", Shape::Real),
                CallDirection::Both,
                noop()
            )),
            Err(RegistrationError::IncompatibleOverride { .. })
        ));
    }

    #[test]
    fn test_resolution_walks_chain() {
        let registry = registry();
        let slot = registry
            .resolve_method("Actor", "name", CallDirection::FromScript)
            .unwrap();
        assert_eq!(slot.owner.as_str(), "Entity");
        assert!(registry
            .resolve_method("Actor", "move", CallDirection::FromHost)
            .is_none());
        assert!(registry
            .resolve_method("Actor", "fly", CallDirection::FromScript)
            .is_none());
    }

    #[test]
    fn test_script_override_shadows_host_slot() {
        let mut registry = registry();
        registry
            .register_script(ScriptClassDescriptor::new("Boss").extends("Actor").method("take_damage", damage()))
            .unwrap();

        let slot = registry
            .resolve_method("Boss", "take_damage", CallDirection::FromHost)
            .unwrap();
        assert_eq!(slot.owner.as_str(), "Boss");
        assert!(matches!(slot.implementation, MethodImpl::Script));
        assert_eq!(registry.nearest_host_ancestor("Boss").unwrap().as_str(), "Actor");
        assert!(registry.is_a("Boss", "Entity"));
        assert!(!registry.is_a("Actor", "Boss"));
        assert_eq!(registry.subclasses_of("Actor"), vec![ClassId::from("Boss")]);
    }

    #[test]
    fn test_script_registration_errors() {
        let mut registry = registry();
        assert!(matches!(
            registry.register_script(ScriptClassDescriptor::new("Boss").extends("Enemy")),
            Err(RegistrationError::UnknownSuperclass { .. })
        ));
        assert!(matches!(
            registry.register_script(
                ScriptClassDescriptor::new("Boss")
                    .extends("Actor")
                    .method("take_damage", Signature::new().param("amount", Shape::String))
            ),
            Err(RegistrationError::IncompatibleOverride { .. })
        ));
        assert!(matches!(
            registry.register_script(ScriptClassDescriptor::new("Loop").extends("Loop")),
            Err(RegistrationError::SuperclassCycle(_))
        ));
        assert!(matches!(
            registry.register_script(
                ScriptClassDescriptor::new("Boss")
                    .extends("Actor")
                    .method("target", Signature::new().returning(Shape::object("Hero")))
            ),
            Err(RegistrationError::UnknownClass(_))
        ));
        assert_eq!(registry.class_names().len(), 2);
    }

    #[test]
    fn test_mirror_class() {
        let mut registry = registry();
        assert!(matches!(
            registry.register_script(ScriptClassDescriptor::new("Actor").extends("Actor2")),
            Err(RegistrationError::InvalidMirror { .. })
        ));

        registry
            .register_script(
                ScriptClassDescriptor::new("Actor").method("greet", Signature::new()),
            )
            .unwrap();
        let view = registry.resolve_class("Actor").unwrap();
        assert_eq!(view.kind(), ClassKind::Mirrored);
        assert_eq!(view.superclass().unwrap().as_str(), "Entity");
        assert!(registry
            .resolve_method("Actor", "greet", CallDirection::FromHost)
            .unwrap()
            .is_script());
        assert!(!registry
            .resolve_method("Actor", "take_damage", CallDirection::FromHost)
            .unwrap()
            .is_script());
    }

    #[test]
    fn test_generation_and_version_stamps() {
        let mut registry = registry();
        let before = registry.generation();
        registry
            .register_script(ScriptClassDescriptor::new("Boss").extends("Actor"))
            .unwrap();
        assert_eq!(registry.generation(), before + 1);
        assert_eq!(registry.resolve_class("Boss").unwrap().version, before + 1);
        assert_eq!(registry.resolve_class("Entity").unwrap().version, 1);
    }

    #[test]
    fn test_property_resolution() {
        let mut registry = ReflectionRegistry::new();
        registry
            .register_host(HostClassDescriptor::new("Entity").property("name", Shape::String, None, None))
            .unwrap();
        registry
            .register_host(HostClassDescriptor::new("Actor").extends("Entity"))
            .unwrap();
        registry
            .register_script(ScriptClassDescriptor::new("Boss").extends("Actor"))
            .unwrap();
        assert_eq!(
            registry.resolve_property("Boss", "name").unwrap().owner.as_str(),
            "Entity"
        );
        assert!(registry.resolve_property("Boss", "age").is_none());
    }

    fn class_binding(name: &str, superclass: Option<&str>, methods: &[(&str, Shape)]) -> ClassBinding {
        ClassBinding {
            name: name.to_string(),
            host_name: name.to_string(),
            superclass: superclass.map(str::to_string),
            methods: methods
                .iter()
                .map(|(method, shape)| MethodBinding {
                    name: method.to_string(),
                    host_name: method.to_string(),
                    signature: Signature::new().param("amount", shape.clone()),
                    direction: CallDirection::Both,
                })
                .collect(),
            properties: Vec::new(),
        }
    }

    #[test]
    fn test_binding_table_skips_bad_classes_and_keeps_the_rest() {
        let mut table = BindingTable::new();
        table.insert_class(class_binding("Actor", None, &[("take_damage", Shape::Integer)]));
        table.insert_class(class_binding("Pawn", Some("Actor"), &[("take_damage", Shape::Real)]));
        table.insert_class(class_binding("Sentry", Some("Pawn"), &[]));
        table.insert_class(class_binding("Lamp", None, &[("flicker", Shape::Integer)]));
        table.insert_class(class_binding("Light", None, &[("dim", Shape::Integer)]));

        let mut natives = NativeBindings::new();
        natives
            .bind_method("Actor", "take_damage", |_, _| Ok(HostValue::Nil))
            .bind_method("Pawn", "take_damage", |_, _| Ok(HostValue::Nil))
            .bind_method("Light", "dim", |_, _| Ok(HostValue::Nil));

        let (registry, skipped) = ReflectionRegistry::from_binding_table(&table, &natives);
        assert!(registry.contains("Actor"));
        assert!(registry.contains("Light"));
        assert!(registry
            .resolve_method("Light", "dim", CallDirection::FromScript)
            .is_some());

        let skipped: HashMap<&str, &RegistrationError> =
            skipped.iter().map(|s| (s.class.as_str(), &s.error)).collect();
        assert_eq!(skipped.len(), 3);
        assert!(matches!(skipped["Pawn"], RegistrationError::IncompatibleOverride { .. }));
        assert!(matches!(skipped["Sentry"], RegistrationError::UnknownSuperclass { .. }));
        assert!(matches!(skipped["Lamp"], RegistrationError::MissingThunk { .. }));
        assert!(!registry.contains("Pawn"));
        assert!(!registry.contains("Sentry"));
        assert!(!registry.contains("Lamp"));
    }
}
