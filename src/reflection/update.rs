//! 增量更新
//!
//! 更新负载先在注册表的脚本类副本上暂存并整体验证，全部通过后才替换，
//! 任何一个类验证失败都会让整个负载被拒绝，注册表保持原样。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::descriptor::ScriptClassDescriptor;
use super::registry::{
    superclass_in, validate_script_class, HostMap, ReflectionRegistry, ScriptEntry, ScriptMap,
};
use crate::binding::ClassId;
use crate::core::error::UpdateRejection;

/// 一次实时更新的内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// 新编译的脚本类（新增或整体替换）
    pub classes: Vec<ScriptClassDescriptor>,
    /// 要移除的脚本类
    pub removed: Vec<ClassId>,
}

impl UpdatePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: ScriptClassDescriptor) -> Self {
        self.classes.push(class);
        self
    }

    pub fn removing(mut self, class: impl Into<ClassId>) -> Self {
        self.removed.push(class.into());
        self
    }

    /// 负载直接触及的类
    pub fn touched_classes(&self) -> BTreeSet<ClassId> {
        self.classes
            .iter()
            .map(|c| c.id.clone())
            .chain(self.removed.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.removed.is_empty()
    }
}

/// 成功应用后受影响的类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedClasses {
    /// 被替换、新增、移除的类及其所有子类，按名称排序
    pub classes: Vec<ClassId>,
    /// 应用后的注册表代数
    pub generation: u64,
}

impl AffectedClasses {
    pub fn contains(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c.as_str() == class)
    }
}

impl ReflectionRegistry {
    /// 原子地应用一次更新
    pub fn apply_update(&mut self, payload: &UpdatePayload) -> Result<AffectedClasses, UpdateRejection> {
        let next_generation = self.generation + 1;
        let mut staged = self.script.clone();
        let mut changed = BTreeSet::new();
        let mut seen = HashSet::new();

        for id in &payload.removed {
            if !seen.insert(id) {
                return Err(UpdateRejection::validation(
                    id.as_str(),
                    "listed more than once in the payload",
                ));
            }
            if staged.remove(id).is_none() {
                let detail = if self.host.contains_key(id) {
                    "host classes cannot be removed"
                } else {
                    "not a registered script class"
                };
                return Err(UpdateRejection::validation(id.as_str(), detail));
            }
            changed.insert(id.clone());
        }

        for class in &payload.classes {
            if !seen.insert(&class.id) {
                return Err(UpdateRejection::validation(
                    class.id.as_str(),
                    "listed more than once in the payload",
                ));
            }
            staged.insert(
                class.id.clone(),
                ScriptEntry::new(class.clone(), next_generation),
            );
            changed.insert(class.id.clone());
        }

        // 负载中的类按负载顺序先验证，其余存活的类按名称顺序验证
        let mut order: Vec<&ClassId> = payload.classes.iter().map(|c| &c.id).collect();
        let mut survivors: Vec<&ClassId> = staged.keys().filter(|id| !seen.contains(id)).collect();
        survivors.sort();
        order.extend(survivors);

        for id in order {
            if let Err(err) = validate_script_class(&self.host, &staged, &self.enums, id) {
                tracing::warn!(
                    target: "reflection",
                    class = %id,
                    error = %err,
                    "Rejected update payload"
                );
                return Err(UpdateRejection::validation(id.as_str(), err.to_string()));
            }
        }

        let affected = affected_classes(&self.host, &self.script, &staged, &changed);

        self.script = staged;
        self.generation = next_generation;
        self.stamp(&affected);
        self.rebuild_index();

        tracing::info!(
            target: "reflection",
            generation = self.generation,
            installed = payload.classes.len(),
            removed = payload.removed.len(),
            affected = affected.len(),
            "Applied update payload"
        );

        Ok(AffectedClasses {
            classes: affected,
            generation: self.generation,
        })
    }
}

/// 变更的类加上它们在新旧两个视图中的所有后代
fn affected_classes(
    host: &HostMap,
    before: &ScriptMap,
    after: &ScriptMap,
    changed: &BTreeSet<ClassId>,
) -> Vec<ClassId> {
    let mut affected = changed.clone();
    let candidates = host.keys().chain(before.keys()).chain(after.keys());
    for id in candidates {
        if affected.contains(id) {
            continue;
        }
        if descends_from_any(host, before, id, changed) || descends_from_any(host, after, id, changed) {
            affected.insert(id.clone());
        }
    }
    affected.into_iter().collect()
}

fn descends_from_any(
    host: &HostMap,
    script: &ScriptMap,
    id: &ClassId,
    targets: &BTreeSet<ClassId>,
) -> bool {
    if !host.contains_key(id) && !script.contains_key(id) {
        return false;
    }
    let mut current = superclass_in(host, script, id.as_str());
    let mut steps = 0;
    while let Some(parent) = current {
        if targets.contains(parent) {
            return true;
        }
        steps += 1;
        if steps > host.len() + script.len() {
            return false;
        }
        current = superclass_in(host, script, parent.as_str());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{CallDirection, Shape, Signature};
    use crate::dispatch::HostValue;
    use crate::reflection::descriptor::{HostClassDescriptor, NativeThunk};

    fn damage() -> Signature {
        Signature::new().param("amount", Shape::Integer)
    }

    fn registry() -> ReflectionRegistry {
        let mut registry = ReflectionRegistry::new();
        registry
            .register_host(HostClassDescriptor::new("Actor").method(
                "take_damage",
                damage(),
                CallDirection::Both,
                NativeThunk::new(|_, _| Ok(HostValue::Nil)),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_payload_with_interdependent_classes() {
        let mut registry = registry();
        let payload = UpdatePayload::new()
            .with_class(ScriptClassDescriptor::new("MegaBoss").extends("Boss"))
            .with_class(ScriptClassDescriptor::new("Boss").extends("Actor"));

        let affected = registry.apply_update(&payload).unwrap();
        assert_eq!(
            affected.classes,
            vec![ClassId::from("Boss"), ClassId::from("MegaBoss")]
        );
        assert_eq!(affected.generation, registry.generation());
        assert!(registry.is_a("MegaBoss", "Actor"));
    }

    #[test]
    fn test_invalid_class_rejects_whole_payload() {
        let mut registry = registry();
        let before_names = registry.class_names();
        let before_generation = registry.generation();

        let payload = UpdatePayload::new()
            .with_class(ScriptClassDescriptor::new("Boss").extends("Actor"))
            .with_class(ScriptClassDescriptor::new("Minion").extends("Enemy"));

        let rejection = registry.apply_update(&payload).unwrap_err();
        assert_eq!(rejection.class_name(), Some("Minion"));
        assert_eq!(registry.class_names(), before_names);
        assert_eq!(registry.generation(), before_generation);
    }

    #[test]
    fn test_replacing_class_reports_descendants() {
        let mut registry = registry();
        registry
            .apply_update(
                &UpdatePayload::new()
                    .with_class(ScriptClassDescriptor::new("Boss").extends("Actor"))
                    .with_class(ScriptClassDescriptor::new("MegaBoss").extends("Boss")),
            )
            .unwrap();

        let affected = registry
            .apply_update(
                &UpdatePayload::new().with_class(
                    ScriptClassDescriptor::new("Boss")
                        .extends("Actor")
                        .method("take_damage", damage()),
                ),
            )
            .unwrap();
        assert!(affected.contains("Boss"));
        assert!(affected.contains("MegaBoss"));
        assert!(!affected.contains("Actor"));
        assert_eq!(
            registry.resolve_class("MegaBoss").unwrap().version,
            affected.generation
        );
    }

    #[test]
    fn test_removal_rules() {
        let mut registry = registry();
        registry
            .apply_update(
                &UpdatePayload::new()
                    .with_class(ScriptClassDescriptor::new("Boss").extends("Actor"))
                    .with_class(ScriptClassDescriptor::new("MegaBoss").extends("Boss")),
            )
            .unwrap();

        let rejection = registry
            .apply_update(&UpdatePayload::new().removing("Actor"))
            .unwrap_err();
        assert_eq!(rejection.class_name(), Some("Actor"));

        // 仍有子类继承 Boss
        let rejection = registry
            .apply_update(&UpdatePayload::new().removing("Boss"))
            .unwrap_err();
        assert_eq!(rejection.class_name(), Some("MegaBoss"));
        assert!(registry.contains("Boss"));

        let affected = registry
            .apply_update(&UpdatePayload::new().removing("Boss").removing("MegaBoss"))
            .unwrap();
        assert_eq!(affected.classes.len(), 2);
        assert!(!registry.contains("Boss"));
    }

    #[test]
    fn test_override_removal_restores_ancestor() {
        let mut registry = registry();
        registry
            .apply_update(
                &UpdatePayload::new().with_class(
                    ScriptClassDescriptor::new("Boss")
                        .extends("Actor")
                        .method("take_damage", damage()),
                ),
            )
            .unwrap();
        assert_eq!(
            registry
                .resolve_method("Boss", "take_damage", CallDirection::FromHost)
                .unwrap()
                .owner
                .as_str(),
            "Boss"
        );

        registry
            .apply_update(
                &UpdatePayload::new().with_class(ScriptClassDescriptor::new("Boss").extends("Actor")),
            )
            .unwrap();
        assert_eq!(
            registry
                .resolve_method("Boss", "take_damage", CallDirection::FromHost)
                .unwrap()
                .owner
                .as_str(),
            "Actor"
        );
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let mut registry = registry();
        let payload = UpdatePayload::new()
            .with_class(ScriptClassDescriptor::new("Boss").extends("Actor"))
            .with_class(ScriptClassDescriptor::new("Boss").extends("Actor"));
        assert!(matches!(
            registry.apply_update(&payload),
            Err(UpdateRejection::ValidationFailure { .. })
        ));
    }
}
