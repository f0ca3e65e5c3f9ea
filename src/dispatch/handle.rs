//! 对象句柄表
//!
//! 句柄是 (index, generation) 对，指向桥拥有的槽位表，而不是任何一侧运行时的内存。
//! 宿主对象销毁时槽位的 generation 递增，之前发出的所有句柄随即失效。
//! 槽位同时持有对象的 `Weak` 引用，未收到销毁通知就被释放的对象同样会失效。

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::binding::ClassId;
use crate::core::error::{DispatchError, DispatchResult};

/// 宿主对象的稳定标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// 可以跨边界暴露的宿主对象
pub trait HostObject: Send + Sync + 'static {
    fn object_id(&self) -> ObjectId;

    /// 对象的宿主类（绑定表中的脚本可见类名）
    fn host_class(&self) -> ClassId;

    fn as_any(&self) -> &dyn Any;
}

pub type HostObjectRef = Arc<dyn HostObject>;

/// 跨运行时的对象句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// 一个存活句柄的记录
#[derive(Debug, Clone)]
pub struct HandleEntry {
    object: Weak<dyn HostObject>,
    pub object_id: ObjectId,
    pub host_class: ClassId,
    /// 附加在对象上的脚本类
    pub script_class: Option<ClassId>,
}

impl HandleEntry {
    pub fn upgrade(&self) -> Option<HostObjectRef> {
        self.object.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.object.strong_count() > 0
    }

    /// 对象声明的动态类
    pub fn declared_class(&self) -> &ClassId {
        self.script_class.as_ref().unwrap_or(&self.host_class)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<HandleEntry>,
}

/// 句柄竞技场
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_object: HashMap<ObjectId, ObjectHandle>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为对象取得句柄；同一个存活对象总是得到同一个句柄
    pub fn wrap(&mut self, object: &HostObjectRef) -> ObjectHandle {
        let object_id = object.object_id();
        if let Some(&handle) = self.by_object.get(&object_id) {
            if self.entry(handle).is_ok() {
                return handle;
            }
            // 旧对象已经被释放但没有收到销毁通知，标识被复用
            self.release(object_id);
        }

        let entry = HandleEntry {
            object: Arc::downgrade(object),
            object_id,
            host_class: object.host_class(),
            script_class: None,
        };

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ObjectHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ObjectHandle {
                    index,
                    generation: 0,
                }
            }
        };

        self.by_object.insert(object_id, handle);
        tracing::trace!(target: "dispatch", %handle, %object_id, "Wrapped host object");
        handle
    }

    /// 句柄对应的记录；已销毁或已释放的对象返回 `StaleHandle`
    pub fn entry(&self, handle: ObjectHandle) -> DispatchResult<&HandleEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .filter(|entry| entry.is_alive())
            .ok_or(DispatchError::StaleHandle(handle))
    }

    pub fn unwrap(&self, handle: ObjectHandle) -> DispatchResult<HostObjectRef> {
        self.entry(handle)?
            .upgrade()
            .ok_or(DispatchError::StaleHandle(handle))
    }

    pub fn set_script_class(
        &mut self,
        handle: ObjectHandle,
        class: Option<ClassId>,
    ) -> DispatchResult<()> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(DispatchError::StaleHandle(handle))?;
        let entry = slot
            .entry
            .as_mut()
            .ok_or(DispatchError::StaleHandle(handle))?;
        entry.script_class = class;
        Ok(())
    }

    pub fn handle_of(&self, object_id: ObjectId) -> Option<ObjectHandle> {
        self.by_object
            .get(&object_id)
            .copied()
            .filter(|&handle| self.entry(handle).is_ok())
    }

    /// 使对象的句柄失效，槽位进入空闲列表
    pub fn release(&mut self, object_id: ObjectId) -> Option<ObjectHandle> {
        let handle = self.by_object.remove(&object_id)?;
        let slot = &mut self.slots[handle.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        tracing::trace!(target: "dispatch", %handle, %object_id, "Released handle");
        Some(handle)
    }

    /// 释放所有宿主对象已经不存在的句柄
    pub fn purge_dead(&mut self) -> usize {
        let dead: Vec<ObjectId> = self
            .slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .filter(|entry| !entry.is_alive())
            .map(|entry| entry.object_id)
            .collect();
        for object_id in &dead {
            self.release(*object_id);
        }
        dead.len()
    }

    /// 所有存活句柄
    pub fn live(&self) -> impl Iterator<Item = (ObjectHandle, &HandleEntry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry
                .as_ref()
                .filter(|entry| entry.is_alive())
                .map(|entry| {
                    (
                        ObjectHandle {
                            index: index as u32,
                            generation: slot.generation,
                        },
                        entry,
                    )
                })
        })
    }

    pub fn len(&self) -> usize {
        self.by_object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_object.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::TestObject;
    use super::*;

    #[test]
    fn test_wrap_is_identity_preserving() {
        let mut table = HandleTable::new();
        let a = TestObject::new(1, "Actor");
        let b = TestObject::new(2, "Actor");

        let ha = table.wrap(&a);
        assert_eq!(table.wrap(&a), ha);
        assert_ne!(table.wrap(&b), ha);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_release_makes_handle_stale() {
        let mut table = HandleTable::new();
        let a = TestObject::new(1, "Actor");
        let handle = table.wrap(&a);

        assert_eq!(table.release(ObjectId(1)), Some(handle));
        assert_eq!(table.unwrap(handle).err(), Some(DispatchError::StaleHandle(handle)));
        assert!(table.release(ObjectId(1)).is_none());
    }

    #[test]
    fn test_reused_slot_does_not_revive_old_handle() {
        let mut table = HandleTable::new();
        let a = TestObject::new(1, "Actor");
        let old = table.wrap(&a);
        table.release(ObjectId(1));

        let b = TestObject::new(2, "Actor");
        let new = table.wrap(&b);
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(table.unwrap(old).is_err());
        assert_eq!(table.unwrap(new).unwrap().object_id(), ObjectId(2));
    }

    #[test]
    fn test_dropped_object_fails_closed_without_notification() {
        let mut table = HandleTable::new();
        let a = TestObject::new(1, "Actor");
        let handle = table.wrap(&a);
        drop(a);

        assert!(matches!(table.unwrap(handle), Err(DispatchError::StaleHandle(_))));
        assert_eq!(table.live().count(), 0);
        assert_eq!(table.purge_dead(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_rewrap_after_silent_drop_issues_new_handle() {
        let mut table = HandleTable::new();
        let first = TestObject::new(7, "Actor");
        let old = table.wrap(&first);
        drop(first);

        let second = TestObject::new(7, "Actor");
        let new = table.wrap(&second);
        assert_ne!(old, new);
        assert!(table.unwrap(old).is_err());
    }

    #[test]
    fn test_script_class_attachment() {
        let mut table = HandleTable::new();
        let a = TestObject::new(1, "Actor");
        let handle = table.wrap(&a);
        table
            .set_script_class(handle, Some(ClassId::from("Boss")))
            .unwrap();
        assert_eq!(table.entry(handle).unwrap().declared_class().as_str(), "Boss");
    }
}
