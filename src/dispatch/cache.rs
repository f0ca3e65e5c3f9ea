//! 方法解析缓存
//!
//! 缓存 (类, 方法名, 方向) -> 方法槽。实时更新通过 [`MethodCache::invalidate_classes`]
//! 精确失效受影响的类；注册表代数在桥之外发生变化时整体清空。

use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::{CallDirection, ClassId};
use crate::reflection::MethodSlot;

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

type Entries = HashMap<(String, CallDirection), Arc<MethodSlot>>;

#[derive(Debug)]
pub struct MethodCache {
    enabled: bool,
    classes: HashMap<ClassId, Entries>,
    /// 缓存内容对应的注册表代数
    synced_generation: u64,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl MethodCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            classes: HashMap::new(),
            synced_generation: 0,
            hits: 0,
            misses: 0,
            invalidations: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 与注册表代数对齐；不一致时清空全部条目
    pub fn sync(&mut self, generation: u64) {
        if self.synced_generation != generation {
            if !self.classes.is_empty() {
                tracing::debug!(
                    target: "dispatch",
                    from = self.synced_generation,
                    to = generation,
                    "Registry changed outside an update, clearing method cache"
                );
                self.clear();
            }
            self.synced_generation = generation;
        }
    }

    pub fn get(&mut self, class: &str, name: &str, direction: CallDirection) -> Option<Arc<MethodSlot>> {
        if !self.enabled {
            return None;
        }
        let found = self
            .classes
            .get(class)
            .and_then(|entries| entries.get(&(name.to_string(), direction)))
            .cloned();
        match found {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        found
    }

    pub fn insert(&mut self, class: &ClassId, name: &str, direction: CallDirection, slot: Arc<MethodSlot>) {
        if !self.enabled {
            return;
        }
        self.classes
            .entry(class.clone())
            .or_default()
            .insert((name.to_string(), direction), slot);
    }

    /// 丢弃指定类的全部条目，并记录新的注册表代数
    ///
    /// 只有紧跟在已同步代数之后的一次更新才能精确失效；中间漏掉的代数
    /// 说明注册表在更新之外也变过，此时整体清空。
    pub fn invalidate_classes<'a>(&mut self, classes: impl IntoIterator<Item = &'a ClassId>, generation: u64) {
        if self.synced_generation + 1 != generation {
            self.sync(generation);
            return;
        }
        for class in classes {
            if self.classes.remove(class).is_some() {
                self.invalidations += 1;
            }
        }
        self.synced_generation = generation;
    }

    pub fn clear(&mut self) {
        self.invalidations += self.classes.len() as u64;
        self.classes.clear();
    }

    pub fn contains(&self, class: &str, name: &str, direction: CallDirection) -> bool {
        self.classes
            .get(class)
            .map(|entries| entries.contains_key(&(name.to_string(), direction)))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
            entries: self.classes.values().map(HashMap::len).sum(),
        }
    }
}
