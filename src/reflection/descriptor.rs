//! 类描述符与方法/属性槽

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::binding::{CallDirection, ClassBinding, ClassId, Shape, Signature};
use crate::core::error::{DispatchResult, RegistrationError, RegistrationResult};
use crate::dispatch::{HostObjectRef, HostValue};

type MethodFn = dyn Fn(&HostObjectRef, &[HostValue]) -> DispatchResult<HostValue> + Send + Sync;
type GetterFn = dyn Fn(&HostObjectRef) -> DispatchResult<HostValue> + Send + Sync;
type SetterFn = dyn Fn(&HostObjectRef, HostValue) -> DispatchResult<()> + Send + Sync;

/// 类型擦除的宿主方法
#[derive(Clone)]
pub struct NativeThunk(Arc<MethodFn>);

impl NativeThunk {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HostObjectRef, &[HostValue]) -> DispatchResult<HostValue> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, receiver: &HostObjectRef, args: &[HostValue]) -> DispatchResult<HostValue> {
        (self.0)(receiver, args)
    }
}

impl fmt::Debug for NativeThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeThunk")
    }
}

#[derive(Clone)]
pub struct GetterThunk(Arc<GetterFn>);

impl GetterThunk {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HostObjectRef) -> DispatchResult<HostValue> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, receiver: &HostObjectRef) -> DispatchResult<HostValue> {
        (self.0)(receiver)
    }
}

#[derive(Clone)]
pub struct SetterThunk(Arc<SetterFn>);

impl SetterThunk {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HostObjectRef, HostValue) -> DispatchResult<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, receiver: &HostObjectRef, value: HostValue) -> DispatchResult<()> {
        (self.0)(receiver, value)
    }
}

/// 方法的实现位置
#[derive(Debug, Clone)]
pub enum MethodImpl {
    /// 宿主原生实现
    Native(NativeThunk),
    /// 由脚本引擎执行
    Script,
}

/// 方法槽
#[derive(Debug, Clone)]
pub struct MethodSlot {
    pub name: String,
    pub signature: Signature,
    pub direction: CallDirection,
    pub implementation: MethodImpl,
    /// 声明该槽的类
    pub owner: ClassId,
}

impl MethodSlot {
    pub fn is_script(&self) -> bool {
        matches!(self.implementation, MethodImpl::Script)
    }
}

/// 属性槽；getter/setter 缺失表示只写/只读
#[derive(Clone)]
pub struct PropertySlot {
    pub name: String,
    pub shape: Shape,
    pub getter: Option<GetterThunk>,
    pub setter: Option<SetterThunk>,
    pub owner: ClassId,
}

impl fmt::Debug for PropertySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySlot")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .field("owner", &self.owner)
            .finish()
    }
}

/// 宿主类描述符
#[derive(Debug, Clone)]
pub struct HostClassDescriptor {
    pub id: ClassId,
    pub host_name: String,
    pub superclass: Option<ClassId>,
    pub methods: Vec<Arc<MethodSlot>>,
    pub properties: Vec<Arc<PropertySlot>>,
}

impl HostClassDescriptor {
    pub fn new(id: impl Into<ClassId>) -> Self {
        let id = id.into();
        Self {
            host_name: id.as_str().to_string(),
            id,
            superclass: None,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<ClassId>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        signature: Signature,
        direction: CallDirection,
        thunk: NativeThunk,
    ) -> Self {
        self.methods.push(Arc::new(MethodSlot {
            name: name.into(),
            signature,
            direction,
            implementation: MethodImpl::Native(thunk),
            owner: self.id.clone(),
        }));
        self
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        shape: Shape,
        getter: Option<GetterThunk>,
        setter: Option<SetterThunk>,
    ) -> Self {
        self.properties.push(Arc::new(PropertySlot {
            name: name.into(),
            shape,
            getter,
            setter,
            owner: self.id.clone(),
        }));
        self
    }

    /// 按绑定表构建描述符，原生实现从 `natives` 中按宿主名称查找
    pub fn from_binding(
        binding: &ClassBinding,
        natives: &NativeBindings,
    ) -> RegistrationResult<Self> {
        let id = ClassId::new(binding.name.clone());
        let mut descriptor = Self {
            id: id.clone(),
            host_name: binding.host_name.clone(),
            superclass: binding.superclass.clone().map(ClassId::from),
            methods: Vec::with_capacity(binding.methods.len()),
            properties: Vec::with_capacity(binding.properties.len()),
        };

        for method in &binding.methods {
            let thunk = natives
                .method(&binding.host_name, &method.host_name)
                .ok_or_else(|| RegistrationError::MissingThunk {
                    class: binding.name.clone(),
                    method: method.name.clone(),
                })?;
            descriptor.methods.push(Arc::new(MethodSlot {
                name: method.name.clone(),
                signature: method.signature.clone(),
                direction: method.direction,
                implementation: MethodImpl::Native(thunk),
                owner: id.clone(),
            }));
        }

        for property in &binding.properties {
            let missing = || RegistrationError::MissingThunk {
                class: binding.name.clone(),
                method: property.name.clone(),
            };
            let getter = if property.readable {
                Some(
                    natives
                        .getter(&binding.host_name, &property.host_name)
                        .ok_or_else(missing)?,
                )
            } else {
                None
            };
            let setter = if property.writable {
                Some(
                    natives
                        .setter(&binding.host_name, &property.host_name)
                        .ok_or_else(missing)?,
                )
            } else {
                None
            };
            descriptor.properties.push(Arc::new(PropertySlot {
                name: property.name.clone(),
                shape: property.shape.clone(),
                getter,
                setter,
                owner: id.clone(),
            }));
        }

        Ok(descriptor)
    }
}

/// 宿主原生实现表，键为 (宿主类名, 宿主成员名)
#[derive(Default, Clone)]
pub struct NativeBindings {
    methods: HashMap<(String, String), NativeThunk>,
    getters: HashMap<(String, String), GetterThunk>,
    setters: HashMap<(String, String), SetterThunk>,
}

impl NativeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_method<F>(&mut self, class: &str, method: &str, f: F) -> &mut Self
    where
        F: Fn(&HostObjectRef, &[HostValue]) -> DispatchResult<HostValue> + Send + Sync + 'static,
    {
        self.methods
            .insert((class.to_string(), method.to_string()), NativeThunk::new(f));
        self
    }

    pub fn bind_getter<F>(&mut self, class: &str, property: &str, f: F) -> &mut Self
    where
        F: Fn(&HostObjectRef) -> DispatchResult<HostValue> + Send + Sync + 'static,
    {
        self.getters
            .insert((class.to_string(), property.to_string()), GetterThunk::new(f));
        self
    }

    pub fn bind_setter<F>(&mut self, class: &str, property: &str, f: F) -> &mut Self
    where
        F: Fn(&HostObjectRef, HostValue) -> DispatchResult<()> + Send + Sync + 'static,
    {
        self.setters
            .insert((class.to_string(), property.to_string()), SetterThunk::new(f));
        self
    }

    pub fn method(&self, class: &str, method: &str) -> Option<NativeThunk> {
        self.methods
            .get(&(class.to_string(), method.to_string()))
            .cloned()
    }

    pub fn getter(&self, class: &str, property: &str) -> Option<GetterThunk> {
        self.getters
            .get(&(class.to_string(), property.to_string()))
            .cloned()
    }

    pub fn setter(&self, class: &str, property: &str) -> Option<SetterThunk> {
        self.setters
            .get(&(class.to_string(), property.to_string()))
            .cloned()
    }
}

/// 脚本方法声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMethodDecl {
    pub name: String,
    pub signature: Signature,
    pub direction: CallDirection,
}

/// 脚本类描述符
///
/// 由脚本引擎编译产生，热重载时整体替换。`code` 是编译产物，对桥不透明。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptClassDescriptor {
    pub id: ClassId,
    pub superclass: Option<ClassId>,
    pub methods: Vec<ScriptMethodDecl>,
    #[serde(default)]
    pub code: Vec<u8>,
}

impl ScriptClassDescriptor {
    pub fn new(id: impl Into<ClassId>) -> Self {
        Self {
            id: id.into(),
            superclass: None,
            methods: Vec::new(),
            code: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<ClassId>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, signature: Signature) -> Self {
        self.methods.push(ScriptMethodDecl {
            name: name.into(),
            signature,
            direction: CallDirection::Both,
        });
        self
    }

    pub fn method_with_direction(
        mut self,
        name: impl Into<String>,
        signature: Signature,
        direction: CallDirection,
    ) -> Self {
        self.methods.push(ScriptMethodDecl {
            name: name.into(),
            signature,
            direction,
        });
        self
    }

    pub(crate) fn slots(&self) -> Vec<Arc<MethodSlot>> {
        self.methods
            .iter()
            .map(|decl| {
                Arc::new(MethodSlot {
                    name: decl.name.clone(),
                    signature: decl.signature.clone(),
                    direction: decl.direction,
                    implementation: MethodImpl::Script,
                    owner: self.id.clone(),
                })
            })
            .collect()
    }
}

/// 注册表中一个类的解析视图
///
/// 镜像类同时具有宿主部分和脚本部分。
#[derive(Debug, Clone, Copy)]
pub struct ClassView<'a> {
    pub id: &'a ClassId,
    pub host: Option<&'a HostClassDescriptor>,
    pub script: Option<&'a ScriptClassDescriptor>,
    /// 最近一次（重新）注册时的注册表代数
    pub version: u64,
}

/// 类的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Host,
    Script,
    /// 与宿主类同名的脚本类
    Mirrored,
}

impl ClassView<'_> {
    pub fn kind(&self) -> ClassKind {
        match (self.host.is_some(), self.script.is_some()) {
            (true, true) => ClassKind::Mirrored,
            (true, false) => ClassKind::Host,
            _ => ClassKind::Script,
        }
    }

    /// 有效父类：镜像类沿用宿主父类
    pub fn superclass(&self) -> Option<&ClassId> {
        match (self.host, self.script) {
            (Some(host), _) => host.superclass.as_ref(),
            (None, Some(script)) => script.superclass.as_ref(),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{MethodBinding, PropertyBinding};

    fn binding() -> ClassBinding {
        ClassBinding {
            name: "Actor".to_string(),
            host_name: "AActor".to_string(),
            superclass: None,
            methods: vec![MethodBinding {
                name: "take_damage".to_string(),
                host_name: "TakeDamage".to_string(),
                signature: Signature::new().param("amount", Shape::Integer),
                direction: CallDirection::Both,
            }],
            properties: vec![PropertyBinding {
                name: "health".to_string(),
                host_name: "Health".to_string(),
                shape: Shape::Real,
                readable: true,
                writable: false,
            }],
        }
    }

    #[test]
    fn test_from_binding_resolves_natives() {
        let mut natives = NativeBindings::new();
        natives
            .bind_method("AActor", "TakeDamage", |_, _| Ok(HostValue::Nil))
            .bind_getter("AActor", "Health", |_| Ok(HostValue::Real(100.0)));

        let descriptor = HostClassDescriptor::from_binding(&binding(), &natives).unwrap();
        assert_eq!(descriptor.id.as_str(), "Actor");
        assert_eq!(descriptor.methods[0].owner.as_str(), "Actor");
        assert!(descriptor.properties[0].getter.is_some());
        assert!(descriptor.properties[0].setter.is_none());
    }

    #[test]
    fn test_from_binding_requires_thunks() {
        let err = HostClassDescriptor::from_binding(&binding(), &NativeBindings::new()).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::MissingThunk {
                class: "Actor".to_string(),
                method: "take_damage".to_string()
            }
        );
    }

    #[test]
    fn test_script_slots_carry_owner() {
        let boss = ScriptClassDescriptor::new("Boss")
            .extends("Actor")
            .method("take_damage", Signature::new().param("amount", Shape::Integer));
        let slots = boss.slots();
        assert!(slots[0].is_script());
        assert_eq!(slots[0].owner.as_str(), "Boss");
    }
}
