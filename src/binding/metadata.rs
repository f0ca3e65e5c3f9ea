//! 宿主类型元数据
//!
//! 生成器的输入。宿主对象系统通过 [`HostMetadataSource`] 枚举自己的
//! 类、方法、属性和枚举；离线运行时也可以直接从 JSON 转储加载。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::shape::CallDirection;
use crate::core::error::{GenerationError, GenerationResult};

/// 宿主侧的原始类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Str,
    Text,
    Name,
    Enum(String),
    Struct(String),
    Object(String),
    WeakObject(String),
    Array(Box<HostType>),
    Map(Box<HostType>, Box<HostType>),
    Set(Box<HostType>),
    Delegate(String),
    Interface(String),
}

fn yes() -> bool {
    true
}

fn both() -> CallDirection {
    CallDirection::Both
}

/// 方法参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostParamMeta {
    pub name: String,
    pub ty: HostType,
}

/// 宿主方法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMethodMeta {
    pub name: String,
    #[serde(default)]
    pub params: Vec<HostParamMeta>,
    #[serde(default)]
    pub returns: Option<HostType>,
    #[serde(default = "both")]
    pub direction: CallDirection,
    #[serde(default = "yes")]
    pub bindable: bool,
}

impl HostMethodMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            direction: CallDirection::Both,
            bindable: true,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: HostType) -> Self {
        self.params.push(HostParamMeta {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn returning(mut self, ty: HostType) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn direction(mut self, direction: CallDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// 宿主属性
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPropertyMeta {
    pub name: String,
    pub ty: HostType,
    #[serde(default = "yes")]
    pub readable: bool,
    #[serde(default = "yes")]
    pub writable: bool,
}

impl HostPropertyMeta {
    pub fn new(name: impl Into<String>, ty: HostType) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

/// 宿主类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostClassMeta {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    /// 不可绑定的类不会出现在绑定表中，其子类跳过它继承最近的可绑定祖先
    #[serde(default = "yes")]
    pub bindable: bool,
    #[serde(default)]
    pub methods: Vec<HostMethodMeta>,
    #[serde(default)]
    pub properties: Vec<HostPropertyMeta>,
}

impl HostClassMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            bindable: true,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn method(mut self, method: HostMethodMeta) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(mut self, property: HostPropertyMeta) -> Self {
        self.properties.push(property);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.bindable = false;
        self
    }
}

/// 枚举成员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEnumValue {
    pub name: String,
    pub value: i64,
}

/// 宿主枚举
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEnumMeta {
    pub name: String,
    pub values: Vec<HostEnumValue>,
}

impl HostEnumMeta {
    /// 按声明顺序从 0 开始编号
    pub fn sequential(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values
                .iter()
                .enumerate()
                .map(|(index, value)| HostEnumValue {
                    name: value.to_string(),
                    value: index as i64,
                })
                .collect(),
        }
    }
}

/// 宿主对象系统的完整元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMetadata {
    #[serde(default)]
    pub classes: Vec<HostClassMeta>,
    #[serde(default)]
    pub enums: Vec<HostEnumMeta>,
}

impl HostMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: HostClassMeta) -> Self {
        self.classes.push(class);
        self
    }

    pub fn enumeration(mut self, meta: HostEnumMeta) -> Self {
        self.enums.push(meta);
        self
    }

    pub fn from_json_str(content: &str) -> GenerationResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| GenerationError::MalformedArtifact(format!("host metadata: {}", e)))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> GenerationResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// 宿主元数据枚举接口
pub trait HostMetadataSource {
    fn enumerate(&self) -> GenerationResult<HostMetadata>;
}

impl HostMetadataSource for HostMetadata {
    fn enumerate(&self) -> GenerationResult<HostMetadata> {
        Ok(self.clone())
    }
}

/// 磁盘上的 JSON 元数据转储
#[derive(Debug, Clone)]
pub struct JsonMetadataFile {
    path: PathBuf,
}

impl JsonMetadataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostMetadataSource for JsonMetadataFile {
    fn enumerate(&self) -> GenerationResult<HostMetadata> {
        HostMetadata::from_json_file(&self.path)
    }
}
