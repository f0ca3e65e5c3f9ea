//! 绑定表与其持久化产物
//!
//! 绑定表生成后只读。产物有两种格式：可读的 JSON 和带魔数头的 bincode 二进制，
//! 加载时自动识别。校验和在握手时用于确认工具与运行时基于同一份宿主绑定。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::shape::{CallDirection, Shape, Signature};
use crate::config::ArtifactFormat;
use crate::core::error::{GenerationError, GenerationResult};
use crate::core::utils::sha256_hex;

/// 二进制产物魔数
pub const ARTIFACT_MAGIC: &[u8; 4] = b"SBTB";

/// 产物格式版本
pub const ARTIFACT_VERSION: u32 = 1;

/// 方法绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBinding {
    /// 脚本可见名称
    pub name: String,
    /// 宿主侧名称（原生函数的查找键）
    pub host_name: String,
    pub signature: Signature,
    pub direction: CallDirection,
}

/// 属性绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBinding {
    pub name: String,
    pub host_name: String,
    pub shape: Shape,
    pub readable: bool,
    pub writable: bool,
}

/// 类绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBinding {
    /// 脚本可见名称，也是跨运行时的类键
    pub name: String,
    pub host_name: String,
    /// 最近的可绑定祖先（脚本名称）
    pub superclass: Option<String>,
    pub methods: Vec<MethodBinding>,
    pub properties: Vec<PropertyBinding>,
}

impl ClassBinding {
    pub fn method(&self, name: &str) -> Option<&MethodBinding> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyBinding> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// 枚举成员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// 枚举绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumBinding {
    pub name: String,
    pub host_name: String,
    pub members: Vec<EnumMember>,
}

impl EnumBinding {
    pub fn contains_value(&self, value: i64) -> bool {
        self.members.iter().any(|m| m.value == value)
    }
}

/// 绑定生成器的输出：宿主类名到类绑定的映射
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingTable {
    classes: BTreeMap<String, ClassBinding>,
    enums: BTreeMap<String, EnumBinding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_class(&mut self, class: ClassBinding) {
        self.classes.insert(class.name.clone(), class);
    }

    pub(crate) fn insert_enum(&mut self, binding: EnumBinding) {
        self.enums.insert(binding.name.clone(), binding);
    }

    pub fn class(&self, name: &str) -> Option<&ClassBinding> {
        self.classes.get(name)
    }

    pub fn enum_binding(&self, name: &str) -> Option<&EnumBinding> {
        self.enums.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassBinding> {
        self.classes.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumBinding> {
        self.enums.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// 父类在前的注册顺序；同层按名称排序，结果确定
    pub fn registration_order(&self) -> Vec<&ClassBinding> {
        let mut ordered = Vec::with_capacity(self.classes.len());
        let mut visited = BTreeSet::new();
        for name in self.classes.keys() {
            self.visit(name, &mut visited, &mut ordered);
        }
        ordered
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        visited: &mut BTreeSet<String>,
        ordered: &mut Vec<&'a ClassBinding>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let Some(class) = self.classes.get(name) else {
            return;
        };
        if let Some(parent) = &class.superclass {
            self.visit(parent, visited, ordered);
        }
        ordered.push(class);
    }

    /// 表内容的 SHA-256（十六进制）
    pub fn checksum(&self) -> GenerationResult<String> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GenerationError::Serialization(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }

    pub fn to_json(&self) -> GenerationResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GenerationError::Serialization(e.to_string()))
    }

    pub fn to_binary(&self) -> GenerationResult<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| GenerationError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(body.len() + 8);
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// 从产物字节解析，自动识别格式
    pub fn from_bytes(bytes: &[u8]) -> GenerationResult<Self> {
        if let Some(rest) = bytes.strip_prefix(ARTIFACT_MAGIC.as_slice()) {
            if rest.len() < 4 {
                return Err(GenerationError::MalformedArtifact(
                    "truncated binary header".to_string(),
                ));
            }
            let (version, body) = rest.split_at(4);
            let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
            if version != ARTIFACT_VERSION {
                return Err(GenerationError::MalformedArtifact(format!(
                    "unsupported artifact version {}",
                    version
                )));
            }
            return bincode::deserialize(body)
                .map_err(|e| GenerationError::MalformedArtifact(e.to_string()));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|_| GenerationError::MalformedArtifact("neither binary nor UTF-8 JSON".to_string()))?;
        serde_json::from_str(text).map_err(|e| GenerationError::MalformedArtifact(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, format: ArtifactFormat) -> GenerationResult<()> {
        let bytes = match format {
            ArtifactFormat::Json => self.to_json()?.into_bytes(),
            ArtifactFormat::Binary => self.to_binary()?,
        };
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> GenerationResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let table = Self::from_bytes(&bytes)?;
        table.verify()?;
        tracing::info!(
            target: "binding",
            path = %path.display(),
            classes = table.len(),
            enums = table.enums.len(),
            "Loaded binding table"
        );
        Ok(table)
    }

    /// 手工编辑过的产物也必须满足生成器的不变量
    pub fn verify(&self) -> GenerationResult<()> {
        for class in self.classes.values() {
            if let Some(parent) = &class.superclass {
                if !self.classes.contains_key(parent) {
                    return Err(GenerationError::MissingSuperclass {
                        class: class.name.clone(),
                        superclass: parent.clone(),
                    });
                }
            }

            let mut seen = BTreeSet::new();
            for method in &class.methods {
                if !seen.insert(method.name.as_str()) {
                    return Err(GenerationError::DuplicateName {
                        class: class.name.clone(),
                        name: method.name.clone(),
                    });
                }
            }
            let mut seen = BTreeSet::new();
            for property in &class.properties {
                if !seen.insert(property.name.as_str()) {
                    return Err(GenerationError::DuplicateName {
                        class: class.name.clone(),
                        name: property.name.clone(),
                    });
                }
            }

            let mut current = class.superclass.as_deref();
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if steps > self.classes.len() {
                    return Err(GenerationError::SuperclassCycle(class.name.clone()));
                }
                current = self.classes.get(parent).and_then(|c| c.superclass.as_deref());
            }
        }
        Ok(())
    }
}
