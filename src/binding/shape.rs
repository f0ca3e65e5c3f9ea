//! 跨运行时的值形状
//!
//! 绑定表、注册表和分派桥共用同一套形状描述：方法签名由参数形状和
//! 可选的返回形状组成，覆盖检查与封送都以此为准。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// 跨运行时的类标识（宿主类与脚本类共用一个命名空间）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ClassId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for ClassId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClassId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 受支持的值形状
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Integer,
    Real,
    Boolean,
    String,
    Name,
    /// 已声明的枚举
    Enum(String),
    Vector2,
    Vector3,
    Vector4,
    Rotation,
    Transform,
    Color,
    /// 指向某个类（或其子类）实例的不透明引用
    Object(ClassId),
    /// 元素不能再是列表
    List(Box<Shape>),
}

impl Shape {
    pub fn object(class: impl Into<ClassId>) -> Self {
        Shape::Object(class.into())
    }

    pub fn list(element: Shape) -> Self {
        Shape::List(Box::new(element))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Shape::Boolean)
    }

    /// 形状引用到的类和枚举名称
    pub fn referenced_types(&self) -> Vec<&str> {
        match self {
            Shape::Enum(name) => vec![name.as_str()],
            Shape::Object(class) => vec![class.as_str()],
            Shape::List(element) => element.referenced_types(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Integer => f.write_str("Integer"),
            Shape::Real => f.write_str("Real"),
            Shape::Boolean => f.write_str("Boolean"),
            Shape::String => f.write_str("String"),
            Shape::Name => f.write_str("Name"),
            Shape::Enum(name) => write!(f, "Enum<{}>", name),
            Shape::Vector2 => f.write_str("Vector2"),
            Shape::Vector3 => f.write_str("Vector3"),
            Shape::Vector4 => f.write_str("Vector4"),
            Shape::Rotation => f.write_str("Rotation"),
            Shape::Transform => f.write_str("Transform"),
            Shape::Color => f.write_str("Color"),
            Shape::Object(class) => write!(f, "Object<{}>", class),
            Shape::List(element) => write!(f, "List<{}>", element),
        }
    }
}

/// 具名参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub shape: Shape,
}

/// 方法签名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: Option<Shape>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.params.push(Param {
            name: name.into(),
            shape,
        });
        self
    }

    pub fn returning(mut self, shape: Shape) -> Self {
        self.returns = Some(shape);
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// 检查覆盖方法与祖先方法的形状是否一致
    ///
    /// 参数名可以不同，参数形状和返回形状必须完全相同。
    pub fn check_override(&self, ancestor: &Signature) -> Result<(), String> {
        if self.params.len() != ancestor.params.len() {
            return Err(format!(
                "expected {} parameters, found {}",
                ancestor.params.len(),
                self.params.len()
            ));
        }
        for (index, (ours, theirs)) in self.params.iter().zip(&ancestor.params).enumerate() {
            if ours.shape != theirs.shape {
                return Err(format!(
                    "parameter {} is {} but ancestor declares {}",
                    index, ours.shape, theirs.shape
                ));
            }
        }
        if self.returns != ancestor.returns {
            return Err(format!(
                "returns {} but ancestor returns {}",
                display_return(&self.returns),
                display_return(&ancestor.returns)
            ));
        }
        Ok(())
    }
}

fn display_return(returns: &Option<Shape>) -> String {
    match returns {
        Some(shape) => shape.to_string(),
        None => "nil".to_string(),
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", param.shape, param.name)?;
        }
        write!(f, ") -> {}", display_return(&self.returns))
    }
}

/// 方法槽的调用方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// 宿主实现，供脚本调用
    FromScript,
    /// 脚本实现，供宿主调用
    FromHost,
    /// 双向
    Both,
}

impl CallDirection {
    /// 声明为 `self` 的槽能否满足 `requested` 方向的调用
    pub fn permits(self, requested: CallDirection) -> bool {
        match (self, requested) {
            (CallDirection::Both, _) => true,
            (declared, requested) => declared == requested,
        }
    }
}
