//! 两侧运行时的值模型
//!
//! 宿主侧使用 `glam` 的向量与四元数，脚本侧使用 f64 数组；对象在宿主侧是
//! 强引用，在脚本侧是句柄。

use glam::{Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::handle::{HostObjectRef, ObjectHandle};

/// 宿主侧的平移、旋转、缩放
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for HostTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// 宿主侧的值
#[derive(Clone)]
pub enum HostValue {
    Nil,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
    Name(String),
    Enum { enum_name: String, value: i64 },
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Rotation(Quat),
    Transform(HostTransform),
    /// RGBA，线性空间
    Color([f32; 4]),
    Object(Option<HostObjectRef>),
    List(Vec<HostValue>),
}

impl HostValue {
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Integer(_) => "Integer",
            HostValue::Real(_) => "Real",
            HostValue::Boolean(_) => "Boolean",
            HostValue::String(_) => "String",
            HostValue::Name(_) => "Name",
            HostValue::Enum { .. } => "Enum",
            HostValue::Vector2(_) => "Vector2",
            HostValue::Vector3(_) => "Vector3",
            HostValue::Vector4(_) => "Vector4",
            HostValue::Rotation(_) => "Rotation",
            HostValue::Transform(_) => "Transform",
            HostValue::Color(_) => "Color",
            HostValue::Object(None) => "nil object",
            HostValue::Object(Some(_)) => "Object",
            HostValue::List(_) => "List",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            HostValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            HostValue::Object(Some(object)) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => f.write_str("Nil"),
            HostValue::Integer(v) => write!(f, "Integer({})", v),
            HostValue::Real(v) => write!(f, "Real({})", v),
            HostValue::Boolean(v) => write!(f, "Boolean({})", v),
            HostValue::String(v) => write!(f, "String({:?})", v),
            HostValue::Name(v) => write!(f, "Name({:?})", v),
            HostValue::Enum { enum_name, value } => write!(f, "Enum({}::{})", enum_name, value),
            HostValue::Vector2(v) => write!(f, "Vector2({:?})", v),
            HostValue::Vector3(v) => write!(f, "Vector3({:?})", v),
            HostValue::Vector4(v) => write!(f, "Vector4({:?})", v),
            HostValue::Rotation(v) => write!(f, "Rotation({:?})", v),
            HostValue::Transform(v) => write!(f, "Transform({:?})", v),
            HostValue::Color(v) => write!(f, "Color({:?})", v),
            HostValue::Object(None) => f.write_str("Object(nil)"),
            HostValue::Object(Some(object)) => write!(f, "Object({})", object.object_id()),
            HostValue::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

/// 脚本侧的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptValue {
    Nil,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
    Name(String),
    Enum { enum_name: String, value: i64 },
    Vector2([f64; 2]),
    Vector3([f64; 3]),
    Vector4([f64; 4]),
    /// 四元数 (x, y, z, w)
    Rotation([f64; 4]),
    Transform {
        translation: [f64; 3],
        rotation: [f64; 4],
        scale: [f64; 3],
    },
    Color([f64; 4]),
    Object(ObjectHandle),
    List(Vec<ScriptValue>),
}

impl ScriptValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Integer(_) => "Integer",
            ScriptValue::Real(_) => "Real",
            ScriptValue::Boolean(_) => "Boolean",
            ScriptValue::String(_) => "String",
            ScriptValue::Name(_) => "Name",
            ScriptValue::Enum { .. } => "Enum",
            ScriptValue::Vector2(_) => "Vector2",
            ScriptValue::Vector3(_) => "Vector3",
            ScriptValue::Vector4(_) => "Vector4",
            ScriptValue::Rotation(_) => "Rotation",
            ScriptValue::Transform { .. } => "Transform",
            ScriptValue::Color(_) => "Color",
            ScriptValue::Object(_) => "Object",
            ScriptValue::List(_) => "List",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<ObjectHandle> {
        match self {
            ScriptValue::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }
}

pub(crate) fn vec2_to_script(v: Vec2) -> [f64; 2] {
    [v.x as f64, v.y as f64]
}

pub(crate) fn vec3_to_script(v: Vec3) -> [f64; 3] {
    [v.x as f64, v.y as f64, v.z as f64]
}

pub(crate) fn vec4_to_script(v: Vec4) -> [f64; 4] {
    [v.x as f64, v.y as f64, v.z as f64, v.w as f64]
}

pub(crate) fn quat_to_script(q: Quat) -> [f64; 4] {
    [q.x as f64, q.y as f64, q.z as f64, q.w as f64]
}

pub(crate) fn vec2_from_script(v: [f64; 2]) -> Vec2 {
    Vec2::new(v[0] as f32, v[1] as f32)
}

pub(crate) fn vec3_from_script(v: [f64; 3]) -> Vec3 {
    Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32)
}

pub(crate) fn vec4_from_script(v: [f64; 4]) -> Vec4 {
    Vec4::new(v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32)
}

pub(crate) fn quat_from_script(v: [f64; 4]) -> Quat {
    Quat::from_xyzw(v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32)
}
