//! 参数封送
//!
//! 每种形状都有双向转换。对象引用经过句柄表，同一个存活对象总是得到同一个句柄。
//! 任何不符合形状的值都报告为 `ShapeMismatch`。

use std::cell::RefCell;

use super::handle::{HandleTable, HostObjectRef};
use super::value::{
    quat_from_script, quat_to_script, vec2_from_script, vec2_to_script, vec3_from_script,
    vec3_to_script, vec4_from_script, vec4_to_script, HostTransform, HostValue, ScriptValue,
};
use crate::binding::{ClassId, Shape, Signature};
use crate::core::error::{DispatchError, DispatchResult};
use crate::reflection::ReflectionRegistry;

/// 对象的有效类：附加的脚本类仍然注册且仍继承宿主类时使用它，否则退回宿主类
pub(crate) fn effective_class(
    registry: &ReflectionRegistry,
    host_class: &ClassId,
    script_class: Option<&ClassId>,
) -> ClassId {
    match script_class {
        Some(class) if registry.is_a(class.as_str(), host_class.as_str()) => class.clone(),
        _ => host_class.clone(),
    }
}

pub(crate) struct Marshaller<'a> {
    pub(crate) registry: &'a ReflectionRegistry,
    pub(crate) handles: &'a RefCell<HandleTable>,
}

impl Marshaller<'_> {
    fn check_enum(&self, context: &str, shape_enum: &str, enum_name: &str, value: i64) -> DispatchResult<()> {
        if enum_name != shape_enum {
            return Err(DispatchError::shape_mismatch(
                context,
                format!("Enum<{}>", shape_enum),
                format!("Enum<{}>", enum_name),
            ));
        }
        if let Some(binding) = self.registry.enum_binding(shape_enum) {
            if !binding.contains_value(value) {
                return Err(DispatchError::shape_mismatch(
                    context,
                    format!("member of {}", shape_enum),
                    value.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_class(&self, context: &str, expected: &ClassId, actual: &ClassId) -> DispatchResult<()> {
        if self.registry.is_a(actual.as_str(), expected.as_str()) {
            Ok(())
        } else {
            Err(DispatchError::shape_mismatch(
                context,
                format!("Object<{}>", expected),
                format!("Object<{}>", actual),
            ))
        }
    }

    /// 宿主对象的有效类；还没有句柄的对象就是它的宿主类
    fn object_class(&self, object: &HostObjectRef) -> ClassId {
        let handles = self.handles.borrow();
        match handles
            .handle_of(object.object_id())
            .and_then(|handle| handles.entry(handle).ok())
        {
            Some(entry) => effective_class(self.registry, &entry.host_class, entry.script_class.as_ref()),
            None => object.host_class(),
        }
    }

    fn check_arity(&self, context: &str, signature: &Signature, found: usize) -> DispatchResult<()> {
        if signature.arity() == found {
            Ok(())
        } else {
            Err(DispatchError::shape_mismatch(
                context,
                format!("{} arguments", signature.arity()),
                format!("{} arguments", found),
            ))
        }
    }

    /// 宿主值转换为脚本值
    pub(crate) fn to_script(&self, value: &HostValue, shape: &Shape, context: &str) -> DispatchResult<ScriptValue> {
        let converted = match (shape, value) {
            (Shape::Integer, HostValue::Integer(v)) => ScriptValue::Integer(*v),
            (Shape::Real, HostValue::Real(v)) => ScriptValue::Real(*v),
            (Shape::Real, HostValue::Integer(v)) => ScriptValue::Real(*v as f64),
            (Shape::Boolean, HostValue::Boolean(v)) => ScriptValue::Boolean(*v),
            (Shape::String, HostValue::String(v)) => ScriptValue::String(v.clone()),
            (Shape::Name, HostValue::Name(v)) => ScriptValue::Name(v.clone()),
            (Shape::Enum(expected), HostValue::Enum { enum_name, value }) => {
                self.check_enum(context, expected, enum_name, *value)?;
                ScriptValue::Enum {
                    enum_name: enum_name.clone(),
                    value: *value,
                }
            }
            (Shape::Vector2, HostValue::Vector2(v)) => ScriptValue::Vector2(vec2_to_script(*v)),
            (Shape::Vector3, HostValue::Vector3(v)) => ScriptValue::Vector3(vec3_to_script(*v)),
            (Shape::Vector4, HostValue::Vector4(v)) => ScriptValue::Vector4(vec4_to_script(*v)),
            (Shape::Rotation, HostValue::Rotation(q)) => ScriptValue::Rotation(quat_to_script(*q)),
            (Shape::Transform, HostValue::Transform(t)) => ScriptValue::Transform {
                translation: vec3_to_script(t.translation),
                rotation: quat_to_script(t.rotation),
                scale: vec3_to_script(t.scale),
            },
            (Shape::Color, HostValue::Color(c)) => {
                ScriptValue::Color([c[0] as f64, c[1] as f64, c[2] as f64, c[3] as f64])
            }
            (Shape::Object(_), HostValue::Object(None)) => ScriptValue::Nil,
            (Shape::Object(expected), HostValue::Object(Some(object))) => {
                self.check_class(context, expected, &self.object_class(object))?;
                ScriptValue::Object(self.handles.borrow_mut().wrap(object))
            }
            (Shape::List(element), HostValue::List(items)) => ScriptValue::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.to_script(item, element, &format!("{}[{}]", context, i)))
                    .collect::<DispatchResult<_>>()?,
            ),
            (shape, value) => {
                return Err(DispatchError::shape_mismatch(context, shape.to_string(), value.kind()))
            }
        };
        Ok(converted)
    }

    /// 脚本值转换为宿主值
    pub(crate) fn to_host(&self, value: &ScriptValue, shape: &Shape, context: &str) -> DispatchResult<HostValue> {
        let converted = match (shape, value) {
            (Shape::Integer, ScriptValue::Integer(v)) => HostValue::Integer(*v),
            (Shape::Real, ScriptValue::Real(v)) => HostValue::Real(*v),
            (Shape::Real, ScriptValue::Integer(v)) => HostValue::Real(*v as f64),
            (Shape::Boolean, ScriptValue::Boolean(v)) => HostValue::Boolean(*v),
            (Shape::String, ScriptValue::String(v)) => HostValue::String(v.clone()),
            (Shape::Name, ScriptValue::Name(v)) => HostValue::Name(v.clone()),
            (Shape::Enum(expected), ScriptValue::Enum { enum_name, value }) => {
                self.check_enum(context, expected, enum_name, *value)?;
                HostValue::Enum {
                    enum_name: enum_name.clone(),
                    value: *value,
                }
            }
            (Shape::Vector2, ScriptValue::Vector2(v)) => HostValue::Vector2(vec2_from_script(*v)),
            (Shape::Vector3, ScriptValue::Vector3(v)) => HostValue::Vector3(vec3_from_script(*v)),
            (Shape::Vector4, ScriptValue::Vector4(v)) => HostValue::Vector4(vec4_from_script(*v)),
            (Shape::Rotation, ScriptValue::Rotation(q)) => HostValue::Rotation(quat_from_script(*q)),
            (
                Shape::Transform,
                ScriptValue::Transform {
                    translation,
                    rotation,
                    scale,
                },
            ) => HostValue::Transform(HostTransform {
                translation: vec3_from_script(*translation),
                rotation: quat_from_script(*rotation),
                scale: vec3_from_script(*scale),
            }),
            (Shape::Color, ScriptValue::Color(c)) => {
                HostValue::Color([c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32])
            }
            (Shape::Object(_), ScriptValue::Nil) => HostValue::Object(None),
            (Shape::Object(expected), ScriptValue::Object(handle)) => {
                let handles = self.handles.borrow();
                let entry = handles.entry(*handle)?;
                let actual = effective_class(self.registry, &entry.host_class, entry.script_class.as_ref());
                self.check_class(context, expected, &actual)?;
                HostValue::Object(Some(handles.unwrap(*handle)?))
            }
            (Shape::List(element), ScriptValue::List(items)) => HostValue::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.to_host(item, element, &format!("{}[{}]", context, i)))
                    .collect::<DispatchResult<_>>()?,
            ),
            (shape, value) => {
                return Err(DispatchError::shape_mismatch(context, shape.to_string(), value.kind()))
            }
        };
        Ok(converted)
    }

    /// 返回值：签名没有返回值时只接受 nil
    pub(crate) fn return_to_script(
        &self,
        value: &HostValue,
        returns: Option<&Shape>,
        context: &str,
    ) -> DispatchResult<ScriptValue> {
        match (returns, value) {
            (Some(shape), value) => self.to_script(value, shape, context),
            (None, HostValue::Nil) => Ok(ScriptValue::Nil),
            (None, value) => Err(DispatchError::shape_mismatch(context, "nil", value.kind())),
        }
    }

    pub(crate) fn return_to_host(
        &self,
        value: &ScriptValue,
        returns: Option<&Shape>,
        context: &str,
    ) -> DispatchResult<HostValue> {
        match (returns, value) {
            (Some(shape), value) => self.to_host(value, shape, context),
            (None, ScriptValue::Nil) => Ok(HostValue::Nil),
            (None, value) => Err(DispatchError::shape_mismatch(context, "nil", value.kind())),
        }
    }

    pub(crate) fn args_to_script(
        &self,
        signature: &Signature,
        args: &[HostValue],
        context: &str,
    ) -> DispatchResult<Vec<ScriptValue>> {
        self.check_arity(context, signature, args.len())?;
        signature
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| self.to_script(arg, &param.shape, &format!("{}({})", context, param.name)))
            .collect()
    }

    pub(crate) fn args_to_host(
        &self,
        signature: &Signature,
        args: &[ScriptValue],
        context: &str,
    ) -> DispatchResult<Vec<HostValue>> {
        self.check_arity(context, signature, args.len())?;
        signature
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| self.to_host(arg, &param.shape, &format!("{}({})", context, param.name)))
            .collect()
    }

    /// 检查宿主值是否符合形状，不为对象分配句柄
    fn check_host_value(&self, value: &HostValue, shape: &Shape, context: &str) -> DispatchResult<()> {
        match (shape, value) {
            (Shape::Object(expected), HostValue::Object(Some(object))) => {
                self.check_class(context, expected, &self.object_class(object))
            }
            (Shape::List(element), HostValue::List(items)) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| self.check_host_value(item, element, &format!("{}[{}]", context, i))),
            _ => self.to_script(value, shape, context).map(|_| ()),
        }
    }

    /// 同侧调用只做形状检查
    pub(crate) fn check_host_args(
        &self,
        signature: &Signature,
        args: &[HostValue],
        context: &str,
    ) -> DispatchResult<()> {
        self.check_arity(context, signature, args.len())?;
        signature
            .params
            .iter()
            .zip(args)
            .try_for_each(|(param, arg)| {
                self.check_host_value(arg, &param.shape, &format!("{}({})", context, param.name))
            })
    }

    pub(crate) fn check_script_args(
        &self,
        signature: &Signature,
        args: &[ScriptValue],
        context: &str,
    ) -> DispatchResult<()> {
        self.args_to_host(signature, args, context).map(|_| ())
    }
}
