//! Rust脚本引擎
//!
//! 方法体是注册的 Rust 闭包，类声明用一种简单的行格式编译：
//!
//! ```text
//! # 注释
//! class Boss extends Actor
//! method take_damage(amount: Integer)
//! method is_angry?() -> Boolean
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{CompileError, HostGateway, ScriptCall, ScriptEngine, ScriptFault};
use crate::binding::{ClassId, Shape, Signature};
use crate::dispatch::{ObjectHandle, ScriptValue};
use crate::reflection::ScriptClassDescriptor;

type MethodBody = dyn Fn(&ScriptContext<'_>) -> Result<ScriptValue, ScriptFault> + Send + Sync;

/// 方法体的执行上下文
pub struct ScriptContext<'a> {
    pub class: &'a ClassId,
    pub receiver: ObjectHandle,
    pub receiver_class: &'a ClassId,
    pub args: &'a [ScriptValue],
    pub host: &'a dyn HostGateway,
}

impl ScriptContext<'_> {
    pub fn arg(&self, index: usize) -> Result<&ScriptValue, ScriptFault> {
        self.args
            .get(index)
            .ok_or_else(|| ScriptFault::Runtime(format!("missing argument {}", index)))
    }

    pub fn integer(&self, index: usize) -> Result<i64, ScriptFault> {
        self.arg(index)?
            .as_integer()
            .ok_or_else(|| ScriptFault::Runtime(format!("argument {} is not an Integer", index)))
    }
}

/// Rust脚本引擎
#[derive(Default)]
pub struct RustScriptEngine {
    classes: BTreeMap<ClassId, ScriptClassDescriptor>,
    bodies: HashMap<(ClassId, String), Arc<MethodBody>>,
}

impl RustScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册方法体
    pub fn define<F>(&mut self, class: &str, method: &str, body: F) -> &mut Self
    where
        F: Fn(&ScriptContext<'_>) -> Result<ScriptValue, ScriptFault> + Send + Sync + 'static,
    {
        self.bodies
            .insert((ClassId::from(class), method.to_string()), Arc::new(body));
        self
    }

    pub fn class(&self, id: &str) -> Option<&ScriptClassDescriptor> {
        self.classes.get(id)
    }
}

impl ScriptEngine for RustScriptEngine {
    fn compile(&mut self, source: &str) -> Result<ScriptClassDescriptor, CompileError> {
        let descriptor = parse_declaration(source)?;
        tracing::debug!(
            target: "runtime",
            class = %descriptor.id,
            methods = descriptor.methods.len(),
            "Compiled script class"
        );
        self.classes.insert(descriptor.id.clone(), descriptor.clone());
        Ok(descriptor)
    }

    fn invoke(&self, call: ScriptCall<'_>, host: &dyn HostGateway) -> Result<ScriptValue, ScriptFault> {
        let key = (call.class.clone(), call.method.to_string());
        let body = self.bodies.get(&key).ok_or_else(|| {
            ScriptFault::Runtime(format!("no body defined for {}.{}", call.class, call.method))
        })?;
        let context = ScriptContext {
            class: call.class,
            receiver: call.receiver,
            receiver_class: call.receiver_class,
            args: &call.args,
            host,
        };
        body(&context)
    }

    fn enumerate_classes(&self) -> Vec<ScriptClassDescriptor> {
        self.classes.values().cloned().collect()
    }

    fn classes_updated(&mut self, installed: &[ScriptClassDescriptor], removed: &[ClassId]) {
        for id in removed {
            self.classes.remove(id);
        }
        for class in installed {
            self.classes.insert(class.id.clone(), class.clone());
        }
    }
}

/// 解析类声明
pub fn parse_declaration(source: &str) -> Result<ScriptClassDescriptor, CompileError> {
    let mut descriptor: Option<ScriptClassDescriptor> = None;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("class ") {
            if descriptor.is_some() {
                return Err(CompileError::new(line_no, "only one class per source"));
            }
            let mut words = rest.split_whitespace();
            let name = words
                .next()
                .ok_or_else(|| CompileError::new(line_no, "missing class name"))?;
            let mut class = ScriptClassDescriptor::new(name);
            match (words.next(), words.next(), words.next()) {
                (None, _, _) => {}
                (Some("extends"), Some(parent), None) => class = class.extends(parent),
                _ => return Err(CompileError::new(line_no, "expected `class Name [extends Parent]`")),
            }
            descriptor = Some(class);
        } else if let Some(rest) = line.strip_prefix("method ") {
            let class = descriptor
                .take()
                .ok_or_else(|| CompileError::new(line_no, "method declared before class"))?;
            let (name, signature) =
                parse_method(rest).map_err(|message| CompileError::new(line_no, message))?;
            descriptor = Some(class.method(name, signature));
        } else {
            return Err(CompileError::new(line_no, format!("unexpected `{}`", line)));
        }
    }

    descriptor.ok_or_else(|| CompileError::new(0, "no class declared"))
}

fn parse_method(text: &str) -> Result<(String, Signature), String> {
    let open = text.find('(').ok_or("expected `(`")?;
    let close = text.rfind(')').ok_or("expected `)`")?;
    if close < open {
        return Err("unbalanced parentheses".to_string());
    }

    let name = text[..open].trim();
    if name.is_empty() {
        return Err("missing method name".to_string());
    }

    let mut signature = Signature::new();
    for param in split_top_level(&text[open + 1..close]) {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let (param_name, shape) = param
            .split_once(':')
            .ok_or_else(|| format!("parameter `{}` needs a shape", param))?;
        signature = signature.param(param_name.trim(), parse_shape(shape)?);
    }

    let tail = text[close + 1..].trim();
    if let Some(returns) = tail.strip_prefix("->") {
        signature = signature.returning(parse_shape(returns)?);
    } else if !tail.is_empty() {
        return Err(format!("unexpected `{}` after parameters", tail));
    }

    Ok((name.to_string(), signature))
}

/// 按顶层逗号切分（忽略尖括号内的逗号）
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// 解析形状名称，如 `Integer`、`Object<Actor>`、`List<Enum<Team>>`
pub fn parse_shape(text: &str) -> Result<Shape, String> {
    let text = text.trim();
    if let Some(inner) = generic_argument(text, "Enum") {
        return Ok(Shape::Enum(inner.to_string()));
    }
    if let Some(inner) = generic_argument(text, "Object") {
        return Ok(Shape::object(inner));
    }
    if let Some(inner) = generic_argument(text, "List") {
        let element = parse_shape(inner)?;
        if matches!(element, Shape::List(_)) {
            return Err("nested lists are not supported".to_string());
        }
        return Ok(Shape::list(element));
    }
    match text {
        "Integer" => Ok(Shape::Integer),
        "Real" => Ok(Shape::Real),
        "Boolean" => Ok(Shape::Boolean),
        "String" => Ok(Shape::String),
        "Name" => Ok(Shape::Name),
        "Vector2" => Ok(Shape::Vector2),
        "Vector3" => Ok(Shape::Vector3),
        "Vector4" => Ok(Shape::Vector4),
        "Rotation" => Ok(Shape::Rotation),
        "Transform" => Ok(Shape::Transform),
        "Color" => Ok(Shape::Color),
        other => Err(format!("unknown shape `{}`", other)),
    }
}

fn generic_argument<'a>(text: &'a str, head: &str) -> Option<&'a str> {
    text.strip_prefix(head)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declaration() {
        let descriptor = parse_declaration(
            "# boss\nclass Boss extends Actor\nmethod take_damage(amount: Integer)\nmethod is_angry?() -> Boolean\n",
        )
        .unwrap();
        assert_eq!(descriptor.id.as_str(), "Boss");
        assert_eq!(descriptor.superclass.as_ref().unwrap().as_str(), "Actor");
        assert_eq!(descriptor.methods.len(), 2);
        assert_eq!(
            descriptor.methods[0].signature,
            Signature::new().param("amount", Shape::Integer)
        );
        assert_eq!(descriptor.methods[1].name, "is_angry?");
        assert_eq!(descriptor.methods[1].signature.returns, Some(Shape::Boolean));
    }

    #[test]
    fn test_parse_generic_shapes() {
        assert_eq!(
            parse_shape("List<Object<Actor>>").unwrap(),
            Shape::list(Shape::object("Actor"))
        );
        assert_eq!(parse_shape(" Enum<Team> ").unwrap(), Shape::Enum("Team".into()));
        assert!(parse_shape("List<List<Integer>>").is_err());
        assert!(parse_shape("Float").is_err());

        let (_, signature) = parse_method("spawn(kind: Enum<Team>, at: Vector3) -> Object<Actor>").unwrap();
        assert_eq!(signature.arity(), 2);
    }

    #[test]
    fn test_compile_errors_report_line() {
        let err = parse_declaration("class Boss\nmethod broken(amount Integer)").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_declaration("method orphan()").unwrap_err();
        assert_eq!(err.line, 1);

        assert!(parse_declaration("# nothing").is_err());
    }

    #[test]
    fn test_engine_tracks_updates() {
        let mut engine = RustScriptEngine::new();
        engine.compile("class Boss extends Actor").unwrap();
        assert_eq!(engine.enumerate_classes().len(), 1);

        engine.classes_updated(
            &[ScriptClassDescriptor::new("Minion").extends("Actor")],
            &[ClassId::from("Boss")],
        );
        assert!(engine.class("Boss").is_none());
        assert!(engine.class("Minion").is_some());
    }
}
