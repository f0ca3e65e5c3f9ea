//! 绑定生成器
//!
//! 扫描宿主元数据，产出完整且无环的绑定表。使用不受支持类型的方法和属性
//! 会被排除并记录警告；同一个类内的重名绑定使整次生成失败。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::metadata::{HostClassMeta, HostMetadata, HostMetadataSource, HostType};
use super::naming;
use super::shape::{ClassId, Param, Shape, Signature};
use super::table::{BindingTable, ClassBinding, EnumBinding, EnumMember, MethodBinding, PropertyBinding};
use crate::core::error::{GenerationError, GenerationResult};

/// 生成选项
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// 是否应用脚本命名约定
    pub script_naming: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            script_naming: true,
        }
    }
}

/// 被排除的成员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationWarning {
    pub class: String,
    pub member: String,
    pub reason: String,
}

impl fmt::Display for GenerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} excluded: {}", self.class, self.member, self.reason)
    }
}

/// 一次生成的结果
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub table: BindingTable,
    pub warnings: Vec<GenerationWarning>,
}

/// 名称解析上下文
struct TypeContext<'a> {
    /// 宿主类名 -> 元数据
    classes: &'a HashMap<&'a str, &'a HostClassMeta>,
    /// 宿主类名 -> 最近的可绑定自身或祖先的脚本名
    bindable_names: &'a HashMap<String, String>,
    /// 宿主枚举名 -> 脚本名
    enum_names: &'a HashMap<String, String>,
}

impl TypeContext<'_> {
    fn map_type(&self, ty: &HostType) -> Result<Shape, String> {
        match ty {
            HostType::Int8
            | HostType::Int16
            | HostType::Int32
            | HostType::Int64
            | HostType::UInt8
            | HostType::UInt16
            | HostType::UInt32 => Ok(Shape::Integer),
            HostType::UInt64 => Err("64-bit unsigned integers have no script counterpart".to_string()),
            HostType::Float | HostType::Double => Ok(Shape::Real),
            HostType::Bool => Ok(Shape::Boolean),
            HostType::Str | HostType::Text => Ok(Shape::String),
            HostType::Name => Ok(Shape::Name),
            HostType::Enum(name) => self
                .enum_names
                .get(name)
                .map(|script| Shape::Enum(script.clone()))
                .ok_or_else(|| format!("enum {} is not declared", name)),
            HostType::Struct(name) => match name.as_str() {
                "Vector2D" => Ok(Shape::Vector2),
                "Vector" => Ok(Shape::Vector3),
                "Vector4" => Ok(Shape::Vector4),
                "Quat" | "Rotator" => Ok(Shape::Rotation),
                "Transform" => Ok(Shape::Transform),
                "LinearColor" | "Color" => Ok(Shape::Color),
                other => Err(format!("struct {} is not supported", other)),
            },
            HostType::Object(class) | HostType::WeakObject(class) => {
                if !self.classes.contains_key(class.as_str()) {
                    return Err(format!("class {} is not declared", class));
                }
                self.bindable_names
                    .get(class)
                    .map(|script| Shape::Object(ClassId::new(script.clone())))
                    .ok_or_else(|| format!("class {} has no bindable ancestor", class))
            }
            HostType::Array(element) => {
                if matches!(element.as_ref(), HostType::Array(_)) {
                    return Err("nested arrays are not supported".to_string());
                }
                Ok(Shape::list(self.map_type(element)?))
            }
            HostType::Map(..) => Err("maps are not supported".to_string()),
            HostType::Set(_) => Err("sets are not supported".to_string()),
            HostType::Delegate(name) => Err(format!("delegate {} is not supported", name)),
            HostType::Interface(name) => Err(format!("interface {} is not supported", name)),
        }
    }
}

/// 绑定生成器
#[derive(Debug, Clone, Default)]
pub struct BindingGenerator {
    options: GeneratorOptions,
}

impl BindingGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    /// 从元数据源生成绑定表
    pub fn generate(&self, source: &dyn HostMetadataSource) -> GenerationResult<GenerationReport> {
        let metadata = source.enumerate()?;
        self.generate_from(&metadata)
    }

    pub fn generate_from(&self, metadata: &HostMetadata) -> GenerationResult<GenerationReport> {
        let classes = index_classes(metadata)?;
        check_hierarchy(&classes)?;

        let mut table = BindingTable::new();
        let mut warnings = Vec::new();

        let mut enum_names = HashMap::new();
        let mut enum_owners: HashMap<String, &str> = HashMap::new();
        for meta in &metadata.enums {
            let script = self.class_name(&meta.name);
            if let Some(first) = enum_owners.insert(script.clone(), &meta.name) {
                return Err(GenerationError::DuplicateClass {
                    name: script,
                    first: first.to_string(),
                    second: meta.name.clone(),
                });
            }
            enum_names.insert(meta.name.clone(), script.clone());
            table.insert_enum(EnumBinding {
                name: script,
                host_name: meta.name.clone(),
                members: meta
                    .values
                    .iter()
                    .map(|v| EnumMember {
                        name: v.name.clone(),
                        value: v.value,
                    })
                    .collect(),
            });
        }

        // 宿主类 -> 最近的可绑定自身或祖先
        let mut bindable_names = HashMap::new();
        let mut script_owners: BTreeMap<String, &str> = BTreeMap::new();
        for meta in metadata.classes.iter().filter(|c| c.bindable) {
            let script = self.class_name(&meta.name);
            if let Some(first) = script_owners.insert(script.clone(), &meta.name) {
                return Err(GenerationError::DuplicateClass {
                    name: script,
                    first: first.to_string(),
                    second: meta.name.clone(),
                });
            }
            if enum_owners.contains_key(&script) {
                return Err(GenerationError::DuplicateClass {
                    name: script.clone(),
                    first: enum_owners[&script].to_string(),
                    second: meta.name.clone(),
                });
            }
        }
        for name in classes.keys() {
            if let Some(ancestor) = nearest_bindable(&classes, Some(*name)) {
                bindable_names.insert(name.to_string(), self.class_name(ancestor));
            }
        }

        let context = TypeContext {
            classes: &classes,
            bindable_names: &bindable_names,
            enum_names: &enum_names,
        };

        for meta in metadata.classes.iter().filter(|c| c.bindable) {
            let binding = self.bind_class(meta, &classes, &context, &mut warnings)?;
            table.insert_class(binding);
        }

        for warning in &warnings {
            tracing::warn!(target: "binding", "{}", warning);
        }
        tracing::info!(
            target: "binding",
            classes = table.len(),
            excluded = warnings.len(),
            "Binding table generated"
        );

        Ok(GenerationReport { table, warnings })
    }

    fn class_name(&self, host: &str) -> String {
        if self.options.script_naming {
            naming::class_name(host)
        } else {
            host.to_string()
        }
    }

    fn bind_class(
        &self,
        meta: &HostClassMeta,
        classes: &HashMap<&str, &HostClassMeta>,
        context: &TypeContext<'_>,
        warnings: &mut Vec<GenerationWarning>,
    ) -> GenerationResult<ClassBinding> {
        let script_name = self.class_name(&meta.name);
        let superclass =
            nearest_bindable(classes, meta.superclass.as_deref()).map(|host| self.class_name(host));

        let mut methods = Vec::new();
        let mut method_names = BTreeSet::new();
        for method in meta.methods.iter().filter(|m| m.bindable) {
            let mut exclude = |reason: String| {
                warnings.push(GenerationWarning {
                    class: meta.name.clone(),
                    member: method.name.clone(),
                    reason,
                });
            };

            let mut signature = Signature::new();
            let mut supported = true;
            for param in &method.params {
                match context.map_type(&param.ty) {
                    Ok(shape) => {
                        let name = if self.options.script_naming {
                            naming::variable_name(&param.name, false)
                        } else {
                            param.name.clone()
                        };
                        signature.params.push(Param { name, shape });
                    }
                    Err(reason) => {
                        exclude(format!("parameter {}: {}", param.name, reason));
                        supported = false;
                        break;
                    }
                }
            }
            if !supported {
                continue;
            }
            if let Some(returns) = &method.returns {
                match context.map_type(returns) {
                    Ok(shape) => signature.returns = Some(shape),
                    Err(reason) => {
                        exclude(format!("return value: {}", reason));
                        continue;
                    }
                }
            }

            let name = if self.options.script_naming {
                let returns_boolean = signature.returns.as_ref().is_some_and(Shape::is_boolean);
                naming::method_name(&method.name, returns_boolean)
            } else {
                method.name.clone()
            };
            if !method_names.insert(name.clone()) {
                return Err(GenerationError::DuplicateName {
                    class: script_name,
                    name,
                });
            }
            methods.push(MethodBinding {
                name,
                host_name: method.name.clone(),
                signature,
                direction: method.direction,
            });
        }

        let mut properties = Vec::new();
        let mut property_names = BTreeSet::new();
        for property in &meta.properties {
            let shape = match context.map_type(&property.ty) {
                Ok(shape) => shape,
                Err(reason) => {
                    warnings.push(GenerationWarning {
                        class: meta.name.clone(),
                        member: property.name.clone(),
                        reason,
                    });
                    continue;
                }
            };
            let name = if self.options.script_naming {
                naming::variable_name(&property.name, shape.is_boolean())
            } else {
                property.name.clone()
            };
            if !property_names.insert(name.clone()) {
                return Err(GenerationError::DuplicateName {
                    class: script_name,
                    name,
                });
            }
            properties.push(PropertyBinding {
                name,
                host_name: property.name.clone(),
                shape,
                readable: property.readable,
                writable: property.writable,
            });
        }

        Ok(ClassBinding {
            name: script_name,
            host_name: meta.name.clone(),
            superclass,
            methods,
            properties,
        })
    }
}

fn index_classes(metadata: &HostMetadata) -> GenerationResult<HashMap<&str, &HostClassMeta>> {
    let mut classes = HashMap::with_capacity(metadata.classes.len());
    for class in &metadata.classes {
        if classes.insert(class.name.as_str(), class).is_some() {
            return Err(GenerationError::DuplicateClass {
                name: class.name.clone(),
                first: class.name.clone(),
                second: class.name.clone(),
            });
        }
    }
    Ok(classes)
}

fn check_hierarchy(classes: &HashMap<&str, &HostClassMeta>) -> GenerationResult<()> {
    for class in classes.values() {
        let mut steps = 0;
        let mut current = class.superclass.as_deref();
        while let Some(parent) = current {
            let Some(meta) = classes.get(parent) else {
                return Err(GenerationError::MissingSuperclass {
                    class: class.name.clone(),
                    superclass: parent.to_string(),
                });
            };
            steps += 1;
            if steps > classes.len() {
                return Err(GenerationError::SuperclassCycle(class.name.clone()));
            }
            current = meta.superclass.as_deref();
        }
    }
    Ok(())
}

/// 从 `start` 开始（含自身）向上找第一个可绑定的类
fn nearest_bindable<'a>(
    classes: &HashMap<&str, &'a HostClassMeta>,
    start: Option<&str>,
) -> Option<&'a str> {
    let mut current = start;
    while let Some(name) = current {
        let meta = classes.get(name)?;
        if meta.bindable {
            return Some(meta.name.as_str());
        }
        current = meta.superclass.as_deref();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::metadata::{HostEnumMeta, HostMethodMeta, HostPropertyMeta};

    fn metadata() -> HostMetadata {
        HostMetadata::new()
            .enumeration(HostEnumMeta::sequential("ETeam", &["Red", "Blue"]))
            .class(
                HostClassMeta::new("Object")
                    .method(HostMethodMeta::new("GetName").returning(HostType::Str)),
            )
            .class(HostClassMeta::new("InternalBase").extends("Object").hidden())
            .class(
                HostClassMeta::new("Actor")
                    .extends("InternalBase")
                    .method(HostMethodMeta::new("TakeDamage").param("Amount", HostType::Int32))
                    .method(HostMethodMeta::new("IsAlive").returning(HostType::Bool))
                    .method(
                        HostMethodMeta::new("SetLocation")
                            .param("NewLocation", HostType::Struct("Vector".into())),
                    )
                    .method(HostMethodMeta::new("GetTeam").returning(HostType::Enum("ETeam".into())))
                    .method(HostMethodMeta::new("GetUniqueId").returning(HostType::UInt64))
                    .method(HostMethodMeta::new("GetOwner").returning(HostType::Object("Actor".into())))
                    .method(HostMethodMeta::new("GetTags").returning(HostType::Array(Box::new(HostType::Name))))
                    .method(HostMethodMeta::new("OnHit").param(
                        "Callback",
                        HostType::Delegate("FHitDelegate".into()),
                    ))
                    .property(HostPropertyMeta::new("bHidden", HostType::Bool))
                    .property(HostPropertyMeta::new("Health", HostType::Float).read_only())
                    .property(HostPropertyMeta::new(
                        "Lookup",
                        HostType::Map(Box::new(HostType::Name), Box::new(HostType::Int32)),
                    )),
            )
    }

    #[test]
    fn test_generate_applies_naming_and_shapes() {
        let report = BindingGenerator::default().generate(&metadata()).unwrap();
        let table = &report.table;

        let entity = table.class("Entity").unwrap();
        assert_eq!(entity.host_name, "Object");
        assert!(entity.method("name").is_some());

        let actor = table.class("Actor").unwrap();
        assert_eq!(actor.superclass.as_deref(), Some("Entity"));
        assert_eq!(
            actor.method("take_damage").unwrap().signature,
            Signature::new().param("amount", Shape::Integer)
        );
        assert!(actor.method("is_alive?").is_some());
        assert!(actor.method("location_set").is_some());
        assert_eq!(
            actor.method("team").unwrap().signature.returns,
            Some(Shape::Enum("ETeam".into()))
        );
        assert_eq!(
            actor.method("owner").unwrap().signature.returns,
            Some(Shape::object("Actor"))
        );
        assert_eq!(
            actor.method("tags").unwrap().signature.returns,
            Some(Shape::list(Shape::Name))
        );

        let hidden = actor.property("hidden?").unwrap();
        assert_eq!(hidden.shape, Shape::Boolean);
        assert!(!actor.property("health").unwrap().writable);

        assert!(table.class("InternalBase").is_none());
        assert!(table.enum_binding("ETeam").is_some());
    }

    #[test]
    fn test_unsupported_members_are_excluded_with_warning() {
        let report = BindingGenerator::default().generate(&metadata()).unwrap();
        let actor = report.table.class("Actor").unwrap();
        assert!(actor.method("unique_id").is_none());
        assert!(actor.method("on_hit").is_none());
        assert!(actor.property("lookup").is_none());

        let excluded: Vec<_> = report.warnings.iter().map(|w| w.member.as_str()).collect();
        assert_eq!(excluded, vec!["GetUniqueId", "OnHit", "Lookup"]);
    }

    #[test]
    fn test_duplicate_names_fail_generation() {
        let meta = HostMetadata::new().class(
            HostClassMeta::new("Actor")
                .method(HostMethodMeta::new("Jump"))
                .method(HostMethodMeta::new("jump")),
        );
        let err = BindingGenerator::default().generate(&meta).unwrap_err();
        assert!(matches!(err, GenerationError::DuplicateName { ref name, .. } if name == "jump"));
    }

    #[test]
    fn test_duplicate_names_respect_naming_option() {
        let meta = HostMetadata::new().class(
            HostClassMeta::new("Actor")
                .method(HostMethodMeta::new("Jump"))
                .method(HostMethodMeta::new("jump")),
        );
        let generator = BindingGenerator::new(GeneratorOptions {
            script_naming: false,
        });
        let report = generator.generate(&meta).unwrap();
        assert_eq!(report.table.class("Actor").unwrap().methods.len(), 2);
    }

    #[test]
    fn test_missing_superclass_and_cycle() {
        let meta = HostMetadata::new().class(HostClassMeta::new("Pawn").extends("Actor"));
        assert!(matches!(
            BindingGenerator::default().generate(&meta),
            Err(GenerationError::MissingSuperclass { .. })
        ));

        let meta = HostMetadata::new()
            .class(HostClassMeta::new("A").extends("B"))
            .class(HostClassMeta::new("B").extends("A"));
        assert!(matches!(
            BindingGenerator::default().generate(&meta),
            Err(GenerationError::SuperclassCycle(_))
        ));
    }

    #[test]
    fn test_colliding_script_class_names() {
        let meta = HostMetadata::new()
            .class(HostClassMeta::new("Vector3"))
            .class(HostClassMeta::new("Vector"));
        assert!(matches!(
            BindingGenerator::default().generate(&meta),
            Err(GenerationError::DuplicateClass { .. })
        ));
    }
}
