//! 脚本命名约定
//!
//! 宿主名称大多是 TitleCase，脚本侧使用 snake_case 的方法和变量名、
//! 以 `?` 结尾的谓词，并避开脚本语言的保留字。

const RESERVED_WORDS: &[&str] = &[
    "and", "branch", "case", "change", "eh", "else", "exit", "false", "if", "loop", "nand", "nil",
    "nor", "not", "nxor", "or", "race", "random", "rush", "skip", "sync", "this", "this_class",
    "this_code", "this_mind", "true", "unless", "when", "xor",
];

/// 与脚本内建类冲突的宿主类名
const CLASS_ALIASES: &[(&str, &str)] = &[
    ("Object", "Entity"),
    ("Class", "EntityClass"),
    ("Entity", "GameEntity"),
    ("Vector", "Vector3"),
    ("Enum", "Enum2"),
];

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

fn has_flag_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('b') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

/// 类名：首字母大写，只保留字母数字，连续的非法字符折叠为一个 `_`
pub fn class_name(name: &str) -> String {
    if let Some((_, alias)) = CLASS_ALIASES.iter().find(|(host, _)| *host == name) {
        return alias.to_string();
    }
    if name.is_empty() {
        return "Unnamed".to_string();
    }

    let mut out = String::with_capacity(name.len() + 2);
    let mut was_underscore = true;
    for c in name.chars() {
        let mut c = c;
        if out.is_empty() {
            if c.is_ascii_lowercase() {
                c = c.to_ascii_uppercase();
            } else if !c.is_ascii_uppercase() {
                out.push_str("Sk");
            }
        }
        if c.is_ascii_alphanumeric() {
            out.push(c);
            was_underscore = false;
        } else if !was_underscore {
            out.push('_');
            was_underscore = true;
        }
    }
    out
}

fn snake_case(name: &str) -> String {
    let skip = usize::from(has_flag_prefix(name));
    let mut out = String::with_capacity(name.len() + 8);
    let mut was_upper = true;
    let mut was_underscore = true;
    for c in name.chars().skip(skip) {
        if c == '?' {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            let is_upper = c.is_ascii_uppercase() || c.is_ascii_digit();
            if is_upper && !was_upper && !was_underscore {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            was_upper = is_upper;
            was_underscore = false;
        } else if !was_underscore {
            out.push('_');
            was_underscore = true;
        }
    }
    out
}

fn escape_reserved(mut name: String) -> String {
    if is_reserved_word(&name) {
        name.push('_');
    }
    name
}

/// 剥掉前缀，剩余部分必须以非数字开头
fn strip_word_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)
        .filter(|rest| rest.chars().next().is_some_and(|c| !c.is_ascii_digit()))
}

/// 变量名（属性、参数）
pub fn variable_name(name: &str, is_boolean: bool) -> String {
    let mut out = escape_reserved(snake_case(name));
    if is_boolean {
        out.push('?');
    }
    out
}

/// 方法名
///
/// `k2_` 前缀被去掉；`get_x` 变为 `x`，`set_x` 变为 `x_set`。
/// `get_`/`is_`/`has_`/`can_`/`bFlag` 形式的方法在返回布尔值时追加 `?`。
pub fn method_name(name: &str, returns_boolean: bool) -> String {
    let mut method = escape_reserved(snake_case(name));
    let mut predicate = false;

    if let Some(rest) = strip_word_prefix(&method, "k2_") {
        method = escape_reserved(rest.to_string());
    }

    if let Some(rest) = strip_word_prefix(&method, "get_") {
        method = escape_reserved(rest.to_string());
        predicate = true;
    } else if let Some(rest) = strip_word_prefix(&method, "set_") {
        method = format!("{}_set", rest);
    }

    if has_flag_prefix(name)
        || method.starts_with("is_")
        || method.starts_with("has_")
        || method.starts_with("can_")
    {
        predicate = true;
    }

    if predicate && returns_boolean {
        method.push('?');
    }
    method
}
