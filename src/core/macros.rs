//! 核心宏定义
//!
//! 提供统一的宏来减少配置类型的样板代码

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use script_bridge::impl_default;
///
/// struct ListenerSettings {
///     port: u16,
///     address: String,
/// }
///
/// impl_default!(ListenerSettings {
///     port: 0,
///     address: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {

    struct CallCounters {
        native: u32,
        script: u32,
    }

    impl_default!(CallCounters {
        native: 0,
        script: 7,
    });

    #[test]
    fn test_impl_default() {
        let counters = CallCounters::default();
        assert_eq!(counters.native, 0);
        assert_eq!(counters.script, 7);
    }
}
