use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 分派桥配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 跨运行时调用的最大嵌套深度
    pub max_call_depth: u32,

    /// 是否缓存方法槽解析结果
    pub cache_enabled: bool,
}

impl_default!(DispatchConfig {
    max_call_depth: 64,
    cache_enabled: true,
});

impl DispatchConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
