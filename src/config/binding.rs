use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 绑定表产物格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// 可读的 JSON 文本
    Json,
    /// 带魔数头的二进制
    Binary,
}

/// 绑定生成与加载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// 启动时加载的绑定表路径
    pub table_path: Option<String>,

    /// 生成器写出的产物格式
    pub artifact_format: ArtifactFormat,

    /// 是否将宿主名称转换为脚本命名约定
    pub script_naming: bool,
}

impl_default!(BindingConfig {
    table_path: None,
    artifact_format: ArtifactFormat::Binary,
    script_naming: true,
});

impl BindingConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(path) = &self.table_path {
            if path.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "table_path must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}
