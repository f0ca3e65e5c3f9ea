use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 实时更新通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 是否在启动时开启通道
    pub enabled: bool,

    /// 监听地址
    pub listen_address: String,

    /// 监听端口（0 表示由系统分配）
    pub port: u16,

    /// 握手超时（毫秒）
    pub handshake_timeout_ms: u64,

    /// 帧体接收超时（毫秒）
    pub payload_timeout_ms: u64,

    /// 单帧最大字节数
    pub max_frame_bytes: usize,

    /// 调试事件广播缓冲容量
    pub debug_event_capacity: usize,

    /// 网络线程到 tick 线程的队列容量
    pub queue_capacity: usize,
}

impl_default!(ChannelConfig {
    enabled: false,
    listen_address: "127.0.0.1".to_string(),
    port: 12357,
    handshake_timeout_ms: 5000,
    payload_timeout_ms: 10000,
    max_frame_bytes: 16 * 1024 * 1024,
    debug_event_capacity: 64,
    queue_capacity: 32,
});

impl ChannelConfig {
    /// `address:port` 形式的监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Listen address must not be empty".to_string(),
            ));
        }
        if self.handshake_timeout_ms == 0 || self.payload_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Channel timeouts must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_bytes < 16 {
            return Err(ConfigError::ValidationError(format!(
                "Frame limit of {} bytes is too small",
                self.max_frame_bytes
            )));
        }
        if self.debug_event_capacity == 0 || self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Channel capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
