//! 核心工具函数
//!
//! 提供项目中常用的工具函数，避免代码重复

/// 获取当前Unix时间戳（毫秒）
///
/// 调试事件和会话记录使用此时间戳。
///
/// # 示例
///
/// ```rust
/// use script_bridge::core::utils::current_timestamp_ms;
///
/// let timestamp_ms = current_timestamp_ms();
/// assert!(timestamp_ms > 0);
/// ```
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 计算字节序列的 SHA-256 校验和（十六进制小写）
///
/// 绑定表校验和与握手比较都使用此格式。
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp_ms() {
        let ts1 = current_timestamp_ms();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let ts2 = current_timestamp_ms();
        assert!(ts2 >= ts1);
    }

    #[test]
    fn test_sha256_hex() {
        let digest = sha256_hex(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"abc"), digest);
        assert_ne!(sha256_hex(b"abd"), digest);
    }
}
