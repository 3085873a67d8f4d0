//! 通道配置与传输能力描述。

use core::time::Duration;

/// 通道的运行期可调配置。
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// 激活后以及每轮读取完成后是否自动续订读取。
    ///
    /// 关闭后需要调用方显式 `begin_read` 拉取数据，构成最朴素的背压开关。
    pub auto_read: bool,
    /// 连接操作的超时上限；`None` 表示不设超时。
    pub connect_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            auto_read: true,
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// 传输实现的静态能力描述，构造后不可变。
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelMetadata {
    /// 传输是否支持“断开但保持注册”的半关闭语义。
    ///
    /// 为 `false` 时 disconnect 退化为 close。
    pub has_disconnect: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_auto_read_with_connect_timeout() {
        let config = ChannelConfig::default();
        assert!(config.auto_read);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
    }
}
