//! 通道标识与生命周期状态机。

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// 进程内唯一的通道标识。
///
/// 分配自进程级单调计数器，日志与诊断输出以它关联同一通道的多条事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// 分配下一个标识。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// 原始数值。
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// 通道生命周期状态。
///
/// # 契约说明（What）
/// - 合法迁移仅有 `Open → Registered → Bound → Active → Closed`，其中 `Bound`
///   仅对先绑定地址的通道出现，连接型通道可从 `Registered` 直达 `Active`；
/// - `Closed` 为吸收态：一旦进入不再离开，重复关闭幂等。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// 已创建，尚未绑定事件循环。
    Open,
    /// 已绑定事件循环并完成注册钩子。
    Registered,
    /// 已持有本地地址，尚未可收发。
    Bound,
    /// 可收发数据。
    Active,
    /// 已关闭。
    Closed,
}

impl ChannelState {
    /// 是否已经完成注册（含后续状态）。
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            ChannelState::Registered | ChannelState::Bound | ChannelState::Active
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let first = ChannelId::next();
        let second = ChannelId::next();
        assert!(second.raw() > first.raw());
    }

    #[test]
    fn registered_predicate_covers_post_register_states() {
        assert!(!ChannelState::Open.is_registered());
        assert!(ChannelState::Registered.is_registered());
        assert!(ChannelState::Bound.is_registered());
        assert!(ChannelState::Active.is_registered());
        assert!(!ChannelState::Closed.is_registered());
    }
}
