//! 单调时钟契约与两种实现。
//!
//! # 设计背景（Why）
//! - 定时任务的到期判断必须可注入：生产路径读取真实单调时钟，测试路径读取
//!   手动推进的虚拟时钟，二者共享同一份调度逻辑。
//!
//! # 契约说明（What）
//! - [`Clock::now`] 返回自时钟各自原点起的单调流逝时长，调用方只做差值比较，
//!   不同时钟实例的读数不可互相比较；
//! - 读数不要求随墙上时间同步，但必须单调不减。

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// 供事件循环读取“当前流逝时长”的抽象时钟。
pub trait Clock: Send + Sync + 'static {
    /// 自时钟原点起的单调流逝时长。
    fn now(&self) -> Duration;
}

/// 手动推进的虚拟时钟，驱动确定性定时测试。
///
/// # 逻辑解析（How）
/// - 以原子纳秒计数保存虚拟时刻，[`ManualClock::advance`] 单调增加读数；
/// - 任何线程读取都能看到最新推进结果，无须额外同步。
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed_nanos: AtomicU64,
}

impl ManualClock {
    /// 新建读数为零的虚拟时钟。
    pub fn new() -> Self {
        Self::default()
    }

    /// 向前推进虚拟时间。
    pub fn advance(&self, delta: Duration) {
        let nanos = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

/// 基于 [`std::time::Instant`] 的真实单调时钟。
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// 新建以当前时刻为原点的时钟。
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_accumulates_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(15));
    }

    #[cfg(feature = "std")]
    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
