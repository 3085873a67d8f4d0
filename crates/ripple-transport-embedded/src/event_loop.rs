//! 嵌入调用方线程的事件循环。
//!
//! # 契约说明（What）
//! - 调用方线程恒被视为循环线程：所有提交的任务在下一次 [`EmbeddedEventLoop::run_pending_tasks`]
//!   时于当前线程执行，测试因此可以精确控制“何时发生什么”；
//! - 时间完全虚拟：定时任务只有在 [`EmbeddedEventLoop::advance_time`] 越过其到期时刻后触发。

use alloc::sync::Arc;
use core::time::Duration;

use ripple_core::{Clock, EventLoop, ExecutorKind, ManualClock};

/// 确定性事件循环：手动驱动任务、手动推进时间。
pub struct EmbeddedEventLoop {
    inner: Arc<EventLoop>,
    clock: Arc<ManualClock>,
}

impl EmbeddedEventLoop {
    /// 新建循环，虚拟时钟从零起步。
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let inner = EventLoop::new(
            ExecutorKind::Embedded,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self { inner, clock }
    }

    /// 底层循环句柄，用于注册通道或直接提交任务。
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.inner
    }

    /// 在当前线程排空即时任务队列，并触发按当前虚拟时间已到期的定时任务。
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
        self.inner.run_scheduled_tasks();
        self.inner.run_pending_tasks();
    }

    /// 推进虚拟时间并触发所有因此到期的定时任务，随后排空即时队列。
    pub fn advance_time(&self, delta: Duration) {
        self.clock.advance(delta);
        self.inner.run_scheduled_tasks();
        self.inner.run_pending_tasks();
    }

    /// 距下一个定时任务到期的剩余虚拟时长。
    pub fn next_scheduled_delay(&self) -> Option<Duration> {
        self.inner.next_scheduled_delay()
    }
}

impl Default for EmbeddedEventLoop {
    fn default() -> Self {
        Self::new()
    }
}
