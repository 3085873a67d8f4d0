//! 协作式事件循环。
//!
//! # 设计背景（Why）
//! - 通道的全部生命周期事件必须在其注册的事件循环上串行执行，调用方位于循环内时
//!   直接内联运行，位于循环外时排队等待驱动线程消费。该模型消除了通道状态上的
//!   细粒度并发，代价是任何任务都不得长时间阻塞循环。
//!
//! # 逻辑解析（How）
//! - 即时队列为自旋锁保护的 FIFO；定时队列为按（到期时刻，提交序号）排序的有序映射，
//!   同一到期时刻按提交顺序触发；
//! - “当前线程是否在循环内”通过驱动线程令牌判定：驱动方在排空队列前登记自身令牌，
//!   排空后清除。嵌入式循环视调用方线程即为循环线程，始终判定在内。
//!
//! # 契约说明（What）
//! - **任务次序**：`execute` 提交的任务严格按 FIFO 执行，包括排空过程中追加的任务；
//! - **定时次序**：到期时刻相同的定时任务按提交顺序执行；
//! - **取消语义**：[`ScheduledHandle::cancel`] 在任务尚未出队时生效，
//!   生效后任务不再执行且完成信号定格为取消。
//!
//! # 风险提示（Trade-offs）
//! - 本类型不自带驱动线程：宿主（真实 reactor 或测试代码）负责反复调用
//!   [`EventLoop::run_pending_tasks`] 与 [`EventLoop::run_scheduled_tasks`]；
//! - 自旋锁临界区只做队列收发，任务体一律在锁外执行。

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use crate::signal::CompletionSignal;
use crate::time::Clock;

use super::task::Task;

/// 事件循环的执行形态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecutorKind {
    /// 由专属驱动线程排空队列的常规循环。
    Dedicated,
    /// 嵌入测试调用方线程的确定性循环，调用方线程恒视为循环线程。
    Embedded,
}

/// 定时任务的排序键：先比到期时刻，再比提交序号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduledKey {
    deadline: Duration,
    seq: u64,
}

struct ScheduledEntry {
    task: Task,
    signal: CompletionSignal,
}

/// 单线程协作式事件循环。
pub struct EventLoop {
    self_ref: Weak<EventLoop>,
    kind: ExecutorKind,
    clock: Arc<dyn Clock>,
    immediate: spin::Mutex<VecDeque<Task>>,
    scheduled: spin::Mutex<BTreeMap<ScheduledKey, ScheduledEntry>>,
    sequence: AtomicU64,
    /// 当前驱动线程的令牌；0 表示空闲。
    driver: AtomicU64,
    /// 串行化跨线程驱动者，保证同一时刻只有一个线程在排空队列。
    drive_guard: spin::Mutex<()>,
}

impl EventLoop {
    /// 新建事件循环。
    pub fn new(kind: ExecutorKind, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            kind,
            clock,
            immediate: spin::Mutex::new(VecDeque::new()),
            scheduled: spin::Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            driver: AtomicU64::new(0),
            drive_guard: spin::Mutex::new(()),
        })
    }

    /// 执行形态。
    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    /// 循环使用的时钟。
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 当前线程是否就是循环线程。
    pub fn in_event_loop(&self) -> bool {
        match self.kind {
            ExecutorKind::Embedded => true,
            ExecutorKind::Dedicated => {
                let driver = self.driver.load(Ordering::SeqCst);
                driver != 0 && driver == current_thread_token()
            }
        }
    }

    /// 提交即时任务。
    ///
    /// 任务只入队不执行；真正运行发生在下一次排空。
    pub fn execute(&self, task: Task) {
        self.immediate.lock().push_back(task);
    }

    /// 提交延迟任务，返回可取消的句柄。
    pub fn schedule(&self, delay: Duration, task: Task) -> ScheduledHandle {
        let key = ScheduledKey {
            deadline: self.clock.now().saturating_add(delay),
            seq: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let signal = CompletionSignal::new();
        self.scheduled.lock().insert(
            key,
            ScheduledEntry {
                task,
                signal: signal.clone(),
            },
        );
        ScheduledHandle {
            key,
            event_loop: self.self_ref.clone(),
            signal,
        }
    }

    /// 排空即时队列，包括排空过程中追加的任务。
    pub fn run_pending_tasks(&self) {
        if self.in_event_loop() {
            self.drain_immediate();
            return;
        }
        let _guard = self.drive_guard.lock();
        self.driver.store(current_thread_token(), Ordering::SeqCst);
        self.drain_immediate();
        self.driver.store(0, Ordering::SeqCst);
    }

    /// 触发所有已到期的定时任务，返回距下一次到期的剩余时长。
    pub fn run_scheduled_tasks(&self) -> Option<Duration> {
        let now = self.clock.now();
        let due: Vec<ScheduledEntry> = {
            let mut scheduled = self.scheduled.lock();
            let mut due = Vec::new();
            while let Some(entry) = scheduled.first_entry() {
                if entry.key().deadline > now {
                    break;
                }
                due.push(entry.remove());
            }
            due
        };
        for entry in due {
            // 取消与出队存在窗口竞争：以信号状态为准，已定格则放弃执行。
            if !entry.signal.is_pending() {
                continue;
            }
            (entry.task)();
            entry.signal.complete();
        }
        self.next_deadline_delay(now)
    }

    /// 距下一个定时任务到期的剩余时长；无定时任务时为 `None`。
    pub fn next_scheduled_delay(&self) -> Option<Duration> {
        self.next_deadline_delay(self.clock.now())
    }

    fn next_deadline_delay(&self, now: Duration) -> Option<Duration> {
        self.scheduled
            .lock()
            .keys()
            .next()
            .map(|key| key.deadline.saturating_sub(now))
    }

    fn drain_immediate(&self) {
        loop {
            let task = self.immediate.lock().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl core::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventLoop")
            .field("kind", &self.kind)
            .field("pending", &self.immediate.lock().len())
            .field("scheduled", &self.scheduled.lock().len())
            .finish()
    }
}

/// 定时任务句柄，可在到期前取消。
#[derive(Clone)]
pub struct ScheduledHandle {
    key: ScheduledKey,
    event_loop: Weak<EventLoop>,
    signal: CompletionSignal,
}

impl ScheduledHandle {
    /// 取消任务；返回是否由本次调用定格了取消结果。
    pub fn cancel(&self) -> bool {
        if let Some(event_loop) = self.event_loop.upgrade() {
            event_loop.scheduled.lock().remove(&self.key);
        }
        self.signal.cancel()
    }

    /// 观察任务的完成信号。
    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }
}

/// 每线程唯一且非零的驱动令牌。
#[cfg(feature = "std")]
fn current_thread_token() -> u64 {
    static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
    std::thread_local! {
        static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

/// `no_std` 下视整个环境为单线程，令牌退化为常量。
#[cfg(not(feature = "std"))]
fn current_thread_token() -> u64 {
    1
}
