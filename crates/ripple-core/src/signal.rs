//! 操作完成信号。
//!
//! # 设计背景（Why）
//! - 通道上的 bind/connect/write/close 均为提交即返回的异步操作，调用方需要一个
//!   可跨线程共享的句柄来观察最终结果并挂接回调，语义上等价于一次性 promise。
//!
//! # 逻辑解析（How）
//! - 内部用一把自旋锁保护 `{state, callbacks}`；首次 resolve 生效，后续 resolve 均被
//!   忽略并返回 `false`。回调在锁释放之后执行，避免回调内再次操作信号时自我死锁。
//!
//! # 契约说明（What）
//! - **状态机**：`Pending` 只能迁移到 `Completed`、`Failed` 或 `Cancelled` 之一，且仅一次；
//! - **回调时序**：注册时若已定格，回调立即在调用方线程执行；否则在 resolve 方线程执行；
//! - 失败载荷以 `Arc<CoreError>` 共享，允许多个观察者读取同一根因。
//!
//! # 风险提示（Trade-offs）
//! - 自旋锁临界区内只做状态写入与回调队列摘取，不执行任何用户代码；
//! - 本类型不提供阻塞等待，需要同步汇合时应组合事件循环的 `run_pending_tasks`。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::CoreError;

/// 信号的终态快照。
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum SignalState {
    /// 结果尚未定格。
    Pending,
    /// 操作成功。
    Completed,
    /// 操作失败，附带根因。
    Failed(Arc<CoreError>),
    /// 操作在生效前被取消。
    Cancelled,
}

impl SignalState {
    /// 是否已经定格（非 Pending）。
    pub fn is_resolved(&self) -> bool {
        !matches!(self, SignalState::Pending)
    }
}

type Callback = Box<dyn FnOnce(&SignalState) + Send + 'static>;

struct SignalInner {
    state: SignalState,
    callbacks: Vec<Callback>,
}

/// 一次性完成信号，克隆后共享同一份结果。
#[derive(Clone)]
pub struct CompletionSignal {
    inner: Arc<spin::Mutex<SignalInner>>,
}

impl CompletionSignal {
    /// 新建待定格的信号。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(spin::Mutex::new(SignalInner {
                state: SignalState::Pending,
                callbacks: Vec::new(),
            })),
        }
    }

    /// 新建已成功的信号，用于可同步短路的操作。
    pub fn completed() -> Self {
        let signal = Self::new();
        signal.complete();
        signal
    }

    /// 新建已失败的信号。
    pub fn failed(error: CoreError) -> Self {
        let signal = Self::new();
        signal.fail(error);
        signal
    }

    /// 标记成功；返回本次调用是否真正定格了结果。
    pub fn complete(&self) -> bool {
        self.resolve(SignalState::Completed)
    }

    /// 标记失败；返回本次调用是否真正定格了结果。
    pub fn fail(&self, error: CoreError) -> bool {
        self.resolve(SignalState::Failed(Arc::new(error)))
    }

    /// 标记取消；返回本次调用是否真正定格了结果。
    pub fn cancel(&self) -> bool {
        self.resolve(SignalState::Cancelled)
    }

    /// 读取当前状态快照。
    pub fn state(&self) -> SignalState {
        self.inner.lock().state.clone()
    }

    /// 是否尚未定格。
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().state, SignalState::Pending)
    }

    /// 是否以成功定格。
    pub fn is_completed(&self) -> bool {
        matches!(self.inner.lock().state, SignalState::Completed)
    }

    /// 失败根因（若以失败定格）。
    pub fn failure(&self) -> Option<Arc<CoreError>> {
        match &self.inner.lock().state {
            SignalState::Failed(error) => Some(Arc::clone(error)),
            _ => None,
        }
    }

    /// 注册定格回调。
    ///
    /// 若信号已定格，回调在当前线程立即执行；否则延迟到定格一刻，
    /// 由执行 resolve 的线程在锁外调用。
    pub fn when_complete(&self, callback: impl FnOnce(&SignalState) + Send + 'static) {
        let mut pending: Option<Callback> = Some(Box::new(callback));
        let immediate = {
            let mut inner = self.inner.lock();
            if inner.state.is_resolved() {
                Some(inner.state.clone())
            } else {
                if let Some(callback) = pending.take() {
                    inner.callbacks.push(callback);
                }
                None
            }
        };
        if let (Some(state), Some(callback)) = (immediate, pending) {
            callback(&state);
        }
    }

    fn resolve(&self, next: SignalState) -> bool {
        let (state, callbacks) = {
            let mut inner = self.inner.lock();
            if inner.state.is_resolved() {
                return false;
            }
            inner.state = next;
            (inner.state.clone(), core::mem::take(&mut inner.callbacks))
        };
        for callback in callbacks {
            callback(&state);
        }
        true
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn first_resolution_wins() {
        let signal = CompletionSignal::new();
        assert!(signal.complete());
        assert!(!signal.fail(CoreError::new(codes::CHANNEL_CLOSED, "late")));
        assert!(signal.is_completed());
    }

    #[test]
    fn callbacks_fire_on_resolution() {
        let hits = Arc::new(AtomicUsize::new(0));
        let signal = CompletionSignal::new();
        let probe = Arc::clone(&hits);
        signal.when_complete(move |state| {
            assert!(matches!(state, SignalState::Failed(_)));
            probe.fetch_add(1, Ordering::SeqCst);
        });
        signal.fail(CoreError::new(codes::CONNECTION_REFUSED, "no listener"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let signal = CompletionSignal::completed();
        let probe = Arc::clone(&hits);
        signal.when_complete(move |state| {
            assert!(matches!(state, SignalState::Completed));
            probe.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_shared_across_clones() {
        let signal = CompletionSignal::new();
        let observer = signal.clone();
        signal.fail(CoreError::new(codes::CONNECT_TIMEOUT, "30s elapsed"));
        let failure = observer.failure().expect("failure recorded");
        assert_eq!(failure.code(), codes::CONNECT_TIMEOUT);
    }
}
