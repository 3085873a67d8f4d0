//! 可复用的通道生命周期内核。
//!
//! # 设计背景（Why）
//! - 注册、绑定、连接、关闭的状态迁移与事件触发次序对所有传输一致，抽成独立组件后，
//!   具体传输以字段内嵌（组合）而非继承的方式获得整套编排，并保留覆写 `transport_*`
//!   的自由度。
//!
//! # 逻辑解析（How）
//! - 状态、地址、配置各自由细粒度自旋锁保护，临界区内不执行用户代码；
//! - 事件触发（`fire_*`）一律发生在对应锁释放之后，Handler 重入通道操作不会自我死锁；
//! - 注册时若调用方不在目标循环线程，注册体整体转投循环执行，保证 `do_register`
//!   与注册事件的线程封闭。
//!
//! # 契约说明（What）
//! - **幂等关闭**：`transport_close` 对已关闭通道直接定格信号，钩子与事件不重复触发；
//! - **事件次序**：关闭路径严格按 `do_close → channel_inactive → channel_unregistered →
//!   close_signal` 推进，inactive 仅在通道曾经 Active 时触发；
//! - **单循环绑定**：事件循环槽位一旦写入不可更换，重复注册立即失败。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreError, Result, codes};
use crate::message::PipelineMessage;
use crate::pipeline::ChannelPipeline;
use crate::runtime::EventLoop;
use crate::signal::CompletionSignal;

use super::address::TransportAddress;
use super::config::{ChannelConfig, ChannelMetadata};
use super::driver::Channel;
use super::state::{ChannelId, ChannelState};

/// 通道生命周期内核，内嵌于每个具体传输的通道类型。
pub struct ChannelCore {
    id: ChannelId,
    state: spin::Mutex<ChannelState>,
    ever_active: AtomicBool,
    config: spin::Mutex<ChannelConfig>,
    metadata: ChannelMetadata,
    pipeline: Arc<ChannelPipeline>,
    event_loop: spin::Mutex<Option<Arc<EventLoop>>>,
    local_address: spin::Mutex<Option<TransportAddress>>,
    remote_address: spin::Mutex<Option<TransportAddress>>,
    close_signal: CompletionSignal,
    /// 无归属操作可承接的失败（如 Handler 异常穿透尾部）暂存于此，等待显式检取。
    last_error: spin::Mutex<Option<CoreError>>,
}

impl ChannelCore {
    /// 以默认配置新建内核，同时创建配套流水线。
    pub fn new(metadata: ChannelMetadata) -> Self {
        Self {
            id: ChannelId::next(),
            state: spin::Mutex::new(ChannelState::Open),
            ever_active: AtomicBool::new(false),
            config: spin::Mutex::new(ChannelConfig::default()),
            metadata,
            pipeline: ChannelPipeline::new(),
            event_loop: spin::Mutex::new(None),
            local_address: spin::Mutex::new(None),
            remote_address: spin::Mutex::new(None),
            close_signal: CompletionSignal::new(),
            last_error: spin::Mutex::new(None),
        }
    }

    /// 通道标识。
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// 当前状态。
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// 传输能力描述。
    pub fn metadata(&self) -> ChannelMetadata {
        self.metadata
    }

    /// 配置快照。
    pub fn config(&self) -> ChannelConfig {
        self.config.lock().clone()
    }

    /// 原地修改配置。
    pub fn configure(&self, mutate: impl FnOnce(&mut ChannelConfig)) {
        mutate(&mut self.config.lock());
    }

    /// 配套流水线。
    pub fn pipeline(&self) -> &Arc<ChannelPipeline> {
        &self.pipeline
    }

    /// 注册后的事件循环。
    pub fn event_loop(&self) -> Option<Arc<EventLoop>> {
        self.event_loop.lock().clone()
    }

    /// 本地地址。
    pub fn local_address(&self) -> Option<TransportAddress> {
        self.local_address.lock().clone()
    }

    /// 对端地址。
    pub fn remote_address(&self) -> Option<TransportAddress> {
        self.remote_address.lock().clone()
    }

    /// 由传输在连接就绪时写入本地地址（被动接入的通道不经过 bind）。
    pub fn set_local_address(&self, local: TransportAddress) {
        *self.local_address.lock() = Some(local);
    }

    /// 由传输在连接就绪时写入对端地址。
    pub fn set_remote_address(&self, remote: TransportAddress) {
        *self.remote_address.lock() = Some(remote);
    }

    /// 关闭信号。
    pub fn close_signal(&self) -> CompletionSignal {
        self.close_signal.clone()
    }

    /// 检取并清空最近一次无归属失败。
    pub fn take_last_error(&self) -> Option<CoreError> {
        self.last_error.lock().take()
    }

    /// 注册编排入口。
    pub fn register(&self, me: Arc<dyn Channel>, event_loop: Arc<EventLoop>) -> CompletionSignal {
        let signal = CompletionSignal::new();
        if !me.compatible_event_loop(&event_loop) {
            signal.fail(CoreError::new(
                codes::EXECUTOR_INCOMPATIBLE,
                "event loop kind is incompatible with this transport",
            ));
            me.close();
            return signal;
        }
        {
            let mut slot = self.event_loop.lock();
            if slot.is_some() {
                signal.fail(CoreError::new(
                    codes::ALREADY_REGISTERED,
                    "channel is already registered to an event loop",
                ));
                return signal;
            }
            *slot = Some(Arc::clone(&event_loop));
        }
        let body = {
            let signal = signal.clone();
            move || Self::register_in_loop(me, signal)
        };
        if event_loop.in_event_loop() {
            body();
        } else {
            event_loop.execute(alloc::boxed::Box::new(body));
        }
        signal
    }

    fn register_in_loop(me: Arc<dyn Channel>, signal: CompletionSignal) {
        match me.do_register() {
            Ok(()) => {
                let core = me.core();
                core.transition(ChannelState::Registered);
                tracing::trace!(channel = %core.id, "registered to event loop");
                core.pipeline.fire_channel_registered();
                signal.complete();
                me.post_register();
            }
            Err(error) => {
                tracing::debug!(channel = %me.core().id, %error, "register hook failed, closing");
                signal.fail(error);
                me.close();
            }
        }
    }

    /// 迁移到 Active 并触发激活事件；自动读取开启时顺带续订读取。
    ///
    /// 对已关闭或已激活的通道为空操作。
    pub fn set_active(&self, me: &Arc<dyn Channel>) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ChannelState::Closed | ChannelState::Active) {
                return;
            }
            *state = ChannelState::Active;
        }
        self.ever_active.store(true, Ordering::SeqCst);
        self.pipeline.fire_channel_active();
        if self.config().auto_read {
            me.begin_read();
        }
    }

    /// 头部终点：绑定。
    pub fn transport_bind(
        &self,
        me: &Arc<dyn Channel>,
        addr: TransportAddress,
        signal: &CompletionSignal,
    ) {
        match self.state() {
            ChannelState::Closed => {
                signal.fail(CoreError::new(codes::CHANNEL_CLOSED, "channel is closed"));
                return;
            }
            ChannelState::Open => {
                signal.fail(CoreError::new(
                    codes::NOT_REGISTERED,
                    "bind requires a registered channel",
                ));
                return;
            }
            ChannelState::Bound | ChannelState::Active => {
                signal.fail(CoreError::new(
                    codes::ALREADY_BOUND,
                    "channel already holds a local address",
                ));
                return;
            }
            ChannelState::Registered => {}
        }
        match me.do_bind(&addr) {
            Ok(actual) => {
                *self.local_address.lock() = Some(actual);
                self.transition(ChannelState::Bound);
                signal.complete();
                if me.active_after_bind() {
                    self.set_active(me);
                }
            }
            Err(error) => {
                signal.fail(error);
                me.close();
            }
        }
    }

    /// 头部终点：连接。
    pub fn transport_connect(
        &self,
        me: &Arc<dyn Channel>,
        remote: TransportAddress,
        signal: &CompletionSignal,
    ) {
        match self.state() {
            ChannelState::Closed => {
                signal.fail(CoreError::new(codes::CHANNEL_CLOSED, "channel is closed"));
                return;
            }
            ChannelState::Open => {
                signal.fail(CoreError::new(
                    codes::NOT_REGISTERED,
                    "connect requires a registered channel",
                ));
                return;
            }
            ChannelState::Active => {
                signal.fail(CoreError::new(
                    codes::ALREADY_CONNECTED,
                    "channel is already connected",
                ));
                return;
            }
            ChannelState::Registered | ChannelState::Bound => {}
        }
        self.arm_connect_timeout(me, signal);
        if let Err(error) = me.do_connect(&remote, signal) {
            signal.fail(error);
            me.close();
        }
    }

    /// 超时到期时定格连接信号并关闭通道；连接先行定格则超时任务作废。
    fn arm_connect_timeout(&self, me: &Arc<dyn Channel>, signal: &CompletionSignal) {
        let Some(timeout) = self.config().connect_timeout else {
            return;
        };
        let Some(event_loop) = self.event_loop() else {
            return;
        };
        let weak_me = Arc::downgrade(me);
        let timeout_signal = signal.clone();
        let handle = event_loop.schedule(
            timeout,
            alloc::boxed::Box::new(move || {
                let expired = timeout_signal.fail(CoreError::new(
                    codes::CONNECT_TIMEOUT,
                    "connect deadline exceeded",
                ));
                if expired {
                    if let Some(me) = weak_me.upgrade() {
                        me.close();
                    }
                }
            }),
        );
        signal.when_complete(move |_| {
            handle.cancel();
        });
    }

    /// 头部终点：断开。不支持半关闭的传输退化为关闭。
    pub fn transport_disconnect(&self, me: &Arc<dyn Channel>, signal: &CompletionSignal) {
        if !self.metadata.has_disconnect {
            self.transport_close(me, signal);
            return;
        }
        match self.state() {
            ChannelState::Active => {}
            ChannelState::Closed => {
                signal.fail(CoreError::new(codes::CHANNEL_CLOSED, "channel is closed"));
                return;
            }
            _ => {
                signal.fail(CoreError::new(
                    codes::NOT_CONNECTED,
                    "disconnect requires an active channel",
                ));
                return;
            }
        }
        match me.do_disconnect() {
            Ok(()) => {
                *self.remote_address.lock() = None;
                let fallback = if self.local_address.lock().is_some() {
                    ChannelState::Bound
                } else {
                    ChannelState::Registered
                };
                self.transition(fallback);
                self.pipeline.fire_channel_inactive();
                signal.complete();
            }
            Err(error) => {
                signal.fail(error);
            }
        }
    }

    /// 头部终点：关闭。
    pub fn transport_close(&self, me: &Arc<dyn Channel>, signal: &CompletionSignal) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = ChannelState::Closed;
            previous
        };
        if previous == ChannelState::Closed {
            self.close_signal.complete();
            signal.complete();
            return;
        }
        tracing::debug!(channel = %self.id, from = ?previous, "closing channel");
        me.do_close();
        if previous == ChannelState::Active {
            self.pipeline.fire_channel_inactive();
        }
        if previous.is_registered() {
            self.pipeline.fire_channel_unregistered();
        }
        self.close_signal.complete();
        signal.complete();
    }

    /// 头部终点：续订读取。仅 Active 通道生效。
    pub fn transport_begin_read(&self, me: &Arc<dyn Channel>) {
        if self.state() == ChannelState::Active {
            me.do_begin_read();
        }
    }

    /// 头部终点：写入。
    pub fn transport_write(
        &self,
        me: &Arc<dyn Channel>,
        msg: PipelineMessage,
        signal: &CompletionSignal,
    ) {
        if let Err(error) = self.check_writable() {
            drop(msg);
            signal.fail(error);
            return;
        }
        match me.do_write(msg) {
            Ok(()) => {
                signal.complete();
            }
            Err(error) => {
                signal.fail(error);
            }
        }
    }

    /// 头部终点：冲刷。
    pub fn transport_flush(&self, me: &Arc<dyn Channel>) {
        if self.state() != ChannelState::Closed {
            me.do_flush();
        }
    }

    /// 写入前置校验。
    pub fn check_writable(&self) -> Result<()> {
        match self.state() {
            ChannelState::Active => Ok(()),
            ChannelState::Closed => Err(CoreError::new(
                codes::CHANNEL_CLOSED,
                "write on a closed channel",
            )),
            _ => Err(CoreError::new(
                codes::NOT_CONNECTED,
                "write requires an active channel",
            )),
        }
    }

    /// 记录穿透尾部的异常；仅保留第一条，后续条目降级为日志。
    pub fn note_unhandled_exception(&self, error: CoreError) {
        tracing::warn!(channel = %self.id, %error, "exception reached pipeline tail unhandled");
        let mut slot = self.last_error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    /// 通道是否曾经进入 Active。
    pub fn was_ever_active(&self) -> bool {
        self.ever_active.load(Ordering::SeqCst)
    }

    /// 受控状态迁移：Closed 为吸收态，其余迁移直接生效。
    fn transition(&self, next: ChannelState) {
        let mut state = self.state.lock();
        if *state == ChannelState::Closed {
            return;
        }
        *state = next;
    }
}

impl core::fmt::Debug for ChannelCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelCore")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
