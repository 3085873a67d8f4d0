//! 可编排通道。
//!
//! # 设计背景（Why）
//! - Handler 的大多数缺陷藏在事件次序与所有权转移里，联调真实传输来暴露它们既慢
//!   又不稳定。本通道把传输两端都折叠进内存队列：测试灌入入站消息、检取出站消息，
//!   事件在调用栈上同步完成，断言因此逐条可控。
//!
//! # 契约说明（What）
//! - 构造即完成注册与激活，Handler 看到的生命周期事件与真实传输一致；
//! - `write_inbound` / `write_outbound` 返回的布尔值反映同步传播期间是否有消息
//!   留存到对应队列；经任务队列延迟转发的消息在返回前被排空，但不计入该布尔值；
//! - 穿透尾部的异常被暂存，任何后续的 `write_*` / `finish` 调用最先把它重新抛出。

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use core::any::Any;
use core::time::Duration;

use ripple_core::{
    Channel, ChannelCore, ChannelMetadata, ChannelPipeline, ChannelState, CoreError, EventLoop,
    ExecutorKind, PipelineMessage, Result, TransportAddress, TransportDriver, codes,
};

use crate::event_loop::EmbeddedEventLoop;

/// 没有对端的内存通道，入站出站各接一条检取队列。
pub struct EmbeddedChannel {
    self_ref: Weak<EmbeddedChannel>,
    core: ChannelCore,
    event_loop: EmbeddedEventLoop,
    inbound: spin::Mutex<VecDeque<PipelineMessage>>,
    outbound: spin::Mutex<VecDeque<PipelineMessage>>,
}

impl EmbeddedChannel {
    /// 新建并立即注册、激活。
    pub fn new() -> Arc<Self> {
        Self::with_setup(|_| {})
    }

    /// 先由 `setup` 装配流水线，再注册并激活，Handler 因此能观察到注册与激活事件。
    pub fn with_setup(setup: impl FnOnce(&Arc<ChannelPipeline>)) -> Arc<Self> {
        let channel = Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            core: ChannelCore::new(ChannelMetadata::default()),
            event_loop: EmbeddedEventLoop::new(),
            inbound: spin::Mutex::new(VecDeque::new()),
            outbound: spin::Mutex::new(VecDeque::new()),
        });
        let weak: Weak<dyn Channel> = Arc::downgrade(&channel) as Weak<dyn Channel>;
        channel.core.pipeline().bind_channel(weak);
        setup(channel.core.pipeline());
        let me: Arc<dyn Channel> = Arc::clone(&channel) as Arc<dyn Channel>;
        channel
            .core
            .register(Arc::clone(&me), Arc::clone(channel.event_loop.event_loop()));
        channel.core.set_active(&me);
        channel
    }

    /// 内嵌的事件循环。
    pub fn embedded_loop(&self) -> &EmbeddedEventLoop {
        &self.event_loop
    }

    /// 排空即时任务队列。
    pub fn run_pending_tasks(&self) {
        self.event_loop.run_pending_tasks();
    }

    /// 推进虚拟时间。
    pub fn advance_time(&self, delta: Duration) {
        self.event_loop.advance_time(delta);
    }

    /// 从头部灌入一条入站消息，同步穿过流水线。
    ///
    /// 返回是否有消息留存到入站检取队列。
    pub fn write_inbound(&self, msg: PipelineMessage) -> Result<bool> {
        self.check_exception()?;
        if self.state() == ChannelState::Closed {
            drop(msg);
            return Err(CoreError::new(
                codes::CHANNEL_CLOSED,
                "write_inbound on a finished channel",
            ));
        }
        let pipeline = self.core.pipeline();
        pipeline.fire_read(msg);
        pipeline.fire_read_complete();
        let captured = !self.inbound.lock().is_empty();
        self.run_pending_tasks();
        self.check_exception()?;
        Ok(captured)
    }

    /// 从尾部提交一条出站消息并冲刷，同步穿过流水线。
    ///
    /// 返回是否有消息留存到出站检取队列。
    pub fn write_outbound(&self, msg: PipelineMessage) -> Result<bool> {
        self.check_exception()?;
        let pipeline = self.core.pipeline();
        let signal = pipeline.write(msg);
        pipeline.flush();
        let captured = !self.outbound.lock().is_empty();
        self.run_pending_tasks();
        if let Some(failure) = signal.failure() {
            return Err(CoreError::new(
                failure.code(),
                alloc::string::String::from(failure.message()),
            )
            .with_cause(failure));
        }
        self.check_exception()?;
        Ok(captured)
    }

    /// 检取一条抵达尾部的入站消息。
    pub fn read_inbound(&self) -> Option<PipelineMessage> {
        self.inbound.lock().pop_front()
    }

    /// 检取一条抵达头部的出站消息。
    pub fn read_outbound(&self) -> Option<PipelineMessage> {
        self.outbound.lock().pop_front()
    }

    /// 按类型检取入站消息；队首类型不符时原位放回并返回 `None`。
    pub fn read_inbound_as<T: Any + Send + Sync>(&self) -> Option<T> {
        Self::read_typed(&self.inbound)
    }

    /// 按类型检取出站消息；队首类型不符时原位放回并返回 `None`。
    pub fn read_outbound_as<T: Any + Send + Sync>(&self) -> Option<T> {
        Self::read_typed(&self.outbound)
    }

    fn read_typed<T: Any + Send + Sync>(
        queue: &spin::Mutex<VecDeque<PipelineMessage>>,
    ) -> Option<T> {
        let msg = queue.lock().pop_front()?;
        match msg.downcast::<T>() {
            Ok(value) => Some(value),
            Err(msg) => {
                queue.lock().push_front(msg);
                None
            }
        }
    }

    /// 关闭通道并结算：返回是否仍有未检取的消息。
    pub fn finish(&self) -> Result<bool> {
        self.close();
        self.run_pending_tasks();
        self.check_exception()?;
        Ok(!self.inbound.lock().is_empty() || !self.outbound.lock().is_empty())
    }

    /// 同 [`EmbeddedChannel::finish`]，并释放两侧队列中剩余的消息。
    pub fn finish_and_release_all(&self) -> Result<bool> {
        let dirty = self.finish()?;
        self.inbound.lock().clear();
        self.outbound.lock().clear();
        Ok(dirty)
    }

    /// 重新抛出最近一次穿透尾部的异常。
    pub fn check_exception(&self) -> Result<()> {
        match self.core.take_last_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl TransportDriver for EmbeddedChannel {
    fn do_bind(&self, addr: &TransportAddress) -> Result<TransportAddress> {
        Ok(addr.clone())
    }

    fn do_write(&self, msg: PipelineMessage) -> Result<()> {
        self.outbound.lock().push_back(msg);
        Ok(())
    }
}

impl Channel for EmbeddedChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn channel_arc(&self) -> Option<Arc<dyn Channel>> {
        self.self_ref.upgrade().map(|me| me as Arc<dyn Channel>)
    }

    fn compatible_event_loop(&self, event_loop: &EventLoop) -> bool {
        event_loop.kind() == ExecutorKind::Embedded
    }

    fn on_unhandled_message(&self, msg: PipelineMessage) {
        self.inbound.lock().push_back(msg);
    }
}

impl core::fmt::Debug for EmbeddedChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmbeddedChannel")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("inbound", &self.inbound.lock().len())
            .field("outbound", &self.outbound.lock().len())
            .finish()
    }
}
