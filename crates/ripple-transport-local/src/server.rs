//! 本地监听通道。
//!
//! # 契约说明（What）
//! - 绑定成功即进入 Active（监听通道没有独立的连接语义）；
//! - 每个接入的连接被合成为一条被接纳端 [`LocalChannel`]，以用户消息的形式交付给
//!   本通道的流水线，由 acceptor Handler 负责把它注册到目标事件循环；
//! - 关闭时解除监听绑定，尚未被取走的被接纳端一并关闭。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, Ordering};

use ripple_core::{
    Channel, ChannelCore, ChannelMetadata, ChannelState, CoreError, EventLoop, ExecutorKind,
    PipelineMessage, Result, TransportAddress, TransportDriver, codes,
};

use crate::channel::LocalChannel;
use crate::registry::LocalRegistry;

/// 同进程监听通道。
pub struct LocalServerChannel {
    self_ref: Weak<LocalServerChannel>,
    core: ChannelCore,
    registry: Arc<LocalRegistry>,
    accept_queue: spin::Mutex<VecDeque<Arc<LocalChannel>>>,
    accept_in_progress: AtomicBool,
}

impl LocalServerChannel {
    /// 新建监听通道。
    pub fn new(registry: Arc<LocalRegistry>) -> Arc<Self> {
        let channel = Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            core: ChannelCore::new(ChannelMetadata::default()),
            registry,
            accept_queue: spin::Mutex::new(VecDeque::new()),
            accept_in_progress: AtomicBool::new(false),
        });
        let weak: Weak<dyn Channel> = Arc::downgrade(&channel) as Weak<dyn Channel>;
        channel.core.pipeline().bind_channel(weak);
        channel
    }

    fn strong(&self) -> Option<Arc<LocalServerChannel>> {
        self.self_ref.upgrade()
    }

    /// 为一次接入合成被接纳端，并在本通道循环上交付。
    pub(crate) fn serve(&self, connector: &Arc<LocalChannel>) -> Arc<LocalChannel> {
        let local = self
            .core
            .local_address()
            .unwrap_or(TransportAddress::Any);
        let remote = connector.local_address().unwrap_or(TransportAddress::Any);
        let child = LocalChannel::accepted(Arc::clone(&self.registry), local, remote, connector);
        let deliver = {
            let child = Arc::clone(&child);
            let me = self.strong();
            move || {
                if let Some(me) = me {
                    me.enqueue_accepted(child);
                }
            }
        };
        match self.event_loop() {
            Some(event_loop) if !event_loop.in_event_loop() => {
                event_loop.execute(Box::new(deliver));
            }
            _ => deliver(),
        }
        child
    }

    fn enqueue_accepted(&self, child: Arc<LocalChannel>) {
        self.accept_queue.lock().push_back(child);
        if self.accept_in_progress.swap(false, Ordering::SeqCst) {
            self.deliver_accepted();
        }
    }

    fn deliver_accepted(&self) {
        let pipeline = Arc::clone(self.core.pipeline());
        loop {
            let child = self.accept_queue.lock().pop_front();
            match child {
                Some(child) => pipeline.fire_read(PipelineMessage::user(child)),
                None => break,
            }
        }
        pipeline.fire_read_complete();
        if self.core.config().auto_read && self.state() == ChannelState::Active {
            self.begin_read();
        }
    }
}

impl TransportDriver for LocalServerChannel {
    fn do_bind(&self, addr: &TransportAddress) -> Result<TransportAddress> {
        let me = self.strong().ok_or_else(|| {
            CoreError::new(codes::CHANNEL_CLOSED, "channel is being dropped")
        })?;
        self.registry.bind_listener(addr, &me)
    }

    fn do_close(&self) {
        if let Some(local) = self.core.local_address() {
            self.registry.unregister(&local);
        }
        let pending: VecDeque<Arc<LocalChannel>> = core::mem::take(&mut *self.accept_queue.lock());
        for child in pending {
            tracing::debug!(listener = %self.id(), child = %child.id(), "closing never-claimed accepted channel");
            child.close();
        }
    }

    fn do_begin_read(&self) {
        if self.accept_in_progress.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.accept_queue.lock().is_empty() {
            return;
        }
        self.accept_in_progress.store(false, Ordering::SeqCst);
        self.deliver_accepted();
    }

    fn active_after_bind(&self) -> bool {
        true
    }
}

impl Channel for LocalServerChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn channel_arc(&self) -> Option<Arc<dyn Channel>> {
        self.strong().map(|me| me as Arc<dyn Channel>)
    }

    fn compatible_event_loop(&self, event_loop: &EventLoop) -> bool {
        event_loop.kind() == ExecutorKind::Dedicated
    }
}
