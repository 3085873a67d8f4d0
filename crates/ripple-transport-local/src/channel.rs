//! 点对点本地通道。
//!
//! # 设计背景（Why）
//! - 写入即入队对端缓冲，没有真实 IO，难点全部在交付时序：对端的读取交付必须发生在
//!   对端的事件循环线程上，且不能在重入场景（同循环回写、echo 链）里吞消息或爆栈。
//!
//! # 逻辑解析（How）
//! - 跨通道的状态迁移不直接调用对端方法，而是向对端事件循环投递 [`PeerCommand`]
//!   指令，由对端在自己的线程上消化，双方互不持锁；
//! - 仅当两端同循环、当前线程在循环内且对端不在写入途中时，读取交付才内联执行，
//!   其余一律走任务队列；
//! - 内联交付携带重入深度计数，超过注册表配置的上限后改为投递续读指令，退栈解围。
//!
//! # 契约说明（What）
//! - **消息次序**：同一方向的消息严格按写入顺序交付；
//! - **关闭次序**：关闭时先解除注册表绑定，再以 `channel.disconnected` 定格在途连接，
//!   随后释放未交付缓冲，最后通知对端转入关闭；
//! - **连接完成次序**：被接纳的子通道先完成注册与激活，连接方的激活与连接信号
//!   随后在连接方循环上定格。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ripple_core::{
    Channel, ChannelCore, ChannelMetadata, ChannelState, CompletionSignal, CoreError, EventLoop,
    ExecutorKind, PipelineMessage, Result, TransportAddress, TransportDriver, codes,
};

use crate::registry::LocalRegistry;

/// 投递给对端事件循环的跨通道指令。
enum PeerCommand {
    /// 把已入队的消息交付给对端流水线。
    DeliverRead,
    /// 对端被接纳完成，连接方转入 Active 并定格连接信号。
    TransitionActive,
    /// 本端已关闭，对端随之关闭。
    TransitionClosed,
}

/// 同进程点对点通道。
pub struct LocalChannel {
    self_ref: Weak<LocalChannel>,
    core: ChannelCore,
    registry: Arc<LocalRegistry>,
    /// 由 serve 构造的被接纳端为真；其本地地址归监听方所有，关闭时不解除绑定。
    accepted: bool,
    peer: spin::Mutex<Option<Arc<LocalChannel>>>,
    inbound: spin::Mutex<VecDeque<PipelineMessage>>,
    read_in_progress: AtomicBool,
    write_in_progress: AtomicBool,
    read_depth: AtomicUsize,
    connect_signal: spin::Mutex<Option<CompletionSignal>>,
}

impl LocalChannel {
    /// 新建连接方通道。
    pub fn new(registry: Arc<LocalRegistry>) -> Arc<Self> {
        Self::build(registry, false)
    }

    /// 由监听方构造被接纳端，地址与对端引用在注册前就位。
    pub(crate) fn accepted(
        registry: Arc<LocalRegistry>,
        local: TransportAddress,
        remote: TransportAddress,
        connector: &Arc<LocalChannel>,
    ) -> Arc<Self> {
        let child = Self::build(registry, true);
        child.core.set_local_address(local);
        child.core.set_remote_address(remote);
        *child.peer.lock() = Some(Arc::clone(connector));
        child
    }

    fn build(registry: Arc<LocalRegistry>, accepted: bool) -> Arc<Self> {
        let channel = Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            core: ChannelCore::new(ChannelMetadata::default()),
            registry,
            accepted,
            peer: spin::Mutex::new(None),
            inbound: spin::Mutex::new(VecDeque::new()),
            read_in_progress: AtomicBool::new(false),
            write_in_progress: AtomicBool::new(false),
            read_depth: AtomicUsize::new(0),
            connect_signal: spin::Mutex::new(None),
        });
        let weak: Weak<dyn Channel> = Arc::downgrade(&channel) as Weak<dyn Channel>;
        channel.core.pipeline().bind_channel(weak);
        channel
    }

    /// 当前对端。
    pub fn peer(&self) -> Option<Arc<LocalChannel>> {
        self.peer.lock().clone()
    }

    fn strong(&self) -> Option<Arc<LocalChannel>> {
        self.self_ref.upgrade()
    }

    pub(crate) fn attach_peer(&self, peer: Arc<LocalChannel>) {
        *self.peer.lock() = Some(peer);
    }

    fn post_peer_command(target: &Arc<LocalChannel>, command: PeerCommand) {
        match target.event_loop() {
            Some(event_loop) => {
                let target = Arc::clone(target);
                event_loop.execute(Box::new(move || target.apply_peer_command(command)));
            }
            // 未注册的对端没有循环可投递；关闭指令就地生效（close 经流水线头部内联执行），
            // 读取与激活指令只对已注册通道有意义。
            None => match command {
                PeerCommand::TransitionClosed => {
                    target.close();
                }
                PeerCommand::DeliverRead | PeerCommand::TransitionActive => {
                    tracing::debug!(channel = %target.id(), "dropping peer command, channel has no event loop");
                }
            },
        }
    }

    fn apply_peer_command(&self, command: PeerCommand) {
        match command {
            PeerCommand::DeliverRead => self.finish_peer_read_now(),
            PeerCommand::TransitionActive => self.finish_connect(),
            PeerCommand::TransitionClosed => {
                self.close();
            }
        }
    }

    /// 被接纳端就绪后，连接方在自己循环上收尾：定格信号并转入 Active。
    fn finish_connect(&self) {
        let Some(signal) = self.connect_signal.lock().take() else {
            return;
        };
        signal.complete();
        if let Some(me) = self.channel_arc() {
            self.core.set_active(&me);
        }
    }

    /// 写入方在消息入队后唤醒对端的读取交付。
    fn finish_peer_read(&self, peer: &Arc<LocalChannel>) {
        let inline = match (self.event_loop(), peer.event_loop()) {
            (Some(mine), Some(theirs)) => {
                Arc::ptr_eq(&mine, &theirs)
                    && mine.in_event_loop()
                    && !peer.write_in_progress.load(Ordering::SeqCst)
            }
            _ => false,
        };
        if inline {
            peer.finish_peer_read_now();
        } else {
            Self::post_peer_command(peer, PeerCommand::DeliverRead);
        }
    }

    /// 在本通道循环上执行一轮读取交付；未续订读取或无消息时静默返回。
    fn finish_peer_read_now(&self) {
        if !self.read_in_progress.load(Ordering::SeqCst) {
            return;
        }
        if self.inbound.lock().is_empty() {
            return;
        }
        self.read_in_progress.store(false, Ordering::SeqCst);
        self.read_inbound_now();
    }

    fn read_inbound_now(&self) {
        let limit = self.registry.options().max_read_stack_depth;
        if self.read_depth.fetch_add(1, Ordering::SeqCst) >= limit {
            self.read_depth.fetch_sub(1, Ordering::SeqCst);
            // 重入过深：恢复读取续订并经任务队列续读，先退栈再交付。
            self.read_in_progress.store(true, Ordering::SeqCst);
            if let Some(me) = self.strong() {
                Self::post_peer_command(&me, PeerCommand::DeliverRead);
            }
            return;
        }
        let pipeline = Arc::clone(self.core.pipeline());
        loop {
            let msg = self.inbound.lock().pop_front();
            match msg {
                Some(msg) => pipeline.fire_read(msg),
                None => break,
            }
        }
        pipeline.fire_read_complete();
        self.read_depth.fetch_sub(1, Ordering::SeqCst);
        if self.core.config().auto_read && self.state() == ChannelState::Active {
            self.begin_read();
        }
    }
}

impl TransportDriver for LocalChannel {
    fn post_register(&self) {
        if !self.accepted {
            return;
        }
        // 被接纳端注册即就绪：先在本循环激活，再通知连接方收尾。
        if let Some(me) = self.channel_arc() {
            self.core.set_active(&me);
        }
        if let Some(peer) = self.peer() {
            Self::post_peer_command(&peer, PeerCommand::TransitionActive);
        }
    }

    fn do_bind(&self, addr: &TransportAddress) -> Result<TransportAddress> {
        let me = self.strong().ok_or_else(|| {
            CoreError::new(codes::CHANNEL_CLOSED, "channel is being dropped")
        })?;
        self.registry.bind_endpoint(addr, &me)
    }

    fn do_connect(&self, remote: &TransportAddress, signal: &CompletionSignal) -> Result<()> {
        if self.connect_signal.lock().is_some() {
            return Err(CoreError::new(
                codes::CONNECT_IN_PROGRESS,
                "a connect operation is already pending",
            ));
        }
        if self.peer.lock().is_some() {
            return Err(CoreError::new(
                codes::ALREADY_CONNECTED,
                "channel already has a peer",
            ));
        }
        let Some(server) = self.registry.lookup_listener(remote) else {
            return Err(CoreError::new(
                codes::CONNECTION_REFUSED,
                alloc::format!("no listener at {remote}"),
            ));
        };
        if server.state() != ChannelState::Active {
            return Err(CoreError::new(
                codes::CONNECTION_REFUSED,
                alloc::format!("listener at {remote} is not accepting"),
            ));
        }
        let me = self.strong().ok_or_else(|| {
            CoreError::new(codes::CHANNEL_CLOSED, "channel is being dropped")
        })?;
        if self.core.local_address().is_none() {
            let local = self.registry.bind_endpoint(&TransportAddress::Any, &me)?;
            self.core.set_local_address(local);
        }
        self.core.set_remote_address(remote.clone());
        *self.connect_signal.lock() = Some(signal.clone());
        let child = server.serve(&me);
        self.attach_peer(child);
        Ok(())
    }

    fn do_close(&self) {
        if !self.accepted {
            if let Some(local) = self.core.local_address() {
                self.registry.unregister(&local);
            }
        }
        if let Some(signal) = self.connect_signal.lock().take() {
            signal.fail(CoreError::new(
                codes::DISCONNECTED,
                "channel closed before connect completed",
            ));
        }
        let dropped = {
            let mut inbound = self.inbound.lock();
            let dropped = inbound.len();
            inbound.clear();
            dropped
        };
        if dropped > 0 {
            tracing::debug!(channel = %self.id(), dropped, "released undelivered inbound messages on close");
        }
        if let Some(peer) = self.peer.lock().take() {
            Self::post_peer_command(&peer, PeerCommand::TransitionClosed);
        }
    }

    fn do_begin_read(&self) {
        if self.read_in_progress.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inbound.lock().is_empty() {
            return;
        }
        self.read_in_progress.store(false, Ordering::SeqCst);
        self.read_inbound_now();
    }
}

impl Channel for LocalChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }

    fn channel_arc(&self) -> Option<Arc<dyn Channel>> {
        self.strong().map(|me| me as Arc<dyn Channel>)
    }

    fn compatible_event_loop(&self, event_loop: &EventLoop) -> bool {
        event_loop.kind() == ExecutorKind::Dedicated
    }

    /// 写入即入队对端缓冲；入队期间立起写入途中标记，
    /// 使对端据此把反向交付改走任务队列。
    fn transport_write(&self, msg: PipelineMessage, signal: &CompletionSignal) {
        if let Err(error) = self.core.check_writable() {
            drop(msg);
            signal.fail(error);
            return;
        }
        let Some(peer) = self.peer() else {
            drop(msg);
            signal.fail(CoreError::new(
                codes::NOT_CONNECTED,
                "channel has no peer",
            ));
            return;
        };
        if peer.state() == ChannelState::Closed {
            drop(msg);
            signal.fail(CoreError::new(
                codes::CHANNEL_CLOSED,
                "peer channel is closed",
            ));
            return;
        }
        self.write_in_progress.store(true, Ordering::SeqCst);
        peer.inbound.lock().push_back(msg);
        signal.complete();
        self.finish_peer_read(&peer);
        self.write_in_progress.store(false, Ordering::SeqCst);
    }
}
