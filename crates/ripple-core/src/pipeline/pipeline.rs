//! 热插拔流水线本体。
//!
//! # 设计背景（Why）
//! - Handler 链在运行期可增删，而事件分发位于热路径：以“写时复制 + 快照读取”换取
//!   分发零锁——每次装配变更生成新的链快照并递增纪元，进行中的事件继续走旧快照，
//!   变更只对后续事件生效。
//!
//! # 逻辑解析（How）
//! - 装配变更在互斥锁内完成“克隆、修改、整体替换”，读写锁仅覆盖指针交换一瞬；
//! - 入站事件从指定下标向尾部寻找下一个入站条目，出站操作向头部寻找上一个出站条目；
//!   两端落空时分别进入尾部兜底（未处理消息/异常交还通道）与头部终点（转入传输钩子）；
//! - 出站操作允许从任意线程发起：发起线程不在通道的事件循环内时，整个操作连同快照
//!   捕获一起转投循环执行，保证 Handler 线程封闭。
//!
//! # 契约说明（What）
//! - **纪元语义**：任何装配变更递增 `epoch`，观察到纪元不变即可断定链未变；
//! - **命名唯一**：同名条目装配失败；同一实例重复装配须显式声明可复用；
//! - **入站入口**：`fire_*` 必须在通道的事件循环线程上调用，通常由传输钩子触发。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::channel::{Channel, TransportAddress};
use crate::error::{CoreError, Result, codes};
use crate::message::PipelineMessage;
use crate::signal::CompletionSignal;

use super::context::HandlerContext;
use super::handler::{InboundHandler, OutboundHandler};
use super::internal::{ChainSnapshot, HandlerEntry, InboundOp, OutboundOp};

/// 通道事件的装配与传播骨架。
pub struct ChannelPipeline {
    self_ref: Weak<ChannelPipeline>,
    channel: spin::Mutex<Option<Weak<dyn Channel>>>,
    chain: spin::RwLock<ChainSnapshot>,
    epoch: AtomicU64,
    /// 串行化装配变更；分发路径不经过此锁。
    mutation: spin::Mutex<()>,
}

impl ChannelPipeline {
    /// 新建空流水线。
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            channel: spin::Mutex::new(None),
            chain: spin::RwLock::new(Arc::new(Vec::new())),
            epoch: AtomicU64::new(0),
            mutation: spin::Mutex::new(()),
        })
    }

    /// 由通道构造器回填所属通道的弱引用。
    pub fn bind_channel(&self, channel: Weak<dyn Channel>) {
        *self.channel.lock() = Some(channel);
    }

    /// 所属通道；通道析构后返回 `None`。
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.channel.lock().as_ref().and_then(Weak::upgrade)
    }

    /// 当前装配纪元。
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// 自头部起的条目名称列表。
    pub fn handler_names(&self) -> Vec<Cow<'static, str>> {
        self.snapshot().iter().map(|entry| entry.name.clone()).collect()
    }

    // ---- 装配 ----

    /// 追加入站条目到尾部。
    pub fn add_inbound_last(
        &self,
        name: impl Into<Cow<'static, str>>,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<()> {
        let name = name.into();
        self.mutate(move |chain| {
            Self::check_inbound_admission(chain, &name, &handler)?;
            chain.push(HandlerEntry::inbound(name, handler));
            Ok(())
        })
    }

    /// 插入入站条目到头部。
    pub fn add_inbound_first(
        &self,
        name: impl Into<Cow<'static, str>>,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<()> {
        let name = name.into();
        self.mutate(move |chain| {
            Self::check_inbound_admission(chain, &name, &handler)?;
            chain.insert(0, HandlerEntry::inbound(name, handler));
            Ok(())
        })
    }

    /// 追加出站条目到尾部。
    pub fn add_outbound_last(
        &self,
        name: impl Into<Cow<'static, str>>,
        handler: Arc<dyn OutboundHandler>,
    ) -> Result<()> {
        let name = name.into();
        self.mutate(move |chain| {
            Self::check_outbound_admission(chain, &name, &handler)?;
            chain.push(HandlerEntry::outbound(name, handler));
            Ok(())
        })
    }

    /// 插入出站条目到头部。
    pub fn add_outbound_first(
        &self,
        name: impl Into<Cow<'static, str>>,
        handler: Arc<dyn OutboundHandler>,
    ) -> Result<()> {
        let name = name.into();
        self.mutate(move |chain| {
            Self::check_outbound_admission(chain, &name, &handler)?;
            chain.insert(0, HandlerEntry::outbound(name, handler));
            Ok(())
        })
    }

    /// 按名称移除条目。
    pub fn remove(&self, name: &str) -> Result<()> {
        self.mutate(|chain| {
            let index = chain
                .iter()
                .position(|entry| entry.name == name)
                .ok_or_else(|| not_found(name))?;
            chain.remove(index);
            Ok(())
        })
    }

    /// 按名称原位替换入站条目。
    pub fn replace_inbound(&self, name: &str, handler: Arc<dyn InboundHandler>) -> Result<()> {
        self.mutate(move |chain| {
            let index = chain
                .iter()
                .position(|entry| entry.name == name && entry.inbound.is_some())
                .ok_or_else(|| not_found(name))?;
            chain[index].inbound = Some(handler);
            Ok(())
        })
    }

    /// 按名称原位替换出站条目。
    pub fn replace_outbound(&self, name: &str, handler: Arc<dyn OutboundHandler>) -> Result<()> {
        self.mutate(move |chain| {
            let index = chain
                .iter()
                .position(|entry| entry.name == name && entry.outbound.is_some())
                .ok_or_else(|| not_found(name))?;
            chain[index].outbound = Some(handler);
            Ok(())
        })
    }

    fn mutate(&self, apply: impl FnOnce(&mut Vec<HandlerEntry>) -> Result<()>) -> Result<()> {
        let _guard = self.mutation.lock();
        let mut next: Vec<HandlerEntry> = (*self.snapshot()).clone();
        apply(&mut next)?;
        *self.chain.write() = Arc::new(next);
        self.epoch.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn check_inbound_admission(
        chain: &[HandlerEntry],
        name: &str,
        handler: &Arc<dyn InboundHandler>,
    ) -> Result<()> {
        Self::check_name(chain, name)?;
        let duplicated = chain.iter().any(|entry| {
            entry
                .inbound
                .as_ref()
                .is_some_and(|existing| Arc::ptr_eq(existing, handler))
        });
        if duplicated && !handler.is_reusable() {
            return Err(CoreError::new(
                codes::HANDLER_NOT_REUSABLE,
                "handler instance is already installed and not marked reusable",
            ));
        }
        Ok(())
    }

    fn check_outbound_admission(
        chain: &[HandlerEntry],
        name: &str,
        handler: &Arc<dyn OutboundHandler>,
    ) -> Result<()> {
        Self::check_name(chain, name)?;
        let duplicated = chain.iter().any(|entry| {
            entry
                .outbound
                .as_ref()
                .is_some_and(|existing| Arc::ptr_eq(existing, handler))
        });
        if duplicated && !handler.is_reusable() {
            return Err(CoreError::new(
                codes::HANDLER_NOT_REUSABLE,
                "handler instance is already installed and not marked reusable",
            ));
        }
        Ok(())
    }

    fn check_name(chain: &[HandlerEntry], name: &str) -> Result<()> {
        if chain.iter().any(|entry| entry.name == name) {
            return Err(CoreError::new(
                codes::DUPLICATE_NAME,
                alloc::format!("handler name `{name}` is already taken"),
            ));
        }
        Ok(())
    }

    // ---- 入站入口（事件循环线程） ----

    /// 触发注册事件。
    pub fn fire_channel_registered(&self) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::Registered);
    }

    /// 触发反注册事件。
    pub fn fire_channel_unregistered(&self) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::Unregistered);
    }

    /// 触发激活事件。
    pub fn fire_channel_active(&self) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::Active);
    }

    /// 触发失活事件。
    pub fn fire_channel_inactive(&self) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::Inactive);
    }

    /// 投递一条入站消息。
    pub fn fire_read(&self, msg: PipelineMessage) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::Read(msg));
    }

    /// 宣告一轮读取批次结束。
    pub fn fire_read_complete(&self) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::ReadComplete);
    }

    /// 投递一条入站异常。
    pub fn fire_exception(&self, error: CoreError) {
        self.invoke_inbound_from(&self.snapshot(), 0, InboundOp::Exception(error));
    }

    // ---- 出站入口（任意线程） ----

    /// 绑定本地地址。
    pub fn bind(&self, addr: TransportAddress) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.submit_outbound(OutboundOp::Bind(addr, signal.clone()));
        signal
    }

    /// 连接远端。
    pub fn connect(&self, remote: TransportAddress) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.submit_outbound(OutboundOp::Connect(remote, signal.clone()));
        signal
    }

    /// 断开连接。
    pub fn disconnect(&self) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.submit_outbound(OutboundOp::Disconnect(signal.clone()));
        signal
    }

    /// 关闭通道。
    pub fn close(&self) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.submit_outbound(OutboundOp::Close(signal.clone()));
        signal
    }

    /// 请求脱离事件循环；头部终点恒定失败。
    pub fn deregister(&self) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.submit_outbound(OutboundOp::Deregister(signal.clone()));
        signal
    }

    /// 续订一轮读取。
    pub fn begin_read(&self) {
        self.submit_outbound(OutboundOp::BeginRead);
    }

    /// 提交一条出站消息。
    pub fn write(&self, msg: PipelineMessage) -> CompletionSignal {
        let signal = CompletionSignal::new();
        self.submit_outbound(OutboundOp::Write(msg, signal.clone()));
        signal
    }

    /// 冲刷出站缓冲。
    pub fn flush(&self) {
        self.submit_outbound(OutboundOp::Flush);
    }

    // ---- 分发内部 ----

    pub(super) fn snapshot(&self) -> ChainSnapshot {
        Arc::clone(&self.chain.read())
    }

    fn submit_outbound(&self, op: OutboundOp) {
        let Some(channel) = self.channel() else {
            op.abort(OutboundOp::channel_gone());
            return;
        };
        if let Some(event_loop) = channel.event_loop() {
            if !event_loop.in_event_loop() {
                if let Some(me) = self.self_ref.upgrade() {
                    event_loop.execute(Box::new(move || me.run_outbound_now(op)));
                    return;
                }
            }
        }
        self.run_outbound_now(op);
    }

    fn run_outbound_now(&self, op: OutboundOp) {
        let snapshot = self.snapshot();
        let from = snapshot.len();
        self.invoke_outbound_from(&snapshot, from, op);
    }

    /// 自 `from` 起向尾部寻找下一个入站条目并调用；落空进入尾部兜底。
    pub(super) fn invoke_inbound_from(&self, snapshot: &ChainSnapshot, from: usize, op: InboundOp) {
        let mut index = from;
        while index < snapshot.len() {
            if let Some(handler) = snapshot[index].inbound.clone() {
                let ctx = HandlerContext::new(self, snapshot, index);
                match op {
                    InboundOp::Registered => handler.on_channel_registered(&ctx),
                    InboundOp::Unregistered => handler.on_channel_unregistered(&ctx),
                    InboundOp::Active => handler.on_channel_active(&ctx),
                    InboundOp::Inactive => handler.on_channel_inactive(&ctx),
                    InboundOp::Read(msg) => handler.on_read(&ctx, msg),
                    InboundOp::ReadComplete => handler.on_read_complete(&ctx),
                    InboundOp::Exception(error) => handler.on_exception(&ctx, error),
                }
                return;
            }
            index += 1;
        }
        match op {
            InboundOp::Read(msg) => {
                if let Some(channel) = self.channel() {
                    channel.on_unhandled_message(msg);
                }
            }
            InboundOp::Exception(error) => {
                if let Some(channel) = self.channel() {
                    channel.on_unhandled_exception(error);
                }
            }
            _ => {}
        }
    }

    /// 自 `from` 起向头部寻找上一个出站条目并调用；落空进入头部终点。
    pub(super) fn invoke_outbound_from(
        &self,
        snapshot: &ChainSnapshot,
        from: usize,
        op: OutboundOp,
    ) {
        let mut index = from;
        while index > 0 {
            index -= 1;
            if let Some(handler) = snapshot[index].outbound.clone() {
                let ctx = HandlerContext::new(self, snapshot, index);
                match op {
                    OutboundOp::Bind(addr, signal) => handler.on_bind(&ctx, addr, signal),
                    OutboundOp::Connect(remote, signal) => handler.on_connect(&ctx, remote, signal),
                    OutboundOp::Disconnect(signal) => handler.on_disconnect(&ctx, signal),
                    OutboundOp::Close(signal) => handler.on_close(&ctx, signal),
                    OutboundOp::Deregister(signal) => handler.on_deregister(&ctx, signal),
                    OutboundOp::BeginRead => handler.on_begin_read(&ctx),
                    OutboundOp::Write(msg, signal) => handler.on_write(&ctx, msg, signal),
                    OutboundOp::Flush => handler.on_flush(&ctx),
                }
                return;
            }
        }
        self.head_terminal(op);
    }

    /// 头部终点：把出站操作转入传输钩子。
    fn head_terminal(&self, op: OutboundOp) {
        if let OutboundOp::Deregister(signal) = op {
            signal.fail(CoreError::new(
                codes::DEREGISTER_UNSUPPORTED,
                "channels stay on their event loop for life",
            ));
            return;
        }
        let Some(channel) = self.channel() else {
            op.abort(OutboundOp::channel_gone());
            return;
        };
        match op {
            OutboundOp::Bind(addr, signal) => channel.transport_bind(addr, &signal),
            OutboundOp::Connect(remote, signal) => channel.transport_connect(remote, &signal),
            OutboundOp::Disconnect(signal) => channel.transport_disconnect(&signal),
            OutboundOp::Close(signal) => channel.transport_close(&signal),
            OutboundOp::BeginRead => channel.transport_begin_read(),
            OutboundOp::Write(msg, signal) => channel.transport_write(msg, &signal),
            OutboundOp::Flush => channel.transport_flush(),
            OutboundOp::Deregister(_) => {}
        }
    }
}

impl core::fmt::Debug for ChannelPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelPipeline")
            .field("epoch", &self.epoch())
            .field("handlers", &self.handler_names())
            .finish()
    }
}

fn not_found(name: &str) -> CoreError {
    CoreError::new(
        codes::HANDLER_NOT_FOUND,
        alloc::format!("no handler named `{name}`"),
    )
}
