//! Handler 执行上下文。
//!
//! 上下文锚定当前 Handler 在链快照中的位置：入站转发从下一个条目继续，
//! 出站转发从上一个条目继续，保证事件不回流也不跳过。

use alloc::sync::Arc;

use crate::channel::{Channel, TransportAddress};
use crate::error::CoreError;
use crate::message::PipelineMessage;
use crate::runtime::EventLoop;
use crate::signal::CompletionSignal;

use super::internal::{ChainSnapshot, InboundOp, OutboundOp};
use super::pipeline::ChannelPipeline;

/// 传递给 Handler 回调的定位上下文。
pub struct HandlerContext<'a> {
    pipeline: &'a ChannelPipeline,
    snapshot: &'a ChainSnapshot,
    index: usize,
}

impl<'a> HandlerContext<'a> {
    pub(super) fn new(
        pipeline: &'a ChannelPipeline,
        snapshot: &'a ChainSnapshot,
        index: usize,
    ) -> Self {
        Self {
            pipeline,
            snapshot,
            index,
        }
    }

    /// 当前条目的装配名称。
    pub fn name(&self) -> &str {
        &self.snapshot[self.index].name
    }

    /// 所属流水线。
    pub fn pipeline(&self) -> &ChannelPipeline {
        self.pipeline
    }

    /// 所属通道；通道析构后返回 `None`。
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.pipeline.channel()
    }

    /// 通道注册的事件循环。
    pub fn event_loop(&self) -> Option<Arc<EventLoop>> {
        self.channel().and_then(|channel| channel.event_loop())
    }

    // ---- 入站转发（流向尾部） ----

    /// 向下一个入站条目转发注册事件。
    pub fn fire_channel_registered(&self) {
        self.forward_inbound(InboundOp::Registered);
    }

    /// 向下一个入站条目转发反注册事件。
    pub fn fire_channel_unregistered(&self) {
        self.forward_inbound(InboundOp::Unregistered);
    }

    /// 向下一个入站条目转发激活事件。
    pub fn fire_channel_active(&self) {
        self.forward_inbound(InboundOp::Active);
    }

    /// 向下一个入站条目转发失活事件。
    pub fn fire_channel_inactive(&self) {
        self.forward_inbound(InboundOp::Inactive);
    }

    /// 向下一个入站条目转发消息，所有权随之转移。
    pub fn fire_read(&self, msg: PipelineMessage) {
        self.forward_inbound(InboundOp::Read(msg));
    }

    /// 向下一个入站条目转发读取批次结束。
    pub fn fire_read_complete(&self) {
        self.forward_inbound(InboundOp::ReadComplete);
    }

    /// 向下一个入站条目转发异常。
    pub fn fire_exception(&self, error: CoreError) {
        self.forward_inbound(InboundOp::Exception(error));
    }

    // ---- 出站转发（流向头部） ----

    /// 向上一个出站条目转发绑定。
    pub fn bind(&self, addr: TransportAddress, signal: CompletionSignal) {
        self.forward_outbound(OutboundOp::Bind(addr, signal));
    }

    /// 向上一个出站条目转发连接。
    pub fn connect(&self, remote: TransportAddress, signal: CompletionSignal) {
        self.forward_outbound(OutboundOp::Connect(remote, signal));
    }

    /// 向上一个出站条目转发断开。
    pub fn disconnect(&self, signal: CompletionSignal) {
        self.forward_outbound(OutboundOp::Disconnect(signal));
    }

    /// 向上一个出站条目转发关闭。
    pub fn close(&self, signal: CompletionSignal) {
        self.forward_outbound(OutboundOp::Close(signal));
    }

    /// 向上一个出站条目转发脱离请求。
    pub fn deregister(&self, signal: CompletionSignal) {
        self.forward_outbound(OutboundOp::Deregister(signal));
    }

    /// 向上一个出站条目转发读取续订。
    pub fn begin_read(&self) {
        self.forward_outbound(OutboundOp::BeginRead);
    }

    /// 向上一个出站条目转发写入，所有权随之转移。
    pub fn write(&self, msg: PipelineMessage, signal: CompletionSignal) {
        self.forward_outbound(OutboundOp::Write(msg, signal));
    }

    /// 向上一个出站条目转发冲刷。
    pub fn flush(&self) {
        self.forward_outbound(OutboundOp::Flush);
    }

    fn forward_inbound(&self, op: InboundOp) {
        self.pipeline
            .invoke_inbound_from(self.snapshot, self.index + 1, op);
    }

    fn forward_outbound(&self, op: OutboundOp) {
        self.pipeline
            .invoke_outbound_from(self.snapshot, self.index, op);
    }
}
