//! 流水线内部的事件载体与链表条目。

use alloc::borrow::Cow;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::channel::TransportAddress;
use crate::error::{CoreError, codes};
use crate::message::PipelineMessage;
use crate::signal::CompletionSignal;

use super::handler::{InboundHandler, OutboundHandler};

/// 链上的一个具名条目；每个条目恰好占据入站或出站一个方向。
#[derive(Clone)]
pub(super) struct HandlerEntry {
    pub(super) name: Cow<'static, str>,
    pub(super) inbound: Option<Arc<dyn InboundHandler>>,
    pub(super) outbound: Option<Arc<dyn OutboundHandler>>,
}

impl HandlerEntry {
    pub(super) fn inbound(name: Cow<'static, str>, handler: Arc<dyn InboundHandler>) -> Self {
        Self {
            name,
            inbound: Some(handler),
            outbound: None,
        }
    }

    pub(super) fn outbound(name: Cow<'static, str>, handler: Arc<dyn OutboundHandler>) -> Self {
        Self {
            name,
            inbound: None,
            outbound: Some(handler),
        }
    }
}

/// 不可变链快照；事件在发起时捕获快照，装配变更只影响后续事件。
pub(super) type ChainSnapshot = Arc<Vec<HandlerEntry>>;

/// 入站事件的统一载体。
pub(super) enum InboundOp {
    Registered,
    Unregistered,
    Active,
    Inactive,
    Read(PipelineMessage),
    ReadComplete,
    Exception(CoreError),
}

/// 出站操作的统一载体。
pub(super) enum OutboundOp {
    Bind(TransportAddress, CompletionSignal),
    Connect(TransportAddress, CompletionSignal),
    Disconnect(CompletionSignal),
    Close(CompletionSignal),
    Deregister(CompletionSignal),
    BeginRead,
    Write(PipelineMessage, CompletionSignal),
    Flush,
}

impl OutboundOp {
    /// 操作无法继续传播时的统一失败处置：定格信号并释放载荷。
    pub(super) fn abort(self, error: CoreError) {
        match self {
            OutboundOp::Bind(_, signal)
            | OutboundOp::Connect(_, signal)
            | OutboundOp::Disconnect(signal)
            | OutboundOp::Close(signal)
            | OutboundOp::Deregister(signal) => {
                signal.fail(error);
            }
            OutboundOp::Write(msg, signal) => {
                drop(msg);
                signal.fail(error);
            }
            OutboundOp::BeginRead | OutboundOp::Flush => {}
        }
    }

    /// 构造通道缺失时的标准错误。
    pub(super) fn channel_gone() -> CoreError {
        CoreError::new(codes::CHANNEL_CLOSED, "pipeline has no live channel")
    }
}
