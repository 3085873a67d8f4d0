//! Handler 契约。
//!
//! # 设计背景（Why）
//! - 事件传播采用“显式转发”语义：Handler 处理完毕后必须调用 `ctx.fire_*` 或对应
//!   出站转发方法才会触及下一个 Handler，什么都不做即拦截。默认方法体都是纯转发，
//!   因此 Handler 只需覆写自己关心的事件。
//!
//! # 契约说明（What）
//! - 所有回调均在通道的事件循环线程上执行，实现内部无需再做同步；
//! - 消息与异常的所有权随回调转移：不转发即由 Handler 负责其生命周期；
//! - 同一 Handler 实例默认不可装配到多条流水线，声明 `is_reusable` 为真后放开。

use crate::error::CoreError;
use crate::message::PipelineMessage;
use crate::signal::CompletionSignal;
use crate::channel::TransportAddress;

use super::context::HandlerContext;

/// 入站事件 Handler，事件自头部流向尾部。
pub trait InboundHandler: Send + Sync + 'static {
    /// 实例是否允许同时装配到多条流水线（要求内部无按通道状态）。
    fn is_reusable(&self) -> bool {
        false
    }

    /// 通道完成注册。
    fn on_channel_registered(&self, ctx: &HandlerContext<'_>) {
        ctx.fire_channel_registered();
    }

    /// 通道脱离事件循环（关闭路径末段）。
    fn on_channel_unregistered(&self, ctx: &HandlerContext<'_>) {
        ctx.fire_channel_unregistered();
    }

    /// 通道进入 Active，可以收发。
    fn on_channel_active(&self, ctx: &HandlerContext<'_>) {
        ctx.fire_channel_active();
    }

    /// 通道离开 Active。
    fn on_channel_inactive(&self, ctx: &HandlerContext<'_>) {
        ctx.fire_channel_inactive();
    }

    /// 一条入站消息抵达。所有权移交本回调。
    fn on_read(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage) {
        ctx.fire_read(msg);
    }

    /// 一轮读取批次结束。
    fn on_read_complete(&self, ctx: &HandlerContext<'_>) {
        ctx.fire_read_complete();
    }

    /// 入站异常抵达。不转发则异常止于此。
    fn on_exception(&self, ctx: &HandlerContext<'_>, error: CoreError) {
        ctx.fire_exception(error);
    }
}

/// 出站操作 Handler，操作自尾部流向头部。
pub trait OutboundHandler: Send + Sync + 'static {
    /// 同 [`InboundHandler::is_reusable`]。
    fn is_reusable(&self) -> bool {
        false
    }

    /// 绑定本地地址。
    fn on_bind(&self, ctx: &HandlerContext<'_>, addr: TransportAddress, signal: CompletionSignal) {
        ctx.bind(addr, signal);
    }

    /// 连接远端。
    fn on_connect(
        &self,
        ctx: &HandlerContext<'_>,
        remote: TransportAddress,
        signal: CompletionSignal,
    ) {
        ctx.connect(remote, signal);
    }

    /// 断开连接。
    fn on_disconnect(&self, ctx: &HandlerContext<'_>, signal: CompletionSignal) {
        ctx.disconnect(signal);
    }

    /// 关闭通道。
    fn on_close(&self, ctx: &HandlerContext<'_>, signal: CompletionSignal) {
        ctx.close(signal);
    }

    /// 请求脱离事件循环。本内核的通道终生绑定单循环，头部终点恒定失败。
    fn on_deregister(&self, ctx: &HandlerContext<'_>, signal: CompletionSignal) {
        ctx.deregister(signal);
    }

    /// 续订一轮读取。
    fn on_begin_read(&self, ctx: &HandlerContext<'_>) {
        ctx.begin_read();
    }

    /// 提交一条出站消息。所有权移交本回调。
    fn on_write(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage, signal: CompletionSignal) {
        ctx.write(msg, signal);
    }

    /// 冲刷出站缓冲。
    fn on_flush(&self, ctx: &HandlerContext<'_>) {
        ctx.flush();
    }
}
