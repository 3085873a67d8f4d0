//! 传输驱动钩子与通道门面契约。
//!
//! # 设计背景（Why）
//! - 生命周期编排（状态迁移、事件触发、信号定格）对所有传输完全一致，真正因传输而异的
//!   只有少量钩子（如何注册、如何建立连接、字节去向）。二者以组合方式拆开：
//!   具体传输实现 [`TransportDriver`] 钩子并内嵌一份 [`ChannelCore`]，
//!   [`Channel`] 的默认方法把两者缝合成完整门面。
//!
//! # 逻辑解析（How）
//! - 用户侧操作（bind/connect/write 等）一律从流水线尾部入列，经出站 Handler 链抵达
//!   头部终点，再由 [`ChannelCore`] 调度对应的 `do_*` 钩子；
//! - `transport_*` 方法是头部终点的落点，默认全部转交 [`ChannelCore`]，传输实现仅在
//!   需要特殊编排时覆写（如本地传输的写入与对端读取联动）。
//!
//! # 契约说明（What）
//! - 所有 `do_*` 钩子与 `transport_*` 方法都只会在通道注册的事件循环线程上被调用；
//! - `channel_arc` 必须返回指向自身的共享指针（通常由 `Arc::new_cyclic` 留存的
//!   弱引用升级而来），通道进入析构后返回 `None`。

use alloc::sync::Arc;

use crate::error::{CoreError, Result, codes};
use crate::message::PipelineMessage;
use crate::pipeline::ChannelPipeline;
use crate::runtime::EventLoop;
use crate::signal::CompletionSignal;

use super::address::TransportAddress;
use super::config::{ChannelConfig, ChannelMetadata};
use super::core::ChannelCore;
use super::state::{ChannelId, ChannelState};

/// 具体传输需要实现的生命周期钩子。
///
/// 除文档另行说明外，默认实现表示“该传输不支持此操作”。
pub trait TransportDriver: Send + Sync + 'static {
    /// 注册期钩子，失败将导致注册失败并关闭通道。
    fn do_register(&self) -> Result<()> {
        Ok(())
    }

    /// 注册事件触发完毕后的追加编排点（如客户端通道在此继续连接流程）。
    fn post_register(&self) {}

    /// 绑定本地地址，返回实际生效的地址（占位地址在此被解析）。
    fn do_bind(&self, _addr: &TransportAddress) -> Result<TransportAddress> {
        Err(CoreError::new(
            codes::UNSUPPORTED_OPERATION,
            "transport does not support bind",
        ))
    }

    /// 发起连接。成功路径上由传输在连接就绪时定格 `signal`；
    /// 返回 `Err` 表示同步失败，编排层将定格信号并关闭通道。
    fn do_connect(&self, _remote: &TransportAddress, _signal: &CompletionSignal) -> Result<()> {
        Err(CoreError::new(
            codes::UNSUPPORTED_OPERATION,
            "transport does not support connect",
        ))
    }

    /// 断开连接但保持注册，仅在 [`ChannelMetadata::has_disconnect`] 为真时被调用。
    fn do_disconnect(&self) -> Result<()> {
        Err(CoreError::new(
            codes::UNSUPPORTED_OPERATION,
            "transport does not support disconnect",
        ))
    }

    /// 释放传输资源。幂等性由编排层保证，钩子只会被调用一次。
    fn do_close(&self) {}

    /// 开始（或续订）一轮读取。
    fn do_begin_read(&self) {}

    /// 提交一条出站消息。
    fn do_write(&self, msg: PipelineMessage) -> Result<()> {
        drop(msg);
        Err(CoreError::new(
            codes::UNSUPPORTED_OPERATION,
            "transport does not support write",
        ))
    }

    /// 冲刷已提交的出站消息。对即时投递的传输为空操作。
    fn do_flush(&self) {}

    /// 绑定成功后是否立即进入 Active（监听型通道为真）。
    fn active_after_bind(&self) -> bool {
        false
    }
}

/// 通道门面：生命周期操作、流水线入口与状态观察的统一界面。
///
/// # 契约说明（What）
/// - 默认方法已实现全部编排逻辑，具体传输通常只需提供 [`Channel::core`] 与
///   [`Channel::channel_arc`]，并按需覆写 `transport_*` 或尾部兜底方法；
/// - 所有返回 [`CompletionSignal`] 的操作都是提交即返回，结果经信号观察。
pub trait Channel: TransportDriver + crate::sealed::Sealed {
    /// 可复用的生命周期内核。
    fn core(&self) -> &ChannelCore;

    /// 指向自身的共享指针；析构进行中返回 `None`。
    fn channel_arc(&self) -> Option<Arc<dyn Channel>>;

    /// 判定事件循环类型是否与本传输匹配。
    fn compatible_event_loop(&self, _event_loop: &EventLoop) -> bool {
        true
    }

    /// 通道标识。
    fn id(&self) -> ChannelId {
        self.core().id()
    }

    /// 当前生命周期状态。
    fn state(&self) -> ChannelState {
        self.core().state()
    }

    /// 是否处于 Active 状态。
    fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }

    /// 传输能力描述。
    fn metadata(&self) -> ChannelMetadata {
        self.core().metadata()
    }

    /// 配置快照。
    fn config(&self) -> ChannelConfig {
        self.core().config()
    }

    /// 通道的流水线。
    fn pipeline(&self) -> Arc<ChannelPipeline> {
        Arc::clone(self.core().pipeline())
    }

    /// 注册后的事件循环。
    fn event_loop(&self) -> Option<Arc<EventLoop>> {
        self.core().event_loop()
    }

    /// 本地地址（绑定或连接建立后可见）。
    fn local_address(&self) -> Option<TransportAddress> {
        self.core().local_address()
    }

    /// 对端地址（连接建立后可见）。
    fn remote_address(&self) -> Option<TransportAddress> {
        self.core().remote_address()
    }

    /// 通道关闭时定格的信号，适合挂接资源回收回调。
    fn close_signal(&self) -> CompletionSignal {
        self.core().close_signal()
    }

    /// 把通道注册到事件循环。每条通道终生只绑定一个循环。
    fn register(&self, event_loop: Arc<EventLoop>) -> CompletionSignal {
        match self.channel_arc() {
            Some(me) => self.core().register(me, event_loop),
            None => CompletionSignal::failed(CoreError::new(
                codes::CHANNEL_CLOSED,
                "channel is being dropped",
            )),
        }
    }

    /// 绑定本地地址（从流水线尾部入列）。
    fn bind(&self, addr: TransportAddress) -> CompletionSignal {
        self.pipeline().bind(addr)
    }

    /// 连接远端地址（从流水线尾部入列）。
    fn connect(&self, remote: TransportAddress) -> CompletionSignal {
        self.pipeline().connect(remote)
    }

    /// 断开连接；传输不支持半关闭时等价于 [`Channel::close`]。
    fn disconnect(&self) -> CompletionSignal {
        self.pipeline().disconnect()
    }

    /// 关闭通道，幂等。
    fn close(&self) -> CompletionSignal {
        self.pipeline().close()
    }

    /// 显式续订一轮读取，仅在关闭自动读取时需要。
    fn begin_read(&self) {
        self.pipeline().begin_read();
    }

    /// 提交一条出站消息。
    fn write(&self, msg: PipelineMessage) -> CompletionSignal {
        self.pipeline().write(msg)
    }

    /// 冲刷出站缓冲。
    fn flush(&self) {
        self.pipeline().flush();
    }

    /// 提交并立即冲刷。
    fn write_and_flush(&self, msg: PipelineMessage) -> CompletionSignal {
        let pipeline = self.pipeline();
        let signal = pipeline.write(msg);
        pipeline.flush();
        signal
    }

    /// 出站 bind 抵达流水线头部时的终点。
    fn transport_bind(&self, addr: TransportAddress, signal: &CompletionSignal) {
        match self.channel_arc() {
            Some(me) => self.core().transport_bind(&me, addr, signal),
            None => fail_dropped(signal),
        }
    }

    /// 出站 connect 抵达流水线头部时的终点。
    fn transport_connect(&self, remote: TransportAddress, signal: &CompletionSignal) {
        match self.channel_arc() {
            Some(me) => self.core().transport_connect(&me, remote, signal),
            None => fail_dropped(signal),
        }
    }

    /// 出站 disconnect 抵达流水线头部时的终点。
    fn transport_disconnect(&self, signal: &CompletionSignal) {
        match self.channel_arc() {
            Some(me) => self.core().transport_disconnect(&me, signal),
            None => fail_dropped(signal),
        }
    }

    /// 出站 close 抵达流水线头部时的终点。
    fn transport_close(&self, signal: &CompletionSignal) {
        match self.channel_arc() {
            Some(me) => self.core().transport_close(&me, signal),
            None => fail_dropped(signal),
        }
    }

    /// 出站 begin_read 抵达流水线头部时的终点。
    fn transport_begin_read(&self) {
        if let Some(me) = self.channel_arc() {
            self.core().transport_begin_read(&me);
        }
    }

    /// 出站 write 抵达流水线头部时的终点。
    fn transport_write(&self, msg: PipelineMessage, signal: &CompletionSignal) {
        match self.channel_arc() {
            Some(me) => self.core().transport_write(&me, msg, signal),
            None => {
                drop(msg);
                fail_dropped(signal);
            }
        }
    }

    /// 出站 flush 抵达流水线头部时的终点。
    fn transport_flush(&self) {
        if let Some(me) = self.channel_arc() {
            self.core().transport_flush(&me);
        }
    }

    /// 入站消息穿过全部 Handler 仍未被消费时的尾部兜底。
    ///
    /// 默认记录调试日志后释放消息；确定性测试传输覆写此方法以捕获消息。
    fn on_unhandled_message(&self, msg: PipelineMessage) {
        tracing::debug!(channel = %self.id(), payload = ?msg, "inbound message reached tail unhandled, releasing");
        drop(msg);
    }

    /// 异常穿过全部 Handler 仍未被捕获时的尾部兜底。
    ///
    /// 异常进入通道的暂存槽位等待显式检取；尚未激活过的通道无法继续正常建连，
    /// 一并关闭。
    fn on_unhandled_exception(&self, error: CoreError) {
        self.core().note_unhandled_exception(error);
        if !self.core().was_ever_active() {
            self.close();
        }
    }
}

fn fail_dropped(signal: &CompletionSignal) {
    signal.fail(CoreError::new(
        codes::CHANNEL_CLOSED,
        "channel is being dropped",
    ));
}
