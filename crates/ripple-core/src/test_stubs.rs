//! 通道与流水线契约的测试桩集合。
//!
//! # 设计定位（Why）
//! - 流水线与生命周期编排的测试反复需要“能记录发生了什么”的最小通道与 Handler；
//!   各测试文件重复手写桩类型既冗余又容易在契约调整时漏改，统一出口后接口变更
//!   会在此处集中暴露编译错误。
//!
//! # 使用方式（How）
//! - 内核自身的单元测试与下游传输 crate 的集成测试均可引用本模块；
//! - 桩对象只记录调用轨迹，不产生 IO 副作用，适合 `no_std + alloc` 环境。
//!
//! # 契约说明（What）
//! - 桩类型仅面向测试与示例环境；生产代码若引用应显式说明原因。

pub mod pipeline {
    //! 记录事件轨迹的 Handler 桩。

    use alloc::borrow::Cow;
    use alloc::string::String;
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use crate::error::CoreError;
    use crate::message::PipelineMessage;
    use crate::pipeline::{HandlerContext, InboundHandler, OutboundHandler};
    use crate::signal::CompletionSignal;
    use crate::channel::TransportAddress;

    /// 多个桩共享的事件轨迹。
    pub type EventLog = Arc<spin::Mutex<Vec<String>>>;

    /// 新建空轨迹。
    pub fn event_log() -> EventLog {
        Arc::new(spin::Mutex::new(Vec::new()))
    }

    /// 记录全部入站事件并继续转发的 Handler。
    pub struct RecordingInbound {
        label: Cow<'static, str>,
        log: EventLog,
    }

    impl RecordingInbound {
        /// 以标签与共享轨迹构造。
        pub fn new(label: impl Into<Cow<'static, str>>, log: EventLog) -> Arc<Self> {
            Arc::new(Self {
                label: label.into(),
                log,
            })
        }

        fn record(&self, event: &str) {
            self.log
                .lock()
                .push(alloc::format!("{}:{event}", self.label));
        }
    }

    impl InboundHandler for RecordingInbound {
        fn on_channel_registered(&self, ctx: &HandlerContext<'_>) {
            self.record("registered");
            ctx.fire_channel_registered();
        }

        fn on_channel_unregistered(&self, ctx: &HandlerContext<'_>) {
            self.record("unregistered");
            ctx.fire_channel_unregistered();
        }

        fn on_channel_active(&self, ctx: &HandlerContext<'_>) {
            self.record("active");
            ctx.fire_channel_active();
        }

        fn on_channel_inactive(&self, ctx: &HandlerContext<'_>) {
            self.record("inactive");
            ctx.fire_channel_inactive();
        }

        fn on_read(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage) {
            self.record("read");
            ctx.fire_read(msg);
        }

        fn on_read_complete(&self, ctx: &HandlerContext<'_>) {
            self.record("read_complete");
            ctx.fire_read_complete();
        }

        fn on_exception(&self, ctx: &HandlerContext<'_>, error: CoreError) {
            self.record("exception");
            ctx.fire_exception(error);
        }
    }

    /// 记录全部出站操作并继续转发的 Handler。
    pub struct RecordingOutbound {
        label: Cow<'static, str>,
        log: EventLog,
    }

    impl RecordingOutbound {
        /// 以标签与共享轨迹构造。
        pub fn new(label: impl Into<Cow<'static, str>>, log: EventLog) -> Arc<Self> {
            Arc::new(Self {
                label: label.into(),
                log,
            })
        }

        fn record(&self, event: &str) {
            self.log
                .lock()
                .push(alloc::format!("{}:{event}", self.label));
        }
    }

    impl OutboundHandler for RecordingOutbound {
        fn on_bind(
            &self,
            ctx: &HandlerContext<'_>,
            addr: TransportAddress,
            signal: CompletionSignal,
        ) {
            self.record("bind");
            ctx.bind(addr, signal);
        }

        fn on_connect(
            &self,
            ctx: &HandlerContext<'_>,
            remote: TransportAddress,
            signal: CompletionSignal,
        ) {
            self.record("connect");
            ctx.connect(remote, signal);
        }

        fn on_disconnect(&self, ctx: &HandlerContext<'_>, signal: CompletionSignal) {
            self.record("disconnect");
            ctx.disconnect(signal);
        }

        fn on_close(&self, ctx: &HandlerContext<'_>, signal: CompletionSignal) {
            self.record("close");
            ctx.close(signal);
        }

        fn on_begin_read(&self, ctx: &HandlerContext<'_>) {
            self.record("begin_read");
            ctx.begin_read();
        }

        fn on_write(
            &self,
            ctx: &HandlerContext<'_>,
            msg: PipelineMessage,
            signal: CompletionSignal,
        ) {
            self.record("write");
            ctx.write(msg, signal);
        }

        fn on_flush(&self, ctx: &HandlerContext<'_>) {
            self.record("flush");
            ctx.flush();
        }
    }
}

pub mod channel {
    //! 无 IO 的最小通道桩。

    use alloc::sync::{Arc, Weak};
    use alloc::vec::Vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use crate::channel::{Channel, ChannelCore, ChannelMetadata, TransportDriver, TransportAddress};
    use crate::error::Result;
    use crate::message::PipelineMessage;

    /// 把写入收进内存、统计读取续订次数的通道桩。
    pub struct StubChannel {
        self_ref: Weak<StubChannel>,
        core: ChannelCore,
        writes: spin::Mutex<Vec<PipelineMessage>>,
        unhandled: spin::Mutex<Vec<PipelineMessage>>,
        begin_reads: AtomicUsize,
    }

    impl StubChannel {
        /// 新建通道桩并装好流水线回指。
        pub fn new() -> Arc<Self> {
            let channel = Arc::new_cyclic(|self_ref| Self {
                self_ref: self_ref.clone(),
                core: ChannelCore::new(ChannelMetadata::default()),
                writes: spin::Mutex::new(Vec::new()),
                unhandled: spin::Mutex::new(Vec::new()),
                begin_reads: AtomicUsize::new(0),
            });
            let weak: Weak<dyn Channel> = Arc::downgrade(&channel) as Weak<dyn Channel>;
            channel.core.pipeline().bind_channel(weak);
            channel
        }

        /// 直接把通道推入 Active，跳过注册流程。
        pub fn activate(self: &Arc<Self>) {
            let me: Arc<dyn Channel> = Arc::clone(self) as Arc<dyn Channel>;
            self.core.set_active(&me);
        }

        /// 取走累计的出站写入。
        pub fn take_writes(&self) -> Vec<PipelineMessage> {
            core::mem::take(&mut *self.writes.lock())
        }

        /// 取走抵达尾部仍未被消费的入站消息。
        pub fn take_unhandled(&self) -> Vec<PipelineMessage> {
            core::mem::take(&mut *self.unhandled.lock())
        }

        /// 读取续订被触发的次数。
        pub fn begin_read_count(&self) -> usize {
            self.begin_reads.load(Ordering::SeqCst)
        }
    }

    impl TransportDriver for StubChannel {
        fn do_bind(&self, addr: &TransportAddress) -> Result<TransportAddress> {
            Ok(addr.clone())
        }

        fn do_begin_read(&self) {
            self.begin_reads.fetch_add(1, Ordering::SeqCst);
        }

        fn do_write(&self, msg: PipelineMessage) -> Result<()> {
            self.writes.lock().push(msg);
            Ok(())
        }
    }

    impl Channel for StubChannel {
        fn core(&self) -> &ChannelCore {
            &self.core
        }

        fn channel_arc(&self) -> Option<Arc<dyn Channel>> {
            self.self_ref.upgrade().map(|me| me as Arc<dyn Channel>)
        }

        fn on_unhandled_message(&self, msg: PipelineMessage) {
            self.unhandled.lock().push(msg);
        }
    }
}
