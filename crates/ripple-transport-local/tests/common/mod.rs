//! 本地传输集成测试的共享脚手架。
#![allow(dead_code)]

use std::sync::Arc;

use ripple_core::{
    Channel, Clock, EventLoop, ExecutorKind, HandlerContext, InboundHandler, PipelineMessage,
    SystemClock,
};
use ripple_transport_local::LocalChannel;

/// 新建一个由测试线程手动驱动的专属循环。
pub fn dedicated_loop() -> Arc<EventLoop> {
    EventLoop::new(
        ExecutorKind::Dedicated,
        Arc::new(SystemClock::new()) as Arc<dyn Clock>,
    )
}

/// 轮转排空所有循环，直到既有任务与其派生任务都被消化。
pub fn drive(loops: &[&Arc<EventLoop>]) {
    for _ in 0..32 {
        for event_loop in loops {
            event_loop.run_pending_tasks();
        }
    }
}

/// 把被接纳端注册到指定循环的 acceptor。
pub struct Acceptor {
    child_loop: Arc<EventLoop>,
    setup: Box<dyn Fn(&Arc<LocalChannel>) + Send + Sync>,
    children: Arc<spin::Mutex<Vec<Arc<LocalChannel>>>>,
}

impl Acceptor {
    pub fn new(
        child_loop: Arc<EventLoop>,
        setup: impl Fn(&Arc<LocalChannel>) + Send + Sync + 'static,
    ) -> (Arc<Self>, Arc<spin::Mutex<Vec<Arc<LocalChannel>>>>) {
        let children = Arc::new(spin::Mutex::new(Vec::new()));
        let acceptor = Arc::new(Self {
            child_loop,
            setup: Box::new(setup),
            children: Arc::clone(&children),
        });
        (acceptor, children)
    }
}

impl InboundHandler for Acceptor {
    fn on_read(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage) {
        match msg.downcast::<Arc<LocalChannel>>() {
            Ok(child) => {
                (self.setup)(&child);
                child.register(Arc::clone(&self.child_loop));
                self.children.lock().push(child);
            }
            Err(other) => ctx.fire_read(other),
        }
    }
}

/// 只囤积被接纳端、从不注册的 acceptor，用于连接悬置场景。
pub struct StallingAcceptor {
    children: Arc<spin::Mutex<Vec<Arc<LocalChannel>>>>,
}

impl StallingAcceptor {
    pub fn new() -> (Arc<Self>, Arc<spin::Mutex<Vec<Arc<LocalChannel>>>>) {
        let children = Arc::new(spin::Mutex::new(Vec::new()));
        let acceptor = Arc::new(Self {
            children: Arc::clone(&children),
        });
        (acceptor, children)
    }
}

impl InboundHandler for StallingAcceptor {
    fn on_read(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage) {
        match msg.downcast::<Arc<LocalChannel>>() {
            Ok(child) => self.children.lock().push(child),
            Err(other) => ctx.fire_read(other),
        }
    }
}

/// 收集字节帧的终端 Handler。
pub struct Collector {
    frames: Arc<spin::Mutex<Vec<Vec<u8>>>>,
}

impl Collector {
    pub fn new() -> (Arc<Self>, Arc<spin::Mutex<Vec<Vec<u8>>>>) {
        let frames = Arc::new(spin::Mutex::new(Vec::new()));
        let collector = Arc::new(Self {
            frames: Arc::clone(&frames),
        });
        (collector, frames)
    }
}

impl InboundHandler for Collector {
    fn on_read(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage) {
        match msg {
            PipelineMessage::Buffer(bytes) => self.frames.lock().push(bytes),
            other => ctx.fire_read(other),
        }
    }
}

/// 把收到的消息原样写回对端。
pub struct Echo;

impl InboundHandler for Echo {
    fn on_read(&self, ctx: &HandlerContext<'_>, msg: PipelineMessage) {
        if let Some(channel) = ctx.channel() {
            channel.write_and_flush(msg);
        }
    }
}
