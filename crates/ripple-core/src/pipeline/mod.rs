//! 流水线：通道事件的装配与传播骨架。
//!
//! 入站事件自头部流向尾部，出站操作自尾部流向头部；Handler 不显式转发即拦截。

mod context;
mod handler;
mod internal;
mod pipeline;

pub use context::HandlerContext;
pub use handler::{InboundHandler, OutboundHandler};
pub use pipeline::ChannelPipeline;
