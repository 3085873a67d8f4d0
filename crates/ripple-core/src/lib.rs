#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![allow(private_bounds)]
#![doc = "ripple-core: 通道（Channel）、流水线（Pipeline）与事件循环（Event Loop）的传输内核契约。"]
#![doc = ""]
#![doc = "本 crate 不包含任何真实 I/O：协议编解码、TLS、代理握手等均为外部协作者，"]
#![doc = "它们以 Handler 的形式插入流水线。内核只负责三件事："]
#![doc = "1. 通道生命周期状态机（Open → Registered → Bound → Active → Closed）及其钩子契约；"]
#![doc = "2. 流水线的入站（头→尾）/出站（尾→头）事件传播；"]
#![doc = "3. 单线程协作式事件循环的即时任务与定时任务调度。"]
#![doc = ""]
#![doc = "== 内存分配依赖 =="]
#![doc = "`ripple-core` 定位于 `no_std + alloc` 场景：契约大量依赖 [`alloc`] 中的 `Box`、`Arc`、"]
#![doc = "`VecDeque` 等类型来支撑事件分发与任务队列。纯 `no_std`（无分配器）环境暂不支持。"]

extern crate alloc;

mod sealed;

pub mod channel;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod runtime;
pub mod signal;
pub mod test_stubs;
pub mod time;

pub use channel::{
    Channel, ChannelConfig, ChannelCore, ChannelId, ChannelMetadata, ChannelState,
    TransportAddress, TransportDriver,
};
pub use error::{CoreError, Result, codes};
pub use message::{Bytes, PipelineMessage};
pub use pipeline::{ChannelPipeline, HandlerContext, InboundHandler, OutboundHandler};
pub use runtime::{EventLoop, ExecutorKind, ScheduledHandle, Task};
pub use signal::{CompletionSignal, SignalState};
pub use time::{Clock, ManualClock};
#[cfg(feature = "std")]
pub use time::SystemClock;
