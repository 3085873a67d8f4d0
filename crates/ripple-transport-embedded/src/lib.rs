#![deny(unsafe_code)]
#![doc = "ripple-transport-embedded: 面向 Handler 测试的确定性传输。"]
#![doc = ""]
#![doc = "事件循环嵌入调用方线程，时间由虚拟时钟手动推进；通道没有对端，"]
#![doc = "入站事件由测试显式灌入，出站结果在内存队列里逐条检取，"]
#![doc = "一条流水线的行为因此可以在单线程里逐步断言。"]

extern crate alloc;

mod channel;
mod event_loop;

pub use channel::EmbeddedChannel;
pub use event_loop::EmbeddedEventLoop;
