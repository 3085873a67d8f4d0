#![deny(unsafe_code)]
#![doc = "ripple-transport-local: 同进程内存传输。"]
#![doc = ""]
#![doc = "监听方绑定逻辑地址进入显式注册表，连接方经注册表与之汇合；"]
#![doc = "写入直接入队对端缓冲，读取交付遵循与跨线程传输一致的事件循环封闭规则，"]
#![doc = "因此可以在不开真实套接字的情况下验证完整的通道编排逻辑。"]

extern crate alloc;

mod channel;
mod registry;
mod server;

pub use channel::LocalChannel;
pub use registry::{LocalRegistry, LocalTransportOptions};
pub use server::LocalServerChannel;
