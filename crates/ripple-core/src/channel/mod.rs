//! 通道契约：标识、地址、状态机、配置、传输钩子与可复用生命周期内核。

mod address;
mod config;
mod core;
mod driver;
mod state;

pub use address::TransportAddress;
pub use config::{ChannelConfig, ChannelMetadata};
pub use self::core::ChannelCore;
pub use driver::{Channel, TransportDriver};
pub use state::{ChannelId, ChannelState};
