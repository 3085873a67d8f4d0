//! 流水线消息体。
//!
//! # 设计背景（Why）
//! - 同一条通道内既要承载传输层字节，也要承载业务层对象（例如本地监听通道把“新连接”
//!   作为消息交给 acceptor Handler），因此需要通过 trait 对象屏蔽具体类型。
//!
//! # 所有权模型（How）
//! - 消息遵循移动语义：从队列出队即完成所有权转移，接收方要么继续向前转交
//!   （再次移动），要么丢弃（即释放）。“retain” 对应显式的应用层克隆，
//!   编译器会拒绝使用已被移动的消息，从根上消灭泄漏/双重释放问题。
//!
//! # 契约说明（What）
//! - `Buffer` 变体承载字节快照；`User` 变体承载任意 `Send + Sync` 业务对象；
//! - 创建 `User` 时调用方必须保证内部类型满足线程安全语义；
//! - 消费 `User` 前必须显式类型判定，转换失败时会原样归还消息。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

/// 轻量字节容器，适用于测试或小流量路径的快照。
pub type Bytes = Vec<u8>;

/// 统一承载网络层字节与业务层对象的流水线消息。
pub enum PipelineMessage {
    /// 字节缓冲。
    Buffer(Bytes),
    /// 业务消息。
    User(Box<dyn Any + Send + Sync>),
}

impl PipelineMessage {
    /// 以业务对象构造消息。
    pub fn user<T: Any + Send + Sync>(value: T) -> Self {
        PipelineMessage::User(Box::new(value))
    }

    /// 以字节快照构造消息。
    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        PipelineMessage::Buffer(bytes.into())
    }

    /// 尝试取出业务对象；类型不匹配或消息为字节缓冲时原样归还。
    pub fn downcast<T: Any + Send + Sync>(self) -> Result<T, PipelineMessage> {
        match self {
            PipelineMessage::User(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(PipelineMessage::User(boxed)),
            },
            other => Err(other),
        }
    }

    /// 只读访问业务对象。
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            PipelineMessage::User(boxed) => boxed.downcast_ref::<T>(),
            PipelineMessage::Buffer(_) => None,
        }
    }

    /// 是否为字节缓冲变体。
    pub fn is_buffer(&self) -> bool {
        matches!(self, PipelineMessage::Buffer(_))
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 刻意隐藏内部细节，避免在日志中泄漏载荷内容。
        match self {
            PipelineMessage::Buffer(bytes) => {
                f.debug_tuple("Buffer").field(&bytes.len()).finish()
            }
            PipelineMessage::User(_) => f.debug_tuple("User").field(&"<erased>").finish(),
        }
    }
}

impl From<Bytes> for PipelineMessage {
    fn from(bytes: Bytes) -> Self {
        PipelineMessage::Buffer(bytes)
    }
}
