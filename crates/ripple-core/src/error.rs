//! 内核统一错误域。
//!
//! # 设计背景（Why）
//! - 生命周期时序错误（未连接即写入、重复注册）、资源冲突（地址已占用、连接被拒绝）与
//!   未处理的流水线异常需要合流为稳定错误码，以便调用方与测试能执行精确分类，而不是解析
//!   错误消息字符串。
//! - 内核兼容 `no_std + alloc` 场景，因此错误类型仅依赖 `core::error::Error` 与 `alloc`。
//!
//! # 契约说明（What）
//! - `code` 始终为 `'static` 字符串，遵循 `<域>.<语义>` 约定，承载稳定语义；
//! - `message` 面向排障人员，可为静态或动态文本；
//! - `cause` 可选，暴露底层根因链路。
//!
//! # 风险提示（Trade-offs）
//! - 采用 `Cow<'static, str>` 保存消息，牺牲极少量堆分配换取动态拼接的灵活性；
//! - 错误不实现 `Clone`，需要共享时（如完成信号）以 `Arc<CoreError>` 形式传递。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::fmt;

/// 内核统一结果别名。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

/// 稳定错误码集合。
///
/// # 契约说明（What）
/// - 每个常量对应一类可机读的失败语义；新增错误码属于兼容性变更，删除或改写属于破坏性变更。
/// - 操作级失败（bind/connect/write）通过该操作自身的完成信号返回；
///   无归属失败（后台任务抛错）进入通道的 `last_error` 槽位。
pub mod codes {
    /// 通道与事件循环类型不兼容，注册被拒绝。
    pub const EXECUTOR_INCOMPATIBLE: &str = "executor.incompatible";
    /// 通道已绑定事件循环，重复注册。
    pub const ALREADY_REGISTERED: &str = "channel.already_registered";
    /// 操作要求通道先注册到事件循环。
    pub const NOT_REGISTERED: &str = "channel.not_registered";
    /// 通道已持有本地地址，重复绑定。
    pub const ALREADY_BOUND: &str = "channel.already_bound";
    /// 通道尚未进入 Active 状态，写入或断开被拒绝。
    pub const NOT_CONNECTED: &str = "channel.not_connected";
    /// 通道已关闭，任何后续操作都将失败。
    pub const CHANNEL_CLOSED: &str = "channel.closed";
    /// 通道在连接完成之前被关闭。
    pub const DISCONNECTED: &str = "channel.disconnected";
    /// 已有连接操作在途。
    pub const CONNECT_IN_PROGRESS: &str = "channel.connect_in_progress";
    /// 通道已处于连接状态。
    pub const ALREADY_CONNECTED: &str = "channel.already_connected";
    /// 通道的事件循环在注册后不可变，deregister 不受支持。
    pub const DEREGISTER_UNSUPPORTED: &str = "channel.deregister_unsupported";
    /// 具体传输未实现该钩子。
    pub const UNSUPPORTED_OPERATION: &str = "channel.unsupported_operation";
    /// 远端地址未在监听，连接被拒绝。
    pub const CONNECTION_REFUSED: &str = "connect.refused";
    /// 连接在配置的超时时间内未完成。
    pub const CONNECT_TIMEOUT: &str = "connect.timeout";
    /// 地址已被其他通道占用。
    pub const ADDRESS_IN_USE: &str = "registry.address_in_use";
    /// 流水线内 Handler 名称重复。
    pub const DUPLICATE_NAME: &str = "pipeline.duplicate_name";
    /// 同一 Handler 实例未标记可复用却被重复装配。
    pub const HANDLER_NOT_REUSABLE: &str = "pipeline.handler_not_reusable";
    /// 按名称检索 Handler 失败。
    pub const HANDLER_NOT_FOUND: &str = "pipeline.handler_not_found";
    /// 入站消息抵达流水线尾部仍未被消费。
    pub const UNHANDLED_MESSAGE: &str = "pipeline.unhandled_message";
    /// 异常抵达流水线尾部仍未被捕获。
    pub const UNHANDLED_EXCEPTION: &str = "pipeline.unhandled_exception";
}

/// `CoreError` 是内核跨层共享的稳定错误形态。
///
/// # 逻辑解析（How）
/// - 以 Builder 风格方法叠加底层原因，并通过 [`core::error::Error::source`] 暴露链路；
/// - 错误码与消息分离：`code` 供机读治理，`message` 供人读排障。
///
/// # 契约说明（What）
/// - **前置条件**：调用方必须使用 [`codes`] 模块或遵循 `<域>.<语义>` 约定的自定义码值；
/// - **后置条件**：返回的错误拥有独立所有权，可安全跨线程移动（`Send + Sync + 'static`）。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<Box<dyn core::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    /// 构造内核错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(
        mut self,
        cause: impl core::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 人类可读描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 底层原因（若有）。
    pub fn cause(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn core::error::Error + 'static))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl core::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.cause()
    }
}
