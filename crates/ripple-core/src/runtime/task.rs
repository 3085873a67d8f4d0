//! 任务形态定义。

use alloc::boxed::Box;

/// 提交给事件循环的一次性任务。
///
/// 任务必须 `Send`：提交方与执行方往往不在同一线程。
pub type Task = Box<dyn FnOnce() + Send + 'static>;
