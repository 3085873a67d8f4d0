//! 事件循环运行时。
//!
//! 单线程协作式执行器：同一通道生命周期内的所有事件与任务都汇聚到
//! 它注册的事件循环上执行，从而以线程封闭代替细粒度加锁。

mod event_loop;
mod task;

pub use event_loop::{EventLoop, ExecutorKind, ScheduledHandle};
pub use task::Task;
