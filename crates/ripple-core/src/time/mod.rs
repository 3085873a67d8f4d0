//! 时间抽象。
//!
//! 事件循环的定时任务只依赖 [`Clock`] 契约，不直接触碰系统时钟，
//! 以便在确定性测试里用 [`ManualClock`] 手动推进时间。

mod clock;

pub use clock::{Clock, ManualClock};
#[cfg(feature = "std")]
pub use clock::SystemClock;
