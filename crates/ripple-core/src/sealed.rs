//! 内部 sealed 模块，用于控制契约 Trait 的外部扩展边界。
//!
//! # 设计背景（Why）
//! - 内核向外暴露多个可实现的 Trait（[`crate::Channel`]、[`crate::InboundHandler`] 等），
//!   需要在 SemVer 框架下保留为它们追加默认方法或强化约束的演进空间。
//!
//! # 逻辑解析（How）
//! - 定义私有 Trait `Sealed` 并提供 blanket 实现；公开 Trait 通过
//!   `: crate::sealed::Sealed` 间接依赖该标记。
//!
//! # 契约说明（What）
//! - `Sealed` 无需调用方显式实现；任意类型默认满足该约束。
//! - 当前不限制实现者集合；若未来收紧条件，需同步发布兼容性公告。
pub(crate) trait Sealed {}

impl<T: ?Sized> Sealed for T {}
