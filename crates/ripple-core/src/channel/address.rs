//! 进程内传输地址。
//!
//! # 设计背景（Why）
//! - 本地传输没有套接字地址，监听方与连接方通过注册表内的逻辑地址汇合；
//!   地址需要可排序，以便注册表使用有序映射维护绑定关系。

use alloc::borrow::Cow;
use core::fmt;

/// 传输层逻辑地址。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum TransportAddress {
    /// 具名地址，由调用方指定。
    Named(Cow<'static, str>),
    /// 注册表分配的匿名地址。
    Ephemeral(u64),
    /// 请求注册表代为分配地址的占位符，绑定成功后被实际地址替换。
    Any,
}

impl TransportAddress {
    /// 以静态或动态字符串构造具名地址。
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        TransportAddress::Named(name.into())
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportAddress::Named(name) => write!(f, "local:{name}"),
            TransportAddress::Ephemeral(seq) => write!(f, "local:ephemeral-{seq}"),
            TransportAddress::Any => f.write_str("local:*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_for_diagnostics() {
        assert_eq!(
            alloc::format!("{}", TransportAddress::named("worker")),
            "local:worker"
        );
        assert_eq!(
            alloc::format!("{}", TransportAddress::Ephemeral(7)),
            "local:ephemeral-7"
        );
        assert_eq!(alloc::format!("{}", TransportAddress::Any), "local:*");
    }
}
