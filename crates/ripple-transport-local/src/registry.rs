//! 本地地址注册表。
//!
//! # 设计背景（Why）
//! - 同进程传输没有内核套接字表可查，监听方与连接方需要一个共同的汇合点。
//!   注册表作为显式实例由调用方创建并注入，不使用进程级全局状态，
//!   多个互不相关的测试或子系统可以各持一张表互不干扰。
//!
//! # 契约说明（What）
//! - 绑定以弱引用登记，通道析构后条目自动失效并可被同名绑定复用；
//! - 监听绑定与端点绑定共享命名空间：连接只会与监听绑定汇合，
//!   命中端点绑定与命中空位一样按连接拒绝处理。

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU64, Ordering};

use ripple_core::{CoreError, Result, TransportAddress, codes};

use crate::channel::LocalChannel;
use crate::server::LocalServerChannel;

/// 本地传输的运行参数。
#[derive(Clone, Debug)]
pub struct LocalTransportOptions {
    /// 同一事件循环上内联读取交付的最大重入深度，超出后改为任务投递。
    pub max_read_stack_depth: usize,
}

impl Default for LocalTransportOptions {
    fn default() -> Self {
        Self {
            max_read_stack_depth: 8,
        }
    }
}

/// 一条地址绑定：监听方或点对点端点。
enum LocalBinding {
    Listener(Weak<LocalServerChannel>),
    Endpoint(Weak<LocalChannel>),
}

impl LocalBinding {
    fn is_live(&self) -> bool {
        match self {
            LocalBinding::Listener(server) => server.strong_count() > 0,
            LocalBinding::Endpoint(endpoint) => endpoint.strong_count() > 0,
        }
    }
}

/// 地址到通道的汇合表。
pub struct LocalRegistry {
    bindings: spin::Mutex<BTreeMap<TransportAddress, LocalBinding>>,
    ephemeral_seq: AtomicU64,
    options: LocalTransportOptions,
}

impl LocalRegistry {
    /// 以默认参数新建注册表。
    pub fn new() -> Arc<Self> {
        Self::with_options(LocalTransportOptions::default())
    }

    /// 以指定参数新建注册表。
    pub fn with_options(options: LocalTransportOptions) -> Arc<Self> {
        Arc::new(Self {
            bindings: spin::Mutex::new(BTreeMap::new()),
            ephemeral_seq: AtomicU64::new(1),
            options,
        })
    }

    /// 运行参数。
    pub fn options(&self) -> &LocalTransportOptions {
        &self.options
    }

    /// 登记监听绑定，返回实际生效的地址。
    pub(crate) fn bind_listener(
        &self,
        addr: &TransportAddress,
        server: &Arc<LocalServerChannel>,
    ) -> Result<TransportAddress> {
        self.install(addr, LocalBinding::Listener(Arc::downgrade(server)))
    }

    /// 登记端点绑定，返回实际生效的地址。
    pub(crate) fn bind_endpoint(
        &self,
        addr: &TransportAddress,
        endpoint: &Arc<LocalChannel>,
    ) -> Result<TransportAddress> {
        self.install(addr, LocalBinding::Endpoint(Arc::downgrade(endpoint)))
    }

    fn install(&self, addr: &TransportAddress, binding: LocalBinding) -> Result<TransportAddress> {
        let actual = match addr {
            TransportAddress::Any => self.allocate_ephemeral(),
            other => other.clone(),
        };
        let mut bindings = self.bindings.lock();
        if bindings.get(&actual).is_some_and(LocalBinding::is_live) {
            return Err(CoreError::new(
                codes::ADDRESS_IN_USE,
                alloc::format!("address {actual} is already bound"),
            ));
        }
        bindings.insert(actual.clone(), binding);
        Ok(actual)
    }

    /// 查找地址上的活跃监听方。
    pub(crate) fn lookup_listener(&self, addr: &TransportAddress) -> Option<Arc<LocalServerChannel>> {
        match self.bindings.lock().get(addr)? {
            LocalBinding::Listener(server) => server.upgrade(),
            LocalBinding::Endpoint(_) => None,
        }
    }

    /// 解除一条绑定；地址未登记时为空操作。
    pub(crate) fn unregister(&self, addr: &TransportAddress) {
        self.bindings.lock().remove(addr);
    }

    fn allocate_ephemeral(&self) -> TransportAddress {
        TransportAddress::Ephemeral(self.ephemeral_seq.fetch_add(1, Ordering::Relaxed))
    }
}

impl core::fmt::Debug for LocalRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalRegistry")
            .field("bindings", &self.bindings.lock().len())
            .finish()
    }
}
