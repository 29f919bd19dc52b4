use std::fmt;
use std::marker::PhantomData;

use crate::error::BoxError;

/// `Connector` 是运行时与具体协议客户端之间的唯一边界。
///
/// # 教案式说明
/// - **意图 (Why)**：内置资源类型只负责校验记录、生成选项；真正的 HTTP/JDBC/gRPC 客户端由宿主
///   注入，运行时永远不检查客户端内部；
/// - **契约 (What)**：`connect(options)` 返回就绪的客户端，`disconnect(client)` 释放其系统资源，
///   对同一客户端最多被调用一次；
/// - **风险 (Trade-offs)**：两者都可能阻塞在网络 I/O 上，调用方若需超时应在外层包装。
pub trait Connector<O>: Send + Sync + 'static {
    type Client: Send + Sync + 'static;

    fn connect(&self, options: &O) -> Result<Self::Client, BoxError>;

    fn disconnect(&self, client: &Self::Client) -> Result<(), BoxError>;
}

/// 以一对闭包实现 [`Connector`]，适合临时装配或测试。
pub struct FnConnector<C, D, T> {
    connect: C,
    disconnect: D,
    _client: PhantomData<fn() -> T>,
}

impl<C, D, T> FnConnector<C, D, T> {
    /// `O` 只用于让闭包参数类型从约束中推导出来。
    pub fn new<O>(connect: C, disconnect: D) -> Self
    where
        C: Fn(&O) -> Result<T, BoxError>,
        D: Fn(&T) -> Result<(), BoxError>,
    {
        Self {
            connect,
            disconnect,
            _client: PhantomData,
        }
    }
}

impl<C, D, T> fmt::Debug for FnConnector<C, D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConnector")
            .field("client", &std::any::type_name::<T>())
            .finish()
    }
}

impl<O, C, D, T> Connector<O> for FnConnector<C, D, T>
where
    C: Fn(&O) -> Result<T, BoxError> + Send + Sync + 'static,
    D: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Client = T;

    fn connect(&self, options: &O) -> Result<T, BoxError> {
        (self.connect)(options)
    }

    fn disconnect(&self, client: &T) -> Result<(), BoxError> {
        (self.disconnect)(client)
    }
}
