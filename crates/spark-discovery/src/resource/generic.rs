use std::fmt;

use crate::config::Config;
use crate::error::{BoxError, DiscoveryError};
use crate::record::Record;

/// `ResourceType` 描述一种后端资源如何从记录变成可用客户端。
///
/// # 设计初衷（Why）
/// - 每种资源（HTTP 端点、JDBC 数据源、gRPC 通道……）只需回答四个问题：记录是否合法、
///   哪些字段决定客户端身份、如何建连、如何断开；
/// - 合并配置、共享判定、缓存与引用计数都由运行时统一完成，实现者无需关心。
///
/// # 行为逻辑（How）
/// 1. 运行时按 `metadata < location < caller` 合并配置后调用 [`resolve`](Self::resolve)，
///    得到经过校验的连接目标；
/// 2. 若合并结果中 `shared = true`，运行时以 [`identity`](Self::identity) 的输出构造共享键，
///    先查共享注册表，未命中才调用 [`connect`](Self::connect)；
/// 3. 最后一个持有者释放时调用 [`disconnect`](Self::disconnect)。
///
/// # 契约说明（What）
/// - **前置条件**：实现应无状态或内部自行同步，运行时会在多线程中并发调用；
/// - **后置条件**：`resolve` 对同一输入必须给出相同结果，`identity` 必须是确定性的；
/// - **错误语义**：字段缺失/非法返回 [`DiscoveryError::InvalidRecord`]，与记录冲突的调用方配置
///   返回 [`DiscoveryError::ConfigMerge`]；`connect`/`disconnect` 的错误原样上抛。
///
/// # 风险提示（Trade-offs）
/// - `disconnect` 对每个实际建立的客户端恰好调用一次，但可能发生在任意线程。
pub trait ResourceType: Send + Sync + 'static {
    /// 经过校验的连接目标（通常即客户端选项）。
    type Target: fmt::Debug + Send + Sync + 'static;
    /// 具体客户端类型，对运行时不透明。
    type Client: Send + Sync + 'static;

    /// 注册表中的类型名，例如 `http-endpoint`。
    fn type_name(&self) -> &str;

    /// 校验记录与合并后的配置，产出连接目标。
    fn resolve(&self, record: &Record, merged: &Config) -> Result<Self::Target, DiscoveryError>;

    /// 决定客户端身份的字段子集，用于共享判定。
    fn identity(&self, target: &Self::Target) -> Config;

    /// 建立客户端。
    fn connect(&self, target: &Self::Target) -> Result<Self::Client, BoxError>;

    /// 释放客户端持有的系统资源。
    fn disconnect(&self, client: &Self::Client) -> Result<(), BoxError>;
}
