//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为服务发现运行时对外暴露的错误语义提供集中定义：类型解析、记录校验、配置合并、
//!   引用生命周期以及底层客户端工厂的失败都在此归档；
//! - 每个变体附带稳定错误码（`discovery.*`），方便运维按码聚合告警。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，满足 `Send + Sync + 'static`，可跨线程传播；
//! - 客户端工厂（`connect`/`disconnect`）返回的错误以 [`BoxError`] 原样保留在 `source` 链中，
//!   运行时不吞没、不重试。

use thiserror::Error;

use crate::reference::ReferenceId;

/// 客户端工厂错误的统一承载类型。
///
/// 具体协议客户端的错误类型对运行时不透明，统一装箱后挂在 [`DiscoveryError::Connect`] /
/// [`DiscoveryError::Teardown`] 的 `source` 上。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 服务发现运行时的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：将“绑定 → 获取 → 释放”全链路的异常收敛到一个枚举中，调用方只需匹配变体
///   即可决定是修正输入、重试还是直接上报。
/// - **契约 (What)**：
///   - `UnknownType`/`DuplicateType`/`InvalidTypeName` 来自类型注册表；
///   - `InvalidRecord`/`ConfigMerge` 由资源类型在解析记录时产生，运行时不会重试；
///   - `Connect` 失败后引用保持 `Unbound`，调用方可再次 `acquire()`；
///   - `Teardown` 仅在最后一个持有者释放（或非共享客户端释放）时向触发方暴露。
/// - **设计权衡 (Trade-offs)**：上下文字段使用 `String` 保存，牺牲少量分配换取可读诊断。
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// 记录声明的类型在注册表中不存在。
    #[error("no resource type registered for `{type_name}`")]
    UnknownType { type_name: String },

    /// 同名资源类型已注册且未显式允许覆盖。
    #[error("resource type `{type_name}` is already registered")]
    DuplicateType { type_name: String },

    /// 资源类型名称为空。
    #[error("resource type name must not be empty")]
    InvalidTypeName,

    /// 记录缺少资源类型所需字段，或字段格式非法。
    ///
    /// - **契约 (What)**：`type_name` 为负责解析的资源类型，`record` 为记录名称，
    ///   `reason` 描述具体缺失/非法的字段。
    #[error("record `{record}` is not a valid `{type_name}` record: {reason}")]
    InvalidRecord {
        type_name: String,
        record: String,
        reason: String,
    },

    /// 调用方配置与记录元数据存在无法调和的冲突。
    #[error("configuration conflicts with `{type_name}` record `{record}`: {reason}")]
    ConfigMerge {
        type_name: String,
        record: String,
        reason: String,
    },

    /// 引用已被其所有者永久退役，禁止再次获取客户端。
    #[error("service reference {id} has been retired")]
    ReferenceRetired { id: ReferenceId },

    /// 客户端工厂建连失败，错误原样保留。
    #[error("failed to connect `{type_name}` client")]
    Connect {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// 客户端工厂关闭连接失败。
    #[error("failed to disconnect `{type_name}` client")]
    Teardown {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// 缓存的客户端（或解析目标）与调用方期望的具体类型不一致。
    #[error("client type mismatch: expected `{expected}`, found `{actual}`")]
    ClientTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// 发现门面中不存在该注册标识。
    #[error("registration `{registration}` is not published")]
    UnknownRegistration { registration: String },
}

impl DiscoveryError {
    /// 构造 [`DiscoveryError::InvalidRecord`]，减少资源类型实现中的样板代码。
    pub fn invalid_record(
        type_name: &str,
        record: &str,
        reason: impl std::fmt::Display,
    ) -> Self {
        DiscoveryError::InvalidRecord {
            type_name: type_name.to_owned(),
            record: record.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// 构造 [`DiscoveryError::ConfigMerge`]。
    pub fn config_merge(type_name: &str, record: &str, reason: impl std::fmt::Display) -> Self {
        DiscoveryError::ConfigMerge {
            type_name: type_name.to_owned(),
            record: record.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// 返回稳定错误码。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：日志与指标按错误码聚合，避免依赖易变的自然语言描述；
    /// - **契约 (What)**：错误码一经发布不再变更，新增变体只追加新码。
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::UnknownType { .. } => "discovery.type.unknown",
            DiscoveryError::DuplicateType { .. } => "discovery.type.duplicate",
            DiscoveryError::InvalidTypeName => "discovery.type.invalid_name",
            DiscoveryError::InvalidRecord { .. } => "discovery.record.invalid",
            DiscoveryError::ConfigMerge { .. } => "discovery.config.conflict",
            DiscoveryError::ReferenceRetired { .. } => "discovery.reference.retired",
            DiscoveryError::Connect { .. } => "discovery.client.connect",
            DiscoveryError::Teardown { .. } => "discovery.client.teardown",
            DiscoveryError::ClientTypeMismatch { .. } => "discovery.client.type_mismatch",
            DiscoveryError::UnknownRegistration { .. } => "discovery.registration.unknown",
        }
    }

    /// 调用方是否可以在不修改输入的前提下重试。
    ///
    /// 运行时本身从不重试；只有建连失败保证引用仍处于 `Unbound`，重试才有意义。
    pub fn is_retryable(&self) -> bool {
        matches!(self, DiscoveryError::Connect { .. })
    }
}
