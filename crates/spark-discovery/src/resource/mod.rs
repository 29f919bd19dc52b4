//! 资源类型契约的双层抽象：泛型层、对象层，以及下沉到具体协议客户端的连接器。
//!
//! - [`ResourceType`]：面向实现者的泛型层，关联具体的解析目标与客户端类型；
//! - [`DynResourceType`]：面向注册表与引用的对象层，完成类型擦除；
//! - [`TypedResourceAdapter`]：泛型 → 对象的桥接；
//! - [`Connector`]：运行时唯一接触具体客户端的边界（`connect`/`disconnect`）。

pub mod connector;
pub mod generic;
pub mod object;

pub use connector::{Connector, FnConnector};
pub use generic::ResourceType;
pub use object::{BuiltClient, DynResourceType, Resolution, ServiceClient, TypedResourceAdapter, build};
