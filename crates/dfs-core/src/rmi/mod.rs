//! The RMI substrate: interface descriptors, the server-side
//! [`skeleton::Skeleton`] and the client-side [`stub::Stub`].

pub mod descriptor;
pub mod skeleton;
pub mod stub;

pub use descriptor::{InterfaceDescriptor, MethodDescriptor, RemoteInterface};
pub use skeleton::{Dispatch, LoggingHooks, Skeleton, SkeletonHooks};
pub use stub::Stub;
