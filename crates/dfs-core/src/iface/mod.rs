//! Concrete remote interfaces built on the generic RMI substrate.

pub mod naming;
pub mod storage;
