//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ActiveObject**: tokio task 上で状態を所有する Dispatcher

pub mod active;

pub use self::active::{ActiveConfig, ActiveObject, Spawned};
