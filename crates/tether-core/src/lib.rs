//! tether-core
//!
//! Owner が寿命を握る active object に、生存を延ばさずに非同期で
//! 操作を投げるための Handle と、その周辺の部品。
//!
//! # モジュール構成
//! - **domain**: Deferred / Promise, CallError / HostError, TargetId, status views
//! - **ports**: Dispatcher (Target の投入口), Clock
//! - **impls**: ActiveObject（tokio task 上の Dispatcher 実装）
//! - **app**: Host（active object の所有者）
//! - **handle**: Handle（非所有プロキシ）

pub mod app;
pub mod domain;
pub mod handle;
pub mod impls;
pub mod ports;

pub use app::Host;
pub use domain::{CallError, Deferred, HostError, HostStatus, Promise, TargetId, TargetStats};
pub use handle::{ActiveHandle, Handle};
pub use impls::{ActiveConfig, ActiveObject, Spawned};
pub use ports::{Clock, Dispatcher, FixedClock, SystemClock};
