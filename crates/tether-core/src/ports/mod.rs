//! Ports - 抽象化レイヤー
//!
//! Handle が Target に求めるものは `Dispatcher` だけです。
//! Host は時刻を `Clock` 経由で取得します（テストでは FixedClock）。

pub mod clock;
pub mod dispatch;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::Dispatcher;
