//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **Host**: active object の所有者。Handle を払い出し、retire で破棄する

pub mod host;

pub use self::host::Host;
