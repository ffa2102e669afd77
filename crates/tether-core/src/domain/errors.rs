//! Errors - Deferred が失敗するときのエラー型と、Host 側のエラー型
//!
//! `CallError` は必ず `Deferred` の中に入って呼び出し元に届きます。
//! `Handle::call` が同期的にエラーを返すことはありません。

use super::ids::TargetId;

/// CallError は `Deferred<R>` の失敗状態
///
/// # 分類
/// - TargetExpired: Handle が observer を昇格できなかった（Target は破棄済み）
/// - Abandoned: dispatch 側が操作を完了させずに捨てた
/// - Panicked: 操作そのものが active object 上で panic した
/// - AlreadyTaken: 値を取り出した後に再度 poll された
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("target expired: the active object was destroyed by its owner")]
    TargetExpired,

    #[error("operation abandoned before it completed")]
    Abandoned,

    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("deferred result was already taken")]
    AlreadyTaken,
}

impl CallError {
    pub fn is_expired(&self) -> bool {
        matches!(self, CallError::TargetExpired)
    }
}

/// HostError は owner 側 (Host) の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no target registered under {0}")]
    NotFound(TargetId),

    #[error("target {id} does not hold state of type {expected}")]
    TypeMismatch { id: TargetId, expected: &'static str },
}
