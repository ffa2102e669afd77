//! Dispatcher port - active object への操作の投入口

use crate::domain::Deferred;

/// Dispatcher は操作を受け取り、その結果を `Deferred` で返す
///
/// 操作は `FnOnce(&mut State) -> R` として渡されます。引数はクロージャが
/// キャプチャするので、任意のシグネチャをこの 1 つの形で表現できます。
/// 戻り値の型 `R` は操作のシグネチャだけで決まります。
///
/// # 実装上の約束
/// - `dispatch` はブロックしない（キューに積むだけでもよい）
/// - 操作の実行が失敗した場合も `Deferred` の中で報告する
pub trait Dispatcher: Send + Sync + 'static {
    /// The state operations run against.
    type State: Send + 'static;

    fn dispatch<F, R>(&self, op: F) -> Deferred<R>
    where
        F: FnOnce(&mut Self::State) -> R + Send + 'static,
        R: Send + 'static;
}
