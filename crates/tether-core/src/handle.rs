//! Handle - Target を生かし続けない非同期プロキシ
//!
//! Handle は Target への observer (`Weak`) だけを持ちます。
//! `call` のたびに昇格を試み、
//! - 成功: そのまま Target の `dispatch` に転送し、その `Deferred` を返す
//! - 失敗: `CallError::TargetExpired` で完了済みの `Deferred` を返す
//!
//! どちらの場合も `call` は同期的に失敗しません。失敗は `Deferred` を
//! 解決したときにだけ観測できます。

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::domain::{CallError, Deferred};
use crate::impls::ActiveObject;
use crate::ports::Dispatcher;

/// Non-owning, cloneable proxy to a [`Dispatcher`].
///
/// ```ignore
/// let spawned = ActiveObject::spawn(Counter::default());
/// let handle = Handle::new(&spawned.target);
///
/// assert_eq!(handle.call(Counter::increment).await, Ok(1));
/// drop(spawned.target);
/// assert_eq!(handle.call(Counter::increment).await, Err(CallError::TargetExpired));
/// ```
pub struct Handle<D> {
    target: Weak<D>,
}

/// Handle to an [`ActiveObject`] holding state `T`.
pub type ActiveHandle<T> = Handle<ActiveObject<T>>;

impl<D: Dispatcher> Handle<D> {
    /// Derive an observer from the owner's strong reference.
    pub fn new(owner: &Arc<D>) -> Self {
        Self {
            target: Arc::downgrade(owner),
        }
    }

    pub fn from_weak(target: Weak<D>) -> Self {
        Self { target }
    }

    /// Forward `op` to the target, or fail with `TargetExpired` if it is gone.
    ///
    /// The strong reference obtained by the upgrade lives only until
    /// `dispatch` returns. The operation itself may still be pending.
    pub fn call<F, R>(&self, op: F) -> Deferred<R>
    where
        F: FnOnce(&mut D::State) -> R + Send + 'static,
        R: Send + 'static,
    {
        match self.target.upgrade() {
            Some(target) => target.dispatch(op),
            None => {
                debug!(
                    state = std::any::type_name::<D::State>(),
                    "target expired; returning failed deferred"
                );
                Deferred::failed(CallError::TargetExpired)
            }
        }
    }

    /// `call` for an operation written as a plain function taking one
    /// argument (use a tuple for several).
    pub fn call_with<A, R>(&self, op: fn(&mut D::State, A) -> R, args: A) -> Deferred<R>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        self.call(move |state: &mut D::State| op(state, args))
    }

    /// Advisory only: the target may be destroyed right after this returns.
    pub fn is_expired(&self) -> bool {
        self.target.strong_count() == 0
    }

    /// True when both handles observe the same target.
    pub fn same_target(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.target, &other.target)
    }
}

impl<D> Clone for Handle<D> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<D> fmt::Debug for Handle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("expired", &(self.target.strong_count() == 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{ActiveConfig, Spawned};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Counter {
        value: i64,
    }

    impl Counter {
        fn increment(&mut self) -> i64 {
            self.value += 1;
            self.value
        }

        fn add(&mut self, n: i64) -> i64 {
            self.value += n;
            self.value
        }

        fn checked_div(&mut self, d: i64) -> Result<i64, String> {
            if d == 0 {
                return Err("division by zero".to_string());
            }
            Ok(self.value / d)
        }
    }

    /// Runs operations on the caller's thread; exercises Handle against a
    /// dispatcher other than ActiveObject.
    struct Inline<T> {
        state: Mutex<T>,
    }

    impl<T: Send + 'static> Dispatcher for Inline<T> {
        type State = T;

        fn dispatch<F, R>(&self, op: F) -> Deferred<R>
        where
            F: FnOnce(&mut T) -> R + Send + 'static,
            R: Send + 'static,
        {
            let mut state = self.state.lock().unwrap();
            Deferred::ready(op(&mut *state))
        }
    }

    #[tokio::test]
    async fn counter_scenario() {
        let Spawned { target, join } = ActiveObject::spawn(Counter::default());
        let first = Handle::new(&target);
        let second = first.clone();

        assert_eq!(first.call(Counter::increment).await, Ok(1));

        drop(target);
        join.await.unwrap();

        assert_eq!(first.call(Counter::increment).await, Err(CallError::TargetExpired));
        assert_eq!(second.call(Counter::increment).await, Err(CallError::TargetExpired));
    }

    #[rstest]
    #[case::zero(0)]
    #[case::positive(5)]
    #[case::negative(-3)]
    #[tokio::test]
    async fn call_matches_direct_invocation(#[case] n: i64) {
        let mut direct = Counter::default();
        let expected = direct.add(n);

        let Spawned { target, .. } = ActiveObject::spawn(Counter::default());
        let handle = Handle::new(&target);
        assert_eq!(handle.call_with(Counter::add, n).await, Ok(expected));
    }

    #[tokio::test]
    async fn operation_errors_pass_through_as_values() {
        let Spawned { target, .. } = ActiveObject::spawn(Counter { value: 10 });
        let handle = Handle::new(&target);

        let ok: Result<Result<i64, String>, CallError> =
            handle.call_with(Counter::checked_div, 2).await;
        assert_eq!(ok, Ok(Ok(5)));

        let err = handle.call_with(Counter::checked_div, 0).await;
        assert_eq!(err, Ok(Err("division by zero".to_string())));
    }

    #[tokio::test]
    async fn return_type_is_the_same_on_both_branches() {
        let Spawned { target, .. } = ActiveObject::spawn(Counter::default());
        let handle = Handle::new(&target);

        let alive: Deferred<i64> = handle.call(Counter::increment);
        assert_eq!(alive.await, Ok(1));

        drop(target);
        let gone: Deferred<i64> = handle.call(Counter::increment);
        assert_eq!(gone.await, Err(CallError::TargetExpired));
    }

    #[tokio::test]
    async fn dropping_one_handle_does_not_affect_another() {
        let Spawned { target, .. } = ActiveObject::spawn(Counter::default());
        let a = Handle::new(&target);
        let b = Handle::new(&target);
        assert!(a.same_target(&b));

        assert_eq!(a.call(Counter::increment).await, Ok(1));
        drop(a);
        assert_eq!(b.call(Counter::increment).await, Ok(2));
        assert!(!b.is_expired());
    }

    #[test]
    fn handle_does_not_keep_target_alive() {
        let owner = Arc::new(Inline {
            state: Mutex::new(Counter::default()),
        });
        let handle = Handle::new(&owner);
        assert_eq!(Arc::strong_count(&owner), 1);

        assert_eq!(handle.call(Counter::increment).wait_blocking(), Ok(1));
        assert_eq!(Arc::strong_count(&owner), 1);

        drop(owner);
        assert!(handle.is_expired());
        assert_eq!(
            handle.call(Counter::increment).wait_blocking(),
            Err(CallError::TargetExpired)
        );
    }

    #[test]
    fn expired_call_resolves_without_a_runtime() {
        let handle: Handle<Inline<Counter>> = Handle::from_weak(Weak::new());
        let mut deferred = handle.call(Counter::increment);
        assert!(deferred.is_resolved());
        assert_eq!(deferred.try_resolve(), Some(Err(CallError::TargetExpired)));
        assert!(format!("{handle:?}").contains("expired: true"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn destruction_racing_calls_has_only_two_outcomes() {
        const CALLERS: usize = 4;
        const CALLS: usize = 25;

        for round in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(round);
            let config = ActiveConfig::named(format!("race-{round}"));
            let Spawned { target, join } = ActiveObject::spawn_with(config, Counter::default());
            let handle = Handle::new(&target);

            let mut callers = Vec::with_capacity(CALLERS);
            for _ in 0..CALLERS {
                let handle = handle.clone();
                let yields: Vec<u8> = (0..CALLS).map(|_| rng.gen_range(0..3)).collect();
                callers.push(tokio::spawn(async move {
                    let mut outcomes = Vec::with_capacity(CALLS);
                    for n in yields {
                        for _ in 0..n {
                            tokio::task::yield_now().await;
                        }
                        outcomes.push(handle.call(Counter::increment));
                    }
                    let mut resolved = Vec::with_capacity(CALLS);
                    for deferred in outcomes {
                        resolved.push(deferred.await);
                    }
                    resolved
                }));
            }

            let destroy_after: u32 = rng.gen_range(0..40);
            let destroyer = tokio::spawn(async move {
                for _ in 0..destroy_after {
                    tokio::task::yield_now().await;
                }
                drop(target);
            });

            let mut successes = Vec::new();
            for caller in callers {
                for outcome in caller.await.unwrap() {
                    match outcome {
                        Ok(value) => successes.push(value),
                        Err(err) => assert_eq!(err, CallError::TargetExpired),
                    }
                }
            }
            destroyer.await.unwrap();
            join.await.unwrap();

            // every success is a distinct step of the same counter
            successes.sort_unstable();
            let expected: Vec<i64> = (1..=successes.len() as i64).collect();
            assert_eq!(successes, expected, "round {round}");

            assert_eq!(
                handle.call(Counter::increment).await,
                Err(CallError::TargetExpired)
            );
        }
    }
}
