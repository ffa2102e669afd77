//! Deferred - 後で完了する 1 つの値
//!
//! `Deferred<R>` は 2 つの終端状態のどちらかで完了します。
//! - `Ok(R)`: 操作の戻り値
//! - `Err(CallError)`: 失敗（Target 破棄済み、操作が捨てられた、panic など）
//!
//! 値は dispatch 側の `Promise<R>` から届くか、
//! Handle が最初から完了済みのものを作ります。
//! どちらで作られても呼び出し元から見た形は同じです。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::errors::CallError;

type Outcome<R> = Result<R, CallError>;

enum State<R> {
    Pending(oneshot::Receiver<Outcome<R>>),
    Ready(Outcome<R>),
    Taken,
}

/// A single value that becomes available later.
///
/// Await it from async code, or use [`Deferred::wait_blocking`] from a plain
/// thread. Dropping it without resolving is fine: the producer simply has
/// nobody to deliver to.
pub struct Deferred<R> {
    state: State<R>,
}

// `R` is only ever moved out, never pinned.
impl<R> Unpin for Deferred<R> {}

impl<R> Deferred<R> {
    /// Create a connected producer/consumer pair.
    pub fn channel() -> (Promise<R>, Deferred<R>) {
        let (tx, rx) = oneshot::channel();
        (
            Promise { tx },
            Deferred {
                state: State::Pending(rx),
            },
        )
    }

    /// An already-resolved success.
    pub fn ready(value: R) -> Self {
        Self::from_result(Ok(value))
    }

    /// An already-resolved failure.
    pub fn failed(err: CallError) -> Self {
        Self::from_result(Err(err))
    }

    pub fn from_result(result: Result<R, CallError>) -> Self {
        Self {
            state: State::Ready(result),
        }
    }

    /// Returns true once a value (or failure) is available without waiting.
    pub fn is_resolved(&mut self) -> bool {
        if let State::Pending(rx) = &mut self.state {
            match rx.try_recv() {
                Ok(out) => self.state = State::Ready(out),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Closed) => self.state = State::Ready(Err(CallError::Abandoned)),
            }
        }
        true
    }

    /// Take the outcome if it is already available; `None` while pending.
    pub fn try_resolve(&mut self) -> Option<Result<R, CallError>> {
        if !self.is_resolved() {
            return None;
        }
        match std::mem::replace(&mut self.state, State::Taken) {
            State::Ready(out) => Some(out),
            State::Taken => Some(Err(CallError::AlreadyTaken)),
            State::Pending(rx) => {
                self.state = State::Pending(rx);
                None
            }
        }
    }

    /// Block the current thread until the outcome is available.
    ///
    /// # Panics
    /// Panics when called from inside an async execution context, like
    /// `oneshot::Receiver::blocking_recv`. Use `.await` there.
    pub fn wait_blocking(self) -> Result<R, CallError> {
        match self.state {
            State::Pending(rx) => rx.blocking_recv().unwrap_or(Err(CallError::Abandoned)),
            State::Ready(out) => out,
            State::Taken => Err(CallError::AlreadyTaken),
        }
    }
}

impl<R> Future for Deferred<R> {
    type Output = Result<R, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, State::Taken) {
            State::Pending(mut rx) => match Pin::new(&mut rx).poll(cx) {
                Poll::Pending => {
                    this.state = State::Pending(rx);
                    Poll::Pending
                }
                Poll::Ready(Ok(out)) => Poll::Ready(out),
                // sender dropped without resolving
                Poll::Ready(Err(_)) => Poll::Ready(Err(CallError::Abandoned)),
            },
            State::Ready(out) => Poll::Ready(out),
            State::Taken => Poll::Ready(Err(CallError::AlreadyTaken)),
        }
    }
}

impl<R> fmt::Debug for Deferred<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "pending",
            State::Ready(Ok(_)) => "ready(ok)",
            State::Ready(Err(_)) => "ready(err)",
            State::Taken => "taken",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

/// Producer side of a [`Deferred`].
///
/// Dropping it unresolved makes the paired `Deferred` fail with
/// `CallError::Abandoned`.
pub struct Promise<R> {
    tx: oneshot::Sender<Outcome<R>>,
}

impl<R> Promise<R> {
    pub fn resolve(self, value: R) {
        self.complete(Ok(value));
    }

    pub fn fail(self, err: CallError) {
        self.complete(Err(err));
    }

    pub fn complete(self, outcome: Result<R, CallError>) {
        // receiver may already be dropped; nobody is waiting then
        let _ = self.tx.send(outcome);
    }

    /// True when the paired `Deferred` has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<R> fmt::Debug for Promise<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("closed", &self.is_closed())
            .finish()
    }
}
