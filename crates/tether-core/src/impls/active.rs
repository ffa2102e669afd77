//! ActiveObject - 自分の実行コンテキストで操作を処理するオブジェクト
//!
//! # 構成
//! - 状態 `T` は tokio task（worker）の中にだけ存在する
//! - `dispatch` は操作を mailbox (unbounded mpsc) に積んで `Deferred` を返すだけ
//! - worker は mailbox から 1 件ずつ取り出し、積まれた順に実行する
//!
//! # 停止
//! 最後の `Arc<ActiveObject<T>>` が drop されると mailbox が閉じます。
//! - `drain_on_drop = true`（デフォルト）: 積まれている操作を全部実行してから止まる
//! - `drain_on_drop = false`: shutdown シグナルで即座に止まる。残りは `Abandoned`

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{CallError, Deferred, TargetStats};
use crate::ports::Dispatcher;

/// Configuration of one active object.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    /// Used in logs and status views.
    pub name: String,
    /// Run already queued operations after the owner drops the object.
    pub drain_on_drop: bool,
    /// Stop the worker after an operation panics. Queued operations then
    /// resolve to `CallError::Abandoned`.
    pub stop_on_panic: bool,
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self {
            name: "active".to_string(),
            drain_on_drop: true,
            stop_on_panic: false,
        }
    }
}

impl ActiveConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self::default().with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_drain_on_drop(mut self, drain: bool) -> Self {
        self.drain_on_drop = drain;
        self
    }

    pub fn with_stop_on_panic(mut self, stop: bool) -> Self {
        self.stop_on_panic = stop;
        self
    }
}

enum JobOutcome {
    Completed,
    Panicked(String),
}

type Job<T> = Box<dyn FnOnce(&mut T) -> JobOutcome + Send>;

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> TargetStats {
        TargetStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// An object that owns its state on a dedicated tokio task and executes the
/// operations dispatched to it one at a time, in dispatch order.
///
/// Whoever holds the `Arc<ActiveObject<T>>` owns it. Callers that should not
/// keep it alive get a [`Handle`](crate::Handle) instead.
pub struct ActiveObject<T> {
    name: String,
    mailbox: mpsc::UnboundedSender<Job<T>>,
    shutdown_tx: watch::Sender<bool>,
    drain_on_drop: bool,
    counters: Arc<Counters>,
}

/// A freshly spawned active object: the owning reference plus its worker task.
pub struct Spawned<T> {
    pub target: Arc<ActiveObject<T>>,
    pub join: JoinHandle<()>,
}

impl<T: Send + 'static> ActiveObject<T> {
    /// Spawn on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn(state: T) -> Spawned<T> {
        Self::spawn_with(ActiveConfig::default(), state)
    }

    /// Spawn on the current tokio runtime with an explicit config.
    pub fn spawn_with(config: ActiveConfig, state: T) -> Spawned<T> {
        Self::spawn_on(&tokio::runtime::Handle::current(), config, state)
    }

    /// Spawn on the given runtime. Usable from threads outside the runtime.
    pub fn spawn_on(runtime: &tokio::runtime::Handle, config: ActiveConfig, state: T) -> Spawned<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            name: config.name.clone(),
            state,
            mailbox: rx,
            shutdown_rx,
            watching: true,
            stop_on_panic: config.stop_on_panic,
            counters: Arc::clone(&counters),
        };
        let join = runtime.spawn(worker.run());

        let target = Arc::new(Self {
            name: config.name,
            mailbox: tx,
            shutdown_tx,
            drain_on_drop: config.drain_on_drop,
            counters,
        });
        Spawned { target, join }
    }
}

impl<T> ActiveObject<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> TargetStats {
        self.counters.snapshot()
    }

    /// False once the worker has stopped and no longer accepts operations.
    pub fn is_running(&self) -> bool {
        !self.mailbox.is_closed()
    }
}

impl<T: Send + 'static> Dispatcher for ActiveObject<T> {
    type State = T;

    fn dispatch<F, R>(&self, op: F) -> Deferred<R>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, deferred) = Deferred::channel();
        let job: Job<T> = Box::new(move |state: &mut T| {
            match panic::catch_unwind(AssertUnwindSafe(|| op(state))) {
                Ok(value) => {
                    promise.resolve(value);
                    JobOutcome::Completed
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    promise.fail(CallError::Panicked(message.clone()));
                    JobOutcome::Panicked(message)
                }
            }
        });

        // a rejected job is dropped here together with its promise,
        // so the deferred resolves to Abandoned
        match self.mailbox.send(job) {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                debug!(name = %self.name, "worker stopped; operation rejected");
            }
        }
        deferred
    }
}

impl<T> Drop for ActiveObject<T> {
    fn drop(&mut self) {
        if !self.drain_on_drop {
            // ignore send error: the worker may already be gone
            let _ = self.shutdown_tx.send(true);
        }
    }
}

impl<T> fmt::Debug for ActiveObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveObject")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}

struct Worker<T> {
    name: String,
    state: T,
    mailbox: mpsc::UnboundedReceiver<Job<T>>,
    shutdown_rx: watch::Receiver<bool>,
    /// false once the shutdown sender is gone (drain mode)
    watching: bool,
    stop_on_panic: bool,
    counters: Arc<Counters>,
}

impl<T> Worker<T> {
    async fn run(mut self) {
        debug!(name = %self.name, "active object started");

        loop {
            if *self.shutdown_rx.borrow() {
                debug!(name = %self.name, "shutdown requested; dropping queued operations");
                break;
            }

            let job = tokio::select! {
                biased;
                changed = self.shutdown_rx.changed(), if self.watching => {
                    if changed.is_err() {
                        self.watching = false;
                    }
                    continue;
                }
                job = self.mailbox.recv() => job,
            };

            // None: every owner is gone and the mailbox is drained
            let Some(job) = job else {
                break;
            };

            let outcome = job(&mut self.state);
            self.counters.completed.fetch_add(1, Ordering::Relaxed);

            if let JobOutcome::Panicked(message) = outcome {
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                warn!(name = %self.name, %message, "operation panicked");
                if self.stop_on_panic {
                    break;
                }
            }
        }

        debug!(
            name = %self.name,
            completed = self.counters.completed.load(Ordering::Relaxed),
            "active object stopped"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
