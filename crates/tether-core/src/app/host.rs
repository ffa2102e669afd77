//! Host - active object を所有するサブシステム
//!
//! Host だけが `Arc<ActiveObject<T>>` を持ちます。呼び出し側には
//! `ActiveHandle<T>`（observer）だけを渡すので、Host が retire した時点で
//! Target は破棄され、以降の `call` は `TargetExpired` になります。
//!
//! # 学習ポイント
//! - `Arc<dyn Trait>` で型の違う active object をまとめて保持
//! - `Any` への変換と downcast で、id から型付き Handle を取り出す

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use ulid::Ulid;

use crate::domain::{HostError, HostStatus, TargetId, TargetStats, TargetStatus};
use crate::handle::{ActiveHandle, Handle};
use crate::impls::{ActiveConfig, ActiveObject, Spawned};
use crate::ports::{Clock, SystemClock};

/// Type-erased view of an owned active object.
trait Hosted: Send + Sync {
    fn name(&self) -> &str;
    fn stats(&self) -> TargetStats;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + 'static> Hosted for ActiveObject<T> {
    fn name(&self) -> &str {
        ActiveObject::name(self)
    }

    fn stats(&self) -> TargetStats {
        ActiveObject::stats(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

struct Entry {
    target: Arc<dyn Hosted>,
    spawned_at: DateTime<Utc>,
    join: JoinHandle<()>,
}

/// Exclusive owner of a set of active objects.
///
/// # 使用例
/// ```ignore
/// let mut host = Host::new();
/// let (id, counter) = host.spawn(Counter::default());
///
/// assert_eq!(counter.call(Counter::increment).await, Ok(1));
/// host.retire(id);
/// assert_eq!(counter.call(Counter::increment).await, Err(CallError::TargetExpired));
/// ```
pub struct Host<C = SystemClock> {
    clock: C,
    entries: HashMap<TargetId, Entry>,
    retired: usize,
}

impl Host<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Host<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Host<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            entries: HashMap::new(),
            retired: 0,
        }
    }

    /// Spawn an active object owning `state` on the current tokio runtime.
    pub fn spawn<T: Send + 'static>(&mut self, state: T) -> (TargetId, ActiveHandle<T>) {
        self.spawn_with(ActiveConfig::default(), state)
    }

    pub fn spawn_with<T: Send + 'static>(
        &mut self,
        config: ActiveConfig,
        state: T,
    ) -> (TargetId, ActiveHandle<T>) {
        let Spawned { target, join } = ActiveObject::spawn_with(config, state);
        self.adopt(target, join)
    }

    fn adopt<T: Send + 'static>(
        &mut self,
        target: Arc<ActiveObject<T>>,
        join: JoinHandle<()>,
    ) -> (TargetId, ActiveHandle<T>) {
        let spawned_at = self.clock.now();
        let id = TargetId::from_ulid(Ulid::from_parts(
            spawned_at.timestamp_millis() as u64,
            rand::random(),
        ));
        let handle = Handle::new(&target);

        info!(%id, name = target.name(), state = type_name::<T>(), "target spawned");
        self.entries.insert(
            id,
            Entry {
                target,
                spawned_at,
                join,
            },
        );
        (id, handle)
    }

    /// A fresh handle to an existing target.
    pub fn handle<T: Send + 'static>(&self, id: TargetId) -> Result<ActiveHandle<T>, HostError> {
        let entry = self.entries.get(&id).ok_or(HostError::NotFound(id))?;
        let target = Arc::clone(&entry.target)
            .into_any()
            .downcast::<ActiveObject<T>>()
            .map_err(|_| HostError::TypeMismatch {
                id,
                expected: type_name::<T>(),
            })?;
        Ok(Handle::new(&target))
    }

    /// Drop the owning reference. The worker finishes in the background.
    ///
    /// Returns false when `id` is unknown.
    pub fn retire(&mut self, id: TargetId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                info!(%id, name = entry.target.name(), "target retired");
                self.retired += 1;
                true
            }
            None => false,
        }
    }

    /// Like [`Host::retire`], but wait for the worker task to stop.
    pub async fn retire_and_join(&mut self, id: TargetId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        self.retired += 1;
        let Entry { target, join, .. } = entry;
        let name = target.name().to_string();
        drop(target);

        if let Err(e) = join.await {
            warn!(%id, %name, "worker task ended abnormally: {e}");
        }
        info!(%id, %name, "target retired");
        true
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of live targets, oldest first.
    pub fn ids(&self) -> Vec<TargetId> {
        let mut ids: Vec<TargetId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn status(&self) -> HostStatus {
        let mut targets: Vec<TargetStatus> = self
            .entries
            .iter()
            .map(|(id, entry)| TargetStatus {
                id: *id,
                name: entry.target.name().to_string(),
                spawned_at: entry.spawned_at,
                stats: entry.target.stats(),
            })
            .collect();
        targets.sort_by_key(|t| t.id);
        HostStatus {
            targets,
            retired: self.retired,
        }
    }

    /// Retire every target and wait for all workers.
    pub async fn shutdown_and_join(mut self) {
        let entries: Vec<(TargetId, Entry)> = self.entries.drain().collect();
        self.retired += entries.len();
        let mut joins = Vec::with_capacity(entries.len());
        for (id, Entry { target, join, .. }) in entries {
            drop(target);
            joins.push((id, join));
        }
        for (id, join) in joins {
            if let Err(e) = join.await {
                warn!(%id, "worker task ended abnormally: {e}");
            }
        }
        info!(retired = self.retired, "host shut down");
    }
}
