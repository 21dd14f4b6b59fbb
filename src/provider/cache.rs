//! Per-tick memoization of idempotent reads
//!
//! The first call of a cacheable method inserts its in-flight future; every
//! caller polled before that caller's task runs again joins it. The leading
//! call polls the request once, yields, and then drops the entry, resolved
//! or not. The entry is owned by the leading call, so the sharing window
//! does not depend on which runtime worker runs what. A leading call dropped
//! early clears its entry too.

use crate::RpcError;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;

pub type RpcFuture = BoxFuture<'static, Result<Value, RpcError>>;
type SharedCall = Shared<RpcFuture>;
type Entries = Arc<Mutex<HashMap<String, (u64, SharedCall)>>>;

/// Methods whose result may be shared within one tick
pub const CACHEABLE_METHODS: &[&str] = &["eth_chainId", "eth_blockNumber"];

pub fn is_cacheable(method: &str) -> bool {
    CACHEABLE_METHODS.contains(&method)
}

#[derive(Default)]
pub struct TickMemo {
    entries: Entries,
    generation: AtomicU64,
}

/// Removes the leading call's entry, unless a newer call replaced it
struct ClearOnDrop {
    entries: Entries,
    method: String,
    generation: u64,
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        let mut entries = lock(&self.entries);
        if entries
            .get(&self.method)
            .is_some_and(|(g, _)| *g == self.generation)
        {
            entries.remove(&self.method);
        }
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, (u64, SharedCall)>> {
    // The map stays consistent across a panicking holder
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TickMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending call for `method`, or start one with `start`
    ///
    /// Returns the result and whether it came from an existing entry.
    pub async fn call(
        &self,
        method: &str,
        start: impl FnOnce() -> RpcFuture,
    ) -> (Result<Value, RpcError>, bool) {
        let (mut call, leader) = {
            let mut entries = lock(&self.entries);
            match entries.get(method) {
                Some((_, call)) => (call.clone(), None),
                None => {
                    let call = start().shared();
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    entries.insert(method.to_string(), (generation, call.clone()));
                    let guard = ClearOnDrop {
                        entries: Arc::clone(&self.entries),
                        method: method.to_string(),
                        generation,
                    };
                    (call, Some(guard))
                }
            }
        };

        match leader {
            None => (call.await, true),
            Some(guard) => {
                let first = futures::poll!(&mut call);
                tokio::task::yield_now().await;
                drop(guard);
                let result = match first {
                    Poll::Ready(result) => result,
                    Poll::Pending => call.await,
                };
                (result, false)
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}
