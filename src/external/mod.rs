//! External-Script Bridge (spec §4.9)
//!
//! The engine exposes a single extension point, the `script(kind, source,
//! vars)` built-in, to an opaque general-purpose scripting backend. The
//! bridge is single-threaded: calls are serialized by a process-wide lock,
//! which is why the built-in is declared non-concurrent. Re-entrant calls
//! from within an external script back into the evaluator must not
//! deadlock, so the lock is re-entrant to the current call chain.
//!
//! The standard library's `ReentrantLock` is unstable, so re-entrancy is
//! hand-rolled here as a `Mutex<Option<ThreadId>>` guard around a plain
//! `Mutex`, the way a systems codebase without a reentrant-mutex crate
//! would build it.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread::ThreadId;

#[derive(Debug, Clone)]
pub struct ExternalError {
    pub message: String,
    pub stack_trace: Option<String>,
}

/// `invoke(kind, source, vars) -> Result<Value, ExternalError>`.
pub trait ExternalScriptBridge: Send + Sync {
    fn invoke(&self, kind: &str, source: &str, vars: &HashMap<String, Value>) -> Result<Value, ExternalError>;
}

/// A process-wide, call-chain-reentrant lock guarding bridge invocations.
/// Held for the duration of one `invoke` call; a nested `invoke` from the
/// same OS thread (the external runtime calling back into the evaluator,
/// which then calls `script(...)` again) is allowed to proceed without
/// deadlocking.
pub struct ReentrantBridgeLock {
    holder: Mutex<Option<(ThreadId, usize)>>,
    inner: Mutex<()>,
}

impl Default for ReentrantBridgeLock {
    fn default() -> Self {
        Self { holder: Mutex::new(None), inner: Mutex::new(()) }
    }
}

pub struct BridgeGuard<'a> {
    lock: &'a ReentrantBridgeLock,
    _inner_guard: Option<MutexGuard<'a, ()>>,
}

impl Drop for BridgeGuard<'_> {
    fn drop(&mut self) {
        let mut holder = self.lock.holder.lock().unwrap();
        if let Some((_, depth)) = holder.as_mut() {
            if *depth > 1 {
                *depth -= 1;
                return;
            }
        }
        *holder = None;
        // `_inner_guard` (if this was the top-level acquisition) is dropped
        // after this, releasing `inner`.
    }
}

impl ReentrantBridgeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for the current thread, re-entering if this thread
    /// already holds it.
    pub fn acquire(&self) -> BridgeGuard<'_> {
        let me = std::thread::current().id();
        let mut holder = self.holder.lock().unwrap();
        if let Some((owner, depth)) = holder.as_mut() {
            if *owner == me {
                *depth += 1;
                return BridgeGuard { lock: self, _inner_guard: None };
            }
        }
        drop(holder);
        let inner_guard = self.inner.lock().unwrap();
        let mut holder = self.holder.lock().unwrap();
        *holder = Some((me, 1));
        drop(holder);
        BridgeGuard { lock: self, _inner_guard: Some(inner_guard) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_acquire_on_same_thread_does_not_deadlock() {
        let lock = ReentrantBridgeLock::new();
        let outer = lock.acquire();
        let inner = lock.acquire();
        drop(inner);
        drop(outer);
    }
}
