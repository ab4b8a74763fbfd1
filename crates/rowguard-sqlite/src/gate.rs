// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The isolation gate: one transaction owner at a time.
//!
//! SQLite admits a single writer per database, and the sessions of one
//! process share that limit. The gate makes it explicit: a session must win
//! the gate before it issues `BEGIN`, and a second session asking while the
//! gate is held fails immediately instead of waiting on the file lock.
//!
//! Every file session opened through the same gate competes for it, whatever
//! database file it points at. Create one gate per process and hand it to
//! every connector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rowguard_core::{IsolationLevel, RowGuardError};
use tracing::debug;

/// Identifies one session to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateToken(u64);

#[derive(Debug, Default)]
struct GateState {
    level: IsolationLevel,
    owner: Option<GateToken>,
}

/// Shared isolation state guarded by a mutex.
#[derive(Debug, Default)]
pub struct IsolationGate {
    state: Mutex<GateState>,
    next_token: AtomicU64,
}

impl IsolationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a token for a newly opened session.
    pub fn register(&self) -> GateToken {
        GateToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The state is two plain values; a panic mid-update cannot tear it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the gate for `token` at `level`.
    ///
    /// Fails with `TransactionState` when any session, `token` included,
    /// already holds a non-`NoLock` level.
    pub fn try_acquire(&self, token: GateToken, level: IsolationLevel) -> Result<(), RowGuardError> {
        if !level.is_transaction() {
            return Ok(());
        }
        let mut state = self.lock();
        if let Some(owner) = state.owner {
            let holder = if owner == token {
                "this session".to_string()
            } else {
                format!("session #{}", owner.0)
            };
            return Err(RowGuardError::TransactionState(format!(
                "cannot begin {level}: {holder} already holds a {} transaction",
                state.level
            )));
        }
        state.level = level;
        state.owner = Some(token);
        debug!(session = token.0, %level, "isolation gate acquired");
        Ok(())
    }

    /// Resets the gate to `NoLock` if `token` holds it. Returns whether it did.
    pub fn release(&self, token: GateToken) -> bool {
        let mut state = self.lock();
        if state.owner != Some(token) {
            return false;
        }
        debug!(session = token.0, level = %state.level, "isolation gate released");
        state.level = IsolationLevel::NoLock;
        state.owner = None;
        true
    }

    /// The level currently held, `NoLock` when free.
    pub fn current(&self) -> IsolationLevel {
        self.lock().level
    }

    pub fn is_held_by(&self, token: GateToken) -> bool {
        self.lock().owner == Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_owner_is_rejected_until_release() {
        let gate = IsolationGate::new();
        let a = gate.register();
        let b = gate.register();

        gate.try_acquire(a, IsolationLevel::Exclusive).unwrap();
        assert_eq!(gate.current(), IsolationLevel::Exclusive);

        let err = gate.try_acquire(b, IsolationLevel::Deferred).unwrap_err();
        assert!(matches!(err, RowGuardError::TransactionState(_)));

        assert!(gate.release(a));
        assert_eq!(gate.current(), IsolationLevel::NoLock);
        gate.try_acquire(b, IsolationLevel::Deferred).unwrap();
        assert!(gate.is_held_by(b));
    }

    #[test]
    fn reentrant_begin_is_rejected() {
        let gate = IsolationGate::new();
        let a = gate.register();
        gate.try_acquire(a, IsolationLevel::Immediate).unwrap();
        let err = gate.try_acquire(a, IsolationLevel::Immediate).unwrap_err();
        assert!(err.to_string().contains("this session"));
    }

    #[test]
    fn release_by_non_owner_is_ignored() {
        let gate = IsolationGate::new();
        let a = gate.register();
        let b = gate.register();
        gate.try_acquire(a, IsolationLevel::Exclusive).unwrap();
        assert!(!gate.release(b));
        assert!(gate.is_held_by(a));
    }

    #[test]
    fn nolock_never_claims_the_gate() {
        let gate = IsolationGate::new();
        let a = gate.register();
        let b = gate.register();
        gate.try_acquire(a, IsolationLevel::NoLock).unwrap();
        gate.try_acquire(b, IsolationLevel::Exclusive).unwrap();
        gate.try_acquire(a, IsolationLevel::NoLock).unwrap();
    }

    #[test]
    fn tokens_are_unique() {
        let gate = IsolationGate::new();
        assert_ne!(gate.register(), gate.register());
    }
}
