//! `RuleCollection`: a thread-safe ordered multiset with O(1) membership,
//! O(1) rotation, and a lazy restartable round-robin sequence that tolerates
//! concurrent mutation between yields.
//!
//! Modeled as an explicit cursor index into a `Mutex<Vec<R>>` rather than a
//! generator closing over borrowed state, per the Design Note's suggested
//! fix: the cursor is just a counter, taken modulo the collection's current
//! length on every step, so it can never point past the end even if the
//! just-yielded rule (or any other) was removed concurrently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::rules::{Allowance, ClientRule, RuleIdentity};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("rule not found")]
pub struct RuleNotFound;

/// A thread-safe ordered multiset of rules, used by both client and server
/// workers to hold the slice of rules the controller assigned them.
pub struct RuleCollection<R> {
    inner: Arc<Mutex<Vec<R>>>,
    cursor: Arc<AtomicUsize>,
}

impl<R> Default for RuleCollection<R> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<R> Clone for RuleCollection<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cursor: Arc::clone(&self.cursor),
        }
    }
}

impl<R: RuleIdentity + PartialEq> RuleCollection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` if absent (by equality); no-op if already present.
    pub fn add(&self, rule: R) {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        if !inner.contains(&rule) {
            inner.push(rule);
        }
    }

    /// Remove `rule` by equality. `Err(RuleNotFound)` if absent.
    pub fn delete(&self, rule: &R) -> Result<(), RuleNotFound> {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        match inner.iter().position(|r| r == rule) {
            Some(pos) => {
                inner.remove(pos);
                Ok(())
            }
            None => Err(RuleNotFound),
        }
    }

    /// Adds every rule in `rules` under a single lock acquisition, so a
    /// concurrent `delete_all` of the same set can never observe a
    /// partially-added state.
    pub fn add_all(&self, rules: Vec<R>) {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        for rule in rules {
            if !inner.contains(&rule) {
                inner.push(rule);
            }
        }
    }

    /// Removes every rule in `rules` under a single lock acquisition.
    /// `Err(RuleNotFound)` if any one of them is absent, in which case none
    /// are removed.
    pub fn delete_all(&self, rules: &[R]) -> Result<(), RuleNotFound> {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        for rule in rules {
            if !inner.contains(rule) {
                return Err(RuleNotFound);
            }
        }
        for rule in rules {
            if let Some(pos) = inner.iter().position(|r| r == rule) {
                inner.remove(pos);
            }
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.inner.lock().expect("rule collection mutex poisoned").clear();
    }

    pub fn count(&self) -> usize {
        self.inner.lock().expect("rule collection mutex poisoned").len()
    }

    pub fn contains(&self, rule: &R) -> bool {
        self.inner
            .lock()
            .expect("rule collection mutex poisoned")
            .contains(rule)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl<R: RuleIdentity + PartialEq> RuleCollection<R> {
    /// Flips `rule`'s enabled flag in place (found by identity, invariant
    /// 2). `Err(RuleNotFound)` if `rule` isn't in the collection.
    pub fn set_enabled(&self, rule: &R, enabled: bool) -> Result<(), RuleNotFound> {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        match inner.iter_mut().find(|r| *r == rule) {
            Some(found) => {
                found.set_enabled(enabled);
                Ok(())
            }
            None => Err(RuleNotFound),
        }
    }
}

impl RuleCollection<ClientRule> {
    /// Sets the matching rule's `allowed` field in place. The rule is
    /// located by its *current* identity (which includes `allowed`), so
    /// `rule` must carry the old `Allowance` the collection still has on
    /// file. `Err(RuleNotFound)` if no rule with that identity is present.
    pub fn set_allowed(&self, rule: &ClientRule, allowed: Allowance) -> Result<(), RuleNotFound> {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        match inner.iter_mut().find(|r| *r == rule) {
            Some(found) => {
                found.allowed = allowed;
                Ok(())
            }
            None => Err(RuleNotFound),
        }
    }

    /// Sets the matching rule's `request_count`, clamped to a minimum of 1
    /// per invariant 3. `request_count` isn't part of identity, so `rule`
    /// doesn't need updating first.
    pub fn set_request_count(&self, rule: &ClientRule, request_count: u32) -> Result<(), RuleNotFound> {
        let mut inner = self.inner.lock().expect("rule collection mutex poisoned");
        match inner.iter_mut().find(|r| *r == rule) {
            Some(found) => {
                found.request_count = request_count.max(1);
                Ok(())
            }
            None => Err(RuleNotFound),
        }
    }
}

impl<R: RuleIdentity + PartialEq + Clone> RuleCollection<R> {
    /// A lazy, restartable round-robin sequence. Cycles indefinitely while
    /// the collection is non-empty; terminates (`next() == None`) the
    /// moment the collection is observed empty. Safe to call concurrently
    /// with `add`/`delete` on the same collection.
    pub fn round_robin(&self) -> RoundRobin<R> {
        RoundRobin {
            inner: Arc::clone(&self.inner),
            cursor: Arc::clone(&self.cursor),
        }
    }
}

/// Iterator produced by [`RuleCollection::round_robin`].
pub struct RoundRobin<R> {
    inner: Arc<Mutex<Vec<R>>>,
    cursor: Arc<AtomicUsize>,
}

impl<R: Clone> Iterator for RoundRobin<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        let inner = self.inner.lock().expect("rule collection mutex poisoned");
        if inner.is_empty() {
            return None;
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % inner.len();
        Some(inner[idx].clone())
    }
}
