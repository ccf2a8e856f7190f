// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Single-assignment values with many observers
//!
//! A [`Deferred`] starts unsettled, is resolved or rejected exactly once, and
//! can be awaited by any number of holders. Clones share the same slot.
//! Settling a deferred twice is an error: the second call returns
//! [`StepError::AlreadySettled`] and the first outcome is kept.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::exec::StepError;

type Slot<T> = Option<Result<T, StepError>>;

pub struct Deferred<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    /// Create an unsettled deferred
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a deferred that is already resolved
    pub fn resolved(value: T) -> Self {
        let (tx, _rx) = watch::channel(Some(Ok(value)));
        Self { tx: Arc::new(tx) }
    }

    pub fn resolve(&self, value: T) -> Result<(), StepError> {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: StepError) -> Result<(), StepError> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, StepError>) -> Result<(), StepError> {
        let mut applied = false;
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            applied = true;
            true
        });

        if applied {
            Ok(())
        } else {
            Err(StepError::AlreadySettled)
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Outcome if already settled, without waiting
    pub fn peek(&self) -> Option<Result<T, StepError>> {
        self.tx.borrow().clone()
    }

    /// Wait for the outcome
    pub async fn wait(&self) -> Result<T, StepError> {
        self.observer().wait().await
    }

    /// Detached observer that does not keep the deferred alive
    ///
    /// If every `Deferred` handle is dropped before settling, observers
    /// receive [`StepError::Abandoned`].
    pub fn observer(&self) -> DeferredObserver<T> {
        DeferredObserver {
            rx: self.tx.subscribe(),
        }
    }

    /// True when both handles share the same slot
    pub fn ptr_eq(&self, other: &Deferred<T>) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.tx.borrow() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

/// Read side of a [`Deferred`]
pub struct DeferredObserver<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T: Clone> DeferredObserver<T> {
    pub async fn wait(mut self) -> Result<T, StepError> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or(Err(StepError::Abandoned)),
            Err(_) => Err(StepError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_many_waiters_observe_same_value() {
        let deferred = Deferred::<i32>::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let d = deferred.clone();
                tokio::spawn(async move { d.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        deferred.resolve(7).unwrap();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(7));
        }
    }

    #[tokio::test]
    async fn test_second_settle_is_rejected_and_first_outcome_kept() {
        let deferred = Deferred::<i32>::new();
        assert!(!deferred.is_settled());

        deferred.resolve(1).unwrap();
        assert_eq!(deferred.resolve(2), Err(StepError::AlreadySettled));
        assert_eq!(
            deferred.reject(StepError::Abandoned),
            Err(StepError::AlreadySettled)
        );

        assert_eq!(deferred.wait().await, Ok(1));
        assert_eq!(deferred.peek(), Some(Ok(1)));
    }

    #[tokio::test]
    async fn test_reject_reaches_late_observers() {
        let deferred = Deferred::<i32>::new();
        let error = StepError::LoadFailed {
            loader: "users".to_string(),
            message: "boom".to_string(),
        };
        deferred.reject(error.clone()).unwrap();

        // attached after settling
        assert_eq!(deferred.wait().await, Err(error.clone()));
        assert_eq!(deferred.clone().wait().await, Err(error));
    }

    #[tokio::test]
    async fn test_resolved_deferred_is_settled_from_the_start() {
        let deferred = Deferred::resolved("ready".to_string());
        assert!(deferred.is_settled());
        assert_eq!(deferred.peek(), Some(Ok("ready".to_string())));
        assert_eq!(
            deferred.resolve("late".to_string()),
            Err(StepError::AlreadySettled)
        );
        assert_eq!(deferred.wait().await, Ok("ready".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_deferred_abandons_observers() {
        let deferred = Deferred::<i32>::new();
        let observer = deferred.observer();
        drop(deferred);
        assert_eq!(observer.wait().await, Err(StepError::Abandoned));
    }

    #[test]
    fn test_clones_share_slot() {
        let a = Deferred::<i32>::new();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Deferred::new()));

        b.resolve(3).unwrap();
        assert_eq!(a.peek(), Some(Ok(3)));
        assert_eq!(format!("{:?}", a), "Deferred { state: \"resolved\" }");
    }
}
