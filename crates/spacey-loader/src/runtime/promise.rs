// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Single-settlement promises for asynchronous module consumers
//!
//! A [`Promise`] is a cloneable future; every clone observes the same
//! settlement. [`Deferred`] is the producer side. Settling twice is a no-op.

use crate::error::LoaderError;
use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

/// Unique ID generator for promises
static PROMISE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Promise state
#[derive(Debug, Clone)]
pub enum PromiseState {
    /// Neither fulfilled nor rejected
    Pending,
    /// Completed with a value
    Fulfilled(Value),
    /// Failed with a loader error
    Rejected(LoaderError),
}

struct PromiseInner {
    id: u64,
    state: PromiseState,
    /// Tasks waiting for settlement
    waiters: Vec<Waker>,
}

/// A shared handle on an eventual module value
#[derive(Clone)]
pub struct Promise(Rc<RefCell<PromiseInner>>);

impl Promise {
    fn with_state(state: PromiseState) -> Self {
        Self(Rc::new(RefCell::new(PromiseInner {
            id: PROMISE_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
            state,
            waiters: Vec::new(),
        })))
    }

    /// Create a pending promise
    pub fn pending() -> Self {
        Self::with_state(PromiseState::Pending)
    }

    /// Create an already fulfilled promise
    pub fn resolved(value: Value) -> Self {
        Self::with_state(PromiseState::Fulfilled(value))
    }

    /// Create an already rejected promise
    pub fn rejected(reason: LoaderError) -> Self {
        Self::with_state(PromiseState::Rejected(reason))
    }

    /// Unique id, for logging
    pub fn id(&self) -> u64 {
        self.0.borrow().id
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PromiseState {
        self.0.borrow().state.clone()
    }

    /// Check if promise is pending
    pub fn is_pending(&self) -> bool {
        matches!(self.0.borrow().state, PromiseState::Pending)
    }

    /// Check if promise is fulfilled
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.0.borrow().state, PromiseState::Fulfilled(_))
    }

    /// Check if promise is rejected
    pub fn is_rejected(&self) -> bool {
        matches!(self.0.borrow().state, PromiseState::Rejected(_))
    }

    /// Whether both handles share the same settlement
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn settle(&self, state: PromiseState) -> bool {
        let waiters = {
            let mut inner = self.0.borrow_mut();
            if !matches!(inner.state, PromiseState::Pending) {
                return false; // Already settled
            }
            inner.state = state;
            std::mem::take(&mut inner.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
        true
    }
}

impl Future for Promise {
    type Output = Result<Value, LoaderError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.0.borrow_mut();
        match &inner.state {
            PromiseState::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            PromiseState::Rejected(reason) => Poll::Ready(Err(reason.clone())),
            PromiseState::Pending => {
                if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.waiters.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Promise")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .finish()
    }
}

/// A promise together with its resolve/reject controls
#[derive(Clone, Debug)]
pub struct Deferred {
    promise: Promise,
}

impl Deferred {
    /// Create a pending deferred
    pub fn new() -> Self {
        Self {
            promise: Promise::pending(),
        }
    }

    /// The consumer side
    pub fn promise(&self) -> Promise {
        self.promise.clone()
    }

    /// Fulfill; returns false if already settled
    pub fn resolve(&self, value: Value) -> bool {
        let settled = self.promise.settle(PromiseState::Fulfilled(value));
        if settled {
            tracing::trace!("promise {} fulfilled", self.promise.id());
        }
        settled
    }

    /// Reject; returns false if already settled
    pub fn reject(&self, reason: LoaderError) -> bool {
        let settled = self.promise.settle(PromiseState::Rejected(reason));
        if settled {
            tracing::trace!("promise {} rejected", self.promise.id());
        }
        settled
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_settles_once() {
        let deferred = Deferred::new();
        assert!(deferred.resolve(Value::from("first")));
        assert!(!deferred.resolve(Value::from("second")));
        assert!(!deferred.reject(LoaderError::Config("late".into())));

        let result = deferred.promise().now_or_never().unwrap();
        assert_eq!(result.unwrap().as_str(), Some("first"));
    }

    #[test]
    fn test_pending_until_settled() {
        let deferred = Deferred::new();
        let promise = deferred.promise();
        assert!(promise.clone().now_or_never().is_none());

        deferred.reject(LoaderError::Config("boom".into()));
        assert!(promise.is_rejected());
        assert!(promise.now_or_never().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_to_many_consumers() {
        let deferred = Deferred::new();
        let first = deferred.promise();
        let second = deferred.promise();
        assert!(first.ptr_eq(&second));

        let resolver = deferred.clone();
        let local = tokio::task::LocalSet::new();
        let (a, b) = local
            .run_until(async move {
                tokio::task::spawn_local(async move {
                    tokio::task::yield_now().await;
                    resolver.resolve(Value::Number(7.0));
                });
                futures::join!(first, second)
            })
            .await;

        assert_eq!(a.unwrap().as_number(), Some(7.0));
        assert_eq!(b.unwrap().as_number(), Some(7.0));
    }
}
