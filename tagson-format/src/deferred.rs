//! Deferred values
//!
//! A [`Deferred`] is a promise-like handle on a value that may not be
//! available yet. It is backed by a shared local future, so it can be cloned,
//! awaited from several places and inspected without being driven.
//! Scheduling is cooperative: any single-threaded executor can drive it.

use crate::constants::DEFERRED_TAG;
use crate::error::{Result, TagsonError};
use crate::value::Value;
use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::rc::Rc;

type SharedSettle = Shared<LocalBoxFuture<'static, Result<Value>>>;

/// Observable state of a deferred value
#[derive(Debug, Clone)]
pub enum DeferredState {
    /// Not settled yet
    Pending,
    /// Settled with a value
    Fulfilled(Value),
    /// Settled with an error
    Rejected(TagsonError),
}

/// Promise-like value
#[derive(Clone)]
pub struct Deferred {
    tag: &'static str,
    inner: Rc<SharedSettle>,
}

/// Settles the deferred value returned alongside it by [`Deferred::channel`]
pub struct Resolver {
    sender: oneshot::Sender<Result<Value>>,
}

impl Resolver {
    /// Fulfil with `value`; a deferred `value` is followed
    pub fn resolve(self, value: impl Into<Value>) {
        let _ = self.sender.send(Ok(value.into()));
    }

    /// Reject with `error`
    pub fn reject(self, error: TagsonError) {
        let _ = self.sender.send(Err(error));
    }
}

impl Deferred {
    /// Wrap a future; a deferred output is flattened
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value>> + 'static,
    {
        let settle = async move {
            let mut value = fut.await?;
            while let Value::Deferred(next) = value {
                value = next.into_future().await?;
            }
            Ok(value)
        };
        Deferred {
            tag: DEFERRED_TAG,
            inner: Rc::new(settle.boxed_local().shared()),
        }
    }

    /// Deferred value settled later through the returned [`Resolver`]
    pub fn channel() -> (Deferred, Resolver) {
        let (sender, receiver) = oneshot::channel();
        let deferred = Deferred::from_future(async move {
            receiver
                .await
                .unwrap_or(Err(TagsonError::ResolverDropped))
        });
        (deferred, Resolver { sender })
    }

    /// Already fulfilled deferred; a deferred input is returned as is
    pub fn resolve(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Deferred(d) => d,
            other => Deferred::from_future(future::ready(Ok(other))),
        }
    }

    /// Already rejected deferred
    pub fn reject(error: TagsonError) -> Self {
        Deferred::from_future(future::ready(Err(error)))
    }

    /// Chain a fulfilment handler
    ///
    /// The handler may return another deferred, which is flattened; an error
    /// from the handler rejects the result. Rejections pass through.
    pub fn then<F>(&self, on_fulfilled: F) -> Deferred
    where
        F: FnOnce(Value) -> Result<Value> + 'static,
    {
        let this = self.clone();
        Deferred::from_future(async move { on_fulfilled(this.into_future().await?) })
    }

    /// Chain both a fulfilment and a rejection handler
    pub fn then_else<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Deferred
    where
        F: FnOnce(Value) -> Result<Value> + 'static,
        R: FnOnce(TagsonError) -> Result<Value> + 'static,
    {
        let this = self.clone();
        Deferred::from_future(async move {
            match this.into_future().await {
                Ok(value) => on_fulfilled(value),
                Err(err) => on_rejected(err),
            }
        })
    }

    /// Recover from a rejection
    pub fn catch<R>(&self, on_rejected: R) -> Deferred
    where
        R: FnOnce(TagsonError) -> Result<Value> + 'static,
    {
        self.then_else(Ok, on_rejected)
    }

    /// Array of all results in input order
    ///
    /// Non-deferred inputs count as fulfilled. The first rejection rejects the
    /// whole result.
    pub fn all<I>(values: I) -> Deferred
    where
        I: IntoIterator<Item = Value>,
    {
        let parts: Vec<_> = values
            .into_iter()
            .map(|v| Deferred::resolve(v).into_future())
            .collect();
        Deferred::from_future(async move {
            let settled = future::try_join_all(parts).await?;
            Ok(Value::array(settled))
        })
    }

    /// Settles like the first input to settle; ties go to the earlier input
    ///
    /// An empty input never settles.
    pub fn race<I>(values: I) -> Deferred
    where
        I: IntoIterator<Item = Value>,
    {
        let parts: Vec<_> = values
            .into_iter()
            .map(|v| Deferred::resolve(v).into_future())
            .collect();
        if parts.is_empty() {
            return Deferred::from_future(future::pending());
        }
        Deferred::from_future(async move {
            let (first, _, _) = future::select_all(parts).await;
            first
        })
    }

    /// Current state without driving the underlying future
    pub fn state(&self) -> DeferredState {
        match self.inner.peek() {
            None => DeferredState::Pending,
            Some(Ok(value)) => DeferredState::Fulfilled(value.clone()),
            Some(Err(err)) => DeferredState::Rejected(err.clone()),
        }
    }

    /// Identity tag
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Identity of this deferred value
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl IntoFuture for Deferred {
    type Output = Result<Value>;
    type IntoFuture = SharedSettle;

    fn into_future(self) -> Self::IntoFuture {
        (*self.inner).clone()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.peek() {
            None => "pending",
            Some(Ok(_)) => "fulfilled",
            Some(Err(_)) => "rejected",
        };
        write!(f, "Deferred<{}>", state)
    }
}

/// Whether `value` is a deferred value, judged by its identity tag
pub fn is_deferred(value: &Value) -> bool {
    matches!(value, Value::Deferred(d) if d.tag() == DEFERRED_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn resolve_flattens_and_reports_state() {
        let d = Deferred::resolve(5);
        assert!(matches!(d.state(), DeferredState::Pending));
        assert_eq!(block_on(d.clone().into_future()).unwrap(), Value::Number(5.0));
        assert!(matches!(d.state(), DeferredState::Fulfilled(Value::Number(n)) if n == 5.0));

        let nested = Deferred::resolve(Value::Deferred(d.clone()));
        assert_eq!(nested.addr(), d.addr());
    }

    #[test]
    fn then_flattens_returned_deferred() {
        let d = Deferred::resolve(2).then(|v| {
            let n = v.as_f64().unwrap_or_default();
            Ok(Value::Deferred(Deferred::resolve(n * 10.0)))
        });
        assert_eq!(block_on(d.into_future()).unwrap(), Value::Number(20.0));
    }

    #[test]
    fn handler_error_rejects_and_catch_recovers() {
        let failed = Deferred::resolve(1).then(|_| Err(TagsonError::custom("nope")));
        let err = block_on(failed.clone().into_future()).unwrap_err();
        assert_eq!(err.to_string(), "nope");

        let recovered = failed.catch(|e| Ok(Value::from(e.to_string())));
        assert_eq!(
            block_on(recovered.into_future()).unwrap(),
            Value::from("nope")
        );
    }

    #[test]
    fn channel_settles_later() {
        let (d, resolver) = Deferred::channel();
        assert!(matches!(d.state(), DeferredState::Pending));
        resolver.resolve("done");
        assert_eq!(block_on(d.into_future()).unwrap(), Value::from("done"));
    }

    #[test]
    fn dropped_resolver_rejects() {
        let (d, resolver) = Deferred::channel();
        drop(resolver);
        assert!(matches!(
            block_on(d.into_future()),
            Err(TagsonError::ResolverDropped)
        ));
    }

    #[test]
    fn all_keeps_input_order() {
        let (slow, slow_resolver) = Deferred::channel();
        let fast = Deferred::resolve(3);
        let all = Deferred::all(vec![
            Value::Deferred(slow),
            Value::from(2),
            Value::Deferred(fast),
        ]);
        slow_resolver.resolve(1);
        let result = block_on(all.into_future()).unwrap();
        assert_eq!(result, Value::array([1, 2, 3]));
    }

    #[test]
    fn all_rejects_on_first_error() {
        let all = Deferred::all(vec![
            Value::from(1),
            Value::Deferred(Deferred::reject(TagsonError::custom("bad"))),
        ]);
        assert!(block_on(all.into_future()).is_err());
    }

    #[test]
    fn race_prefers_earlier_input_on_tie() {
        let race = Deferred::race(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(block_on(race.into_future()).unwrap(), Value::from("a"));

        let (never, _keep) = Deferred::channel();
        let race = Deferred::race(vec![Value::Deferred(never), Value::from("b")]);
        assert_eq!(block_on(race.into_future()).unwrap(), Value::from("b"));
    }

    #[test]
    fn tag_identifies_deferreds() {
        assert!(is_deferred(&Value::Deferred(Deferred::resolve(1))));
        assert!(!is_deferred(&Value::object()));
    }
}
