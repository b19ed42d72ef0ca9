//! Result of an auto-mode walk

use futures::future::{self, FutureExt, LocalBoxFuture};
use std::fmt;
use tagson_format::{Result, Shape};

/// Either a finished result or one still waiting on deferred values
pub enum Outcome<T> {
    /// Completed in place
    Ready(T),
    /// Completes once every deferred branch settles
    Pending(LocalBoxFuture<'static, Result<T>>),
}

impl<T: 'static> Outcome<T> {
    /// Whether the walk completed in place
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    /// Shape of the walk
    pub fn shape(&self) -> Shape {
        match self {
            Outcome::Ready(_) => Shape::Sync,
            Outcome::Pending(_) => Shape::Async,
        }
    }

    /// Finished result, if any
    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(value) => Some(value),
            Outcome::Pending(_) => None,
        }
    }

    /// Chain a fallible conversion onto the result
    ///
    /// A ready result is converted immediately and its error returned; a
    /// pending one is converted once it settles.
    pub fn and_then<U, F>(self, f: F) -> Result<Outcome<U>>
    where
        U: 'static,
        F: FnOnce(T) -> Result<U> + 'static,
    {
        match self {
            Outcome::Ready(value) => f(value).map(Outcome::Ready),
            Outcome::Pending(fut) => Ok(Outcome::Pending(
                fut.map(|result| result.and_then(f)).boxed_local(),
            )),
        }
    }

    /// Await the result whatever its shape
    pub fn into_future(self) -> LocalBoxFuture<'static, Result<T>> {
        match self {
            Outcome::Ready(value) => future::ready(Ok(value)).boxed_local(),
            Outcome::Pending(fut) => fut,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Outcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
