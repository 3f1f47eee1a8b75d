//! Named handler chains and the policies used to combine their results.
//!
//! Every extension point of the pipeline is a [`Callback`]: a name plus an
//! ordered list of handlers that all receive the same `&mut` context. What
//! happens to the handlers' return values depends on the call site:
//!
//! | Policy | Method | Used for |
//! |--------|--------|----------|
//! | until-truthy-default | [`Callback::run_until`] | `pathinfo`, `filelist`, `handle` |
//! | first-non-null-else-default | [`Callback::run_first`] | `renderer`, `preformat` |
//! | collect-mapped | [`Callback::run_collect`] | `prepare`, `entryparser`, ... |
//!
//! Handlers return `Ok(None)` to pass. An `Err` stops the chain on the spot
//! and is returned to the caller; the registered handlers are untouched, so
//! the next invocation starts from a clean slate.

use std::fmt;
use thiserror::Error;

/// Failure raised by a single handler.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("handler #{position} of callback '{name}' failed: {source}")]
    Handler {
        name: &'static str,
        position: usize,
        #[source]
        source: HandlerError,
    },
}

pub type HandlerResult<R> = Result<Option<R>, HandlerError>;

type BoxedHandler<C, R> = Box<dyn Fn(&mut C) -> HandlerResult<R> + Send + Sync>;

/// Where a handler lands in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Registration order.
    #[default]
    Normal,
    /// After every `Normal` handler, in registration order among themselves.
    Last,
}

struct Registered<C: ?Sized, R> {
    priority: Priority,
    handler: BoxedHandler<C, R>,
}

/// An ordered chain of handlers for one named extension point.
pub struct Callback<C: ?Sized, R> {
    name: &'static str,
    handlers: Vec<Registered<C, R>>,
}

impl<C: ?Sized, R> Callback<C, R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Add a handler. Position is fixed here: `Normal` handlers go in front
    /// of any `Last` handler, `Last` handlers go to the end.
    pub fn register<F>(&mut self, priority: Priority, handler: F)
    where
        F: Fn(&mut C) -> HandlerResult<R> + Send + Sync + 'static,
    {
        let entry = Registered {
            priority,
            handler: Box::new(handler),
        };
        match priority {
            Priority::Last => self.handlers.push(entry),
            Priority::Normal => {
                let at = self
                    .handlers
                    .iter()
                    .position(|h| h.priority == Priority::Last)
                    .unwrap_or(self.handlers.len());
                self.handlers.insert(at, entry);
            }
        }
    }

    fn call(&self, position: usize, ctx: &mut C) -> Result<Option<R>, CallbackError> {
        (self.handlers[position].handler)(ctx).map_err(|source| CallbackError::Handler {
            name: self.name,
            position,
            source,
        })
    }

    /// Until-truthy-default: the first result satisfying `done` wins.
    /// Results that don't satisfy it are dropped. Falls back to `default`.
    pub fn run_until<D, F>(&self, ctx: &mut C, done: D, default: F) -> Result<R, CallbackError>
    where
        D: Fn(&R) -> bool,
        F: FnOnce(&mut C) -> Result<R, CallbackError>,
    {
        for position in 0..self.handlers.len() {
            if let Some(result) = self.call(position, ctx)?
                && done(&result)
            {
                return Ok(result);
            }
        }
        default(ctx)
    }

    /// First-non-null-else-default: the first handler returning a value wins.
    pub fn run_first<F>(&self, ctx: &mut C, default: F) -> Result<R, CallbackError>
    where
        F: FnOnce(&mut C) -> Result<R, CallbackError>,
    {
        self.run_until(ctx, |_| true, default)
    }

    /// Collect-mapped: every handler runs; each returned value is folded
    /// into an accumulator seeded with `default(ctx)`.
    pub fn run_collect<F, M>(&self, ctx: &mut C, default: F, combine: M) -> Result<R, CallbackError>
    where
        F: FnOnce(&mut C) -> Result<R, CallbackError>,
        M: Fn(R, R) -> R,
    {
        let mut acc = default(ctx)?;
        for position in 0..self.handlers.len() {
            if let Some(result) = self.call(position, ctx)? {
                acc = combine(acc, result);
            }
        }
        Ok(acc)
    }
}

impl<C: ?Sized> Callback<C, ()> {
    /// Run every handler for its side effects on the context.
    pub fn run_all(&self, ctx: &mut C) -> Result<(), CallbackError> {
        self.run_collect(ctx, |_| Ok(()), |(), ()| ())
    }
}

impl<C: ?Sized, R> fmt::Debug for Callback<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
