//! The [`Action`] trait defines a single unit of work.
//!
//! Actions receive the run's cancellation token, the shared [`State`] and the
//! enclosing [`Script`]. Through the script they may append further actions,
//! register rollback or deferred cleanup, or run a sub-action under the
//! current policy.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use tf_core::Result;

use crate::script::Script;
use crate::state::State;

/// A single unit of work.
#[async_trait]
pub trait Action: Send + Sync {
    /// A short, human-readable name used in log events.
    fn name(&self) -> &str {
        "action"
    }

    /// Perform the work.
    ///
    /// The engine checks `cancel` before invoking an action; long-running
    /// actions are responsible for honouring it internally.
    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        sc: &mut Script,
    ) -> Result<()>;
}

/// Shared handle to an action. Scripts, switches and command trees all hold
/// actions through this type.
pub type ActionRef = Arc<dyn Action>;

/// An action backed by an async closure.
pub struct FnAction<F> {
    f: F,
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'a> Fn(&'a CancellationToken, &'a mut State, &'a mut Script) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        sc: &mut Script,
    ) -> Result<()> {
        (self.f)(cancel, st, sc).await
    }
}

/// Wrap an async closure as an action.
///
/// ```
/// use tf_script::{from_fn, State};
///
/// let greet = from_fn(|_cancel, st, _sc| {
///     Box::pin(async move {
///         st.log("hello");
///         Ok(())
///     })
/// });
/// # let _ = greet;
/// ```
pub fn from_fn<F>(f: F) -> ActionRef
where
    F: for<'a> Fn(&'a CancellationToken, &'a mut State, &'a mut Script) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnAction { f })
}

/// An action backed by a synchronous closure.
pub struct SyncFnAction<F> {
    f: F,
}

#[async_trait]
impl<F> Action for SyncFnAction<F>
where
    F: Fn(&mut State, &mut Script) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        "sync fn"
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        st: &mut State,
        sc: &mut Script,
    ) -> Result<()> {
        (self.f)(st, sc)
    }
}

/// Wrap a synchronous closure as an action. Most bookkeeping actions (set a
/// bucket key, register cleanup) never await anything.
pub fn from_sync_fn<F>(f: F) -> ActionRef
where
    F: Fn(&mut State, &mut Script) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(SyncFnAction { f })
}

struct Noop;

#[async_trait]
impl Action for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        _st: &mut State,
        _sc: &mut Script,
    ) -> Result<()> {
        Ok(())
    }
}

/// An action that does nothing.
pub fn noop() -> ActionRef {
    Arc::new(Noop)
}
