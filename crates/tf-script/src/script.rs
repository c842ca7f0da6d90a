//! Script: a growable list of actions with a cursor and a rollback sequence.
//!
//! Actions may append to the script that is running them; anything added at
//! or beyond the cursor still runs before [`Script::run`] returns. The loop is
//! index based so growing the list mid-run never invalidates iteration.

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use tf_core::{Error, Result};

use crate::action::{Action, ActionRef};
use crate::policy::Policy;
use crate::state::State;

/// An ordered, growable sequence of actions.
///
/// Each action runs at most once per script; the cursor never moves back.
#[derive(Default)]
pub struct Script {
    cursor: usize,
    list: Vec<ActionRef>,
    rollback: Option<Box<Script>>,
}

impl Script {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a script holding the given actions.
    pub fn with_actions(actions: impl IntoIterator<Item = ActionRef>) -> Self {
        Self {
            list: actions.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Append actions to the live list.
    pub fn add(&mut self, actions: impl IntoIterator<Item = ActionRef>) {
        self.list.extend(actions);
    }

    /// Append actions to the rollback sequence, run only after an
    /// unrecovered failure.
    pub fn rollback(&mut self, actions: impl IntoIterator<Item = ActionRef>) {
        self.rollback.get_or_insert_with(Box::default).add(actions);
    }

    /// Append actions both to the live list and to the rollback sequence.
    ///
    /// A deferred action therefore runs once in its position during forward
    /// progress and again if a later failure triggers rollback.
    pub fn defer(&mut self, actions: impl IntoIterator<Item = ActionRef>) {
        let actions: Vec<ActionRef> = actions.into_iter().collect();
        self.rollback(actions.iter().cloned());
        self.add(actions);
    }

    /// Number of actions in the live list, run or not.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Index of the next action to run.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of actions registered for rollback.
    pub fn rollback_len(&self) -> usize {
        self.rollback.as_ref().map_or(0, |rb| rb.len())
    }

    /// Run a single action in this script's context.
    ///
    /// Cancellation is polled (never awaited) before the action starts. On
    /// failure the state's [`Policy`] decides whether the error is logged,
    /// suppressed, and whether the rollback sequence runs. Rollback runs
    /// under a fresh token so the cancellation that caused a failure cannot
    /// also abort the cleanup.
    pub fn run_action<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
        st: &'a mut State,
        action: &'a dyn Action,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tracing::debug!(action = action.name(), "running action");
            let err = match action.run(cancel, st, self).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let policy = st.policy;
            if !policy.is_known() {
                return Err(Error::config(format!(
                    "unknown policy {:#04x} while handling: {err}",
                    policy.bits()
                )));
            }
            if policy.contains(Policy::LOG) {
                st.error(&err);
            }
            let err = if policy.contains(Policy::CONTINUE) {
                tracing::debug!(action = action.name(), "continuing past failure: {err}");
                None
            } else {
                Some(err)
            };
            if policy.contains(Policy::SKIP_ROLLBACK) {
                return err.map_or(Ok(()), Err);
            }
            let Some(err) = err else {
                return Ok(());
            };
            if err.is_usage() {
                return Err(err);
            }
            let Some(rollback) = self.rollback.as_mut() else {
                return Err(err);
            };

            tracing::warn!(action = action.name(), "action failed, rolling back: {err}");
            let fresh = CancellationToken::new();
            match rollback.run(&fresh, st).await {
                Ok(()) => Err(err),
                Err(rollback_err) => Err(Error::rollback(err, rollback_err)),
            }
        })
    }

    /// Run actions from the cursor until the list is exhausted, stopping at
    /// the first error.
    pub fn run<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
        st: &'a mut State,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            while let Some(action) = self.next_action() {
                self.run_action(cancel, st, action.as_ref()).await?;
            }
            Ok(())
        })
    }

    fn next_action(&mut self) -> Option<ActionRef> {
        let action = self.list.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(action)
    }
}

/// Build a script from one action and run it.
pub async fn run(cancel: &CancellationToken, st: &mut State, action: ActionRef) -> Result<()> {
    Script::with_actions([action]).run(cancel, st).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{from_sync_fn, noop};
    use crate::value::Value;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(hits: &Arc<AtomicUsize>) -> ActionRef {
        let hits = hits.clone();
        from_sync_fn(move |_st, _sc| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn fail(msg: &'static str) -> ActionRef {
        from_sync_fn(move |_st, _sc| Err(Error::action(msg)))
    }

    #[tokio::test]
    async fn empty_script_succeeds() {
        let mut st = State::new();
        Script::new().run(&CancellationToken::new(), &mut st).await.unwrap();
    }

    #[tokio::test]
    async fn actions_added_mid_run_still_run() {
        let hits = Arc::new(AtomicUsize::new(0));
        let late = counter(&hits);
        let grow = from_sync_fn(move |_st, sc| {
            sc.add([late.clone(), late.clone()]);
            Ok(())
        });

        let mut sc = Script::with_actions([grow]);
        let mut st = State::new();
        sc.run(&CancellationToken::new(), &mut st).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(sc.cursor(), 3);
    }

    #[tokio::test]
    async fn second_run_does_not_repeat_actions() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut sc = Script::with_actions([counter(&hits)]);
        let mut st = State::new();
        let cancel = CancellationToken::new();
        sc.run(&cancel, &mut st).await.unwrap();
        sc.run(&cancel, &mut st).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_action() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut st = State::new();
        let err = run(&cancel, &mut st, counter(&hits)).await.unwrap_err();
        assert_matches!(err, Error::Cancelled);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_policy_is_config_error() {
        let mut st = State::new();
        st.policy = Policy::from_bits_retain(0x01);
        let err = run(&CancellationToken::new(), &mut st, fail("boom"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Config(msg) if msg.contains("boom"));
    }

    #[tokio::test]
    async fn usage_error_skips_rollback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut sc = Script::with_actions([from_sync_fn(|_st, _sc| Err(Error::usage("help")))]);
        sc.rollback([counter(&hits)]);

        let mut st = State::new();
        let err = sc.run(&CancellationToken::new(), &mut st).await.unwrap_err();
        assert!(err.is_usage());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rollback_runs_even_when_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let hits = Arc::new(AtomicUsize::new(0));

        let mut sc = Script::with_actions([from_sync_fn(move |_st, _sc| {
            trigger.cancel();
            Err(Error::action("interrupted"))
        })]);
        sc.rollback([counter(&hits)]);

        let mut st = State::new();
        let err = sc.run(&cancel, &mut st).await.unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rollback_failure_is_combined() {
        let mut sc = Script::with_actions([fail("build failed")]);
        sc.rollback([fail("cleanup failed")]);

        let mut st = State::new();
        let err = sc.run(&CancellationToken::new(), &mut st).await.unwrap_err();
        assert_matches!(err, Error::Rollback { .. });
        assert_eq!(err.to_string(), "build failed, rollback failed: cleanup failed");
    }

    #[tokio::test]
    async fn defer_registers_in_both_lists() {
        let mut sc = Script::with_actions([noop()]);
        sc.defer([noop(), noop()]);
        assert_eq!(sc.len(), 3);
        assert_eq!(sc.rollback_len(), 2);
    }

    #[tokio::test]
    async fn sub_action_runs_under_current_policy() {
        let parent = from_fn_sub();
        let mut st = State::new();
        st.policy = Policy::CONTINUE;
        run(&CancellationToken::new(), &mut st, parent).await.unwrap();
        assert_eq!(st.get("after"), Some(&Value::Bool(true)));
    }

    fn from_fn_sub() -> ActionRef {
        crate::action::from_fn(|cancel, st, sc| {
            Box::pin(async move {
                let child = fail("ignored");
                let res = sc.run_action(cancel, st, child.as_ref()).await;
                st.set("after", res.is_ok());
                Ok(())
            })
        })
    }
}
