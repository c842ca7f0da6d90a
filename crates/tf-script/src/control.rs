//! Control-flow combinators built on [`Script`] and [`State`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tf_core::Result;

use crate::action::{from_sync_fn, Action, ActionRef};
use crate::policy::{Branch, Policy};
use crate::script::Script;
use crate::state::State;
use crate::value::SharedWriter;

/// See [`switch`].
pub struct Switch {
    probe: ActionRef,
    cases: HashMap<Branch, ActionRef>,
}

#[async_trait]
impl Action for Switch {
    fn name(&self) -> &str {
        "switch"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        sc: &mut Script,
    ) -> Result<()> {
        sc.run_action(cancel, st, self.probe.as_ref()).await?;
        let branch = std::mem::take(&mut st.branch);
        match self.cases.get(&branch) {
            Some(next) => sc.run_action(cancel, st, next.as_ref()).await,
            None => Ok(()),
        }
    }
}

/// Run `probe`, then run the case matching the branch tag it left behind.
///
/// The tag is reset to [`Branch::UNSET`] before dispatch so it cannot leak
/// into the next switch. A failing probe propagates without consulting the
/// cases.
pub fn switch(probe: ActionRef, cases: impl IntoIterator<Item = (Branch, ActionRef)>) -> ActionRef {
    Arc::new(Switch {
        probe,
        cases: cases.into_iter().collect(),
    })
}

/// An action that sets the branch tag.
pub fn set_branch(branch: Branch) -> ActionRef {
    from_sync_fn(move |st, _sc| {
        st.branch = branch;
        Ok(())
    })
}

/// See [`with_policy`].
pub struct WithPolicy {
    policy: Policy,
    action: ActionRef,
}

#[async_trait]
impl Action for WithPolicy {
    fn name(&self) -> &str {
        "with policy"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        sc: &mut Script,
    ) -> Result<()> {
        let orig = std::mem::replace(&mut st.policy, self.policy);
        let res = sc.run_action(cancel, st, self.action.as_ref()).await;
        st.policy = orig;
        res
    }
}

/// Run `action` with `policy` in place, restoring the previous policy
/// afterwards whatever the outcome.
pub fn with_policy(policy: Policy, action: ActionRef) -> ActionRef {
    Arc::new(WithPolicy { policy, action })
}

/// See [`with_output`].
pub struct WithOutput {
    stdout: SharedWriter,
    stderr: SharedWriter,
    action: ActionRef,
}

#[async_trait]
impl Action for WithOutput {
    fn name(&self) -> &str {
        "with output"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        _sc: &mut Script,
    ) -> Result<()> {
        let prev_out = std::mem::replace(&mut st.stdout, Box::new(self.stdout.clone()));
        let prev_err = std::mem::replace(&mut st.stderr, Box::new(self.stderr.clone()));
        let res = Script::with_actions([self.action.clone()]).run(cancel, st).await;
        st.stdout = prev_out;
        st.stderr = prev_err;
        res
    }
}

/// Run `action` in a nested script with the state's output streams
/// redirected, restoring the originals on every exit path.
pub fn with_output(
    stdout: impl Into<SharedWriter>,
    stderr: impl Into<SharedWriter>,
    action: ActionRef,
) -> ActionRef {
    Arc::new(WithOutput {
        stdout: stdout.into(),
        stderr: stderr.into(),
        action,
    })
}

/// See [`sequence`].
pub struct Sequence {
    actions: Vec<ActionRef>,
}

#[async_trait]
impl Action for Sequence {
    fn name(&self) -> &str {
        "sequence"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        st: &mut State,
        _sc: &mut Script,
    ) -> Result<()> {
        Script::with_actions(self.actions.iter().cloned())
            .run(cancel, st)
            .await
    }
}

/// Group actions into one. Every invocation runs them in a fresh nested
/// script with its own cursor and rollback sequence.
pub fn sequence(actions: impl IntoIterator<Item = ActionRef>) -> ActionRef {
    Arc::new(Sequence {
        actions: actions.into_iter().collect(),
    })
}

/// An action registering `actions` on the enclosing script's rollback
/// sequence.
pub fn add_rollback(actions: impl IntoIterator<Item = ActionRef>) -> ActionRef {
    let actions: Vec<ActionRef> = actions.into_iter().collect();
    from_sync_fn(move |_st, sc| {
        sc.rollback(actions.iter().cloned());
        Ok(())
    })
}

/// An action deferring `actions` on the enclosing script: they run at the
/// current end of the script and again on rollback.
pub fn defer(actions: impl IntoIterator<Item = ActionRef>) -> ActionRef {
    let actions: Vec<ActionRef> = actions.into_iter().collect();
    from_sync_fn(move |_st, sc| {
        sc.defer(actions.iter().cloned());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::from_sync_fn;
    use crate::script::run;
    use crate::value::{Capture, Value};
    use std::io::Write;
    use tf_core::Error;

    fn mark(key: &'static str) -> ActionRef {
        from_sync_fn(move |st, _sc| {
            st.set(key, true);
            Ok(())
        })
    }

    #[tokio::test]
    async fn switch_dispatches_on_branch() {
        let action = switch(
            set_branch(Branch::FALSE),
            [(Branch::TRUE, mark("yes")), (Branch::FALSE, mark("no"))],
        );
        let mut st = State::new();
        run(&CancellationToken::new(), &mut st, action).await.unwrap();
        assert_eq!(st.get("no"), Some(&Value::Bool(true)));
        assert_eq!(st.get("yes"), None);
        assert_eq!(st.branch, Branch::UNSET);
    }

    #[tokio::test]
    async fn switch_without_matching_case_is_noop() {
        let action = switch(set_branch(Branch::custom(7).unwrap()), [(Branch::TRUE, mark("yes"))]);
        let mut st = State::new();
        run(&CancellationToken::new(), &mut st, action).await.unwrap();
        assert_eq!(st.get("yes"), None);
        assert_eq!(st.branch, Branch::UNSET);
    }

    #[tokio::test]
    async fn failing_probe_skips_cases() {
        let probe = from_sync_fn(|st, _sc| {
            st.branch = Branch::TRUE;
            Err(Error::action("probe failed"))
        });
        let action = switch(probe, [(Branch::TRUE, mark("yes"))]);
        let mut st = State::new();
        let err = run(&CancellationToken::new(), &mut st, action).await.unwrap_err();
        assert_eq!(err.to_string(), "probe failed");
        assert_eq!(st.get("yes"), None);
    }

    #[tokio::test]
    async fn with_policy_restores_on_failure() {
        let failing = from_sync_fn(|_st, _sc| Err(Error::action("nope")));
        let mut st = State::new();
        st.policy = Policy::LOG;
        let err = run(
            &CancellationToken::new(),
            &mut st,
            with_policy(Policy::SKIP_ROLLBACK, failing),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(st.policy, Policy::LOG);
    }

    #[tokio::test]
    async fn with_policy_continue_suppresses() {
        let failing = from_sync_fn(|_st, _sc| Err(Error::action("nope")));
        let mut st = State::new();
        run(
            &CancellationToken::new(),
            &mut st,
            sequence([with_policy(Policy::CONTINUE, failing), mark("after")]),
        )
        .await
        .unwrap();
        assert_eq!(st.get("after"), Some(&Value::Bool(true)));
        assert_eq!(st.policy, Policy::FAIL);
    }

    #[tokio::test]
    async fn with_output_redirects_and_restores() {
        let outer = Capture::new();
        let inner = Capture::new();
        let write = |text: &'static str| {
            from_sync_fn(move |st, _sc| {
                st.stdout.write_all(text.as_bytes())?;
                Ok(())
            })
        };

        let mut st = State::new().with_stdout(outer.clone());
        let action = sequence([
            write("a"),
            with_output(inner.clone(), Capture::new(), write("b")),
            write("c"),
        ]);
        run(&CancellationToken::new(), &mut st, action).await.unwrap();
        assert_eq!(outer.contents(), "ac");
        assert_eq!(inner.contents(), "b");
    }

    #[tokio::test]
    async fn with_output_restores_on_failure() {
        let outer = Capture::new();
        let inner = Capture::new();
        let failing = from_sync_fn(|st, _sc| {
            st.stdout.write_all(b"inside")?;
            Err(Error::action("nope"))
        });

        let mut st = State::new().with_stdout(outer.clone());
        let err = run(
            &CancellationToken::new(),
            &mut st,
            with_output(inner.clone(), Capture::new(), failing),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "nope");

        st.stdout.write_all(b"after").unwrap();
        assert_eq!(inner.contents(), "inside");
        assert_eq!(outer.contents(), "after");
    }

    #[tokio::test]
    async fn add_rollback_registers_on_enclosing_script() {
        let mut sc = Script::with_actions([
            add_rollback([mark("rolled back")]),
            from_sync_fn(|_st, _sc| Err(Error::action("fail"))),
        ]);
        let mut st = State::new();
        sc.run(&CancellationToken::new(), &mut st).await.unwrap_err();
        assert_eq!(st.get("rolled back"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn defer_action_runs_at_end() {
        let order = from_sync_fn(|st, _sc| {
            let seen = st.get_or("order", "").to_string();
            st.set("order", format!("{seen}x"));
            Ok(())
        });
        let cleanup = from_sync_fn(|st, _sc| {
            let seen = st.get_or("order", "").to_string();
            st.set("order", format!("{seen}d"));
            Ok(())
        });
        let mut sc = Script::with_actions([defer([cleanup]), order.clone(), order]);
        let mut st = State::new();
        sc.run(&CancellationToken::new(), &mut st).await.unwrap();
        assert_eq!(st.get("order"), Some(&Value::from("xxd")));
    }
}
