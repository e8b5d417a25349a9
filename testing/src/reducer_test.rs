//! Given/When/Then harness for reducers.
//!
//! A test either expects the action to go through (and may inspect its
//! effects) or expects it to be rejected (and may inspect the error). Mixing
//! the two is a test bug and panics.
//!
//! ```ignore
//! use waitline_testing::ReducerTest;
//!
//! ReducerTest::new(QueueReducer)
//!     .with_env(env)
//!     .given_state(QueueState::new(event))
//!     .when_action(QueueAction::Join { user_id: UserId::new("alice") })
//!     .then_state(|state| assert_eq!(state.entries.len(), 1))
//!     .then_effects(|effects| assert_eq!(effects.len(), 3))
//!     .run();
//! ```

#![allow(clippy::module_name_repetitions)]

use std::fmt::Debug;
use waitline_core::reducer::Reducer;

type Check<T> = Box<dyn FnOnce(&T)>;
type SliceCheck<T> = Box<dyn FnOnce(&[T])>;

/// What the action is expected to do.
enum Outcome<E, X> {
    Unstated,
    Accepted(Vec<SliceCheck<E>>),
    Rejected(Vec<Check<X>>),
    Conflicting,
}

/// Builder-style reducer test. Nothing runs until [`ReducerTest::run`].
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    env: Option<R::Environment>,
    state: Option<R::State>,
    action: Option<R::Action>,
    state_checks: Vec<Check<R::State>>,
    outcome: Outcome<R::Effect, R::Error>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Effect: Debug,
    R::Error: Debug,
{
    /// Start a test of `reducer`.
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            env: None,
            state: None,
            action: None,
            state_checks: Vec::new(),
            outcome: Outcome::Unstated,
        }
    }

    /// Environment passed to `reduce`.
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Given: the state before the action.
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.state = Some(state);
        self
    }

    /// When: the action under test.
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Then: inspect the state afterwards. A rejected action must leave it
    /// as given.
    #[must_use]
    pub fn then_state(mut self, check: impl FnOnce(&R::State) + 'static) -> Self {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Then: the action is accepted; inspect its effects.
    #[must_use]
    pub fn then_effects(mut self, check: impl FnOnce(&[R::Effect]) + 'static) -> Self {
        self.outcome = match self.outcome {
            Outcome::Unstated => Outcome::Accepted(vec![Box::new(check)]),
            Outcome::Accepted(mut checks) => {
                checks.push(Box::new(check));
                Outcome::Accepted(checks)
            }
            Outcome::Rejected(_) | Outcome::Conflicting => Outcome::Conflicting,
        };
        self
    }

    /// Then: the action is rejected; inspect the error.
    #[must_use]
    pub fn then_error(mut self, check: impl FnOnce(&R::Error) + 'static) -> Self {
        self.outcome = match self.outcome {
            Outcome::Unstated => Outcome::Rejected(vec![Box::new(check)]),
            Outcome::Rejected(mut checks) => {
                checks.push(Box::new(check));
                Outcome::Rejected(checks)
            }
            Outcome::Accepted(_) | Outcome::Conflicting => Outcome::Conflicting,
        };
        self
    }

    /// Reduce the action and run every check.
    ///
    /// # Panics
    ///
    /// Panics if the environment, state or action is missing, if both
    /// effects and an error were expected, if the action was accepted when
    /// a rejection was expected (or the reverse), or if a check fails.
    #[allow(clippy::panic, clippy::expect_used)]
    pub fn run(self) {
        let env = self.env.expect("with_env() was not called");
        let mut state = self.state.expect("given_state() was not called");
        let action = self.action.expect("when_action() was not called");

        let result = self.reducer.reduce(&mut state, action, &env);

        for check in self.state_checks {
            check(&state);
        }

        match (self.outcome, result) {
            (Outcome::Conflicting, _) => {
                panic!("A test cannot expect both effects and an error")
            }
            (Outcome::Unstated, _) => {}
            (Outcome::Accepted(checks), Ok(effects)) => {
                for check in checks {
                    check(&effects);
                }
            }
            (Outcome::Accepted(_), Err(error)) => {
                panic!("Expected effects, but the action was rejected: {error:?}")
            }
            (Outcome::Rejected(checks), Err(error)) => {
                for check in checks {
                    check(&error);
                }
            }
            (Outcome::Rejected(_), Ok(effects)) => {
                panic!("Expected the action to be rejected, but it produced {effects:?}")
            }
        }
    }
}

/// Effect assertions shared by reducer tests.
pub mod assertions {
    use std::fmt::Debug;

    /// Assert that the action produced nothing.
    ///
    /// # Panics
    ///
    /// Panics if `effects` is not empty.
    #[allow(clippy::panic)]
    pub fn assert_no_effects<F: Debug>(effects: &[F]) {
        assert!(effects.is_empty(), "Expected no effects, got {effects:?}");
    }

    /// Assert how many effects the action produced.
    ///
    /// # Panics
    ///
    /// Panics if the count differs.
    #[allow(clippy::panic)]
    pub fn assert_effects_count<F: Debug>(effects: &[F], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {expected} effects, got {effects:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waitline_core::{SmallVec, smallvec};

    /// Seats taken out of a fixed number.
    struct Turnstile;

    #[derive(Debug)]
    enum Gate {
        Enter,
        Leave,
    }

    impl Reducer for Turnstile {
        type State = (u32, u32);
        type Action = Gate;
        type Effect = &'static str;
        type Environment = ();
        type Error = &'static str;

        fn reduce(
            &self,
            (inside, capacity): &mut (u32, u32),
            action: Gate,
            _env: &(),
        ) -> Result<SmallVec<[&'static str; 4]>, &'static str> {
            match action {
                Gate::Enter if *inside == *capacity => Err("full"),
                Gate::Enter => {
                    *inside += 1;
                    Ok(smallvec!["admitted"])
                }
                Gate::Leave => {
                    *inside = inside.saturating_sub(1);
                    Ok(SmallVec::new())
                }
            }
        }
    }

    #[test]
    fn test_accepted_action() {
        ReducerTest::new(Turnstile)
            .with_env(())
            .given_state((0, 2))
            .when_action(Gate::Enter)
            .then_state(|state| assert_eq!(state.0, 1))
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .then_effects(|effects| assert_eq!(effects[0], "admitted"))
            .run();
    }

    #[test]
    fn test_action_without_effects() {
        ReducerTest::new(Turnstile)
            .with_env(())
            .given_state((1, 2))
            .when_action(Gate::Leave)
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn test_rejected_action_leaves_state() {
        ReducerTest::new(Turnstile)
            .with_env(())
            .given_state((2, 2))
            .when_action(Gate::Enter)
            .then_state(|state| assert_eq!(*state, (2, 2)))
            .then_error(|error| assert_eq!(*error, "full"))
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected the action to be rejected")]
    fn test_unexpected_success_panics() {
        ReducerTest::new(Turnstile)
            .with_env(())
            .given_state((0, 1))
            .when_action(Gate::Enter)
            .then_error(|_| {})
            .run();
    }

    #[test]
    #[should_panic(expected = "cannot expect both")]
    fn test_mixed_expectations_panic() {
        ReducerTest::new(Turnstile)
            .with_env(())
            .given_state((0, 1))
            .when_action(Gate::Enter)
            .then_effects(|_| {})
            .then_error(|_| {})
            .run();
    }
}
