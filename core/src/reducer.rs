//! Reducer module - the core trait for business logic.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
//! They validate the action, update state in place and return descriptions of
//! the side effects the runtime must perform. They never perform I/O.

use smallvec::SmallVec;

/// The Reducer trait - core abstraction for business logic
///
/// # Type Parameters
///
/// - `State`: The domain state this reducer operates on
/// - `Action`: The action type this reducer processes
/// - `Effect`: Side-effect descriptions returned to the runtime
/// - `Environment`: The injected dependencies this reducer needs
/// - `Error`: Typed rejection of an action
///
/// A rejected action must leave `state` untouched.
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The effect descriptions this reducer emits
    type Effect;

    /// The environment type with injected dependencies
    type Environment;

    /// The error type for rejected actions
    type Error;

    /// Reduce an action into state changes and effects
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the action is not valid in the current state.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[Self::Effect; 4]>, Self::Error>;
}
