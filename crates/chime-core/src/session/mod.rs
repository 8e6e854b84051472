//! Client session lifecycle
//!
//! - `state`: pure state machine (states, inputs, effects, audit records)
//! - `manager`: `SessionManager`, which owns the state and executes effects

pub mod manager;
pub mod state;

pub use manager::{SessionManager, SessionSnapshot, SessionUpdate};
pub use state::{
    SessionEffect, SessionInput, SessionState, StateTransition, StateTransitionError,
    TransitionRecord,
};
