//! Deterministic RTS simulation core: logic clock, save-state persistence,
//! behavior modules with hierarchical state machines, and the save file
//! orchestrator that ties the roots together.

pub mod client_state;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod game_state;
pub mod logic;
pub mod object;
pub mod persist;
pub mod rng;
pub mod save_file;
pub mod script;
pub mod state_machine;
pub mod store;
pub mod types;
