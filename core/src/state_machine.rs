//! Hierarchical finite-state machine used by AI-driving modules.
//!
//! RULES:
//!   - States are keyed by small integer ids; only the current id and the
//!     active state's own fields are persisted. Transition tables are
//!     rebuilt from templates at construction and never saved.
//!   - An update may chain several transitions within one frame
//!     (fallthrough). The chain is bounded; exceeding the bound is a
//!     configuration error, never a silent stop.
//!   - Unregistered ids are fatal, at runtime and at load.

use crate::{
    clock::LogicFrame,
    error::{SimError, SimResult},
    logic::World,
    object::ObjectBody,
    persist::{Persistable, StatePersister},
};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

impl StateId {
    /// Wildcard target: no automatic transition.
    pub const INVALID: StateId = StateId(999_999);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a state asks of its machine after one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    Continue,
    Done,
    Interrupted,
    GoTo(StateId),
}

/// Everything a state may touch during a callback.
pub struct StateContext<'a, 'w, D> {
    pub body:  &'a mut ObjectBody,
    pub data:  &'a mut D,
    pub world: &'a mut World<'w>,
}

impl<'a, 'w, D> StateContext<'a, 'w, D> {
    pub fn frame(&self) -> LogicFrame {
        self.world.frame
    }
}

/// Downcasting for tests and tooling only.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait State<D>: AsAny {
    fn name(&self) -> &'static str;

    fn on_enter(&mut self, _cx: &mut StateContext<'_, '_, D>) -> SimResult<()> {
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, D>) -> SimResult<StateOutcome>;

    fn on_exit(&mut self, _cx: &mut StateContext<'_, '_, D>) -> SimResult<()> {
        Ok(())
    }

    /// In-state fields (timers, nested machines). Stateless states persist nothing.
    fn persist(&mut self, _p: &mut dyn StatePersister) -> SimResult<()> {
        Ok(())
    }
}

struct StateEntry<D> {
    state:          Box<dyn State<D>>,
    on_done:        StateId,
    on_interrupted: StateId,
}

pub struct StateMachine<D> {
    name:            &'static str,
    states:          BTreeMap<StateId, StateEntry<D>>,
    initial:         StateId,
    current:         StateId,
    max_transitions: u32,
}

impl<D> StateMachine<D> {
    pub fn new(name: &'static str, max_transitions: u32) -> Self {
        Self {
            name,
            states: BTreeMap::new(),
            initial: StateId::INVALID,
            current: StateId::INVALID,
            max_transitions,
        }
    }

    /// Register a state. The first registered state becomes the initial one.
    pub fn define_state(
        &mut self,
        id: StateId,
        state: impl State<D> + 'static,
        on_done: StateId,
        on_interrupted: StateId,
    ) {
        if self.states.is_empty() {
            self.initial = id;
            self.current = id;
        }
        self.states.insert(id, StateEntry { state: Box::new(state), on_done, on_interrupted });
    }

    pub fn with_state(
        mut self,
        id: StateId,
        state: impl State<D> + 'static,
        on_done: StateId,
        on_interrupted: StateId,
    ) -> Self {
        self.define_state(id, state, on_done, on_interrupted);
        self
    }

    /// Choose the initial state explicitly. No enter callback runs.
    pub fn starting_in(mut self, id: StateId) -> Self {
        self.initial = id;
        self.current = id;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn current(&self) -> StateId {
        self.current
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn is_in(&self, id: StateId) -> bool {
        self.current == id
    }

    pub fn has_state(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn current_state_name(&self) -> &'static str {
        self.states.get(&self.current).map(|e| e.state.name()).unwrap_or("<none>")
    }

    pub fn state<T: 'static>(&self, id: StateId) -> Option<&T> {
        self.states
            .get(&id)
            .and_then(|e| AsAny::as_any(&*e.state).downcast_ref::<T>())
    }

    pub fn state_mut<T: 'static>(&mut self, id: StateId) -> Option<&mut T> {
        self.states
            .get_mut(&id)
            .and_then(|e| AsAny::as_any_mut(&mut *e.state).downcast_mut::<T>())
    }

    fn unknown(&self, id: StateId) -> SimError {
        SimError::UnknownStateId { machine: self.name.to_string(), id: id.0 }
    }

    /// Explicit external transition: exit the current state, enter `id`.
    pub fn set_state(&mut self, id: StateId, cx: &mut StateContext<'_, '_, D>) -> SimResult<()> {
        if !self.states.contains_key(&id) {
            return Err(self.unknown(id));
        }
        if let Some(entry) = self.states.get_mut(&self.current) {
            entry.state.on_exit(cx)?;
        }
        log::trace!("{}: {} -> {} at {}", self.name, self.current, id, cx.frame());
        self.current = id;
        if let Some(entry) = self.states.get_mut(&id) {
            entry.state.on_enter(cx)?;
        }
        Ok(())
    }

    /// Put the machine in `id` without running callbacks (save loading,
    /// test setup).
    pub fn restore_state(&mut self, id: StateId) -> SimResult<()> {
        if !self.states.contains_key(&id) {
            return Err(self.unknown(id));
        }
        self.current = id;
        Ok(())
    }

    /// Runs the current state, following same-frame transitions until a
    /// state returns Continue or an outcome whose target is the wildcard.
    /// Returns that final outcome so an enclosing state can react to it.
    pub fn update(&mut self, cx: &mut StateContext<'_, '_, D>) -> SimResult<StateOutcome> {
        let mut transitions = 0u32;
        loop {
            let current = self.current;
            let name = self.name;
            let entry = self.states.get_mut(&current).ok_or(SimError::UnknownStateId {
                machine: name.to_string(),
                id:      current.0,
            })?;
            let outcome = entry.state.update(cx)?;
            let target = match outcome {
                StateOutcome::Continue    => return Ok(outcome),
                StateOutcome::Done        => entry.on_done,
                StateOutcome::Interrupted => entry.on_interrupted,
                StateOutcome::GoTo(id)    => id,
            };
            if target == StateId::INVALID {
                return Ok(outcome);
            }
            transitions += 1;
            if transitions > self.max_transitions {
                return Err(SimError::TransitionLoop {
                    machine: self.name.to_string(),
                    limit:   self.max_transitions,
                });
            }
            self.set_state(target, cx)?;
        }
    }

    /// Persists only the current id, validated against the table.
    pub fn persist_current_id(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        let mut raw = self.current.0;
        p.persist_u32("CurrentStateId", &mut raw)?;
        if p.is_reading() {
            self.restore_state(StateId(raw))?;
        }
        Ok(())
    }
}

impl<D> Persistable for StateMachine<D> {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        self.persist_current_id(p)?;

        let current = self.current;
        let name = self.name;
        let entry = self.states.get_mut(&current).ok_or(SimError::UnknownStateId {
            machine: name.to_string(),
            id:      current.0,
        })?;
        p.begin_object("State")?;
        entry.state.persist(p)?;
        p.end_object()
    }
}

impl<D> fmt::Debug for StateMachine<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("current", &self.current)
            .field("state", &self.current_state_name())
            .finish()
    }
}
