//! Script runtime state. Scripts themselves are interpreted elsewhere;
//! the simulation only keeps the values they read and write.

use crate::{
    error::{SimError, SimResult},
    persist::{Persistable, StatePersister},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptCounter {
    pub name:         String,
    pub value:        i32,
    /// Counts down one per frame while positive.
    pub is_countdown: bool,
}

impl Persistable for ScriptCounter {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_i32("Value", &mut self.value)?;
        p.persist_bool("IsCountdownTimer", &mut self.is_countdown)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptFlag {
    pub name:  String,
    pub value: bool,
}

impl Persistable for ScriptFlag {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_bool("Value", &mut self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptEngine {
    counters: Vec<ScriptCounter>,
    flags:    Vec<ScriptFlag>,
}

impl ScriptEngine {
    pub fn counter(&self, name: &str) -> Option<i32> {
        self.counters.iter().find(|c| c.name == name).map(|c| c.value)
    }

    pub fn set_counter(&mut self, name: &str, value: i32, is_countdown: bool) {
        match self.counters.iter_mut().find(|c| c.name == name) {
            Some(counter) => {
                counter.value = value;
                counter.is_countdown = is_countdown;
            }
            None => self.counters.push(ScriptCounter { name: name.to_string(), value, is_countdown }),
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.name == name && f.value)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        match self.flags.iter_mut().find(|f| f.name == name) {
            Some(flag) => flag.value = value,
            None => self.flags.push(ScriptFlag { name: name.to_string(), value }),
        }
    }

    /// Runs once per logic frame.
    pub fn update_timers(&mut self) {
        for counter in self.counters.iter_mut().filter(|c| c.is_countdown && c.value > 0) {
            counter.value -= 1;
        }
    }
}

impl Persistable for ScriptEngine {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_list_u16("Counters", &mut self.counters, |p, c| p.persist_object("Counter", c))?;
        p.persist_list_u16("Flags", &mut self.flags, |p, f| p.persist_object("Flag", f))?;
        if p.is_reading() {
            let mut names: Vec<&str> = self.counters.iter().map(|c| c.name.as_str()).collect();
            names.sort_unstable();
            if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
                return Err(SimError::corrupt("Counters", format!("duplicate counter '{}'", pair[0])));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptState {
    pub name:      String,
    pub is_active: bool,
}

impl Persistable for ScriptState {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_bool("IsActive", &mut self.is_active)
    }
}

/// Per-side script activation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideScripts {
    pub scripts: Vec<ScriptState>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidesList {
    pub sides: Vec<SideScripts>,
}

impl Persistable for SidesList {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_list_u32("Sides", &mut self.sides, |p, side| {
            p.persist_list_u16("Scripts", &mut side.scripts, |p, s| p.persist_object("Script", s))
        })
    }
}
