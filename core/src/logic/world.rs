//! The mutable view of the simulation handed to modules and states.
//!
//! RULE: The object being updated is taken out of the ObjectTable for the
//! duration of its update, so `objects` never aliases the caller's body.
//! Lookups of the updating object's own id return None.

use super::{ObjectTable, PartitionManager, PlayerManager, TerrainLogic};
use crate::{clock::LogicFrame, config::GameData, event::LogicEvent, rng::SimRng};

pub struct World<'a> {
    pub frame:     LogicFrame,
    pub game_data: &'a GameData,
    pub objects:   &'a mut ObjectTable,
    pub players:   &'a mut PlayerManager,
    pub terrain:   &'a TerrainLogic,
    pub partition: &'a PartitionManager,
    pub events:    &'a mut Vec<LogicEvent>,
    pub rng:       &'a mut SimRng,
}

impl<'a> World<'a> {
    pub fn emit(&mut self, event: LogicEvent) {
        self.events.push(event);
    }
}
