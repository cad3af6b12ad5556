//! Supply docks: warehouses hand out boxes, centers turn them into money.

use crate::{
    error::{SimError, SimResult},
    logic::{ObjectTable, World},
    object::{
        module::{ModuleBehavior, ModuleFamily, UpdateModuleBase, UpdateSleepTime},
        ModelConditionFlag, ObjectBody,
    },
    persist::{Persistable, StatePersister},
    types::ObjectId,
};
use serde::Deserialize;

/// Shared dock record: which gatherer currently holds the dock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DockUpdateBase {
    pub update:        UpdateModuleBase,
    pub active_docker: ObjectId,
}

impl DockUpdateBase {
    /// Claims the dock for `docker` if it is free or already theirs.
    pub fn try_claim(&mut self, docker: ObjectId) -> bool {
        if self.active_docker.is_valid() && self.active_docker != docker {
            return false;
        }
        self.active_docker = docker;
        true
    }

    pub fn release(&mut self, docker: ObjectId) {
        if self.active_docker == docker {
            self.active_docker = ObjectId::INVALID;
        }
    }

    /// Frees the dock when its holder is gone, dead, or no longer docked
    /// at `dock`.
    pub fn release_stale(&mut self, dock: ObjectId, objects: &ObjectTable) {
        let docker = self.active_docker;
        if !docker.is_valid() {
            return;
        }
        let still_docked = objects
            .get(docker)
            .is_some_and(|o| !o.body.is_dead() && o.docked_at() == Some(dock));
        if !still_docked {
            log::debug!("Dock {dock} dropped stale docker {docker}");
            self.active_docker = ObjectId::INVALID;
        }
    }
}

impl Persistable for DockUpdateBase {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.update)?;
        p.persist_object_id("ActiveDocker", &mut self.active_docker)
    }
}

// ── Warehouse ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupplyWarehouseDockData {
    pub starting_boxes:    i32,
    pub delete_when_empty: bool,
}

impl Default for SupplyWarehouseDockData {
    fn default() -> Self {
        Self { starting_boxes: 20, delete_when_empty: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyWarehouseDockUpdate {
    pub dock:          DockUpdateBase,
    boxes:             i32,
    delete_when_empty: bool,
}

impl SupplyWarehouseDockUpdate {
    pub fn new(data: &SupplyWarehouseDockData) -> Self {
        Self {
            dock:              DockUpdateBase::default(),
            boxes:             data.starting_boxes.max(0),
            delete_when_empty: data.delete_when_empty,
        }
    }

    pub fn boxes(&self) -> i32 {
        self.boxes
    }

    pub fn has_boxes(&self) -> bool {
        self.boxes > 0
    }

    /// Hands out one box. The last box marks the warehouse depleted and,
    /// when configured, kills it.
    pub fn take_box(&mut self, body: &mut ObjectBody) -> bool {
        if self.boxes <= 0 {
            return false;
        }
        self.boxes -= 1;
        if self.boxes == 0 {
            body.conditions.set(ModelConditionFlag::Depleted, true);
            if self.delete_when_empty {
                log::debug!("Warehouse {} emptied and removed", body.id);
                body.kill();
            }
        }
        true
    }
}

impl Persistable for SupplyWarehouseDockUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.dock)?;
        p.persist_i32("Boxes", &mut self.boxes)?;
        if self.boxes < 0 {
            return Err(SimError::corrupt("Boxes", format!("{} boxes", self.boxes)));
        }
        Ok(())
    }
}

impl ModuleBehavior for SupplyWarehouseDockUpdate {
    fn kind(&self) -> &'static str {
        "SupplyWarehouseDockUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Update
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.dock.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.dock.update)
    }
}

// ── Center ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupplyCenterDockData {
    pub value_multiplier: f32,
}

impl Default for SupplyCenterDockData {
    fn default() -> Self {
        Self { value_multiplier: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyCenterDockUpdate {
    pub dock:         DockUpdateBase,
    value_multiplier: f32,
}

impl SupplyCenterDockUpdate {
    pub fn new(data: &SupplyCenterDockData) -> Self {
        Self { dock: DockUpdateBase::default(), value_multiplier: data.value_multiplier }
    }

    pub fn try_claim(&mut self, docker: ObjectId) -> bool {
        self.dock.try_claim(docker)
    }

    pub fn release(&mut self, docker: ObjectId) {
        self.dock.release(docker)
    }

    /// Money for `boxes` boxes; fractions are dropped.
    pub fn dump_value(&self, boxes: i32, value_per_box: u32, bonus: u32) -> u32 {
        let boxes = boxes.max(0) as u32;
        let base = boxes.saturating_mul(value_per_box.saturating_add(bonus));
        (base as f32 * self.value_multiplier) as u32
    }
}

impl Persistable for SupplyCenterDockUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.dock)
    }
}

impl ModuleBehavior for SupplyCenterDockUpdate {
    fn kind(&self) -> &'static str {
        "SupplyCenterDockUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Update
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.dock.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.dock.update)
    }

    fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        self.dock.release_stale(body.id, &*world.objects);
        Ok(UpdateSleepTime::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_box_depletes_and_optionally_kills() {
        let mut dock = SupplyWarehouseDockUpdate::new(&SupplyWarehouseDockData {
            starting_boxes:    1,
            delete_when_empty: true,
        });
        let mut body = ObjectBody { health: 10.0, max_health: 10.0, ..ObjectBody::default() };
        assert!(dock.take_box(&mut body));
        assert!(body.conditions.get(ModelConditionFlag::Depleted));
        assert!(body.is_dead());
        assert!(!dock.take_box(&mut body), "empty warehouse hands out nothing");
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let mut dock = DockUpdateBase::default();
        assert!(dock.try_claim(ObjectId(5)));
        assert!(dock.try_claim(ObjectId(5)));
        assert!(!dock.try_claim(ObjectId(6)));
        dock.release(ObjectId(6));
        assert_eq!(dock.active_docker, ObjectId(5), "only the holder can release");
        dock.release(ObjectId(5));
        assert!(dock.try_claim(ObjectId(6)));
    }

    #[test]
    fn docker_missing_from_the_table_is_dropped() {
        let mut dock = DockUpdateBase::default();
        assert!(dock.try_claim(ObjectId(5)));
        dock.release_stale(ObjectId(1), &ObjectTable::new());
        assert!(!dock.active_docker.is_valid());
        assert!(dock.try_claim(ObjectId(6)));
    }

    #[test]
    fn center_value_truncates() {
        let center = SupplyCenterDockUpdate::new(&SupplyCenterDockData { value_multiplier: 1.5 });
        assert_eq!(center.dump_value(3, 75, 0), 337);
        assert_eq!(center.dump_value(-2, 75, 0), 0);
    }
}
