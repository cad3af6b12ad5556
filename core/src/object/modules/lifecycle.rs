//! Create, upgrade, collide and die modules.

use crate::{
    error::SimResult,
    logic::World,
    object::{
        module::{
            CollideModuleBase, CreateModuleBase, DieModuleBase, ModuleBehavior, ModuleFamily, UpgradeModuleBase,
        },
        GameObject, ObjectBody, ObjectStatus,
    },
    persist::{Persistable, StatePersister},
};
use serde::Deserialize;

/// Kind-of flag that makes a collider squish infantry.
pub const KIND_VEHICLE: &str = "VEHICLE";

macro_rules! simple_module_persist {
    ($ty:ty) => {
        impl Persistable for $ty {
            fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
                p.persist_version(1)?;
                p.persist_base(&mut self.base)
            }
        }
    };
}

// ── Supply registration ────────────────────────────────────────

/// Makes a warehouse visible to every player's gatherers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplyWarehouseCreate {
    pub base: CreateModuleBase,
}

simple_module_persist!(SupplyWarehouseCreate);

impl ModuleBehavior for SupplyWarehouseCreate {
    fn kind(&self) -> &'static str {
        "SupplyWarehouseCreate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Create
    }

    fn on_create(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        world.players.register_warehouse(body.id);
        Ok(())
    }

    fn on_destroy(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        world.players.unregister_warehouse(body.id);
        Ok(())
    }
}

/// Makes a supply center visible to its owner's gatherers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplyCenterCreate {
    pub base: CreateModuleBase,
}

simple_module_persist!(SupplyCenterCreate);

impl ModuleBehavior for SupplyCenterCreate {
    fn kind(&self) -> &'static str {
        "SupplyCenterCreate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Create
    }

    fn on_create(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        world.players.get_mut(body.owner)?.supply_manager.register_center(body.id);
        Ok(())
    }

    fn on_destroy(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        world.players.get_mut(body.owner)?.supply_manager.unregister_center(body.id);
        Ok(())
    }
}

// ── Upgrades ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StealthUpgradeData {
    pub triggered_by: Vec<String>,
}

/// Grants permanent stealth once one of its triggering upgrades is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StealthUpgrade {
    pub base:     UpgradeModuleBase,
    triggered_by: Vec<String>,
}

impl StealthUpgrade {
    pub fn new(data: &StealthUpgradeData) -> Self {
        Self { base: UpgradeModuleBase::default(), triggered_by: data.triggered_by.clone() }
    }

    pub fn is_executed(&self) -> bool {
        self.base.mux.executed
    }
}

simple_module_persist!(StealthUpgrade);

impl ModuleBehavior for StealthUpgrade {
    fn kind(&self) -> &'static str {
        "StealthUpgrade"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Upgrade
    }

    fn try_upgrade(&mut self, upgrade: &str, body: &mut ObjectBody) -> bool {
        if self.base.mux.executed || !self.triggered_by.iter().any(|t| t == upgrade) {
            return false;
        }
        self.base.mux.executed = true;
        body.status.set(ObjectStatus::Stealthed, true);
        true
    }
}

// ── Collide / die ──────────────────────────────────────────────

/// Infantry run over by a vehicle die.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SquishCollide {
    pub base: CollideModuleBase,
}

simple_module_persist!(SquishCollide);

impl ModuleBehavior for SquishCollide {
    fn kind(&self) -> &'static str {
        "SquishCollide"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Collide
    }

    fn on_collide(&mut self, body: &mut ObjectBody, other: &GameObject) {
        if !body.is_dead() && !other.body.is_dead() && other.is_kind_of(KIND_VEHICLE) {
            log::debug!("{} squished by {}", body.id, other.id());
            body.kill();
        }
    }
}

/// Removes the dead object from the world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestroyDie {
    pub base: DieModuleBase,
}

simple_module_persist!(DestroyDie);

impl ModuleBehavior for DestroyDie {
    fn kind(&self) -> &'static str {
        "DestroyDie"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Die
    }

    fn on_die(&mut self, body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<()> {
        body.status.set(ObjectStatus::Destroyed, true);
        Ok(())
    }
}
