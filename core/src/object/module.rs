//! Behavior module framework: family base records, the sleep-hint
//! contract, and the tagged module enum.
//!
//! Every module persists as: own version, `Base` scope holding the parent
//! family's record, then its own fields. Base records nest outermost
//! first, so fields added to a family never move a subclass's fields.

use super::modules::{
    ai::{AiCommand, AiUpdateBase, AiUpdateData, AiUpdateInterface},
    chinook::{ChinookAiData, ChinookAiUpdate},
    docks::{SupplyCenterDockData, SupplyCenterDockUpdate, SupplyWarehouseDockData, SupplyWarehouseDockUpdate},
    draw::{BeaconClientUpdate, W3dModelDraw, W3dModelDrawData},
    lifecycle::{DestroyDie, SquishCollide, StealthUpgrade, StealthUpgradeData, SupplyCenterCreate, SupplyWarehouseCreate},
    missile::{MissileAiData, MissileAiUpdate},
    supply::{SupplyAiBase, SupplyAiData, SupplyTruckAiUpdate, WorkerAiUpdate},
    updates::{
        AssistedTargetingUpdate, BaseRegenerateUpdate, BezierProjectileBehavior, BezierProjectileData,
        SpectreGunshipDeploymentUpdate,
    },
};
use super::{GameObject, ObjectBody};
use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    config::GameData,
    error::SimResult,
    logic::World,
    persist::{Persistable, StatePersister},
    types::ObjectId,
};
use std::sync::Arc;

// ── Sleep hints ────────────────────────────────────────────────

/// When a module next needs its update to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSleepTime {
    /// Run again next frame.
    None,
    Frames(LogicFrameSpan),
    /// Sleep until something wakes the module.
    Forever,
}

impl UpdateSleepTime {
    pub fn next_call_frame(self, frame: LogicFrame) -> LogicFrame {
        match self {
            UpdateSleepTime::None          => frame + LogicFrameSpan::ONE,
            UpdateSleepTime::Frames(span)  => frame + span.max(LogicFrameSpan::ONE),
            UpdateSleepTime::Forever       => LogicFrame::MAX,
        }
    }
}

// ── Family base records ────────────────────────────────────────

/// Root of every module family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleBase;

impl Persistable for ModuleBase {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        Ok(())
    }
}

macro_rules! family_base {
    ($(#[$doc:meta])* $name:ident => $parent:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub base: $parent,
        }

        impl Persistable for $name {
            fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
                p.persist_version(1)?;
                p.persist_base(&mut self.base)
            }
        }
    };
}

family_base!(ObjectModuleBase => ModuleBase);
family_base!(BehaviorModuleBase => ObjectModuleBase);
family_base!(CreateModuleBase => BehaviorModuleBase);
family_base!(CollideModuleBase => BehaviorModuleBase);
family_base!(DieModuleBase => BehaviorModuleBase);
family_base!(
    /// Client-side modules attached to the object's drawable.
    DrawableModuleBase => ModuleBase
);
family_base!(DrawModuleBase => DrawableModuleBase);

/// Base of every module that runs in the logic tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateModuleBase {
    pub base:            BehaviorModuleBase,
    pub next_call_frame: LogicFrame,
}

impl UpdateModuleBase {
    pub fn wake_at(&mut self, frame: LogicFrame) {
        self.next_call_frame = frame;
    }
}

impl Persistable for UpdateModuleBase {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.base)?;
        p.persist_frame("NextCallFrame", &mut self.next_call_frame)
    }
}

/// Tracks whether an upgrade module has already fired.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeMux {
    pub executed: bool,
}

impl Persistable for UpgradeMux {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_bool("Executed", &mut self.executed)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeModuleBase {
    pub base: BehaviorModuleBase,
    pub mux:  UpgradeMux,
}

impl Persistable for UpgradeModuleBase {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.base)?;
        p.persist_object("UpgradeMux", &mut self.mux)
    }
}

// ── Module behavior contract ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFamily {
    Update,
    Ai,
    Create,
    Collide,
    Die,
    Upgrade,
    Draw,
    ClientUpdate,
}

/// Values shared by every module constructor.
pub struct BuildContext<'a> {
    pub game_data: &'a GameData,
}

/// Runtime contract implemented by every module kind. Everything but
/// `kind`, `family` and persistence is optional.
pub trait ModuleBehavior: Persistable {
    fn kind(&self) -> &'static str;

    fn family(&self) -> ModuleFamily;

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        None
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        None
    }

    fn update(&mut self, _body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        Ok(UpdateSleepTime::Forever)
    }

    fn on_create(&mut self, _body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<()> {
        Ok(())
    }

    fn on_die(&mut self, _body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<()> {
        Ok(())
    }

    fn on_destroy(&mut self, _body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<()> {
        Ok(())
    }

    fn on_damage(&mut self, _frame: LogicFrame) {}

    fn on_collide(&mut self, _body: &mut ObjectBody, _other: &GameObject) {}

    fn accept_command(&mut self, _command: AiCommand) -> bool {
        false
    }

    fn try_upgrade(&mut self, _upgrade: &str, _body: &mut ObjectBody) -> bool {
        false
    }
}

// ── Immutable template data ────────────────────────────────────

/// Parsed, shareable configuration for one module instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleData {
    AiUpdateInterface(AiUpdateData),
    SupplyTruckAiUpdate(SupplyAiData),
    WorkerAiUpdate(SupplyAiData),
    ChinookAiUpdate(ChinookAiData),
    MissileAiUpdate(MissileAiData),
    BaseRegenerateUpdate,
    AssistedTargetingUpdate,
    SpectreGunshipDeploymentUpdate,
    SupplyWarehouseDockUpdate(SupplyWarehouseDockData),
    SupplyCenterDockUpdate(SupplyCenterDockData),
    BezierProjectileBehavior(BezierProjectileData),
    SupplyWarehouseCreate,
    SupplyCenterCreate,
    StealthUpgrade(StealthUpgradeData),
    SquishCollide,
    DestroyDie,
    W3dModelDraw(W3dModelDrawData),
    BeaconClientUpdate,
}

// ── The tagged module enum ─────────────────────────────────────

macro_rules! behavior_modules {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// One module instance; one variant per module kind.
        #[derive(Debug)]
        pub enum BehaviorModule {
            $($variant($ty)),*
        }

        impl BehaviorModule {
            fn inner(&self) -> &dyn ModuleBehavior {
                match self {
                    $(Self::$variant(m) => m),*
                }
            }

            fn inner_mut(&mut self) -> &mut dyn ModuleBehavior {
                match self {
                    $(Self::$variant(m) => m),*
                }
            }
        }
    };
}

behavior_modules! {
    AiUpdateInterface(AiUpdateInterface),
    SupplyTruckAiUpdate(SupplyTruckAiUpdate),
    WorkerAiUpdate(WorkerAiUpdate),
    ChinookAiUpdate(ChinookAiUpdate),
    MissileAiUpdate(MissileAiUpdate),
    BaseRegenerateUpdate(BaseRegenerateUpdate),
    AssistedTargetingUpdate(AssistedTargetingUpdate),
    SpectreGunshipDeploymentUpdate(SpectreGunshipDeploymentUpdate),
    SupplyWarehouseDockUpdate(SupplyWarehouseDockUpdate),
    SupplyCenterDockUpdate(SupplyCenterDockUpdate),
    BezierProjectileBehavior(BezierProjectileBehavior),
    SupplyWarehouseCreate(SupplyWarehouseCreate),
    SupplyCenterCreate(SupplyCenterCreate),
    StealthUpgrade(StealthUpgrade),
    SquishCollide(SquishCollide),
    DestroyDie(DestroyDie),
    W3dModelDraw(W3dModelDraw),
    BeaconClientUpdate(BeaconClientUpdate),
}

impl BehaviorModule {
    pub fn from_data(data: &Arc<ModuleData>, build: &BuildContext<'_>) -> SimResult<Self> {
        let module = match data.as_ref() {
            ModuleData::AiUpdateInterface(d)    => Self::AiUpdateInterface(AiUpdateInterface::new(d, build)),
            ModuleData::SupplyTruckAiUpdate(d)  => Self::SupplyTruckAiUpdate(SupplyTruckAiUpdate::new(d, build)),
            ModuleData::WorkerAiUpdate(d)       => Self::WorkerAiUpdate(WorkerAiUpdate::new(d, build)),
            ModuleData::ChinookAiUpdate(d)      => Self::ChinookAiUpdate(ChinookAiUpdate::new(d, build)),
            ModuleData::MissileAiUpdate(d)      => Self::MissileAiUpdate(MissileAiUpdate::new(d, build)),
            ModuleData::BaseRegenerateUpdate    => Self::BaseRegenerateUpdate(BaseRegenerateUpdate::new(build)),
            ModuleData::AssistedTargetingUpdate => Self::AssistedTargetingUpdate(AssistedTargetingUpdate::default()),
            ModuleData::SpectreGunshipDeploymentUpdate => {
                Self::SpectreGunshipDeploymentUpdate(SpectreGunshipDeploymentUpdate::default())
            }
            ModuleData::SupplyWarehouseDockUpdate(d) => {
                Self::SupplyWarehouseDockUpdate(SupplyWarehouseDockUpdate::new(d))
            }
            ModuleData::SupplyCenterDockUpdate(d) => Self::SupplyCenterDockUpdate(SupplyCenterDockUpdate::new(d)),
            ModuleData::BezierProjectileBehavior(d) => {
                Self::BezierProjectileBehavior(BezierProjectileBehavior::new(d))
            }
            ModuleData::SupplyWarehouseCreate => Self::SupplyWarehouseCreate(SupplyWarehouseCreate::default()),
            ModuleData::SupplyCenterCreate    => Self::SupplyCenterCreate(SupplyCenterCreate::default()),
            ModuleData::StealthUpgrade(d)     => Self::StealthUpgrade(StealthUpgrade::new(d)),
            ModuleData::SquishCollide         => Self::SquishCollide(SquishCollide::default()),
            ModuleData::DestroyDie            => Self::DestroyDie(DestroyDie::default()),
            ModuleData::W3dModelDraw(d)       => Self::W3dModelDraw(W3dModelDraw::new(d)),
            ModuleData::BeaconClientUpdate    => Self::BeaconClientUpdate(BeaconClientUpdate),
        };
        Ok(module)
    }

    pub fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    pub fn family(&self) -> ModuleFamily {
        self.inner().family()
    }

    /// Client-side modules never enter the logic save stream.
    pub fn is_persisted(&self) -> bool {
        self.family() != ModuleFamily::ClientUpdate
    }

    /// None for modules that never update.
    pub fn next_call_frame(&self) -> Option<LogicFrame> {
        self.inner().update_base().map(|b| b.next_call_frame)
    }

    pub fn set_next_call_frame(&mut self, frame: LogicFrame) {
        if let Some(base) = self.inner_mut().update_base_mut() {
            base.next_call_frame = frame;
        }
    }

    pub fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        self.inner_mut().update(body, world)
    }

    pub fn on_create(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        self.inner_mut().on_create(body, world)
    }

    pub fn on_die(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        self.inner_mut().on_die(body, world)
    }

    pub fn on_destroy(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        self.inner_mut().on_destroy(body, world)
    }

    pub fn on_damage(&mut self, frame: LogicFrame) {
        self.inner_mut().on_damage(frame)
    }

    pub fn on_collide(&mut self, body: &mut ObjectBody, other: &GameObject) {
        self.inner_mut().on_collide(body, other)
    }

    pub fn accept_command(&mut self, command: AiCommand) -> bool {
        self.inner_mut().accept_command(command)
    }

    pub fn try_upgrade(&mut self, upgrade: &str, body: &mut ObjectBody) -> bool {
        self.inner_mut().try_upgrade(upgrade, body)
    }

    /// Other objects this module points at, for post-load reference checks.
    pub fn referenced_objects(&self) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        if let Some(ai) = self.ai_base() {
            ids.push(ai.data.goal_object);
        }
        if let Some(supply) = self.supply_base() {
            ids.push(supply.gather.supply_source);
            ids.push(supply.gather.supply_target);
        }
        ids.retain(|id| id.is_valid());
        ids
    }

    /// The gather record of any supply-gathering module.
    pub fn supply_base(&self) -> Option<&SupplyAiBase> {
        match self {
            Self::SupplyTruckAiUpdate(m) => Some(&m.supply),
            Self::WorkerAiUpdate(m)      => Some(&m.supply),
            Self::ChinookAiUpdate(m)     => Some(&m.truck.supply),
            _ => None,
        }
    }

    /// The shared AI record of any AI-family module.
    pub fn ai_base(&self) -> Option<&AiUpdateBase> {
        match self {
            Self::AiUpdateInterface(m)   => Some(&m.ai),
            Self::SupplyTruckAiUpdate(m) => Some(&m.supply.ai),
            Self::WorkerAiUpdate(m)      => Some(&m.supply.ai),
            Self::ChinookAiUpdate(m)     => Some(&m.truck.supply.ai),
            Self::MissileAiUpdate(m)     => Some(&m.ai),
            _ => None,
        }
    }
}

impl Persistable for BehaviorModule {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        self.inner_mut().persist(p)
    }
}
