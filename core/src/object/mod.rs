//! Game objects: a persisted body plus an ordered list of behavior modules.
//!
//! RULES:
//!   - Modules run in template order, every frame, unless their sleep
//!     hint says otherwise.
//!   - Objects reference each other only by ObjectId.
//!   - A killed object stops updating at once; die modules run during the
//!     end-of-frame sweep, and only destroyed objects leave the table.

pub mod module;
pub mod modules;
pub mod template;

use crate::{
    clock::LogicFrame,
    config::GameData,
    error::{SimError, SimResult},
    logic::World,
    persist::{Persistable, StatePersister},
    types::{ObjectId, PlayerIndex, Vector3},
};
use module::{BehaviorModule, BuildContext};
use modules::ai::AiCommand;
use modules::docks::{SupplyCenterDockUpdate, SupplyWarehouseDockUpdate};
use std::sync::Arc;
use template::ObjectTemplate;

// ── Flags ──────────────────────────────────────────────────────

/// Visual/animation state bits driven by logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModelConditionFlag {
    Moving       = 0,
    Attacking    = 1,
    Carrying     = 2,
    Docking      = 3,
    Damaged      = 4,
    ReallyDamaged = 5,
    Rubble       = 6,
    Landing      = 7,
    Takeoff      = 8,
    Rappelling   = 9,
    Depleted     = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelConditionFlags(pub u64);

impl ModelConditionFlags {
    pub fn get(self, flag: ModelConditionFlag) -> bool {
        self.0 & (1u64 << flag as u8) != 0
    }

    pub fn set(&mut self, flag: ModelConditionFlag, on: bool) {
        if on {
            self.0 |= 1u64 << flag as u8;
        } else {
            self.0 &= !(1u64 << flag as u8);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectStatus {
    Dead         = 0,
    Destroyed    = 1,
    Stealthed    = 2,
    Airborne     = 3,
    /// Die modules have run; set once per death.
    DeathHandled = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectStatusFlags(pub u32);

impl ObjectStatusFlags {
    pub fn get(self, status: ObjectStatus) -> bool {
        self.0 & (1u32 << status as u8) != 0
    }

    pub fn set(&mut self, status: ObjectStatus, on: bool) {
        if on {
            self.0 |= 1u32 << status as u8;
        } else {
            self.0 &= !(1u32 << status as u8);
        }
    }
}

// ── Body ───────────────────────────────────────────────────────

/// Per-instance state shared by all of an object's modules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectBody {
    pub id:                ObjectId,
    pub position:          Vector3,
    pub orientation:       f32,
    pub owner:             PlayerIndex,
    pub team:              u32,
    pub health:            f32,
    pub max_health:        f32,
    pub supply_boxes:      i32,
    pub conditions:        ModelConditionFlags,
    pub status:            ObjectStatusFlags,
    pub last_damage_frame: LogicFrame,
}

impl ObjectBody {
    pub fn is_dead(&self) -> bool {
        self.status.get(ObjectStatus::Dead)
    }

    pub fn is_destroyed(&self) -> bool {
        self.status.get(ObjectStatus::Destroyed)
    }

    pub fn kill(&mut self) {
        self.health = 0.0;
        self.status.set(ObjectStatus::Dead, true);
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            return 0.0;
        }
        self.health / self.max_health
    }

    fn refresh_damage_conditions(&mut self) {
        let fraction = self.health_fraction();
        self.conditions.set(ModelConditionFlag::Damaged, fraction < 0.5 && fraction >= 0.1);
        self.conditions.set(ModelConditionFlag::ReallyDamaged, fraction < 0.1);
    }
}

impl Persistable for ObjectBody {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_object_id("Id", &mut self.id)?;
        p.persist_vector3("Position", &mut self.position)?;
        p.persist_f32("Orientation", &mut self.orientation)?;
        p.persist_u32("Owner", &mut self.owner)?;
        p.persist_u32("Team", &mut self.team)?;
        p.persist_f32("Health", &mut self.health)?;
        p.persist_f32("MaxHealth", &mut self.max_health)?;
        p.persist_i32("SupplyBoxes", &mut self.supply_boxes)?;
        p.persist_u64("ModelConditions", &mut self.conditions.0)?;
        p.persist_u32("Status", &mut self.status.0)?;
        p.persist_frame("LastDamageFrame", &mut self.last_damage_frame)?;
        if !self.health.is_finite() || !self.max_health.is_finite() || self.health < 0.0 || self.health > self.max_health {
            return Err(SimError::corrupt(
                "Health",
                format!("{} outside 0..={}", self.health, self.max_health),
            ));
        }
        Ok(())
    }
}

// ── GameObject ─────────────────────────────────────────────────

/// One module instance and the template tag that names it.
#[derive(Debug)]
pub struct ModuleSlot {
    pub tag:    String,
    pub module: BehaviorModule,
}

#[derive(Debug)]
pub struct GameObject {
    pub template: Arc<ObjectTemplate>,
    pub body:     ObjectBody,
    pub modules:  Vec<ModuleSlot>,
}

impl GameObject {
    /// Build an object and all of its modules from a template.
    /// Create callbacks are NOT run here; see `run_create_modules`.
    pub fn from_template(
        id: ObjectId,
        template: Arc<ObjectTemplate>,
        owner: PlayerIndex,
        position: Vector3,
        game_data: &GameData,
    ) -> SimResult<Self> {
        let build = BuildContext { game_data };
        let modules = template
            .modules
            .iter()
            .map(|m| {
                Ok(ModuleSlot {
                    tag:    m.tag.clone(),
                    module: BehaviorModule::from_data(&m.data, &build)?,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        let body = ObjectBody {
            id,
            position,
            owner,
            health: template.max_health,
            max_health: template.max_health,
            ..ObjectBody::default()
        };
        Ok(Self { template, body, modules })
    }

    pub fn id(&self) -> ObjectId {
        self.body.id
    }

    pub fn template_name(&self) -> &str {
        &self.template.name
    }

    pub fn is_kind_of(&self, kind: &str) -> bool {
        self.template.kind_of.iter().any(|k| k == kind)
    }

    pub fn module(&self, tag: &str) -> Option<&BehaviorModule> {
        self.modules.iter().find(|m| m.tag == tag).map(|m| &m.module)
    }

    pub fn module_mut(&mut self, tag: &str) -> Option<&mut BehaviorModule> {
        self.modules.iter_mut().find(|m| m.tag == tag).map(|m| &mut m.module)
    }

    pub fn run_create_modules(&mut self, world: &mut World<'_>) -> SimResult<()> {
        for slot in &mut self.modules {
            slot.module.on_create(&mut self.body, world)?;
        }
        Ok(())
    }

    /// One logic frame: every awake module in template order.
    pub fn update(&mut self, world: &mut World<'_>) -> SimResult<()> {
        let frame = world.frame;
        for slot in &mut self.modules {
            if self.body.is_dead() {
                break;
            }
            let Some(next_call) = slot.module.next_call_frame() else {
                continue;
            };
            if next_call > frame {
                continue;
            }
            let sleep = slot.module.update(&mut self.body, world)?;
            slot.module.set_next_call_frame(sleep.next_call_frame(frame));
        }
        Ok(())
    }

    pub fn apply_damage(&mut self, amount: f32, frame: LogicFrame) {
        if self.body.is_dead() || amount <= 0.0 {
            return;
        }
        self.body.health = (self.body.health - amount).max(0.0);
        self.body.last_damage_frame = frame;
        self.body.refresh_damage_conditions();
        for slot in &mut self.modules {
            slot.module.on_damage(frame);
        }
        if self.body.health <= 0.0 {
            self.body.kill();
        }
    }

    /// Hands an order to whichever module accepts it. Returns false when
    /// no module on this object understands commands.
    pub fn issue_command(&mut self, command: AiCommand) -> bool {
        let mut accepted = false;
        for slot in &mut self.modules {
            accepted |= slot.module.accept_command(command);
        }
        accepted
    }

    /// Runs every upgrade module triggered by `upgrade`. Returns how many fired.
    pub fn apply_upgrade(&mut self, upgrade: &str) -> usize {
        let mut fired = 0;
        for slot in &mut self.modules {
            if slot.module.try_upgrade(upgrade, &mut self.body) {
                fired += 1;
            }
        }
        fired
    }

    pub fn on_collide(&mut self, other: &GameObject) {
        for slot in &mut self.modules {
            slot.module.on_collide(&mut self.body, other);
        }
    }

    /// Die modules decide whether a dead object is removed from the world.
    pub fn run_die_modules(&mut self, world: &mut World<'_>) -> SimResult<()> {
        for slot in &mut self.modules {
            slot.module.on_die(&mut self.body, world)?;
        }
        Ok(())
    }

    pub fn run_destroy_modules(&mut self, world: &mut World<'_>) -> SimResult<()> {
        for slot in &mut self.modules {
            slot.module.on_destroy(&mut self.body, world)?;
        }
        Ok(())
    }

    pub fn supply_warehouse(&self) -> Option<&SupplyWarehouseDockUpdate> {
        self.modules.iter().find_map(|m| match &m.module {
            BehaviorModule::SupplyWarehouseDockUpdate(dock) => Some(dock),
            _ => None,
        })
    }

    pub fn supply_warehouse_mut(&mut self) -> Option<&mut SupplyWarehouseDockUpdate> {
        self.modules.iter_mut().find_map(|m| match &mut m.module {
            BehaviorModule::SupplyWarehouseDockUpdate(dock) => Some(dock),
            _ => None,
        })
    }

    /// Takes one box from this object's warehouse dock, if it has one.
    pub fn take_supply_box(&mut self) -> bool {
        for slot in &mut self.modules {
            if let BehaviorModule::SupplyWarehouseDockUpdate(dock) = &mut slot.module {
                return dock.take_box(&mut self.body);
            }
        }
        false
    }

    pub fn supply_center_mut(&mut self) -> Option<&mut SupplyCenterDockUpdate> {
        self.modules.iter_mut().find_map(|m| match &mut m.module {
            BehaviorModule::SupplyCenterDockUpdate(dock) => Some(dock),
            _ => None,
        })
    }

    /// The supply center this object is queued at or dumping into.
    pub fn docked_at(&self) -> Option<ObjectId> {
        self.modules.iter().find_map(|m| m.module.supply_base().and_then(|s| s.docked_at()))
    }

    pub fn has_supply_center(&self) -> bool {
        self.modules
            .iter()
            .any(|m| matches!(m.module, BehaviorModule::SupplyCenterDockUpdate(_)))
    }
}

impl Persistable for GameObject {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_object("Body", &mut self.body)?;

        let persisted = self.modules.iter().filter(|m| m.module.is_persisted()).count();
        let mut count = u16::try_from(persisted)
            .map_err(|_| SimError::corrupt("ModuleCount", format!("{persisted} modules")))?;
        p.persist_u16("ModuleCount", &mut count)?;

        p.begin_array("Modules")?;
        if p.is_reading() {
            for _ in 0..count {
                let mut tag = String::new();
                p.persist_ascii_string("Tag", &mut tag)?;
                let object = self.body.id;
                let slot = self
                    .modules
                    .iter_mut()
                    .find(|m| m.tag == tag)
                    .ok_or_else(|| SimError::UnknownModuleTag { object, tag: tag.clone() })?;
                persist_module_segment(p, slot)?;
            }
        } else {
            for slot in self.modules.iter_mut().filter(|m| m.module.is_persisted()) {
                let mut tag = slot.tag.clone();
                p.persist_ascii_string("Tag", &mut tag)?;
                persist_module_segment(p, slot)?;
            }
        }
        p.end_array()
    }
}

fn persist_module_segment(p: &mut dyn StatePersister, slot: &mut ModuleSlot) -> SimResult<()> {
    p.begin_segment(&slot.tag)?;
    slot.module.persist(p)?;
    p.end_segment()
}
