//! Plain update modules: regeneration, projectiles, and update kinds that
//! only carry state.

use super::ai::{AiCommand, AiCommandKind};
use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    error::SimResult,
    event::LogicEvent,
    logic::World,
    object::{
        module::{BuildContext, ModuleBehavior, ModuleFamily, UpdateModuleBase, UpdateSleepTime},
        ObjectBody,
    },
    persist::{Persistable, StatePersister},
    types::{ObjectId, Vector3},
};
use serde::Deserialize;

/// Damages everything within `radius` of the body, reports the blast and
/// kills the body.
pub(crate) fn detonate(body: &mut ObjectBody, world: &mut World<'_>, damage: f32, radius: f32) {
    let frame = world.frame;
    let position = body.position;
    for id in world.partition.objects_near(position, radius) {
        if let Some(victim) = world.objects.get_mut(id) {
            victim.apply_damage(damage, frame);
        }
    }
    world.emit(LogicEvent::ProjectileDetonated {
        frame:      frame.value(),
        projectile: body.id,
        x:          position.x,
        y:          position.y,
    });
    body.kill();
}

// ── BaseRegenerateUpdate ───────────────────────────────────────

/// Heals a structure a fixed share of its max health per second, starting
/// a delay after the last hit. Sleeps whenever there is nothing to heal.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseRegenerateUpdate {
    pub update: UpdateModuleBase,
    delay:      LogicFrameSpan,
    interval:   LogicFrameSpan,
    fraction:   f32,
}

impl BaseRegenerateUpdate {
    pub fn new(build: &BuildContext<'_>) -> Self {
        let game_data = build.game_data;
        Self {
            update:   UpdateModuleBase::default(),
            delay:    game_data.base_regen_delay(),
            interval: LogicFrameSpan::one_second(game_data.frame_rate()),
            fraction: game_data.base_regen_health_percent_per_second,
        }
    }
}

impl Persistable for BaseRegenerateUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.update)
    }
}

impl ModuleBehavior for BaseRegenerateUpdate {
    fn kind(&self) -> &'static str {
        "BaseRegenerateUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Update
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.update)
    }

    fn on_create(&mut self, _body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<()> {
        self.update.wake_at(LogicFrame::MAX);
        Ok(())
    }

    fn on_damage(&mut self, frame: LogicFrame) {
        self.update.wake_at(frame + self.delay);
    }

    fn update(&mut self, body: &mut ObjectBody, _world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        if body.is_dead() || body.health >= body.max_health {
            return Ok(UpdateSleepTime::Forever);
        }
        body.health = (body.health + body.max_health * self.fraction).min(body.max_health);
        body.refresh_damage_conditions();
        if body.health >= body.max_health {
            return Ok(UpdateSleepTime::Forever);
        }
        Ok(UpdateSleepTime::Frames(self.interval))
    }
}

// ── AssistedTargetingUpdate ────────────────────────────────────

/// Persists its update record without a `Base` scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistedTargetingUpdate {
    pub update: UpdateModuleBase,
}

impl Persistable for AssistedTargetingUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        self.update.persist(p)
    }
}

impl ModuleBehavior for AssistedTargetingUpdate {
    fn kind(&self) -> &'static str {
        "AssistedTargetingUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Update
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.update)
    }
}

// ── SpectreGunshipDeploymentUpdate ─────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectreGunshipDeploymentUpdate {
    pub update: UpdateModuleBase,
}

impl Persistable for SpectreGunshipDeploymentUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.update)?;
        p.skip_unknown_bytes(4)
    }
}

impl ModuleBehavior for SpectreGunshipDeploymentUpdate {
    fn kind(&self) -> &'static str {
        "SpectreGunshipDeploymentUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Update
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.update)
    }
}

// ── BezierProjectileBehavior ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BezierProjectileData {
    pub speed:       f32,
    pub arc_height:  f32,
    pub damage:      f32,
    pub radius:      f32,
    pub weapon_name: String,
}

impl Default for BezierProjectileData {
    fn default() -> Self {
        Self { speed: 10.0, arc_height: 20.0, damage: 40.0, radius: 15.0, weapon_name: String::new() }
    }
}

const CURVE_START: usize = 0;
const CURVE_END: usize = 3;
const CURVE_PROGRESS: usize = 6;

/// Lobbed projectile following a parabolic arc between launch point and
/// target point; detonates on arrival or on hitting the ground.
#[derive(Debug, Clone, PartialEq)]
pub struct BezierProjectileBehavior {
    pub update:  UpdateModuleBase,
    launcher:    ObjectId,
    target:      ObjectId,
    unknown1:    u32,
    /// Start xyz, end xyz, progress along the arc.
    curve:       [f32; 7],
    weapon_name: String,
    unknown2:    u32,
    params:      BezierProjectileData,
    launch:      Option<(Vector3, ObjectId)>,
}

impl BezierProjectileBehavior {
    pub fn new(data: &BezierProjectileData) -> Self {
        Self {
            update:      UpdateModuleBase::default(),
            launcher:    ObjectId::INVALID,
            target:      ObjectId::INVALID,
            unknown1:    0,
            curve:       [0.0; 7],
            weapon_name: data.weapon_name.clone(),
            unknown2:    0,
            params:      data.clone(),
            launch:      None,
        }
    }

    fn point(&self, index: usize) -> Vector3 {
        Vector3::new(self.curve[index], self.curve[index + 1], self.curve[index + 2])
    }

    fn set_point(&mut self, index: usize, point: Vector3) {
        self.curve[index] = point.x;
        self.curve[index + 1] = point.y;
        self.curve[index + 2] = point.z;
    }

    pub fn progress(&self) -> f32 {
        self.curve[CURVE_PROGRESS]
    }

    pub fn is_in_flight(&self) -> bool {
        self.point(CURVE_START) != self.point(CURVE_END)
    }
}

impl Persistable for BezierProjectileBehavior {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.update)?;
        p.persist_object_id("Launcher", &mut self.launcher)?;
        p.persist_object_id("Target", &mut self.target)?;
        p.persist_u32("Unknown1", &mut self.unknown1)?;
        p.persist_array("Curve", &mut self.curve, |p, value| p.persist_f32("Value", value))?;
        p.persist_ascii_string("WeaponName", &mut self.weapon_name)?;
        p.persist_u32("Unknown2", &mut self.unknown2)
    }
}

impl ModuleBehavior for BezierProjectileBehavior {
    fn kind(&self) -> &'static str {
        "BezierProjectileBehavior"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Update
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.update)
    }

    fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        if let Some((end, target)) = self.launch.take() {
            self.set_point(CURVE_START, body.position);
            self.set_point(CURVE_END, end);
            self.curve[CURVE_PROGRESS] = 0.0;
            self.target = target;
        }
        if !self.is_in_flight() {
            return Ok(UpdateSleepTime::Forever);
        }

        let start = self.point(CURVE_START);
        let end = self.point(CURVE_END);
        let length = start.distance(end).max(f32::EPSILON);
        let t = (self.progress() + self.params.speed / length).min(1.0);
        self.curve[CURVE_PROGRESS] = t;

        let mut position = start.lerp(end, t);
        position.z += self.params.arc_height * 4.0 * t * (1.0 - t);
        body.position = position;

        let ground = world.terrain.height_at(position.x, position.y);
        if t >= 1.0 || position.z < ground {
            detonate(body, world, self.params.damage, self.params.radius);
            return Ok(UpdateSleepTime::Forever);
        }
        Ok(UpdateSleepTime::None)
    }

    fn accept_command(&mut self, command: AiCommand) -> bool {
        if command.kind != AiCommandKind::MoveTo {
            return false;
        }
        self.launch = Some((command.position, command.object));
        self.update.wake_at(LogicFrame::ZERO);
        true
    }
}
