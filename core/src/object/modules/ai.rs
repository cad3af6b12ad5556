//! The AI update family: commands, the shared AI record and the standard
//! AI states (idle, move-to, hunt with its nested attack-area machine).
//!
//! RULES:
//!   - Commands are queued on the module and applied at the start of its
//!     next update, never from inside another object's update.
//!   - Targets are held as ObjectIds and re-resolved every frame; a target
//!     that vanished or died ends the attack, it is not an error.

use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    error::SimResult,
    event::LogicEvent,
    logic::World,
    object::{
        module::{BuildContext, ModuleBehavior, ModuleFamily, UpdateModuleBase, UpdateSleepTime},
        ModelConditionFlag, ObjectBody,
    },
    persist::{PersistEnum, Persistable, StatePersister},
    state_machine::{State, StateContext, StateId, StateMachine, StateOutcome},
    types::{ObjectId, Vector3},
};

// ── Commands ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiCommandKind {
    #[default]
    Idle             = 0,
    MoveTo           = 1,
    Hunt             = 2,
    Evacuate         = 3,
    Reinforce        = 4,
    CombatDrop       = 5,
    ExitMap          = 6,
    RepairAtAirfield = 7,
    Gather           = 8,
}

impl PersistEnum for AiCommandKind {
    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Idle,
            1 => Self::MoveTo,
            2 => Self::Hunt,
            3 => Self::Evacuate,
            4 => Self::Reinforce,
            5 => Self::CombatDrop,
            6 => Self::ExitMap,
            7 => Self::RepairAtAirfield,
            8 => Self::Gather,
            _ => return None,
        })
    }
}

/// An order given to an AI module.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AiCommand {
    pub kind:     AiCommandKind,
    pub position: Vector3,
    pub object:   ObjectId,
}

impl AiCommand {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn move_to(position: Vector3) -> Self {
        Self { kind: AiCommandKind::MoveTo, position, object: ObjectId::INVALID }
    }

    pub fn hunt() -> Self {
        Self { kind: AiCommandKind::Hunt, ..Self::default() }
    }

    pub fn gather() -> Self {
        Self { kind: AiCommandKind::Gather, ..Self::default() }
    }

    pub fn at(kind: AiCommandKind, position: Vector3) -> Self {
        Self { kind, position, object: ObjectId::INVALID }
    }

    pub fn on_object(kind: AiCommandKind, object: ObjectId) -> Self {
        Self { kind, position: Vector3::ZERO, object }
    }
}

impl Persistable for AiCommand {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_enum("Kind", &mut self.kind)?;
        p.persist_vector3("Position", &mut self.position)?;
        p.persist_object_id("Object", &mut self.object)
    }
}

// ── Template data ──────────────────────────────────────────────

/// Locomotion and weapon parameters shared by every AI kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AiUpdateData {
    pub speed:           f32,
    pub attack_range:    f32,
    pub attack_damage:   f32,
    pub scan_range:      f32,
    pub attack_interval: LogicFrameSpan,
}

// ── Shared AI record ───────────────────────────────────────────

pub const AI_IDLE:    StateId = StateId(0);
pub const AI_MOVE_TO: StateId = StateId(1);
pub const AI_HUNT:    StateId = StateId(2);

pub const ATTACK_AREA_SCAN:   StateId = StateId(0);
pub const ATTACK_AREA_ENGAGE: StateId = StateId(1);

/// Data block the AI machine's states operate on.
#[derive(Debug, Clone, PartialEq)]
pub struct AiData {
    pub params:          AiUpdateData,
    pub target_points:   Vec<Vector3>,
    pub goal_object:     ObjectId,
    pub pending_command: Option<AiCommand>,
}

/// Base record of every AI module.
#[derive(Debug)]
pub struct AiUpdateBase {
    pub update:  UpdateModuleBase,
    pub machine: StateMachine<AiData>,
    pub data:    AiData,
}

impl AiUpdateBase {
    pub fn new(params: &AiUpdateData, build: &BuildContext<'_>) -> Self {
        let max = build.game_data.max_state_transitions_per_tick;
        Self {
            update:  UpdateModuleBase::default(),
            machine: standard_ai_machine(max),
            data:    AiData {
                params:          params.clone(),
                target_points:   Vec::new(),
                goal_object:     ObjectId::INVALID,
                pending_command: None,
            },
        }
    }

    pub fn queue_command(&mut self, command: AiCommand) {
        self.data.pending_command = Some(command);
    }

    pub fn set_state(&mut self, id: StateId, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        let mut cx = StateContext { body, data: &mut self.data, world };
        self.machine.set_state(id, &mut cx)
    }

    pub fn move_to(&mut self, destination: Vector3, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        self.data.target_points = vec![destination];
        self.set_state(AI_MOVE_TO, body, world)
    }

    pub fn is_idle(&self) -> bool {
        self.machine.is_in(AI_IDLE)
    }

    /// The commands every AI understands. Others are left to the owning module.
    pub fn execute_command(
        &mut self,
        command: AiCommand,
        body: &mut ObjectBody,
        world: &mut World<'_>,
    ) -> SimResult<()> {
        match command.kind {
            AiCommandKind::Idle => {
                self.data.target_points.clear();
                self.set_state(AI_IDLE, body, world)
            }
            AiCommandKind::MoveTo => self.move_to(command.position, body, world),
            AiCommandKind::Hunt => self.set_state(AI_HUNT, body, world),
            other => {
                log::debug!("{} ignores command {other:?}", body.id);
                Ok(())
            }
        }
    }

    /// Applies a queued command, then runs the AI machine.
    pub fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        if let Some(command) = self.data.pending_command.take() {
            self.execute_command(command, body, world)?;
        }
        let mut cx = StateContext { body, data: &mut self.data, world };
        self.machine.update(&mut cx)?;
        Ok(())
    }
}

impl Persistable for AiUpdateBase {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.update)?;
        p.persist_object("StateMachine", &mut self.machine)?;
        p.persist_list_u16("TargetPoints", &mut self.data.target_points, |p, point| {
            p.persist_vector3("Point", point)
        })?;
        p.persist_object_id("GoalObject", &mut self.data.goal_object)?;

        let mut has_pending = self.data.pending_command.is_some();
        p.persist_bool("HasPendingCommand", &mut has_pending)?;
        if has_pending {
            let mut command = self.data.pending_command.unwrap_or_default();
            p.persist_object("PendingCommand", &mut command)?;
            self.data.pending_command = Some(command);
        } else {
            self.data.pending_command = None;
        }
        Ok(())
    }
}

pub fn standard_ai_machine(max_transitions: u32) -> StateMachine<AiData> {
    StateMachine::new("AIStateMachine", max_transitions)
        .with_state(AI_IDLE, IdleState, StateId::INVALID, StateId::INVALID)
        .with_state(AI_MOVE_TO, MoveToState, AI_IDLE, AI_IDLE)
        .with_state(AI_HUNT, HuntState::new(max_transitions), AI_IDLE, AI_IDLE)
}

// ── States ─────────────────────────────────────────────────────

pub struct IdleState;

impl State<AiData> for IdleState {
    fn name(&self) -> &'static str {
        "Idle"
    }

    fn update(&mut self, _cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Continue)
    }
}

/// Walks the target-point list in order; done when it is empty.
pub struct MoveToState;

impl State<AiData> for MoveToState {
    fn name(&self) -> &'static str {
        "MoveTo"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Moving, true);
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        let Some(&target) = cx.data.target_points.first() else {
            return Ok(StateOutcome::Done);
        };
        // Keep the current height above ground so flyers stay airborne.
        let from = cx.body.position;
        let above_ground = from.z - cx.world.terrain.height_at(from.x, from.y);
        let level = Vector3::new(target.x, target.y, from.z);
        let mut position = from.step_toward(level, cx.data.params.speed);
        position.z = cx.world.terrain.height_at(position.x, position.y) + above_ground.max(0.0);
        cx.body.position = position;
        if cx.body.position.distance_2d(target) <= f32::EPSILON {
            cx.data.target_points.remove(0);
        }
        if cx.data.target_points.is_empty() {
            return Ok(StateOutcome::Done);
        }
        Ok(StateOutcome::Continue)
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Moving, false);
        Ok(())
    }
}

/// Seeks and attacks enemies around the unit through a nested machine.
pub struct HuntState {
    attack_area: StateMachine<AiData>,
    unknown:     u32,
}

impl HuntState {
    pub fn new(max_transitions: u32) -> Self {
        let attack_area = StateMachine::new("AttackAreaStateMachine", max_transitions)
            .with_state(ATTACK_AREA_SCAN, AttackAreaScanState, StateId::INVALID, StateId::INVALID)
            .with_state(
                ATTACK_AREA_ENGAGE,
                AttackAreaEngageState { next_shot: LogicFrame::ZERO },
                ATTACK_AREA_SCAN,
                ATTACK_AREA_SCAN,
            );
        Self { attack_area, unknown: 0 }
    }

    pub fn attack_area(&self) -> &StateMachine<AiData> {
        &self.attack_area
    }
}

impl State<AiData> for HuntState {
    fn name(&self) -> &'static str {
        "Hunt"
    }

    fn on_enter(&mut self, _cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        self.attack_area.restore_state(self.attack_area.initial())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        self.attack_area.update(cx)?;
        Ok(StateOutcome::Continue)
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Attacking, false);
        Ok(())
    }

    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_sentinel_bool("Unknown1", true)?;
        p.persist_object("AttackAreaStateMachine", &mut self.attack_area)?;
        p.persist_u32("Unknown2", &mut self.unknown)
    }
}

/// Looks for the nearest enemy in scan range.
pub struct AttackAreaScanState;

impl State<AiData> for AttackAreaScanState {
    fn name(&self) -> &'static str {
        "AttackAreaScan"
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        let origin = cx.body.position;
        let owner = cx.body.owner;
        let nearby = cx.world.partition.objects_near(origin, cx.data.params.scan_range);

        let mut best: Option<(f32, ObjectId)> = None;
        for id in nearby {
            let Some(candidate) = cx.world.objects.get(id) else { continue };
            let body = &candidate.body;
            if body.is_dead() || body.owner == owner || cx.world.players.is_neutral(body.owner) {
                continue;
            }
            let distance = origin.distance_2d(body.position);
            let closer = match best {
                None => true,
                Some((best_distance, best_id)) => {
                    distance < best_distance || (distance == best_distance && id < best_id)
                }
            };
            if closer {
                best = Some((distance, id));
            }
        }

        match best {
            Some((_, id)) => {
                cx.data.goal_object = id;
                Ok(StateOutcome::GoTo(ATTACK_AREA_ENGAGE))
            }
            None => Ok(StateOutcome::Continue),
        }
    }
}

/// Closes to weapon range and fires every attack interval.
pub struct AttackAreaEngageState {
    pub next_shot: LogicFrame,
}

impl State<AiData> for AttackAreaEngageState {
    fn name(&self) -> &'static str {
        "AttackAreaEngage"
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        let frame = cx.frame();
        let goal = cx.data.goal_object;
        let Some(target) = cx.world.objects.get_mut(goal) else {
            cx.data.goal_object = ObjectId::INVALID;
            return Ok(StateOutcome::Done);
        };
        if target.body.is_dead() {
            cx.data.goal_object = ObjectId::INVALID;
            return Ok(StateOutcome::Done);
        }

        let target_position = target.body.position;
        if cx.body.position.distance_2d(target_position) > cx.data.params.attack_range {
            cx.body.conditions.set(ModelConditionFlag::Attacking, false);
            cx.body.position = cx.body.position.step_toward(target_position, cx.data.params.speed);
            return Ok(StateOutcome::Continue);
        }

        cx.body.conditions.set(ModelConditionFlag::Attacking, true);
        if frame >= self.next_shot {
            let amount = cx.data.params.attack_damage * cx.world.rng.range_f32(0.9, 1.1);
            target.apply_damage(amount, frame);
            self.next_shot = frame + cx.data.params.attack_interval;
            cx.world.emit(LogicEvent::DamageDealt {
                frame:    frame.value(),
                attacker: cx.body.id,
                victim:   goal,
                amount,
            });
        }
        Ok(StateOutcome::Continue)
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Attacking, false);
        Ok(())
    }

    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_frame("NextShotFrame", &mut self.next_shot)
    }
}

// ── AIUpdateInterface ──────────────────────────────────────────

/// Plain AI: idle, move and hunt.
#[derive(Debug)]
pub struct AiUpdateInterface {
    pub ai: AiUpdateBase,
}

impl AiUpdateInterface {
    pub fn new(data: &AiUpdateData, build: &BuildContext<'_>) -> Self {
        Self { ai: AiUpdateBase::new(data, build) }
    }
}

impl Persistable for AiUpdateInterface {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.ai)
    }
}

impl ModuleBehavior for AiUpdateInterface {
    fn kind(&self) -> &'static str {
        "AIUpdateInterface"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Ai
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.ai.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.ai.update)
    }

    fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        self.ai.update(body, world)?;
        Ok(UpdateSleepTime::None)
    }

    fn accept_command(&mut self, command: AiCommand) -> bool {
        self.ai.queue_command(command);
        true
    }
}
