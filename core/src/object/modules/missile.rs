//! Guided missile AI: inactive, waiting for ignition, then flying at its
//! target until it arrives or hits the ground.

use super::ai::{AiCommand, AiCommandKind, AiUpdateBase, AiUpdateData};
use super::updates::detonate;
use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    error::SimResult,
    logic::World,
    object::{
        module::{BuildContext, ModuleBehavior, ModuleFamily, UpdateModuleBase, UpdateSleepTime},
        ObjectBody,
    },
    persist::{Persistable, StatePersister},
    state_machine::{State, StateContext, StateId, StateMachine, StateOutcome},
    types::{ObjectId, Vector3},
};

pub const MISSILE_INACTIVE:             StateId = StateId(0);
pub const MISSILE_WAITING_FOR_IGNITION: StateId = StateId(1);
pub const MISSILE_MOVING:               StateId = StateId(2);

#[derive(Debug, Clone, PartialEq)]
pub struct MissileAiData {
    pub ai:                AiUpdateData,
    pub ignition_delay:    LogicFrameSpan,
    pub detonation_damage: f32,
    pub detonation_radius: f32,
    pub weapon_name:       String,
    pub exhaust_name:      String,
}

/// Data block of the flight machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MissileFlight {
    pub params:            MissileAiData,
    pub target_position:   Vector3,
    pub victim:            ObjectId,
    pub launcher:          ObjectId,
    pub has_target:        bool,
    pub next_state_change: LogicFrame,
    pub launch_frame:      LogicFrame,
    pub travelled:         f32,
    pub is_armed:          bool,
    pub weapon_name:       String,
    pub exhaust_name:      String,
    pub current_position:  Vector3,
}

pub fn flight_machine(max_transitions: u32) -> StateMachine<MissileFlight> {
    StateMachine::new("MissileFlight", max_transitions)
        .with_state(MISSILE_INACTIVE, InactiveState, StateId::INVALID, StateId::INVALID)
        .with_state(MISSILE_WAITING_FOR_IGNITION, WaitingForIgnitionState, MISSILE_MOVING, MISSILE_INACTIVE)
        .with_state(MISSILE_MOVING, MovingState, StateId::INVALID, StateId::INVALID)
}

pub struct InactiveState;

impl State<MissileFlight> for InactiveState {
    fn name(&self) -> &'static str {
        "Inactive"
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, MissileFlight>) -> SimResult<StateOutcome> {
        if cx.data.has_target {
            Ok(StateOutcome::GoTo(MISSILE_WAITING_FOR_IGNITION))
        } else {
            Ok(StateOutcome::Continue)
        }
    }
}

pub struct WaitingForIgnitionState;

impl State<MissileFlight> for WaitingForIgnitionState {
    fn name(&self) -> &'static str {
        "WaitingForIgnition"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, MissileFlight>) -> SimResult<()> {
        cx.data.next_state_change = cx.frame() + cx.data.params.ignition_delay;
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, MissileFlight>) -> SimResult<StateOutcome> {
        if cx.frame() >= cx.data.next_state_change {
            return Ok(StateOutcome::Done);
        }
        Ok(StateOutcome::Continue)
    }
}

pub struct MovingState;

impl State<MissileFlight> for MovingState {
    fn name(&self) -> &'static str {
        "Moving"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, MissileFlight>) -> SimResult<()> {
        cx.data.is_armed = true;
        cx.data.launch_frame = cx.frame();
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, MissileFlight>) -> SimResult<StateOutcome> {
        let from = cx.body.position;
        let next = from.step_toward(cx.data.target_position, cx.data.params.ai.speed);
        cx.data.travelled += from.distance(next);
        cx.body.position = next;
        cx.data.current_position = next;

        let ground = cx.world.terrain.height_at(next.x, next.y);
        if next.distance(cx.data.target_position) <= f32::EPSILON || next.z < ground {
            let (damage, radius) = (cx.data.params.detonation_damage, cx.data.params.detonation_radius);
            detonate(cx.body, cx.world, damage, radius);
        }
        Ok(StateOutcome::Continue)
    }
}

// ── Module ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MissileAiUpdate {
    pub ai:           AiUpdateBase,
    pub machine:      StateMachine<MissileFlight>,
    pub flight:       MissileFlight,
    unknown_position: Vector3,
    unknown_object:   ObjectId,
    unknown_int1:     i32,
    unknown_int2:     i32,
}

impl MissileAiUpdate {
    pub fn new(data: &MissileAiData, build: &BuildContext<'_>) -> Self {
        Self {
            ai:      AiUpdateBase::new(&data.ai, build),
            machine: flight_machine(build.game_data.max_state_transitions_per_tick),
            flight:  MissileFlight {
                params:            data.clone(),
                target_position:   Vector3::ZERO,
                victim:            ObjectId::INVALID,
                launcher:          ObjectId::INVALID,
                has_target:        false,
                next_state_change: LogicFrame::ZERO,
                launch_frame:      LogicFrame::ZERO,
                travelled:         0.0,
                is_armed:          false,
                weapon_name:       data.weapon_name.clone(),
                exhaust_name:      data.exhaust_name.clone(),
                current_position:  Vector3::ZERO,
            },
            unknown_position: Vector3::ZERO,
            unknown_object:   ObjectId::INVALID,
            unknown_int1:     0,
            unknown_int2:     0,
        }
    }

    pub fn flight_state(&self) -> StateId {
        self.machine.current()
    }
}

impl Persistable for MissileAiUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        let version = p.persist_version(6)?;
        p.persist_base(&mut self.ai)?;
        p.persist_vector3("UnknownPosition", &mut self.unknown_position)?;
        self.machine.persist_current_id(p)?;
        p.persist_frame("NextStateChangeFrame", &mut self.flight.next_state_change)?;
        p.persist_sentinel_i32("Unknown1", i32::MAX)?;
        p.persist_object_id("Launcher", &mut self.flight.launcher)?;
        p.persist_object_id("UnknownObject", &mut self.unknown_object)?;
        p.persist_bool("HasTarget", &mut self.flight.has_target)?;
        p.persist_frame("LaunchFrame", &mut self.flight.launch_frame)?;
        p.persist_f32("Travelled", &mut self.flight.travelled)?;
        p.persist_sentinel_f32("Unknown2", 99_999.0)?;
        p.persist_ascii_string("WeaponName", &mut self.flight.weapon_name)?;
        p.persist_ascii_string("ExhaustSystemName", &mut self.flight.exhaust_name)?;
        p.persist_bool("IsArmed", &mut self.flight.is_armed)?;
        p.persist_vector3("CurrentPosition", &mut self.flight.current_position)?;
        p.persist_i32("Unknown3", &mut self.unknown_int1)?;
        p.persist_i32("Unknown4", &mut self.unknown_int2)?;
        if version >= 6 {
            p.skip_unknown_bytes(6)?;
        }
        Ok(())
    }
}

impl ModuleBehavior for MissileAiUpdate {
    fn kind(&self) -> &'static str {
        "MissileAIUpdate"
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
        let mut cx = StateContext { body, data: &mut self.flight, world };
        self.machine.update(&mut cx)?;
        Ok(UpdateSleepTime::None)
    }

    /// A move order is the launch order.
    fn accept_command(&mut self, command: AiCommand) -> bool {
        if command.kind != AiCommandKind::MoveTo {
            return false;
        }
        self.flight.target_position = command.position;
        self.flight.victim = command.object;
        self.flight.has_target = true;
        true
    }
}
