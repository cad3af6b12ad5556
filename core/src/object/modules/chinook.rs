//! Chinook transport helicopter: a supply truck whose AI machine gains
//! flight states for evacuation, reinforcement, combat drops and repair.
//!
//! Transport state ids (registered on the AI machine next to the
//! standard ids):
//!   1001 takeoff                    1002 landing
//!   1003 move to repair airfield    1004 move to evacuation point
//!   1005 land for evacuation        1007 move to reinforcement point
//!   1008 land for reinforcement     1010 take off after reinforcement
//!   1011 exit map                   1012 move to combat drop
//!   1013 combat drop

use super::ai::{AiCommand, AiCommandKind, AiData, AI_IDLE};
use super::supply::{SupplyAiData, SupplyTruckAiUpdate};
use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    error::SimResult,
    logic::World,
    object::{
        module::{BuildContext, ModuleBehavior, ModuleFamily, UpdateModuleBase, UpdateSleepTime},
        ModelConditionFlag, ObjectBody, ObjectStatus,
    },
    persist::{PersistEnum, Persistable, StatePersister},
    state_machine::{State, StateContext, StateId, StateOutcome},
    types::{ObjectId, Vector3},
};

pub const TAKEOFF:                    StateId = StateId(1001);
pub const LANDING:                    StateId = StateId(1002);
pub const MOVE_TO_AIRFIELD:           StateId = StateId(1003);
pub const MOVE_TO_EVACUATION:         StateId = StateId(1004);
pub const LAND_FOR_EVACUATION:        StateId = StateId(1005);
pub const MOVE_TO_REINFORCEMENT:      StateId = StateId(1007);
pub const LAND_FOR_REINFORCEMENT:     StateId = StateId(1008);
pub const TAKEOFF_AFTER_REINFORCEMENT: StateId = StateId(1010);
pub const EXIT_MAP:                   StateId = StateId(1011);
pub const MOVE_TO_COMBAT_DROP:        StateId = StateId(1012);
pub const COMBAT_DROP:                StateId = StateId(1013);

#[derive(Debug, Clone, PartialEq)]
pub struct ChinookAiData {
    pub supply:           SupplyAiData,
    pub flight_altitude:  f32,
    pub takeoff_duration: LogicFrameSpan,
    pub drop_duration:    LogicFrameSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChinookFlightState {
    Takeoff         = 0,
    InAir           = 1,
    CombatDropMaybe = 2,
    Landing         = 3,
    OnGround        = 4,
}

impl PersistEnum for ChinookFlightState {
    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Takeoff,
            1 => Self::InAir,
            2 => Self::CombatDropMaybe,
            3 => Self::Landing,
            4 => Self::OnGround,
            _ => return None,
        })
    }
}

// ── States ─────────────────────────────────────────────────────

/// Climbs to (or descends from) cruise altitude over a fixed duration.
pub struct ChinookTakeoffAndLandingState {
    landing:   bool,
    altitude:  f32,
    duration:  LogicFrameSpan,
    finish_at: LogicFrame,
}

impl ChinookTakeoffAndLandingState {
    pub fn new(landing: bool, altitude: f32, duration: LogicFrameSpan) -> Self {
        Self { landing, altitude, duration, finish_at: LogicFrame::ZERO }
    }

    fn condition(&self) -> ModelConditionFlag {
        if self.landing {
            ModelConditionFlag::Landing
        } else {
            ModelConditionFlag::Takeoff
        }
    }
}

impl State<AiData> for ChinookTakeoffAndLandingState {
    fn name(&self) -> &'static str {
        if self.landing {
            "ChinookLanding"
        } else {
            "ChinookTakeoff"
        }
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        self.finish_at = cx.frame() + self.duration;
        cx.body.conditions.set(self.condition(), true);
        if !self.landing {
            cx.body.status.set(ObjectStatus::Airborne, true);
        }
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        let ground = cx.world.terrain.height_at(cx.body.position.x, cx.body.position.y);
        let goal = if self.landing { ground } else { ground + self.altitude };
        if cx.frame() >= self.finish_at {
            cx.body.position.z = goal;
            cx.body.conditions.set(self.condition(), false);
            if self.landing {
                cx.body.status.set(ObjectStatus::Airborne, false);
            }
            return Ok(StateOutcome::Done);
        }
        let frames_left = (self.finish_at - cx.frame()).value().max(1) as f32;
        let z = cx.body.position.z;
        cx.body.position.z = z + (goal - z) / frames_left;
        Ok(StateOutcome::Continue)
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(self.condition(), false);
        Ok(())
    }

    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_frame("FinishFrame", &mut self.finish_at)
    }
}

/// Flies straight at cruise altitude toward a fixed point.
pub struct MoveTowardsState {
    pub target: Vector3,
    altitude:   f32,
}

impl MoveTowardsState {
    pub fn new(altitude: f32) -> Self {
        Self { target: Vector3::ZERO, altitude }
    }
}

impl State<AiData> for MoveTowardsState {
    fn name(&self) -> &'static str {
        "MoveTowards"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Moving, true);
        cx.body.status.set(ObjectStatus::Airborne, true);
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        let from = cx.body.position;
        let level = Vector3::new(self.target.x, self.target.y, from.z);
        let mut next = from.step_toward(level, cx.data.params.speed);
        next.z = cx.world.terrain.height_at(next.x, next.y) + self.altitude;
        cx.body.position = next;
        if next.distance_2d(self.target) <= f32::EPSILON {
            return Ok(StateOutcome::Done);
        }
        Ok(StateOutcome::Continue)
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Moving, false);
        Ok(())
    }

    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_vector3("Target", &mut self.target)
    }
}

pub struct ChinookExitMapState;

impl State<AiData> for ChinookExitMapState {
    fn name(&self) -> &'static str {
        "ChinookExitMap"
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        log::debug!("{} left the map at frame {}", cx.body.id, cx.frame());
        cx.body.kill();
        Ok(StateOutcome::Continue)
    }
}

/// Hovers while passengers rappel down.
pub struct ChinookCombatDropState {
    duration:   LogicFrameSpan,
    drop_until: LogicFrame,
}

impl State<AiData> for ChinookCombatDropState {
    fn name(&self) -> &'static str {
        "ChinookCombatDrop"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        self.drop_until = cx.frame() + self.duration;
        cx.body.conditions.set(ModelConditionFlag::Rappelling, true);
        Ok(())
    }

    fn update(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<StateOutcome> {
        if cx.frame() >= self.drop_until {
            return Ok(StateOutcome::Done);
        }
        Ok(StateOutcome::Continue)
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, AiData>) -> SimResult<()> {
        cx.body.conditions.set(ModelConditionFlag::Rappelling, false);
        Ok(())
    }

    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_frame("DropUntil", &mut self.drop_until)
    }
}

// ── Module ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ChinookAiUpdate {
    pub truck:            SupplyTruckAiUpdate,
    queued_command:       Option<AiCommand>,
    flight_state:         ChinookFlightState,
    airfield_to_repair_at: ObjectId,
}

impl ChinookAiUpdate {
    pub fn new(data: &ChinookAiData, build: &BuildContext<'_>) -> Self {
        let mut truck = SupplyTruckAiUpdate::new(&data.supply, build);
        let altitude = data.flight_altitude;
        let takeoff = || ChinookTakeoffAndLandingState::new(false, altitude, data.takeoff_duration);
        let landing = || ChinookTakeoffAndLandingState::new(true, altitude, data.takeoff_duration);
        let none = StateId::INVALID;

        let machine = &mut truck.supply.ai.machine;
        machine.define_state(TAKEOFF, takeoff(), AI_IDLE, AI_IDLE);
        machine.define_state(LANDING, landing(), AI_IDLE, AI_IDLE);
        machine.define_state(MOVE_TO_AIRFIELD, MoveTowardsState::new(altitude), LANDING, AI_IDLE);
        machine.define_state(MOVE_TO_EVACUATION, MoveTowardsState::new(altitude), LAND_FOR_EVACUATION, AI_IDLE);
        machine.define_state(LAND_FOR_EVACUATION, landing(), none, AI_IDLE);
        machine.define_state(MOVE_TO_REINFORCEMENT, MoveTowardsState::new(altitude), LAND_FOR_REINFORCEMENT, AI_IDLE);
        machine.define_state(LAND_FOR_REINFORCEMENT, landing(), TAKEOFF_AFTER_REINFORCEMENT, AI_IDLE);
        machine.define_state(TAKEOFF_AFTER_REINFORCEMENT, takeoff(), EXIT_MAP, AI_IDLE);
        machine.define_state(EXIT_MAP, ChinookExitMapState, none, none);
        machine.define_state(MOVE_TO_COMBAT_DROP, MoveTowardsState::new(altitude), COMBAT_DROP, AI_IDLE);
        machine.define_state(
            COMBAT_DROP,
            ChinookCombatDropState { duration: data.drop_duration, drop_until: LogicFrame::ZERO },
            AI_IDLE,
            AI_IDLE,
        );

        Self {
            truck,
            queued_command: None,
            flight_state: ChinookFlightState::OnGround,
            airfield_to_repair_at: ObjectId::INVALID,
        }
    }

    pub fn flight_state(&self) -> ChinookFlightState {
        self.flight_state
    }

    pub fn queued_command(&self) -> Option<AiCommand> {
        self.queued_command
    }

    /// Orders arriving mid-takeoff or mid-landing wait until the
    /// manoeuvre is over.
    fn hold_or_release_command(&mut self) {
        let pending = &mut self.truck.supply.ai.data.pending_command;
        match self.flight_state {
            ChinookFlightState::Takeoff | ChinookFlightState::Landing => {
                if let Some(command) = pending.take() {
                    self.queued_command = Some(command);
                }
            }
            _ => {
                if pending.is_none() {
                    *pending = self.queued_command.take();
                }
            }
        }
    }

    fn fly_to(&mut self, state: StateId, target: Vector3, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        let ai = &mut self.truck.supply.ai;
        if let Some(mover) = ai.machine.state_mut::<MoveTowardsState>(state) {
            mover.target = target;
        }
        ai.set_state(state, body, world)
    }

    /// Transport orders become flight states; everything else is left for
    /// the supply and AI layers.
    fn route_transport_command(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        let Some(command) = self.truck.supply.ai.data.pending_command else {
            return Ok(());
        };
        let target = match command.kind {
            AiCommandKind::Evacuate => Some((MOVE_TO_EVACUATION, command.position)),
            AiCommandKind::Reinforce => Some((MOVE_TO_REINFORCEMENT, command.position)),
            AiCommandKind::CombatDrop => Some((MOVE_TO_COMBAT_DROP, command.position)),
            AiCommandKind::ExitMap => Some((EXIT_MAP, command.position)),
            AiCommandKind::RepairAtAirfield => {
                self.airfield_to_repair_at = command.object;
                world
                    .objects
                    .get(command.object)
                    .map(|airfield| (MOVE_TO_AIRFIELD, airfield.body.position))
            }
            _ => return Ok(()),
        };
        self.truck.supply.ai.data.pending_command = None;
        match target {
            Some((state, position)) => self.fly_to(state, position, body, world),
            None => {
                log::debug!("{} has no airfield {} to repair at", body.id, command.object);
                Ok(())
            }
        }
    }

    fn derive_flight_state(&self, body: &ObjectBody) -> ChinookFlightState {
        let current = self.truck.supply.ai.machine.current();
        let airborne = body.status.get(ObjectStatus::Airborne);
        if current == TAKEOFF || current == TAKEOFF_AFTER_REINFORCEMENT {
            ChinookFlightState::Takeoff
        } else if airborne && (current == LANDING || current == LAND_FOR_EVACUATION || current == LAND_FOR_REINFORCEMENT) {
            ChinookFlightState::Landing
        } else if current == COMBAT_DROP {
            ChinookFlightState::CombatDropMaybe
        } else if airborne {
            ChinookFlightState::InAir
        } else {
            ChinookFlightState::OnGround
        }
    }
}

impl Persistable for ChinookAiUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        let version = p.persist_version(2)?;
        p.persist_base(&mut self.truck)?;

        let mut has_queued = self.queued_command.is_some();
        p.persist_bool("HasQueuedCommand", &mut has_queued)?;
        if has_queued {
            let mut command = self.queued_command.unwrap_or_default();
            p.persist_object("QueuedCommand", &mut command)?;
            self.queued_command = Some(command);
        } else {
            self.queued_command = None;
        }

        p.persist_enum("FlightState", &mut self.flight_state)?;
        p.persist_object_id("AirfieldToRepairAt", &mut self.airfield_to_repair_at)?;
        if version >= 2 {
            p.skip_unknown_bytes(12)?;
        }
        Ok(())
    }
}

impl ModuleBehavior for ChinookAiUpdate {
    fn kind(&self) -> &'static str {
        "ChinookAIUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Ai
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.truck.supply.ai.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.truck.supply.ai.update)
    }

    fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        self.hold_or_release_command();
        self.route_transport_command(body, world)?;
        self.truck.supply.update(body, world, true)?;
        self.flight_state = self.derive_flight_state(body);
        Ok(UpdateSleepTime::None)
    }

    fn accept_command(&mut self, command: AiCommand) -> bool {
        self.truck.supply.ai.queue_command(command);
        true
    }
}
