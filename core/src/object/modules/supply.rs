//! Supply gathering: the gather state machine shared by supply trucks,
//! workers and Chinooks.
//!
//! A gatherer loops: find a warehouse, drive to it, take boxes one at a
//! time until full or the warehouse is empty, find a supply center, queue
//! for its dock, dump, repeat.
//!
//! RULES:
//!   - Movement is requested through `move_request` and carried out by the
//!     AI machine; gather states never move the body themselves.
//!   - Box count and the pending wait frame live in the module record so a
//!     save taken between two boxes resumes exactly.

use super::ai::{AiCommand, AiCommandKind, AiUpdateBase, AiUpdateData};
use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    error::{SimError, SimResult},
    event::LogicEvent,
    logic::World,
    object::{
        module::{BuildContext, ModuleBehavior, ModuleFamily, UpdateModuleBase, UpdateSleepTime},
        ModelConditionFlag, ObjectBody,
    },
    persist::{Persistable, StatePersister},
    state_machine::{State, StateContext, StateId, StateMachine, StateOutcome},
    types::{ObjectId, Vector3},
};

/// Closest a gatherer must get to a dock before it counts as arrived.
const DOCK_DISTANCE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyAiData {
    pub ai:                            AiUpdateData,
    pub max_boxes:                     u32,
    pub supply_center_action_delay:    LogicFrameSpan,
    pub supply_warehouse_action_delay: LogicFrameSpan,
    pub scan_distance:                 f32,
    /// Extra value per box once the owner has `SUPPLY_LINES_UPGRADE`.
    pub upgraded_supply_boost:         u32,
}

pub const SUPPLY_LINES_UPGRADE: &str = "Upgrade_AmericaSupplyLines";

// ── Gather machine ─────────────────────────────────────────────

pub const GATHER_DEFAULT:             StateId = StateId(0);
pub const SEARCHING_FOR_SOURCE:       StateId = StateId(1);
pub const APPROACHING_SOURCE:         StateId = StateId(2);
pub const REQUESTING_SUPPLIES:        StateId = StateId(3);
pub const GATHERING_SUPPLIES:         StateId = StateId(4);
pub const PICKING_UP_SUPPLIES:        StateId = StateId(5);
pub const SEARCHING_FOR_TARGET:       StateId = StateId(6);
pub const APPROACHING_TARGET:         StateId = StateId(7);
pub const ENQUEUED_AT_TARGET:         StateId = StateId(8);
pub const START_DUMPING_SUPPLIES:     StateId = StateId(9);
pub const DUMPING_SUPPLIES:           StateId = StateId(10);
pub const FINISHED_DUMPING_SUPPLIES:  StateId = StateId(11);

/// Data block of the gather machine.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherData {
    pub params:        SupplyAiData,
    pub num_boxes:     i32,
    pub wait_until:    LogicFrame,
    pub supply_source: ObjectId,
    pub supply_target: ObjectId,
    pub destination:   Vector3,
    /// Set by a state, consumed by the owning module after the machine runs.
    pub move_request:  Option<Vector3>,
}

impl GatherData {
    fn request_move(&mut self, destination: Vector3) {
        self.destination = destination;
        self.move_request = Some(destination);
    }

    fn is_full(&self) -> bool {
        self.num_boxes >= 0 && self.num_boxes as u32 >= self.params.max_boxes
    }
}

type GatherContext<'a, 'w> = StateContext<'a, 'w, GatherData>;

pub fn gather_machine(max_transitions: u32) -> StateMachine<GatherData> {
    StateMachine::new("SupplyGatherStateMachine", max_transitions)
        .with_state(GATHER_DEFAULT, GatherIdleState, StateId::INVALID, StateId::INVALID)
        .with_state(SEARCHING_FOR_SOURCE, SearchingForSourceState, StateId::INVALID, GATHER_DEFAULT)
        .with_state(APPROACHING_SOURCE, ApproachingDockState { source: true }, REQUESTING_SUPPLIES, SEARCHING_FOR_SOURCE)
        .with_state(REQUESTING_SUPPLIES, RequestingSuppliesState, GATHERING_SUPPLIES, PICKING_UP_SUPPLIES)
        .with_state(GATHERING_SUPPLIES, GatheringSuppliesState, REQUESTING_SUPPLIES, PICKING_UP_SUPPLIES)
        .with_state(PICKING_UP_SUPPLIES, PickingUpSuppliesState, SEARCHING_FOR_TARGET, SEARCHING_FOR_TARGET)
        .with_state(SEARCHING_FOR_TARGET, SearchingForTargetState, StateId::INVALID, GATHER_DEFAULT)
        .with_state(APPROACHING_TARGET, ApproachingDockState { source: false }, ENQUEUED_AT_TARGET, SEARCHING_FOR_TARGET)
        .with_state(ENQUEUED_AT_TARGET, EnqueuedAtTargetState, START_DUMPING_SUPPLIES, SEARCHING_FOR_TARGET)
        .with_state(START_DUMPING_SUPPLIES, StartDumpingState, DUMPING_SUPPLIES, DUMPING_SUPPLIES)
        .with_state(DUMPING_SUPPLIES, DumpingSuppliesState, FINISHED_DUMPING_SUPPLIES, FINISHED_DUMPING_SUPPLIES)
        .with_state(FINISHED_DUMPING_SUPPLIES, FinishedDumpingState, SEARCHING_FOR_SOURCE, SEARCHING_FOR_SOURCE)
}

/// Nearest candidate by 2D distance, ties broken by lower id.
fn nearest(origin: Vector3, candidates: impl Iterator<Item = (ObjectId, Vector3)>, range: f32) -> Option<(ObjectId, Vector3)> {
    let mut best: Option<(f32, ObjectId, Vector3)> = None;
    for (id, position) in candidates {
        let distance = origin.distance_2d(position);
        if distance > range {
            continue;
        }
        let closer = match best {
            None => true,
            Some((d, best_id, _)) => distance < d || (distance == d && id < best_id),
        };
        if closer {
            best = Some((distance, id, position));
        }
    }
    best.map(|(_, id, position)| (id, position))
}

pub struct GatherIdleState;

impl State<GatherData> for GatherIdleState {
    fn name(&self) -> &'static str {
        "Default"
    }

    fn update(&mut self, _cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Continue)
    }
}

pub struct SearchingForSourceState;

impl State<GatherData> for SearchingForSourceState {
    fn name(&self) -> &'static str {
        "SearchingForSupplySource"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        let player = cx.world.players.get(cx.body.owner)?;
        let objects = &*cx.world.objects;
        let candidates = player.supply_manager.warehouses().filter_map(|id| {
            let object = objects.get(id)?;
            let dock = object.supply_warehouse()?;
            (!object.body.is_dead() && dock.has_boxes()).then_some((id, object.body.position))
        });
        match nearest(cx.body.position, candidates, cx.data.params.scan_distance) {
            Some((id, position)) => {
                cx.data.supply_source = id;
                cx.data.request_move(position);
                Ok(StateOutcome::GoTo(APPROACHING_SOURCE))
            }
            None if cx.data.num_boxes > 0 => Ok(StateOutcome::GoTo(SEARCHING_FOR_TARGET)),
            None => Ok(StateOutcome::Continue),
        }
    }
}

/// Waits for the AI to reach the dock chosen by the previous state.
pub struct ApproachingDockState {
    source: bool,
}

impl State<GatherData> for ApproachingDockState {
    fn name(&self) -> &'static str {
        if self.source {
            "ApproachingSupplySource"
        } else {
            "ApproachingSupplyTarget"
        }
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        let dock = if self.source { cx.data.supply_source } else { cx.data.supply_target };
        let alive = cx.world.objects.get(dock).is_some_and(|o| !o.body.is_dead());
        if !alive {
            return Ok(StateOutcome::Interrupted);
        }
        let arrived = cx.body.position.distance_2d(cx.data.destination) <= DOCK_DISTANCE;
        if arrived && !cx.body.conditions.get(ModelConditionFlag::Moving) {
            cx.body.conditions.set(ModelConditionFlag::Docking, true);
            return Ok(StateOutcome::Done);
        }
        Ok(StateOutcome::Continue)
    }
}

pub struct RequestingSuppliesState;

impl State<GatherData> for RequestingSuppliesState {
    fn name(&self) -> &'static str {
        "RequestingSupplies"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        if cx.data.is_full() {
            return Ok(StateOutcome::Interrupted);
        }
        let took = match cx.world.objects.get_mut(cx.data.supply_source) {
            Some(warehouse) => warehouse.take_supply_box(),
            None => false,
        };
        if !took {
            return Ok(StateOutcome::Interrupted);
        }
        // At least one frame per box.
        let delay = cx.data.params.supply_warehouse_action_delay.max(LogicFrameSpan::ONE);
        cx.data.wait_until = cx.frame() + delay;
        Ok(StateOutcome::Done)
    }
}

pub struct GatheringSuppliesState;

impl State<GatherData> for GatheringSuppliesState {
    fn name(&self) -> &'static str {
        "GatheringSupplies"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        if cx.frame() < cx.data.wait_until {
            return Ok(StateOutcome::Continue);
        }
        cx.data.num_boxes += 1;
        cx.body.supply_boxes = cx.data.num_boxes;
        cx.body.conditions.set(ModelConditionFlag::Carrying, true);
        Ok(StateOutcome::Done)
    }
}

pub struct PickingUpSuppliesState;

impl State<GatherData> for PickingUpSuppliesState {
    fn name(&self) -> &'static str {
        "PickingUpSupplies"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        cx.body.conditions.set(ModelConditionFlag::Docking, false);
        Ok(StateOutcome::Done)
    }
}

pub struct SearchingForTargetState;

impl State<GatherData> for SearchingForTargetState {
    fn name(&self) -> &'static str {
        "SearchingForSupplyTarget"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        let player = cx.world.players.get(cx.body.owner)?;
        let objects = &*cx.world.objects;
        let candidates = player.supply_manager.centers().filter_map(|id| {
            let object = objects.get(id)?;
            (!object.body.is_dead()).then_some((id, object.body.position))
        });
        match nearest(cx.body.position, candidates, f32::MAX) {
            Some((id, position)) => {
                cx.data.supply_target = id;
                cx.data.request_move(position);
                Ok(StateOutcome::GoTo(APPROACHING_TARGET))
            }
            None => Ok(StateOutcome::Continue),
        }
    }
}

/// Holds until the center's dock is free, then claims it.
pub struct EnqueuedAtTargetState;

impl State<GatherData> for EnqueuedAtTargetState {
    fn name(&self) -> &'static str {
        "EnqueuedAtSupplyTarget"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        let me = cx.body.id;
        let Some(dock) = cx
            .world
            .objects
            .get_mut(cx.data.supply_target)
            .and_then(|center| center.supply_center_mut())
        else {
            return Ok(StateOutcome::Interrupted);
        };
        if dock.try_claim(me) {
            Ok(StateOutcome::Done)
        } else {
            Ok(StateOutcome::Continue)
        }
    }
}

pub struct StartDumpingState;

impl State<GatherData> for StartDumpingState {
    fn name(&self) -> &'static str {
        "StartDumpingSupplies"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        let boxes = cx.data.num_boxes.max(0) as u32;
        cx.data.wait_until = cx.frame() + cx.data.params.supply_center_action_delay * boxes;
        Ok(StateOutcome::Done)
    }
}

pub struct DumpingSuppliesState;

impl State<GatherData> for DumpingSuppliesState {
    fn name(&self) -> &'static str {
        "DumpingSupplies"
    }

    fn update(&mut self, cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        let frame = cx.frame();
        if frame < cx.data.wait_until {
            return Ok(StateOutcome::Continue);
        }

        let target = cx.data.supply_target;
        let center = cx
            .world
            .objects
            .get_mut(target)
            .ok_or(SimError::ObjectNotFound { id: target })?;
        let owner = center.body.owner;
        let dock = center.supply_center_mut().ok_or(SimError::ObjectNotFound { id: target })?;
        let player = cx.world.players.get(owner)?;
        let mut bonus = player.supply_bonus;
        if player.has_upgrade(SUPPLY_LINES_UPGRADE) {
            bonus += cx.data.params.upgraded_supply_boost;
        }
        let amount = dock.dump_value(cx.data.num_boxes, cx.world.game_data.value_per_supply_box, bonus);
        dock.release(cx.body.id);

        cx.world.players.get_mut(owner)?.bank.deposit(amount);
        cx.world.emit(LogicEvent::SuppliesDeposited {
            frame:  frame.value(),
            truck:  cx.body.id,
            center: target,
            player: owner,
            boxes:  cx.data.num_boxes,
            amount,
        });

        cx.data.num_boxes = 0;
        cx.body.supply_boxes = 0;
        cx.body.conditions.set(ModelConditionFlag::Carrying, false);
        cx.body.conditions.set(ModelConditionFlag::Docking, false);
        Ok(StateOutcome::Done)
    }
}

pub struct FinishedDumpingState;

impl State<GatherData> for FinishedDumpingState {
    fn name(&self) -> &'static str {
        "FinishedDumpingSupplies"
    }

    fn update(&mut self, _cx: &mut GatherContext<'_, '_>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Done)
    }
}

// ── Shared supply record ───────────────────────────────────────

/// Base record of every supply-gathering AI.
#[derive(Debug)]
pub struct SupplyAiBase {
    pub ai:             AiUpdateBase,
    pub gather_machine: StateMachine<GatherData>,
    pub gather:         GatherData,
}

impl SupplyAiBase {
    pub fn new(data: &SupplyAiData, build: &BuildContext<'_>) -> Self {
        Self {
            ai:             AiUpdateBase::new(&data.ai, build),
            gather_machine: gather_machine(build.game_data.max_state_transitions_per_tick),
            gather:         GatherData {
                params:        data.clone(),
                num_boxes:     0,
                wait_until:    LogicFrame::ZERO,
                supply_source: ObjectId::INVALID,
                supply_target: ObjectId::INVALID,
                destination:   Vector3::ZERO,
                move_request:  None,
            },
        }
    }

    pub fn gather_state(&self) -> StateId {
        self.gather_machine.current()
    }

    /// The center whose dock this gatherer is queued at or using.
    pub fn docked_at(&self) -> Option<ObjectId> {
        match self.gather_machine.current() {
            ENQUEUED_AT_TARGET | START_DUMPING_SUPPLIES | DUMPING_SUPPLIES => Some(self.gather.supply_target),
            _ => None,
        }
    }

    /// Gives up the center dock if this gatherer holds it.
    pub fn release_dock(&self, me: ObjectId, world: &mut World<'_>) {
        let Some(target) = self.docked_at() else {
            return;
        };
        if let Some(dock) = world.objects.get_mut(target).and_then(|center| center.supply_center_mut()) {
            dock.release(me);
        }
    }

    fn set_gather_state(&mut self, id: StateId, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        let mut cx = StateContext { body, data: &mut self.gather, world };
        self.gather_machine.set_state(id, &mut cx)
    }

    /// Gather commands start the loop; movement orders stop it and are
    /// left for the AI machine.
    fn intercept_command(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        let Some(command) = self.ai.data.pending_command else {
            return Ok(());
        };
        match command.kind {
            AiCommandKind::Gather => {
                self.ai.data.pending_command = None;
                self.set_gather_state(SEARCHING_FOR_SOURCE, body, world)
            }
            AiCommandKind::Idle | AiCommandKind::MoveTo | AiCommandKind::Hunt => {
                if !self.gather_machine.is_in(GATHER_DEFAULT) {
                    self.release_dock(body.id, world);
                    self.set_gather_state(GATHER_DEFAULT, body, world)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// One frame of AI plus, when `gather` is set, the gather loop.
    pub fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>, gather: bool) -> SimResult<()> {
        self.intercept_command(body, world)?;
        self.ai.update(body, world)?;
        if !gather {
            return Ok(());
        }
        let mut cx = StateContext { body: &mut *body, data: &mut self.gather, world: &mut *world };
        self.gather_machine.update(&mut cx)?;
        if let Some(destination) = self.gather.move_request.take() {
            self.ai.move_to(destination, body, world)?;
        }
        Ok(())
    }
}

impl Persistable for SupplyAiBase {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.ai)?;
        p.persist_object("GatherStateMachine", &mut self.gather_machine)?;
        p.persist_i32("NumBoxes", &mut self.gather.num_boxes)?;
        p.persist_frame("WaitUntil", &mut self.gather.wait_until)?;
        p.persist_object_id("SupplySource", &mut self.gather.supply_source)?;
        p.persist_object_id("SupplyTarget", &mut self.gather.supply_target)?;
        p.persist_vector3("Destination", &mut self.gather.destination)?;
        if self.gather.num_boxes < 0 {
            return Err(SimError::corrupt("NumBoxes", format!("{} boxes", self.gather.num_boxes)));
        }
        Ok(())
    }
}

// ── SupplyTruckAIUpdate ────────────────────────────────────────

#[derive(Debug)]
pub struct SupplyTruckAiUpdate {
    pub supply:         SupplyAiBase,
    pub preferred_dock: ObjectId,
    unknown:            i32,
}

impl SupplyTruckAiUpdate {
    pub fn new(data: &SupplyAiData, build: &BuildContext<'_>) -> Self {
        Self { supply: SupplyAiBase::new(data, build), preferred_dock: ObjectId::INVALID, unknown: 0 }
    }
}

impl Persistable for SupplyTruckAiUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.supply)?;
        p.persist_object_id("PreferredDock", &mut self.preferred_dock)?;
        p.persist_i32("Unknown", &mut self.unknown)
    }
}

impl ModuleBehavior for SupplyTruckAiUpdate {
    fn kind(&self) -> &'static str {
        "SupplyTruckAIUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Ai
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.supply.ai.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.supply.ai.update)
    }

    fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        self.supply.update(body, world, true)?;
        Ok(UpdateSleepTime::None)
    }

    fn on_destroy(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        self.supply.release_dock(body.id, world);
        Ok(())
    }

    fn accept_command(&mut self, command: AiCommand) -> bool {
        self.supply.ai.queue_command(command);
        true
    }
}

// ── WorkerAIUpdate ─────────────────────────────────────────────

pub const AS_DOZER:        StateId = StateId(0);
pub const AS_SUPPLY_TRUCK: StateId = StateId(1);

struct WorkerModeState {
    name: &'static str,
}

impl State<()> for WorkerModeState {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, _cx: &mut StateContext<'_, '_, ()>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Continue)
    }
}

/// A builder that doubles as a supply gatherer; its mode machine decides
/// which half runs.
#[derive(Debug)]
pub struct WorkerAiUpdate {
    pub supply:       SupplyAiBase,
    mode_machine:     StateMachine<()>,
    unknown_object:   ObjectId,
    unknown5:         i32,
    unknown6:         i32,
}

impl WorkerAiUpdate {
    pub fn new(data: &SupplyAiData, build: &BuildContext<'_>) -> Self {
        let mode_machine = StateMachine::new("WorkerStateMachine", build.game_data.max_state_transitions_per_tick)
            .with_state(AS_DOZER, WorkerModeState { name: "AsDozer" }, StateId::INVALID, StateId::INVALID)
            .with_state(
                AS_SUPPLY_TRUCK,
                WorkerModeState { name: "AsSupplyTruck" },
                StateId::INVALID,
                StateId::INVALID,
            );
        Self {
            supply: SupplyAiBase::new(data, build),
            mode_machine,
            unknown_object: ObjectId::INVALID,
            unknown5: 0,
            unknown6: 0,
        }
    }

    pub fn mode(&self) -> StateId {
        self.mode_machine.current()
    }
}

impl Persistable for WorkerAiUpdate {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_base(&mut self.supply)?;
        p.persist_object_id("UnknownObject", &mut self.unknown_object)?;
        p.persist_i32("Unknown5", &mut self.unknown5)?;
        p.persist_i32("Unknown6", &mut self.unknown6)?;
        // The mode machine trails the legacy fields.
        p.persist_object("WorkerStateMachine", &mut self.mode_machine)
    }
}

impl ModuleBehavior for WorkerAiUpdate {
    fn kind(&self) -> &'static str {
        "WorkerAIUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Ai
    }

    fn update_base(&self) -> Option<&UpdateModuleBase> {
        Some(&self.supply.ai.update)
    }

    fn update_base_mut(&mut self) -> Option<&mut UpdateModuleBase> {
        Some(&mut self.supply.ai.update)
    }

    fn update(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<UpdateSleepTime> {
        if let Some(command) = self.supply.ai.data.pending_command {
            let mode = match command.kind {
                AiCommandKind::Gather => Some(AS_SUPPLY_TRUCK),
                AiCommandKind::Idle | AiCommandKind::MoveTo | AiCommandKind::Hunt => Some(AS_DOZER),
                _ => None,
            };
            if let Some(mode) = mode {
                self.mode_machine.restore_state(mode)?;
            }
        }
        let gather = self.mode_machine.is_in(AS_SUPPLY_TRUCK);
        self.supply.update(body, world, gather)?;
        Ok(UpdateSleepTime::None)
    }

    fn on_destroy(&mut self, body: &mut ObjectBody, world: &mut World<'_>) -> SimResult<()> {
        self.supply.release_dock(body.id, world);
        Ok(())
    }

    fn accept_command(&mut self, command: AiCommand) -> bool {
        self.supply.ai.queue_command(command);
        true
    }
}
