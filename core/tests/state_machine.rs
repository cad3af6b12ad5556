use rts_sim_core::{
    clock::LogicFrame,
    config::GameData,
    error::{SimError, SimResult},
    logic::{ObjectTable, PartitionManager, PlayerManager, TerrainLogic, World},
    object::ObjectBody,
    persist::{StatePersister, StateReader, StateWriter},
    rng::SimRng,
    state_machine::{State, StateContext, StateId, StateMachine, StateOutcome},
};

const IDLE: StateId = StateId(0);
const COUNTING: StateId = StateId(1);
const FINISHED: StateId = StateId(2);
const PING: StateId = StateId(10);
const PONG: StateId = StateId(11);

#[derive(Default)]
struct Trace {
    log: Vec<String>,
}

struct Idle;

impl State<Trace> for Idle {
    fn name(&self) -> &'static str {
        "Idle"
    }

    fn update(&mut self, _cx: &mut StateContext<'_, '_, Trace>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Continue)
    }
}

/// Counts frames and finishes after `target` of them.
struct Counting {
    count:  u32,
    target: u32,
}

impl State<Trace> for Counting {
    fn name(&self) -> &'static str {
        "Counting"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, Trace>) -> SimResult<()> {
        self.count = 0;
        cx.data.log.push("enter counting".to_string());
        Ok(())
    }

    fn update(&mut self, _cx: &mut StateContext<'_, '_, Trace>) -> SimResult<StateOutcome> {
        self.count += 1;
        if self.count >= self.target {
            Ok(StateOutcome::Done)
        } else {
            Ok(StateOutcome::Continue)
        }
    }

    fn on_exit(&mut self, cx: &mut StateContext<'_, '_, Trace>) -> SimResult<()> {
        cx.data.log.push(format!("exit counting at {}", self.count));
        Ok(())
    }

    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("Count", &mut self.count)
    }
}

struct Finished;

impl State<Trace> for Finished {
    fn name(&self) -> &'static str {
        "Finished"
    }

    fn on_enter(&mut self, cx: &mut StateContext<'_, '_, Trace>) -> SimResult<()> {
        cx.data.log.push("enter finished".to_string());
        Ok(())
    }

    fn update(&mut self, _cx: &mut StateContext<'_, '_, Trace>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Done)
    }
}

/// Always done; used to build a two-state cycle.
struct Bounce;

impl State<Trace> for Bounce {
    fn name(&self) -> &'static str {
        "Bounce"
    }

    fn update(&mut self, _cx: &mut StateContext<'_, '_, Trace>) -> SimResult<StateOutcome> {
        Ok(StateOutcome::Done)
    }
}

fn machine() -> StateMachine<Trace> {
    StateMachine::new("TestMachine", 8)
        .with_state(IDLE, Idle, StateId::INVALID, StateId::INVALID)
        .with_state(COUNTING, Counting { count: 0, target: 3 }, FINISHED, IDLE)
        .with_state(FINISHED, Finished, StateId::INVALID, StateId::INVALID)
}

struct Fixture {
    game_data: GameData,
    objects:   ObjectTable,
    players:   PlayerManager,
    terrain:   TerrainLogic,
    partition: PartitionManager,
    events:    Vec<rts_sim_core::event::LogicEvent>,
    rng:       SimRng,
    body:      ObjectBody,
}

impl Fixture {
    fn new() -> Self {
        Self {
            game_data: GameData::default(),
            objects:   ObjectTable::new(),
            players:   PlayerManager::new(),
            terrain:   TerrainLogic::flat(8, 8),
            partition: PartitionManager::new(40.0, 8, 8).unwrap(),
            events:    Vec::new(),
            rng:       SimRng::new(1),
            body:      ObjectBody::default(),
        }
    }

    fn run<R>(&mut self, frame: u32, f: impl FnOnce(&mut StateContext<'_, '_, Trace>) -> R, data: &mut Trace) -> R {
        let mut world = World {
            frame:     LogicFrame(frame),
            game_data: &self.game_data,
            objects:   &mut self.objects,
            players:   &mut self.players,
            terrain:   &self.terrain,
            partition: &self.partition,
            events:    &mut self.events,
            rng:       &mut self.rng,
        };
        let mut cx = StateContext { body: &mut self.body, data, world: &mut world };
        f(&mut cx)
    }
}

#[test]
fn first_registered_state_is_initial() {
    let m = machine();
    assert_eq!(m.current(), IDLE);
    assert_eq!(m.initial(), IDLE);
    assert_eq!(m.current_state_name(), "Idle");
}

#[test]
fn set_state_runs_exit_then_enter() {
    let mut fx = Fixture::new();
    let mut trace = Trace::default();
    let mut m = machine();

    fx.run(1, |cx| m.set_state(COUNTING, cx), &mut trace).unwrap();
    fx.run(2, |cx| m.set_state(IDLE, cx), &mut trace).unwrap();
    assert_eq!(trace.log, vec!["enter counting", "exit counting at 0"]);
    assert!(m.is_in(IDLE));
}

#[test]
fn done_follows_the_transition_table_in_the_same_frame() {
    let mut fx = Fixture::new();
    let mut trace = Trace::default();
    let mut m = machine();
    fx.run(1, |cx| m.set_state(COUNTING, cx), &mut trace).unwrap();

    for frame in 2..4 {
        let outcome = fx.run(frame, |cx| m.update(cx), &mut trace).unwrap();
        assert_eq!(outcome, StateOutcome::Continue);
        assert!(m.is_in(COUNTING));
    }
    // Third update: Counting is done, Finished is entered and updated in
    // the same frame; its done target is the wildcard so the chain stops.
    let outcome = fx.run(4, |cx| m.update(cx), &mut trace).unwrap();
    assert_eq!(outcome, StateOutcome::Done);
    assert!(m.is_in(FINISHED));
    assert_eq!(trace.log, vec!["enter counting", "exit counting at 3", "enter finished"]);
}

#[test]
fn unknown_state_ids_are_fatal() {
    let mut fx = Fixture::new();
    let mut trace = Trace::default();
    let mut m = machine();
    let result = fx.run(1, |cx| m.set_state(StateId(77), cx), &mut trace);
    assert!(matches!(result, Err(SimError::UnknownStateId { id: 77, .. })));
    assert!(matches!(m.restore_state(StateId::INVALID), Err(SimError::UnknownStateId { .. })));
    assert!(m.is_in(IDLE));
}

#[test]
fn transition_cycles_are_bounded() {
    let mut fx = Fixture::new();
    let mut trace = Trace::default();
    let mut m = StateMachine::new("Loop", 4)
        .with_state(PING, Bounce, PONG, PONG)
        .with_state(PONG, Bounce, PING, PING);
    let result = fx.run(1, |cx| m.update(cx), &mut trace);
    assert!(matches!(result, Err(SimError::TransitionLoop { limit: 4, .. })));
}

#[test]
fn starting_in_skips_enter_callbacks() {
    let m = machine().starting_in(FINISHED);
    assert!(m.is_in(FINISHED));
    assert_eq!(m.initial(), FINISHED);
}

#[test]
fn persists_current_id_and_active_state_fields() {
    let mut fx = Fixture::new();
    let mut trace = Trace::default();
    let mut m = machine();
    fx.run(1, |cx| m.set_state(COUNTING, cx), &mut trace).unwrap();
    fx.run(2, |cx| m.update(cx), &mut trace).unwrap();
    fx.run(3, |cx| m.update(cx), &mut trace).unwrap();

    let mut writer = StateWriter::new();
    let p: &mut dyn StatePersister = &mut writer;
    p.persist_object("Machine", &mut m).unwrap();
    let bytes = writer.finish().unwrap();

    let mut restored = machine();
    let mut reader = StateReader::new(&bytes);
    let p: &mut dyn StatePersister = &mut reader;
    p.persist_object("Machine", &mut restored).unwrap();
    assert!(restored.is_in(COUNTING));
    assert_eq!(restored.state::<Counting>(COUNTING).map(|s| s.count), Some(2));

    // One more frame finishes the count exactly as the original would.
    let mut restored_trace = Trace::default();
    fx.run(4, |cx| restored.update(cx), &mut restored_trace).unwrap();
    assert!(restored.is_in(FINISHED));
}

#[test]
fn loading_an_unregistered_id_fails() {
    let mut writer = StateWriter::new();
    writer.persist_u8("Version", &mut 1).unwrap();
    writer.persist_u32("CurrentStateId", &mut 5).unwrap();
    let bytes = writer.finish().unwrap();

    let mut m = machine();
    let mut reader = StateReader::new(&bytes);
    let p: &mut dyn StatePersister = &mut reader;
    let result = p.persist_object("Machine", &mut m);
    assert!(matches!(result, Err(SimError::UnknownStateId { id: 5, .. })));
}

#[test]
fn state_mut_downcasts_to_the_concrete_state() {
    let mut m = machine();
    if let Some(counting) = m.state_mut::<Counting>(COUNTING) {
        counting.target = 10;
    }
    assert_eq!(m.state::<Counting>(COUNTING).map(|s| s.target), Some(10));
    assert!(m.state::<Idle>(COUNTING).is_none());
}
