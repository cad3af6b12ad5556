//! Supply gathering end to end: a truck loops between a warehouse and a
//! supply center, and a save taken mid-loop resumes exactly.

use rts_sim_core::{
    config::{EngineConfig, GameData},
    engine::Game,
    event::LogicEvent,
    object::{
        module::BehaviorModule,
        modules::{
            ai::AiCommand,
            supply::{
                SupplyAiBase, WorkerAiUpdate, AS_DOZER, AS_SUPPLY_TRUCK, DUMPING_SUPPLIES, GATHERING_SUPPLIES,
                GATHER_DEFAULT, SUPPLY_LINES_UPGRADE,
            },
        },
        template::parse_templates,
    },
    persist::{StatePersister, StateReader, StateWriter},
    types::{ObjectId, PlayerIndex, Vector3},
};

struct Economy {
    game:   Game,
    usa:    PlayerIndex,
    dock:   ObjectId,
    center: ObjectId,
    truck:  ObjectId,
}

fn new_game(seed: u64) -> Game {
    Game::build(EngineConfig::default_test().expect("built-in templates"), seed).expect("game")
}

/// Warehouse 30 units west of the truck, center 30 units east.
fn economy(seed: u64) -> Economy {
    let mut game = new_game(seed);
    game.start_campaign("Skirmish", "Maps/Alpine Assault");
    let usa = game.add_player("ThePlayer", "America");
    let dock = game.spawn_object("SupplyDock", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    let center = game.spawn_object("SupplyCenter", usa, Vector3::new(160.0, 100.0, 0.0)).unwrap();
    let truck = game.spawn_object("SupplyTruck", usa, Vector3::new(130.0, 100.0, 0.0)).unwrap();
    Economy { game, usa, dock, center, truck }
}

fn supply(game: &Game, truck: ObjectId) -> &SupplyAiBase {
    match game.object(truck).and_then(|o| o.module("AI")) {
        Some(BehaviorModule::SupplyTruckAiUpdate(m)) => &m.supply,
        other => panic!("{truck} has no supply truck AI: {other:?}"),
    }
}

fn worker(game: &Game, id: ObjectId) -> &WorkerAiUpdate {
    match game.object(id).and_then(|o| o.module("AI")) {
        Some(BehaviorModule::WorkerAiUpdate(m)) => m,
        other => panic!("{id} has no worker AI: {other:?}"),
    }
}

fn active_docker(game: &Game, center: ObjectId) -> ObjectId {
    match game.object(center).and_then(|o| o.module("Dock")) {
        Some(BehaviorModule::SupplyCenterDockUpdate(m)) => m.dock.active_docker,
        other => panic!("{center} has no supply center dock: {other:?}"),
    }
}

/// Warehouse, center and a truck with tunable capacity and dump time.
const SLOW_DUMP_TEMPLATES: &str = r#"{
  "templates": [
    {
      "name": "SupplyDock",
      "max_health": 1000,
      "kind_of": ["STRUCTURE", "SUPPLY_SOURCE"],
      "modules": [
        { "tag": "Dock", "kind": "SupplyWarehouseDockUpdate", "starting_boxes": 40 },
        { "tag": "Register", "kind": "SupplyWarehouseCreate" }
      ]
    },
    {
      "name": "SupplyCenter",
      "max_health": 2000,
      "kind_of": ["STRUCTURE", "CASH_GENERATOR"],
      "modules": [
        { "tag": "Dock", "kind": "SupplyCenterDockUpdate" },
        { "tag": "Register", "kind": "SupplyCenterCreate" }
      ]
    },
    {
      "name": "SupplyTruck",
      "max_health": 300,
      "kind_of": ["VEHICLE", "HARVESTER"],
      "modules": [
        {
          "tag": "AI",
          "kind": "SupplyTruckAIUpdate",
          "speed": 10.0,
          "max_boxes": MAX_BOXES,
          "supply_warehouse_action_delay_ms": 100,
          "supply_center_action_delay_ms": CENTER_DELAY,
          "supply_warehouse_scan_distance": 500.0
        },
        { "tag": "Death", "kind": "DestroyDie" }
      ]
    }
  ]
}"#;

fn slow_dump_game(seed: u64, max_boxes: u32, center_delay_ms: u32) -> Game {
    let game_data = GameData::default();
    let json = SLOW_DUMP_TEMPLATES
        .replace("MAX_BOXES", &max_boxes.to_string())
        .replace("CENTER_DELAY", &center_delay_ms.to_string());
    let templates = parse_templates(&json, game_data.frame_rate()).expect("test templates");
    Game::build(EngineConfig { game_data, templates }, seed).expect("game")
}

/// Same layout as `economy`, on the slow-dump templates.
fn slow_economy(seed: u64, max_boxes: u32, center_delay_ms: u32) -> Economy {
    let mut game = slow_dump_game(seed, max_boxes, center_delay_ms);
    game.start_campaign("Skirmish", "Maps/Alpine Assault");
    let usa = game.add_player("ThePlayer", "America");
    let dock = game.spawn_object("SupplyDock", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    let center = game.spawn_object("SupplyCenter", usa, Vector3::new(160.0, 100.0, 0.0)).unwrap();
    let truck = game.spawn_object("SupplyTruck", usa, Vector3::new(130.0, 100.0, 0.0)).unwrap();
    Economy { game, usa, dock, center, truck }
}

/// Ticks one frame at a time until `done` holds, up to `limit` frames.
fn run_until(game: &mut Game, limit: u32, mut done: impl FnMut(&Game) -> bool) -> bool {
    for _ in 0..limit {
        game.run_frames(1).unwrap();
        if done(game) {
            return true;
        }
    }
    false
}

fn warehouse_boxes(game: &Game, dock: ObjectId) -> i32 {
    game.object(dock).and_then(|o| o.supply_warehouse()).map(|w| w.boxes()).unwrap_or(-1)
}

/// Ticks until a deposit happens or `limit` frames pass.
fn run_until_deposit(game: &mut Game, limit: u32) -> Option<LogicEvent> {
    game.logic.clock.resume();
    for _ in 0..limit {
        let events = game.tick().unwrap();
        if let Some(deposit) = events.into_iter().find(|e| matches!(e, LogicEvent::SuppliesDeposited { .. })) {
            game.logic.clock.pause();
            return Some(deposit);
        }
    }
    game.logic.clock.pause();
    None
}

#[test]
fn idle_truck_does_not_gather() {
    let mut eco = economy(1);
    eco.game.run_frames(60).unwrap();
    assert_eq!(supply(&eco.game, eco.truck).gather_state(), GATHER_DEFAULT);
    assert_eq!(warehouse_boxes(&eco.game, eco.dock), 20);
}

#[test]
fn truck_fills_up_and_deposits_at_the_center() {
    let mut eco = economy(2);
    assert!(eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap());
    let before = eco.game.players.get(eco.usa).unwrap().bank.balance();

    let deposit = run_until_deposit(&mut eco.game, 120).expect("a deposit within four seconds");
    let LogicEvent::SuppliesDeposited { truck, center, player, boxes, amount, .. } = deposit else {
        unreachable!()
    };
    assert_eq!((truck, center, player), (eco.truck, eco.center, eco.usa));
    assert_eq!(boxes, 3, "the truck carries max_boxes");
    assert_eq!(amount, 300);
    assert_eq!(eco.game.players.get(eco.usa).unwrap().bank.balance(), before + 300);
    assert_eq!(warehouse_boxes(&eco.game, eco.dock), 17);

    let truck = eco.game.object(eco.truck).unwrap();
    assert_eq!(truck.body.supply_boxes, 0);
    assert_eq!(supply(&eco.game, eco.truck).gather.num_boxes, 0);
}

#[test]
fn truck_keeps_looping() {
    let mut eco = economy(3);
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    assert!(run_until_deposit(&mut eco.game, 120).is_some());
    assert!(run_until_deposit(&mut eco.game, 120).is_some());
    assert_eq!(eco.game.players.get(eco.usa).unwrap().bank.balance(), 600);
    assert_eq!(warehouse_boxes(&eco.game, eco.dock), 14);
}

#[test]
fn supply_lines_upgrade_raises_the_box_value() {
    let mut eco = economy(4);
    eco.game.grant_upgrade(eco.usa, SUPPLY_LINES_UPGRADE).unwrap();
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    let deposit = run_until_deposit(&mut eco.game, 120).expect("deposit");
    assert!(matches!(deposit, LogicEvent::SuppliesDeposited { amount: 360, .. }));
}

#[test]
fn move_order_stops_the_gather_loop() {
    let mut eco = economy(5);
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    eco.game.run_frames(5).unwrap();
    assert_ne!(supply(&eco.game, eco.truck).gather_state(), GATHER_DEFAULT);

    eco.game.issue_command(eco.truck, AiCommand::move_to(Vector3::new(130.0, 200.0, 0.0))).unwrap();
    eco.game.run_frames(1).unwrap();
    assert_eq!(supply(&eco.game, eco.truck).gather_state(), GATHER_DEFAULT);
}

#[test]
fn empty_warehouse_is_skipped() {
    let mut game = new_game(6);
    let usa = game.add_player("ThePlayer", "America");
    let pile = game.spawn_object("SupplyPile", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    game.spawn_object("SupplyCenter", usa, Vector3::new(160.0, 100.0, 0.0)).unwrap();
    let truck = game.spawn_object("SupplyTruck", usa, Vector3::new(130.0, 100.0, 0.0)).unwrap();
    game.issue_command(truck, AiCommand::gather()).unwrap();

    // Five boxes: one full load and two more, then the pile is gone.
    game.run_frames(200).unwrap();
    assert!(game.object(pile).is_none(), "empty pile is removed");
    assert_eq!(game.players.get(usa).unwrap().bank.balance(), 500);
    assert_eq!(supply(&game, truck).gather.num_boxes, 0);
}

#[test]
fn worker_gathers_like_a_truck() {
    let mut game = new_game(7);
    let usa = game.add_player("ThePlayer", "America");
    game.spawn_object("SupplyDock", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    game.spawn_object("SupplyCenter", usa, Vector3::new(120.0, 100.0, 0.0)).unwrap();
    let worker = game.spawn_object("Worker", usa, Vector3::new(110.0, 100.0, 0.0)).unwrap();
    game.issue_command(worker, AiCommand::gather()).unwrap();

    let deposit = run_until_deposit(&mut game, 200).expect("worker deposit");
    assert!(matches!(deposit, LogicEvent::SuppliesDeposited { boxes: 2, amount: 200, .. }));
}

#[test]
fn save_between_two_boxes_resumes_exactly() {
    let mut eco = economy(8);
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    // Arrives on frame 4, first box lands on frame 7, second is pending.
    eco.game.run_frames(8).unwrap();
    let gather = &supply(&eco.game, eco.truck).gather;
    assert_eq!(gather.num_boxes, 1);
    assert!(gather.wait_until > eco.game.frame());
    assert_eq!(supply(&eco.game, eco.truck).gather_state(), GATHERING_SUPPLIES);

    let bytes = eco.game.save().unwrap();
    let mut restored = new_game(8);
    restored.load(&bytes).unwrap();

    let before = supply(&eco.game, eco.truck);
    let after = supply(&restored, eco.truck);
    assert_eq!(after.gather_state(), before.gather_state());
    assert_eq!(after.gather.num_boxes, before.gather.num_boxes);
    assert_eq!(after.gather.wait_until, before.gather.wait_until);
    assert_eq!(after.gather.supply_source, eco.dock);
    assert_eq!(warehouse_boxes(&restored, eco.dock), warehouse_boxes(&eco.game, eco.dock));

    eco.game.run_frames(40).unwrap();
    restored.run_frames(40).unwrap();
    assert_eq!(
        restored.players.get(eco.usa).unwrap().bank.balance(),
        eco.game.players.get(eco.usa).unwrap().bank.balance()
    );
    assert_eq!(restored.save().unwrap(), eco.game.save().unwrap());
}

#[test]
fn save_mid_wait_on_a_later_box_resumes_exactly() {
    let mut eco = slow_economy(9, 4, 100);
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    // Third box lands on frame 13; the fourth is pending until frame 16.
    assert!(run_until(&mut eco.game, 60, |g| supply(g, eco.truck).gather.num_boxes == 3));
    let gather = &supply(&eco.game, eco.truck).gather;
    assert_eq!(supply(&eco.game, eco.truck).gather_state(), GATHERING_SUPPLIES);
    assert!(gather.wait_until > eco.game.frame(), "the fourth box is still pending");
    assert_eq!(gather.supply_source, eco.dock);

    let bytes = eco.game.save().unwrap();
    let mut restored = slow_dump_game(9, 4, 100);
    restored.load(&bytes).unwrap();

    let before = supply(&eco.game, eco.truck);
    let after = supply(&restored, eco.truck);
    assert_eq!(after.gather_state(), GATHERING_SUPPLIES);
    assert_eq!(after.gather.num_boxes, 3);
    assert_eq!(after.gather.wait_until, before.gather.wait_until);
    assert_eq!(after.gather.supply_source, eco.dock);
    assert_eq!(after.gather.supply_target, before.gather.supply_target);
    assert_eq!(restored.object(eco.truck).unwrap().body.supply_boxes, 3);

    let expected = run_until_deposit(&mut eco.game, 200).expect("uninterrupted deposit");
    let resumed = run_until_deposit(&mut restored, 200).expect("resumed deposit");
    assert!(matches!(expected, LogicEvent::SuppliesDeposited { boxes: 4, .. }));
    assert_eq!(resumed, expected);
    assert_eq!(
        restored.players.get(eco.usa).unwrap().bank.balance(),
        eco.game.players.get(eco.usa).unwrap().bank.balance()
    );
    assert_eq!(restored.save().unwrap(), eco.game.save().unwrap());
}

#[test]
fn move_order_while_dumping_frees_the_center() {
    let mut eco = slow_economy(10, 3, 1000);
    let second = eco.game.spawn_object("SupplyTruck", eco.usa, Vector3::new(130.0, 110.0, 0.0)).unwrap();
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    assert!(run_until(&mut eco.game, 100, |g| supply(g, eco.truck).gather_state() == DUMPING_SUPPLIES));
    assert_eq!(active_docker(&eco.game, eco.center), eco.truck);
    assert_eq!(eco.game.object(eco.truck).unwrap().docked_at(), Some(eco.center));

    eco.game.issue_command(eco.truck, AiCommand::move_to(Vector3::new(130.0, 200.0, 0.0))).unwrap();
    eco.game.issue_command(second, AiCommand::gather()).unwrap();
    eco.game.run_frames(1).unwrap();
    assert_eq!(supply(&eco.game, eco.truck).gather_state(), GATHER_DEFAULT);
    assert_ne!(active_docker(&eco.game, eco.center), eco.truck);

    // Three boxes at one second each, plus the trip.
    let deposit = run_until_deposit(&mut eco.game, 600).expect("the second truck gets the dock");
    assert!(matches!(deposit, LogicEvent::SuppliesDeposited { truck, boxes: 3, .. } if truck == second));
}

#[test]
fn truck_destroyed_while_dumping_frees_the_center() {
    let mut eco = slow_economy(11, 3, 1000);
    let second = eco.game.spawn_object("SupplyTruck", eco.usa, Vector3::new(130.0, 110.0, 0.0)).unwrap();
    eco.game.issue_command(eco.truck, AiCommand::gather()).unwrap();
    assert!(run_until(&mut eco.game, 100, |g| supply(g, eco.truck).gather_state() == DUMPING_SUPPLIES));

    eco.game.object_mut(eco.truck).unwrap().body.kill();
    eco.game.issue_command(second, AiCommand::gather()).unwrap();
    eco.game.run_frames(1).unwrap();
    assert!(eco.game.object(eco.truck).is_none());
    assert!(!active_docker(&eco.game, eco.center).is_valid());

    let deposit = run_until_deposit(&mut eco.game, 600).expect("the second truck gets the dock");
    assert!(matches!(deposit, LogicEvent::SuppliesDeposited { truck, .. } if truck == second));
}

#[test]
fn worker_mode_trails_the_legacy_fields() {
    let mut game = new_game(12);
    let usa = game.add_player("ThePlayer", "America");
    let busy = game.spawn_object("Worker", usa, Vector3::new(110.0, 100.0, 0.0)).unwrap();
    let fresh = game.spawn_object("Worker", usa, Vector3::new(140.0, 100.0, 0.0)).unwrap();
    game.issue_command(busy, AiCommand::gather()).unwrap();
    game.run_frames(1).unwrap();
    assert_eq!(worker(&game, busy).mode(), AS_SUPPLY_TRUCK);
    assert_eq!(worker(&game, fresh).mode(), AS_DOZER);

    let mut writer = StateWriter::new();
    {
        let module = game.object_mut(busy).and_then(|o| o.module_mut("AI")).unwrap();
        let p: &mut dyn StatePersister = &mut writer;
        p.persist_object("AI", module).unwrap();
    }
    let bytes = writer.finish().unwrap();
    let n = bytes.len();
    // Machine version then AS_SUPPLY_TRUCK, after the zeroed object id and two unknowns.
    assert_eq!(&bytes[n - 5..], &[1, 1, 0, 0, 0]);
    assert_eq!(&bytes[n - 17..n - 5], &[0u8; 12]);

    {
        let module = game.object_mut(fresh).and_then(|o| o.module_mut("AI")).unwrap();
        let mut reader = StateReader::new(&bytes);
        let p: &mut dyn StatePersister = &mut reader;
        p.persist_object("AI", module).unwrap();
    }
    assert_eq!(worker(&game, fresh).mode(), AS_SUPPLY_TRUCK);
    assert_eq!(worker(&game, fresh).supply.gather_state(), worker(&game, busy).supply.gather_state());
}
