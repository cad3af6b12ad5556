//! Behavior modules driven through the engine: combat, projectiles,
//! collisions, upgrades, regeneration and transport flight.

use rts_sim_core::{
    clock::LogicFrame,
    config::EngineConfig,
    engine::Game,
    event::LogicEvent,
    object::{
        module::BehaviorModule,
        modules::{
            ai::{AiCommand, AiCommandKind, AI_HUNT},
            chinook::{ChinookAiUpdate, ChinookFlightState},
            missile::{MISSILE_INACTIVE, MISSILE_MOVING},
        },
        ObjectStatus,
    },
    types::{ObjectId, PlayerIndex, Vector3},
};

fn new_game(seed: u64) -> Game {
    Game::build(EngineConfig::default_test().expect("built-in templates"), seed).expect("game")
}

fn two_sides(seed: u64) -> (Game, PlayerIndex, PlayerIndex) {
    let mut game = new_game(seed);
    game.start_campaign("Skirmish", "Maps/Alpine Assault");
    let usa = game.add_player("ThePlayer", "America");
    let gla = game.add_player("Enemy", "GLA");
    (game, usa, gla)
}

/// Ticks `n` frames and returns every event they produced.
fn collect_events(game: &mut Game, n: u32) -> Vec<LogicEvent> {
    game.logic.clock.resume();
    let mut events = Vec::new();
    for _ in 0..n {
        events.extend(game.tick().unwrap());
    }
    game.logic.clock.pause();
    events
}

fn health(game: &Game, id: ObjectId) -> f32 {
    game.object(id).map(|o| o.body.health).unwrap_or(0.0)
}

fn chinook(game: &Game, id: ObjectId) -> &ChinookAiUpdate {
    match game.object(id).and_then(|o| o.module("AI")) {
        Some(BehaviorModule::ChinookAiUpdate(m)) => m,
        other => panic!("{id} has no chinook AI: {other:?}"),
    }
}

#[test]
fn hunting_tank_engages_and_kills() {
    let (mut game, usa, gla) = two_sides(1);
    let tank = game.spawn_object("Crusader", usa, Vector3::new(300.0, 300.0, 0.0)).unwrap();
    let ranger = game.spawn_object("Ranger", gla, Vector3::new(300.0, 380.0, 0.0)).unwrap();
    game.issue_command(tank, AiCommand::hunt()).unwrap();

    let events = collect_events(&mut game, 1);
    let shot = events
        .iter()
        .find_map(|e| match e {
            LogicEvent::DamageDealt { attacker, victim, amount, .. } => Some((*attacker, *victim, *amount)),
            _ => None,
        })
        .expect("first shot on frame 1");
    assert_eq!((shot.0, shot.1), (tank, ranger));
    assert!((54.0..=66.0).contains(&shot.2), "damage {} outside the spread", shot.2);
    assert!(health(&game, ranger) < 50.0);

    // The second shot lands after the two second reload.
    let events = collect_events(&mut game, 60);
    assert!(events.contains(&LogicEvent::ObjectDestroyed { frame: 61, object: ranger }));
    assert!(game.object(ranger).is_none());

    let ai = game.object(tank).and_then(|o| o.module("AI")).and_then(|m| m.ai_base()).unwrap();
    assert!(ai.machine.is_in(AI_HUNT), "hunters keep scanning");
}

#[test]
fn allies_are_never_targeted() {
    let (mut game, usa, _) = two_sides(2);
    let tank = game.spawn_object("Crusader", usa, Vector3::new(300.0, 300.0, 0.0)).unwrap();
    let friend = game.spawn_object("Ranger", usa, Vector3::new(300.0, 380.0, 0.0)).unwrap();
    game.issue_command(tank, AiCommand::hunt()).unwrap();
    let events = collect_events(&mut game, 30);
    assert!(!events.iter().any(|e| matches!(e, LogicEvent::DamageDealt { .. })));
    assert_eq!(health(&game, friend), 100.0);
}

#[test]
fn missile_waits_for_ignition_then_detonates_on_arrival() {
    let (mut game, usa, gla) = two_sides(3);
    let missile = game.spawn_object("PatriotMissile", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    let victim = game.spawn_object("Ranger", gla, Vector3::new(165.0, 100.0, 0.0)).unwrap();

    let flight_state = |game: &Game| match game.object(missile).and_then(|o| o.module("AI")) {
        Some(BehaviorModule::MissileAiUpdate(m)) => m.flight_state(),
        other => panic!("no missile AI: {other:?}"),
    };
    assert!(!game.issue_command(missile, AiCommand::hunt()).unwrap(), "only a move order launches");
    assert_eq!(flight_state(&game), MISSILE_INACTIVE);

    assert!(game.issue_command(missile, AiCommand::move_to(Vector3::new(160.0, 100.0, 0.0))).unwrap());
    collect_events(&mut game, 3);
    assert_eq!(game.object(missile).unwrap().body.position, Vector3::new(100.0, 100.0, 0.0));

    // Ignition on frame 4, then 20 units a frame.
    let events = collect_events(&mut game, 1);
    assert!(events.is_empty());
    assert_eq!(flight_state(&game), MISSILE_MOVING);

    let events = collect_events(&mut game, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        LogicEvent::ProjectileDetonated { frame: 6, projectile, .. } if *projectile == missile
    )));
    assert!(game.object(missile).is_none(), "a detonated missile is removed");
    assert_eq!(health(&game, victim), 50.0);
}

#[test]
fn artillery_shell_arcs_to_its_target() {
    let (mut game, usa, gla) = two_sides(4);
    let shell = game.spawn_object("ArtilleryShell", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    let victim = game.spawn_object("Ranger", gla, Vector3::new(150.0, 100.0, 0.0)).unwrap();
    game.issue_command(shell, AiCommand::move_to(Vector3::new(148.0, 100.0, 0.0))).unwrap();

    collect_events(&mut game, 2);
    let body = &game.object(shell).unwrap().body;
    assert_eq!(body.position.x, 124.0);
    assert!(body.position.z > 20.0, "mid-arc height {}", body.position.z);

    let events = collect_events(&mut game, 2);
    assert!(events.iter().any(|e| matches!(e, LogicEvent::ProjectileDetonated { frame: 4, .. })));
    assert!(game.object(shell).is_none());
    assert_eq!(health(&game, victim), 60.0);
}

#[test]
fn vehicles_squish_infantry_on_contact() {
    let (mut game, usa, gla) = two_sides(5);
    let tank = game.spawn_object("Crusader", usa, Vector3::new(200.0, 200.0, 0.0)).unwrap();
    let ranger = game.spawn_object("Ranger", gla, Vector3::new(202.0, 200.0, 0.0)).unwrap();
    let worker = game.spawn_object("Worker", gla, Vector3::new(400.0, 400.0, 0.0)).unwrap();
    let buddy = game.spawn_object("Ranger", gla, Vector3::new(401.0, 400.0, 0.0)).unwrap();

    let events = collect_events(&mut game, 1);
    assert!(events.contains(&LogicEvent::ObjectDestroyed { frame: 1, object: ranger }));
    assert!(game.object(ranger).is_none());
    assert!(game.object(tank).is_some());
    assert!(game.object(worker).is_some() && game.object(buddy).is_some(), "infantry do not squish infantry");
}

#[test]
fn stealth_upgrade_fires_once_per_object() {
    let (mut game, usa, gla) = two_sides(6);
    let rangers: Vec<ObjectId> = (0..3)
        .map(|i| game.spawn_object("Ranger", gla, Vector3::new(100.0 + 20.0 * i as f32, 500.0, 0.0)).unwrap())
        .collect();
    let tank = game.spawn_object("Crusader", gla, Vector3::new(300.0, 300.0, 0.0)).unwrap();
    let enemy_ranger = game.spawn_object("Ranger", usa, Vector3::new(600.0, 600.0, 0.0)).unwrap();

    assert_eq!(game.grant_upgrade(gla, "Upgrade_Camouflage").unwrap(), 3);
    assert_eq!(game.grant_upgrade(gla, "Upgrade_Camouflage").unwrap(), 0, "already granted");
    for id in &rangers {
        assert!(game.object(*id).unwrap().body.status.get(ObjectStatus::Stealthed));
    }
    assert!(!game.object(tank).unwrap().body.status.get(ObjectStatus::Stealthed));
    assert!(!game.object(enemy_ranger).unwrap().body.status.get(ObjectStatus::Stealthed));

    let bytes = game.save().unwrap();
    let mut restored = new_game(6);
    restored.load(&bytes).unwrap();
    match restored.object(rangers[0]).and_then(|o| o.module("Stealth")) {
        Some(BehaviorModule::StealthUpgrade(m)) => assert!(m.is_executed()),
        other => panic!("no stealth upgrade: {other:?}"),
    }
    assert!(restored.players.get(gla).unwrap().has_upgrade("Upgrade_Camouflage"));
}

#[test]
fn unknown_player_cannot_be_upgraded() {
    let (mut game, _, _) = two_sides(7);
    assert!(game.grant_upgrade(9, "Upgrade_Camouflage").is_err());
}

#[test]
fn structures_regenerate_after_the_damage_delay() {
    let (mut game, usa, _) = two_sides(8);
    let center = game.spawn_object("SupplyCenter", usa, Vector3::new(160.0, 100.0, 0.0)).unwrap();
    game.object_mut(center).unwrap().apply_damage(500.0, LogicFrame::ZERO);
    assert_eq!(health(&game, center), 1500.0);

    // Three second delay, then 2% of max health every second.
    game.run_frames(89).unwrap();
    assert_eq!(health(&game, center), 1500.0);
    game.run_frames(1).unwrap();
    assert_eq!(health(&game, center), 1540.0);
    game.run_frames(30).unwrap();
    assert_eq!(health(&game, center), 1580.0);

    // Fresh damage pushes the next heal back.
    let frame = game.frame();
    game.object_mut(center).unwrap().apply_damage(80.0, frame);
    game.run_frames(60).unwrap();
    assert_eq!(health(&game, center), 1500.0);
}

#[test]
fn chinook_flies_out_and_holds_orders_while_landing() {
    let (mut game, usa, _) = two_sides(9);
    let heli = game.spawn_object("Chinook", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    game.issue_command(heli, AiCommand::at(AiCommandKind::Evacuate, Vector3::new(200.0, 100.0, 0.0))).unwrap();

    game.run_frames(3).unwrap();
    assert_eq!(chinook(&game, heli).flight_state(), ChinookFlightState::InAir);
    assert_eq!(game.object(heli).unwrap().body.position.z, 60.0);

    // 100 units at 15 a frame: arrives on frame 7 and starts landing.
    game.run_frames(7).unwrap();
    assert_eq!(chinook(&game, heli).flight_state(), ChinookFlightState::Landing);

    game.issue_command(heli, AiCommand::move_to(Vector3::new(200.0, 200.0, 0.0))).unwrap();
    game.run_frames(1).unwrap();
    assert!(chinook(&game, heli).queued_command().is_some(), "orders wait for the landing");

    // The landing takes one second.
    game.run_frames(27).unwrap();
    let body = &game.object(heli).unwrap().body;
    assert_eq!(body.position.z, 0.0);
    assert!(!body.status.get(ObjectStatus::Airborne));

    game.run_frames(2).unwrap();
    assert!(chinook(&game, heli).queued_command().is_none());
    assert!(game.object(heli).unwrap().body.position.y > 100.0, "released order is carried out");
}

#[test]
fn every_module_kind_survives_a_save() {
    let (mut game, usa, gla) = two_sides(10);
    for (i, template) in [
        "SupplyDock",
        "SupplyPile",
        "SupplyCenter",
        "SupplyTruck",
        "Worker",
        "Chinook",
        "Ranger",
        "Crusader",
        "CrusaderVeteran",
        "PatriotMissile",
        "ArtilleryShell",
        "SpectreGunship",
        "RadarBeacon",
    ]
    .into_iter()
    .enumerate()
    {
        let owner = if i % 2 == 0 { usa } else { gla };
        game.spawn_object(template, owner, Vector3::new(40.0 * i as f32 + 30.0, 500.0, 0.0)).unwrap();
    }
    game.run_frames(10).unwrap();

    let bytes = game.save().unwrap();
    let mut restored = new_game(10);
    restored.load(&bytes).unwrap();
    assert_eq!(restored.objects().len(), game.objects().len());
    assert_eq!(restored.save().unwrap(), bytes);

    // Client-side modules never reach the stream.
    let beacon = restored.objects().iter().find(|o| o.template_name() == "RadarBeacon").unwrap();
    assert!(beacon.module("Beacon").is_some_and(|m| !m.is_persisted()));
}
