//! sim-runner: headless runner for the RTS simulation core.
//!
//! Usage:
//!   sim-runner --seed 12345 --frames 900 --db run.db
//!   sim-runner --seed 12345 --frames 300 --save out.sav
//!   sim-runner --load out.sav --frames 300 --dump state.json

use anyhow::{Context, Result};
use rts_sim_core::{
    config::EngineConfig,
    engine::Game,
    object::modules::ai::AiCommand,
    save_file,
    store::SaveStore,
    types::Vector3,
};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary {
    run_id:   String,
    seed:     u64,
    frame:    u32,
    objects:  usize,
    players:  Vec<PlayerSummary>,
    saved_at: String,
}

#[derive(serde::Serialize)]
struct PlayerSummary {
    name:  String,
    side:  String,
    money: u32,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let frames = parse_arg(&args, "--frames", 900u32);
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let db = flag_value(&args, "--db");
    let save_path = flag_value(&args, "--save");
    let load_path = flag_value(&args, "--load");
    let dump_path = flag_value(&args, "--dump");

    println!("RTS sim-runner");
    println!("  seed:      {seed}");
    println!("  frames:    {frames}");
    println!("  data_dir:  {data_dir}");
    println!("  db:        {}", db.unwrap_or("(none)"));
    println!();

    let config = match EngineConfig::load(data_dir) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{e}; falling back to built-in templates");
            EngineConfig::default_test()?
        }
    };

    let mut game = Game::build(config, seed)?;
    if let Some(db) = db {
        game = game.with_store(SaveStore::open(db)?)?;
    }

    match load_path {
        Some(path) => {
            save_file::load_from_path(&mut game, path).with_context(|| format!("Cannot load {path}"))?;
        }
        None => setup_skirmish(&mut game)?,
    }

    game.run_frames(frames)?;

    if let Some(path) = save_path {
        save_file::save_to_path(&mut game, path)?;
    }
    if let Some(path) = dump_path {
        let tree = save_file::dump_json(&mut game)?;
        std::fs::write(path, serde_json::to_string_pretty(&tree)?)?;
        println!("Wrote state dump to {path}");
    }
    if db.is_some() {
        let slot = game.save_to_store("final")?;
        println!("Stored final save in slot {slot}");
    }

    print_summary(&game)
}

/// Two players, a supply economy and a skirmish in the middle of the map.
fn setup_skirmish(game: &mut Game) -> Result<()> {
    game.start_campaign("Skirmish", "Maps/Tournament Desert");
    let usa = game.add_player("ThePlayer", "America");
    let gla = game.add_player("Enemy", "GLA");

    game.spawn_object("SupplyDock", usa, Vector3::new(100.0, 100.0, 0.0))?;
    game.spawn_object("SupplyCenter", usa, Vector3::new(200.0, 120.0, 0.0))?;
    let truck = game.spawn_object("SupplyTruck", usa, Vector3::new(180.0, 110.0, 0.0))?;
    game.issue_command(truck, AiCommand::gather())?;

    for i in 0..3 {
        let x = 300.0 + 10.0 * i as f32;
        let tank = game.spawn_object("Crusader", usa, Vector3::new(x, 300.0, 0.0))?;
        game.issue_command(tank, AiCommand::hunt())?;
        let ranger = game.spawn_object("Ranger", gla, Vector3::new(x, 400.0, 0.0))?;
        game.issue_command(ranger, AiCommand::hunt())?;
    }
    Ok(())
}

fn print_summary(game: &Game) -> Result<()> {
    let summary = RunSummary {
        run_id:   game.run_id.clone(),
        seed:     game.seed(),
        frame:    game.frame().value(),
        objects:  game.objects().len(),
        players:  game
            .players
            .iter()
            .map(|p| PlayerSummary { name: p.name.clone(), side: p.side.clone(), money: p.bank.balance() })
            .collect(),
        saved_at: chrono::Utc::now().to_rfc3339(),
    };

    println!("=== RUN SUMMARY ===");
    println!("  run_id:   {}", summary.run_id);
    println!("  frame:    {}", summary.frame);
    println!("  objects:  {}", summary.objects);
    for player in &summary.players {
        println!("  {:<10} {:<8} ${}", player.name, player.side, player.money);
    }
    if let Some(store) = game.store() {
        let deposits = store.event_count(&game.run_id, "supplies_deposited")?;
        let destroyed = store.event_count(&game.run_id, "object_destroyed")?;
        println!("  deposits: {deposits}");
        println!("  losses:   {destroyed}");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
