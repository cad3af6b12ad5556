//! The chunked save stream: write order, scan-before-apply, and the
//! end-of-file sentinel.

use rts_sim_core::{
    clock::LogicFrame,
    config::EngineConfig,
    engine::Game,
    error::SimError,
    persist::{StatePersister, StateWriter},
    save_file::{self, CHUNK_GAME_LOGIC, CHUNK_GAME_STATE, CHUNK_PLAYERS, END_OF_FILE},
    types::Vector3,
};

/// Bytes of the trailing SG_EOF name: one length byte plus the text.
const EOF_BYTES: usize = 1 + 6;

fn new_game(seed: u64) -> Game {
    Game::build(EngineConfig::default_test().expect("built-in templates"), seed).expect("game")
}

fn skirmish(seed: u64) -> Game {
    let mut game = new_game(seed);
    game.start_campaign("Skirmish", "Maps/Alpine Assault");
    let usa = game.add_player("ThePlayer", "America");
    let gla = game.add_player("Enemy", "GLA");
    game.spawn_object("SupplyDock", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    game.spawn_object("SupplyCenter", usa, Vector3::new(160.0, 100.0, 0.0)).unwrap();
    game.spawn_object("Crusader", usa, Vector3::new(300.0, 300.0, 0.0)).unwrap();
    game.spawn_object("Ranger", gla, Vector3::new(320.0, 310.0, 0.0)).unwrap();
    game
}

#[test]
fn stream_has_every_chunk_in_table_order_then_eof() {
    let mut game = skirmish(1);
    let bytes = game.save().unwrap();
    let names = save_file::scan_chunks(&bytes).unwrap();
    let expected: Vec<&str> = save_file::chunk_names().collect();
    assert_eq!(expected.len(), 17);
    assert_eq!(names, expected);
    assert_eq!(names[0], CHUNK_GAME_STATE);
    assert_eq!(&bytes[bytes.len() - 6..], END_OF_FILE.as_bytes());
}

#[test]
fn frame_and_money_survive_a_partial_save() {
    let mut game = new_game(7);
    let player = game.add_player("ThePlayer", "America");
    game.players.get_mut(player).unwrap().bank.deposit(5000);
    game.logic.clock.set_frame(LogicFrame(1200));

    let bytes = save_file::save_chunks(&mut game, &[CHUNK_GAME_STATE, CHUNK_PLAYERS]).unwrap();
    assert_eq!(save_file::scan_chunks(&bytes).unwrap(), vec![CHUNK_GAME_STATE, CHUNK_PLAYERS]);

    let mut restored = new_game(7);
    restored.load(&bytes).unwrap();
    assert_eq!(restored.frame(), LogicFrame(1200));
    assert_eq!(restored.game_state.frame, LogicFrame(1200));
    assert_eq!(restored.players.len(), 1);
    assert_eq!(restored.players.get(player).unwrap().bank.balance(), 5000);
    assert!(restored.is_in_game());
}

#[test]
fn chunks_apply_in_stream_order() {
    let mut game = new_game(3);
    let player = game.add_player("ThePlayer", "America");
    game.players.get_mut(player).unwrap().bank.deposit(750);
    game.logic.clock.set_frame(LogicFrame(90));

    let players = save_file::save_chunks(&mut game, &[CHUNK_PLAYERS]).unwrap();
    let state = save_file::save_chunks(&mut game, &[CHUNK_GAME_STATE]).unwrap();
    let mut reordered = players[..players.len() - EOF_BYTES].to_vec();
    reordered.extend_from_slice(&state);

    let mut restored = new_game(3);
    restored.load(&reordered).unwrap();
    assert_eq!(restored.frame(), LogicFrame(90));
    assert_eq!(restored.players.get(player).unwrap().bank.balance(), 750);
}

#[test]
fn unknown_chunk_fails_before_anything_is_applied() {
    let mut game = new_game(1);
    game.logic.clock.set_frame(LogicFrame(1200));
    let mut bytes = save_file::save_chunks(&mut game, &[CHUNK_GAME_STATE]).unwrap();
    bytes.truncate(bytes.len() - EOF_BYTES);

    let mut writer = StateWriter::new();
    writer.persist_ascii_string("ChunkName", &mut "CHUNK_Bogus".to_string()).unwrap();
    writer.begin_segment("CHUNK_Bogus").unwrap();
    writer.persist_u32("Payload", &mut 1).unwrap();
    writer.end_segment().unwrap();
    writer.persist_ascii_string("ChunkName", &mut END_OF_FILE.to_string()).unwrap();
    bytes.extend(writer.finish().unwrap());

    let mut target = new_game(1);
    let result = target.load(&bytes);
    assert!(matches!(result, Err(SimError::UnknownChunk { ref name }) if name == "CHUNK_Bogus"));
    assert_eq!(target.frame(), LogicFrame::ZERO, "the game state chunk before it was not applied");
    assert!(!target.is_in_game());
}

#[test]
fn missing_end_of_file_is_rejected() {
    let mut game = skirmish(2);
    let bytes = game.save().unwrap();
    let truncated = &bytes[..bytes.len() - EOF_BYTES];

    let mut target = new_game(2);
    assert!(matches!(target.load(truncated), Err(SimError::MissingEndOfFile)));
    assert!(matches!(target.load(&[]), Err(SimError::MissingEndOfFile)));
    assert!(target.objects().is_empty());
}

#[test]
fn cut_inside_a_chunk_is_a_format_error() {
    let mut game = skirmish(4);
    let bytes = game.save().unwrap();
    let err = new_game(4).load(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(err.is_format_error(), "unexpected error {err}");
}

#[test]
fn full_round_trip_is_byte_stable() {
    let mut game = skirmish(5);
    game.run_frames(45).unwrap();
    let first = game.save().unwrap();

    let mut restored = new_game(5);
    restored.load(&first).unwrap();
    assert_eq!(restored.frame(), game.frame());
    assert_eq!(restored.objects().len(), game.objects().len());
    assert_eq!(restored.save().unwrap(), first);
}

#[test]
fn supply_registries_are_rebuilt_after_load() {
    let mut game = skirmish(6);
    let bytes = game.save().unwrap();

    let mut restored = new_game(6);
    restored.load(&bytes).unwrap();
    let usa = restored.players.get(0).unwrap();
    let gla = restored.players.get(1).unwrap();
    assert_eq!(usa.supply_manager.warehouses().count(), 1);
    assert_eq!(usa.supply_manager.centers().count(), 1);
    assert_eq!(gla.supply_manager.warehouses().count(), 1, "warehouses are shared");
    assert_eq!(gla.supply_manager.centers().count(), 0);
}

#[test]
fn objects_whose_owner_is_missing_still_load() {
    let mut game = skirmish(7);
    let bytes = save_file::save_chunks(&mut game, &[CHUNK_GAME_LOGIC]).unwrap();

    let mut restored = new_game(7);
    restored.load(&bytes).unwrap();
    assert_eq!(restored.objects().len(), game.objects().len());
    assert!(restored.players.is_empty());
}

#[test]
fn players_added_after_a_warehouse_can_use_it() {
    let mut game = new_game(8);
    let usa = game.add_player("ThePlayer", "America");
    let dock = game.spawn_object("SupplyDock", usa, Vector3::new(100.0, 100.0, 0.0)).unwrap();
    let gla = game.add_player("Enemy", "GLA");

    let warehouses: Vec<_> = game.players.get(gla).unwrap().supply_manager.warehouses().collect();
    assert_eq!(warehouses, vec![dock]);
}

#[test]
fn peek_reads_only_the_metadata() {
    let mut game = skirmish(8);
    game.game_state.description = "Before the push".to_string();
    game.logic.clock.set_frame(LogicFrame(300));
    let bytes = game.save().unwrap();

    let state = save_file::peek_game_state(&bytes).unwrap();
    assert_eq!(state.frame, LogicFrame(300));
    assert_eq!(state.description, "Before the push");

    let players_only = save_file::save_chunks(&mut game, &[CHUNK_PLAYERS]).unwrap();
    assert!(save_file::peek_game_state(&players_only).is_err());
}

#[test]
fn saving_an_unknown_chunk_name_fails() {
    let mut game = new_game(1);
    let result = save_file::save_chunks(&mut game, &["CHUNK_Nope"]);
    assert!(matches!(result, Err(SimError::UnknownChunk { .. })));
}

#[test]
fn json_dump_names_every_chunk() {
    let mut game = skirmish(9);
    let tree = save_file::dump_json(&mut game).unwrap();
    let chunks = tree["Chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 18);
    assert_eq!(chunks[0]["ChunkName"], CHUNK_GAME_STATE);
    assert_eq!(chunks[17]["ChunkName"], END_OF_FILE);
    let players = &chunks[5][CHUNK_PLAYERS]["ChunkData"];
    assert_eq!(players["Count"], 2);
    assert_eq!(players["Players"].as_array().map(Vec::len), Some(2));
}
