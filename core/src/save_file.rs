//! Save file orchestrator.
//!
//! Stream layout:
//!   repeat { chunk name: ascii string; chunk body: segment }
//!   until the name is SG_EOF (which has no body).
//!
//! RULES:
//!   - Chunks are written in CHUNKS order; on read they are applied in
//!     stream order, whatever that is.
//!   - A load first scans the whole stream (names known, segments in
//!     bounds, SG_EOF present). A stream that fails the scan never
//!     touches the game.
//!   - Derived state (supply registries, partition index) is rebuilt after
//!     the last chunk, never read from the stream.

use crate::{
    engine::Game,
    error::{SimError, SimResult},
    event::LogicEvent,
    game_state::GameState,
    object::module::BehaviorModule,
    persist::{JsonStateWriter, StatePersister, StateReader, StateWriter},
};
use std::path::Path;

pub const END_OF_FILE: &str = "SG_EOF";

pub const CHUNK_GAME_STATE: &str = "CHUNK_GameState";
pub const CHUNK_PLAYERS: &str = "CHUNK_Players";
pub const CHUNK_GAME_LOGIC: &str = "CHUNK_GameLogic";

type ChunkPersist = fn(&mut Game, &mut dyn StatePersister) -> SimResult<()>;

struct ChunkDefinition {
    name:    &'static str,
    persist: ChunkPersist,
}

const CHUNKS: &[ChunkDefinition] = &[
    ChunkDefinition { name: CHUNK_GAME_STATE,       persist: persist_game_state },
    ChunkDefinition { name: "CHUNK_Campaign",       persist: |g, p| p.persist_object("ChunkData", &mut g.campaign) },
    ChunkDefinition { name: "CHUNK_GameStateMap",   persist: |g, p| p.persist_object("ChunkData", &mut g.game_state_map) },
    ChunkDefinition { name: "CHUNK_TerrainLogic",   persist: |g, p| p.persist_object("ChunkData", &mut g.terrain) },
    ChunkDefinition { name: "CHUNK_TeamFactory",    persist: |g, p| p.persist_object("ChunkData", &mut g.teams) },
    ChunkDefinition { name: CHUNK_PLAYERS,          persist: |g, p| p.persist_object("ChunkData", &mut g.players) },
    ChunkDefinition { name: CHUNK_GAME_LOGIC,       persist: |g, p| p.persist_object("ChunkData", &mut g.logic) },
    ChunkDefinition { name: "CHUNK_ParticleSystem", persist: |g, p| p.persist_object("ChunkData", &mut g.particles) },
    ChunkDefinition { name: "CHUNK_Radar",          persist: |g, p| p.persist_object("ChunkData", &mut g.radar) },
    ChunkDefinition { name: "CHUNK_ScriptEngine",   persist: |g, p| p.persist_object("ChunkData", &mut g.scripts) },
    ChunkDefinition { name: "CHUNK_SidesList",      persist: |g, p| p.persist_object("ChunkData", &mut g.sides) },
    ChunkDefinition { name: "CHUNK_TacticalView",   persist: |g, p| p.persist_object("ChunkData", &mut g.tactical_view) },
    ChunkDefinition { name: "CHUNK_GameClient",     persist: |g, p| p.persist_object("ChunkData", &mut g.client) },
    ChunkDefinition { name: "CHUNK_InGameUI",       persist: |g, p| p.persist_object("ChunkData", &mut g.in_game_ui) },
    ChunkDefinition { name: "CHUNK_Partition",      persist: |g, p| p.persist_object("ChunkData", &mut g.partition) },
    ChunkDefinition { name: "CHUNK_TerrainVisual",  persist: |g, p| p.persist_object("ChunkData", &mut g.terrain_visual) },
    ChunkDefinition { name: "CHUNK_GhostObject",    persist: |g, p| p.persist_object("ChunkData", &mut g.ghosts) },
];

/// The logic frame travels with the save metadata.
fn persist_game_state(game: &mut Game, p: &mut dyn StatePersister) -> SimResult<()> {
    if !p.is_reading() {
        game.game_state.frame = game.logic.frame();
    }
    p.persist_object("ChunkData", &mut game.game_state)?;
    if p.is_reading() {
        game.logic.clock.set_frame(game.game_state.frame);
    }
    Ok(())
}

fn find_chunk(name: &str) -> Option<&'static ChunkDefinition> {
    CHUNKS.iter().find(|c| c.name == name)
}

/// Every chunk name in write order.
pub fn chunk_names() -> impl Iterator<Item = &'static str> {
    CHUNKS.iter().map(|c| c.name)
}

// ── Writing ────────────────────────────────────────────────────

fn write_stream(game: &mut Game, p: &mut dyn StatePersister, only: Option<&[&str]>) -> SimResult<()> {
    if let Some(names) = only {
        if let Some(unknown) = names.iter().find(|n| find_chunk(n).is_none()) {
            return Err(SimError::UnknownChunk { name: unknown.to_string() });
        }
    }

    p.begin_array("Chunks")?;
    for chunk in CHUNKS {
        if only.is_some_and(|names| !names.contains(&chunk.name)) {
            continue;
        }
        p.begin_object("Chunk")?;
        let mut name = chunk.name.to_string();
        p.persist_ascii_string("ChunkName", &mut name)?;
        p.begin_segment(chunk.name)?;
        (chunk.persist)(game, p)?;
        p.end_segment()?;
        p.end_object()?;
    }
    p.begin_object("Chunk")?;
    let mut end = END_OF_FILE.to_string();
    p.persist_ascii_string("ChunkName", &mut end)?;
    p.end_object()?;
    p.end_array()
}

/// Writes the full save stream.
pub fn save(game: &mut Game) -> SimResult<Vec<u8>> {
    let mut writer = StateWriter::new();
    write_stream(game, &mut writer, None)?;
    let bytes = writer.finish()?;
    log::info!("Saved frame {} ({} bytes)", game.logic.frame(), bytes.len());
    Ok(bytes)
}

/// Writes only the named chunks, in table order, followed by SG_EOF.
pub fn save_chunks(game: &mut Game, names: &[&str]) -> SimResult<Vec<u8>> {
    let mut writer = StateWriter::new();
    write_stream(game, &mut writer, Some(names))?;
    writer.finish()
}

/// Renders the save stream as a JSON tree for inspection.
pub fn dump_json(game: &mut Game) -> SimResult<serde_json::Value> {
    let mut writer = JsonStateWriter::new();
    write_stream(game, &mut writer, None)?;
    writer.finish()
}

pub fn save_to_path(game: &mut Game, path: impl AsRef<Path>) -> SimResult<()> {
    let bytes = save(game)?;
    std::fs::write(path.as_ref(), &bytes)?;
    log::info!("Wrote save to {}", path.as_ref().display());
    Ok(())
}

// ── Reading ────────────────────────────────────────────────────

/// Walks the chunk headers without decoding any body. Returns the chunk
/// names in stream order.
pub fn scan_chunks(bytes: &[u8]) -> SimResult<Vec<String>> {
    let mut reader = StateReader::new(bytes);
    let mut names = Vec::new();
    loop {
        if reader.is_at_end() {
            return Err(SimError::MissingEndOfFile);
        }
        let mut name = String::new();
        reader.persist_ascii_string("ChunkName", &mut name)?;
        if name == END_OF_FILE {
            if !reader.is_at_end() {
                log::warn!("{} bytes after {END_OF_FILE} ignored", bytes.len() - reader.position());
            }
            return Ok(names);
        }
        if find_chunk(&name).is_none() {
            return Err(SimError::UnknownChunk { name });
        }
        let length = reader.begin_segment(&name)?;
        reader.skip_unknown_bytes(length as usize)?;
        reader.end_segment()?;
        names.push(name);
    }
}

/// Reads a save stream into `game`.
pub fn load(game: &mut Game, bytes: &[u8]) -> SimResult<()> {
    let names = scan_chunks(bytes)?;
    log::info!("Loading save: {} chunks, {} bytes", names.len(), bytes.len());

    let mut reader = StateReader::new(bytes);
    let p: &mut dyn StatePersister = &mut reader;
    p.begin_array("Chunks")?;
    loop {
        p.begin_object("Chunk")?;
        let mut name = String::new();
        p.persist_ascii_string("ChunkName", &mut name)?;
        if name == END_OF_FILE {
            p.end_object()?;
            break;
        }
        let chunk = find_chunk(&name).ok_or_else(|| SimError::UnknownChunk { name: name.clone() })?;
        let length = p.begin_segment(chunk.name)?;
        log::debug!("Reading {} ({length} bytes)", chunk.name);
        (chunk.persist)(game, p)?;
        p.end_segment()?;
        p.end_object()?;
    }
    p.end_array()?;

    post_load(game)?;
    if !game.is_in_game() {
        let campaign = game.campaign.campaign_name.clone();
        let mission = game.campaign.mission_name.clone();
        game.start_campaign(&campaign, &mission);
    }
    let frame = game.logic.frame();
    game.push_event(LogicEvent::GameLoaded { frame: frame.value() });
    log::info!("Loaded save at frame {frame}");
    Ok(())
}

pub fn load_from_path(game: &mut Game, path: impl AsRef<Path>) -> SimResult<()> {
    let bytes = std::fs::read(path.as_ref())?;
    load(game, &bytes)
}

/// Rebuilds derived state and reports references to objects that no
/// longer exist.
fn post_load(game: &mut Game) -> SimResult<()> {
    game.players.clear_supply_registries();
    for object in game.logic.objects.iter() {
        for slot in &object.modules {
            match slot.module {
                BehaviorModule::SupplyWarehouseCreate(_) => game.players.register_warehouse(object.id()),
                BehaviorModule::SupplyCenterCreate(_) => match game.players.get_mut(object.body.owner) {
                    Ok(player) => player.supply_manager.register_center(object.id()),
                    Err(_) => log::warn!(
                        "Supply center {} belongs to missing player {}, left unregistered",
                        object.id(),
                        object.body.owner
                    ),
                },
                _ => {}
            }
            for target in slot.module.referenced_objects() {
                if !game.logic.objects.contains(target) {
                    log::warn!("{} module '{}' refers to missing object {target}", object.id(), slot.tag);
                }
            }
        }
    }

    game.partition.ensure_players(game.players.len());
    game.partition.reindex(&game.logic.objects);
    Ok(())
}

/// Reads only the save metadata, for save browsers.
pub fn peek_game_state(bytes: &[u8]) -> SimResult<GameState> {
    let mut reader = StateReader::new(bytes);
    let p: &mut dyn StatePersister = &mut reader;
    loop {
        if p.remaining() == Some(0) {
            return Err(SimError::MissingEndOfFile);
        }
        let mut name = String::new();
        p.persist_ascii_string("ChunkName", &mut name)?;
        if name == END_OF_FILE {
            return Err(SimError::corrupt("ChunkName", format!("no {CHUNK_GAME_STATE} chunk")));
        }
        let length = p.begin_segment(&name)?;
        if name == CHUNK_GAME_STATE {
            let mut state = GameState::default();
            p.persist_object("ChunkData", &mut state)?;
            p.end_segment()?;
            return Ok(state);
        }
        p.skip_unknown_bytes(length as usize)?;
        p.end_segment()?;
    }
}
