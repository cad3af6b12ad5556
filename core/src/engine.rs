//! The simulation engine: owns every root and runs the logic frame.
//!
//! FRAME ORDER (fixed, never reordered):
//!   1. Advance the logic clock
//!   2. Update every live object in ascending id order; each object runs
//!      its awake modules in template order
//!   3. Collisions between objects that were touching at the end of the
//!      previous frame
//!   4. Sweep: die modules for newly dead objects, then removal of
//!      destroyed objects (destroy modules run first)
//!   5. Script timers and radar expiry
//!   6. Re-index the partition
//!   7. Flush the frame's events to the event log
//!
//! RULES:
//!   - All randomness flows through the RngBank.
//!   - Save and load never overlap a frame.
//!   - The object being updated is out of the table while it runs.

use crate::{
    client_state::{GameClient, GhostObjectManager, InGameUi, ParticleSystemManager, Radar, TacticalView, TerrainVisual},
    clock::LogicFrame,
    config::EngineConfig,
    error::{SimError, SimResult},
    event::{EventLogEntry, LogicEvent},
    game_state::{CampaignManager, GameState, GameStateMap, SaveDate},
    logic::{GameLogic, ObjectTable, PartitionManager, PlayerManager, TeamFactory, TerrainLogic, World},
    object::{module::ModuleFamily, modules::ai::AiCommand, GameObject, ObjectStatus},
    rng::{RngSlot, SimRng},
    save_file,
    script::{ScriptEngine, SidesList},
    store::SaveStore,
    types::{ObjectId, PlayerIndex, RunId, Vector3},
};

/// Objects closer than this (2D) are considered touching.
pub const COLLISION_RADIUS: f32 = 5.0;

macro_rules! world {
    ($game:expr, $frame:expr, $rng:expr) => {
        World {
            frame:     $frame,
            game_data: &$game.logic.game_data,
            objects:   &mut $game.logic.objects,
            players:   &mut $game.players,
            terrain:   &$game.terrain,
            partition: &$game.partition,
            events:    &mut $game.pending_events,
            rng:       $rng,
        }
    };
}

pub struct Game {
    pub run_id:         RunId,
    pub logic:          GameLogic,
    pub game_state:     GameState,
    pub campaign:       CampaignManager,
    pub game_state_map: GameStateMap,
    pub terrain:        TerrainLogic,
    pub teams:          TeamFactory,
    pub players:        PlayerManager,
    pub particles:      ParticleSystemManager,
    pub radar:          Radar,
    pub scripts:        ScriptEngine,
    pub sides:          SidesList,
    pub tactical_view:  TacticalView,
    pub client:         GameClient,
    pub in_game_ui:     InGameUi,
    pub partition:      PartitionManager,
    pub terrain_visual: TerrainVisual,
    pub ghosts:         GhostObjectManager,
    seed:               u64,
    in_game:            bool,
    pending_events:     Vec<LogicEvent>,
    store:              Option<SaveStore>,
}

impl Game {
    /// Build an empty session from configuration. No players, no objects,
    /// clock paused at frame 0.
    pub fn build(config: EngineConfig, seed: u64) -> SimResult<Self> {
        let EngineConfig { game_data, templates } = config;
        let terrain = TerrainLogic::flat(game_data.map_width, game_data.map_height);
        let partition =
            PartitionManager::new(game_data.partition_cell_size, game_data.map_width, game_data.map_height)?;
        Ok(Self {
            run_id: format!("run-{seed}"),
            logic: GameLogic::new(game_data, templates, seed),
            game_state: GameState::default(),
            campaign: CampaignManager::default(),
            game_state_map: GameStateMap::default(),
            terrain,
            teams: TeamFactory::new(),
            players: PlayerManager::new(),
            particles: ParticleSystemManager::default(),
            radar: Radar::default(),
            scripts: ScriptEngine::default(),
            sides: SidesList::default(),
            tactical_view: TacticalView::default(),
            client: GameClient::default(),
            in_game_ui: InGameUi::default(),
            partition,
            terrain_visual: TerrainVisual::default(),
            ghosts: GhostObjectManager::default(),
            seed,
            in_game: false,
            pending_events: Vec::new(),
            store: None,
        })
    }

    /// Attach an event log / save store. Records the run and its seed.
    pub fn with_store(mut self, store: SaveStore) -> SimResult<Self> {
        store.migrate()?;
        store.insert_run(&self.run_id, self.seed, env!("CARGO_PKG_VERSION"))?;
        self.store = Some(store);
        self.pending_events.push(LogicEvent::RunInitialized { run_id: self.run_id.clone(), seed: self.seed });
        self.flush_events(self.logic.frame())?;
        Ok(self)
    }

    pub fn store(&self) -> Option<&SaveStore> {
        self.store.as_ref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn frame(&self) -> LogicFrame {
        self.logic.frame()
    }

    pub fn is_in_game(&self) -> bool {
        self.in_game
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.logic.objects
    }

    pub fn object(&self, id: ObjectId) -> Option<&GameObject> {
        self.logic.objects.get(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.logic.objects.get_mut(id)
    }

    pub(crate) fn push_event(&mut self, event: LogicEvent) {
        self.pending_events.push(event);
    }

    /// Marks the session as running. Called by a load when no session
    /// was active yet.
    pub fn start_campaign(&mut self, campaign: &str, mission: &str) {
        self.campaign.campaign_name = campaign.to_string();
        self.campaign.mission_name = mission.to_string();
        self.campaign.is_in_progress = true;
        self.in_game = true;
        self.pending_events.push(LogicEvent::CampaignStarted {
            campaign: campaign.to_string(),
            mission:  mission.to_string(),
        });
        log::info!("Started campaign '{campaign}' mission '{mission}'");
    }

    pub fn add_player(&mut self, name: &str, side: &str) -> PlayerIndex {
        let index = self.players.add_player(name, side, self.logic.game_data.starting_money);
        self.partition.ensure_players(self.players.len());
        index
    }

    /// Builds an object, runs its create modules and places it in the world.
    pub fn spawn_object(&mut self, template: &str, owner: PlayerIndex, position: Vector3) -> SimResult<ObjectId> {
        self.players.get(owner)?;
        let mut object = self.logic.build_object(template, owner, position)?;
        let frame = self.logic.frame();
        let mut rng = self.logic.rng_bank().for_frame(RngSlot::ObjectCreation, frame);
        {
            let mut world = world!(self, frame, &mut rng);
            object.run_create_modules(&mut world)?;
        }

        let id = object.id();
        self.pending_events.push(LogicEvent::ObjectCreated {
            frame: frame.value(),
            object: id,
            template: template.to_string(),
            owner,
        });
        log::debug!("Spawned {template} as {id} for player {owner}");
        self.logic.objects.insert(object);
        self.partition.reindex(&self.logic.objects);
        Ok(id)
    }

    pub fn issue_command(&mut self, id: ObjectId, command: AiCommand) -> SimResult<bool> {
        let object = self.logic.objects.get_mut(id).ok_or(SimError::ObjectNotFound { id })?;
        Ok(object.issue_command(command))
    }

    /// Grants a player an upgrade and runs the matching upgrade modules on
    /// every object they own. Returns how many modules fired.
    pub fn grant_upgrade(&mut self, player: PlayerIndex, upgrade: &str) -> SimResult<usize> {
        if !self.players.get_mut(player)?.add_upgrade(upgrade) {
            return Ok(0);
        }
        let fired: usize = self
            .logic
            .objects
            .iter_mut()
            .filter(|o| o.body.owner == player)
            .map(|o| o.apply_upgrade(upgrade))
            .sum();
        Ok(fired)
    }

    // ── Frame ──────────────────────────────────────────────────

    /// Advance one logic frame. Returns the frame's events.
    pub fn tick(&mut self) -> SimResult<Vec<LogicEvent>> {
        let frame = self.logic.clock.advance()?;
        let mut rng = self.logic.rng_bank().for_frame(RngSlot::ObjectLogic, frame);

        for id in self.logic.objects.ids() {
            let Some(mut object) = self.logic.objects.take(id) else { continue };
            let result = if object.body.is_dead() {
                Ok(())
            } else {
                let mut world = world!(self, frame, &mut rng);
                object.update(&mut world)
            };
            self.logic.objects.insert(object);
            result?;
        }

        self.resolve_collisions();
        self.sweep(frame, &mut rng)?;
        self.scripts.update_timers();
        self.radar.drop_expired(frame);
        self.partition.reindex(&self.logic.objects);

        let interval = self.logic.game_data.autosave_interval_frames;
        if interval > 0 && self.store.is_some() && frame.value() % interval == 0 {
            let slot = self.save_to_store("autosave")?;
            log::debug!("Autosaved frame {frame} into slot {slot}");
        }

        let events = self.pending_events.clone();
        self.flush_events(frame)?;
        Ok(events)
    }

    /// Run n frames. Used by tests and fast-forward.
    pub fn run_frames(&mut self, n: u32) -> SimResult<()> {
        self.logic.clock.resume();
        let result = (0..n).try_for_each(|_| self.tick().map(|_| ()));
        self.logic.clock.pause();
        result
    }

    fn resolve_collisions(&mut self) {
        for id in self.logic.objects.ids() {
            let Some(mut object) = self.logic.objects.take(id) else { continue };
            let collides = !object.body.is_dead()
                && object.modules.iter().any(|m| m.module.family() == ModuleFamily::Collide);
            if collides {
                for other_id in self.partition.objects_near(object.body.position, COLLISION_RADIUS) {
                    if let Some(other) = self.logic.objects.get(other_id) {
                        object.on_collide(other);
                    }
                }
            }
            self.logic.objects.insert(object);
        }
    }

    fn sweep(&mut self, frame: LogicFrame, rng: &mut SimRng) -> SimResult<()> {
        for id in self.logic.objects.ids() {
            let Some(mut object) = self.logic.objects.take(id) else { continue };
            let newly_dead = object.body.is_dead() && !object.body.status.get(ObjectStatus::DeathHandled);
            if !newly_dead && !object.body.is_destroyed() {
                self.logic.objects.insert(object);
                continue;
            }

            let result = {
                let mut world = world!(self, frame, &mut *rng);
                let mut result = Ok(());
                if newly_dead {
                    object.body.status.set(ObjectStatus::DeathHandled, true);
                    result = object.run_die_modules(&mut world);
                }
                if result.is_ok() && object.body.is_destroyed() {
                    result = object.run_destroy_modules(&mut world);
                }
                result
            };

            if object.body.is_destroyed() && result.is_ok() {
                self.teams.remove_member(id);
                self.pending_events.push(LogicEvent::ObjectDestroyed { frame: frame.value(), object: id });
                log::debug!("Removed {id} ({})", object.template_name());
            } else {
                self.logic.objects.insert(object);
            }
            result?;
        }
        Ok(())
    }

    fn flush_events(&mut self, frame: LogicFrame) -> SimResult<()> {
        let events = std::mem::take(&mut self.pending_events);
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let entries = events
            .iter()
            .map(|event| -> SimResult<EventLogEntry> {
                Ok(EventLogEntry {
                    id:         None,
                    run_id:     self.run_id.clone(),
                    frame:      frame.value(),
                    event_type: event.type_name().to_string(),
                    payload:    serde_json::to_string(event)?,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        store.append_events(&entries)
    }

    // ── Save / load ────────────────────────────────────────────

    pub fn save(&mut self) -> SimResult<Vec<u8>> {
        save_file::save(self)
    }

    pub fn load(&mut self, bytes: &[u8]) -> SimResult<()> {
        save_file::load(self, bytes)
    }

    /// Saves into the attached store, stamping the wall-clock save date.
    /// The label names the slot only; the save's own description is kept.
    /// Returns the new slot id.
    pub fn save_to_store(&mut self, label: &str) -> SimResult<String> {
        if self.store.is_none() {
            return Err(SimError::InvalidConfig { reason: "no save store attached".to_string() });
        }
        self.game_state.date = SaveDate::now();
        let bytes = self.save()?;
        let frame = self.logic.frame().value();
        self.pending_events.push(LogicEvent::GameSaved { frame, bytes: bytes.len() });
        match self.store.as_ref() {
            Some(store) => store.save_slot(&self.run_id, label, frame, &bytes),
            None => Err(SimError::InvalidConfig { reason: "no save store attached".to_string() }),
        }
    }

    pub fn load_from_store(&mut self, slot_id: &str) -> SimResult<()> {
        let slot = self
            .store
            .as_ref()
            .ok_or_else(|| SimError::InvalidConfig { reason: "no save store attached".to_string() })?
            .load_slot(slot_id)?
            .ok_or_else(|| SimError::Other(anyhow::anyhow!("No save slot {slot_id}")))?;
        self.load(&slot.data)
    }
}
