//! Save-stream roots owned by client-side collaborators (effects, radar,
//! camera, UI, terrain decoration, ghosts). The simulation never reads
//! them; it only carries what the client hands over so a load restores
//! the same presentation.

use crate::{
    clock::LogicFrame,
    error::{SimError, SimResult},
    persist::{Persistable, StatePersister},
    types::{ObjectId, PlayerIndex, Vector3},
};

// ── Particle systems ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleSystemState {
    pub id:          u32,
    pub template:    String,
    pub position:    Vector3,
    pub attached_to: ObjectId,
    pub is_active:   bool,
}

impl Persistable for ParticleSystemState {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("Id", &mut self.id)?;
        p.persist_ascii_string("Template", &mut self.template)?;
        p.persist_vector3("Position", &mut self.position)?;
        p.persist_object_id("AttachedTo", &mut self.attached_to)?;
        p.persist_bool("IsActive", &mut self.is_active)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSystemManager {
    next_system_id: u32,
    systems:        Vec<ParticleSystemState>,
}

impl Default for ParticleSystemManager {
    fn default() -> Self {
        Self { next_system_id: 1, systems: Vec::new() }
    }
}

impl ParticleSystemManager {
    pub fn spawn(&mut self, template: &str, position: Vector3, attached_to: ObjectId) -> u32 {
        let id = self.next_system_id;
        self.next_system_id += 1;
        self.systems.push(ParticleSystemState {
            id,
            template: template.to_string(),
            position,
            attached_to,
            is_active: true,
        });
        id
    }

    pub fn systems(&self) -> &[ParticleSystemState] {
        &self.systems
    }
}

impl Persistable for ParticleSystemManager {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("NextSystemId", &mut self.next_system_id)?;
        p.persist_list_u32("Systems", &mut self.systems, |p, s| p.persist_object("System", s))?;
        if p.is_reading() {
            if let Some(system) = self.systems.iter().find(|s| s.id >= self.next_system_id) {
                return Err(SimError::corrupt("Systems", format!("system id {} not yet issued", system.id)));
            }
        }
        Ok(())
    }
}

// ── Radar ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadarEvent {
    pub kind:          u32,
    pub position:      Vector3,
    pub created_frame: LogicFrame,
    pub expires_frame: LogicFrame,
}

impl Persistable for RadarEvent {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_u32("Kind", &mut self.kind)?;
        p.persist_vector3("Position", &mut self.position)?;
        p.persist_frame("CreatedFrame", &mut self.created_frame)?;
        p.persist_frame("ExpiresFrame", &mut self.expires_frame)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Radar {
    pub hidden:    bool,
    pub forced_on: bool,
    pub events:    Vec<RadarEvent>,
}

impl Radar {
    pub fn drop_expired(&mut self, frame: LogicFrame) {
        self.events.retain(|e| e.expires_frame > frame);
    }
}

impl Persistable for Radar {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_bool("Hidden", &mut self.hidden)?;
        p.persist_bool("ForcedOn", &mut self.forced_on)?;
        p.persist_list_u16("Events", &mut self.events, |p, e| p.persist_object("Event", e))
    }
}

// ── Camera ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TacticalView {
    pub angle:    f32,
    pub position: Vector3,
}

impl Persistable for TacticalView {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_f32("Angle", &mut self.angle)?;
        p.persist_vector3("Position", &mut self.position)
    }
}

// ── Game client ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameClient {
    pub next_drawable_id: u32,
    pub briefing_lines:   Vec<String>,
}

impl Persistable for GameClient {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("NextDrawableId", &mut self.next_drawable_id)?;
        p.persist_list_u16("BriefingLines", &mut self.briefing_lines, |p, line| {
            p.persist_ascii_string("Line", line)
        })
    }
}

// ── In-game UI ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedTimer {
    pub name:         String,
    pub text:         String,
    pub is_countdown: bool,
}

impl Persistable for NamedTimer {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_unicode_string("Text", &mut self.text)?;
        p.persist_bool("IsCountdown", &mut self.is_countdown)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InGameUi {
    pub named_timers:        Vec<NamedTimer>,
    pub superweapons_hidden: bool,
}

impl Persistable for InGameUi {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_list_u32("NamedTimers", &mut self.named_timers, |p, t| p.persist_object("Timer", t))?;
        p.persist_bool("SuperweaponsHidden", &mut self.superweapons_hidden)
    }
}

// ── Terrain decoration ─────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainVisual {
    pub water_grid_enabled: bool,
    pub water_grid_heights: Vec<f32>,
}

impl Persistable for TerrainVisual {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_bool("WaterGridEnabled", &mut self.water_grid_enabled)?;
        p.persist_list_u32("WaterGridHeights", &mut self.water_grid_heights, |p, h| p.persist_f32("Height", h))
    }
}

// ── Ghost objects ──────────────────────────────────────────────

/// The last seen image of an enemy structure under fog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GhostObject {
    pub original: ObjectId,
    pub owner:    PlayerIndex,
    pub position: Vector3,
}

impl Persistable for GhostObject {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_object_id("Original", &mut self.original)?;
        p.persist_u32("Owner", &mut self.owner)?;
        p.persist_vector3("Position", &mut self.position)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GhostObjectManager {
    pub local_player: PlayerIndex,
    pub ghosts:       Vec<GhostObject>,
}

impl Persistable for GhostObjectManager {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("LocalPlayer", &mut self.local_player)?;
        p.persist_list_u16("Ghosts", &mut self.ghosts, |p, g| p.persist_object("Ghost", g))
    }
}
