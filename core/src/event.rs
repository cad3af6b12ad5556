//! Logic events: what happened during a frame.
//!
//! RULE: Events are observations, never commands. Modules emit them through
//! `World::emit`; the engine appends them to the event log at the end of
//! the frame. Nothing in the simulation reads them back.

use crate::types::{ObjectId, PlayerIndex, RunId};
use serde::{Deserialize, Serialize};

/// Variants are append-only; stored payloads must stay decodable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogicEvent {
    // ── Session ────────────────────────────────────
    RunInitialized {
        run_id: RunId,
        seed:   u64,
    },
    CampaignStarted {
        campaign: String,
        mission:  String,
    },
    GameSaved {
        frame: u32,
        bytes: usize,
    },
    GameLoaded {
        frame: u32,
    },

    // ── Objects ────────────────────────────────────
    ObjectCreated {
        frame:    u32,
        object:   ObjectId,
        template: String,
        owner:    PlayerIndex,
    },
    ObjectDestroyed {
        frame:  u32,
        object: ObjectId,
    },
    DamageDealt {
        frame:    u32,
        attacker: ObjectId,
        victim:   ObjectId,
        amount:   f32,
    },
    ProjectileDetonated {
        frame:      u32,
        projectile: ObjectId,
        x:          f32,
        y:          f32,
    },

    // ── Economy ────────────────────────────────────
    SuppliesDeposited {
        frame:  u32,
        truck:  ObjectId,
        center: ObjectId,
        player: PlayerIndex,
        boxes:  i32,
        amount: u32,
    },
}

impl LogicEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }      => "run_initialized",
            Self::CampaignStarted { .. }     => "campaign_started",
            Self::GameSaved { .. }           => "game_saved",
            Self::GameLoaded { .. }          => "game_loaded",
            Self::ObjectCreated { .. }       => "object_created",
            Self::ObjectDestroyed { .. }     => "object_destroyed",
            Self::DamageDealt { .. }         => "damage_dealt",
            Self::ProjectileDetonated { .. } => "projectile_detonated",
            Self::SuppliesDeposited { .. }   => "supplies_deposited",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub frame:      u32,
    pub event_type: String,
    pub payload:    String, // JSON-serialized LogicEvent
}
