//! Engine configuration loaded from the data directory.
//!
//! Layout:
//!   {data_dir}/game_data.json          global tuning values (GameData)
//!   {data_dir}/templates/objects.json  object templates (see object::template)

use crate::{
    clock::{FrameRate, LogicFrameSpan},
    error::SimResult,
    object::template::{parse_templates, TemplateStore},
};
use serde::{Deserialize, Serialize};

/// Global tuning values shared by every module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameData {
    pub logic_frames_per_second:              FrameRate,
    pub value_per_supply_box:                 u32,
    /// Fraction of max health restored per second once regeneration starts.
    pub base_regen_health_percent_per_second: f32,
    pub base_regen_delay_ms:                  f32,
    /// 0 disables autosave.
    pub autosave_interval_frames:             u32,
    pub max_state_transitions_per_tick:       u32,
    pub map_width:                            u32,
    pub map_height:                           u32,
    pub partition_cell_size:                  f32,
    pub starting_money:                       u32,
}

impl Default for GameData {
    fn default() -> Self {
        Self {
            logic_frames_per_second:              FrameRate::DEFAULT,
            value_per_supply_box:                 100,
            base_regen_health_percent_per_second: 0.02,
            base_regen_delay_ms:                  3000.0,
            autosave_interval_frames:             0,
            max_state_transitions_per_tick:       32,
            map_width:                            64,
            map_height:                           64,
            partition_cell_size:                  40.0,
            starting_money:                       0,
        }
    }
}

impl GameData {
    pub fn frame_rate(&self) -> FrameRate {
        self.logic_frames_per_second
    }

    pub fn base_regen_delay(&self) -> LogicFrameSpan {
        LogicFrameSpan::from_milliseconds(self.base_regen_delay_ms, self.frame_rate())
    }
}

pub struct EngineConfig {
    pub game_data: GameData,
    pub templates: TemplateStore,
}

/// Templates used by tests and by `sim-runner` without a data directory.
const BUILTIN_TEMPLATES: &str = include_str!("../../data/templates/objects.json");

impl EngineConfig {
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/game_data.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let game_data: GameData = serde_json::from_str(&content)?;

        let template_path = format!("{data_dir}/templates/objects.json");
        let template_content = std::fs::read_to_string(&template_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {template_path}: {e}"))?;
        let templates = parse_templates(&template_content, game_data.frame_rate())?;

        log::info!(
            "Loaded {} object templates from {data_dir} ({} fps)",
            templates.len(),
            game_data.frame_rate().frames_per_second()
        );
        Ok(Self { game_data, templates })
    }

    pub fn default_test() -> SimResult<Self> {
        let game_data = GameData::default();
        let templates = parse_templates(BUILTIN_TEMPLATES, game_data.frame_rate())?;
        Ok(Self { game_data, templates })
    }
}
