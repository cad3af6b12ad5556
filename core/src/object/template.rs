//! Object templates and the JSON template parser.
//!
//! RULES:
//!   - Parsing state lives in an explicit ParseContext threaded through one
//!     parse unit. Nothing is global.
//!   - Module kinds are resolved through a static table; an unknown kind
//!     fails the whole parse.
//!   - Template module data is immutable once parsed and shared by Arc.

use super::module::ModuleData;
use super::modules::{
    ai::AiUpdateData,
    chinook::ChinookAiData,
    docks::{SupplyCenterDockData, SupplyWarehouseDockData},
    draw::W3dModelDrawData,
    lifecycle::StealthUpgradeData,
    missile::MissileAiData,
    supply::SupplyAiData,
    updates::BezierProjectileData,
};
use crate::{
    clock::{FrameRate, LogicFrameSpan},
    error::{SimError, SimResult},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One module as configured on a template.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleTemplate {
    pub tag:  String,
    pub kind: String,
    pub data: Arc<ModuleData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTemplate {
    pub name:       String,
    pub max_health: f32,
    pub kind_of:    Vec<String>,
    pub modules:    Vec<ModuleTemplate>,
}

/// All templates of a parse unit, by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, Arc<ObjectTemplate>>,
}

impl TemplateStore {
    pub fn get(&self, name: &str) -> SimResult<Arc<ObjectTemplate>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::UnknownTemplate { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

// ── Parse context ──────────────────────────────────────────────

/// Everything the parser knows while reading one file.
pub struct ParseContext {
    pub frame_rate: FrameRate,
    parsed:         BTreeMap<String, Arc<ObjectTemplate>>,
    last:           Option<Arc<ObjectTemplate>>,
}

impl ParseContext {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self { frame_rate, parsed: BTreeMap::new(), last: None }
    }

    pub fn duration(&self, milliseconds: f32) -> LogicFrameSpan {
        LogicFrameSpan::from_milliseconds(milliseconds, self.frame_rate)
    }

    /// `^` names the template parsed just before this one.
    fn resolve_parent(&self, child: &str, parent: &str) -> SimResult<Arc<ObjectTemplate>> {
        if parent == "^" {
            return self.last.clone().ok_or_else(|| SimError::InvalidConfig {
                reason: format!("template '{child}' inherits '^' but is the first in its file"),
            });
        }
        self.parsed
            .get(parent)
            .cloned()
            .ok_or_else(|| SimError::UnknownTemplate { name: parent.to_string() })
    }

    fn finish_template(&mut self, template: ObjectTemplate) {
        let template = Arc::new(template);
        self.parsed.insert(template.name.clone(), Arc::clone(&template));
        self.last = Some(template);
    }

    pub fn into_store(self) -> TemplateStore {
        TemplateStore { templates: self.parsed }
    }
}

// ── Kind dispatch ──────────────────────────────────────────────

type ParseFn = fn(&Value, &ParseContext) -> SimResult<ModuleData>;

static MODULE_PARSE_TABLE: &[(&str, ParseFn)] = &[
    ("AIUpdateInterface",              parse_ai_update),
    ("SupplyTruckAIUpdate",            parse_supply_truck),
    ("WorkerAIUpdate",                 parse_worker),
    ("ChinookAIUpdate",                parse_chinook),
    ("MissileAIUpdate",                parse_missile),
    ("BaseRegenerateUpdate",           |_, _| Ok(ModuleData::BaseRegenerateUpdate)),
    ("AssistedTargetingUpdate",        |_, _| Ok(ModuleData::AssistedTargetingUpdate)),
    ("SpectreGunshipDeploymentUpdate", |_, _| Ok(ModuleData::SpectreGunshipDeploymentUpdate)),
    ("SupplyWarehouseDockUpdate",      parse_warehouse_dock),
    ("SupplyCenterDockUpdate",         parse_center_dock),
    ("BezierProjectileBehavior",       parse_bezier),
    ("SupplyWarehouseCreate",          |_, _| Ok(ModuleData::SupplyWarehouseCreate)),
    ("SupplyCenterCreate",             |_, _| Ok(ModuleData::SupplyCenterCreate)),
    ("StealthUpgrade",                 parse_stealth_upgrade),
    ("SquishCollide",                  |_, _| Ok(ModuleData::SquishCollide)),
    ("DestroyDie",                     |_, _| Ok(ModuleData::DestroyDie)),
    ("W3DModelDraw",                   parse_model_draw),
    ("BeaconClientUpdate",             |_, _| Ok(ModuleData::BeaconClientUpdate)),
];

pub fn parse_module(kind: &str, fields: &Value, cx: &ParseContext) -> SimResult<ModuleData> {
    let (_, parse) = MODULE_PARSE_TABLE
        .iter()
        .find(|(name, _)| *name == kind)
        .ok_or_else(|| SimError::UnknownModuleKind { kind: kind.to_string() })?;
    parse(fields, cx)
}

fn fields_as<T: for<'de> Deserialize<'de>>(fields: &Value) -> SimResult<T> {
    Ok(T::deserialize(fields)?)
}

// Raw field sets. Durations are milliseconds here and become frame spans
// in the parse functions below.

#[derive(Deserialize)]
#[serde(default)]
struct RawAi {
    speed:              f32,
    attack_range:       f32,
    attack_damage:      f32,
    scan_range:         f32,
    attack_interval_ms: f32,
}

impl Default for RawAi {
    fn default() -> Self {
        Self {
            speed:              3.0,
            attack_range:       30.0,
            attack_damage:      10.0,
            scan_range:         120.0,
            attack_interval_ms: 1000.0,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawSupply {
    max_boxes:                        u32,
    supply_center_action_delay_ms:    f32,
    supply_warehouse_action_delay_ms: f32,
    supply_warehouse_scan_distance:   f32,
    upgraded_supply_boost:            u32,
}

impl Default for RawSupply {
    fn default() -> Self {
        Self {
            max_boxes:                        5,
            supply_center_action_delay_ms:    0.0,
            supply_warehouse_action_delay_ms: 0.0,
            supply_warehouse_scan_distance:   300.0,
            upgraded_supply_boost:            0,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawChinook {
    flight_altitude:     f32,
    takeoff_duration_ms: f32,
    drop_duration_ms:    f32,
}

impl Default for RawChinook {
    fn default() -> Self {
        Self { flight_altitude: 60.0, takeoff_duration_ms: 2000.0, drop_duration_ms: 3000.0 }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawMissile {
    ignition_delay_ms:  f32,
    detonation_damage:  f32,
    detonation_radius:  f32,
    weapon_name:        String,
    exhaust_name:       String,
}

impl Default for RawMissile {
    fn default() -> Self {
        Self {
            ignition_delay_ms: 0.0,
            detonation_damage: 50.0,
            detonation_radius: 20.0,
            weapon_name:       String::new(),
            exhaust_name:      String::new(),
        }
    }
}

fn ai_data(fields: &Value, cx: &ParseContext) -> SimResult<AiUpdateData> {
    let raw: RawAi = fields_as(fields)?;
    Ok(AiUpdateData {
        speed:           raw.speed,
        attack_range:    raw.attack_range,
        attack_damage:   raw.attack_damage,
        scan_range:      raw.scan_range,
        attack_interval: cx.duration(raw.attack_interval_ms),
    })
}

fn supply_data(fields: &Value, cx: &ParseContext) -> SimResult<SupplyAiData> {
    let raw: RawSupply = fields_as(fields)?;
    Ok(SupplyAiData {
        ai:                            ai_data(fields, cx)?,
        max_boxes:                     raw.max_boxes,
        supply_center_action_delay:    cx.duration(raw.supply_center_action_delay_ms),
        supply_warehouse_action_delay: cx.duration(raw.supply_warehouse_action_delay_ms),
        scan_distance:                 raw.supply_warehouse_scan_distance,
        upgraded_supply_boost:         raw.upgraded_supply_boost,
    })
}

fn parse_ai_update(fields: &Value, cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::AiUpdateInterface(ai_data(fields, cx)?))
}

fn parse_supply_truck(fields: &Value, cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::SupplyTruckAiUpdate(supply_data(fields, cx)?))
}

fn parse_worker(fields: &Value, cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::WorkerAiUpdate(supply_data(fields, cx)?))
}

fn parse_chinook(fields: &Value, cx: &ParseContext) -> SimResult<ModuleData> {
    let raw: RawChinook = fields_as(fields)?;
    Ok(ModuleData::ChinookAiUpdate(ChinookAiData {
        supply:           supply_data(fields, cx)?,
        flight_altitude:  raw.flight_altitude,
        takeoff_duration: cx.duration(raw.takeoff_duration_ms),
        drop_duration:    cx.duration(raw.drop_duration_ms),
    }))
}

fn parse_missile(fields: &Value, cx: &ParseContext) -> SimResult<ModuleData> {
    let raw: RawMissile = fields_as(fields)?;
    Ok(ModuleData::MissileAiUpdate(MissileAiData {
        ai:                ai_data(fields, cx)?,
        ignition_delay:    cx.duration(raw.ignition_delay_ms),
        detonation_damage: raw.detonation_damage,
        detonation_radius: raw.detonation_radius,
        weapon_name:       raw.weapon_name,
        exhaust_name:      raw.exhaust_name,
    }))
}

fn parse_warehouse_dock(fields: &Value, _cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::SupplyWarehouseDockUpdate(fields_as::<SupplyWarehouseDockData>(fields)?))
}

fn parse_center_dock(fields: &Value, _cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::SupplyCenterDockUpdate(fields_as::<SupplyCenterDockData>(fields)?))
}

fn parse_bezier(fields: &Value, _cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::BezierProjectileBehavior(fields_as::<BezierProjectileData>(fields)?))
}

fn parse_stealth_upgrade(fields: &Value, _cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::StealthUpgrade(fields_as::<StealthUpgradeData>(fields)?))
}

fn parse_model_draw(fields: &Value, _cx: &ParseContext) -> SimResult<ModuleData> {
    Ok(ModuleData::W3dModelDraw(fields_as::<W3dModelDrawData>(fields)?))
}

// ── Templates ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawTemplateFile {
    templates: Vec<RawTemplate>,
}

#[derive(Deserialize)]
struct RawTemplate {
    name:       String,
    inherits:   Option<String>,
    max_health: Option<f32>,
    kind_of:    Option<Vec<String>>,
    #[serde(default)]
    modules:    Vec<RawModule>,
}

#[derive(Deserialize)]
struct RawModule {
    tag:    String,
    kind:   String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// Parse one template file into a store.
pub fn parse_templates(json: &str, frame_rate: FrameRate) -> SimResult<TemplateStore> {
    let file: RawTemplateFile = serde_json::from_str(json)?;
    let mut cx = ParseContext::new(frame_rate);
    for raw in file.templates {
        let template = parse_template(raw, &cx)?;
        log::debug!("Parsed template {} ({} modules)", template.name, template.modules.len());
        cx.finish_template(template);
    }
    Ok(cx.into_store())
}

/// A child's modules replace inherited ones with the same tag and append
/// the rest in order.
fn parse_template(raw: RawTemplate, cx: &ParseContext) -> SimResult<ObjectTemplate> {
    let mut template = match &raw.inherits {
        Some(parent) => {
            let parent = cx.resolve_parent(&raw.name, parent)?;
            ObjectTemplate { name: raw.name.clone(), ..(*parent).clone() }
        }
        None => ObjectTemplate {
            name:       raw.name.clone(),
            max_health: 0.0,
            kind_of:    Vec::new(),
            modules:    Vec::new(),
        },
    };

    if let Some(max_health) = raw.max_health {
        if max_health < 0.0 {
            return Err(SimError::InvalidConfig {
                reason: format!("template '{}' has negative max_health {max_health}", raw.name),
            });
        }
        template.max_health = max_health;
    }
    if let Some(kind_of) = raw.kind_of {
        template.kind_of = kind_of;
    }

    for module in raw.modules {
        let fields = Value::Object(module.fields);
        let parsed = ModuleTemplate {
            data: Arc::new(parse_module(&module.kind, &fields, cx)?),
            tag:  module.tag,
            kind: module.kind,
        };
        match template.modules.iter_mut().find(|m| m.tag == parsed.tag) {
            Some(existing) => *existing = parsed,
            None => template.modules.push(parsed),
        }
    }
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_converted_at_parse_time() {
        let json = r#"{"templates":[{"name":"Truck","max_health":100,"modules":[
            {"tag":"AI","kind":"SupplyTruckAIUpdate","supply_warehouse_action_delay_ms":1000}
        ]}]}"#;
        let store = parse_templates(json, FrameRate::DEFAULT).unwrap();
        let truck = store.get("Truck").unwrap();
        match truck.modules[0].data.as_ref() {
            ModuleData::SupplyTruckAiUpdate(d) => {
                assert_eq!(d.supply_warehouse_action_delay, LogicFrameSpan(30));
            }
            other => panic!("unexpected module data {other:?}"),
        }
    }

    #[test]
    fn caret_without_predecessor_is_rejected() {
        let json = r#"{"templates":[{"name":"Orphan","inherits":"^"}]}"#;
        assert!(matches!(
            parse_templates(json, FrameRate::DEFAULT),
            Err(SimError::InvalidConfig { .. })
        ));
    }
}
