//! Client-side modules that still travel with the object.

use crate::{
    error::SimResult,
    object::module::{DrawModuleBase, ModuleBehavior, ModuleFamily},
    persist::{Persistable, StatePersister},
};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct W3dModelDrawData {
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationEntry {
    pub animation: u32,
    pub start:     f32,
    pub end:       f32,
}

impl Persistable for AnimationEntry {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_u32("Animation", &mut self.animation)?;
        p.persist_f32("Start", &mut self.start)?;
        p.persist_f32("End", &mut self.end)
    }
}

/// Animation bookkeeping for a W3D model; has no logic behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct W3dModelDraw {
    pub base:       DrawModuleBase,
    pub model:      String,
    pub animations: [Vec<AnimationEntry>; 3],
    pub pending:    Option<(i32, f32)>,
}

impl W3dModelDraw {
    pub fn new(data: &W3dModelDrawData) -> Self {
        Self {
            base:       DrawModuleBase::default(),
            model:      data.model.clone(),
            animations: Default::default(),
            pending:    None,
        }
    }
}

impl Persistable for W3dModelDraw {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        let version = p.persist_version(2)?;
        p.persist_base(&mut self.base)?;
        p.persist_array("Animations", &mut self.animations, |p, list| {
            p.persist_list_with_byte_count("Entries", list, |p, entry| p.persist_object("Entry", entry))
        })?;
        p.skip_unknown_bytes(1)?;
        if version >= 2 {
            let mut has_pending = self.pending.is_some();
            p.persist_bool("HasPendingAnimation", &mut has_pending)?;
            if has_pending {
                let (mut animation, mut blend) = self.pending.unwrap_or_default();
                p.persist_i32("PendingAnimation", &mut animation)?;
                p.persist_f32("PendingBlend", &mut blend)?;
                self.pending = Some((animation, blend));
            } else {
                self.pending = None;
            }
        }
        Ok(())
    }
}

impl ModuleBehavior for W3dModelDraw {
    fn kind(&self) -> &'static str {
        "W3DModelDraw"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Draw
    }
}

/// Beacon visuals; lives only on the client and is never saved.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BeaconClientUpdate;

impl Persistable for BeaconClientUpdate {
    fn persist(&mut self, _p: &mut dyn StatePersister) -> SimResult<()> {
        Ok(())
    }
}

impl ModuleBehavior for BeaconClientUpdate {
    fn kind(&self) -> &'static str {
        "BeaconClientUpdate"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::ClientUpdate
    }
}
