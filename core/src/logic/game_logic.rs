//! The object table and the GameLogic root that persists it.
//!
//! RULES:
//!   - Objects are keyed and iterated by ascending ObjectId.
//!   - Ids are never reused within a session; `next_object_id` only grows
//!     and is saved with the objects.
//!   - The save carries a table of contents mapping small template ids to
//!     template names, so each object costs two bytes of template reference.

use crate::{
    clock::{FrameRate, LogicClock, LogicFrame},
    config::GameData,
    error::{SimError, SimResult},
    object::{template::TemplateStore, GameObject},
    persist::{Persistable, StatePersister},
    rng::RngBank,
    types::{ObjectId, PlayerIndex, Vector3},
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: BTreeMap<ObjectId, GameObject>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: GameObject) {
        self.objects.insert(object.id(), object);
    }

    /// Removes an object for the duration of its update, or for good.
    pub fn take(&mut self, id: ObjectId) -> Option<GameObject> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.objects.values_mut()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TocEntry {
    name: String,
    id:   u16,
}

impl Persistable for TocEntry {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_ascii_string("Name", &mut self.name)?;
        p.persist_u16("Id", &mut self.id)
    }
}

/// Smallest encoding of one object in the stream: template id + segment length.
const MIN_OBJECT_BYTES: usize = 6;

pub struct GameLogic {
    pub clock:     LogicClock,
    pub objects:   ObjectTable,
    pub game_data: GameData,
    pub templates: TemplateStore,
    rng_bank:      RngBank,
    next_object_id: u32,
}

impl GameLogic {
    pub fn new(game_data: GameData, templates: TemplateStore, seed: u64) -> Self {
        Self {
            clock: LogicClock::new(game_data.frame_rate()),
            objects: ObjectTable::new(),
            game_data,
            templates,
            rng_bank: RngBank::new(seed),
            next_object_id: 1,
        }
    }

    pub fn frame(&self) -> LogicFrame {
        self.clock.current_frame
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.clock.frame_rate
    }

    pub fn rng_bank(&self) -> RngBank {
        self.rng_bank
    }

    pub fn next_object_id(&self) -> u32 {
        self.next_object_id
    }

    /// Builds a new object with a fresh id. It is not inserted and its
    /// create modules have not run.
    pub fn build_object(
        &mut self,
        template_name: &str,
        owner: PlayerIndex,
        position: Vector3,
    ) -> SimResult<GameObject> {
        let template = self.templates.get(template_name)?;
        let id = ObjectId(self.next_object_id);
        self.next_object_id = self
            .next_object_id
            .checked_add(1)
            .ok_or_else(|| SimError::InvalidConfig { reason: "object ids exhausted".to_string() })?;
        GameObject::from_template(id, template, owner, position, &self.game_data)
    }

    fn table_of_contents(&self) -> SimResult<Vec<TocEntry>> {
        let names: BTreeSet<&str> = self.objects.iter().map(|o| o.template_name()).collect();
        names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let id = u16::try_from(index + 1)
                    .map_err(|_| SimError::corrupt("ObjectTOC", "more than 65535 templates in use"))?;
                Ok(TocEntry { name: name.to_string(), id })
            })
            .collect()
    }

    fn read_objects(&mut self, p: &mut dyn StatePersister, toc: &[TocEntry]) -> SimResult<()> {
        let mut count = 0u32;
        p.persist_u32("ObjectCount", &mut count)?;
        if let Some(remaining) = p.remaining() {
            if (count as usize).saturating_mul(MIN_OBJECT_BYTES) > remaining {
                return Err(SimError::corrupt(
                    "ObjectCount",
                    format!("{count} objects cannot fit in {remaining} bytes"),
                ));
            }
        }

        self.objects.clear();
        p.begin_array("Objects")?;
        for _ in 0..count {
            let mut template_id = 0u16;
            p.persist_u16("TemplateId", &mut template_id)?;
            let name = toc
                .iter()
                .find(|e| e.id == template_id)
                .map(|e| e.name.as_str())
                .ok_or_else(|| SimError::corrupt("TemplateId", format!("{template_id} not in the table of contents")))?;
            let template = self.templates.get(name)?;

            let mut object =
                GameObject::from_template(ObjectId::INVALID, template, 0, Vector3::ZERO, &self.game_data)?;
            p.begin_segment("Object")?;
            object.persist(p)?;
            p.end_segment()?;

            let id = object.id();
            if !id.is_valid() || id.0 >= self.next_object_id {
                return Err(SimError::corrupt(
                    "ObjectId",
                    format!("{id} outside 1..{}", self.next_object_id),
                ));
            }
            if self.objects.contains(id) {
                return Err(SimError::corrupt("ObjectId", format!("{id} appears twice")));
            }
            log::debug!("Loaded object {id} ({name})");
            self.objects.insert(object);
        }
        p.end_array()
    }

    fn write_objects(&mut self, p: &mut dyn StatePersister, toc: &[TocEntry]) -> SimResult<()> {
        let mut count = u32::try_from(self.objects.len())
            .map_err(|_| SimError::corrupt("ObjectCount", "object count exceeds u32"))?;
        p.persist_u32("ObjectCount", &mut count)?;

        p.begin_array("Objects")?;
        for object in self.objects.iter_mut() {
            let mut template_id = toc
                .iter()
                .find(|e| e.name == object.template_name())
                .map(|e| e.id)
                .ok_or_else(|| SimError::UnknownTemplate { name: object.template_name().to_string() })?;
            p.persist_u16("TemplateId", &mut template_id)?;
            p.begin_segment("Object")?;
            object.persist(p)?;
            p.end_segment()?;
        }
        p.end_array()
    }
}

impl Persistable for GameLogic {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        let mut frame = self.clock.current_frame;
        p.persist_frame("Frame", &mut frame)?;
        p.persist_u32("NextObjectId", &mut self.next_object_id)?;
        let mut seed = self.rng_bank.master_seed();
        p.persist_u64("MasterSeed", &mut seed)?;

        let mut toc = if p.is_reading() { Vec::new() } else { self.table_of_contents()? };
        p.persist_list_u16("ObjectTOC", &mut toc, |p, entry| p.persist_object("Entry", entry))?;

        if p.is_reading() {
            if self.next_object_id == 0 {
                return Err(SimError::corrupt("NextObjectId", "0 is the invalid id"));
            }
            self.clock.set_frame(frame);
            self.rng_bank = RngBank::new(seed);
            self.read_objects(p, &toc)
        } else {
            self.write_objects(p, &toc)
        }
    }
}
