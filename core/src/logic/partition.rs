//! Uniform-grid spatial index plus per-player shroud.
//!
//! The index is derived state: it is rebuilt from the object table after
//! every frame and after a load. Only the shroud is persisted.

use super::{terrain::HORIZONTAL_SCALE, ObjectTable};
use crate::{
    error::{SimError, SimResult},
    persist::{Persistable, StatePersister},
    types::{ObjectId, Vector3},
};
use std::collections::BTreeMap;

pub const SHROUD_HIDDEN: u8 = 0;
pub const SHROUD_FOGGED: u8 = 1;
pub const SHROUD_CLEAR: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq)]
struct PlayerShroud {
    cells: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionManager {
    cell_size: f32,
    columns:   u32,
    rows:      u32,
    cells:     BTreeMap<(u32, u32), Vec<ObjectId>>,
    positions: BTreeMap<ObjectId, Vector3>,
    shroud:    Vec<PlayerShroud>,
}

impl PartitionManager {
    /// `map_width`/`map_height` are in height-map samples.
    pub fn new(cell_size: f32, map_width: u32, map_height: u32) -> SimResult<Self> {
        if cell_size.is_nan() || cell_size <= 0.0 {
            return Err(SimError::InvalidConfig { reason: format!("partition cell size {cell_size}") });
        }
        let cells_for = |samples: u32| ((samples as f32 * HORIZONTAL_SCALE) / cell_size).ceil().max(1.0) as u32;
        Ok(Self {
            cell_size,
            columns: cells_for(map_width),
            rows: cells_for(map_height),
            cells: BTreeMap::new(),
            positions: BTreeMap::new(),
            shroud: Vec::new(),
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    fn cell_of(&self, x: f32, y: f32) -> (u32, u32) {
        let clamp = |v: f32, cells: u32| (v / self.cell_size).floor().clamp(0.0, cells.saturating_sub(1) as f32) as u32;
        (clamp(x, self.columns), clamp(y, self.rows))
    }

    /// Makes sure every player index below `count` has a shroud map.
    pub fn ensure_players(&mut self, count: usize) {
        let cells = self.cell_count();
        while self.shroud.len() < count {
            self.shroud.push(PlayerShroud { cells: vec![SHROUD_HIDDEN; cells] });
        }
    }

    pub fn shroud_at(&self, player: u32, position: Vector3) -> u8 {
        let (column, row) = self.cell_of(position.x, position.y);
        let index = row as usize * self.columns as usize + column as usize;
        self.shroud
            .get(player as usize)
            .and_then(|s| s.cells.get(index).copied())
            .unwrap_or(SHROUD_HIDDEN)
    }

    /// Rebuilds the grid from the objects' current positions. Destroyed
    /// objects are left out; each owner's cell is revealed.
    pub fn reindex(&mut self, objects: &ObjectTable) {
        self.cells.clear();
        self.positions.clear();
        let columns = self.columns as usize;
        for object in objects.iter() {
            if object.body.is_destroyed() {
                continue;
            }
            let id = object.id();
            let position = object.body.position;
            let cell = self.cell_of(position.x, position.y);
            self.cells.entry(cell).or_default().push(id);
            self.positions.insert(id, position);

            let index = cell.1 as usize * columns + cell.0 as usize;
            if let Some(shroud) = self.shroud.get_mut(object.body.owner as usize) {
                if let Some(value) = shroud.cells.get_mut(index) {
                    *value = SHROUD_CLEAR;
                }
            }
        }
    }

    pub fn position_of(&self, id: ObjectId) -> Option<Vector3> {
        self.positions.get(&id).copied()
    }

    /// Ids within `radius` (2D) of `position`, ascending.
    pub fn objects_near(&self, position: Vector3, radius: f32) -> Vec<ObjectId> {
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let (min_x, min_y) = self.cell_of(position.x - radius, position.y - radius);
        let (max_x, max_y) = self.cell_of(position.x + radius, position.y + radius);

        let mut found = Vec::new();
        for row in min_y..=max_y {
            for column in min_x..=max_x {
                let Some(ids) = self.cells.get(&(column, row)) else { continue };
                for &id in ids {
                    let within = self
                        .positions
                        .get(&id)
                        .is_some_and(|p| p.distance_2d(position) <= radius);
                    if within {
                        found.push(id);
                    }
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }
}

impl Persistable for PartitionManager {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_f32("CellSize", &mut self.cell_size)?;
        p.persist_u32("Columns", &mut self.columns)?;
        p.persist_u32("Rows", &mut self.rows)?;
        if p.is_reading() && (self.cell_size.is_nan() || self.cell_size <= 0.0) {
            return Err(SimError::corrupt("CellSize", format!("{}", self.cell_size)));
        }

        let cells = self.cell_count();
        p.persist_list_u16("PlayerShroud", &mut self.shroud, |p, shroud| {
            p.persist_list_u32("Cells", &mut shroud.cells, |p, cell| p.persist_u8("Cell", cell))
        })?;
        if p.is_reading() {
            for shroud in &self.shroud {
                if shroud.cells.len() != cells {
                    return Err(SimError::corrupt(
                        "PlayerShroud",
                        format!("{} cells for a {}x{} grid", shroud.cells.len(), self.columns, self.rows),
                    ));
                }
                if let Some(bad) = shroud.cells.iter().find(|&&c| c > SHROUD_CLEAR) {
                    return Err(SimError::corrupt("PlayerShroud", format!("shroud value {bad}")));
                }
            }
        }
        Ok(())
    }
}
