//! Logical height field. The mesh belongs to the renderer; logic only
//! needs heights for ground clamping and projectile impact checks.

use crate::{
    error::{SimError, SimResult},
    persist::{Persistable, StatePersister},
};

/// World units per height-map cell.
pub const HORIZONTAL_SCALE: f32 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaterArea {
    pub id:     u32,
    pub height: f32,
}

impl Persistable for WaterArea {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_u32("Id", &mut self.id)?;
        p.persist_f32("Height", &mut self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerrainLogic {
    width:          u32,
    height:         u32,
    vertical_scale: f32,
    /// Row-major, `width * height` samples.
    elevations:     Vec<u16>,
    water:          Vec<WaterArea>,
}

impl TerrainLogic {
    pub fn flat(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vertical_scale: 0.625,
            elevations: vec![0; width as usize * height as usize],
            water: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn water_areas(&self) -> &[WaterArea] {
        &self.water
    }

    pub fn set_water_area(&mut self, id: u32, height: f32) {
        match self.water.iter_mut().find(|w| w.id == id) {
            Some(area) => area.height = height,
            None => self.water.push(WaterArea { id, height }),
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Height of one sample; zero outside the map.
    pub fn sample(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.elevations.get(self.index(x, y)).map_or(0.0, |&e| f32::from(e) * self.vertical_scale)
    }

    pub fn set_sample(&mut self, x: u32, y: u32, elevation: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = self.index(x, y);
        self.elevations[index] = (elevation / self.vertical_scale).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    }

    /// Lowers a sample to `elevation` if it is currently higher; never raises.
    pub fn lower_height(&mut self, x: u32, y: u32, elevation: f32) {
        if elevation < self.sample(x, y) {
            self.set_sample(x, y, elevation);
        }
    }

    /// Splits a world coordinate into the two neighbouring sample indices
    /// and the fraction between them, clamped to the map.
    fn cell(&self, p: f32, samples: u32) -> (u32, u32, f32) {
        let last = samples.saturating_sub(1) as f32;
        let p = (p / HORIZONTAL_SCALE).clamp(0.0, last);
        let p0 = p.floor();
        let p1 = (p0 + 1.0).min(last);
        (p0 as u32, p1 as u32, p - p0)
    }

    /// Bilinear height at a world position.
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let (x0, x1, fx) = self.cell(x, self.width);
        let (y0, y1, fy) = self.cell(y, self.height);

        let f0 = self.sample(x0, y0);
        let f1 = self.sample(x1, y0);
        let f2 = self.sample(x0, y1);
        let f3 = self.sample(x1, y1);

        let low = f1 * fx + f0 * (1.0 - fx);
        let high = f3 * fx + f2 * (1.0 - fx);
        high * fy + low * (1.0 - fy)
    }
}

impl Persistable for TerrainLogic {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()> {
        p.persist_version(1)?;
        p.persist_u32("Width", &mut self.width)?;
        p.persist_u32("Height", &mut self.height)?;
        p.persist_f32("VerticalScale", &mut self.vertical_scale)?;

        if p.is_reading() {
            if self.vertical_scale.is_nan() || self.vertical_scale <= 0.0 {
                return Err(SimError::corrupt("VerticalScale", format!("{}", self.vertical_scale)));
            }
            let samples = (self.width as usize)
                .checked_mul(self.height as usize)
                .ok_or_else(|| SimError::corrupt("Width", "height map size overflows"))?;
            if let Some(remaining) = p.remaining() {
                if samples.saturating_mul(2) > remaining {
                    return Err(SimError::corrupt(
                        "Elevations",
                        format!("{}x{} samples exceed the {remaining} bytes left", self.width, self.height),
                    ));
                }
            }
            self.elevations = vec![0; samples];
        }
        p.persist_array("Elevations", &mut self.elevations, |p, e| p.persist_u16("Elevation", e))?;
        p.persist_list_u16("WaterAreas", &mut self.water, |p, w| p.persist_object("WaterArea", w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_interpolated_between_samples() {
        let mut terrain = TerrainLogic::flat(4, 4);
        terrain.set_sample(1, 0, 10.0);
        let mid = terrain.height_at(HORIZONTAL_SCALE * 0.5, 0.0);
        assert!((mid - 5.0).abs() < 0.01, "expected ~5.0, got {mid}");
    }

    #[test]
    fn lower_height_never_raises() {
        let mut terrain = TerrainLogic::flat(2, 2);
        terrain.set_sample(0, 0, 5.0);
        terrain.lower_height(0, 0, 20.0);
        assert_eq!(terrain.sample(0, 0), 5.0);
        terrain.lower_height(0, 0, 0.0);
        assert_eq!(terrain.sample(0, 0), 0.0);
    }
}
