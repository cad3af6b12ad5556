//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical run identifier (one per engine instance / event log).
pub type RunId = String;

/// Index of a player in the PlayerManager's list.
pub type PlayerIndex = u32;

/// Stable identifier of a game object.
///
/// Objects refer to each other only through ids. An id is persisted as a
/// plain integer and resolved against the ObjectTable after load, so
/// cyclic references (A targets B, B targets A) never become ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const INVALID: ObjectId = ObjectId(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }

    /// Ground-plane distance; height is ignored.
    pub fn distance_2d(self, other: Vector3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn distance(self, other: Vector3) -> f32 {
        let dz = other.z - self.z;
        let d2 = self.distance_2d(other);
        (d2 * d2 + dz * dz).sqrt()
    }

    /// Moves from `self` toward `target` by at most `step` units.
    /// Lands exactly on `target` once it is within reach.
    pub fn step_toward(self, target: Vector3, step: f32) -> Vector3 {
        let remaining = self.distance(target);
        if remaining <= step || remaining == 0.0 {
            return target;
        }
        let t = step / remaining;
        Vector3::new(
            self.x + (target.x - self.x) * t,
            self.y + (target.y - self.y) * t,
            self.z + (target.z - self.z) * t,
        )
    }

    pub fn lerp(self, target: Vector3, t: f32) -> Vector3 {
        Vector3::new(
            self.x + (target.x - self.x) * t,
            self.y + (target.y - self.y) * t,
            self.z + (target.z - self.z) * t,
        )
    }
}

/// RGBA color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorRgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorRgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// A fraction where 1.0 means 100%.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Percentage(pub f32);

impl Percentage {
    pub fn from_percent(percent: f32) -> Self {
        Self(percent / 100.0)
    }

    pub fn fraction(self) -> f32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_toward_lands_exactly_on_target() {
        let from = Vector3::new(0.0, 0.0, 0.0);
        let to = Vector3::new(3.0, 4.0, 0.0);
        assert!((from.step_toward(to, 2.0).distance_2d(from) - 2.0).abs() < 1e-5);
        assert_eq!(from.step_toward(to, 5.0), to);
        assert_eq!(from.step_toward(to, 100.0), to);
    }

    #[test]
    fn invalid_object_id_is_zero() {
        assert!(!ObjectId::INVALID.is_valid());
        assert!(ObjectId(7).is_valid());
        assert_eq!(ObjectId(7).to_string(), "#7");
    }
}
