//! Concrete behavior modules, grouped by what they drive.

pub mod ai;
pub mod chinook;
pub mod docks;
pub mod draw;
pub mod lifecycle;
pub mod missile;
pub mod supply;
pub mod updates;
