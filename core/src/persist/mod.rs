//! Symmetric state persistence.
//!
//! RULE: Every persisted type has exactly one `persist` function, and the
//! same call sequence both writes and reads it. Values are passed by
//! `&mut`: in Write mode they are emitted, in Read mode overwritten.
//! The only branch point is `mode()`, used for version guards and for
//! post-read validation.
//!
//! Binary encoding (StateWriter / StateReader), little-endian:
//!   - version:        u8
//!   - bool:           u8, 0 or 1 (anything else is corrupt)
//!   - ascii string:   u8 byte length + bytes
//!   - unicode string: u8 UTF-16 unit count + UTF-16LE units
//!   - segment:        u32 byte length + body
//!   - object / array scopes carry no bytes

pub mod json;
pub mod reader;
pub mod writer;

pub use json::JsonStateWriter;
pub use reader::StateReader;
pub use writer::StateWriter;

use crate::{
    clock::{LogicFrame, LogicFrameSpan},
    error::{SimError, SimResult},
    types::{ColorRgba, ObjectId, Percentage, Vector2, Vector3},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    Read,
    Write,
}

/// A value that can travel through a StatePersister.
pub trait Persistable {
    fn persist(&mut self, p: &mut dyn StatePersister) -> SimResult<()>;
}

/// Enums persisted as their u32 discriminant.
pub trait PersistEnum: Sized + Copy {
    fn to_raw(self) -> u32;
    fn from_raw(raw: u32) -> Option<Self>;
}

pub trait StatePersister {
    fn mode(&self) -> PersistMode;

    /// Slash-separated names of the open scopes, for error messages.
    fn scope_path(&self) -> String;

    /// Bytes left in the innermost segment (or the stream) when reading.
    fn remaining(&self) -> Option<usize> {
        None
    }

    fn begin_object(&mut self, name: &str) -> SimResult<()>;
    fn end_object(&mut self) -> SimResult<()>;
    fn begin_array(&mut self, name: &str) -> SimResult<()>;
    fn end_array(&mut self) -> SimResult<()>;

    /// Opens a length-prefixed region and returns its declared length
    /// (always 0 while writing; the length is patched on `end_segment`).
    fn begin_segment(&mut self, name: &str) -> SimResult<u32>;
    fn end_segment(&mut self) -> SimResult<()>;

    fn persist_u8(&mut self, name: &str, value: &mut u8) -> SimResult<()>;
    fn persist_u16(&mut self, name: &str, value: &mut u16) -> SimResult<()>;
    fn persist_u32(&mut self, name: &str, value: &mut u32) -> SimResult<()>;
    fn persist_i32(&mut self, name: &str, value: &mut i32) -> SimResult<()>;
    fn persist_u64(&mut self, name: &str, value: &mut u64) -> SimResult<()>;
    fn persist_f32(&mut self, name: &str, value: &mut f32) -> SimResult<()>;
    fn persist_ascii_string(&mut self, name: &str, value: &mut String) -> SimResult<()>;
    fn persist_unicode_string(&mut self, name: &str, value: &mut String) -> SimResult<()>;

    /// Legacy padding of unknown meaning: zeros on write, skipped on read.
    fn skip_unknown_bytes(&mut self, count: usize) -> SimResult<()>;

    // ── Provided ───────────────────────────────────────────────

    fn is_reading(&self) -> bool {
        self.mode() == PersistMode::Read
    }

    /// Writes `max`; on read returns the stored version and rejects
    /// anything newer than `max`.
    fn persist_version(&mut self, max: u8) -> SimResult<u8> {
        let mut version = max;
        self.persist_u8("Version", &mut version)?;
        if version > max {
            return Err(SimError::VersionTooNew {
                context: self.scope_path(),
                found: version,
                max,
            });
        }
        Ok(version)
    }

    fn persist_bool(&mut self, name: &str, value: &mut bool) -> SimResult<()> {
        let mut raw = u8::from(*value);
        self.persist_u8(name, &mut raw)?;
        *value = match raw {
            0 => false,
            1 => true,
            other => return Err(SimError::corrupt(name, format!("boolean byte {other}"))),
        };
        Ok(())
    }

    fn persist_i16(&mut self, name: &str, value: &mut i16) -> SimResult<()> {
        let mut raw = *value as u16;
        self.persist_u16(name, &mut raw)?;
        *value = raw as i16;
        Ok(())
    }

    fn persist_object_id(&mut self, name: &str, value: &mut ObjectId) -> SimResult<()> {
        self.persist_u32(name, &mut value.0)
    }

    fn persist_frame(&mut self, name: &str, value: &mut LogicFrame) -> SimResult<()> {
        self.persist_u32(name, &mut value.0)
    }

    fn persist_frame_span(&mut self, name: &str, value: &mut LogicFrameSpan) -> SimResult<()> {
        self.persist_u32(name, &mut value.0)
    }

    fn persist_percentage(&mut self, name: &str, value: &mut Percentage) -> SimResult<()> {
        self.persist_f32(name, &mut value.0)
    }

    fn persist_vector2(&mut self, name: &str, value: &mut Vector2) -> SimResult<()> {
        self.begin_object(name)?;
        self.persist_f32("X", &mut value.x)?;
        self.persist_f32("Y", &mut value.y)?;
        self.end_object()
    }

    fn persist_vector3(&mut self, name: &str, value: &mut Vector3) -> SimResult<()> {
        self.begin_object(name)?;
        self.persist_f32("X", &mut value.x)?;
        self.persist_f32("Y", &mut value.y)?;
        self.persist_f32("Z", &mut value.z)?;
        self.end_object()
    }

    fn persist_color(&mut self, name: &str, value: &mut ColorRgba) -> SimResult<()> {
        self.begin_object(name)?;
        self.persist_u8("R", &mut value.r)?;
        self.persist_u8("G", &mut value.g)?;
        self.persist_u8("B", &mut value.b)?;
        self.persist_u8("A", &mut value.a)?;
        self.end_object()
    }

    fn persist_sentinel_i32(&mut self, name: &str, expected: i32) -> SimResult<()> {
        let mut value = expected;
        self.persist_i32(name, &mut value)?;
        if value != expected {
            return Err(SimError::corrupt(name, format!("expected {expected}, found {value}")));
        }
        Ok(())
    }

    fn persist_sentinel_f32(&mut self, name: &str, expected: f32) -> SimResult<()> {
        let mut value = expected;
        self.persist_f32(name, &mut value)?;
        if value != expected {
            return Err(SimError::corrupt(name, format!("expected {expected}, found {value}")));
        }
        Ok(())
    }

    fn persist_sentinel_bool(&mut self, name: &str, expected: bool) -> SimResult<()> {
        let mut value = expected;
        self.persist_bool(name, &mut value)?;
        if value != expected {
            return Err(SimError::corrupt(name, format!("expected {expected}, found {value}")));
        }
        Ok(())
    }
}

/// Width of the element count written before a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountWidth {
    Byte,
    U16,
    U32,
}

impl<'a> dyn StatePersister + 'a {
    pub fn persist_enum<E: PersistEnum>(&mut self, name: &str, value: &mut E) -> SimResult<()> {
        let mut raw = value.to_raw();
        self.persist_u32(name, &mut raw)?;
        *value = E::from_raw(raw)
            .ok_or_else(|| SimError::corrupt(name, format!("no variant with value {raw}")))?;
        Ok(())
    }

    pub fn persist_object<T: Persistable + ?Sized>(&mut self, name: &str, value: &mut T) -> SimResult<()> {
        self.begin_object(name)?;
        value.persist(self)?;
        self.end_object()
    }

    /// The family delegation step: `Base` scope around the parent record.
    pub fn persist_base<T: Persistable + ?Sized>(&mut self, base: &mut T) -> SimResult<()> {
        self.persist_object("Base", base)
    }

    /// Fixed-size array; the length is not persisted.
    pub fn persist_array<T>(
        &mut self,
        name: &str,
        items: &mut [T],
        mut persist_item: impl FnMut(&mut dyn StatePersister, &mut T) -> SimResult<()>,
    ) -> SimResult<()> {
        self.begin_array(name)?;
        for item in items.iter_mut() {
            persist_item(self, item)?;
        }
        self.end_array()
    }

    pub fn persist_list_u16<T: Default>(
        &mut self,
        name: &str,
        items: &mut Vec<T>,
        persist_item: impl FnMut(&mut dyn StatePersister, &mut T) -> SimResult<()>,
    ) -> SimResult<()> {
        self.persist_counted(name, CountWidth::U16, items, persist_item)
    }

    pub fn persist_list_u32<T: Default>(
        &mut self,
        name: &str,
        items: &mut Vec<T>,
        persist_item: impl FnMut(&mut dyn StatePersister, &mut T) -> SimResult<()>,
    ) -> SimResult<()> {
        self.persist_counted(name, CountWidth::U32, items, persist_item)
    }

    /// Single-byte count prefix.
    pub fn persist_list_with_byte_count<T: Default>(
        &mut self,
        name: &str,
        items: &mut Vec<T>,
        persist_item: impl FnMut(&mut dyn StatePersister, &mut T) -> SimResult<()>,
    ) -> SimResult<()> {
        self.persist_counted(name, CountWidth::Byte, items, persist_item)
    }

    fn persist_counted<T: Default>(
        &mut self,
        name: &str,
        width: CountWidth,
        items: &mut Vec<T>,
        mut persist_item: impl FnMut(&mut dyn StatePersister, &mut T) -> SimResult<()>,
    ) -> SimResult<()> {
        let too_long = || SimError::corrupt(name, format!("{} items do not fit a {width:?} count", items.len()));
        let count = match width {
            CountWidth::Byte => {
                let mut count = u8::try_from(items.len()).map_err(|_| too_long())?;
                self.persist_u8("Count", &mut count)?;
                usize::from(count)
            }
            CountWidth::U16 => {
                let mut count = u16::try_from(items.len()).map_err(|_| too_long())?;
                self.persist_u16("Count", &mut count)?;
                usize::from(count)
            }
            CountWidth::U32 => {
                let mut count = u32::try_from(items.len()).map_err(|_| too_long())?;
                self.persist_u32("Count", &mut count)?;
                count as usize
            }
        };

        if self.is_reading() {
            if let Some(remaining) = self.remaining() {
                if count > remaining {
                    return Err(SimError::corrupt(
                        name,
                        format!("count {count} exceeds the {remaining} bytes left"),
                    ));
                }
            }
            items.clear();
            items.resize_with(count, T::default);
        }

        self.begin_array(name)?;
        for item in items.iter_mut() {
            persist_item(self, item)?;
        }
        self.end_array()
    }
}

// ── Scope tracking shared by the implementations ───────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Object,
    Array,
    Segment,
}

#[derive(Debug)]
pub(crate) struct Scope<S> {
    pub kind:    ScopeKind,
    pub name:    String,
    pub segment: Option<S>,
}

#[derive(Debug)]
pub(crate) struct ScopeStack<S> {
    scopes: Vec<Scope<S>>,
}

impl<S> ScopeStack<S> {
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    pub fn push(&mut self, kind: ScopeKind, name: &str, segment: Option<S>) {
        self.scopes.push(Scope { kind, name: name.to_string(), segment });
    }

    pub fn pop(&mut self, kind: ScopeKind) -> SimResult<Scope<S>> {
        match self.scopes.pop() {
            Some(scope) if scope.kind == kind => Ok(scope),
            Some(scope) => Err(SimError::ScopeMismatch {
                expected: format!("{kind:?}"),
                found:    format!("{:?} '{}'", scope.kind, scope.name),
            }),
            None => Err(SimError::ScopeMismatch {
                expected: format!("{kind:?}"),
                found:    "no open scope".to_string(),
            }),
        }
    }

    pub fn innermost_segment(&self) -> Option<&Scope<S>> {
        self.scopes.iter().rev().find(|s| s.kind == ScopeKind::Segment)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn path(&self) -> String {
        let names: Vec<&str> = self.scopes.iter().map(|s| s.name.as_str()).collect();
        names.join("/")
    }
}
