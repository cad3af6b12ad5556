//! Binary StatePersister in Write mode.

use super::{PersistMode, ScopeKind, ScopeStack, StatePersister};
use crate::error::{SimError, SimResult};

/// Position of a segment's length placeholder in the buffer.
#[derive(Debug, Clone, Copy)]
struct PendingSegment {
    length_at: usize,
}

pub struct StateWriter {
    buffer: Vec<u8>,
    scopes: ScopeStack<PendingSegment>,
}

impl StateWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            scopes: ScopeStack::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the encoded bytes. Every scope must be closed.
    pub fn finish(self) -> SimResult<Vec<u8>> {
        if !self.scopes.is_empty() {
            return Err(SimError::ScopeMismatch {
                expected: "end of stream".to_string(),
                found:    format!("open scope '{}'", self.scopes.path()),
            });
        }
        Ok(self.buffer)
    }

    fn write_ascii(&mut self, name: &str, value: &str) -> SimResult<()> {
        if !value.is_ascii() {
            return Err(SimError::InvalidString {
                field:  name.to_string(),
                reason: "contains non-ASCII characters".to_string(),
            });
        }
        let length = u8::try_from(value.len()).map_err(|_| SimError::InvalidString {
            field:  name.to_string(),
            reason: format!("{} bytes exceed the 255 byte limit", value.len()),
        })?;
        self.buffer.push(length);
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }
}

impl Default for StateWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePersister for StateWriter {
    fn mode(&self) -> PersistMode {
        PersistMode::Write
    }

    fn scope_path(&self) -> String {
        self.scopes.path()
    }

    fn begin_object(&mut self, name: &str) -> SimResult<()> {
        self.scopes.push(ScopeKind::Object, name, None);
        Ok(())
    }

    fn end_object(&mut self) -> SimResult<()> {
        self.scopes.pop(ScopeKind::Object).map(|_| ())
    }

    fn begin_array(&mut self, name: &str) -> SimResult<()> {
        self.scopes.push(ScopeKind::Array, name, None);
        Ok(())
    }

    fn end_array(&mut self) -> SimResult<()> {
        self.scopes.pop(ScopeKind::Array).map(|_| ())
    }

    fn begin_segment(&mut self, name: &str) -> SimResult<u32> {
        let length_at = self.buffer.len();
        self.buffer.extend_from_slice(&0u32.to_le_bytes());
        self.scopes.push(ScopeKind::Segment, name, Some(PendingSegment { length_at }));
        Ok(0)
    }

    fn end_segment(&mut self) -> SimResult<()> {
        let scope = self.scopes.pop(ScopeKind::Segment)?;
        let Some(pending) = scope.segment else {
            return Err(SimError::ScopeMismatch {
                expected: "segment".to_string(),
                found:    scope.name,
            });
        };
        let body_start = pending.length_at + 4;
        let length = u32::try_from(self.buffer.len() - body_start).map_err(|_| {
            SimError::corrupt(&scope.name, "segment larger than 4 GiB")
        })?;
        self.buffer[pending.length_at..body_start].copy_from_slice(&length.to_le_bytes());
        Ok(())
    }

    fn persist_u8(&mut self, _name: &str, value: &mut u8) -> SimResult<()> {
        self.buffer.push(*value);
        Ok(())
    }

    fn persist_u16(&mut self, _name: &str, value: &mut u16) -> SimResult<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn persist_u32(&mut self, _name: &str, value: &mut u32) -> SimResult<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn persist_i32(&mut self, _name: &str, value: &mut i32) -> SimResult<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn persist_u64(&mut self, _name: &str, value: &mut u64) -> SimResult<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn persist_f32(&mut self, _name: &str, value: &mut f32) -> SimResult<()> {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn persist_ascii_string(&mut self, name: &str, value: &mut String) -> SimResult<()> {
        self.write_ascii(name, value)
    }

    fn persist_unicode_string(&mut self, name: &str, value: &mut String) -> SimResult<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let count = u8::try_from(units.len()).map_err(|_| SimError::InvalidString {
            field:  name.to_string(),
            reason: format!("{} UTF-16 units exceed the 255 unit limit", units.len()),
        })?;
        self.buffer.push(count);
        for unit in units {
            self.buffer.extend_from_slice(&unit.to_le_bytes());
        }
        Ok(())
    }

    fn skip_unknown_bytes(&mut self, count: usize) -> SimResult<()> {
        self.buffer.resize(self.buffer.len() + count, 0);
        Ok(())
    }
}
