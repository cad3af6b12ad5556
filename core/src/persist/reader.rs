//! Binary StatePersister in Read mode.
//!
//! Segments bound every read: consuming past a segment's declared end is
//! fatal, while stopping short of it skips the remainder with a warning
//! so newer writers can append fields.

use super::{PersistMode, ScopeKind, ScopeStack, StatePersister};
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy)]
struct SegmentBounds {
    end:      usize,
    declared: u32,
}

pub struct StateReader<'a> {
    data:     &'a [u8],
    position: usize,
    scopes:   ScopeStack<SegmentBounds>,
}

impl<'a> StateReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            scopes: ScopeStack::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.limit()
    }

    /// End of the innermost segment, or of the whole stream.
    fn limit(&self) -> usize {
        self.scopes
            .innermost_segment()
            .and_then(|s| s.segment)
            .map(|b| b.end)
            .unwrap_or(self.data.len())
    }

    fn take(&mut self, field: &str, count: usize) -> SimResult<&'a [u8]> {
        let end = self.position.saturating_add(count);
        if let Some(scope) = self.scopes.innermost_segment() {
            if let Some(bounds) = scope.segment {
                if end > bounds.end {
                    return Err(SimError::SegmentOverrun {
                        segment:  scope.name.clone(),
                        declared: bounds.declared,
                    });
                }
            }
        }
        if end > self.data.len() {
            return Err(SimError::UnexpectedEof {
                field:  field.to_string(),
                offset: self.position,
                needed: count,
            });
        }
        let data = self.data;
        let bytes = &data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self, field: &str) -> SimResult<[u8; N]> {
        let bytes = self.take(field, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

impl<'a> StatePersister for StateReader<'a> {
    fn mode(&self) -> PersistMode {
        PersistMode::Read
    }

    fn scope_path(&self) -> String {
        self.scopes.path()
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.limit().saturating_sub(self.position))
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
        let declared = u32::from_le_bytes(self.take_array::<4>(name)?);
        let end = self.position.saturating_add(declared as usize);
        if end > self.limit() {
            return Err(SimError::SegmentOverrun {
                segment: name.to_string(),
                declared,
            });
        }
        self.scopes.push(ScopeKind::Segment, name, Some(SegmentBounds { end, declared }));
        Ok(declared)
    }

    fn end_segment(&mut self) -> SimResult<()> {
        let scope = self.scopes.pop(ScopeKind::Segment)?;
        let Some(bounds) = scope.segment else {
            return Err(SimError::ScopeMismatch {
                expected: "segment".to_string(),
                found:    scope.name,
            });
        };
        if self.position < bounds.end {
            log::warn!(
                "Segment '{}' left {} of {} bytes unread; skipping",
                scope.name,
                bounds.end - self.position,
                bounds.declared
            );
            self.position = bounds.end;
        }
        Ok(())
    }

    fn persist_u8(&mut self, name: &str, value: &mut u8) -> SimResult<()> {
        *value = self.take_array::<1>(name)?[0];
        Ok(())
    }

    fn persist_u16(&mut self, name: &str, value: &mut u16) -> SimResult<()> {
        *value = u16::from_le_bytes(self.take_array(name)?);
        Ok(())
    }

    fn persist_u32(&mut self, name: &str, value: &mut u32) -> SimResult<()> {
        *value = u32::from_le_bytes(self.take_array(name)?);
        Ok(())
    }

    fn persist_i32(&mut self, name: &str, value: &mut i32) -> SimResult<()> {
        *value = i32::from_le_bytes(self.take_array(name)?);
        Ok(())
    }

    fn persist_u64(&mut self, name: &str, value: &mut u64) -> SimResult<()> {
        *value = u64::from_le_bytes(self.take_array(name)?);
        Ok(())
    }

    fn persist_f32(&mut self, name: &str, value: &mut f32) -> SimResult<()> {
        *value = f32::from_le_bytes(self.take_array(name)?);
        Ok(())
    }

    fn persist_ascii_string(&mut self, name: &str, value: &mut String) -> SimResult<()> {
        let length = self.take_array::<1>(name)?[0] as usize;
        let bytes = self.take(name, length)?;
        if !bytes.is_ascii() {
            return Err(SimError::InvalidString {
                field:  name.to_string(),
                reason: "contains non-ASCII bytes".to_string(),
            });
        }
        *value = bytes.iter().map(|&b| char::from(b)).collect();
        Ok(())
    }

    fn persist_unicode_string(&mut self, name: &str, value: &mut String) -> SimResult<()> {
        let count = self.take_array::<1>(name)?[0] as usize;
        let bytes = self.take(name, count * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        *value = String::from_utf16(&units).map_err(|e| SimError::InvalidString {
            field:  name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn skip_unknown_bytes(&mut self, count: usize) -> SimResult<()> {
        self.take("UnknownBytes", count).map(|_| ())
    }
}
