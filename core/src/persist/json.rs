//! Diagnostic StatePersister that renders a save as a JSON tree.
//!
//! Walks exactly the same call sequence as the binary writer, so a dump
//! shows field names and scopes in persisted order. Write-only.

use super::{PersistMode, ScopeKind, StatePersister};
use crate::error::{SimError, SimResult};
use serde_json::{Map, Value};

enum JsonFrame {
    Fields { kind: ScopeKind, name: String, fields: Map<String, Value> },
    Items  { name: String, items: Vec<Value> },
}

pub struct JsonStateWriter {
    stack: Vec<JsonFrame>,
}

impl JsonStateWriter {
    pub fn new() -> Self {
        Self {
            stack: vec![JsonFrame::Fields {
                kind:   ScopeKind::Object,
                name:   "root".to_string(),
                fields: Map::new(),
            }],
        }
    }

    pub fn finish(mut self) -> SimResult<Value> {
        match (self.stack.pop(), self.stack.is_empty()) {
            (Some(JsonFrame::Fields { fields, .. }), true) => Ok(Value::Object(fields)),
            _ => Err(SimError::ScopeMismatch {
                expected: "end of stream".to_string(),
                found:    "open scope".to_string(),
            }),
        }
    }

    fn insert(&mut self, name: &str, value: Value) {
        match self.stack.last_mut() {
            Some(JsonFrame::Fields { fields, .. }) => {
                let mut key = name.to_string();
                let mut suffix = 2;
                while fields.contains_key(&key) {
                    key = format!("{name}_{suffix}");
                    suffix += 1;
                }
                fields.insert(key, value);
            }
            Some(JsonFrame::Items { items, .. }) => items.push(value),
            None => {}
        }
    }

    fn open_fields(&mut self, kind: ScopeKind, name: &str) {
        self.stack.push(JsonFrame::Fields {
            kind,
            name: name.to_string(),
            fields: Map::new(),
        });
    }

    fn close_fields(&mut self, expected: ScopeKind) -> SimResult<()> {
        match self.stack.pop() {
            Some(JsonFrame::Fields { kind, name, fields }) if kind == expected && !self.stack.is_empty() => {
                self.insert(&name, Value::Object(fields));
                Ok(())
            }
            other => {
                let found = match &other {
                    Some(JsonFrame::Fields { name, .. }) | Some(JsonFrame::Items { name, .. }) => name.clone(),
                    None => "no open scope".to_string(),
                };
                if let Some(frame) = other {
                    self.stack.push(frame);
                }
                Err(SimError::ScopeMismatch { expected: format!("{expected:?}"), found })
            }
        }
    }
}

impl Default for JsonStateWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePersister for JsonStateWriter {
    fn mode(&self) -> PersistMode {
        PersistMode::Write
    }

    fn scope_path(&self) -> String {
        let names: Vec<&str> = self
            .stack
            .iter()
            .map(|f| match f {
                JsonFrame::Fields { name, .. } | JsonFrame::Items { name, .. } => name.as_str(),
            })
            .collect();
        names.join("/")
    }

    fn begin_object(&mut self, name: &str) -> SimResult<()> {
        self.open_fields(ScopeKind::Object, name);
        Ok(())
    }

    fn end_object(&mut self) -> SimResult<()> {
        self.close_fields(ScopeKind::Object)
    }

    fn begin_array(&mut self, name: &str) -> SimResult<()> {
        self.stack.push(JsonFrame::Items {
            name:  name.to_string(),
            items: Vec::new(),
        });
        Ok(())
    }

    fn end_array(&mut self) -> SimResult<()> {
        match self.stack.pop() {
            Some(JsonFrame::Items { name, items }) => {
                self.insert(&name, Value::Array(items));
                Ok(())
            }
            Some(frame) => {
                self.stack.push(frame);
                Err(SimError::ScopeMismatch {
                    expected: "Array".to_string(),
                    found:    self.scope_path(),
                })
            }
            None => Err(SimError::ScopeMismatch {
                expected: "Array".to_string(),
                found:    "no open scope".to_string(),
            }),
        }
    }

    fn begin_segment(&mut self, name: &str) -> SimResult<u32> {
        self.open_fields(ScopeKind::Segment, name);
        Ok(0)
    }

    fn end_segment(&mut self) -> SimResult<()> {
        self.close_fields(ScopeKind::Segment)
    }

    fn persist_u8(&mut self, name: &str, value: &mut u8) -> SimResult<()> {
        self.insert(name, Value::from(*value));
        Ok(())
    }

    fn persist_u16(&mut self, name: &str, value: &mut u16) -> SimResult<()> {
        self.insert(name, Value::from(*value));
        Ok(())
    }

    fn persist_u32(&mut self, name: &str, value: &mut u32) -> SimResult<()> {
        self.insert(name, Value::from(*value));
        Ok(())
    }

    fn persist_i32(&mut self, name: &str, value: &mut i32) -> SimResult<()> {
        self.insert(name, Value::from(*value));
        Ok(())
    }

    fn persist_u64(&mut self, name: &str, value: &mut u64) -> SimResult<()> {
        self.insert(name, Value::from(*value));
        Ok(())
    }

    fn persist_f32(&mut self, name: &str, value: &mut f32) -> SimResult<()> {
        self.insert(name, Value::from(f64::from(*value)));
        Ok(())
    }

    fn persist_bool(&mut self, name: &str, value: &mut bool) -> SimResult<()> {
        self.insert(name, Value::Bool(*value));
        Ok(())
    }

    fn persist_ascii_string(&mut self, name: &str, value: &mut String) -> SimResult<()> {
        self.insert(name, Value::String(value.clone()));
        Ok(())
    }

    fn persist_unicode_string(&mut self, name: &str, value: &mut String) -> SimResult<()> {
        self.insert(name, Value::String(value.clone()));
        Ok(())
    }

    fn skip_unknown_bytes(&mut self, count: usize) -> SimResult<()> {
        self.insert("SkippedBytes", Value::from(count));
        Ok(())
    }
}
