//! Streaming tool-call reassembly
//!
//! Vendors deliver tool calls as fragments keyed by a stream index: a
//! start fragment carries the id and name, later fragments append raw
//! argument JSON. The accumulator reassembles them and flushes complete
//! calls at end of stream.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::sanitize::unwrap_value_wrapper;

/// One tool-call fragment as delivered by a vendor stream
#[derive(Debug, Clone, Default)]
pub struct ToolCallFragment {
    /// Stream index this fragment belongs to
    pub index: u32,
    /// Tool use ID (present on the seeding fragment only)
    pub id: Option<String>,
    /// Tool name (present on the seeding fragment only)
    pub name: Option<String>,
    /// Raw argument JSON fragment
    pub arguments: Option<String>,
}

/// A fully reassembled tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedToolCall {
    /// Tool use identifier
    pub id: String,
    /// Tool name
    pub name: String,
    /// Parsed arguments; the raw fragment text when parsing fails
    pub arguments: Value,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// In-progress tool calls for one stream, keyed by stream index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the matching entry
    pub fn push(&mut self, fragment: ToolCallFragment) {
        let entry = self.calls.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            entry.id = id;
        }
        if let Some(name) = fragment.name {
            entry.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    /// ID of the call at a stream index, once seeded
    pub fn id_for(&self, index: u32) -> Option<&str> {
        self.calls
            .get(&index)
            .map(|call| call.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Flush every complete call, in stream order
    ///
    /// Entries missing an id or name never became real calls and are
    /// discarded. Arguments are parsed as JSON with the value-wrapper
    /// heuristic applied; unparseable text passes through as a raw string.
    pub fn finish(&mut self) -> Vec<CompletedToolCall> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|call| !call.id.is_empty() && !call.name.is_empty())
            .map(|call| CompletedToolCall {
                id: call.id,
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            })
            .collect()
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(parsed) => unwrap_value_wrapper(parsed),
        Err(_) => Value::String(raw.to_owned()),
    }
}
