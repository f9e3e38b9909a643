//! Per-stream accumulator and the decoder seam

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::LlmError;
use crate::types::Usage;

/// What one native chunk contributes, normalized across families
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkDelta {
    /// Text fragment
    pub text: Option<String>,
    /// Tool call fragments
    pub tool_deltas: Vec<ToolDelta>,
    /// Tool calls the provider marked finished
    pub tool_stops: Vec<u32>,
    /// Native stop reason
    pub finish_reason: Option<String>,
    /// Usage report, possibly partial
    pub usage: Option<Usage>,
    /// Response identifier
    pub id: Option<String>,
    /// Model name
    pub model: Option<String>,
}

/// One fragment of a streamed tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDelta {
    /// Provider call index
    pub index: u32,
    /// Call identifier, usually on the first fragment only
    pub id: Option<String>,
    /// Tool name, usually on the first fragment only
    pub name: Option<String>,
    /// Argument JSON fragment
    pub arguments: String,
}

/// Argument buffer for one streamed tool call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolBuffer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
    pub completed: bool,
}

impl ToolBuffer {
    /// Identifier to report, falling back to the name for providers without ids
    pub fn call_id(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_default()
    }
}

/// Mutable accumulator owned by exactly one stream
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// Native chunks in arrival order
    pub chunks: Vec<Value>,
    /// Concatenated text
    pub text: String,
    /// Tool buffers keyed by provider index, in first-seen order
    pub tools: IndexMap<u32, ToolBuffer>,
    /// Latest stop reason
    pub finish_reason: Option<String>,
    /// Aggregated usage
    pub usage: Option<Usage>,
    pub id: Option<String>,
    pub model: Option<String>,
    /// Set once the transport stream is exhausted
    pub closed: bool,
}

impl StreamState {
    /// Fold a chunk in and return the indices of tool calls it completed
    ///
    /// A finish reason completes every open tool call. Fragments for an
    /// index that already completed are appended and reopen nothing.
    pub fn apply(&mut self, chunk: Value, delta: &ChunkDelta) -> Vec<u32> {
        self.chunks.push(chunk);

        if let Some(text) = &delta.text {
            self.text.push_str(text);
        }
        if delta.id.is_some() && self.id.is_none() {
            self.id.clone_from(&delta.id);
        }
        if delta.model.is_some() && self.model.is_none() {
            self.model.clone_from(&delta.model);
        }
        if let Some(usage) = &delta.usage {
            match &mut self.usage {
                Some(total) => total.merge(usage),
                None => self.usage = Some(*usage),
            }
        }

        for fragment in &delta.tool_deltas {
            let buffer = self.tools.entry(fragment.index).or_default();
            if buffer.id.is_none() {
                buffer.id.clone_from(&fragment.id);
            }
            if buffer.name.is_none() {
                buffer.name.clone_from(&fragment.name);
            }
            buffer.arguments.push_str(&fragment.arguments);
        }

        let mut completed = Vec::new();
        for index in &delta.tool_stops {
            if let Some(buffer) = self.tools.get_mut(index)
                && !buffer.completed
            {
                buffer.completed = true;
                completed.push(*index);
            }
        }

        if let Some(reason) = &delta.finish_reason {
            self.finish_reason = Some(reason.clone());
            completed.extend(self.complete_open());
        }

        completed
    }

    /// Mark the stream exhausted, completing whatever is still open
    pub fn close(&mut self) -> Vec<u32> {
        self.closed = true;
        self.complete_open()
    }

    fn complete_open(&mut self) -> Vec<u32> {
        self.tools
            .iter_mut()
            .filter(|(_, buffer)| !buffer.completed)
            .map(|(index, buffer)| {
                buffer.completed = true;
                *index
            })
            .collect()
    }

    /// Arguments decoded for a final response
    ///
    /// Malformed JSON stays a string so validation reports it later.
    pub fn arguments_value(buffer: &ToolBuffer) -> Value {
        if buffer.arguments.trim().is_empty() {
            return Value::Object(serde_json::Map::new());
        }
        serde_json::from_str(&buffer.arguments).unwrap_or_else(|_| Value::String(buffer.arguments.clone()))
    }
}

/// Family-specific reading of native stream chunks
pub trait ChunkDecoder: Send {
    /// Normalize one chunk
    fn decode(&mut self, chunk: &Value) -> Result<ChunkDelta, LlmError>;

    /// Native record for a completed tool call
    fn tool_record(&self, buffer: &ToolBuffer) -> Value;

    /// The non-streaming response equivalent to everything accumulated
    fn synthesize(&self, state: &StreamState) -> Value;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fragment(index: u32, id: Option<&str>, arguments: &str) -> ChunkDelta {
        ChunkDelta {
            tool_deltas: vec![ToolDelta {
                index,
                id: id.map(str::to_owned),
                name: id.map(|_| "get_book_author".to_owned()),
                arguments: arguments.to_owned(),
            }],
            ..ChunkDelta::default()
        }
    }

    #[test]
    fn split_arguments_reassemble() {
        let mut state = StreamState::default();
        state.apply(json!(1), &fragment(0, Some("call_1"), "{\"ti"));
        state.apply(json!(2), &fragment(0, None, "tle\": \"X\"}"));

        let completed = state.apply(
            json!(3),
            &ChunkDelta {
                finish_reason: Some("tool_calls".to_owned()),
                ..ChunkDelta::default()
            },
        );

        assert_eq!(completed, vec![0]);
        let buffer = &state.tools[&0];
        assert_eq!(StreamState::arguments_value(buffer), json!({"title": "X"}));
        assert_eq!(buffer.call_id(), "call_1");
        assert_eq!(state.chunks.len(), 3);
    }

    #[test]
    fn interleaved_indices_keep_separate_buffers() {
        let mut state = StreamState::default();
        state.apply(json!(1), &fragment(1, Some("b"), "{\"title\":"));
        state.apply(json!(2), &fragment(0, Some("a"), "{}"));
        state.apply(json!(3), &fragment(1, None, " \"Y\"}"));

        assert_eq!(state.tools.keys().copied().collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(StreamState::arguments_value(&state.tools[&1]), json!({"title": "Y"}));
        assert_eq!(state.close(), vec![1, 0]);
        assert!(state.closed);
    }

    #[test]
    fn stop_completes_only_known_open_indices() {
        let mut state = StreamState::default();
        state.apply(json!(1), &fragment(2, Some("c"), "{}"));

        let stop = ChunkDelta {
            tool_stops: vec![0, 2],
            ..ChunkDelta::default()
        };
        assert_eq!(state.apply(json!(2), &stop), vec![2]);
        assert!(state.apply(json!(3), &stop).is_empty());
        assert!(state.close().is_empty());
    }

    #[test]
    fn malformed_arguments_stay_text() {
        let buffer = ToolBuffer {
            arguments: "{\"title\": ".to_owned(),
            ..ToolBuffer::default()
        };
        assert_eq!(StreamState::arguments_value(&buffer), json!("{\"title\": "));
    }
}
