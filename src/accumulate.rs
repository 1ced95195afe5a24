//! Reassembly of streamed tool-call deltas into complete tool calls.

use tracing::warn;

use crate::types::{ToolCall, ToolCallDelta};

#[derive(Debug, Clone, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds index-tagged partial tool calls from a model stream.
///
/// The first delta for an index initializes its slot; later deltas overwrite
/// `name` when present and append `arguments` fragments. Slots keep arriving
/// in any interleaving, so state is a sparse array keyed by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: Vec<Option<PartialToolCall>>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into its slot.
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        if delta.index >= self.slots.len() {
            self.slots.resize(delta.index + 1, None);
        }
        let slot = self.slots[delta.index].get_or_insert_with(PartialToolCall::default);

        if let Some(ref id) = delta.id {
            if !id.is_empty() {
                slot.id = id.clone();
            }
        }
        if let Some(ref name) = delta.function.name {
            if !name.is_empty() {
                slot.name = name.clone();
            }
        }
        if let Some(ref fragment) = delta.function.arguments {
            slot.arguments.push_str(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Finalize into complete tool calls, in index order.
    ///
    /// Arguments that fail to parse as JSON are logged and forwarded as-is:
    /// executors own their argument validation, and dropping the call here
    /// would silently swallow a model request.
    pub fn finish(self) -> Vec<ToolCall> {
        self.slots
            .into_iter()
            .flatten()
            .map(|slot| {
                if !slot.arguments.is_empty() {
                    if let Err(err) = serde_json::from_str::<serde_json::Value>(&slot.arguments) {
                        warn!(
                            tool = %slot.name,
                            tool_call_id = %slot.id,
                            error = %err,
                            "tool-call arguments are not valid JSON; forwarding raw"
                        );
                    }
                }
                ToolCall::new(slot.id, slot.name, slot.arguments)
            })
            .collect()
    }
}
