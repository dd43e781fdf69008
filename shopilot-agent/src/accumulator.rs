//! Reassembly of tool-call fragments scattered across stream chunks

use std::collections::HashMap;

use shopilot_copilot::{FunctionCall, ToolCallDelta};

/// Accumulates partial tool calls keyed by their stream-assigned index
///
/// Name and argument fragments concatenate onto whatever is already held for
/// that index; nothing is ever overwritten, so the result is independent of
/// how the upstream chunked the data. Lives for one completion round.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: HashMap<u32, FunctionCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the entry for its index
    pub fn absorb(&mut self, delta: &ToolCallDelta) {
        let entry = self
            .entries
            .entry(delta.index)
            .or_insert_with(|| FunctionCall {
                name: String::new(),
                arguments: String::new(),
            });

        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                entry.name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                entry.arguments.push_str(arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return all accumulated calls in ascending index order
    pub fn drain(&mut self) -> Vec<FunctionCall> {
        let mut indexed: Vec<(u32, FunctionCall)> = self.entries.drain().collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, call)| call).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopilot_copilot::FunctionCallDelta;

    fn fragment(index: u32, name: Option<&str>, arguments: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: None,
            function: Some(FunctionCallDelta {
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }),
        }
    }

    #[test]
    fn concatenates_fragments_in_arrival_order() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.absorb(&fragment(0, Some("get_release"), None));
        accumulator.absorb(&fragment(0, Some("_notes"), Some("{\"vers")));
        accumulator.absorb(&fragment(0, None, Some("ion\":\"6.5.3.0\"}")));

        let calls = accumulator.drain();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_release_notes");
        assert_eq!(calls[0].arguments, "{\"version\":\"6.5.3.0\"}");
    }

    #[test]
    fn result_is_invariant_under_rechunking() {
        let name = "get_store_extension";
        let arguments = "{\"name\":[\"SwagExample\"]}";

        let mut whole = ToolCallAccumulator::new();
        whole.absorb(&fragment(0, Some(name), Some(arguments)));

        let mut bytewise = ToolCallAccumulator::new();
        for ch in name.chars() {
            bytewise.absorb(&fragment(0, Some(&ch.to_string()), None));
        }
        for ch in arguments.chars() {
            bytewise.absorb(&fragment(0, None, Some(&ch.to_string())));
        }

        assert_eq!(whole.drain(), bytewise.drain());
    }

    #[test]
    fn interleaved_indices_stay_separate_and_drain_ascending() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.absorb(&fragment(1, Some("get_release_notes"), None));
        accumulator.absorb(&fragment(0, Some("get_shopware"), None));
        accumulator.absorb(&fragment(1, None, Some("{}")));
        accumulator.absorb(&fragment(0, Some("_versions"), None));

        let calls = accumulator.drain();
        assert_eq!(calls[0].name, "get_shopware_versions");
        assert_eq!(calls[1].name, "get_release_notes");
        assert_eq!(calls[1].arguments, "{}");
    }

    #[test]
    fn drain_empties_the_accumulator() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.absorb(&fragment(0, Some("get_shopware_versions"), None));

        assert!(!accumulator.is_empty());
        accumulator.drain();
        assert!(accumulator.is_empty());
        assert!(accumulator.drain().is_empty());
    }
}
