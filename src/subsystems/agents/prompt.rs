//! Layered prompt builder for agents.
//!
//! Fragments are appended in order and joined with blank lines.  Variable
//! substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;

use crate::supervisor::bus::CapabilityDescriptor;

const SEPARATOR: &str = "\n\n";

#[derive(Debug, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text fragment. Blank fragments are skipped.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Append one `name: description` line per tool, and bind
    /// `{{tool_names}}` to the comma-separated names.
    pub fn with_tools(mut self, tools: &[CapabilityDescriptor]) -> Self {
        let listing = if tools.is_empty() {
            "(no tools available)".to_string()
        } else {
            tools
                .iter()
                .map(|t| format!("{}: {}", t.name, t.description))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let names = tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");
        self.parts.push(listing);
        self.vars.insert("tool_names".into(), names);
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all layers and apply variable substitution.
    pub fn build(self) -> String {
        let mut prompt = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            let placeholder = format!("{{{{{k}}}}}");
            prompt = prompt.replace(&placeholder, v);
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_join_and_vars_substitute() {
        let tools = vec![
            CapabilityDescriptor { name: "terminal".into(), description: "runs commands".into() },
            CapabilityDescriptor { name: "read_file".into(), description: "reads files".into() },
        ];
        let prompt = PromptBuilder::new()
            .append("  header  ")
            .append("")
            .with_tools(&tools)
            .append("Pick one of [{{tool_names}}]. Q: {{input}}")
            .var("input", "why?")
            .build();
        assert_eq!(
            prompt,
            "header\n\nterminal: runs commands\nread_file: reads files\n\nPick one of [terminal, read_file]. Q: why?"
        );
    }

    #[test]
    fn empty_tool_list_is_stated() {
        let prompt = PromptBuilder::new().with_tools(&[]).append("[{{tool_names}}]").build();
        assert_eq!(prompt, "(no tools available)\n\n[]");
    }
}
