//! The fixed capability catalog.
//!
//! `Capability` is an enum over the concrete tools, dispatched the same way
//! as `LlmProvider`: a new tool is a new module, variant and match arm.

use crate::core::config::ToolsConfig;
use crate::supervisor::bus::CapabilityDescriptor;

use super::automation::AutomationTool;
#[cfg(feature = "tool-code-qa")]
use super::code_qa::CodeQaTool;
use super::context::ToolContext;
use super::database::DatabaseTool;
use super::error::ToolError;
use super::files::{ReadFileTool, WriteFileTool};
use super::terminal::TerminalTool;

/// Every tool name the service knows, enabled or not.
pub const KNOWN_TOOLS: &[&str] =
    &["database", "terminal", "write_file", "read_file", "automation", "code_qa"];

#[derive(Clone)]
pub enum Capability {
    Database(DatabaseTool),
    Terminal(TerminalTool),
    WriteFile(WriteFileTool),
    ReadFile(ReadFileTool),
    Automation(AutomationTool),
    #[cfg(feature = "tool-code-qa")]
    CodeQa(CodeQaTool),
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Database(_) => "database",
            Capability::Terminal(_) => "terminal",
            Capability::WriteFile(_) => "write_file",
            Capability::ReadFile(_) => "read_file",
            Capability::Automation(_) => "automation",
            #[cfg(feature = "tool-code-qa")]
            Capability::CodeQa(_) => "code_qa",
        }
    }

    /// Guidance shown to the agent loop: when to call, and the input shape.
    pub fn description(&self) -> &'static str {
        match self {
            Capability::Database(_) => {
                "Only call this to execute SQL queries: looking up or recording projects, tasks, \
                 users, decisions, etc. Input is a string: one SQLite statement or a plain-language \
                 request."
            }
            Capability::Terminal(_) => {
                "Only call this if the user asks to execute terminal commands. Input is a string \
                 with the command line."
            }
            Capability::WriteFile(_) => {
                "Only call this if the user asks to create a new file or script. Input is a JSON \
                 object with \"data\" and \"fileName\" properties: data is the file contents and \
                 fileName is only the name of the file, without path or slashes."
            }
            Capability::ReadFile(_) => {
                "Only call this to read back a file created with write_file. Input is the file \
                 name, without path or slashes."
            }
            Capability::Automation(_) => {
                "Only call this to execute the following actions: draft/send emails, creating \
                 tweets, creating/updating wordpress posts, and managing calendar. Input is a \
                 string with the instructions."
            }
            #[cfg(feature = "tool-code-qa")]
            Capability::CodeQa(_) => {
                "Only call this to answer questions about the current code base; use it to read \
                 files and understand types. Input is a JSON object with \"prompt\" and \"path\" \
                 properties. Do not add a file name in the path property."
            }
        }
    }

    pub fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }

    pub async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        match self {
            Capability::Database(t) => t.invoke(input, ctx).await,
            Capability::Terminal(t) => t.invoke(input).await,
            Capability::WriteFile(t) => t.invoke(input).await,
            Capability::ReadFile(t) => t.invoke(input).await,
            Capability::Automation(t) => t.invoke(input, ctx).await,
            #[cfg(feature = "tool-code-qa")]
            Capability::CodeQa(t) => t.invoke(input, ctx).await,
        }
    }
}

/// Enabled capabilities, built once from config at startup.
#[derive(Clone)]
pub struct Catalog {
    capabilities: Vec<Capability>,
}

impl Catalog {
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        let mut capabilities = Vec::new();
        if config.database.enabled {
            capabilities.push(Capability::Database(DatabaseTool::new(&config.database)));
        }
        if config.terminal.enabled {
            capabilities.push(Capability::Terminal(TerminalTool::new(&config.terminal)));
        }
        if config.files.enabled {
            capabilities.push(Capability::WriteFile(WriteFileTool::new(&config.files)));
            capabilities.push(Capability::ReadFile(ReadFileTool::new(&config.files)));
        }
        if config.automation.enabled {
            capabilities.push(Capability::Automation(AutomationTool::new(&config.automation)?));
        }
        #[cfg(feature = "tool-code-qa")]
        if config.code_qa.enabled {
            capabilities.push(Capability::CodeQa(CodeQaTool::new(&config.code_qa)));
        }
        Ok(Self { capabilities })
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities.iter().map(Capability::descriptor).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    /// Run `name` with `input`.
    ///
    /// A known tool that is disabled is `unavailable`; a name the service
    /// has never heard of is `not_found`.
    pub async fn execute(&self, name: &str, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        match self.get(name) {
            Some(capability) => capability.invoke(input, ctx).await,
            None if KNOWN_TOOLS.contains(&name) => {
                Err(ToolError::Unavailable(format!("tool is disabled: {name}")))
            }
            None => Err(ToolError::NotFound(format!("unknown tool: {name}"))),
        }
    }

    /// Drop the cached document index for `path`.
    pub fn invalidate_index(&self, path: &str) -> Result<bool, ToolError> {
        #[cfg(feature = "tool-code-qa")]
        if let Some(Capability::CodeQa(qa)) = self.get("code_qa") {
            return qa.invalidate(path);
        }
        let _ = path;
        Err(ToolError::Unavailable("tool is disabled: code_qa".into()))
    }
}
