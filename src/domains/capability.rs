use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical operation a handler can satisfy, e.g. `generate` or `research`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    pub const GENERATE: &'static str = "generate";
    pub const RESEARCH: &'static str = "research";
    pub const SUMMARIZE: &'static str = "summarize";
    pub const KEYWORDS: &'static str = "keywords";
    pub const TRANSLATE: &'static str = "translate";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_ascii_lowercase())
    }

    pub fn generate() -> Self {
        Self::new(Self::GENERATE)
    }

    pub fn research() -> Self {
        Self::new(Self::RESEARCH)
    }

    pub fn summarize() -> Self {
        Self::new(Self::SUMMARIZE)
    }

    pub fn keywords() -> Self {
        Self::new(Self::KEYWORDS)
    }

    pub fn translate() -> Self {
        Self::new(Self::TRANSLATE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerSource {
    AiProvider,
    McpTool,
    Local,
    Integration,
}

impl HandlerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AiProvider => "ai-provider",
            Self::McpTool => "mcp-tool",
            Self::Local => "local",
            Self::Integration => "integration",
        }
    }
}

impl fmt::Display for HandlerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
