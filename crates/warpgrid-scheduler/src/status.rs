//! Status returned by every pipeline stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome class of a plugin or stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    /// Continue with the next plugin or stage.
    Success,
    /// Expected rejection of the workload for this attempt.
    Unschedulable,
    /// Suspend the attempt until permit plugins resolve. Permit only.
    Wait,
    /// Unexpected plugin or internal failure.
    Error,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Unschedulable => "Unschedulable",
            Code::Wait => "Wait",
            Code::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Result of running a plugin, optionally attributed to the plugin that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
    failed_plugin: Option<String>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            failed_plugin: None,
        }
    }

    pub fn success() -> Self {
        Self::new(Code::Success, "")
    }

    pub fn unschedulable(message: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, message)
    }

    pub fn wait(message: impl Into<String>) -> Self {
        Self::new(Code::Wait, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Code::Error, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn failed_plugin(&self) -> Option<&str> {
        self.failed_plugin.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn is_unschedulable(&self) -> bool {
        self.code == Code::Unschedulable
    }

    pub fn is_wait(&self) -> bool {
        self.code == Code::Wait
    }

    pub fn is_error(&self) -> bool {
        self.code == Code::Error
    }

    /// Attribute this status to `plugin`.
    pub fn with_failed_plugin(mut self, plugin: &str) -> Self {
        self.failed_plugin = Some(plugin.to_string());
        self
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(plugin) = &self.failed_plugin {
            write!(f, " from plugin {plugin}")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}
