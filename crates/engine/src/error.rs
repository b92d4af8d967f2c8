// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Machine-readable error codes carried in command results and log entries.
///
/// Wire form is the SCREAMING_SNAKE_CASE string. Unexpected failures travel
/// as [`ErrorCode::Other`] with a free-form message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    DomainNotAllowed,
    AttachFailed,
    ParsingError,
    InvalidCommand,
    RateLimited,
    NavigationTimeout,
    ContentScriptError,
    AgentDisabled,
    UnknownMessageType,
    MissingSelector,
    ElementNotFound,
    UnknownError,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DomainNotAllowed => "DOMAIN_NOT_ALLOWED",
            Self::AttachFailed => "ATTACH_FAILED",
            Self::ParsingError => "PARSING_ERROR",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::RateLimited => "RATE_LIMITED",
            Self::NavigationTimeout => "NAVIGATION_TIMEOUT",
            Self::ContentScriptError => "CONTENT_SCRIPT_ERROR",
            Self::AgentDisabled => "AGENT_DISABLED",
            Self::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            Self::MissingSelector => "MISSING_SELECTOR",
            Self::ElementNotFound => "ELEMENT_NOT_FOUND",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::Other(msg) => msg,
        }
    }

    /// Parse a wire string back into a code. Unknown strings round-trip
    /// through [`ErrorCode::Other`].
    pub fn from_code(s: &str) -> Self {
        match s {
            "DOMAIN_NOT_ALLOWED" => Self::DomainNotAllowed,
            "ATTACH_FAILED" => Self::AttachFailed,
            "PARSING_ERROR" => Self::ParsingError,
            "INVALID_COMMAND" => Self::InvalidCommand,
            "RATE_LIMITED" => Self::RateLimited,
            "NAVIGATION_TIMEOUT" => Self::NavigationTimeout,
            "CONTENT_SCRIPT_ERROR" => Self::ContentScriptError,
            "AGENT_DISABLED" => Self::AgentDisabled,
            "UNKNOWN_MESSAGE_TYPE" => Self::UnknownMessageType,
            "MISSING_SELECTOR" => Self::MissingSelector,
            "ELEMENT_NOT_FOUND" => Self::ElementNotFound,
            "UNKNOWN_ERROR" => Self::UnknownError,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_code(&s))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
