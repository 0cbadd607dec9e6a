// ABOUTME: Tool-specific error types for the tool registry and tools/call dispatch
// ABOUTME: Covers registration validation, lookup, schema-checked input and handler failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Tool Error Types
//!
//! - Registration errors surface at startup and abort the registration
//! - `InvalidInput` aggregates every schema violation found in one pass
//! - `ExecutionFailed` is reported to JSON-RPC clients only as an internal error

use std::error::Error;
use std::fmt;

/// Errors specific to tool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Name does not match `^[a-z][a-z0-9._-]{2,63}$`
    InvalidName {
        /// Rejected name
        tool_name: String,
    },
    /// Description is empty or whitespace
    MissingDescription {
        /// Name of the tool
        tool_name: String,
    },
    /// Input schema is not an object schema or is internally inconsistent
    InvalidSchema {
        /// Name of the tool
        tool_name: String,
        /// What is wrong with the schema
        reason: String,
    },
    /// Input schema could not be compiled into a validator
    SchemaCompilation {
        /// Name of the tool
        tool_name: String,
        /// Compiler message
        details: String,
    },
    /// Tool is already registered
    AlreadyRegistered {
        /// Name of the already-registered tool
        tool_name: String,
    },
    /// Tool was not found in the registry
    NotFound {
        /// Name of the requested tool
        tool_name: String,
    },
    /// Arguments violate the tool's input schema
    InvalidInput {
        /// Name of the tool
        tool_name: String,
        /// Every violation, formatted as `path: message`
        errors: Vec<String>,
    },
    /// Tool handler failed
    ExecutionFailed {
        /// Name of the tool that failed
        tool_name: String,
        /// Details about the failure
        details: String,
    },
}

impl ToolError {
    /// Create an "invalid name" error
    #[must_use]
    pub fn invalid_name(tool_name: impl Into<String>) -> Self {
        Self::InvalidName {
            tool_name: tool_name.into(),
        }
    }

    /// Create a "missing description" error
    #[must_use]
    pub fn missing_description(tool_name: impl Into<String>) -> Self {
        Self::MissingDescription {
            tool_name: tool_name.into(),
        }
    }

    /// Create an "invalid schema" error
    #[must_use]
    pub fn invalid_schema(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a "schema compilation" error
    #[must_use]
    pub fn schema_compilation(tool_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::SchemaCompilation {
            tool_name: tool_name.into(),
            details: details.into(),
        }
    }

    /// Create an "already registered" error
    #[must_use]
    pub fn already_registered(tool_name: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            tool_name: tool_name.into(),
        }
    }

    /// Create a "not found" error
    #[must_use]
    pub fn not_found(tool_name: impl Into<String>) -> Self {
        Self::NotFound {
            tool_name: tool_name.into(),
        }
    }

    /// Create an "invalid input" error from collected schema violations
    #[must_use]
    pub fn invalid_input(tool_name: impl Into<String>, errors: Vec<String>) -> Self {
        Self::InvalidInput {
            tool_name: tool_name.into(),
            errors,
        }
    }

    /// Create an "execution failed" error
    #[must_use]
    pub fn execution_failed(tool_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            details: details.into(),
        }
    }

    /// Get the tool name associated with this error
    #[must_use]
    pub fn tool_name(&self) -> &str {
        match self {
            Self::InvalidName { tool_name }
            | Self::MissingDescription { tool_name }
            | Self::InvalidSchema { tool_name, .. }
            | Self::SchemaCompilation { tool_name, .. }
            | Self::AlreadyRegistered { tool_name }
            | Self::NotFound { tool_name }
            | Self::InvalidInput { tool_name, .. }
            | Self::ExecutionFailed { tool_name, .. } => tool_name,
        }
    }

    /// Whether this is a registration-time error
    #[must_use]
    pub const fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidName { .. }
                | Self::MissingDescription { .. }
                | Self::InvalidSchema { .. }
                | Self::SchemaCompilation { .. }
                | Self::AlreadyRegistered { .. }
        )
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { tool_name } => write!(
                f,
                "Tool name '{tool_name}' must match ^[a-z][a-z0-9._-]{{2,63}}$"
            ),
            Self::MissingDescription { tool_name } => {
                write!(f, "Tool '{tool_name}' must have a non-empty description")
            }
            Self::InvalidSchema { tool_name, reason } => {
                write!(f, "Tool '{tool_name}' has an invalid input schema: {reason}")
            }
            Self::SchemaCompilation { tool_name, details } => {
                write!(f, "Tool '{tool_name}' input schema failed to compile: {details}")
            }
            Self::AlreadyRegistered { tool_name } => {
                write!(f, "Tool '{tool_name}' is already registered")
            }
            Self::NotFound { tool_name } => write!(f, "Tool '{tool_name}' not found"),
            Self::InvalidInput { tool_name, errors } => write!(
                f,
                "Invalid arguments for tool '{tool_name}': {}",
                errors.join("; ")
            ),
            Self::ExecutionFailed { tool_name, details } => {
                write!(f, "Tool '{tool_name}' execution failed: {details}")
            }
        }
    }
}

impl Error for ToolError {}
