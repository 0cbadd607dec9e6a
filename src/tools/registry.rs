// ABOUTME: Central registry for MCP tools with precompiled JSON Schema input validation
// ABOUTME: Provides registration checks, visibility filtering and validated lookup for tools/call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Tool Registry
//!
//! Central registry for MCP tools, providing:
//! - Registration with name, description and schema checks
//! - Schema compilation at registration time so calls never recompile
//! - Listing filtered by location and visibility
//! - Input validation that reports every violation at once
//!
//! The registry is built once at startup and then shared immutably behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use jsonschema::Validator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::ToolError;

use super::traits::ToolHandler;

static TOOL_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9._-]{2,63}$").ok());

/// Whether `name` is an acceptable tool name
#[must_use]
pub fn is_valid_tool_name(name: &str) -> bool {
    TOOL_NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Where a tool executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolLocation {
    /// In this process
    #[default]
    Local,
    /// Proxied to another service
    Remote,
}

/// Everything needed to register a tool
pub struct ToolDefinition {
    /// Unique name, `^[a-z][a-z0-9._-]{2,63}$`
    pub name: String,
    /// Human-readable description for model consumption
    pub description: String,
    /// JSON Schema of the `arguments` object
    pub input_schema: Value,
    /// Where the tool runs
    pub location: ToolLocation,
    /// Excluded from default listings
    pub hidden: bool,
    /// Tool version string
    pub version: String,
    /// Executable handler
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Local, visible tool at version 1.0.0
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            location: ToolLocation::Local,
            hidden: false,
            version: "1.0.0".to_owned(),
            handler,
        }
    }

    /// Mark the tool remote
    #[must_use]
    pub const fn remote(mut self) -> Self {
        self.location = ToolLocation::Remote;
        self
    }

    /// Hide the tool from default listings
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// A registered tool with its compiled validator
pub struct RegisteredTool {
    definition: ToolDefinition,
    validator: Validator,
}

impl RegisteredTool {
    /// Tool name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The registered definition
    #[must_use]
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Handler bound at registration
    #[must_use]
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.definition.handler)
    }

    /// Check `input` against the compiled schema, collecting every violation
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidInput` listing each violation as `path: message`
    pub fn validate(&self, input: &Value) -> Result<(), ToolError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(input)
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/".to_owned() } else { path };
                format!("{path}: {error}")
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::invalid_input(self.name(), errors))
        }
    }

    /// Entry for a `tools/list` response
    #[must_use]
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            input_schema: self.definition.input_schema.clone(),
        }
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .field("location", &self.definition.location)
            .field("hidden", &self.definition.hidden)
            .field("version", &self.definition.version)
            .finish_non_exhaustive()
    }
}

/// Tool entry as listed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema of the arguments
    pub input_schema: Value,
}

/// Listing filters; both default to excluding
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ToolListOptions {
    /// Include remote tools
    #[serde(default)]
    pub include_remote: bool,
    /// Include hidden tools
    #[serde(default)]
    pub include_hidden: bool,
}

/// Central registry for MCP tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool after validating its definition and compiling its schema
    ///
    /// # Errors
    ///
    /// Returns a registration `ToolError` for a bad name, empty description, malformed or
    /// uncompilable schema, or a duplicate name
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), ToolError> {
        let name = definition.name.clone();

        if !is_valid_tool_name(&name) {
            return Err(ToolError::invalid_name(name));
        }
        if definition.description.trim().is_empty() {
            return Err(ToolError::missing_description(name));
        }
        Self::check_schema_shape(&name, &definition.input_schema)?;
        if self.tools.contains_key(&name) {
            return Err(ToolError::already_registered(name));
        }

        let validator = Validator::new(&definition.input_schema)
            .map_err(|e| ToolError::schema_compilation(&name, e.to_string()))?;

        debug!(
            "Registering tool '{}' (version {}, {:?}{})",
            name,
            definition.version,
            definition.location,
            if definition.hidden { ", hidden" } else { "" }
        );
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                validator,
            },
        );
        Ok(())
    }

    /// Register several tools, stopping at the first failure
    ///
    /// # Errors
    ///
    /// Returns the first registration error
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = ToolDefinition>,
    ) -> Result<(), ToolError> {
        for definition in definitions {
            self.register(definition)?;
        }
        info!("Tool registry holds {} tools", self.tools.len());
        Ok(())
    }

    /// `type: object`, and `required` may only name declared `properties`
    fn check_schema_shape(name: &str, schema: &Value) -> Result<(), ToolError> {
        let Some(object) = schema.as_object() else {
            return Err(ToolError::invalid_schema(name, "schema must be a JSON object"));
        };
        if object.get("type").and_then(Value::as_str) != Some("object") {
            return Err(ToolError::invalid_schema(name, "schema type must be \"object\""));
        }

        let properties = match object.get("properties") {
            None => None,
            Some(Value::Object(properties)) => Some(properties),
            Some(_) => {
                return Err(ToolError::invalid_schema(name, "properties must be an object"));
            }
        };

        match object.get("required") {
            None => Ok(()),
            Some(Value::Array(required)) => {
                for field in required {
                    let Some(field) = field.as_str() else {
                        return Err(ToolError::invalid_schema(
                            name,
                            "required entries must be strings",
                        ));
                    };
                    if !properties.is_some_and(|props| props.contains_key(field)) {
                        return Err(ToolError::invalid_schema(
                            name,
                            format!("required property '{field}' is not declared in properties"),
                        ));
                    }
                }
                Ok(())
            }
            Some(_) => Err(ToolError::invalid_schema(name, "required must be an array")),
        }
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Check if a tool is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools visible under `options`, sorted by name
    #[must_use]
    pub fn list(&self, options: ToolListOptions) -> Vec<ToolSchema> {
        self.tools
            .values()
            .filter(|tool| {
                let definition = tool.definition();
                (options.include_remote || definition.location == ToolLocation::Local)
                    && (options.include_hidden || !definition.hidden)
            })
            .map(RegisteredTool::schema)
            .collect()
    }

    /// `tools/list` result including the `_meta` totals
    #[must_use]
    pub fn list_response(&self, options: ToolListOptions) -> Value {
        let tools = self.list(options);
        json!({
            "tools": tools,
            "_meta": {
                "total": self.tools.len(),
                "returned": tools.len(),
                "include_remote": options.include_remote,
                "include_hidden": options.include_hidden,
            }
        })
    }

    /// Validate `input` for the named tool
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown tools and `InvalidInput` for schema violations
    pub fn validate_tool_input(&self, name: &str, input: &Value) -> Result<(), ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::not_found(name))?
            .validate(input)
    }
}
