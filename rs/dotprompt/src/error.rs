// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the dotprompt library.
//!
//! A YAML frontmatter that fails to parse is recovered inside the document
//! parser and never surfaces here; every other failure is fatal to the call
//! that triggered it.

use thiserror::Error;

/// Result type alias for dotprompt operations.
pub type Result<T> = std::result::Result<T, DotpromptError>;

/// Errors that can occur when working with dotprompt templates.
#[derive(Debug, Error)]
pub enum DotpromptError {
    /// Failed to serialize or deserialize JSON data, including typed
    /// frontmatter fields that parsed as YAML but carry the wrong shape.
    #[error("failed to process JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A template or partial failed to compile.
    #[error("template compilation failed: {0}")]
    Compilation(String),

    /// Template rendering failed. Unknown partials and unknown helpers
    /// surface here through the engine.
    #[error("template rendering failed: {0}")]
    Render(String),

    /// A picoschema definition could not be transformed into JSON Schema.
    #[error("picoschema conversion failed: {0}")]
    Picoschema(String),

    /// A named schema reference could not be resolved.
    #[error("unable to resolve schema '{0}'")]
    UnresolvedSchema(String),

    /// A tool name was passed to a resolver which returned nothing.
    #[error("unable to resolve tool '{0}'")]
    UnresolvedTool(String),

    /// `define_schema` was called with an empty name or a null schema.
    #[error("invalid schema definition: {0}")]
    InvalidSchemaDefinition(String),

    /// A helper name was redefined on an engine that already has it.
    #[error("helper '{0}' is already registered")]
    HelperConflict(String),

    /// A resolver reported cancellation; surfaced to the caller unchanged.
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}
