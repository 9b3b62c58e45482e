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

//! Dotprompt: Executable `GenAI` Prompt Templates for Rust
//!
//! This library implements the dotprompt format, a language-neutral
//! executable prompt template: a YAML frontmatter block followed by a
//! Handlebars template. Rendering a document produces a structured
//! conversation (roles, multi-modal parts, history insertion) together with
//! fully resolved metadata (model selection, tools, input/output schemas)
//! and the raw frontmatter for round-tripping.
//!
//! # Features
//!
//! - YAML frontmatter with reserved fields, namespaced extensions, and
//!   verbatim raw round-tripping
//! - Handlebars templating with the dotprompt helper set (`role`, `history`,
//!   `media`, `section`, `json`, `ifEquals`, `unlessEquals`)
//! - Picoschema to JSON Schema conversion with named schema resolution
//! - Transitive partial discovery through pluggable resolvers
//! - Post-render parsing of the sentinel marker stream into messages
//!
//! # Example
//!
//! ```
//! use dotprompt::{DataArgument, Dotprompt};
//!
//! # fn main() -> dotprompt::Result<()> {
//! let mut engine = Dotprompt::new(None);
//! let source = "---\nmodel: gemini-pro\n---\nHello {{name}}!";
//!
//! let data = DataArgument {
//!     input: Some(serde_json::json!({"name": "World"})),
//!     ..DataArgument::default()
//! };
//!
//! let rendered = engine.render(source, &data, None)?;
//! assert_eq!(rendered.metadata.model.as_deref(), Some("gemini-pro"));
//! assert_eq!(rendered.messages.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

pub mod dotprompt;
pub mod error;
mod helpers;
pub mod markers;
pub mod parse;
pub mod picoschema;
pub mod types;

// Re-export main types for convenience
pub use dotprompt::{Dotprompt, DotpromptOptions, PromptFunction};
pub use error::{DotpromptError, Result};
pub use types::*;
