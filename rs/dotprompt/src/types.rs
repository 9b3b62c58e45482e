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

//! Core type definitions for the dotprompt library.
//!
//! The frontmatter of a prompt accepts arbitrary user data, so the metadata
//! types lean on `serde_json::Value` rather than forcing a schema onto the
//! `raw`, `ext`, and `config` fields. Wire names are camelCase for parity
//! with the canonical JavaScript implementation.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type alias for JSON Schema definitions.
pub type JsonSchema = serde_json::Value;

/// Frontmatter keys claimed by the prompt metadata itself.
///
/// Every other key either contributes to `ext` (when it carries a dotted
/// namespace) or is dropped.
pub const RESERVED_METADATA_KEYWORDS: [&str; 13] = [
    "name",
    "description",
    "variant",
    "version",
    "model",
    "tools",
    "toolDefs",
    "config",
    "input",
    "output",
    "raw",
    "ext",
    "metadata",
];

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message.
    #[default]
    User,
    /// Model/assistant message.
    Model,
    /// Tool call message.
    Tool,
    /// System message.
    System,
}

/// Tool definition specifying inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,

    /// Optional description of what the tool does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters.
    pub input_schema: JsonSchema,

    /// Optional JSON Schema for the tool's output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonSchema>,
}

/// Configuration for prompt input variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptInputConfig {
    /// Default values for input variables, merged under caller input.
    #[serde(skip_serializing_if = "Option::is_none", rename = "default")]
    pub default: Option<HashMap<String, serde_json::Value>>,

    /// Input schema, as picoschema or full JSON Schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Configuration for prompt output format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptOutputConfig {
    /// Desired output format (e.g., "json", "text").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Output schema, as picoschema or full JSON Schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Metadata associated with a prompt template.
///
/// After `parse`, `config`, `ext`, and `metadata` are present-but-empty when
/// the frontmatter did not set them; metadata resolution strips the empties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetadata {
    /// Name of the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Variant identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Version identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Model identifier (e.g., "vertexai/gemini-1.0-pro").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Names of tools available to this prompt. Resolution moves names that
    /// hit the registry or a resolver into `tool_defs`; unresolvable names
    /// stay here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    /// Inline tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_defs: Option<Vec<ToolDefinition>>,

    /// Model-specific configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Input variable configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PromptInputConfig>,

    /// Output format configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PromptOutputConfig>,

    /// Raw frontmatter as parsed, preserved verbatim for round-tripping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<HashMap<String, serde_json::Value>>,

    /// Extension fields from dotted frontmatter keys, organized by namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<HashMap<String, HashMap<String, serde_json::Value>>>,

    /// Arbitrary metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Parsed prompt with extracted metadata and template.
///
/// Immutable after parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPrompt {
    /// Prompt metadata from frontmatter.
    #[serde(flatten)]
    pub metadata: PromptMetadata,

    /// Template source with frontmatter removed.
    pub template: String,
}

/// Media content reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    /// URL of the media.
    pub url: String,

    /// Optional content type (MIME type).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Tool request content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequestContent {
    /// Name of the tool being requested.
    pub name: String,

    /// Optional input parameters for the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    /// Optional reference identifier.
    #[serde(skip_serializing_if = "Option::is_none", rename = "ref")]
    pub ref_: Option<String>,
}

/// Tool response content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseContent {
    /// Name of the tool that was called.
    pub name: String,

    /// Optional output from the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    /// Optional reference identifier.
    #[serde(skip_serializing_if = "Option::is_none", rename = "ref")]
    pub ref_: Option<String>,
}

/// Content part within a message.
///
/// Discriminate by the variant tag, never by probing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Text content.
    Text(TextPart),
    /// Structured data content.
    Data(DataPart),
    /// Media reference (image, video, etc.).
    Media(MediaPart),
    /// Tool call request.
    ToolRequest(ToolRequestPart),
    /// Tool call response.
    ToolResponse(ToolResponsePart),
    /// Placeholder for a section to be filled in downstream.
    Pending(PendingPart),
}

/// Text content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    /// The text content.
    pub text: String,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Structured data part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPart {
    /// The data content as a JSON object.
    pub data: HashMap<String, serde_json::Value>,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Media reference part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPart {
    /// The media content reference.
    pub media: MediaContent,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Tool request part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequestPart {
    /// The tool request details.
    pub tool_request: ToolRequestContent,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Tool response part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponsePart {
    /// The tool response details.
    pub tool_response: ToolResponseContent,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Pending/placeholder part emitted for `{{section}}` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPart {
    /// Always contains `pending: true` and, for sections, a `purpose`.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: Role,

    /// Content parts of the message.
    pub content: Vec<Part>,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// A document with structured content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content parts of the document.
    pub content: Vec<Part>,

    /// Optional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Data provided to render a prompt template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataArgument {
    /// Input variables for template rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    /// Relevant documents for context, exposed as `@docs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<Document>>,

    /// Previous messages in a multi-turn conversation, inserted where the
    /// `{{history}}` helper renders (or before a trailing user message).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,

    /// Context variables, exposed as `@context` in templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

/// Rendered prompt output with messages.
///
/// Freshly constructed per render call; the `input` metadata field is absent
/// because its defaults were consumed by rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    /// Fully resolved prompt metadata.
    #[serde(flatten)]
    pub metadata: PromptMetadata,

    /// Rendered messages to send to the model.
    pub messages: Vec<Message>,
}

/// Resolves schema names to JSON Schema definitions.
///
/// Resolvers are the only suspension points in the pipeline; an
/// implementation that performs I/O reports failure or cancellation through
/// the `Result`, which aborts the render with that error unchanged.
pub trait SchemaResolver: Send + Sync {
    /// Resolves a schema name, returning `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the lookup itself, including cancellation.
    fn resolve(&self, name: &str) -> Result<Option<JsonSchema>>;
}

impl<F> SchemaResolver for F
where
    F: Fn(&str) -> Result<Option<JsonSchema>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Result<Option<JsonSchema>> {
        self(name)
    }
}

/// Resolves tool names to tool definitions.
pub trait ToolResolver: Send + Sync {
    /// Resolves a tool name, returning `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the lookup itself, including cancellation.
    fn resolve(&self, name: &str) -> Result<Option<ToolDefinition>>;
}

impl<F> ToolResolver for F
where
    F: Fn(&str) -> Result<Option<ToolDefinition>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Result<Option<ToolDefinition>> {
        self(name)
    }
}

/// Resolves partial names to their template source.
pub trait PartialResolver: Send + Sync {
    /// Resolves a partial name, returning `None` when unknown. An
    /// unregistered partial left unresolved fails later, at render time.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the lookup itself, including cancellation.
    fn resolve(&self, name: &str) -> Result<Option<String>>;
}

impl<F> PartialResolver for F
where
    F: Fn(&str) -> Result<Option<String>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Result<Option<String>> {
        self(name)
    }
}
