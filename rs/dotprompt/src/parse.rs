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

//! Document parsing and post-render message extraction.
//!
//! Two parsers live here. The document parser splits a `.prompt` source into
//! YAML frontmatter and template body, partitions the frontmatter into
//! reserved metadata fields and dotted-namespace extensions, and keeps the
//! raw mapping for round-tripping. The message parser runs after template
//! rendering and splits the sentinel marker stream back into ordered
//! [`Message`]s containing [`Part`]s, inserting caller-supplied history at
//! the correct position.

use crate::error::Result;
use crate::markers::{
    MEDIA_MARKER_PREFIX, ROLE_MARKER_PREFIX, SECTION_MARKER_PREFIX, media_and_section_regex,
    role_and_history_regex,
};
use crate::types::{
    DataArgument, MediaContent, MediaPart, Message, ParsedPrompt, Part, PendingPart,
    PromptMetadata, RESERVED_METADATA_KEYWORDS, Role, TextPart,
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

static FRONTMATTER_RE: OnceLock<Regex> = OnceLock::new();

/// Frontmatter pattern over a source whose line endings are already
/// normalized to `\n`. The `---` delimiter lines may carry trailing blanks.
#[allow(clippy::expect_used)]
fn frontmatter_regex() -> &'static Regex {
    FRONTMATTER_RE.get_or_init(|| {
        Regex::new(r"(?s)^---[ \t]*\n(.*?)\n---[ \t]*\n(.*)$")
            .expect("failed to compile frontmatter regex")
    })
}

/// Collapses `CRLF` and bare `CR` line endings to `LF`.
fn normalize_line_endings(source: &str) -> String {
    source.replace("\r\n", "\n").replace('\r', "\n")
}

/// Metadata carried by a prompt with no (usable) frontmatter.
fn base_metadata() -> PromptMetadata {
    PromptMetadata {
        config: Some(Value::Object(serde_json::Map::new())),
        ext: Some(HashMap::new()),
        metadata: Some(HashMap::new()),
        ..PromptMetadata::default()
    }
}

/// Parses a dotprompt document into structured metadata and template.
///
/// A source without frontmatter yields base metadata and the untrimmed
/// source as the template. Frontmatter that fails to parse as a YAML mapping
/// is swallowed: the result is base metadata with the whole source, trimmed,
/// as the template. When frontmatter parses, the body is trimmed.
///
/// # Errors
///
/// Returns an error when a reserved frontmatter field parses as YAML but
/// carries the wrong shape (e.g. `tools` that is not a sequence of strings).
pub fn parse_document(source: &str) -> Result<ParsedPrompt> {
    let normalized = normalize_line_endings(source);

    let Some(captures) = frontmatter_regex().captures(&normalized) else {
        return Ok(ParsedPrompt {
            metadata: base_metadata(),
            template: normalized,
        });
    };
    let yaml = captures.get(1).map_or("", |m| m.as_str());
    let body = captures.get(2).map_or("", |m| m.as_str());

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Null) => Ok(ParsedPrompt {
            metadata: base_metadata(),
            template: body.trim().to_string(),
        }),
        Ok(Value::Object(mapping)) => Ok(ParsedPrompt {
            metadata: metadata_from_frontmatter(&mapping)?,
            template: body.trim().to_string(),
        }),
        // Unparseable or non-mapping frontmatter: keep the whole document.
        _ => Ok(ParsedPrompt {
            metadata: base_metadata(),
            template: normalized.trim().to_string(),
        }),
    }
}

/// Partitions a parsed frontmatter mapping into reserved metadata fields and
/// dotted-namespace extensions, preserving the mapping verbatim as `raw`.
fn metadata_from_frontmatter(mapping: &serde_json::Map<String, Value>) -> Result<PromptMetadata> {
    let mut reserved = serde_json::Map::new();
    let mut ext: HashMap<String, HashMap<String, Value>> = HashMap::new();

    for (key, value) in mapping {
        if RESERVED_METADATA_KEYWORDS.contains(&key.as_str()) {
            reserved.insert(key.clone(), value.clone());
        } else if let Some(split_at) = key.rfind('.') {
            let namespace = key[..split_at].to_string();
            let field = key[split_at + 1..].to_string();
            ext.entry(namespace).or_default().insert(field, value.clone());
        }
        // Keys that are neither reserved nor namespaced are dropped.
    }

    let mut metadata: PromptMetadata = serde_json::from_value(Value::Object(reserved))?;
    metadata.raw = Some(mapping.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    metadata.ext = Some(ext);
    if metadata.config.is_none() {
        metadata.config = Some(Value::Object(serde_json::Map::new()));
    }
    if metadata.metadata.is_none() {
        metadata.metadata = Some(HashMap::new());
    }
    Ok(metadata)
}

/// One piece of the rendered stream after the role/history split.
enum RolePiece<'a> {
    /// A role marker carrying the role name.
    Role(&'a str),
    /// The history insertion marker.
    History,
    /// Literal text between markers.
    Text(&'a str),
}

/// One piece of a message source after the media/section split.
enum ContentPiece<'a> {
    /// A media marker's remainder: `URL [CONTENT_TYPE]`.
    Media(&'a str),
    /// A section marker's remainder: the section name.
    Section(&'a str),
    /// Literal text between markers.
    Text(&'a str),
}

/// Splits the rendered stream on role and history markers, keeping the
/// markers and dropping whitespace-only text between them.
fn split_role_and_history(rendered: &str) -> Vec<RolePiece<'_>> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    for captures in role_and_history_regex().captures_iter(rendered) {
        let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let before = &rendered[cursor..whole.start()];
        if !before.trim().is_empty() {
            pieces.push(RolePiece::Text(before));
        }
        pieces.push(match body.as_str().strip_prefix(ROLE_MARKER_PREFIX) {
            Some(role) => RolePiece::Role(role),
            None => RolePiece::History,
        });
        cursor = whole.end();
    }
    let rest = &rendered[cursor..];
    if !rest.trim().is_empty() {
        pieces.push(RolePiece::Text(rest));
    }
    pieces
}

/// Splits one message source on media and section markers.
fn split_media_and_section(source: &str) -> Vec<ContentPiece<'_>> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    for captures in media_and_section_regex().captures_iter(source) {
        let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let before = &source[cursor..whole.start()];
        if !before.trim().is_empty() {
            pieces.push(ContentPiece::Text(before));
        }
        let marker = body.as_str();
        if let Some(rest) = marker.strip_prefix(MEDIA_MARKER_PREFIX) {
            pieces.push(ContentPiece::Media(rest));
        } else if let Some(rest) = marker.strip_prefix(SECTION_MARKER_PREFIX) {
            pieces.push(ContentPiece::Section(rest));
        }
        cursor = whole.end();
    }
    let rest = &source[cursor..];
    if !rest.trim().is_empty() {
        pieces.push(ContentPiece::Text(rest));
    }
    pieces
}

/// Converts one message source into its parts.
fn to_parts(source: &str) -> Vec<Part> {
    split_media_and_section(source)
        .into_iter()
        .map(|piece| match piece {
            ContentPiece::Media(rest) => {
                let mut fields = rest.split_whitespace();
                Part::Media(MediaPart {
                    media: MediaContent {
                        url: fields.next().unwrap_or_default().to_string(),
                        content_type: fields.next().map(ToString::to_string),
                    },
                    metadata: None,
                })
            }
            ContentPiece::Section(rest) => {
                let mut metadata = HashMap::new();
                metadata.insert("purpose".to_string(), Value::String(rest.trim().to_string()));
                metadata.insert("pending".to_string(), Value::Bool(true));
                Part::Pending(PendingPart { metadata })
            }
            ContentPiece::Text(text) => Part::Text(TextPart {
                text: text.to_string(),
                metadata: None,
            }),
        })
        .collect()
}

/// Maps a role marker name onto the role set; any other lowercase name is a
/// syntactically valid marker and falls back to `user`.
fn parse_role(name: &str) -> Role {
    match name {
        "model" => Role::Model,
        "tool" => Role::Tool,
        "system" => Role::System,
        _ => Role::User,
    }
}

/// A message under construction while walking the marker stream.
struct MessageSource {
    role: Role,
    source: String,
    content: Option<Vec<Part>>,
    metadata: Option<HashMap<String, Value>>,
}

impl MessageSource {
    const fn new(role: Role) -> Self {
        Self {
            role,
            source: String::new(),
            content: None,
            metadata: None,
        }
    }

    /// Wraps a history message, stamping `purpose: "history"`.
    fn from_history(message: &Message) -> Self {
        let mut metadata = message.metadata.clone().unwrap_or_default();
        metadata.insert(
            "purpose".to_string(),
            Value::String("history".to_string()),
        );
        Self {
            role: message.role,
            source: String::new(),
            content: Some(message.content.clone()),
            metadata: Some(metadata),
        }
    }

    fn has_content(&self) -> bool {
        !self.source.trim().is_empty() || self.content.is_some()
    }

    fn into_message(self) -> Message {
        let content = self.content.unwrap_or_else(|| to_parts(&self.source));
        Message {
            role: self.role,
            content,
            metadata: self.metadata,
        }
    }
}

/// True when a message is already stamped as history.
fn is_history_message(message: &Message) -> bool {
    message
        .metadata
        .as_ref()
        .is_some_and(|meta| meta.get("purpose").is_some_and(|v| v == "history"))
}

/// Inserts caller history into a message list that rendered without a
/// `{{history}}` marker. History goes immediately before a trailing user
/// message, otherwise at the end, and the caller's messages are inserted
/// unmodified.
fn insert_history(messages: Vec<Message>, history: Option<&[Message]>) -> Vec<Message> {
    let Some(history) = history.filter(|h| !h.is_empty()) else {
        return messages;
    };
    if messages.iter().any(is_history_message) {
        return messages;
    }

    let mut out = messages;
    match out.last() {
        Some(last) if last.role == Role::User => {
            let tail = out.split_off(out.len() - 1);
            out.extend(history.iter().cloned());
            out.extend(tail);
        }
        _ => out.extend(history.iter().cloned()),
    }
    out
}

/// Converts a rendered template string into an ordered list of messages.
///
/// The stream is split on role and history markers in a single pass; each
/// resulting message source is then split on media and section markers into
/// parts. Markers that do not match the exact grammar are preserved as
/// literal text. Caller history from `data.messages` is inserted either at
/// the `{{history}}` marker (stamped `purpose: "history"`) or, absent a
/// marker, by [`insert_history`]'s position rule.
#[must_use]
pub fn to_messages(rendered: &str, data: Option<&DataArgument>) -> Vec<Message> {
    let mut sources: Vec<MessageSource> = Vec::new();
    let mut current = MessageSource::new(Role::User);

    for piece in split_role_and_history(rendered) {
        match piece {
            RolePiece::Text(text) => current.source.push_str(text),
            RolePiece::Role(name) => {
                let role = parse_role(name);
                if current.source.trim().is_empty() {
                    // A leading or back-to-back marker rewrites the open
                    // message instead of emitting an empty one.
                    current.role = role;
                } else {
                    sources.push(std::mem::replace(&mut current, MessageSource::new(role)));
                }
            }
            RolePiece::History => {
                let closed = std::mem::replace(&mut current, MessageSource::new(Role::Model));
                if !closed.source.trim().is_empty() {
                    sources.push(closed);
                }
                if let Some(history) = data.and_then(|d| d.messages.as_ref()) {
                    sources.extend(history.iter().map(MessageSource::from_history));
                }
            }
        }
    }
    sources.push(current);

    let messages: Vec<Message> = sources
        .into_iter()
        .filter(MessageSource::has_content)
        .map(MessageSource::into_message)
        .collect();

    insert_history(messages, data.and_then(|d| d.messages.as_deref()))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_of(message: &Message) -> String {
        message
            .content
            .iter()
            .filter_map(|part| match part {
                Part::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_with_frontmatter() {
        let source = "---\nmodel: gemini-pro\n---\nHello {{name}}!\n";
        let parsed = parse_document(source).expect("parse should succeed");
        assert_eq!(parsed.metadata.model.as_deref(), Some("gemini-pro"));
        assert_eq!(parsed.template, "Hello {{name}}!");
    }

    #[test]
    fn test_parse_without_frontmatter_keeps_whitespace() {
        let source = "Hello {{name}}!\n";
        let parsed = parse_document(source).expect("parse should succeed");
        assert_eq!(parsed.template, "Hello {{name}}!\n");
        assert_eq!(parsed.metadata.ext, Some(HashMap::new()));
    }

    #[test]
    fn test_parse_normalizes_line_endings() {
        let source = "---\r\nmodel: gemini-pro\r\n---\r\nHi\r\nthere";
        let parsed = parse_document(source).expect("parse should succeed");
        assert_eq!(parsed.metadata.model.as_deref(), Some("gemini-pro"));
        assert_eq!(parsed.template, "Hi\nthere");
    }

    #[test]
    fn test_parse_trailing_blanks_on_delimiters() {
        let source = "---  \nmodel: gemini-pro\n---\t\nBody";
        let parsed = parse_document(source).expect("parse should succeed");
        assert_eq!(parsed.metadata.model.as_deref(), Some("gemini-pro"));
        assert_eq!(parsed.template, "Body");
    }

    #[test]
    fn test_parse_invalid_yaml_falls_back() {
        let source = "---\n: [ not yaml\n---\nBody";
        let parsed = parse_document(source).expect("parse should succeed");
        assert!(parsed.metadata.model.is_none());
        assert_eq!(parsed.template, source.trim());
    }

    #[test]
    fn test_parse_empty_frontmatter() {
        let source = "---\n\n---\nBody\n";
        let parsed = parse_document(source).expect("parse should succeed");
        assert!(parsed.metadata.raw.is_none());
        assert_eq!(parsed.template, "Body");
    }

    #[test]
    fn test_raw_preserves_all_keys() {
        let source = "---\nmodel: m\nfoo.bar: 1\nplain: dropped\n---\nBody";
        let parsed = parse_document(source).expect("parse should succeed");
        let raw = parsed.metadata.raw.expect("raw should be set");
        assert_eq!(raw.len(), 3);
        assert_eq!(raw["model"], json!("m"));
        assert_eq!(raw["foo.bar"], json!(1));
        assert_eq!(raw["plain"], json!("dropped"));
    }

    #[test]
    fn test_ext_splits_at_last_dot() {
        let source = "---\na.b.c: 7\na.b.d: 8\nmy.namespace: x\n---\nBody";
        let parsed = parse_document(source).expect("parse should succeed");
        let ext = parsed.metadata.ext.expect("ext should be set");
        assert_eq!(ext["a.b"]["c"], json!(7));
        assert_eq!(ext["a.b"]["d"], json!(8));
        assert_eq!(ext["my"]["namespace"], json!("x"));
    }

    #[test]
    fn test_reserved_keys_never_reach_ext() {
        let source = "---\ndescription: hi\nmetadata:\n  k: v\n---\nBody";
        let parsed = parse_document(source).expect("parse should succeed");
        assert_eq!(parsed.metadata.description.as_deref(), Some("hi"));
        assert_eq!(parsed.metadata.ext, Some(HashMap::new()));
        let meta = parsed.metadata.metadata.expect("metadata should be set");
        assert_eq!(meta["k"], json!("v"));
    }

    #[test]
    fn test_to_messages_plain_text() {
        let messages = to_messages("Hello world!\n", None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(text_of(&messages[0]), "Hello world!\n");
    }

    #[test]
    fn test_to_messages_role_split() {
        let rendered = "<<<dotprompt:role:system>>>Instructions\n<<<dotprompt:role:user>>>Query";
        let messages = to_messages(rendered, None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(text_of(&messages[0]), "Instructions\n");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(text_of(&messages[1]), "Query");
    }

    #[test]
    fn test_leading_role_marker_rewrites_open_message() {
        let messages = to_messages("<<<dotprompt:role:model>>>Reply", None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Model);
    }

    #[test]
    fn test_unknown_lowercase_role_falls_back_to_user() {
        let messages = to_messages("<<<dotprompt:role:assistant>>>Hi", None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn test_invalid_marker_survives_as_text() {
        let rendered = "<<<dotprompt:ROLE:user>>>";
        let messages = to_messages(rendered, None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(text_of(&messages[0]), rendered);
    }

    #[test]
    fn test_media_part_with_content_type() {
        let rendered = "<<<dotprompt:media:url https://e.com/a.jpg image/jpeg>>>";
        let messages = to_messages(rendered, None);
        assert_eq!(messages.len(), 1);
        let Part::Media(media) = &messages[0].content[0] else {
            panic!("expected media part");
        };
        assert_eq!(media.media.url, "https://e.com/a.jpg");
        assert_eq!(media.media.content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_section_part_is_pending() {
        let messages = to_messages("before <<<dotprompt:section output>>> after", None);
        assert_eq!(messages.len(), 1);
        let parts = &messages[0].content;
        assert_eq!(parts.len(), 3);
        let Part::Pending(pending) = &parts[1] else {
            panic!("expected pending part");
        };
        assert_eq!(pending.metadata["purpose"], json!("output"));
        assert_eq!(pending.metadata["pending"], json!(true));
    }

    #[test]
    fn test_history_marker_inserts_stamped_history() {
        let data = DataArgument {
            messages: Some(vec![Message {
                role: Role::Model,
                content: vec![Part::Text(TextPart {
                    text: "H".to_string(),
                    metadata: None,
                })],
                metadata: None,
            }]),
            ..DataArgument::default()
        };
        let rendered = "<<<dotprompt:role:system>>>S<<<dotprompt:history>>>tail";
        let messages = to_messages(rendered, Some(&data));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert!(is_history_message(&messages[1]));
        assert_eq!(messages[2].role, Role::Model);
        assert_eq!(text_of(&messages[2]), "tail");
    }

    #[test]
    fn test_history_inserted_before_trailing_user() {
        let data = DataArgument {
            messages: Some(vec![Message {
                role: Role::Model,
                content: vec![Part::Text(TextPart {
                    text: "H".to_string(),
                    metadata: None,
                })],
                metadata: None,
            }]),
            ..DataArgument::default()
        };
        let rendered = "<<<dotprompt:role:system>>>S<<<dotprompt:role:user>>>U";
        let messages = to_messages(rendered, Some(&data));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::Model);
        // Implicit insertion keeps the caller's messages untouched.
        assert!(messages[1].metadata.is_none());
        assert_eq!(messages[2].role, Role::User);
    }

    #[test]
    fn test_history_appended_when_no_trailing_user() {
        let data = DataArgument {
            messages: Some(vec![Message {
                role: Role::User,
                content: vec![],
                metadata: None,
            }]),
            ..DataArgument::default()
        };
        let rendered = "<<<dotprompt:role:model>>>M";
        let messages = to_messages(rendered, Some(&data));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Model);
        assert_eq!(messages[1].role, Role::User);
    }
}
