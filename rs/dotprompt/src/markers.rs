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

//! Sentinel markers emitted by helpers and consumed by the post-render parser.
//!
//! Markers are literal byte sequences in the rendered text, never nested. A
//! marker must be produced atomically by a single helper call; the grammar is
//! strict, and anything that does not match it (uppercase role names, missing
//! brackets, a missing space) rides through message parsing as literal text.
//!
//! ```text
//! role      := "<<<dotprompt:role:" [a-z]+ ">>>"
//! history   := "<<<dotprompt:history>>>"
//! media     := "<<<dotprompt:media:url " URL (" " CONTENT_TYPE)? ">>>"
//! section   := "<<<dotprompt:section " IDENT ">>>"
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// Prefix of a role marker; the lowercase role name follows directly.
pub const ROLE_MARKER_PREFIX: &str = "<<<dotprompt:role:";

/// History marker, complete except for the closing brackets.
pub const HISTORY_MARKER_PREFIX: &str = "<<<dotprompt:history";

/// Prefix of a media marker; the URL follows after a space.
pub const MEDIA_MARKER_PREFIX: &str = "<<<dotprompt:media:url";

/// Prefix of a section marker; the section name follows after a space.
pub const SECTION_MARKER_PREFIX: &str = "<<<dotprompt:section";

/// Closing bracket sequence shared by all markers.
pub const MARKER_SUFFIX: &str = ">>>";

static ROLE_AND_HISTORY_RE: OnceLock<Regex> = OnceLock::new();
static MEDIA_AND_SECTION_RE: OnceLock<Regex> = OnceLock::new();

/// Formats a role marker for the given role name.
///
/// The name is emitted as given; only a `[a-z]+` name survives the
/// post-render split as a marker.
#[must_use]
pub fn role_marker(name: &str) -> String {
    format!("{ROLE_MARKER_PREFIX}{name}{MARKER_SUFFIX}")
}

/// Formats the history insertion marker.
#[must_use]
pub fn history_marker() -> String {
    format!("{HISTORY_MARKER_PREFIX}{MARKER_SUFFIX}")
}

/// Formats a media marker with an optional content type.
#[must_use]
pub fn media_marker(url: &str, content_type: Option<&str>) -> String {
    match content_type {
        Some(ct) => format!("{MEDIA_MARKER_PREFIX} {url} {ct}{MARKER_SUFFIX}"),
        None => format!("{MEDIA_MARKER_PREFIX} {url}{MARKER_SUFFIX}"),
    }
}

/// Formats a section marker for the given section name.
#[must_use]
pub fn section_marker(name: &str) -> String {
    format!("{SECTION_MARKER_PREFIX} {name}{MARKER_SUFFIX}")
}

/// Regex matching role and history markers, capturing the marker body
/// without the trailing brackets.
#[allow(clippy::expect_used)]
pub(crate) fn role_and_history_regex() -> &'static Regex {
    ROLE_AND_HISTORY_RE.get_or_init(|| {
        Regex::new(r"(<<<dotprompt:(?:role:[a-z]+|history))>>>")
            .expect("failed to compile role/history regex")
    })
}

/// Regex matching media and section markers, capturing the marker body
/// without the trailing brackets. The space after the keyword is part of the
/// grammar; `<<<dotprompt:sectionfoo>>>` is literal text.
#[allow(clippy::expect_used)]
pub(crate) fn media_and_section_regex() -> &'static Regex {
    MEDIA_AND_SECTION_RE.get_or_init(|| {
        Regex::new(r"(<<<dotprompt:(?:media:url|section) .*?)>>>")
            .expect("failed to compile media/section regex")
    })
}
