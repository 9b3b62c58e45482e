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

//! Built-in Handlebars helpers.
//!
//! These seven names are the baseline helper registry. The marker-emitting
//! helpers (`role`, `history`, `media`, `section`) write the sentinel
//! strings from [`crate::markers`] into the raw output stream; `json`
//! serializes a value; `ifEquals`/`unlessEquals` render blocks by strict
//! equality. Escaping is disabled on the engine, so everything emitted here
//! reaches the post-render parser verbatim.

use crate::markers::{history_marker, media_marker, role_marker, section_marker};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason,
    Renderable,
};
use serde::Serialize;

/// The baseline helper registry, in registration order.
pub(crate) const BUILTIN_HELPER_NAMES: [&str; 7] = [
    "json",
    "role",
    "history",
    "section",
    "media",
    "ifEquals",
    "unlessEquals",
];

/// Registers the built-in helper set with a Handlebars instance. Called
/// exactly once per engine, at construction.
pub(crate) fn register_builtin_helpers(handlebars: &mut Handlebars) {
    handlebars.register_helper("json", Box::new(json_helper));
    handlebars.register_helper("role", Box::new(role_helper));
    handlebars.register_helper("history", Box::new(history_helper));
    handlebars.register_helper("section", Box::new(section_helper));
    handlebars.register_helper("media", Box::new(media_helper));
    handlebars.register_helper("ifEquals", Box::new(if_equals_helper));
    handlebars.register_helper("unlessEquals", Box::new(unless_equals_helper));
}

/// Extracts a required string from a helper's positional parameter.
fn required_str_param<'a>(
    h: &'a Helper<'_>,
    index: usize,
    what: &str,
) -> Result<&'a str, RenderErrorReason> {
    h.param(index)
        .and_then(|p| p.value().as_str())
        .ok_or_else(|| RenderErrorReason::Other(format!("{what} must be a string")))
}

/// `{{json value indent=N}}`: serializes a value to JSON, pretty-printed
/// with N spaces when `indent` is set.
fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).ok_or_else(|| {
        RenderErrorReason::Other("json helper requires a value parameter".to_string())
    })?;

    let indent = h.hash_get("indent").and_then(|v| v.value().as_u64());
    let serialized = match indent {
        Some(width) if width > 0 => {
            let indent_bytes = vec![b' '; usize::try_from(width).unwrap_or(2)];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent_bytes);
            let mut buffer = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            value.value().serialize(&mut serializer).map_err(|e| {
                RenderErrorReason::Other(format!("JSON serialization failed: {e}"))
            })?;
            String::from_utf8_lossy(&buffer).into_owned()
        }
        _ => serde_json::to_string(value.value())
            .map_err(|e| RenderErrorReason::Other(format!("JSON serialization failed: {e}")))?,
    };

    out.write(&serialized)?;
    Ok(())
}

/// `{{role "NAME"}}`: emits a role marker.
fn role_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let name = required_str_param(h, 0, "role name")?;
    out.write(&role_marker(name))?;
    Ok(())
}

/// `{{history}}`: emits the history insertion marker.
fn history_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&history_marker())?;
    Ok(())
}

/// `{{section NAME}}`: emits a section marker.
fn section_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let name = required_str_param(h, 0, "section name")?;
    out.write(&section_marker(name))?;
    Ok(())
}

/// `{{media url=U contentType=C}}`: emits a media marker. `contentType` is
/// optional.
fn media_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let url = h
        .hash_get("url")
        .and_then(|v| v.value().as_str())
        .ok_or_else(|| {
            RenderErrorReason::Other("media helper requires a url parameter".to_string())
        })?;

    let content_type = match h.hash_get("contentType") {
        Some(value) => Some(value.value().as_str().ok_or_else(|| {
            RenderErrorReason::Other("contentType must be a string".to_string())
        })?),
        None => None,
    };

    out.write(&media_marker(url, content_type))?;
    Ok(())
}

/// `{{#ifEquals a b}}...{{else}}...{{/ifEquals}}`: renders the block when
/// both parameters are strictly equal.
fn if_equals_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    hbs: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    render_equality_block(h, hbs, ctx, rc, out, true)
}

/// `{{#unlessEquals a b}}...{{else}}...{{/unlessEquals}}`: the inverse.
fn unless_equals_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    hbs: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    render_equality_block(h, hbs, ctx, rc, out, false)
}

/// Shared block dispatch for the equality helpers.
fn render_equality_block<'reg, 'rc>(
    h: &Helper<'rc>,
    hbs: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
    when_equal: bool,
) -> HelperResult {
    let (Some(left), Some(right)) = (h.param(0), h.param(1)) else {
        return Err(RenderErrorReason::Other(
            "equality helpers require two parameters".to_string(),
        )
        .into());
    };

    let equal = left.value() == right.value();
    let selected = if equal == when_equal {
        h.template()
    } else {
        h.inverse()
    };

    if let Some(template) = selected {
        let rendered = template.renders(hbs, ctx, rc)?;
        out.write(&rendered)?;
    }
    Ok(())
}
