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

//! Picoschema to JSON Schema conversion.
//!
//! Picoschema is the compact schema mini-language used in prompt frontmatter.
//! A schema is either a bare type string (`string, the user's name`), a full
//! JSON Schema mapping (passed through untouched), or a mapping of property
//! keys to nested schemas:
//!
//! ```yaml
//! input:
//!   schema:
//!     name: string, the user's name
//!     age?: integer, omitted when unknown
//!     tags?(array, labels to apply): string
//!     status(enum): [active, inactive]
//!     "(*)": any
//! ```
//!
//! A `?` suffix marks a property optional (its type gains `"null"`), a
//! parenthetical names a type constructor (`array`, `object`, `enum`), the
//! first comma splits type from description, and the `(*)` wildcard sets
//! `additionalProperties`. Type names outside the scalar set resolve through
//! a [`SchemaResolver`] to registered named schemas.

use crate::error::{DotpromptError, Result};
use crate::types::{JsonSchema, SchemaResolver};
use serde_json::{Map, Value, json};

/// Property key that sets `additionalProperties` instead of a named property.
const WILDCARD_PROPERTY_NAME: &str = "(*)";

/// Scalar type names understood without resolution.
const SCALAR_TYPES: [&str; 6] = ["string", "boolean", "null", "number", "integer", "any"];

/// Converts a picoschema definition to JSON Schema.
///
/// Inputs that already look like JSON Schema (a mapping with a scalar,
/// `object`, or `array` `type`, or with a `properties` mapping) pass through
/// unchanged, which makes the transform idempotent. A `None` or null input
/// yields `None`.
///
/// # Errors
///
/// Fails on an unknown parenthetical type, a value that is neither string
/// nor mapping, or a named type that the resolver chain cannot supply.
pub fn picoschema(
    schema: Option<&Value>,
    resolver: Option<&dyn SchemaResolver>,
) -> Result<Option<JsonSchema>> {
    let Some(schema) = schema else {
        return Ok(None);
    };
    if schema.is_null() {
        return Ok(None);
    }

    // Allow named schemas and scalars at the top level.
    if let Some(text) = schema.as_str() {
        let (type_name, description) = split_type_and_description(text);
        if SCALAR_TYPES.contains(&type_name) {
            return Ok(Some(scalar_schema(type_name, description)));
        }
        let resolved = must_resolve(type_name, resolver)?;
        return Ok(Some(with_description(resolved, description)));
    }

    if let Some(mapping) = schema.as_object() {
        if let Some(type_name) = mapping.get("type").and_then(Value::as_str) {
            if type_name == "object" || type_name == "array" || SCALAR_TYPES.contains(&type_name) {
                return Ok(Some(schema.clone()));
            }
        }
        if mapping.get("properties").is_some_and(Value::is_object) {
            let mut out = mapping.clone();
            out.insert("type".to_string(), json!("object"));
            return Ok(Some(Value::Object(out)));
        }
        return parse_pico(schema, resolver).map(Some);
    }

    Err(DotpromptError::Picoschema(format!(
        "picoschema definitions must be a string or an object, got: {schema}"
    )))
}

/// Recursively desugars a pico value into JSON Schema.
fn parse_pico(value: &Value, resolver: Option<&dyn SchemaResolver>) -> Result<JsonSchema> {
    let mapping = match value {
        Value::String(text) => {
            let (type_name, description) = split_type_and_description(text);
            if SCALAR_TYPES.contains(&type_name) {
                return Ok(scalar_schema(type_name, description));
            }
            let resolved = must_resolve(type_name, resolver)?;
            return Ok(with_description(resolved, description));
        }
        Value::Object(mapping) => mapping,
        other => {
            return Err(DotpromptError::Picoschema(format!(
                "unsupported picoschema value: {other}"
            )));
        }
    };

    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();
    let mut additional_properties = Value::Bool(false);

    for (key, entry) in mapping {
        if key == WILDCARD_PROPERTY_NAME {
            additional_properties = parse_pico(entry, resolver)?;
            continue;
        }

        let (name_part, paren_part) = match key.split_once('(') {
            Some((name, paren)) => (name, Some(paren)),
            None => (key.as_str(), None),
        };

        let is_optional = name_part.ends_with('?');
        let property_name = name_part.strip_suffix('?').unwrap_or(name_part);
        if !is_optional {
            required.push(property_name.to_string());
        }

        let Some(paren_part) = paren_part else {
            let mut prop = parse_pico(entry, resolver)?;
            if is_optional {
                make_nullable(&mut prop);
            }
            properties.insert(property_name.to_string(), prop);
            continue;
        };

        let spec = paren_part.strip_suffix(')').unwrap_or(paren_part);
        let (type_name, description) = split_type_and_description(spec);
        let prop = match type_name {
            "array" => {
                let item_type = if is_optional {
                    json!(["array", "null"])
                } else {
                    json!("array")
                };
                json!({"type": item_type, "items": parse_pico(entry, resolver)?})
            }
            "object" => {
                let mut prop = parse_pico(entry, resolver)?;
                if is_optional {
                    make_nullable(&mut prop);
                }
                prop
            }
            "enum" => {
                let Value::Array(options) = entry else {
                    return Err(DotpromptError::Picoschema(format!(
                        "enum values must be a sequence, got: {entry}"
                    )));
                };
                let mut options = options.clone();
                if is_optional && !options.contains(&Value::Null) {
                    options.push(Value::Null);
                }
                json!({"enum": options})
            }
            other => {
                return Err(DotpromptError::Picoschema(format!(
                    "parenthetical types must be array, object, or enum, got: {other}"
                )));
            }
        };
        properties.insert(property_name.to_string(), with_description(prop, description));
    }

    let mut out = Map::new();
    out.insert("type".to_string(), json!("object"));
    out.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        required.sort();
        out.insert("required".to_string(), json!(required));
    }
    out.insert("additionalProperties".to_string(), additional_properties);
    Ok(Value::Object(out))
}

/// Splits a type spec at its first comma into `(type, description)`.
fn split_type_and_description(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(',') {
        Some((type_name, description)) => (type_name.trim(), Some(description.trim())),
        None => (spec.trim(), None),
    }
}

/// Builds the schema for a scalar type name. `any` carries no constraint.
fn scalar_schema(type_name: &str, description: Option<&str>) -> JsonSchema {
    let base = if type_name == "any" {
        json!({})
    } else {
        json!({"type": type_name})
    };
    with_description(base, description)
}

/// Attaches a non-empty description to a schema mapping.
fn with_description(mut schema: JsonSchema, description: Option<&str>) -> JsonSchema {
    if let (Some(desc), Value::Object(mapping)) = (description, &mut schema) {
        if !desc.is_empty() {
            mapping.insert("description".to_string(), json!(desc));
        }
    }
    schema
}

/// Rewrites a schema's `type` to its nullable form `[type, "null"]`,
/// preserving every other field.
fn make_nullable(schema: &mut JsonSchema) {
    if let Value::Object(mapping) = schema {
        if let Some(Value::String(type_name)) = mapping.get("type") {
            let nullable = json!([type_name, "null"]);
            mapping.insert("type".to_string(), nullable);
        }
    }
}

/// Resolves a named schema, failing when no resolver is configured or the
/// name is unknown.
fn must_resolve(name: &str, resolver: Option<&dyn SchemaResolver>) -> Result<JsonSchema> {
    let resolved = match resolver {
        Some(resolver) => resolver.resolve(name)?,
        None => None,
    };
    resolved.ok_or_else(|| DotpromptError::UnresolvedSchema(name.to_string()))
}
