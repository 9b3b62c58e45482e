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

//! The dotprompt engine: registries and the render orchestrator.
//!
//! A [`Dotprompt`] instance owns the Handlebars registry and the named
//! registries for helpers, partials, tools, and schemas. Rendering runs a
//! fixed pipeline: parse, resolve partials to fixpoint, merge metadata
//! (model config defaults, then frontmatter, then caller options), resolve
//! tools, transform picoschema, render the template, and re-parse the
//! rendered stream into messages.
//!
//! Registry writes require `&mut self`; renders from multiple threads must
//! either share a frozen engine or serialize externally, which the borrow
//! checker enforces here.

use crate::error::{DotpromptError, Result};
use crate::helpers::{BUILTIN_HELPER_NAMES, register_builtin_helpers};
use crate::parse::{parse_document, to_messages};
use crate::picoschema::picoschema;
use crate::types::{
    DataArgument, JsonSchema, ParsedPrompt, PartialResolver, PromptMetadata, RenderedPrompt,
    SchemaResolver, ToolDefinition, ToolResolver,
};
use handlebars::{Handlebars, HelperDef};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

static PARTIAL_REFERENCE_RE: OnceLock<Regex> = OnceLock::new();
static MUSTACHE_RE: OnceLock<Regex> = OnceLock::new();
static AT_VARIABLE_RE: OnceLock<Regex> = OnceLock::new();

/// Matches `{{> name}}` partial references in template text.
#[allow(clippy::expect_used)]
fn partial_reference_regex() -> &'static Regex {
    PARTIAL_REFERENCE_RE.get_or_init(|| {
        Regex::new(r"\{\{>\s*([a-zA-Z_][a-zA-Z0-9_.-]*)")
            .expect("failed to compile partial reference regex")
    })
}

/// Matches a single mustache expression.
#[allow(clippy::expect_used)]
fn mustache_regex() -> &'static Regex {
    MUSTACHE_RE
        .get_or_init(|| Regex::new(r"\{\{[^}]*\}\}").expect("failed to compile mustache regex"))
}

/// Matches the `@`-variables dotprompt exposes inside mustaches.
#[allow(clippy::expect_used)]
fn at_variable_regex() -> &'static Regex {
    AT_VARIABLE_RE.get_or_init(|| {
        Regex::new(r"@(metadata|prompt|docs|messages|context|state)\b")
            .expect("failed to compile at-variable regex")
    })
}

/// Rewrites `@metadata`/`@prompt`/`@docs`/`@messages`/`@context`/`@state`
/// references onto the reserved `__metadata` context key.
///
/// Handlebars reserves the `@` prefix for its own private data (`@index`,
/// `@key`, ...), so the metadata bag rides in the render context instead and
/// templates are rewritten to reach it there. Only text inside mustaches is
/// touched; a literal `@docs` in prose renders unchanged.
fn rewrite_at_variables(template: &str) -> String {
    mustache_regex()
        .replace_all(template, |outer: &regex::Captures| {
            at_variable_regex()
                .replace_all(&outer[0], |inner: &regex::Captures| match &inner[1] {
                    "metadata" => "__metadata".to_string(),
                    "state" => "__metadata.context.state".to_string(),
                    name => format!("__metadata.{name}"),
                })
                .into_owned()
        })
        .into_owned()
}

/// Collects the partial names referenced by a template source.
fn identify_partials(template: &str) -> Vec<String> {
    partial_reference_regex()
        .captures_iter(template)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// Copies every set field of `layer` over `out`; `config` is deep-merged one
/// level instead of replaced.
fn shallow_merge(out: &mut PromptMetadata, layer: &PromptMetadata) {
    macro_rules! take_if_set {
        ($($field:ident),*) => {
            $(if layer.$field.is_some() {
                out.$field.clone_from(&layer.$field);
            })*
        };
    }

    out.config = match (out.config.take(), layer.config.clone()) {
        (Some(Value::Object(mut base)), Some(Value::Object(over))) => {
            for (key, value) in over {
                base.insert(key, value);
            }
            Some(Value::Object(base))
        }
        (base, None) => base,
        (_, over) => over,
    };

    take_if_set!(
        name,
        variant,
        version,
        description,
        model,
        tools,
        tool_defs,
        input,
        output,
        raw,
        ext,
        metadata
    );
}

/// Recursively drops null entries and entries that are (or become) empty
/// mappings.
fn prune_empty(value: &mut Value) {
    if let Value::Object(mapping) = value {
        for entry in mapping.values_mut() {
            prune_empty(entry);
        }
        mapping.retain(|_, v| !v.is_null() && !v.as_object().is_some_and(Map::is_empty));
    }
}

/// Strips fields whose values are empty mappings from merged metadata.
fn strip_empty_mappings(meta: &mut PromptMetadata) {
    if let Some(config) = meta.config.as_mut() {
        prune_empty(config);
    }
    if meta
        .config
        .as_ref()
        .is_some_and(|c| c.as_object().is_some_and(Map::is_empty))
    {
        meta.config = None;
    }
    if meta.ext.as_ref().is_some_and(HashMap::is_empty) {
        meta.ext = None;
    }
    if meta.metadata.as_ref().is_some_and(HashMap::is_empty) {
        meta.metadata = None;
    }
    if meta.raw.as_ref().is_some_and(HashMap::is_empty) {
        meta.raw = None;
    }
    if meta
        .input
        .as_ref()
        .is_some_and(|i| i.default.is_none() && i.schema.is_none())
    {
        meta.input = None;
    }
    if meta
        .output
        .as_ref()
        .is_some_and(|o| o.format.is_none() && o.schema.is_none())
    {
        meta.output = None;
    }
}

/// Schema lookup chain: the engine's registry first, then the user resolver.
struct ChainedSchemaResolver<'a> {
    schemas: &'a HashMap<String, JsonSchema>,
    fallback: Option<&'a dyn SchemaResolver>,
}

impl SchemaResolver for ChainedSchemaResolver<'_> {
    fn resolve(&self, name: &str) -> Result<Option<JsonSchema>> {
        if let Some(found) = self.schemas.get(name) {
            return Ok(Some(found.clone()));
        }
        match self.fallback {
            Some(resolver) => resolver.resolve(name),
            None => Ok(None),
        }
    }
}

/// Options for configuring a [`Dotprompt`] instance.
#[derive(Default)]
pub struct DotpromptOptions {
    /// Fallback model when neither frontmatter nor caller options name one.
    pub default_model: Option<String>,

    /// Per-model configuration defaults, merged under frontmatter config.
    pub model_configs: Option<HashMap<String, Value>>,

    /// Initial helper registry.
    pub helpers: Option<HashMap<String, Box<dyn HelperDef + Send + Sync>>>,

    /// Initial partial registry.
    pub partials: Option<HashMap<String, String>>,

    /// Initial tool registry.
    pub tools: Option<HashMap<String, ToolDefinition>>,

    /// Initial schema registry.
    pub schemas: Option<HashMap<String, JsonSchema>>,

    /// Late-binding tool lookup.
    pub tool_resolver: Option<Box<dyn ToolResolver>>,

    /// Late-binding schema lookup.
    pub schema_resolver: Option<Box<dyn SchemaResolver>>,

    /// Late-binding partial lookup.
    pub partial_resolver: Option<Box<dyn PartialResolver>>,
}

impl std::fmt::Debug for DotpromptOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotpromptOptions")
            .field("default_model", &self.default_model)
            .field("model_configs", &self.model_configs)
            .field("helpers", &"<helpers>")
            .field("partials", &self.partials)
            .field("tools", &self.tools)
            .field("schemas", &self.schemas)
            .field("tool_resolver", &self.tool_resolver.as_ref().map(|_| "<resolver>"))
            .field(
                "schema_resolver",
                &self.schema_resolver.as_ref().map(|_| "<resolver>"),
            )
            .field(
                "partial_resolver",
                &self.partial_resolver.as_ref().map(|_| "<resolver>"),
            )
            .finish()
    }
}

/// The dotprompt engine.
///
/// Holds the template registry and the named registries consulted during
/// metadata resolution. Construct once, register definitions, then render
/// any number of prompts against it.
pub struct Dotprompt {
    handlebars: Handlebars<'static>,
    helper_names: HashSet<String>,
    partial_sources: HashMap<String, String>,
    default_model: Option<String>,
    model_configs: HashMap<String, Value>,
    tools: HashMap<String, ToolDefinition>,
    schemas: HashMap<String, JsonSchema>,
    tool_resolver: Option<Box<dyn ToolResolver>>,
    schema_resolver: Option<Box<dyn SchemaResolver>>,
    partial_resolver: Option<Box<dyn PartialResolver>>,
}

impl std::fmt::Debug for Dotprompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dotprompt")
            .field("handlebars", &"<handlebars>")
            .field("helper_names", &self.helper_names)
            .field("partial_sources", &self.partial_sources)
            .field("default_model", &self.default_model)
            .field("model_configs", &self.model_configs)
            .field("tools", &self.tools)
            .field("schemas", &self.schemas)
            .field("tool_resolver", &self.tool_resolver.as_ref().map(|_| "<resolver>"))
            .field(
                "schema_resolver",
                &self.schema_resolver.as_ref().map(|_| "<resolver>"),
            )
            .field(
                "partial_resolver",
                &self.partial_resolver.as_ref().map(|_| "<resolver>"),
            )
            .finish()
    }
}

impl Dotprompt {
    /// Creates a new engine.
    ///
    /// Built-in helpers are registered here and nowhere else, so they are
    /// registered exactly once per engine. HTML escaping is disabled: the
    /// sentinel markers and JSON payloads must reach the post-render parser
    /// verbatim.
    #[must_use]
    pub fn new(options: Option<DotpromptOptions>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        register_builtin_helpers(&mut handlebars);

        let mut helper_names: HashSet<String> = BUILTIN_HELPER_NAMES
            .iter()
            .map(ToString::to_string)
            .collect();

        let opts = options.unwrap_or_default();
        if let Some(helpers) = opts.helpers {
            for (name, helper) in helpers {
                handlebars.register_helper(&name, helper);
                helper_names.insert(name);
            }
        }
        let mut partial_sources = HashMap::new();
        if let Some(partials) = opts.partials {
            for (name, source) in partials {
                if handlebars.register_template_string(&name, &source).is_ok() {
                    partial_sources.insert(name, source);
                }
            }
        }

        Self {
            handlebars,
            helper_names,
            partial_sources,
            default_model: opts.default_model,
            model_configs: opts.model_configs.unwrap_or_default(),
            tools: opts.tools.unwrap_or_default(),
            schemas: opts.schemas.unwrap_or_default(),
            tool_resolver: opts.tool_resolver,
            schema_resolver: opts.schema_resolver,
            partial_resolver: opts.partial_resolver,
        }
    }

    /// Registers a helper function.
    ///
    /// # Errors
    ///
    /// Fails when the name is already registered. Helper functions have no
    /// observable identity, so every same-name redefinition is treated as
    /// the conflicting case.
    pub fn define_helper(
        &mut self,
        name: impl Into<String>,
        helper: Box<dyn HelperDef + Send + Sync>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.helper_names.contains(&name) {
            return Err(DotpromptError::HelperConflict(name));
        }
        self.handlebars.register_helper(&name, helper);
        self.helper_names.insert(name);
        Ok(self)
    }

    /// Registers a partial template, replacing any previous source under the
    /// same name.
    ///
    /// # Errors
    ///
    /// Fails when the partial source does not compile.
    pub fn define_partial(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let source = source.into();
        self.handlebars
            .register_template_string(&name, &source)
            .map_err(|e| DotpromptError::Compilation(e.to_string()))?;
        self.partial_sources.insert(name, source);
        Ok(self)
    }

    /// Registers a tool definition, replacing any previous definition under
    /// the same name.
    pub fn define_tool(&mut self, def: ToolDefinition) -> &mut Self {
        self.tools.insert(def.name.clone(), def);
        self
    }

    /// Registers a named schema for picoschema references.
    ///
    /// # Errors
    ///
    /// Fails when the name is empty or the schema is null.
    pub fn define_schema(
        &mut self,
        name: impl Into<String>,
        schema: JsonSchema,
    ) -> Result<&mut Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DotpromptError::InvalidSchemaDefinition(
                "schema name cannot be empty".to_string(),
            ));
        }
        if schema.is_null() {
            return Err(DotpromptError::InvalidSchemaDefinition(format!(
                "schema '{name}' cannot be null"
            )));
        }
        self.schemas.insert(name, schema);
        Ok(self)
    }

    /// Parses a prompt source into metadata and template.
    ///
    /// # Errors
    ///
    /// Returns an error when a reserved frontmatter field has the wrong
    /// shape; an unparseable frontmatter block is recovered, not surfaced.
    pub fn parse(&self, source: impl AsRef<str>) -> Result<ParsedPrompt> {
        parse_document(source.as_ref())
    }

    /// Parses a source and pre-resolves its partials into a reusable
    /// [`PromptFunction`].
    ///
    /// # Errors
    ///
    /// Returns an error when parsing fails or a resolved partial does not
    /// compile.
    pub fn compile(
        &mut self,
        source: impl AsRef<str>,
        additional_metadata: Option<PromptMetadata>,
    ) -> Result<PromptFunction> {
        let prompt = parse_document(source.as_ref())?;
        self.resolve_partials(&prompt.template)?;
        Ok(PromptFunction {
            prompt,
            additional_metadata,
        })
    }

    /// Renders a prompt source into resolved metadata and messages.
    ///
    /// Takes `&mut self` because partial resolution may register templates;
    /// see [`PromptFunction::render`] for the shared-reference path once a
    /// prompt is compiled.
    ///
    /// # Errors
    ///
    /// Returns an error when parsing, metadata resolution, or template
    /// rendering fails.
    pub fn render(
        &mut self,
        source: impl AsRef<str>,
        data: &DataArgument,
        options: Option<&PromptMetadata>,
    ) -> Result<RenderedPrompt> {
        let function = self.compile(source.as_ref(), None)?;
        function.render(self, data, options)
    }

    /// Resolves a prompt's metadata without rendering its body: parse,
    /// resolve partials, select the model, merge, resolve tools, and expand
    /// picoschema. Unlike [`Dotprompt::render`], the result keeps `input`.
    ///
    /// # Errors
    ///
    /// Returns an error when parsing or metadata resolution fails.
    pub fn render_metadata(
        &mut self,
        source: impl AsRef<str>,
        options: Option<&PromptMetadata>,
    ) -> Result<PromptMetadata> {
        let parsed = parse_document(source.as_ref())?;
        self.resolve_partials(&parsed.template)?;
        self.resolve_metadata(&parsed.metadata, options)
    }

    /// Discovers and registers partials transitively until no new names
    /// appear.
    ///
    /// Names the resolver cannot supply stay unregistered; the engine then
    /// fails at render time when such a partial is actually reached.
    fn resolve_partials(&mut self, template: &str) -> Result<()> {
        let mut pending = identify_partials(template);
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            // Already-registered partials still get scanned so that the
            // names they reference are discovered too.
            if let Some(source) = self.partial_sources.get(&name) {
                pending.extend(identify_partials(source));
                continue;
            }
            if self.handlebars.get_template(&name).is_some() {
                continue;
            }
            let Some(resolver) = &self.partial_resolver else {
                continue;
            };
            if let Some(source) = resolver.resolve(&name)? {
                self.handlebars
                    .register_template_string(&name, &source)
                    .map_err(|e| DotpromptError::Compilation(e.to_string()))?;
                pending.extend(identify_partials(&source));
                self.partial_sources.insert(name, source);
            }
        }
        Ok(())
    }

    /// Merges metadata layers and resolves tools and schemas.
    fn resolve_metadata(
        &self,
        parsed: &PromptMetadata,
        options: Option<&PromptMetadata>,
    ) -> Result<PromptMetadata> {
        let selected_model = options
            .and_then(|o| o.model.as_ref())
            .or(parsed.model.as_ref())
            .or(self.default_model.as_ref())
            .cloned();
        let model_config = selected_model
            .as_ref()
            .and_then(|model| self.model_configs.get(model))
            .cloned();

        let mut merged = PromptMetadata {
            config: model_config,
            ..PromptMetadata::default()
        };
        shallow_merge(&mut merged, parsed);
        if let Some(options) = options {
            shallow_merge(&mut merged, options);
        }
        merged.model = selected_model;
        strip_empty_mappings(&mut merged);

        let mut merged = self.resolve_tools(merged)?;
        self.expand_schemas(&mut merged)?;
        Ok(merged)
    }

    /// Moves resolvable tool names into `tool_defs`.
    ///
    /// Registry hits move over directly; otherwise the tool resolver is
    /// consulted and a `None` fails the render. Without a resolver, unknown
    /// names stay behind in `tools`.
    fn resolve_tools(&self, mut meta: PromptMetadata) -> Result<PromptMetadata> {
        let Some(names) = meta.tools.take() else {
            return Ok(meta);
        };

        let mut unresolved = Vec::new();
        let mut defs = meta.tool_defs.take().unwrap_or_default();
        for name in names {
            if let Some(def) = self.tools.get(&name) {
                defs.push(def.clone());
            } else if let Some(resolver) = &self.tool_resolver {
                match resolver.resolve(&name)? {
                    Some(def) => defs.push(def),
                    None => return Err(DotpromptError::UnresolvedTool(name)),
                }
            } else {
                unresolved.push(name);
            }
        }

        meta.tools = Some(unresolved);
        if !defs.is_empty() {
            meta.tool_defs = Some(defs);
        }
        Ok(meta)
    }

    /// Expands picoschema in `input.schema` and `output.schema`.
    fn expand_schemas(&self, meta: &mut PromptMetadata) -> Result<()> {
        let resolver = ChainedSchemaResolver {
            schemas: &self.schemas,
            fallback: self.schema_resolver.as_deref(),
        };
        if let Some(input) = meta.input.as_mut() {
            input.schema = picoschema(input.schema.as_ref(), Some(&resolver))?;
        }
        if let Some(output) = meta.output.as_mut() {
            output.schema = picoschema(output.schema.as_ref(), Some(&resolver))?;
        }
        Ok(())
    }

    /// Renders an already-parsed prompt. Partials must be resolved.
    fn render_parsed(
        &self,
        parsed: &ParsedPrompt,
        data: &DataArgument,
        options: Option<&PromptMetadata>,
    ) -> Result<RenderedPrompt> {
        let mut metadata = self.resolve_metadata(&parsed.metadata, options)?;
        // Input defaults are consumed by rendering and dropped from the
        // rendered prompt's metadata.
        let input_config = metadata.input.take();

        let template = rewrite_at_variables(&parsed.template);

        let mut context = Map::new();
        if let Some(defaults) = input_config.as_ref().and_then(|i| i.default.as_ref()) {
            for (key, value) in defaults {
                context.insert(key.clone(), value.clone());
            }
        }

        let rendered = match data.input.as_ref() {
            // A non-object input becomes the context wholesale.
            Some(other) if !other.is_object() => self.handlebars.render_template(&template, other),
            input => {
                if let Some(Value::Object(fields)) = input {
                    for (key, value) in fields {
                        context.insert(key.clone(), value.clone());
                    }
                }
                let metadata_bag = json!({
                    "prompt": serde_json::to_value(&metadata)?,
                    "docs": serde_json::to_value(&data.docs)?,
                    "messages": serde_json::to_value(&data.messages)?,
                    "context": serde_json::to_value(&data.context)?,
                });
                context.insert("__metadata".to_string(), metadata_bag);
                self.handlebars
                    .render_template(&template, &Value::Object(context))
            }
        }
        .map_err(|e| DotpromptError::Render(e.to_string()))?;

        let messages = to_messages(&rendered, Some(data));
        Ok(RenderedPrompt { metadata, messages })
    }
}

/// A compiled prompt: parsed once, partials resolved, renderable many times
/// against the engine that compiled it.
#[derive(Debug, Clone)]
pub struct PromptFunction {
    /// The parsed prompt.
    pub prompt: ParsedPrompt,

    /// Metadata overlay captured at compile time, used when the render call
    /// passes no options of its own.
    pub additional_metadata: Option<PromptMetadata>,
}

impl PromptFunction {
    /// Renders the compiled prompt with the given data.
    ///
    /// # Errors
    ///
    /// Returns an error when metadata resolution or template rendering
    /// fails.
    pub fn render(
        &self,
        engine: &Dotprompt,
        data: &DataArgument,
        options: Option<&PromptMetadata>,
    ) -> Result<RenderedPrompt> {
        let overlay = options.or(self.additional_metadata.as_ref());
        engine.render_parsed(&self.prompt, data, overlay)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;

    #[test]
    fn test_rewrite_at_variables() {
        assert_eq!(
            rewrite_at_variables("{{@metadata.prompt.model}}"),
            "{{__metadata.prompt.model}}"
        );
        assert_eq!(rewrite_at_variables("{{ @docs }}"), "{{ __metadata.docs }}");
        assert_eq!(
            rewrite_at_variables("{{#if @context.user}}hi{{/if}}"),
            "{{#if __metadata.context.user}}hi{{/if}}"
        );
        assert_eq!(
            rewrite_at_variables("{{@state.flag}}"),
            "{{__metadata.context.state.flag}}"
        );
        // Prose outside mustaches is untouched.
        assert_eq!(rewrite_at_variables("email @docs today"), "email @docs today");
    }

    #[test]
    fn test_identify_partials() {
        let names = identify_partials("{{> header}} body {{>footer}} {{name}}");
        assert!(names.contains(&"header".to_string()));
        assert!(names.contains(&"footer".to_string()));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_render_variable_substitution() {
        let mut engine = Dotprompt::new(None);
        let data = DataArgument {
            input: Some(json!({"name": "Michael"})),
            ..DataArgument::default()
        };
        let rendered = engine
            .render("Hello, {{name}}!\n", &data, None)
            .expect("render should succeed");
        assert_eq!(rendered.messages.len(), 1);
        assert_eq!(rendered.messages[0].role, Role::User);
        assert_eq!(
            serde_json::to_value(&rendered.messages).expect("serialize"),
            json!([{"role": "user", "content": [{"text": "Hello, Michael!\n"}]}])
        );
    }

    #[test]
    fn test_render_uses_input_defaults() {
        let mut engine = Dotprompt::new(None);
        let source = "---\ninput:\n  default:\n    name: World\n---\nHello, {{name}}!";
        let rendered = engine
            .render(source, &DataArgument::default(), None)
            .expect("render should succeed");
        assert_eq!(
            serde_json::to_value(&rendered.messages[0].content).expect("serialize"),
            json!([{"text": "Hello, World!"}])
        );
        // Consumed defaults do not appear in the rendered metadata.
        assert!(rendered.metadata.input.is_none());
    }

    #[test]
    fn test_caller_input_overrides_defaults() {
        let mut engine = Dotprompt::new(None);
        let source = "---\ninput:\n  default:\n    name: World\n---\nHello, {{name}}!";
        let data = DataArgument {
            input: Some(json!({"name": "Michael"})),
            ..DataArgument::default()
        };
        let rendered = engine.render(source, &data, None).expect("render should succeed");
        assert_eq!(
            serde_json::to_value(&rendered.messages[0].content).expect("serialize"),
            json!([{"text": "Hello, Michael!"}])
        );
    }

    #[test]
    fn test_model_selection_and_config_merge() {
        let mut engine = Dotprompt::new(Some(DotpromptOptions {
            default_model: Some("default-model".to_string()),
            model_configs: Some(HashMap::from([(
                "frontmatter-model".to_string(),
                json!({"temperature": 0.7, "topK": 20}),
            )])),
            ..DotpromptOptions::default()
        }));

        let source = "---\nmodel: frontmatter-model\nconfig:\n  temperature: 0.9\n---\nBody";
        let metadata = engine
            .render_metadata(source, None)
            .expect("metadata should resolve");
        assert_eq!(metadata.model.as_deref(), Some("frontmatter-model"));
        assert_eq!(metadata.config, Some(json!({"temperature": 0.9, "topK": 20})));
    }

    #[test]
    fn test_default_model_applies() {
        let mut engine = Dotprompt::new(Some(DotpromptOptions {
            default_model: Some("default-model".to_string()),
            ..DotpromptOptions::default()
        }));
        let metadata = engine
            .render_metadata("Body", None)
            .expect("metadata should resolve");
        assert_eq!(metadata.model.as_deref(), Some("default-model"));
    }

    #[test]
    fn test_options_model_wins() {
        let mut engine = Dotprompt::new(None);
        let overlay = PromptMetadata {
            model: Some("override-model".to_string()),
            ..PromptMetadata::default()
        };
        let metadata = engine
            .render_metadata("---\nmodel: frontmatter-model\n---\nBody", Some(&overlay))
            .expect("metadata should resolve");
        assert_eq!(metadata.model.as_deref(), Some("override-model"));
    }

    #[test]
    fn test_registered_tools_move_to_tool_defs() {
        let mut engine = Dotprompt::new(None);
        engine.define_tool(ToolDefinition {
            name: "search".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
            output_schema: None,
        });
        let metadata = engine
            .render_metadata("---\ntools: [search, unknown]\n---\nBody", None)
            .expect("metadata should resolve");
        assert_eq!(metadata.tools, Some(vec!["unknown".to_string()]));
        let defs = metadata.tool_defs.expect("tool defs should be set");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "search");
    }

    #[test]
    fn test_tool_resolver_failure_is_fatal() {
        let resolver = |_: &str| -> Result<Option<ToolDefinition>> { Ok(None) };
        let mut engine = Dotprompt::new(Some(DotpromptOptions {
            tool_resolver: Some(Box::new(resolver)),
            ..DotpromptOptions::default()
        }));
        let result = engine.render_metadata("---\ntools: [missing]\n---\nBody", None);
        assert!(matches!(result, Err(DotpromptError::UnresolvedTool(_))));
    }

    #[test]
    fn test_input_schema_expansion() {
        let mut engine = Dotprompt::new(None);
        let source = "---\ninput:\n  schema:\n    name: string\n    age?: integer\n---\nBody";
        let metadata = engine
            .render_metadata(source, None)
            .expect("metadata should resolve");
        let schema = metadata
            .input
            .expect("input should survive render_metadata")
            .schema
            .expect("schema should be expanded");
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["name"]));
    }

    #[test]
    fn test_named_schema_resolution_from_registry() {
        let mut engine = Dotprompt::new(None);
        engine
            .define_schema("Person", json!({"type": "object", "properties": {}}))
            .expect("definition should succeed");
        let metadata = engine
            .render_metadata("---\noutput:\n  schema: Person\n---\nBody", None)
            .expect("metadata should resolve");
        let schema = metadata.output.expect("output").schema.expect("schema");
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn test_define_schema_preconditions() {
        let mut engine = Dotprompt::new(None);
        assert!(matches!(
            engine.define_schema("", json!({"type": "object"})),
            Err(DotpromptError::InvalidSchemaDefinition(_))
        ));
        assert!(matches!(
            engine.define_schema("Null", Value::Null),
            Err(DotpromptError::InvalidSchemaDefinition(_))
        ));
    }

    #[test]
    fn test_helper_redefinition_conflicts() {
        use handlebars::{Context, Helper, HelperResult, Output, RenderContext};
        fn noop(
            _: &Helper,
            _: &Handlebars,
            _: &Context,
            _: &mut RenderContext,
            _: &mut dyn Output,
        ) -> HelperResult {
            Ok(())
        }

        let mut engine = Dotprompt::new(None);
        // A built-in name conflicts.
        assert!(matches!(
            engine.define_helper("role", Box::new(noop)),
            Err(DotpromptError::HelperConflict(_))
        ));
        // A fresh name registers once, then conflicts.
        engine
            .define_helper("shout", Box::new(noop))
            .expect("new name should register");
        assert!(matches!(
            engine.define_helper("shout", Box::new(noop)),
            Err(DotpromptError::HelperConflict(_))
        ));
    }

    #[test]
    fn test_partials_resolve_transitively() {
        let resolver = |name: &str| -> Result<Option<String>> {
            Ok(match name {
                "outer" => Some("outer({{> inner}})".to_string()),
                "inner" => Some("inner".to_string()),
                _ => None,
            })
        };
        let mut engine = Dotprompt::new(Some(DotpromptOptions {
            partial_resolver: Some(Box::new(resolver)),
            ..DotpromptOptions::default()
        }));
        let rendered = engine
            .render("{{> outer}}", &DataArgument::default(), None)
            .expect("render should succeed");
        assert_eq!(
            serde_json::to_value(&rendered.messages[0].content).expect("serialize"),
            json!([{"text": "outer(inner)"}])
        );
    }

    #[test]
    fn test_unresolved_partial_fails_at_render() {
        let mut engine = Dotprompt::new(None);
        let result = engine.render("{{> nowhere}}", &DataArgument::default(), None);
        assert!(matches!(result, Err(DotpromptError::Render(_))));
    }

    #[test]
    fn test_metadata_bag_access() {
        let mut engine = Dotprompt::new(None);
        let data = DataArgument {
            input: Some(json!({"name": "x"})),
            context: Some(HashMap::from([("state".to_string(), json!({"flag": "on"}))])),
            ..DataArgument::default()
        };
        let rendered = engine
            .render(
                "---\nmodel: test-model\n---\nmodel={{@metadata.prompt.model}} flag={{@state.flag}}",
                &data,
                None,
            )
            .expect("render should succeed");
        assert_eq!(
            serde_json::to_value(&rendered.messages[0].content).expect("serialize"),
            json!([{"text": "model=test-model flag=on"}])
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut engine = Dotprompt::new(None);
        let source = "---\nmodel: m\ninput:\n  schema:\n    name: string\n---\nHi {{name}}";
        let data = DataArgument {
            input: Some(json!({"name": "a"})),
            ..DataArgument::default()
        };
        let first = engine.render(source, &data, None).expect("render should succeed");
        let second = engine.render(source, &data, None).expect("render should succeed");
        assert_eq!(
            serde_json::to_value(&first).expect("serialize"),
            serde_json::to_value(&second).expect("serialize")
        );
    }

    #[test]
    fn test_compile_then_render_many() {
        let mut engine = Dotprompt::new(None);
        let function = engine
            .compile("Hello, {{name}}!", None)
            .expect("compile should succeed");
        for name in ["a", "b"] {
            let data = DataArgument {
                input: Some(json!({"name": name})),
                ..DataArgument::default()
            };
            let rendered = function
                .render(&engine, &data, None)
                .expect("render should succeed");
            assert_eq!(
                serde_json::to_value(&rendered.messages[0].content).expect("serialize"),
                json!([{"text": format!("Hello, {name}!")}])
            );
        }
    }
}
