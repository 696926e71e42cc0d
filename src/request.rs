//! Query requests: the immutable descriptor of one query.
//!
//! A [`QueryRequest`] carries the prompt, the [`Model`] and a map of extra
//! CLI options. It is built with [`QueryRequest::builder()`], which validates
//! everything up front so a bad request fails before any process is spawned.
//!
//! # Example
//!
//! ```rust
//! use claude_query::{Model, QueryRequest};
//!
//! let request = QueryRequest::builder()
//!     .prompt("Hi")
//!     .model("claude-3-5-haiku-20241022")
//!     .max_turns(1)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.model(), Model::Claude35Haiku);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Option names rendered by [`QueryRequest::to_cli_args`] itself.
const RESERVED_OPTIONS: &[&str] = &["print", "output-format", "input-format", "model", "verbose"];

// ── Model ────────────────────────────────────────────────────────────────────

/// The set of model identifiers a request may name.
///
/// Covers the dated model ids and the short aliases the CLI resolves itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    /// `claude-3-5-haiku-20241022`
    #[serde(rename = "claude-3-5-haiku-20241022")]
    Claude35Haiku,
    /// `claude-3-5-sonnet-20241022`
    #[serde(rename = "claude-3-5-sonnet-20241022")]
    Claude35Sonnet,
    /// `claude-3-7-sonnet-20250219`
    #[serde(rename = "claude-3-7-sonnet-20250219")]
    Claude37Sonnet,
    /// `claude-sonnet-4-20250514`
    #[serde(rename = "claude-sonnet-4-20250514")]
    ClaudeSonnet4,
    /// `claude-opus-4-20250514`
    #[serde(rename = "claude-opus-4-20250514")]
    ClaudeOpus4,
    /// `claude-opus-4-1-20250805`
    #[serde(rename = "claude-opus-4-1-20250805")]
    ClaudeOpus41,
    /// The `haiku` alias.
    #[serde(rename = "haiku")]
    Haiku,
    /// The `sonnet` alias.
    #[serde(rename = "sonnet")]
    Sonnet,
    /// The `opus` alias.
    #[serde(rename = "opus")]
    Opus,
}

impl Model {
    /// Every known model, in declaration order.
    pub const ALL: &'static [Model] = &[
        Self::Claude35Haiku,
        Self::Claude35Sonnet,
        Self::Claude37Sonnet,
        Self::ClaudeSonnet4,
        Self::ClaudeOpus4,
        Self::ClaudeOpus41,
        Self::Haiku,
        Self::Sonnet,
        Self::Opus,
    ];

    /// The identifier passed to `--model`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude35Haiku => "claude-3-5-haiku-20241022",
            Self::Claude35Sonnet => "claude-3-5-sonnet-20241022",
            Self::Claude37Sonnet => "claude-3-7-sonnet-20250219",
            Self::ClaudeSonnet4 => "claude-sonnet-4-20250514",
            Self::ClaudeOpus4 => "claude-opus-4-20250514",
            Self::ClaudeOpus41 => "claude-opus-4-1-20250805",
            Self::Haiku => "haiku",
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
        }
    }

    /// Returns `true` for the short aliases the CLI resolves to a dated id.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        matches!(self, Self::Haiku | Self::Sonnet | Self::Opus)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == id)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown model identifier: {s:?}")))
    }
}

// ── QueryRequest ─────────────────────────────────────────────────────────────

/// An immutable, validated query descriptor.
///
/// Fields are only reachable through shared accessors; once built, a request
/// never changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    prompt: String,
    model: Model,
    options: BTreeMap<String, serde_json::Value>,
}

impl QueryRequest {
    /// Start building a request.
    #[must_use]
    pub fn builder() -> QueryRequestBuilder {
        QueryRequestBuilder::default()
    }

    /// The prompt text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The selected model.
    #[must_use]
    pub fn model(&self) -> Model {
        self.model
    }

    /// Extra options, keyed by CLI flag name (without `--`).
    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.options
    }

    /// Look up a single option.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&serde_json::Value> {
        self.options.get(name)
    }

    /// Render the request as CLI arguments (without the binary path).
    ///
    /// Options are emitted in sorted order: `true` becomes a bare flag,
    /// `false` and `null` are omitted, arrays repeat the flag per element and
    /// objects are passed as JSON text. The prompt goes last, after `--`, so
    /// a prompt starting with `-` is never read as a flag.
    #[must_use]
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_owned(),
            "stream-json".to_owned(),
            "--verbose".to_owned(),
            "--model".to_owned(),
            self.model.as_str().to_owned(),
        ];

        for (name, value) in &self.options {
            push_option(&mut args, name, value);
        }

        args.push("--print".into());
        args.push("--".into());
        args.push(self.prompt.clone());
        args
    }
}

fn push_option(args: &mut Vec<String>, name: &str, value: &serde_json::Value) {
    use serde_json::Value;

    let flag = format!("--{name}");
    match value {
        Value::Null | Value::Bool(false) => {}
        Value::Bool(true) => args.push(flag),
        Value::String(s) => {
            args.push(flag);
            args.push(s.clone());
        }
        Value::Number(n) => {
            args.push(flag);
            args.push(n.to_string());
        }
        Value::Array(items) => {
            for item in items {
                push_option(args, name, item);
            }
        }
        Value::Object(_) => {
            args.push(flag);
            args.push(value.to_string());
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Fallible builder for [`QueryRequest`].
///
/// Errors are deferred to [`build()`](Self::build), which reports the first
/// problem found.
#[derive(Debug, Default)]
pub struct QueryRequestBuilder {
    prompt: Option<String>,
    model: Option<std::result::Result<Model, String>>,
    options: BTreeMap<String, serde_json::Value>,
    fallback_model: Option<String>,
}

/// Anything that names a model: a [`Model`] or its string identifier.
pub trait IntoModel {
    /// Resolve to a model, or return the unrecognised identifier.
    fn into_model(self) -> std::result::Result<Model, String>;
}

impl IntoModel for Model {
    fn into_model(self) -> std::result::Result<Model, String> {
        Ok(self)
    }
}

impl IntoModel for &str {
    fn into_model(self) -> std::result::Result<Model, String> {
        self.parse().map_err(|_| self.to_owned())
    }
}

impl IntoModel for String {
    fn into_model(self) -> std::result::Result<Model, String> {
        self.as_str().into_model()
    }
}

impl QueryRequestBuilder {
    /// Set the prompt text. Required, must not be blank.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the model. Required, must be one of [`Model::ALL`].
    #[must_use]
    pub fn model(mut self, model: impl IntoModel) -> Self {
        self.model = Some(model.into_model());
        self
    }

    /// Set an arbitrary CLI option (flag name without the `--` prefix).
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Maximum number of agentic turns (`--max-turns`).
    #[must_use]
    pub fn max_turns(self, turns: u32) -> Self {
        self.option("max-turns", turns)
    }

    /// Replace the system prompt (`--system-prompt`).
    #[must_use]
    pub fn system_prompt(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.option("system-prompt", text)
    }

    /// Append to the default system prompt (`--append-system-prompt`).
    #[must_use]
    pub fn append_system_prompt(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.option("append-system-prompt", text)
    }

    /// Model to fall back to when the primary one is overloaded
    /// (`--fallback-model`). Validated like [`model()`](Self::model).
    #[must_use]
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    /// Validate and build the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the prompt is missing or blank,
    /// the model is missing or unknown, an option name is malformed or
    /// reserved, or the fallback model is unknown or equal to the primary.
    pub fn build(self) -> Result<QueryRequest> {
        let prompt = match self.prompt {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(Error::InvalidRequest("prompt must not be empty".into())),
        };

        let model = match self.model {
            Some(Ok(m)) => m,
            Some(Err(id)) => {
                return Err(Error::InvalidRequest(format!(
                    "unknown model identifier: {id:?}"
                )));
            }
            None => return Err(Error::InvalidRequest("model is required".into())),
        };

        let mut options = self.options;
        let raw_fallback = match options.remove("fallback-model") {
            None => None,
            Some(serde_json::Value::String(id)) => Some(id),
            Some(other) => {
                return Err(Error::InvalidRequest(format!(
                    "fallback-model must be a model identifier, got {other}"
                )));
            }
        };
        for name in options.keys() {
            validate_option_name(name)?;
        }

        if let Some(fallback) = self.fallback_model.or(raw_fallback) {
            let fallback: Model = fallback.parse()?;
            if fallback == model {
                return Err(Error::InvalidRequest(
                    "fallback model must differ from the primary model".into(),
                ));
            }
            options.insert("fallback-model".into(), fallback.as_str().into());
        }

        Ok(QueryRequest {
            prompt,
            model,
            options,
        })
    }
}

fn validate_option_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRequest("option name must not be empty".into()));
    }
    let well_formed = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !well_formed {
        return Err(Error::InvalidRequest(format!(
            "option name {name:?} must be ASCII letters, digits and inner dashes"
        )));
    }
    if RESERVED_OPTIONS.contains(&name) {
        return Err(Error::InvalidRequest(format!(
            "option {name:?} is managed by the request itself"
        )));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────
