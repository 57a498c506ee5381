//! Text-channel injection for tool results.
//!
//! Some tool outputs read better inline with the assistant's prose than as a
//! tool card. An injector turns such a result into text that the multiplexer
//! writes as an ordinary text delta ahead of the tool-result frame. It may
//! also replace the result payload that goes out on the wire, so failure
//! detail from a tool backend stays on the server.

use std::collections::HashMap;
use std::sync::Arc;

use agent_provider::{DATA_LOOKUP_TOOL, IMAGE_GENERATION_TOOL};
use serde_json::{json, Value};

pub const RENDER_UNAVAILABLE_APOLOGY: &str =
    "⚠️ Sorry, the rendering service is temporarily unavailable. Please try again in a few minutes.";
pub const RENDER_UNEXPECTED_APOLOGY: &str = "⚠️ An unexpected error occurred. Please try again.";

/// What an injector made of one tool result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Injection {
    /// Text to append to the assistant message.
    pub text: Option<String>,
    /// Replacement for the client-visible result. `None` forwards the original.
    pub result: Option<Value>,
}

impl Injection {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            result: None,
        }
    }

    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

pub trait TextInjector: Send + Sync {
    fn inject(&self, result: &Value) -> Injection;
}

/// Writes data-lookup results into the prose verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataLookupInjector;

impl TextInjector for DataLookupInjector {
    fn inject(&self, result: &Value) -> Injection {
        match result {
            Value::String(text) if text.is_empty() => Injection::default(),
            Value::String(text) => Injection::text(text.clone()),
            other => Injection::text(other.to_string()),
        }
    }
}

/// Turns an image-generation result into an inline image, or an apology on failure.
///
/// Failed results are reduced to their status before they reach the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageInjector;

impl TextInjector for ImageInjector {
    fn inject(&self, result: &Value) -> Injection {
        let status = result.get("status").and_then(Value::as_str);
        let image_url = result
            .get("imageUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty());

        match (status, image_url) {
            (Some("success"), Some(url)) => Injection::text(format!("\n\n![]({url})\n\n")),
            (Some("error"), _) => {
                tracing::warn!(result = %result, "image generation failed");
                Injection::text(format!("\n\n{RENDER_UNAVAILABLE_APOLOGY}\n\n"))
                    .with_result(json!({ "status": "error" }))
            }
            _ => {
                tracing::warn!(result = %result, "image generation returned an unexpected result");
                Injection::text(format!("\n\n{RENDER_UNEXPECTED_APOLOGY}\n\n"))
                    .with_result(json!({ "status": "error" }))
            }
        }
    }
}

/// Injectors keyed by tool name. Tools without an entry only produce tool frames.
#[derive(Clone, Default)]
pub struct InjectorRegistry {
    injectors: HashMap<String, Arc<dyn TextInjector>>,
}

impl InjectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the data-lookup and image-generation injectors installed.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .with(DATA_LOOKUP_TOOL, DataLookupInjector)
            .with(IMAGE_GENERATION_TOOL, ImageInjector)
    }

    #[must_use]
    pub fn with(mut self, tool_name: impl Into<String>, injector: impl TextInjector + 'static) -> Self {
        self.register(tool_name, injector);
        self
    }

    pub fn register(&mut self, tool_name: impl Into<String>, injector: impl TextInjector + 'static) {
        self.injectors.insert(tool_name.into(), Arc::new(injector));
    }

    #[must_use]
    pub fn contains(&self, tool_name: &str) -> bool {
        self.injectors.contains_key(tool_name)
    }

    /// Runs the injector registered for `tool_name`. Unregistered tools inject nothing.
    pub fn inject(&self, tool_name: &str, result: &Value) -> Injection {
        self.injectors
            .get(tool_name)
            .map(|injector| injector.inject(result))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for InjectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<_> = self.injectors.keys().collect();
        tools.sort();
        f.debug_struct("InjectorRegistry").field("tools", &tools).finish()
    }
}
