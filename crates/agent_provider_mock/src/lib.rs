//! Deterministic mock implementation of the shared `agent_provider` contract.
//!
//! Two modes are supported. A scripted provider replays a fixed event list and
//! is what contract tests use. The keyword provider inspects the latest user
//! turn, calls the data-lookup or image tool when asked to, and echoes the
//! prompt back token by token; the development server runs on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_provider::{
    ModelEvent, ModelEventStream, ModelProvider, ModelRequest, ProviderProfile, ToolQuotaCheck,
    DATA_LOOKUP_TOOL, IMAGE_GENERATION_TOOL,
};
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const PRICE_KEYWORDS: &[&str] = &["price", "prices", "prezzi", "quote", "quotazioni"];
const RENDER_KEYWORDS: &[&str] = &["render", "image", "picture", "immagine"];

#[derive(Debug, Clone)]
enum Mode {
    Scripted(Vec<ModelEvent>),
    Keyword,
}

/// Deterministic mock provider used by server tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    mode: Mode,
    token_delay: Duration,
    render_counter: Arc<AtomicU64>,
}

impl MockProvider {
    /// Replays `events` verbatim for every request.
    #[must_use]
    pub fn scripted(events: Vec<ModelEvent>) -> Self {
        Self {
            mode: Mode::Scripted(events),
            token_delay: Duration::ZERO,
            render_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Derives events from the latest user turn.
    #[must_use]
    pub fn keyword() -> Self {
        Self {
            mode: Mode::Keyword,
            token_delay: Duration::ZERO,
            render_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sleeps `delay` before each emitted event.
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::keyword().with_token_delay(Duration::from_millis(30))
    }
}

impl ModelProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: match self.mode {
                Mode::Scripted(_) => "mock-scripted".to_string(),
                Mode::Keyword => "mock".to_string(),
            },
        }
    }

    fn stream(&self, request: ModelRequest) -> ModelEventStream {
        let mode = self.mode.clone();
        let delay = self.token_delay;
        let render_counter = Arc::clone(&self.render_counter);

        let events = stream::once(async move {
            match mode {
                Mode::Scripted(events) => events,
                Mode::Keyword => keyword_events(&request, &render_counter).await,
            }
        })
        .flat_map(stream::iter);

        if delay.is_zero() {
            return Box::pin(events);
        }

        Box::pin(events.then(move |event| async move {
            tokio::time::sleep(delay).await;
            event
        }))
    }
}

async fn keyword_events(request: &ModelRequest, render_counter: &AtomicU64) -> Vec<ModelEvent> {
    let prompt = request.latest_user_text().unwrap_or_default().to_string();
    let lowered = prompt.to_lowercase();
    let mut events = Vec::new();
    let mut call_index = 0usize;

    if mentions_any(&lowered, PRICE_KEYWORDS) {
        call_index += 1;
        let call_id = format!("call_{call_index}");
        let args = json!({ "query": prompt });
        events.push(ModelEvent::tool_call(&call_id, DATA_LOOKUP_TOOL, args.clone()));
        events.push(ModelEvent::tool_result(
            call_id,
            DATA_LOOKUP_TOOL,
            args,
            Value::String(market_quote()),
        ));
    }

    if mentions_any(&lowered, RENDER_KEYWORDS) {
        call_index += 1;
        let call_id = format!("call_{call_index}");
        let args = json!({
            "prompt": prompt,
            "hasImage": !request.images.is_empty(),
        });
        events.push(ModelEvent::tool_call(
            &call_id,
            IMAGE_GENERATION_TOOL,
            args.clone(),
        ));
        let result = render_result(request.tool_quota.as_ref(), render_counter).await;
        events.push(ModelEvent::tool_result(
            call_id,
            IMAGE_GENERATION_TOOL,
            args,
            result,
        ));
    }

    let reply = if prompt.trim().is_empty() {
        "Nothing to answer yet.".to_string()
    } else {
        format!("You said: {prompt}")
    };
    events.extend(tokenize(&reply).into_iter().map(ModelEvent::text));
    events.push(ModelEvent::Finished);
    events
}

async fn render_result(quota: &dyn ToolQuotaCheck, render_counter: &AtomicU64) -> Value {
    let decision = quota.consume(IMAGE_GENERATION_TOOL).await;
    if !decision.allowed {
        tracing::debug!(
            reset_at = decision.reset_at_unix,
            "mock render refused by tool quota"
        );
        return json!({
            "status": "error",
            "error": "render quota exhausted",
        });
    }

    let index = render_counter.fetch_add(1, Ordering::SeqCst) + 1;
    json!({
        "status": "success",
        "imageUrl": format!("https://renders.invalid/mock/{index}.png"),
    })
}

fn market_quote() -> String {
    [
        "| Zone | Price (EUR/m²) |",
        "| --- | --- |",
        "| Centre | 4200 |",
        "| Suburbs | 2650 |",
    ]
    .join("\n")
}

fn mentions_any(haystack: &str, keywords: &[&str]) -> bool {
    haystack
        .split(|ch: char| !ch.is_alphanumeric())
        .any(|word| keywords.contains(&word))
}

/// Splits `text` into word tokens, keeping each trailing space with its word.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending = String::new();
    for ch in text.chars() {
        pending.push(ch);
        if matches!(ch, ' ' | '\n') {
            tokens.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        tokens.push(pending);
    }
    tokens
}
