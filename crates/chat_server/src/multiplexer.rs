//! Adapts a model event stream into wire frames.

use agent_provider::{ModelEvent, ModelEventStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use wire_protocol::{encode, ToolCallRecord, WireFrame};

use crate::injector::InjectorRegistry;

/// Destination for encoded frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Delivers one frame. Returns false once the consumer has gone away.
    async fn send(&mut self, frame: WireFrame) -> bool;
}

#[async_trait]
impl FrameSink for Vec<WireFrame> {
    async fn send(&mut self, frame: WireFrame) -> bool {
        self.push(frame);
        true
    }
}

/// Sink feeding an HTTP response body.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, std::convert::Infallible>>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Result<Bytes, std::convert::Infallible>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: WireFrame) -> bool {
        self.tx.send(Ok(Bytes::from(encode(&frame)))).await.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed { message: String },
}

/// What a finished turn produced, for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    /// Model text plus every injected fragment, in emission order.
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub outcome: TurnOutcome,
    /// True when the sink stopped accepting frames before the model finished.
    pub client_disconnected: bool,
}

impl TurnSummary {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }
}

#[derive(Debug, Clone)]
pub struct Multiplexer {
    injectors: InjectorRegistry,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new(InjectorRegistry::with_defaults())
    }
}

impl Multiplexer {
    #[must_use]
    pub fn new(injectors: InjectorRegistry) -> Self {
        Self { injectors }
    }

    #[must_use]
    pub fn injectors(&self) -> &InjectorRegistry {
        &self.injectors
    }

    /// Drains `events` into `sink` and returns the accumulated turn.
    ///
    /// The model stream is consumed to the end even after the sink closes so
    /// the turn can still be persisted.
    pub async fn run(&self, mut events: ModelEventStream, sink: &mut dyn FrameSink) -> TurnSummary {
        let mut emitter = Emitter {
            sink,
            connected: true,
        };
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut outcome = TurnOutcome::Completed;

        while let Some(event) = events.next().await {
            let terminal = event.is_terminal();
            match event {
                ModelEvent::TextDelta { text: delta } => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    emitter.emit(WireFrame::text(delta)).await;
                }
                ModelEvent::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                } => {
                    tracing::debug!(%tool_call_id, %tool_name, "tool call started");
                    emitter
                        .emit(WireFrame::tool_call(tool_call_id, tool_name, args))
                        .await;
                }
                ModelEvent::ToolResult {
                    tool_call_id,
                    tool_name,
                    args,
                    result,
                } => {
                    let injection = self.injectors.inject(&tool_name, &result);
                    if let Some(fragment) = injection.text.filter(|fragment| !fragment.is_empty()) {
                        text.push_str(&fragment);
                        emitter.emit(WireFrame::text(fragment)).await;
                    }
                    // The record keeps the raw result; the client only sees the replacement.
                    let visible = injection.result.unwrap_or_else(|| result.clone());
                    emitter
                        .emit(WireFrame::tool_result(tool_call_id, visible))
                        .await;
                    tool_calls.push(ToolCallRecord {
                        name: tool_name,
                        args,
                        result,
                    });
                }
                ModelEvent::Error { message } => {
                    tracing::error!(error = %message, "model stream failed");
                    emitter.emit(WireFrame::error(message.clone())).await;
                    outcome = TurnOutcome::Failed { message };
                }
                ModelEvent::Finished => {}
            }
            if terminal {
                break;
            }
        }

        TurnSummary {
            text,
            tool_calls,
            outcome,
            client_disconnected: !emitter.connected,
        }
    }
}

struct Emitter<'a> {
    sink: &'a mut dyn FrameSink,
    connected: bool,
}

impl Emitter<'_> {
    async fn emit(&mut self, frame: WireFrame) {
        if !self.connected {
            return;
        }
        if !self.sink.send(frame).await {
            tracing::debug!("client went away, draining model stream without a reader");
            self.connected = false;
        }
    }
}
