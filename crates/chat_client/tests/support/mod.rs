#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chat_client::{
    BodyStream, CancelSignal, ChatController, ChatResponse, ChatTransport, ClientError,
    CredentialProvider, QuotaSnapshot, RequestPhase,
};
use futures_util::stream;
use tokio::sync::mpsc;
use wire_protocol::{ChatRequest, Message};

/// What the next `open` call should produce.
pub enum Reply {
    Chunks(Vec<&'static str>),
    Live(mpsc::Receiver<Bytes>),
    Fail(ClientError),
}

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub tokens: Mutex<Vec<String>>,
    pub history: Mutex<Vec<Message>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    pub fn open_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(
        &self,
        request: &ChatRequest,
        token: &str,
        _cancel: &CancelSignal,
    ) -> Result<ChatResponse, ClientError> {
        lock_unpoisoned(&self.requests).push(request.clone());
        lock_unpoisoned(&self.tokens).push(token.to_string());

        let reply = lock_unpoisoned(&self.replies)
            .pop_front()
            .unwrap_or(Reply::Chunks(Vec::new()));
        let body: BodyStream = match reply {
            Reply::Chunks(chunks) => Box::pin(stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, ClientError>(Bytes::from_static(chunk.as_bytes()))),
            )),
            Reply::Live(receiver) => Box::pin(stream::unfold(receiver, |mut receiver| async move {
                receiver
                    .recv()
                    .await
                    .map(|chunk| (Ok::<_, ClientError>(chunk), receiver))
            })),
            Reply::Fail(error) => return Err(error),
        };

        Ok(ChatResponse {
            quota: Some(QuotaSnapshot {
                limit: Some(20),
                remaining: Some(19),
                reset_at: Some("2026-01-01T00:01:00Z".to_string()),
            }),
            body,
        })
    }

    async fn history(&self, _session_id: &str, token: &str) -> Result<Vec<Message>, ClientError> {
        lock_unpoisoned(&self.tokens).push(token.to_string());
        Ok(lock_unpoisoned(&self.history).clone())
    }
}

/// Hands out `token-1`, `token-2`, ... so tests can tell requests apart.
#[derive(Default)]
pub struct CountingCredentials {
    issued: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn fresh_token(&self) -> Result<Option<String>, ClientError> {
        let index = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("token-{index}")))
    }
}

pub fn assistant_text(controller: &ChatController) -> String {
    controller
        .messages()
        .last()
        .map(|message| message.text().to_string())
        .unwrap_or_default()
}

pub async fn wait_until<F>(controller: &ChatController, mut ready: F)
where
    F: FnMut(&ChatController) -> bool,
{
    let mut revisions = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready(controller) {
            if revisions.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("condition reached");
}

pub async fn wait_for_phase(controller: &ChatController, phase: RequestPhase) {
    wait_until(controller, |controller| controller.phase() == phase).await;
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
