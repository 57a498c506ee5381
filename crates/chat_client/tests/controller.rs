mod support;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use chat_client::{
    ChatController, ClientError, RequestPhase, StaticCredentials, UserInput,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use wire_protocol::{Message, Role, ToolState};

use support::{
    assistant_text, lock_unpoisoned, wait_for_phase, wait_until, CountingCredentials, Reply,
    ScriptedTransport,
};

fn controller(transport: Arc<ScriptedTransport>) -> Arc<ChatController> {
    Arc::new(ChatController::new(
        transport,
        Arc::new(CountingCredentials::default()),
        "session-1",
    ))
}

#[tokio::test]
async fn streamed_text_and_tool_call_land_on_placeholder() {
    let transport = ScriptedTransport::new(vec![Reply::Chunks(vec![
        "0:\"Hel",
        "lo\"\n9:{\"toolCallId\":\"t1\",\"toolName\":\"x\",\"args\":{}}\n",
    ])]);
    let controller = controller(Arc::clone(&transport));

    let phase = controller.submit("hi").await.expect("submit");

    assert_eq!(phase, RequestPhase::Done);
    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::User);
    assert_eq!(messages[0].text(), "hi");

    let assistant = &messages[1];
    assert_eq!(assistant.role(), Role::Assistant);
    assert_eq!(assistant.text(), "Hello");
    assert_eq!(assistant.tool_invocations().len(), 1);
    let invocation = &assistant.tool_invocations()[0];
    assert_eq!(invocation.tool_call_id(), "t1");
    assert_eq!(invocation.state(), ToolState::Call);
    assert_eq!(controller.error(), None);
    assert_eq!(
        controller.quota().and_then(|quota| quota.remaining),
        Some(19)
    );
}

#[tokio::test]
async fn tool_result_resolves_matching_call() {
    let transport = ScriptedTransport::new(vec![Reply::Chunks(vec![
        "0:\"Hel",
        "lo\"\n9:{\"toolCallId\":\"t1\",\"toolName\":\"x\",\"args\":{}}\n",
        "a:{\"toolCallId\":\"t1\",\"result\":{\"ok\":true}}\n",
    ])]);
    let controller = controller(transport);

    controller.submit("hi").await.expect("submit");

    let messages = controller.messages();
    let invocation = &messages[1].tool_invocations()[0];
    assert_eq!(invocation.state(), ToolState::Result);
    assert_eq!(invocation.result(), Some(&json!({ "ok": true })));
    assert_eq!(messages[1].text(), "Hello");
}

#[tokio::test]
async fn request_carries_session_and_optimistic_user_turn() {
    let transport = ScriptedTransport::new(vec![Reply::Chunks(vec!["0:\"ok\"\n"])]);
    let controller = controller(Arc::clone(&transport));

    controller
        .submit_input(UserInput::text("  render my kitchen ").with_image_url("https://cdn.test/k.jpg"))
        .await
        .expect("submit");

    let requests = lock_unpoisoned(&transport.requests).clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.session_id(), Some("session-1"));
    assert_eq!(request.latest_user_text(), Some("render my kitchen"));
    assert_eq!(request.first_image_url(), Some("https://cdn.test/k.jpg"));
    assert_eq!(request.images, None);
}

#[tokio::test]
async fn cancel_after_first_delta_keeps_partial_text_without_error() {
    let (sender, receiver) = mpsc::channel(8);
    let transport = ScriptedTransport::new(vec![Reply::Live(receiver)]);
    let controller = controller(transport);

    let running = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit("hi").await }
    });

    sender
        .send(Bytes::from_static(b"0:\"Hel\"\n"))
        .await
        .expect("send first delta");
    wait_until(&controller, |controller| assistant_text(controller) == "Hel").await;

    assert!(controller.cancel());
    let _ = sender.send(Bytes::from_static(b"0:\"lo\"\n")).await;

    let phase = running.await.expect("join").expect("submit");
    assert_eq!(phase, RequestPhase::Aborted);
    assert_eq!(controller.error(), None);
    assert_eq!(assistant_text(&controller), "Hel");
    assert!(!controller.cancel());
}

#[tokio::test]
async fn cancel_before_any_frame_drops_empty_placeholder() {
    let (_sender, receiver) = mpsc::channel::<Bytes>(1);
    let transport = ScriptedTransport::new(vec![Reply::Live(receiver)]);
    let controller = controller(transport);

    let running = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit("hi").await }
    });
    wait_for_phase(&controller, RequestPhase::Streaming).await;

    controller.cancel();
    let phase = running.await.expect("join").expect("submit");

    assert_eq!(phase, RequestPhase::Aborted);
    assert_eq!(controller.error(), None);
    let messages = controller.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role(), Role::User);
}

#[tokio::test]
async fn dropped_submit_settles_as_aborted_and_frees_the_controller() {
    let (sender, receiver) = mpsc::channel(8);
    let transport = ScriptedTransport::new(vec![
        Reply::Live(receiver),
        Reply::Chunks(vec!["0:\"again\"\n"]),
    ]);
    let controller = controller(Arc::clone(&transport));
    sender
        .send(Bytes::from_static(b"0:\"Hel\"\n"))
        .await
        .expect("send first delta");

    let timed_out = tokio::time::timeout(Duration::from_millis(100), controller.submit("hi")).await;
    assert!(timed_out.is_err());

    assert_eq!(controller.phase(), RequestPhase::Aborted);
    assert_eq!(controller.error(), None);
    assert_eq!(assistant_text(&controller), "Hel");
    assert!(!controller.cancel());

    let phase = controller.submit("retry").await.expect("not busy");
    assert_eq!(phase, RequestPhase::Done);
    assert_eq!(assistant_text(&controller), "again");
    assert_eq!(transport.open_count(), 2);
    drop(sender);
}

#[tokio::test]
async fn second_submit_while_streaming_is_rejected() {
    let (sender, receiver) = mpsc::channel(1);
    let transport = ScriptedTransport::new(vec![Reply::Live(receiver)]);
    let controller = controller(Arc::clone(&transport));

    let running = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit("first").await }
    });
    wait_for_phase(&controller, RequestPhase::Streaming).await;

    let error = controller.submit("second").await.expect_err("busy");
    assert_matches!(error, ClientError::Busy);
    assert_eq!(transport.open_count(), 1);

    drop(sender);
    let phase = running.await.expect("join").expect("submit");
    assert_eq!(phase, RequestPhase::Done);
    assert_eq!(controller.messages().len(), 2);
}

#[tokio::test]
async fn empty_input_is_rejected_without_touching_transcript() {
    let transport = ScriptedTransport::new(Vec::new());
    let controller = controller(Arc::clone(&transport));

    assert_matches!(controller.submit("   ").await, Err(ClientError::EmptyInput));
    assert!(controller.messages().is_empty());
    assert_eq!(controller.phase(), RequestPhase::Idle);
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test]
async fn missing_credential_errors_without_connecting() {
    let transport = ScriptedTransport::new(Vec::new());
    let controller = ChatController::new(
        Arc::clone(&transport) as Arc<dyn chat_client::ChatTransport>,
        Arc::new(StaticCredentials::signed_out()),
        "session-1",
    );

    let phase = controller.submit("hi").await.expect("submit");

    assert_eq!(phase, RequestPhase::Errored);
    assert_eq!(transport.open_count(), 0);
    assert_eq!(controller.error().as_deref(), Some("no credential available"));
    assert_eq!(controller.messages().len(), 1);
}

#[tokio::test]
async fn every_request_uses_a_fresh_token() {
    let transport = ScriptedTransport::new(vec![
        Reply::Chunks(vec!["0:\"one\"\n"]),
        Reply::Chunks(vec!["0:\"two\"\n"]),
    ]);
    let controller = controller(Arc::clone(&transport));

    controller.submit("first").await.expect("first");
    controller.submit("second").await.expect("second");

    assert_eq!(
        lock_unpoisoned(&transport.tokens).clone(),
        vec!["token-1".to_string(), "token-2".to_string()]
    );
    let requests = lock_unpoisoned(&transport.requests).clone();
    assert_eq!(requests[1].messages.len(), 3);
}

#[tokio::test]
async fn server_error_frame_keeps_partial_text() {
    let transport = ScriptedTransport::new(vec![Reply::Chunks(vec![
        "0:\"partial\"\n3:{\"error\":\"model unavailable\"}\n0:\"ignored\"\n",
    ])]);
    let controller = controller(transport);

    let phase = controller.submit("hi").await.expect("submit");

    assert_eq!(phase, RequestPhase::Errored);
    assert_eq!(controller.error().as_deref(), Some("model unavailable"));
    assert_eq!(assistant_text(&controller), "partial");
}

#[tokio::test]
async fn malformed_line_is_skipped() {
    let transport = ScriptedTransport::new(vec![Reply::Chunks(vec![
        "0:\"a\"\n0:not-json\n0:\"b\"\n",
    ])]);
    let controller = controller(transport);

    let phase = controller.submit("hi").await.expect("submit");

    assert_eq!(phase, RequestPhase::Done);
    assert_eq!(controller.error(), None);
    assert_eq!(assistant_text(&controller), "ab");
}

#[tokio::test]
async fn orphan_result_is_dropped() {
    let transport = ScriptedTransport::new(vec![Reply::Chunks(vec![
        "a:{\"toolCallId\":\"ghost\",\"result\":{\"ok\":true}}\n0:\"done\"\n",
    ])]);
    let controller = controller(transport);

    controller.submit("hi").await.expect("submit");

    let messages = controller.messages();
    assert!(messages[1].tool_invocations().is_empty());
    assert_eq!(messages[1].text(), "done");
}

#[tokio::test]
async fn rate_limit_is_recorded_and_next_request_allowed() {
    let transport = ScriptedTransport::new(vec![
        Reply::Fail(ClientError::RateLimited {
            message: "Too Many Requests - Please wait before trying again".to_string(),
            retry_after: Some(Duration::from_secs(40)),
            reset_at: Some("2026-01-01T00:01:00Z".to_string()),
        }),
        Reply::Chunks(vec!["0:\"back\"\n"]),
    ]);
    let controller = controller(transport);

    let phase = controller.submit("hi").await.expect("submit");
    assert_eq!(phase, RequestPhase::Errored);
    assert!(controller
        .error()
        .is_some_and(|error| error.contains("Too Many Requests")));
    let quota = controller.quota().expect("quota");
    assert_eq!(quota.remaining, Some(0));
    assert_eq!(quota.reset_at.as_deref(), Some("2026-01-01T00:01:00Z"));

    let phase = controller.submit("again").await.expect("submit");
    assert_eq!(phase, RequestPhase::Done);
    assert_eq!(controller.error(), None);
    assert_eq!(assistant_text(&controller), "back");
}

#[tokio::test]
async fn history_replaces_transcript() {
    let transport = ScriptedTransport::new(Vec::new());
    *lock_unpoisoned(&transport.history) = vec![
        Message::user("m1", "earlier question"),
        Message::assistant("m2", "earlier answer"),
    ];
    let controller = controller(transport);

    let count = controller.load_history().await.expect("history");

    assert_eq!(count, 2);
    let texts: Vec<String> = controller
        .messages()
        .iter()
        .map(|message| message.text().to_string())
        .collect();
    assert_eq!(texts, vec!["earlier question", "earlier answer"]);
}
