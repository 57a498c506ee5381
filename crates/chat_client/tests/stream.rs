use chat_client::{Conversation, StreamReader};
use pretty_assertions::assert_eq;
use wire_protocol::Message;

const BODY: &str = concat!(
    "0:\"Prezzi a Milano: 4.200 €/m² \"\n",
    "9:{\"toolCallId\":\"t1\",\"toolName\":\"get_market_prices\",\"args\":{\"city\":\"Milano\"}}\n",
    "0:\"| Zona | € |\\n| --- | --- |\"\n",
    "0:not-json\n",
    "a:{\"toolCallId\":\"t1\",\"result\":\"ok ✓\"}\n",
    "a:{\"toolCallId\":\"t9\",\"result\":{}}\n",
    "0:\" fine 🏠\"\n",
);

fn fresh() -> Conversation {
    let mut conversation = Conversation::new();
    conversation.push(Message::user("u1", "prezzi?"));
    conversation.push(Message::assistant("a1", ""));
    conversation
}

fn replay(chunks: &[&[u8]]) -> Vec<Message> {
    let mut conversation = fresh();
    let mut reader = StreamReader::new();
    for chunk in chunks {
        for frame in reader.feed(chunk) {
            conversation.apply("a1", &frame).expect("apply");
        }
    }
    for frame in reader.finish() {
        conversation.apply("a1", &frame).expect("apply");
    }
    conversation.messages().to_vec()
}

#[test]
fn every_single_split_point_yields_the_same_transcript() {
    let bytes = BODY.as_bytes();
    let expected = replay(&[bytes]);

    assert_eq!(expected[1].text(), "Prezzi a Milano: 4.200 €/m² | Zona | € |\n| --- | --- | fine 🏠");
    assert_eq!(expected[1].tool_invocations().len(), 1);

    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(replay(&[head, tail]), expected, "split at byte {split}");
    }
}

#[test]
fn byte_by_byte_delivery_matches_single_chunk() {
    let bytes = BODY.as_bytes();
    let expected = replay(&[bytes]);
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(replay(&singles), expected);
}

#[test]
fn replaying_the_same_frames_is_deterministic() {
    let bytes = BODY.as_bytes();
    let thirds: Vec<&[u8]> = bytes.chunks(bytes.len() / 3 + 1).collect();
    assert_eq!(replay(&thirds), replay(&thirds));
}
