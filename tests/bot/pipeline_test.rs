//! Command pipeline behaviour against a recording transport.

use std::sync::atomic::Ordering;

use tukang::commands::{mention_all, sticker};
use tukang::whatsapp::message::MessageContent;
use tukang::whatsapp::Presence;

use super::support::{
    entries, image, pipeline, reply_message, text_message, Call, RecordingTransport, StubMode,
    StubTranscoder, ADMIN, DIRECT, GROUP, MEMBER, STUB_WEBP,
};

fn only_text(transport: &RecordingTransport) -> (String, Vec<String>) {
    let outbound = transport.outbound();
    assert_eq!(outbound.len(), 1, "expected exactly one reply, got {outbound:?}");
    match outbound.into_iter().next() {
        Some(Call::Text { text, mentions, .. }) => (text, mentions),
        other => panic!("expected a text reply, got {other:?}"),
    }
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    let mut msg = text_message(DIRECT, None, "?runtime");
    msg.key.from_me = true;
    p.handle(msg).await;

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn messages_without_prefix_are_ignored() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "runtime")).await;
    p.handle(text_message(DIRECT, None, "halo ?runtime")).await;
    p.handle(text_message(DIRECT, None, "")).await;

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn messages_without_content_are_ignored() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    let mut msg = text_message(DIRECT, None, "?runtime");
    msg.content = None;
    p.handle(msg).await;

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn image_captions_do_not_trigger_commands() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    let mut msg = text_message(DIRECT, None, "");
    let MessageContent::Image(mut content) = image() else {
        unreachable!("image() builds an image");
    };
    content.caption = Some("?s".to_owned());
    msg.content = Some(MessageContent::Image(content));
    p.handle(msg).await;

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn runtime_reports_uptime_after_typing_indicator() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "?runtime")).await;

    let calls = transport.calls();
    assert_eq!(calls.len(), 3, "{calls:?}");
    assert_eq!(
        calls[0],
        Call::Presence {
            jid: DIRECT.to_owned(),
            presence: Presence::Composing
        }
    );
    assert_eq!(
        calls[1],
        Call::Presence {
            jid: DIRECT.to_owned(),
            presence: Presence::Paused
        }
    );
    match &calls[2] {
        Call::Text { jid, text, mentions } => {
            assert_eq!(jid, DIRECT);
            assert!(text.starts_with("⏱️ Runtime: 0 jam 0 menit "), "{text}");
            assert!(mentions.is_empty());
        }
        other => panic!("expected runtime text, got {other:?}"),
    }
}

#[tokio::test]
async fn command_names_are_case_insensitive() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "?RunTime  ")).await;

    let (text, _) = only_text(&transport);
    assert!(text.starts_with("⏱️ Runtime:"), "{text}");
}

#[tokio::test]
async fn presence_failures_do_not_block_the_reply() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    transport.fail_presence.store(true, Ordering::SeqCst);
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "?runtime")).await;

    let (text, _) = only_text(&transport);
    assert!(text.starts_with("⏱️ Runtime:"));
}

#[tokio::test]
async fn unknown_command_names_the_command() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "?unknowncmd")).await;

    let (text, mentions) = only_text(&transport);
    assert!(text.contains("unknowncmd"), "{text}");
    assert!(mentions.is_empty());
}

#[tokio::test]
async fn only_runtime_sticker_and_all_are_commands() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "?help")).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, "❓ Command \"help\" tidak dikenal");
}

#[tokio::test]
async fn mention_all_outside_group_is_refused() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::with_group();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(DIRECT, None, "?all rapat jam 3")).await;

    let (text, mentions) = only_text(&transport);
    assert_eq!(text, mention_all::NOT_GROUP);
    assert!(mentions.is_empty());
}

#[tokio::test]
async fn mention_all_from_non_admin_is_refused() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::with_group();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(GROUP, Some(MEMBER), "?all rapat jam 3")).await;

    let (text, mentions) = only_text(&transport);
    assert_eq!(text, mention_all::NOT_ADMIN);
    assert!(mentions.is_empty());
}

#[tokio::test]
async fn mention_all_admin_check_precedes_empty_body_check() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::with_group();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(GROUP, Some(MEMBER), "?all")).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, mention_all::NOT_ADMIN);
}

#[tokio::test]
async fn mention_all_with_empty_body_prompts_for_text() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::with_group();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(GROUP, Some(ADMIN), "?all   ")).await;

    let (text, mentions) = only_text(&transport);
    assert_eq!(text, mention_all::empty_body("?"));
    assert!(mentions.is_empty());
}

#[tokio::test]
async fn mention_all_mentions_every_participant() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::with_group();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(GROUP, Some(ADMIN), "?all rapat jam 3")).await;

    let (text, mentions) = only_text(&transport);
    assert_eq!(text, "rapat jam 3");
    assert_eq!(mentions, vec![ADMIN.to_owned(), MEMBER.to_owned()]);
}

#[tokio::test]
async fn mention_all_metadata_failure_replies_generic_error() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(text_message(GROUP, Some(ADMIN), "?all rapat")).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, mention_all::FAILED);
}

#[tokio::test]
async fn sticker_without_quote_asks_for_reply() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let transcoder = StubTranscoder::new(StubMode::Succeed);
    let p = pipeline(transport.clone(), transcoder.clone(), scratch.path());

    p.handle(text_message(DIRECT, None, "?s")).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, sticker::NO_QUOTE);
    assert!(transcoder.seen().is_empty());
}

#[tokio::test]
async fn sticker_quoting_text_is_refused() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let transcoder = StubTranscoder::new(StubMode::Succeed);
    let p = pipeline(transport.clone(), transcoder.clone(), scratch.path());

    let quoted = MessageContent::Conversation {
        text: "bukan gambar".to_owned(),
    };
    p.handle(reply_message(DIRECT, "?s", quoted)).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, sticker::NOT_IMAGE);
    assert!(transcoder.seen().is_empty());
}

#[tokio::test]
async fn sticker_from_quoted_image_is_sent_and_scratch_is_removed() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    *transport.media.lock().expect("lock") = Some(b"\xFF\xD8\xFFjpeg".to_vec());
    let transcoder = StubTranscoder::new(StubMode::Succeed);
    let p = pipeline(transport.clone(), transcoder.clone(), scratch.path());

    p.handle(reply_message(DIRECT, "?s", image())).await;

    let outbound = transport.outbound();
    assert_eq!(
        outbound,
        vec![Call::Sticker {
            jid: DIRECT.to_owned(),
            webp: STUB_WEBP.to_vec()
        }]
    );
    let seen = transcoder.seen();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].0.exists(), "input left behind");
    assert!(!seen[0].1.exists(), "output left behind");
    assert_eq!(entries(scratch.path()), 0);
}

#[tokio::test]
async fn concurrent_stickers_use_distinct_scratch_files() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    *transport.media.lock().expect("lock") = Some(b"\xFF\xD8\xFFjpeg".to_vec());
    let transcoder = StubTranscoder::new(StubMode::Succeed);
    let p = pipeline(transport.clone(), transcoder.clone(), scratch.path());

    tokio::join!(
        p.handle(reply_message(DIRECT, "?s", image())),
        p.handle(reply_message(GROUP, "?s", image())),
    );

    let seen = transcoder.seen();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0].0, seen[1].0);
    assert_ne!(seen[0].1, seen[1].1);
    assert_eq!(transport.outbound().len(), 2);
    assert_eq!(entries(scratch.path()), 0);
}

#[tokio::test]
async fn sticker_transcode_failure_reports_and_cleans_up() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    *transport.media.lock().expect("lock") = Some(b"not really a jpeg".to_vec());
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Fail), scratch.path());

    p.handle(reply_message(DIRECT, "?s", image())).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, sticker::TRANSCODE_FAILED);
    assert_eq!(entries(scratch.path()), 0);
}

#[tokio::test]
async fn sticker_missing_output_is_reported() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    *transport.media.lock().expect("lock") = Some(b"\xFF\xD8\xFFjpeg".to_vec());
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::NoOutput), scratch.path());

    p.handle(reply_message(DIRECT, "?s", image())).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, sticker::NO_OUTPUT);
    assert_eq!(entries(scratch.path()), 0);
}

#[tokio::test]
async fn sticker_download_failure_replies_generic_error() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    let transcoder = StubTranscoder::new(StubMode::Succeed);
    let p = pipeline(transport.clone(), transcoder.clone(), scratch.path());

    p.handle(reply_message(DIRECT, "?s", image())).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, sticker::FAILED);
    assert!(transcoder.seen().is_empty());
    assert_eq!(entries(scratch.path()), 0);
}

#[tokio::test]
async fn sticker_send_failure_falls_back_to_error_text() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let transport = RecordingTransport::new();
    *transport.media.lock().expect("lock") = Some(b"\xFF\xD8\xFFjpeg".to_vec());
    transport.fail_sticker_send.store(true, Ordering::SeqCst);
    let p = pipeline(transport.clone(), StubTranscoder::new(StubMode::Succeed), scratch.path());

    p.handle(reply_message(DIRECT, "?s", image())).await;

    let (text, _) = only_text(&transport);
    assert_eq!(text, sticker::FAILED);
    assert_eq!(entries(scratch.path()), 0);
}
