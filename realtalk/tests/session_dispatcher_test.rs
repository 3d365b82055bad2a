/// Integration tests for frame routing into the assembler
///
/// A `FrameRouter` feeds a real `StreamAssembler` writing into a temp dir,
/// without any socket in between.
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use realtalk_lib::audio::{ArtifactNotice, ArtifactWriter, AudioReassembler, StreamAssembler, WavSpec};
use realtalk_lib::session::{DisplayEvent, FrameRouter};
use realtalk_lib::utils::{EventLog, Metrics};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Pipeline {
    router: FrameRouter,
    notices: mpsc::Receiver<ArtifactNotice>,
    display: mpsc::Receiver<DisplayEvent>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    assembler: JoinHandle<()>,
}

fn pipeline(dir: &std::path::Path) -> Pipeline {
    let metrics = Arc::new(Metrics::default());
    let cancel = CancellationToken::new();
    let (audio_tx, audio_rx) = mpsc::channel(8);
    let (display_tx, display) = mpsc::channel(32);
    let (notice_tx, notices) = mpsc::channel(32);

    let assembler = StreamAssembler::new(
        Arc::new(AudioReassembler::new(metrics.clone())),
        ArtifactWriter::new(dir, WavSpec::default()),
    );
    let assembler = tokio::spawn(assembler.run(audio_rx, notice_tx, cancel.clone()));

    let router = FrameRouter::new(
        audio_tx,
        display_tx,
        metrics.clone(),
        Arc::new(EventLog::disabled()),
        cancel.clone(),
    );

    Pipeline {
        router,
        notices,
        display,
        metrics,
        cancel,
        assembler,
    }
}

fn delta(response_id: &str, item_id: &str, delta: &str) -> String {
    json!({
        "type": "response.audio.delta",
        "response_id": response_id,
        "item_id": item_id,
        "delta": delta
    })
    .to_string()
}

fn done(response_id: &str, item_id: &str) -> String {
    json!({
        "type": "response.audio.done",
        "response_id": response_id,
        "item_id": item_id
    })
    .to_string()
}

async fn next_notice(notices: &mut mpsc::Receiver<ArtifactNotice>) -> ArtifactNotice {
    tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("timed out waiting for artifact")
        .expect("assembler stopped")
}

#[tokio::test]
async fn test_trimmed_sentinel_becomes_silence() {
    println!("\n=== Trimmed Sentinel Test ===");

    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path());

    p.router.route(&delta("r", "i", "[trimmed: 512 bytes]")).await;
    p.router.route(&done("r", "i")).await;

    let ArtifactNotice::AudioSaved {
        path,
        bytes,
        duration_ms,
        ..
    } = next_notice(&mut p.notices).await
    else {
        panic!("expected AudioSaved");
    };
    assert_eq!(bytes, 512);
    assert_eq!(duration_ms, 10);

    let wav = std::fs::read(path).unwrap();
    assert_eq!(wav.len(), 44 + 512);
    assert!(wav[44..].iter().all(|&b| b == 0));

    p.cancel.cancel();
    p.assembler.await.unwrap();

    println!("\n✓ Sentinel expanded to 512 zero bytes");
}

#[tokio::test]
async fn test_unknown_event_between_deltas() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path());

    p.router.route(&delta("r", "i", &STANDARD.encode([1u8; 50]))).await;
    p.router
        .route(&json!({"type": "foo.bar", "payload": {"nested": true}}).to_string())
        .await;
    p.router.route(&delta("r", "i", &STANDARD.encode([2u8; 50]))).await;
    p.router.route(&done("r", "i")).await;

    let ArtifactNotice::AudioSaved { path, bytes, .. } = next_notice(&mut p.notices).await else {
        panic!("expected AudioSaved");
    };
    assert_eq!(bytes, 100);
    let wav = std::fs::read(path).unwrap();
    assert_eq!(&wav[44..94], &[1u8; 50][..]);
    assert_eq!(&wav[94..], &[2u8; 50][..]);

    let metrics = p.metrics.snapshot();
    assert_eq!(metrics.messages_received, 4);
    assert_eq!(metrics.errors, 0);
    assert!(p.display.try_recv().is_err());
}

#[tokio::test]
async fn test_frames_without_type_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path());

    p.router.route("{not json").await;
    p.router.route(r#"["type", "error"]"#).await;
    p.router.route(r#"{"type": 42}"#).await;
    p.router.route(r#"{"event": "session.created"}"#).await;

    let metrics = p.metrics.snapshot();
    assert_eq!(metrics.messages_received, 0);
    assert_eq!(metrics.errors, 0);
}

#[tokio::test]
async fn test_bad_delta_does_not_poison_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path());

    p.router.route(&delta("r", "i", &STANDARD.encode([5u8; 20]))).await;
    p.router.route(&delta("r", "i", "!!not base64!!")).await;
    p.router.route(&delta("r", "i", "[trimmed: lots bytes]")).await;
    p.router.route(&done("r", "i")).await;

    let ArtifactNotice::AudioSaved { bytes, .. } = next_notice(&mut p.notices).await else {
        panic!("expected AudioSaved");
    };
    assert_eq!(bytes, 20);
    assert_eq!(p.metrics.snapshot().errors, 2);
}

#[tokio::test]
async fn test_transcript_follows_audio() {
    println!("\n=== Transcript Ordering Test ===");

    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path());

    p.router.route(&delta("resp_1", "item_1", &STANDARD.encode([0u8; 96]))).await;
    p.router.route(&done("resp_1", "item_1")).await;
    p.router
        .route(
            &json!({
                "type": "response.done",
                "response": {
                    "id": "resp_1",
                    "status": "completed",
                    "output": [{
                        "id": "item_1",
                        "type": "message",
                        "content": [{"type": "audio", "transcript": "Hello!"}]
                    }]
                }
            })
            .to_string(),
        )
        .await;

    let ArtifactNotice::AudioSaved { path: wav, .. } = next_notice(&mut p.notices).await else {
        panic!("expected AudioSaved first");
    };
    let ArtifactNotice::TranscriptSaved { path: txt, .. } = next_notice(&mut p.notices).await
    else {
        panic!("expected TranscriptSaved second");
    };
    assert_eq!(txt, wav.with_extension("txt"));

    let content = std::fs::read_to_string(&txt).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with("Generated: "));
    assert_eq!(lines[1], format!("Audio File: {}", wav.display()));
    assert_eq!(lines[2], "Transcript:");
    assert_eq!(lines[3], "Hello!");

    match p.display.recv().await.unwrap() {
        DisplayEvent::Transcript { key, text } => {
            assert_eq!(key.response_id, "resp_1");
            assert_eq!(text, "Hello!");
        }
        other => panic!("unexpected display event {:?}", other),
    }

    println!("\n✓ Transcript written next to its audio");
}

#[tokio::test]
async fn test_server_error_reaches_display() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = pipeline(dir.path());

    let frame: Value = json!({
        "type": "error",
        "error": {"type": "server_error", "message": "Something broke"}
    });
    p.router.route(&frame.to_string()).await;

    assert_eq!(
        p.display.recv().await.unwrap(),
        DisplayEvent::ServerError {
            message: "Something broke".to_string()
        }
    );
    assert_eq!(p.metrics.snapshot().errors, 1);
}
