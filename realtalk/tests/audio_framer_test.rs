/// Integration tests for chunked WAV upload
///
/// Uses an in-memory `EventSender` to check event order, chunk counts and
/// that the appended audio reassembles to the original samples.
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use realtalk_lib::audio::{AudioError, AudioFramer, WavError, WavSpec, encode_wav};
use realtalk_lib::network::{ClientEvent, EventSender, NetworkResult};
use serde_json::Value;

#[derive(Default)]
struct CollectingSender {
    events: Mutex<Vec<Value>>,
}

impl EventSender for CollectingSender {
    async fn send_event(&self, event: &ClientEvent) -> NetworkResult<()> {
        let value = serde_json::to_value(event)?;
        self.events.lock().unwrap().push(value);
        Ok(())
    }
}

impl CollectingSender {
    fn events(&self) -> Vec<Value> {
        self.events.lock().unwrap().clone()
    }
}

fn write_wav(dir: &Path, name: &str, pcm: &[u8], spec: &WavSpec) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, encode_wav(pcm, spec).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_chunk_counts() {
    println!("\n=== Chunk Count Test ===");

    let dir = tempfile::tempdir().unwrap();
    let chunk = 4_800;
    let framer = AudioFramer::new(WavSpec::default(), chunk).unwrap();

    for size in [2usize, 4_798, 4_800, 4_802, 9_600, 24_000, 100_002] {
        let pcm: Vec<u8> = (0..size).map(|i| (i * 7 % 256) as u8).collect();
        let path = write_wav(dir.path(), &format!("clip_{size}.wav"), &pcm, &WavSpec::default());

        let sender = CollectingSender::default();
        let summary = framer.upload(&sender, &path).await.unwrap();

        let expected_chunks = size.div_ceil(chunk) as u64;
        assert_eq!(summary.chunks, expected_chunks, "size {size}");
        assert_eq!(summary.bytes, size as u64);
        assert_eq!(summary.duration_ms, WavSpec::default().duration_ms(size));

        let events = sender.events();
        assert_eq!(events.len() as u64, expected_chunks + 3);
        assert_eq!(events[0]["type"], "conversation.item.create");
        assert_eq!(events[0]["item"]["content"][0]["source"], format!("clip_{size}.wav"));

        let appends = &events[1..events.len() - 2];
        let mut joined = Vec::with_capacity(size);
        for (i, append) in appends.iter().enumerate() {
            assert_eq!(append["type"], "input_audio_buffer.append");
            assert_eq!(append["event_id"], format!("audio_chunk_{}", i + 1));
            let bytes = STANDARD.decode(append["audio"].as_str().unwrap()).unwrap();
            if i + 1 < appends.len() {
                assert_eq!(bytes.len(), chunk);
            }
            joined.extend(bytes);
        }
        assert_eq!(joined, pcm, "size {size}");

        assert_eq!(events[events.len() - 2]["type"], "input_audio_buffer.commit");
        assert_eq!(events[events.len() - 1]["type"], "response.create");
    }

    println!("\n✓ ceil(S / C) appends, byte-identical when rejoined");
}

#[tokio::test]
async fn test_empty_file_sends_no_appends() {
    let dir = tempfile::tempdir().unwrap();
    let framer = AudioFramer::new(WavSpec::default(), 4_800).unwrap();
    let path = write_wav(dir.path(), "silence.wav", &[], &WavSpec::default());

    let sender = CollectingSender::default();
    let summary = framer.upload(&sender, &path).await.unwrap();

    assert_eq!(summary.chunks, 0);
    let types: Vec<_> = sender
        .events()
        .iter()
        .map(|e| e["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        types,
        [
            "conversation.item.create",
            "input_audio_buffer.commit",
            "response.create"
        ]
    );
}

#[tokio::test]
async fn test_wrong_format_sends_nothing() {
    println!("\n=== Format Rejection Test ===");

    let dir = tempfile::tempdir().unwrap();
    let framer = AudioFramer::new(WavSpec::default(), 4_800).unwrap();
    let spec = WavSpec {
        sample_rate: 44_100,
        ..WavSpec::default()
    };
    let path = write_wav(dir.path(), "cd.wav", &[0u8; 1_000], &spec);

    let sender = CollectingSender::default();
    let result = framer.upload(&sender, &path).await;

    assert!(matches!(
        result,
        Err(AudioError::InvalidWav(WavError::SampleRateMismatch {
            actual: 44_100,
            ..
        }))
    ));
    assert!(sender.events().is_empty());

    println!("\n✓ Mismatched file rejected before any traffic");
}

#[tokio::test]
async fn test_missing_file() {
    let framer = AudioFramer::new(WavSpec::default(), 4_800).unwrap();
    let sender = CollectingSender::default();

    let result = framer
        .upload(&sender, Path::new("/definitely/not/here.wav"))
        .await;

    assert!(matches!(result, Err(AudioError::Io(_))));
    assert!(sender.events().is_empty());
}
