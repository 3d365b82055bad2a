//! On-disk artifacts for finished audio streams
//!
//! Each completed stream becomes `audio_<YYYYmmdd_HHMMSS>_<millis>.wav` in the
//! output directory. A transcript that arrives later is written next to it
//! with the same stem and a `.txt` extension.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::audio::error::AudioResult;
use crate::audio::wav::{WavSpec, encode_wav};

/// Writes WAV and transcript files into one directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    spec: WavSpec,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, spec: WavSpec) -> Self {
        Self {
            output_dir: output_dir.into(),
            spec,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Pick a fresh `.wav` path, creating the output directory if needed
    ///
    /// Two streams finishing within the same millisecond get a numeric
    /// suffix instead of overwriting each other.
    pub async fn allocate_path(&self) -> AudioResult<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stem = format!("audio_{}", Local::now().format("%Y%m%d_%H%M%S_%3f"));
        let mut path = self.output_dir.join(format!("{stem}.wav"));
        let mut suffix = 1u32;

        while tokio::fs::try_exists(&path).await? {
            path = self.output_dir.join(format!("{stem}_{suffix}.wav"));
            suffix += 1;
        }

        Ok(path)
    }

    /// Encode raw PCM as WAV and write it to `path`
    ///
    /// Returns the playback duration in milliseconds.
    pub async fn write_wav(&self, path: &Path, pcm: &[u8]) -> AudioResult<u64> {
        let wav = encode_wav(pcm, &self.spec)?;
        tokio::fs::write(path, &wav).await?;

        let duration_ms = self.spec.duration_ms(pcm.len());
        info!(
            path = %path.display(),
            bytes = pcm.len(),
            duration_ms,
            "Audio saved"
        );
        Ok(duration_ms)
    }

    /// Write the transcript for an already saved WAV file
    ///
    /// Returns the path of the `.txt` file.
    pub async fn write_transcript(&self, wav_path: &Path, text: &str) -> AudioResult<PathBuf> {
        let path = transcript_path(wav_path);
        let content = format_transcript(Local::now(), wav_path, text);
        tokio::fs::write(&path, content).await?;

        debug!(path = %path.display(), chars = text.len(), "Transcript saved");
        Ok(path)
    }
}

/// `.txt` sibling of a `.wav` artifact
pub fn transcript_path(wav_path: &Path) -> PathBuf {
    wav_path.with_extension("txt")
}

/// Body of a transcript artifact
pub fn format_transcript(generated: DateTime<Local>, wav_path: &Path, text: &str) -> String {
    format!(
        "Generated: {}\nAudio File: {}\nTranscript:\n{}\n",
        generated.format("%Y-%m-%d %H:%M:%S"),
        wav_path.display(),
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::{WAV_HEADER_LEN, WavHeader};
    use chrono::TimeZone;

    #[test]
    fn test_transcript_path() {
        let path = transcript_path(Path::new("out/audio_20240101_120000_001.wav"));
        assert_eq!(path, PathBuf::from("out/audio_20240101_120000_001.txt"));
    }

    #[test]
    fn test_format_transcript() {
        let generated = Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 1).unwrap();
        let body = format_transcript(generated, Path::new("out/a.wav"), "Hello there");

        assert_eq!(
            body,
            "Generated: 2024-03-05 09:07:01\nAudio File: out/a.wav\nTranscript:\nHello there\n"
        );
    }

    #[tokio::test]
    async fn test_allocate_path_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("nested"), WavSpec::default());

        let path = writer.allocate_path().await.unwrap();

        assert!(dir.path().join("nested").is_dir());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("audio_"));
        assert!(name.ends_with(".wav"));
    }

    #[tokio::test]
    async fn test_allocate_path_avoids_collision() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), WavSpec::default());

        let first = writer.allocate_path().await.unwrap();
        writer.write_wav(&first, &[0u8; 4]).await.unwrap();
        let second = writer.allocate_path().await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_write_wav_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), WavSpec::default());
        let pcm = vec![7u8; 480];

        let wav_path = writer.allocate_path().await.unwrap();
        writer.write_wav(&wav_path, &pcm).await.unwrap();

        let bytes = std::fs::read(&wav_path).unwrap();
        assert_eq!(bytes.len(), pcm.len() + WAV_HEADER_LEN);
        let header = WavHeader::parse(&bytes).unwrap();
        assert!(header.validate(&WavSpec::default()).is_ok());
        assert_eq!(header.data_len as usize, pcm.len());

        let txt_path = writer.write_transcript(&wav_path, "hi").await.unwrap();
        let text = std::fs::read_to_string(&txt_path).unwrap();
        assert!(text.starts_with("Generated: "));
        assert!(text.contains(&format!("Audio File: {}\n", wav_path.display())));
        assert!(text.ends_with("Transcript:\nhi\n"));
    }
}
