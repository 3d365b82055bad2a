/// On-disk WAV and transcript artifacts
pub mod artifacts;

/// Single-consumer task that assembles inbound audio streams
pub mod assembler;

/// Audio-related error types
pub mod error;

/// Stream keys, fragments and delta decoding
pub mod fragment;

/// Chunked upload of local WAV files
pub mod framer;

/// Per-stream buffering of inbound audio
pub mod reassembler;

/// WAV container encoding and validation
pub mod wav;

// Re-export commonly used types
pub use artifacts::ArtifactWriter;
pub use assembler::{ArtifactNotice, AssemblerCommand, StreamAssembler};
pub use error::{AudioError, AudioResult, WavError};
pub use fragment::{AudioFragment, StreamKey, decode_delta};
pub use framer::{AudioFramer, UploadSummary};
pub use reassembler::AudioReassembler;
pub use wav::{MAX_DATA_LEN, WavHeader, WavSpec, encode_wav, wav_header};
