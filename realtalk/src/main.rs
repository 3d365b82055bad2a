//! Interactive terminal client
//!
//! Type a message to talk to the model, `/audio <file.wav>` to send a
//! recording, or one of the exit words to leave.
//!
//! Run: `OPENAI_API_KEY=... cargo run`

use std::path::PathBuf;

use anyhow::{Context, Result};
use realtalk_lib::config::{ClientConfig, SessionDescriptor};
use realtalk_lib::network::ConnectionConfig;
use realtalk_lib::session::{DisplayEvent, RealtimeClient, ShutdownOutcome, ShutdownReason};
use realtalk_lib::utils::error::AppError;
use realtalk_lib::utils::logging::init_logging;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

const EXIT_WORDS: [&str; 8] = [
    ".exit", ".quit", "exit", "quit", ":exit", ":quit", "/exit", "/quit",
];

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Exit,
    Audio(PathBuf),
    Text(String),
    Empty,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();

    if line.is_empty() {
        return Command::Empty;
    }
    if EXIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word)) {
        return Command::Exit;
    }
    if let Some(path) = line.strip_prefix("/audio ") {
        return Command::Audio(PathBuf::from(path.trim()));
    }
    Command::Text(line.to_string())
}

fn print_display_event(event: DisplayEvent) {
    match event {
        DisplayEvent::SessionStarted { session_id, model } => {
            println!("Session {session_id} started ({model})");
        }
        DisplayEvent::AssistantText { text } => println!("Assistant: {text}"),
        DisplayEvent::Transcript { text, .. } => println!("Assistant (spoken): {text}"),
        DisplayEvent::AudioSaved { path, duration_ms } => {
            println!("Audio saved to {} ({duration_ms} ms)", path.display());
        }
        DisplayEvent::TranscriptSaved { path } => {
            println!("Transcript saved to {}", path.display());
        }
        DisplayEvent::ServerError { message } => eprintln!("Server error: {message}"),
    }
}

fn report(err: impl Into<AppError>) {
    let ctx = err.into().context();
    eprintln!("Error: {}", ctx.message);
    if let Some(hint) = ctx.recovery_hint {
        eprintln!("  {hint}");
    }
    if let Some(detail) = ctx.detail {
        warn!(code = ?ctx.code, "{detail}");
    }
}

/// What to tell the user about a session that ended without being asked to
fn exit_message(reason: &ShutdownReason) -> Option<String> {
    match reason {
        ShutdownReason::Fatal(message) => Some(format!("Connection lost: {message}")),
        ShutdownReason::PeerClosed => Some("Server closed the connection".to_string()),
        ShutdownReason::UserRequested | ShutdownReason::Interrupted => None,
    }
}

async fn display_loop(mut events: mpsc::Receiver<DisplayEvent>) {
    while let Some(event) = events.recv().await {
        print_display_event(event);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY environment variable not set")?;

    let config_path =
        std::env::var("REALTALK_CONFIG").unwrap_or_else(|_| "realtalk.json".to_string());
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("Failed to load {config_path}"))?;

    let mut connection = ConnectionConfig::new();
    if let Ok(model) = std::env::var("REALTALK_MODEL") {
        connection = connection.with_model(model);
    }

    let client = match RealtimeClient::connect(
        &api_key,
        &connection,
        config,
        SessionDescriptor::default(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            report(e);
            std::process::exit(1);
        }
    };

    if let Some(events) = client.take_display_events() {
        tokio::spawn(display_loop(events));
    }

    println!("Connected. Type a message, /audio <file.wav>, or 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let reason = loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break ShutdownReason::Interrupted,
            // Someone else won the shutdown; the stored reason says why.
            _ = client.shutdown_requested() => break ShutdownReason::PeerClosed,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break ShutdownReason::UserRequested,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break ShutdownReason::UserRequested;
            }
        };

        match parse_command(&line) {
            Command::Exit => break ShutdownReason::UserRequested,
            Command::Empty => {}
            Command::Audio(path) => match client.send_audio_file(&path).await {
                Ok(summary) => println!(
                    "Sent {} ({} chunks, {} ms)",
                    path.display(),
                    summary.chunks,
                    summary.duration_ms
                ),
                Err(e) => report(e),
            },
            Command::Text(text) => {
                if let Err(e) = client.send_text(&text).await {
                    report(e);
                }
            }
        }
    };

    match client.shutdown(reason.clone()).await {
        ShutdownOutcome::Completed { timed_out, .. } => {
            if timed_out {
                warn!("Some tasks had to be aborted during shutdown");
            }
        }
        ShutdownOutcome::AlreadyRequested => client.closed().await,
    }

    let reason = client.shutdown_reason().unwrap_or(reason);
    if let Some(message) = exit_message(&reason) {
        eprintln!("{message}");
    }

    if let Some(path) = client.event_log_path() {
        println!("Event log: {}", path.display());
    }
    info!(reason = %reason, "Goodbye");

    if matches!(reason, ShutdownReason::Fatal(_)) {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exit_words() {
        for word in EXIT_WORDS {
            assert_eq!(parse_command(word), Command::Exit);
        }
        assert_eq!(parse_command("  QUIT  "), Command::Exit);
        assert_eq!(parse_command("/Exit"), Command::Exit);
    }

    #[test]
    fn test_parse_audio() {
        assert_eq!(
            parse_command("/audio clips/hello.wav"),
            Command::Audio(PathBuf::from("clips/hello.wav"))
        );
        // Without a path it is just text.
        assert_eq!(parse_command("/audio"), Command::Text("/audio".to_string()));
        assert_eq!(
            parse_command("/audiobook"),
            Command::Text("/audiobook".to_string())
        );
    }

    #[test]
    fn test_exit_message() {
        assert_eq!(
            exit_message(&ShutdownReason::Fatal("keep-alive failed".to_string())),
            Some("Connection lost: keep-alive failed".to_string())
        );
        assert_eq!(
            exit_message(&ShutdownReason::PeerClosed),
            Some("Server closed the connection".to_string())
        );
        assert_eq!(exit_message(&ShutdownReason::UserRequested), None);
        assert_eq!(exit_message(&ShutdownReason::Interrupted), None);
    }

    #[test]
    fn test_parse_text_and_empty() {
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(
            parse_command(" hello there "),
            Command::Text("hello there".to_string())
        );
        assert_eq!(
            parse_command("exit now"),
            Command::Text("exit now".to_string())
        );
    }
}
