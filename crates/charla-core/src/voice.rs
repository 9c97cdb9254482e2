//! Voice input: a permission gate in front of an external speech-to-text
//! capability.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ChatError;

/// Something that can turn speech into a best-guess transcript.
#[async_trait]
pub trait VoiceCapture: Send + Sync {
    fn has_permission(&self) -> bool;

    /// Ask the user for microphone access. Resolves once they answer.
    async fn request_permission(&self) -> bool;

    /// Record and transcribe one utterance. `Ok(None)` when nothing was heard.
    async fn capture(&self) -> Result<Option<String>, ChatError>;
}

/// A pending "may we use the microphone?" question for the front-end.
#[derive(Debug)]
pub struct PermissionRequest {
    reply: oneshot::Sender<bool>,
}

impl PermissionRequest {
    pub fn respond(self, granted: bool) {
        // The asker may have gone away; nothing to do then.
        let _ = self.reply.send(granted);
    }
}

/// Remembers whether access was granted and routes new requests to the UI.
pub struct PermissionGate {
    granted: AtomicBool,
    prompts: mpsc::UnboundedSender<PermissionRequest>,
}

impl PermissionGate {
    pub fn new(granted: bool) -> (Self, mpsc::UnboundedReceiver<PermissionRequest>) {
        let (prompts, rx) = mpsc::unbounded_channel();
        (
            Self {
                granted: AtomicBool::new(granted),
                prompts,
            },
            rx,
        )
    }

    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }

    pub async fn request(&self) -> bool {
        if self.is_granted() {
            return true;
        }

        let (reply, answer) = oneshot::channel();
        if self.prompts.send(PermissionRequest { reply }).is_err() {
            warn!("No front-end is listening for permission requests");
            return false;
        }

        let granted = answer.await.unwrap_or(false);
        self.granted.store(granted, Ordering::Release);
        debug!(granted, "Microphone permission answered");
        granted
    }
}

/// Runs a configured speech-to-text command and reads the transcript from
/// its stdout.
pub struct CommandVoiceCapture {
    command: Option<Vec<String>>,
    gate: PermissionGate,
}

impl CommandVoiceCapture {
    pub fn new(command: Option<Vec<String>>, gate: PermissionGate) -> Self {
        Self { command, gate }
    }
}

#[async_trait]
impl VoiceCapture for CommandVoiceCapture {
    fn has_permission(&self) -> bool {
        self.gate.is_granted()
    }

    async fn request_permission(&self) -> bool {
        self.gate.request().await
    }

    async fn capture(&self) -> Result<Option<String>, ChatError> {
        let (program, args) = self
            .command
            .as_deref()
            .and_then(|c| c.split_first())
            .ok_or_else(|| ChatError::Voice("no voice_command configured".to_string()))?;

        debug!(program = %program, "Starting voice capture");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ChatError::Voice(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChatError::Voice(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(first_transcript_line(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn first_transcript_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted_capture(command: &[&str]) -> CommandVoiceCapture {
        let (gate, _rx) = PermissionGate::new(true);
        CommandVoiceCapture::new(Some(command.iter().map(|s| s.to_string()).collect()), gate)
    }

    #[test]
    fn test_first_transcript_line_skips_blank_lines() {
        assert_eq!(
            first_transcript_line("\n  \n  turn on the lights \nsecond"),
            Some("turn on the lights".to_string())
        );
        assert_eq!(first_transcript_line("   \n"), None);
    }

    #[tokio::test]
    async fn test_gate_already_granted_does_not_prompt() {
        let (gate, mut rx) = PermissionGate::new(true);
        assert!(gate.request().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_gate_remembers_grant() {
        let (gate, mut rx) = PermissionGate::new(false);
        tokio::spawn(async move {
            if let Some(request) = rx.recv().await {
                request.respond(true);
            }
        });

        assert!(gate.request().await);
        assert!(gate.is_granted());
    }

    #[tokio::test]
    async fn test_gate_denied() {
        let (gate, mut rx) = PermissionGate::new(false);
        tokio::spawn(async move {
            if let Some(request) = rx.recv().await {
                request.respond(false);
            }
        });

        assert!(!gate.request().await);
        assert!(!gate.is_granted());
    }

    #[tokio::test]
    async fn test_gate_dropped_request_counts_as_denied() {
        let (gate, mut rx) = PermissionGate::new(false);
        tokio::spawn(async move {
            let request = rx.recv().await;
            drop(request);
        });

        assert!(!gate.request().await);
    }

    #[tokio::test]
    async fn test_missing_command_is_a_voice_error() {
        let (gate, _rx) = PermissionGate::new(true);
        let capture = CommandVoiceCapture::new(None, gate);
        assert!(matches!(capture.capture().await, Err(ChatError::Voice(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_stdout_becomes_transcript() {
        let capture = granted_capture(&["echo", "hello world"]);
        assert_eq!(capture.capture().await.unwrap(), Some("hello world".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_command_is_no_result() {
        let capture = granted_capture(&["true"]);
        assert_eq!(capture.capture().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_a_voice_error() {
        let capture = granted_capture(&["false"]);
        assert!(matches!(capture.capture().await, Err(ChatError::Voice(_))));
    }
}
