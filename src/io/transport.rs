//! Transport layer - message exchange with the analysis engine
//!
//! The engine speaks a line-oriented protocol: one JSON envelope per line on
//! stdin/stdout. The transport moves whole lines in both directions and knows
//! nothing about envelope contents or process lifecycle.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Core transport trait for bidirectional line exchange
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one message (a single line, newline appended if missing)
    async fn send(&mut self, message: &str) -> Result<(), Self::Error>;

    /// Receive the next message line
    async fn receive(&mut self) -> Result<String, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is still active
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Stdio Transport Implementation
// ============================================================================

/// Error types for stdio transport
#[derive(Debug, thiserror::Error)]
pub enum StdioTransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Transport over a child process's stdin/stdout streams
pub struct StdioTransport {
    /// Channel for sending lines to stdin
    stdin_sender: Option<mpsc::UnboundedSender<String>>,

    /// Channel for receiving lines from stdout
    stdout_receiver: Option<mpsc::UnboundedReceiver<String>>,

    /// Connection status
    connected: bool,
}

impl StdioTransport {
    /// Create a new StdioTransport from child process streams
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let (stdin_sender, stdin_receiver) = mpsc::unbounded_channel();
        let (stdout_sender, stdout_receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::stdin_writer_task(stdin, stdin_receiver));
        tokio::spawn(Self::stdout_reader_task(stdout, stdout_sender));

        Self {
            stdin_sender: Some(stdin_sender),
            stdout_receiver: Some(stdout_receiver),
            connected: true,
        }
    }

    /// Background task that writes lines to stdin
    async fn stdin_writer_task(
        mut stdin: ChildStdin,
        mut receiver: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(line) = receiver.recv().await {
            trace!("StdioTransport: writing line: {}", line.trim_end());

            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                error!("Failed to write to engine stdin: {}", e);
                break;
            }

            if let Err(e) = stdin.flush().await {
                error!("Failed to flush engine stdin: {}", e);
                break;
            }
        }

        trace!("StdioTransport: stdin writer task finished");
    }

    /// Background task that reads lines from stdout
    ///
    /// Blank lines are skipped; engines interleave them around envelopes.
    async fn stdout_reader_task(stdout: ChildStdout, sender: mpsc::UnboundedSender<String>) {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    trace!("StdioTransport: stdout reader reached EOF");
                    break;
                }
                Ok(_) => {
                    let content = line.trim_end();
                    if content.is_empty() {
                        continue;
                    }
                    trace!("StdioTransport: read line: {}", content);

                    if sender.send(content.to_string()).is_err() {
                        trace!("StdioTransport: stdout receiver dropped, stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read from engine stdout: {}", e);
                    break;
                }
            }
        }

        trace!("StdioTransport: stdout reader task finished");
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Error = StdioTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let sender = self
            .stdin_sender
            .as_ref()
            .ok_or(StdioTransportError::Disconnected)?;

        let line = if message.ends_with('\n') {
            message.to_string()
        } else {
            format!("{message}\n")
        };

        sender
            .send(line)
            .map_err(|e| StdioTransportError::Channel(e.to_string()))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let receiver = self
            .stdout_receiver
            .as_mut()
            .ok_or(StdioTransportError::Disconnected)?;

        receiver
            .recv()
            .await
            .ok_or(StdioTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        self.stdin_sender.take();
        self.stdout_receiver.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,
}

/// Handle for driving a [`MockTransport`] from test code
///
/// Allows injecting inbound lines after the transport has been handed to the
/// component under test, and inspecting everything that was sent.
#[derive(Clone)]
pub struct MockTransportHandle {
    inbound_sender: mpsc::UnboundedSender<String>,
    sent_receiver: std::sync::Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

#[allow(dead_code)]
impl MockTransportHandle {
    /// Inject a line that a later receive() call will observe
    pub fn push_inbound(&self, line: impl Into<String>) {
        let _ = self.inbound_sender.send(line.into());
    }

    /// Await the next line sent through the transport
    pub async fn next_sent(&self) -> Option<String> {
        let mut receiver = self.sent_receiver.lock().await;
        receiver.recv().await
    }

    /// Drain every line sent so far without waiting
    pub async fn drain_sent(&self) -> Vec<String> {
        let mut receiver = self.sent_receiver.lock().await;
        let mut lines = Vec::new();
        while let Ok(line) = receiver.try_recv() {
            lines.push(line);
        }
        lines
    }
}

/// Mock transport for testing - inbound lines arrive via a channel so tests
/// can script responses after requests have gone out
pub struct MockTransport {
    sent_sender: mpsc::UnboundedSender<String>,
    inbound_receiver: mpsc::UnboundedReceiver<String>,
    connected: bool,
}

#[allow(dead_code)]
impl MockTransport {
    /// Create a mock transport plus the handle that drives it
    pub fn new() -> (Self, MockTransportHandle) {
        let (inbound_sender, inbound_receiver) = mpsc::unbounded_channel();
        let (sent_sender, sent_receiver) = mpsc::unbounded_channel();

        let transport = Self {
            sent_sender,
            inbound_receiver,
            connected: true,
        };
        let handle = MockTransportHandle {
            inbound_sender,
            sent_receiver: std::sync::Arc::new(tokio::sync::Mutex::new(sent_receiver)),
        };
        (transport, handle)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&mut self, message: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.sent_sender
            .send(message.trim_end().to_string())
            .map_err(|_| MockTransportError::Disconnected)?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, Self::Error> {
        if !self.connected {
            return Err(MockTransportError::Disconnected);
        }

        self.inbound_receiver
            .recv()
            .await
            .ok_or(MockTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_stdio_transport_echo() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn cat");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut transport = StdioTransport::new(stdin, stdout);

        transport.send("{\"seq\":1}").await.unwrap();
        let line = transport.receive().await.unwrap();
        assert_eq!(line, "{\"seq\":1}");

        assert!(transport.is_connected());

        transport.close().await.unwrap();
        let _ = child.kill().await;
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_stdio_transport_appends_newline_once() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn cat");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut transport = StdioTransport::new(stdin, stdout);

        // Already-terminated message must not produce an extra blank line
        transport.send("first\n").await.unwrap();
        transport.send("second").await.unwrap();

        assert_eq!(transport.receive().await.unwrap(), "first");
        assert_eq!(transport.receive().await.unwrap(), "second");

        transport.close().await.unwrap();
        let _ = child.kill().await;
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_mock_transport_send_receive() {
        let (mut transport, handle) = MockTransport::new();

        transport.send("message1").await.unwrap();
        transport.send("message2").await.unwrap();

        handle.push_inbound("response1");
        handle.push_inbound("response2");

        assert_eq!(transport.receive().await.unwrap(), "response1");
        assert_eq!(transport.receive().await.unwrap(), "response2");

        let sent = handle.drain_sent().await;
        assert_eq!(sent, vec!["message1", "message2"]);
    }

    #[tokio::test]
    async fn test_mock_transport_disconnect() {
        let (mut transport, _handle) = MockTransport::new();

        assert!(transport.is_connected());

        transport.close().await.unwrap();

        assert!(!transport.is_connected());
        assert!(transport.send("test").await.is_err());
        assert!(transport.receive().await.is_err());
    }
}
