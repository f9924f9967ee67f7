//! Channel Communicator
//!
//! Owns the shell stream to the remote management wrapper. Instructions are
//! written as framed lines; a read-loop task frames the input into lines,
//! runs them through the `LineParser`, applies the outcome to the open-channel
//! set and pending operations, and forwards events to the controller.
//!
//! # Invariants
//! - Exactly one `Terminated` event per communicator
//! - Channel `00` is open for as long as the stream is
//! - Pending operations are discarded silently when the stream ends

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use super::events::{CommunicatorEvent, Notice};
use super::framing::WrapperLineCodec;
use crate::protocol::{
    format_line, shell_line, Instruction, LineContext, LineParser, OperationKind,
    PendingOperations, ProtocolErrorKind, ProtocolEvent, ReplyStatus, CONTROL_CHANNEL,
};
use crate::ssh::{BoxedShell, HandleController, SessionProvider};

/// Longest accepted input line; longer lines are skipped
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Close-all polls every `CLOSE_POLL_INTERVAL`, at most `CLOSE_POLL_ATTEMPTS`
/// times per channel (about five seconds)
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const CLOSE_POLL_ATTEMPTS: u32 = 100;

#[derive(Debug, Default)]
struct ChannelState {
    open: BTreeSet<String>,
    pending: PendingOperations,
    interactive: Option<String>,
}

struct Inner {
    session_id: String,
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedShell>>>,
    state: Mutex<ChannelState>,
    events: mpsc::Sender<CommunicatorEvent>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
    terminated: AtomicBool,
    closing: AtomicBool,
}

/// Handle to one wrapper session. Cheap to clone.
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<Inner>,
}

impl Communicator {
    /// Create an unstarted communicator that reports to `events`
    pub fn new(events: mpsc::Sender<CommunicatorEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_id: uuid::Uuid::new_v4().to_string(),
                writer: tokio::sync::Mutex::new(None),
                state: Mutex::new(ChannelState::default()),
                events,
                read_task: Mutex::new(None),
                initialized: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Open a shell on `session` and start the wrapper in it.
    ///
    /// Never fails: when the shell cannot be set up an `InitFailed` notice is
    /// emitted and the returned communicator stays uninitialised.
    pub async fn connect(
        provider: &dyn SessionProvider,
        session: &HandleController,
        wrapper_command: &str,
        events: mpsc::Sender<CommunicatorEvent>,
    ) -> Self {
        let communicator = Self::new(events);
        match provider.open_shell(session).await {
            Ok(shell) => communicator.start(shell, wrapper_command).await,
            Err(e) => {
                error!("Failed to open wrapper shell: {}", e);
                communicator.notify(Notice::InitFailed(e.to_string())).await;
            }
        }
        communicator
    }

    /// Prime the shell, launch the wrapper and start the read loop
    pub async fn start(&self, shell: BoxedShell, wrapper_command: &str) {
        let (reader, writer) = tokio::io::split(shell);
        *self.inner.writer.lock().await = Some(writer);

        // empty line first, some remote shells swallow the first input while
        // negotiating the terminal type
        for text in ["", wrapper_command] {
            if let Err(e) = self.write_raw(&shell_line(text)).await {
                error!("Failed to start wrapper: {}", e);
                self.inner.writer.lock().await.take();
                self.notify(Notice::InitFailed(e.to_string())).await;
                return;
            }
        }

        self.inner.initialized.store(true, Ordering::SeqCst);
        info!(
            "Wrapper session {} started with {:?}",
            self.inner.session_id, wrapper_command
        );

        let this = self.clone();
        let handle = tokio::spawn(async move { this.read_loop(reader).await });
        *self.inner.read_task.lock() = Some(handle);
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Whether the stream has ended
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    pub fn is_open(&self, channel: &str) -> bool {
        if self.is_terminated() || !self.is_initialized() {
            return false;
        }
        channel == CONTROL_CHANNEL || self.inner.state.lock().open.contains(channel)
    }

    /// Channels opened by the operator, in channel order
    pub fn open_channels(&self) -> Vec<String> {
        self.inner.state.lock().open.iter().cloned().collect()
    }

    pub fn pending(&self) -> PendingOperations {
        self.inner.state.lock().pending.clone()
    }

    pub fn interactive_channel(&self) -> Option<String> {
        self.inner.state.lock().interactive.clone()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn open_channel(&self, channel: &str) {
        {
            let mut state = self.inner.state.lock();
            if let Some(previous) = state.pending.open.replace(channel.to_string()) {
                warn!("Pending open of {} superseded by {}", previous, channel);
            }
        }
        self.send(CONTROL_CHANNEL, Instruction::Open(channel.to_string()))
            .await;
    }

    pub async fn close_channel(&self, channel: &str) {
        {
            let mut state = self.inner.state.lock();
            if let Some(previous) = state.pending.close.replace(channel.to_string()) {
                warn!("Pending close of {} superseded by {}", previous, channel);
            }
        }
        self.send(CONTROL_CHANNEL, Instruction::Close(channel.to_string()))
            .await;
    }

    /// Close every open channel one after another, then end the session.
    ///
    /// Waits up to about five seconds per channel for the close to be
    /// confirmed. The session is shut down even if some never are.
    pub async fn close_all_channels(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);

        for channel in self.open_channels() {
            self.close_channel(&channel).await;

            let mut confirmed = false;
            for _ in 0..CLOSE_POLL_ATTEMPTS {
                if self.is_terminated() || !self.inner.state.lock().open.contains(&channel) {
                    confirmed = true;
                    break;
                }
                tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            }

            if !confirmed {
                warn!("Channel {} did not confirm close", channel);
                self.notify(Notice::CloseUnconfirmed { channel }).await;
            }
        }

        self.shutdown().await;
    }

    pub async fn call_status(&self, channel: &str) {
        self.send(channel, Instruction::Status).await;
    }

    pub async fn call_log(&self, channel: &str) {
        self.send(channel, Instruction::LogOn).await;
    }

    pub async fn end_log(&self, channel: &str) {
        self.send(channel, Instruction::LogOff).await;
    }

    pub async fn call_version(&self, channel: &str) {
        self.send(channel, Instruction::Version).await;
    }

    pub async fn kill_user(&self, channel: &str, username: &str) {
        self.send(channel, Instruction::Kill(username.to_string()))
            .await;
    }

    /// Pass operator text through; output on `channel` is reported as
    /// `CommandOutput` until the next command is sent there
    pub async fn send_user_command(&self, channel: &str, text: &str) {
        self.inner.state.lock().interactive = Some(channel.to_string());
        self.send(channel, Instruction::Raw(text.to_string())).await;
    }

    /// Stop the read loop and drop the stream. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);

        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(task) = self.inner.read_task.lock().take() {
            task.abort();
        }
        self.terminate().await;
    }

    async fn send(&self, channel: &str, instruction: Instruction) {
        if !instruction.is_control() {
            let mut state = self.inner.state.lock();
            if state.interactive.as_deref() == Some(channel)
                && !matches!(instruction, Instruction::Raw(_))
            {
                state.interactive = None;
            }
        }

        let line = format_line(channel, &instruction);
        debug!("-> {}", line.trim_end());

        if let Err(e) = self.write_raw(&line).await {
            warn!("Failed to send {:?} to channel {}: {}", instruction, channel, e);
            self.notify(Notice::SendFailed {
                channel: channel.to_string(),
                error: e.to_string(),
            })
            .await;
        }
    }

    async fn write_raw(&self, text: &str) -> std::io::Result<()> {
        let mut guard = self.inner.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))?;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await
    }

    async fn notify(&self, notice: Notice) {
        let _ = self.inner.events.send(CommunicatorEvent::Notice(notice)).await;
    }

    async fn emit(&self, event: ProtocolEvent) {
        let _ = self
            .inner
            .events
            .send(CommunicatorEvent::Protocol(event))
            .await;
    }

    // ========================================================================
    // Read loop
    // ========================================================================

    async fn read_loop(self, reader: ReadHalf<BoxedShell>) {
        let mut lines = FramedRead::new(reader, WrapperLineCodec::new(MAX_LINE_LENGTH));
        let mut parser = LineParser::new();

        debug!("Read loop started for {}", self.inner.session_id);

        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => self.handle_line(&mut parser, &line).await,
                Err(e) => {
                    warn!("Read error on {}: {}", self.inner.session_id, e);
                    break;
                }
            }
        }

        info!("Read loop ended for {}", self.inner.session_id);
        self.inner.writer.lock().await.take();
        self.terminate().await;
    }

    async fn handle_line(&self, parser: &mut LineParser, line: &str) {
        let event = {
            let state = self.inner.state.lock();
            parser.feed(
                line,
                LineContext {
                    pending: &state.pending,
                    interactive: state.interactive.as_deref(),
                },
            )
        };

        let Some(event) = event else {
            return;
        };

        self.apply(&event);

        if let ProtocolEvent::ClientsKilled { channel, .. } = &event {
            self.call_status(channel).await;
        }

        self.emit(event).await;
    }

    /// Update channel bookkeeping for an event
    fn apply(&self, event: &ProtocolEvent) {
        let mut state = self.inner.state.lock();

        match event {
            ProtocolEvent::OperationAcknowledged {
                channel,
                operation: Some(operation),
                status,
            } => match (operation, status) {
                (OperationKind::Open, ReplyStatus::Ok) => {
                    state.pending.open = None;
                    state.open.insert(channel.clone());
                    info!("Channel {} opened", channel);
                }
                (OperationKind::Open, ReplyStatus::Fail) => {
                    state.pending.open = None;
                    warn!("Channel {} refused to open", channel);
                }
                (OperationKind::Close, ReplyStatus::Ok) => {
                    state.pending.close = None;
                    state.open.remove(channel);
                    info!("Channel {} closed", channel);
                }
                (OperationKind::Close, ReplyStatus::Fail) => {
                    state.pending.close = None;
                    warn!("Channel {} refused to close", channel);
                }
                _ => {}
            },
            ProtocolEvent::ErrorDetected {
                kind: ProtocolErrorKind::OpenFailed | ProtocolErrorKind::OpenTimeout,
                ..
            } => {
                state.pending.open = None;
            }
            ProtocolEvent::Closedown { channel, .. } if channel != CONTROL_CHANNEL => {
                state.open.remove(channel);
                if state.pending.close.as_deref() == Some(channel) {
                    state.pending.close = None;
                }
            }
            _ => {}
        }
    }

    /// Clear channel state and emit `Terminated` once
    async fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut state = self.inner.state.lock();
            if !state.pending.is_empty() {
                debug!("Discarding pending operations {:?}", state.pending);
            }
            *state = ChannelState::default();
        }

        let requested = self.inner.closing.load(Ordering::SeqCst);
        let _ = self
            .inner
            .events
            .send(CommunicatorEvent::Terminated {
                session_id: self.inner.session_id.clone(),
                requested,
            })
            .await;
    }
}
