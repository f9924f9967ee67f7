//! Control Center controller
//!
//! One task per tab. It is the only consumer of the communicator's events and
//! the only caller into the `ControlCenterView`, so view updates are applied
//! strictly in the order the wrapper produced them.
//!
//! # Flow
//! ```text
//!   ControlCenterHandle ──actions──▶ ┌──────────────┐ ──▶ ControlCenterView
//!   Communicator ───────events─────▶ │ controller   │
//!   poll interval ─────────tick────▶ └──────────────┘ ──▶ Communicator commands
//! ```
//!
//! When the stream ends without a close-all the operator is asked whether to
//! reconnect, as often as they agree. Declining closes the tab and drops the
//! pooled session.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::context::AppContext;
use super::state::{ChannelPhase, ChannelTable};
use super::view::{ControlCenterView, ReconnectPrompt};
use crate::communicator::{Communicator, CommunicatorEvent, Notice};
use crate::protocol::{
    OperationKind, ProtocolErrorKind, ProtocolEvent, ReplyStatus, CONTROL_CHANNEL,
};
use crate::ssh::{ServerRecord, SshError};

/// Events buffered between a read loop and the controller
const EVENT_QUEUE: usize = 256;
const ACTION_QUEUE: usize = 32;

#[derive(Debug)]
enum Action {
    Open(String),
    Close(String),
    CloseAll,
    Status(String),
    LogOn(String),
    LogOff(String),
    Version(String),
    Kill { channel: String, username: String },
    Send { channel: String, text: String },
}

/// Operator side of a tab. Dropping every handle closes the tab.
#[derive(Clone)]
pub struct ControlCenterHandle {
    actions: mpsc::Sender<Action>,
}

impl ControlCenterHandle {
    async fn dispatch(&self, action: Action) {
        if let Err(e) = self.actions.send(action).await {
            debug!("Tab already closed, dropping {:?}", e.0);
        }
    }

    pub async fn open_channel(&self, channel: &str) {
        self.dispatch(Action::Open(channel.to_string())).await;
    }

    pub async fn close_channel(&self, channel: &str) {
        self.dispatch(Action::Close(channel.to_string())).await;
    }

    /// Close every channel and end the session; the tab closes afterwards
    pub async fn close_all(&self) {
        self.dispatch(Action::CloseAll).await;
    }

    pub async fn call_status(&self, channel: &str) {
        self.dispatch(Action::Status(channel.to_string())).await;
    }

    pub async fn call_log(&self, channel: &str) {
        self.dispatch(Action::LogOn(channel.to_string())).await;
    }

    pub async fn end_log(&self, channel: &str) {
        self.dispatch(Action::LogOff(channel.to_string())).await;
    }

    pub async fn call_version(&self, channel: &str) {
        self.dispatch(Action::Version(channel.to_string())).await;
    }

    pub async fn kill_user(&self, channel: &str, username: &str) {
        self.dispatch(Action::Kill {
            channel: channel.to_string(),
            username: username.to_string(),
        })
        .await;
    }

    pub async fn send_user_command(&self, channel: &str, text: &str) {
        self.dispatch(Action::Send {
            channel: channel.to_string(),
            text: text.to_string(),
        })
        .await;
    }

    pub fn is_closed(&self) -> bool {
        self.actions.is_closed()
    }
}

pub struct ControlCenter {
    record: ServerRecord,
    ctx: Arc<AppContext>,
    view: Arc<dyn ControlCenterView>,
    prompt: Arc<dyn ReconnectPrompt>,
    communicator: Communicator,
    events_tx: mpsc::Sender<CommunicatorEvent>,
    channels: ChannelTable,
}

impl ControlCenter {
    /// Establish (or reuse) the session for `record` and start a tab on it.
    ///
    /// Only session establishment fails here. A wrapper that cannot be
    /// started is reported to the view and leaves the tab disconnected.
    pub async fn open(
        record: ServerRecord,
        ctx: Arc<AppContext>,
        view: Arc<dyn ControlCenterView>,
        prompt: Arc<dyn ReconnectPrompt>,
    ) -> Result<(ControlCenterHandle, JoinHandle<()>), SshError> {
        let session = ctx
            .pool
            .get_or_connect(&record, ctx.provider.as_ref())
            .await?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let communicator = Communicator::connect(
            ctx.provider.as_ref(),
            &session,
            &record.wrapper_command,
            events_tx.clone(),
        )
        .await;

        let (actions_tx, actions_rx) = mpsc::channel(ACTION_QUEUE);
        let center = Self {
            record,
            ctx,
            view,
            prompt,
            communicator,
            events_tx,
            channels: ChannelTable::default(),
        };

        let task = tokio::spawn(center.run(actions_rx, events_rx));
        Ok((
            ControlCenterHandle {
                actions: actions_tx,
            },
            task,
        ))
    }

    async fn run(
        mut self,
        mut actions: mpsc::Receiver<Action>,
        mut events: mpsc::Receiver<CommunicatorEvent>,
    ) {
        let period = self.record.poll_interval();
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut actions_open = true;

        info!(
            "Control center for {} started (status every {}s)",
            self.record.host,
            period.as_secs()
        );

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    if self.handle_event(event).await.is_break() {
                        break;
                    }
                }
                action = actions.recv(), if actions_open => match action {
                    Some(action) => self.handle_action(action).await,
                    None => {
                        actions_open = false;
                        self.begin_close_all();
                    }
                },
                _ = poll.tick() => self.poll_status().await,
            }
        }

        info!("Control center for {} stopped", self.record.host);
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    async fn handle_action(&mut self, action: Action) {
        if matches!(action, Action::CloseAll) {
            self.begin_close_all();
            return;
        }

        if !self.communicator.is_initialized() || self.communicator.is_terminated() {
            self.view
                .status_message(&format!("Not connected to {}", self.record.host));
            return;
        }

        match action {
            Action::Open(channel) => {
                self.set_phase(&channel, ChannelPhase::Opening);
                self.communicator.open_channel(&channel).await;
            }
            Action::Close(channel) => {
                self.set_phase(&channel, ChannelPhase::Closing);
                self.communicator.close_channel(&channel).await;
            }
            Action::Status(channel) => self.communicator.call_status(&channel).await,
            Action::LogOn(channel) => {
                self.communicator.call_log(&channel).await;
                if let Some(controls) = self.channels.set_logging(&channel, true) {
                    self.view.set_channel_controls(&channel, controls);
                }
            }
            Action::LogOff(channel) => {
                self.communicator.end_log(&channel).await;
                if let Some(controls) = self.channels.set_logging(&channel, false) {
                    self.view.set_channel_controls(&channel, controls);
                }
            }
            Action::Version(channel) => self.communicator.call_version(&channel).await,
            Action::Kill { channel, username } => {
                self.communicator.kill_user(&channel, &username).await
            }
            Action::Send { channel, text } => {
                self.communicator.send_user_command(&channel, &text).await
            }
            Action::CloseAll => {}
        }
    }

    /// Close-all waits on the read loop, so it runs beside the controller.
    /// Its `Terminated { requested: true }` closes the tab.
    fn begin_close_all(&mut self) {
        let open: Vec<String> = self.communicator.open_channels();
        for channel in &open {
            self.set_phase(channel, ChannelPhase::Closing);
        }

        let communicator = self.communicator.clone();
        tokio::spawn(async move { communicator.close_all_channels().await });
    }

    async fn poll_status(&self) {
        if self.communicator.is_terminated() {
            return;
        }
        for channel in self.communicator.open_channels() {
            self.communicator.call_status(&channel).await;
        }
    }

    fn set_phase(&mut self, channel: &str, phase: ChannelPhase) {
        if let Some(controls) = self.channels.transition(channel, phase) {
            self.view.set_channel_controls(channel, controls);
        }
    }

    // ========================================================================
    // Communicator events
    // ========================================================================

    async fn handle_event(&mut self, event: CommunicatorEvent) -> ControlFlow<()> {
        match event {
            CommunicatorEvent::Protocol(event) => {
                self.handle_protocol(event).await;
                ControlFlow::Continue(())
            }
            CommunicatorEvent::Notice(notice) => {
                if matches!(notice, Notice::InitFailed(_)) {
                    self.view.set_connected(false);
                }
                self.view.status_message(&notice.to_string());
                ControlFlow::Continue(())
            }
            CommunicatorEvent::Terminated {
                session_id,
                requested,
            } => {
                if session_id != self.communicator.session_id() {
                    debug!("Ignoring termination of replaced session {}", session_id);
                    return ControlFlow::Continue(());
                }
                if requested {
                    self.teardown().await;
                    ControlFlow::Break(())
                } else {
                    warn!("Session to {} lost", self.record.host);
                    self.recover().await
                }
            }
        }
    }

    async fn handle_protocol(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::ChannelsDiscovered { channels } => {
                self.channels.merge_listing(&channels);
                self.view.channels_discovered(&channels);
                for number in channels.keys() {
                    if let Some(entry) = self.channels.get(number) {
                        self.view.set_channel_controls(number, entry.controls());
                    }
                }
            }
            ProtocolEvent::ClientListUpdated { channel, clients } => {
                self.view.client_list_updated(&channel, &clients);
            }
            ProtocolEvent::LogLine { channel, text } => self.view.log_line(&channel, &text),
            ProtocolEvent::VersionReported { channel, text } => {
                self.view.version_reported(&channel, &text)
            }
            ProtocolEvent::CommandOutput { channel, text } => {
                self.view.command_output(&channel, &text)
            }
            ProtocolEvent::DebugMessage { text } => self.view.debug_message(&text),
            ProtocolEvent::OperationAcknowledged {
                channel,
                operation,
                status,
            } => self.handle_acknowledgement(channel, operation, status).await,
            ProtocolEvent::ClientsKilled { channel, text } => {
                self.view
                    .status_message(&format!("Channel {}: {}", channel, text));
            }
            ProtocolEvent::ErrorDetected {
                kind,
                channel,
                username,
                text,
            } => match kind {
                ProtocolErrorKind::OpenFailed | ProtocolErrorKind::OpenTimeout => {
                    if self.channels.get(&channel).is_some() {
                        self.set_phase(&channel, ChannelPhase::Closed);
                    }
                    if kind == ProtocolErrorKind::OpenFailed {
                        self.view.open_failed(&channel);
                    } else {
                        self.view.open_timeout(&channel);
                    }
                }
                ProtocolErrorKind::KillFailed => {
                    self.view
                        .kill_failed(&channel, username.as_deref().unwrap_or_default());
                }
                ProtocolErrorKind::DuplicateInstance => self.view.duplicate_instance(&text),
                ProtocolErrorKind::Generic => {
                    self.view
                        .status_message(&format!("Channel {}: {}", channel, text));
                }
            },
            ProtocolEvent::Closedown { channel, text } => {
                if channel == CONTROL_CHANNEL {
                    self.view.status_message(&format!(
                        "Wrapper on {} is shutting down: {}",
                        self.record.host, text
                    ));
                } else {
                    self.set_phase(&channel, ChannelPhase::Closed);
                    self.view
                        .status_message(&format!("Channel {} closed by server", channel));
                }
            }
        }
    }

    async fn handle_acknowledgement(
        &mut self,
        channel: String,
        operation: Option<OperationKind>,
        status: ReplyStatus,
    ) {
        match (operation, status) {
            (None, ReplyStatus::Ready) => {
                self.view.set_connected(true);
                self.view
                    .status_message(&format!("Connected to {}", self.record.host));
            }
            (Some(OperationKind::Open), ReplyStatus::Wait) => {
                self.set_phase(&channel, ChannelPhase::Opening);
            }
            (Some(OperationKind::Open), ReplyStatus::Ok) => {
                self.set_phase(&channel, ChannelPhase::Open);
                self.communicator.call_status(&channel).await;
            }
            (Some(OperationKind::Open), ReplyStatus::Fail) => {
                self.set_phase(&channel, ChannelPhase::Closed);
                self.view
                    .status_message(&format!("Channel {} refused to open", channel));
            }
            (Some(OperationKind::Close), ReplyStatus::Ok) => {
                self.set_phase(&channel, ChannelPhase::Closed);
                self.view.client_list_updated(&channel, &[]);
            }
            (Some(OperationKind::Close), ReplyStatus::Fail) => {
                self.set_phase(&channel, ChannelPhase::Open);
                self.view
                    .status_message(&format!("Channel {} refused to close", channel));
            }
            (operation, status) => {
                debug!(
                    "Acknowledgement {:?}/{:?} on channel {}",
                    operation, status, channel
                );
            }
        }
    }

    // ========================================================================
    // Session loss
    // ========================================================================

    /// Ask to reconnect until a new wrapper session is up or the operator
    /// declines
    async fn recover(&mut self) -> ControlFlow<()> {
        self.view.set_connected(false);
        for (channel, controls) in self.channels.close_all() {
            self.view.set_channel_controls(&channel, controls);
        }

        loop {
            if !self.prompt.confirm_reconnect(&self.record.host).await {
                info!("Reconnect to {} declined", self.record.host);
                self.teardown().await;
                return ControlFlow::Break(());
            }

            let session = match self
                .ctx
                .pool
                .get_or_connect(&self.record, self.ctx.provider.as_ref())
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    warn!("Reconnect to {} failed: {}", self.record.host, e);
                    self.view.status_message(&format!(
                        "Reconnect to {} failed: {}",
                        self.record.host, e
                    ));
                    continue;
                }
            };

            let communicator = Communicator::connect(
                self.ctx.provider.as_ref(),
                &session,
                &self.record.wrapper_command,
                self.events_tx.clone(),
            )
            .await;

            if communicator.is_initialized() {
                info!("Reconnected to {}", self.record.host);
                self.communicator = communicator;
                self.view
                    .status_message(&format!("Reconnected to {}", self.record.host));
                return ControlFlow::Continue(());
            }
        }
    }

    async fn teardown(&mut self) {
        self.ctx.pool.disconnect(&self.record.host).await;
        self.view.set_connected(false);
        self.view.tab_closed();
        info!("Tab for {} closed", self.record.host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state::ChannelControls;
    use crate::protocol::ClientStatus;
    use crate::ssh::{BoxedShell, HandleCommand, HandleController, PingResult, SessionProvider};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{
        AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Status(String),
        Controls(String, ChannelControls),
        Connected(bool),
        TabClosed,
        Clients(String, usize),
    }

    #[derive(Default)]
    struct RecordingView {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingView {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        async fn wait_for(&self, pred: impl Fn(&[Call]) -> bool) {
            for _ in 0..500 {
                if pred(self.calls.lock().as_slice()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("view never reached expected state: {:?}", self.calls());
        }
    }

    impl ControlCenterView for RecordingView {
        fn status_message(&self, message: &str) {
            self.calls.lock().push(Call::Status(message.to_string()));
        }

        fn set_channel_controls(&self, channel: &str, controls: ChannelControls) {
            self.calls
                .lock()
                .push(Call::Controls(channel.to_string(), controls));
        }

        fn set_connected(&self, connected: bool) {
            self.calls.lock().push(Call::Connected(connected));
        }

        fn tab_closed(&self) {
            self.calls.lock().push(Call::TabClosed);
        }

        fn client_list_updated(&self, channel: &str, clients: &[ClientStatus]) {
            self.calls
                .lock()
                .push(Call::Clients(channel.to_string(), clients.len()));
        }
    }

    struct ScriptedPrompt {
        answers: Mutex<VecDeque<bool>>,
        asked: AtomicUsize,
    }

    impl ScriptedPrompt {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                asked: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReconnectPrompt for ScriptedPrompt {
        async fn confirm_reconnect(&self, _host: &str) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answers.lock().pop_front().unwrap_or(false)
        }
    }

    fn live_controller() -> HandleController {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    HandleCommand::Ping { reply_tx } => {
                        let _ = reply_tx.send(PingResult::Ok);
                    }
                    HandleCommand::Disconnect => break,
                    HandleCommand::ChannelOpenSession { .. } => {}
                }
            }
        });
        HandleController::new(cmd_tx)
    }

    /// Hands out in-memory shells; the far ends go to the test
    struct DuplexProvider {
        remotes: mpsc::UnboundedSender<DuplexStream>,
        connects: AtomicUsize,
        refuse_connect: AtomicBool,
        refuse_shell: AtomicBool,
    }

    #[async_trait]
    impl SessionProvider for DuplexProvider {
        async fn connect(&self, _record: &ServerRecord) -> Result<HandleController, SshError> {
            if self.refuse_connect.load(Ordering::SeqCst) {
                return Err(SshError::ConnectionFailed("connection refused".into()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(live_controller())
        }

        async fn open_shell(&self, _session: &HandleController) -> Result<BoxedShell, SshError> {
            if self.refuse_shell.load(Ordering::SeqCst) {
                return Err(SshError::ChannelError("shell request denied".into()));
            }
            let (local, remote) = tokio::io::duplex(16 * 1024);
            let _ = self.remotes.send(remote);
            Ok(Box::new(local))
        }
    }

    struct Remote {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Remote {
        async fn attach(remotes: &mut mpsc::UnboundedReceiver<DuplexStream>) -> Self {
            let stream = tokio::time::timeout(Duration::from_secs(5), remotes.recv())
                .await
                .expect("shell in time")
                .expect("provider alive");
            let (r, w) = tokio::io::split(stream);
            let mut remote = Self {
                reader: BufReader::new(r),
                writer: w,
            };
            assert_eq!(remote.expect_line().await, "\n");
            assert_eq!(remote.expect_line().await, "ovpn-wrapper\n");
            remote
        }

        async fn expect_line(&mut self) -> String {
            let mut line = String::new();
            tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
                .await
                .expect("line in time")
                .unwrap();
            line
        }

        async fn say(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
            self.writer.flush().await.unwrap();
        }
    }

    struct Harness {
        handle: ControlCenterHandle,
        task: JoinHandle<()>,
        view: Arc<RecordingView>,
        prompt: Arc<ScriptedPrompt>,
        provider: Arc<DuplexProvider>,
        ctx: Arc<AppContext>,
        remotes: mpsc::UnboundedReceiver<DuplexStream>,
    }

    fn record(poll_secs: u64) -> ServerRecord {
        ServerRecord {
            name: "vpn-a".into(),
            host: "vpn-a.example.net".into(),
            username: "admin".into(),
            status_poll_interval_secs: poll_secs,
            ..Default::default()
        }
    }

    async fn open_tab(poll_secs: u64, answers: &[bool], refuse_shell: bool) -> Harness {
        let (remotes_tx, remotes) = mpsc::unbounded_channel();
        let provider = Arc::new(DuplexProvider {
            remotes: remotes_tx,
            connects: AtomicUsize::new(0),
            refuse_connect: AtomicBool::new(false),
            refuse_shell: AtomicBool::new(refuse_shell),
        });
        let ctx = Arc::new(AppContext::new(provider.clone()));
        let view = Arc::new(RecordingView::default());
        let prompt = Arc::new(ScriptedPrompt::new(answers));

        let (handle, task) =
            ControlCenter::open(record(poll_secs), ctx.clone(), view.clone(), prompt.clone())
                .await
                .unwrap();

        Harness {
            handle,
            task,
            view,
            prompt,
            provider,
            ctx,
            remotes,
        }
    }

    async fn ready(h: &mut Harness) -> Remote {
        let mut remote = Remote::attach(&mut h.remotes).await;
        remote.say(">00> READY").await;
        h.view
            .wait_for(|calls| calls.contains(&Call::Connected(true)))
            .await;
        remote
    }

    async fn join(task: JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("tab closed in time")
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_ack_enables_disconnect_once() {
        let mut h = open_tab(3600, &[], false).await;
        let mut remote = ready(&mut h).await;

        h.handle.open_channel("05").await;
        assert_eq!(remote.expect_line().await, "<00< open 05\n");
        remote.say(">00> OK").await;
        // status is requested right after the open is confirmed
        assert_eq!(remote.expect_line().await, "<05< status\n");

        let controls: Vec<ChannelControls> = h
            .view
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Controls(ch, controls) if ch == "05" => Some(controls),
                _ => None,
            })
            .collect();
        assert_eq!(
            controls
                .iter()
                .filter(|c| c.disconnect_enabled && !c.connect_enabled)
                .count(),
            1
        );
        assert_eq!(controls.last().map(|c| c.disconnect_enabled), Some(true));
    }

    #[tokio::test]
    async fn test_poll_requests_status_for_open_channels() {
        let mut h = open_tab(1, &[], false).await;
        let mut remote = ready(&mut h).await;

        h.handle.open_channel("02").await;
        remote.expect_line().await;
        remote.say(">00> OK").await;
        assert_eq!(remote.expect_line().await, "<02< status\n");

        // next one comes from the timer
        assert_eq!(remote.expect_line().await, "<02< status\n");
    }

    #[tokio::test]
    async fn test_client_list_reaches_view() {
        let mut h = open_tab(3600, &[], false).await;
        let mut remote = ready(&mut h).await;

        for line in [
            ">02> OpenVPN CLIENT LIST",
            ">02> Updated,Thu Jun 18 08:12:15 2009",
            ">02> Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since",
            ">02> alice,10.0.0.1:1194,100,200,Thu Jun 18 04:23:03 2009",
            ">02> ROUTING TABLE",
            ">02> Virtual Address,Common Name,Real Address,Last Ref",
            ">02> 192.168.1.2,alice,10.0.0.1:1194,Thu Jun 18 08:12:09 2009",
            ">02> GLOBAL STATS",
        ] {
            remote.say(line).await;
        }

        h.view
            .wait_for(|calls| calls.contains(&Call::Clients("02".into(), 1)))
            .await;
    }

    #[tokio::test]
    async fn test_open_failure_reenables_connect() {
        let mut h = open_tab(3600, &[], false).await;
        let mut remote = ready(&mut h).await;

        h.handle.open_channel("07").await;
        remote.expect_line().await;
        remote.say("!00! ERROR: could not open channel 07").await;

        h.view
            .wait_for(|calls| calls.contains(&Call::Status("Channel 07 could not be opened".into())))
            .await;
        let last = h.view.calls().into_iter().rev().find_map(|c| match c {
            Call::Controls(ch, controls) if ch == "07" => Some(controls),
            _ => None,
        });
        assert_eq!(last.map(|c| c.connect_enabled), Some(true));
    }

    #[tokio::test]
    async fn test_kill_failure_names_user() {
        let mut h = open_tab(3600, &[], false).await;
        let mut remote = ready(&mut h).await;

        h.handle.kill_user("02", "mallory").await;
        assert_eq!(remote.expect_line().await, "<02< kill mallory\n");
        remote.say(">02> ERROR: common name 'mallory' not found").await;

        h.view
            .wait_for(|calls| {
                calls.iter().any(|c| matches!(c, Call::Status(m) if m.contains("'mallory'")))
            })
            .await;
    }

    #[tokio::test]
    async fn test_close_all_closes_tab_without_prompt() {
        let mut h = open_tab(3600, &[true], false).await;
        let mut remote = ready(&mut h).await;

        h.handle.open_channel("02").await;
        remote.expect_line().await;
        remote.say(">00> OK").await;
        remote.expect_line().await;

        h.handle.close_all().await;
        assert_eq!(remote.expect_line().await, "<00< close 02\n");
        remote.say(">00> OK").await;

        join(h.task).await;
        assert_eq!(h.prompt.asked.load(Ordering::SeqCst), 0);
        assert!(h.view.calls().contains(&Call::TabClosed));
        assert!(!h.ctx.pool.contains("vpn-a.example.net"));
    }

    #[tokio::test]
    async fn test_lost_session_reconnects_when_confirmed() {
        let mut h = open_tab(3600, &[true], false).await;
        let remote = ready(&mut h).await;
        drop(remote);

        let mut remote = Remote::attach(&mut h.remotes).await;
        remote.say(">00> READY").await;
        h.view
            .wait_for(|calls| {
                calls.contains(&Call::Status("Reconnected to vpn-a.example.net".into()))
            })
            .await;

        assert_eq!(h.prompt.asked.load(Ordering::SeqCst), 1);
        // live pooled session is reused
        assert_eq!(h.provider.connects.load(Ordering::SeqCst), 1);
        assert!(!h.handle.is_closed());
    }

    #[tokio::test]
    async fn test_lost_session_declined_closes_tab() {
        let mut h = open_tab(3600, &[false], false).await;
        let remote = ready(&mut h).await;
        drop(remote);

        join(h.task).await;
        assert_eq!(h.prompt.asked.load(Ordering::SeqCst), 1);
        let calls = h.view.calls();
        assert!(calls.contains(&Call::TabClosed));
        assert!(!h.ctx.pool.contains("vpn-a.example.net"));
    }

    #[tokio::test]
    async fn test_failed_reconnect_asks_again() {
        let mut h = open_tab(3600, &[true, false], false).await;
        let remote = ready(&mut h).await;

        h.ctx.pool.remove("vpn-a.example.net");
        h.provider.refuse_connect.store(true, Ordering::SeqCst);
        drop(remote);

        join(h.task).await;
        assert_eq!(h.prompt.asked.load(Ordering::SeqCst), 2);
        assert!(h.view.calls().iter().any(
            |c| matches!(c, Call::Status(m) if m.starts_with("Reconnect to vpn-a.example.net failed"))
        ));
    }

    #[tokio::test]
    async fn test_init_failure_leaves_tab_disconnected() {
        let h = open_tab(3600, &[], true).await;

        h.view
            .wait_for(|calls| {
                calls
                    .iter()
                    .any(|c| matches!(c, Call::Status(m) if m.contains("shell request denied")))
            })
            .await;
        assert!(h.view.calls().contains(&Call::Connected(false)));

        h.handle.open_channel("02").await;
        h.view
            .wait_for(|calls| calls.contains(&Call::Status("Not connected to vpn-a.example.net".into())))
            .await;
    }

    #[tokio::test]
    async fn test_session_failure_is_returned() {
        let (remotes_tx, _remotes) = mpsc::unbounded_channel();
        let provider = Arc::new(DuplexProvider {
            remotes: remotes_tx,
            connects: AtomicUsize::new(0),
            refuse_connect: AtomicBool::new(true),
            refuse_shell: AtomicBool::new(false),
        });
        let ctx = Arc::new(AppContext::new(provider));

        let result = ControlCenter::open(
            record(10),
            ctx,
            Arc::new(RecordingView::default()),
            Arc::new(ScriptedPrompt::new(&[])),
        )
        .await;

        assert!(matches!(result, Err(SshError::ConnectionFailed(_))));
    }
}
