//! Connection supervisor for a Lutron repeater
//!
//! A background task owns the TCP session: it logs in, forwards parsed
//! messages to subscribers, sends keep-alives, writes queued commands and
//! reconnects with exponential backoff when the session ends.

use crate::commands::{LipCommand, KEEPALIVE_COMMAND};
use crate::message::LipMessage;
use crate::parser::{KeepAliveClock, LipParser};
use crate::socket::{LineSocket, DEFAULT_READ_TIMEOUT};
use crate::types::{LipConnectionState, ProtocolError};

use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Telnet port the repeater listens on
pub const DEFAULT_PORT: u16 = 23;
pub const DEFAULT_USERNAME: &str = "lutron";
pub const DEFAULT_PASSWORD: &str = "integration";

/// Interval between `?SYSTEM,10` keep-alive queries
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
/// How long a keep-alive query may go unanswered
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

pub const LOGIN_PROMPT: &[u8] = b"login: ";
pub const PASSWORD_PROMPT: &[u8] = b"password: ";
/// Suffix of the `GNET> ` / `QNET> ` command prompt
const READY_PROMPT_SUFFIX: &str = "NET> ";

/// Connection settings
#[derive(Debug, Clone)]
pub struct LipConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    /// Timeout for the TCP connect and each login prompt
    pub login_timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl LipConfig {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            keepalive_interval: KEEPALIVE_INTERVAL,
            keepalive_timeout: KEEPALIVE_TIMEOUT,
            login_timeout: DEFAULT_READ_TIMEOUT,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command to the supervisor task
enum SessionCommand {
    Send {
        line: String,
        reply: oneshot::Sender<Result<(), ProtocolError>>,
    },
    Shutdown,
}

/// Why a session stopped
enum SessionEnd {
    Shutdown,
    Lost(ProtocolError),
}

/// Perform the login handshake
///
/// Waits for `login: `, sends the username, waits for `password: `, sends
/// the password and then waits for the `XNET> ` prompt. Being asked to log
/// in again means the credentials were rejected.
pub async fn login<S>(
    socket: &mut LineSocket<S>,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    socket
        .readuntil(LOGIN_PROMPT, timeout)
        .await?
        .ok_or(ProtocolError::ConnectionClosed)?;
    socket.write_command(username).await?;

    socket
        .readuntil(PASSWORD_PROMPT, timeout)
        .await?
        .ok_or(ProtocolError::ConnectionClosed)?;
    socket.write_command(password).await?;

    let mut received = String::new();
    loop {
        let chunk = socket
            .readuntil(b" ", timeout)
            .await?
            .ok_or(ProtocolError::ConnectionClosed)?;
        received.push_str(&chunk);
        if received.ends_with(READY_PROMPT_SUFFIX) {
            tracing::debug!("Login accepted");
            return Ok(());
        }
        if received.ends_with("login: ") {
            return Err(ProtocolError::LoginFailed);
        }
    }
}

/// Handle to a supervised repeater connection
pub struct LipConnection {
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<LipConnectionState>,
    event_tx: broadcast::Sender<LipMessage>,
    keepalive: KeepAliveClock,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LipConnection {
    /// Start the supervisor. Returns immediately; use
    /// [`wait_connected`](Self::wait_connected) to wait for the first login.
    #[must_use]
    pub fn start(config: LipConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(LipConnectionState::NotConnected);
        let (event_tx, _) = broadcast::channel(256);
        let parser = LipParser::new();
        let keepalive = parser.keepalive_clock();

        tracing::info!("Starting LIP connection to {}", config.address());
        let task = tokio::spawn(Self::supervisor_task(
            config,
            parser,
            state_tx,
            event_tx.clone(),
            command_rx,
        ));

        Self {
            command_tx,
            state_rx,
            event_tx,
            keepalive,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Connect / reconnect loop
    async fn supervisor_task(
        config: LipConfig,
        parser: LipParser,
        state_tx: watch::Sender<LipConnectionState>,
        event_tx: broadcast::Sender<LipMessage>,
        mut command_rx: mpsc::Receiver<SessionCommand>,
    ) {
        let mut backoff = config.backoff_min;

        loop {
            state_tx.send_replace(LipConnectionState::Connecting);
            let attempt = tokio::select! {
                result = Self::establish(&config) => result,
                () = Self::reject_until_shutdown(&mut command_rx) => {
                    tracing::debug!("Shutdown requested while connecting");
                    break;
                }
            };
            match attempt {
                Ok(socket) => {
                    state_tx.send_replace(LipConnectionState::Connected);
                    tracing::info!("Connected to Lutron repeater at {}", config.address());
                    backoff = config.backoff_min;

                    let end =
                        Self::run_session(socket, &parser, &config, &event_tx, &mut command_rx)
                            .await;
                    state_tx.send_replace(LipConnectionState::NotConnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(e) => {
                            tracing::warn!("Connection to {} lost: {}", config.address(), e);
                        }
                    }
                }
                Err(e) => {
                    state_tx.send_replace(LipConnectionState::NotConnected);
                    tracing::warn!("Failed to connect to {}: {}", config.address(), e);
                }
            }

            tracing::debug!("Reconnecting in {:?}", backoff);
            if !Self::wait_backoff(backoff, &mut command_rx).await {
                break;
            }
            backoff = (backoff * 2).min(config.backoff_max);
        }

        state_tx.send_replace(LipConnectionState::NotConnected);
        tracing::debug!("Supervisor task shutting down");
    }

    /// Sleep for `delay`, rejecting commands meanwhile.
    /// Returns `false` if shutdown was requested.
    async fn wait_backoff(delay: Duration, command_rx: &mut mpsc::Receiver<SessionCommand>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = Self::reject_until_shutdown(command_rx) => false,
        }
    }

    /// Answer every command with `NotConnected` until shutdown is requested
    /// or the handle is dropped
    async fn reject_until_shutdown(command_rx: &mut mpsc::Receiver<SessionCommand>) {
        loop {
            match command_rx.recv().await {
                Some(SessionCommand::Send { reply, .. }) => {
                    let _ = reply.send(Err(ProtocolError::NotConnected));
                }
                Some(SessionCommand::Shutdown) | None => return,
            }
        }
    }

    /// Open the TCP connection and log in
    async fn establish(config: &LipConfig) -> Result<LineSocket<TcpStream>, ProtocolError> {
        let stream = tokio::time::timeout(config.login_timeout, TcpStream::connect(config.address()))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Unable to set TCP_NODELAY: {}", e);
        }

        let mut socket = LineSocket::new(stream);
        match login(
            &mut socket,
            &config.username,
            &config.password,
            config.login_timeout,
        )
        .await
        {
            Ok(()) => Ok(socket),
            Err(e) => {
                socket.close().await;
                Err(e)
            }
        }
    }

    /// Read loop for one logged-in session
    async fn run_session<S>(
        mut socket: LineSocket<S>,
        parser: &LipParser,
        config: &LipConfig,
        event_tx: &broadcast::Sender<LipMessage>,
        command_rx: &mut mpsc::Receiver<SessionCommand>,
    ) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let clock = parser.keepalive_clock();
        let read_timeout = config.keepalive_interval + config.keepalive_timeout;
        let mut keepalive = tokio::time::interval_at(
            Instant::now() + config.keepalive_interval,
            config.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // (answers seen when the query went out, tick it went out on)
        let mut outstanding: Option<(u64, Instant)> = None;

        let end = loop {
            tokio::select! {
                line = socket.readline(read_timeout) => match line {
                    Ok(Some(line)) => match parser.parse(&line) {
                        Ok(Some(message)) => {
                            tracing::debug!("Received {:?}: {}", message.mode, message.raw);
                            // No subscribers is fine
                            let _ = event_tx.send(message);
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Skipping line: {}", e),
                    },
                    Ok(None) => break SessionEnd::Lost(ProtocolError::ConnectionClosed),
                    Err(e) => break SessionEnd::Lost(e),
                },
                tick = keepalive.tick() => {
                    if let Some((seen, sent_at)) = outstanding {
                        if clock.count() == seen
                            && tick.duration_since(sent_at) >= config.keepalive_timeout
                        {
                            break SessionEnd::Lost(ProtocolError::KeepAliveTimeout(
                                config.keepalive_timeout,
                            ));
                        }
                    }
                    if let Err(e) = socket.write_command(KEEPALIVE_COMMAND).await {
                        break SessionEnd::Lost(e);
                    }
                    outstanding = Some((clock.count(), tick));
                },
                cmd = command_rx.recv() => match cmd {
                    Some(SessionCommand::Send { line, reply }) => {
                        tracing::debug!("Sending {}", line);
                        match socket.write_command(&line).await {
                            Ok(()) => {
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                tracing::error!("Write error: {}", e);
                                let _ = reply.send(Err(ProtocolError::NotConnected));
                                break SessionEnd::Lost(e);
                            }
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => break SessionEnd::Shutdown,
                },
            }
        };

        socket.close().await;
        end
    }

    /// Send a command. Fails with `NotConnected` unless logged in.
    pub async fn send(&self, command: &LipCommand) -> Result<(), ProtocolError> {
        if self.state() != LipConnectionState::Connected {
            return Err(ProtocolError::NotConnected);
        }

        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Send {
                line: command.to_wire_string(),
                reply,
            })
            .await
            .map_err(|_| ProtocolError::NotConnected)?;

        reply_rx.await.map_err(|_| ProtocolError::NotConnected)?
    }

    /// Subscribe to parsed messages, in wire order
    pub fn subscribe(&self) -> broadcast::Receiver<LipMessage> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> LipConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LipConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the session is logged in
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), ProtocolError> {
        let mut rx = self.state_rx.clone();
        let result = match tokio::time::timeout(
            timeout,
            rx.wait_for(|s| *s == LipConnectionState::Connected),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ProtocolError::NotConnected),
            Err(_) => Err(ProtocolError::Timeout),
        };
        result
    }

    /// Time of the last keep-alive answer from the repeater
    #[must_use]
    pub fn last_keepalive(&self) -> Option<SystemTime> {
        self.keepalive.last()
    }

    /// Stop the supervisor and close the socket
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
        let task = self
            .task
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or_default();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Supervisor task failed: {}", e);
            }
        }
    }
}

impl Drop for LipConnection {
    fn drop(&mut self) {
        // Signal shutdown (best effort)
        let _ = self.command_tx.try_send(SessionCommand::Shutdown);
    }
}
