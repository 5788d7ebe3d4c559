//! Connection session driver
//!
//! A session owns one transport connection and its channel. The connection
//! is touched only by the driver task; everything else talks to the session
//! through its [`SessionHandle`], which can request a close and observe the
//! published state, nothing more.

use super::classify::{classify_failure, FailureClass};
use super::error::{TransportError, TransportResult};
use super::params::TransportParameters;
use super::transport::{ChannelHandle, Transport, TransportConnection};
use super::types::{
    SessionDiagnostics, SessionFailure, SessionId, SessionRole, SessionState, SessionStatus,
};
use crate::core::retry::ReconnectPolicy;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

/// Supplies current transport parameters on every connect attempt
pub trait ParamsProvider: Send + Sync {
    fn transport_parameters(&self) -> TransportResult<TransportParameters>;
}

/// Where a session takes its transport parameters from
#[derive(Clone)]
pub enum ParamsSource {
    /// Fixed at session creation
    Snapshot(TransportParameters),
    /// Re-read before each connect attempt
    Live(Arc<dyn ParamsProvider>),
}

impl ParamsSource {
    fn resolve(&self) -> TransportResult<TransportParameters> {
        match self {
            ParamsSource::Snapshot(params) => Ok(params.clone()),
            ParamsSource::Live(provider) => provider.transport_parameters(),
        }
    }
}

#[derive(Debug)]
enum SessionCommand {
    Close,
}

/// A session that has not been started yet
///
/// Created in [`SessionState::Idle`]; [`start`](Self::start) hands it to the
/// runtime and returns the handle that owns it from then on.
pub struct ConnectionSession {
    id: SessionId,
    name: String,
    role: SessionRole,
    params: ParamsSource,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    failures: mpsc::UnboundedSender<SessionFailure>,
}

impl ConnectionSession {
    pub fn new(
        name: impl Into<String>,
        role: SessionRole,
        params: ParamsSource,
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        failures: mpsc::UnboundedSender<SessionFailure>,
    ) -> Self {
        Self {
            id: SessionId::next(),
            name: name.into(),
            role,
            params,
            transport,
            policy,
            failures,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Spawn the driver on `runtime` and return without waiting for a connection
    pub fn start(self, runtime: &Handle) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::idle());

        let handle = SessionHandle {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            commands: commands_tx,
            status: status_rx,
            close_requested: AtomicBool::new(false),
        };

        let driver = SessionDriver {
            id: self.id,
            name: self.name,
            role: self.role,
            params: self.params,
            transport: self.transport,
            policy: self.policy,
            failures: self.failures,
            commands: commands_rx,
            status: status_tx,
        };

        log::debug!("[{}] Starting {} session {}", handle.name, handle.role, handle.id);
        runtime.spawn(driver.run());
        handle
    }
}

/// Owner's view of a running session
///
/// Dropping the handle closes the session.
///
/// ```rust,no_run
/// # use amqp_connector::session::{SessionHandle, SessionState};
/// # async fn example(handle: SessionHandle) {
/// if handle.wait_for_state(SessionState::Ready).await == SessionState::Ready {
///     println!("{} connected on {:?}", handle.name(), handle.channel());
/// }
/// handle.close();
/// handle.closed().await;
/// # }
/// ```
pub struct SessionHandle {
    id: SessionId,
    name: String,
    role: SessionRole,
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    close_requested: AtomicBool,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Diagnostics of the most recent completed connection
    pub fn diagnostics(&self) -> Option<SessionDiagnostics> {
        self.status.borrow().diagnostics
    }

    /// Open channel, present only while the session is ready
    pub fn channel(&self) -> Option<ChannelHandle> {
        self.status.borrow().channel
    }

    /// Request an orderly close
    ///
    /// Returns `false` when a close was already requested.
    pub fn close(&self) -> bool {
        if self.close_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.commands.send(SessionCommand::Close).is_err() {
            log::trace!("[{}] Session {} already stopped", self.name, self.id);
        }
        true
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    /// Wait until the session reaches `state` or closes, returning the state reached
    pub async fn wait_for_state(&self, state: SessionState) -> SessionState {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|current| current.state == state || current.state.is_terminal())
            .await
            .map(|current| current.state);
        match reached {
            Ok(reached) => reached,
            Err(_) => status.borrow().state,
        }
    }

    /// Wait until the session is closed
    pub async fn closed(&self) {
        self.wait_for_state(SessionState::Closed).await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish()
    }
}

enum ConnectStep {
    Close,
    Connected(Box<dyn TransportConnection>),
    Failed(TransportError),
}

enum ChannelStep {
    Close,
    Opened(TransportResult<ChannelHandle>),
}

enum ReadyStep {
    Close,
    Lost(TransportError),
}

/// How a connected transport stopped being used
enum Served {
    Closed,
    /// Failed before the session became ready
    Failed(TransportError),
    /// Lost after the session was ready
    Lost(TransportError),
}

struct SessionDriver {
    id: SessionId,
    name: String,
    role: SessionRole,
    params: ParamsSource,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    failures: mpsc::UnboundedSender<SessionFailure>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    status: watch::Sender<SessionStatus>,
}

impl SessionDriver {
    async fn run(mut self) {
        if let Some(error) = self.drive().await {
            log::error!(
                "[{}] {} session {} failed: {}",
                self.name,
                self.role,
                self.id,
                error
            );
            let failure = SessionFailure {
                session_id: self.id,
                name: self.name.clone(),
                role: self.role,
                error,
            };
            if self.failures.send(failure).is_err() {
                log::debug!("[{}] Nobody is listening for session failures", self.name);
            }
        }
        self.set_state(SessionState::Closed);
        log::debug!("[{}] Session {} closed", self.name, self.id);
    }

    /// Connect and reconnect until closed; `Some` carries the fatal error
    async fn drive(&mut self) -> Option<TransportError> {
        let mut failed_attempts: u32 = 0;
        let mut started = Instant::now();

        loop {
            self.set_state(SessionState::Connecting);

            let params = match self.params.resolve() {
                Ok(params) => params,
                Err(error) => return Some(error),
            };
            log::debug!(
                "[{}] Connecting to {} (attempt {})",
                self.name,
                params.endpoint(),
                failed_attempts + 1
            );

            let step = tokio::select! {
                biased;
                _ = self.commands.recv() => ConnectStep::Close,
                result = self.transport.connect(&params) => match result {
                    Ok(connection) => ConnectStep::Connected(connection),
                    Err(error) => ConnectStep::Failed(error),
                },
            };

            let error = match step {
                ConnectStep::Close => return None,
                ConnectStep::Failed(error) => error,
                ConnectStep::Connected(connection) => {
                    match self
                        .on_connected(connection, &params, failed_attempts + 1, started)
                        .await
                    {
                        Served::Closed => return None,
                        Served::Failed(error) => error,
                        Served::Lost(error) => {
                            failed_attempts = 0;
                            started = Instant::now();
                            error
                        }
                    }
                }
            };

            failed_attempts += 1;
            match classify_failure(&error) {
                FailureClass::Fatal => return Some(error),
                FailureClass::Retryable if self.policy.is_exhausted(failed_attempts) => {
                    log::warn!(
                        "[{}] Giving up after {} failed attempts",
                        self.name,
                        failed_attempts
                    );
                    return Some(error);
                }
                FailureClass::Retryable => {
                    let delay = self.policy.delay_for(failed_attempts);
                    log::info!(
                        "[{}] Retryable failure ({}), attempt {}; reconnecting in {:?}",
                        self.name,
                        error,
                        failed_attempts,
                        delay
                    );
                    if self.close_requested_during(delay).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Open a channel on a fresh connection, then hold it until closed or lost
    async fn on_connected(
        &mut self,
        mut connection: Box<dyn TransportConnection>,
        params: &TransportParameters,
        attempts: u32,
        started: Instant,
    ) -> Served {
        let diagnostics = SessionDiagnostics {
            attempts,
            elapsed: started.elapsed(),
            connected_at: Utc::now(),
        };
        if attempts > 1 {
            log::info!(
                "[{}] Connected to {} after {} attempts in {:?}",
                self.name,
                params.endpoint(),
                attempts,
                diagnostics.elapsed
            );
        } else {
            log::debug!("[{}] Connected to {}", self.name, params.endpoint());
        }
        self.status.send_modify(|status| {
            status.state = SessionState::ChannelPending;
            status.diagnostics = Some(diagnostics);
            status.channel = None;
        });

        let step = tokio::select! {
            biased;
            _ = self.commands.recv() => ChannelStep::Close,
            result = connection.open_channel() => ChannelStep::Opened(result),
        };
        let channel = match step {
            ChannelStep::Close => {
                self.close_connection(connection.as_mut()).await;
                return Served::Closed;
            }
            ChannelStep::Opened(Err(error)) => {
                self.close_connection(connection.as_mut()).await;
                return Served::Failed(error);
            }
            ChannelStep::Opened(Ok(channel)) => channel,
        };

        self.status.send_modify(|status| {
            status.state = SessionState::Ready;
            status.channel = Some(channel);
        });
        log::debug!("[{}] Channel {} open", self.name, channel.number);

        let step = tokio::select! {
            biased;
            _ = self.commands.recv() => ReadyStep::Close,
            error = connection.closed() => ReadyStep::Lost(error),
        };
        match step {
            ReadyStep::Close => {
                self.close_connection(connection.as_mut()).await;
                Served::Closed
            }
            ReadyStep::Lost(error) => {
                log::info!("[{}] Connection to {} lost: {}", self.name, params.endpoint(), error);
                Served::Lost(error)
            }
        }
    }

    async fn close_connection(&self, connection: &mut dyn TransportConnection) {
        if let Err(error) = connection.close().await {
            log::warn!("[{}] Error while closing connection: {}", self.name, error);
        }
    }

    /// Sleep for `delay`; true if a close arrived first
    async fn close_requested_during(&mut self, delay: std::time::Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.commands.recv() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.status.send_modify(|status| {
            status.state = state;
            status.channel = None;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::{ConnectOutcome, MemoryTransport};
    use crate::session::params::Credentials;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn params(host: &str) -> TransportParameters {
        TransportParameters::new(host, 5672, "/", Credentials::plain("guest", "guest"))
    }

    fn fast_policy(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy::fixed(Duration::from_millis(1), max_attempts)
    }

    fn start(
        transport: &MemoryTransport,
        source: ParamsSource,
        policy: ReconnectPolicy,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionFailure>) {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let session = ConnectionSession::new(
            "test",
            SessionRole::Outgoing,
            source,
            Arc::new(transport.clone()),
            policy,
            failures_tx,
        );
        (session.start(&Handle::current()), failures_rx)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_session_becomes_ready_and_closes() {
        let transport = MemoryTransport::new();
        let (handle, _failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(None),
        );

        assert_eq!(handle.wait_for_state(SessionState::Ready).await, SessionState::Ready);
        assert!(handle.channel().is_some());
        let diagnostics = handle.diagnostics().expect("diagnostics recorded");
        assert_eq!(diagnostics.attempts, 1);
        assert_eq!(transport.live_connections(), 1);

        assert!(handle.close());
        assert!(!handle.close());
        timeout(WAIT, handle.closed()).await.unwrap();

        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(handle.channel(), None);
        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried() {
        let transport = MemoryTransport::new();
        transport.push_outcome(ConnectOutcome::fail(io::ErrorKind::ConnectionRefused));
        transport.push_outcome(ConnectOutcome::Fail(TransportError::StartupTypeMismatch(
            "expected int".to_string(),
        )));
        let (handle, mut failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(None),
        );

        assert_eq!(handle.wait_for_state(SessionState::Ready).await, SessionState::Ready);
        assert_eq!(handle.diagnostics().unwrap().attempts, 3);
        assert_eq!(transport.connect_count(), 3);
        assert!(failures.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fatal_failure_reaches_owner() {
        let transport = MemoryTransport::new();
        transport.push_outcome(ConnectOutcome::Fail(TransportError::AuthenticationFailed(
            "ACCESS_REFUSED".to_string(),
        )));
        let (handle, mut failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(None),
        );

        let failure = timeout(WAIT, failures.recv()).await.unwrap().unwrap();
        assert_eq!(failure.session_id, handle.id());
        assert_eq!(failure.role, SessionRole::Outgoing);
        assert!(matches!(failure.error, TransportError::AuthenticationFailed(_)));

        timeout(WAIT, handle.closed()).await.unwrap();
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_fatal() {
        let transport = MemoryTransport::new();
        for _ in 0..5 {
            transport.push_outcome(ConnectOutcome::fail(io::ErrorKind::ConnectionRefused));
        }
        let (handle, mut failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(Some(2)),
        );

        let failure = timeout(WAIT, failures.recv()).await.unwrap().unwrap();
        assert!(matches!(failure.error, TransportError::Io(_)));
        timeout(WAIT, handle.closed()).await.unwrap();
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_close_while_connecting_discards_attempt() {
        let transport = MemoryTransport::new();
        transport.push_outcome(ConnectOutcome::Hang);
        let (handle, mut failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(None),
        );

        assert_eq!(
            handle.wait_for_state(SessionState::Connecting).await,
            SessionState::Connecting
        );
        wait_until(|| transport.connect_count() == 1).await;
        handle.close();
        timeout(WAIT, handle.closed()).await.unwrap();

        assert_eq!(transport.live_connections(), 0);
        assert!(failures.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lost_connection_reconnects() {
        let transport = MemoryTransport::new();
        let (handle, _failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(Some(3)),
        );
        handle.wait_for_state(SessionState::Ready).await;
        let first_session = handle.id();

        assert_eq!(transport.sever_all(io::ErrorKind::ConnectionReset), 1);
        wait_until(|| transport.connect_count() == 2 && transport.live_connections() == 1).await;
        wait_until(|| handle.state() == SessionState::Ready).await;

        // The session identity is kept across its own reconnects
        assert_eq!(handle.id(), first_session);
    }

    #[tokio::test]
    async fn test_channel_rejection_counts_as_failed_attempt() {
        let transport = MemoryTransport::new();
        transport.push_outcome(ConnectOutcome::RejectChannel(TransportError::Io(
            io::Error::from(io::ErrorKind::ConnectionAborted),
        )));
        let (handle, _failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(None),
        );

        assert_eq!(handle.wait_for_state(SessionState::Ready).await, SessionState::Ready);
        assert_eq!(handle.diagnostics().unwrap().attempts, 2);
        assert_eq!(transport.connect_count(), 2);
        // The rejected connection is shut down before the retry
        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.live_connections(), 1);
    }

    struct SwitchableHost(Mutex<String>);

    impl ParamsProvider for SwitchableHost {
        fn transport_parameters(&self) -> TransportResult<TransportParameters> {
            let host = self.0.lock().unwrap().clone();
            Ok(params(&host))
        }
    }

    #[tokio::test]
    async fn test_live_source_is_read_on_every_attempt() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(SwitchableHost(Mutex::new("mq1".to_string())));
        let (handle, _failures) = start(
            &transport,
            ParamsSource::Live(provider.clone()),
            fast_policy(None),
        );
        handle.wait_for_state(SessionState::Ready).await;
        assert_eq!(transport.last_connect_params().unwrap().host, "mq1");

        *provider.0.lock().unwrap() = "mq2".to_string();
        transport.sever_all(io::ErrorKind::ConnectionReset);
        wait_until(|| transport.connect_count() == 2).await;

        assert_eq!(transport.last_connect_params().unwrap().host, "mq2");
    }

    #[tokio::test]
    async fn test_dropping_handle_closes_session() {
        let transport = MemoryTransport::new();
        let (handle, _failures) = start(
            &transport,
            ParamsSource::Snapshot(params("mq1")),
            fast_policy(None),
        );
        handle.wait_for_state(SessionState::Ready).await;

        drop(handle);
        wait_until(|| transport.close_count() == 1).await;
        assert_eq!(transport.live_connections(), 0);
    }
}
