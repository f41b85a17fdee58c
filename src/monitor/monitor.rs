//! Connection event monitor
//!
//! Keeps a subscription to the catalog's event stream alive and turns
//! connection change notifications into synchronizer tasks.
//!
//! Two kinds of task share the monitor state:
//!
//! - the socket reader, spawned per connection, which decodes frames and
//!   submits handler tasks without ever waiting on them;
//! - the maintenance loop ([`ConnectionMonitor::run`]), which every poll
//!   interval inspects the smallest-id pending entry whose handler finished,
//!   retries it if the handler failed, and reconnects when the socket is down.
//!
//! ## Usage
//!
//! ```no_run
//! use connsync::config::MonitorConfig;
//! use connsync::catalog::HttpCatalog;
//! use connsync::monitor::{ConnectionMonitor, WebSocketTransport};
//! use connsync::sync::CatalogSynchronizer;
//! use connsync::workspace::InMemoryWorkspace;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> connsync::Result<()> {
//! let config = MonitorConfig::default();
//! let catalog = Arc::new(HttpCatalog::new(config.clone())?);
//! let workspace = Arc::new(InMemoryWorkspace::new());
//! let synchronizer = Arc::new(CatalogSynchronizer::new(catalog, workspace));
//! let transport = Arc::new(WebSocketTransport::new(config.clone())?);
//!
//! let monitor = Arc::new(ConnectionMonitor::new(config, transport, synchronizer));
//! let cancel = CancellationToken::new();
//! let handle = monitor.start(cancel.clone());
//!
//! // ... later
//! cancel.cancel();
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```

use crate::config::{InFlightPolicy, MonitorConfig};
use crate::error::{Result, SyncError};
use crate::events::{binary_to_text, decode_frame, ChangeEvent, Decoded};
use crate::monitor::{
    EventTransport, PendingWork, SocketCloser, SocketEvent, NORMAL_CLOSURE,
};
use crate::sync::ConnectionSynchronizer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle of a change handler task
pub type TaskHandle = JoinHandle<Result<()>>;

/// What one maintenance step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceOutcome {
    /// Nothing was pending
    Idle,
    /// The handler succeeded; the event is done
    Completed { id: String },
    /// The handler failed and was resubmitted
    Retried { id: String, retry_count: u32 },
    /// The handler failed with no retries left; the event is dropped
    Exhausted { id: String, attempts: u32 },
    /// The handler is still running
    InFlight { id: String, requeued: bool },
}

/// Socket ownership; `generation` tells callbacks of replaced sockets apart
#[derive(Debug, Default)]
struct SocketState {
    generation: u64,
    closer: Option<SocketCloser>,
}

/// Monitor synchronizing catalog connection events into the workspace
pub struct ConnectionMonitor {
    config: MonitorConfig,
    transport: Arc<dyn EventTransport>,
    synchronizer: Arc<dyn ConnectionSynchronizer>,
    pending: Mutex<PendingWork<TaskHandle>>,
    connected: AtomicBool,
    socket: Mutex<SocketState>,
}

impl ConnectionMonitor {
    /// Create a monitor; nothing happens until [`connect`](Self::connect) or [`start`](Self::start)
    pub fn new(
        config: MonitorConfig,
        transport: Arc<dyn EventTransport>,
        synchronizer: Arc<dyn ConnectionSynchronizer>,
    ) -> Self {
        Self {
            config,
            transport,
            synchronizer,
            pending: Mutex::new(PendingWork::new()),
            connected: AtomicBool::new(false),
            socket: Mutex::new(SocketState::default()),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Whether a socket is open and its subscription confirmed
    pub fn is_connected(&self) -> bool {
        let socket_open = self.socket.lock().unwrap().closer.is_some();
        socket_open && self.connected.load(Ordering::SeqCst)
    }

    /// Ids of tracked events, in processing order
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.lock().unwrap().ids()
    }

    /// Number of tracked events
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Spawn the maintenance loop
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run(cancel).await })
    }

    /// Maintenance loop; returns once `cancel` fires, closing the socket
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.connect().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let outcome = self.maintain_once().await;
            if outcome != MaintenanceOutcome::Idle {
                tracing::debug!(?outcome, "Maintenance step");
            }

            if !self.is_connected() {
                self.connect().await;
            }
        }

        self.close();
        tracing::info!("Connection monitor stopped");
    }

    /// Reserve a subscription and open the event stream
    ///
    /// Returns `false` when either step failed; the maintenance loop tries
    /// again on its next iteration.
    pub async fn connect(self: &Arc<Self>) -> bool {
        tracing::info!("Connecting to the catalog event stream");

        let token = match self.transport.reserve().await {
            Ok(token) => token,
            Err(e) => {
                tracing::info!("Failed to reserve a subscription for connection events: {}", e);
                return false;
            }
        };

        let connection = match self.transport.open(&token).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Failed to open the connection event stream: {}", e);
                return false;
            }
        };
        let (events, closer) = connection.into_parts();

        let generation = {
            let mut socket = self.socket.lock().unwrap();
            if let Some(previous) = socket.closer.take() {
                previous.close(NORMAL_CLOSURE, "replaced by a new connection");
            }
            socket.generation += 1;
            socket.closer = Some(closer);
            // Not live until the handshake arrives
            self.connected.store(false, Ordering::SeqCst);
            socket.generation
        };

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.read_socket(generation, events).await });
        true
    }

    /// Close the socket and clear the connection state; safe to call repeatedly
    pub fn close(&self) {
        let closer = self.socket.lock().unwrap().closer.take();
        if let Some(closer) = closer {
            closer.close(NORMAL_CLOSURE, "programmed standard close() call");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Handle one inbound text frame
    ///
    /// Never fails: anything undecodable is logged and dropped.
    pub fn handle_message(&self, text: &str) {
        self.dispatch(text, None);
    }

    /// Handle a frame; `generation` names the socket it arrived on
    fn dispatch(&self, text: &str, generation: Option<u64>) {
        match decode_frame(text) {
            Ok(Decoded::Connected) => {
                {
                    let socket = self.socket.lock().unwrap();
                    if generation.is_some_and(|g| g != socket.generation) {
                        tracing::debug!("Ignoring handshake from a replaced socket");
                        return;
                    }
                    self.connected.store(true, Ordering::SeqCst);
                }
                tracing::info!("Event stream confirmed, reconciling connections");
                self.spawn_reconciliation();
            }
            Ok(Decoded::Change(event)) => {
                tracing::debug!("Received {}", event);
                self.submit(event);
            }
            Ok(Decoded::IgnoredKind(event)) => {
                tracing::debug!("Message discarded ({} is not a connection): {}", event.kind, text);
            }
            Ok(Decoded::Other(message)) => {
                tracing::debug!("Ignoring '{}' message: {}", message.event, message.data);
            }
            Err(e) => {
                tracing::warn!("Failed to read event stream message: {}", e);
            }
        }
    }

    /// Inspect the pending entry with the smallest id
    ///
    /// Under [`InFlightPolicy::Requeue`] entries whose handler is still
    /// running keep their place and are skipped, so the smallest finished
    /// entry is inspected instead.
    pub async fn maintain_once(&self) -> MaintenanceOutcome {
        let entry = {
            let mut pending = self.pending.lock().unwrap();
            match self.config.in_flight_policy {
                InFlightPolicy::Requeue => match pending.pop_first_where(|task| task.is_finished()) {
                    Some(entry) => entry,
                    None => {
                        return match pending.first_id() {
                            Some(id) => MaintenanceOutcome::InFlight {
                                id: id.to_string(),
                                requeued: true,
                            },
                            None => MaintenanceOutcome::Idle,
                        };
                    }
                },
                InFlightPolicy::Forget => match pending.pop_first() {
                    Some(entry) if !entry.task.is_finished() => {
                        let id = entry.event.id;
                        tracing::debug!("Handler for '{}' still running, no longer tracked", id);
                        return MaintenanceOutcome::InFlight {
                            id,
                            requeued: false,
                        };
                    }
                    Some(entry) => entry,
                    None => return MaintenanceOutcome::Idle,
                },
            }
        };
        let mut event = entry.event;
        let task = entry.task;

        let outcome = match task.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::handler(&event.id, e.to_string())),
        };

        let error = match outcome {
            Ok(()) => return MaintenanceOutcome::Completed { id: event.id },
            Err(e) => e,
        };

        tracing::error!("Handling {} failed: {}", event, error);

        if event.retry_count < self.config.max_retries {
            event.retry_count += 1;
            tracing::info!("Retrying {}", event);
            let id = event.id.clone();
            let retry_count = event.retry_count;
            self.submit(event);
            MaintenanceOutcome::Retried { id, retry_count }
        } else {
            let attempts = event.retry_count.saturating_add(1);
            tracing::error!("Giving up on {} after {} attempts", event, attempts);
            MaintenanceOutcome::Exhausted {
                id: event.id,
                attempts,
            }
        }
    }

    /// Spawn the handler for an event and track it
    fn submit(&self, event: ChangeEvent) {
        let synchronizer = Arc::clone(&self.synchronizer);
        let task_event = event.clone();
        let task: TaskHandle =
            tokio::spawn(async move { synchronizer.handle_connection_event(&task_event).await });

        if let Some(replaced) = self.pending.lock().unwrap().insert(event, task) {
            tracing::debug!("Replaced pending work for '{}'", replaced.event.id);
        }
    }

    fn spawn_reconciliation(&self) {
        let synchronizer = Arc::clone(&self.synchronizer);
        tokio::spawn(async move {
            if let Err(e) = synchronizer.synchronize_connections().await {
                tracing::error!("Connection reconciliation failed: {}", e);
            }
        });
    }

    /// Mark the connection down if `generation` is still the current socket
    fn socket_down(&self, generation: u64, release: bool) {
        let mut socket = self.socket.lock().unwrap();
        if socket.generation != generation {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        if release {
            socket.closer = None;
        }
    }

    async fn read_socket(self: Arc<Self>, generation: u64, mut events: mpsc::Receiver<SocketEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SocketEvent::Opened => {
                    tracing::debug!("Socket opened, waiting for subscription confirmation");
                }
                SocketEvent::Text(text) => {
                    tracing::debug!("Text message received: {}", text);
                    self.dispatch(&text, Some(generation));
                }
                SocketEvent::Binary(bytes) => {
                    tracing::debug!("Binary message received ({} bytes)", bytes.len());
                    self.dispatch(&binary_to_text(&bytes), Some(generation));
                }
                SocketEvent::Closing { code, reason } => {
                    tracing::debug!("Close requested by server ({}): '{}'", code, reason);
                    self.socket_down(generation, false);
                }
                SocketEvent::Closed { code, reason } => {
                    tracing::debug!("Socket closed ({}): '{}'", code, reason);
                    self.socket_down(generation, true);
                }
                SocketEvent::Failure(message) => {
                    tracing::error!("Event stream failure: {}", message);
                    self.socket_down(generation, true);
                }
            }
        }
        self.socket_down(generation, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeAction;
    use crate::monitor::{CloseRequest, SocketConnection};
    use crate::sync::SyncReport;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::{oneshot, Semaphore};

    /// Synchronizer that records calls; optionally fails or blocks
    #[derive(Default)]
    struct RecordingSynchronizer {
        calls: Mutex<Vec<ChangeEvent>>,
        reconciles: AtomicUsize,
        always_fail: bool,
        fail_on: Option<&'static str>,
        hang_on: Option<&'static str>,
        gate: Option<Arc<Semaphore>>,
    }

    impl RecordingSynchronizer {
        fn failing() -> Self {
            Self {
                always_fail: true,
                ..Default::default()
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<ChangeEvent> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConnectionSynchronizer for RecordingSynchronizer {
        async fn synchronize_connections(&self) -> Result<SyncReport> {
            self.reconciles.fetch_add(1, Ordering::SeqCst);
            Ok(SyncReport::default())
        }

        async fn handle_connection_event(&self, event: &ChangeEvent) -> Result<()> {
            self.calls.lock().unwrap().push(event.clone());
            if self.hang_on == Some(event.id.as_str()) {
                std::future::pending::<()>().await;
            }
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.map_err(|_| SyncError::Cancelled)?;
            }
            if self.always_fail || self.fail_on == Some(event.id.as_str()) {
                return Err(SyncError::handler(&event.id, "workspace unavailable"));
            }
            Ok(())
        }
    }

    struct MockSocket {
        events: mpsc::Sender<SocketEvent>,
        close: Option<oneshot::Receiver<CloseRequest>>,
    }

    /// Transport whose sockets are driven by the test
    #[derive(Default)]
    struct MockTransport {
        reservations: AtomicUsize,
        opens: AtomicUsize,
        fail_reserve: AtomicBool,
        auto_handshake: AtomicBool,
        sockets: Mutex<Vec<MockSocket>>,
    }

    impl MockTransport {
        fn sender(&self, index: usize) -> mpsc::Sender<SocketEvent> {
            self.sockets.lock().unwrap()[index].events.clone()
        }

        fn take_close(&self, index: usize) -> oneshot::Receiver<CloseRequest> {
            self.sockets.lock().unwrap()[index].close.take().unwrap()
        }
    }

    #[async_trait]
    impl EventTransport for MockTransport {
        async fn reserve(&self) -> Result<String> {
            let n = self.reservations.fetch_add(1, Ordering::SeqCst);
            if self.fail_reserve.load(Ordering::SeqCst) {
                return Err(SyncError::connection("mock", "reservation refused"));
            }
            Ok(format!("token-{}", n))
        }

        async fn open(&self, _token: &str) -> Result<SocketConnection> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(16);
            let (close_tx, close_rx) = oneshot::channel();
            tx.send(SocketEvent::Opened).await.unwrap();
            if self.auto_handshake.load(Ordering::SeqCst) {
                tx.send(SocketEvent::Text(HANDSHAKE.into())).await.unwrap();
            }
            self.sockets.lock().unwrap().push(MockSocket {
                events: tx,
                close: Some(close_rx),
            });
            Ok(SocketConnection::new(rx, SocketCloser::new(close_tx)))
        }
    }

    const HANDSHAKE: &str = r#"{"event":"message","data":"connected"}"#;

    fn change_frame(kind: &str, id: &str) -> String {
        let data = serde_json::json!({ "action": "created", "kind": kind, "id": id }).to_string();
        serde_json::json!({ "event": "change-event", "data": data }).to_string()
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn monitor_with(
        config: MonitorConfig,
        sync: Arc<RecordingSynchronizer>,
    ) -> (Arc<ConnectionMonitor>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::default());
        let monitor = Arc::new(ConnectionMonitor::new(config, transport.clone(), sync));
        (monitor, transport)
    }

    async fn wait_for(what: &str, cond: impl Fn() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    /// Step until the inspected entry's handler has finished
    async fn maintain_settled(monitor: &ConnectionMonitor) -> MaintenanceOutcome {
        for _ in 0..400 {
            match monitor.maintain_once().await {
                MaintenanceOutcome::InFlight { .. } => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                outcome => return outcome,
            }
        }
        panic!("handler never finished");
    }

    #[tokio::test]
    async fn test_handshake_confirms_and_reconciles_once_per_message() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync.clone());

        assert!(monitor.connect().await);
        assert!(!monitor.is_connected());

        transport.sender(0).send(SocketEvent::Text(HANDSHAKE.into())).await.unwrap();
        wait_for("connected", || monitor.is_connected()).await;
        wait_for("reconcile", || sync.reconciles.load(Ordering::SeqCst) == 1).await;

        transport
            .sender(0)
            .send(SocketEvent::Binary(HANDSHAKE.as_bytes().to_vec()))
            .await
            .unwrap();
        wait_for("second reconcile", || sync.reconciles.load(Ordering::SeqCst) == 2).await;
    }

    #[tokio::test]
    async fn test_connection_change_submits_one_task() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        monitor.handle_message(&change_frame("connection", "i-7"));
        assert_eq!(monitor.pending_ids(), vec!["i-7"]);

        wait_for("handler call", || sync.calls().len() == 1).await;
        let call = &sync.calls()[0];
        assert_eq!(call.action, ChangeAction::Created);
        assert_eq!(call.kind, "connection");
        assert_eq!(call.id, "i-7");
        assert_eq!(call.retry_count, 0);
    }

    #[tokio::test]
    async fn test_other_kinds_and_garbage_submit_nothing() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        monitor.handle_message(&change_frame("integration", "x"));
        monitor.handle_message("definitely not json");
        monitor.handle_message(r#"{"event":"change-event","data":"{oops"}"#);
        monitor.handle_message(r#"{"event":"message","data":"hello"}"#);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(monitor.pending_len(), 0);
        assert!(sync.calls().is_empty());
        assert_eq!(sync.reconciles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_handler_attempted_four_times() {
        let sync = Arc::new(RecordingSynchronizer::failing());
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        monitor.handle_message(&change_frame("connection", "c1"));

        for expected in 1..=3 {
            assert_eq!(
                maintain_settled(&monitor).await,
                MaintenanceOutcome::Retried {
                    id: "c1".to_string(),
                    retry_count: expected
                }
            );
        }
        assert_eq!(
            maintain_settled(&monitor).await,
            MaintenanceOutcome::Exhausted {
                id: "c1".to_string(),
                attempts: 4
            }
        );
        assert_eq!(monitor.maintain_once().await, MaintenanceOutcome::Idle);

        let retries: Vec<u32> = sync.calls().iter().map(|e| e.retry_count).collect();
        assert_eq!(retries, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_pending_inspected_in_id_order() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        for id in ["b", "a", "c"] {
            monitor.handle_message(&change_frame("connection", id));
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            match maintain_settled(&monitor).await {
                MaintenanceOutcome::Completed { id } => order.push(id),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_in_flight_requeued_by_default() {
        let gate = Arc::new(Semaphore::new(0));
        let sync = Arc::new(RecordingSynchronizer::gated(gate.clone()));
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        monitor.handle_message(&change_frame("connection", "slow"));
        assert_eq!(
            monitor.maintain_once().await,
            MaintenanceOutcome::InFlight {
                id: "slow".to_string(),
                requeued: true
            }
        );
        assert_eq!(monitor.pending_ids(), vec!["slow"]);

        gate.add_permits(1);
        assert_eq!(
            maintain_settled(&monitor).await,
            MaintenanceOutcome::Completed {
                id: "slow".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_in_flight_forgotten_with_forget_policy() {
        let gate = Arc::new(Semaphore::new(0));
        let sync = Arc::new(RecordingSynchronizer::gated(gate.clone()));
        let config = MonitorConfig {
            in_flight_policy: InFlightPolicy::Forget,
            ..test_config()
        };
        let (monitor, _transport) = monitor_with(config, sync.clone());

        monitor.handle_message(&change_frame("connection", "slow"));
        assert_eq!(
            monitor.maintain_once().await,
            MaintenanceOutcome::InFlight {
                id: "slow".to_string(),
                requeued: false
            }
        );
        assert_eq!(monitor.pending_len(), 0);

        // The task still runs to completion, unobserved
        gate.add_permits(1);
        wait_for("handler call", || sync.calls().len() == 1).await;
        assert_eq!(monitor.maintain_once().await, MaintenanceOutcome::Idle);
    }

    #[tokio::test]
    async fn test_same_id_replaces_pending_entry() {
        let gate = Arc::new(Semaphore::new(0));
        let sync = Arc::new(RecordingSynchronizer::gated(gate.clone()));
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        monitor.handle_message(&change_frame("connection", "dup"));
        monitor.handle_message(&change_frame("connection", "dup"));
        assert_eq!(monitor.pending_ids(), vec!["dup"]);

        gate.add_permits(2);
        wait_for("both handlers", || sync.calls().len() == 2).await;
    }

    #[tokio::test]
    async fn test_reconnects_after_socket_failure() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync.clone());
        transport.auto_handshake.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = monitor.start(cancel.clone());

        wait_for("connected", || monitor.is_connected()).await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);

        transport
            .sender(0)
            .send(SocketEvent::Failure("connection reset".into()))
            .await
            .unwrap();

        wait_for("second open", || transport.opens.load(Ordering::SeqCst) == 2).await;
        wait_for("reconnected", || monitor.is_connected()).await;
        assert_eq!(transport.reservations.load(Ordering::SeqCst), 2);
        wait_for("reconcile per handshake", || sync.reconciles.load(Ordering::SeqCst) == 2).await;

        cancel.cancel();
        handle.await.unwrap();
        assert!(!monitor.is_connected());
    }

    #[tokio::test]
    async fn test_server_close_clears_connected() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync);

        monitor.connect().await;
        transport.sender(0).send(SocketEvent::Text(HANDSHAKE.into())).await.unwrap();
        wait_for("connected", || monitor.is_connected()).await;

        transport
            .sender(0)
            .send(SocketEvent::Closing {
                code: 1001,
                reason: "going away".into(),
            })
            .await
            .unwrap();
        wait_for("disconnected", || !monitor.is_connected()).await;
    }

    #[tokio::test]
    async fn test_failed_reservation_is_retried_by_loop() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync);
        transport.fail_reserve.store(true, Ordering::SeqCst);

        assert!(!monitor.connect().await);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);

        let cancel = CancellationToken::new();
        let handle = monitor.start(cancel.clone());
        wait_for("repeated reservations", || {
            transport.reservations.load(Ordering::SeqCst) >= 3
        })
        .await;

        transport.fail_reserve.store(false, Ordering::SeqCst);
        wait_for("open after recovery", || transport.opens.load(Ordering::SeqCst) >= 1).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync);

        monitor.connect().await;
        let mut close_rx = transport.take_close(0);

        monitor.close();
        monitor.close();
        assert!(!monitor.is_connected());

        let request = close_rx.try_recv().unwrap();
        assert_eq!(request.code, NORMAL_CLOSURE);
        assert_eq!(request.reason, "programmed standard close() call");
    }

    #[tokio::test]
    async fn test_stale_socket_does_not_clear_new_connection() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync);

        monitor.connect().await;
        let mut old_close = transport.take_close(0);
        monitor.connect().await;
        assert_eq!(old_close.try_recv().unwrap().code, NORMAL_CLOSURE);

        transport.sender(1).send(SocketEvent::Text(HANDSHAKE.into())).await.unwrap();
        wait_for("connected", || monitor.is_connected()).await;

        transport
            .sender(0)
            .send(SocketEvent::Closed {
                code: 1000,
                reason: "replaced".into(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn test_running_handler_does_not_block_larger_ids() {
        let sync = Arc::new(RecordingSynchronizer {
            hang_on: Some("a"),
            fail_on: Some("b"),
            ..Default::default()
        });
        let (monitor, _transport) = monitor_with(test_config(), sync.clone());

        monitor.handle_message(&change_frame("connection", "a"));
        monitor.handle_message(&change_frame("connection", "b"));

        for expected in 1..=3 {
            assert_eq!(
                maintain_settled(&monitor).await,
                MaintenanceOutcome::Retried {
                    id: "b".to_string(),
                    retry_count: expected
                }
            );
        }
        assert_eq!(
            maintain_settled(&monitor).await,
            MaintenanceOutcome::Exhausted {
                id: "b".to_string(),
                attempts: 4
            }
        );

        assert_eq!(
            monitor.maintain_once().await,
            MaintenanceOutcome::InFlight {
                id: "a".to_string(),
                requeued: true
            }
        );
        assert_eq!(monitor.pending_ids(), vec!["a"]);

        let b_retries: Vec<u32> = sync
            .calls()
            .iter()
            .filter(|e| e.id == "b")
            .map(|e| e.retry_count)
            .collect();
        assert_eq!(b_retries, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_handshake_from_replaced_socket_is_ignored() {
        let sync = Arc::new(RecordingSynchronizer::default());
        let (monitor, transport) = monitor_with(test_config(), sync.clone());

        monitor.connect().await;
        monitor.connect().await;

        transport.sender(0).send(SocketEvent::Text(HANDSHAKE.into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!monitor.is_connected());
        assert_eq!(sync.reconciles.load(Ordering::SeqCst), 0);

        transport.sender(1).send(SocketEvent::Text(HANDSHAKE.into())).await.unwrap();
        wait_for("connected", || monitor.is_connected()).await;
        wait_for("reconcile", || sync.reconciles.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_exhaustion_at_retry_ceiling_does_not_overflow() {
        let sync = Arc::new(RecordingSynchronizer::failing());
        let config = MonitorConfig {
            max_retries: u32::MAX,
            ..test_config()
        };
        let (monitor, _transport) = monitor_with(config, sync);

        let mut event = ChangeEvent::new(ChangeAction::Updated, "connection", "c1");
        event.retry_count = u32::MAX;
        monitor.submit(event);

        assert_eq!(
            maintain_settled(&monitor).await,
            MaintenanceOutcome::Exhausted {
                id: "c1".to_string(),
                attempts: u32::MAX
            }
        );
    }
}
