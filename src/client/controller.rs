//! Reconciliation controller.
//!
//! Owns the local [`NotificationState`] and is the only code that mutates
//! it. One task multiplexes the stream subscription, the polling timer,
//! presentation commands and completed store requests, so no lock is
//! needed. Presentation reads state through a `watch` channel of
//! [`Snapshot`]s and receives alerts on their own channel.
//!
//! Connection lifecycle:
//!
//! ```text
//! Connecting --open--> Connected --error--> DegradedPolling
//!      \___________________error_________________/
//! ```
//!
//! `DegradedPolling` is terminal for the session. On entering it the
//! stream task is aborted and, after [`ERROR_BACKOFF`], the store is listed
//! immediately and then every [`POLL_INTERVAL`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::consumer::{EventSource, StreamMessage};
use super::state::{NotificationState, Undo};
use super::{ClientError, NotificationApi};
use crate::models::notification::{GeneratedBatch, Notification, NotificationList};

/// Polling period while degraded.
pub const POLL_INTERVAL: Duration = Duration::from_secs(45);

/// Delay between a stream error and the first poll.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);

const COMMAND_BUFFER: usize = 32;
const STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    DegradedPolling,
}

impl ConnectionState {
    /// Stream headers arrived.
    pub fn opened(self) -> Self {
        match self {
            ConnectionState::Connecting => ConnectionState::Connected,
            other => other,
        }
    }

    /// Stream errored, ended or went idle. There is no way back.
    pub fn failed(self) -> Self {
        ConnectionState::DegradedPolling
    }

    pub fn accepts_stream_events(self) -> bool {
        self != ConnectionState::DegradedPolling
    }

    pub fn is_polling(self) -> bool {
        self == ConnectionState::DegradedPolling
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::DegradedPolling => "degraded-polling",
        }
    }
}

/// What presentation sees.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub connection: ConnectionState,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            connection: ConnectionState::Connecting,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    MarkRead(i64),
    MarkAllRead,
    Delete(i64),
    Generate,
}

type Reply = oneshot::Sender<Result<(), ClientError>>;

enum Completed {
    Listed {
        /// Local generation when the request was sent.
        since: u64,
        result: Result<NotificationList, ClientError>,
    },
    Command {
        command: Command,
        undo: Option<Undo>,
        result: Result<Option<GeneratedBatch>, ClientError>,
        reply: Reply,
    },
}

/// Presentation's handle on a running controller. Dropping it or calling
/// [`ControllerHandle::shutdown`] tears the controller down, including the
/// stream task and every in-flight request.
pub struct ControllerHandle {
    commands: mpsc::Sender<(Command, Reply)>,
    snapshots: watch::Receiver<Snapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Mount: start the controller. Returns the handle and the alert feed.
    pub fn spawn(
        api: Arc<dyn NotificationApi>,
        source: Arc<dyn EventSource>,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots_tx, snapshots_rx) = watch::channel(Snapshot::initial());
        let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let controller = Controller {
            api,
            state: NotificationState::new(),
            connection: ConnectionState::Connecting,
            snapshots: snapshots_tx,
            alerts: alerts_tx,
            lists_in_flight: Vec::new(),
            requests: JoinSet::new(),
        };
        let task = tokio::spawn(controller.run(source, commands_rx, shutdown_rx));

        let handle = Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            shutdown: Some(shutdown_tx),
            task,
        };
        (handle, alerts_rx)
    }

    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn mark_read(&self, id: i64) -> Result<(), ClientError> {
        self.call(Command::MarkRead(id)).await
    }

    pub async fn mark_all_read(&self) -> Result<(), ClientError> {
        self.call(Command::MarkAllRead).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.call(Command::Delete(id)).await
    }

    pub async fn generate(&self) -> Result<(), ClientError> {
        self.call(Command::Generate).await
    }

    async fn call(&self, command: Command) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send((command, reply_tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Unmount. Returns once every timer, request and the stream task
    /// have been released.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                tracing::error!("notification controller panicked: {}", e);
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Controller {
    api: Arc<dyn NotificationApi>,
    state: NotificationState,
    connection: ConnectionState,
    snapshots: watch::Sender<Snapshot>,
    alerts: mpsc::UnboundedSender<Notification>,
    /// Generations of the list requests still in flight.
    lists_in_flight: Vec<u64>,
    /// In-flight store requests. Dropped with the controller, which aborts
    /// them, so no completion is ever applied after teardown.
    requests: JoinSet<Completed>,
}

impl Controller {
    async fn run(
        mut self,
        source: Arc<dyn EventSource>,
        mut commands: mpsc::Receiver<(Command, Reply)>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let (stream_tx, mut stream_rx) = mpsc::channel(STREAM_BUFFER);
        let stream_task = source.subscribe(stream_tx);
        let mut stream_guard = AbortOnDrop(stream_task);

        let mut poll: Option<Interval> = None;

        // Initial list at mount, independent of the stream
        self.spawn_list();
        self.publish();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                cmd = commands.recv() => match cmd {
                    Some((command, reply)) => self.start_command(command, reply),
                    None => break,
                },
                msg = stream_rx.recv(), if self.connection.accepts_stream_events() => {
                    let msg = msg.unwrap_or_else(|| StreamMessage::Failed("stream task exited".into()));
                    if let Some(first_poll) = self.on_stream(msg) {
                        stream_guard.0.abort();
                        let mut timer = interval_at(first_poll, POLL_INTERVAL);
                        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        poll = Some(timer);
                    }
                },
                _ = tick(&mut poll) => {
                    tracing::debug!("polling notification store");
                    self.spawn_list();
                },
                Some(done) = self.requests.join_next() => match done {
                    Ok(completed) => self.on_completed(completed),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => tracing::error!("store request task failed: {}", e),
                },
            }
        }

        stream_guard.0.abort();
        let _ = (&mut stream_guard.0).await;
        self.requests.shutdown().await;
        tracing::debug!("notification controller stopped");
    }

    /// Apply one stream message. Returns when the first poll is due if the
    /// stream just failed.
    fn on_stream(&mut self, msg: StreamMessage) -> Option<Instant> {
        match msg {
            StreamMessage::Opened => {
                self.transition(self.connection.opened());
                None
            }
            StreamMessage::Batch(batch) => {
                self.merge(batch);
                None
            }
            StreamMessage::Failed(reason) => {
                tracing::warn!("notification stream lost ({}), falling back to polling", reason);
                self.transition(self.connection.failed());
                Some(Instant::now() + ERROR_BACKOFF)
            }
        }
    }

    fn merge(&mut self, batch: Vec<Notification>) {
        let outcome = self.state.merge_batch(batch);
        for n in outcome.alerts {
            tracing::info!(id = n.id, title = %n.title, "high priority notification");
            let _ = self.alerts.send(n);
        }
        if outcome.added > 0 {
            self.compact();
            self.publish();
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if next != self.connection {
            tracing::info!(
                from = self.connection.as_str(),
                to = next.as_str(),
                "notification connection state changed"
            );
            self.connection = next;
            self.publish();
        }
    }

    fn spawn_list(&mut self) {
        let since = self.state.generation();
        self.lists_in_flight.push(since);
        let api = self.api.clone();
        self.requests.spawn(async move {
            Completed::Listed {
                since,
                result: api.list().await,
            }
        });
    }

    fn compact(&mut self) {
        let horizon = self
            .lists_in_flight
            .iter()
            .copied()
            .min()
            .unwrap_or_else(|| self.state.generation());
        self.state.compact(horizon);
    }

    /// Apply the command locally, then confirm it with the store.
    fn start_command(&mut self, command: Command, reply: Reply) {
        let undo = match command {
            Command::MarkRead(id) => self.state.mark_read(id),
            Command::MarkAllRead => Some(self.state.mark_all_read()),
            Command::Delete(id) => self.state.remove(id),
            Command::Generate => None,
        };
        if undo.is_some() {
            self.publish();
        }

        let api = self.api.clone();
        self.requests.spawn(async move {
            let result = match command {
                Command::MarkRead(id) => api.mark_read(id).await.map(|_| None),
                Command::MarkAllRead => api.mark_all_read().await.map(|_| None),
                Command::Delete(id) => api.delete(id).await.map(|_| None),
                Command::Generate => api.generate().await.map(Some),
            };
            Completed::Command {
                command,
                undo,
                result,
                reply,
            }
        });
    }

    fn on_completed(&mut self, completed: Completed) {
        match completed {
            Completed::Listed { since, result } => {
                if let Some(pos) = self.lists_in_flight.iter().position(|&g| g == since) {
                    self.lists_in_flight.swap_remove(pos);
                }
                match result {
                    Ok(list) => {
                        self.state.apply_snapshot(list.notifications, since);
                        self.publish();
                    }
                    Err(e) => tracing::warn!("failed to list notifications: {}", e),
                }
                self.compact();
            }
            Completed::Command {
                undo,
                result: Ok(generated),
                reply,
                ..
            } => {
                if let Some(undo) = undo {
                    self.state.confirm(undo);
                    self.compact();
                }
                if let Some(batch) = generated {
                    self.merge(batch.notifications);
                }
                let _ = reply.send(Ok(()));
            }
            Completed::Command {
                command,
                undo,
                result: Err(e),
                reply,
            } => {
                tracing::warn!(command = ?command, "notification command failed: {}", e);
                if let Some(undo) = undo {
                    self.state.revert(undo);
                    self.publish();
                }
                // Outcome unknown: re-sync rather than guess
                if !e.is_rejection() {
                    self.spawn_list();
                }
                let _ = reply.send(Err(e));
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Snapshot {
            notifications: self.state.notifications().to_vec(),
            unread_count: self.state.unread_count(),
            connection: self.connection,
        });
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Next poll tick, or never while not polling.
async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{NotificationPayload, Priority};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn note(id: i64, read: bool, priority: Priority) -> Notification {
        Notification {
            id,
            title: format!("Notification {}", id),
            message: String::new(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            read,
            priority,
            payload: NotificationPayload::from_parts("coupon_expiry", json!({ "count": 1 })),
            employee_id: None,
            department: None,
        }
    }

    fn store_rows() -> Vec<Notification> {
        vec![
            note(1, false, Priority::High),
            note(2, false, Priority::Medium),
            note(3, true, Priority::Low),
        ]
    }

    #[derive(Default)]
    struct FakeApi {
        rows: Mutex<Vec<Notification>>,
        list_calls: AtomicUsize,
        /// op name -> rejected (true) or unavailable (false)
        fail: Mutex<HashMap<&'static str, bool>>,
        /// Holds the next list response back after its rows are read.
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FakeApi {
        fn with_rows(rows: Vec<Notification>) -> Arc<Self> {
            let api = Self::default();
            *api.rows.lock().unwrap() = rows;
            Arc::new(api)
        }

        fn fail(&self, op: &'static str, rejected: bool) {
            self.fail.lock().unwrap().insert(op, rejected);
        }

        fn hold_next_list(&self) -> oneshot::Sender<()> {
            let (release, gate) = oneshot::channel();
            *self.gate.lock().unwrap() = Some(gate);
            release
        }

        fn lists(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn outcome(&self, op: &str) -> Result<(), ClientError> {
            match self.fail.lock().unwrap().get(op) {
                Some(true) => Err(ClientError::NotFound),
                Some(false) => Err(ClientError::StoreUnavailable {
                    status: 503,
                    message: "down".into(),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn list(&self) -> Result<NotificationList, ClientError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let notifications = self.rows.lock().unwrap().clone();
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            let unread_count = notifications.iter().filter(|n| !n.read).count();
            Ok(NotificationList {
                notifications,
                unread_count,
            })
        }

        async fn mark_read(&self, _id: i64) -> Result<(), ClientError> {
            self.outcome("mark_read")
        }

        async fn mark_all_read(&self) -> Result<(), ClientError> {
            self.outcome("mark_all_read")
        }

        async fn delete(&self, _id: i64) -> Result<(), ClientError> {
            self.outcome("delete")
        }

        async fn generate(&self) -> Result<GeneratedBatch, ClientError> {
            self.outcome("generate")?;
            Ok(GeneratedBatch {
                message: "Notifications generated successfully".into(),
                count: 1,
                notifications: vec![note(10, false, Priority::High)],
            })
        }
    }

    /// Hands the controller's stream sender to the test.
    struct ManualSource {
        tx: Mutex<Option<oneshot::Sender<mpsc::Sender<StreamMessage>>>>,
        released: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl EventSource for ManualSource {
        fn subscribe(&self, tx: mpsc::Sender<StreamMessage>) -> JoinHandle<()> {
            if let Some(give) = self.tx.lock().unwrap().take() {
                let _ = give.send(tx);
            }
            let flag = SetOnDrop(self.released.clone());
            tokio::spawn(async move {
                let _flag = flag;
                std::future::pending::<()>().await;
            })
        }
    }

    struct Harness {
        api: Arc<FakeApi>,
        handle: ControllerHandle,
        alerts: mpsc::UnboundedReceiver<Notification>,
        stream: mpsc::Sender<StreamMessage>,
        released: Arc<AtomicBool>,
    }

    async fn mount(api: Arc<FakeApi>) -> Harness {
        let h = start(api).await;

        // Let the initial list land before driving the stream
        let mut rx = h.handle.snapshots();
        rx.wait_for(|s| s.notifications.len() == 3).await.unwrap();
        h
    }

    async fn start(api: Arc<FakeApi>) -> Harness {
        let (give, take) = oneshot::channel();
        let released = Arc::new(AtomicBool::new(false));
        let source = Arc::new(ManualSource {
            tx: Mutex::new(Some(give)),
            released: released.clone(),
        });
        let (handle, alerts) = ControllerHandle::spawn(api.clone(), source);
        let stream = take.await.unwrap();

        Harness {
            api,
            handle,
            alerts,
            stream,
            released,
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_state_machine_transitions() {
        use ConnectionState::*;
        assert_eq!(Connecting.opened(), Connected);
        assert_eq!(Connected.opened(), Connected);
        assert_eq!(Connecting.failed(), DegradedPolling);
        assert_eq!(Connected.failed(), DegradedPolling);
        assert_eq!(DegradedPolling.opened(), DegradedPolling);
        assert!(Connected.accepts_stream_events());
        assert!(!DegradedPolling.accepts_stream_events());
        assert!(DegradedPolling.is_polling());
    }

    #[tokio::test]
    async fn test_redelivery_ignored_and_new_high_alerts_once() {
        let mut h = mount(FakeApi::with_rows(store_rows())).await;
        assert_eq!(h.handle.current().unread_count, 2);

        h.stream.send(StreamMessage::Opened).await.unwrap();
        h.stream
            .send(StreamMessage::Batch(vec![note(1, false, Priority::High)]))
            .await
            .unwrap();
        h.stream
            .send(StreamMessage::Batch(vec![note(4, false, Priority::High)]))
            .await
            .unwrap();

        let mut rx = h.handle.snapshots();
        let snap = rx.wait_for(|s| s.unread_count == 3).await.unwrap().clone();
        assert_eq!(snap.connection, ConnectionState::Connected);
        assert_eq!(snap.notifications.len(), 4);
        assert_eq!(snap.notifications[0].id, 4);

        assert_eq!(h.alerts.recv().await.unwrap().id, 4);
        assert!(h.alerts.try_recv().is_err());
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_initial_list_answered_late_keeps_streamed_batch() {
        let api = FakeApi::with_rows(store_rows());
        let release = api.hold_next_list();
        let mut h = start(api).await;

        h.stream.send(StreamMessage::Opened).await.unwrap();
        h.stream
            .send(StreamMessage::Batch(vec![note(4, false, Priority::High)]))
            .await
            .unwrap();
        assert_eq!(h.alerts.recv().await.unwrap().id, 4);

        release.send(()).unwrap();
        let mut rx = h.handle.snapshots();
        let snap = rx
            .wait_for(|s| s.notifications.len() == 4)
            .await
            .unwrap()
            .clone();
        let ids: Vec<i64> = snap.notifications.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![4, 1, 2, 3]);
        assert_eq!(snap.unread_count, 3);
        assert_eq!(snap.connection, ConnectionState::Connected);
        assert!(h.alerts.try_recv().is_err());
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_resync_answered_late_keeps_confirmed_delete() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.api.rows.lock().unwrap().insert(0, note(8, false, Priority::Low));
        h.api.fail("mark_all_read", false);
        let release = h.api.hold_next_list();

        assert!(h.handle.mark_all_read().await.is_err());
        h.handle.delete(3).await.unwrap();
        wait_until(|| h.api.lists() == 2).await;

        release.send(()).unwrap();
        let mut rx = h.handle.snapshots();
        let snap = rx
            .wait_for(|s| s.notifications.iter().any(|n| n.id == 8))
            .await
            .unwrap()
            .clone();
        let ids: Vec<i64> = snap.notifications.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![8, 1, 2]);
        assert_eq!(snap.unread_count, 3);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_falls_back_to_polling() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        assert_eq!(h.api.lists(), 1);

        h.stream.send(StreamMessage::Opened).await.unwrap();
        h.stream
            .send(StreamMessage::Failed("reset".into()))
            .await
            .unwrap();

        let mut rx = h.handle.snapshots();
        rx.wait_for(|s| s.connection == ConnectionState::DegradedPolling)
            .await
            .unwrap();
        wait_until(|| h.released.load(Ordering::SeqCst)).await;

        // Events after the failure are never applied
        let _ = h
            .stream
            .send(StreamMessage::Batch(vec![note(50, false, Priority::High)]))
            .await;

        let start = Instant::now();
        wait_until(|| h.api.lists() == 2).await;
        assert!(start.elapsed() <= ERROR_BACKOFF + Duration::from_millis(20));

        wait_until(|| h.api.lists() == 3).await;
        assert!(start.elapsed() >= POLL_INTERVAL);

        let snap = h.handle.current();
        assert_eq!(snap.connection, ConnectionState::DegradedPolling);
        assert!(snap.notifications.iter().all(|n| n.id != 50));
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_while_connected() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.stream.send(StreamMessage::Opened).await.unwrap();

        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert_eq!(h.api.lists(), 1);
        assert_eq!(h.handle.current().connection, ConnectionState::Connected);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_polled_snapshot_picks_up_store_changes() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.stream
            .send(StreamMessage::Failed("idle".into()))
            .await
            .unwrap();

        h.api.rows.lock().unwrap().insert(0, note(7, false, Priority::High));

        let mut rx = h.handle.snapshots();
        let snap = rx
            .wait_for(|s| s.notifications.len() == 4)
            .await
            .unwrap()
            .clone();
        assert_eq!(snap.unread_count, 3);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_mark_all_read_is_applied() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.handle.mark_all_read().await.unwrap();

        let snap = h.handle.current();
        assert_eq!(snap.unread_count, 0);
        assert!(snap.notifications.iter().all(|n| n.read));
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_delete_leaves_state_unchanged() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.api.fail("delete", true);

        let err = h.handle.delete(2).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound));

        let snap = h.handle.current();
        let ids: Vec<i64> = snap.notifications.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(snap.unread_count, 2);
        assert_eq!(h.api.lists(), 1);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_mark_read_rolls_back() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.api.fail("mark_read", true);

        assert!(h.handle.mark_read(1).await.is_err());
        assert_eq!(h.handle.current().unread_count, 2);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_unavailable_store_rolls_back_and_resyncs() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        h.api.fail("mark_all_read", false);

        let err = h.handle.mark_all_read().await.unwrap_err();
        assert!(!err.is_rejection());
        assert_eq!(h.handle.current().unread_count, 2);

        wait_until(|| h.api.lists() == 2).await;
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_generate_merges_batch_and_alerts() {
        let mut h = mount(FakeApi::with_rows(store_rows())).await;
        h.handle.generate().await.unwrap();

        let snap = h.handle.current();
        assert_eq!(snap.notifications[0].id, 10);
        assert_eq!(snap.unread_count, 3);
        assert_eq!(h.alerts.recv().await.unwrap().id, 10);

        // The same batch arriving over the stream is a no-op
        h.stream
            .send(StreamMessage::Batch(vec![note(10, false, Priority::High)]))
            .await
            .unwrap();
        h.handle.mark_read(3).await.unwrap();
        assert_eq!(h.handle.current().notifications.len(), 4);
        assert!(h.alerts.try_recv().is_err());
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_stream() {
        let h = mount(FakeApi::with_rows(store_rows())).await;
        let released = h.released.clone();
        let stream = h.stream.clone();
        h.handle.shutdown().await;

        assert!(released.load(Ordering::SeqCst));
        assert!(stream.is_closed());
    }
}
