//! Async event dispatcher and worker pool.
//!
//! A bounded pool of worker tasks consumes (event, handler) invocations from
//! a bounded queue; a full queue blocks the producing poll loop rather than
//! dropping work. Events come from the durable outbox and are deleted only
//! after every handler invocation for the event has finished, so a crash
//! between commit and dispatch loses nothing.
//!
//! Handler failures are isolated per (event, handler) pair: the retry loop
//! runs transient failures up to the configured attempt count with a fixed
//! delay, logs-and-skips not-found, and surfaces invariant violations
//! immediately. After exhaustion the invocation is dropped with an error log;
//! there is no dead-letter path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

use super::events::ActivityEvent;
use super::handlers::{default_handlers, HandlerError, ProgressionHandler};
use super::outbox::OutboxStore;
use crate::storage::config::DispatcherSettings;
use crate::storage::Database;

/// Events claimed from the outbox per poll pass.
const OUTBOX_BATCH: usize = 32;

/// One handler invocation queued for a worker.
struct HandlerTask {
    event: ActivityEvent,
    handler: Arc<dyn ProgressionHandler>,
    done: oneshot::Sender<()>,
}

/// Event dispatcher owning the worker pool and the outbox poll loop.
pub struct EventDispatcher {
    db: Arc<Mutex<Database>>,
    handlers: Arc<Vec<Arc<dyn ProgressionHandler>>>,
    settings: DispatcherSettings,
    notify: Arc<Notify>,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Create a dispatcher with the standard progression handlers.
    pub fn new(db: Arc<Mutex<Database>>, settings: DispatcherSettings) -> Self {
        Self::with_handlers(db, settings, default_handlers())
    }

    /// Create a dispatcher with an explicit handler registry.
    pub fn with_handlers(
        db: Arc<Mutex<Database>>,
        settings: DispatcherSettings,
        handlers: Vec<Arc<dyn ProgressionHandler>>,
    ) -> Self {
        Self {
            db,
            handlers: Arc::new(handlers),
            settings,
            notify: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Handle publishers use to nudge the poll loop after a commit.
    pub fn trigger_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Spawn the worker pool and the outbox poll loop.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running
        }

        let workers = self.settings.workers.clamp(2, 5);
        let (task_tx, task_rx) = mpsc::channel::<HandlerTask>(self.settings.queue_capacity.max(1));
        let task_rx = Arc::new(Mutex::new(task_rx));

        tracing::info!(
            "Starting event dispatcher: workers={}, queue_capacity={}",
            workers,
            self.settings.queue_capacity
        );

        for worker_id in 0..workers {
            let db = self.db.clone();
            let task_rx = task_rx.clone();
            let attempts = self.settings.retry_attempts;
            let delay = Duration::from_millis(self.settings.retry_delay_ms);

            self.handles.push(tokio::spawn(async move {
                loop {
                    let task = { task_rx.lock().await.recv().await };
                    let Some(task) = task else { break };

                    run_with_retry(&db, &task.handler, &task.event, attempts, delay).await;
                    let _ = task.done.send(());
                }
                tracing::debug!("Dispatcher worker {} stopped", worker_id);
            }));
        }

        let db = self.db.clone();
        let handlers = self.handlers.clone();
        let notify = self.notify.clone();
        let running = self.running.clone();
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);

        self.handles.push(tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                if let Err(stopped) = drain_outbox(&db, &handlers, &task_tx, &running).await {
                    if stopped {
                        break;
                    }
                }

                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            // task_tx drops here; workers drain the queue and stop
            tracing::debug!("Dispatcher poll loop stopped");
        }));
    }

    /// Stop accepting work and wait for in-flight tasks to finish.
    pub async fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();

        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }

        tracing::info!("Event dispatcher stopped");
    }
}

/// Dispatch every pending outbox event, waiting out each event's handler
/// fan-out before deleting its row. Returns Err(true) when the dispatcher is
/// shutting down.
async fn drain_outbox(
    db: &Arc<Mutex<Database>>,
    handlers: &Arc<Vec<Arc<dyn ProgressionHandler>>>,
    task_tx: &mpsc::Sender<HandlerTask>,
    running: &Arc<AtomicBool>,
) -> Result<(), bool> {
    loop {
        if !running.load(Ordering::SeqCst) {
            return Err(true);
        }

        let staged = {
            let db = db.lock().await;
            OutboxStore::new(db.connection()).pending(OUTBOX_BATCH)
        };
        let staged = match staged {
            Ok(staged) => staged,
            Err(e) => {
                tracing::error!("Failed to read outbox: {}", e);
                return Err(false);
            }
        };
        if staged.is_empty() {
            return Ok(());
        }

        let mut completions = Vec::with_capacity(staged.len());
        for row in staged {
            let kind = row.event.kind();
            let mut waits = Vec::new();

            for handler in handlers.iter().filter(|h| h.accepts(kind)) {
                let (done_tx, done_rx) = oneshot::channel();
                let task = HandlerTask {
                    event: row.event.clone(),
                    handler: handler.clone(),
                    done: done_tx,
                };

                // Backpressure: a saturated queue blocks here until a worker
                // frees a slot
                if task_tx.send(task).await.is_err() {
                    return Err(true);
                }
                waits.push(done_rx);
            }

            completions.push((row.id, waits));
        }

        for (outbox_id, waits) in completions {
            futures::future::join_all(waits).await;

            let db = db.lock().await;
            if let Err(e) = OutboxStore::new(db.connection()).delete(outbox_id) {
                tracing::error!("Failed to delete outbox event {}: {}", outbox_id, e);
            }
        }
    }
}

/// Run one handler invocation with the retry policy.
async fn run_with_retry(
    db: &Arc<Mutex<Database>>,
    handler: &Arc<dyn ProgressionHandler>,
    event: &ActivityEvent,
    attempts: u32,
    delay: Duration,
) {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = {
            let mut db = db.lock().await;
            handler.handle(&mut db, event)
        };

        match result {
            Ok(()) => return,
            Err(HandlerError::NotFound(msg)) => {
                tracing::warn!(
                    "Handler {} skipped event {:?}: {}",
                    handler.name(),
                    event.kind(),
                    msg
                );
                return;
            }
            Err(HandlerError::Invariant(msg)) => {
                tracing::error!(
                    "Handler {} failed on event {:?} (not retried): {}",
                    handler.name(),
                    event.kind(),
                    msg
                );
                return;
            }
            Err(HandlerError::Transient(msg)) => {
                if attempt >= attempts {
                    tracing::error!(
                        "Handler {} dropped event {:?} after {} attempts: {}",
                        handler.name(),
                        event.kind(),
                        attempt,
                        msg
                    );
                    return;
                }

                tracing::warn!(
                    "Handler {} attempt {}/{} failed, retrying: {}",
                    handler.name(),
                    attempt,
                    attempts,
                    msg
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::events::EventKind;
    use crate::progression::outbox::OutboxStore;
    use crate::users::{User, UserStore};
    use std::sync::atomic::AtomicU32;
    use uuid::Uuid;

    fn fast_settings() -> DispatcherSettings {
        DispatcherSettings {
            workers: 2,
            queue_capacity: 16,
            retry_attempts: 3,
            retry_delay_ms: 10,
            poll_interval_ms: 20,
        }
    }

    async fn setup_db() -> (Arc<Mutex<Database>>, User) {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let user = User::new("runner".to_string());
        {
            let guard = db.lock().await;
            UserStore::new(guard.connection()).insert(&user).unwrap();
        }
        (db, user)
    }

    fn stage_created(db: &Database, user_id: Uuid, distance_km: f64) {
        OutboxStore::new(db.connection())
            .stage(&ActivityEvent::Created {
                user_id,
                activity_id: Uuid::new_v4(),
                distance_km,
                started_at: chrono::Utc::now(),
            })
            .unwrap();
    }

    async fn wait_for_outbox_empty(db: &Arc<Mutex<Database>>) {
        for _ in 0..500 {
            {
                let guard = db.lock().await;
                if OutboxStore::new(guard.connection()).count().unwrap() == 0 {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("outbox not drained within timeout");
    }

    async fn user_level(db: &Arc<Mutex<Database>>, user_id: Uuid) -> u8 {
        let guard = db.lock().await;
        UserStore::new(guard.connection())
            .get(user_id)
            .unwrap()
            .unwrap()
            .level
    }

    /// Counts invocations and fails transiently a configured number of times.
    struct FlakyHandler {
        calls: Arc<AtomicU32>,
        failures: u32,
    }

    impl ProgressionHandler for FlakyHandler {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn accepts(&self, _kind: EventKind) -> bool {
            true
        }

        fn handle(&self, _db: &mut Database, _event: &ActivityEvent) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(HandlerError::Transient("simulated".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Always fails with an invariant violation.
    struct BrokenHandler {
        calls: Arc<AtomicU32>,
    }

    impl ProgressionHandler for BrokenHandler {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn accepts(&self, _kind: EventKind) -> bool {
            true
        }

        fn handle(&self, _db: &mut Database, _event: &ActivityEvent) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::Invariant("simulated bug".to_string()))
        }
    }

    #[tokio::test]
    async fn test_dispatcher_processes_staged_event() {
        let (db, user) = setup_db().await;
        {
            let guard = db.lock().await;
            stage_created(&guard, user.id, 12.0);
        }

        let mut dispatcher = EventDispatcher::new(db.clone(), fast_settings());
        dispatcher.start();
        dispatcher.trigger_handle().notify_one();

        wait_for_outbox_empty(&db).await;
        // 12 km crosses the 10 km threshold
        assert_eq!(user_level(&db, user.id).await, 2);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_failure_retried_to_success() {
        let (db, user) = setup_db().await;
        {
            let guard = db.lock().await;
            stage_created(&guard, user.id, 5.0);
        }

        let calls = Arc::new(AtomicU32::new(0));
        let handler = Arc::new(FlakyHandler {
            calls: calls.clone(),
            failures: 2,
        });

        let mut dispatcher =
            EventDispatcher::with_handlers(db.clone(), fast_settings(), vec![handler]);
        dispatcher.start();
        dispatcher.trigger_handle().notify_one();

        wait_for_outbox_empty(&db).await;

        // Two transient failures then success
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_drops_task() {
        let (db, user) = setup_db().await;
        {
            let guard = db.lock().await;
            stage_created(&guard, user.id, 5.0);
        }

        let calls = Arc::new(AtomicU32::new(0));
        let handler = Arc::new(FlakyHandler {
            calls: calls.clone(),
            failures: 99,
        });

        let mut dispatcher =
            EventDispatcher::with_handlers(db.clone(), fast_settings(), vec![handler]);
        dispatcher.start();
        dispatcher.trigger_handle().notify_one();

        wait_for_outbox_empty(&db).await;

        // Exactly the configured attempt count, then dropped
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_invariant_violation_not_retried_and_isolated() {
        let (db, user) = setup_db().await;
        {
            let guard = db.lock().await;
            stage_created(&guard, user.id, 12.0);
        }

        let broken_calls = Arc::new(AtomicU32::new(0));
        let handlers: Vec<Arc<dyn ProgressionHandler>> = vec![
            Arc::new(BrokenHandler {
                calls: broken_calls.clone(),
            }),
            Arc::new(crate::progression::handlers::LevelUpdateHandler),
        ];

        let mut dispatcher = EventDispatcher::with_handlers(db.clone(), fast_settings(), handlers);
        dispatcher.start();
        dispatcher.trigger_handle().notify_one();

        wait_for_outbox_empty(&db).await;
        assert_eq!(user_level(&db, user.id).await, 2);

        // The broken handler ran once (no retry) and the level handler still
        // applied its update for the same event
        assert_eq!(broken_calls.load(Ordering::SeqCst), 1);
        dispatcher.shutdown().await;
    }
}
