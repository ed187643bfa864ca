//! Periodic batch jobs over the same aggregates the pipeline maintains.

pub mod jobs;

pub use jobs::{ChallengeExpiryJob, StatsRolloverJob};

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::storage::{Database, DatabaseError};

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at the given UTC time.
    DailyAt { hour: u32, minute: u32 },
    /// Every week on the given weekday at the given UTC time.
    WeeklyAt {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl Schedule {
    /// The next firing time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let (hour, minute) = match self {
            Schedule::DailyAt { hour, minute } => (*hour, *minute),
            Schedule::WeeklyAt { hour, minute, .. } => (*hour, *minute),
        };
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);

        let mut candidate = now.date_naive().and_time(time).and_utc();
        loop {
            let weekday_ok = match self {
                Schedule::DailyAt { .. } => true,
                Schedule::WeeklyAt { weekday, .. } => candidate.weekday() == *weekday,
            };
            if weekday_ok && candidate > now {
                return candidate;
            }
            candidate = (candidate.date_naive() + Days::new(1)).and_time(time).and_utc();
        }
    }
}

/// A periodic maintenance job.
pub trait BatchJob: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// When the job fires.
    fn schedule(&self) -> Schedule;

    /// Run one pass over the database.
    fn run(&self, db: &mut Database) -> Result<(), JobError>;
}

/// Runs registered jobs on their schedules, one loop per job.
pub struct JobScheduler {
    db: Arc<Mutex<Database>>,
    jobs: Vec<Arc<dyn BatchJob>>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Create a scheduler over the given database.
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            jobs: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            handles: Vec::new(),
        }
    }

    /// Register a job. Must be called before `start`.
    pub fn register(&mut self, job: Arc<dyn BatchJob>) {
        self.jobs.push(job);
    }

    /// Spawn one timer loop per registered job.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running
        }

        for job in &self.jobs {
            let job = job.clone();
            let db = self.db.clone();
            let running = self.running.clone();
            let stop = self.stop.clone();

            self.handles.push(tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    let now = Utc::now();
                    let next = job.schedule().next_after(now);
                    let wait = (next - now)
                        .to_std()
                        .unwrap_or(std::time::Duration::ZERO);

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = stop.notified() => break,
                    }
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }

                    let result = {
                        let mut db = db.lock().await;
                        job.run(&mut db)
                    };
                    if let Err(e) = result {
                        tracing::error!("Job {} failed: {}", job.name(), e);
                    }
                }
                tracing::debug!("Job loop {} stopped", job.name());
            }));
        }

        tracing::info!("Job scheduler started: jobs={}", self.jobs.len());
    }

    /// Stop all job loops.
    pub async fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_waiters();

        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }

        tracing::info!("Job scheduler stopped");
    }
}

/// Batch job errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}
