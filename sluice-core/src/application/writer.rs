// sluice-core/src/application/writer.rs

//! Background persistence for the scheduler.
//!
//! The scheduling loop hands every registry snapshot, scheduler metric and event
//! to this task and moves on. Queued writes are applied in batches on the
//! blocking pool; within a batch only the newest registry snapshot is written.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::infrastructure::config::{Registry, save_registry};
use crate::ports::store::QualityStore;

pub(crate) enum Write {
    Registry(Box<Registry>),
    Metrics {
        pipeline: String,
        metrics: Vec<(&'static str, f64)>,
        at: DateTime<Utc>,
    },
    Event {
        event_type: &'static str,
        pipeline: Option<String>,
        message: String,
        at: DateTime<Utc>,
    },
    /// Acknowledged once every write queued before it is on disk.
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub(crate) struct Writer {
    tx: mpsc::UnboundedSender<Write>,
}

impl Writer {
    /// Starts the writer task. It exits when the last `Writer` is dropped.
    pub(crate) fn spawn(registry_path: PathBuf, store: Arc<dyn QualityStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, registry_path, store));
        Self { tx }
    }

    pub(crate) fn send(&self, write: Write) {
        if self.tx.send(write).is_err() {
            error!("Scheduler writer has stopped, write dropped");
        }
    }

    pub(crate) fn save_registry(&self, registry: &Registry) {
        self.send(Write::Registry(Box::new(registry.clone())));
    }

    pub(crate) fn log_event(&self, event_type: &'static str, pipeline: Option<&str>, message: impl Into<String>) {
        self.send(Write::Event {
            event_type,
            pipeline: pipeline.map(str::to_string),
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Waits until everything sent so far has been applied.
    pub(crate) async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Write::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

#[derive(Default)]
struct Batch {
    registry: Option<Box<Registry>>,
    rows: Vec<Write>,
    flushes: Vec<oneshot::Sender<()>>,
}

impl Batch {
    fn push(&mut self, write: Write) {
        match write {
            Write::Registry(snapshot) => self.registry = Some(snapshot),
            Write::Flush(ack) => self.flushes.push(ack),
            row => self.rows.push(row),
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Write>, registry_path: PathBuf, store: Arc<dyn QualityStore>) {
    while let Some(first) = rx.recv().await {
        let mut batch = Batch::default();
        batch.push(first);
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let Batch {
            registry,
            rows,
            flushes,
        } = batch;
        let path = registry_path.clone();
        let store = Arc::clone(&store);
        let applied = tokio::task::spawn_blocking(move || {
            let count = rows.len();
            for row in rows {
                apply(store.as_ref(), row);
            }
            if let Some(snapshot) = registry {
                if let Err(e) = save_registry(&path, &snapshot) {
                    error!(error = %e, "Failed to persist schedule registry");
                }
            }
            count
        })
        .await;

        match applied {
            Ok(count) => debug!(rows = count, "Scheduler writes applied"),
            Err(e) => error!(error = %e, "Scheduler write task aborted"),
        }
        for ack in flushes {
            let _ = ack.send(());
        }
    }
}

fn apply(store: &dyn QualityStore, write: Write) {
    match write {
        Write::Metrics { pipeline, metrics, at } => {
            if let Err(e) = store.insert_scheduler_metrics(&pipeline, &metrics, at) {
                error!(pipeline = %pipeline, error = %e, "Failed to store scheduler metrics");
            }
        }
        Write::Event {
            event_type,
            pipeline,
            message,
            at,
        } => {
            if let Err(e) = store.log_event(event_type, pipeline.as_deref(), &message, at) {
                error!(error = %e, event = event_type, "Failed to log scheduler event");
            }
        }
        Write::Registry(_) | Write::Flush(_) => {}
    }
}
