//! Background dispatch of categorize/summarize requests for UI callers.
//!
//! Callers stay synchronous: each request is validated on the calling thread, then split
//! into tasks on a tokio runtime. A semaphore caps how many inference calls run at once,
//! so a long multi-line input queues instead of fanning out without limit. Every task
//! sends exactly one [`TaskEvent`] back over a std channel, in completion order.

use crate::models::Models;
use std::future::Future;
use std::sync::mpsc;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Categorize,
    Summarize,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Categorize => "categorize",
            TaskKind::Summarize => "summarize",
        }
    }
}

/// Result of one background task. `Err` carries a display message for that task only.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub kind: TaskKind,
    pub outcome: Result<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter an accomplishment.")]
    EmptyAccomplishment,
    #[error("Please enter text to summarize.")]
    EmptySummaryInput,
}

/// Non-blank input lines, as typed. Each becomes one categorize task.
pub fn categorize_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(String::from)
        .collect()
}

/// Categorize output for one line: top label followed by the line itself.
pub fn format_categorized(label: &str, line: &str) -> String {
    format!("{}: {}", label, line)
}

type Notify = Arc<dyn Fn() + Send + Sync>;

pub struct Dispatcher {
    handle: Handle,
    limiter: Arc<Semaphore>,
    models: Arc<Models>,
    events: mpsc::Sender<TaskEvent>,
    notify: Option<Notify>,
    // Declared last so it is dropped after everything that spawns onto it.
    _runtime: Option<Runtime>,
}

impl Dispatcher {
    /// Own a multi-thread runtime sized to `max_concurrent`. For callers without a runtime (the desktop UI thread).
    pub fn new(
        models: Arc<Models>,
        max_concurrent: usize,
    ) -> std::io::Result<(Self, mpsc::Receiver<TaskEvent>)> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(max_concurrent.clamp(1, 8))
            .thread_name("kestrel-dispatch")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let (mut dispatcher, rx) = Self::with_handle(handle, models, max_concurrent);
        dispatcher._runtime = Some(runtime);
        Ok((dispatcher, rx))
    }

    /// Spawn onto an existing runtime (e.g. inside `#[tokio::main]`).
    pub fn with_handle(
        handle: Handle,
        models: Arc<Models>,
        max_concurrent: usize,
    ) -> (Self, mpsc::Receiver<TaskEvent>) {
        let (tx, rx) = mpsc::channel();
        let dispatcher = Self {
            handle,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            models,
            events: tx,
            notify: None,
            _runtime: None,
        };
        (dispatcher, rx)
    }

    /// Called after every event is sent (e.g. to request a UI repaint).
    pub fn with_notify(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    /// One task per non-blank line. Returns the number of tasks started.
    pub fn categorize(&self, text: &str) -> Result<usize, ValidationError> {
        let lines = categorize_lines(text);
        if lines.is_empty() {
            return Err(ValidationError::EmptyAccomplishment);
        }
        let count = lines.len();
        log::debug!("dispatch: categorizing {} line(s)", count);
        for line in lines {
            let models = Arc::clone(&self.models);
            self.spawn_task(TaskKind::Categorize, async move {
                let classification = models
                    .classifier
                    .classify(&line, &models.categories)
                    .await
                    .map_err(|e| e.to_string())?;
                let label = classification
                    .top_label()
                    .ok_or_else(|| "classifier returned no labels".to_string())?;
                Ok(format_categorized(label, &line))
            });
        }
        Ok(count)
    }

    /// One task for the whole text; the summary is passed through unchanged.
    pub fn summarize(&self, text: &str) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptySummaryInput);
        }
        let models = Arc::clone(&self.models);
        let text = text.to_string();
        self.spawn_task(TaskKind::Summarize, async move {
            models
                .summarizer
                .summarize(&text)
                .await
                .map_err(|e| e.to_string())
        });
        Ok(())
    }

    fn spawn_task<F>(&self, kind: TaskKind, work: F)
    where
        F: Future<Output = Result<String, String>> + Send + 'static,
    {
        let limiter = Arc::clone(&self.limiter);
        let events = self.events.clone();
        let notify = self.notify.clone();
        self.handle.spawn(async move {
            let outcome = match limiter.acquire_owned().await {
                Ok(_permit) => work.await,
                Err(_) => Err("dispatcher shut down".to_string()),
            };
            if let Err(ref e) = outcome {
                log::warn!("{} task failed: {}", kind.as_str(), e);
            }
            if events.send(TaskEvent { kind, outcome }).is_err() {
                log::debug!("dispatch: receiver dropped, discarding {} result", kind.as_str());
                return;
            }
            if let Some(notify) = notify {
                notify();
            }
        });
    }
}
