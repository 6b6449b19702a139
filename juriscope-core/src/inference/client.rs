//! Inference client
//!
//! Owns a lazily spawned worker hosting the entity recognizer and the
//! embedding model. Every call gets a correlation id and its own timer;
//! replies are matched back by id and unmatched replies are dropped.

use super::config::InferenceConfig;
use super::entities::{self, Entity, LocatedToken};
use super::messages::{
    EmbedOptions, ModelKind, WorkerCall, WorkerEvent, WorkerOutput, WorkerRequest,
};
use super::status::{LoadStatus, ModelState, ModelStatus, StatusListener};
use super::worker::{spawn_thread_worker, WorkerChannel};
use super::{InferenceError, Result};
use crate::embeddings::InferenceBackend;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Creates a connected worker on demand
pub type WorkerSpawner = Box<dyn Fn() -> Result<WorkerChannel> + Send + Sync>;

/// Whether an embedding represents a search query or a stored passage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingPurpose {
    Query,
    Passage,
}

struct PendingRequest {
    call: &'static str,
    reply: oneshot::Sender<Result<WorkerOutput>>,
    timer: AbortHandle,
}

struct WorkerLink {
    requests: Sender<WorkerRequest>,
    dispatcher: JoinHandle<()>,
    generation: u64,
}

struct Inner {
    config: InferenceConfig,
    spawner: WorkerSpawner,
    link: Mutex<Option<WorkerLink>>,
    generation: AtomicU64,
    pending: Mutex<HashMap<Uuid, PendingRequest>>,
    status: Mutex<ModelStatus>,
    listeners: Mutex<Vec<(u64, StatusListener)>>,
    next_listener: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn snapshot(&self) -> ModelStatus {
        *lock(&self.status)
    }

    /// Deliver the full snapshot to every listener
    fn broadcast(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<StatusListener> =
            lock(&self.listeners).iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn set_state(&self, kind: ModelKind, state: ModelState) {
        lock(&self.status).set(kind, state);
        debug!(model = %kind, status = %state.status, progress = state.progress, "model state changed");
        self.broadcast();
    }

    fn take_pending(&self, id: Uuid) -> Option<PendingRequest> {
        lock(&self.pending).remove(&id)
    }

    fn resolve(&self, id: Uuid, outcome: Result<WorkerOutput>) {
        match self.take_pending(id) {
            Some(pending) => {
                pending.timer.abort();
                let _ = pending.reply.send(outcome);
            }
            None => debug!(%id, "dropping reply for unknown request"),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.link)
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    fn reject_all(&self, error: impl Fn() -> InferenceError) -> usize {
        let drained: Vec<PendingRequest> = lock(&self.pending).drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            pending.timer.abort();
            let _ = pending.reply.send(Err(error()));
        }
        count
    }

    /// Worker-level failure: reject everything and mark every model failed
    fn fail_worker(&self, generation: u64, message: &str) {
        {
            let mut link = lock(&self.link);
            if !link.as_ref().is_some_and(|l| l.generation == generation) {
                return;
            }
            *link = None;
        }

        let rejected = self.reject_all(|| InferenceError::WorkerCrashed(message.to_string()));
        error!(error = message, rejected, "inference worker failed");

        lock(&self.status).set_all(ModelState::new(LoadStatus::Error, 0));
        self.broadcast();
    }

    fn handle_event(&self, generation: u64, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress { model, progress } => {
                let status = lock(&self.status).get(model).status;
                self.set_state(model, ModelState::new(status, progress));
            }
            WorkerEvent::Ready => debug!("inference worker ready"),
            WorkerEvent::Result { id, result } => self.resolve(id, Ok(result)),
            WorkerEvent::Error { id, error } => self.resolve(id, Err(InferenceError::Worker(error))),
            WorkerEvent::Fatal { error } => self.fail_worker(generation, &error),
        }
    }
}

async fn dispatch(inner: Weak<Inner>, mut events: UnboundedReceiver<WorkerEvent>, generation: u64) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else { return };
        inner.handle_event(generation, event);
    }

    if let Some(inner) = inner.upgrade() {
        if inner.is_current(generation) {
            inner.fail_worker(generation, "inference worker exited unexpectedly");
        }
    }
}

/// Handle returned by [`InferenceClient::subscribe`]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Stop receiving status updates
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

/// Client for the inference worker
///
/// Cheap to clone; clones share the worker, pending requests and status.
#[derive(Clone)]
pub struct InferenceClient {
    inner: Arc<Inner>,
}

impl InferenceClient {
    /// Create a client that spawns workers with `spawner`
    pub fn with_spawner(config: InferenceConfig, spawner: WorkerSpawner) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                spawner,
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                status: Mutex::new(ModelStatus::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Create a client hosting backends from `factory` on a worker thread.
    ///
    /// A fresh backend is built every time the worker is (re)spawned.
    pub fn with_backend<F, B>(config: InferenceConfig, factory: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: InferenceBackend + 'static,
    {
        Self::with_spawner(
            config,
            Box::new(move || {
                spawn_thread_worker(factory()).map_err(|e| InferenceError::Spawn(e.to_string()))
            }),
        )
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.inner.config
    }

    /// Current status of both models
    pub fn status(&self) -> ModelStatus {
        self.inner.snapshot()
    }

    pub fn is_ready(&self, kind: ModelKind) -> bool {
        self.inner.snapshot().get(kind).is_ready()
    }

    /// Number of calls awaiting a reply
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Register a listener for status snapshots
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ModelStatus) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn ensure_worker(&self) -> Result<Sender<WorkerRequest>> {
        let mut link = lock(&self.inner.link);
        if let Some(existing) = link.as_ref() {
            return Ok(existing.requests.clone());
        }

        let channel = (self.inner.spawner)()?;
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let dispatcher = tokio::spawn(dispatch(
            Arc::downgrade(&self.inner),
            channel.events,
            generation,
        ));
        info!(generation, "inference worker started");

        *link = Some(WorkerLink {
            requests: channel.requests.clone(),
            dispatcher,
            generation,
        });
        Ok(channel.requests)
    }

    /// Send a call to the worker and wait for its reply or the timeout
    pub async fn call(&self, call: WorkerCall, timeout: Duration) -> Result<WorkerOutput> {
        let requests = self.ensure_worker()?;
        let id = Uuid::new_v4();
        let name = call.name();
        let (reply, response) = oneshot::channel();

        {
            let mut pending = lock(&self.inner.pending);
            let inner = Arc::downgrade(&self.inner);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let Some(inner) = inner.upgrade() else { return };
                if let Some(expired) = inner.take_pending(id) {
                    warn!(%id, call = expired.call, ?timeout, "inference call timed out");
                    let _ = expired.reply.send(Err(InferenceError::Timeout {
                        call: expired.call,
                        after: timeout,
                    }));
                }
            });
            pending.insert(
                id,
                PendingRequest {
                    call: name,
                    reply,
                    timer: timer.abort_handle(),
                },
            );
        }

        if requests.send(WorkerRequest { id, call }).is_err() {
            if let Some(pending) = self.inner.take_pending(id) {
                pending.timer.abort();
            }
            return Err(InferenceError::Disconnected);
        }

        response.await.unwrap_or(Err(InferenceError::Disconnected))
    }

    /// Load a model. A no-op when already ready; fails when a load is in flight.
    pub async fn init(&self, kind: ModelKind) -> Result<()> {
        {
            let mut status = lock(&self.inner.status);
            match status.get(kind).status {
                LoadStatus::Ready => return Ok(()),
                LoadStatus::Loading => return Err(InferenceError::AlreadyLoading(kind)),
                LoadStatus::Idle | LoadStatus::Error => {}
            }
            status.set(kind, ModelState::new(LoadStatus::Loading, 0));
        }
        self.inner.broadcast();

        let timeout = self.inner.config.init_timeout(kind);
        match self.call(WorkerCall::init(kind), timeout).await {
            Ok(_) => {
                self.inner
                    .set_state(kind, ModelState::new(LoadStatus::Ready, 100));
                info!(model = %kind, "model ready");
                Ok(())
            }
            Err(e) => {
                let progress = lock(&self.inner.status).get(kind).progress;
                self.inner
                    .set_state(kind, ModelState::new(LoadStatus::Error, progress));
                warn!(model = %kind, error = %e, "model failed to load");
                Err(e)
            }
        }
    }

    /// Free a model in the worker and reset its state to idle
    pub async fn unload(&self, kind: ModelKind) -> Result<()> {
        let connected = lock(&self.inner.link).is_some();
        let outcome = if connected {
            self.call(WorkerCall::Unload { model: kind }, self.inner.config.unload_timeout)
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        self.inner.set_state(kind, ModelState::default());
        outcome
    }

    /// Terminate the worker, reject every pending call and reset all models
    pub fn cleanup(&self) {
        if let Some(link) = lock(&self.inner.link).take() {
            link.dispatcher.abort();
            info!(generation = link.generation, "inference worker terminated");
        }

        let rejected = self.inner.reject_all(|| InferenceError::Disconnected);
        if rejected > 0 {
            debug!(rejected, "rejected pending calls on cleanup");
        }

        lock(&self.inner.status).set_all(ModelState::default());
        self.inner.broadcast();
    }

    /// Embed a text with the search model, which must already be ready
    pub async fn embed(&self, text: &str, purpose: EmbeddingPurpose) -> Result<Vec<f32>> {
        if !self.is_ready(ModelKind::Search) {
            return Err(InferenceError::NotReady(ModelKind::Search));
        }

        let prefix = match purpose {
            EmbeddingPurpose::Query => &self.inner.config.query_prefix,
            EmbeddingPurpose::Passage => &self.inner.config.passage_prefix,
        };
        let call = WorkerCall::Embedding {
            text: format!("{prefix}{text}"),
            options: EmbedOptions::default(),
        };

        match self.call(call, self.inner.config.call_timeout).await? {
            WorkerOutput::Embedding(embedding) => Ok(embedding),
            other => Err(InferenceError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Extract named entities from a text of any length.
    ///
    /// A window the recognizer fails on is logged and skipped so the rest of
    /// the text still yields entities.
    pub async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>> {
        let normalized = entities::normalize_whitespace(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        self.init(ModelKind::Ner).await?;

        let config = &self.inner.config;
        let windows =
            entities::split_windows(&normalized, config.ner_window_chars, config.ner_window_overlap);
        let mut tokens: Vec<LocatedToken> = Vec::new();

        for (index, window) in windows.iter().enumerate() {
            let prepared = entities::Window {
                start: window.start,
                text: entities::title_case_runs(&window.text),
            };
            let call = WorkerCall::Ner {
                text: prepared.text.clone(),
            };
            match self.call(call, config.call_timeout).await {
                Ok(WorkerOutput::Entities(raw)) => {
                    tokens.extend(entities::locate_tokens(&prepared, raw));
                }
                Ok(other) => warn!(window = index, ?other, "unexpected recognizer output"),
                Err(e) => warn!(window = index, error = %e, "skipping window after recognizer failure"),
            }
        }

        let found = entities::assemble(&normalized, tokens);
        debug!(windows = windows.len(), entities = found.len(), "entity extraction finished");

        if config.unload_ner_after_use {
            if let Err(e) = self.unload(ModelKind::Ner).await {
                warn!(error = %e, "failed to unload entity recognizer");
            }
        }

        Ok(found)
    }
}
