//! Worker host
//!
//! Runs an [`InferenceBackend`] on a dedicated OS thread. Requests arrive on
//! a crossbeam channel and are processed one at a time; events go back on a
//! tokio channel so the async client can await them.

use super::messages::{ModelKind, WorkerCall, WorkerEvent, WorkerOutput, WorkerRequest};
use crate::embeddings::{self, InferenceBackend};
use crate::similarity::l2_normalize;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

/// Client side of a worker connection
pub struct WorkerChannel {
    pub requests: Sender<WorkerRequest>,
    pub events: UnboundedReceiver<WorkerEvent>,
}

/// Worker side of a worker connection
pub struct WorkerEndpoint {
    pub requests: Receiver<WorkerRequest>,
    pub events: UnboundedSender<WorkerEvent>,
}

impl WorkerChannel {
    /// Create a connected channel/endpoint pair
    pub fn pair() -> (WorkerChannel, WorkerEndpoint) {
        let (request_tx, request_rx) = unbounded();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            WorkerChannel {
                requests: request_tx,
                events: event_rx,
            },
            WorkerEndpoint {
                requests: request_rx,
                events: event_tx,
            },
        )
    }
}

/// Host a backend on a new thread
pub fn spawn_thread_worker<B>(backend: B) -> std::io::Result<WorkerChannel>
where
    B: InferenceBackend + 'static,
{
    let (channel, endpoint) = WorkerChannel::pair();
    thread::Builder::new()
        .name("juriscope-inference".to_string())
        .spawn(move || run_worker(backend, endpoint))?;
    Ok(channel)
}

/// Worker loop
///
/// Exits when the request channel closes, when nobody listens for events
/// any more, or after reporting a panic as a fatal event.
pub fn run_worker<B: InferenceBackend>(mut backend: B, endpoint: WorkerEndpoint) {
    let WorkerEndpoint { requests, events } = endpoint;
    let _ = events.send(WorkerEvent::Ready);

    for WorkerRequest { id, call } in requests {
        let name = call.name();
        debug!(%id, call = name, "worker received request");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handle_call(&mut backend, call, &events)
        }));

        let event = match outcome {
            Ok(Ok(result)) => WorkerEvent::Result { id, result },
            Ok(Err(e)) => WorkerEvent::Error {
                id,
                error: e.to_string(),
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(call = name, error = %message, "inference backend panicked");
                let _ = events.send(WorkerEvent::Fatal { error: message });
                break;
            }
        };

        if events.send(event).is_err() {
            break; // Client dropped, stop processing
        }
    }

    debug!("inference worker exiting");
}

fn handle_call<B: InferenceBackend>(
    backend: &mut B,
    call: WorkerCall,
    events: &UnboundedSender<WorkerEvent>,
) -> embeddings::Result<WorkerOutput> {
    match call {
        WorkerCall::InitNer => load(backend, ModelKind::Ner, events),
        WorkerCall::InitSearch => load(backend, ModelKind::Search, events),
        WorkerCall::Ner { text } => Ok(WorkerOutput::Entities(backend.recognize(&text)?)),
        WorkerCall::Embedding { text, options } => {
            let mut embedding = backend.embed(&text, options.pooling)?;
            if options.normalize {
                l2_normalize(&mut embedding);
            }
            Ok(WorkerOutput::Embedding(embedding))
        }
        WorkerCall::Unload { model } => {
            backend.unload(model);
            Ok(WorkerOutput::Unloaded)
        }
    }
}

fn load<B: InferenceBackend>(
    backend: &mut B,
    model: ModelKind,
    events: &UnboundedSender<WorkerEvent>,
) -> embeddings::Result<WorkerOutput> {
    backend.load(model, &mut |progress| {
        let _ = events.send(WorkerEvent::Progress { model, progress });
    })?;
    Ok(WorkerOutput::Loaded)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "inference worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockBackend;
    use crate::inference::EmbedOptions;
    use uuid::Uuid;

    fn request(call: WorkerCall) -> WorkerRequest {
        WorkerRequest {
            id: Uuid::new_v4(),
            call,
        }
    }

    #[test]
    fn test_worker_answers_with_correlation_id() {
        let (mut channel, endpoint) = WorkerChannel::pair();
        let init = request(WorkerCall::InitSearch);
        let embed = request(WorkerCall::Embedding {
            text: "passage: contrato de locação".to_string(),
            options: EmbedOptions::default(),
        });
        channel.requests.send(init.clone()).unwrap();
        channel.requests.send(embed.clone()).unwrap();
        drop(channel.requests);

        let handle = thread::spawn(move || run_worker(MockBackend::new(32), endpoint));
        handle.join().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = channel.events.try_recv() {
            events.push(event);
        }

        assert_eq!(events[0], WorkerEvent::Ready);
        assert!(events.contains(&WorkerEvent::Progress {
            model: ModelKind::Search,
            progress: 100
        }));
        assert!(events.contains(&WorkerEvent::Result {
            id: init.id,
            result: WorkerOutput::Loaded
        }));
        let embedding = events.iter().find_map(|e| match e {
            WorkerEvent::Result {
                id,
                result: WorkerOutput::Embedding(v),
            } if *id == embed.id => Some(v.clone()),
            _ => None,
        });
        assert_eq!(embedding.map(|v| v.len()), Some(32));
    }

    #[test]
    fn test_worker_reports_request_errors() {
        let (mut channel, endpoint) = WorkerChannel::pair();
        let ner = request(WorkerCall::Ner {
            text: "texto".to_string(),
        });
        channel.requests.send(ner.clone()).unwrap();
        drop(channel.requests);

        run_worker(MockBackend::new(8), endpoint);

        let _ready = channel.events.try_recv().unwrap();
        match channel.events.try_recv().unwrap() {
            WorkerEvent::Error { id, error } => {
                assert_eq!(id, ner.id);
                assert!(error.contains("not loaded"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_worker_panic_is_fatal() {
        let (mut channel, endpoint) = WorkerChannel::pair();
        channel.requests.send(request(WorkerCall::InitSearch)).unwrap();
        channel
            .requests
            .send(request(WorkerCall::Embedding {
                text: "BOOM".to_string(),
                options: EmbedOptions::default(),
            }))
            .unwrap();
        let after = request(WorkerCall::Unload {
            model: ModelKind::Search,
        });
        channel.requests.send(after.clone()).unwrap();

        run_worker(MockBackend::new(8).panic_on("BOOM"), endpoint);

        let mut events = Vec::new();
        while let Ok(event) = channel.events.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            events.last(),
            Some(WorkerEvent::Fatal { error }) if error.contains("mock backend crashed")
        ));
        // nothing is processed after the crash
        assert!(!events
            .iter()
            .any(|e| matches!(e, WorkerEvent::Result { id, .. } if *id == after.id)));
    }

    #[tokio::test]
    async fn test_spawn_thread_worker() {
        let mut channel = spawn_thread_worker(MockBackend::new(8)).unwrap();
        let init = request(WorkerCall::InitNer);
        channel.requests.send(init.clone()).unwrap();

        let mut loaded = false;
        while let Some(event) = channel.events.recv().await {
            if event
                == (WorkerEvent::Result {
                    id: init.id,
                    result: WorkerOutput::Loaded,
                })
            {
                loaded = true;
                break;
            }
        }
        assert!(loaded);
    }
}
