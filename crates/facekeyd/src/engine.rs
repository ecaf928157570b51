use facekey_core::{
    AuthDecision, CaptureAdapter, EmbeddingStore, FlowError, FlowSettings, Persistence,
    Registration,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Slack on top of the capture timeout before a caller stops waiting.
const REPLY_GRACE: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

/// Size of the enrolled gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub identities: usize,
    pub samples: usize,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Register {
        identity: String,
        started: oneshot::Sender<()>,
        reply: oneshot::Sender<Result<Registration, FlowError>>,
    },
    Authenticate {
        started: oneshot::Sender<()>,
        reply: oneshot::Sender<Result<AuthDecision, FlowError>>,
    },
    ListIdentities {
        reply: oneshot::Sender<Vec<String>>,
    },
    Summary {
        reply: oneshot::Sender<StoreSummary>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    reply_timeout: Duration,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        self.await_reply(reply_rx).await
    }

    /// Queue a capture flow. The reply clock starts once the engine picks
    /// the request up; time spent queued is not counted.
    async fn request_flow<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<()>, oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(started_tx, reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        started_rx.await.map_err(|_| EngineError::ChannelClosed)?;
        self.await_reply(reply_rx).await
    }

    async fn await_reply<T>(&self, reply_rx: oneshot::Receiver<T>) -> Result<T, EngineError> {
        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(reply) => reply.map_err(|_| EngineError::ChannelClosed),
            Err(_) => Err(EngineError::Timeout(self.reply_timeout)),
        }
    }

    /// Capture a face and enroll it under `identity`.
    pub async fn register(&self, identity: &str) -> Result<Registration, EngineError> {
        let identity = identity.to_string();
        Ok(self
            .request_flow(|started, reply| EngineRequest::Register {
                identity,
                started,
                reply,
            })
            .await??)
    }

    /// Capture a face and match it against the enrolled gallery.
    pub async fn authenticate(&self) -> Result<AuthDecision, EngineError> {
        Ok(self
            .request_flow(|started, reply| EngineRequest::Authenticate { started, reply })
            .await??)
    }

    pub async fn list_identities(&self) -> Result<Vec<String>, EngineError> {
        self.request(|reply| EngineRequest::ListIdentities { reply })
            .await
    }

    pub async fn summary(&self) -> Result<StoreSummary, EngineError> {
        self.request(|reply| EngineRequest::Summary { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the capture adapter and the persistence backend and
/// handles one request at a time, so no two flows ever interleave their
/// load/append/save of the store.
pub fn spawn_engine<P>(
    capture: Box<dyn CaptureAdapter + Send>,
    persistence: P,
    settings: FlowSettings,
) -> Result<EngineHandle, EngineError>
where
    P: Persistence + Send + 'static,
{
    let reply_timeout = settings.capture_timeout + REPLY_GRACE;
    spawn_engine_with_reply_timeout(capture, persistence, settings, reply_timeout)
}

fn spawn_engine_with_reply_timeout<P>(
    mut capture: Box<dyn CaptureAdapter + Send>,
    persistence: P,
    settings: FlowSettings,
    reply_timeout: Duration,
) -> Result<EngineHandle, EngineError>
where
    P: Persistence + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facekey-engine".into())
        .spawn(move || {
            tracing::info!(source = %capture.describe(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register {
                        identity,
                        started,
                        reply,
                    } => {
                        if reply.is_closed() || started.send(()).is_err() {
                            tracing::warn!(identity = %identity, "register abandoned by caller; skipping");
                            continue;
                        }
                        let result =
                            facekey_core::register(&identity, &mut capture, &persistence, &settings);
                        if let Err(e) = &result {
                            tracing::warn!(identity = %identity, error = %e, "register failed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::Authenticate { started, reply } => {
                        if reply.is_closed() || started.send(()).is_err() {
                            tracing::warn!("authenticate abandoned by caller; skipping");
                            continue;
                        }
                        let result = facekey_core::authenticate(&mut capture, &persistence, &settings);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "authenticate failed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::ListIdentities { reply } => {
                        let store = EmbeddingStore::load(&persistence, &settings.store_key);
                        let _ = reply.send(store.list_identities());
                    }
                    EngineRequest::Summary { reply } => {
                        let store = EmbeddingStore::load(&persistence, &settings.store_key);
                        let _ = reply.send(StoreSummary {
                            identities: store.identity_count(),
                            samples: store.sample_count(),
                        });
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, reply_timeout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facekey_core::{CaptureError, Embedding, MemoryPersistence};
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct QueuedCapture(VecDeque<Option<Vec<f32>>>);

    impl CaptureAdapter for QueuedCapture {
        fn capture(&mut self, _timeout: Duration) -> Result<Option<Embedding>, CaptureError> {
            Ok(self.0.pop_front().flatten().map(Embedding::new))
        }
    }

    /// Persistence shared between the engine and the test body.
    #[derive(Clone, Default)]
    struct Shared(Arc<MemoryPersistence>);

    impl Persistence for Shared {
        fn get(&self, key: &str) -> std::io::Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
            self.0.set(key, value)
        }
    }

    /// Takes `delay` per capture, returning a new face each time.
    struct SlowCapture {
        delay: Duration,
        next: f32,
    }

    impl CaptureAdapter for SlowCapture {
        fn capture(&mut self, _timeout: Duration) -> Result<Option<Embedding>, CaptureError> {
            std::thread::sleep(self.delay);
            self.next += 1.0;
            Ok(Some(Embedding::new(vec![self.next, 0.0])))
        }
    }

    fn engine(faces: Vec<Option<Vec<f32>>>) -> (EngineHandle, Shared) {
        let shared = Shared::default();
        let handle = spawn_engine(
            Box::new(QueuedCapture(faces.into())),
            shared.clone(),
            FlowSettings::default(),
        )
        .unwrap();
        (handle, shared)
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (handle, _) = engine(vec![
            Some(vec![0.0, 0.0]),
            Some(vec![10.0, 10.0]),
            Some(vec![0.1, 0.1]),
        ]);

        assert_eq!(handle.register("alice").await.unwrap().samples, 1);
        assert_eq!(handle.register("bob").await.unwrap().samples, 1);

        let decision = handle.authenticate().await.unwrap();
        assert_eq!(decision.identity(), Some("alice"));
        assert_eq!(handle.list_identities().await.unwrap(), vec!["alice", "bob"]);
        assert_eq!(
            handle.summary().await.unwrap(),
            StoreSummary { identities: 2, samples: 2 }
        );
    }

    #[tokio::test]
    async fn test_flow_errors_are_surfaced() {
        let (handle, shared) = engine(vec![None]);

        let err = handle.register(" ").await.unwrap_err();
        assert!(matches!(err, EngineError::Flow(FlowError::InvalidIdentity)));

        let err = handle.register("alice").await.unwrap_err();
        assert!(matches!(err, EngineError::Flow(FlowError::NoFaceDetected)));

        assert_eq!(shared.get(facekey_core::DEFAULT_STORE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_do_not_lose_updates() {
        let faces = (0..4).map(|i| Some(vec![i as f32, 0.0])).collect();
        let (handle, shared) = engine(faces);

        let mut tasks = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { handle.register(name).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let store = EmbeddingStore::load(&shared, facekey_core::DEFAULT_STORE_KEY);
        assert_eq!(store.identity_count(), 4);
        assert_eq!(store.sample_count(), 4);
    }

    #[tokio::test]
    async fn test_queued_registrations_are_not_reported_as_timeouts() {
        // Each flow fits the reply timeout, the whole queue does not.
        let shared = Shared::default();
        let handle = spawn_engine_with_reply_timeout(
            Box::new(SlowCapture {
                delay: Duration::from_millis(300),
                next: 0.0,
            }),
            shared.clone(),
            FlowSettings::default(),
            Duration::from_millis(500),
        )
        .unwrap();

        let mut tasks = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let handle = handle.clone();
            tasks.push((name, tokio::spawn(async move { handle.register(name).await })));
        }

        for (name, task) in tasks {
            let result = task.await.unwrap();
            assert!(result.is_ok(), "{name}: {result:?}");
        }

        let mut names =
            EmbeddingStore::load(&shared, facekey_core::DEFAULT_STORE_KEY).list_identities();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }
}
