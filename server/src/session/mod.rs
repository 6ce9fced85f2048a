//! Per-connection protocol engine.
//!
//! A [`Session`] owns one connection. It frames incoming bytes into
//! [`ClientMessage`]s, dispatches them against a [`Backend`], and keeps the
//! client's streams and in-flight tasks in connection-scoped registries keyed
//! by the ids the client chose.
//!
//! Everything the backend produces arrives asynchronously: stream changes go
//! straight to the [`MessageSender`], task completions are chained onto the
//! session's own loop through a [`SessionExecutor`]. Tearing a session down
//! disconnects its streams and releases its tasks, so late backend callbacks
//! never reach it.

mod executor;
mod observer;
mod sender;

use std::sync::Arc;
use std::time::Duration;

use lodge_engine::{
    decode_batch, make_promise, Backend, Executor, Future, Job, Promise, StreamHandle,
    StreamableType, Task, TaskHandle, TaskResult,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Notify};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::protocol::{ClientMessage, DecodeState, FrameDecoder, ServerMessage};

pub use executor::SessionExecutor;
pub use observer::SessionStreamObserver;
pub use sender::{spawn_writer, MessageSender, OutboundFrame};

/// Read buffer size for the transport.
const READ_CHUNK: usize = 8 * 1024;

/// How long a closing session waits for queued messages to be written.
const FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Where a session is in its read/dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHeader,
    AwaitingBody,
    Dispatching,
    Closed,
}

impl From<DecodeState> for SessionState {
    fn from(state: DecodeState) -> Self {
        match state {
            DecodeState::AwaitingHeader => SessionState::AwaitingHeader,
            DecodeState::AwaitingBody { .. } => SessionState::AwaitingBody,
        }
    }
}

/// A stream the client subscribed to.
struct StreamRegistration {
    id: i64,
    handle: StreamHandle,
}

/// A batch whose results have not been sent yet.
struct TaskRegistration {
    id: i64,
    handle: TaskHandle,
    /// Resolves once `task_results` has been queued.
    sent: Future<()>,
}

/// Sends `task_results` for one batch exactly once.
///
/// If the backend drops the batch without results, the reply is dropped
/// unsent and posts a failure entry per operation to the session loop
/// instead, so the client still hears back and the id is freed.
struct TaskReply {
    id: i64,
    operations: usize,
    sender: MessageSender,
    executor: SessionExecutor,
    sent: Option<Promise<()>>,
}

impl TaskReply {
    fn send(mut self, results: Vec<TaskResult>) {
        self.sender.send(ServerMessage::TaskResults {
            id: self.id,
            results,
        });
        if let Some(sent) = self.sent.take() {
            sent.resolve(());
        }
    }
}

impl Drop for TaskReply {
    fn drop(&mut self) {
        let Some(sent) = self.sent.take() else {
            return;
        };
        let (id, sender) = (self.id, self.sender.clone());
        let results = vec![
            TaskResult::Error {
                message: "task ended without results".into(),
            };
            self.operations
        ];
        self.executor.spawn(Box::new(move || {
            tracing::warn!(task = id, "Backend dropped the task, reporting failure");
            sender.send(ServerMessage::TaskResults { id, results });
            sent.resolve(());
        }));
    }
}

/// One client connection.
pub struct Session {
    id: Uuid,
    backend: Arc<dyn Backend>,
    state: SessionState,
    decoder: FrameDecoder,
    sender: MessageSender,
    outbound: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
    executor: SessionExecutor,
    jobs: mpsc::UnboundedReceiver<Job>,
    streams: Vec<StreamRegistration>,
    tasks: Vec<TaskRegistration>,
}

impl Session {
    pub fn new(id: Uuid, backend: Arc<dyn Backend>, max_frame_size: usize) -> Self {
        let (sender, outbound) = MessageSender::channel();
        let (executor, jobs) = SessionExecutor::channel();
        Self {
            id,
            backend,
            state: SessionState::AwaitingHeader,
            decoder: FrameDecoder::new(max_frame_size),
            sender,
            outbound: Some(outbound),
            executor,
            jobs,
            streams: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of registered streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Number of tasks whose results have not been sent.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Drive the connection until the peer leaves, a fatal error occurs, or
    /// `close` is notified.
    pub async fn run<T>(mut self, transport: T, close: Arc<Notify>) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(transport);
        let outbound = match self.outbound.take() {
            Some(outbound) => outbound,
            None => panic!("session run twice"),
        };
        let (finish, finished) = oneshot::channel();
        let mut writer_task = spawn_writer(writer, outbound, finished);
        let mut writer_done = false;
        let mut buf = vec![0u8; READ_CHUNK];

        let outcome = loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) if self.decoder.is_idle() => break Ok(()),
                    Ok(0) => break Err(SessionError::Truncated),
                    Ok(n) => {
                        if let Err(e) = self.handle_bytes(&buf[..n]) {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(e.into()),
                },
                Some(job) = self.jobs.recv() => {
                    job();
                    self.reap_tasks();
                }
                written = &mut writer_task => {
                    writer_done = true;
                    break match written {
                        Ok(result) => result,
                        Err(e) => Err(std::io::Error::other(e).into()),
                    };
                }
                _ = close.notified() => {
                    tracing::info!("Session closed by server");
                    break Ok(());
                }
            }
        };

        self.teardown();
        if !writer_done {
            // Write what is already queued, then stop.
            let _ = finish.send(());
            if tokio::time::timeout(FLUSH_GRACE, &mut writer_task).await.is_err() {
                tracing::debug!("Writer did not flush in time");
                writer_task.abort();
            }
        }
        outcome
    }

    /// Feed raw transport bytes and dispatch every complete message.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.decoder.extend(bytes);
        loop {
            let frame = match self.decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    self.state = SessionState::Closed;
                    return Err(e);
                }
            };

            self.state = SessionState::Dispatching;
            if let Err(e) = self.dispatch(&frame) {
                self.state = SessionState::Closed;
                return Err(e);
            }
        }
        self.state = self.decoder.state().into();
        Ok(())
    }

    /// Run every job already posted to this session.
    pub fn run_pending_jobs(&mut self) {
        while let Ok(job) = self.jobs.try_recv() {
            job();
        }
        self.reap_tasks();
    }

    fn dispatch(&mut self, body: &[u8]) -> Result<()> {
        let message = ClientMessage::decode(body)?;
        tracing::debug!(op = message.op(), bytes = body.len(), "message received");

        match message {
            ClientMessage::CreateStream {
                id,
                kind,
                service,
                options,
            } => self.create_stream(id, kind, &service, options),
            ClientMessage::RemoveStream { id } => self.remove_stream(id),
            ClientMessage::ScheduleOperations { id, operations } => {
                self.schedule_operations(id, operations)
            }
            ClientMessage::Unknown { op } => {
                tracing::warn!(op = %op, "Unknown command ignored");
            }
        }
        Ok(())
    }

    fn create_stream(&mut self, id: i64, kind: i64, service: &str, options: serde_json::Value) {
        let kind = match StreamableType::try_from(kind) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(stream = id, "create_stream ignored: {}", e);
                return;
            }
        };
        if self.streams.iter().any(|s| s.id == id) {
            tracing::warn!(stream = id, "create_stream ignored: id already in use");
            return;
        }

        let observer = Arc::new(SessionStreamObserver::new(id, self.sender.clone()));
        match self.backend.create_stream(observer, kind, service, options) {
            Ok(handle) => {
                tracing::info!(stream = id, ?kind, service, "Stream registered");
                self.streams.push(StreamRegistration { id, handle });
            }
            Err(e) => tracing::warn!(stream = id, service, "create_stream ignored: {}", e),
        }
    }

    fn remove_stream(&mut self, id: i64) {
        match self.streams.iter().position(|s| s.id == id) {
            Some(index) => {
                let registration = self.streams.remove(index);
                registration.handle.stream().disconnect();
                tracing::info!(stream = id, "Stream removed");
            }
            None => tracing::debug!(stream = id, "remove_stream for unknown id"),
        }
    }

    fn schedule_operations(&mut self, id: i64, entries: Vec<serde_json::Value>) {
        if self.tasks.iter().any(|t| t.id == id) {
            tracing::warn!(task = id, "schedule_operations ignored: id already in use");
            return;
        }

        let batch = decode_batch(entries);
        for (entry, reason) in &batch.skipped {
            tracing::warn!(task = id, entry = %entry, "Operation skipped: {}", reason);
        }

        let count = batch.operations.len();
        let Task { handle, results } = self.backend.queue_operations(batch.operations);

        let (sent, done) = make_promise();
        let reply = TaskReply {
            id,
            operations: count,
            sender: self.sender.clone(),
            executor: self.executor.clone(),
            sent: Some(done),
        };
        let _ = results.then(self.executor.clone(), move |results| reply.send(results));

        tracing::info!(task = id, operations = count, "Task scheduled");
        self.tasks.push(TaskRegistration { id, handle, sent });
    }

    fn reap_tasks(&mut self) {
        self.tasks.retain(|task| {
            let done = task.sent.is_ready() || task.sent.is_broken();
            if done {
                tracing::debug!(task = task.id, backend_task = task.handle.id(), "Task finished");
            }
            !done
        });
    }

    fn teardown(&mut self) {
        self.state = SessionState::Closed;
        for registration in self.streams.drain(..) {
            registration.handle.stream().disconnect();
        }
        // Dropping the handles releases the tasks.
        let released = self.tasks.len();
        self.tasks.clear();
        tracing::debug!(released_tasks = released, "Session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;
    use lodge_engine::{
        make_promise, DataStream, Operation, Promise, StreamObserver, TaskResult, TaskToken,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Backend that records calls and lets the test resolve tasks by hand.
    #[derive(Default)]
    struct ManualBackend {
        streams: Mutex<Vec<Arc<DataStream>>>,
        tasks: Mutex<Vec<(Vec<Operation>, TaskToken, Promise<Vec<TaskResult>>)>>,
    }

    impl Backend for ManualBackend {
        fn create_stream(
            &self,
            observer: Arc<dyn StreamObserver>,
            kind: StreamableType,
            endpoint: &str,
            options: Value,
        ) -> lodge_engine::Result<StreamHandle> {
            let mut streams = self.streams.lock().unwrap();
            let stream = Arc::new(DataStream::new(
                streams.len() as i64 + 1,
                kind,
                endpoint,
                options,
                observer,
            ));
            streams.push(Arc::clone(&stream));
            Ok(StreamHandle::new(stream))
        }

        fn queue_operations(&self, operations: Vec<Operation>) -> Task {
            let mut tasks = self.tasks.lock().unwrap();
            let (handle, token) = TaskHandle::new(tasks.len() as i64 + 1);
            let (results, promise) = make_promise();
            tasks.push((operations, token, promise));
            Task { handle, results }
        }
    }

    fn frame(value: Value) -> Vec<u8> {
        encode_frame(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    fn session(backend: &Arc<ManualBackend>) -> Session {
        Session::new(Uuid::new_v4(), backend.clone(), 1024)
    }

    fn sent(session: &mut Session) -> Vec<ServerMessage> {
        let outbound = session.outbound.as_mut().unwrap();
        std::iter::from_fn(|| outbound.try_recv().ok())
            .map(|frame| ServerMessage::decode(&frame.body).unwrap())
            .collect()
    }

    #[test]
    fn state_follows_the_frame() {
        let backend = Arc::new(ManualBackend::default());
        let mut session = session(&backend);
        let bytes = frame(json!({"op": "remove_stream", "id": 1}));

        assert_eq!(session.state(), SessionState::AwaitingHeader);
        session.handle_bytes(&bytes[..2]).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingHeader);
        session.handle_bytes(&bytes[2..6]).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingBody);
        session.handle_bytes(&bytes[6..]).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingHeader);
    }

    #[test]
    fn malformed_input_closes() {
        let backend = Arc::new(ManualBackend::default());

        let mut session = session(&backend);
        let err = session.handle_bytes(&encode_frame(b"{oops").unwrap());
        assert!(matches!(err, Err(SessionError::Decode(_))));
        assert_eq!(session.state(), SessionState::Closed);

        let mut session = Session::new(Uuid::new_v4(), backend.clone(), 4);
        let err = session.handle_bytes(&frame(json!({"op": "remove_stream", "id": 1})));
        assert!(matches!(err, Err(SessionError::FrameTooLarge { .. })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn ignored_commands_keep_the_session_open() {
        let backend = Arc::new(ManualBackend::default());
        let mut session = session(&backend);

        let mut bytes = frame(json!({"op": "ping"}));
        bytes.extend(frame(
            json!({"op": "create_stream", "id": 1, "type": 9, "service": "default"}),
        ));
        bytes.extend(frame(json!({"op": "remove_stream", "id": 99})));
        session.handle_bytes(&bytes).unwrap();

        assert_eq!(session.state(), SessionState::AwaitingHeader);
        assert_eq!(session.stream_count(), 0);
        assert!(backend.streams.lock().unwrap().is_empty());
    }

    #[test]
    fn stream_events_are_tagged_with_the_client_id() {
        let backend = Arc::new(ManualBackend::default());
        let mut session = session(&backend);

        session
            .handle_bytes(&frame(json!({
                "op": "create_stream", "id": 7, "type": 1, "service": "default"
            })))
            .unwrap();
        assert_eq!(session.stream_count(), 1);

        let stream = Arc::clone(&backend.streams.lock().unwrap()[0]);
        stream.apply_change(lodge_engine::StreamChange::Initialized);
        stream.apply_change(lodge_engine::StreamChange::ItemsRemoved(vec![3]));

        assert_eq!(
            sent(&mut session),
            vec![
                ServerMessage::StreamInit { id: 7 },
                ServerMessage::StreamRemove { id: 7, ids: vec![3] },
            ]
        );

        // Same id again is rejected, the first registration stays.
        session
            .handle_bytes(&frame(json!({
                "op": "create_stream", "id": 7, "type": 2, "service": "default"
            })))
            .unwrap();
        assert_eq!(session.stream_count(), 1);
        assert_eq!(backend.streams.lock().unwrap().len(), 1);

        session
            .handle_bytes(&frame(json!({"op": "remove_stream", "id": 7})))
            .unwrap();
        assert_eq!(session.stream_count(), 0);
        assert!(!stream.is_valid());
    }

    #[test]
    fn task_results_are_sent_from_the_session_loop() {
        let backend = Arc::new(ManualBackend::default());
        let mut session = session(&backend);

        session
            .handle_bytes(&frame(json!({
                "op": "schedule_operations",
                "id": 3,
                "operations": [
                    {"op": "delete_reservation", "o": 42},
                    {"op": "bogus_op", "o": {}}
                ]
            })))
            .unwrap();
        assert_eq!(session.pending_tasks(), 1);

        let (operations, _token, promise) = backend.tasks.lock().unwrap().remove(0);
        assert_eq!(operations, vec![Operation::DeleteReservation(42)]);

        promise.resolve(vec![TaskResult::Ok { id: 42 }]);
        // Resolution only posts a job; nothing is sent until the loop runs it.
        assert!(sent(&mut session).is_empty());
        assert_eq!(session.pending_tasks(), 1);

        session.run_pending_jobs();
        assert_eq!(
            sent(&mut session),
            vec![ServerMessage::TaskResults {
                id: 3,
                results: vec![TaskResult::Ok { id: 42 }],
            }]
        );
        assert_eq!(session.pending_tasks(), 0);
    }

    #[test]
    fn dropped_backend_task_reports_failure_and_frees_the_id() {
        let backend = Arc::new(ManualBackend::default());
        let mut session = session(&backend);
        let batch = frame(json!({
            "op": "schedule_operations",
            "id": 3,
            "operations": [
                {"op": "delete_reservation", "o": 1},
                {"op": "delete_reservation", "o": 2}
            ]
        }));

        session.handle_bytes(&batch).unwrap();
        let (_operations, _token, promise) = backend.tasks.lock().unwrap().remove(0);
        drop(promise);

        session.run_pending_jobs();
        let failure = TaskResult::Error {
            message: "task ended without results".into(),
        };
        assert_eq!(
            sent(&mut session),
            vec![ServerMessage::TaskResults {
                id: 3,
                results: vec![failure.clone(), failure],
            }]
        );
        assert_eq!(session.pending_tasks(), 0);

        // The id can be used again.
        session.handle_bytes(&batch).unwrap();
        assert_eq!(session.pending_tasks(), 1);
        assert_eq!(backend.tasks.lock().unwrap().len(), 1);
    }

    #[test]
    fn dropping_the_session_releases_everything() {
        let backend = Arc::new(ManualBackend::default());
        let mut session = session(&backend);

        let mut bytes = frame(json!({"op": "create_stream", "id": 1, "type": 2, "service": "default"}));
        bytes.extend(frame(json!({"op": "create_stream", "id": 2, "type": 1, "service": "default"})));
        bytes.extend(frame(json!({"op": "schedule_operations", "id": 5, "operations": []})));
        session.handle_bytes(&bytes).unwrap();
        drop(session);

        assert!(backend.streams.lock().unwrap().iter().all(|s| !s.is_valid()));
        assert!(backend.tasks.lock().unwrap()[0].1.is_released());
    }
}
