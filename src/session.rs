//! Chat sessions
//!
//! Each session exclusively owns one transcript and serializes its
//! orchestration runs: one run executes to completion (or failure) before
//! the next queued input is taken. Subscribers observe progress through a
//! broadcast of [`ChatEvent`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock as StdRwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::llm::{LlmService, SamplingParams};
use crate::orchestrator::Orchestrator;
use crate::tools::ToolRegistry;
use crate::transcript::{Transcript, Turn, GREETING};

/// Events sent to session subscribers.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Transcript snapshot for a newly connected subscriber.
    Init { turns: Vec<Turn> },
    /// Incremental assistant text.
    TextDelta { text: String },
    /// The model opened a function call.
    CallStarted { name: String },
    /// Incremental slice of the call's raw JSON arguments.
    CallArgumentsDelta { arguments: String },
    /// A function call finished executing.
    CallFinished {
        name: String,
        ok: bool,
        result: String,
    },
    /// A turn was finalized and appended to the transcript.
    TurnAdded { turn: Turn },
    RunCompleted,
    RunFailed { message: String },
}

/// Options supplied when creating a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Persona/system prompt seeded as the first turn.
    pub system_prompt: Option<String>,
    /// Overrides the default assistant greeting.
    pub greeting: Option<String>,
    /// Document injected as a trailing system message on every model call,
    /// never persisted as a turn.
    pub context_document: Option<String>,
    pub sampling: SamplingParams,
}

/// Inputs processed strictly in order by the session task.
#[derive(Debug)]
pub enum SessionInput {
    UserMessage { text: String },
    /// Clear history back to the seeded transcript.
    Reset,
}

/// Handle to interact with a running session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
    input_tx: mpsc::Sender<SessionInput>,
    events_tx: broadcast::Sender<ChatEvent>,
    snapshot: Arc<StdRwLock<Transcript>>,
    current_run: Arc<Mutex<Option<CancellationToken>>>,
}

impl SessionHandle {
    /// Enqueue an input for the session task.
    pub async fn send(&self, input: SessionInput) -> Result<(), String> {
        self.input_tx
            .send(input)
            .await
            .map_err(|_| "session is closed".to_string())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events_tx.subscribe()
    }

    /// Last-consistent transcript: finalized turns only, updated at run
    /// boundaries.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.snapshot
            .read()
            .map(|t| t.turns().to_vec())
            .unwrap_or_default()
    }

    /// Best-effort cancellation of the in-flight run. Returns whether a run
    /// was active.
    pub fn cancel_current_run(&self) -> bool {
        match self.current_run.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

/// Manager for all active sessions.
pub struct SessionManager {
    llm: Arc<dyn LlmService>,
    tools: Arc<ToolRegistry>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(llm: Arc<dyn LlmService>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            tools,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session and start its task.
    pub async fn create(&self, options: SessionOptions) -> SessionHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let transcript = seed_transcript(&options);

        let (input_tx, input_rx) = mpsc::channel(32);
        let (events_tx, _) = broadcast::channel(128);
        let snapshot = Arc::new(StdRwLock::new(transcript.clone()));
        let current_run = Arc::new(Mutex::new(None));

        let orchestrator = Orchestrator::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.tools),
            events_tx.clone(),
        )
        .with_sampling(options.sampling)
        .with_context_document(options.context_document.clone());

        let handle = SessionHandle {
            id: id.clone(),
            created_at: Utc::now(),
            input_tx,
            events_tx: events_tx.clone(),
            snapshot: Arc::clone(&snapshot),
            current_run: Arc::clone(&current_run),
        };
        self.sessions.write().await.insert(id.clone(), handle.clone());

        let worker = SessionWorker {
            id: id.clone(),
            options,
            transcript,
            orchestrator,
            events_tx,
            snapshot,
            current_run,
        };
        tokio::spawn(worker.run(input_rx));

        tracing::info!(session_id = %id, "session created");
        handle
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session. Its task stops once all input senders are gone.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "session removed");
        }
        removed
    }
}

fn seed_transcript(options: &SessionOptions) -> Transcript {
    Transcript::seeded(
        options.system_prompt.as_deref(),
        options.greeting.as_deref().unwrap_or(GREETING),
    )
}

/// Task state for one session. Owns the transcript exclusively.
struct SessionWorker {
    id: String,
    options: SessionOptions,
    transcript: Transcript,
    orchestrator: Orchestrator,
    events_tx: broadcast::Sender<ChatEvent>,
    snapshot: Arc<StdRwLock<Transcript>>,
    current_run: Arc<Mutex<Option<CancellationToken>>>,
}

impl SessionWorker {
    async fn run(mut self, mut input_rx: mpsc::Receiver<SessionInput>) {
        tracing::info!(session_id = %self.id, "session task started");

        while let Some(input) = input_rx.recv().await {
            match input {
                SessionInput::UserMessage { text } => self.handle_user_message(text).await,
                SessionInput::Reset => {
                    self.transcript = seed_transcript(&self.options);
                    self.publish_snapshot();
                    let _ = self.events_tx.send(ChatEvent::Init {
                        turns: self.transcript.turns().to_vec(),
                    });
                }
            }
        }

        tracing::info!(session_id = %self.id, "session task stopped");
    }

    async fn handle_user_message(&mut self, text: String) {
        let turn = Turn::user(text);
        if let Err(e) = self.transcript.push(turn.clone()) {
            let _ = self.events_tx.send(ChatEvent::RunFailed {
                message: e.to_string(),
            });
            return;
        }

        // Register the cancellation token before announcing the turn, so a
        // subscriber that has seen the turn can always cancel the run.
        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.current_run.lock() {
            *guard = Some(cancel.clone());
        }
        let _ = self.events_tx.send(ChatEvent::TurnAdded { turn });
        self.publish_snapshot();

        let result = self.orchestrator.run(&mut self.transcript, &cancel).await;

        if let Ok(mut guard) = self.current_run.lock() {
            guard.take();
        }
        self.publish_snapshot();

        match result {
            Ok(()) => {
                let _ = self.events_tx.send(ChatEvent::RunCompleted);
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "orchestration run failed");
                let _ = self.events_tx.send(ChatEvent::RunFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn publish_snapshot(&self) {
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = self.transcript.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StreamFragment;
    use crate::orchestrator::testing::{MockLlmService, StallingLlmService};
    use crate::tools::ToolRegistry;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_event(rx: &mut broadcast::Receiver<ChatEvent>) -> ChatEvent {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    async fn wait_for_run_end(rx: &mut broadcast::Receiver<ChatEvent>) -> ChatEvent {
        loop {
            let event = next_event(rx).await;
            if matches!(event, ChatEvent::RunCompleted | ChatEvent::RunFailed { .. }) {
                return event;
            }
        }
    }

    fn manager_with(llm: Arc<MockLlmService>) -> SessionManager {
        SessionManager::new(llm, Arc::new(ToolRegistry::new(vec![])))
    }

    #[tokio::test]
    async fn run_appends_turns_and_updates_snapshot() {
        let llm = Arc::new(MockLlmService::new());
        llm.queue_fragments(vec![StreamFragment::text("hello!")]);
        let manager = manager_with(llm);

        let handle = manager.create(SessionOptions::default()).await;
        assert_eq!(handle.snapshot().len(), 1);

        let mut events = handle.subscribe();
        handle
            .send(SessionInput::UserMessage {
                text: "hi".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            wait_for_run_end(&mut events).await,
            ChatEvent::RunCompleted
        ));
        let turns = handle.snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2], Turn::assistant("hello!"));
    }

    #[tokio::test]
    async fn queued_inputs_run_strictly_in_order() {
        let llm = Arc::new(MockLlmService::new());
        llm.queue_fragments(vec![StreamFragment::text("first")]);
        llm.queue_fragments(vec![StreamFragment::text("second")]);
        let manager = manager_with(llm);

        let handle = manager.create(SessionOptions::default()).await;
        let mut events = handle.subscribe();
        for text in ["one", "two"] {
            handle
                .send(SessionInput::UserMessage {
                    text: text.to_string(),
                })
                .await
                .unwrap();
        }

        assert!(matches!(
            wait_for_run_end(&mut events).await,
            ChatEvent::RunCompleted
        ));
        assert!(matches!(
            wait_for_run_end(&mut events).await,
            ChatEvent::RunCompleted
        ));

        let turns = handle.snapshot();
        assert_eq!(turns[1], Turn::user("one"));
        assert_eq!(turns[2], Turn::assistant("first"));
        assert_eq!(turns[3], Turn::user("two"));
        assert_eq!(turns[4], Turn::assistant("second"));
    }

    #[tokio::test]
    async fn reset_reseeds_the_transcript() {
        let llm = Arc::new(MockLlmService::new());
        llm.queue_fragments(vec![StreamFragment::text("reply")]);
        let manager = manager_with(llm);

        let handle = manager
            .create(SessionOptions {
                system_prompt: Some("You are a pirate.".to_string()),
                ..SessionOptions::default()
            })
            .await;
        let mut events = handle.subscribe();
        handle
            .send(SessionInput::UserMessage {
                text: "hi".to_string(),
            })
            .await
            .unwrap();
        wait_for_run_end(&mut events).await;
        assert_eq!(handle.snapshot().len(), 4);

        handle.send(SessionInput::Reset).await.unwrap();
        loop {
            if let ChatEvent::Init { turns } = next_event(&mut events).await {
                assert_eq!(turns.len(), 2);
                break;
            }
        }
        assert_eq!(handle.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn cancel_fails_the_run_and_keeps_finalized_turns() {
        let llm = Arc::new(StallingLlmService::new());
        let manager = SessionManager::new(llm, Arc::new(ToolRegistry::new(vec![])));

        let handle = manager.create(SessionOptions::default()).await;
        let mut events = handle.subscribe();
        handle
            .send(SessionInput::UserMessage {
                text: "hi".to_string(),
            })
            .await
            .unwrap();

        // Wait until the user turn is finalized, then cancel the stalled run.
        loop {
            if matches!(next_event(&mut events).await, ChatEvent::TurnAdded { .. }) {
                break;
            }
        }
        assert!(handle.cancel_current_run());

        match wait_for_run_end(&mut events).await {
            ChatEvent::RunFailed { message } => assert!(message.contains("cancelled")),
            other => panic!("expected RunFailed, got {other:?}"),
        }
        let turns = handle.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1], Turn::user("hi"));
    }

    #[tokio::test]
    async fn manager_get_and_remove() {
        let llm = Arc::new(MockLlmService::new());
        let manager = manager_with(llm);

        let handle = manager.create(SessionOptions::default()).await;
        assert!(manager.get(&handle.id).await.is_some());
        assert!(manager.remove(&handle.id).await);
        assert!(manager.get(&handle.id).await.is_none());
        assert!(!manager.remove(&handle.id).await);
    }
}
