//! Session runtime: the single owner of a [`ChatSession`].
//!
//! The runtime feeds the session every event (handle commands, stream
//! traffic, collaborator results, timer ticks) and executes the actions it
//! returns. Connects and collaborator reads run as spawned tasks that report
//! back through a completion channel, so a slow request never blocks a
//! teardown. Results are tagged with the generation or epoch they were issued
//! under; the session discards the stale ones.

use std::time::Duration;

use huddle_core::{
    ChatSession, ConnectionState, ConversationId, Environment, HistoryError, HistoryLoader,
    HistorySource, Message, PresenceError, PresenceSource, ResolvedSession, SessionAction,
    SessionConfig, SessionEvent, SessionUpdate,
};
use huddle_proto::{CloseCode, OutboundFrame};
use tokio::{
    sync::{mpsc, watch},
    task::AbortHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{
    error::TransportError,
    handle::{Banner, Command, SessionHandle, SessionView},
    transport::{Connector, Link, TransportCommand, TransportEvent},
};

const COMMAND_CAPACITY: usize = 32;
const COMPLETION_CAPACITY: usize = 32;

/// Results of spawned work.
#[derive(Debug)]
enum Completion {
    Connected { generation: u64, result: Result<Link, TransportError> },
    History { epoch: u64, result: Result<Vec<Message>, HistoryError> },
    Presence { epoch: u64, result: Result<u32, PresenceError> },
}

#[derive(Debug)]
struct ActiveLink {
    generation: u64,
    link: Link,
}

/// Drives one [`ChatSession`] until shutdown.
pub struct Runtime<E: Environment, C, H> {
    env: E,
    session: ChatSession<E>,
    connector: C,
    collaborator: H,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::Sender<Completion>,
    completions: mpsc::Receiver<Completion>,
    link: Option<ActiveLink>,
    connecting: Option<(u64, AbortHandle)>,
    banner: Option<Banner>,
    view: watch::Sender<SessionView>,
}

impl<E, C, H> Runtime<E, C, H>
where
    E: Environment,
    C: Connector,
    H: HistorySource + PresenceSource + Clone + 'static,
{
    /// Create a runtime and the handle that controls it.
    pub fn new(env: E, config: SessionConfig, connector: C, collaborator: H) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (completions_tx, completions) = mpsc::channel(COMPLETION_CAPACITY);
        let session = ChatSession::new(env.clone(), config);
        let initial = SessionView {
            max_attempts: session.connection().config().reconnect.ceiling(),
            ..SessionView::default()
        };
        let (view, view_rx) = watch::channel(initial);

        let runtime = Self {
            env,
            session,
            connector,
            collaborator,
            commands,
            completions_tx,
            completions,
            link: None,
            connecting: None,
            banner: None,
            view,
        };
        (runtime, SessionHandle::new(commands_tx, view_rx))
    }

    /// Run until [`SessionHandle::shutdown`] or until every handle is dropped.
    pub async fn run(mut self) {
        info!("session runtime started");

        loop {
            let wait = self.session.next_deadline().map(|deadline| deadline - self.env.now());

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(completion) = self.completions.recv() => self.on_completion(completion),
                (generation, event) = next_link_event(self.link.as_mut()) => {
                    self.on_link_event(generation, event);
                },
                () = sleep_for(&self.env, wait) => {
                    let now = self.env.now();
                    self.dispatch(SessionEvent::Tick { now });
                },
            }

            self.publish();
        }

        self.dispatch(SessionEvent::Teardown);
        self.publish();
        info!("session runtime stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SetIdentity(identity) => self.dispatch(SessionEvent::IdentityResolved(identity)),
            Command::ClearIdentity => self.dispatch(SessionEvent::IdentityCleared),
            Command::SelectConversation(conversation_id) => {
                self.banner = None;
                self.dispatch(SessionEvent::ConversationSelected(conversation_id));
            },
            Command::Send { body, reply } => {
                let result = self
                    .session
                    .handle(SessionEvent::SendMessage { body })
                    .map(|actions| self.execute(actions));
                if reply.send(result).is_err() {
                    debug!("send caller went away");
                }
            },
            Command::Retry => {
                self.banner = None;
                self.dispatch(SessionEvent::Retry);
            },
            Command::Teardown => self.dispatch(SessionEvent::Teardown),
            Command::DismissBanner => self.banner = None,
            Command::Shutdown => {},
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected { generation, result: Ok(link) } => {
                self.connecting.take_if(|(pending, _)| *pending == generation);
                let wanted = self.session.connection().is_current(generation)
                    && *self.session.state() == ConnectionState::Connecting;
                if !wanted {
                    debug!(generation, "discarding superseded stream");
                    close(&link, CloseCode::NORMAL, "superseded");
                    return;
                }
                if let Some(previous) = self.link.replace(ActiveLink { generation, link }) {
                    previous.link.stop();
                }
                self.dispatch(SessionEvent::TransportOpened { generation });
            },
            Completion::Connected { generation, result: Err(error) } => {
                self.connecting.take_if(|(pending, _)| *pending == generation);
                warn!(generation, %error, "connect failed");
                self.dispatch(SessionEvent::TransportClosed {
                    generation,
                    code: CloseCode::ABNORMAL,
                    reason: Some(error.to_string()),
                });
            },
            Completion::History { epoch, result } => {
                self.dispatch(SessionEvent::HistoryLoaded { epoch, result });
            },
            Completion::Presence { epoch, result } => {
                self.dispatch(SessionEvent::PresenceFetched { epoch, result });
            },
        }
    }

    fn on_link_event(&mut self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => self.dispatch(SessionEvent::FrameReceived { generation, text }),
            TransportEvent::Closed { code, reason } => {
                self.link = None;
                self.dispatch(SessionEvent::TransportClosed { generation, code, reason });
            },
        }
    }

    fn dispatch(&mut self, event: SessionEvent<E::Instant>) {
        match self.session.handle(event) {
            Ok(actions) => self.execute(actions),
            Err(error) => warn!(%error, "session rejected event"),
        }
    }

    fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Connect { generation, conversation_id } => {
                    self.spawn_connect(generation, conversation_id);
                },
                SessionAction::SendFrame { generation, frame } => self.send_frame(generation, &frame),
                SessionAction::CloseTransport { generation, code, reason } => {
                    self.close_link(generation, code, &reason);
                },
                SessionAction::AbortTransport { generation } => self.abort_link(generation),
                SessionAction::FetchHistory { epoch, target } => self.spawn_history(epoch, target),
                SessionAction::FetchPresence { epoch, conversation_id } => {
                    self.spawn_presence(epoch, conversation_id);
                },
                SessionAction::Notify(update) => self.on_update(&update),
            }
        }
    }

    fn spawn_connect(&mut self, generation: u64, conversation_id: ConversationId) {
        debug!(generation, conversation = %conversation_id, "connecting");
        if let Some(previous) = self.link.take() {
            previous.link.stop();
        }
        if let Some((_, task)) = self.connecting.take() {
            task.abort();
        }

        let connector = self.connector.clone();
        let completions = self.completions_tx.clone();
        let task = tokio::spawn(async move {
            let result = connector.connect(&conversation_id).await;
            // The runtime may have stopped
            let _ = completions.send(Completion::Connected { generation, result }).await;
        });
        self.connecting = Some((generation, task.abort_handle()));
    }

    fn spawn_history(&self, epoch: u64, target: ResolvedSession) {
        let loader = HistoryLoader::new(self.collaborator.clone());
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = loader.load(target.conversation_id.as_str(), &target.identity).await;
            let _ = completions.send(Completion::History { epoch, result }).await;
        });
    }

    fn spawn_presence(&self, epoch: u64, conversation_id: ConversationId) {
        let collaborator = self.collaborator.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = collaborator.online_count(&conversation_id).await;
            let _ = completions.send(Completion::Presence { epoch, result }).await;
        });
    }

    fn send_frame(&self, generation: u64, frame: &OutboundFrame) {
        let Some(active) = self.link.as_ref().filter(|active| active.generation == generation) else {
            warn!(generation, "no stream for outbound frame");
            return;
        };
        let text = match frame.encode() {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "frame encode failed");
                return;
            },
        };
        if let Err(error) = active.link.to_server.try_send(TransportCommand::Text(text)) {
            warn!(generation, %error, "outbound queue rejected frame");
        }
    }

    fn close_link(&mut self, generation: u64, code: CloseCode, reason: &str) {
        self.cancel_connect(generation);
        if let Some(active) = self.take_link(generation) {
            close(&active.link, code, reason);
        }
    }

    fn abort_link(&mut self, generation: u64) {
        self.cancel_connect(generation);
        if let Some(active) = self.take_link(generation) {
            active.link.stop();
        }
    }

    fn cancel_connect(&mut self, generation: u64) {
        if let Some((_, task)) = self.connecting.take_if(|(pending, _)| *pending == generation) {
            debug!(generation, "cancelling connect");
            task.abort();
        }
    }

    fn take_link(&mut self, generation: u64) -> Option<ActiveLink> {
        self.link.take_if(|active| active.generation == generation)
    }

    fn on_update(&mut self, update: &SessionUpdate) {
        trace!(?update, "session update");
        match update {
            SessionUpdate::HistoryUnavailable { reason } => {
                info!(%reason, "history unavailable");
                self.banner = Some(Banner::HistoryUnavailable);
            },
            SessionUpdate::RetryExhausted { attempts } => {
                warn!(attempts, "reconnect attempts exhausted");
                self.banner = Some(Banner::ConnectionFailed { attempts: *attempts });
            },
            SessionUpdate::Connection(ConnectionState::Open) => {
                if matches!(self.banner, Some(Banner::ConnectionFailed { .. })) {
                    self.banner = None;
                }
            },
            SessionUpdate::Connection(state) => debug!(%state, "connection state"),
            _ => {},
        }
    }

    fn publish(&self) {
        let next = SessionView {
            state: self.session.state().clone(),
            messages: self.session.snapshot(),
            presence: self.session.presence(),
            pending: self.session.pending().to_vec(),
            history: self.session.history().clone(),
            banner: self.banner.clone(),
            identity: self.session.identity().cloned(),
            conversation_id: self.session.context().conversation_id().cloned(),
            max_attempts: self.session.connection().config().reconnect.ceiling(),
        };
        self.view.send_if_modified(|current| {
            if current.same_as(&next) {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn close(link: &Link, code: CloseCode, reason: &str) {
    let command = TransportCommand::Close { code, reason: reason.to_string() };
    if let Err(error) = link.to_server.try_send(command) {
        debug!(%error, "close not queued; stopping stream");
        link.stop();
    }
}

async fn next_link_event(link: Option<&mut ActiveLink>) -> (u64, TransportEvent) {
    let Some(active) = link else {
        return std::future::pending().await;
    };
    match active.link.from_server.recv().await {
        Some(event) => (active.generation, event),
        None => (active.generation, TransportEvent::Closed {
            code: CloseCode::ABNORMAL,
            reason: Some("stream task ended".to_string()),
        }),
    }
}

async fn sleep_for<E: Environment>(env: &E, wait: Option<Duration>) {
    match wait {
        Some(wait) => env.sleep(wait).await,
        None => std::future::pending().await,
    }
}
