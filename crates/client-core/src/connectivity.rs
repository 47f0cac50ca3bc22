//! Connectivity reducer
//!
//! A pure state machine deriving the process-wide [`Connection`] from user
//! presence, foreground transitions, session and push registration
//! results, and backend reconnect signals.
//!
//! The reducer performs no I/O. [`ConnectivityReducer::apply`] returns the
//! effects the coordinator must run; their results come back as inputs
//! tagged with the generation that requested them. Every restart of the
//! session pipeline bumps the generation, so results from a superseded
//! attempt are dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::config::duration_millis;
use crate::client::recovery::ConnectRetryConfig;
use crate::error::ClientError;
use crate::sdk::{PushTokens, SessionId, User};

/// Cause attached to a disconnected or failed connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionError {
    PushNotRegistered,
    Unauthorised,
    Session(String),
    Unknown,
}

impl From<&ClientError> for ConnectionError {
    fn from(error: &ClientError) -> Self {
        match error.root_cause() {
            ClientError::PushNotRegistered => ConnectionError::PushNotRegistered,
            ClientError::Unauthorised => ConnectionError::Unauthorised,
            ClientError::SessionError { reason } => ConnectionError::Session(reason.clone()),
            ClientError::Backend { message } => ConnectionError::Session(message.clone()),
            ClientError::Timeout { millis } => {
                ConnectionError::Session(format!("timed out after {} ms", millis))
            }
            _ => ConnectionError::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connection {
    /// A session attempt is in flight or waiting for its retry
    Connecting,
    Connected,
    Reconnecting,
    Disconnected(Option<ConnectionError>),
    Error(ConnectionError),
}

impl Default for Connection {
    fn default() -> Self {
        Connection::Disconnected(None)
    }
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected)
    }

    /// Disconnected or failed; a foreground transition restarts from here
    pub fn is_down(&self) -> bool {
        matches!(self, Connection::Disconnected(_) | Connection::Error(_))
    }
}

#[derive(Debug, Clone)]
pub enum ConnectivityInput {
    UserChanged(Option<User>),
    Foreground,
    PushTokensUpdated(PushTokens),
    RetryElapsed {
        generation: u64,
        attempt: u32,
    },
    SessionCreated {
        generation: u64,
        result: Result<SessionId, ClientError>,
    },
    PushRegistered {
        generation: u64,
        result: Result<(), ClientError>,
    },
    WillReconnect,
    DidReconnect,
    SessionError {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEffect {
    CreateSession {
        generation: u64,
        token: String,
    },
    RegisterPush {
        generation: u64,
        tokens: PushTokens,
    },
    ScheduleRetry {
        generation: u64,
        attempt: u32,
        delay: Duration,
    },
    /// Abort every in-flight session, push or retry task
    CancelPending,
    /// Emit the connection-start notification
    ConnectionStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    CreatingSession,
    AwaitingRetry,
    AwaitingPushTokens,
    RegisteringPush,
    Established,
}

#[derive(Debug)]
pub struct ConnectivityReducer {
    retry: ConnectRetryConfig,
    user: Option<User>,
    push_tokens: Option<PushTokens>,
    push_registered: bool,
    announced_start: bool,
    session: Option<SessionId>,
    phase: Phase,
    generation: u64,
    attempt: u32,
    connection: Connection,
}

impl ConnectivityReducer {
    pub fn new(retry: ConnectRetryConfig) -> Self {
        Self {
            retry,
            user: None,
            push_tokens: None,
            push_registered: false,
            announced_start: false,
            session: None,
            phase: Phase::Idle,
            generation: 0,
            attempt: 0,
            connection: Connection::default(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Generation of the current session pipeline
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn apply(&mut self, input: ConnectivityInput) -> Vec<ConnectivityEffect> {
        match input {
            ConnectivityInput::UserChanged(None) => self.logout(),
            ConnectivityInput::UserChanged(Some(user)) => self.login(user),
            ConnectivityInput::Foreground => self.foreground(),
            ConnectivityInput::PushTokensUpdated(tokens) => self.push_tokens_updated(tokens),
            ConnectivityInput::RetryElapsed {
                generation,
                attempt,
            } => {
                if self.is_stale(generation, "retry") || self.phase != Phase::AwaitingRetry {
                    return vec![];
                }
                self.attempt_session(attempt)
            }
            ConnectivityInput::SessionCreated { generation, result } => {
                if self.is_stale(generation, "session") || self.phase != Phase::CreatingSession {
                    return vec![];
                }
                match result {
                    Ok(session) => self.session_established(session),
                    Err(e) => self.session_failed(e),
                }
            }
            ConnectivityInput::PushRegistered { generation, result } => {
                if self.is_stale(generation, "push registration") || self.phase != Phase::RegisteringPush {
                    return vec![];
                }
                match result {
                    Ok(()) => {
                        self.push_registered = true;
                        self.connected()
                    }
                    Err(e) => {
                        warn!(generation, error = %e, "Push registration failed");
                        self.phase = Phase::Idle;
                        self.connection = Connection::Error(ConnectionError::PushNotRegistered);
                        vec![]
                    }
                }
            }
            ConnectivityInput::WillReconnect => {
                if self.connection == Connection::Connected {
                    self.connection = Connection::Reconnecting;
                }
                vec![]
            }
            ConnectivityInput::DidReconnect => {
                if self.connection == Connection::Reconnecting {
                    self.connection = Connection::Connected;
                }
                vec![]
            }
            ConnectivityInput::SessionError { reason } => {
                if self.phase != Phase::Established {
                    debug!(reason = %reason, "Session error outside an established session ignored");
                    return vec![];
                }
                warn!(reason = %reason, "Session error, disconnecting");
                self.supersede();
                self.connection = Connection::Disconnected(Some(ConnectionError::Session(reason)));
                vec![ConnectivityEffect::CancelPending]
            }
        }
    }

    fn logout(&mut self) -> Vec<ConnectivityEffect> {
        self.supersede();
        self.user = None;
        self.push_registered = false;
        self.announced_start = false;
        self.connection = Connection::Disconnected(None);
        info!("User signed out, connection disconnected");
        vec![ConnectivityEffect::CancelPending]
    }

    fn login(&mut self, user: User) -> Vec<ConnectivityEffect> {
        if self.user.as_ref() == Some(&user) {
            return vec![];
        }
        if self.user.as_ref().map(|u| &u.username) != Some(&user.username) {
            self.push_registered = false;
            self.announced_start = false;
        }
        self.user = Some(user);
        self.restart()
    }

    fn foreground(&mut self) -> Vec<ConnectivityEffect> {
        if self.user.is_none() || !self.connection.is_down() {
            return vec![];
        }
        debug!("Foreground transition restarts the connection cascade");
        self.restart()
    }

    fn push_tokens_updated(&mut self, tokens: PushTokens) -> Vec<ConnectivityEffect> {
        self.push_tokens = Some(tokens.clone());
        if self.phase != Phase::AwaitingPushTokens {
            return vec![];
        }
        self.phase = Phase::RegisteringPush;
        vec![ConnectivityEffect::RegisterPush {
            generation: self.generation,
            tokens,
        }]
    }

    /// Start a fresh pipeline generation from attempt one.
    fn restart(&mut self) -> Vec<ConnectivityEffect> {
        self.supersede();
        let mut effects = vec![ConnectivityEffect::CancelPending];
        effects.extend(self.attempt_session(1));
        effects
    }

    fn supersede(&mut self) {
        self.generation += 1;
        self.attempt = 0;
        self.session = None;
        self.phase = Phase::Idle;
    }

    fn attempt_session(&mut self, attempt: u32) -> Vec<ConnectivityEffect> {
        let Some(token) = self.user.as_ref().and_then(|u| u.token.clone()) else {
            warn!("No service token for the current user");
            self.phase = Phase::Idle;
            self.connection = Connection::Error(ConnectionError::Unauthorised);
            return vec![];
        };
        self.attempt = attempt;
        self.phase = Phase::CreatingSession;
        self.connection = Connection::Connecting;
        debug!(generation = self.generation, attempt, "Creating session");
        vec![ConnectivityEffect::CreateSession {
            generation: self.generation,
            token,
        }]
    }

    fn session_established(&mut self, session: SessionId) -> Vec<ConnectivityEffect> {
        info!(generation = self.generation, session_id = %session, "Session established");
        self.session = Some(session);
        if self.push_registered {
            return self.connected();
        }
        match self.push_tokens.clone() {
            Some(tokens) => {
                self.phase = Phase::RegisteringPush;
                vec![ConnectivityEffect::RegisterPush {
                    generation: self.generation,
                    tokens,
                }]
            }
            None => {
                debug!("Waiting for push tokens before connecting");
                self.phase = Phase::AwaitingPushTokens;
                vec![]
            }
        }
    }

    fn session_failed(&mut self, e: ClientError) -> Vec<ConnectivityEffect> {
        if self.retry.has_attempts_after(self.attempt) {
            let delay = self.retry.delay_for_attempt(self.attempt);
            warn!(
                generation = self.generation,
                attempt = self.attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = duration_millis(delay),
                error = %e,
                "Session creation failed, retrying"
            );
            self.phase = Phase::AwaitingRetry;
            return vec![ConnectivityEffect::ScheduleRetry {
                generation: self.generation,
                attempt: self.attempt + 1,
                delay,
            }];
        }

        error!(
            generation = self.generation,
            attempts = self.attempt,
            error = %e,
            "Session creation failed, giving up until next foreground"
        );
        self.phase = Phase::Idle;
        self.connection = Connection::Disconnected(Some(ConnectionError::from(&e)));
        vec![]
    }

    fn connected(&mut self) -> Vec<ConnectivityEffect> {
        self.phase = Phase::Established;
        self.connection = Connection::Connected;
        if self.announced_start {
            return vec![];
        }
        self.announced_start = true;
        vec![ConnectivityEffect::ConnectionStarted]
    }

    fn is_stale(&self, generation: u64, what: &'static str) -> bool {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Dropping {} result from superseded attempt", what
            );
            return true;
        }
        false
    }
}
