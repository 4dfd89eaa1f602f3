//! Session-expiry retry state machine
//!
//! `advance` is pure: it receives an event and returns (new_state, action).
//! `Orchestrator::available_dates` executes the I/O implied by each action.
//!
//! Transitions:
//! - Querying → Done (dates fetched)
//! - Querying → Failed (fetch failed)
//! - Querying → Reauthenticating (session expired, first time)
//! - Querying → Failed (session expired again after re-authenticating)
//! - Reauthenticating → Querying (new pair negotiated and committed)
//! - Reauthenticating → Failed (negotiation or commit failed)
//!
//! A run negotiates at most once: `Querying { reauthenticated: true }` has no
//! edge back to `Reauthenticating`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ais_session::{
    Classification, CredentialStore, CredentialUpdate, DateFetcher, Identity, Negotiator,
    TokenPair,
};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Source of freshly negotiated sessions.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.
pub trait SessionSource: Send + Sync {
    fn renew<'a>(
        &'a self,
        identity: &'a Identity,
        previous: Option<&'a TokenPair>,
    ) -> Pin<Box<dyn Future<Output = ais_session::Result<TokenPair>> + Send + 'a>>;
}

/// Source of available appointment dates for a given session.
pub trait DateSource: Send + Sync {
    fn query<'a>(
        &'a self,
        tokens: &'a TokenPair,
    ) -> Pin<Box<dyn Future<Output = Classification> + Send + 'a>>;
}

impl SessionSource for Negotiator {
    fn renew<'a>(
        &'a self,
        identity: &'a Identity,
        previous: Option<&'a TokenPair>,
    ) -> Pin<Box<dyn Future<Output = ais_session::Result<TokenPair>> + Send + 'a>> {
        Box::pin(self.negotiate(identity, previous))
    }
}

impl DateSource for DateFetcher {
    fn query<'a>(
        &'a self,
        tokens: &'a TokenPair,
    ) -> Pin<Box<dyn Future<Output = Classification> + Send + 'a>> {
        Box::pin(self.fetch_available_dates(tokens))
    }
}

/// Run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Querying dates; `reauthenticated` records whether this run already
    /// spent its single negotiation.
    Querying { reauthenticated: bool },
    /// Negotiating a new session
    Reauthenticating,
    /// Dates emitted (accepting state)
    Done,
    /// Error propagated (terminal)
    Failed,
}

impl RunState {
    /// Every run starts by querying.
    pub const INITIAL: RunState = RunState::Querying {
        reauthenticated: false,
    };
}

/// Events that drive transitions.
#[derive(Debug)]
pub enum RunEvent {
    DatesFetched(Vec<NaiveDate>),
    SessionExpired,
    FetchFailed(ais_session::Error),
    Renewed,
    RenewFailed(ais_session::Error),
}

/// Actions the driver executes after a transition.
#[derive(Debug)]
pub enum RunAction {
    /// Query dates with the current session
    Fetch,
    /// Negotiate and commit a new session
    Renew,
    /// Return these dates to the caller
    Emit(Vec<NaiveDate>),
    /// Return this error to the caller
    Fail(Error),
}

/// Handle a transition. Pure function: no I/O.
pub fn advance(state: RunState, event: RunEvent) -> (RunState, RunAction) {
    match (state, event) {
        (RunState::Querying { .. }, RunEvent::DatesFetched(dates)) => {
            (RunState::Done, RunAction::Emit(dates))
        }
        (RunState::Querying { .. }, RunEvent::FetchFailed(e)) => {
            (RunState::Failed, RunAction::Fail(Error::Session(e)))
        }
        (
            RunState::Querying {
                reauthenticated: false,
            },
            RunEvent::SessionExpired,
        ) => (RunState::Reauthenticating, RunAction::Renew),
        (
            RunState::Querying {
                reauthenticated: true,
            },
            RunEvent::SessionExpired,
        ) => (
            RunState::Failed,
            RunAction::Fail(Error::SessionStillExpired),
        ),
        (RunState::Reauthenticating, RunEvent::Renewed) => (
            RunState::Querying {
                reauthenticated: true,
            },
            RunAction::Fetch,
        ),
        (RunState::Reauthenticating, RunEvent::RenewFailed(e)) => {
            (RunState::Failed, RunAction::Fail(Error::Session(e)))
        }
        (state, event) => (
            RunState::Failed,
            RunAction::Fail(Error::OutOfOrder(format!("{event:?} in {state:?}"))),
        ),
    }
}

/// Drives one logical "get available dates" call.
pub struct Orchestrator<S, D> {
    store: Arc<CredentialStore>,
    sessions: S,
    dates: D,
    always_login: bool,
}

impl<S: SessionSource, D: DateSource> Orchestrator<S, D> {
    pub fn new(store: Arc<CredentialStore>, sessions: S, dates: D) -> Self {
        Self {
            store,
            sessions,
            dates,
            always_login: false,
        }
    }

    /// Ignore the stored session and negotiate before the first query.
    /// The up-front negotiation is the run's single renewal.
    pub fn always_login(mut self, enabled: bool) -> Self {
        self.always_login = enabled;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Fetch available dates, renewing the session at most once.
    ///
    /// The record is re-read from disk first, so edits made since the last
    /// run are seen and preserved. A missing stored session is treated like
    /// an expired one. A renewed pair is committed to the store before it is
    /// used for the retry.
    pub async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        self.store.reload().await?;
        let record = self.store.snapshot().await;
        let mut current = if self.always_login {
            None
        } else {
            record.session.clone()
        };

        let mut state = RunState::INITIAL;
        let mut action = RunAction::Fetch;

        loop {
            let event = match action {
                RunAction::Fetch => match current.as_ref() {
                    None => {
                        debug!("no usable session, negotiating");
                        RunEvent::SessionExpired
                    }
                    Some(tokens) => match self.dates.query(tokens).await {
                        Classification::Success(dates) => RunEvent::DatesFetched(dates),
                        Classification::Expired => {
                            info!("session expired");
                            RunEvent::SessionExpired
                        }
                        Classification::Fatal(e) => RunEvent::FetchFailed(e),
                    },
                },
                RunAction::Renew => {
                    match self
                        .sessions
                        .renew(&record.identity, record.session.as_ref())
                        .await
                    {
                        Ok(tokens) => {
                            match self
                                .store
                                .commit(CredentialUpdate::session(tokens.clone()))
                                .await
                            {
                                Ok(()) => {
                                    metrics::counter!("watch_reauth_total").increment(1);
                                    current = Some(tokens);
                                    RunEvent::Renewed
                                }
                                Err(e) => RunEvent::RenewFailed(e),
                            }
                        }
                        Err(e) => RunEvent::RenewFailed(e),
                    }
                }
                RunAction::Emit(dates) => return Ok(dates),
                RunAction::Fail(e) => {
                    warn!(error = %e, ?state, "date query failed");
                    return Err(e);
                }
            };

            (state, action) = advance(state, event);
            debug!(?state, "run state");
        }
    }
}
