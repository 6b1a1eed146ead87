use crate::error::ShowcaseError;
use crate::types::usage::{UsageDecision, UsageSnapshot};

use chrono::{NaiveDate, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::HashMap;
use tracing::{debug, info};

/// Per-session message counts for one UTC day.
#[derive(Debug)]
pub struct UsageLedger {
    limit: u32,
    day: NaiveDate,
    counts: HashMap<String, u32>,
}

impl UsageLedger {
    pub fn new(limit: u32, today: NaiveDate) -> Self {
        Self {
            limit,
            day: today,
            counts: HashMap::new(),
        }
    }

    /// Forget every count from a previous day.
    fn roll(&mut self, today: NaiveDate) {
        if today != self.day {
            debug!(
                previous = %self.day,
                sessions = self.counts.len(),
                "usage day rolled over"
            );
            self.counts.clear();
            self.day = today;
        }
    }

    pub fn check_and_record(&mut self, session: &str, today: NaiveDate) -> UsageDecision {
        self.roll(today);
        let used = self.counts.get(session).copied().unwrap_or(0);
        if used >= self.limit {
            return UsageDecision {
                allowed: false,
                used,
                limit: self.limit,
            };
        }
        let used = used + 1;
        self.counts.insert(session.to_string(), used);
        UsageDecision {
            allowed: true,
            used,
            limit: self.limit,
        }
    }

    pub fn snapshot(&mut self, session: &str, today: NaiveDate) -> UsageSnapshot {
        self.roll(today);
        let used = self.counts.get(session).copied().unwrap_or(0);
        UsageSnapshot::new(used, self.limit)
    }

    pub fn reset(&mut self, session: &str) {
        self.counts.remove(session);
    }

    pub fn sessions(&self) -> usize {
        self.counts.len()
    }
}

#[derive(Debug)]
pub enum UsageActorMessage {
    /// Count one message for the session unless its daily limit is used up.
    CheckAndRecord(String, RpcReplyPort<UsageDecision>),
    Snapshot(String, RpcReplyPort<UsageSnapshot>),
    Reset(String),
}

/// Handle for interacting with the usage actor.
#[derive(Clone)]
pub struct UsageHandle {
    actor: ActorRef<UsageActorMessage>,
}

impl UsageHandle {
    pub async fn check_and_record(
        &self,
        session: impl AsRef<str>,
    ) -> Result<UsageDecision, ShowcaseError> {
        ractor::call!(
            self.actor,
            UsageActorMessage::CheckAndRecord,
            session.as_ref().to_string()
        )
        .map_err(|e| ShowcaseError::RactorError(format!("CheckAndRecord RPC failed: {e}")))
    }

    pub async fn snapshot(&self, session: impl AsRef<str>) -> Result<UsageSnapshot, ShowcaseError> {
        ractor::call!(
            self.actor,
            UsageActorMessage::Snapshot,
            session.as_ref().to_string()
        )
        .map_err(|e| ShowcaseError::RactorError(format!("Snapshot RPC failed: {e}")))
    }

    pub async fn reset(&self, session: impl AsRef<str>) {
        let _ = ractor::cast!(
            self.actor,
            UsageActorMessage::Reset(session.as_ref().to_string())
        );
    }
}

struct UsageActor;

#[ractor::async_trait]
impl Actor for UsageActor {
    type Msg = UsageActorMessage;
    type State = UsageLedger;
    type Arguments = u32;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        limit: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(limit, "UsageActor started");
        Ok(UsageLedger::new(limit, Utc::now().date_naive()))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let today = Utc::now().date_naive();
        match message {
            UsageActorMessage::CheckAndRecord(session, rp) => {
                let decision = state.check_and_record(&session, today);
                if !decision.allowed {
                    info!(
                        session = %session,
                        used = decision.used,
                        limit = decision.limit,
                        "daily message limit reached"
                    );
                }
                let _ = rp.send(decision);
            }
            UsageActorMessage::Snapshot(session, rp) => {
                let _ = rp.send(state.snapshot(&session, today));
            }
            UsageActorMessage::Reset(session) => {
                state.reset(&session);
                debug!(session = %session, sessions = state.sessions(), "session usage reset");
            }
        }
        Ok(())
    }
}

/// Spawn the usage actor with the given per-session daily limit.
pub async fn spawn(limit: u32) -> Result<UsageHandle, ShowcaseError> {
    let (actor, _jh) = Actor::spawn(None, UsageActor, limit)
        .await
        .map_err(|e| ShowcaseError::RactorError(format!("failed to spawn UsageActor: {e}")))?;
    Ok(UsageHandle { actor })
}
