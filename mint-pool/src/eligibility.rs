use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    allocator::MintLinkAllocator,
    directory::{DirectoryError, EventData, EventDirectory},
    social::{SocialPostVerifier, VerifierError},
    store::PoolStore,
    wallet::WalletAddress,
};

/// How the gate decides who may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStrategy {
    /// Membership in the allocator's allow-list
    AllowList,
    /// Membership in the participant roster of the requested event
    EventRoster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IneligibleReason {
    NotWhitelisted,
    MissingEventCode,
    EventNotFound,
    FetchEventError,
    EventClosed,
    NotParticipant,
}

impl IneligibleReason {
    pub fn code(&self) -> &'static str {
        match self {
            IneligibleReason::NotWhitelisted => "NOT_WHITELISTED",
            IneligibleReason::MissingEventCode => "MISSING_EVENT_CODE",
            IneligibleReason::EventNotFound => "EVENT_NOT_FOUND",
            IneligibleReason::FetchEventError => "FETCH_EVENT_ERROR",
            IneligibleReason::EventClosed => "EVENT_CLOSED",
            IneligibleReason::NotParticipant => "NOT_PARTICIPANT",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            IneligibleReason::NotWhitelisted => "Wallet is not on the allow-list",
            IneligibleReason::MissingEventCode => "An event code is required",
            IneligibleReason::EventNotFound => "Event not found",
            IneligibleReason::FetchEventError => "Failed to load the event",
            IneligibleReason::EventClosed => "The event has already finished",
            IneligibleReason::NotParticipant => {
                "Only verified participants of this event can claim a POAP"
            }
        }
    }
}

impl From<&DirectoryError> for IneligibleReason {
    fn from(error: &DirectoryError) -> Self {
        match error {
            DirectoryError::EventNotFound(_) => IneligibleReason::EventNotFound,
            DirectoryError::EventClosed(_) => IneligibleReason::EventClosed,
            DirectoryError::EventAlreadyExists(_) | DirectoryError::FetchEventError(_) => {
                IneligibleReason::FetchEventError
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Decides whether a wallet may call [`MintLinkAllocator::claim`].
///
/// Collaborator failures never escape: they turn into [`Eligibility::Ineligible`]
/// with a reason that tells the caller what went wrong.
#[derive(Debug)]
pub struct EligibilityGate<D> {
    strategy: GateStrategy,
    directory: Arc<D>,
}

impl<D: EventDirectory> EligibilityGate<D> {
    pub fn new(strategy: GateStrategy, directory: Arc<D>) -> Self {
        Self {
            strategy,
            directory,
        }
    }

    pub fn strategy(&self) -> GateStrategy {
        self.strategy
    }

    pub async fn is_eligible<S: PoolStore>(
        &self,
        allocator: &MintLinkAllocator<S>,
        wallet: &WalletAddress,
        event_code: Option<&str>,
    ) -> Eligibility {
        match self.strategy {
            GateStrategy::AllowList => {
                if allocator.is_whitelisted(wallet) {
                    Eligibility::Eligible
                } else {
                    Eligibility::Ineligible(IneligibleReason::NotWhitelisted)
                }
            }
            GateStrategy::EventRoster => {
                let Some(code) = event_code.map(str::trim).filter(|c| !c.is_empty()) else {
                    return Eligibility::Ineligible(IneligibleReason::MissingEventCode);
                };

                let event = match self.directory.get_event(code).await {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("event lookup for {} failed: {}", code, e);
                        return Eligibility::Ineligible(IneligibleReason::from(&e));
                    }
                };

                if event.closed {
                    return Eligibility::Ineligible(IneligibleReason::EventClosed);
                }
                if !event.has_participant(wallet) {
                    return Eligibility::Ineligible(IneligibleReason::NotParticipant);
                }

                let added = allocator.extend_allow_list(event.participants);
                if added > 0 {
                    info!("allow-list grew by {} participants of {}", added, code);
                }
                Eligibility::Eligible
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttendanceError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Verifier(#[from] VerifierError),
    #[error("No post by {0} carries the event tags")]
    PostNotFound(String),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Directory(e) => e.code(),
            AttendanceError::Verifier(_) => "VERIFIER_ERROR",
            AttendanceError::PostNotFound(_) => "POST_NOT_FOUND",
        }
    }
}

/// Record `wallet` as a participant of `event_code` once `handle` has published a
/// post carrying every tag of the event.
pub async fn register_attendance<D: EventDirectory, V: SocialPostVerifier>(
    directory: &D,
    verifier: &V,
    event_code: &str,
    handle: &str,
    wallet: &WalletAddress,
) -> Result<EventData, AttendanceError> {
    let event = directory.get_event(event_code).await?;
    if event.closed {
        return Err(DirectoryError::EventClosed(event_code.to_string()).into());
    }

    if !verifier
        .check_hashtags_and_mentions(handle, &event.tags)
        .await?
    {
        return Err(AttendanceError::PostNotFound(handle.to_string()));
    }

    Ok(directory.add_participant(event_code, wallet).await?)
}
