use std::{
    fs::File,
    future::Future,
    io::BufReader,
    path::Path,
    sync::{PoisonError, RwLock},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{error::MintPoolError, wallet::WalletAddress};

/// Event record as kept by the on-chain event registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// POAP event id the attendance token is minted under
    pub poap_id: String,
    pub name: String,
    /// Hashtags and mentions a post must carry to prove attendance
    pub tags: Vec<String>,
    /// Organizer address
    pub address: String,
    #[serde(default)]
    pub participants: Vec<WalletAddress>,
    /// Unix timestamp
    pub start_time: u64,
    /// Seconds
    pub duration: u64,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub registered_quantity: u64,
}

impl EventData {
    pub fn has_participant(&self, wallet: &WalletAddress) -> bool {
        self.participants.contains(wallet)
    }
}

/// Fields supplied when registering a new event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub code: String,
    pub poap_id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub address: String,
    pub start_time: u64,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedEvent {
    pub code: String,
    #[serde(flatten)]
    pub event: EventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub events: Vec<ListedEvent>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Event {0} not found")]
    EventNotFound(String),
    #[error("Event {0} already exists")]
    EventAlreadyExists(String),
    #[error("Event {0} is closed")]
    EventClosed(String),
    #[error("Failed to fetch event data: {0}")]
    FetchEventError(String),
}

impl DirectoryError {
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::EventNotFound(_) => "EVENT_NOT_FOUND",
            DirectoryError::EventAlreadyExists(_) => "EVENT_ALREADY_EXISTS",
            DirectoryError::EventClosed(_) => "EVENT_CLOSED",
            DirectoryError::FetchEventError(_) => "FETCH_EVENT_ERROR",
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Read/write access to the event registry contract.
pub trait EventDirectory: Send + Sync {
    /// Fails with [`DirectoryError::EventNotFound`] when the event has no tags recorded.
    fn get_event(&self, code: &str) -> impl Future<Output = DirectoryResult<EventData>> + Send;

    fn add_participant(
        &self,
        code: &str,
        wallet: &WalletAddress,
    ) -> impl Future<Output = DirectoryResult<EventData>> + Send;

    fn create_event(&self, event: NewEvent)
        -> impl Future<Output = DirectoryResult<EventData>> + Send;

    /// Zero-based page of events in registration order
    fn list_events(
        &self,
        page: usize,
        page_size: usize,
    ) -> impl Future<Output = DirectoryResult<EventPage>> + Send;
}

/// Event registry held in memory, optionally seeded from a JSON file mapping
/// event code to [`EventData`]. Event codes are case-insensitive.
#[derive(Debug, Default)]
pub struct InMemoryEventDirectory {
    events: RwLock<IndexMap<String, EventData>>,
}

impl InMemoryEventDirectory {
    pub fn new(events: IndexMap<String, EventData>) -> Self {
        let events = events
            .into_iter()
            .map(|(code, event)| (code.to_lowercase(), event))
            .collect();
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn new_from_file(path: &Path) -> Result<Self, MintPoolError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let events: IndexMap<String, EventData> = serde_json::from_reader(reader)?;
        info!("loaded {} events from {}", events.len(), path.display());

        Ok(Self::new(events))
    }

    /// Stop accepting participants for an event
    pub fn close_event(&self, code: &str) -> DirectoryResult<EventData> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let event = events
            .get_mut(&code.to_lowercase())
            .ok_or_else(|| DirectoryError::EventNotFound(code.to_string()))?;
        event.closed = true;
        Ok(event.clone())
    }
}

impl EventDirectory for InMemoryEventDirectory {
    async fn get_event(&self, code: &str) -> DirectoryResult<EventData> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        match events.get(&code.to_lowercase()) {
            Some(event) if !event.tags.is_empty() => Ok(event.clone()),
            _ => Err(DirectoryError::EventNotFound(code.to_string())),
        }
    }

    async fn add_participant(
        &self,
        code: &str,
        wallet: &WalletAddress,
    ) -> DirectoryResult<EventData> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let event = events
            .get_mut(&code.to_lowercase())
            .ok_or_else(|| DirectoryError::EventNotFound(code.to_string()))?;

        if event.closed {
            return Err(DirectoryError::EventClosed(code.to_string()));
        }
        if !event.has_participant(wallet) {
            event.participants.push(wallet.clone());
            event.registered_quantity += 1;
            info!("registered {} for event {}", wallet, code);
        }

        Ok(event.clone())
    }

    async fn create_event(&self, event: NewEvent) -> DirectoryResult<EventData> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let code = event.code.to_lowercase();
        if events.contains_key(&code) {
            return Err(DirectoryError::EventAlreadyExists(event.code));
        }

        let data = EventData {
            poap_id: event.poap_id,
            name: event.name,
            tags: event.tags,
            address: event.address,
            participants: vec![],
            start_time: event.start_time,
            duration: event.duration,
            closed: false,
            registered_quantity: 0,
        };
        events.insert(code, data.clone());
        Ok(data)
    }

    async fn list_events(&self, page: usize, page_size: usize) -> DirectoryResult<EventPage> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let page_size = page_size.max(1);

        Ok(EventPage {
            page,
            page_size,
            total: events.len(),
            events: events
                .iter()
                .skip(page.saturating_mul(page_size))
                .take(page_size)
                .map(|(code, event)| ListedEvent {
                    code: code.clone(),
                    event: event.clone(),
                })
                .collect(),
        })
    }
}
