//! The progress-and-social state engine.
//!
//! [`Social`] is the long-lived service: it owns the store handle, the event bus and the
//! narrator task. Each acting user gets a [`UserSession`] from it, and every mutating
//! operation lives on that session.

pub mod events;
pub mod feed;
pub mod goals;
pub mod groups;
pub mod narrator;
pub mod progress;
mod session;

pub use events::{DomainEvent, EventBus};
pub use feed::GroupView;
pub use goals::{PRESET_GOALS, PresetGoal};
pub use narrator::{Locale, Narrator};
pub use progress::SessionOutcome;
pub use session::UserSession;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::info;

use crate::model::{GroupId, Identity};
use crate::store::Store;
use crate::{Config, Result};

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Social {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    bus: EventBus,
    feed_limit: usize,
    narrator: Mutex<Option<JoinHandle<()>>>,
}

impl Social {
    /// Wires the event bus and starts the narrator. Needs a tokio runtime.
    pub fn start(store: Store, config: &Config) -> Self {
        let bus = EventBus::new(EVENT_BUS_CAPACITY);
        let narrator = Narrator::new(config.narrator.clone()).spawn(store.clone(), bus.subscribe());
        info!(locale = ?config.narrator.locale, feed_limit = config.feed_limit, "social engine started");

        Self {
            inner: Arc::new(Inner {
                store,
                bus,
                feed_limit: config.feed_limit,
                narrator: Mutex::new(Some(narrator)),
            }),
        }
    }

    /// Stops the narrator. Events published afterwards are no longer narrated.
    pub fn shutdown(&self) {
        let handle = self
            .inner
            .narrator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("social engine stopped");
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn feed_limit(&self) -> usize {
        self.inner.feed_limit
    }

    /// Opens a session for `identity`, creating the profile on first sign-in.
    pub async fn session(&self, identity: Identity) -> Result<UserSession> {
        UserSession::start(self.clone(), identity).await
    }

    /// Reopens a session with a previously selected group, dropping the selection
    /// if it is no longer valid.
    pub async fn resume(&self, identity: Identity, current_group: Option<GroupId>) -> Result<UserSession> {
        let mut session = self.session(identity).await?;
        session.restore_current_group(current_group).await?;
        Ok(session)
    }

    pub(crate) fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            self.inner.bus.publish(event.clone());
        }
    }
}
