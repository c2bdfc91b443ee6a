use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::{CalendarRules, EngineError, SessionError};
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::session::BookingSession;
use crate::store::{BookingStore, InMemorySchedule, ScheduleSource};

/// Opens booking sessions against one schedule and one booking store.
///
/// Every session shares the same calendar policy and buffer, and publishes its
/// events on the service's hub under its own id. A session's channel lives
/// exactly as long as the session value.
pub struct BookingService {
    rules: CalendarRules,
    buffer: BufferPolicy,
    config: EngineConfig,
    source: Arc<dyn ScheduleSource>,
    store: Arc<dyn BookingStore>,
    hub: Arc<NotifyHub>,
    fixed_today: Option<CalendarDate>,
}

impl BookingService {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ScheduleSource>,
        store: Arc<dyn BookingStore>,
    ) -> Result<Self, EngineError> {
        let rules = config.rules();
        rules.check()?;
        Ok(Self {
            rules,
            buffer: config.buffer,
            config,
            source,
            store,
            hub: Arc::new(NotifyHub::new()),
            fixed_today: None,
        })
    }

    /// A service whose schedule and store are the same in-memory instance.
    pub fn in_memory(config: EngineConfig) -> Result<(Self, Arc<InMemorySchedule>), EngineError> {
        let schedule = Arc::new(InMemorySchedule::new(config.buffer));
        let service = Self::new(config, schedule.clone(), schedule.clone())?;
        Ok((service, schedule))
    }

    /// Pin "today" instead of reading the clock.
    pub fn with_fixed_today(mut self, today: CalendarDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn hub(&self) -> &Arc<NotifyHub> {
        &self.hub
    }

    pub fn rules(&self) -> &CalendarRules {
        &self.rules
    }

    pub fn today(&self) -> CalendarDate {
        self.fixed_today.unwrap_or_else(|| self.config.today())
    }

    /// Start a session on `item` and load its availability.
    ///
    /// The returned receiver is subscribed before the load, so it sees the first
    /// `BlockedSetReady` event.
    pub async fn open_session(
        &self,
        item: ItemKey,
    ) -> Result<(BookingSession, broadcast::Receiver<SessionEvent>), SessionError> {
        if self.hub.channel_count() >= MAX_OPEN_SESSIONS {
            return Err(EngineError::LimitExceeded("too many open sessions").into());
        }
        let mut session = BookingSession::new(self.rules.clone(), self.buffer, self.today())?
            .with_observer(self.hub.clone());
        let events = self.hub.subscribe(session.id());

        // On failure the session drops here and takes its channel with it.
        session.load(item, self.source.as_ref()).await?;
        metrics::counter!(crate::observability::SESSIONS_OPENED_TOTAL).increment(1);
        debug!(session = %session.id(), open = self.hub.channel_count(), "session opened");
        Ok((session, events))
    }

    /// Re-validate the session's selection against a fresh snapshot.
    pub async fn confirm(&self, session: &mut BookingSession) -> Result<DateRange, SessionError> {
        session.confirm(self.source.as_ref(), self.today()).await
    }

    /// Confirm, then persist. Stops at the first failure.
    pub async fn confirm_and_submit(
        &self,
        session: &mut BookingSession,
    ) -> Result<(DateRange, BookingId), SessionError> {
        let range = self.confirm(session).await?;
        let id = session.submit(self.store.as_ref()).await?;
        info!(session = %session.id(), %range, booking = %id, "booking completed");
        Ok((range, id))
    }

    /// End a session. Same as dropping it; the hub releases the channel.
    pub fn close(&self, session: BookingSession) {
        debug!(session = %session.id(), "session closed");
        drop(session);
    }
}
