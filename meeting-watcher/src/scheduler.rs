use crate::detector::detect;
use crate::discovery::ContentIdDiscovery;
use crate::fetcher::ContentFetcher;
use crate::notifier::NotificationDispatcher;
use crate::state::SnapshotStore;
use crate::traits::PageSession;
use crate::types::{ChangeEvent, ContentId, Detection, MonitorConfig, Result, TickOutcome, TrackedSequence};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// The single worker that owns the page session and the snapshot store.
///
/// Every tick checks exactly one meeting, picked round-robin from the tracked
/// sequence. Ticks never overlap: the next one is only scheduled once the
/// previous one has finished, so the session is never driven concurrently.
pub struct ChangeMonitor {
    session: Box<dyn PageSession>,
    fetcher: ContentFetcher,
    store: SnapshotStore,
    sequence: TrackedSequence,
    cursor: usize,
    cycles: u64,
    dispatcher: Arc<NotificationDispatcher>,
    tick_interval: Duration,
}

impl ChangeMonitor {
    pub fn new(
        session: Box<dyn PageSession>,
        sequence: TrackedSequence,
        config: MonitorConfig,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let tick_interval = config.tick_interval;
        Self {
            session,
            fetcher: ContentFetcher::new(config),
            store: SnapshotStore::new(),
            sequence,
            cursor: 0,
            cycles: 0,
            dispatcher,
            tick_interval,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_id(&self) -> &ContentId {
        self.sequence.get(self.cursor)
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn sequence(&self) -> &TrackedSequence {
        &self.sequence
    }

    /// Completed passes over the whole sequence.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check the meeting under the cursor, then advance the cursor regardless of the outcome.
    pub async fn tick(&mut self) -> TickOutcome {
        let id = self.sequence.get(self.cursor).clone();
        let outcome = self.check(&id).await;

        self.cursor = (self.cursor + 1) % self.sequence.len();
        if self.cursor == 0 {
            self.cycles += 1;
            info!(
                "Completed pass {} over {} meetings ({} with snapshots)",
                self.cycles,
                self.sequence.len(),
                self.store.len()
            );
        }

        outcome
    }

    async fn check(&mut self, id: &ContentId) -> TickOutcome {
        let snapshot = match self.fetcher.fetch(self.session.as_ref(), id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{}", e);
                return TickOutcome::Failed {
                    id: id.clone(),
                    error: e.to_string(),
                };
            }
        };

        match detect(&self.store, id, &snapshot) {
            Detection::Seeded => {
                info!("{} Scraped new data", id);
                self.store.insert(id.clone(), snapshot);
                TickOutcome::Seeded { id: id.clone() }
            }
            Detection::Unchanged => {
                info!("{} matches", id);
                TickOutcome::Unchanged { id: id.clone() }
            }
            Detection::Changed { previous } => {
                info!("{} has changed", id);

                let header = match self.fetcher.fetch_header(self.session.as_ref(), id).await {
                    Ok(header) => header,
                    Err(e) => {
                        warn!("{}, using id as label", e);
                        id.to_string()
                    }
                };

                let event = ChangeEvent {
                    id: id.clone(),
                    previous: Some(previous),
                    new: snapshot.clone(),
                    header,
                    detected_at: Utc::now(),
                };
                self.store.insert(id.clone(), snapshot);
                self.dispatcher.notify_change(&event).await;

                TickOutcome::Changed { id: id.clone() }
            }
        }
    }

    /// Tick at the configured cadence until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Watching {} meetings, one every {:?}",
            self.sequence.len(),
            self.tick_interval
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping monitor");
                    break;
                }
                _ = async {
                    ticker.tick().await;
                    self.tick().await
                } => {}
            }
        }
    }

    pub async fn close(self) {
        close_session(self.session.as_ref()).await;
    }
}

/// Send a heartbeat now and then every `every`. The task only holds the
/// dispatcher and never touches the page session.
pub fn spawn_heartbeat(dispatcher: Arc<NotificationDispatcher>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            dispatcher.notify_heartbeat().await;
        }
    })
}

/// Discover meetings, then poll them until `shutdown` resolves. Shutdown is
/// honoured during discovery as well, and the session is closed on every exit path.
pub async fn watch<F>(
    session: Box<dyn PageSession>,
    config: MonitorConfig,
    dispatcher: Arc<NotificationDispatcher>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let discovery = ContentIdDiscovery::new(config.clone());
    let discovered = tokio::select! {
        _ = &mut shutdown => None,
        result = discovery.discover(session.as_ref()) => Some(result),
    };

    let sequence = match discovered {
        Some(Ok(sequence)) => sequence,
        Some(Err(e)) => {
            error!("Discovery failed: {}", e);
            close_session(session.as_ref()).await;
            return Err(e);
        }
        None => {
            info!("Shutdown requested during discovery");
            close_session(session.as_ref()).await;
            return Ok(());
        }
    };

    let heartbeat = spawn_heartbeat(dispatcher.clone(), config.heartbeat_interval);

    let mut monitor = ChangeMonitor::new(session, sequence, config, dispatcher);
    monitor.run(&mut shutdown).await;

    heartbeat.abort();
    monitor.close().await;
    info!("Meeting watcher stopped");
    Ok(())
}

async fn close_session(session: &dyn PageSession) {
    if let Err(e) = session.close().await {
        error!("Failed to close page session: {}", e);
    }
}
