pub mod types;
pub mod traits;
pub mod config;
pub mod cdp;
pub mod discovery;
pub mod fetcher;
pub mod state;
pub mod detector;
pub mod notifier;
pub mod scheduler;

pub use types::*;
pub use traits::{Notifier, PageSession};
pub use config::WatcherConfig;
pub use cdp::CdpSession;
pub use discovery::ContentIdDiscovery;
pub use fetcher::{strip_scripts, ContentFetcher};
pub use state::SnapshotStore;
pub use detector::detect;
pub use notifier::{LogNotifier, MailgunNotifier, NotificationDispatcher};
pub use scheduler::{spawn_heartbeat, watch, ChangeMonitor};
