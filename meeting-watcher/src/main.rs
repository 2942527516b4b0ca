use anyhow::Context;
use meeting_watcher::cdp::find_chrome;
use meeting_watcher::{
    watch, CdpSession, LogNotifier, MailgunNotifier, NotificationDispatcher, Notifier, WatcherConfig,
};
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting meeting watcher");

    let config = WatcherConfig::from_env().context("Invalid configuration")?;

    let notifier: Arc<dyn Notifier> = match &config.mailgun {
        Some(mailgun) => {
            info!("Sending mail through Mailgun domain {}", mailgun.domain);
            Arc::new(MailgunNotifier::new(mailgun.clone())?)
        }
        None => {
            info!("Dry run: notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    let dispatcher = Arc::new(NotificationDispatcher::new(
        notifier,
        config.mail.clone(),
        config.monitor.clone(),
    ));

    // Installed before launch; a signal during startup is seen once watch polls it
    let shutdown = shutdown_signal()?;

    let chrome = find_chrome(config.chrome_path.as_deref())
        .context("No Chrome or Chromium found; set CHROME_PATH")?;
    let session = CdpSession::launch(&chrome).await?;

    watch(Box::new(session), config.monitor.clone(), dispatcher, shutdown).await?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
}
