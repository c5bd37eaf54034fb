//! Periodic data refresh with on-demand triggers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of the most recent refresh
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorUpdate<T> {
    /// Data from the last successful fetch; kept across failures
    pub data: Option<T>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for CoordinatorUpdate<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_update_success: false,
            last_error: None,
            updated_at: None,
        }
    }
}

/// Runs a fetch function on a fixed interval and publishes the result
///
/// The first fetch runs as soon as the coordinator starts.
/// [`request_refresh`](Self::request_refresh) runs one early and restarts
/// the interval. Dropping the coordinator stops the task.
pub struct UpdateCoordinator<T> {
    name: String,
    refresh: Arc<Notify>,
    update_rx: watch::Receiver<CoordinatorUpdate<T>>,
    task: JoinHandle<()>,
}

impl<T> UpdateCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn start<F, Fut, E>(name: impl Into<String>, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        let refresh = Arc::new(Notify::new());
        let (update_tx, update_rx) = watch::channel(CoordinatorUpdate::default());

        tracing::info!("Starting {} coordinator every {:?}", name, interval);
        let task = tokio::spawn({
            let name = name.clone();
            let refresh = Arc::clone(&refresh);
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        () = refresh.notified() => {
                            tracing::debug!("{} refresh requested", name);
                            ticker.reset();
                        }
                    }

                    let result = fetch().await;
                    update_tx.send_modify(|update| {
                        update.updated_at = Some(Utc::now());
                        match result {
                            Ok(data) => {
                                update.data = Some(data);
                                update.last_update_success = true;
                                update.last_error = None;
                            }
                            Err(e) => {
                                tracing::warn!("{} refresh failed: {}", name, e);
                                update.last_update_success = false;
                                update.last_error = Some(e.to_string());
                            }
                        }
                    });
                }
            }
        });

        Self {
            name,
            refresh,
            update_rx,
            task,
        }
    }

    /// Run a refresh now instead of waiting for the interval
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    #[must_use]
    pub fn current(&self) -> CoordinatorUpdate<T> {
        self.update_rx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorUpdate<T>> {
        self.update_rx.clone()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Drop for UpdateCoordinator<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
