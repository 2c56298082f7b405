//! Bounded notification queue and its delivery worker

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{MailTransport, Notification};
use crate::health::{components, HealthRegistry};
use crate::observability::{NotificationOutcome, WatchdogMetrics};

/// Configuration for notification delivery
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Channel capacity; notifications beyond it are dropped with a warning
    pub queue_size: usize,
    /// Delivery attempts per notification
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_size: 64,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Producer side, cheap to clone into request handlers
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Notification>,
    metrics: WatchdogMetrics,
}

impl NotificationQueue {
    pub fn new(config: &NotifierConfig) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        (
            Self {
                sender,
                metrics: WatchdogMetrics::new(),
            },
            receiver,
        )
    }

    /// Queue without waiting. Returns false if the queue is full or closed.
    pub fn enqueue(&self, notification: Notification) -> bool {
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(subject = %n.subject, body = %n.body, "Notification queue full, dropping");
                self.metrics.inc_notifications(NotificationOutcome::Dropped);
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                error!(subject = %n.subject, body = %n.body, "Notification worker gone, dropping");
                self.metrics.inc_notifications(NotificationOutcome::Dropped);
                false
            }
        }
    }

    /// Queue every notification, returning how many were accepted
    pub fn enqueue_all(&self, notifications: impl IntoIterator<Item = Notification>) -> usize {
        notifications
            .into_iter()
            .filter(|n| self.enqueue(n.clone()))
            .count()
    }
}

/// Background delivery worker
pub struct NotificationWorker {
    config: NotifierConfig,
    receiver: mpsc::Receiver<Notification>,
    transport: Arc<dyn MailTransport>,
    health: Option<HealthRegistry>,
    metrics: WatchdogMetrics,
}

impl NotificationWorker {
    pub fn new(
        config: NotifierConfig,
        receiver: mpsc::Receiver<Notification>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            config,
            receiver,
            transport,
            health: None,
            metrics: WatchdogMetrics::new(),
        }
    }

    /// Report delivery failures on the `notifier` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run on a background task. A worker task that panics marks the
    /// notifier unhealthy, which takes the collector out of readiness.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let health = self.health.clone();
        let task = tokio::spawn(self.run(shutdown));

        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(error = %e, "Notification worker died");
                if let Some(health) = health {
                    health
                        .set_unhealthy(components::NOTIFIER, format!("worker died: {}", e))
                        .await;
                }
            }
        })
    }

    /// Drain the queue until shutdown or until every producer is gone
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            max_attempts = self.config.max_attempts,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "Starting notification worker"
        );

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Some(notification) => {
                        self.deliver(&notification).await;
                    }
                    None => {
                        warn!("Notification queue closed, stopping worker");
                        if let Some(health) = &self.health {
                            health
                                .set_unhealthy(components::NOTIFIER, "notification queue closed")
                                .await;
                        }
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down notification worker");
                    break;
                }
            }
        }
    }

    /// Deliver one notification with bounded retry. Never fails.
    pub async fn deliver(&self, notification: &Notification) -> NotificationOutcome {
        if !notification.mail_enabled {
            info!(
                subject = %notification.subject,
                body = %notification.body,
                "Mail disabled, simulated delivery"
            );
            self.metrics.inc_notifications(NotificationOutcome::Simulated);
            return NotificationOutcome::Simulated;
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .transport
                .send(&notification.subject, &notification.body)
                .await
            {
                Ok(()) => {
                    info!(
                        subject = %notification.subject,
                        attempt = attempt,
                        "Notification delivered"
                    );
                    self.metrics.inc_notifications(NotificationOutcome::Delivered);
                    if let Some(health) = &self.health {
                        health.set_healthy(components::NOTIFIER).await;
                    }
                    return NotificationOutcome::Delivered;
                }
                Err(e) if attempt >= max_attempts => {
                    error!(
                        subject = %notification.subject,
                        error = %e,
                        attempts = attempt,
                        "Failed to deliver notification after max attempts"
                    );
                    self.metrics.inc_notifications(NotificationOutcome::Failed);
                    if let Some(health) = &self.health {
                        health
                            .set_degraded(components::NOTIFIER, e.to_string())
                            .await;
                    }
                    return NotificationOutcome::Failed;
                }
                Err(e) => {
                    warn!(
                        subject = %notification.subject,
                        error = %e,
                        attempt = attempt,
                        "Failed to deliver notification, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}
