use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::database::models::Employee;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ClockInCode,
    LeaveSubmitted,
    LeaveDecided,
    OvertimeSubmitted,
    OvertimeDecided,
}

impl NotificationKind {
    pub fn template(&self) -> &'static str {
        match self {
            NotificationKind::ClockInCode => "clock_in_code",
            NotificationKind::LeaveSubmitted => "leave_submitted",
            NotificationKind::LeaveDecided => "leave_decided",
            NotificationKind::OvertimeSubmitted => "overtime_submitted",
            NotificationKind::OvertimeDecided => "overtime_decided",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient_id: Uuid,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publishes to live subscribers, returning how many received it.
    async fn publish(
        &self,
        kind: NotificationKind,
        recipient_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<usize, NotificationError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// Delivers through the notifier and falls back to mail when nobody is
/// listening. Delivery failures are logged and never propagated.
#[derive(Clone)]
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>, mailer: Arc<dyn Mailer>) -> Self {
        Self { notifier, mailer }
    }

    pub async fn notify(&self, kind: NotificationKind, recipient: &Employee, payload: serde_json::Value) {
        match self.notifier.publish(kind, recipient.id, payload.clone()).await {
            Ok(count) if count > 0 => {
                log::debug!("Published {:?} to {} subscriber(s) of {}", kind, count, recipient.id);
                return;
            }
            Ok(_) => {
                log::debug!("No subscribers for {}, falling back to mail", recipient.id);
            }
            Err(e) => {
                log::warn!("Failed to publish {:?} to {}: {}", kind, recipient.id, e);
            }
        }

        self.mail(kind, recipient, payload).await;
    }

    pub async fn mail(&self, kind: NotificationKind, recipient: &Employee, payload: serde_json::Value) {
        if let Err(e) = self
            .mailer
            .send(&recipient.email, kind.template(), payload)
            .await
        {
            log::error!("Failed to mail {:?} to {}: {}", kind, recipient.email, e);
        }
    }
}

type Channels = Arc<Mutex<HashMap<Uuid, broadcast::Sender<Notification>>>>;

/// In-process pub/sub keyed by recipient.
#[derive(Clone, Default)]
pub struct LocalNotifier {
    channels: Channels,
    capacity: usize,
}

impl LocalNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, recipient_id: Uuid) -> broadcast::Receiver<Notification> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let capacity = self.capacity.max(1);
        channels
            .entry(recipient_id)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Drops channels that no longer have receivers. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Notifier for LocalNotifier {
    async fn publish(
        &self,
        kind: NotificationKind,
        recipient_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<usize, NotificationError> {
        let sender = {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.get(&recipient_id).cloned()
        };

        let Some(sender) = sender else {
            return Ok(0);
        };

        let notification = Notification {
            kind,
            recipient_id,
            payload,
        };

        // A send error only means every receiver is gone.
        Ok(sender.send(notification).unwrap_or(0))
    }
}

/// Periodically prunes a `LocalNotifier` until shut down.
pub struct NotifierPruner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl NotifierPruner {
    pub fn start(notifier: LocalNotifier, every: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let pruned = notifier.prune();
                        if pruned > 0 {
                            log::debug!("Pruned {} idle notification channel(s)", pruned);
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("Notification pruner stopped");
        });

        Self { shutdown, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::error!("Notification pruner task failed: {}", e);
        }
    }
}

/// Writes mails to the log; template rendering happens elsewhere.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        to: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), NotificationError> {
        log::info!("Mail [{}] to {}: {}", template, to, data);
        Ok(())
    }
}
