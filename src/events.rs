//! Domain events and their WebSocket fan-out.
//!
//! Services publish after their transaction commits. Subscribers that fall
//! behind lose the oldest events rather than blocking publishers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};

use crate::models::{ActorContext, Report, ReportAction, ReportStatus};
use crate::state_machine::RestoreKind;

/// Workflow events published to notification collaborators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ReportCreated {
        report_id: String,
        reporter_id: String,
        reported_user_id: String,
        timestamp: DateTime<Utc>,
    },
    ReportAssigned {
        report_id: String,
        moderator_id: String,
        assigned_by: String,
        timestamp: DateTime<Utc>,
    },
    ReportProcessed {
        report_id: String,
        moderator_id: String,
        reported_user_id: String,
        action: ReportAction,
        status: ReportStatus,
        timestamp: DateTime<Utc>,
    },
    ReportRestored {
        report_id: String,
        actor_id: String,
        reported_user_id: String,
        kind: RestoreKind,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn created(report: &Report) -> Self {
        Self::ReportCreated {
            report_id: report.id.clone(),
            reporter_id: report.reporter_id.clone(),
            reported_user_id: report.reported_user_id.clone(),
            timestamp: report.created_at,
        }
    }

    pub fn assigned(report: &Report, actor: &ActorContext) -> Self {
        Self::ReportAssigned {
            report_id: report.id.clone(),
            moderator_id: report.assigned_moderator_id.clone().unwrap_or_default(),
            assigned_by: actor.actor_id.clone(),
            timestamp: report.updated_at,
        }
    }

    pub fn processed(report: &Report, action: ReportAction, actor: &ActorContext) -> Self {
        Self::ReportProcessed {
            report_id: report.id.clone(),
            moderator_id: actor.actor_id.clone(),
            reported_user_id: report.reported_user_id.clone(),
            action,
            status: report.status,
            timestamp: report.updated_at,
        }
    }

    pub fn restored(report: &Report, kind: RestoreKind, actor: &ActorContext) -> Self {
        Self::ReportRestored {
            report_id: report.id.clone(),
            actor_id: actor.actor_id.clone(),
            reported_user_id: report.reported_user_id.clone(),
            kind,
            timestamp: report.updated_at,
        }
    }

    pub fn report_id(&self) -> &str {
        match self {
            Self::ReportCreated { report_id, .. }
            | Self::ReportAssigned { report_id, .. }
            | Self::ReportProcessed { report_id, .. }
            | Self::ReportRestored { report_id, .. } => report_id,
        }
    }
}

/// Client message types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Ping to keep connection alive
    Ping,
}

/// Broadcast hub for domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
    connection_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let report_id = event.report_id().to_string();
        // No receivers is not an error; nobody is listening yet.
        match self.sender.send(Arc::new(event)) {
            Ok(receivers) => {
                tracing::debug!(report_id = %report_id, receivers, "Event published");
                receivers
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    /// Get the current WebSocket connection count
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Forward every event to a WebSocket client until it disconnects.
    pub async fn handle_connection(&self, ws: WebSocket, actor: ActorContext) {
        let actor_id = actor.actor_id;
        let (mut sender, mut receiver) = ws.split();
        let mut events = self.subscribe();

        self.connection_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!(actor_id = %actor_id, "Event stream opened");

        let mut ping_interval = interval(Duration::from_secs(30));
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(ClientMessage::Ping) => {
                                    let _ = sender.send(Message::Text(
                                        serde_json::json!({"type": "pong"}).to_string().into()
                                    )).await;
                                }
                                Err(e) => {
                                    tracing::warn!(actor_id = %actor_id, "Failed to parse client message: {}", e);
                                }
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            awaiting_pong = false;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::error!(actor_id = %actor_id, "WebSocket error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            let json = match serde_json::to_string(&*event) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize event: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = sender.send(Message::Text(json.into())).await {
                                tracing::error!(actor_id = %actor_id, "Failed to send event: {}", e);
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(actor_id = %actor_id, "Client lagged {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = ping_interval.tick() => {
                    if awaiting_pong {
                        tracing::warn!(actor_id = %actor_id, "Pong timeout, closing connection");
                        break;
                    }
                    if let Err(e) = sender.send(Message::Ping(vec![].into())).await {
                        tracing::error!(actor_id = %actor_id, "Failed to send ping: {}", e);
                        break;
                    }
                    awaiting_pong = true;
                }
            }
        }

        self.connection_count.fetch_sub(1, Ordering::Relaxed);
        tracing::info!(actor_id = %actor_id, "Event stream closed");
    }
}
