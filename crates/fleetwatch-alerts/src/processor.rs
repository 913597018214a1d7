//! Event processing: claim an event, match recipients, record pending
//! deliveries and hand them to the dispatcher.
//!
//! An event is completed only once every delivery for it is terminal.
//! Otherwise the claim is left in place and the stale-claim sweep
//! releases it for another pass.

use chrono::Utc;
use fleetwatch_core::access::{Caller, Capability};
use fleetwatch_core::error::{FleetError, FleetResult};
use fleetwatch_core::message::render;
use fleetwatch_core::models::audit::RequestMeta;
use fleetwatch_core::models::delivery::{Delivery, DeliveryStatus, NewDelivery, PendingRecord};
use fleetwatch_core::models::event::GeofenceEvent;
use fleetwatch_core::repository::{
    AuditLogRepository, DeliveryRepository, EventRepository, GeofenceRepository,
    RecipientRepository,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{Actor, AuditRecorder};
use crate::config::AlertConfig;
use crate::dispatcher::{DeliveryTicket, Dispatched, Dispatcher};
use crate::matcher::RecipientMatcher;
use crate::sender::NotificationSender;

/// Outcome counts for one processed event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub event_id: Uuid,
    pub matched_recipients: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Deliveries finished by an earlier pass.
    pub already_terminal: usize,
    /// Deliveries still pending when the pass ended.
    pub unsettled: usize,
}

impl ProcessReport {
    pub fn is_settled(&self) -> bool {
        self.unsettled == 0
    }

    fn count(&mut self, status: DeliveryStatus) {
        match status {
            DeliveryStatus::Sent => self.sent += 1,
            DeliveryStatus::Failed => self.failed += 1,
            DeliveryStatus::Skipped => self.skipped += 1,
            DeliveryStatus::Pending => self.unsettled += 1,
        }
    }
}

pub struct EventProcessor<E, G, R, D, S, A>
where
    E: EventRepository,
    G: GeofenceRepository,
    R: RecipientRepository,
    D: DeliveryRepository + Clone + 'static,
    S: NotificationSender,
    A: AuditLogRepository,
{
    events: E,
    matcher: RecipientMatcher<G, R>,
    deliveries: D,
    dispatcher: Dispatcher<D, S>,
    audit: AuditRecorder<A>,
    config: AlertConfig,
}

impl<E, G, R, D, S, A> EventProcessor<E, G, R, D, S, A>
where
    E: EventRepository,
    G: GeofenceRepository,
    R: RecipientRepository,
    D: DeliveryRepository + Clone + 'static,
    S: NotificationSender,
    A: AuditLogRepository,
{
    pub fn new(
        events: E,
        matcher: RecipientMatcher<G, R>,
        deliveries: D,
        sender: S,
        audit: AuditRecorder<A>,
        config: AlertConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(deliveries.clone(), sender, &config);
        Self {
            events,
            matcher,
            deliveries,
            dispatcher,
            audit,
            config,
        }
    }

    /// Claim and process one event. `None` when nothing is waiting.
    ///
    /// On error the claim is released so the event is retried.
    pub async fn process_next(&self) -> FleetResult<Option<ProcessReport>> {
        let Some(event) = self.events.claim_next().await? else {
            return Ok(None);
        };

        let report = match self.process(&event).await {
            Ok(report) => report,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Event processing failed, releasing claim");
                if let Err(release) = self.events.release(event.id).await {
                    warn!(event_id = %event.id, error = %release, "Failed to release claim");
                }
                return Err(e);
            }
        };

        if report.is_settled() {
            self.events.complete(event.id).await?;
            info!(
                event_id = %event.id,
                recipients = report.matched_recipients,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "Event processed"
            );
        } else {
            warn!(
                event_id = %event.id,
                unsettled = report.unsettled,
                "Event left claimed with pending deliveries"
            );
        }

        self.audit
            .record(
                Actor::System,
                "event.dispatch",
                "geofence_event",
                Some(event.id.to_string()),
                Some(serde_json::json!({
                    "geofence_id": event.geofence_id,
                    "vehicle_id": event.vehicle_id,
                    "direction": event.direction,
                    "recipients": report.matched_recipients,
                    "sent": report.sent,
                    "failed": report.failed,
                    "skipped": report.skipped,
                    "already_terminal": report.already_terminal,
                    "unsettled": report.unsettled,
                })),
                RequestMeta::default(),
            )
            .await;

        Ok(Some(report))
    }

    /// Process events until none are waiting. Returns how many were handled.
    pub async fn drain(&self) -> FleetResult<usize> {
        let mut handled = 0;
        while self.process_next().await?.is_some() {
            handled += 1;
        }
        Ok(handled)
    }

    /// Release claims older than the configured stale-claim age.
    pub async fn release_stale(&self) -> FleetResult<u64> {
        let cutoff = Utc::now() - self.config.stale_claim_age();
        let released = self.events.release_stale_claims(cutoff).await?;
        if released > 0 {
            info!(released, "Released stale event claims");
        }
        Ok(released)
    }

    /// Delivery history for an event.
    pub async fn deliveries(&self, caller: &Caller, event_id: Uuid) -> FleetResult<Vec<Delivery>> {
        caller.require(Capability::ViewDeliveries)?;
        self.events.get_by_id(event_id).await?;
        self.deliveries.list_for_event(event_id).await
    }

    /// Stop the dispatcher after its queue drains.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }

    async fn process(&self, event: &GeofenceEvent) -> FleetResult<ProcessReport> {
        let matched = self.matcher.match_event(event).await?;
        let mut report = ProcessReport {
            event_id: event.id,
            matched_recipients: matched.matches.len(),
            ..Default::default()
        };
        let Some(geofence) = matched.geofence.as_ref() else {
            return Ok(report);
        };
        if matched.matches.is_empty() {
            return Ok(report);
        }

        let message = render(
            geofence,
            event,
            &self.config.default_entry_message,
            &self.config.default_exit_message,
        );

        let mut tickets: Vec<DeliveryTicket> = Vec::new();
        for m in &matched.matches {
            for (channel, destination) in &m.targets {
                let input = NewDelivery {
                    event_id: event.id,
                    recipient_id: m.recipient.id,
                    tenant_id: m.recipient.tenant_id,
                    channel: *channel,
                    destination: destination.clone(),
                    subject: message.subject.clone(),
                    message: message.body.clone(),
                };
                let delivery_id = input.id();

                let record = match self
                    .deliveries
                    .record_pending(input, self.config.pending_timeout())
                    .await
                {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(%delivery_id, error = %e, "Failed to record delivery");
                        report.unsettled += 1;
                        continue;
                    }
                };

                match record {
                    PendingRecord::AlreadyTerminal(_) => report.already_terminal += 1,
                    PendingRecord::StillPending(_) => {
                        debug!(%delivery_id, "Delivery pending from an earlier pass");
                        report.unsettled += 1;
                    }
                    PendingRecord::Created(delivery) | PendingRecord::Retryable(delivery) => {
                        match self.dispatcher.dispatch(delivery).await {
                            Ok(Dispatched::Queued(ticket)) => tickets.push(ticket),
                            Ok(Dispatched::Skipped) => report.skipped += 1,
                            Ok(Dispatched::AlreadyTerminal) => report.already_terminal += 1,
                            Err(FleetError::QueueFull) => report.unsettled += 1,
                            Err(e) => {
                                warn!(%delivery_id, error = %e, "Failed to dispatch delivery");
                                report.unsettled += 1;
                            }
                        }
                    }
                }
            }
        }

        for ticket in tickets {
            report.count(ticket.await.unwrap_or(DeliveryStatus::Pending));
        }
        Ok(report)
    }
}
