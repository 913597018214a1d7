//! End-to-end tests for ingestion, matching and dispatch using in-memory
//! SurrealDB and a recording sender.

use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use fleetwatch_alerts::{
    AlertConfig, AuditRecorder, Dispatched, Dispatcher, EventIngestor, EventProcessor,
    NotificationSender, QueuePolicy, RecipientMatcher, SendError,
};
use fleetwatch_core::error::FleetError;
use fleetwatch_core::models::audit::AuditLogFilter;
use fleetwatch_core::models::delivery::{DeliveryStatus, NewDelivery, PendingRecord};
use fleetwatch_core::models::event::{Direction, IngestOutcome, RawCrossing};
use fleetwatch_core::models::geofence::{
    AlertMode, AssignmentScope, GeoPoint, GeofenceOwner, GeofenceShape, NewGeofence,
};
use fleetwatch_core::models::recipient::{Channel, CreateRecipient};
use fleetwatch_core::models::tenant::CreateTenant;
use fleetwatch_core::repository::{
    AuditLogRepository, DeliveryRepository, EventRepository, GeofenceRepository,
    RecipientRepository, TenantRepository,
};
use fleetwatch_db::repository::{
    SurrealAuditLogRepository, SurrealDeliveryRepository, SurrealEventRepository,
    SurrealGeofenceRepository, SurrealRecipientRepository, SurrealTenantRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

// -----------------------------------------------------------------------
// Fixtures
// -----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    channel: Channel,
    destination: String,
    subject: String,
    body: String,
}

/// Records every message; fails for one destination and stalls for
/// another.
#[derive(Clone, Default)]
struct RecordingSender {
    sent: Arc<Mutex<Vec<Sent>>>,
    failing: Option<String>,
    stalling: Option<String>,
    unsupported: Option<Channel>,
}

impl RecordingSender {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationSender for RecordingSender {
    fn supports(&self, channel: Channel) -> bool {
        self.unsupported != Some(channel)
    }

    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), SendError> {
        if self.failing.as_deref() == Some(destination) {
            return Err(SendError::new("550 mailbox unavailable"));
        }
        if self.stalling.as_deref() == Some(destination) {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        self.sent.lock().unwrap().push(Sent {
            channel,
            destination: destination.into(),
            subject: subject.into(),
            body: body.into(),
        });
        Ok(())
    }
}

type Processor = EventProcessor<
    SurrealEventRepository<Db>,
    SurrealGeofenceRepository<Db>,
    SurrealRecipientRepository<Db>,
    SurrealDeliveryRepository<Db>,
    RecordingSender,
    SurrealAuditLogRepository<Db>,
>;

struct Pipeline {
    ingestor: Arc<EventIngestor<SurrealEventRepository<Db>>>,
    processor: Processor,
    sender: RecordingSender,
}

async fn setup_db() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    fleetwatch_db::run_migrations(&db).await.unwrap();
    db
}

fn pipeline(db: Surreal<Db>, sender: RecordingSender, config: AlertConfig) -> Pipeline {
    let ingestor = EventIngestor::new(
        SurrealEventRepository::new(db.clone()),
        config.dedupe_window_secs,
    );
    let processor = EventProcessor::new(
        SurrealEventRepository::new(db.clone()),
        RecipientMatcher::new(
            SurrealGeofenceRepository::new(db.clone()),
            SurrealRecipientRepository::new(db.clone()),
        ),
        SurrealDeliveryRepository::new(db.clone()),
        sender.clone(),
        AuditRecorder::new(SurrealAuditLogRepository::new(db.clone())),
        config,
    );
    Pipeline {
        ingestor: Arc::new(ingestor),
        processor,
        sender,
    }
}

async fn tenant(db: &Surreal<Db>, slug: &str) -> Uuid {
    SurrealTenantRepository::new(db.clone())
        .create(CreateTenant {
            name: slug.to_uppercase(),
            slug: slug.into(),
        })
        .await
        .unwrap()
        .id
}

async fn geofence(
    db: &Surreal<Db>,
    owner: GeofenceOwner,
    alert_mode: AlertMode,
    initial_assignment: Option<AssignmentScope>,
) -> Uuid {
    SurrealGeofenceRepository::new(db.clone())
        .create(NewGeofence {
            name: "Valparaiso port".into(),
            shape: GeofenceShape::Circle {
                center: GeoPoint::new(-33.03, -71.63),
                radius_m: 400.0,
            },
            owner,
            alert_mode,
            entry_message: None,
            exit_message: None,
            created_by: Uuid::new_v4(),
            initial_assignment,
        })
        .await
        .unwrap()
        .id
}

fn recipient(tenant_id: Uuid, name: &str, alert_types: Vec<Direction>) -> CreateRecipient {
    CreateRecipient {
        tenant_id,
        name: name.into(),
        email: Some(format!("{name}@example.com")),
        messaging_address: None,
        channels: vec![Channel::Email],
        alert_types,
        geofence_ids: None,
        vehicle_ids: None,
    }
}

async fn add_recipient(db: &Surreal<Db>, input: CreateRecipient) -> Uuid {
    SurrealRecipientRepository::new(db.clone())
        .create(input)
        .await
        .unwrap()
        .id
}

fn crossing(vehicle: u128, geofence_id: Uuid, direction: Direction, minute: u32) -> RawCrossing {
    RawCrossing {
        vehicle_id: Uuid::from_u128(vehicle),
        geofence_id,
        direction,
        location: GeoPoint::new(-33.031, -71.629),
        occurred_at: Utc.with_ymd_and_hms(2026, 5, 4, 8, minute, 12).unwrap(),
    }
}

async fn deliveries(db: &Surreal<Db>, event_id: Uuid) -> Vec<fleetwatch_core::models::delivery::Delivery> {
    SurrealDeliveryRepository::new(db.clone())
        .list_for_event(event_id)
        .await
        .unwrap()
}

// -----------------------------------------------------------------------
// Scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn tenant_geofence_notifies_subscribed_recipient_only_on_entry() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    let r1 = add_recipient(&db, recipient(t1, "r1", vec![Direction::Entry])).await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let entry = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.event_id, entry.event_id());
    assert_eq!(report.sent, 1);
    assert!(report.is_settled());

    let rows = deliveries(&db, entry.event_id()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recipient_id, r1);
    assert_eq!(rows[0].channel, Channel::Email);
    assert_eq!(rows[0].status, DeliveryStatus::Sent);
    assert!(rows[0].sent_at.is_some());

    let sent = p.sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, "r1@example.com");
    assert_eq!(sent[0].subject, "Geofence entry: Valparaiso port");
    assert!(sent[0].body.contains("entered Valparaiso port"));

    let exit = p.ingestor.ingest(crossing(1, g1, Direction::Exit, 5)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.matched_recipients, 0);
    assert!(deliveries(&db, exit.event_id()).await.is_empty());
    assert_eq!(p.sender.sent().len(), 1);

    let event = SurrealEventRepository::new(db.clone())
        .get_by_id(exit.event_id())
        .await
        .unwrap();
    assert!(event.processed);
    assert!(event.completed_at.is_some());
}

#[tokio::test]
async fn globally_shared_geofence_notifies_every_tenant() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let t2 = tenant(&db, "t2").await;
    let g2 = geofence(
        &db,
        GeofenceOwner::Platform,
        AlertMode::EntryAndExit,
        Some(AssignmentScope::Global),
    )
    .await;
    let r1 = add_recipient(&db, recipient(t1, "one", vec![Direction::Entry])).await;
    let r2 = add_recipient(&db, recipient(t2, "two", vec![Direction::Entry])).await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let event = p.ingestor.ingest(crossing(2, g2, Direction::Entry, 10)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.matched_recipients, 2);
    assert_eq!(report.sent, 2);

    let rows = deliveries(&db, event.event_id()).await;
    let mut recipients: Vec<_> = rows.iter().map(|d| d.recipient_id).collect();
    recipients.sort();
    let mut expected = vec![r1, r2];
    expected.sort();
    assert_eq!(recipients, expected);
    assert!(rows.iter().all(|d| d.status == DeliveryStatus::Sent));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_reports_dispatch_once() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    add_recipient(&db, recipient(t1, "r1", vec![Direction::Entry])).await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let mut handles = Vec::new();
    for _ in 0..2 {
        let ingestor = p.ingestor.clone();
        let raw = crossing(1, g1, Direction::Entry, 0);
        handles.push(tokio::spawn(async move { ingestor.ingest(raw).await }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(outcomes.iter().filter(|o| o.is_accepted()).count(), 1);
    assert_eq!(outcomes[0].event_id(), outcomes[1].event_id());

    assert_eq!(p.processor.drain().await.unwrap(), 1);
    assert_eq!(deliveries(&db, outcomes[0].event_id()).await.len(), 1);
    assert_eq!(p.sender.sent().len(), 1);
}

#[tokio::test]
async fn channel_without_address_yields_no_delivery() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryOnly, None).await;
    // Stored directly: the recipient service would refuse this record.
    add_recipient(
        &db,
        CreateRecipient {
            email: None,
            ..recipient(t1, "r2", vec![Direction::Entry])
        },
    )
    .await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let event = p.ingestor.ingest(crossing(3, g1, Direction::Entry, 0)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.matched_recipients, 1);
    assert_eq!(report.sent + report.failed + report.skipped, 0);
    assert!(deliveries(&db, event.event_id()).await.is_empty());
    assert!(p.sender.sent().is_empty());
}

#[tokio::test]
async fn matches_list_one_pair_per_addressed_channel() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryOnly, None).await;
    let r2 = add_recipient(
        &db,
        CreateRecipient {
            email: None,
            ..recipient(t1, "r2", vec![Direction::Entry])
        },
    )
    .await;
    let r3 = add_recipient(
        &db,
        CreateRecipient {
            messaging_address: Some("+56 9 4444 1111".into()),
            channels: vec![Channel::Email, Channel::Messaging],
            ..recipient(t1, "r3", vec![Direction::Entry])
        },
    )
    .await;
    let ingestor = EventIngestor::new(SurrealEventRepository::new(db.clone()), 60);
    let matcher = RecipientMatcher::new(
        SurrealGeofenceRepository::new(db.clone()),
        SurrealRecipientRepository::new(db.clone()),
    );

    let outcome = ingestor.ingest(crossing(4, g1, Direction::Entry, 0)).await.unwrap();
    let event = SurrealEventRepository::new(db.clone())
        .get_by_id(outcome.event_id())
        .await
        .unwrap();
    let matched = matcher.match_event(&event).await.unwrap();

    let mut matched_ids: Vec<_> = matched.matches.iter().map(|m| m.recipient.id).collect();
    matched_ids.sort();
    let mut expected = vec![r2, r3];
    expected.sort();
    assert_eq!(matched_ids, expected);

    let mut pairs: Vec<_> = matched
        .pairs()
        .into_iter()
        .map(|(recipient, channel)| (recipient.id, channel))
        .collect();
    pairs.sort();
    assert_eq!(pairs, vec![(r3, Channel::Email), (r3, Channel::Messaging)]);
}

#[tokio::test]
async fn skipping_a_settled_delivery_reports_already_terminal() {
    let db = setup_db().await;
    let repo = SurrealDeliveryRepository::new(db.clone());
    let config = AlertConfig {
        disabled_channels: vec![Channel::Email],
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(repo.clone(), RecordingSender::default(), &config);

    let pending = |recipient_id: Uuid| NewDelivery {
        event_id: Uuid::from_u128(9),
        recipient_id,
        tenant_id: Uuid::from_u128(1),
        channel: Channel::Email,
        destination: "ops@example.com".into(),
        subject: "Geofence entry: Valparaiso port".into(),
        message: "Vehicle entered".into(),
    };
    let record = |input: NewDelivery| repo.record_pending(input, config.pending_timeout());

    let PendingRecord::Created(settled) = record(pending(Uuid::from_u128(2))).await.unwrap() else {
        panic!("expected a new delivery");
    };
    assert!(repo.mark_sent(settled.id, Utc::now()).await.unwrap());
    assert!(matches!(
        dispatcher.dispatch(settled.clone()).await.unwrap(),
        Dispatched::AlreadyTerminal
    ));
    assert_eq!(
        repo.get_by_id(settled.id).await.unwrap().status,
        DeliveryStatus::Sent
    );

    let PendingRecord::Created(fresh) = record(pending(Uuid::from_u128(3))).await.unwrap() else {
        panic!("expected a new delivery");
    };
    assert!(matches!(
        dispatcher.dispatch(fresh.clone()).await.unwrap(),
        Dispatched::Skipped
    ));
    assert_eq!(
        repo.get_by_id(fresh.id).await.unwrap().status,
        DeliveryStatus::Skipped
    );

    dispatcher.shutdown().await;
}

// -----------------------------------------------------------------------
// Dedupe and idempotency
// -----------------------------------------------------------------------

#[tokio::test]
async fn repeat_within_window_is_duplicate() {
    let db = setup_db().await;
    let p = pipeline(db, RecordingSender::default(), AlertConfig::default());
    let g = Uuid::new_v4();

    let first = p.ingestor.ingest(crossing(4, g, Direction::Entry, 20)).await.unwrap();
    let mut again = crossing(4, g, Direction::Entry, 20);
    again.occurred_at += Duration::seconds(30);
    let second = p.ingestor.ingest(again).await.unwrap();

    assert!(first.is_accepted());
    assert!(matches!(second, IngestOutcome::Duplicate { event_id, .. } if event_id == first.event_id()));

    let later = p.ingestor.ingest(crossing(4, g, Direction::Entry, 22)).await.unwrap();
    assert!(later.is_accepted());
}

#[tokio::test]
async fn out_of_range_location_is_rejected() {
    let db = setup_db().await;
    let p = pipeline(db, RecordingSender::default(), AlertConfig::default());
    let mut raw = crossing(5, Uuid::new_v4(), Direction::Exit, 0);
    raw.location = GeoPoint::new(95.0, 10.0);

    assert!(matches!(
        p.ingestor.ingest(raw).await,
        Err(FleetError::Validation { .. })
    ));
}

#[tokio::test]
async fn reprocessing_after_release_does_not_resend() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    add_recipient(&db, recipient(t1, "r1", vec![Direction::Entry])).await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let event = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    p.processor.process_next().await.unwrap().unwrap();

    // Simulate a crash after dispatch: hand the event back to the queue.
    db.query("UPDATE type::record('geofence_event', $id) SET processed = false, completed_at = NONE")
        .bind(("id", event.event_id().to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();

    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.already_terminal, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(p.sender.sent().len(), 1);
    assert_eq!(deliveries(&db, event.event_id()).await.len(), 1);
}

#[tokio::test]
async fn nothing_to_process_returns_none() {
    let db = setup_db().await;
    let p = pipeline(db, RecordingSender::default(), AlertConfig::default());
    assert!(p.processor.process_next().await.unwrap().is_none());
    assert_eq!(p.processor.release_stale().await.unwrap(), 0);
}

#[tokio::test]
async fn deleted_geofence_completes_without_deliveries() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    add_recipient(&db, recipient(t1, "r1", vec![Direction::Entry])).await;
    SurrealGeofenceRepository::new(db.clone())
        .soft_delete(g1)
        .await
        .unwrap();
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let event = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.matched_recipients, 0);
    assert!(report.is_settled());
    assert!(deliveries(&db, event.event_id()).await.is_empty());
}

// -----------------------------------------------------------------------
// Dispatch outcomes
// -----------------------------------------------------------------------

#[tokio::test]
async fn failing_send_is_recorded_and_others_still_sent() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    let bad = add_recipient(&db, recipient(t1, "bounce", vec![Direction::Entry])).await;
    add_recipient(&db, recipient(t1, "ok", vec![Direction::Entry])).await;
    let sender = RecordingSender {
        failing: Some("bounce@example.com".into()),
        ..Default::default()
    };
    let p = pipeline(db.clone(), sender, AlertConfig::default());

    let event = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert!(report.is_settled());

    let rows = deliveries(&db, event.event_id()).await;
    let failed = rows.iter().find(|d| d.recipient_id == bad).unwrap();
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert_eq!(failed.error_detail.as_deref(), Some("550 mailbox unavailable"));
    assert_eq!(p.sender.sent().len(), 1);
}

#[tokio::test]
async fn slow_send_times_out_as_failed() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    add_recipient(&db, recipient(t1, "slow", vec![Direction::Entry])).await;
    let sender = RecordingSender {
        stalling: Some("slow@example.com".into()),
        ..Default::default()
    };
    let config = AlertConfig {
        send_timeout_secs: 1,
        ..Default::default()
    };
    let p = pipeline(db.clone(), sender, config);

    let event = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.failed, 1);

    let rows = deliveries(&db, event.event_id()).await;
    assert_eq!(rows[0].status, DeliveryStatus::Failed);
    assert_eq!(rows[0].error_detail.as_deref(), Some("send timed out"));
}

#[tokio::test]
async fn disabled_and_unsupported_channels_are_skipped() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    add_recipient(
        &db,
        CreateRecipient {
            messaging_address: Some("+56 9 5555 0000".into()),
            channels: vec![Channel::Email, Channel::Messaging],
            ..recipient(t1, "both", vec![Direction::Entry])
        },
    )
    .await;
    let sender = RecordingSender {
        unsupported: Some(Channel::Messaging),
        ..Default::default()
    };
    let config = AlertConfig {
        disabled_channels: vec![Channel::Email],
        ..Default::default()
    };
    let p = pipeline(db.clone(), sender, config);

    let event = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    let report = p.processor.process_next().await.unwrap().unwrap();
    assert_eq!(report.skipped, 2);
    assert!(report.is_settled());
    assert!(p.sender.sent().is_empty());

    let rows = deliveries(&db, event.event_id()).await;
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row.status, DeliveryStatus::Skipped);
        let reason = row.error_detail.unwrap();
        match row.channel {
            Channel::Email => assert_eq!(reason, "channel disabled"),
            Channel::Messaging => assert_eq!(reason, "channel not supported by sender"),
        }
    }
}

#[tokio::test]
async fn dispatch_is_audited_as_system_action() {
    let db = setup_db().await;
    let t1 = tenant(&db, "t1").await;
    let g1 = geofence(&db, GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit, None).await;
    add_recipient(&db, recipient(t1, "r1", vec![Direction::Entry])).await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());

    let event = p.ingestor.ingest(crossing(1, g1, Direction::Entry, 0)).await.unwrap();
    p.processor.process_next().await.unwrap();

    let entries = SurrealAuditLogRepository::new(db.clone())
        .list(AuditLogFilter {
            action: Some("event.dispatch".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].actor_id.is_none());
    assert_eq!(entries[0].resource_id, Some(event.event_id().to_string()));
    assert_eq!(entries[0].detail["sent"], 1);
}

#[tokio::test]
async fn shutdown_drains_the_dispatcher() {
    let db = setup_db().await;
    let config = AlertConfig {
        queue_policy: QueuePolicy::RejectNew,
        worker_count: 1,
        queue_capacity: 1,
        ..Default::default()
    };
    let p = pipeline(db, RecordingSender::default(), config);
    p.processor.shutdown().await;
}

#[tokio::test]
async fn events_stay_unprocessed_until_claimed() {
    let db = setup_db().await;
    let p = pipeline(db.clone(), RecordingSender::default(), AlertConfig::default());
    p.ingestor
        .ingest(crossing(7, Uuid::new_v4(), Direction::Exit, 0))
        .await
        .unwrap();

    let events = SurrealEventRepository::new(db.clone());
    assert_eq!(events.list_unprocessed(10).await.unwrap().len(), 1);
    p.processor.process_next().await.unwrap();
    assert!(events.list_unprocessed(10).await.unwrap().is_empty());
}
