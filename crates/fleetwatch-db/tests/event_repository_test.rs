//! Integration tests for event ingestion and the claim lifecycle using
//! in-memory SurrealDB.

use chrono::{Duration, TimeZone, Utc};
use fleetwatch_core::dedupe;
use fleetwatch_core::error::FleetError;
use fleetwatch_core::models::event::{Direction, IngestOutcome, NewEvent, RawCrossing};
use fleetwatch_core::models::geofence::GeoPoint;
use fleetwatch_core::repository::EventRepository;
use fleetwatch_db::repository::SurrealEventRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    fleetwatch_db::run_migrations(&db).await.unwrap();
    db
}

fn crossing(vehicle: u128, direction: Direction) -> RawCrossing {
    RawCrossing {
        vehicle_id: Uuid::from_u128(vehicle),
        geofence_id: Uuid::from_u128(1000),
        direction,
        location: GeoPoint::new(19.43, -99.13),
        occurred_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 5).unwrap(),
    }
}

fn new_event(crossing: RawCrossing) -> NewEvent {
    let dedupe_key = dedupe::dedupe_key(&crossing, 60);
    NewEvent {
        id: dedupe::event_id(&dedupe_key),
        crossing,
        dedupe_key,
    }
}

#[tokio::test]
async fn insert_then_duplicate() {
    let repo = SurrealEventRepository::new(setup().await);
    let event = new_event(crossing(1, Direction::Entry));

    let first = repo.insert(event.clone()).await.unwrap();
    let IngestOutcome::Accepted(stored) = first else {
        panic!("first insert should be accepted");
    };
    assert!(!stored.processed);
    assert_eq!(stored.direction, Direction::Entry);
    assert_eq!(stored.location, GeoPoint::new(19.43, -99.13));

    let second = repo.insert(event).await.unwrap();
    match second {
        IngestOutcome::Duplicate { event_id, .. } => assert_eq!(event_id, stored.id),
        other => panic!("expected duplicate, got {other:?}"),
    }
}

#[tokio::test]
async fn opposite_direction_is_a_distinct_event() {
    let repo = SurrealEventRepository::new(setup().await);

    let entry = repo.insert(new_event(crossing(1, Direction::Entry))).await.unwrap();
    let exit = repo.insert(new_event(crossing(1, Direction::Exit))).await.unwrap();
    assert!(entry.is_accepted());
    assert!(exit.is_accepted());
    assert_ne!(entry.event_id(), exit.event_id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_accept_exactly_one() {
    let db = setup().await;
    let event = new_event(crossing(9, Direction::Exit));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = SurrealEventRepository::new(db.clone());
        let event = event.clone();
        handles.push(tokio::spawn(async move { repo.insert(event).await }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_accepted() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    let repo = SurrealEventRepository::new(db);
    assert_eq!(repo.list_unprocessed(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn claim_complete_lifecycle() {
    let repo = SurrealEventRepository::new(setup().await);
    let id = repo
        .insert(new_event(crossing(1, Direction::Entry)))
        .await
        .unwrap()
        .event_id();

    let claimed = repo.claim_next().await.unwrap().expect("one event to claim");
    assert_eq!(claimed.id, id);
    assert!(claimed.processed);
    assert!(claimed.claimed_at.is_some());

    // Nothing else is claimable.
    assert!(repo.claim_next().await.unwrap().is_none());

    repo.complete(id).await.unwrap();
    let done = repo.get_by_id(id).await.unwrap();
    assert!(done.completed_at.is_some());

    // A completed event is not released.
    repo.release(id).await.unwrap();
    assert!(repo.get_by_id(id).await.unwrap().processed);
}

#[tokio::test]
async fn released_event_can_be_claimed_again() {
    let repo = SurrealEventRepository::new(setup().await);
    let id = repo
        .insert(new_event(crossing(2, Direction::Entry)))
        .await
        .unwrap()
        .event_id();

    repo.claim_next().await.unwrap().unwrap();
    repo.release(id).await.unwrap();

    let reclaimed = repo.claim_next().await.unwrap().unwrap();
    assert_eq!(reclaimed.id, id);
}

#[tokio::test]
async fn complete_unclaimed_event_is_not_found() {
    let repo = SurrealEventRepository::new(setup().await);
    let id = repo
        .insert(new_event(crossing(3, Direction::Entry)))
        .await
        .unwrap()
        .event_id();

    assert!(matches!(
        repo.complete(id).await,
        Err(FleetError::NotFound { .. })
    ));
}

#[tokio::test]
async fn stale_claims_are_released() {
    let repo = SurrealEventRepository::new(setup().await);
    let id = repo
        .insert(new_event(crossing(4, Direction::Exit)))
        .await
        .unwrap()
        .event_id();
    repo.claim_next().await.unwrap().unwrap();

    // A cutoff in the past leaves the fresh claim alone.
    let kept = repo
        .release_stale_claims(Utc::now() - Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(kept, 0);

    let released = repo
        .release_stale_claims(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(released, 1);
    assert!(!repo.get_by_id(id).await.unwrap().processed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_share_an_event() {
    let db = setup().await;
    let repo = SurrealEventRepository::new(db.clone());
    for vehicle in 0..6 {
        repo.insert(new_event(crossing(100 + vehicle, Direction::Entry)))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = SurrealEventRepository::new(db.clone());
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(event) = repo.claim_next().await.unwrap() {
                claimed.push(event.id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    let before = all.len();
    all.dedup();
    assert_eq!(before, all.len(), "an event was claimed twice");
    assert_eq!(all.len(), 6);
}
