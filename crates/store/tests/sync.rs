use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use store::{
    ChangeEvent, ChangeFeed, ChangeKind, Money, Phase, PurchaseDraft, PurchaseRecord, RemoteError,
    RemoteStore, StoreError, SyncStore,
};
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

/// Scripted outcome for one remote call: `started` fires when the call is
/// issued, the call then suspends until `gate` fires (when present) and
/// resolves with `outcome`. Calls without a script use the shared row set.
struct SelectScript {
    started: Option<oneshot::Sender<()>>,
    gate: Option<oneshot::Receiver<()>>,
    outcome: Result<Vec<PurchaseRecord>, RemoteError>,
}

struct DeleteScript {
    started: Option<oneshot::Sender<()>>,
    gate: Option<oneshot::Receiver<()>>,
    outcome: Result<(), RemoteError>,
}

#[derive(Default)]
struct MockRemote {
    rows: Mutex<Vec<PurchaseRecord>>,
    select_scripts: Mutex<VecDeque<SelectScript>>,
    delete_scripts: Mutex<VecDeque<DeleteScript>>,
    select_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MockRemote {
    fn with_rows(rows: Vec<PurchaseRecord>) -> Arc<Self> {
        let mock = Self::default();
        *mock.rows.lock().unwrap() = rows;
        Arc::new(mock)
    }

    fn set_rows(&self, rows: Vec<PurchaseRecord>) {
        *self.rows.lock().unwrap() = rows;
    }

    fn remove_row(&self, id: Uuid) {
        self.rows.lock().unwrap().retain(|p| p.id != id);
    }

    fn script_select(&self, script: SelectScript) {
        self.select_scripts.lock().unwrap().push_back(script);
    }

    fn script_delete(&self, script: DeleteScript) {
        self.delete_scripts.lock().unwrap().push_back(script);
    }

    fn select_count(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    fn insert_count(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    fn delete_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn select(&self, owner: Uuid) -> Result<Vec<PurchaseRecord>, RemoteError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.select_scripts.lock().unwrap().pop_front();
        if let Some(script) = script {
            if let Some(started) = script.started {
                let _ = started.send(());
            }
            if let Some(gate) = script.gate {
                let _ = gate.await;
            }
            return script.outcome;
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|p| p.owner == owner).cloned().collect())
    }

    async fn insert(
        &self,
        draft: PurchaseDraft,
        owner: Uuid,
    ) -> Result<PurchaseRecord, RemoteError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let created = PurchaseRecord {
            id: Uuid::new_v4(),
            name: draft.name().to_string(),
            price: draft.price(),
            date: draft.date(),
            created_at: Utc::now(),
            owner,
        };
        self.rows.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.delete_scripts.lock().unwrap().pop_front();
        if let Some(script) = script {
            if let Some(started) = script.started {
                let _ = started.send(());
            }
            if let Some(gate) = script.gate {
                let _ = gate.await;
            }
            script.outcome?;
        }
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|p| !(p.id == id && p.owner == owner));
        if rows.len() == before {
            return Err(RemoteError::NotFound);
        }
        Ok(())
    }
}

struct TestFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl TestFeed {
    fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    fn send(&self, kind: ChangeKind) {
        let _ = self.tx.send(ChangeEvent { kind });
    }
}

impl ChangeFeed for TestFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

fn day(year: i32, month: u32, dom: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, dom).unwrap()
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
}

fn record(
    name: &str,
    minor: i64,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    owner: Uuid,
) -> PurchaseRecord {
    PurchaseRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price: Money::new(minor),
        date,
        created_at,
        owner,
    }
}

async fn bound_store(mock: Arc<MockRemote>, user: Uuid) -> Arc<SyncStore> {
    let store = SyncStore::builder().remote(mock).build().unwrap();
    store.bind(user).await.unwrap();
    store
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

#[tokio::test]
async fn bind_loads_and_sorts_the_snapshot() {
    let user = Uuid::new_v4();
    let older = record("Lait", 900, day(2024, 5, 28), at(9), user);
    let early = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let late = record("Riz", 1200, day(2024, 6, 1), at(11), user);
    let mock = MockRemote::with_rows(vec![older.clone(), late.clone(), early.clone()]);

    let store = bound_store(mock.clone(), user).await;

    assert_eq!(
        *store.snapshot(),
        vec![late.clone(), early.clone(), older.clone()]
    );
    assert_eq!(store.phase(), Phase::Ready);
    assert_eq!(store.identity(), Some(user));
    assert_eq!(mock.select_count(), 1);
}

#[tokio::test]
async fn refresh_is_idempotent_without_intervening_writes() {
    let user = Uuid::new_v4();
    let rows = vec![
        record("Pain", 300, day(2024, 6, 1), at(8), user),
        record("Lait", 900, day(2024, 5, 28), at(9), user),
    ];
    let mock = MockRemote::with_rows(rows);
    let store = bound_store(mock, user).await;

    store.refresh().await.unwrap();
    let first = store.snapshot();
    store.refresh().await.unwrap();
    assert_eq!(first, store.snapshot());
}

#[tokio::test]
async fn refresh_without_identity_makes_no_remote_call() {
    let mock = MockRemote::with_rows(Vec::new());
    let store = SyncStore::builder().remote(mock.clone()).build().unwrap();

    store.refresh().await.unwrap();

    assert_eq!(mock.select_count(), 0);
    assert_eq!(store.phase(), Phase::Unbound);
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn insert_returns_the_stored_row_and_refetches() {
    let user = Uuid::new_v4();
    let mock = MockRemote::with_rows(Vec::new());
    let store = bound_store(mock.clone(), user).await;

    let created = store
        .insert("  Yaourt ", Money::new(450), day(2024, 6, 2))
        .await
        .unwrap();

    assert_eq!(created.name, "Yaourt");
    assert_eq!(created.owner, user);
    assert_eq!(mock.insert_count(), 1);
    assert_eq!(mock.select_count(), 2);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, created.id);
}

#[tokio::test]
async fn invalid_input_never_reaches_the_remote() {
    let user = Uuid::new_v4();
    let mock = MockRemote::with_rows(Vec::new());
    let store = bound_store(mock.clone(), user).await;

    let err = store
        .insert("   ", Money::ZERO, day(2024, 6, 2))
        .await
        .unwrap_err();

    match err {
        StoreError::Validation(issues) => {
            let fields: Vec<_> = issues.iter().map(|i| i.field).collect();
            assert_eq!(fields, vec!["name", "price"]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(mock.insert_count(), 0);
    assert_eq!(mock.select_count(), 1);
}

#[tokio::test]
async fn mutations_without_identity_make_no_remote_call() {
    let mock = MockRemote::with_rows(Vec::new());
    let store = SyncStore::builder().remote(mock.clone()).build().unwrap();

    let insert_err = store
        .insert("Pain", Money::new(300), day(2024, 6, 1))
        .await
        .unwrap_err();
    assert_eq!(insert_err, StoreError::Unauthorized);

    let delete_err = store.delete(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(delete_err, StoreError::Unauthorized);

    assert_eq!(mock.insert_count(), 0);
    assert_eq!(mock.delete_count(), 0);
}

#[tokio::test]
async fn deleting_an_unknown_id_fails_before_the_remote_call() {
    let user = Uuid::new_v4();
    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let mock = MockRemote::with_rows(vec![bread]);
    let store = bound_store(mock.clone(), user).await;

    let missing = Uuid::new_v4();
    let err = store.delete(missing).await.unwrap_err();

    assert_eq!(err, StoreError::NotFound(missing));
    assert_eq!(mock.delete_count(), 0);
    assert_eq!(store.snapshot().len(), 1);
}

#[tokio::test]
async fn delete_removes_locally_before_the_remote_confirms() {
    let user = Uuid::new_v4();
    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let mock = MockRemote::with_rows(vec![bread.clone()]);
    let store = bound_store(mock.clone(), user).await;

    let (started_tx, started_rx) = oneshot::channel();
    let (gate_tx, gate_rx) = oneshot::channel();
    mock.script_delete(DeleteScript {
        started: Some(started_tx),
        gate: Some(gate_rx),
        outcome: Ok(()),
    });

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.delete(bread.id).await }
    });

    started_rx.await.unwrap();
    assert!(store.snapshot().is_empty());

    gate_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    assert!(store.snapshot().is_empty());
    assert_eq!(mock.select_count(), 2);
}

#[tokio::test]
async fn failed_delete_restores_the_snapshot_captured_before_removal() {
    let user = Uuid::new_v4();
    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let mock = MockRemote::with_rows(vec![bread.clone()]);
    let store = bound_store(mock.clone(), user).await;

    let (started_tx, started_rx) = oneshot::channel();
    let (gate_tx, gate_rx) = oneshot::channel();
    mock.script_delete(DeleteScript {
        started: Some(started_tx),
        gate: Some(gate_rx),
        outcome: Err(RemoteError::Transport("timeout".to_string())),
    });

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.delete(bread.id).await }
    });

    started_rx.await.unwrap();
    assert!(store.snapshot().is_empty());

    // Another writer's insert lands while the delete is in flight.
    let juice = record("Jus", 700, day(2024, 6, 2), at(10), user);
    mock.set_rows(vec![bread.clone(), juice]);
    store.refresh().await.unwrap();
    assert_eq!(store.snapshot().len(), 2);

    gate_tx.send(()).unwrap();
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        StoreError::Remote(RemoteError::Transport("timeout".to_string()))
    );

    // Exactly the pre-delete snapshot, not the then-current one.
    assert_eq!(*store.snapshot(), vec![bread]);
}

#[tokio::test]
async fn delete_treats_a_missing_remote_row_as_already_deleted() {
    let user = Uuid::new_v4();
    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let mock = MockRemote::with_rows(vec![bread.clone()]);
    let store = bound_store(mock.clone(), user).await;

    // Another client deleted the row first.
    mock.remove_row(bread.id);

    store.delete(bread.id).await.unwrap();

    assert!(store.snapshot().is_empty());
    assert_eq!(mock.delete_count(), 1);
}

#[tokio::test]
async fn latest_refresh_wins_when_responses_arrive_out_of_order() {
    let user = Uuid::new_v4();
    let stale = vec![record("Ancien", 100, day(2024, 5, 1), at(8), user)];
    let fresh = vec![record("Nouveau", 200, day(2024, 6, 1), at(9), user)];
    let mock = MockRemote::with_rows(Vec::new());
    let store = bound_store(mock.clone(), user).await;

    let (started_tx, started_rx) = oneshot::channel();
    let (gate_tx, gate_rx) = oneshot::channel();
    mock.script_select(SelectScript {
        started: Some(started_tx),
        gate: Some(gate_rx),
        outcome: Ok(stale),
    });
    mock.script_select(SelectScript {
        started: None,
        gate: None,
        outcome: Ok(fresh.clone()),
    });

    let slow = tokio::spawn({
        let store = store.clone();
        async move { store.refresh().await }
    });

    started_rx.await.unwrap();
    store.refresh().await.unwrap();
    assert_eq!(*store.snapshot(), fresh);

    // The older request resolves last; its response must be dropped.
    gate_tx.send(()).unwrap();
    slow.await.unwrap().unwrap();
    assert_eq!(*store.snapshot(), fresh);
}

#[tokio::test]
async fn unbind_clears_the_snapshot_and_discards_late_responses() {
    let user = Uuid::new_v4();
    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let mock = MockRemote::with_rows(vec![bread.clone()]);
    let store = bound_store(mock.clone(), user).await;
    assert_eq!(store.snapshot().len(), 1);

    let (started_tx, started_rx) = oneshot::channel();
    let (gate_tx, gate_rx) = oneshot::channel();
    mock.script_select(SelectScript {
        started: Some(started_tx),
        gate: Some(gate_rx),
        outcome: Ok(vec![bread]),
    });

    let task = tokio::spawn({
        let store = store.clone();
        async move { store.refresh().await }
    });

    started_rx.await.unwrap();
    store.unbind();
    assert!(store.snapshot().is_empty());
    assert_eq!(store.phase(), Phase::Unbound);
    assert_eq!(store.identity(), None);

    gate_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    // The suspended result never reaches the torn-down session.
    assert!(store.snapshot().is_empty());
    assert_eq!(store.phase(), Phase::Unbound);

    store.unbind();
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn change_notices_trigger_a_refetch_while_bound() {
    let user = Uuid::new_v4();
    let mock = MockRemote::with_rows(Vec::new());
    let feed = TestFeed::new(8);
    let store = SyncStore::builder()
        .remote(mock.clone())
        .feed(feed.clone())
        .build()
        .unwrap();
    store.bind(user).await.unwrap();
    assert_eq!(mock.select_count(), 1);

    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    mock.set_rows(vec![bread.clone()]);
    feed.send(ChangeKind::Insert);

    assert!(wait_until(|| mock.select_count() >= 2).await);
    assert!(wait_until(|| store.snapshot().len() == 1).await);
    assert_eq!(store.snapshot()[0].id, bread.id);
}

#[tokio::test]
async fn unbind_stops_the_change_listener() {
    let user = Uuid::new_v4();
    let mock = MockRemote::with_rows(Vec::new());
    let feed = TestFeed::new(8);
    let store = SyncStore::builder()
        .remote(mock.clone())
        .feed(feed.clone())
        .build()
        .unwrap();
    store.bind(user).await.unwrap();
    assert_eq!(mock.select_count(), 1);

    store.unbind();
    feed.send(ChangeKind::Insert);
    feed.send(ChangeKind::Delete);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.select_count(), 1);
}

#[tokio::test]
async fn a_lagging_feed_still_ends_in_a_refetch() {
    let user = Uuid::new_v4();
    let mock = MockRemote::with_rows(Vec::new());
    let feed = TestFeed::new(1);
    let store = SyncStore::builder()
        .remote(mock.clone())
        .feed(feed.clone())
        .build()
        .unwrap();
    store.bind(user).await.unwrap();

    // Hold the first notification-triggered refetch open so further notices
    // overflow the single-slot subscription.
    let (started_tx, started_rx) = oneshot::channel();
    let (gate_tx, gate_rx) = oneshot::channel();
    mock.script_select(SelectScript {
        started: Some(started_tx),
        gate: Some(gate_rx),
        outcome: Ok(Vec::new()),
    });

    feed.send(ChangeKind::Insert);
    started_rx.await.unwrap();
    feed.send(ChangeKind::Insert);
    feed.send(ChangeKind::Insert);

    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    mock.set_rows(vec![bread]);
    gate_tx.send(()).unwrap();

    assert!(wait_until(|| mock.select_count() >= 3).await);
    assert!(wait_until(|| store.snapshot().len() == 1).await);
}

#[tokio::test]
async fn remote_failure_keeps_the_previous_snapshot() {
    let user = Uuid::new_v4();
    let bread = record("Pain", 300, day(2024, 6, 1), at(8), user);
    let mock = MockRemote::with_rows(vec![bread.clone()]);
    let store = bound_store(mock.clone(), user).await;

    mock.script_select(SelectScript {
        started: None,
        gate: None,
        outcome: Err(RemoteError::Transport("boom".to_string())),
    });

    let err = store.refresh().await.unwrap_err();
    assert_eq!(
        err,
        StoreError::Remote(RemoteError::Transport("boom".to_string()))
    );
    assert_eq!(*store.snapshot(), vec![bread]);
    assert_eq!(store.phase(), Phase::Ready);

    // The failure does not block the next attempt.
    store.refresh().await.unwrap();
    assert_eq!(store.snapshot().len(), 1);
}
