#![forbid(unsafe_code)]

use solgate_contracts::takeover::{BrandId, BrandTakeoverRecord, TakeoverBranding, DAY_MS};
use solgate_contracts::EpochMs;
use solgate_storage::file_store::FileRecordStore;
use solgate_storage::repo::{parse_takeover_payload, TakeoverRepo};
use solgate_storage::shared_profile::{FeedEvent, SharedProfile};
use solgate_storage::{RecordStore, StoreKey};

fn record(brand: &str, created_at: u64) -> BrandTakeoverRecord {
    BrandTakeoverRecord::v1(
        BrandId::new(brand).unwrap(),
        TakeoverBranding::default(),
        7,
        2,
        EpochMs(created_at),
        EpochMs(created_at + 7 * DAY_MS),
    )
    .unwrap()
}

#[test]
fn at_profile_01_writes_are_visible_to_every_context() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let tab_b = profile.open_context();
    assert_ne!(tab_a.id(), tab_b.id());

    tab_a.save_takeover_record(&record("acme", 10)).unwrap();
    assert_eq!(tab_b.load_takeover_record(), Some(record("acme", 10)));
}

#[test]
fn at_profile_02_writer_is_not_notified_of_its_own_write() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let tab_b = profile.open_context();
    let mut feed_a = tab_a.subscribe();
    let mut feed_b = tab_b.subscribe();

    tab_a.save_takeover_record(&record("acme", 10)).unwrap();

    assert!(feed_a.drain().changes.is_empty());
    let drained = feed_b.drain();
    assert_eq!(drained.changes.len(), 1);
    let change = &drained.changes[0];
    assert_eq!(change.key, StoreKey::TakeoverRecord.as_str());
    assert_eq!(change.origin, tab_a.id());
    let payload = change.new_raw.as_deref().expect("set carries a payload");
    assert_eq!(
        parse_takeover_payload(payload).unwrap(),
        record("acme", 10)
    );
}

#[test]
fn at_profile_03_unchanged_value_is_not_announced() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let tab_b = profile.open_context();
    let mut feed_b = tab_b.subscribe();

    tab_a.save_takeover_record(&record("acme", 10)).unwrap();
    tab_a.save_takeover_record(&record("acme", 10)).unwrap();
    assert_eq!(feed_b.drain().changes.len(), 1);
}

#[test]
fn at_profile_04_remove_is_announced_without_payload() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let tab_b = profile.open_context();
    tab_a.save_takeover_record(&record("acme", 10)).unwrap();
    let mut feed_b = tab_b.subscribe();

    tab_a.clear_owned_keys().unwrap();
    let drained = feed_b.drain();
    assert_eq!(drained.changes.len(), 1);
    assert_eq!(drained.changes[0].new_raw, None);
}

#[test]
fn at_profile_05_slow_subscriber_reports_lag() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let tab_b = profile.open_context();
    let mut feed_b = tab_b.subscribe();

    for i in 0..200u64 {
        tab_a
            .set_raw("solgate:scratch", format!("{i}"))
            .unwrap();
    }
    let drained = feed_b.drain();
    assert!(drained.lagged);
    assert!(!drained.changes.is_empty());
}

#[test]
fn at_profile_06_file_backed_profile_shares_document() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("solgate-profile-test-{suffix}"));
    let path = base.join("profile.json");

    let profile = SharedProfile::new(Box::new(FileRecordStore::for_path(path.clone())));
    let mut tab = profile.open_context();
    tab.save_takeover_record(&record("acme", 10)).unwrap();

    let other_process = FileRecordStore::for_path(path);
    assert_eq!(other_process.load_takeover_record(), Some(record("acme", 10)));
    std::fs::remove_dir_all(base).unwrap();
}

#[tokio::test]
async fn at_profile_07_recv_wakes_on_sibling_write_only() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let mut tab_b = profile.open_context();
    let mut feed_b = tab_b.subscribe();

    tab_b.save_takeover_record(&record("beta", 5)).unwrap();
    tab_a.save_takeover_record(&record("acme", 10)).unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), feed_b.recv())
        .await
        .unwrap();
    let FeedEvent::Change(change) = event else {
        panic!("expected a change, got {event:?}");
    };
    assert_eq!(change.origin, tab_a.id());
    assert_eq!(change.key, StoreKey::TakeoverRecord.as_str());
}
