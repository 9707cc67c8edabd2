#![forbid(unsafe_code)]

use solgate_contracts::gate::GateMode;
use solgate_contracts::takeover::{BrandId, BrandTakeoverRecord, TakeoverBranding, DAY_MS};
use solgate_contracts::EpochMs;
use solgate_os::gate::GateConfig;
use solgate_os::ledger::QuotaLedger;
use solgate_os::session::TabSession;
use solgate_os::sync::{
    CrossTabSynchronizer, MergeOutcome, PushChangeSource, SyncConfig, Visibility,
    DEFAULT_HEARTBEAT_MS,
};
use solgate_engines::quota::QuotaConfig;
use solgate_storage::repo::TakeoverRepo;
use solgate_storage::shared_profile::SharedProfile;
use solgate_storage::RecordStore;

const T0: u64 = 1_700_000_000_000;
const PREVIEW: &str = "/quote?demo=1&company=acme";

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

fn tab(profile: &SharedProfile) -> TabSession {
    TabSession::attach(profile, GateConfig::mvp_v1(), SyncConfig::mvp_v1(), EpochMs(T0))
}

#[test]
fn at_cross_tab_01_older_notification_never_overwrites_newer_local() {
    let profile = SharedProfile::in_memory();
    let context = profile.open_context();
    let mut sync = CrossTabSynchronizer::new(
        SyncConfig::mvp_v1(),
        vec![Box::new(PushChangeSource::new(context.subscribe()))],
    );
    sync.init(&context, EpochMs(T0));
    assert_eq!(sync.merge(record("a", 100)), MergeOutcome::Accepted);

    let older = serde_json::to_string(&record("b", 50)).unwrap();
    assert_eq!(sync.on_change_notification(&older), MergeOutcome::KeptLocal);
    assert_eq!(sync.local_record().unwrap().brand_id.as_str(), "a");
}

#[test]
fn at_cross_tab_02_takeover_created_in_one_tab_reaches_another() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    let mut tab_b = tab(&profile);

    tab_a.open_page(PREVIEW, EpochMs(T0 + 1)).unwrap();
    assert!(tab_b.current_record().is_none());
    assert!(tab_b.pump_notifications() >= 1);
    let seen = tab_b.current_record().unwrap();
    assert_eq!(seen.brand_id.as_str(), "acme");
    assert_eq!(seen, tab_a.current_record().unwrap());
}

#[test]
fn at_cross_tab_03_quota_is_shared_across_tabs() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    let mut tab_b = tab(&profile);

    let first = tab_a.open_page(PREVIEW, EpochMs(T0 + 1)).unwrap();
    assert_eq!(first.decision.unwrap().remaining, 1);
    let second = tab_b.open_page(PREVIEW, EpochMs(T0 + 2)).unwrap();
    assert_eq!(second.decision.unwrap().remaining, 0);
    let third = tab_a.open_page(PREVIEW, EpochMs(T0 + 3)).unwrap();
    assert_eq!(third.decision.unwrap().mode, GateMode::Locked);

    tab_b.pump_notifications();
    assert_eq!(tab_b.current_record().unwrap().runs_remaining, -1);
}

#[test]
fn at_cross_tab_04_heartbeat_restores_a_wiped_record() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    tab_a.open_page(PREVIEW, EpochMs(T0 + 1)).unwrap();
    let held = tab_a.current_record().unwrap().clone();

    let mut outsider = profile.open_context();
    outsider
        .remove(solgate_storage::StoreKey::TakeoverRecord.as_str())
        .unwrap();
    assert!(outsider.load_takeover_record().is_none());

    assert!(tab_a.heartbeat(EpochMs(T0 + DEFAULT_HEARTBEAT_MS)));
    assert_eq!(outsider.load_takeover_record(), Some(held));
}

#[test]
fn at_cross_tab_05_reset_all_propagates_escape_hatch() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    let mut tab_b = tab(&profile);
    for i in 0..3 {
        tab_a.open_page(PREVIEW, EpochMs(T0 + i)).unwrap();
    }
    tab_b.pump_notifications();

    let hatch = tab_b.reset_all(EpochMs(T0 + 10)).unwrap();
    tab_a.pump_notifications();
    assert_eq!(tab_a.current_record(), Some(&hatch));

    let page = tab_a.open_page("/pricing", EpochMs(T0 + 11)).unwrap();
    assert!(page.presentation.is_empty());
}

#[test]
fn at_cross_tab_06_hidden_tab_catches_up_when_visible() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    let mut tab_b = tab(&profile);
    tab_b.set_visibility(Visibility::Hidden, EpochMs(T0));
    tab_a.open_page(PREVIEW, EpochMs(T0 + 1)).unwrap();

    tab_b.set_visibility(Visibility::Visible, EpochMs(T0 + 2));
    assert_eq!(tab_b.current_record(), tab_a.current_record());
}

#[test]
fn at_cross_tab_07_lagged_feed_falls_back_to_store_read() {
    let profile = SharedProfile::in_memory();
    let mut tab_b = tab(&profile);
    let mut writer = profile.open_context();
    for i in 0..200u64 {
        writer.save_takeover_record(&record("acme", T0 + i)).unwrap();
    }
    tab_b.pump_notifications();
    assert_eq!(
        tab_b.current_record().unwrap().created_at_ms,
        EpochMs(T0 + 199)
    );
}

#[test]
fn at_cross_tab_08_racing_tabs_never_leave_the_counter_at_one() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = profile.open_context();
    let mut tab_b = profile.open_context();
    let ledger = QuotaLedger::new(QuotaConfig::mvp_v1());
    let link = solgate_contracts::takeover::LinkId::new("lnk_race").unwrap();
    ledger.decrement(&mut tab_a, &link).unwrap();

    let observed_a = ledger.remaining(&tab_a, &link);
    let observed_b = ledger.remaining(&tab_b, &link);
    ledger.commit_decrement(&mut tab_a, &link, observed_a).unwrap();
    ledger.commit_decrement(&mut tab_b, &link, observed_b).unwrap();
    let after_race = ledger.remaining(&tab_a, &link);
    assert!(after_race == 0 || after_race == -1);
    assert_ne!(after_race, 1);

    // Once the writes are ordered, the next view observes the earlier one.
    ledger.decrement(&mut tab_b, &link).unwrap();
    assert_eq!(ledger.remaining(&tab_a, &link), -1);
}

#[test]
fn at_cross_tab_09_stopped_tab_ignores_changes() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    let mut tab_b = tab(&profile);
    tab_b.stop();
    assert!(!tab_b.is_running());
    tab_a.open_page(PREVIEW, EpochMs(T0 + 1)).unwrap();
    assert_eq!(tab_b.pump_notifications(), 0);
    assert!(!tab_b.heartbeat(EpochMs(T0 + 10 * DEFAULT_HEARTBEAT_MS)));
    assert!(tab_b.current_record().is_none());
}

#[test]
fn at_cross_tab_10_other_brand_in_sibling_tab_does_not_unlock() {
    let profile = SharedProfile::in_memory();
    let mut tab_a = tab(&profile);
    let mut tab_b = tab(&profile);
    for i in 0..3 {
        tab_a.open_page(PREVIEW, EpochMs(T0 + i)).unwrap();
    }
    tab_b
        .open_page("/quote?demo=1&company=beta", EpochMs(T0 + DAY_MS))
        .unwrap();
    tab_a.pump_notifications();
    assert_eq!(tab_a.current_record().unwrap().brand_id.as_str(), "beta");

    let back = tab_a.open_page(PREVIEW, EpochMs(T0 + 2 * DAY_MS)).unwrap();
    assert_eq!(back.decision.unwrap().mode, GateMode::Locked);
    tab_b.pump_notifications();
    let record = tab_b.current_record().unwrap();
    assert_eq!(record.brand_id.as_str(), "acme");
    assert_eq!(record.expires_at_ms, Some(EpochMs(T0 + 7 * DAY_MS)));
}
