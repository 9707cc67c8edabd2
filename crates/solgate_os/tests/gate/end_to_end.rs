#![forbid(unsafe_code)]

use solgate_contracts::gate::{GateMode, RenderKind};
use solgate_contracts::takeover::DAY_MS;
use solgate_contracts::EpochMs;
use solgate_engines::gate::reason_codes;
use solgate_os::bootstrap::BootstrapOutcome;
use solgate_os::gate::{DemoGate, GateConfig};
use solgate_os::link::{derive_link_id, parse_page_url};
use solgate_os::session::TabSession;
use solgate_os::sync::{PollChangeSource, SyncConfig};
use solgate_storage::file_store::FileRecordStore;
use solgate_storage::repo::TakeoverRepo;
use solgate_storage::MemoryRecordStore;

const T0: u64 = 1_700_000_000_000;
const PREVIEW: &str = "https://solar.example.com/quote?demo=1&company=acme&days=7";

fn memory_session() -> TabSession {
    TabSession::with_store(
        Box::new(MemoryRecordStore::new()),
        vec![Box::new(PollChangeSource::new())],
        GateConfig::mvp_v1(),
        SyncConfig::mvp_v1(),
        EpochMs(T0),
    )
}

#[test]
fn at_gate_e2e_01_fresh_link_walks_active_active_locked() {
    let gate = DemoGate::new(GateConfig::mvp_v1());
    let mut store = MemoryRecordStore::new();
    let x = derive_link_id(&parse_page_url("/quote?demo=1&company=acme").unwrap()).unwrap();

    let first = gate.evaluate(&mut store, &x, RenderKind::NewView, EpochMs(T0));
    let second = gate.evaluate(&mut store, &x, RenderKind::NewView, EpochMs(T0 + 1));
    let third = gate.evaluate(&mut store, &x, RenderKind::NewView, EpochMs(T0 + 2));
    assert_eq!((first.mode, first.remaining), (GateMode::Active, 1));
    assert_eq!((second.mode, second.remaining), (GateMode::Active, 0));
    assert_eq!(third.mode, GateMode::Locked);
    assert_eq!(third.reason_code, reason_codes::GATE_LOCKED_QUOTA_EXHAUSTED);

    for i in 0..5 {
        let later = gate.evaluate(&mut store, &x, RenderKind::NewView, EpochMs(T0 + 10 + i));
        assert_eq!(later.mode, GateMode::Locked);
    }
}

#[test]
fn at_gate_e2e_02_deadline_is_exclusive_at_one_millisecond_before() {
    let mut tab = memory_session();
    let page = tab.open_page(PREVIEW, EpochMs(T0)).unwrap();
    let deadline = T0 + 7 * DAY_MS;

    let before = tab.rerender(&page.link_id, EpochMs(deadline - 1));
    assert_eq!(before.mode, GateMode::Active);
    assert_eq!(before.remaining_time_ms, Some(1));

    let at = tab.rerender(&page.link_id, EpochMs(deadline));
    assert_eq!(at.mode, GateMode::Locked);
    assert_eq!(at.remaining, 1);
    assert_eq!(at.reason_code, reason_codes::GATE_LOCKED_PREVIEW_EXPIRED);
}

#[test]
fn at_gate_e2e_03_views_do_not_extend_the_deadline() {
    let mut tab = memory_session();
    let link_id = tab.open_page(PREVIEW, EpochMs(T0)).unwrap().link_id;
    // A second view late in the window bumps createdAtMs on the projection.
    let late = T0 + 6 * DAY_MS;
    let second = tab.open_page(PREVIEW, EpochMs(late)).unwrap();
    assert_eq!(second.decision.unwrap().mode, GateMode::Active);
    assert_eq!(tab.current_record().unwrap().created_at_ms, EpochMs(late));

    let expired = tab.rerender(&link_id, EpochMs(T0 + 7 * DAY_MS));
    assert_eq!(expired.mode, GateMode::Locked);
}

#[test]
fn at_gate_e2e_04_expired_preview_locks_even_with_runs_left() {
    let mut tab = memory_session();
    let link_id = tab.open_page(PREVIEW, EpochMs(T0)).unwrap().link_id;
    let page = tab.open_page(PREVIEW, EpochMs(T0 + 8 * DAY_MS)).unwrap();
    let decision = page.decision.unwrap();
    assert_eq!(decision.mode, GateMode::Locked);
    assert_eq!(decision.remaining, 1);
    assert_eq!(tab.remaining(&link_id), 1);
}

#[test]
fn at_gate_e2e_05_locked_link_stays_locked_across_process_restarts() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("solgate-gate-e2e-{suffix}"));
    let path = base.join("profile.json");

    let open = |now: u64| {
        TabSession::with_store(
            Box::new(FileRecordStore::for_path(path.clone())),
            vec![Box::new(PollChangeSource::new())],
            GateConfig::mvp_v1(),
            SyncConfig::mvp_v1(),
            EpochMs(now),
        )
    };

    for i in 0..3 {
        let mut tab = open(T0 + i);
        tab.open_page(PREVIEW, EpochMs(T0 + i)).unwrap();
    }
    let mut tab = open(T0 + 100);
    let page = tab.open_page(PREVIEW, EpochMs(T0 + 100)).unwrap();
    assert_eq!(page.decision.unwrap().mode, GateMode::Locked);

    let store = FileRecordStore::for_path(path);
    assert_eq!(store.load_takeover_record().unwrap().runs_remaining, -1);
    std::fs::remove_dir_all(base).unwrap();
}

#[test]
fn at_gate_e2e_06_tracking_params_share_quota() {
    let mut tab = memory_session();
    tab.open_page("/quote?demo=1&company=acme", EpochMs(T0)).unwrap();
    tab.open_page("/quote?company=acme&demo=1&utm_source=email", EpochMs(T0 + 1))
        .unwrap();
    let third = tab
        .open_page("/quote?demo=1&company=acme&fbclid=zz", EpochMs(T0 + 2))
        .unwrap();
    assert_eq!(third.decision.unwrap().mode, GateMode::Locked);
}

#[test]
fn at_gate_e2e_07_switching_brands_does_not_unlock_a_spent_link() {
    let mut tab = memory_session();
    let acme = "/quote?demo=1&company=acme";
    for i in 0..4 {
        tab.open_page(acme, EpochMs(T0 + i)).unwrap();
    }
    tab.open_page("/quote?demo=1&company=beta", EpochMs(T0 + DAY_MS))
        .unwrap();

    let back = tab.open_page(acme, EpochMs(T0 + 6 * DAY_MS)).unwrap();
    assert_eq!(back.bootstrap, BootstrapOutcome::Created);
    let decision = back.decision.unwrap();
    assert_eq!(decision.mode, GateMode::Locked);
    assert_eq!(decision.reason_code, reason_codes::GATE_LOCKED_QUOTA_EXHAUSTED);
    let record = tab.current_record().unwrap();
    assert_eq!(record.brand_id.as_str(), "acme");
    assert_eq!(record.expires_at_ms, Some(EpochMs(T0 + 7 * DAY_MS)));
}

#[test]
fn at_gate_e2e_08_returning_brand_keeps_its_original_deadline() {
    let mut tab = memory_session();
    let link_id = tab.open_page(PREVIEW, EpochMs(T0)).unwrap().link_id;
    tab.open_page("/quote?demo=1&company=beta", EpochMs(T0 + DAY_MS))
        .unwrap();

    let back = tab.open_page(PREVIEW, EpochMs(T0 + 6 * DAY_MS)).unwrap();
    assert_eq!(back.decision.unwrap().mode, GateMode::Active);
    assert_eq!(tab.remaining(&link_id), 0);

    let expired = tab.rerender(&link_id, EpochMs(T0 + 7 * DAY_MS));
    assert_eq!(expired.mode, GateMode::Locked);
    assert_eq!(expired.reason_code, reason_codes::GATE_LOCKED_PREVIEW_EXPIRED);
}

#[test]
fn at_gate_e2e_09_reset_all_lifts_the_gate_for_every_render() {
    let mut tab = memory_session();
    let link_id = tab.open_page(PREVIEW, EpochMs(T0)).unwrap().link_id;
    tab.open_page(PREVIEW, EpochMs(T0 + 1)).unwrap();
    tab.open_page(PREVIEW, EpochMs(T0 + 2)).unwrap();
    assert_eq!(tab.rerender(&link_id, EpochMs(T0 + 5)).mode, GateMode::Locked);

    let hatch = tab.reset_all(EpochMs(T0 + 10)).unwrap();
    assert!(hatch.is_unlimited());
    for i in 0..3 {
        let decision = tab.evaluate(&link_id, RenderKind::NewView, EpochMs(T0 + 20 + i));
        assert_eq!(decision.mode, GateMode::Active);
        assert_eq!(decision.reason_code, reason_codes::GATE_OK_UNLIMITED_OVERRIDE);
    }
    assert!(tab.current_record().unwrap().is_unlimited());
    assert_eq!(tab.remaining(&link_id), 2);
}
