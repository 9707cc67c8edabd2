#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use solgate_contracts::gate::{GateDecision, RenderKind};
use solgate_contracts::takeover::{BrandTakeoverRecord, LinkId};
use solgate_contracts::EpochMs;
use solgate_storage::shared_profile::{ChangeFeed, ProfileContext, SharedProfile};
use solgate_storage::{RecordStore, StoreError};

use crate::bootstrap::{BootstrapOutcome, TakeoverBootstrap};
use crate::gate::{DemoGate, GateConfig};
use crate::link::{derive_link_id, parse_page_url};
use crate::sync::{
    CrossTabSynchronizer, PollChangeSource, PushChangeSource, RecordChangeSource, SyncConfig,
    Visibility,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid page url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("link identity rejected: {0}")]
    Contract(#[from] solgate_contracts::ContractViolation),
}

/// Everything rendering code needs for one page view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRender {
    pub link_id: LinkId,
    pub bootstrap: BootstrapOutcome,
    /// `None` for pages that are not demo previews.
    pub decision: Option<GateDecision>,
    pub presentation: BTreeMap<&'static str, String>,
}

/// One execution context (tab) of a visitor profile: its store handle, the
/// gate and the synchronizer that keeps its view convergent with siblings.
pub struct TabSession {
    store: Box<dyn RecordStore>,
    gate: DemoGate,
    bootstrap: TakeoverBootstrap,
    sync: CrossTabSynchronizer,
    /// Set for sessions attached to a shared profile.
    context: Option<ProfileContext>,
}

impl std::fmt::Debug for TabSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabSession")
            .field("gate", &self.gate)
            .field("sync", &self.sync)
            .finish()
    }
}

impl TabSession {
    /// Open a new context on `profile`, subscribed to its siblings' writes.
    pub fn attach(
        profile: &SharedProfile,
        gate_config: GateConfig,
        sync_config: SyncConfig,
        now: EpochMs,
    ) -> Self {
        let context = profile.open_context();
        let sources: Vec<Box<dyn RecordChangeSource>> = vec![
            Box::new(PushChangeSource::new(context.subscribe())),
            Box::new(PollChangeSource::new()),
        ];
        let mut session = Self::with_store(
            Box::new(context.clone()),
            sources,
            gate_config,
            sync_config,
            now,
        );
        session.context = Some(context);
        session
    }

    pub fn with_store(
        store: Box<dyn RecordStore>,
        sources: Vec<Box<dyn RecordChangeSource>>,
        gate_config: GateConfig,
        sync_config: SyncConfig,
        now: EpochMs,
    ) -> Self {
        let mut sync = CrossTabSynchronizer::new(sync_config, sources);
        sync.init(store.as_ref(), now);
        Self {
            store,
            gate: DemoGate::new(gate_config),
            bootstrap: TakeoverBootstrap::new(gate_config),
            sync,
            context: None,
        }
    }

    /// A genuine page view: bootstrap from the URL, then count one view when
    /// the page is a demo preview.
    pub fn open_page(&mut self, raw_url: &str, now: EpochMs) -> Result<PageRender, SessionError> {
        let url = parse_page_url(raw_url)?;
        let link_id = derive_link_id(&url)?;
        self.sync.pump(self.store.as_ref());

        let bootstrap = match self.bootstrap.observe(
            self.store.as_mut(),
            self.gate.ledger(),
            &url,
            &link_id,
            now,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    link_id = link_id.as_str(),
                    error = %err,
                    "takeover bootstrap failed; gating with what the store holds"
                );
                BootstrapOutcome::Created
            }
        };
        if bootstrap == BootstrapOutcome::NotDemo {
            return Ok(PageRender {
                link_id,
                bootstrap,
                decision: None,
                presentation: self.presentation(),
            });
        }

        let decision = self.evaluate(&link_id, RenderKind::NewView, now);
        Ok(PageRender {
            link_id,
            bootstrap,
            decision: Some(decision),
            presentation: self.presentation(),
        })
    }

    /// Repaint of a view already counted.
    pub fn rerender(&mut self, link_id: &LinkId, now: EpochMs) -> GateDecision {
        self.evaluate(link_id, RenderKind::ReRender, now)
    }

    pub fn evaluate(&mut self, link_id: &LinkId, render: RenderKind, now: EpochMs) -> GateDecision {
        let decision = self.gate.evaluate(self.store.as_mut(), link_id, render, now);
        // Own writes are not announced back to this context.
        self.sync.pull(self.store.as_ref());
        decision
    }

    /// A fresh feed of sibling writes, for drivers that want to wake as soon
    /// as one lands. `None` when the session is not on a shared profile.
    pub fn change_feed(&self) -> Option<ChangeFeed> {
        self.context.as_ref().map(ProfileContext::subscribe)
    }

    pub fn pump_notifications(&mut self) -> usize {
        self.sync.pump(self.store.as_ref())
    }

    pub fn heartbeat(&mut self, now: EpochMs) -> bool {
        self.sync.heartbeat(self.store.as_mut(), now)
    }

    pub fn heartbeat_due(&self, now: EpochMs) -> bool {
        self.sync.heartbeat_due(now)
    }

    pub fn set_visibility(&mut self, visibility: Visibility, now: EpochMs) {
        self.sync
            .on_visibility_change(visibility, self.store.as_mut(), now);
    }

    pub fn force_sync(&mut self) -> Result<(), StoreError> {
        self.sync.force_sync(self.store.as_mut())
    }

    pub fn reset_all(&mut self, now: EpochMs) -> Result<BrandTakeoverRecord, StoreError> {
        self.sync.reset_all(self.store.as_mut(), now)
    }

    pub fn stop(&mut self) {
        self.sync.stop();
    }

    pub fn is_running(&self) -> bool {
        self.sync.is_running()
    }

    pub fn current_record(&self) -> Option<&BrandTakeoverRecord> {
        self.sync.local_record()
    }

    pub fn remaining(&self, link_id: &LinkId) -> i64 {
        self.gate
            .ledger()
            .remaining(self.store.as_ref(), link_id)
            .max(0)
    }

    pub fn synchronizer(&self) -> &CrossTabSynchronizer {
        &self.sync
    }

    fn presentation(&self) -> BTreeMap<&'static str, String> {
        self.sync
            .local_record()
            .filter(|record| record.is_active_takeover())
            .map(BrandTakeoverRecord::presentation_vars)
            .unwrap_or_default()
    }
}
