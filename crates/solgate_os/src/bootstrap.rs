#![forbid(unsafe_code)]

use solgate_contracts::takeover::{
    is_hex_color, BrandId, BrandTakeoverRecord, LinkId, TakeoverBranding, DEFAULT_PRIMARY_COLOR,
    MAX_EXPIRE_DAYS, MIN_EXPIRE_DAYS,
};
use solgate_contracts::{ContractViolation, EpochMs};
use solgate_engines::expiry::ExpiryClock;
use solgate_storage::repo::TakeoverRepo;
use solgate_storage::{RecordStore, StoreError};
use url::Url;

use crate::gate::{takeover_deadline, GateConfig};
use crate::ledger::QuotaLedger;

const MAX_BRAND_LEN: usize = 64;
const MAX_HINT_LEN: usize = 128;
const MAX_LOGO_URL_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// No demo flag or no usable brand; nothing was written.
    NotDemo,
    Created,
    Refreshed,
}

impl BootstrapOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapOutcome::NotDemo => "NOT_DEMO",
            BootstrapOutcome::Created => "CREATED",
            BootstrapOutcome::Refreshed => "REFRESHED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

/// Query parameters of a preview URL that shape a takeover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewParams {
    pub demo: bool,
    pub brand: Option<String>,
    pub color: Option<String>,
    pub logo: Option<String>,
    pub domain: Option<String>,
    pub city: Option<String>,
    pub rep: Option<String>,
    pub role: Option<String>,
    pub days: Option<u32>,
    pub blur: Option<bool>,
    pub pilot: Option<bool>,
}

impl PreviewParams {
    pub fn from_url(url: &Url) -> Self {
        let mut out = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.trim();
            match key.to_ascii_lowercase().as_str() {
                "demo" => out.demo = value.is_empty() || parse_flag(value) == Some(true),
                "company" | "brand" => out.brand = non_empty(value),
                "color" => out.color = non_empty(value),
                "logo" => out.logo = non_empty(value),
                "domain" => out.domain = non_empty(value),
                "city" => out.city = non_empty(value),
                "rep" => out.rep = non_empty(value),
                "role" => out.role = non_empty(value),
                "days" | "expire" => out.days = value.parse::<u32>().ok(),
                "blur" => out.blur = parse_flag(value),
                "pilot" => out.pilot = parse_flag(value),
                _ => {}
            }
        }
        out
    }

    /// The brand a demo preview is for, normalized to a slug.
    pub fn demo_brand(&self) -> Option<BrandId> {
        if !self.demo {
            return None;
        }
        let slug = slugify(self.brand.as_deref()?);
        if slug.is_empty() {
            return None;
        }
        BrandId::new(slug).ok()
    }

    pub fn expire_days(&self, default_days: u32) -> u32 {
        self.days
            .unwrap_or(default_days)
            .clamp(MIN_EXPIRE_DAYS, MAX_EXPIRE_DAYS)
    }

    pub fn branding(&self) -> TakeoverBranding {
        TakeoverBranding {
            primary_color: self
                .color
                .as_deref()
                .and_then(normalize_color)
                .unwrap_or_else(|| DEFAULT_PRIMARY_COLOR.to_string()),
            logo_url: self.logo.as_deref().and_then(sanitize_logo_url),
            domain_hint: self.domain.as_deref().and_then(sanitize_hint),
            city_hint: self.city.as_deref().and_then(sanitize_hint),
            rep_name: self.rep.as_deref().and_then(sanitize_hint),
            role: self.role.as_deref().and_then(sanitize_hint),
            blur_enabled: self.blur.unwrap_or(true),
            pilot_mode: self.pilot.unwrap_or(false),
        }
    }
}

/// Turns a preview URL into the persisted takeover record.
#[derive(Debug, Clone)]
pub struct TakeoverBootstrap {
    config: GateConfig,
}

impl TakeoverBootstrap {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn observe(
        &self,
        store: &mut dyn RecordStore,
        ledger: &QuotaLedger,
        url: &Url,
        link_id: &LinkId,
        now: EpochMs,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        let params = PreviewParams::from_url(url);
        let Some(brand_id) = params.demo_brand() else {
            return Ok(BootstrapOutcome::NotDemo);
        };
        let branding = params.branding();

        let existing = store.load_takeover_record();
        if let Some(mut current) = existing.clone() {
            if current.is_active_takeover() && current.brand_id == brand_id {
                pin_deadline(store, &brand_id, takeover_deadline(&current))?;
                if current.branding() != branding {
                    apply_branding(&mut current, branding);
                    store.save_takeover_record(&current)?;
                }
                tracing::debug!(brand_id = brand_id.as_str(), "takeover refreshed");
                return Ok(BootstrapOutcome::Refreshed);
            }
        }

        // Never older than the record being replaced, so siblings accept it.
        let floor = existing.map_or(0, |record| record.created_at_ms.0);
        let created_at = EpochMs(now.0.max(floor).max(1));
        let expire_days = params.expire_days(self.config.default_expire_days);
        let deadline = match store.load_deadline_map().get(&brand_id) {
            Some(pinned) => pinned,
            None => {
                let deadline = ExpiryClock::deadline(created_at, expire_days);
                pin_deadline(store, &brand_id, deadline)?;
                deadline
            }
        };
        if store.load_quota_map().get(link_id).is_none() {
            ledger.reset(store, link_id)?;
        }
        let record = BrandTakeoverRecord::v1(
            brand_id,
            branding,
            expire_days,
            ledger.remaining(store, link_id),
            created_at,
            deadline,
        )?;
        store.save_takeover_record(&record)?;
        tracing::info!(
            brand_id = record.brand_id.as_str(),
            link_id = link_id.as_str(),
            expire_days,
            "takeover created"
        );
        Ok(BootstrapOutcome::Created)
    }
}

/// Records a brand's deadline the first time it is seen. Later calls keep it.
fn pin_deadline(
    store: &mut dyn RecordStore,
    brand_id: &BrandId,
    deadline: EpochMs,
) -> Result<(), StoreError> {
    let mut deadlines = store.load_deadline_map();
    if deadlines.get(brand_id).is_some() {
        return Ok(());
    }
    deadlines.set(brand_id, deadline);
    store.save_deadline_map(&deadlines)
}

fn apply_branding(record: &mut BrandTakeoverRecord, branding: TakeoverBranding) {
    record.primary_color = branding.primary_color;
    record.logo_url = branding.logo_url;
    record.domain_hint = branding.domain_hint;
    record.city_hint = branding.city_hint;
    record.rep_name = branding.rep_name;
    record.role = branding.role;
    record.blur_enabled = branding.blur_enabled;
    record.pilot_mode = branding.pilot_mode;
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn slugify(raw: &str) -> String {
    let mut slug = String::new();
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if matches!(c, '_' | '-' | '.') {
            slug.push(c);
        } else if c.is_whitespace() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').chars().take(MAX_BRAND_LEN).collect()
}

fn normalize_color(raw: &str) -> Option<String> {
    let candidate = if raw.starts_with('#') {
        raw.to_string()
    } else {
        format!("#{raw}")
    };
    is_hex_color(&candidate).then(|| candidate.to_ascii_uppercase())
}

fn sanitize_hint(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_HINT_LEN)
        .collect();
    non_empty(cleaned.trim())
}

fn sanitize_logo_url(raw: &str) -> Option<String> {
    if raw.len() > MAX_LOGO_URL_LEN || raw.chars().any(char::is_control) {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://") || raw.starts_with('/'))
        .then(|| raw.to_string())
}
