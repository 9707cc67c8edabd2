#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{validate_range, validate_slug, validate_text};
use crate::{ContractViolation, EpochMs, SchemaVersion, Validate};

pub const TAKEOVER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const DAY_MS: u64 = 86_400_000;
pub const DEFAULT_RUNS: i64 = 2;
/// Terminal value of a link's counter once a view past the last unit was attempted.
pub const LOCKED_RUNS_SENTINEL: i64 = -1;
/// Counter carried by the operator escape-hatch record.
pub const UNLIMITED_RUNS: i64 = 999;
pub const DEFAULT_EXPIRE_DAYS: u32 = 7;
pub const MIN_EXPIRE_DAYS: u32 = 1;
pub const MAX_EXPIRE_DAYS: u32 = 90;
pub const DEFAULT_PRIMARY_COLOR: &str = "#F59E0B";
pub const ESCAPE_HATCH_BRAND_ID: &str = "unlimited";

const MAX_URL_LEN: usize = 2048;
const MAX_HINT_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandId(String);

impl BrandId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for BrandId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_slug("brand_id", &self.0, 64)
    }
}

/// Identity of one shareable preview link. Quota is tracked per link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for LinkId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "link_id",
                reason: "must be non-empty",
            });
        }
        if self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "link_id",
                reason: "exceeds max length",
            });
        }
        if self.0.chars().any(|c| {
            !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.' || c == '/')
        }) {
            return Err(ContractViolation::InvalidValue {
                field: "link_id",
                reason: "must contain token-safe ASCII only",
            });
        }
        Ok(())
    }
}

/// Presentation-only fields of a takeover, as supplied by the preview URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeoverBranding {
    pub primary_color: String,
    pub logo_url: Option<String>,
    pub domain_hint: Option<String>,
    pub city_hint: Option<String>,
    pub rep_name: Option<String>,
    pub role: Option<String>,
    pub blur_enabled: bool,
    pub pilot_mode: bool,
}

impl Default for TakeoverBranding {
    fn default() -> Self {
        Self {
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            logo_url: None,
            domain_hint: None,
            city_hint: None,
            rep_name: None,
            role: None,
            blur_enabled: true,
            pilot_mode: false,
        }
    }
}

/// The persisted takeover snapshot. The JSON shape is shared by the store and
/// by cross-tab change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandTakeoverRecord {
    pub enabled: bool,
    pub brand_id: BrandId,
    pub primary_color: String,
    pub logo_url: Option<String>,
    pub domain_hint: Option<String>,
    pub city_hint: Option<String>,
    pub rep_name: Option<String>,
    pub role: Option<String>,
    pub expire_days: u32,
    pub runs_remaining: i64,
    pub blur_enabled: bool,
    pub pilot_mode: bool,
    pub is_demo: bool,
    pub created_at_ms: EpochMs,
    /// Deadline pinned when the preview was first created. Absent on payloads
    /// written by older writers; pinned by the first reader that accepts them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<EpochMs>,
}

impl BrandTakeoverRecord {
    pub fn v1(
        brand_id: BrandId,
        branding: TakeoverBranding,
        expire_days: u32,
        runs_remaining: i64,
        created_at_ms: EpochMs,
        expires_at_ms: EpochMs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            enabled: true,
            brand_id,
            primary_color: branding.primary_color,
            logo_url: branding.logo_url,
            domain_hint: branding.domain_hint,
            city_hint: branding.city_hint,
            rep_name: branding.rep_name,
            role: branding.role,
            expire_days,
            runs_remaining,
            blur_enabled: branding.blur_enabled,
            pilot_mode: branding.pilot_mode,
            is_demo: true,
            created_at_ms,
            expires_at_ms: Some(expires_at_ms),
        };
        record.validate()?;
        Ok(record)
    }

    /// Operator override record: no takeover in effect, unlimited runs.
    pub fn escape_hatch(now: EpochMs) -> Self {
        Self {
            enabled: false,
            brand_id: BrandId(ESCAPE_HATCH_BRAND_ID.to_string()),
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            logo_url: None,
            domain_hint: None,
            city_hint: None,
            rep_name: None,
            role: None,
            expire_days: MAX_EXPIRE_DAYS,
            runs_remaining: UNLIMITED_RUNS,
            blur_enabled: false,
            pilot_mode: false,
            is_demo: false,
            created_at_ms: EpochMs(now.0.max(1)),
            expires_at_ms: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.runs_remaining >= UNLIMITED_RUNS
    }

    /// True when this record describes a live demo preview the gate should police.
    pub fn is_active_takeover(&self) -> bool {
        self.enabled && self.is_demo && !self.is_unlimited()
    }

    pub fn branding(&self) -> TakeoverBranding {
        TakeoverBranding {
            primary_color: self.primary_color.clone(),
            logo_url: self.logo_url.clone(),
            domain_hint: self.domain_hint.clone(),
            city_hint: self.city_hint.clone(),
            rep_name: self.rep_name.clone(),
            role: self.role.clone(),
            blur_enabled: self.blur_enabled,
            pilot_mode: self.pilot_mode,
        }
    }

    /// Theme fields keyed by the presentation variable names rendering code binds to.
    pub fn presentation_vars(&self) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        vars.insert("--brand-primary", self.primary_color.clone());
        vars.insert("data-brand", self.brand_id.as_str().to_string());
        vars.insert(
            "data-blur",
            if self.blur_enabled { "on" } else { "off" }.to_string(),
        );
        vars.insert(
            "data-pilot",
            if self.pilot_mode { "on" } else { "off" }.to_string(),
        );
        if let Some(logo_url) = &self.logo_url {
            vars.insert("--brand-logo-url", format!("url(\"{logo_url}\")"));
        }
        if let Some(rep_name) = &self.rep_name {
            vars.insert("data-rep-name", rep_name.clone());
        }
        if let Some(city_hint) = &self.city_hint {
            vars.insert("data-city", city_hint.clone());
        }
        vars
    }
}

impl Validate for BrandTakeoverRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.brand_id.validate()?;
        if !is_hex_color(&self.primary_color) {
            return Err(ContractViolation::InvalidValue {
                field: "brand_takeover_record.primary_color",
                reason: "must be #rgb or #rrggbb",
            });
        }
        if let Some(logo_url) = &self.logo_url {
            validate_text("brand_takeover_record.logo_url", logo_url, MAX_URL_LEN)?;
        }
        if let Some(domain_hint) = &self.domain_hint {
            validate_text("brand_takeover_record.domain_hint", domain_hint, MAX_HINT_LEN)?;
        }
        if let Some(city_hint) = &self.city_hint {
            validate_text("brand_takeover_record.city_hint", city_hint, MAX_HINT_LEN)?;
        }
        if let Some(rep_name) = &self.rep_name {
            validate_text("brand_takeover_record.rep_name", rep_name, MAX_HINT_LEN)?;
        }
        if let Some(role) = &self.role {
            validate_text("brand_takeover_record.role", role, MAX_HINT_LEN)?;
        }
        validate_range(
            "brand_takeover_record.expire_days",
            i64::from(self.expire_days),
            i64::from(MIN_EXPIRE_DAYS),
            i64::from(MAX_EXPIRE_DAYS),
        )?;
        validate_range(
            "brand_takeover_record.runs_remaining",
            self.runs_remaining,
            LOCKED_RUNS_SENTINEL,
            UNLIMITED_RUNS,
        )?;
        if self.created_at_ms.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "brand_takeover_record.created_at_ms",
                reason: "must be > 0",
            });
        }
        if self.expires_at_ms == Some(EpochMs(0)) {
            return Err(ContractViolation::InvalidValue {
                field: "brand_takeover_record.expires_at_ms",
                reason: "must be > 0 when present",
            });
        }
        Ok(())
    }
}

/// Remaining runs per preview link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaMap(BTreeMap<String, i64>);

impl QuotaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, link_id: &LinkId) -> Option<i64> {
        self.0.get(link_id.as_str()).copied()
    }

    pub fn set(&mut self, link_id: &LinkId, remaining: i64) {
        self.0.insert(link_id.as_str().to_string(), remaining);
    }

    pub fn remove(&mut self, link_id: &LinkId) -> Option<i64> {
        self.0.remove(link_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Validate for QuotaMap {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (link_id, remaining) in &self.0 {
            LinkId(link_id.clone()).validate()?;
            validate_range(
                "quota_map.remaining",
                *remaining,
                LOCKED_RUNS_SENTINEL,
                UNLIMITED_RUNS,
            )?;
        }
        Ok(())
    }
}

/// Deadline pinned per brand. Survives the takeover record moving to another
/// brand so a returning preview keeps its original window.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadlineMap(BTreeMap<String, EpochMs>);

impl DeadlineMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, brand_id: &BrandId) -> Option<EpochMs> {
        self.0.get(brand_id.as_str()).copied()
    }

    pub fn set(&mut self, brand_id: &BrandId, deadline: EpochMs) {
        self.0.insert(brand_id.as_str().to_string(), deadline);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Validate for DeadlineMap {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (brand_id, deadline) in &self.0 {
            BrandId(brand_id.clone()).validate()?;
            if deadline.0 == 0 {
                return Err(ContractViolation::InvalidValue {
                    field: "deadline_map.deadline",
                    reason: "must be > 0",
                });
            }
        }
        Ok(())
    }
}

pub fn is_hex_color(raw: &str) -> bool {
    let Some(hex) = raw.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}
