#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use solgate_contracts::takeover::LinkId;
use solgate_contracts::ContractViolation;
use url::Url;

const PAGE_URL_BASE: &str = "https://preview.invalid/";
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "msclkid", "mc_cid", "mc_eid"];

/// Accepts absolute page URLs and origin-relative ones such as `/quote?demo=1`.
pub fn parse_page_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(PAGE_URL_BASE)?.join(trimmed),
        Err(err) => Err(err),
    }
}

pub fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Stable identity of a preview link: path plus distinguishing query
/// parameters, order-insensitive, tracking parameters ignored. The host is
/// not part of the identity.
pub fn derive_link_id(url: &Url) -> Result<LinkId, ContractViolation> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    let mut hasher = Sha256::new();
    hasher.update(url.path().trim_end_matches('/').as_bytes());
    for (k, v) in &params {
        hasher.update([0x1f]);
        hasher.update(k.as_bytes());
        hasher.update([b'=']);
        hasher.update(v.as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    LinkId::new(format!("lnk_{hex}"))
}
