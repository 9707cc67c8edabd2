#![forbid(unsafe_code)]

use solgate_contracts::gate::GateDecision;
use solgate_contracts::takeover::LinkId;
use solgate_contracts::EpochMs;
use solgate_os::link::{derive_link_id, parse_page_url};
use solgate_os::session::TabSession;

pub const GATE_USAGE: &str = "usage: solgate gate <evaluate|rerender|status|reset-all|force-sync> [url]";

pub fn execute_gate_command(
    session: &mut TabSession,
    subcommand: &str,
    target: Option<&str>,
    now: EpochMs,
) -> Result<String, String> {
    match subcommand {
        "evaluate" => {
            let url = target.ok_or_else(|| "usage: solgate gate evaluate <url>".to_string())?;
            let page = session
                .open_page(url, now)
                .map_err(|e| format!("failed to evaluate page: {e}"))?;
            match page.decision {
                Some(decision) => Ok(format!(
                    "{} bootstrap={}",
                    render_decision(&decision),
                    page.bootstrap.as_str()
                )),
                None => Ok(format!("NOT_DEMO link={}", page.link_id.as_str())),
            }
        }
        "rerender" => {
            let target =
                target.ok_or_else(|| "usage: solgate gate rerender <url|link_id>".to_string())?;
            let link_id = resolve_link_id(target)?;
            Ok(render_decision(&session.rerender(&link_id, now)))
        }
        "status" => {
            let mut lines = Vec::new();
            match session.current_record() {
                Some(record) => {
                    let expires = record
                        .expires_at_ms
                        .map(|ms| ms.0.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    lines.push(format!(
                        "brand={} enabled={} demo={} runs={} expire_days={} created_at_ms={} expires_at_ms={}",
                        record.brand_id.as_str(),
                        record.enabled,
                        record.is_demo,
                        record.runs_remaining,
                        record.expire_days,
                        record.created_at_ms.0,
                        expires
                    ));
                }
                None => lines.push("NO_RECORD".to_string()),
            }
            if let Some(target) = target {
                let link_id = resolve_link_id(target)?;
                lines.push(format!(
                    "link={} remaining={}",
                    link_id.as_str(),
                    session.remaining(&link_id)
                ));
            }
            Ok(lines.join("\n"))
        }
        "reset-all" => {
            session
                .reset_all(now)
                .map_err(|e| format!("failed to reset demo gate: {e}"))?;
            Ok("OK".to_string())
        }
        "force-sync" => {
            session
                .force_sync()
                .map_err(|e| format!("failed to sync: {e}"))?;
            Ok("OK".to_string())
        }
        _ => Err(format!(
            "unknown gate subcommand: {subcommand}. expected one of: evaluate, rerender, status, reset-all, force-sync"
        )),
    }
}

/// Accepts either a derived link id (`lnk_...`) or a page URL.
pub fn resolve_link_id(raw: &str) -> Result<LinkId, String> {
    if raw.starts_with("lnk_") {
        return LinkId::new(raw).map_err(|e| format!("invalid link id '{raw}': {e}"));
    }
    let url = parse_page_url(raw).map_err(|e| format!("invalid url '{raw}': {e}"))?;
    derive_link_id(&url).map_err(|e| format!("invalid url '{raw}': {e}"))
}

fn render_decision(decision: &GateDecision) -> String {
    let window = decision
        .remaining_time_ms
        .map(|ms| ms.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} remaining={} remaining_time_ms={} reason=0x{:08X} link={}",
        decision.mode.as_str(),
        decision.remaining,
        window,
        decision.reason_code.0,
        decision.link_id.as_str()
    )
}
