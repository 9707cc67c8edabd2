#![forbid(unsafe_code)]

use serde_json::{json, Value};
use solgate_contracts::takeover::LinkId;
use solgate_contracts::EpochMs;
use solgate_os::session::TabSession;
use solgate_os::sync::Visibility;

/// One line of tab-host input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Open(String),
    Rerender(String),
    Show,
    Hide,
    Sync,
    Reset,
    Status,
    Quit,
}

/// Blank lines and `#` comments yield `None`. A bare URL is an `open`.
pub fn parse_host_command(line: &str) -> Result<Option<HostCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if line.starts_with('/') || line.starts_with("http://") || line.starts_with("https://") {
        return Ok(Some(HostCommand::Open(line.to_string())));
    }
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, Some(arg.trim())),
        None => (line, None),
    };
    let cmd = match (verb, arg) {
        ("open", Some(url)) => HostCommand::Open(url.to_string()),
        ("rerender", Some(link_id)) => HostCommand::Rerender(link_id.to_string()),
        ("show", None) => HostCommand::Show,
        ("hide", None) => HostCommand::Hide,
        ("sync", None) => HostCommand::Sync,
        ("reset", None) => HostCommand::Reset,
        ("status", None) => HostCommand::Status,
        ("quit", None) | ("exit", None) => HostCommand::Quit,
        _ => return Err(format!("unrecognized command: {line}")),
    };
    Ok(Some(cmd))
}

pub fn execute_host_command(
    session: &mut TabSession,
    command: &HostCommand,
    now: EpochMs,
) -> Result<Value, String> {
    match command {
        HostCommand::Open(url) => {
            let page = session
                .open_page(url, now)
                .map_err(|err| err.to_string())?;
            Ok(json!({
                "linkId": page.link_id,
                "bootstrap": page.bootstrap.as_str(),
                "decision": page.decision,
                "presentation": page.presentation,
            }))
        }
        HostCommand::Rerender(raw) => {
            let link_id = LinkId::new(raw.as_str()).map_err(|err| err.to_string())?;
            let decision = session.rerender(&link_id, now);
            serde_json::to_value(decision).map_err(|err| err.to_string())
        }
        HostCommand::Show | HostCommand::Hide => {
            let visibility = if *command == HostCommand::Show {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
            session.set_visibility(visibility, now);
            Ok(json!({ "visible": visibility == Visibility::Visible }))
        }
        HostCommand::Sync => {
            session.force_sync().map_err(|err| err.to_string())?;
            Ok(status_json(session))
        }
        HostCommand::Reset => {
            let record = session.reset_all(now).map_err(|err| err.to_string())?;
            Ok(json!({ "reset": true, "record": record }))
        }
        HostCommand::Status => Ok(status_json(session)),
        HostCommand::Quit => {
            session.stop();
            Ok(json!({ "stopped": true }))
        }
    }
}

fn status_json(session: &TabSession) -> Value {
    let counters = session.synchronizer().counters();
    json!({
        "running": session.is_running(),
        "record": session.current_record(),
        "sync": {
            "accepted": counters.accepted,
            "keptLocal": counters.kept_local,
            "droppedMalformed": counters.dropped_malformed,
            "heartbeats": counters.heartbeats,
            "publishes": counters.publishes,
            "forcedResyncs": counters.forced_resyncs,
        },
    })
}
