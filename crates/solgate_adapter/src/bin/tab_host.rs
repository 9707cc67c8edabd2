#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use solgate_adapter::host::{execute_host_command, parse_host_command, HostCommand};
use solgate_adapter::{init_tracing, spawn_heartbeat, system_time_now_ms, AdapterConfig};
use solgate_os::session::TabSession;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let config = AdapterConfig::from_env();
    let profile = config.open_profile();
    let session = Arc::new(Mutex::new(TabSession::attach(
        &profile,
        config.gate_config(),
        config.sync_config(),
        system_time_now_ms(),
    )));
    let heartbeat = spawn_heartbeat(session.clone(), config.heartbeat_ms, system_time_now_ms);
    tracing::info!(
        heartbeat_ms = config.heartbeat_ms,
        default_runs = config.default_runs,
        "solgate_tab_host ready; reading commands from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut exit = ExitCode::SUCCESS;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                eprintln!("solgate_tab_host: stdin read failed: {err}");
                exit = ExitCode::from(1);
                break;
            }
        };
        let command = match parse_host_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("solgate_tab_host: {err}");
                continue;
            }
        };
        let result = match session.lock() {
            Ok(mut session) => execute_host_command(&mut session, &command, system_time_now_ms()),
            Err(_) => Err("tab session lock poisoned".to_string()),
        };
        match result {
            Ok(value) => println!("{value}"),
            Err(err) => eprintln!("solgate_tab_host: {err}"),
        }
        if command == HostCommand::Quit {
            break;
        }
    }

    heartbeat.stop().await;
    exit
}
