#![forbid(unsafe_code)]

use std::env;

use solgate_adapter::{init_tracing, system_time_now_ms, AdapterConfig};
use solgate_os::session::TabSession;
use solgate_os::sync::PollChangeSource;
use solgate_tools::gate_cli::{execute_gate_command, GATE_USAGE};

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args[0] != "gate" {
        return Err(GATE_USAGE.to_string());
    }
    let subcommand = args
        .get(1)
        .ok_or_else(|| GATE_USAGE.to_string())?
        .as_str();
    let target = args.get(2).map(String::as_str);

    let config = AdapterConfig::from_env();
    let now = system_time_now_ms();
    let mut session = TabSession::with_store(
        Box::new(config.file_store()),
        vec![Box::new(PollChangeSource::new())],
        config.gate_config(),
        config.sync_config(),
        now,
    );
    let output = execute_gate_command(&mut session, subcommand, target, now)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
