//! Demo binary wiring `bridge-core`'s `EventBridge` to the backends named in
//! an optional config file, polling every 50 ms, exactly as the reference
//! `main.cpp`'s timer-driven Qt event loop did (minus the WebSocket/Qt glue,
//! which is out of scope for this crate).

use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use bridge_config::BackendKind;
use bridge_core::{EventBridge, InputKind, OutputKind};
use bridge_types::{Event, EventType};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "event-bridge-demo", version, about = "Event bridge demo host")]
struct Args {
    /// Optional configuration file path (overrides discovery of
    /// `event-bridge.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn configure_logging() -> Result<Option<WorkerGuard>> {
    let log_dir = std::path::Path::new(".");
    let log_path = log_dir.join("event-bridge.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "event-bridge.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Ok(Some(guard)),
        Err(_) => Ok(None),
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "bridge.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn log_event(event: Event) {
    info!(
        target: "bridge.event",
        etype = ?event.etype,
        state = ?event.state,
        index = event.index,
        value = event.value,
        "event received"
    );
}

fn wire_backends(bridge: &mut EventBridge<impl FnMut(Event) + Send>, config: &bridge_config::Config) -> bool {
    let mut all_ok = true;

    for input in &config.file.inputs {
        let kind = match input.kind {
            BackendKind::Libinput => InputKind::Libinput,
            BackendKind::Serial => InputKind::Serial,
            BackendKind::Gpio => InputKind::Gpio,
            BackendKind::SysfsLed => {
                warn!(target: "bridge.demo", id = %input.id, "sysfsled is not a valid input kind, skipping");
                continue;
            }
        };
        if !bridge.add_input(kind, &input.id, input.index) {
            warn!(target: "bridge.demo", id = %input.id, error = bridge.last_error(), "failed to add input");
            all_ok = false;
        }
    }

    for output in &config.file.outputs {
        let kind = match output.kind {
            BackendKind::Gpio => OutputKind::Gpio,
            BackendKind::SysfsLed => OutputKind::SysfsLed,
            BackendKind::Libinput | BackendKind::Serial => {
                warn!(target: "bridge.demo", id = %output.id, "input-only kind is not valid for an output, skipping");
                continue;
            }
        };
        if !bridge.add_output(kind, &output.id, output.index) {
            warn!(target: "bridge.demo", id = %output.id, error = bridge.last_error(), "failed to add output");
            all_ok = false;
        }
    }

    all_ok
}

fn run() -> Result<()> {
    let _log_guard = configure_logging()?;
    install_panic_hook();

    info!(target: "bridge.demo", "startup");

    let args = Args::parse();
    let config = bridge_config::load_from(args.config)?;

    let mut bridge = EventBridge::with_timing(log_event as fn(Event), config.file.timing.into());

    if !wire_backends(&mut bridge, &config) {
        anyhow::bail!("one or more backends failed to initialize, check logs for details");
    }

    // suppress spurious long-press events from buttons already held at startup
    bridge.clear();
    bridge.enable_tap_tempo(EventType::Encoder, 0, true);

    info!(target: "bridge.demo", "ready");

    loop {
        bridge.poll();
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("event-bridge-demo: {error:#}");
        std::process::exit(1);
    }
}
