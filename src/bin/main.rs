//! CLI tool for hwpoll

use clap::{Parser, Subcommand};
use hwpoll::{Config, DeviceClass, Engine, Hardware, SensorKey};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hwpoll")]
#[command(about = "Hardware telemetry: polled sensors resolved to stable semantic keys", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the per-user config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Poll interval in seconds (overrides the config file)
    #[arg(short, long, global = true)]
    interval: Option<f64>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the selected keys every tick (all known keys if none given)
    Watch {
        keys: Vec<String>,
        /// Stop after this many ticks
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
    /// List known keys with their units
    Keys,
    /// Dump the hardware tree
    Tree,
    /// List selector candidates for a device class (network or disk)
    Candidates { class: DeviceClass },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(secs) = cli.interval {
        config.general.poll_interval_ms = (secs * 1000.0).max(1.0) as u64;
    }
    let json = cli.format == "json";

    match cli.command {
        Commands::Keys => print_keys(json)?,
        Commands::Tree => {
            let engine = Engine::with_platform_defaults(config);
            engine.update_all();
            let tree = engine.hardware_tree();
            if json {
                let nodes: Vec<_> = tree.hardware().iter().map(hardware_json).collect();
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for hw in tree.hardware() {
                    print_hardware(hw, 0);
                }
            }
        }
        Commands::Candidates { class } => {
            let engine = Engine::with_platform_defaults(config);
            engine.update_all();
            let names = engine.list_candidates(class);
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!("No {} devices found", class);
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        Commands::Watch { keys, count } => {
            let keys = parse_keys(&keys)?;
            let interval = config.general.poll_interval();
            let engine = Engine::with_platform_defaults(config);
            watch(&engine, &keys, count, interval, json)?;
            engine.persist_maxima()?;
        }
    }

    Ok(())
}

fn parse_keys(names: &[String]) -> Result<Vec<SensorKey>, Box<dyn std::error::Error>> {
    if names.is_empty() {
        return Ok(SensorKey::all().collect());
    }
    names
        .iter()
        .map(|name| SensorKey::parse(name).ok_or_else(|| format!("Unknown key: {}", name).into()))
        .collect()
}

fn watch(
    engine: &Arc<Engine>,
    keys: &[SensorKey],
    count: Option<u64>,
    interval: Duration,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let event = engine.update_all();
        // Rate sensors need two samples
        if event.tick > 1 {
            if json {
                let values: serde_json::Map<_, _> = keys
                    .iter()
                    .map(|k| (k.name().to_string(), json!(engine.get_key(*k))))
                    .collect();
                println!("{}", json!({ "tick": event.tick, "at": event.at, "values": values }));
            } else {
                println!("--- tick {} ({:?}) ---", event.tick, event.elapsed);
                for key in keys {
                    print_value(engine, *key);
                }
            }
        }
        if count.is_some_and(|n| event.tick >= n) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn print_value(engine: &Engine, key: SensorKey) {
    let unit = key.info().unit.symbol();
    match engine.get_key(key) {
        Some(value) => match engine.percent_of(key) {
            Some(pct) if key.info().adaptive_max => {
                println!("{:<16} {:>12.1} {:<5} ({:.0}% of max)", key.name(), value, unit, pct)
            }
            _ => println!("{:<16} {:>12.1} {}", key.name(), value, unit),
        },
        None => println!("{:<16} {:>12}", key.name(), "-"),
    }
}

fn print_keys(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let keys: Vec<_> = SensorKey::all()
            .map(|k| {
                let info = k.info();
                json!({
                    "name": info.name,
                    "unit": info.unit.symbol(),
                    "adaptive_max": info.adaptive_max,
                    "counter": info.counter.is_some(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&keys)?);
    } else {
        for key in SensorKey::all() {
            let info = key.info();
            println!("{:<16} {}", info.name, info.unit.symbol());
        }
    }
    Ok(())
}

fn print_hardware(hw: &Hardware, depth: usize) {
    let indent = "  ".repeat(depth);
    let system = if hw.is_system { " [system]" } else { "" };
    println!("{}{} ({:?}){}", indent, hw.name, hw.hw_type, system);
    for sensor in &hw.sensors {
        let value = sensor
            .value()
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        let kind = format!("{:?}", sensor.sensor_type);
        println!("{}  {:<28} {:<12} {}", indent, sensor.name, kind, value);
    }
    for sub in &hw.sub_hardware {
        print_hardware(sub, depth + 1);
    }
}

fn hardware_json(hw: &Hardware) -> serde_json::Value {
    json!({
        "name": hw.name,
        "identifier": hw.identifier,
        "type": hw.hw_type,
        "system": hw.is_system,
        "sensors": hw.sensors.iter().map(|s| json!({
            "name": s.name,
            "identifier": s.identifier,
            "type": s.sensor_type,
            "value": s.value(),
        })).collect::<Vec<_>>(),
        "sub_hardware": hw.sub_hardware.iter().map(hardware_json).collect::<Vec<_>>(),
    })
}
