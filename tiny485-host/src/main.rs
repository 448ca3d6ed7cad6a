//! tiny485 controller
//!
//! Talks to servo/stepper nodes on a multidrop RS-485 bus through a serial
//! adapter, or to simulated nodes with `--simulate`.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tiny485_hal::BusTransport;
use tiny485_host::{scan, Bus, Harness, HostConfig, NodeClient, SerialTransport, SimBus};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line client for the tiny485 bus
#[derive(Parser, Debug)]
#[command(name = "tiny485")]
#[command(version)]
struct Args {
    /// Serial device [default: /dev/ttyUSB0]
    #[arg(long)]
    dev: Option<String>,

    /// Baud rate [default: 57600]
    #[arg(long)]
    baud: Option<u32>,

    /// Target node, decimal or 0x-prefixed hex [default: 64]
    #[arg(long, value_parser = parse_address)]
    node: Option<u8>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use an in-memory bus with simulated nodes instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Ping every address and list the nodes that answer
    Scan,
    /// Give the target node a new address
    SetNode {
        #[arg(value_parser = parse_address)]
        address: u8,
    },
    /// Read the servo configuration
    GetServo,
    /// Set servo outputs: servo1[,servo2[,period]] in µs
    SetServo {
        #[arg(value_parser = parse_servo_values)]
        values: ServoValues,
    },
    /// Persist the node's configuration
    SaveConfig,
    /// Move the stepper to an absolute position
    StepperGoto { position: u16 },
    /// Drive the stepper home, assuming it is at most `steps` away
    StepperZero { steps: u16 },
    /// Switch the stepper coils off
    StepperOff,
    /// Read stepper position and target
    StepperGet,
    /// Stress the link with random traffic and noise
    Torture {
        /// Stop after this many seconds (runs until interrupted otherwise)
        #[arg(long)]
        duration_s: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServoValues(Vec<u16>);

fn parse_address(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid node address '{s}': {e}"))
}

fn parse_servo_values(s: &str) -> Result<ServoValues, String> {
    s.split(',')
        .map(|field| {
            let field = field.trim();
            field
                .parse::<u16>()
                .map_err(|e| format!("invalid servo value '{field}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ServoValues)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<HostConfig> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(dev) = &args.dev {
        config.serial.device = dev.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud = baud;
    }
    if let Some(node) = args.node {
        config.node = node;
    }
    config.validate()?;
    Ok(config)
}

fn execute<T>(bus: &mut Bus<T>, config: &HostConfig, command: &Cmd) -> anyhow::Result<()>
where
    T: BusTransport<Error = io::Error>,
{
    let node = config.node;
    let mut client = NodeClient::new(bus, node).with_timeout(config.command_timeout());

    match command {
        Cmd::Scan => {
            drop(client);
            let found = scan(bus, &config.scan_config())?;
            println!("{} node(s) found", found.len());
            for addr in found {
                println!("  {addr:3} ({addr:#04x})");
            }
        }
        Cmd::SetNode { address } => {
            client
                .set_address(*address)
                .with_context(|| format!("changing address of node {node}"))?;
            println!("node {node} is now node {address}");
        }
        Cmd::GetServo => {
            let report = client.get_servo()?;
            println!("servo1: {} us", report.servo1_us);
            println!("servo2: {} us", report.servo2_us);
            println!("period: {} us", report.period_us());
        }
        Cmd::SetServo { values } => {
            let settings = client.set_servo(&values.0)?;
            println!("servo1: {} us", settings.servo1_us);
            if let Some(servo2) = settings.servo2_us {
                println!("servo2: {servo2} us");
            }
            if let Some(period) = settings.period_minus_one {
                println!("period: {} us", u32::from(period) + 1);
            }
        }
        Cmd::SaveConfig => {
            client.save_config()?;
            println!("configuration saved on node {node}");
        }
        Cmd::StepperGoto { position } => {
            client.stepper_goto(*position)?;
            println!("stepper target set to {position}");
        }
        Cmd::StepperZero { steps } => {
            client.stepper_zero(*steps)?;
            println!("stepper zeroing from {steps} steps");
        }
        Cmd::StepperOff => {
            client.stepper_off()?;
            println!("stepper coils off");
        }
        Cmd::StepperGet => {
            let report = client.stepper_get()?;
            println!("position: {}", report.position);
            println!("target:   {}", report.target);
        }
        Cmd::Torture { duration_s } => {
            drop(client);
            let mut harness = Harness::new(bus, rand::thread_rng(), config.harness_config());
            let stats = harness.run(duration_s.map(Duration::from_secs))?;
            println!("{stats}");
        }
    }

    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if args.simulate {
        let sim = config
            .simulate
            .nodes
            .iter()
            .fold(SimBus::new(), |sim, &addr| {
                sim.with_node_at(addr, config.simulate.loopback)
            });
        info!(nodes = ?config.simulate.nodes, "using simulated bus");
        execute(&mut Bus::new(sim), &config, &args.command)
    } else {
        let device = &config.serial.device;
        let port = SerialTransport::open(device, &config.line_config())
            .with_context(|| format!("opening {device}"))?;
        execute(&mut Bus::new(port), &config, &args.command)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
