use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use inquire::Select;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use etm_psu::{ConnectionTarget, EtmPsu, ProtectionFlags, PsuConfig, State};

/// Control an eTM-xxxxP bench PSU (Hanmatek HM305P/HM310P, Rockseed RS305P/RS310P/RS605P).
#[derive(Parser, Debug)]
#[command(name = "etm-psu", version)]
struct Cli {
    /// Serial port, or host:port of a TCP bridge. Prompts for a serial port when omitted.
    #[arg(short, long, env = "ETM_PSU_PORT")]
    port: Option<String>,

    /// Modbus unit id of the PSU.
    #[arg(long, env = "ETM_PSU_UNIT", default_value_t = 1)]
    unit: u8,

    /// Response timeout in seconds.
    #[arg(long, default_value_t = 2.0)]
    timeout: f64,

    /// The required output voltage.
    #[arg(short = 'v', value_name = "VOLTS")]
    volts: Option<f64>,

    /// The current limit value in amps.
    #[arg(short = 'a', value_name = "AMPS")]
    amps: Option<f64>,

    /// The required over voltage protection value in volts.
    #[arg(long = "ov", value_name = "VOLTS")]
    over_volts: Option<f64>,

    /// The required over current protection value in amps.
    #[arg(long = "oa", value_name = "AMPS")]
    over_amps: Option<f64>,

    /// The required over power protection value in watts.
    #[arg(long = "op", value_name = "WATTS")]
    over_watts: Option<f64>,

    /// Turn the PSU output on.
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "off")]
    on: bool,

    /// Turn the PSU output off.
    #[arg(long, action = ArgAction::SetTrue)]
    off: bool,

    /// Set the buzzer on.
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "boff")]
    bon: bool,

    /// Set the buzzer off.
    #[arg(long, action = ArgAction::SetTrue)]
    boff: bool,

    /// Show output state, voltage, current and power.
    #[arg(short = 's', action = ArgAction::SetTrue)]
    status: bool,

    /// Show the verbose PSU status.
    #[arg(long = "vs", action = ArgAction::SetTrue)]
    verbose_status: bool,

    /// Print output readings every SECS seconds.
    #[arg(long, value_name = "SECS")]
    poll: Option<f64>,

    /// Stop polling after this many readings.
    #[arg(long, requires = "poll")]
    samples: Option<u64>,

    /// Enable debug logging.
    #[arg(short, long, action = ArgAction::SetTrue)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Ask the user to pick one of the local serial ports.
fn select_port() -> Result<ConnectionTarget> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        bail!("No serial ports found, use --port to give one");
    }
    let port_names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
    let port_name = Select::new("Select a serial port:", port_names)
        .prompt()
        .context("No serial port selected")?;
    Ok(ConnectionTarget::serial(port_name))
}

fn on_off(value: u16) -> &'static str {
    if value == 1 { "ON" } else { "OFF" }
}

fn show_status(psu: &EtmPsu) -> Result<()> {
    let output = psu.get_output()?;
    let stats = psu.get_output_stats()?;
    let target_volts = psu.get_target_volts()?;
    println!("Output:                 {}", on_off(output));
    println!("Voltage (volts):        {target_volts:.2}");
    println!("Output voltage (volts): {:.2}", stats.volts);
    println!("Current (amps):         {:.3}", stats.amps);
    println!("Watts (watts):          {:.3}", stats.watts);
    Ok(())
}

/// Short names of the protections that have tripped, in bit order.
fn tripped_protections(flags: ProtectionFlags) -> Vec<&'static str> {
    [
        (flags.over_voltage(), "OVP"),
        (flags.over_current(), "OCP"),
        (flags.over_power(), "OPP"),
        (flags.over_temperature(), "OTP"),
        (flags.short_circuit(), "SCP"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

fn show_verbose_status(psu: &EtmPsu) -> Result<()> {
    show_status(psu)?;
    let current_limit = psu.get_current_limit()?;
    let protection = psu.get_protection_values()?;
    let buzzer = psu.get_buzzer()?;
    let model = psu.get_model()?;
    let protection_state = psu.get_protection_state()?;
    println!("Current limit (amps):   {current_limit:.3}");
    println!("Over voltage (volts):   {:.3}", protection.over_volts);
    println!("Over current (amps):    {:.3}", protection.over_amps);
    println!("Over power (watts):     {:.3}", protection.over_watts);
    println!("Buzzer:                 {}", on_off(buzzer));
    println!("Model:                  {model}");
    println!("Protection state:       {protection_state:#06X}");
    let tripped = tripped_protections(ProtectionFlags::from_raw(protection_state));
    if !tripped.is_empty() {
        println!("Tripped:                {}", tripped.join(", "));
    }
    Ok(())
}

fn poll(psu: &EtmPsu, period: Duration, samples: Option<u64>) -> Result<()> {
    let mut taken = 0;
    while samples.is_none_or(|n| taken < n) {
        let stats = psu.get_output_stats()?;
        println!(
            "{:.2} V  {:.3} A  {:.3} W",
            stats.volts, stats.amps, stats.watts
        );
        taken += 1;
        thread::sleep(period);
    }
    Ok(())
}

fn run(psu: &EtmPsu, cli: &Cli) -> Result<()> {
    if let Some(volts) = cli.volts {
        psu.set_voltage(volts)?;
        println!("Set output to {volts:.2} Volts");
    }
    if let Some(amps) = cli.amps {
        psu.set_current_limit(amps)?;
        println!("Set current limit to {amps:.3} Amps");
    }
    if let Some(volts) = cli.over_volts {
        psu.set_over_voltage_p(volts)?;
        println!("Set output over voltage value to {volts:.2} volts");
    }
    if let Some(amps) = cli.over_amps {
        psu.set_over_current_p(amps)?;
        println!("Set output over current value to {amps:.2} amps");
    }
    if let Some(watts) = cli.over_watts {
        psu.set_over_power_p(watts)?;
        println!("Set output over power value to {watts:.2} watts");
    }
    if cli.on {
        psu.set_output(State::On)?;
        println!("Set output ON");
    }
    if cli.off {
        psu.set_output(State::Off)?;
        println!("Set output OFF");
    }
    if cli.bon {
        psu.set_buzzer(State::On)?;
        println!("Set buzzer ON");
    }
    if cli.boff {
        psu.set_buzzer(State::Off)?;
        println!("Set buzzer OFF");
    }
    if cli.status {
        show_status(psu)?;
    }
    if cli.verbose_status {
        show_verbose_status(psu)?;
    }
    if let Some(secs) = cli.poll {
        let period = Duration::try_from_secs_f64(secs).context("Invalid poll period")?;
        poll(psu, period, cli.samples)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    debug!(?cli, "parsed arguments");

    let target = match &cli.port {
        Some(port) => port.parse::<ConnectionTarget>()?,
        None => select_port()?,
    };
    let timeout = Duration::try_from_secs_f64(cli.timeout).context("Invalid timeout")?;
    let config = PsuConfig {
        target,
        unit_id: cli.unit,
        timeout_ms: timeout.as_millis() as u64,
    };

    let psu = EtmPsu::open(&config)?;
    let result = run(&psu, &cli);
    psu.disconnect();
    result
}
