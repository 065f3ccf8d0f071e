//! rpi-periph: sample command-line front end.
//!
//! ```text
//!   rpi-periph list
//!   rpi-periph temp [--address 28-xxxx] [--resolution 12]
//!   rpi-periph pwm --gpio 12 --period-ns 20000000 --duty-ns 1500000 --hold-secs 5
//! ```
//!
//! Set `RUST_LOG=debug` to see bus and channel lifecycle events.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};

use rpi_periph::adapters::{PinRegistry, SysfsFs};
use rpi_periph::config::{HostConfig, PollPolicy};
use rpi_periph::drivers::{Polarity, PwmChannel};
use rpi_periph::onewire::OneWireBus;
use rpi_periph::pins::PinDesc;
use rpi_periph::sensors::ds18b20::{self, Ds18b20, Resolution};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON host configuration; sysfs defaults are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of the 1-Wire devices directory
    List,
    /// Read a DS18B20
    Temp {
        /// Slave address; the first `28-` device is used when absent
        #[arg(long)]
        address: Option<String>,
        /// Resolution in bits (9-12) to program before reading
        #[arg(long)]
        resolution: Option<u8>,
    },
    /// Drive a hardware PWM channel for a while, then shut it down
    Pwm {
        /// BCM GPIO number (12 or 13)
        #[arg(long)]
        gpio: u32,
        #[arg(long)]
        period_ns: i64,
        #[arg(long)]
        duty_ns: i64,
        #[arg(long)]
        inverse: bool,
        #[arg(long, default_value_t = 5)]
        hold_secs: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            HostConfig::from_json(&json)?
        }
        None => HostConfig::default(),
    };
    let fs = Arc::new(SysfsFs::new());

    match cli.command {
        Commands::List => {
            let bus = OneWireBus::new(0, fs, &config);
            for name in bus.list_devices()? {
                println!("{name}");
            }
        }
        Commands::Temp {
            address,
            resolution,
        } => {
            let bus = OneWireBus::new(0, fs, &config);
            let result = read_temperature(&bus, address, resolution, config.conversion);
            if let Err(e) = bus.close() {
                warn!("closing bus: {e}");
            }
            result?;
        }
        Commands::Pwm {
            gpio,
            period_ns,
            duty_ns,
            inverse,
            hold_secs,
        } => {
            if rpi_periph::pins::pwm_channel(gpio).is_none() {
                bail!("GPIO {gpio} cannot drive a hardware PWM channel (use 12 or 13)");
            }
            let registry = Arc::new(PinRegistry::new());
            let pin = PinDesc::new(format!("GPIO{gpio}"), gpio);
            let mut channel = PwmChannel::new(pin, fs, registry, &config)?;

            let result = drive_pwm(&mut channel, period_ns, duty_ns, inverse, hold_secs);
            channel.close().context("shutting down PWM channel")?;
            result?;
        }
    }

    Ok(())
}

fn read_temperature(
    bus: &OneWireBus,
    address: Option<String>,
    bits: Option<u8>,
    poll: PollPolicy,
) -> Result<()> {
    let address = match address {
        Some(a) => a,
        None => bus
            .devices_with_family(ds18b20::FAMILY_PREFIX)?
            .into_iter()
            .next()
            .context("no DS18B20 devices found")?,
    };
    info!("using DS18B20 device {address}");

    let sensor = Ds18b20::with_poll_policy(bus.open(&address)?, poll);
    if let Some(bits) = bits {
        let res = Resolution::from_bits(bits).context("resolution must be 9, 10, 11 or 12")?;
        sensor.set_resolution(res)?;
    }

    sensor.read_temperature()?;
    println!("Measured temperature: {}C", sensor.celsius());
    println!("Measured temperature: {}F", sensor.fahrenheit());
    Ok(())
}

fn drive_pwm(
    channel: &mut PwmChannel,
    period_ns: i64,
    duty_ns: i64,
    inverse: bool,
    hold_secs: u64,
) -> Result<()> {
    // The kernel refuses a period shorter than the active duty cycle.
    channel.set_duty(0)?;
    channel.set_period(period_ns)?;
    channel.set_duty(duty_ns)?;
    if inverse {
        channel.set_polarity(Polarity::Inversed)?;
    }
    info!(
        "pwm{}: period={} duty={} polarity={:?}, holding {hold_secs}s",
        channel.channel(),
        channel.period(),
        channel.duty(),
        channel.polarity()
    );
    thread::sleep(Duration::from_secs(hold_secs));
    Ok(())
}
