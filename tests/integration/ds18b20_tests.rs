//! DS18B20 exchanges against a simulated device behind the `rw` file.

use std::sync::Arc;
use std::thread;

use rpi_periph::config::{HostConfig, PollPolicy};
use rpi_periph::onewire::OneWireBus;
use rpi_periph::ports::PseudoFs;
use rpi_periph::sensors::{Ds18b20, Resolution};
use rpi_periph::{Error, SensorError};

use crate::mock_fs::{MemFs, ROOM, Sim, SimState, rw_path, sim_factory, w1_fs};

const ADDRESS: &str = "28-000005e2fdc3";

fn fast() -> PollPolicy {
    PollPolicy {
        max_attempts: 5,
        interval_ms: 0,
    }
}

fn setup(scratchpad: [u8; 9]) -> (Arc<MemFs>, OneWireBus, Sim) {
    let fs = w1_fs();
    let sim = SimState::new(scratchpad);
    fs.add_file(rw_path(ADDRESS), sim_factory(&sim));
    let dyn_fs: Arc<dyn PseudoFs> = Arc::clone(&fs) as Arc<dyn PseudoFs>;
    let bus = OneWireBus::new(0, dyn_fs, &HostConfig::default());
    (fs, bus, sim)
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn reads_room_temperature() {
    let (_fs, bus, sim) = setup(ROOM);
    sim.lock().unwrap().busy_polls = 3;
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    sensor.read_temperature().unwrap();

    assert_eq!(sensor.raw(), 0x0190);
    assert!(approx(sensor.celsius(), 25.0));
    assert!(approx(sensor.fahrenheit(), 77.0));
    let sim = sim.lock().unwrap();
    assert_eq!(sim.written, vec![0x44, 0xBE]);
    assert_eq!(sim.polls, 4);
}

#[test]
fn nothing_is_stored_before_the_first_read() {
    let (fs, bus, _sim) = setup(ROOM);
    let sensor = Ds18b20::new(bus.open(ADDRESS).unwrap());

    assert_eq!(sensor.raw(), 0);
    assert!(approx(sensor.celsius(), 0.0));
    assert!(approx(sensor.fahrenheit(), 32.0));
    assert_eq!(fs.total_opens(), 0);
}

#[test]
fn reads_negative_temperature() {
    let (_fs, bus, sim) = setup(ROOM);
    // -10.125 °C
    sim.lock().unwrap().set_temperature_raw(-162);
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    sensor.read_temperature().unwrap();

    assert_eq!(sensor.raw(), -162);
    assert!(approx(sensor.celsius(), -10.125));
}

#[test]
fn crc_mismatch_keeps_previous_reading() {
    let (_fs, bus, sim) = setup(ROOM);
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());
    sensor.read_temperature().unwrap();

    {
        let mut sim = sim.lock().unwrap();
        sim.set_temperature_raw(0x0550);
        sim.corrupt_crc = true;
    }
    let err = sensor.read_temperature().unwrap_err();

    assert!(matches!(err, Error::Sensor(SensorError::Crc { .. })));
    assert!(approx(sensor.celsius(), 25.0));
}

#[test]
fn conversion_that_never_completes_times_out() {
    let (_fs, bus, sim) = setup(ROOM);
    sim.lock().unwrap().busy_polls = u32::MAX;
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    let err = sensor.read_temperature().unwrap_err();

    assert!(matches!(
        err,
        Error::Sensor(SensorError::ConversionTimeout { attempts: 5 })
    ));
    let sim = sim.lock().unwrap();
    assert_eq!(sim.polls, 5);
    // Read Scratchpad is never issued.
    assert_eq!(sim.written, vec![0x44]);
}

#[test]
fn read_failure_while_polling_aborts() {
    let (_fs, bus, sim) = setup(ROOM);
    sim.lock().unwrap().fail_reads = true;
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    assert!(matches!(sensor.read_temperature(), Err(Error::Io(_))));
    assert_eq!(sensor.raw(), 0);
}

#[test]
fn missing_device_file_is_unavailable() {
    let fs = w1_fs();
    let dyn_fs: Arc<dyn PseudoFs> = Arc::clone(&fs) as Arc<dyn PseudoFs>;
    let bus = OneWireBus::new(0, dyn_fs, &HostConfig::default());
    let sensor = Ds18b20::new(bus.open(ADDRESS).unwrap());

    assert!(matches!(
        sensor.read_temperature(),
        Err(Error::Unavailable { .. })
    ));
}

#[test]
fn set_resolution_writes_configuration_sequence() {
    let (_fs, bus, sim) = setup(ROOM);
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    sensor.set_resolution(Resolution::Bits9).unwrap();

    let sim = sim.lock().unwrap();
    assert_eq!(sim.written, vec![0x4E, 0x00, 0x00, 0x1F, 0x48]);
    assert_eq!(sim.scratchpad[4], 0x1F);
}

#[test]
fn lower_resolution_masks_undefined_bits() {
    let (_fs, bus, sim) = setup(ROOM);
    // 25.4375 °C
    sim.lock().unwrap().set_temperature_raw(0x0197);
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    sensor.set_resolution(Resolution::Bits9).unwrap();
    sensor.read_temperature().unwrap();
    assert_eq!(sensor.raw(), 0x0190);

    sensor.set_resolution(Resolution::Bits12).unwrap();
    sensor.read_temperature().unwrap();
    assert_eq!(sensor.raw(), 0x0197);
}

#[test]
fn set_resolution_stops_at_first_failed_byte() {
    let (_fs, bus, sim) = setup(ROOM);
    sim.lock().unwrap().fail_write_at = Some(2);
    let sensor = Ds18b20::with_poll_policy(bus.open(ADDRESS).unwrap(), fast());

    assert!(matches!(
        sensor.set_resolution(Resolution::Bits10),
        Err(Error::Io(_))
    ));
    assert_eq!(sim.lock().unwrap().written, vec![0x4E, 0x00]);
}

#[test]
fn sensors_sharing_a_device_do_not_interleave() {
    let (_fs, bus, sim) = setup(ROOM);
    sim.lock().unwrap().busy_polls = 2;
    let device = bus.open(ADDRESS).unwrap();

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let sensor = Ds18b20::with_poll_policy(Arc::clone(&device), fast());
            thread::spawn(move || {
                for _ in 0..25 {
                    sensor.read_temperature().unwrap();
                    assert_eq!(sensor.raw(), 0x0190);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let sim = sim.lock().unwrap();
    assert_eq!(sim.written.len(), 100);
    assert!(sim.written.chunks(2).all(|pair| pair == [0x44, 0xBE]));
}
