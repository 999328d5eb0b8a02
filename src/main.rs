//! envsense - BLE Environmental Sensing peripheral firmware.
//!
//! Target: nRF52840 + S140 SoftDevice, SHT31 on TWIM0.
//!
//! Task layout:
//! - `event_task`      - radio events → controller (connection set, re-advertising)
//! - `sampling_task`   - 1 s ticker; reads the sensor every 10th tick and
//!                       publishes; pets the watchdog every tick
//! - SoftDevice tasks  - spawned by the radio backend (runner, advertiser,
//!                       one GATT server per link)

#![no_std]
#![no_main]

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::peripherals::TWISPI0;
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::wdt::{self, Watchdog, WatchdogHandle};
use embassy_nrf::{bind_interrupts, config};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Duration, Ticker};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use envsense::ble::controller::{run_events, PeripheralController};
use envsense::ble::softdevice::{SoftdeviceRadio, RADIO_EVENTS};
use envsense::config::{
    DEVICE_NAME, SAMPLE_TICK_MS, SENSOR_TIMEOUT_MS, SHT31_ADDR, WATCHDOG_TIMEOUT_SECS,
};
use envsense::sampler::{Sampler, TickOutcome};
use envsense::sensor::{Sht31, Timed};

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<TWISPI0>;
});

type Controller = PeripheralController<SoftdeviceRadio>;
type SharedController = Mutex<CriticalSectionRawMutex, Controller>;
type TempSensor = Timed<Sht31<Twim<'static, TWISPI0>, Delay>>;

static CONTROLLER: StaticCell<SharedController> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("envsense starting...");

    // P0, P1 and P4 belong to the SoftDevice.
    let mut hal_config = config::Config::default();
    hal_config.gpiote_interrupt_priority = Priority::P2;
    hal_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(hal_config);

    // Watchdog first: from here on a stall anywhere resets the device.
    let mut wdt_config = wdt::Config::default();
    wdt_config.timeout_ticks = 32_768 * WATCHDOG_TIMEOUT_SECS;
    wdt_config.run_during_debug_halt = false;
    let (_wdt, [watchdog]) = match Watchdog::try_new(p.WDT, wdt_config) {
        Ok(wdt) => wdt,
        Err(_) => defmt::panic!("watchdog already running with another configuration"),
    };

    // Radio + GATT + advertising. Nothing useful can run without them.
    let controller = match PeripheralController::initialize(SoftdeviceRadio::new(spawner), DEVICE_NAME) {
        Ok(c) => c,
        Err(e) => defmt::panic!("BLE bring-up failed: {:?}", e),
    };
    info!("Advertising as {}", controller.device_name());
    let controller = CONTROLLER.init(Mutex::new(controller));

    interrupt::SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0.set_priority(Priority::P3);
    let twim = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    let sensor = Timed::new(
        Sht31::new(twim, Delay, SHT31_ADDR),
        Duration::from_millis(SENSOR_TIMEOUT_MS),
    );

    unwrap!(spawner.spawn(event_task(controller)));
    unwrap!(spawner.spawn(sampling_task(sensor, controller, watchdog)));

    info!("All tasks spawned");
}

#[embassy_executor::task]
async fn event_task(controller: &'static SharedController) -> ! {
    run_events(controller, RADIO_EVENTS.receiver()).await
}

#[embassy_executor::task]
async fn sampling_task(
    mut sensor: TempSensor,
    controller: &'static SharedController,
    mut watchdog: WatchdogHandle,
) -> ! {
    let mut sampler = Sampler::default();
    let mut ticker = Ticker::every(Duration::from_millis(SAMPLE_TICK_MS));
    loop {
        watchdog.pet();
        match sampler.tick(&mut sensor, controller).await {
            TickOutcome::Published(t) => info!("Temperature {} (0.01 degC)", t.centi()),
            TickOutcome::Skipped(_) | TickOutcome::Idle => {}
        }
        ticker.next().await;
    }
}
