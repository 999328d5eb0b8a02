//! Nordic SoftDevice S140 backend for [`Radio`].
//!
//! The SoftDevice comes up in `activate`, gets the Environmental Sensing
//! table in `register_service`, and is handed to its runner task on the
//! first `start_advertising`.  From then on three kinds of tasks run:
//!
//! - **softdevice_task** - pumps SoftDevice events.
//! - **advertiser_task** - advertises with the latest request and spawns a
//!   connection task per accepted link.  While link slots remain it keeps
//!   advertising; otherwise it waits for the next re-arm.
//! - **connection_task** - emits `Connected`, runs the GATT server
//!   (forwarding indication outcomes), emits `Disconnected` when the link
//!   drops.
//!
//! All events reach the application through [`RADIO_EVENTS`].

use core::mem;

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, CharacteristicHandles, WriteOp};
use nrf_softdevice::ble::{get_address, peripheral, Connection, Uuid};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;

use crate::ble::adv_payload::AdvPayload;
use crate::ble::gatt::{AccessFlags, BleUuid, ServiceDescriptor};
use crate::ble::name::DEVICE_NAME_CAPACITY;
use crate::ble::{AttrHandle, ConnHandle, IndicateStatus, Radio, RadioEvent};
use crate::config::{EVENT_QUEUE_DEPTH, MAX_CONNECTIONS};
use crate::error::BleError;

/// Radio → controller event queue.
pub static RADIO_EVENTS: Channel<CriticalSectionRawMutex, RadioEvent, EVENT_QUEUE_DEPTH> =
    Channel::new();

/// Latest advertising request; a new one restarts advertising.
static ADV_REQUEST: Signal<CriticalSectionRawMutex, AdvRequest> = Signal::new();

static SERVER: StaticCell<SensingServer> = StaticCell::new();

/// GAP name until the controller sets the real one.
const BOOT_GAP_NAME: &[u8] = b"envsense";

/// Largest characteristic value we read back before a push.
const MAX_VALUE_LEN: usize = 20;

/// Bluetooth base UUID 0000xxxx-0000-1000-8000-00805F9B34FB.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

#[derive(Clone)]
struct AdvRequest {
    interval_ms: u32,
    payload: AdvPayload,
}

// ═══════════════════════════════════════════════════════════════════════════
// GATT server
// ═══════════════════════════════════════════════════════════════════════════

/// Attribute handles of the registered service.
pub struct SensingServer {
    temperature: CharacteristicHandles,
}

pub enum SensingEvent {
    /// Central changed its subscription.
    CccdWrite { notifications: bool, indications: bool },
    /// Handle-value confirmation received.
    IndicateConfirmed { handle: u16 },
    /// ATT transaction timed out (no confirmation).
    IndicateTimeout,
}

impl gatt_server::Server for SensingServer {
    type Event = SensingEvent;

    fn on_write(
        &self,
        _conn: &Connection,
        handle: u16,
        _op: WriteOp,
        _offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        if handle != self.temperature.cccd_handle {
            return None;
        }
        let bits = data.first().copied().unwrap_or(0);
        Some(SensingEvent::CccdWrite {
            notifications: bits & 0x01 != 0,
            indications: bits & 0x02 != 0,
        })
    }

    fn on_indicate_confirm(&self, _conn: &Connection, handle: u16) -> Option<Self::Event> {
        Some(SensingEvent::IndicateConfirmed { handle })
    }

    fn on_timeout(&self, _conn: &Connection) -> Option<Self::Event> {
        Some(SensingEvent::IndicateTimeout)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Radio
// ═══════════════════════════════════════════════════════════════════════════

enum Stack {
    Off,
    /// Enabled, attribute table still open for registration.
    Enabled(&'static mut Softdevice),
    /// Runner task owns the event loop.
    Running(&'static Softdevice),
}

pub struct SoftdeviceRadio {
    spawner: Spawner,
    stack: Stack,
    server: Option<&'static SensingServer>,
}

impl SoftdeviceRadio {
    pub fn new(spawner: Spawner) -> Self {
        Self {
            spawner,
            stack: Stack::Off,
            server: None,
        }
    }

    fn sd(&self) -> Result<&Softdevice, BleError> {
        match &self.stack {
            Stack::Off => Err(BleError::NotActive),
            Stack::Enabled(sd) => Ok(sd),
            Stack::Running(sd) => Ok(sd),
        }
    }

    /// Hand the SoftDevice to its runner and start the advertiser.
    fn ensure_running(&mut self) -> Result<(), BleError> {
        let sd: &'static Softdevice = match mem::replace(&mut self.stack, Stack::Off) {
            Stack::Off => return Err(BleError::NotActive),
            Stack::Running(sd) => {
                self.stack = Stack::Running(sd);
                return Ok(());
            }
            Stack::Enabled(sd) => sd,
        };
        self.stack = Stack::Running(sd);

        let server = self.server.ok_or(BleError::NotActive)?;
        self.spawner
            .spawn(softdevice_task(sd))
            .map_err(|_| BleError::SpawnFailed)?;
        self.spawner
            .spawn(advertiser_task(sd, server, self.spawner))
            .map_err(|_| BleError::SpawnFailed)?;
        Ok(())
    }

    fn link(conn: ConnHandle) -> Result<Connection, BleError> {
        Connection::iter()
            .find(|c| c.handle() == Some(conn.0))
            .ok_or(BleError::NotConnected)
    }

    fn stored_value<'b>(
        &self,
        attr: AttrHandle,
        buf: &'b mut [u8; MAX_VALUE_LEN],
    ) -> Result<&'b [u8], BleError> {
        let len = gatt_server::get_value(self.sd()?, attr.0, buf).map_err(|_| BleError::WriteFailed)?;
        Ok(&buf[..len])
    }
}

impl Radio for SoftdeviceRadio {
    fn activate(&mut self) -> Result<(), BleError> {
        if matches!(self.stack, Stack::Off) {
            // Panics inside the SoftDevice crate if the stack refuses to start.
            self.stack = Stack::Enabled(Softdevice::enable(&softdevice_config()));
            info!("SoftDevice enabled");
        }
        Ok(())
    }

    fn register_service(&mut self, descriptor: &ServiceDescriptor) -> Result<AttrHandle, BleError> {
        let Stack::Enabled(sd) = &mut self.stack else {
            return Err(BleError::NotActive);
        };

        let mut builder = ServiceBuilder::new(sd, to_sd_uuid(descriptor.uuid))
            .map_err(|_| BleError::RegisterFailed)?;

        let ch = &descriptor.characteristic;
        let zeros = [0u8; MAX_VALUE_LEN];
        let value = &zeros[..ch.value_len.min(MAX_VALUE_LEN)];
        let temperature = builder
            .add_characteristic(
                to_sd_uuid(ch.uuid),
                Attribute::new(value),
                Metadata::new(to_properties(ch.flags)),
            )
            .map_err(|_| BleError::RegisterFailed)?
            .build();
        let _service = builder.build();

        let attr = AttrHandle(temperature.value_handle);
        let server = SERVER
            .try_init(SensingServer { temperature })
            .ok_or(BleError::RegisterFailed)?;
        self.server = Some(server);

        info!("GATT service registered, value handle {}", attr.0);
        Ok(attr)
    }

    fn address(&self) -> Result<[u8; 6], BleError> {
        let mut bytes = get_address(self.sd()?).bytes();
        bytes.reverse();
        Ok(bytes)
    }

    fn set_device_name(&mut self, name: &str) -> Result<(), BleError> {
        self.sd()?;
        // Zeroed security mode: centrals may read but not write the name.
        let write_perm: raw::ble_gap_conn_sec_mode_t = unsafe { mem::zeroed() };
        let ret = unsafe {
            raw::sd_ble_gap_device_name_set(&write_perm, name.as_ptr(), name.len() as u16)
        };
        if ret != raw::NRF_SUCCESS {
            return Err(BleError::Raw(ret));
        }
        Ok(())
    }

    fn write_attribute(&mut self, attr: AttrHandle, value: &[u8]) -> Result<(), BleError> {
        gatt_server::set_value(self.sd()?, attr.0, value).map_err(|_| BleError::WriteFailed)
    }

    fn notify(&mut self, conn: ConnHandle, attr: AttrHandle) -> Result<(), BleError> {
        let link = Self::link(conn)?;
        let mut buf = [0u8; MAX_VALUE_LEN];
        let value = self.stored_value(attr, &mut buf)?;
        gatt_server::notify_value(&link, attr.0, value).map_err(|_| BleError::NotifyFailed)
    }

    fn indicate(&mut self, conn: ConnHandle, attr: AttrHandle) -> Result<(), BleError> {
        let link = Self::link(conn)?;
        let mut buf = [0u8; MAX_VALUE_LEN];
        let value = self.stored_value(attr, &mut buf)?;
        gatt_server::indicate_value(&link, attr.0, value).map_err(|_| BleError::IndicateFailed)
    }

    fn start_advertising(&mut self, interval_ms: u32, payload: &AdvPayload) -> Result<(), BleError> {
        self.ensure_running()?;
        ADV_REQUEST.signal(AdvRequest {
            interval_ms,
            payload: payload.clone(),
        });
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn advertiser_task(
    sd: &'static Softdevice,
    server: &'static SensingServer,
    spawner: Spawner,
) -> ! {
    let mut request = ADV_REQUEST.wait().await;
    loop {
        let config = peripheral::Config {
            interval: adv_interval_units(request.interval_ms),
            ..Default::default()
        };
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &request.payload,
            scan_data: &[],
        };

        match select(
            ADV_REQUEST.wait(),
            peripheral::advertise_connectable(sd, adv, &config),
        )
        .await
        {
            // Re-armed while advertising: restart with the new request.
            Either::First(next) => request = next,
            Either::Second(Ok(conn)) => {
                if spawner.spawn(connection_task(conn, server)).is_err() {
                    warn!("No free connection task - dropping link");
                }
                if Connection::iter().count() >= MAX_CONNECTIONS {
                    info!("All link slots in use - advertising paused");
                    request = ADV_REQUEST.wait().await;
                }
            }
            Either::Second(Err(e)) => {
                warn!("Advertising stopped: {:?}", e);
                request = ADV_REQUEST.wait().await;
            }
        }
    }
}

#[embassy_executor::task(pool_size = MAX_CONNECTIONS)]
async fn connection_task(conn: Connection, server: &'static SensingServer) {
    let Some(raw_handle) = conn.handle() else {
        return;
    };
    let handle = ConnHandle(raw_handle);
    let value_handle = server.temperature.value_handle;

    RADIO_EVENTS.send(RadioEvent::Connected(handle)).await;

    let reason = gatt_server::run(&conn, server, |event| {
        let ack = match event {
            SensingEvent::CccdWrite {
                notifications,
                indications,
            } => {
                info!(
                    "handle {}: notifications={} indications={}",
                    raw_handle, notifications, indications
                );
                return;
            }
            SensingEvent::IndicateConfirmed { handle: attr } => RadioEvent::IndicateAck {
                conn: handle,
                attr: AttrHandle(attr),
                status: IndicateStatus::Confirmed,
            },
            SensingEvent::IndicateTimeout => RadioEvent::IndicateAck {
                conn: handle,
                attr: AttrHandle(value_handle),
                status: IndicateStatus::Timeout,
            },
        };
        // try_send avoids blocking the GATT loop; diagnostics only.
        if RADIO_EVENTS.try_send(ack).is_err() {
            warn!("Radio event queue full - dropping indication outcome");
        }
    })
    .await;

    info!("handle {} link closed: {:?}", raw_handle, reason);
    RADIO_EVENTS.send(RadioEvent::Disconnected(handle)).await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_CONNECTIONS as u8,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: MAX_CONNECTIONS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: BOOT_GAP_NAME.as_ptr() as _,
            current_len: BOOT_GAP_NAME.len() as u16,
            max_len: DEVICE_NAME_CAPACITY as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

fn to_sd_uuid(uuid: BleUuid) -> Uuid {
    match uuid {
        BleUuid::Uuid16(v) => Uuid::new_16(v),
        BleUuid::Uuid32(v) => {
            Uuid::new_128(&(BLUETOOTH_BASE_UUID | (u128::from(v) << 96)).to_le_bytes())
        }
        BleUuid::Uuid128(v) => Uuid::new_128(&v.to_le_bytes()),
    }
}

fn to_properties(flags: AccessFlags) -> Properties {
    let mut props = Properties::new();
    if flags.contains(AccessFlags::READ) {
        props = props.read();
    }
    if flags.contains(AccessFlags::NOTIFY) {
        props = props.notify();
    }
    if flags.contains(AccessFlags::INDICATE) {
        props = props.indicate();
    }
    props
}

/// Milliseconds → 0.625 ms units, clamped to the legacy range (20 ms .. 10.24 s).
fn adv_interval_units(ms: u32) -> u32 {
    (ms.saturating_mul(8) / 5).clamp(32, 16_384)
}
