//! Peripheral controller - the BLE state machine.
//!
//! Owns the set of live links and the current temperature value.  Radio
//! events come in through [`PeripheralController::handle_event`], readings
//! through [`PeripheralController::update`]; nothing else mutates it.
//!
//! Per link the machine is `advertising-idle → connected → advertising-idle`
//! with no terminal state.  Advertising is re-armed on every disconnect and
//! otherwise left to the radio stack, so new centrals can join while others
//! are connected.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use embassy_sync::mutex::Mutex;
use heapless::FnvIndexSet;

use crate::ble::adv_payload::{self, AdvPayload};
use crate::ble::gatt::ENVIRONMENTAL_SENSING;
use crate::ble::name::{self, DeviceName};
use crate::ble::{AttrHandle, ConnHandle, IndicateStatus, Radio, RadioEvent};
use crate::config::{ADV_INTERVAL_MS, DEVICE_NAME_PREFIX, MAX_CONNECTIONS};
use crate::error::{BleError, Error};
use crate::temperature::Temperature;

/// Live links as seen by the controller.
pub type ConnectionSet = FnvIndexSet<ConnHandle, MAX_CONNECTIONS>;

/// How many pushes an [`PeripheralController::update`] actually queued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Delivery {
    pub notified: usize,
    pub indicated: usize,
}

/// Indication outcomes, kept for diagnostics only (no retries).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicationStats {
    pub confirmed: u32,
    pub timed_out: u32,
}

pub struct PeripheralController<R: Radio> {
    radio: R,
    attr: AttrHandle,
    connections: ConnectionSet,
    value: Temperature,
    name: DeviceName,
    payload: AdvPayload,
    adv_starts: u32,
    indications: IndicationStats,
}

impl<R: Radio> PeripheralController<R> {
    /// Activate the radio, register the Environmental Sensing service,
    /// derive the device name and start advertising.
    ///
    /// Any error here is fatal: the device has no way to serve without
    /// its radio and service.
    pub fn initialize(mut radio: R, configured_name: Option<&str>) -> Result<Self, Error> {
        radio.activate()?;
        let attr = radio.register_service(&ENVIRONMENTAL_SENSING)?;

        let name = name::device_name(configured_name, DEVICE_NAME_PREFIX, radio.address()?);
        info!("Sensor name {}", name.as_str());
        radio.set_device_name(&name)?;

        let payload = adv_payload::build(&name, &[ENVIRONMENTAL_SENSING.uuid])?;

        let mut controller = Self {
            radio,
            attr,
            connections: ConnectionSet::new(),
            value: Temperature::default(),
            name,
            payload,
            adv_starts: 0,
            indications: IndicationStats::default(),
        };
        controller.advertise()?;
        Ok(controller)
    }

    /// Single entry point for radio events.
    pub fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Connected(conn) => self.on_connect(conn),
            RadioEvent::Disconnected(conn) => self.on_disconnect(conn),
            RadioEvent::IndicateAck { conn, attr, status } => {
                self.on_indicate_ack(conn, attr, status)
            }
        }
    }

    pub fn on_connect(&mut self, conn: ConnHandle) {
        match self.connections.insert(conn) {
            Ok(true) => info!(
                "BLE connected: handle {} ({} active)",
                conn.0,
                self.connections.len()
            ),
            Ok(false) => debug!("BLE connect for already tracked handle {}", conn.0),
            Err(_) => warn!("BLE connection set full - not tracking handle {}", conn.0),
        }
    }

    /// Forget `conn` and re-arm advertising.
    ///
    /// The handle is removed before advertising restarts so no stale link
    /// can be targeted by a later fan-out.  Untracked handles are ignored
    /// but still re-arm advertising.
    pub fn on_disconnect(&mut self, conn: ConnHandle) {
        if self.connections.remove(&conn) {
            info!(
                "BLE disconnected: handle {} ({} active)",
                conn.0,
                self.connections.len()
            );
        } else {
            debug!("BLE disconnect for untracked handle {}", conn.0);
        }

        if let Err(e) = self.advertise() {
            error!("BLE readvertise failed: {:?}", e);
        }
    }

    pub fn on_indicate_ack(&mut self, conn: ConnHandle, attr: AttrHandle, status: IndicateStatus) {
        if attr != self.attr {
            return;
        }
        match status {
            IndicateStatus::Confirmed => {
                self.indications.confirmed = self.indications.confirmed.wrapping_add(1);
                trace!("Indication confirmed by handle {}", conn.0);
            }
            IndicateStatus::Timeout => {
                self.indications.timed_out = self.indications.timed_out.wrapping_add(1);
                warn!("Indication to handle {} not confirmed", conn.0);
            }
        }
    }

    /// Store `value` and push it to every live link.
    ///
    /// The attribute store is written exactly once, before any push.
    /// Per-link push failures (link just dropped, central not subscribed)
    /// are not errors; they only lower the returned counts.
    pub fn update(
        &mut self,
        value: Temperature,
        notify: bool,
        indicate: bool,
    ) -> Result<Delivery, BleError> {
        info!("write temp {} centi-degC", value.centi());
        self.radio.write_attribute(self.attr, &value.to_le_bytes())?;
        self.value = value;

        let mut delivery = Delivery::default();
        if !(notify || indicate) {
            return Ok(delivery);
        }

        for &conn in self.connections.iter() {
            if notify {
                match self.radio.notify(conn, self.attr) {
                    Ok(()) => delivery.notified += 1,
                    Err(e) => debug!("notify to handle {} skipped: {:?}", conn.0, e),
                }
            }
            if indicate {
                match self.radio.indicate(conn, self.attr) {
                    Ok(()) => delivery.indicated += 1,
                    Err(e) => debug!("indicate to handle {} skipped: {:?}", conn.0, e),
                }
            }
        }
        Ok(delivery)
    }

    fn advertise(&mut self) -> Result<(), BleError> {
        self.radio.start_advertising(ADV_INTERVAL_MS, &self.payload)?;
        self.adv_starts = self.adv_starts.wrapping_add(1);
        debug!("Advertising armed ({} times)", self.adv_starts);
        Ok(())
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    pub fn is_connected(&self, conn: ConnHandle) -> bool {
        self.connections.contains(&conn)
    }

    /// Last value accepted by [`Self::update`].
    pub fn value(&self) -> Temperature {
        self.value
    }

    pub fn attr_handle(&self) -> AttrHandle {
        self.attr
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &AdvPayload {
        &self.payload
    }

    /// Number of times advertising was (re)started, initial start included.
    pub fn advertising_starts(&self) -> u32 {
        self.adv_starts
    }

    pub fn indication_stats(&self) -> IndicationStats {
        self.indications
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

/// Drain radio events into the controller forever.
///
/// The lock is held for one event at a time, so the sampling side never
/// waits longer than a single handler.
pub async fn run_events<M: RawMutex, R: Radio, const N: usize>(
    controller: &Mutex<M, PeripheralController<R>>,
    events: Receiver<'_, M, RadioEvent, N>,
) -> ! {
    loop {
        let event = events.receive().await;
        controller.lock().await.handle_event(event);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::gatt::ServiceDescriptor;
    use std::collections::BTreeSet;
    use std::vec::Vec;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Activate,
        Register,
        SetName(std::string::String),
        Write(AttrHandle, [u8; 2]),
        Notify(ConnHandle),
        Indicate(ConnHandle),
        Advertise(u32, Vec<u8>),
    }

    #[derive(Default)]
    struct FakeRadio {
        calls: Vec<Call>,
        stored: Option<[u8; 2]>,
        gone: Vec<ConnHandle>,
        fail_activate: bool,
        fail_register: bool,
    }

    impl FakeRadio {
        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
        fn notifies(&self) -> usize {
            self.count(|c| matches!(c, Call::Notify(_)))
        }
        fn indicates(&self) -> usize {
            self.count(|c| matches!(c, Call::Indicate(_)))
        }
        fn adverts(&self) -> usize {
            self.count(|c| matches!(c, Call::Advertise(..)))
        }
    }

    impl Radio for FakeRadio {
        fn activate(&mut self) -> Result<(), BleError> {
            self.calls.push(Call::Activate);
            if self.fail_activate {
                Err(BleError::Raw(8))
            } else {
                Ok(())
            }
        }
        fn register_service(&mut self, _d: &ServiceDescriptor) -> Result<AttrHandle, BleError> {
            self.calls.push(Call::Register);
            if self.fail_register {
                Err(BleError::RegisterFailed)
            } else {
                Ok(AttrHandle(12))
            }
        }
        fn address(&self) -> Result<[u8; 6], BleError> {
            Ok([0xD8, 0x3A, 0xDD, 0x01, 0xAB, 0x0F])
        }
        fn set_device_name(&mut self, name: &str) -> Result<(), BleError> {
            self.calls.push(Call::SetName(name.into()));
            Ok(())
        }
        fn write_attribute(&mut self, attr: AttrHandle, value: &[u8]) -> Result<(), BleError> {
            let bytes = [value[0], value[1]];
            self.stored = Some(bytes);
            self.calls.push(Call::Write(attr, bytes));
            Ok(())
        }
        fn notify(&mut self, conn: ConnHandle, _attr: AttrHandle) -> Result<(), BleError> {
            if self.gone.contains(&conn) {
                return Err(BleError::NotConnected);
            }
            self.calls.push(Call::Notify(conn));
            Ok(())
        }
        fn indicate(&mut self, conn: ConnHandle, _attr: AttrHandle) -> Result<(), BleError> {
            if self.gone.contains(&conn) {
                return Err(BleError::NotConnected);
            }
            self.calls.push(Call::Indicate(conn));
            Ok(())
        }
        fn start_advertising(&mut self, interval_ms: u32, payload: &AdvPayload) -> Result<(), BleError> {
            self.calls.push(Call::Advertise(interval_ms, payload.to_vec()));
            Ok(())
        }
    }

    fn controller() -> PeripheralController<FakeRadio> {
        PeripheralController::initialize(FakeRadio::default(), None).unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Startup
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn initialize_registers_then_advertises_with_fallback_name() {
        let c = controller();
        assert_eq!(c.device_name(), "Temp D8:3A:DD:01:AB:0F");
        assert_eq!(c.attr_handle(), AttrHandle(12));
        assert_eq!(c.advertising_starts(), 1);
        assert!(c.connections().is_empty());

        let calls = &c.radio().calls;
        assert_eq!(calls[0], Call::Activate);
        assert_eq!(calls[1], Call::Register);
        assert_eq!(calls[2], Call::SetName("Temp D8:3A:DD:01:AB:0F".into()));
        assert_eq!(
            calls[3],
            Call::Advertise(ADV_INTERVAL_MS, c.payload().to_vec())
        );
    }

    #[test]
    fn initialize_uses_configured_name() {
        let c = PeripheralController::initialize(FakeRadio::default(), Some("Cellar")).unwrap();
        assert_eq!(c.device_name(), "Cellar");
        assert_eq!(&c.payload()[3..11], &[0x07, 0x09, b'C', b'e', b'l', b'l', b'a', b'r']);
    }

    #[test]
    fn activation_failure_is_fatal() {
        let radio = FakeRadio {
            fail_activate: true,
            ..Default::default()
        };
        let err = PeripheralController::initialize(radio, None).err();
        assert_eq!(err, Some(Error::Ble(BleError::Raw(8))));
    }

    #[test]
    fn registration_failure_is_fatal() {
        let radio = FakeRadio {
            fail_register: true,
            ..Default::default()
        };
        let err = PeripheralController::initialize(radio, None).err();
        assert_eq!(err, Some(Error::Ble(BleError::RegisterFailed)));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn connect_does_not_touch_advertising() {
        let mut c = controller();
        c.handle_event(RadioEvent::Connected(ConnHandle(1)));
        assert!(c.is_connected(ConnHandle(1)));
        assert_eq!(c.radio().adverts(), 1);
    }

    #[test]
    fn duplicate_connect_is_tracked_once() {
        let mut c = controller();
        c.on_connect(ConnHandle(3));
        c.on_connect(ConnHandle(3));
        assert_eq!(c.connections().len(), 1);
    }

    #[test]
    fn disconnect_removes_then_readvertises() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        c.on_disconnect(ConnHandle(1));
        assert!(!c.is_connected(ConnHandle(1)));
        assert_eq!(c.advertising_starts(), 2);
        assert!(matches!(c.radio().calls.last(), Some(Call::Advertise(..))));
    }

    #[test]
    fn disconnect_of_untracked_handle_is_a_noop_but_readvertises() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        c.on_disconnect(ConnHandle(9));
        assert_eq!(c.connections().len(), 1);
        assert!(c.is_connected(ConnHandle(1)));
        assert_eq!(c.advertising_starts(), 2);
    }

    #[test]
    fn connection_set_capacity_is_bounded() {
        let mut c = controller();
        for h in 0..(MAX_CONNECTIONS as u16 + 2) {
            c.on_connect(ConnHandle(h));
        }
        assert_eq!(c.connections().len(), MAX_CONNECTIONS);
    }

    #[test]
    fn connection_set_matches_model_for_random_sequences() {
        // Small LCG so the sequence is reproducible without extra crates.
        let mut seed: u32 = 0x1234_5678;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 16
        };

        for _ in 0..50 {
            let mut c = controller();
            let mut model = BTreeSet::new();
            let mut disconnects = 0;
            for _ in 0..40 {
                let handle = ConnHandle((next() % 6) as u16);
                if next() % 2 == 0 {
                    if model.len() < MAX_CONNECTIONS || model.contains(&handle) {
                        model.insert(handle);
                        c.handle_event(RadioEvent::Connected(handle));
                    }
                } else {
                    model.remove(&handle);
                    disconnects += 1;
                    c.handle_event(RadioEvent::Disconnected(handle));
                }
            }
            let actual: BTreeSet<_> = c.connections().iter().copied().collect();
            assert_eq!(actual, model);
            assert_eq!(c.advertising_starts(), 1 + disconnects);
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Publication
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn update_without_connections_still_stores() {
        let mut c = controller();
        let d = c.update(Temperature::from_celsius(21.5), true, false).unwrap();
        assert_eq!(d, Delivery::default());
        assert_eq!(c.value().centi(), 2150);
        assert_eq!(c.radio().stored, Some(2150i16.to_le_bytes()));
        assert_eq!(c.radio().notifies(), 0);
    }

    #[test]
    fn update_notifies_each_connection_once() {
        let mut c = controller();
        for h in [1, 2, 3] {
            c.on_connect(ConnHandle(h));
        }
        let d = c.update(Temperature::from_celsius(20.0), true, false).unwrap();
        assert_eq!(d.notified, 3);
        assert_eq!(d.indicated, 0);
        assert_eq!(c.radio().notifies(), 3);
        assert_eq!(c.radio().indicates(), 0);
        for h in [1, 2, 3] {
            assert_eq!(c.radio().count(|x| *x == Call::Notify(ConnHandle(h))), 1);
        }
    }

    #[test]
    fn update_writes_store_before_any_push() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        c.update(Temperature::from_celsius(18.0), true, true).unwrap();
        let calls = &c.radio().calls;
        let write = calls.iter().position(|x| matches!(x, Call::Write(..))).unwrap();
        let first_push = calls
            .iter()
            .position(|x| matches!(x, Call::Notify(_) | Call::Indicate(_)))
            .unwrap();
        assert!(write < first_push);
        assert_eq!(c.radio().count(|x| matches!(x, Call::Write(..))), 1);
    }

    #[test]
    fn update_can_notify_and_indicate_together() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        c.on_connect(ConnHandle(2));
        let d = c.update(Temperature::from_celsius(5.0), true, true).unwrap();
        assert_eq!(d, Delivery { notified: 2, indicated: 2 });
    }

    #[test]
    fn update_without_flags_only_stores() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        let d = c.update(Temperature::from_celsius(5.0), false, false).unwrap();
        assert_eq!(d, Delivery::default());
        assert_eq!(c.radio().notifies() + c.radio().indicates(), 0);
        assert_eq!(c.value().centi(), 500);
    }

    #[test]
    fn push_to_vanished_link_is_ignored() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        c.on_connect(ConnHandle(2));
        c.radio.gone.push(ConnHandle(2));
        let d = c.update(Temperature::from_celsius(5.0), true, false).unwrap();
        assert_eq!(d.notified, 1);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Indications
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn indicate_acks_are_counted_not_retried() {
        let mut c = controller();
        c.on_connect(ConnHandle(1));
        c.update(Temperature::from_celsius(5.0), false, true).unwrap();
        let attr = c.attr_handle();
        c.handle_event(RadioEvent::IndicateAck {
            conn: ConnHandle(1),
            attr,
            status: IndicateStatus::Timeout,
        });
        c.handle_event(RadioEvent::IndicateAck {
            conn: ConnHandle(1),
            attr,
            status: IndicateStatus::Confirmed,
        });
        assert_eq!(
            c.indication_stats(),
            IndicationStats {
                confirmed: 1,
                timed_out: 1
            }
        );
        assert_eq!(c.radio().indicates(), 1);
    }

    #[test]
    fn indicate_ack_for_foreign_attribute_is_ignored() {
        let mut c = controller();
        c.on_indicate_ack(ConnHandle(1), AttrHandle(99), IndicateStatus::Confirmed);
        assert_eq!(c.indication_stats(), IndicationStats::default());
    }
}
