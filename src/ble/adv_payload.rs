//! Legacy advertising payload builder.
//!
//! Layout is a sequence of AD structures `[len][type][data...]` where
//! `len` counts the type byte plus data.  Emitted order:
//!
//! 1. Flags (LE General Discoverable, BR/EDR not supported)
//! 2. Local name - complete, or shortened when space runs out
//! 3. Complete service UUID lists, one AD structure per UUID width

use heapless::Vec;

use crate::ble::gatt::BleUuid;
use crate::error::AdvError;

/// Maximum legacy advertising payload.
pub const MAX_ADV_LEN: usize = 31;

pub type AdvPayload = Vec<u8, MAX_ADV_LEN>;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
const AD_TYPE_UUID32_COMPLETE: u8 = 0x05;
const AD_TYPE_UUID128_COMPLETE: u8 = 0x07;
const AD_TYPE_NAME_SHORT: u8 = 0x08;
const AD_TYPE_NAME_COMPLETE: u8 = 0x09;

const FLAG_LE_GENERAL_DISC: u8 = 0x02;
const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// AD header: length byte + type byte.
const AD_HEADER_LEN: usize = 2;

/// Build the advertising payload for `name` and `services`.
///
/// Flags and the service lists are mandatory; if they alone exceed
/// [`MAX_ADV_LEN`] the build fails.  The name gets whatever is left:
/// it is cut on a UTF-8 boundary and tagged as shortened if needed, and
/// dropped entirely if not a single byte fits.
pub fn build(name: &str, services: &[BleUuid]) -> Result<AdvPayload, AdvError> {
    let widths = [
        (2, AD_TYPE_UUID16_COMPLETE),
        (4, AD_TYPE_UUID32_COMPLETE),
        (16, AD_TYPE_UUID128_COMPLETE),
    ];

    let flags_len = AD_HEADER_LEN + 1;
    let mut services_len = 0;
    for (width, _) in widths {
        let count = services.iter().filter(|u| u.width() == width).count();
        if count > 0 {
            services_len += AD_HEADER_LEN + count * width;
        }
    }
    if flags_len + services_len > MAX_ADV_LEN {
        return Err(AdvError::PayloadTooLarge);
    }

    let mut payload = AdvPayload::new();
    push_ad(
        &mut payload,
        AD_TYPE_FLAGS,
        &[FLAG_LE_GENERAL_DISC | FLAG_BR_EDR_NOT_SUPPORTED],
    )?;

    let name_room = MAX_ADV_LEN - flags_len - services_len;
    if !name.is_empty() && name_room > AD_HEADER_LEN {
        let room = name_room - AD_HEADER_LEN;
        if name.len() <= room {
            push_ad(&mut payload, AD_TYPE_NAME_COMPLETE, name.as_bytes())?;
        } else {
            let cut = floor_char_boundary(name, room);
            if cut > 0 {
                push_ad(&mut payload, AD_TYPE_NAME_SHORT, &name.as_bytes()[..cut])?;
            }
        }
    }

    for (width, ad_type) in widths {
        let mut list: Vec<u8, MAX_ADV_LEN> = Vec::new();
        for uuid in services.iter().filter(|u| u.width() == width) {
            let ok = match *uuid {
                BleUuid::Uuid16(v) => list.extend_from_slice(&v.to_le_bytes()),
                BleUuid::Uuid32(v) => list.extend_from_slice(&v.to_le_bytes()),
                BleUuid::Uuid128(v) => list.extend_from_slice(&v.to_le_bytes()),
            };
            ok.map_err(|_| AdvError::PayloadTooLarge)?;
        }
        if !list.is_empty() {
            push_ad(&mut payload, ad_type, &list)?;
        }
    }

    Ok(payload)
}

fn push_ad(payload: &mut AdvPayload, ad_type: u8, data: &[u8]) -> Result<(), AdvError> {
    let len = u8::try_from(data.len() + 1).map_err(|_| AdvError::PayloadTooLarge)?;
    payload
        .extend_from_slice(&[len, ad_type])
        .and_then(|_| payload.extend_from_slice(data))
        .map_err(|_| AdvError::PayloadTooLarge)
}

/// Largest index `<= max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut i = max.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
