use core::fmt::Write;

use heapless::String;

/// Capacity of a device name.
pub const DEVICE_NAME_CAPACITY: usize = 32;

pub type DeviceName = String<DEVICE_NAME_CAPACITY>;

/// `"<prefix> AA:BB:CC:DD:EE:FF"` from a radio address in display order.
pub fn fallback_name(prefix: &str, mac: [u8; 6]) -> DeviceName {
    let mut name = DeviceName::new();
    push_truncated(&mut name, prefix);
    for (i, byte) in mac.iter().enumerate() {
        let sep = if i == 0 { ' ' } else { ':' };
        if write!(&mut name, "{}{:02X}", sep, byte).is_err() {
            break;
        }
    }
    name
}

/// Use `configured` unless it is absent or empty, else the address-derived name.
pub fn device_name(configured: Option<&str>, prefix: &str, mac: [u8; 6]) -> DeviceName {
    match configured {
        Some(name) if !name.is_empty() => {
            let mut n = DeviceName::new();
            push_truncated(&mut n, name);
            n
        }
        _ => fallback_name(prefix, mac),
    }
}

fn push_truncated(dst: &mut DeviceName, src: &str) {
    for c in src.chars() {
        if dst.push(c).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_uppercase_colon_separated() {
        let name = fallback_name("Temp", [0xd8, 0x3a, 0xdd, 0x01, 0xab, 0x0f]);
        assert_eq!(name.as_str(), "Temp D8:3A:DD:01:AB:0F");
    }

    #[test]
    fn configured_name_wins() {
        let name = device_name(Some("Greenhouse"), "Temp", [0; 6]);
        assert_eq!(name.as_str(), "Greenhouse");
    }

    #[test]
    fn empty_configured_name_falls_back() {
        let name = device_name(Some(""), "Temp", [1, 2, 3, 4, 5, 6]);
        assert_eq!(name.as_str(), "Temp 01:02:03:04:05:06");
    }

    #[test]
    fn long_name_truncated_to_capacity() {
        let long = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let name = device_name(Some(long), "Temp", [0; 6]);
        assert_eq!(name.len(), DEVICE_NAME_CAPACITY);
        assert!(long.starts_with(name.as_str()));
    }
}
