//! PCI vendor ID to manufacturer name lookup

/// Manufacturer name for a PCI vendor ID, when known.
pub fn manufacturer(vid: u16) -> Option<&'static str> {
    match vid {
        0x025e => Some("Solidigm"),
        0x1179 => Some("Toshiba"),
        0x1344 => Some("Micron"),
        0x144d => Some("SAMSUNG"),
        0x15b7 => Some("Sandisk"),
        0x1b96 => Some("Western Digital"),
        0x1bb1 => Some("Seagate"),
        0x1c5c => Some("SK hynix"),
        0x1e0f => Some("KIOXIA"),
        0x8086 => Some("Intel"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vendors() {
        assert_eq!(manufacturer(0x144d), Some("SAMSUNG"));
        assert_eq!(manufacturer(0x8086), Some("Intel"));
        assert_eq!(manufacturer(0xbeef), None);
    }
}
