//! Device-level read and write operations for the DVI LV12.
//!
//! Three quirks of this controller shape the codec:
//!
//! - The coil block is read in one custom 14-bit window starting at coil 1,
//!   and the response frame is validated manually rather than trusting a
//!   generic coil decoder.
//! - Several settings registers have no holding-register read path. Their
//!   current value is recovered from the echo of a **zero-delta write**: an
//!   FC06 transaction with the value field fixed at 0x0000. The wire traffic
//!   is indistinguishable from a write; only the echoed reply matters. The
//!   0x0000 value field is a protocol constant inferred from device behavior
//!   and must not be extended to other function codes.
//! - Input registers are read with zero decimals at the wire level; scaling
//!   is applied by the caller per the schema.

use crate::bus::{BusError, SerialBus};
use crate::schema::RegisterSchema;
use std::collections::BTreeMap;

const FN_READ_COILS: u8 = 0x01;
const FN_READ_INPUT: u8 = 0x04;
const FN_WRITE_SINGLE: u8 = 0x06;

/// First coil in the read window.
pub const COIL_WINDOW_START: u16 = 0x0001;
/// Number of coils in the read window.
pub const COIL_WINDOW_COUNT: u16 = 0x000E;

/// Errors raised by codec operations, carrying the affected address.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("register {address:#06x}: malformed frame: {detail}")]
    Framing { address: u16, detail: String },
    #[error("register {address:#06x}: {source}")]
    Bus {
        address: u16,
        #[source]
        source: BusError,
    },
}

impl ProtocolError {
    fn framing(address: u16, detail: impl Into<String>) -> Self {
        Self::Framing {
            address,
            detail: detail.into(),
        }
    }
}

/// Read the coil window and return the 16-bit status mask.
pub async fn read_coils(bus: &SerialBus) -> Result<u16, ProtocolError> {
    let payload = [
        (COIL_WINDOW_START >> 8) as u8,
        (COIL_WINDOW_START & 0xFF) as u8,
        (COIL_WINDOW_COUNT >> 8) as u8,
        (COIL_WINDOW_COUNT & 0xFF) as u8,
    ];
    let data = bus
        .transact(FN_READ_COILS, &payload)
        .await
        .map_err(|source| ProtocolError::Bus {
            address: COIL_WINDOW_START,
            source,
        })?;
    parse_coil_mask(&data)
}

/// Parse the FC01 response data into the coil status mask.
///
/// The first byte must be the expected byte count (2); the two status bytes
/// are reassembled low byte first, so bit *i* of the mask is coil window
/// bit *i*.
pub fn parse_coil_mask(data: &[u8]) -> Result<u16, ProtocolError> {
    if data.len() < 3 {
        return Err(ProtocolError::framing(
            COIL_WINDOW_START,
            format!("coil response too short ({} bytes)", data.len()),
        ));
    }
    if data[0] != 2 {
        return Err(ProtocolError::framing(
            COIL_WINDOW_START,
            format!("coil response byte count {} != 2", data[0]),
        ));
    }
    Ok((u16::from(data[2]) << 8) | u16::from(data[1]))
}

/// Decode a coil mask into a label→0/1 map. Only bits named in the schema
/// appear; the unnamed bit 13 can never surface regardless of mask contents.
pub fn decode_coils(schema: &RegisterSchema, mask: u16) -> BTreeMap<String, u8> {
    schema
        .coils()
        .iter()
        .map(|def| (def.label.to_string(), ((mask >> def.bit) & 1) as u8))
        .collect()
}

/// Read a single input register (FC04), returning the raw 16-bit value.
pub async fn read_input(bus: &SerialBus, address: u16) -> Result<u16, ProtocolError> {
    let payload = [
        (address >> 8) as u8,
        (address & 0xFF) as u8,
        0x00,
        0x01,
    ];
    let data = bus
        .transact(FN_READ_INPUT, &payload)
        .await
        .map_err(|source| ProtocolError::Bus { address, source })?;

    if data.len() != 3 || data[0] != 2 {
        return Err(ProtocolError::framing(
            address,
            format!("unexpected input register response: {:02x?}", data),
        ));
    }
    Ok((u16::from(data[1]) << 8) | u16::from(data[2]))
}

/// Recover a register's current value from the echo of a zero-delta write.
///
/// Sends FC06 with the value field fixed at 0x0000 and parses the echoed
/// reply. Calling this a "read" is a naming convenience; on the wire this is
/// a write.
pub async fn echo_read(bus: &SerialBus, address: u16) -> Result<u16, ProtocolError> {
    let payload = [(address >> 8) as u8, (address & 0xFF) as u8, 0x00, 0x00];
    let data = bus
        .transact(FN_WRITE_SINGLE, &payload)
        .await
        .map_err(|source| ProtocolError::Bus { address, source })?;
    parse_echo(address, &data)
}

/// Parse an FC06 echo: address word then value word, both big-endian.
pub fn parse_echo(address: u16, data: &[u8]) -> Result<u16, ProtocolError> {
    if data.len() != 4 {
        return Err(ProtocolError::framing(
            address,
            format!("echo response has {} data bytes, expected 4", data.len()),
        ));
    }
    let echoed = (u16::from(data[0]) << 8) | u16::from(data[1]);
    if echoed != address {
        return Err(ProtocolError::framing(
            address,
            format!("echo for register {:#06x}", echoed),
        ));
    }
    Ok((u16::from(data[2]) << 8) | u16::from(data[3]))
}

/// Write a single register (FC06). Command path only; never used by polling.
pub async fn write_register(
    bus: &SerialBus,
    address: u16,
    value: u16,
) -> Result<(), ProtocolError> {
    let payload = [
        (address >> 8) as u8,
        (address & 0xFF) as u8,
        (value >> 8) as u8,
        (value & 0xFF) as u8,
    ];
    let data = bus
        .transact(FN_WRITE_SINGLE, &payload)
        .await
        .map_err(|source| ProtocolError::Bus { address, source })?;

    // A genuine write echoes the request; only the address is checked since
    // the device may clamp the value.
    parse_echo(address, &data)?;
    Ok(())
}

/// Round `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coil_mask_low_byte_first() {
        // Low byte 0b0001_0101, high byte 0b0100_0000.
        let mask = parse_coil_mask(&[0x02, 0b0001_0101, 0b0100_0000]).unwrap();
        assert_eq!(mask, 0b0100_0000_0001_0101);
    }

    #[test]
    fn test_parse_coil_mask_rejects_bad_byte_count() {
        for count in [0u8, 1, 3, 4, 0xFF] {
            let err = parse_coil_mask(&[count, 0x00, 0x00]).unwrap_err();
            assert!(matches!(err, ProtocolError::Framing { .. }));
        }
    }

    #[test]
    fn test_parse_coil_mask_rejects_short_response() {
        assert!(parse_coil_mask(&[]).is_err());
        assert!(parse_coil_mask(&[0x02]).is_err());
        assert!(parse_coil_mask(&[0x02, 0x01]).is_err());
    }

    #[test]
    fn test_decode_coils_maps_bits_to_labels() {
        let schema = RegisterSchema::dvi_lv12();

        // Every named bit decodes to exactly the bit value, for all positions.
        for bit in 0..16u8 {
            let mask = 1u16 << bit;
            let coils = decode_coils(&schema, mask);
            for def in schema.coils() {
                let expected = u8::from(def.bit == bit);
                assert_eq!(coils[def.label], expected, "bit {}", bit);
            }
        }
    }

    #[test]
    fn test_decode_coils_never_emits_bit_13() {
        let schema = RegisterSchema::dvi_lv12();
        // All bits set, including 13.
        let coils = decode_coils(&schema, 0xFFFF);
        assert_eq!(coils.len(), schema.coils().len());
        assert!(coils.values().all(|&v| v == 1));
        // No label corresponds to bit 13.
        assert!(schema.coils().iter().all(|def| def.bit != 13));
    }

    #[test]
    fn test_parse_echo_returns_current_value() {
        // Register 0xD0 echoing raw value 305.
        let value = parse_echo(0x00D0, &[0x00, 0xD0, 0x01, 0x31]).unwrap();
        assert_eq!(value, 305);
    }

    #[test]
    fn test_parse_echo_rejects_wrong_register() {
        let err = parse_echo(0x00D0, &[0x00, 0xD1, 0x01, 0x31]).unwrap_err();
        assert!(matches!(err, ProtocolError::Framing { .. }));
    }

    #[test]
    fn test_parse_echo_rejects_short_data() {
        assert!(parse_echo(0x00D0, &[0x00, 0xD0, 0x01]).is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(21.54, 1), 21.5);
        assert_eq!(round_to(215.0 * 0.1, 1), 21.5);
        assert_eq!(round_to(12345.0 * 0.0001, 4), 1.2345);
        assert_eq!(round_to(42.0, 0), 42.0);
    }
}
