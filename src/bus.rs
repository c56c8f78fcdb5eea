//! Serialized access to the Modbus RTU serial line.
//!
//! [`SerialBus`] is the single gate to the physical channel: every wire
//! transaction (request plus response) runs while holding its lock, so frames
//! from the polling path and the command path can never interleave. The lock
//! is released on every exit path, including timeouts and framing errors.

use crate::config::SerialConfig;
use crc::{CRC_16_MODBUS, Crc};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::SerialStream;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Errors raised by a single bus transaction.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("serial open failed: {0}")]
    Open(String),
    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),
    #[error("CRC mismatch (computed {computed:#06x}, received {received:#06x})")]
    Crc { computed: u16, received: u16 },
    #[error("response from unit {received:#04x}, expected {expected:#04x}")]
    UnitMismatch { expected: u8, received: u8 },
    #[error("response function {received:#04x} does not match request {expected:#04x}")]
    FunctionMismatch { expected: u8, received: u8 },
    #[error("device exception {code:#04x} for function {function:#04x}")]
    Exception { function: u8, code: u8 },
    #[error("unsupported function code {0:#04x}")]
    UnsupportedFunction(u8),
}

/// Compute the Modbus CRC-16 of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Build a complete RTU frame: unit id, function code, payload, CRC (low byte
/// first).
pub fn encode_frame(unit_id: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(unit_id);
    frame.push(function);
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.push((crc & 0x00FF) as u8);
    frame.push((crc >> 8) as u8);
    frame
}

/// Exclusive handle to the serial line.
pub struct SerialBus {
    stream: Mutex<SerialStream>,
    unit_id: u8,
    timeout: Duration,
}

impl SerialBus {
    /// Open the serial port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, BusError> {
        let parity = match config.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let builder = tokio_serial::new(&config.port, config.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits);

        let stream = SerialStream::open(&builder).map_err(|e| BusError::Open(e.to_string()))?;

        Ok(Self {
            stream: Mutex::new(stream),
            unit_id: config.unit_id,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Perform one atomic transaction: send `payload` under `function` and
    /// return the response PDU data (the bytes after the function code).
    ///
    /// The lock is held for the whole exchange and the exchange is bounded by
    /// the configured timeout; on timeout the transaction fails and the lock
    /// is released.
    pub async fn transact(&self, function: u8, payload: &[u8]) -> Result<Vec<u8>, BusError> {
        let mut stream = self.stream.lock().await;
        tokio::time::timeout(
            self.timeout,
            exchange(&mut *stream, self.unit_id, function, payload),
        )
        .await
        .map_err(|_| BusError::Timeout(self.timeout))?
    }
}

/// Run one request/response exchange on `stream`.
///
/// Generic over the stream so framing can be exercised against in-memory
/// pipes in tests.
pub async fn exchange<S>(
    stream: &mut S,
    unit_id: u8,
    function: u8,
    payload: &[u8],
) -> Result<Vec<u8>, BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = encode_frame(unit_id, function, payload);
    stream.write_all(&frame).await?;
    stream.flush().await?;

    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;

    if head[0] != unit_id {
        return Err(BusError::UnitMismatch {
            expected: unit_id,
            received: head[0],
        });
    }

    // Exception response: function code with the high bit set, one code byte.
    if head[1] == function | 0x80 {
        let mut rest = [0u8; 3];
        stream.read_exact(&mut rest).await?;
        verify_crc(&[head[0], head[1], rest[0]], &rest[1..3])?;
        return Err(BusError::Exception {
            function,
            code: rest[0],
        });
    }

    if head[1] != function {
        return Err(BusError::FunctionMismatch {
            expected: function,
            received: head[1],
        });
    }

    let data = match function {
        // Byte-count framed responses.
        0x01 | 0x04 => {
            let mut count = [0u8; 1];
            stream.read_exact(&mut count).await?;
            let mut body = vec![0u8; count[0] as usize + 2];
            stream.read_exact(&mut body).await?;

            let mut data = Vec::with_capacity(1 + count[0] as usize);
            data.push(count[0]);
            data.extend_from_slice(&body[..count[0] as usize]);

            let mut checked = vec![head[0], head[1]];
            checked.extend_from_slice(&data);
            verify_crc(&checked, &body[count[0] as usize..])?;
            data
        }
        // Fixed four data bytes: address and value.
        0x06 => {
            let mut body = [0u8; 6];
            stream.read_exact(&mut body).await?;

            let checked = [head[0], head[1], body[0], body[1], body[2], body[3]];
            verify_crc(&checked, &body[4..6])?;
            body[..4].to_vec()
        }
        other => return Err(BusError::UnsupportedFunction(other)),
    };

    Ok(data)
}

fn verify_crc(frame: &[u8], received: &[u8]) -> Result<(), BusError> {
    let computed = crc16(frame);
    let received = u16::from(received[0]) | (u16::from(received[1]) << 8);
    if computed != received {
        return Err(BusError::Crc { computed, received });
    }
    Ok(())
}
