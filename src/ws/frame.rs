//! Frame parsing and serialization for the endpoint transport.
//!
//! Covers the client-side subset the harness exercises: single-frame parse
//! with 7/16/64-bit lengths and optional masking, and encode with masking for
//! client-originated frames. The `None` mask arm exists for tests acting as
//! the server side.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text payload.
    Text,
    /// Binary payload.
    Binary,
    /// Close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl OpCode {
    /// Decode an opcode nibble.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOpcode`] for reserved values.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    /// Numeric value of this opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    /// Check if this opcode carries message data.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }
}

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Frame payload, unmasked.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            fin: true,
            opcode: OpCode::Text,
            payload: data.into().into_bytes(),
        }
    }

    /// Create a pong frame echoing ping data.
    #[must_use]
    pub fn pong(data: Vec<u8>) -> Self {
        Self {
            fin: true,
            opcode: OpCode::Pong,
            payload: data,
        }
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - [`Error::IncompleteFrame`] when `buf` does not yet hold a whole frame.
    /// - [`Error::InvalidFrame`] on reserved bits or oversized lengths.
    /// - [`Error::InvalidOpcode`] on reserved opcodes.
    pub fn parse(buf: &[u8]) -> Result<(Frame, usize)> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        if byte0 & 0x70 != 0 {
            return Err(Error::InvalidFrame("reserved bits set".into()));
        }

        let fin = byte0 & 0x80 != 0;
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = byte1 & 0x80 != 0;

        let (payload_len, header_len) = match byte1 & 0x7F {
            n @ 0..=125 => (n as usize, 2),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let len = u64::from_be_bytes([
                    buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
                ]);
                let len = usize::try_from(len)
                    .map_err(|_| Error::InvalidFrame(format!("payload of {len} bytes")))?;
                (len, 10)
            }
        };

        let mask_len = if masked { 4 } else { 0 };
        let total = header_len + mask_len + payload_len;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header_len + mask_len..total].to_vec();
        if masked {
            let key = [
                buf[header_len],
                buf[header_len + 1],
                buf[header_len + 2],
                buf[header_len + 3],
            ];
            apply_mask(&mut payload, key);
        }

        Ok((
            Frame {
                fin,
                opcode,
                payload,
            },
            total,
        ))
    }

    /// Serialize this frame into `buf`, masking the payload when `mask` is given.
    pub fn encode(&self, buf: &mut BytesMut, mask: Option<[u8; 4]>) {
        buf.put_u8(u8::from(self.fin) << 7 | self.opcode.as_u8());

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        match self.payload.len() {
            n @ 0..=125 => buf.put_u8(mask_bit | n as u8),
            n @ 126..=65535 => {
                buf.put_u8(mask_bit | 126);
                buf.put_u16(n as u16);
            }
            n => {
                buf.put_u8(mask_bit | 127);
                buf.put_u64(n as u64);
            }
        }

        match mask {
            Some(key) => {
                buf.put_slice(&key);
                let start = buf.len();
                buf.put_slice(&self.payload);
                apply_mask(&mut buf[start..], key);
            }
            None => buf.put_slice(&self.payload),
        }
    }
}

/// XOR `data` in place with the 4-byte masking key.
pub(crate) fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
