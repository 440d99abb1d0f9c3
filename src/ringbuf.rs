//! Fixed-capacity byte ring used for client I/O, plus the cursor types used
//! to decode requests and encode replies in the connection's byte order.

use crate::error::XError;

/// Byte order negotiated by the connection preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Decode the preamble marker: `'l'` (0x6c) or `'B'` (0x42).
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'l' => Some(ByteOrder::Little),
            b'B' => Some(ByteOrder::Big),
            _ => None,
        }
    }

    pub fn u16_from(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn u32_from(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// Circular byte buffer. Writes are all-or-nothing.
pub struct RingBuf {
    data: Box<[u8]>,
    read_pos: usize,
    len: usize,
}

impl RingBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes available to read.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that can still be written.
    pub fn free(&self) -> usize {
        self.data.len() - self.len
    }

    fn write_pos(&self) -> usize {
        (self.read_pos + self.len) % self.data.len()
    }

    /// Copy `out.len()` bytes starting `offset` bytes past the read cursor,
    /// without consuming them.
    pub fn peek(&self, offset: usize, out: &mut [u8]) -> bool {
        if offset + out.len() > self.len {
            return false;
        }
        let cap = self.data.len();
        let start = (self.read_pos + offset) % cap;
        let first = out.len().min(cap - start);
        out[..first].copy_from_slice(&self.data[start..start + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.data[..rest]);
        true
    }

    pub fn read(&mut self, out: &mut [u8]) -> bool {
        if !self.peek(0, out) {
            return false;
        }
        self.advance_read(out.len());
        true
    }

    pub fn advance_read(&mut self, n: usize) {
        let n = n.min(self.len);
        self.read_pos = (self.read_pos + n) % self.data.len();
        self.len -= n;
        if self.len == 0 {
            self.read_pos = 0;
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free() {
            return false;
        }
        let cap = self.data.len();
        let start = self.write_pos();
        let first = bytes.len().min(cap - start);
        self.data[start..start + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        self.data[..rest].copy_from_slice(&bytes[first..]);
        self.len += bytes.len();
        true
    }

    /// Largest readable run that does not wrap, for handing to `send`.
    pub fn contiguous_read(&self) -> &[u8] {
        let end = (self.read_pos + self.len).min(self.data.len());
        &self.data[self.read_pos..end]
    }

    /// Largest writable run that does not wrap, for handing to `recv`.
    pub fn contiguous_write(&mut self) -> &mut [u8] {
        let start = self.write_pos();
        let end = if start >= self.read_pos && self.len < self.data.len() {
            self.data.len()
        } else {
            self.read_pos
        };
        let end = if self.len == self.data.len() { start } else { end };
        &mut self.data[start..end]
    }

    pub fn advance_write(&mut self, n: usize) {
        self.len = (self.len + n).min(self.data.len());
    }
}

/// Decoding cursor over one request body.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            pos: 0,
            order,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], XError> {
        if self.remaining() < n {
            return Err(XError::Length);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn pad(&mut self, n: usize) -> Result<(), XError> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, XError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, XError> {
        let b = self.bytes(2)?;
        Ok(self.order.u16_from([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16, XError> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> Result<u32, XError> {
        let b = self.bytes(4)?;
        Ok(self.order.u32_from([b[0], b[1], b[2], b[3]]))
    }

    /// A value-list entry: one 4-byte slot, of which the low `u8`/`u16`
    /// carries the value.
    pub fn value_u8(&mut self) -> Result<u8, XError> {
        Ok(self.u32()? as u8)
    }

    pub fn value_u16(&mut self) -> Result<u16, XError> {
        Ok(self.u32()? as u16)
    }

    pub fn value_i16(&mut self) -> Result<i16, XError> {
        Ok(self.u32()? as i16)
    }
}

/// Builder for replies and events in the connection's byte order.
pub struct Writer {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl Writer {
    pub fn new(order: ByteOrder) -> Self {
        Self::with_capacity(order, 32)
    }

    pub fn with_capacity(order: ByteOrder, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            order,
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&self.order.u16_bytes(v));
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.u16(v as u16)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&self.order.u32_bytes(v));
        self
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn pad(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    /// Pad to the next multiple of four bytes.
    pub fn align(&mut self) -> &mut Self {
        let n = (4 - self.buf.len() % 4) % 4;
        self.pad(n)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Number of pad bytes needed to round `n` up to a multiple of four.
pub fn pad4(n: usize) -> usize {
    (4 - n % 4) % 4
}
