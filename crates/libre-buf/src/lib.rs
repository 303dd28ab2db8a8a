#![deny(unreachable_pub, unsafe_code)]

//! Owned byte buffer with independent read/write cursors.
//!
//! Every wire codec in `libre` (STUN, BFCP, RTMP/AMF0) is built on top of a
//! [`Buffer`]: reads advance `pos`, writes past `end` advance `end`, and
//! `size` (the backing allocation) only grows on an explicit [`Buffer::resize`].

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("buffer underrun: wanted {wanted} bytes, {available} available")]
    Underrun { wanted: usize, available: usize },
    #[error("buffer overflow: write of {wanted} bytes would exceed capacity {size}")]
    Overflow { wanted: usize, size: usize },
}

/// An owned byte region with `pos <= end <= size`.
#[derive(Clone)]
pub struct Buffer {
    data: Vec<u8>,
    pos: usize,
    end: usize,
}

impl Buffer {
    /// Create a new, empty buffer with the given backing capacity.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            data: vec![0; size],
            pos: 0,
            end: 0,
        }
    }

    /// Wrap an existing byte vector for reading; `pos = 0`, `end = data.len()`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let end = data.len();
        Self { data, pos: 0, end }
    }

    /// Wrap a byte slice for reading.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        assert!(pos <= self.end, "set_pos beyond end");
        self.pos = pos;
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes available to read between `pos` and `end`.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Grow the backing allocation. Never shrinks below `end`.
    pub fn resize(&mut self, size: usize) {
        if size > self.data.len() {
            self.data.resize(size, 0);
        }
    }

    /// Reset both cursors to the start, keeping the allocation.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.end = 0;
    }

    /// The unread region `[pos, end)`.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..self.end]
    }

    /// The written region `[0, end)`.
    pub fn written(&self) -> &[u8] {
        &self.data[..self.end]
    }

    pub fn advance(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::Underrun {
                wanted: n,
                available: self.remaining(),
            });
        }
        self.pos += n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.remaining() {
            return Err(Error::Underrun {
                wanted: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// 24-bit big-endian integer, as used by RTMP timestamps/lengths.
    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.read_bytes(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let needed = self.end + additional;
        if needed > self.data.len() {
            self.data.resize(needed, 0);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure_capacity(bytes.len());
        self.data[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// 24-bit big-endian integer; the top byte of `v` is discarded.
    pub fn write_u24(&mut self, v: u32) {
        let b = v.to_be_bytes();
        self.write_bytes(&b[1..]);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    /// Pad the written region with zero bytes up to the next multiple of `align`.
    pub fn pad_to(&mut self, align: usize) {
        let rem = self.end % align;
        if rem != 0 {
            let pad = align - rem;
            for _ in 0..pad {
                self.write_u8(0);
            }
        }
    }

    /// Overwrite previously-written bytes at `at..at+bytes.len()` without moving `end`.
    pub fn patch(&mut self, at: usize, bytes: &[u8]) {
        assert!(at + bytes.len() <= self.end, "patch out of written region");
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.end);
        self.data
    }

    /// Shift the unread region `[pos, end)` down to the front and reset
    /// `pos` to 0, so a long-lived reassembly buffer doesn't grow forever as
    /// framed messages are consumed off the front.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.data.copy_within(self.pos..self.end, 0);
        self.end -= self.pos;
        self.pos = 0;
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("size", &self.data.len())
            .finish()
    }
}
