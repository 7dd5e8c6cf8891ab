//! Big-endian byte encoding shared by the compiled zone and alias index
//! formats.
//!
//! Strings are written as a `u16` byte length followed by UTF-8.

use core::{fmt, str};

use alloc::{string::String, vec::Vec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// A string is longer than a `u16` length prefix can describe.
    StringTooLong(usize),
    UnexpectedEof,
    InvalidUtf8,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringTooLong(len) => write!(f, "string of {len} bytes is too long to encode"),
            Self::UnexpectedEof => f.write_str("unexpected end of data"),
            Self::InvalidUtf8 => f.write_str("string is not valid UTF-8"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub(crate) fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_str(&mut self, value: &str) -> Result<(), CodecError> {
        let len = u16::try_from(value.len()).map_err(|_| CodecError::StringTooLong(value.len()))?;
        self.write_u16(len);
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

pub(crate) struct ByteReader<'data> {
    bytes: &'data [u8],
    position: usize,
}

impl<'data> ByteReader<'data> {
    pub(crate) fn new(bytes: &'data [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let mut array = [0; N];
        array.copy_from_slice(&self.bytes[self.position..end]);
        self.position = end;
        Ok(array)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.take::<1>().map(|[b]| b)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.take().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.take().map(u32::from_be_bytes)
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.take().map(i64::from_be_bytes)
    }

    pub(crate) fn read_string(&mut self) -> Result<String, CodecError> {
        let len = usize::from(self.read_u16()?);
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.bytes[self.position..self.position + len];
        self.position += len;
        str::from_utf8(bytes)
            .map(String::from)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}
