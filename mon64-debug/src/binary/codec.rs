// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::io::{Cursor, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use super::protocol::ErrorCode;

/// Cursor over a command body. Every read past the end fails with
/// `CMD_INVALID_LENGTH` and leaves the cursor where it was.
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub fn read_u8(&mut self) -> Result<u8, ErrorCode> {
        self.ensure(1)?;
        self.cursor
            .read_u8()
            .map_err(|_| ErrorCode::CmdInvalidLength)
    }

    pub fn read_u16le(&mut self) -> Result<u16, ErrorCode> {
        self.ensure(2)?;
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ErrorCode::CmdInvalidLength)
    }

    pub fn read_u32le(&mut self) -> Result<u32, ErrorCode> {
        self.ensure(4)?;
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ErrorCode::CmdInvalidLength)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ErrorCode> {
        self.ensure(len)?;
        let mut data = vec![0; len];
        self.cursor
            .read_exact(&mut data)
            .map_err(|_| ErrorCode::CmdInvalidLength)?;
        Ok(data)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ErrorCode> {
        self.ensure(len)?;
        let position = self.cursor.position();
        self.cursor.set_position(position + len as u64);
        Ok(())
    }

    /// A `u8` length followed by that many bytes of text.
    pub fn read_length_prefixed_string(&mut self) -> Result<String, ErrorCode> {
        let len = self.read_u8()? as usize;
        self.read_string(len)
    }

    pub fn read_string(&mut self, len: usize) -> Result<String, ErrorCode> {
        let data = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn ensure(&self, len: usize) -> Result<(), ErrorCode> {
        if self.remaining() < len {
            Err(ErrorCode::CmdInvalidLength)
        } else {
            Ok(())
        }
    }
}

/// Little-endian payload builder.
#[derive(Default)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let mut data = [0u8; 2];
        LittleEndian::write_u16(&mut data, value);
        self.buffer.extend_from_slice(&data);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let mut data = [0u8; 4];
        LittleEndian::write_u32(&mut data, value);
        self.buffer.extend_from_slice(&data);
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Text prefixed by its `u8` length; longer text is cut at 255 bytes.
    pub fn string(&mut self, text: &str) -> &mut Self {
        let data = text.as_bytes();
        let len = data.len().min(0xff);
        self.u8(len as u8);
        self.bytes(&data[..len])
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_little_endian() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = Reader::new(&data);
        assert_eq!(Ok(0x01), reader.read_u8());
        assert_eq!(Ok(0x1234), reader.read_u16le());
        assert_eq!(Ok(0x1234_5678), reader.read_u32le());
        assert_eq!(0, reader.remaining());
    }

    #[test]
    fn underrun_fails_closed() {
        let data = [0x01];
        let mut reader = Reader::new(&data);
        assert_eq!(Err(ErrorCode::CmdInvalidLength), reader.read_u16le());
        assert_eq!(1, reader.remaining());
        assert_eq!(Ok(0x01), reader.read_u8());
        assert_eq!(Err(ErrorCode::CmdInvalidLength), reader.read_u8());
    }

    #[test]
    fn length_prefix_checked_against_remaining() {
        let data = [0x05, b'a', b'b'];
        let mut reader = Reader::new(&data);
        assert_eq!(
            Err(ErrorCode::CmdInvalidLength),
            reader.read_length_prefixed_string()
        );
        let data = [0x02, b'a', b'b'];
        let mut reader = Reader::new(&data);
        assert_eq!(Ok("ab".to_string()), reader.read_length_prefixed_string());
    }

    #[test]
    fn writer_little_endian() {
        let mut writer = Writer::new();
        writer.u8(0xaa).u16(0x1234).u32(0xdead_beef).string("hi");
        assert_eq!(
            vec![0xaa, 0x34, 0x12, 0xef, 0xbe, 0xad, 0xde, 0x02, b'h', b'i'],
            writer.into_inner()
        );
    }

    #[test]
    fn writer_truncates_long_strings() {
        let text = "x".repeat(300);
        let mut writer = Writer::new();
        writer.string(&text);
        let data = writer.into_inner();
        assert_eq!(0xff, data[0]);
        assert_eq!(256, data.len());
    }
}
