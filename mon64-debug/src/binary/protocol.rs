// This file is part of mon64.
// Copyright (c) 2016-2019 Sebastian Jastrzebski. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::checkpoint::Checkpoint;

use super::codec::{Reader, Writer};

// Request:  STX, api version, body length u32, request id u32, command type, body
// Response: STX, api version, body length u32, response type, error code, request id u32, body
// All multi-byte fields are little endian.

pub const STX: u8 = 0x02;
pub const API_VERSION: u8 = 0x01;
pub const EVENT_ID: u32 = 0xffff_ffff;

/// Header bytes following STX in a request.
pub const REQUEST_HEADER_LENGTH: usize = 10;
pub const RESPONSE_HEADER_LENGTH: usize = 12;
pub const MAX_BODY_LENGTH: u32 = 0x0001_0000 + 0x100;

pub const CHECKPOINT_INFO_LENGTH: usize = 22;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandType {
    MemGet = 0x01,
    MemSet = 0x02,
    CheckpointGet = 0x11,
    CheckpointSet = 0x12,
    CheckpointDelete = 0x13,
    CheckpointList = 0x14,
    CheckpointToggle = 0x15,
    ConditionSet = 0x22,
    RegistersGet = 0x31,
    RegistersSet = 0x32,
    Dump = 0x41,
    Undump = 0x42,
    ResourceGet = 0x51,
    ResourceSet = 0x52,
    AdvanceInstructions = 0x71,
    KeyboardFeed = 0x72,
    ExecuteUntilReturn = 0x73,
    Ping = 0x81,
    BanksAvailable = 0x82,
    RegistersAvailable = 0x83,
    DisplayGet = 0x84,
    Exit = 0xaa,
    Quit = 0xbb,
    Reset = 0xcc,
    Autostart = 0xdd,
}

impl CommandType {
    pub fn from(value: u8) -> Result<CommandType, String> {
        match value {
            0x01 => Ok(CommandType::MemGet),
            0x02 => Ok(CommandType::MemSet),
            0x11 => Ok(CommandType::CheckpointGet),
            0x12 => Ok(CommandType::CheckpointSet),
            0x13 => Ok(CommandType::CheckpointDelete),
            0x14 => Ok(CommandType::CheckpointList),
            0x15 => Ok(CommandType::CheckpointToggle),
            0x22 => Ok(CommandType::ConditionSet),
            0x31 => Ok(CommandType::RegistersGet),
            0x32 => Ok(CommandType::RegistersSet),
            0x41 => Ok(CommandType::Dump),
            0x42 => Ok(CommandType::Undump),
            0x51 => Ok(CommandType::ResourceGet),
            0x52 => Ok(CommandType::ResourceSet),
            0x71 => Ok(CommandType::AdvanceInstructions),
            0x72 => Ok(CommandType::KeyboardFeed),
            0x73 => Ok(CommandType::ExecuteUntilReturn),
            0x81 => Ok(CommandType::Ping),
            0x82 => Ok(CommandType::BanksAvailable),
            0x83 => Ok(CommandType::RegistersAvailable),
            0x84 => Ok(CommandType::DisplayGet),
            0xaa => Ok(CommandType::Exit),
            0xbb => Ok(CommandType::Quit),
            0xcc => Ok(CommandType::Reset),
            0xdd => Ok(CommandType::Autostart),
            _ => Err(format!("Invalid command type {:02x}", value)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseType {
    Error = 0x00,
    CheckpointInfo = 0x11,
    RegisterInfo = 0x31,
    Jam = 0x61,
    Stopped = 0x62,
    Resumed = 0x63,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    Ok = 0x00,
    ObjectMissing = 0x01,
    InvalidMemspace = 0x02,
    CmdInvalidLength = 0x80,
    InvalidParameter = 0x81,
    CmdInvalidApiVersion = 0x82,
    CmdInvalidType = 0x83,
    CmdFailure = 0x8f,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match *self {
            ErrorCode::Ok => "ok",
            ErrorCode::ObjectMissing => "object missing",
            ErrorCode::InvalidMemspace => "invalid memspace",
            ErrorCode::CmdInvalidLength => "invalid length",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::CmdInvalidApiVersion => "invalid api version",
            ErrorCode::CmdInvalidType => "invalid command type",
            ErrorCode::CmdFailure => "command failure",
        };
        write!(f, "{}", text)
    }
}

/// A framed request as read from the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BinaryCommand {
    pub api_version: u8,
    pub length: u32,
    pub request_id: u32,
    pub command_type: u8,
    pub body: Vec<u8>,
}

impl BinaryCommand {
    pub fn new(command_type: u8, request_id: u32, body: Vec<u8>) -> Self {
        Self {
            api_version: API_VERSION,
            length: body.len() as u32,
            request_id,
            command_type,
            body,
        }
    }

    /// Request header fields from the bytes following STX.
    pub fn parse_header(header: &[u8; REQUEST_HEADER_LENGTH]) -> (u8, u32, u32, u8) {
        (
            header[0],
            LittleEndian::read_u32(&header[1..5]),
            LittleEndian::read_u32(&header[5..9]),
            header[9],
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(1 + REQUEST_HEADER_LENGTH + self.body.len());
        writer
            .u8(STX)
            .u8(self.api_version)
            .u32(self.length)
            .u32(self.request_id)
            .u8(self.command_type)
            .bytes(&self.body);
        writer.into_inner()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub response_type: u8,
    pub error: ErrorCode,
    pub request_id: u32,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(response_type: u8, request_id: u32, body: Vec<u8>) -> Self {
        Self {
            response_type,
            error: ErrorCode::Ok,
            request_id,
            body,
        }
    }

    pub fn error(error: ErrorCode, request_id: u32) -> Self {
        Self {
            response_type: ResponseType::Error as u8,
            error,
            request_id,
            body: Vec::new(),
        }
    }

    pub fn event(response_type: ResponseType, body: Vec<u8>) -> Self {
        Self::new(response_type as u8, EVENT_ID, body)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(RESPONSE_HEADER_LENGTH + self.body.len());
        writer
            .u8(STX)
            .u8(API_VERSION)
            .u32(self.body.len() as u32)
            .u8(self.response_type)
            .u8(self.error as u8)
            .u32(self.request_id)
            .bytes(&self.body);
        writer.into_inner()
    }

    /// Decode one response from the front of `data`, returning it and the bytes consumed.
    pub fn decode(data: &[u8]) -> Option<(Response, usize)> {
        if data.len() < RESPONSE_HEADER_LENGTH || data[0] != STX {
            return None;
        }
        let length = LittleEndian::read_u32(&data[2..6]) as usize;
        let total = RESPONSE_HEADER_LENGTH + length;
        if data.len() < total {
            return None;
        }
        let error = match data[7] {
            0x00 => ErrorCode::Ok,
            0x01 => ErrorCode::ObjectMissing,
            0x02 => ErrorCode::InvalidMemspace,
            0x80 => ErrorCode::CmdInvalidLength,
            0x81 => ErrorCode::InvalidParameter,
            0x82 => ErrorCode::CmdInvalidApiVersion,
            0x83 => ErrorCode::CmdInvalidType,
            _ => ErrorCode::CmdFailure,
        };
        let response = Response {
            response_type: data[6],
            error,
            request_id: LittleEndian::read_u32(&data[8..12]),
            body: data[RESPONSE_HEADER_LENGTH..total].to_vec(),
        };
        Some((response, total))
    }
}

/// Wire form of a checkpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CheckpointInfo {
    pub id: u32,
    pub hit: bool,
    pub start: u16,
    pub end: u16,
    pub stop: bool,
    pub enabled: bool,
    pub ops: u8,
    pub temporary: bool,
    pub hit_count: u32,
    pub ignore_count: u32,
    pub has_condition: bool,
}

impl CheckpointInfo {
    pub fn from(checkpoint: &Checkpoint, hit: bool) -> Self {
        Self {
            id: checkpoint.id,
            hit,
            start: checkpoint.start,
            end: checkpoint.end,
            stop: checkpoint.stop,
            enabled: checkpoint.enabled,
            ops: checkpoint.ops.bits(),
            temporary: checkpoint.temporary,
            hit_count: checkpoint.hit_count,
            ignore_count: checkpoint.ignore_count,
            has_condition: checkpoint.condition.is_some(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(CHECKPOINT_INFO_LENGTH);
        writer
            .u32(self.id)
            .u8(self.hit as u8)
            .u16(self.start)
            .u16(self.end)
            .u8(self.stop as u8)
            .u8(self.enabled as u8)
            .u8(self.ops)
            .u8(self.temporary as u8)
            .u32(self.hit_count)
            .u32(self.ignore_count)
            .u8(self.has_condition as u8);
        writer.into_inner()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ErrorCode> {
        let mut reader = Reader::new(data);
        Ok(Self {
            id: reader.read_u32le()?,
            hit: reader.read_u8()? != 0,
            start: reader.read_u16le()?,
            end: reader.read_u16le()?,
            stop: reader.read_u8()? != 0,
            enabled: reader.read_u8()? != 0,
            ops: reader.read_u8()?,
            temporary: reader.read_u8()? != 0,
            hit_count: reader.read_u32le()?,
            ignore_count: reader.read_u32le()?,
            has_condition: reader.read_u8()? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_from() {
        assert_eq!(Ok(CommandType::Ping), CommandType::from(0x81));
        assert_eq!(Ok(CommandType::Autostart), CommandType::from(0xdd));
        assert!(CommandType::from(0x99).is_err());
    }

    #[test]
    fn encode_response_header() {
        let response = Response::new(0x81, 0x0102_0304, vec![0xaa]);
        assert_eq!(
            vec![0x02, 0x01, 0x01, 0x00, 0x00, 0x00, 0x81, 0x00, 0x04, 0x03, 0x02, 0x01, 0xaa],
            response.encode()
        );
    }

    #[test]
    fn encode_error_response() {
        let data = Response::error(ErrorCode::CmdInvalidType, 7).encode();
        assert_eq!(RESPONSE_HEADER_LENGTH, data.len());
        assert_eq!(0x00, data[6]);
        assert_eq!(0x83, data[7]);
    }

    #[test]
    fn decode_response() {
        let mut data = Response::event(ResponseType::Stopped, vec![0x00, 0x10]).encode();
        data.push(STX);
        let (response, len) = Response::decode(&data).unwrap();
        assert_eq!(14, len);
        assert_eq!(EVENT_ID, response.request_id);
        assert_eq!(ResponseType::Stopped as u8, response.response_type);
        assert_eq!(vec![0x00, 0x10], response.body);
        assert!(Response::decode(&data[..13]).is_none());
    }

    #[test]
    fn checkpoint_info_layout() {
        let info = CheckpointInfo {
            id: 5,
            hit: true,
            start: 0x1000,
            end: 0x10ff,
            stop: true,
            enabled: false,
            ops: 0x04,
            temporary: false,
            hit_count: 2,
            ignore_count: 1,
            has_condition: true,
        };
        let data = info.encode();
        assert_eq!(CHECKPOINT_INFO_LENGTH, data.len());
        assert_eq!(
            vec![
                0x05, 0x00, 0x00, 0x00, 0x01, 0x00, 0x10, 0xff, 0x10, 0x01, 0x00, 0x04, 0x00,
                0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01
            ],
            data
        );
        assert_eq!(Ok(info), CheckpointInfo::decode(&data));
    }

    #[test]
    fn parse_request_header() {
        let data = BinaryCommand::new(0x12, 9, vec![1, 2, 3]).encode();
        let mut header = [0u8; REQUEST_HEADER_LENGTH];
        header.copy_from_slice(&data[1..=REQUEST_HEADER_LENGTH]);
        assert_eq!((API_VERSION, 3, 9, 0x12), BinaryCommand::parse_header(&header));
    }
}
