//! Response frames received from the printer.
//!
//! Responses are framed as `*<cmd>|<field>|...|*`. There are no length fields,
//! so the parsers walk the frame delimiter by delimiter and check that each
//! one shows up where the frame layout expects it.

use arrayvec::ArrayVec;
use snafu::ensure;

use crate::message::{
    CMD_CRC, CMD_DEFINE_REGION, CMD_DEFINE_TEMPLATE, CMD_FEED, CMD_LIB_MANAGE, CMD_PRINT,
    CMD_STATUS, DELIMITER,
};
use crate::status::Status;
use crate::types::{Error, InvalidResponseSnafu};

pub const RESP_START: u8 = b'*';
pub const RESP_END: u8 = b'*';

/// The longest response the printer sends.
pub const MAX_RESPONSE_LEN: usize = 44;

const fn invalid(reason: &'static str) -> InvalidResponseSnafu<&'static str> {
    InvalidResponseSnafu { reason }
}

/// Message kind, as given by the command byte following the start marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageType {
    DefineTemplate,
    DefineRegion,
    Print,
    LibManage,
    Crc,
    Status,
    Feed,
    Unknown,
}

impl MessageType {
    pub fn of(msg: &[u8]) -> Self {
        match msg.get(1).copied() {
            Some(CMD_DEFINE_TEMPLATE) => MessageType::DefineTemplate,
            Some(CMD_DEFINE_REGION) => MessageType::DefineRegion,
            Some(CMD_PRINT) => MessageType::Print,
            Some(CMD_LIB_MANAGE) => MessageType::LibManage,
            Some(CMD_CRC) => MessageType::Crc,
            Some(CMD_STATUS) => MessageType::Status,
            Some(CMD_FEED) => MessageType::Feed,
            _ => MessageType::Unknown,
        }
    }
}

/// `*G|<crc lo><crc hi>|*`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CrcResponse {
    pub crc: u16,
}

const CRC_LOOKUP: [u8; 5] = [RESP_START, CMD_CRC, DELIMITER, DELIMITER, RESP_END];
const CRC_RESPONSE_LEN: usize = 7;

impl CrcResponse {
    /// # Errors
    /// Returns [`Error::InvalidResponse`] naming the first offending field.
    pub fn parse(resp: &[u8]) -> Result<Self, Error> {
        ensure!(
            resp.len() == CRC_RESPONSE_LEN,
            invalid("incorrect message size.")
        );

        let mut start = 0;
        let mut crc = None;
        let mut end = false;
        let mut state = 0;
        for (i, &b) in resp.iter().enumerate() {
            if state >= CRC_LOOKUP.len() || b != CRC_LOOKUP[state] {
                continue;
            }
            match state {
                0 => ensure!(i == 0 && i == start, invalid("missing header")),
                1 => ensure!(i == 1 && i == start, invalid("missing command")),
                2 => ensure!(i == 2 && i == start, invalid("missing command delimiter")),
                3 => {
                    ensure!(i == 5 && i - start == 2, invalid("missing CRC"));
                    crc = Some(u16::from_le_bytes([resp[start], resp[start + 1]]));
                }
                _ => {
                    ensure!(
                        i == start && i == resp.len() - 1,
                        invalid("missing terminator")
                    );
                    end = true;
                }
            }
            start = i + 1;
            state += 1;
        }

        match crc {
            Some(crc) if end => Ok(Self { crc }),
            _ => invalid("not a valid response").fail(),
        }
    }
}

/// `*S|<unit address>|<software version>|<f1>|<f2>|<f3>|<f4>|<f5>|P<template>|*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub unit_address: u32,
    pub software_version: String,
    pub template_id: u8,
    pub status: Status,
}

const STATUS_LOOKUP: [u8; 12] = [
    RESP_START, CMD_STATUS, DELIMITER, DELIMITER, DELIMITER, DELIMITER, DELIMITER, DELIMITER,
    DELIMITER, DELIMITER, DELIMITER, RESP_END,
];

const FLAG_ERRORS: [&str; 5] = [
    "incorrect status flag 1",
    "incorrect status flag 2",
    "incorrect status flag 3",
    "incorrect status flag 4",
    "incorrect status flag 5",
];

/// Leading decimal digits, like `strtoul`. Anything else yields 0.
fn leading_number(field: &[u8]) -> u32 {
    field
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u32, |acc, b| {
            acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
        })
}

fn latin1(field: &[u8]) -> String {
    field.iter().map(|&b| char::from(b)).collect()
}

impl StatusResponse {
    /// Parse a complete status frame. Nothing is returned unless the whole
    /// frame is valid.
    /// # Errors
    /// Returns [`Error::InvalidResponse`] naming the first offending field.
    pub fn parse(resp: &[u8]) -> Result<Self, Error> {
        ensure!(!resp.is_empty(), invalid("size cannot be zero"));

        let mut unit_address = 0;
        let mut software_version = String::new();
        let mut template_id = 0;
        let mut flags = ArrayVec::<u8, 5>::new();
        let mut end = false;

        let mut start = 0;
        let mut state = 0;
        for (i, &b) in resp.iter().enumerate() {
            if state >= STATUS_LOOKUP.len() || b != STATUS_LOOKUP[state] {
                continue;
            }
            match state {
                0 => ensure!(i == 0 && i == start, invalid("missing header")),
                1 => ensure!(i == 1 && i == start, invalid("missing command")),
                2 => ensure!(i == 2 && i == start, invalid("missing command delimiter")),
                3 => unit_address = leading_number(&resp[start..i]),
                4 => software_version = latin1(&resp[start..i]),
                5..=9 => {
                    ensure!(i - start == 1, invalid(FLAG_ERRORS[state - 5]));
                    flags.push(resp[start]);
                }
                10 => {
                    ensure!(resp[start] == b'P', invalid("incorrect template number"));
                    template_id = resp[start + 1];
                }
                _ => {
                    ensure!(
                        i == start && i == resp.len() - 1,
                        invalid("missing terminator")
                    );
                    end = true;
                }
            }
            start = i + 1;
            state += 1;
        }

        ensure!(end, invalid("not a valid response"));
        let flags: [u8; 5] = flags
            .into_inner()
            .map_err(|_| invalid("not a valid response").build())?;

        Ok(Self {
            unit_address,
            software_version,
            template_id,
            status: Status::from_flags(flags),
        })
    }
}

/// Returns true if `resp` is a complete frame of any known response type.
pub fn is_response(resp: &[u8]) -> bool {
    CrcResponse::parse(resp).is_ok() || StatusResponse::parse(resp).is_ok()
}
