//! This module defines the error type and the printer data model: jobs,
//! templates, regions and graphics, as handed to the driver by the
//! application.

use snafu::Snafu;

use crate::state::StateId;
use core::fmt;

/// Error type for the driver.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A logical id is outside the range accepted by the device.
    #[snafu(display("Invalid {} id {}", kind, id))]
    InvalidId { kind: IdKind, id: i16 },
    /// A region definition can't be expressed on the wire.
    #[snafu(display("Invalid region: {}", reason))]
    InvalidRegion { reason: &'static str },
    /// A response frame failed to parse.
    #[snafu(display("Invalid response: {}", reason))]
    InvalidResponse { reason: &'static str },
    /// The port accepted only part of a command before the write timeout.
    #[snafu(display("Write to {} timed out after {} of {} bytes", port, written, len))]
    WriteTimeout {
        port: String,
        written: usize,
        len: usize,
    },
    /// I/O failure while talking to the port.
    #[snafu(display("I/O error on {}", port))]
    Io {
        port: String,
        source: std::io::Error,
    },
    /// The serial port driver reported an error.
    #[snafu(display("Serial port error on {}", port))]
    Serial {
        port: String,
        source: serialport::Error,
    },
    /// The configuration string is unusable.
    #[snafu(display("Invalid configuration: {}", reason))]
    Config { reason: String },
    /// A transition named a state that isn't part of the state tree.
    #[snafu(display("Target state {:?} not found", target))]
    StateNotFound { target: StateId },
    /// The port hasn't been opened.
    #[snafu(display("Port not open"))]
    NotOpen,
}

impl Error {
    /// Errors caused by the link to the printer. States recover from these by
    /// moving to `Disconnected`.
    pub fn is_comm(&self) -> bool {
        matches!(
            self,
            Error::WriteTimeout { .. } | Error::Io { .. } | Error::Serial { .. }
        )
    }

    /// Argument and protocol errors, which never leave the machine in an
    /// inconsistent state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidId { .. } | Error::InvalidRegion { .. } | Error::InvalidResponse { .. }
        )
    }
}

/// Which id space an [`Error::InvalidId`] refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdKind {
    Template,
    Region,
    Font,
    Graphic,
    Barcode,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdKind::Template => "template",
            IdKind::Region => "region",
            IdKind::Font => "font",
            IdKind::Graphic => "graphic",
            IdKind::Barcode => "barcode",
        };
        f.write_str(name)
    }
}

/// A print job: field data for each region of a template, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    pub template_id: i16,
    pub fields: Vec<String>,
}

impl Job {
    pub fn new(template_id: i16, fields: Vec<String>) -> Self {
        Self {
            template_id,
            fields,
        }
    }
}

/// An ordered list of regions making up a ticket layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub id: i16,
    pub regions: Vec<i16>,
}

/// Rotation of a region's content.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Rotation::Deg0 => b'0',
            Rotation::Deg90 => b'1',
            Rotation::Deg180 => b'2',
            Rotation::Deg270 => b'3',
        }
    }
}

/// Horizontal justification of a region's content.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
    Right,
}

impl Justify {
    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Justify::Left => b'0',
            Justify::Center => b'1',
            Justify::Right => b'2',
        }
    }
}

/// What a region renders. `Region::type_index` is a font, graphic or
/// barcode id accordingly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegionKind {
    Font,
    Graphic,
    Barcode,
}

/// Text attribute for font regions.
pub const TEXT_NORMAL: i16 = 0;
/// Text attribute for font regions.
pub const TEXT_INVERSE: i16 = 1;

/// A rectangular area of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: i16,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub justify: Justify,
    pub kind: RegionKind,
    pub type_index: i16,
    /// Font regions: [`TEXT_NORMAL`] or [`TEXT_INVERSE`]. Barcode regions:
    /// the barcode attribute. Ignored for graphics.
    pub attr: i16,
    pub mul1: u8,
    pub mul2: u8,
    /// Data used for empty job fields printed into this region.
    pub default_data: String,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            id: 0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            rotation: Rotation::Deg0,
            justify: Justify::Left,
            kind: RegionKind::Font,
            type_index: 0,
            attr: TEXT_NORMAL,
            mul1: 1,
            mul2: 1,
            default_data: String::new(),
        }
    }
}

/// A bitmap stored in the printer's graphic library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graphic {
    pub id: i16,
    pub data: Vec<u8>,
}

impl Graphic {
    pub fn new(id: i16, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// Payload size as sent to the printer.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
