//! Driver for PSA66-ST2R ticket printers attached over a serial line.
//!
//! The printer speaks a framed ASCII protocol: commands are sent as
//! `^<cmd>|<field>|...|^` and the printer answers status requests and CRC
//! requests with `*<cmd>|...|*` frames. The [`message`] and [`response`]
//! modules hold the codec, [`port`] cuts response frames out of the byte
//! stream, and [`Printer`] runs the state machine that keeps the printer
//! polled, resends rejected commands, and reports events to an [`Observer`].

mod buffer;
pub mod catalog;
pub mod config;
mod context;
pub mod filter;
pub mod message;
pub mod observer;
pub mod port;
pub mod printer;
pub mod response;
pub mod state;
pub mod status;
pub mod types;

pub use config::{Config, Handshake, PortSettings};
pub use observer::{GraphicError, NullObserver, Observer, PrintError, RegionError, TemplateError};
pub use port::{SerialTransport, Transport};
pub use printer::{Printer, RunMode};
pub use state::StateId;
pub use status::Status;
pub use types::{
    Error, Graphic, IdKind, Job, Justify, Region, RegionKind, Rotation, Template, TEXT_INVERSE,
    TEXT_NORMAL,
};
