//! Parser for the driver configuration string.
//!
//! The configuration is a list of `key=value` pairs separated by `;`, `,` or
//! whitespace, e.g. `port=3;baudrate=38400;parity=none;handshake=x`.

use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::all_consuming;
use nom::multi::separated_list0;
use nom::sequence::{delimited, separated_pair};
use nom::IResult;
use serialport::{DataBits, FlowControl, Parity};

use core::str::FromStr;

use crate::types::{ConfigSnafu, Error};

/// Flow control as named in the configuration string.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// `x`: XON/XOFF
    XonXoff,
    /// `rts`: RTS/CTS
    Rts,
    /// `rtsx`: RTS/CTS plus XON/XOFF
    RtsXonXoff,
}

impl Handshake {
    /// The serial port can't combine software and hardware flow control, so
    /// `rtsx` runs with RTS/CTS only.
    pub fn flow_control(self) -> FlowControl {
        match self {
            Handshake::XonXoff => FlowControl::Software,
            Handshake::Rts | Handshake::RtsXonXoff => FlowControl::Hardware,
        }
    }
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub port: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    /// Per byte write timeout in milliseconds.
    pub timeout: u32,
    pub buffer_size: u32,
    pub handshake: Handshake,
}

impl PortSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: 38400,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            timeout: 5,
            buffer_size: 2048,
            handshake: Handshake::XonXoff,
        }
    }
}

/// Everything the configuration string can carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: PortSettings,
    /// Trace state changes and sent commands.
    pub debug: bool,
    /// Dump the state machine when the run loop fails.
    pub error_dump: bool,
    /// Firmware version `currency` applies to.
    pub version: Option<String>,
    pub currency: Option<String>,
}

fn is_separator(c: char) -> bool {
    c == ';' || c == ',' || c.is_whitespace()
}

fn key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn value(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| !is_separator(c))(input)
}

fn pair(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(key, char('='), value)(input)
}

fn pairs(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    all_consuming(delimited(
        take_while(is_separator),
        separated_list0(take_while1(is_separator), pair),
        take_while(is_separator),
    ))(input)
}

fn number<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value.parse().ok().ok_or_else(|| {
        ConfigSnafu {
            reason: format!("{} must be a number, got `{}`", key, value),
        }
        .build()
    })
}

fn flag(value: &str) -> bool {
    value.parse::<i64>() == Ok(1)
}

/// Port numbers name COM ports, anything else is used as a device path.
fn port_name(value: &str) -> String {
    match value.parse::<u32>() {
        Ok(n) => format!("COM{}", n),
        Err(_) => value.to_string(),
    }
}

impl Config {
    /// Parse a configuration string.
    ///
    /// ## Example
    /// ```
    /// use psa66_driver::Config;
    /// let config = Config::parse("port=3;baudrate=9600;debug=1").unwrap();
    /// assert_eq!(config.port.port, "COM3");
    /// assert_eq!(config.port.baud_rate, 9600);
    /// assert!(config.debug);
    /// ```
    /// # Errors
    /// Returns [`Error::Config`] on syntax errors, bad values, or a missing
    /// `port`.
    pub fn parse(params: &str) -> Result<Self, Error> {
        let (_, pairs) = pairs(params).map_err(|e| {
            let near = match e {
                nom::Err::Error(e) | nom::Err::Failure(e) => e.input.to_string(),
                nom::Err::Incomplete(_) => String::new(),
            };
            ConfigSnafu {
                reason: format!("syntax error near `{}`", near),
            }
            .build()
        })?;

        let port = pairs
            .iter()
            .find(|(k, _)| *k == "port")
            .map(|(_, v)| port_name(v))
            .ok_or_else(|| {
                ConfigSnafu {
                    reason: "port is required",
                }
                .build()
            })?;

        let mut config = Config {
            port: PortSettings::new(port),
            debug: false,
            error_dump: true,
            version: None,
            currency: None,
        };

        for &(key, value) in &pairs {
            match key {
                "port" => {}
                "baudrate" => config.port.baud_rate = number(key, value)?,
                "parity" => {
                    config.port.parity = match value {
                        "none" => Parity::None,
                        "even" => Parity::Even,
                        "odd" => Parity::Odd,
                        _ => {
                            return ConfigSnafu {
                                reason: format!("unknown parity `{}`", value),
                            }
                            .fail()
                        }
                    }
                }
                "databit" => {
                    config.port.data_bits = match number::<u8>(key, value)? {
                        5 => DataBits::Five,
                        6 => DataBits::Six,
                        7 => DataBits::Seven,
                        8 => DataBits::Eight,
                        n => {
                            return ConfigSnafu {
                                reason: format!("unsupported data bits {}", n),
                            }
                            .fail()
                        }
                    }
                }
                "timeout" => config.port.timeout = number(key, value)?,
                "buffer_size" => config.port.buffer_size = number(key, value)?,
                "handshake" => {
                    config.port.handshake = match value {
                        "x" => Handshake::XonXoff,
                        "rts" => Handshake::Rts,
                        "rtsx" => Handshake::RtsXonXoff,
                        _ => {
                            return ConfigSnafu {
                                reason: format!("unknown handshake `{}`", value),
                            }
                            .fail()
                        }
                    }
                }
                "debug" => config.debug = flag(value),
                "error_dump" => config.error_dump = flag(value),
                "version" => config.version = Some(value.to_string()),
                "currency" => config.currency = Some(value.to_string()),
                _ => log::debug!("ignoring unknown configuration key {}", key),
            }
        }
        Ok(config)
    }
}
