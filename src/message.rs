//! Command frames sent to the printer.
//!
//! Every command is framed as `^<cmd>|<field>|...|^`. Numeric fields are
//! decimal ASCII, ids are the device bytes from [`crate::catalog`].

use snafu::ensure;

use core::convert::TryFrom;

use crate::catalog::{
    barcode_to_drv, font_to_drv, graphic_to_drv, is_user_defined_template, region_to_drv,
    template_print_page, template_to_drv,
};
use crate::types::{
    Error, Graphic, InvalidRegionSnafu, Job, Region, RegionKind, Template, TEXT_INVERSE,
    TEXT_NORMAL,
};

pub const CMD_START: u8 = b'^';
pub const CMD_END: u8 = b'^';
pub const DELIMITER: u8 = b'|';

pub const CMD_DEFINE_TEMPLATE: u8 = b'T';
pub const CMD_DEFINE_REGION: u8 = b'R';
pub const CMD_PRINT: u8 = b'P';
pub const CMD_LIB_MANAGE: u8 = b'l';
pub const CMD_CRC: u8 = b'G';
pub const CMD_STATUS: u8 = b'S';
pub const CMD_FEED: u8 = b'f';
pub const CMD_FLASH_TRANSFER: u8 = b'z';
pub const CMD_CLEAR_ERROR: u8 = b'C';

/// A command that can be encoded into a frame.
pub trait Command {
    /// Append the complete frame to `out`.
    /// # Errors
    /// Returns an error if an id or region attribute can't be encoded.
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error>;

    /// Size-then-fill encoding. Returns the frame length, and writes the frame
    /// into `buf` only if it is given and large enough.
    /// # Errors
    /// See [`Command::encode`].
    fn build(&self, buf: Option<&mut [u8]>) -> Result<usize, Error> {
        let frame = self.to_bytes()?;
        if let Some(buf) = buf {
            if let Some(dst) = buf.get_mut(..frame.len()) {
                dst.copy_from_slice(&frame);
            }
        }
        Ok(frame.len())
    }

    /// The encoded frame.
    /// # Errors
    /// See [`Command::encode`].
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(16);
        self.encode(&mut out)?;
        Ok(out)
    }
}

/// Whether a library command adds or removes its object.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Define,
    Delete,
}

fn push_decimal(out: &mut Vec<u8>, value: impl ToString) {
    out.extend_from_slice(value.to_string().as_bytes());
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.push(DELIMITER);
}

/// Encode text one byte per character. The printer only knows Latin-1.
fn push_text(out: &mut Vec<u8>, text: &str) {
    out.extend(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
}

/// Fixed frames without fields.
macro_rules! simple_command {
    ($(#[$meta:meta])* $name:ident, $cmd:expr) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Default)]
        pub struct $name;

        impl Command for $name {
            fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
                out.extend_from_slice(&[CMD_START, $cmd, DELIMITER, CMD_END]);
                Ok(())
            }
        }
    };
}

simple_command!(
    /// Request a status response.
    StatusRequest,
    CMD_STATUS
);
simple_command!(
    /// Feed one ticket.
    FormFeed,
    CMD_FEED
);
simple_command!(
    /// Clear latched error flags.
    ClearError,
    CMD_CLEAR_ERROR
);

/// Ask the printer for a CRC over its firmware, starting at `start_addr`.
#[derive(Debug, Copy, Clone, Default)]
pub struct ObtainCrc {
    pub start_addr: u32,
    pub seed: u16,
}

impl Command for ObtainCrc {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&[CMD_START, CMD_CRC, DELIMITER]);
        out.extend_from_slice(&self.start_addr.to_le_bytes());
        out.extend_from_slice(&self.seed.to_le_bytes());
        out.extend_from_slice(&[DELIMITER, CMD_END]);
        Ok(())
    }
}

/// Move a staged user template into flash page `page`.
#[derive(Debug, Copy, Clone)]
pub struct FlashTransfer {
    pub page: u8,
}

impl Command for FlashTransfer {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&[
            CMD_START,
            CMD_FLASH_TRANSFER,
            DELIMITER,
            b'$',
            DELIMITER,
            self.page,
            DELIMITER,
            CMD_END,
        ]);
        Ok(())
    }
}

/// Define or delete a print region.
#[derive(Debug, Copy, Clone)]
pub struct DefineRegion<'a> {
    pub region: &'a Region,
    pub action: Action,
}

impl<'a> DefineRegion<'a> {
    pub fn define(region: &'a Region) -> Self {
        Self {
            region,
            action: Action::Define,
        }
    }

    pub fn delete(region: &'a Region) -> Self {
        Self {
            region,
            action: Action::Delete,
        }
    }

    fn encode_define(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let r = self.region;
        push_field(out, &[b'R']);
        for dimension in &[r.x, r.y, r.width, r.height] {
            push_decimal(out, dimension);
            out.push(DELIMITER);
        }
        push_field(out, b"0");
        push_field(out, &[r.rotation.to_byte()]);
        push_field(out, &[r.justify.to_byte()]);

        match r.kind {
            RegionKind::Font => push_decimal(out, font_to_drv(r.type_index)?),
            RegionKind::Graphic => out.push(graphic_to_drv(r.type_index)?),
            RegionKind::Barcode => out.push(barcode_to_drv(r.type_index)?),
        }
        out.push(DELIMITER);
        push_field(out, &[r.mul1.wrapping_add(b'0')]);
        push_field(out, &[r.mul2.wrapping_add(b'0')]);

        match r.kind {
            RegionKind::Font => {
                ensure!(
                    r.attr == TEXT_NORMAL || r.attr == TEXT_INVERSE,
                    InvalidRegionSnafu {
                        reason: "invalid text attribute"
                    }
                );
                out.push(if r.attr == TEXT_INVERSE { b'1' } else { b'0' });
            }
            RegionKind::Graphic => out.push(b'0'),
            RegionKind::Barcode => push_decimal(out, r.attr),
        }
        out.push(DELIMITER);
        push_field(out, b"0");
        out.push(DELIMITER);
        Ok(())
    }
}

impl Command for DefineRegion<'_> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&[CMD_START, CMD_DEFINE_REGION, DELIMITER]);
        push_field(out, &[region_to_drv(self.region.id)?]);
        match self.action {
            Action::Define => self.encode_define(out)?,
            Action::Delete => push_field(out, b"DR"),
        }
        out.push(CMD_END);
        Ok(())
    }
}

/// Define or delete a template.
#[derive(Debug, Copy, Clone)]
pub struct DefineTemplate<'a> {
    pub template: &'a Template,
    pub action: Action,
}

impl<'a> DefineTemplate<'a> {
    pub fn define(template: &'a Template) -> Self {
        Self {
            template,
            action: Action::Define,
        }
    }

    pub fn delete(template: &'a Template) -> Self {
        Self {
            template,
            action: Action::Delete,
        }
    }
}

impl Command for DefineTemplate<'_> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&[CMD_START, CMD_DEFINE_TEMPLATE, DELIMITER]);
        push_field(out, &[template_to_drv(self.template.id)?]);
        match self.action {
            Action::Define => {
                push_field(out, b"R");
                // ticket length and width in dots
                push_field(out, b"500");
                push_field(out, b"1240");
                for &region in &self.template.regions {
                    push_field(out, &[region_to_drv(region)?]);
                }
            }
            Action::Delete => push_field(out, b"DR"),
        }
        out.push(CMD_END);
        Ok(())
    }
}

/// Store or remove a graphic in the printer's library.
#[derive(Debug, Copy, Clone)]
pub struct LibManage<'a> {
    pub graphic: &'a Graphic,
    pub action: Action,
}

impl<'a> LibManage<'a> {
    pub fn define(graphic: &'a Graphic) -> Self {
        Self {
            graphic,
            action: Action::Define,
        }
    }

    pub fn delete(graphic: &'a Graphic) -> Self {
        Self {
            graphic,
            action: Action::Delete,
        }
    }
}

impl Command for LibManage<'_> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let id = graphic_to_drv(self.graphic.id)?;
        out.extend_from_slice(&[CMD_START, CMD_LIB_MANAGE, DELIMITER]);
        match self.action {
            Action::Define => {
                push_field(out, b"A");
                push_field(out, b"F");
                push_field(out, &[id]);
                push_decimal(out, self.graphic.size());
                out.push(DELIMITER);
                push_field(out, &self.graphic.data);
            }
            Action::Delete => {
                push_field(out, b"D");
                push_field(out, b"F");
                push_field(out, &[id]);
                push_field(out, b"G");
            }
        }
        out.push(CMD_END);
        Ok(())
    }
}

/// Print one ticket.
#[derive(Debug, Copy, Clone)]
pub struct Print<'a> {
    pub job: &'a Job,
}

impl<'a> Print<'a> {
    pub fn new(job: &'a Job) -> Self {
        Self { job }
    }
}

impl Command for Print<'_> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let template_id = self.job.template_id;
        out.extend_from_slice(&[CMD_START, CMD_PRINT]);
        if is_user_defined_template(template_id)? {
            out.push(template_print_page(template_id)?);
        }
        out.push(DELIMITER);
        push_field(out, &[template_to_drv(template_id)?]);
        push_field(out, b"1");
        for field in &self.job.fields {
            push_text(out, field);
            out.push(DELIMITER);
        }
        out.push(CMD_END);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Justify, Rotation};

    fn region() -> Region {
        Region {
            id: 9,
            x: 10,
            y: 200,
            width: 300,
            height: 40,
            rotation: Rotation::Deg90,
            justify: Justify::Center,
            kind: RegionKind::Font,
            type_index: 3,
            attr: TEXT_INVERSE,
            mul1: 1,
            mul2: 2,
            default_data: String::new(),
        }
    }

    fn check_build(cmd: &dyn Command) -> Vec<u8> {
        let len = cmd.build(None).unwrap();
        let mut short = vec![0u8; len - 1];
        assert_eq!(cmd.build(Some(&mut short)).unwrap(), len);
        assert!(short.iter().all(|&b| b == 0), "short buffer written");

        let mut buf = vec![0u8; len + 4];
        assert_eq!(cmd.build(Some(&mut buf)).unwrap(), len);
        buf.truncate(len);
        assert_eq!(buf.first(), Some(&CMD_START));
        assert_eq!(buf.last(), Some(&CMD_END));
        buf
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(check_build(&StatusRequest), b"^S|^");
        assert_eq!(check_build(&FormFeed), b"^f|^");
        assert_eq!(check_build(&ClearError), b"^C|^");
        assert_eq!(check_build(&FlashTransfer { page: b'C' }), b"^z|$|C|^");
    }

    #[test]
    fn test_obtain_crc() {
        let cmd = ObtainCrc {
            start_addr: 0x0403_0201,
            seed: 0xBEEF,
        };
        assert_eq!(
            check_build(&cmd),
            [b'^', b'G', b'|', 1, 2, 3, 4, 0xEF, 0xBE, b'|', b'^']
        );
    }

    #[test]
    fn test_region() {
        let r = region();
        assert_eq!(
            check_build(&DefineRegion::define(&r)),
            b"^R|A|R|10|200|300|40|0|1|1|3|1|2|1|0||^".to_vec()
        );
        assert_eq!(check_build(&DefineRegion::delete(&r)), b"^R|A|DR|^");

        let graphic = Region {
            kind: RegionKind::Graphic,
            type_index: 1,
            attr: 7,
            ..region()
        };
        assert_eq!(
            check_build(&DefineRegion::define(&graphic)),
            b"^R|A|R|10|200|300|40|0|1|1|E|1|2|0|0||^".to_vec()
        );

        let barcode = Region {
            kind: RegionKind::Barcode,
            type_index: 2,
            attr: 12,
            ..region()
        };
        assert_eq!(
            check_build(&DefineRegion::define(&barcode)),
            b"^R|A|R|10|200|300|40|0|1|1|c|1|2|12|0||^".to_vec()
        );
    }

    #[test]
    fn test_region_bad_attr() {
        let r = Region {
            attr: 5,
            ..region()
        };
        let err = DefineRegion::define(&r).build(None).unwrap_err();
        assert!(matches!(err, Error::InvalidRegion { .. }));
        // deleting doesn't look at the attribute
        assert!(DefineRegion::delete(&r).build(None).is_ok());
    }

    #[test]
    fn test_template() {
        let t = Template {
            id: 2,
            regions: vec![0, 9, 100],
        };
        assert_eq!(
            check_build(&DefineTemplate::define(&t)),
            b"^T|2|R|500|1240|1|A|0|^".to_vec()
        );
        assert_eq!(check_build(&DefineTemplate::delete(&t)), b"^T|2|DR|^");
        let bad = Template {
            id: 1000,
            regions: vec![],
        };
        assert!(DefineTemplate::delete(&bad).build(None).is_err());
    }

    #[test]
    fn test_lib_manage() {
        let g = Graphic::new(2, vec![0x00, 0x7C, 0xFF]);
        assert_eq!(
            check_build(&LibManage::define(&g)),
            [&b"^l|A|F|F|3|"[..], &[0x00, 0x7C, 0xFF], b"|^"].concat()
        );
        assert_eq!(check_build(&LibManage::delete(&g)), b"^l|D|F|F|G|^");
        assert!(LibManage::delete(&Graphic::new(0, vec![])).build(None).is_err());
    }

    #[test]
    fn test_print() {
        let job = Job::new(3, vec!["ONE".into(), String::new(), "\u{e9}\u{263a}".into()]);
        assert_eq!(
            check_build(&Print::new(&job)),
            [&b"^P|3|1|ONE||"[..], &[0xE9, b'?'], b"|^"].concat()
        );

        let user = Job::new(101, vec!["x".into()]);
        assert_eq!(check_build(&Print::new(&user)), b"^P2|;|1|x|^");
    }
}
