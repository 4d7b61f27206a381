//! Mapping of logical ids to the byte codes used on the wire.
//!
//! The printer uses sparse byte ranges for most of its id spaces. Ids past the
//! end of a range saturate at the last usable code instead of failing, so
//! several logical ids may share one device byte.

use snafu::ensure;

use crate::types::{Error, IdKind, InvalidIdSnafu};
use core::cmp::min;
use core::ops::RangeInclusive;

const LOGICAL_IDS: RangeInclusive<i16> = 0..=999;
const GRAPHIC_IDS: RangeInclusive<i16> = 1..=255;

/// First logical template id stored in the user area.
pub const FIRST_USER_TEMPLATE: i16 = 100;

const fn invalid_id(kind: IdKind, id: i16) -> InvalidIdSnafu<IdKind, i16> {
    InvalidIdSnafu { kind, id }
}

fn check(kind: IdKind, id: i16, range: RangeInclusive<i16>) -> Result<(), Error> {
    ensure!(range.contains(&id), invalid_id(kind, id));
    Ok(())
}

/// True for templates stored in the user area rather than in firmware.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[0, 999\].
pub fn is_user_defined_template(id: i16) -> Result<bool, Error> {
    check(IdKind::Template, id, LOGICAL_IDS)?;
    Ok(id >= FIRST_USER_TEMPLATE)
}

/// Device byte for a template id.
///
/// ## Example
/// ```
/// use psa66_driver::catalog::template_to_drv;
/// assert_eq!(template_to_drv(3).unwrap(), b'3');
/// assert_eq!(template_to_drv(11).unwrap(), template_to_drv(13).unwrap());
/// ```
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[0, 999\].
pub fn template_to_drv(id: i16) -> Result<u8, Error> {
    if !is_user_defined_template(id)? {
        let b = min(id, 11) as u8;
        if b <= 9 {
            return Ok(b + 0x30);
        } else if id == i16::from(b'N') {
            // firmware template 'N'
            return Ok(0x4E);
        }
        return Ok(b + 0x37);
    }

    let b = min(id - FIRST_USER_TEMPLATE, 63) as u8;
    Ok(match b {
        0..=6 => b + 0x3A,
        7..=33 => b + 0x3C,
        34..=62 => b + 0x3D,
        _ => 0x7D,
    })
}

/// Device byte for a region id.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[0, 999\].
pub fn region_to_drv(id: i16) -> Result<u8, Error> {
    check(IdKind::Region, id, LOGICAL_IDS)?;

    if id < 100 {
        let b = min(id, 46) as u8;
        return Ok(match b {
            0..=8 => b + 0x31,
            9..=15 => b + 0x38,
            16..=19 => b + 0x39,
            20..=27 => b + 0x3A,
            28 => 0x58,
            29 => 0x5A,
            _ => b + 0x43,
        });
    }

    let b = min(id - 100, 28) as u8;
    Ok(match b {
        0 => 0x30,
        1..=7 => b + 0x39,
        8 => 0x48,
        9 => 0x4D,
        10..=11 => b + 0x4C,
        12 => 0x59,
        13..=15 => b + 0x4E,
        16..=17 => b + 0x4F,
        18..=27 => b + 0x60,
        _ => 0x7D,
    })
}

/// Device font number for a font id.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[0, 999\].
pub fn font_to_drv(id: i16) -> Result<u8, Error> {
    check(IdKind::Font, id, LOGICAL_IDS)?;
    Ok(min(id, 15) as u8)
}

/// Device byte for a graphic id.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[1, 255\].
pub fn graphic_to_drv(id: i16) -> Result<u8, Error> {
    check(IdKind::Graphic, id, GRAPHIC_IDS)?;
    if id < 26 {
        Ok(id as u8 + 0x44)
    } else {
        Ok(min(id, 27) as u8 + 0x45)
    }
}

/// Device byte for a barcode id.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[0, 999\].
pub fn barcode_to_drv(id: i16) -> Result<u8, Error> {
    check(IdKind::Barcode, id, LOGICAL_IDS)?;
    if id < 27 {
        Ok(b'a' + id as u8)
    } else {
        Ok(b'}')
    }
}

/// Flash page holding a template. All firmware templates share page `A`.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` is outside \[0, 999\].
pub fn template_page(id: i16) -> Result<u8, Error> {
    if !is_user_defined_template(id)? {
        return Ok(b'A');
    }
    Ok(min(i16::from(b'B') + id - FIRST_USER_TEMPLATE, i16::from(b'J')) as u8)
}

/// Page selector sent with print commands for user templates.
/// # Errors
/// Returns [`Error::InvalidId`] if `id` isn't a user template id.
pub fn template_print_page(id: i16) -> Result<u8, Error> {
    ensure!(
        is_user_defined_template(id)?,
        invalid_id(IdKind::Template, id)
    );
    Ok(min(i16::from(b'1') + id - FIRST_USER_TEMPLATE, i16::from(b'9')) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_ids() {
        assert_eq!(template_to_drv(0).unwrap(), b'0');
        assert_eq!(template_to_drv(9).unwrap(), b'9');
        assert_eq!(template_to_drv(10).unwrap(), b'A');
        for id in 11..=13 {
            assert_eq!(template_to_drv(id).unwrap(), b'B');
        }
        assert_eq!(template_to_drv(99).unwrap(), b'B');
        assert_eq!(template_to_drv(78).unwrap(), b'N');

        assert_eq!(template_to_drv(100).unwrap(), 0x3A);
        assert_eq!(template_to_drv(106).unwrap(), 0x40);
        assert_eq!(template_to_drv(107).unwrap(), 0x43);
        assert_eq!(template_to_drv(133).unwrap(), 0x5D);
        assert_eq!(template_to_drv(134).unwrap(), 0x5F);
        assert_eq!(template_to_drv(162).unwrap(), 0x7B);
        assert_eq!(template_to_drv(163).unwrap(), 0x7D);
        assert_eq!(template_to_drv(999).unwrap(), 0x7D);

        assert!(template_to_drv(-1).is_err());
        assert!(template_to_drv(1000).is_err());
    }

    #[test]
    fn test_ids_are_stable() {
        for id in LOGICAL_IDS {
            assert_eq!(template_to_drv(id).unwrap(), template_to_drv(id).unwrap());
            assert_eq!(region_to_drv(id).unwrap(), region_to_drv(id).unwrap());
        }
    }

    #[test]
    fn test_region_ids() {
        assert_eq!(region_to_drv(0).unwrap(), b'1');
        assert_eq!(region_to_drv(8).unwrap(), b'9');
        assert_eq!(region_to_drv(9).unwrap(), b'A');
        assert_eq!(region_to_drv(16).unwrap(), b'I');
        assert_eq!(region_to_drv(20).unwrap(), b'N');
        assert_eq!(region_to_drv(28).unwrap(), b'X');
        assert_eq!(region_to_drv(29).unwrap(), b'Z');
        assert_eq!(region_to_drv(30).unwrap(), b'a');
        assert_eq!(region_to_drv(46).unwrap(), b'q');
        assert_eq!(region_to_drv(99).unwrap(), b'q');

        assert_eq!(region_to_drv(100).unwrap(), b'0');
        assert_eq!(region_to_drv(101).unwrap(), b':');
        assert_eq!(region_to_drv(108).unwrap(), b'H');
        assert_eq!(region_to_drv(109).unwrap(), b'M');
        assert_eq!(region_to_drv(112).unwrap(), b'Y');
        assert_eq!(region_to_drv(118).unwrap(), b'r');
        assert_eq!(region_to_drv(128).unwrap(), b'}');
        assert_eq!(region_to_drv(999).unwrap(), b'}');
        assert!(region_to_drv(1000).is_err());
    }

    #[test]
    fn test_other_ids() {
        assert_eq!(font_to_drv(3).unwrap(), 3);
        assert_eq!(font_to_drv(500).unwrap(), 15);

        assert!(graphic_to_drv(0).is_err());
        assert_eq!(graphic_to_drv(1).unwrap(), b'E');
        assert_eq!(graphic_to_drv(25).unwrap(), b']');
        assert_eq!(graphic_to_drv(26).unwrap(), b'_');
        assert_eq!(graphic_to_drv(255).unwrap(), b'`');
        assert!(graphic_to_drv(256).is_err());

        assert_eq!(barcode_to_drv(0).unwrap(), b'a');
        assert_eq!(barcode_to_drv(26).unwrap(), b'{');
        assert_eq!(barcode_to_drv(27).unwrap(), b'}');
    }

    #[test]
    fn test_pages() {
        assert_eq!(template_page(5).unwrap(), b'A');
        assert_eq!(template_page(100).unwrap(), b'B');
        assert_eq!(template_page(108).unwrap(), b'J');
        assert_eq!(template_page(500).unwrap(), b'J');

        assert!(template_print_page(5).is_err());
        assert_eq!(template_print_page(100).unwrap(), b'1');
        assert_eq!(template_print_page(120).unwrap(), b'9');
    }
}
