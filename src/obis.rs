//! # OBIS Identifier Parsing
//!
//! This module parses IEC 62056-61 OBIS codes of the form `A-B:C.D.E*F`,
//! commonly used to address registers of electricity meters. It leverages the
//! `nom` crate for parsing and keeps a small alias table for the codes that
//! show up in practically every configuration.
//!
//! ## Usage
//!
//! ```rust
//! use meterlog_rs::obis::ObisCode;
//!
//! let code: ObisCode = "1-0:1.8.0".parse().unwrap();
//! assert_eq!(code.to_string(), "1-0:1.8.0");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use nom::{
    character::complete::{char, u8 as dec_u8},
    combinator::{all_consuming, opt},
    sequence::{preceded, tuple},
    IResult,
};
use once_cell::sync::Lazy;

use crate::error::MeterLogError;

/// Shorthand names accepted wherever a full OBIS code is expected.
static ALIASES: Lazy<HashMap<&'static str, ObisCode>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert("energy", ObisCode::new(1, 0, 1, 8, 0));
    table.insert("power", ObisCode::new(1, 0, 1, 7, 0));
    table.insert("voltage", ObisCode::new(1, 0, 32, 7, 0));
    table.insert("current", ObisCode::new(1, 0, 31, 7, 0));
    table.insert("frequency", ObisCode::new(1, 0, 14, 7, 0));
    table
});

/// An OBIS register address `A-B:C.D.E*F`.
///
/// The storage field `F` defaults to 255 ("current value") and is omitted
/// from the textual form when it holds that default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObisCode {
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
}

impl ObisCode {
    /// Creates a code with the default storage field (255).
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8) -> Self {
        ObisCode {
            a,
            b,
            c,
            d,
            e,
            f: 255,
        }
    }

    /// The six groups in `A, B, C, D, E, F` order.
    pub fn groups(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}.{}.{}",
            self.a, self.b, self.c, self.d, self.e
        )?;
        if self.f != 255 {
            write!(f, "*{}", self.f)?;
        }
        Ok(())
    }
}

/// Parses the full form `A-B:C.D.E` with an optional `*F` suffix.
fn parse_full(input: &str) -> IResult<&str, ObisCode> {
    let (input, (a, _, b, _, c, _, d, _, e, f)) = tuple((
        dec_u8,
        char('-'),
        dec_u8,
        char(':'),
        dec_u8,
        char('.'),
        dec_u8,
        char('.'),
        dec_u8,
        opt(preceded(char('*'), dec_u8)),
    ))(input)?;
    Ok((
        input,
        ObisCode {
            a,
            b,
            c,
            d,
            e,
            f: f.unwrap_or(255),
        },
    ))
}

/// Parses the short form `C.D.E`, which implies the electricity medium
/// (`A = 1`) on the first device channel (`B = 0`).
fn parse_short(input: &str) -> IResult<&str, ObisCode> {
    let (input, (c, _, d, _, e)) = tuple((dec_u8, char('.'), dec_u8, char('.'), dec_u8))(input)?;
    Ok((input, ObisCode::new(1, 0, c, d, e)))
}

impl FromStr for ObisCode {
    type Err = MeterLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(parse_full)(s)
            .or_else(|_| all_consuming(parse_short)(s))
            .map(|(_, code)| code)
            .map_err(|_| MeterLogError::ParseError(format!("not an OBIS code: {s:?}")))
    }
}

/// Looks up a shorthand alias, e.g. `"power"` for `1-0:1.7.0`.
pub fn lookup_alias(name: &str) -> Option<ObisCode> {
    ALIASES.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        let code: ObisCode = "1-0:1.8.0".parse().unwrap();
        assert_eq!(code.groups(), [1, 0, 1, 8, 0, 255]);
    }

    #[test]
    fn test_parse_storage_field() {
        let code: ObisCode = "1-0:1.8.0*96".parse().unwrap();
        assert_eq!(code.groups(), [1, 0, 1, 8, 0, 96]);
        assert_eq!(code.to_string(), "1-0:1.8.0*96");
    }

    #[test]
    fn test_parse_short_form() {
        let code: ObisCode = "16.7.0".parse().unwrap();
        assert_eq!(code.groups(), [1, 0, 16, 7, 0, 255]);
    }

    #[test]
    fn test_display_omits_default_storage() {
        let code = ObisCode::new(1, 0, 32, 7, 0);
        assert_eq!(code.to_string(), "1-0:32.7.0");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<ObisCode>().is_err());
        assert!("1-0:1.8".parse::<ObisCode>().is_err());
        assert!("1-0:1.8.0trailing".parse::<ObisCode>().is_err());
        assert!("power".parse::<ObisCode>().is_err());
    }

    #[test]
    fn test_alias_lookup() {
        assert_eq!(lookup_alias("energy"), Some(ObisCode::new(1, 0, 1, 8, 0)));
        assert_eq!(lookup_alias("bogus"), None);
    }
}
