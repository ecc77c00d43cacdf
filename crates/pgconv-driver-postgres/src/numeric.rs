//! Exact decoding of the binary NUMERIC wire format
//!
//! Layout: `ndigits: i16, weight: i16, sign: u16, dscale: i16`, then
//! `ndigits` base-10000 digit groups. Group `i` is worth `10000^(weight - i)`.

use std::error::Error;
use std::fmt::Write;

use tokio_postgres::types::{FromSql, Type};

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_POSITIVE_INFINITY: u16 = 0xD000;
const SIGN_NEGATIVE_INFINITY: u16 = 0xF000;

type DecodeError = Box<dyn Error + Sync + Send>;

/// A NUMERIC value rendered as the text PostgreSQL itself would print
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericText(pub String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        decode_numeric(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decode a binary NUMERIC payload into its decimal text, keeping the
/// display scale (`9.90` stays `9.90`)
pub fn decode_numeric(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() < 8 {
        return Err("NUMERIC payload shorter than its header".into());
    }
    let word = |offset: usize| u16::from_be_bytes([raw[offset], raw[offset + 1]]);

    let ndigits = word(0) as usize;
    let weight = word(2) as i16 as i64;
    let sign = word(4);
    let dscale = word(6) as usize;

    match sign {
        SIGN_NAN => return Ok("NaN".to_string()),
        SIGN_POSITIVE_INFINITY => return Ok("Infinity".to_string()),
        SIGN_NEGATIVE_INFINITY => return Ok("-Infinity".to_string()),
        SIGN_POSITIVE | SIGN_NEGATIVE => {}
        other => return Err(format!("unknown NUMERIC sign {:#06x}", other).into()),
    }
    if raw.len() < 8 + ndigits * 2 {
        return Err("NUMERIC payload truncated".into());
    }

    let groups: Vec<u16> = (0..ndigits).map(|i| word(8 + i * 2)).collect();
    if groups.iter().any(|&g| g > 9999) {
        return Err("NUMERIC digit group out of range".into());
    }
    let group_at = |index: i64| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| groups.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if weight < 0 {
        text.push('0');
    } else {
        for index in 0..=weight {
            let group = group_at(index);
            if index == 0 {
                let _ = write!(text, "{}", group);
            } else {
                let _ = write!(text, "{:04}", group);
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        // fractional group k (1-based) sits at index weight + k
        let mut k = 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", group_at(weight + k));
            k += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    let is_zero = groups.iter().all(|&g| g == 0);
    if sign == SIGN_NEGATIVE && !is_zero {
        text.insert(0, '-');
    }
    Ok(text)
}
