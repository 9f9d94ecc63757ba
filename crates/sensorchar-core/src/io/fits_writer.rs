use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::Result;
use crate::frame::{Frame, HeaderValue};
use crate::io::fits::STRUCTURAL_KEYWORDS;

/// On-disk sample type for written frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitsBitpix {
    /// Unsigned 16-bit via BZERO = 32768, values rounded and clamped.
    U16,
    #[default]
    F32,
    F64,
}

impl FitsBitpix {
    fn code(self) -> i32 {
        match self {
            Self::U16 => 16,
            Self::F32 => -32,
            Self::F64 => -64,
        }
    }
}

/// Write a frame as a single primary HDU, carrying its header tags.
pub fn write_fits(path: &Path, frame: &Frame, bitpix: FitsBitpix) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    let mut cards: Vec<String> = vec![
        card("SIMPLE", &HeaderValue::Bool(true)),
        card("BITPIX", &HeaderValue::Int(bitpix.code() as i64)),
        card("NAXIS", &HeaderValue::Int(2)),
        card("NAXIS1", &HeaderValue::Int(frame.cols() as i64)),
        card("NAXIS2", &HeaderValue::Int(frame.rows() as i64)),
    ];
    if bitpix == FitsBitpix::U16 {
        cards.push(card("BZERO", &HeaderValue::Int(32768)));
        cards.push(card("BSCALE", &HeaderValue::Int(1)));
    }
    for (key, value) in frame.header.iter() {
        if !STRUCTURAL_KEYWORDS.contains(&key) && key.len() <= 8 {
            cards.push(card(key, value));
        }
    }
    cards.push(format!("{:<80}", "END"));

    let mut written = 0;
    for c in &cards {
        w.write_all(c.as_bytes())?;
        written += FITS_CARD_SIZE;
    }
    pad(&mut w, written, b' ')?;

    let mut data_bytes = 0;
    for &v in frame.data.iter() {
        match bitpix {
            FitsBitpix::U16 => {
                let stored = (v.round().clamp(0.0, 65535.0) - 32768.0) as i16;
                w.write_all(&stored.to_be_bytes())?;
                data_bytes += 2;
            }
            FitsBitpix::F32 => {
                w.write_all(&(v as f32).to_be_bytes())?;
                data_bytes += 4;
            }
            FitsBitpix::F64 => {
                w.write_all(&v.to_be_bytes())?;
                data_bytes += 8;
            }
        }
    }
    pad(&mut w, data_bytes, 0)?;

    w.flush()?;
    Ok(())
}

/// Longest escaped string value that fits between the quotes of a card.
const MAX_TEXT_LEN: usize = FITS_CARD_SIZE - 12;

fn card(key: &str, value: &HeaderValue) -> String {
    let key: String = key.chars().filter(char::is_ascii_graphic).take(8).collect();
    let value = match value {
        HeaderValue::Text(s) => format!("'{:<8}'", escape_text(s)),
        HeaderValue::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Int(i) => format!("{i:>20}"),
        HeaderValue::Float(f) => format!("{:>20}", format!("{f:E}")),
    };
    let mut c = format!("{:<8}= {}", key, value);
    c.truncate(FITS_CARD_SIZE);
    format!("{c:<80}")
}

/// Printable ASCII only (anything else becomes `?`), truncated before
/// quotes are doubled so an escaped `''` is never split.
fn escape_text(s: &str) -> String {
    let mut escaped = String::with_capacity(MAX_TEXT_LEN);
    for c in s.chars() {
        let c = if c == ' ' || c.is_ascii_graphic() { c } else { '?' };
        let width = if c == '\'' { 2 } else { 1 };
        if escaped.len() + width > MAX_TEXT_LEN {
            break;
        }
        if c == '\'' {
            escaped.push_str("''");
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn pad(w: &mut impl Write, written: usize, byte: u8) -> Result<()> {
    let rem = written % FITS_BLOCK_SIZE;
    if rem != 0 {
        w.write_all(&vec![byte; FITS_BLOCK_SIZE - rem])?;
    }
    Ok(())
}
