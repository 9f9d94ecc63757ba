use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::Array2;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{Result, SensorError};
use crate::frame::{Frame, FrameHeader, HeaderValue};

/// Keywords describing the data layout; they never travel with frame headers.
pub(crate) const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE",
];

/// Pixel layout of a primary HDU.
#[derive(Clone, Debug, PartialEq)]
pub struct FitsLayout {
    pub bitpix: i32,
    pub rows: usize,
    pub cols: usize,
    pub bzero: f64,
    pub bscale: f64,
    /// Byte offset of the first pixel.
    pub data_offset: usize,
}

impl FitsLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bitpix.unsigned_abs() / 8) as usize
    }

    pub fn row_byte_size(&self) -> usize {
        self.cols * self.bytes_per_pixel()
    }

    pub fn data_byte_size(&self) -> usize {
        self.rows * self.row_byte_size()
    }
}

/// Memory-mapped reader for single-HDU 2D FITS images.
pub struct FitsReader {
    mmap: Mmap,
    pub header: FrameHeader,
    pub layout: FitsLayout,
}

impl FitsReader {
    /// Open a FITS file and parse its primary header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() < FITS_BLOCK_SIZE as u64 {
            return Err(SensorError::InvalidFits(format!(
                "{}: file too small for a FITS header",
                path.display()
            )));
        }
        let mmap = unsafe { Mmap::map(&file)? };

        let (header, header_len) = parse_header(&mmap)
            .map_err(|msg| SensorError::InvalidFits(format!("{}: {msg}", path.display())))?;
        let layout = layout_from_header(&header, header_len)
            .map_err(|msg| SensorError::InvalidFits(format!("{}: {msg}", path.display())))?;

        let expected = layout.data_offset + layout.data_byte_size();
        if mmap.len() < expected {
            return Err(SensorError::InvalidFits(format!(
                "{}: data truncated, expected at least {} bytes, got {}",
                path.display(),
                expected,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            header,
            layout,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.layout.rows, self.layout.cols)
    }

    /// Decode the whole image.
    pub fn read_frame(&self) -> Result<Frame> {
        let data = self.read_rows(0, self.layout.rows)?;
        Ok(Frame::new(data).with_header(self.tags()))
    }

    /// Decode `count` rows starting at `start` without touching the rest of the image.
    pub fn read_rows(&self, start: usize, count: usize) -> Result<Array2<f64>> {
        let layout = &self.layout;
        if start + count > layout.rows {
            return Err(SensorError::InvalidParameter(format!(
                "rows {start}..{} out of range (image has {})",
                start + count,
                layout.rows
            )));
        }
        let begin = layout.data_offset + start * layout.row_byte_size();
        let end = begin + count * layout.row_byte_size();
        let raw = &self.mmap[begin..end];

        let bpp = layout.bytes_per_pixel();
        let mut data = Array2::<f64>::zeros((count, layout.cols));
        for (dst, sample) in data.iter_mut().zip(raw.chunks_exact(bpp)) {
            *dst = layout.bzero + layout.bscale * decode_sample(sample, layout.bitpix);
        }
        Ok(data)
    }

    /// Header tags without the structural keywords.
    pub fn tags(&self) -> FrameHeader {
        let mut tags = FrameHeader::new();
        for (key, value) in self.header.iter() {
            if !STRUCTURAL_KEYWORDS.contains(&key) {
                tags.set(key, value.clone());
            }
        }
        tags
    }
}

/// Read a FITS file into a frame tagged with its path.
pub fn load_fits(path: &Path) -> Result<Frame> {
    let reader = FitsReader::open(path)?;
    Ok(reader.read_frame()?.with_source(path))
}

fn decode_sample(bytes: &[u8], bitpix: i32) -> f64 {
    match bitpix {
        8 => bytes[0] as f64,
        16 => BigEndian::read_i16(bytes) as f64,
        32 => BigEndian::read_i32(bytes) as f64,
        64 => BigEndian::read_i64(bytes) as f64,
        -32 => BigEndian::read_f32(bytes) as f64,
        _ => BigEndian::read_f64(bytes),
    }
}

/// Parse header cards until `END`. Returns the header and its padded byte length.
fn parse_header(buf: &[u8]) -> std::result::Result<(FrameHeader, usize), String> {
    let mut header = FrameHeader::new();
    let mut offset = 0;

    loop {
        if offset + FITS_CARD_SIZE > buf.len() {
            return Err("END card not found".into());
        }
        let bytes = &buf[offset..offset + FITS_CARD_SIZE];
        if !bytes.is_ascii() {
            return Err(format!("non-ASCII header card at byte {offset}"));
        }
        let card = std::str::from_utf8(bytes)
            .map_err(|_| format!("non-ASCII header card at byte {offset}"))?;
        offset += FITS_CARD_SIZE;

        let keyword = card[..8].trim_end();
        if offset == FITS_CARD_SIZE && keyword != "SIMPLE" {
            return Err("missing SIMPLE card".into());
        }
        if keyword == "END" {
            break;
        }
        if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
            continue;
        }
        if &card[8..10] != "= " {
            continue;
        }
        if let Some(value) = parse_value(&card[10..]) {
            header.set(keyword, value);
        }
    }

    let padded = offset.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
    Ok((header, padded))
}

fn parse_value(field: &str) -> Option<HeaderValue> {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        // '' is an escaped quote inside a string
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    text.push('\'');
                } else {
                    break;
                }
            } else {
                text.push(c);
            }
        }
        return Some(HeaderValue::Text(text.trim_end().to_string()));
    }

    let raw = field.split('/').next().unwrap_or("").trim();
    match raw {
        "" => None,
        "T" => Some(HeaderValue::Bool(true)),
        "F" => Some(HeaderValue::Bool(false)),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Some(HeaderValue::Int(i))
            } else {
                raw.replace(['D', 'd'], "E")
                    .parse::<f64>()
                    .ok()
                    .map(HeaderValue::Float)
            }
        }
    }
}

fn layout_from_header(
    header: &FrameHeader,
    header_len: usize,
) -> std::result::Result<FitsLayout, String> {
    let int = |key: &str| {
        header
            .get(key)
            .and_then(HeaderValue::as_i64)
            .ok_or_else(|| format!("missing required keyword {key}"))
    };

    let bitpix = int("BITPIX")? as i32;
    if ![8, 16, 32, 64, -32, -64].contains(&bitpix) {
        return Err(format!("unsupported BITPIX {bitpix}"));
    }

    let naxis = int("NAXIS")?;
    let extra_planes = if naxis == 3 { int("NAXIS3")? } else { 1 };
    if !(naxis == 2 || (naxis == 3 && extra_planes == 1)) {
        return Err(format!("expected a 2D image, NAXIS = {naxis}"));
    }

    let cols = int("NAXIS1")?;
    let rows = int("NAXIS2")?;
    if cols <= 0 || rows <= 0 {
        return Err(format!("invalid image dimensions {cols}x{rows}"));
    }

    Ok(FitsLayout {
        bitpix,
        rows: rows as usize,
        cols: cols as usize,
        bzero: header.get_f64("BZERO").unwrap_or(0.0),
        bscale: header.get_f64("BSCALE").unwrap_or(1.0),
        data_offset: header_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_strings_with_escapes() {
        let v = parse_value(" 'O''Brien '           / observer").unwrap();
        assert_eq!(v, HeaderValue::Text("O'Brien".into()));
    }

    #[test]
    fn parses_numbers_and_logicals() {
        assert_eq!(parse_value("                 120 / s"), Some(HeaderValue::Int(120)));
        assert_eq!(parse_value("              1.5D-3"), Some(HeaderValue::Float(1.5e-3)));
        assert_eq!(parse_value("                   T"), Some(HeaderValue::Bool(true)));
        assert_eq!(parse_value("   / only a comment"), None);
    }
}
