//! PDF stream filter implementation
//!
//! Decode applies a filter chain in array order, encode applies it in reverse,
//! so `decode(encode(x)) == x` for every supported chain. Image codecs (DCT,
//! JPX, CCITT, JBIG2) are reported as unsupported and their payloads stay
//! available as raw bytes.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Object};

/// PDF stream filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCII85Decode,
    ASCIIHexDecode,
    FlateDecode,
    LZWDecode,
    RunLengthDecode,
    /// Crypt filter; decryption happens at load time so this is a pass-through
    Crypt,
    DCTDecode,
    JPXDecode,
    CCITTFaxDecode,
    JBIG2Decode,
}

/// Predictor parameters from `/DecodeParms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

/// Largest `/Colors` accepted by a predictor
const MAX_COLORS: i64 = 32;

/// Largest `/Columns` accepted by a predictor
const MAX_COLUMNS: i64 = 1 << 24;

impl PredictorParams {
    /// Read predictor settings; `None` when no predictor is in effect
    ///
    /// Out-of-range `/Colors`, `/Columns` or `/BitsPerComponent` fail with a
    /// `FilterError` rather than being clamped.
    pub fn from_params(params: Option<&Dictionary>) -> PDFResult<Option<Self>> {
        let Some(params) = params else { return Ok(None) };
        let predictor = params.get_i64("Predictor").unwrap_or(1);
        if predictor <= 1 {
            return Ok(None);
        }

        let colors = params.get_i64("Colors").unwrap_or(1);
        let bits_per_component = params.get_i64("BitsPerComponent").unwrap_or(8);
        let columns = params.get_i64("Columns").unwrap_or(1);
        let invalid = |what: &str, value: i64| PDFError::filter("Predictor", format!("invalid /{} {}", what, value));

        if !(1..=MAX_COLORS).contains(&colors) {
            return Err(invalid("Colors", colors));
        }
        if !matches!(bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(invalid("BitsPerComponent", bits_per_component));
        }
        if !(1..=MAX_COLUMNS).contains(&columns) {
            return Err(invalid("Columns", columns));
        }

        let params = Self {
            predictor: u8::try_from(predictor).unwrap_or(u8::MAX),
            colors: usize::try_from(colors).map_err(|_| invalid("Colors", colors))?,
            bits_per_component: usize::try_from(bits_per_component)
                .map_err(|_| invalid("BitsPerComponent", bits_per_component))?,
            columns: usize::try_from(columns).map_err(|_| invalid("Columns", columns))?,
        };
        params.row_length()?;
        Ok(Some(params))
    }

    /// Bytes per row, excluding any PNG tag byte
    fn row_length(&self) -> PDFResult<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .and_then(|bits| bits.checked_mul(self.columns))
            .and_then(|bits| bits.checked_add(7))
            .map(|bits| bits / 8)
            .filter(|&len| len > 0)
            .ok_or_else(|| PDFError::filter("Predictor", "row length is zero or overflows"))
    }

    /// Bytes per complete pixel, at least one
    fn bytes_per_pixel(&self) -> usize {
        ((self.colors * self.bits_per_component + 7) / 8).max(1)
    }
}

impl Filter {
    /// Create filter from name, accepting inline-image abbreviations
    pub fn from_name(name: &str) -> PDFResult<Self> {
        match name {
            "ASCII85Decode" | "A85" => Ok(Filter::ASCII85Decode),
            "ASCIIHexDecode" | "AHx" => Ok(Filter::ASCIIHexDecode),
            "FlateDecode" | "Fl" => Ok(Filter::FlateDecode),
            "LZWDecode" | "LZW" => Ok(Filter::LZWDecode),
            "RunLengthDecode" | "RL" => Ok(Filter::RunLengthDecode),
            "Crypt" => Ok(Filter::Crypt),
            "DCTDecode" | "DCT" => Ok(Filter::DCTDecode),
            "JPXDecode" => Ok(Filter::JPXDecode),
            "CCITTFaxDecode" | "CCF" => Ok(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Ok(Filter::JBIG2Decode),
            _ => Err(PDFError::UnsupportedFilter(name.to_string())),
        }
    }

    /// Canonical filter name
    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::LZWDecode => "LZWDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::Crypt => "Crypt",
            Filter::DCTDecode => "DCTDecode",
            Filter::JPXDecode => "JPXDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
        }
    }

    /// Whether this engine can both decode and encode the filter
    pub fn is_supported(&self) -> bool {
        match self {
            Filter::LZWDecode => cfg!(feature = "lzw"),
            Filter::DCTDecode | Filter::JPXDecode | Filter::CCITTFaxDecode | Filter::JBIG2Decode => false,
            _ => true,
        }
    }

    /// Reverse this filter
    pub fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> PDFResult<Vec<u8>> {
        trace!("Decoding {} bytes with {}", data.len(), self.name());
        match self {
            Filter::ASCII85Decode => decode_ascii85(data),
            Filter::ASCIIHexDecode => decode_ascii_hex(data),
            Filter::RunLengthDecode => Ok(decode_run_length(data)),
            Filter::Crypt => Ok(data.to_vec()),
            Filter::FlateDecode => {
                let inflated = decode_flate(data)?;
                apply_predictor(inflated, params)
            }
            Filter::LZWDecode => {
                let expanded = decode_lzw(data, early_change(params))?;
                apply_predictor(expanded, params)
            }
            _ => Err(PDFError::UnsupportedFilter(self.name().to_string())),
        }
    }

    /// Apply this filter
    pub fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> PDFResult<Vec<u8>> {
        trace!("Encoding {} bytes with {}", data.len(), self.name());
        match self {
            Filter::ASCII85Decode => Ok(encode_ascii85(data)),
            Filter::ASCIIHexDecode => Ok(encode_ascii_hex(data)),
            Filter::RunLengthDecode => Ok(encode_run_length(data)),
            Filter::Crypt => Ok(data.to_vec()),
            Filter::FlateDecode => {
                let predicted = remove_predictor(data, params)?;
                encode_flate(&predicted)
            }
            Filter::LZWDecode => {
                let predicted = remove_predictor(data, params)?;
                encode_lzw(&predicted, early_change(params))
            }
            _ => Err(PDFError::UnsupportedFilter(self.name().to_string())),
        }
    }
}

/// Read `/Filter` and `/DecodeParms` from a stream dictionary
///
/// Both entries may be a single value or an array; the returned vectors have
/// equal length. Unknown filter names fail with `UnsupportedFilter`.
pub fn filter_chain(dict: &Dictionary) -> PDFResult<(Vec<Filter>, Vec<Option<Dictionary>>)> {
    let filters = match dict.get("Filter") {
        None | Some(Object::Null) => Vec::new(),
        Some(Object::Name(name)) => vec![Filter::from_name(name)?],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| item.as_name().and_then(Filter::from_name))
            .collect::<PDFResult<Vec<_>>>()?,
        Some(other) => {
            return Err(PDFError::InvalidObjectType {
                expected: "filter name or array",
                found: other.type_name(),
            })
        }
    };

    let mut params: Vec<Option<Dictionary>> = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(Object::Dictionary(d)) => vec![Some(d.clone())],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| match item {
                Object::Dictionary(d) => Some(d.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    params.resize(filters.len(), None);

    Ok((filters, params))
}

/// Decode through a filter chain in array order
pub fn decode(data: &[u8], filters: &[Filter], params: &[Option<Dictionary>]) -> PDFResult<Vec<u8>> {
    let mut current = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        current = filter.decode(&current, params.get(i).and_then(Option::as_ref))?;
    }
    Ok(current)
}

/// Encode through a filter chain, last filter first
pub fn encode(data: &[u8], filters: &[Filter], params: &[Option<Dictionary>]) -> PDFResult<Vec<u8>> {
    let mut current = data.to_vec();
    for (i, filter) in filters.iter().enumerate().rev() {
        current = filter.encode(&current, params.get(i).and_then(Option::as_ref))?;
    }
    Ok(current)
}

fn early_change(params: Option<&Dictionary>) -> bool {
    params.and_then(|p| p.get_i64("EarlyChange")).unwrap_or(1) != 0
}

fn decode_flate(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut output) {
        Ok(_) => return Ok(output),
        Err(err) if !output.is_empty() => {
            warn!("Flate stream truncated after {} bytes: {}", output.len(), err);
            return Ok(output);
        }
        Err(_) => {}
    }

    // Some producers omit the zlib header
    let mut raw = Vec::new();
    match DeflateDecoder::new(data).read_to_end(&mut raw) {
        Ok(_) => Ok(raw),
        Err(err) if !raw.is_empty() => {
            warn!("Raw deflate stream truncated after {} bytes: {}", raw.len(), err);
            Ok(raw)
        }
        Err(err) => Err(PDFError::filter("FlateDecode", err.to_string())),
    }
}

fn encode_flate(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "lzw")]
fn decode_lzw(data: &[u8], early_change: bool) -> PDFResult<Vec<u8>> {
    use weezl::{decode::Decoder, BitOrder};

    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };

    let mut output = Vec::new();
    let result = decoder.into_vec(&mut output).decode_all(data);
    match result.status {
        Ok(_) => Ok(output),
        Err(err) if !output.is_empty() => {
            warn!("LZW stream damaged after {} bytes: {}", output.len(), err);
            Ok(output)
        }
        Err(err) => Err(PDFError::filter("LZWDecode", err.to_string())),
    }
}

#[cfg(feature = "lzw")]
fn encode_lzw(data: &[u8], early_change: bool) -> PDFResult<Vec<u8>> {
    use weezl::{encode::Encoder, BitOrder};

    let mut encoder = if early_change {
        Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Encoder::new(BitOrder::Msb, 8)
    };
    encoder
        .encode(data)
        .map_err(|err| PDFError::filter("LZWDecode", err.to_string()))
}

#[cfg(not(feature = "lzw"))]
fn decode_lzw(_data: &[u8], _early_change: bool) -> PDFResult<Vec<u8>> {
    Err(PDFError::UnsupportedFilter("LZWDecode".to_string()))
}

#[cfg(not(feature = "lzw"))]
fn encode_lzw(_data: &[u8], _early_change: bool) -> PDFResult<Vec<u8>> {
    Err(PDFError::UnsupportedFilter("LZWDecode".to_string()))
}

fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    let body = match data.iter().position(|&b| !super::lexer::is_whitespace(b)) {
        Some(start) if data[start..].starts_with(b"<~") => &data[start + 2..],
        _ => data,
    };

    let mut iter = body.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        match byte {
            b'~' => {
                if iter.peek() != Some(&b'>') {
                    warn!("ASCII85 end marker without '>'");
                }
                break;
            }
            b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    output.extend_from_slice(&ascii85_group(&group)?);
                    count = 0;
                }
            }
            b if super::lexer::is_whitespace(b) => {}
            other => {
                return Err(PDFError::filter(
                    "ASCII85Decode",
                    format!("invalid character 0x{:02x}", other),
                ))
            }
        }
    }

    match count {
        0 => {}
        1 => return Err(PDFError::filter("ASCII85Decode", "dangling single character")),
        n => {
            for slot in group.iter_mut().skip(n) {
                *slot = b'u' - b'!';
            }
            let bytes = ascii85_group(&group)?;
            output.extend_from_slice(&bytes[..n - 1]);
        }
    }

    Ok(output)
}

fn ascii85_group(group: &[u8; 5]) -> PDFResult<[u8; 4]> {
    let value = group
        .iter()
        .try_fold(0u64, |acc, &digit| Some(acc * 85 + u64::from(digit)))
        .filter(|&v| v <= u64::from(u32::MAX))
        .ok_or_else(|| PDFError::filter("ASCII85Decode", "group value overflow"))?;
    Ok((value as u32).to_be_bytes())
}

fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 5 / 4 + 4);

    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        if chunk.len() == 4 && value == 0 {
            output.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + b'!';
            value /= 85;
        }
        output.extend_from_slice(&digits[..chunk.len() + 1]);
    }

    output.extend_from_slice(b"~>");
    output
}

fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        if super::lexer::is_whitespace(byte) {
            continue;
        }
        let nibble = (byte as char)
            .to_digit(16)
            .ok_or_else(|| PDFError::filter("ASCIIHexDecode", format!("invalid digit 0x{:02x}", byte)))?
            as u8;
        match high.take() {
            Some(h) => output.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }

    if let Some(h) = high {
        output.push(h << 4);
    }
    Ok(output)
}

fn encode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut output = hex::encode_upper(data).into_bytes();
    output.push(b'>');
    output
}

fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let end = (i + length as usize + 1).min(data.len());
                output.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                if let Some(&byte) = data.get(i) {
                    output.extend(std::iter::repeat(byte).take(257 - length as usize));
                    i += 1;
                }
            }
        }
    }

    output
}

fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / 64 + 2);
    let mut i = 0;

    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 128 {
            run += 1;
        }

        if run >= 2 {
            output.push((257 - run) as u8);
            output.push(data[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < data.len() && i - start < 128 {
            if i + 1 < data.len() && data[i + 1] == data[i] {
                break;
            }
            i += 1;
        }
        if i == start {
            i += 1;
        }
        output.push((i - start - 1) as u8);
        output.extend_from_slice(&data[start..i]);
    }

    output.push(128);
    output
}

/// Undo a predictor after decompression
///
/// Any PNG predictor value decodes the same way, since each row carries its
/// own tag.
fn apply_predictor(data: Vec<u8>, params: Option<&Dictionary>) -> PDFResult<Vec<u8>> {
    match PredictorParams::from_params(params)? {
        None => Ok(data),
        Some(p) if p.predictor == 2 => tiff_predict(&data, &p, false),
        Some(p) if p.predictor >= 10 => png_decode(&data, &p),
        Some(p) => Err(PDFError::filter("Predictor", format!("unknown predictor {}", p.predictor))),
    }
}

/// Apply a predictor before compression
fn remove_predictor(data: &[u8], params: Option<&Dictionary>) -> PDFResult<Vec<u8>> {
    match PredictorParams::from_params(params)? {
        None => Ok(data.to_vec()),
        Some(p) if p.predictor == 2 => tiff_predict(data, &p, true),
        Some(p) if (10..=15).contains(&p.predictor) => png_encode(data, &p),
        Some(p) => Err(PDFError::filter("Predictor", format!("unknown predictor {}", p.predictor))),
    }
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn png_decode(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    let row_len = params.row_length()?;
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len.min(data.len())];

    for chunk in data.chunks(row_len + 1) {
        let tag = chunk[0];
        let mut row = chunk[1..].to_vec();

        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            row[i] = match tag {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(PDFError::filter("Predictor", format!("invalid PNG row tag {}", other)))
                }
            };
        }

        output.extend_from_slice(&row);
        previous[..row.len()].copy_from_slice(&row);
    }

    Ok(output)
}

fn png_filter_row(tag: u8, row: &[u8], previous: &[u8], bpp: usize) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(row.len() + 1);
    encoded.push(tag);
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        let up = previous[i];
        let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
        encoded.push(match tag {
            1 => row[i].wrapping_sub(left),
            2 => row[i].wrapping_sub(up),
            3 => row[i].wrapping_sub(((u16::from(left) + u16::from(up)) / 2) as u8),
            4 => row[i].wrapping_sub(paeth(left, up, up_left)),
            _ => row[i],
        });
    }
    encoded
}

fn png_encode(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    let row_len = params.row_length()?;
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len() + data.len() / row_len + 1);
    let mut previous = vec![0u8; row_len.min(data.len())];

    for row in data.chunks(row_len) {
        let encoded = match params.predictor {
            15 => (0..=4u8)
                .map(|tag| png_filter_row(tag, row, &previous, bpp))
                .min_by_key(|candidate| {
                    candidate[1..]
                        .iter()
                        .map(|&b| u32::from((b as i8).unsigned_abs()))
                        .sum::<u32>()
                })
                .unwrap_or_default(),
            p => png_filter_row(p - 10, row, &previous, bpp),
        };
        output.extend_from_slice(&encoded);
        previous[..row.len()].copy_from_slice(row);
    }

    Ok(output)
}

/// TIFF predictor 2, horizontal differencing per component
fn tiff_predict(data: &[u8], params: &PredictorParams, encode: bool) -> PDFResult<Vec<u8>> {
    let row_len = params.row_length()?;
    let colors = params.colors;
    let bpc = params.bits_per_component;
    let mut output = data.to_vec();

    for row in output.chunks_mut(row_len) {
        match bpc {
            8 => {
                if encode {
                    for i in (colors..row.len()).rev() {
                        row[i] = row[i].wrapping_sub(row[i - colors]);
                    }
                } else {
                    for i in colors..row.len() {
                        row[i] = row[i].wrapping_add(row[i - colors]);
                    }
                }
            }
            16 => {
                let samples = row.len() / 2;
                let read = |row: &[u8], k: usize| u16::from_be_bytes([row[2 * k], row[2 * k + 1]]);
                let order: Box<dyn Iterator<Item = usize>> = if encode {
                    Box::new((colors..samples).rev())
                } else {
                    Box::new(colors..samples)
                };
                for k in order {
                    let value = if encode {
                        read(&*row, k).wrapping_sub(read(&*row, k - colors))
                    } else {
                        read(&*row, k).wrapping_add(read(&*row, k - colors))
                    };
                    row[2 * k..2 * k + 2].copy_from_slice(&value.to_be_bytes());
                }
            }
            1 | 2 | 4 => {
                let mask = (1u16 << bpc) - 1;
                let samples = (row.len() * 8 / bpc).min(colors * params.columns);
                let get = |row: &[u8], k: usize| {
                    let bit = k * bpc;
                    u16::from(row[bit / 8] >> (8 - bpc - bit % 8)) & mask
                };
                let put = |row: &mut [u8], k: usize, value: u16| {
                    let bit = k * bpc;
                    let shift = 8 - bpc - bit % 8;
                    row[bit / 8] &= !((mask as u8) << shift);
                    row[bit / 8] |= ((value & mask) as u8) << shift;
                };
                if encode {
                    for k in (colors..samples).rev() {
                        let value = get(&*row, k).wrapping_sub(get(&*row, k - colors));
                        put(&mut *row, k, value);
                    }
                } else {
                    for k in colors..samples {
                        let value = get(&*row, k).wrapping_add(get(&*row, k - colors));
                        put(&mut *row, k, value);
                    }
                }
            }
            other => warn!("TIFF predictor with {} bits per component left unchanged", other),
        }
    }

    Ok(output)
}
