//! PDF stream object implementation

use std::cell::OnceCell;

use log::{debug, trace};

use super::filter::{self, Filter};
use super::{Dictionary, Object};
use crate::error::PDFResult;

/// PDF stream object
///
/// Holds the stream dictionary and the raw (still filtered) payload. Decoded
/// content is computed on first access and cached until the payload or the
/// dictionary is mutated.
#[derive(Debug, Clone)]
pub struct Stream {
    dict: Dictionary,
    /// Raw stream data
    raw: Vec<u8>,
    /// Decoded stream data
    decoded: OnceCell<Vec<u8>>,
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.raw == other.raw
    }
}

impl Stream {
    /// Create stream from a dictionary and an already-filtered payload
    pub fn new(mut dict: Dictionary, raw: Vec<u8>) -> Self {
        dict.set("Length", raw.len());
        Self {
            dict,
            raw,
            decoded: OnceCell::new(),
        }
    }

    /// Create an unfiltered stream holding `content`
    pub fn from_content(dict: Dictionary, content: Vec<u8>) -> Self {
        let mut dict = dict;
        dict.remove("Filter");
        dict.remove("DecodeParms");
        Self::new(dict, content)
    }

    /// Stream dictionary
    pub fn dict(&self) -> &Dictionary {
        &self.dict
    }

    /// Raw payload as stored in the file
    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    /// Replace the raw payload; the filter chain is left unchanged
    pub fn set_raw_data(&mut self, raw: Vec<u8>) {
        self.dict.set("Length", raw.len());
        self.raw = raw;
        self.decoded = OnceCell::new();
    }

    /// Mutable dictionary access; drops the decoded cache
    pub fn dict_mut(&mut self) -> &mut Dictionary {
        self.decoded = OnceCell::new();
        &mut self.dict
    }

    /// Filters listed in the dictionary
    pub fn filters(&self) -> PDFResult<Vec<Filter>> {
        Ok(filter::filter_chain(&self.dict)?.0)
    }

    /// Whether the payload is already compressed or image-coded
    pub fn is_filtered(&self) -> bool {
        matches!(self.dict.get("Filter"), Some(Object::Name(_)) | Some(Object::Array(_)))
    }

    /// Decoded content, cached after the first call
    ///
    /// Fails with `UnsupportedFilter` for image codecs; the raw payload stays
    /// available through [`Stream::raw_data`].
    pub fn decoded_data(&self) -> PDFResult<&[u8]> {
        if let Some(data) = self.decoded.get() {
            return Ok(data);
        }

        let (filters, params) = filter::filter_chain(&self.dict)?;
        trace!("Decoding stream with {} filters", filters.len());
        let data = filter::decode(&self.raw, &filters, &params)?;
        Ok(self.decoded.get_or_init(move || data))
    }

    /// Replace the content, re-encoding it through the current filter chain
    pub fn set_decoded_data(&mut self, data: Vec<u8>) -> PDFResult<()> {
        let (filters, params) = filter::filter_chain(&self.dict)?;
        let raw = filter::encode(&data, &filters, &params)?;
        self.set_raw_data(raw);
        self.decoded = OnceCell::from(data);
        Ok(())
    }

    /// Flate-compress an unfiltered payload
    ///
    /// Returns `false` when the stream already carries a filter or when
    /// compression would not make the payload smaller.
    pub fn compress(&mut self) -> PDFResult<bool> {
        if self.is_filtered() || self.raw.is_empty() {
            return Ok(false);
        }

        let compressed = Filter::FlateDecode.encode(&self.raw, None)?;
        if compressed.len() >= self.raw.len() {
            trace!("Stream left uncompressed ({} >= {} bytes)", compressed.len(), self.raw.len());
            return Ok(false);
        }

        debug!("Compressed stream {} -> {} bytes", self.raw.len(), compressed.len());
        let content = std::mem::take(&mut self.raw);
        self.dict.set("Filter", Object::name("FlateDecode"));
        self.dict.remove("DecodeParms");
        self.set_raw_data(compressed);
        self.decoded = OnceCell::from(content);
        Ok(true)
    }

    /// Decode the payload in place and drop the filter chain
    pub fn decompress(&mut self) -> PDFResult<()> {
        if !self.is_filtered() {
            return Ok(());
        }
        let content = self.decoded_data()?.to_vec();
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
        self.set_raw_data(content.clone());
        self.decoded = OnceCell::from(content);
        Ok(())
    }

    /// Write dictionary and payload; `/Length` must already match
    pub fn write_to(&self, output: &mut Vec<u8>) {
        self.dict.write_to(output);
        output.extend_from_slice(b"\nstream\n");
        output.extend_from_slice(&self.raw);
        output.extend_from_slice(b"\nendstream");
    }
}
