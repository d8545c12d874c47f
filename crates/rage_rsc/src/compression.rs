//! Raw DEFLATE streams, as used by resource bodies and compressed archive entries.

use std::io::{Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use tracing::instrument;

use crate::error::{Error, Result};

/// Compresses `data` into a raw DEFLATE stream with no zlib or gzip framing
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a raw DEFLATE stream
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    DeflateDecoder::new(data)
        .read_to_end(&mut output)
        .map_err(|e| Error::CorruptData(format!("invalid deflate stream: {}", e)))?;
    Ok(output)
}
