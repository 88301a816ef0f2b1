//! Upload decompression.
//!
//! The filename suffix decides the codec; the body is never sniffed.

use crate::core::error::DecompressError;
use crate::core::types::{Compression, DecompressedContent, UploadedFile};
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::io::Read;

/// Decompress an upload according to its filename.
///
/// Uncompressed bodies are passed through without copying. Inflated content
/// larger than `limit` bytes is an error; reading stops one byte past it.
pub fn decompress(file: &UploadedFile, limit: usize) -> Result<DecompressedContent, DecompressError> {
    match file.compression() {
        Compression::None => Ok(DecompressedContent::new(file.body.clone())),
        Compression::Gzip => {
            let decoder = MultiGzDecoder::new(&file.body[..]);
            inflate(decoder, limit, "gzip", DecompressError::Gzip)
        }
        Compression::Bzip2 => {
            let decoder = MultiBzDecoder::new(&file.body[..]);
            inflate(decoder, limit, "bz2", DecompressError::Bzip2)
        }
    }
}

fn inflate(
    decoder: impl Read,
    limit: usize,
    format: &'static str,
    corrupt: fn(String) -> DecompressError,
) -> Result<DecompressedContent, DecompressError> {
    let mut out = Vec::new();
    decoder
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| corrupt(e.to_string()))?;
    if out.len() > limit {
        log::warn!("Rejecting {} upload that inflates past {} bytes", format, limit);
        return Err(DecompressError::TooLarge { format, limit });
    }
    Ok(DecompressedContent::new(out))
}
