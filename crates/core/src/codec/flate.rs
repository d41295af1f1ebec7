//! FlateDecode support for cross-reference and object streams.

use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{PdfError, Result};

/// Inflate a zlib stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PdfError::DecodeError(format!("FlateDecode: {e}")))?;
    Ok(out)
}

/// Best-effort inflate that keeps whatever decoded before the first error.
///
/// Truncated or checksum-damaged streams are common in repaired files.
pub fn inflate_lenient(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) if consumed == 0 && produced == 0 => break,
            Ok(_) => i += consumed,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn inflates_zlib() {
        let packed = deflate(b"1 0 2 15 << /A 1 >> << /B 2 >>");
        assert_eq!(inflate(&packed).unwrap(), b"1 0 2 15 << /A 1 >> << /B 2 >>");
    }

    #[test]
    fn lenient_keeps_prefix_of_truncated_stream() {
        let mut seed = 0x1234_5678u32;
        let data: Vec<u8> = (0..10_000)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8
            })
            .collect();
        let packed = deflate(&data);
        let partial = inflate_lenient(&packed[..packed.len() / 2]);
        assert!(!partial.is_empty());
        assert!(data.starts_with(&partial));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(inflate(b"definitely not zlib").is_err());
    }
}
