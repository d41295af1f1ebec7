//! PNG predictor reversal (`/DecodeParms << /Predictor >= 10 >>`).
//!
//! Cross-reference streams are almost always written with predictor 12.

use crate::error::{PdfError, Result};

/// Undo PNG row filters. Each row is one filter-type byte plus
/// `columns * colors * bits / 8` data bytes.
pub fn png_unpredict(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    let row_bytes = colors
        .checked_mul(columns)
        .and_then(|n| n.checked_mul(bits_per_component))
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(|| PdfError::DecodeError("PNG predictor row size overflows".into()))?;
    if row_bytes == 0 {
        return Err(PdfError::DecodeError("PNG predictor with empty rows".into()));
    }
    if row_bytes >= data.len() {
        return Err(PdfError::DecodeError(format!(
            "PNG predictor rows of {row_bytes} bytes exceed {} bytes of data",
            data.len()
        )));
    }
    let bpp = std::cmp::max(1, colors * bits_per_component / 8);
    let row_size = row_bytes + 1;

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_size) {
        let (filter_type, row_data) = (row[0], &row[1..]);
        for i in 0..row_bytes {
            let left = if i >= bpp { current_row[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let predicted = match filter_type {
                0 => 0,
                1 => left,
                2 => above,
                3 => ((left as u16 + above as u16) / 2) as u8,
                4 => paeth(left, above, upper_left),
                other => {
                    return Err(PdfError::DecodeError(format!(
                        "unknown PNG filter type {other}"
                    )));
                }
            };
            current_row[i] = row_data[i].wrapping_add(predicted);
        }
        result.extend_from_slice(&current_row);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    Ok(result)
}

const fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}
