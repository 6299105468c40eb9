//! PNG/TIFF predictor undoing, applied after Flate/LZW decompression per
//! the `DecodeParms` dictionary's `Predictor`/`Colors`/`BitsPerComponent`/
//! `Columns` entries (PDF 1.7 §7.4.4.4).

use crate::object::Dictionary;
use crate::Result;

pub fn apply(parms: Option<&Dictionary>, data: Vec<u8>) -> Result<Vec<u8>> {
    let Some(parms) = parms else { return Ok(data) };

    let predictor = parms.get(b"Predictor").and_then(|o| o.as_i64()).unwrap_or(1);
    if predictor <= 1 {
        return Ok(data);
    }

    let colors = parms.get(b"Colors").and_then(|o| o.as_i64()).unwrap_or(1).max(1) as usize;
    let bpc = parms
        .get(b"BitsPerComponent")
        .and_then(|o| o.as_i64())
        .unwrap_or(8)
        .max(1) as usize;
    let columns = parms.get(b"Columns").and_then(|o| o.as_i64()).unwrap_or(1).max(1) as usize;

    let bytes_per_pixel = (colors * bpc).div_ceil(8).max(1);
    let row_bytes = (colors * bpc * columns).div_ceil(8);

    if predictor == 2 {
        Ok(undo_tiff(data, row_bytes, bytes_per_pixel))
    } else {
        Ok(undo_png(&data, row_bytes, bytes_per_pixel))
    }
}

fn undo_tiff(mut data: Vec<u8>, row_bytes: usize, bpp: usize) -> Vec<u8> {
    if row_bytes == 0 {
        return data;
    }
    for row in data.chunks_mut(row_bytes) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    data
}

fn undo_png(data: &[u8], row_bytes: usize, bpp: usize) -> Vec<u8> {
    let stride = row_bytes + 1;
    if stride <= 1 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len() / stride * row_bytes);
    let mut previous = vec![0u8; row_bytes];

    for chunk in data.chunks(stride) {
        if chunk.len() < 2 {
            break;
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_bytes, 0);

        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            row[i] = row[i].wrapping_add(match filter_type {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => 0,
            });
        }

        out.extend_from_slice(&row);
        previous = row;
    }

    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiff_predictor_accumulates_within_a_row() {
        let data = vec![1, 1, 1, 1];
        let result = undo_tiff(data, 4, 1);
        assert_eq!(result, vec![1, 2, 3, 4]);
    }

    #[test]
    fn png_sub_filter_matches_tiff_for_single_component() {
        let data = vec![1, 1, 1, 1, 1];
        let result = undo_png(&data, 4, 1);
        assert_eq!(result, vec![1, 2, 3, 4]);
    }
}
