//! Label codec for the 37-symbol recognition alphabet.
//!
//! Characters map to dense integer codes: digits to `0..=9`, letters
//! (case-insensitive) to `10..=35`, with code 36 reserved for the blank
//! symbol used by the alignment loss and the decoder. Batches of labels are
//! encoded into a sparse coordinate representation plus per-label lengths;
//! decoding always emits the lowercase-normalized form.

use crate::core::{RecError, RecResult};

/// Total number of symbols, including the blank.
pub const ALPHABET_SIZE: usize = 37;

/// Code of the reserved blank symbol.
pub const BLANK_CODE: u32 = 36;

/// Printable form of every code; index 36 renders the blank as `-`.
pub const ALPHABET_SHORT: &str = "0123456789abcdefghijklmnopqrstuvwxyz-";

const N_DIGITS: u32 = 10;

/// Maps a character to its dense code.
///
/// Digits map to `0..=9` and letters of either case map to `10..=35`.
///
/// # Errors
///
/// Returns [`RecError::InvalidSymbol`] for any character outside the
/// supported alphabet.
pub fn char_to_code(symbol: char) -> RecResult<u32> {
    match symbol {
        '0'..='9' => Ok(symbol as u32 - '0' as u32),
        'A'..='Z' => Ok(symbol as u32 - 'A' as u32 + N_DIGITS),
        'a'..='z' => Ok(symbol as u32 - 'a' as u32 + N_DIGITS),
        _ => Err(RecError::InvalidSymbol { symbol }),
    }
}

/// Maps a code back to its lowercase printable character.
///
/// # Errors
///
/// Returns an error if the code lies outside the 37-symbol alphabet.
pub fn code_to_char(code: u32) -> RecResult<char> {
    ALPHABET_SHORT.chars().nth(code as usize).ok_or_else(|| {
        RecError::invalid_input(format!(
            "code {code} outside the {ALPHABET_SIZE}-symbol alphabet"
        ))
    })
}

/// Decodes a sequence of codes into a lowercase string.
pub fn decode_codes(codes: &[u32]) -> RecResult<String> {
    codes.iter().map(|&code| code_to_char(code)).collect()
}

/// Sparse representation of a batch of encoded labels.
///
/// Each coordinate is a `[sample_index, position]` pair with one code value
/// per coordinate. For every sample the positions present form the contiguous
/// range `0..length`, so the representation is loss-free for variable-length
/// labels, including empty ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseLabels {
    /// `[sample_index, position_in_word]` coordinates in encoding order.
    pub indices: Vec<[usize; 2]>,
    /// The symbol code at each coordinate.
    pub values: Vec<u32>,
    /// `[batch_size, longest_label_in_batch]`.
    pub dense_shape: [usize; 2],
}

impl SparseLabels {
    /// Number of samples the batch encodes.
    pub fn len(&self) -> usize {
        self.dense_shape[0]
    }

    /// Whether the batch encodes no samples at all.
    pub fn is_empty(&self) -> bool {
        self.dense_shape[0] == 0
    }

    /// Per-sample code sequences, in batch order.
    pub fn sequences(&self) -> Vec<Vec<u32>> {
        let mut out = vec![Vec::new(); self.dense_shape[0]];
        for (coord, &value) in self.indices.iter().zip(&self.values) {
            out[coord[0]].push(value);
        }
        out
    }

    /// Row-major dense matrix of codes, padded with zeros.
    ///
    /// The padded width is clamped to at least one column so downstream
    /// tensor construction never sees a zero-sized axis; padding positions
    /// are ignored by consumers because they carry the per-sample lengths.
    pub fn padded(&self) -> (Vec<i64>, [usize; 2]) {
        let rows = self.dense_shape[0];
        let cols = self.dense_shape[1].max(1);
        let mut data = vec![0i64; rows * cols];
        for (coord, &value) in self.indices.iter().zip(&self.values) {
            data[coord[0] * cols + coord[1]] = value as i64;
        }
        (data, [rows, cols])
    }
}

/// Encodes a batch of label strings into sparse coordinates plus lengths.
///
/// Labels of different lengths may share a batch; a zero-length label simply
/// contributes no coordinates. The returned lengths are in batch order.
///
/// # Errors
///
/// Returns [`RecError::InvalidSymbol`] as soon as any label contains a
/// character outside the alphabet; nothing is silently skipped.
pub fn encode_batch<S: AsRef<str>>(labels: &[S]) -> RecResult<(SparseLabels, Vec<usize>)> {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    let mut lengths = Vec::with_capacity(labels.len());
    let mut max_length = 0;

    for (sample, label) in labels.iter().enumerate() {
        let mut length = 0;
        for (position, symbol) in label.as_ref().chars().enumerate() {
            indices.push([sample, position]);
            values.push(char_to_code(symbol)?);
            length += 1;
        }
        max_length = max_length.max(length);
        lengths.push(length);
    }

    Ok((
        SparseLabels {
            indices,
            values,
            dense_shape: [labels.len(), max_length],
        },
        lengths,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_injective_over_the_alphabet() {
        let domain: Vec<char> = ('0'..='9').chain('a'..='z').collect();
        let codes: HashSet<u32> = domain
            .iter()
            .map(|&c| char_to_code(c).unwrap())
            .collect();
        assert_eq!(codes.len(), 36);
        assert!(codes.iter().all(|&code| code < BLANK_CODE));
    }

    #[test]
    fn upper_and_lower_case_share_codes() {
        for (upper, lower) in ('A'..='Z').zip('a'..='z') {
            assert_eq!(char_to_code(upper).unwrap(), char_to_code(lower).unwrap());
        }
    }

    #[test]
    fn roundtrip_lowercases() {
        for c in ('0'..='9').chain('a'..='z') {
            assert_eq!(code_to_char(char_to_code(c).unwrap()).unwrap(), c);
        }
        assert_eq!(code_to_char(char_to_code('Q').unwrap()).unwrap(), 'q');
        assert_eq!(code_to_char(BLANK_CODE).unwrap(), '-');
        assert!(code_to_char(37).is_err());
    }

    #[test]
    fn rejects_symbols_outside_the_alphabet() {
        assert!(matches!(
            char_to_code('!'),
            Err(RecError::InvalidSymbol { symbol: '!' })
        ));
        assert!(encode_batch(&["ok", "no way"]).is_err());
    }

    #[test]
    fn encodes_cat3() {
        let (sparse, lengths) = encode_batch(&["Cat3"]).unwrap();
        assert_eq!(sparse.indices, vec![[0, 0], [0, 1], [0, 2], [0, 3]]);
        assert_eq!(
            sparse.values,
            vec![
                char_to_code('C').unwrap(),
                char_to_code('a').unwrap(),
                char_to_code('t').unwrap(),
                char_to_code('3').unwrap(),
            ]
        );
        assert_eq!(sparse.dense_shape, [1, 4]);
        assert_eq!(lengths, vec![4]);
    }

    #[test]
    fn encodes_mixed_and_empty_labels() {
        let (sparse, lengths) = encode_batch(&["ab", "", "xyz"]).unwrap();
        assert_eq!(lengths, vec![2, 0, 3]);
        assert_eq!(sparse.dense_shape, [3, 3]);
        assert!(sparse.indices.iter().all(|coord| coord[0] != 1));

        let positions: Vec<Vec<usize>> = (0..3)
            .map(|sample| {
                sparse
                    .indices
                    .iter()
                    .filter(|coord| coord[0] == sample)
                    .map(|coord| coord[1])
                    .collect()
            })
            .collect();
        assert_eq!(positions[0], vec![0, 1]);
        assert!(positions[1].is_empty());
        assert_eq!(positions[2], vec![0, 1, 2]);
    }

    #[test]
    fn sequences_and_padded_agree() {
        let (sparse, lengths) = encode_batch(&["hi", "there"]).unwrap();
        let sequences = sparse.sequences();
        assert_eq!(sequences[0].len(), lengths[0]);
        assert_eq!(sequences[1].len(), lengths[1]);

        let (padded, shape) = sparse.padded();
        assert_eq!(shape, [2, 5]);
        assert_eq!(padded.len(), 10);
        assert_eq!(padded[0], sequences[0][0] as i64);
        // Positions past the label length stay zero-padded.
        assert_eq!(padded[2], 0);

        let encoded: String = decode_codes(&sequences[1]).unwrap();
        assert_eq!(encoded, "there");
    }

    #[test]
    fn padded_never_has_zero_columns() {
        let (sparse, _) = encode_batch(&["", ""]).unwrap();
        let (padded, shape) = sparse.padded();
        assert_eq!(shape, [2, 1]);
        assert_eq!(padded, vec![0, 0]);
    }
}
