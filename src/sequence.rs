// src/sequence.rs
//
// Fixed-length materialization of token sequences.

use crate::vocab::Vocabulary;
use ndarray::Array2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// A fixed length of zero cannot hold the end marker.
    ZeroLength,
    /// The vocabulary lacks a structural token (its end or padding marker).
    MissingReserved(String),
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::ZeroLength => write!(f, "Fixed sequence length must be greater than 0"),
            SequenceError::MissingReserved(t) => write!(f, "Vocabulary has no '{}' token", t),
            SequenceError::LengthMismatch { expected, actual } => write!(
                f,
                "Encoded sequence has length {} but {} was required",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for SequenceError {}

/// Appends `pad_value` up to `max_len`, or keeps only the first `max_len` ids.
///
/// This does not know about end markers: a sequence longer than `max_len`
/// loses its tail, terminator included. Use `encode_fixed` for terminated
/// sequences.
pub fn pad_or_truncate(sequence: &[u32], max_len: usize, pad_value: u32) -> Vec<u32> {
    let mut out: Vec<u32> = sequence.iter().take(max_len).copied().collect();
    out.resize(max_len, pad_value);
    out
}

/// An id sequence of exactly the configured length, ending in EOS then PADs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSequence {
    ids: Vec<u32>,
    /// Number of source tokens kept before the terminator.
    source_len: usize,
}

impl EncodedSequence {
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// True when source tokens were dropped to make room for the terminator.
    pub fn was_truncated(&self, original_len: usize) -> bool {
        original_len > self.source_len
    }

    pub fn into_ids(self) -> Vec<u32> {
        self.ids
    }
}

/// Encodes `tokens`, keeps at most `max_len - 1` of them, appends the
/// vocabulary's EOS and pads with its PAD up to exactly `max_len`.
///
/// The terminator is always present, even for over-long input.
pub fn encode_fixed<T: AsRef<str>>(
    tokens: &[T],
    vocab: &Vocabulary,
    max_len: usize,
) -> Result<EncodedSequence, SequenceError> {
    if max_len == 0 {
        return Err(SequenceError::ZeroLength);
    }
    let eos = vocab
        .eos_id()
        .ok_or_else(|| SequenceError::MissingReserved(vocab.eos_token().to_string()))?;
    let pad = vocab
        .pad_id()
        .ok_or_else(|| SequenceError::MissingReserved(vocab.pad_token().to_string()))?;

    let source_len = tokens.len().min(max_len - 1);
    let mut ids = vocab.encode(&tokens[..source_len]);
    ids.push(eos);
    let ids = pad_or_truncate(&ids, max_len, pad);

    debug_assert_eq!(ids.len(), max_len);
    if ids.len() != max_len {
        return Err(SequenceError::LengthMismatch { expected: max_len, actual: ids.len() });
    }
    Ok(EncodedSequence { ids, source_len })
}

/// Stacks terminated sequences into a `[n, max_len]` matrix.
pub fn encode_fixed_batch<S: AsRef<[String]>>(
    samples: &[S],
    vocab: &Vocabulary,
    max_len: usize,
) -> Result<Array2<u32>, SequenceError> {
    let mut matrix = Array2::from_elem((samples.len(), max_len), 0u32);
    for (row, sample) in samples.iter().enumerate() {
        let encoded = encode_fixed(sample.as_ref(), vocab, max_len)?;
        for (col, id) in encoded.ids().iter().enumerate() {
            matrix[[row, col]] = *id;
        }
    }
    Ok(matrix)
}

/// Classifier-style batch: encode, then pad or truncate to `max_len` with
/// `pad_value`. No end marker is appended.
pub fn encode_batch<S: AsRef<[String]>>(
    samples: &[S],
    vocab: &Vocabulary,
    max_len: usize,
    pad_value: u32,
) -> Array2<u32> {
    let mut matrix = Array2::from_elem((samples.len(), max_len), pad_value);
    for (row, sample) in samples.iter().enumerate() {
        let ids = pad_or_truncate(&vocab.encode(sample.as_ref()), max_len, pad_value);
        for (col, id) in ids.into_iter().enumerate() {
            matrix[[row, col]] = id;
        }
    }
    matrix
}

/// Cuts an id sequence at its first EOS and drops PAD ids.
pub fn strip_structural(ids: &[u32], vocab: &Vocabulary) -> Vec<u32> {
    let eos = vocab.eos_id();
    let pad = vocab.pad_id();
    ids.iter()
        .copied()
        .take_while(|id| Some(*id) != eos)
        .filter(|id| Some(*id) != pad)
        .collect()
}
