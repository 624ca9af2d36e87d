// src/tagger.rs
//
// Slot-filling readout: one label per input token from per-position logits.

use crate::vocab::Vocabulary;
use ndarray::ArrayView2;
use ndarray_stats::QuantileExt;

/// Label emitted for a predicted id that has no label text.
pub const DEFAULT_UNKNOWN_LABEL: &str = "o";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggerError {
    /// Every logit at this position was NaN.
    UndefinedPosition(usize),
    /// Logits rows do not match the number of input tokens.
    ShapeMismatch { tokens: usize, rows: usize },
}

impl std::fmt::Display for TaggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaggerError::UndefinedPosition(p) => write!(f, "No maximum logit at position {}", p),
            TaggerError::ShapeMismatch { tokens, rows } => {
                write!(f, "Got {} logit rows for {} tokens", rows, tokens)
            }
        }
    }
}

impl std::error::Error for TaggerError {}

/// Splits a sentence on single spaces, optionally lowercasing first.
pub fn sentence_tokens(sentence: &str, lowercase: bool) -> Vec<String> {
    let sentence = if lowercase { sentence.to_lowercase() } else { sentence.to_string() };
    sentence
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Greedy label ids for a `[seq_len, n_labels]` logits matrix.
pub fn predict_label_ids(logits: ArrayView2<f32>) -> Result<Vec<u32>, TaggerError> {
    logits
        .rows()
        .into_iter()
        .enumerate()
        .map(|(pos, row)| {
            row.argmax_skipnan()
                .map(|idx| idx as u32)
                .map_err(|_| TaggerError::UndefinedPosition(pos))
        })
        .collect()
}

/// Label text per position; ids outside the label vocabulary read as `unknown_label`.
pub fn tag(
    logits: ArrayView2<f32>,
    labels: &Vocabulary,
    unknown_label: &str,
) -> Result<Vec<String>, TaggerError> {
    let ids = predict_label_ids(logits)?;
    Ok(labels.decode_ids(&ids, unknown_label))
}

/// Pairs each input token with its predicted label.
pub fn tag_tokens<T: AsRef<str>>(
    tokens: &[T],
    logits: ArrayView2<f32>,
    labels: &Vocabulary,
    unknown_label: &str,
) -> Result<Vec<(String, String)>, TaggerError> {
    if logits.nrows() != tokens.len() {
        return Err(TaggerError::ShapeMismatch { tokens: tokens.len(), rows: logits.nrows() });
    }
    let tagged = tag(logits, labels, unknown_label)?;
    Ok(tokens
        .iter()
        .map(|t| t.as_ref().to_string())
        .zip(tagged)
        .collect())
}
