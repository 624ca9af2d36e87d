// src/corpus.rs
//
// Delimited question/answer corpus: one `source@target` pair per line,
// whitespace-separated tokens on each side.

use crate::config::{OverlengthPolicy, PipelineConfig};
use crate::sequence::{encode_fixed_batch, SequenceError};
use crate::vocab::{default_reserved, VocabError, Vocabulary};
use log::{info, warn};
use ndarray::Array2;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

#[derive(Debug)]
pub enum CorpusError {
    IoError(io::Error),
    Vocab(VocabError),
    Sequence(SequenceError),
}

impl std::fmt::Display for CorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusError::IoError(e) => write!(f, "IO error: {}", e),
            CorpusError::Vocab(e) => write!(f, "Vocabulary error: {}", e),
            CorpusError::Sequence(e) => write!(f, "Sequence error: {}", e),
        }
    }
}

impl std::error::Error for CorpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorpusError::IoError(e) => Some(e),
            CorpusError::Vocab(e) => Some(e),
            CorpusError::Sequence(e) => Some(e),
        }
    }
}

impl From<io::Error> for CorpusError {
    fn from(err: io::Error) -> Self {
        CorpusError::IoError(err)
    }
}

impl From<VocabError> for CorpusError {
    fn from(err: VocabError) -> Self {
        CorpusError::Vocab(err)
    }
}

impl From<SequenceError> for CorpusError {
    fn from(err: SequenceError) -> Self {
        CorpusError::Sequence(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub source: Vec<String>,
    pub target: Vec<String>,
}

/// Whitespace tokenization, optionally lowercased.
pub fn tokenize(side: &str, lowercase: bool) -> Vec<String> {
    side.split_whitespace()
        .map(|t| if lowercase { t.to_lowercase() } else { t.to_string() })
        .collect()
}

/// Splits a line at the delimiter into source and target tokens.
/// Returns `None` unless the delimiter occurs exactly once.
pub fn parse_pair(line: &str, delimiter: char, lowercase: bool) -> Option<TokenPair> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut sides = line.split(delimiter);
    let source = sides.next()?;
    let target = sides.next()?;
    if sides.next().is_some() {
        return None;
    }
    Some(TokenPair {
        source: tokenize(source, lowercase),
        target: tokenize(target, lowercase),
    })
}

/// Reads every well-formed pair; blank lines are ignored and malformed ones
/// are skipped with a warning.
pub fn read_pairs<R: BufRead>(reader: R, config: &PipelineConfig) -> Result<Vec<TokenPair>, CorpusError> {
    let mut pairs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_pair(&line, config.delimiter, config.lowercase) {
            Some(pair) => pairs.push(pair),
            None => warn!(
                "Skipping line {}: expected exactly one '{}' delimiter",
                index + 1,
                config.delimiter
            ),
        }
    }
    Ok(pairs)
}

pub fn read_pairs_from_path<P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
) -> Result<Vec<TokenPair>, CorpusError> {
    let reader = BufReader::new(File::open(path)?);
    read_pairs(reader, config)
}

/// Applies the overlength policy. Under `Drop` a pair survives only if both
/// sides have fewer than `max_seq_len` tokens, leaving room for the end marker.
pub fn filter_overlength(pairs: Vec<TokenPair>, config: &PipelineConfig) -> Vec<TokenPair> {
    let limit = config.max_seq_len;
    match config.overlength {
        OverlengthPolicy::Drop => {
            let total = pairs.len();
            let kept: Vec<TokenPair> = pairs
                .into_iter()
                .filter(|p| p.source.len() < limit && p.target.len() < limit)
                .collect();
            if kept.len() < total {
                warn!("Dropped {} of {} pairs longer than {} tokens", total - kept.len(), total, limit.saturating_sub(1));
            }
            kept
        }
        OverlengthPolicy::Truncate => {
            let keep = limit.saturating_sub(1);
            pairs
                .into_iter()
                .map(|mut p| {
                    if p.source.len() > keep || p.target.len() > keep {
                        warn!("Truncating pair to {} tokens per side", keep);
                    }
                    p.source.truncate(keep);
                    p.target.truncate(keep);
                    p
                })
                .collect()
        }
    }
}

/// Encoded training data for a source -> target model.
#[derive(Debug, Clone)]
pub struct PairDataset {
    pub input_vocab: Vocabulary,
    pub output_vocab: Vocabulary,
    /// `[n_pairs, max_seq_len]`, each row EOS-terminated and PAD-filled.
    pub inputs: Array2<u32>,
    pub outputs: Array2<u32>,
    pub pairs: Vec<TokenPair>,
}

/// JSON form of the encoded matrices written by the CLI.
#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub max_seq_len: usize,
    pub num_pairs: usize,
    pub input_vocab_size: usize,
    pub output_vocab_size: usize,
    pub inputs: Vec<Vec<u32>>,
    pub outputs: Vec<Vec<u32>>,
}

impl PairDataset {
    /// Filters `pairs`, builds separate vocabularies for each side from the
    /// kept pairs and encodes both sides to fixed length.
    pub fn prepare(pairs: Vec<TokenPair>, config: &PipelineConfig) -> Result<Self, CorpusError> {
        let pairs = filter_overlength(pairs, config);
        let reserved = default_reserved();
        let options = config.build_options();

        let input_vocab = Vocabulary::build(pairs.iter().map(|p| p.source.iter()), &reserved, &options)?;
        let output_vocab = Vocabulary::build(pairs.iter().map(|p| p.target.iter()), &reserved, &options)?;

        let sources: Vec<&[String]> = pairs.iter().map(|p| p.source.as_slice()).collect();
        let targets: Vec<&[String]> = pairs.iter().map(|p| p.target.as_slice()).collect();
        let inputs = encode_fixed_batch(&sources, &input_vocab, config.max_seq_len)?;
        let outputs = encode_fixed_batch(&targets, &output_vocab, config.max_seq_len)?;

        info!(
            "Prepared {} pairs (input vocab {}, output vocab {}, length {})",
            pairs.len(),
            input_vocab.len(),
            output_vocab.len(),
            config.max_seq_len
        );
        Ok(Self { input_vocab, output_vocab, inputs, outputs, pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            max_seq_len: self.inputs.ncols(),
            num_pairs: self.len(),
            input_vocab_size: self.input_vocab.len(),
            output_vocab_size: self.output_vocab.len(),
            inputs: self.inputs.rows().into_iter().map(|r| r.to_vec()).collect(),
            outputs: self.outputs.rows().into_iter().map(|r| r.to_vec()).collect(),
        }
    }
}
