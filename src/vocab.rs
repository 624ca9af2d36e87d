// src/vocab.rs

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

pub const PAD: &str = "<pad>";
pub const BOS: &str = "<bos>";
pub const EOS: &str = "<eos>";
pub const UNK: &str = "<unk>";

/// Reserved tokens in their fixed low slots: `<pad>`=0, `<bos>`=1, `<eos>`=2, `<unk>`=3.
pub fn default_reserved() -> Vec<String> {
    [PAD, BOS, EOS, UNK].iter().map(|s| s.to_string()).collect()
}

// 1. Define Data Structures

/// Order in which non-reserved tokens receive their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenOrdering {
    /// Insertion order while scanning the corpus.
    #[default]
    FirstSeen,
    /// Descending count; ties keep first-seen order.
    Frequency,
}

/// What `encode` emits for a token that was not seen at build time.
///
/// The slot-filling scripts used a hard-coded id (126) that happened to be
/// unused by the label space, while the seq2seq and sentiment scripts used a
/// reserved unknown slot. Both remain selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OovPolicy {
    #[default]
    Reserved,
    Sentinel(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub ordering: TokenOrdering,
    /// Tokens counted fewer times than this are left out.
    pub min_freq: usize,
    /// Cap on the number of non-reserved tokens.
    pub max_size: Option<usize>,
    pub oov: OovPolicy,
    /// Which reserved token is the unknown slot under `OovPolicy::Reserved`.
    pub unknown_token: String,
    /// Spellings of the structural tokens looked up by `pad_id`, `bos_id` and `eos_id`.
    pub pad_token: String,
    pub bos_token: String,
    pub eos_token: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            ordering: TokenOrdering::FirstSeen,
            min_freq: 1,
            max_size: None,
            oov: OovPolicy::Reserved,
            unknown_token: UNK.to_string(),
            pad_token: PAD.to_string(),
            bos_token: BOS.to_string(),
            eos_token: EOS.to_string(),
        }
    }
}

impl BuildOptions {
    /// Options whose structural tokens are the given spellings, in
    /// `[pad, bos, eos, unk]` order, e.g. `["PAD", "BOS", "EOS", "UNK"]`.
    pub fn with_special_tokens(pad: &str, bos: &str, eos: &str, unk: &str) -> Self {
        Self {
            pad_token: pad.to_string(),
            bos_token: bos.to_string(),
            eos_token: eos.to_string(),
            unknown_token: unk.to_string(),
            ..Self::default()
        }
    }
}

/// Structural token spellings carried by a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct StructuralTokens {
    pad: String,
    bos: String,
    eos: String,
}

impl Default for StructuralTokens {
    fn default() -> Self {
        Self { pad: PAD.to_string(), bos: BOS.to_string(), eos: EOS.to_string() }
    }
}

// 2. Error Handling
#[derive(Debug)]
pub enum VocabError {
    /// `OovPolicy::Reserved` needs the unknown token among the reserved tokens.
    MissingReserved(String),
    DuplicateToken(String),
    InvalidFile(String),
    IoError(io::Error),
    JsonError(serde_json::Error),
}

impl std::fmt::Display for VocabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VocabError::MissingReserved(t) => {
                write!(f, "Unknown token '{}' is not among the reserved tokens", t)
            }
            VocabError::DuplicateToken(t) => write!(f, "Token '{}' appears more than once", t),
            VocabError::InvalidFile(s) => write!(f, "Invalid vocabulary file: {}", s),
            VocabError::IoError(e) => write!(f, "IO error: {}", e),
            VocabError::JsonError(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for VocabError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VocabError::IoError(e) => Some(e),
            VocabError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VocabError {
    fn from(err: io::Error) -> VocabError {
        VocabError::IoError(err)
    }
}

impl From<serde_json::Error> for VocabError {
    fn from(err: serde_json::Error) -> VocabError {
        VocabError::JsonError(err)
    }
}

/// Immutable bidirectional token <-> id mapping with dense ids `0..len()`.
///
/// Reserved tokens always occupy ids `0..reserved().len()` in the order they
/// were given. There is no way to add tokens after construction; share it by
/// reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VocabFile", into = "VocabFile")]
pub struct Vocabulary {
    idx_to_token: Vec<String>,
    token_to_idx: HashMap<String, u32>,
    reserved_len: usize,
    unknown_token: Option<String>,
    structural: StructuralTokens,
    oov: OovPolicy,
    fallback_id: u32,
}

/// On-disk form: `{ "idx_to_token": [...], "reserved": [...], "unknown_token": ... }`.
/// The reserved list must be a prefix of `idx_to_token`; the reverse map is rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VocabFile {
    idx_to_token: Vec<String>,
    reserved: Vec<String>,
    #[serde(default)]
    unknown_token: Option<String>,
    #[serde(default)]
    special_tokens: StructuralTokens,
    #[serde(default)]
    oov: OovPolicy,
}

impl TryFrom<VocabFile> for Vocabulary {
    type Error = VocabError;

    fn try_from(file: VocabFile) -> Result<Self, Self::Error> {
        if !file.idx_to_token.starts_with(&file.reserved) {
            return Err(VocabError::InvalidFile(format!(
                "reserved tokens {:?} are not the first entries of idx_to_token",
                file.reserved
            )));
        }
        Vocabulary::from_parts(
            file.idx_to_token,
            file.reserved.len(),
            file.unknown_token,
            file.special_tokens,
            file.oov,
        )
    }
}

impl From<Vocabulary> for VocabFile {
    fn from(vocab: Vocabulary) -> Self {
        let reserved = vocab.idx_to_token[..vocab.reserved_len].to_vec();
        VocabFile {
            idx_to_token: vocab.idx_to_token,
            reserved,
            unknown_token: vocab.unknown_token,
            special_tokens: vocab.structural,
            oov: vocab.oov,
        }
    }
}

impl Vocabulary {
    /// Scans `corpus`, assigns `reserved` tokens ids `0..` in the order given,
    /// then assigns the remaining distinct tokens according to `options.ordering`.
    ///
    /// An empty corpus yields a vocabulary holding only the reserved tokens.
    /// Corpus occurrences of a reserved token do not produce a second entry.
    ///
    /// The structural roles are found by the spellings in `options`
    /// (`<pad>`, `<bos>`, `<eos>`, `<unk>` by default). Reserved lists spelled
    /// differently need matching options, see `BuildOptions::with_special_tokens`.
    pub fn build<I, S, R>(corpus: I, reserved: &[R], options: &BuildOptions) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator,
        S::Item: AsRef<str>,
        R: AsRef<str>,
    {
        let mut idx_to_token: Vec<String> = Vec::with_capacity(reserved.len());
        for token in reserved {
            let token = token.as_ref();
            if !idx_to_token.iter().any(|t| t == token) {
                idx_to_token.push(token.to_string());
            }
        }
        let reserved_len = idx_to_token.len();

        // Count frequencies, remembering the first-seen position of each token.
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut seen_order: Vec<String> = Vec::new();
        for sequence in corpus {
            for token in sequence {
                let token = token.as_ref();
                if idx_to_token[..reserved_len].iter().any(|t| t == token) {
                    continue;
                }
                match counts.get_mut(token) {
                    Some(count) => *count += 1,
                    None => {
                        counts.insert(token.to_string(), 1);
                        seen_order.push(token.to_string());
                    }
                }
            }
        }

        let mut candidates: Vec<(String, usize)> = seen_order
            .into_iter()
            .map(|t| {
                let count = counts.get(&t).copied().unwrap_or(0);
                (t, count)
            })
            .filter(|(_, count)| *count >= options.min_freq)
            .collect();
        if options.ordering == TokenOrdering::Frequency {
            // Stable sort keeps first-seen order among equal counts.
            candidates.sort_by(|a, b| b.1.cmp(&a.1));
        }
        if let Some(max_size) = options.max_size {
            candidates.truncate(max_size);
        }
        idx_to_token.extend(candidates.into_iter().map(|(t, _)| t));

        let unknown_token = match options.oov {
            OovPolicy::Reserved => Some(options.unknown_token.clone()),
            OovPolicy::Sentinel(_) => idx_to_token[..reserved_len]
                .iter()
                .find(|t| **t == options.unknown_token)
                .cloned(),
        };

        let structural = StructuralTokens {
            pad: options.pad_token.clone(),
            bos: options.bos_token.clone(),
            eos: options.eos_token.clone(),
        };
        let vocab = Self::from_parts(idx_to_token, reserved_len, unknown_token, structural, options.oov)?;
        debug!(
            "Built vocabulary: {} reserved, {} corpus tokens, ordering {:?}",
            vocab.reserved_len,
            vocab.len() - vocab.reserved_len,
            options.ordering
        );
        Ok(vocab)
    }

    fn from_parts(
        idx_to_token: Vec<String>,
        reserved_len: usize,
        unknown_token: Option<String>,
        structural: StructuralTokens,
        oov: OovPolicy,
    ) -> Result<Self, VocabError> {
        let mut token_to_idx = HashMap::with_capacity(idx_to_token.len());
        for (idx, token) in idx_to_token.iter().enumerate() {
            if token_to_idx.insert(token.clone(), idx as u32).is_some() {
                return Err(VocabError::DuplicateToken(token.clone()));
            }
        }

        let (fallback_id, unknown_token) = match oov {
            OovPolicy::Reserved => {
                let unk = unknown_token.unwrap_or_else(|| UNK.to_string());
                match token_to_idx.get(&unk) {
                    Some(&id) if (id as usize) < reserved_len => (id, Some(unk)),
                    _ => return Err(VocabError::MissingReserved(unk)),
                }
            }
            OovPolicy::Sentinel(id) => {
                if (id as usize) < idx_to_token.len() {
                    warn!(
                        "OOV sentinel {} collides with token '{}'; unknown tokens will decode as it",
                        id, idx_to_token[id as usize]
                    );
                }
                (id, unknown_token)
            }
        };

        Ok(Self {
            idx_to_token,
            token_to_idx,
            reserved_len,
            unknown_token,
            structural,
            oov,
            fallback_id,
        })
    }

    // 3. Lookups

    pub fn len(&self) -> usize {
        self.idx_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx_to_token.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_idx.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.idx_to_token.get(id as usize).map(|s| s.as_str())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_idx.contains_key(token)
    }

    pub fn reserved(&self) -> &[String] {
        &self.idx_to_token[..self.reserved_len]
    }

    pub fn is_reserved(&self, id: u32) -> bool {
        (id as usize) < self.reserved_len
    }

    /// All tokens in id order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.idx_to_token.iter().map(|s| s.as_str())
    }

    pub fn oov_policy(&self) -> OovPolicy {
        self.oov
    }

    /// Id emitted by `encode` for tokens absent from the vocabulary.
    pub fn fallback_id(&self) -> u32 {
        self.fallback_id
    }

    pub fn pad_token(&self) -> &str {
        &self.structural.pad
    }

    pub fn bos_token(&self) -> &str {
        &self.structural.bos
    }

    pub fn eos_token(&self) -> &str {
        &self.structural.eos
    }

    pub fn pad_id(&self) -> Option<u32> {
        self.id(&self.structural.pad)
    }

    pub fn bos_id(&self) -> Option<u32> {
        self.id(&self.structural.bos)
    }

    pub fn eos_id(&self) -> Option<u32> {
        self.id(&self.structural.eos)
    }

    pub fn unk_id(&self) -> Option<u32> {
        self.unknown_token.as_deref().and_then(|t| self.id(t))
    }

    // 4. Encoding and Decoding

    /// Maps each token to its id; misses resolve to `fallback_id()`.
    /// Output length always equals input length.
    pub fn encode<T: AsRef<str>>(&self, tokens: &[T]) -> Vec<u32> {
        tokens
            .iter()
            .map(|t| self.id(t.as_ref()).unwrap_or(self.fallback_id))
            .collect()
    }

    /// Reverse lookup. Ids with no token emit `unknown_label` instead of failing.
    pub fn decode_ids(&self, ids: &[u32], unknown_label: &str) -> Vec<String> {
        ids.iter()
            .map(|&id| self.token(id).unwrap_or(unknown_label).to_string())
            .collect()
    }

    // 5. Persistence

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VocabError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VocabError> {
        let reader = BufReader::new(File::open(path)?);
        let vocab = serde_json::from_reader(reader)?;
        Ok(vocab)
    }
}
