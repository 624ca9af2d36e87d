// Text preprocessing and greedy decoding for sequence models: vocabularies,
// fixed-length id sequences, corpus preparation and the step-by-step decode loop.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod decoder;
pub mod dialogs;
pub mod sequence;
pub mod tagger;
pub mod vocab;

pub use config::{OverlengthPolicy, PipelineConfig};
pub use decoder::{detokenize, DecodeError, FnModel, GreedyDecoder, Seq2SeqModel};
pub use sequence::{encode_fixed, pad_or_truncate, EncodedSequence, SequenceError};
pub use vocab::{default_reserved, BuildOptions, OovPolicy, TokenOrdering, Vocabulary, BOS, EOS, PAD, UNK};
