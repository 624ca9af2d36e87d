// src/cli.rs

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::error::Error;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, PipelineConfig};
use crate::corpus::{self, CorpusError, PairDataset};
use crate::decoder::detokenize;
use crate::dialogs::{self, DialogError};
use crate::sequence::{self, SequenceError};
use crate::vocab::{VocabError, Vocabulary};

// 1. Define CLI Arguments
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Pipeline config (JSON). Flags given on the command line take precedence.
    #[clap(long, value_parser, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a `question@answer` training set from the movie-dialogs corpus.
    PrepareDialogs {
        #[clap(long, value_parser)]
        lines: PathBuf,
        #[clap(long, value_parser)]
        conversations: PathBuf,
        #[clap(long, value_parser)]
        output: PathBuf,
    },
    /// Training side: build both vocabularies and the encoded dataset.
    Prepare {
        #[clap(long, value_parser)]
        corpus: PathBuf,
        #[clap(long, value_parser)]
        output_dir: PathBuf,
        #[clap(long, value_parser)]
        max_seq_len: Option<usize>,
    },
    /// Inference side: encode a sentence to a fixed-length id sequence.
    Encode {
        #[clap(long, value_parser)]
        vocab: PathBuf,
        #[clap(long, value_parser)]
        sentence: String,
        #[clap(long, value_parser)]
        max_seq_len: Option<usize>,
    },
    /// Map ids back to tokens.
    Decode {
        #[clap(long, value_parser)]
        vocab: PathBuf,
        #[clap(long, value_parser, value_delimiter = ',', required = true)]
        ids: Vec<u32>,
        /// Stop at the first end marker and drop padding.
        #[clap(long)]
        strip: bool,
    },
}

// Custom error wrapper to combine various error types
#[derive(Debug)]
pub enum RuntimeError {
    Config(ConfigError),
    Vocab(VocabError),
    Sequence(SequenceError),
    Corpus(CorpusError),
    Dialog(DialogError),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::Config(_) => write!(f, "Config error"),
            RuntimeError::Vocab(_) => write!(f, "Vocabulary error"),
            RuntimeError::Sequence(_) => write!(f, "Sequence error"),
            RuntimeError::Corpus(_) => write!(f, "Corpus error"),
            RuntimeError::Dialog(_) => write!(f, "Dialog corpus error"),
            RuntimeError::Io(e) => write!(f, "IO error: {}", e),
            RuntimeError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RuntimeError::Config(e) => Some(e),
            RuntimeError::Vocab(e) => Some(e),
            RuntimeError::Sequence(e) => Some(e),
            RuntimeError::Corpus(e) => Some(e),
            RuntimeError::Dialog(e) => Some(e),
            RuntimeError::Io(e) => Some(e),
            RuntimeError::Json(e) => Some(e),
        }
    }
}

// Implement From for each error type to simplify error handling with `?`
impl From<ConfigError> for RuntimeError {
    fn from(err: ConfigError) -> Self { RuntimeError::Config(err) }
}
impl From<VocabError> for RuntimeError {
    fn from(err: VocabError) -> Self { RuntimeError::Vocab(err) }
}
impl From<SequenceError> for RuntimeError {
    fn from(err: SequenceError) -> Self { RuntimeError::Sequence(err) }
}
impl From<CorpusError> for RuntimeError {
    fn from(err: CorpusError) -> Self { RuntimeError::Corpus(err) }
}
impl From<DialogError> for RuntimeError {
    fn from(err: DialogError) -> Self { RuntimeError::Dialog(err) }
}
impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self { RuntimeError::Io(err) }
}
impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self { RuntimeError::Json(err) }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    // RUST_LOG still wins when set; a second init (tests) is harmless.
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, RuntimeError> {
    match path {
        Some(p) => {
            info!("Loading config from: {}", p.display());
            Ok(PipelineConfig::load(p)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

// 2. Subcommands

fn prepare_dialogs(lines: &Path, conversations: &Path, output: &Path, config: &PipelineConfig) -> Result<(), RuntimeError> {
    info!("Reading movie lines from: {}", lines.display());
    let id2line = dialogs::parse_movie_lines(BufReader::new(File::open(lines)?))?;
    info!("Reading conversations from: {}", conversations.display());
    let convs = dialogs::parse_conversations(BufReader::new(File::open(conversations)?))?;

    let pairs = dialogs::gather_pairs(&convs, &id2line)?;
    let written = dialogs::write_training_set(&pairs, BufWriter::new(File::create(output)?), config.delimiter)?;
    println!("Wrote {} of {} pairs to {}", written, pairs.len(), output.display());
    Ok(())
}

fn prepare(corpus_path: &Path, output_dir: &Path, config: &PipelineConfig) -> Result<(), RuntimeError> {
    info!("Reading corpus from: {}", corpus_path.display());
    let pairs = corpus::read_pairs_from_path(corpus_path, config)?;
    let dataset = PairDataset::prepare(pairs, config)?;

    fs::create_dir_all(output_dir)?;
    dataset.input_vocab.save(output_dir.join("input_vocab.json"))?;
    dataset.output_vocab.save(output_dir.join("output_vocab.json"))?;
    let writer = BufWriter::new(File::create(output_dir.join("dataset.json"))?);
    serde_json::to_writer(writer, &dataset.summary())?;

    println!(
        "Prepared {} pairs: input vocabulary {} tokens, output vocabulary {} tokens",
        dataset.len(),
        dataset.input_vocab.len(),
        dataset.output_vocab.len()
    );
    println!("Output written to {}", output_dir.display());
    Ok(())
}

fn encode(vocab_path: &Path, sentence: &str, config: &PipelineConfig) -> Result<(), RuntimeError> {
    let vocab = Vocabulary::load(vocab_path)?;
    let tokens = corpus::tokenize(sentence, config.lowercase);
    let encoded = sequence::encode_fixed(&tokens, &vocab, config.max_seq_len)?;
    if encoded.was_truncated(tokens.len()) {
        log::warn!("Sentence truncated to {} tokens", encoded.source_len());
    }
    let ids: Vec<String> = encoded.ids().iter().map(|id| id.to_string()).collect();
    println!("{}", ids.join(","));
    Ok(())
}

fn decode(vocab_path: &Path, ids: &[u32], strip: bool, config: &PipelineConfig) -> Result<(), RuntimeError> {
    let vocab = Vocabulary::load(vocab_path)?;
    let ids = if strip { sequence::strip_structural(ids, &vocab) } else { ids.to_vec() };
    let tokens = vocab.decode_ids(&ids, &config.unknown_label);
    println!("{}", detokenize(&tokens));
    Ok(())
}

// 3. `run_cli` Function
pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Command::PrepareDialogs { lines, conversations, output } => {
            prepare_dialogs(&lines, &conversations, &output, &config)?
        }
        Command::Prepare { corpus, output_dir, max_seq_len } => {
            if let Some(n) = max_seq_len {
                config.max_seq_len = n;
            }
            config.validate().map_err(RuntimeError::from)?;
            prepare(&corpus, &output_dir, &config)?
        }
        Command::Encode { vocab, sentence, max_seq_len } => {
            if let Some(n) = max_seq_len {
                config.max_seq_len = n;
            }
            config.validate().map_err(RuntimeError::from)?;
            encode(&vocab, &sentence, &config)?
        }
        Command::Decode { vocab, ids, strip } => decode(&vocab, &ids, strip, &config)?,
    }
    Ok(())
}
