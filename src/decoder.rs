// src/decoder.rs
//
// Greedy autoregressive decoding against an externally trained sequence model.

use crate::sequence::{encode_fixed, SequenceError};
use crate::vocab::Vocabulary;
use log::debug;
use ndarray::Array1;
use ndarray_stats::errors::EmptyInput;
use ndarray_stats::QuantileExt;
use std::marker::PhantomData;

/// The two capabilities a trained encoder/decoder exposes to the decoding loop.
///
/// Everything numerical (embeddings, recurrent cells, attention, the
/// encoder-to-decoder state projection) lives behind these calls.
pub trait Seq2SeqModel {
    /// Fixed encoder output the decoder attends over at every step.
    type Context;
    /// Recurrent decoder state carried between steps.
    type State;
    type Error: std::error::Error + 'static;

    /// Runs the encoder over a fixed-length source and returns its context
    /// together with the initial decoder state.
    fn encode(&self, source: &[u32]) -> Result<(Self::Context, Self::State), Self::Error>;

    /// One decoder step: next-token logits and the new state.
    fn step(
        &self,
        prev_id: u32,
        state: &Self::State,
        context: &Self::Context,
    ) -> Result<(Array1<f32>, Self::State), Self::Error>;
}

/// Adapts a pair of closures to `Seq2SeqModel`.
pub struct FnModel<C, S, E, F, G> {
    encode: F,
    step: G,
    _marker: PhantomData<fn() -> (C, S, E)>,
}

impl<C, S, E, F, G> FnModel<C, S, E, F, G>
where
    F: Fn(&[u32]) -> Result<(C, S), E>,
    G: Fn(u32, &S, &C) -> Result<(Array1<f32>, S), E>,
{
    pub fn new(encode: F, step: G) -> Self {
        Self { encode, step, _marker: PhantomData }
    }
}

impl<C, S, E, F, G> Seq2SeqModel for FnModel<C, S, E, F, G>
where
    E: std::error::Error + 'static,
    F: Fn(&[u32]) -> Result<(C, S), E>,
    G: Fn(u32, &S, &C) -> Result<(Array1<f32>, S), E>,
{
    type Context = C;
    type State = S;
    type Error = E;

    fn encode(&self, source: &[u32]) -> Result<(C, S), E> {
        (self.encode)(source)
    }

    fn step(&self, prev_id: u32, state: &S, context: &C) -> Result<(Array1<f32>, S), E> {
        (self.step)(prev_id, state, context)
    }
}

#[derive(Debug)]
pub enum DecodeError<E> {
    /// Error raised by the model, passed through untouched.
    Model(E),
    /// Logits with no maximum: empty, or all NaN (reported by `argmax_skipnan` as `EmptyInput`).
    InvalidLogits { step: usize, reason: String },
    Sequence(SequenceError),
}

impl<E: std::fmt::Display> std::fmt::Display for DecodeError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Model(e) => write!(f, "Model error: {}", e),
            DecodeError::InvalidLogits { step, reason } => {
                write!(f, "Invalid logits at step {}: {}", step, reason)
            }
            DecodeError::Sequence(e) => write!(f, "Sequence error: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for DecodeError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Model(e) => Some(e),
            DecodeError::Sequence(e) => Some(e),
            DecodeError::InvalidLogits { .. } => None,
        }
    }
}

impl<E> From<SequenceError> for DecodeError<E> {
    fn from(err: SequenceError) -> Self {
        DecodeError::Sequence(err)
    }
}

/// Per-call state: created at the start of a decode, advanced once per step.
#[derive(Debug)]
pub struct DecodingState<S> {
    pub prev_id: u32,
    pub hidden: S,
    pub output: Vec<u32>,
}

/// Greedy argmax over one step's logits. NaN entries are ignored; empty or
/// all-NaN logits yield `EmptyInput`.
pub fn greedy_pick(logits: &Array1<f32>) -> Result<u32, EmptyInput> {
    logits.argmax_skipnan().map(|idx| idx as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyDecoder {
    pub bos_id: u32,
    pub eos_id: u32,
    pub max_output_len: usize,
}

impl GreedyDecoder {
    pub fn new(bos_id: u32, eos_id: u32, max_output_len: usize) -> Self {
        Self { bos_id, eos_id, max_output_len }
    }

    /// Takes BOS and EOS ids from the output vocabulary.
    pub fn from_vocab(vocab: &Vocabulary, max_output_len: usize) -> Result<Self, SequenceError> {
        let bos_id = vocab
            .bos_id()
            .ok_or_else(|| SequenceError::MissingReserved(vocab.bos_token().to_string()))?;
        let eos_id = vocab
            .eos_id()
            .ok_or_else(|| SequenceError::MissingReserved(vocab.eos_token().to_string()))?;
        Ok(Self::new(bos_id, eos_id, max_output_len))
    }

    /// Decodes one encoded source sequence into output ids.
    ///
    /// Stops at the first predicted EOS (not included in the result) or after
    /// `max_output_len` steps, whichever comes first. Hitting the cap is not an
    /// error. Model failures are returned as `DecodeError::Model` without retry.
    pub fn decode_ids<M: Seq2SeqModel>(
        &self,
        model: &M,
        source: &[u32],
    ) -> Result<Vec<u32>, DecodeError<M::Error>> {
        let (context, initial) = model.encode(source).map_err(DecodeError::Model)?;
        let mut state = DecodingState {
            prev_id: self.bos_id,
            hidden: initial,
            output: Vec::new(),
        };

        for step in 0..self.max_output_len {
            let (logits, hidden) = model
                .step(state.prev_id, &state.hidden, &context)
                .map_err(DecodeError::Model)?;
            let next_id = greedy_pick(&logits).map_err(|e| DecodeError::InvalidLogits {
                step,
                reason: e.to_string(),
            })?;
            debug!("Step {}: prev {} -> next {}", step, state.prev_id, next_id);

            if next_id == self.eos_id {
                debug!("EOS at step {}, {} tokens emitted", step, state.output.len());
                return Ok(state.output);
            }
            state.output.push(next_id);
            state.prev_id = next_id;
            state.hidden = hidden;
        }

        debug!("Step cap {} reached without EOS", self.max_output_len);
        Ok(state.output)
    }

    /// Like `decode_ids`, mapping ids through `vocab`; unmapped ids become `unknown_label`.
    pub fn decode<M: Seq2SeqModel>(
        &self,
        model: &M,
        source: &[u32],
        vocab: &Vocabulary,
        unknown_label: &str,
    ) -> Result<Vec<String>, DecodeError<M::Error>> {
        let ids = self.decode_ids(model, source)?;
        Ok(vocab.decode_ids(&ids, unknown_label))
    }

    /// Raw tokens in, output tokens out: EOS-terminated fixed-length source
    /// encoding followed by greedy decoding.
    pub fn translate<M: Seq2SeqModel, T: AsRef<str>>(
        &self,
        model: &M,
        tokens: &[T],
        input_vocab: &Vocabulary,
        output_vocab: &Vocabulary,
        max_seq_len: usize,
        unknown_label: &str,
    ) -> Result<Vec<String>, DecodeError<M::Error>> {
        let source = encode_fixed(tokens, input_vocab, max_seq_len)?;
        self.decode(model, source.ids(), output_vocab, unknown_label)
    }

    /// `translate`, joined into a single space-separated string.
    pub fn translate_to_string<M: Seq2SeqModel, T: AsRef<str>>(
        &self,
        model: &M,
        tokens: &[T],
        input_vocab: &Vocabulary,
        output_vocab: &Vocabulary,
        max_seq_len: usize,
        unknown_label: &str,
    ) -> Result<String, DecodeError<M::Error>> {
        let output = self.translate(model, tokens, input_vocab, output_vocab, max_seq_len, unknown_label)?;
        Ok(detokenize(&output))
    }
}

/// Joins tokens with single spaces, the inverse of whitespace tokenization.
pub fn detokenize<T: AsRef<str>>(tokens: &[T]) -> String {
    let mut text = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(token.as_ref());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug)]
    struct ModelNotLoaded;

    impl std::fmt::Display for ModelNotLoaded {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "model not loaded")
        }
    }

    impl std::error::Error for ModelNotLoaded {}

    fn one_hot(id: u32, size: usize) -> Array1<f32> {
        let mut logits = Array1::zeros(size);
        logits[id as usize] = 1.0;
        logits
    }

    /// Emits `script[i]` at step i (the state is the step counter) and records
    /// the previous ids it was fed.
    struct ScriptedModel {
        script: Vec<u32>,
        vocab_size: usize,
        fed: RefCell<Vec<u32>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<u32>, vocab_size: usize) -> Self {
            Self { script, vocab_size, fed: RefCell::new(Vec::new()) }
        }
    }

    impl Seq2SeqModel for ScriptedModel {
        type Context = usize;
        type State = usize;
        type Error = ModelNotLoaded;

        fn encode(&self, source: &[u32]) -> Result<(usize, usize), ModelNotLoaded> {
            Ok((source.len(), 0))
        }

        fn step(&self, prev_id: u32, state: &usize, _context: &usize) -> Result<(Array1<f32>, usize), ModelNotLoaded> {
            self.fed.borrow_mut().push(prev_id);
            let id = self.script.get(*state).copied().unwrap_or(0);
            Ok((one_hot(id, self.vocab_size), state + 1))
        }
    }

    #[test]
    fn test_stops_at_eos_without_emitting_it() {
        let model = ScriptedModel::new(vec![5, 6, 2, 7], 10);
        let decoder = GreedyDecoder::new(1, 2, 20);
        assert_eq!(decoder.decode_ids(&model, &[4, 2, 0]).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_feeds_bos_then_previous_prediction() {
        let model = ScriptedModel::new(vec![5, 6, 2], 10);
        let decoder = GreedyDecoder::new(1, 2, 20);
        decoder.decode_ids(&model, &[4]).unwrap();
        assert_eq!(*model.fed.borrow(), vec![1, 5, 6]);
    }

    #[test]
    fn test_immediate_eos_yields_empty_output() {
        let model = ScriptedModel::new(vec![2], 10);
        let decoder = GreedyDecoder::new(1, 2, 20);
        assert!(decoder.decode_ids(&model, &[4]).unwrap().is_empty());
    }

    #[test]
    fn test_step_cap_truncates_output() {
        let model = ScriptedModel::new(vec![5; 100], 10);
        let decoder = GreedyDecoder::new(1, 2, 3);
        assert_eq!(decoder.decode_ids(&model, &[4]).unwrap(), vec![5, 5, 5]);
        assert_eq!(model.fed.borrow().len(), 3);
    }

    #[test]
    fn test_zero_step_cap_never_calls_step() {
        let model = ScriptedModel::new(vec![5], 10);
        let decoder = GreedyDecoder::new(1, 2, 0);
        assert!(decoder.decode_ids(&model, &[4]).unwrap().is_empty());
        assert!(model.fed.borrow().is_empty());
    }

    #[test]
    fn test_model_error_propagates() {
        let model = FnModel::new(
            |_src: &[u32]| Ok(((), ())),
            |_prev: u32, _s: &(), _c: &()| Err::<(Array1<f32>, ()), _>(ModelNotLoaded),
        );
        let decoder = GreedyDecoder::new(1, 2, 5);
        let err = decoder.decode_ids(&model, &[4]).unwrap_err();
        assert!(matches!(err, DecodeError::Model(ModelNotLoaded)));
        assert_eq!(err.to_string(), "Model error: model not loaded");
    }

    #[test]
    fn test_encoder_error_propagates() {
        let model = FnModel::new(
            |_src: &[u32]| Err::<((), ()), _>(ModelNotLoaded),
            |_prev: u32, _s: &(), _c: &()| Ok((one_hot(2, 3), ())),
        );
        let decoder = GreedyDecoder::new(1, 2, 5);
        assert!(matches!(decoder.decode_ids(&model, &[4]), Err(DecodeError::Model(_))));
    }

    #[test]
    fn test_empty_logits_are_rejected() {
        let model = FnModel::new(
            |_src: &[u32]| Ok::<_, ModelNotLoaded>(((), ())),
            |_prev: u32, _s: &(), _c: &()| Ok((Array1::zeros(0), ())),
        );
        let decoder = GreedyDecoder::new(1, 2, 5);
        let result = decoder.decode_ids(&model, &[4]);
        assert!(matches!(result, Err(DecodeError::InvalidLogits { step: 0, .. })));
    }

    #[test]
    fn test_greedy_pick_skips_nan() {
        let logits = Array1::from(vec![0.5, f32::NAN, 0.9, 0.1]);
        assert_eq!(greedy_pick(&logits).unwrap(), 2);
        let all_nan = Array1::from(vec![f32::NAN, f32::NAN]);
        assert_eq!(greedy_pick(&all_nan), Err(EmptyInput));
        assert_eq!(greedy_pick(&Array1::zeros(0)), Err(EmptyInput));
    }

    #[test]
    fn test_all_nan_logits_are_rejected() {
        let model = FnModel::new(
            |_src: &[u32]| Ok::<_, ModelNotLoaded>(((), ())),
            |_prev: u32, _s: &(), _c: &()| Ok((Array1::from(vec![f32::NAN; 4]), ())),
        );
        let decoder = GreedyDecoder::new(1, 2, 5);
        match decoder.decode_ids(&model, &[4]) {
            Err(DecodeError::InvalidLogits { step, reason }) => {
                assert_eq!(step, 0);
                assert_eq!(reason, EmptyInput.to_string());
            }
            other => panic!("expected invalid logits, got {:?}", other),
        }
    }

    #[test]
    fn test_detokenize() {
        assert_eq!(detokenize(&["to", "boston"]), "to boston");
        assert_eq!(detokenize::<&str>(&[]), "");
    }

    #[test]
    fn test_translate_to_string() {
        use crate::vocab::{default_reserved, BuildOptions};
        let input_vocab = Vocabulary::build(vec![vec!["hi", "there"]], &default_reserved(), &BuildOptions::default()).unwrap();
        let output_vocab = Vocabulary::build(vec![vec!["hello", "you"]], &default_reserved(), &BuildOptions::default()).unwrap();
        // hello=4 you=5 <eos>=2
        let model = ScriptedModel::new(vec![4, 5, 2], output_vocab.len());
        let decoder = GreedyDecoder::from_vocab(&output_vocab, 20).unwrap();
        let text = decoder
            .translate_to_string(&model, &["hi", "there"], &input_vocab, &output_vocab, 5, "o")
            .unwrap();
        assert_eq!(text, "hello you");
    }

    #[test]
    fn test_from_vocab_requires_markers() {
        use crate::vocab::{default_reserved, BuildOptions, BOS};
        let empty: Vec<Vec<String>> = Vec::new();
        let vocab = Vocabulary::build(empty, &default_reserved(), &BuildOptions::default()).unwrap();
        let decoder = GreedyDecoder::from_vocab(&vocab, 20).unwrap();
        assert_eq!((decoder.bos_id, decoder.eos_id), (1, 2));

        let vocab = Vocabulary::build(Vec::<Vec<String>>::new(), &["<pad>", "<unk>"], &BuildOptions::default()).unwrap();
        assert_eq!(GreedyDecoder::from_vocab(&vocab, 20), Err(SequenceError::MissingReserved(BOS.to_string())));
    }
}
