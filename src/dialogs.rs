// src/dialogs.rs
//
// Turns the movie-dialogs corpus (`movie_lines.txt`, `movie_conversations.txt`)
// into a delimited question/answer training set.

use encoding_rs::WINDOWS_1252;
use log::{info, warn};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};

/// Field separator used by both corpus files.
pub const FIELD_SEPARATOR: &str = " +++$+++ ";

#[derive(Debug)]
pub enum DialogError {
    IoError(io::Error),
    /// A conversation refers to a line id absent from the lines file.
    MissingLine(String),
}

impl std::fmt::Display for DialogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogError::IoError(e) => write!(f, "IO error: {}", e),
            DialogError::MissingLine(id) => write!(f, "Conversation references unknown line id '{}'", id),
        }
    }
}

impl std::error::Error for DialogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DialogError::IoError(e) => Some(e),
            DialogError::MissingLine(_) => None,
        }
    }
}

impl From<io::Error> for DialogError {
    fn from(err: io::Error) -> Self {
        DialogError::IoError(err)
    }
}

/// Reads the next line decoded as Windows-1252, the encoding the corpus files
/// ship in, with its terminator stripped. `None` at end of input.
fn read_line_cp1252<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(buf);
    Ok(Some(text.into_owned()))
}

/// Line id -> utterance text. Only lines with exactly five fields are kept.
pub fn parse_movie_lines<R: BufRead>(mut reader: R) -> Result<HashMap<String, String>, DialogError> {
    let mut id2line = HashMap::new();
    let mut buf = Vec::new();
    while let Some(line) = read_line_cp1252(&mut reader, &mut buf)? {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() == 5 {
            id2line.insert(fields[0].to_string(), fields[4].to_string());
        }
    }
    Ok(id2line)
}

/// One list of line ids per conversation, taken from the last field,
/// e.g. `['L194', 'L195', 'L196']`.
pub fn parse_conversations<R: BufRead>(mut reader: R) -> Result<Vec<Vec<String>>, DialogError> {
    let mut conversations = Vec::new();
    let mut buf = Vec::new();
    while let Some(line) = read_line_cp1252(&mut reader, &mut buf)? {
        if line.trim().is_empty() {
            continue;
        }
        let last = line.rsplit(FIELD_SEPARATOR).next().unwrap_or("");
        let inner = last.trim().trim_start_matches('[').trim_end_matches(']');
        let ids: Vec<String> = inner
            .split(',')
            .map(|id| id.replace(['\'', ' '], ""))
            .filter(|id| !id.is_empty())
            .collect();
        conversations.push(ids);
    }
    Ok(conversations)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogPair {
    pub question: String,
    pub answer: String,
}

/// Pairs consecutive utterances: even positions are questions, odd positions
/// answers. A trailing unanswered utterance is dropped.
pub fn gather_pairs(
    conversations: &[Vec<String>],
    id2line: &HashMap<String, String>,
) -> Result<Vec<DialogPair>, DialogError> {
    let lookup = |id: &String| {
        id2line
            .get(id)
            .cloned()
            .ok_or_else(|| DialogError::MissingLine(id.clone()))
    };

    let mut pairs = Vec::new();
    for conversation in conversations {
        for turn in conversation.chunks_exact(2) {
            pairs.push(DialogPair {
                question: lookup(&turn[0])?,
                answer: lookup(&turn[1])?,
            });
        }
    }
    info!("Gathered {} question/answer pairs from {} conversations", pairs.len(), conversations.len());
    Ok(pairs)
}

/// Writes one `question<delimiter>answer` line per pair and returns how many
/// were written. Pairs whose text contains the delimiter or a line break
/// would not parse back and are skipped.
pub fn write_training_set<W: Write>(
    pairs: &[DialogPair],
    mut writer: W,
    delimiter: char,
) -> Result<usize, DialogError> {
    let breaks_format = |s: &str| s.contains(delimiter) || s.contains(['\n', '\r']);
    let mut written = 0;
    for pair in pairs {
        if breaks_format(&pair.question) || breaks_format(&pair.answer) {
            warn!("Skipping pair containing '{}' or a line break: {:?}", delimiter, pair.question);
            continue;
        }
        writeln!(writer, "{}{}{}", pair.question, delimiter, pair.answer)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LINES: &str = "L1 +++$+++ u0 +++$+++ m0 +++$+++ BIANCA +++$+++ They do not!\n\
                         L2 +++$+++ u2 +++$+++ m0 +++$+++ CAMERON +++$+++ They do to!\n\
                         L3 +++$+++ u0 +++$+++ m0 +++$+++ BIANCA +++$+++ I hope so.\n\
                         broken line\n\
                         L4 +++$+++ u2 +++$+++ m0 +++$+++ CAMERON +++$+++ She okay?\n";

    const CONVERSATIONS: &str = "u0 +++$+++ u2 +++$+++ m0 +++$+++ ['L1', 'L2', 'L3']\n\
                                 u0 +++$+++ u2 +++$+++ m0 +++$+++ ['L3', 'L4']\n";

    #[test]
    fn test_parse_movie_lines() {
        let lines = parse_movie_lines(Cursor::new(LINES)).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines["L2"], "They do to!");
    }

    #[test]
    fn test_parse_movie_lines_decodes_windows_1252() {
        let raw: &[u8] = b"L1 +++$+++ u0 +++$+++ m0 +++$+++ A +++$+++ It\x92s fine\r\n\
                           L2 +++$+++ u2 +++$+++ m0 +++$+++ B +++$+++ Caf\xe9?\n";
        let lines = parse_movie_lines(Cursor::new(raw)).unwrap();
        assert_eq!(lines["L1"], "It\u{2019}s fine");
        assert_eq!(lines["L2"], "Caf\u{e9}?");
    }

    #[test]
    fn test_parse_movie_lines_without_trailing_newline() {
        let lines = parse_movie_lines(Cursor::new("L7 +++$+++ u0 +++$+++ m0 +++$+++ A +++$+++ Last")).unwrap();
        assert_eq!(lines["L7"], "Last");
    }

    #[test]
    fn test_parse_conversations() {
        let convs = parse_conversations(Cursor::new(CONVERSATIONS)).unwrap();
        assert_eq!(convs, vec![vec!["L1", "L2", "L3"], vec!["L3", "L4"]]);
    }

    #[test]
    fn test_gather_pairs_drops_odd_tail() {
        let lines = parse_movie_lines(Cursor::new(LINES)).unwrap();
        let convs = parse_conversations(Cursor::new(CONVERSATIONS)).unwrap();
        let pairs = gather_pairs(&convs, &lines).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].question, "They do not!");
        assert_eq!(pairs[0].answer, "They do to!");
        assert_eq!(pairs[1].answer, "She okay?");
    }

    #[test]
    fn test_gather_pairs_missing_line() {
        let lines = HashMap::new();
        let convs = vec![vec!["L9".to_string(), "L10".to_string()]];
        assert!(matches!(gather_pairs(&convs, &lines), Err(DialogError::MissingLine(id)) if id == "L9"));
    }

    #[test]
    fn test_write_training_set_skips_delimiter_text() {
        let pairs = vec![
            DialogPair { question: "hi".into(), answer: "hello".into() },
            DialogPair { question: "mail me@home".into(), answer: "ok".into() },
        ];
        let mut out = Vec::new();
        let written = write_training_set(&pairs, &mut out, '@').unwrap();
        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "hi@hello\n");
    }
}
