use std::fs;
use std::process::Command;
use std::str;

// Cargo builds the binary for integration tests and exposes its path.
fn get_cli_path() -> &'static str {
    env!("CARGO_BIN_EXE_textseq")
}

const CORPUS: &str = "how are you@i am fine\n\
                      where are you going@to boston\n\
                      this question is far too long to keep around@ok\n";

#[test]
fn test_cli_help_message() {
    let output = Command::new(get_cli_path())
        .arg("--help")
        .output()
        .expect("Failed to execute --help command");

    assert!(output.status.success(), "CLI --help exited with error: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).expect("stdout is not valid UTF-8");
    assert!(stdout.contains("Usage:"), "Help message should contain 'Usage:'");
    for subcommand in ["prepare-dialogs", "prepare", "encode", "decode"] {
        assert!(stdout.contains(subcommand), "Help should list '{}'. Stdout: {}", subcommand, stdout);
    }
}

#[test]
fn test_cli_version_message() {
    let output = Command::new(get_cli_path())
        .arg("--version")
        .output()
        .expect("Failed to execute --version command");

    assert!(output.status.success());
    let stdout = str::from_utf8(&output.stdout).expect("stdout is not valid UTF-8");
    assert!(stdout.contains("textseq 0.1.0"), "Unexpected version output: {}", stdout);
}

#[test]
fn test_cli_prepare_then_encode_and_decode() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("training.txt");
    fs::write(&corpus_path, CORPUS).unwrap();
    let out_dir = dir.path().join("prepared");

    let output = Command::new(get_cli_path())
        .arg("prepare")
        .arg("--corpus")
        .arg(&corpus_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--max-seq-len")
        .arg("6")
        .output()
        .expect("Failed to execute prepare");
    assert!(output.status.success(), "prepare failed: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).unwrap();
    // The over-long third pair is dropped.
    assert!(stdout.contains("Prepared 2 pairs"), "Stdout: {}", stdout);
    assert!(out_dir.join("input_vocab.json").exists());
    assert!(out_dir.join("output_vocab.json").exists());
    assert!(out_dir.join("dataset.json").exists());

    let output = Command::new(get_cli_path())
        .args(["encode", "--sentence", "how are you flying", "--max-seq-len", "6", "--vocab"])
        .arg(out_dir.join("input_vocab.json"))
        .output()
        .expect("Failed to execute encode");
    assert!(output.status.success(), "encode failed: {:?}", output);
    // how=4 are=5 you=6 flying=<unk>=3 <eos>=2 <pad>=0
    assert_eq!(str::from_utf8(&output.stdout).unwrap().trim(), "4,5,6,3,2,0");

    let output = Command::new(get_cli_path())
        .args(["decode", "--ids", "7,8,2,0,0", "--strip", "--vocab"])
        .arg(out_dir.join("output_vocab.json"))
        .output()
        .expect("Failed to execute decode");
    assert!(output.status.success(), "decode failed: {:?}", output);
    // i=4 am=5 fine=6 to=7 boston=8
    assert_eq!(str::from_utf8(&output.stdout).unwrap().trim(), "to boston");
}

#[test]
fn test_cli_decode_unknown_id_uses_unknown_label() {
    let dir = tempfile::tempdir().unwrap();
    let vocab_path = dir.path().join("vocab.json");
    fs::write(
        &vocab_path,
        r#"{"idx_to_token": ["<pad>", "<bos>", "<eos>", "<unk>", "B-city"], "reserved": ["<pad>", "<bos>", "<eos>", "<unk>"], "unknown_token": "<unk>"}"#,
    )
    .unwrap();

    let output = Command::new(get_cli_path())
        .args(["decode", "--ids", "4,126"])
        .arg("--vocab")
        .arg(&vocab_path)
        .output()
        .expect("Failed to execute decode");
    assert!(output.status.success(), "decode failed: {:?}", output);
    assert_eq!(str::from_utf8(&output.stdout).unwrap().trim(), "B-city o");
}

#[test]
fn test_cli_prepare_dialogs() {
    let dir = tempfile::tempdir().unwrap();
    let lines = dir.path().join("movie_lines.txt");
    let convs = dir.path().join("movie_conversations.txt");
    let out = dir.path().join("trainingset.txt");
    fs::write(
        &lines,
        "L1 +++$+++ u0 +++$+++ m0 +++$+++ A +++$+++ Can we make this quick?\n\
         L2 +++$+++ u1 +++$+++ m0 +++$+++ B +++$+++ Well, I thought so.\n",
    )
    .unwrap();
    fs::write(&convs, "u0 +++$+++ u1 +++$+++ m0 +++$+++ ['L1', 'L2']\n").unwrap();

    let output = Command::new(get_cli_path())
        .arg("prepare-dialogs")
        .arg("--lines")
        .arg(&lines)
        .arg("--conversations")
        .arg(&convs)
        .arg("--output")
        .arg(&out)
        .output()
        .expect("Failed to execute prepare-dialogs");
    assert!(output.status.success(), "prepare-dialogs failed: {:?}", output);
    assert_eq!(fs::read_to_string(&out).unwrap(), "Can we make this quick?@Well, I thought so.\n");
}

#[test]
fn test_cli_missing_vocab_reports_error_chain() {
    let output = Command::new(get_cli_path())
        .args(["encode", "--vocab", "no_such_vocab.json", "--sentence", "hello"])
        .output()
        .expect("Failed to execute encode with missing vocab");

    assert!(!output.status.success(), "CLI should fail for a missing vocabulary. Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("Application error: Vocabulary error"), "Stderr: {}", stderr);
    assert!(stderr.contains("Caused by:"), "Stderr: {}", stderr);
}

#[test]
fn test_cli_invalid_ids_value() {
    let output = Command::new(get_cli_path())
        .args(["decode", "--vocab", "v.json", "--ids", "4,x"])
        .output()
        .expect("Failed to execute decode with invalid ids");

    assert!(!output.status.success());
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("invalid value 'x'"), "Stderr: {}", stderr);
}
