// src/main.rs
use textseq::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Application error: {}", e);
        // Print the full chain of errors
        let mut current_err: Option<&(dyn std::error::Error + 'static)> = e.source();
        while let Some(source) = current_err {
            eprintln!("Caused by: {}", source);
            current_err = source.source();
        }
        std::process::exit(1);
    }
}
