//! apistubgen CLI entry point.

use apistub::cli::{self, Cli, EXIT_FAILED};
use clap::Parser;

fn main() {
    let args = Cli::parse();
    cli::init_tracing(args.verbose);

    let exit_code = match cli::run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILED
        }
    };

    std::process::exit(exit_code);
}
