#![forbid(unsafe_code)]

//! cusync: customization region synchronizer CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("cusync: {e}");
        std::process::exit(e.exit_code());
    }
}
