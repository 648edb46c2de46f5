//! `reclaim` binary entry point.

mod cli_app;

use clap::Parser;

use cli_app::{Cli, run};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("reclaim: {err}");
        std::process::exit(err.exit_code());
    }
}
