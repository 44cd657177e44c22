use std::io::IsTerminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
pub mod exit_codes;

use cli::args::Cli;

fn main() {
    let cli = Cli::parse();
    let debug = cli.debug_enabled();
    init_tracing(debug);

    println!(
        "Home Builder v{}.{} for Quest",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR")
    );

    let code = match cli::commands::build::run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Failed with error: {e}");
            if debug {
                eprintln!("{e:?}");
            }
            exit_codes::for_error(&e)
        }
    };

    if !cli.no_wait && std::io::stdin().is_terminal() {
        wait_for_enter();
    }
    std::process::exit(code);
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with the debug switch.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_writer(std::io::stderr)
        .try_init();
}

fn wait_for_enter() {
    println!("Press Enter to EXIT.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
