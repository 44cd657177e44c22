use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "homebuild",
    version,
    about = "Builds signed Quest home environments from a glTF scene and an optional audio loop"
)]
pub struct Cli {
    /// Verbose diagnostics: debug logging, error chain and backtrace on failure
    #[arg(short, long)]
    pub debug: bool,

    /// Legacy debug switch (`/d` or `/D`)
    #[arg(value_name = "SWITCH", value_parser = ["/d", "/D"], hide = true)]
    pub legacy_switch: Option<String>,

    /// Working directory holding the model folder, originals/ and dependencies/
    #[arg(short = 'C', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Config file (default: <workdir>/homebuild.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Exit without waiting for Enter
    #[arg(long)]
    pub no_wait: bool,
}

impl Cli {
    pub fn debug_enabled(&self) -> bool {
        self.debug || self.legacy_switch.is_some()
    }
}
