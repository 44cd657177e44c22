use anyhow::Context;
use homebuild_core::{BuildConfig, BuildReport, Pipeline, ProcessToolchain};

use crate::cli::args::Cli;
use crate::exit_codes::EXIT_SUCCESS;

pub fn run(args: &Cli) -> anyhow::Result<i32> {
    let root = args
        .workdir
        .canonicalize()
        .with_context(|| format!("working directory {} not found", args.workdir.display()))?;

    let config = BuildConfig::load(&root, args.config.as_deref())?;
    tracing::debug!(
        root = %root.display(),
        model_folder = %config.model_folder,
        environments = ?config.environments,
        platform = config.platform(),
        "configuration loaded"
    );

    let toolchain = ProcessToolchain::from_config(&config);
    let report = Pipeline::new(config, toolchain).run()?;

    print_report(&report);
    Ok(EXIT_SUCCESS)
}

fn print_report(report: &BuildReport) {
    for task in report.built() {
        if let (Some(artifact), Some(digest)) = (&task.artifact, &task.sha256) {
            println!("  built   {artifact}  {digest}");
        }
    }
    for task in report.skipped() {
        println!("  skipped {} (no audio file found)", task.environment);
    }
    println!("Success.");
    println!("The builds were saved to {}", report.archive.display());
}
