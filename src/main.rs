use clap::Parser;
use tracing_subscriber::EnvFilter;

use cram_to_sam::cli;

fn main() -> anyhow::Result<()> {
    let cli = match cli::Cli::try_parse_from(cli::expand_level_flags(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and succeed; usage errors exit 1
            let code = i32::from(e.use_stderr());
            e.print()?;
            std::process::exit(code);
        }
    };

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("cram_to_sam=debug,info")
    } else {
        EnvFilter::new("cram_to_sam=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    cli::run(&cli)
}
