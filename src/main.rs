use anyhow::Result;
use clap::Parser;
use drs_validator::{cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_dashboard = args.is_dashboard();

    // The dashboard owns the terminal, so its logs go to a file.
    let target = if is_dashboard {
        logging::LogTarget::File(args.log_file())
    } else {
        logging::LogTarget::Stderr
    };
    logging::init(&args.log_level, target)?;

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if !is_dashboard {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_dashboard {
                tracing::error!(error = %format!("{e:#}"), "dashboard failed");
                Err(e)
            } else {
                eprintln!("{e:#}");
                std::process::exit(1);
            }
        }
    }
}
