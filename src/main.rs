// src/main.rs

use std::fs;

use custodian::cli::{self, CliArgs};
use custodian::config::load_and_validate;
use custodian::errors::Result;
use custodian::{daemon, logging, print_dry_run, run};

fn main() {
    let args = cli::parse();
    if let Err(err) = run_main(args) {
        eprintln!("custodian error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run_main(args: CliArgs) -> Result<()> {
    let config = load_and_validate(&args.config)?;
    if args.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let daemon_paths = daemon::validate(&config.daemon)?;
    // Reloads re-read the config by absolute path.
    let config_path = fs::canonicalize(&args.config)?;

    // Detach before any thread exists.
    if daemon_paths.is_some() {
        daemon::detach()?;
    }
    logging::init_logging(
        args.log_level,
        daemon_paths.as_ref().map(|p| p.log.as_path()),
    )?;
    if let Some(paths) = &daemon_paths {
        daemon::write_pid_file(&paths.pid)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(config_path, config));

    if let Some(paths) = &daemon_paths {
        daemon::remove_pid_file(&paths.pid);
    }
    result
}
