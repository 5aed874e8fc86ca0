use filedex_core::error::{EXIT_BACKEND, EXIT_IO};
use filedex_core::{
    BackendKind, CommandRequest, ConnectionProvider, Dispatcher, Options, Outcome, OutputFormat,
    StoreConfig,
};
use std::io::Write;
use std::process::ExitCode;

/// Run one record command against the configured store and report it.
///
/// Command output goes to stdout only on success; errors go to stderr.
pub fn run_record_command(
    store: StoreConfig,
    command: &str,
    options: &Options,
    format: OutputFormat,
) -> ExitCode {
    ExitCode::from(execute(store, command, options, format))
}

fn execute(store: StoreConfig, command: &str, options: &Options, format: OutputFormat) -> u8 {
    // Arguments are checked before the host directory or backend is touched.
    let request = match CommandRequest::from_options(command, options) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };

    if let Err(err) = prepare_default_host(&store) {
        eprintln!("error: {err:#}");
        return EXIT_BACKEND;
    }

    let provider = match ConnectionProvider::new(store) {
        Ok(provider) => provider,
        Err(err) => {
            let err = filedex_core::Error::from(err);
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };

    let outcome = Dispatcher::new(&provider)
        .with_format(format)
        .dispatch(request);

    match &outcome {
        Outcome::Reported(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(err) = writeln!(stdout, "{output}") {
                log::warn!("Failed to write output: {}", err);
                return EXIT_IO;
            }
        }
        Outcome::Failed(err) => eprintln!("error: {err}"),
    }

    outcome.exit_code()
}

// The platform data directory is created on first use; an explicit host
// must already exist.
fn prepare_default_host(store: &StoreConfig) -> anyhow::Result<()> {
    if store.backend_kind().ok() != Some(BackendKind::Production) {
        return Ok(());
    }
    if let Some(host) = &store.host {
        if *host == crate::config::default_host() && !host.exists() {
            std::fs::create_dir_all(host)?;
            log::info!("Created data directory {}", host.display());
        }
    }
    Ok(())
}
