use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::env::CliArgs;
use super::output::OutputFormat;
use super::runtime::{init_logging, load_config, load_local_env_overrides, LoadedConfig};
use crate::browser_impl::BrowserSession;
use crate::errors::ProbeError;
use crate::report::ConsoleReporter;
use action_flow::{run_in_session, FlowExecutor, ProbeFlow, SessionHandle};
use stealth::config::load_bundle_from_path;

/// Run one probe. Returns the process exit code.
pub async fn run() -> Result<i32> {
    let env_file = load_local_env_overrides();
    let cli = CliArgs::parse();

    let _log_guard = init_logging(
        &cli.log_level,
        cli.debug,
        cli.log_format,
        cli.log_file.as_deref(),
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        built = env!("STOCKPROBE_BUILD_DATE"),
        git = env!("STOCKPROBE_GIT_HASH"),
        "Starting stockprobe"
    );
    if let Some(path) = env_file {
        info!("Loaded environment overrides from {}", path.display());
    }

    match probe(&cli).await {
        Ok(()) => {
            info!("Probe completed successfully");
            Ok(0)
        }
        Err(err) => {
            error!("Probe failed: {}", err);
            Ok(err.exit_code())
        }
    }
}

async fn probe(cli: &CliArgs) -> Result<(), ProbeError> {
    let LoadedConfig { mut config, .. } = load_config(cli.config.as_deref())
        .map_err(|err| ProbeError::config(format!("{err:#}")))?;
    config.apply_overrides(&cli.overrides());

    let run_config = config.run_config()?;
    let origin = config.site_origin()?;
    let flow = ProbeFlow::new(run_config.clone())?.with_site_url(config.site.url.clone());

    let bundle = config
        .stealth
        .bundle
        .as_ref()
        .map(load_bundle_from_path)
        .transpose()?;

    let reporter = ConsoleReporter::new(cli.output.clone());
    let session = BrowserSession::launch(config.cdp_config(), bundle, &origin).await?;
    let handle = SessionHandle::new(session);

    let outcome = run_in_session(&handle, flow.execute(handle.primitives(), &reporter)).await;

    let report = reporter.finish(
        &run_config,
        outcome.as_ref().err().map(|err| err.to_string()),
    );
    match report.render(&cli.output) {
        Ok(text) if cli.output != OutputFormat::Human => println!("{text}"),
        Ok(text) => {
            if report.error.is_some() {
                eprintln!("{text}");
            }
        }
        Err(err) => error!(error = %err, "failed to render run report"),
    }

    outcome.map(|_| ()).map_err(ProbeError::from)
}

