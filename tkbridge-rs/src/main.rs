use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tkbridge::cli::{self, CliArgs};
use tkbridge::{Application, Settings};

/// How often the runner checks whether the root window still exists.
const ROOT_POLL_MS: u64 = 50;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    // The subscriber needs the settings' debug flag, so the load itself is
    // reported once it is installed.
    init_logging(args.debug || settings.debug);
    debug!(
        config = ?args.config,
        backend = ?settings.backend,
        app = %settings.app_name,
        "settings loaded"
    );

    let app = Application::from_settings(&settings).context("starting the interpreter")?;
    let outcome = run(&app, &args).await;
    // Shut down even when the script failed; report the script error first.
    let closed = app.shutdown();
    outcome?;
    closed.context("shutting down")?;
    Ok(())
}

fn init_logging(debug: bool) {
    let fallback = if debug { "tkbridge=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(app: &Application, args: &CliArgs) -> Result<()> {
    let mut last = String::new();
    if let Some(path) = &args.script {
        let script =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        last = app.eval_script(&script)?;
    }
    if let Some(command) = &args.command {
        last = app.eval_script(command)?;
    }
    if !last.is_empty() {
        println!("{last}");
    }
    if args.no_loop {
        return Ok(());
    }

    let interp = app.interpreter();
    let control = app.loop_control();
    app.add_interval(ROOT_POLL_MS, move || {
        if interp.eval("winfo exists .")? == "0" {
            control.stop();
        }
        Ok(())
    });

    tokio::select! {
        outcome = app.run() => outcome?,
        _ = tokio::signal::ctrl_c() => debug!("interrupted"),
        _ = sleep_for(args.run_for()) => debug!("run time elapsed"),
    }
    Ok(())
}

async fn sleep_for(limit: Option<Duration>) {
    match limit {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
