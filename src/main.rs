use anyhow::{Context, Result};

use mediasync::{
    cli::Cli,
    config::{self, SyncConfig},
    core::{EngineSettings, EventLoop, NotifySource, StopFlag},
    SocketCatalog,
};

fn main() {
    let cli = Cli::parse_or_exit();

    if let Err(err) = run(&cli) {
        tracing::error!("{:#}", err);
        if !cli.quiet {
            eprintln!("mediasync: {:#}", err);
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config_dir = config::config_dir();
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    cli.setup_logging(&config_dir.join("log"))?;

    let config = SyncConfig::load_or_default(&cli.config_path(&config_dir))?.apply_env();
    config.validate()?;

    let stop = StopFlag::new();
    let catalog = SocketCatalog::connect(
        &config.catalog.address,
        &config.catalog.client_name,
        stop.clone(),
    )
    .context("couldn't connect to server!")?;

    let watch_file = cli.watch_file_path(config.watcher.watch_file.as_deref(), &config_dir);
    let roots = config::read_watch_dirs(&watch_file)?;
    tracing::info!("watch roots: {:?}", roots);

    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request())?;

    let source = NotifySource::new()?;
    let mut event_loop = EventLoop::new(
        source,
        catalog,
        &roots,
        &watch_file,
        EngineSettings::from(&config.watcher),
        stop,
    )?;
    event_loop.run();

    Ok(())
}
