use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warden_device::console::{self, ConsoleMessenger, LocalArtifacts, SpoolMail};
use warden_device::cues::CuePlayer;
use warden_device::provisioning::Provisioner;
use warden_device::scripts::ShellScriptRunner;
use warden_device::{Communicator, DeviceConfig, Ledger, RecordStore, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let data_dir = std::env::args().nth(1).map(PathBuf::from);
    let config = DeviceConfig::load(data_dir.as_deref())?;

    info!("Warden device starting");
    info!("  Data dir: {}", config.data_dir.display());
    info!("  Immediate workers: {}", config.immediate_pool_size);

    let records = RecordStore::new(config.record_dir());
    let scripts = Arc::new(ShellScriptRunner::new(config.shell.clone(), config.script_dir()));
    let messenger = Arc::new(ConsoleMessenger);
    let artifacts = Arc::new(LocalArtifacts::new(config.data_dir.join("public")));

    let provisioner = Provisioner {
        messenger: messenger.clone(),
        artifacts: artifacts.clone(),
        mail: Arc::new(SpoolMail::new(config.data_dir.join("mail"))),
        cues: CuePlayer::new(scripts.clone(), config.media_dir(), config.cues_enabled),
        poll_interval: config.pin_poll_interval(),
    };
    if let Err(e) = provisioner.ensure_primary(&records).await {
        error!("Startup aborted: {:#}", e);
        return Err(e);
    }

    let ledger = Ledger::load(records)?;
    let comm = Communicator::new(
        &config,
        ledger,
        Services {
            messenger,
            artifacts,
            scripts,
        },
    )?;

    comm.start_communication();

    tokio::select! {
        result = console::read_lines(comm.clone()) => {
            if let Err(e) = result {
                error!("Console input failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    comm.stop_communication();
    Ok(())
}
