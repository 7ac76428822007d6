#![forbid(unsafe_code)]

use std::rc::Rc;

use skc_firmware::hal::{LogLedSink, VirtualButton};
use skc_firmware::{Config, Firmware};
use skc_vm::Noise;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    LocalSet::new()
        .run_until(async move {
            let firmware = Firmware::boot(
                config,
                LogLedSink::default(),
                Rc::new(VirtualButton::released()),
                Noise::new(),
            )
            .await;

            let server = firmware.start_server().await?;
            tracing::info!(
                layout = ?firmware.config().layout,
                "skc-firmware listening on ws://{}/ws",
                server.local_addr()
            );
            let processor = firmware.spawn_processor();

            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            server.shutdown().await;
            processor.abort();
            anyhow::Ok(())
        })
        .await
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = sigterm => {},
    }
}
