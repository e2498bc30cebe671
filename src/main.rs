//! `courier` relay server binary.
//!
//! Binds the listening port, relays messages until the operator types
//! `exit` or presses Ctrl+C, then shuts down gracefully.

mod cli;

use std::{
    io::{self, BufRead},
    process::ExitCode,
    thread,
    time::Duration,
};

use clap::Parser;
use courier::server::RelayServer;
use tokio::{select, signal, sync::oneshot};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => info!(%addr, "serving metrics"),
            Err(e) => warn!(%addr, error = %e, "metrics exporter not installed"),
        }
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        warn!("built without the `metrics` feature; --metrics-addr ignored");
    }

    let mut server = RelayServer::new()
        .outbox_capacity(cli.outbox_capacity)
        .max_frame_length(cli.max_frame_length)
        .shutdown_grace(Duration::from_millis(cli.grace_ms));
    if let Some(ms) = cli.handshake_timeout_ms {
        server = server.handshake_timeout(Duration::from_millis(ms));
    }

    let addr = cli.listen_addr();
    let server = match server.bind(addr) {
        Ok(server) => server,
        Err(e) => {
            error!(%addr, error = %e, "failed to start relay server");
            eprintln!("courier: cannot listen on {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        settings = ?server.session_settings(),
        grace = ?server.grace(),
        backoff = ?server.backoff(),
        "relay server configured"
    );
    if let Some(bound) = server.local_addr() {
        println!("Listening on {bound}; type `exit` to stop.");
    }

    match server.run_with_shutdown(shutdown_trigger()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "relay server failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolve on Ctrl+C or when the operator enters `exit`.
async fn shutdown_trigger() {
    let console = operator_exit();
    select! {
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("interrupt received"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
        },
        () = console => info!("operator requested exit"),
    }
}

/// Resolve when a line reading `exit` arrives on standard input. If stdin
/// closes first this never resolves, leaving only the signal.
async fn operator_exit() {
    let (tx, rx) = oneshot::channel();
    // A plain thread: a blocking stdin read must not hold up runtime
    // shutdown.
    let spawned = thread::Builder::new()
        .name("courier-console".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("exit") => {
                        let _ = tx.send(());
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "stopped reading standard input");
                        return;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "console reader not started");
        return std::future::pending().await;
    }
    if rx.await.is_err() {
        std::future::pending::<()>().await;
    }
}
