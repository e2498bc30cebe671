//! Coordinated shutdown over real TCP connections.

use std::time::Duration;

use courier::{client::ClientEvent, server::RelayServer};
use tokio::{
    io::AsyncReadExt,
    net::TcpStream,
    time::{Instant, timeout},
};

mod common;
use common::{RunningServer, STEP, TestResult, next_event};

#[tokio::test]
async fn every_client_gets_one_notice_then_eof() -> TestResult {
    let server = RunningServer::start_default().await?;
    let mut clients = Vec::new();
    for name in ["alice", "bob", "carol"] {
        clients.push(server.connect(name).await?);
    }
    let handle = server.into_handle();

    for client in &mut clients {
        assert_eq!(next_event(client).await?, ClientEvent::Shutdown);
        assert_eq!(timeout(STEP, client.recv()).await??, None);
    }
    timeout(STEP, handle).await???;
    Ok(())
}

#[tokio::test]
async fn new_connections_are_refused_after_shutdown() -> TestResult {
    let server = RunningServer::start_default().await?;
    let addr = server.addr;
    server.stop().await?;
    assert!(TcpStream::connect(addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn shutdown_without_clients_is_prompt() -> TestResult {
    let server = RunningServer::start(
        RelayServer::new().shutdown_grace(Duration::from_secs(30)),
    )
    .await?;
    let started = Instant::now();
    server.stop().await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn silent_connection_is_force_closed_after_grace() -> TestResult {
    let grace = Duration::from_millis(200);
    let server = RunningServer::start(RelayServer::new().shutdown_grace(grace)).await?;
    // Never sends a handshake, so nothing but the force-close can end it.
    let mut silent = TcpStream::connect(server.addr).await?;
    let mut alice = server.connect("alice").await?;

    let started = Instant::now();
    let handle = server.into_handle();
    assert_eq!(next_event(&mut alice).await?, ClientEvent::Shutdown);
    timeout(STEP, handle).await???;
    assert!(started.elapsed() >= grace);

    let mut buf = Vec::new();
    let read = timeout(STEP, silent.read_to_end(&mut buf)).await?;
    assert!(read.is_ok_and(|n| n == 0), "silent connection should see EOF");
    Ok(())
}

#[tokio::test]
async fn client_leaving_after_notice_is_clean() -> TestResult {
    let server = RunningServer::start_default().await?;
    let mut alice = server.connect("alice").await?;
    let registry = std::sync::Arc::clone(&server.registry);
    let handle = server.into_handle();

    assert_eq!(next_event(&mut alice).await?, ClientEvent::Shutdown);
    // The write side is already closed; exiting may or may not reach the
    // server, but must not hang.
    let _ = timeout(STEP, alice.exit()).await?;
    timeout(STEP, handle).await???;
    assert!(registry.is_empty());
    Ok(())
}
