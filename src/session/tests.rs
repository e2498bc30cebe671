//! State machine tests driven over in-memory duplex streams.

use std::{sync::Arc, time::Duration};

use bytes::BufMut;
use futures::{SinkExt, StreamExt};
use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncWriteExt, DuplexStream, duplex},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

use super::*;
use crate::codec::{MIN_FRAME_LENGTH, MessageCodec};

type Client = Framed<DuplexStream, MessageCodec>;

struct Harness {
    registry: Arc<Registry>,
    draining: CancellationToken,
    force_close: CancellationToken,
    tracker: TaskTracker,
    settings: SessionSettings,
}

impl Harness {
    fn context(&self) -> SessionContext {
        SessionContext {
            registry: Arc::clone(&self.registry),
            settings: self.settings,
            draining: self.draining.clone(),
            force_close: self.force_close.clone(),
            tracker: self.tracker.clone(),
        }
    }

    fn open(&self) -> (JoinHandle<()>, Client) {
        let (server_side, client_side) = duplex(64 * 1024);
        let session = tokio::spawn(serve_connection(server_side, None, self.context()));
        (session, Framed::new(client_side, MessageCodec::default()))
    }

    async fn connect(&self, username: &str) -> (JoinHandle<()>, Client) {
        let (session, mut client) = self.open();
        client
            .send(Message::handshake(username))
            .await
            .expect("send handshake");
        self.wait_registered(username).await;
        (session, client)
    }

    async fn wait_registered(&self, username: &str) {
        timeout(Duration::from_secs(1), async {
            while self.registry.lookup(username).is_none() {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("username should be registered");
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        registry: Arc::new(Registry::new()),
        draining: CancellationToken::new(),
        force_close: CancellationToken::new(),
        tracker: TaskTracker::new(),
        settings: SessionSettings::default(),
    }
}

/// A harness whose sessions enforce the smallest frame limit.
#[fixture]
fn tight_harness(harness: Harness) -> Harness {
    Harness {
        settings: SessionSettings {
            max_frame_length: MIN_FRAME_LENGTH,
            ..harness.settings
        },
        ..harness
    }
}

async fn next_message(client: &mut Client) -> Message {
    timeout(Duration::from_secs(1), client.next())
        .await
        .expect("frame should arrive")
        .expect("stream should stay open")
        .expect("frame should decode")
}

async fn finish(session: JoinHandle<()>) {
    timeout(Duration::from_secs(1), session)
        .await
        .expect("session should end")
        .expect("session task should not panic");
}

#[rstest]
#[tokio::test]
async fn handshake_registers_username(harness: Harness) {
    let (_session, _client) = harness.connect("alice").await;
    assert_eq!(harness.registry.len(), 1);
}

#[rstest]
#[tokio::test]
async fn close_before_handshake_never_registers(harness: Harness) {
    let (session, client) = harness.open();
    drop(client);
    finish(session).await;
    assert!(harness.registry.is_empty());
}

#[rstest]
#[tokio::test]
async fn empty_username_is_rejected(harness: Harness) {
    let (session, mut client) = harness.open();
    client.send(Message::handshake("")).await.expect("send");
    finish(session).await;
    assert!(harness.registry.is_empty());
    assert!(client.next().await.is_none(), "connection should be closed");
}

#[rstest]
#[tokio::test]
async fn server_name_cannot_be_registered(harness: Harness) {
    let (session, mut client) = harness.open();
    client.send(Message::handshake("Server")).await.expect("send");
    finish(session).await;
    assert!(harness.registry.is_empty());
}

#[rstest]
#[tokio::test]
async fn relays_with_stamped_sender(harness: Harness) {
    let (_a, mut alice) = harness.connect("alice").await;
    let (_b, mut bob) = harness.connect("bob").await;

    alice
        .send(Message::new("bob", "mallory", "hi"))
        .await
        .expect("send");
    let received = next_message(&mut bob).await;
    assert_eq!(received, Message::new("bob", "alice", "hi"));
}

#[rstest]
#[tokio::test]
async fn unknown_recipient_gets_one_notice(harness: Harness) {
    let (_a, mut alice) = harness.connect("alice").await;

    alice
        .send(Message::new("carol", "alice", "hey"))
        .await
        .expect("send");
    let notice = next_message(&mut alice).await;
    assert_eq!(notice.from(), "Server");
    assert_eq!(notice.content(), "carol not found");

    alice
        .send(Message::new("alice", "alice", "still here"))
        .await
        .expect("send");
    assert_eq!(next_message(&mut alice).await.content(), "still here");
}

#[rstest]
#[tokio::test]
async fn frame_at_the_limit_is_relayed(tight_harness: Harness) {
    let harness = tight_harness;
    let (_a, mut alice) = harness.connect("alice").await;
    let (_b, mut bob) = harness.connect("bob").await;

    let msg = Message::new("bob", "alice", "y".repeat(44));
    assert_eq!(msg.payload_len(), MIN_FRAME_LENGTH);
    alice.send(msg.clone()).await.expect("send");
    assert_eq!(next_message(&mut bob).await, msg);
}

#[rstest]
#[tokio::test]
async fn frame_outgrowing_the_limit_when_restamped_ends_the_sender(tight_harness: Harness) {
    let harness = tight_harness;
    let (alice_session, mut alice) = harness.connect("alice").await;
    let (_b, mut bob) = harness.connect("bob").await;
    let (_c, mut carol) = harness.connect("carol").await;

    // Fits as sent, but not once "alice" is stamped into the empty sender.
    let spoofed = Message::new("bob", "", "y".repeat(49));
    assert_eq!(spoofed.payload_len(), MIN_FRAME_LENGTH);
    alice.send(spoofed).await.expect("send");
    finish(alice_session).await;
    assert!(harness.registry.lookup("alice").is_none());
    assert!(alice.next().await.is_none());

    assert!(harness.registry.lookup("bob").is_some());
    carol
        .send(Message::new("bob", "carol", "still up?"))
        .await
        .expect("send");
    assert_eq!(next_message(&mut bob).await.content(), "still up?");
}

#[rstest]
#[tokio::test]
async fn not_found_notice_for_long_name_fits_the_limit(tight_harness: Harness) {
    let harness = tight_harness;
    let (_a, mut alice) = harness.connect("alice").await;

    let missing = "z".repeat(40);
    alice
        .send(Message::new(missing.as_str(), "alice", "hi"))
        .await
        .expect("send");
    let notice = next_message(&mut alice).await;
    assert_eq!(notice.from(), SERVER_NAME);
    assert!(notice.payload_len() <= MIN_FRAME_LENGTH);
    let echoed = notice
        .content()
        .strip_suffix(" not found")
        .expect("notice should end with \" not found\"");
    assert!(!echoed.is_empty() && missing.starts_with(echoed));

    // The session survives the miss.
    alice
        .send(Message::new("alice", "alice", "still here"))
        .await
        .expect("send");
    assert_eq!(next_message(&mut alice).await.content(), "still here");
}

#[rstest]
#[tokio::test]
async fn exit_sentinel_unregisters_and_closes(harness: Harness) {
    let (session, mut alice) = harness.connect("alice").await;
    alice
        .send(Message::client_exit("alice"))
        .await
        .expect("send");
    finish(session).await;
    assert!(harness.registry.lookup("alice").is_none());
    assert!(alice.next().await.is_none());
}

#[rstest]
#[tokio::test]
async fn malformed_frame_ends_only_that_session(harness: Harness) {
    let (session, mut alice) = harness.connect("alice").await;
    let (_b, mut bob) = harness.connect("bob").await;

    let mut garbage = bytes::BytesMut::new();
    garbage.put_u32(5);
    garbage.put_slice(&[0, 0, 0, 9, 1]);
    alice.get_mut().write_all(&garbage).await.expect("write");
    finish(session).await;
    assert!(harness.registry.lookup("alice").is_none());

    bob.send(Message::new("bob", "bob", "echo"))
        .await
        .expect("send");
    assert_eq!(next_message(&mut bob).await.content(), "echo");
}

#[rstest]
#[tokio::test]
async fn displaced_session_exit_keeps_new_owner(harness: Harness) {
    let (first, mut old_alice) = harness.connect("alice").await;
    let original = harness
        .registry
        .lookup("alice")
        .expect("registered")
        .connection_id();

    let (_second, mut new_alice) = harness.open();
    new_alice
        .send(Message::handshake("alice"))
        .await
        .expect("send");
    timeout(Duration::from_secs(1), async {
        while harness
            .registry
            .lookup("alice")
            .is_none_or(|h| h.connection_id() == original)
        {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("second registration should take over");

    old_alice
        .send(Message::client_exit("alice"))
        .await
        .expect("send");
    finish(first).await;

    let (_b, mut bob) = harness.connect("bob").await;
    bob.send(Message::new("alice", "bob", "who?"))
        .await
        .expect("send");
    assert_eq!(next_message(&mut new_alice).await.content(), "who?");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_client_times_out_before_handshake(mut harness: Harness) {
    harness.settings.handshake_timeout = Some(Duration::from_secs(5));
    let (session, _client) = harness.open();
    finish_within(session, Duration::from_secs(10)).await;
    assert!(harness.registry.is_empty());
}

async fn finish_within(session: JoinHandle<()>, limit: Duration) {
    timeout(limit, session)
        .await
        .expect("session should end")
        .expect("session task should not panic");
}

#[rstest]
#[tokio::test]
async fn force_close_ends_active_session(harness: Harness) {
    let (session, _alice) = harness.connect("alice").await;
    harness.force_close.cancel();
    finish(session).await;
    assert!(harness.registry.lookup("alice").is_none());
}

#[rstest]
#[tokio::test]
async fn registration_during_shutdown_receives_notice(harness: Harness) {
    harness.draining.cancel();
    let (session, mut alice) = harness.open();
    alice
        .send(Message::handshake("alice"))
        .await
        .expect("send handshake");
    assert_eq!(next_message(&mut alice).await, Message::shutdown_notice());
    assert!(alice.next().await.is_none(), "notice should close the stream");
    // The session ends once its writer has delivered the notice, even
    // though the client has not hung up.
    finish(session).await;
    assert!(harness.registry.is_empty());
}

/// Change in the registered-sessions gauge since the last snapshot.
/// Taking a snapshot resets gauges, so callers sum successive readings.
#[cfg(feature = "metrics")]
fn registered_delta(snapshotter: &metrics_util::debugging::Snapshotter) -> f64 {
    use metrics_util::debugging::DebugValue;

    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(k, _, _, v)| match v {
            DebugValue::Gauge(g) if k.key().name() == metrics::SESSIONS_REGISTERED => {
                Some(g.into_inner())
            }
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(feature = "metrics")]
#[rstest]
#[tokio::test]
async fn registered_gauge_drops_displaced_sessions(harness: Harness) {
    let recorder = metrics_util::debugging::DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    // Sessions run on this thread under the current-thread runtime.
    let _guard = ::metrics::set_default_local_recorder(&recorder);
    let mut registered = 0.0;

    let (first, mut old_alice) = harness.connect("alice").await;
    let original = harness
        .registry
        .lookup("alice")
        .expect("registered")
        .connection_id();
    let (second, mut new_alice) = harness.open();
    new_alice
        .send(Message::handshake("alice"))
        .await
        .expect("send");
    timeout(Duration::from_secs(1), async {
        while harness
            .registry
            .lookup("alice")
            .is_none_or(|h| h.connection_id() == original)
        {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("second registration should take over");
    registered += registered_delta(&snapshotter);
    assert_eq!(registered, 1.0, "only the new owner counts");

    old_alice
        .send(Message::client_exit("alice"))
        .await
        .expect("send");
    finish(first).await;
    registered += registered_delta(&snapshotter);
    assert_eq!(registered, 1.0, "displaced session leaving changes nothing");

    new_alice
        .send(Message::client_exit("alice"))
        .await
        .expect("send");
    finish(second).await;
    registered += registered_delta(&snapshotter);
    assert_eq!(registered, 0.0);
}
