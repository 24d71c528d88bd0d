//! Integration tests for the rig watcher
//!
//! These drive real port workers over in-memory duplex streams with tokio's
//! paused clock, covering:
//! - CI-V and CAT decode through the full worker → registry → publish path
//! - protocol detection, CAT fallback, and legacy-rig polling timelines
//! - cross-port arbitration and broadcast filtering
//! - PTY-style pass-through observation

use std::sync::Arc;
use std::time::Duration;

use rig_protocol::civ;
use rig_watch::{
    BroadcastMode, Broadcaster, PortWorker, PublishPolicy, RegistryConfig, RigRegistry,
    WorkerCommand,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> (Arc<RigRegistry>, mpsc::Receiver<String>) {
    registry_with_policy(PublishPolicy::default())
}

fn registry_with_policy(policy: PublishPolicy) -> (Arc<RigRegistry>, mpsc::Receiver<String>) {
    let (broadcaster, rx) = Broadcaster::channel();
    (
        Arc::new(RigRegistry::new(
            RegistryConfig::default(),
            policy,
            broadcaster,
        )),
        rx,
    )
}

/// Spawn a worker on slot `index`; returns the rig-side stream and the
/// command channel that keeps the worker alive.
fn spawn_worker(
    index: usize,
    registry: Arc<RigRegistry>,
) -> (DuplexStream, mpsc::Sender<WorkerCommand>) {
    let (rig_side, worker_side) = tokio::io::duplex(4096);
    let worker = PortWorker::new(index, worker_side, registry, None);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    tokio::spawn(worker.run(cmd_rx));
    (rig_side, cmd_tx)
}

async fn next_event(rx: &mut mpsc::Receiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no event published")
        .expect("broadcast channel closed")
}

/// Let spawned workers process whatever is in flight
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn civ_freq_frame(hz: i64) -> Vec<u8> {
    let mut frame = vec![0xFE, 0xFE, 0x00, 0x00, civ::CMD_TRANSCEIVE_FREQ];
    frame.extend_from_slice(&civ::frequency_to_bcd(hz));
    frame.push(0xFD);
    frame
}

fn civ_mode_frame(code: u8, data: u8) -> Vec<u8> {
    vec![0xFE, 0xFE, 0x00, 0x00, civ::CMD_TRANSCEIVE_MODE, code, data, 0xFD]
}

// ============================================================================
// CI-V decode
// ============================================================================

#[tokio::test(start_paused = true)]
async fn civ_frequency_decodes_and_publishes() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry.clone());

    rig.write_all(&civ_freq_frame(14_074_000)).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        r#"{"type":"rig","rig":"ICOM","freq":14074000}"#
    );
    assert_eq!(registry.global_state().freq, 14_074_000);
}

#[tokio::test(start_paused = true)]
async fn civ_frame_split_across_three_reads() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry);

    let frame = civ_freq_frame(14_074_000);
    rig.write_all(&frame[..3]).await.unwrap();
    settle().await;
    rig.write_all(&frame[3..frame.len() - 1]).await.unwrap();
    settle().await;
    rig.write_all(&frame[frame.len() - 1..]).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        r#"{"type":"rig","rig":"ICOM","freq":14074000}"#
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn civ_dv_mode_publishes_dstar_presentation() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry);

    rig.write_all(&civ_freq_frame(439_500_000)).await.unwrap();
    assert!(next_event(&mut events).await.contains("439500000"));

    rig.write_all(&civ_mode_frame(0x17, 0x00)).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        r#"{"type":"rig","rig":"ICOM","freq":439500000,"mode":"D-STAR (DR)","data":false}"#
    );
}

// ============================================================================
// CAT decode and detection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cat_fa_report_detects_and_publishes() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry.clone());

    rig.write_all(b"FA00014074000;").await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        r#"{"type":"rig","rig":"CAT","freq":14074000}"#
    );

    // Detection by traffic still arms auto-information.
    let mut buf = vec![0u8; rig_protocol::cat::AUTO_INFO_ARM.len()];
    rig.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, rig_protocol::cat::AUTO_INFO_ARM);
}

#[tokio::test(start_paused = true)]
async fn cat_if_report_after_silent_fallback() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry);

    // An IF report alone carries no FA/MD signature, so the port stays
    // undetected until the 1 s fallback declares CAT and replays it.
    let mut report = format!("IF000{:011}+000000000", 14_474_000);
    report.push('5');
    report.push_str("000;");
    rig.write_all(report.as_bytes()).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        r#"{"type":"rig","rig":"CAT","freq":14474000,"mode":"AM","data":false}"#
    );
}

#[tokio::test(start_paused = true)]
async fn silent_port_probes_then_falls_back_to_polling() {
    let (registry, _events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry);

    // t+300ms: CI-V broadcast queries
    let mut buf = [0u8; 12];
    rig.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[..6], civ::FREQ_QUERY);
    assert_eq!(buf[6..], civ::MODE_QUERY);

    // t+1s: CAT assumed, auto-information armed
    let mut buf = vec![0u8; rig_protocol::cat::AUTO_INFO_ARM.len()];
    rig.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, rig_protocol::cat::AUTO_INFO_ARM);

    // t+3s: AI1 unanswered, polling starts
    let mut buf = vec![0u8; rig_protocol::cat::POLL_QUERY.len()];
    rig.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, rig_protocol::cat::POLL_QUERY);

    // two more poll ticks
    let mut buf = vec![0u8; rig_protocol::cat::POLL_QUERY.len() * 2];
    rig.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[..7], rig_protocol::cat::POLL_QUERY);
    assert_eq!(&buf[7..], rig_protocol::cat::POLL_QUERY);
}

#[tokio::test(start_paused = true)]
async fn answered_ai1_does_not_poll() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry);

    // Rig answers immediately: CAT detected from traffic, AI1 satisfied.
    rig.write_all(b"FA00007074000;").await.unwrap();
    next_event(&mut events).await;

    // Drain the AI1 arm command, then nothing more may be written.
    let mut buf = vec![0u8; rig_protocol::cat::AUTO_INFO_ARM.len()];
    rig.read_exact(&mut buf).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut probe = [0u8; 1];
    let pending = tokio::time::timeout(Duration::from_millis(10), rig.read(&mut probe)).await;
    assert!(pending.is_err(), "unexpected write after AI1 was answered");
}

#[tokio::test(start_paused = true)]
async fn rearm_resends_ai1_on_cat_ports_only() {
    let (registry, mut events) = registry();
    let (mut rig, cmd) = spawn_worker(0, registry);

    rig.write_all(b"FA00007074000;").await.unwrap();
    next_event(&mut events).await;
    let mut buf = vec![0u8; rig_protocol::cat::AUTO_INFO_ARM.len()];
    rig.read_exact(&mut buf).await.unwrap();

    cmd.send(WorkerCommand::RearmAutoInfo).await.unwrap();
    let mut buf = vec![0u8; rig_protocol::cat::AUTO_INFO_ARM.len()];
    rig.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, rig_protocol::cat::AUTO_INFO_ARM);
}

// ============================================================================
// Cross-port behavior
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cross_port_frequency_flap_is_suppressed_then_wins() {
    let (registry, mut events) = registry();
    let (mut rig0, _cmd0) = spawn_worker(0, registry.clone());
    let (mut rig1, _cmd1) = spawn_worker(1, registry.clone());

    rig0.write_all(&civ_freq_frame(14_074_000)).await.unwrap();
    assert!(next_event(&mut events).await.contains("14074000"));

    // 200 ms later the second rig's transceive broadcast loses arbitration.
    tokio::time::sleep(Duration::from_millis(200)).await;
    rig1.write_all(&civ_freq_frame(21_074_000)).await.unwrap();
    settle().await;
    assert!(events.try_recv().is_err());

    // 600 ms later the same report wins and takes over the global view.
    tokio::time::sleep(Duration::from_millis(600)).await;
    rig1.write_all(&civ_freq_frame(21_074_000)).await.unwrap();
    assert!(next_event(&mut events).await.contains("21074000"));
    assert_eq!(registry.global_state().index, 1);
}

#[tokio::test(start_paused = true)]
async fn single_broadcast_mode_ignores_other_ports() {
    let (registry, mut events) = registry_with_policy(PublishPolicy {
        mode: BroadcastMode::Single,
        selected_index: 2,
    });
    let (mut rig0, _cmd0) = spawn_worker(0, registry.clone());
    let (mut rig2, _cmd2) = spawn_worker(2, registry.clone());

    rig0.write_all(&civ_freq_frame(7_074_000)).await.unwrap();
    settle().await;
    assert!(events.try_recv().is_err());
    // Parsed but dropped: the port state never saw the update either.
    assert_eq!(registry.port_state(0).unwrap().freq, 0);

    rig2.write_all(&civ_freq_frame(14_074_000)).await.unwrap();
    assert!(next_event(&mut events).await.contains("14074000"));
}

// ============================================================================
// Worker lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn worker_registers_and_unregisters_port_state() {
    let (registry, mut events) = registry();
    let (mut rig, cmd) = spawn_worker(3, registry.clone());

    rig.write_all(&civ_freq_frame(14_074_000)).await.unwrap();
    next_event(&mut events).await;
    assert!(registry.port_state(3).is_some());

    cmd.send(WorkerCommand::Shutdown).await.unwrap();
    settle().await;
    assert!(registry.port_state(3).is_none());
}

#[tokio::test(start_paused = true)]
async fn worker_exits_when_stream_closes() {
    let (registry, mut events) = registry();
    let (mut rig, _cmd) = spawn_worker(0, registry.clone());

    rig.write_all(&civ_freq_frame(14_074_000)).await.unwrap();
    next_event(&mut events).await;

    drop(rig);
    settle().await;
    assert!(registry.port_state(0).is_none());
}

// ============================================================================
// PTY-style observation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn pty_link_mirrors_rig_bytes_and_forwards_app_commands() {
    use rig_watch::pty::PtyLink;

    let (registry, mut events) = registry();
    let (to_app_tx, mut to_app_rx) = mpsc::channel(100);
    let (from_app_tx, from_app_rx) = mpsc::channel(100);
    let link = PtyLink {
        to_app: to_app_tx,
        from_app: from_app_rx,
    };

    let (mut rig, worker_side) = tokio::io::duplex(4096);
    let worker = PortWorker::new(0, worker_side, registry, Some(link));
    let (_cmd_tx, cmd_rx) = mpsc::channel(8);
    tokio::spawn(worker.run(cmd_rx));

    // Rig traffic is decoded and mirrored to the app verbatim.
    rig.write_all(b"FA00014074000;").await.unwrap();
    assert!(next_event(&mut events).await.contains("14074000"));
    let mirrored = to_app_rx.recv().await.unwrap();
    assert_eq!(mirrored, b"FA00014074000;");

    // App commands pass through to the rig unparsed.
    from_app_tx.send(b"AI0;".to_vec()).await.unwrap();
    // Skip over the worker's own AI1 arm write to find the forwarded bytes.
    tokio::time::timeout(Duration::from_secs(30), async {
        let mut buf = [0u8; 32];
        let mut seen = Vec::new();
        while !seen.windows(4).any(|w| w == b"AI0;") {
            let n = rig.read(&mut buf).await.unwrap();
            seen.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("app command was not forwarded to the rig");
}
