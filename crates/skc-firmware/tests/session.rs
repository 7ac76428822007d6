use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use skc_firmware::hal::VirtualButton;
use skc_firmware::session::{run_session, PING};
use skc_firmware::store::ProgramStore;
use skc_firmware::Context;
use skc_vm::{Display, LedSink, Rgb};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::LocalSet;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct Frames(Rc<RefCell<Vec<Vec<Rgb>>>>);

impl LedSink for Frames {
    fn flush(&mut self, frame: &[Rgb]) {
        self.0.borrow_mut().push(frame.to_vec());
    }
}

struct Harness {
    ctx: Rc<Context>,
    frames: Frames,
    button: VirtualButton,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    harness_with_store("ram.bin")
}

fn harness_with_store(relative: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let frames = Frames::default();
    let button = VirtualButton::released();
    let ctx = Rc::new(Context {
        display: Display::shared(16, frames.clone()),
        store: ProgramStore::new(dir.path().join(relative)),
        button: Rc::new(button.clone()),
        index_html: dir.path().join("index.html"),
        ping_interval: Duration::from_secs(10),
        button_poll: Duration::from_millis(10),
    });
    Harness {
        ctx,
        frames,
        button,
        _dir: dir,
    }
}

impl Harness {
    fn display_led(&self, index: usize) -> Option<Rgb> {
        self.ctx.display.borrow().get(index)
    }
}

fn spawn_session(ctx: Rc<Context>) -> (DuplexStream, tokio::task::JoinHandle<()>) {
    let (client, server) = tokio::io::duplex(4096);
    let (reader, writer) = tokio::io::split(server);
    let peer = "127.0.0.1:40000".parse().unwrap();
    let task = tokio::task::spawn_local(run_session(reader, writer, ctx, peer));
    (client, task)
}

fn masked(payload: &[u8]) -> Vec<u8> {
    let key = [0x37, 0xfa, 0x21, 0x3d];
    let mut frame = vec![0x82, 0x80 | payload.len() as u8];
    frame.extend_from_slice(&key);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    frame
}

async fn next_frame(client: &mut DuplexStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x82);
    let mut payload = vec![0u8; usize::from(header[1])];
    client.read_exact(&mut payload).await.unwrap();
    payload
}

async fn next_non_ping(client: &mut DuplexStream) -> Vec<u8> {
    loop {
        let frame = next_frame(client).await;
        if frame != PING {
            return frame;
        }
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn keepalive_pings_immediately_then_every_interval() {
    let h = harness();
    LocalSet::new()
        .run_until(async {
            let (mut client, _task) = spawn_session(h.ctx.clone());

            assert_eq!(next_frame(&mut client).await, PING);
            let start = Instant::now();
            assert_eq!(next_frame(&mut client).await, PING);
            let elapsed = start.elapsed();
            assert!(
                elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11),
                "{elapsed:?}"
            );
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn button_edges_are_reported_once() {
    let h = harness();
    LocalSet::new()
        .run_until(async {
            let (mut client, _task) = spawn_session(h.ctx.clone());
            assert_eq!(next_frame(&mut client).await, PING);

            h.button.press();
            assert_eq!(next_non_ping(&mut client).await, b"b\x00");
            h.button.release();
            assert_eq!(next_non_ping(&mut client).await, b"b\x01");

            // A steady level produces nothing but keepalives.
            assert_eq!(next_frame(&mut client).await, PING);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn messages_are_dispatched_in_order() {
    let h = harness();
    LocalSet::new()
        .run_until(async {
            let (mut client, task) = spawn_session(h.ctx.clone());
            client.write_all(&masked(b"M\x05\x06")).await.unwrap();
            client.write_all(&masked(b"T\x01\x02\x03")).await.unwrap();
            client.write_all(&masked(b"u")).await.unwrap();
            client.write_all(&masked(b"Uabc")).await.unwrap();
            client.write_all(&masked(b"Udef")).await.unwrap();
            drop(client);
            task.await.unwrap();

            assert_eq!(h.ctx.store.load().await.unwrap(), b"abcdef");
            let frames = h.frames.0.borrow();
            assert_eq!(frames.len(), 2);
            assert_eq!(frames[0][0], Rgb::gray(5));
            assert_eq!(frames[1][0], Rgb::new(1, 2, 3));
            assert_eq!(frames[1][1], Rgb::gray(6));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn decode_failure_ends_the_session() {
    let bad_frames: [&[u8]; 3] = [
        // FIN clear
        &[0x02, 0x81, 0, 0, 0, 0, b'M'],
        // mask clear
        &[0x82, 0x01, b'M'],
        // 16-bit extended length
        &[0x82, 0xFE, 0x00, 0x80],
    ];
    for bad in bad_frames {
        let h = harness();
        LocalSet::new()
            .run_until(async {
                let (mut client, task) = spawn_session(h.ctx.clone());
                client.write_all(bad).await.unwrap();
                task.await.unwrap();

                // Subscriptions die with the session, so the stream ends. At most the first
                // keepalive made it out before that.
                let mut rest = Vec::new();
                client.read_to_end(&mut rest).await.unwrap();
                assert!(rest.is_empty() || rest == b"\x82\x06^PING$", "{rest:?}");
                assert!(h.frames.0.borrow().is_empty());
            })
            .await;
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn store_failure_ends_only_that_session() {
    let h = harness_with_store("no-such-dir/ram.bin");
    LocalSet::new()
        .run_until(async {
            let (mut client, task) = spawn_session(h.ctx.clone());
            client.write_all(&masked(b"Uabc")).await.unwrap();
            task.await.unwrap();

            // No HTTP error page is written into the frame stream.
            let mut rest = Vec::new();
            client.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty() || rest == b"\x82\x06^PING$", "{rest:?}");
            assert!(h.ctx.store.load().await.is_err());

            let (mut client, task) = spawn_session(h.ctx.clone());
            client.write_all(&masked(b"M\x04")).await.unwrap();
            drop(client);
            task.await.unwrap();
            assert_eq!(h.frames.0.borrow().len(), 1);
            assert_eq!(h.display_led(0), Some(Rgb::gray(4)));
        })
        .await;
}
