//! One upgraded WebSocket connection.
//!
//! The session reads messages in order and hands each to the router. Two subscriptions run
//! beside it as local tasks: the keepalive ping and the button notifier. Both share the write
//! half through a mutex so frames never interleave, and both are aborted when the read loop ends.

use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use skc_ws::{read_message, write_message, WsError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::hal::Button;
use crate::router;
use crate::runtime::Context;
use crate::store::StoreError;

pub const PING: &[u8] = b"^PING$";

type SharedWriter<W> = Rc<Mutex<W>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Ws(#[from] WsError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Aborts the session's background tasks when dropped.
struct Subscriptions(Vec<JoinHandle<()>>);

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Drive a session after the `101` response has been sent. Must run inside a `LocalSet`.
pub async fn run_session<R, W>(mut reader: R, writer: W, ctx: Rc<Context>, peer: SocketAddr)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + 'static,
{
    tracing::info!(%peer, "ws connected");
    let writer = Rc::new(Mutex::new(writer));
    let _subscriptions = Subscriptions(vec![
        tokio::task::spawn_local(keepalive(writer.clone(), ctx.ping_interval)),
        tokio::task::spawn_local(button_notifier(
            writer.clone(),
            ctx.button.clone(),
            ctx.button_poll,
        )),
    ]);

    match message_loop(&mut reader, &ctx).await {
        Err(SessionError::Ws(WsError::Closed)) => tracing::info!(%peer, "ws disconnected"),
        Err(SessionError::Ws(err)) if err.is_protocol_fault() => {
            tracing::warn!(%peer, "ws closed on protocol error: {err}")
        }
        Err(err) => tracing::warn!(%peer, "ws session failed: {err}"),
        Ok(()) => {}
    }
}

async fn message_loop<R>(reader: &mut R, ctx: &Context) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let message = read_message(reader).await?;
        router::dispatch(&ctx.display, &ctx.store, &message).await?;
    }
}

async fn send<W>(writer: &SharedWriter<W>, payload: &[u8]) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = writer.lock().await;
    write_message(&mut *writer, payload).await
}

async fn keepalive<W>(writer: SharedWriter<W>, every: Duration)
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = send(&writer, PING).await {
            tracing::debug!("keepalive stopped: {err}");
            return;
        }
    }
}

/// Edge-triggered button reports: `b\x01` on release (high), `b\x00` on press (low).
async fn button_notifier<W>(writer: SharedWriter<W>, button: Rc<dyn Button>, poll: Duration)
where
    W: AsyncWrite + Unpin,
{
    let mut last = true;
    loop {
        let level = button.is_high();
        if level != last {
            last = level;
            tracing::debug!(high = level, "button edge");
            if let Err(err) = send(&writer, &[b'b', u8::from(level)]).await {
                tracing::debug!("button notifier stopped: {err}");
                return;
            }
        }
        tokio::time::sleep(poll).await;
    }
}
