use std::net::SocketAddr;
use std::path::Path;
use std::rc::Rc;

use anyhow::Context as _;
use skc_ws::{read_request, Response, WsError};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::runtime::Context;
use crate::session::run_session;

pub const WS_PATH: &str = "/ws";

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting new connections. Established sessions keep running.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Bind `addr` and spawn the accept loop on the current `LocalSet`.
pub async fn start_server(addr: SocketAddr, ctx: Rc<Context>) -> std::io::Result<ServerHandle> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::task::spawn_local(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::task::spawn_local(handle_connection(stream, peer, ctx.clone()));
                    }
                    Err(err) => tracing::warn!("accept failed: {err}"),
                },
            }
        }
        tracing::debug!("accept loop stopped");
    });

    Ok(ServerHandle {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Rc<Context>) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "failed to set TCP_NODELAY: {err}");
    }
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let response = match read_request(&mut reader).await {
        Err(WsError::Closed) => return,
        Err(err) => Err(anyhow::Error::from(err)),
        Ok(request) => {
            tracing::debug!(
                %peer,
                method = %request.method,
                path = %request.path,
                headers = request.headers.len(),
                "request"
            );
            if request.is_get(WS_PATH) {
                match Response::upgrade(&request.headers) {
                    Ok(upgrade) => {
                        if let Err(err) = upgrade.write_to(&mut writer).await {
                            tracing::debug!(%peer, "upgrade failed: {err}");
                            return;
                        }
                        run_session(reader, writer, ctx, peer).await;
                        return;
                    }
                    Err(err) => Err(err.into()),
                }
            } else if request.is_get("/") {
                static_page(&ctx.index_html).await.map(Response::Html)
            } else {
                Ok(Response::NotFound)
            }
        }
    };

    // Error text goes back to the client verbatim.
    let response = response.unwrap_or_else(|err| {
        tracing::warn!(%peer, "request failed: {err:#}");
        Response::InternalError(format!("{err:#}"))
    });
    if let Err(err) = response.write_to(&mut writer).await {
        tracing::debug!(%peer, "failed to write response: {err}");
    }
    let _ = writer.shutdown().await;
}

async fn static_page(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}
