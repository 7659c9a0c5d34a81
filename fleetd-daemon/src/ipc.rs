use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use fleetd_domain::{CommandSpec, ContainerId, ContainerSpec, ContainerStatus, PlayerId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

use fleetd_core::container::dispatch_command_spec;
use fleetd_core::root::Root;

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    CreateContainer { player_id: PlayerId, spec: ContainerSpec },
    ListContainers { player_id: Option<PlayerId>, status: Option<ContainerStatus> },
    InspectContainer { id: ContainerId },
    StopContainer { id: ContainerId },
    RemoveContainer { id: ContainerId },
    SendCommand { command: CommandSpec },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Response {
    Ok { value: serde_json::Value },
    Err { message: String },
}

impl Response {
    fn ok(value: impl Serialize) -> Self {
        Response::Ok { value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null) }
    }

    fn err(e: impl std::fmt::Display) -> Self {
        Response::Err { message: e.to_string() }
    }
}

/// Serves the daemon's IPC surface (§6.5) over a Unix domain socket:
/// `u32` big-endian length prefix, then a JSON body, one task per connection.
/// Mirrors the teacher's "one task per request" style used for HTTP handlers,
/// adapted to a raw socket since there's no HTTP framework in this stack.
pub async fn serve(socket_path: &str, root: Arc<Root>) -> Result<()> {
    if std::path::Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path).context("removing stale socket file")?;
    }
    if let Some(parent) = std::path::Path::new(socket_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let listener = UnixListener::bind(socket_path).with_context(|| format!("binding unix socket at {socket_path}"))?;
    info!(socket_path, "listening for ipc connections");

    loop {
        let (stream, _addr) = listener.accept().await.context("accepting ipc connection")?;
        let root = root.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, root).await {
                warn!(error = %e, "ipc connection ended with an error");
            }
        });
    }
}

async fn handle_connection(mut stream: UnixStream, root: Arc<Root>) -> Result<()> {
    loop {
        let request = match read_frame(&mut stream).await? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };

        let response = match serde_json::from_slice::<Request>(&request) {
            Ok(request) => handle_request(&root, request).await,
            Err(e) => Response::err(format!("malformed request: {e}")),
        };

        let body = serde_json::to_vec(&response).context("serializing ipc response")?;
        write_frame(&mut stream, &body).await?;
    }
}

async fn handle_request(root: &Root, request: Request) -> Response {
    let result = match request {
        Request::CreateContainer { player_id, spec } => root
            .container_manager
            .create_container(player_id, spec)
            .await
            .map(|id| Response::ok(serde_json::json!({ "container_id": id }))),
        Request::ListContainers { player_id, status } => root.container_manager.list_containers(player_id.as_ref(), status).await.map(Response::ok),
        Request::InspectContainer { id } => match root.container_manager.get_container(&id).await {
            Ok(Some(container)) => Ok(Response::ok(container)),
            Ok(None) => Ok(Response::err(format!("no such container {id}"))),
            Err(e) => Err(e),
        },
        Request::StopContainer { id } => root.container_manager.stop_container(&id).await.map(|()| Response::ok(serde_json::json!({ "ok": true }))),
        Request::RemoveContainer { id } => root.container_manager.remove_container(&id).await.map(|()| Response::ok(serde_json::json!({ "ok": true }))),
        Request::SendCommand { command } => dispatch_command_spec(&root.mediator, command).await.map(Response::ok),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "ipc request failed");
            Response::err(e)
        }
    }
}

async fn read_frame(stream: &mut UnixStream) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(anyhow!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"));
    }

    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.context("reading ipc frame body")?;
    Ok(Some(body))
}

async fn write_frame(stream: &mut UnixStream, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len()).context("ipc response too large to frame")?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(body).await?;
    Ok(())
}
