use std::{
    collections::VecDeque,
    fs,
    io::ErrorKind,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{UnixListener, UnixStream, unix::OwnedReadHalf},
    signal::unix::{SignalKind, signal},
    sync::mpsc,
    task::JoinSet,
};

use crate::{
    orchestrator::error::invalid_request,
    protocol::{ClientMessage, ServerReply, parse_client_message},
    service::DecisionService,
    types::Request,
};

enum ExitReason {
    SocketMessage,
    Signal(&'static str),
}

pub async fn run(service: DecisionService, socket_path: &Path) -> Result<()> {
    let socket = SocketFile::claim(socket_path)?;
    let listener = UnixListener::bind(socket.path())
        .with_context(|| format!("unable to bind socket {}", socket.path().display()))?;

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<()>();
    let mut clients = JoinSet::new();

    tracing::info!(target: "server", socket = %socket.path().display(), "server_listening");
    eprintln!(
        "inflow listening on unix socket (NDJSON): {}",
        socket.path().display()
    );

    let exit_reason = loop {
        tokio::select! {
            _ = sigint.recv() => break ExitReason::Signal("SIGINT"),
            _ = sigterm.recv() => break ExitReason::Signal("SIGTERM"),
            Some(()) = exit_rx.recv() => break ExitReason::SocketMessage,
            Some(finished) = clients.join_next(), if !clients.is_empty() => {
                match finished {
                    Ok(Err(err)) => {
                        tracing::warn!(
                            target: "server",
                            error = %format!("{err:#}"),
                            "client_handling_failed"
                        );
                    }
                    Err(err) if err.is_panic() => {
                        tracing::error!(target: "server", error = %err, "client_task_panicked");
                    }
                    _ => {}
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    clients.spawn(handle_client(stream, service.clone(), exit_tx.clone()));
                }
                Err(err) => {
                    tracing::warn!(target: "server", error = %err, "accept_failed");
                }
            }
        }
    };

    service.shutdown();
    let open_clients = clients.len();
    clients.shutdown().await;
    socket.release()?;

    let reason = match exit_reason {
        ExitReason::SocketMessage => "exit message",
        ExitReason::Signal(signal_name) => signal_name,
    };
    tracing::info!(
        target: "server",
        reason = reason,
        open_clients = open_clients,
        "server_stopped"
    );
    eprintln!("inflow stopped: received {reason}");

    Ok(())
}

type ClientLines = Lines<BufReader<OwnedReadHalf>>;

async fn handle_client(
    stream: UnixStream,
    service: DecisionService,
    exit_tx: mpsc::UnboundedSender<()>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut pending = VecDeque::new();

    loop {
        let line = match pending.pop_front() {
            Some(line) => line,
            None => match lines.next_line().await? {
                Some(line) => line,
                None => break,
            },
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match parse_client_message(line) {
            Ok(ClientMessage::Exit) => {
                writer.write_all(ServerReply::Bye.to_line()?.as_bytes()).await?;
                let _ = exit_tx.send(());
                break;
            }
            Ok(ClientMessage::Orchestrate(request)) => {
                match orchestrate_while_connected(&service, request, &mut lines, &mut pending)
                    .await
                {
                    Some(reply) => reply,
                    None => break,
                }
            }
            Ok(message) => dispatch(&service, message).await,
            Err(err) => {
                tracing::debug!(target: "server", error = %err, "invalid_protocol_message");
                ServerReply::error(invalid_request(format!("invalid protocol message: {err}")))
            }
        };
        writer.write_all(reply.to_line()?.as_bytes()).await?;
    }

    Ok(())
}

/// Runs one orchestration while still reading the connection. Lines that
/// arrive meanwhile are queued in `pending`. When the client hangs up the
/// orchestration is cancelled and `None` is returned.
async fn orchestrate_while_connected(
    service: &DecisionService,
    request: Request,
    lines: &mut ClientLines,
    pending: &mut VecDeque<String>,
) -> Option<ServerReply> {
    let cancel = service.cancellation_token();
    let request_id = request.request_id.clone();
    let orchestration = service.orchestrate_with_cancel(request, &cancel);
    tokio::pin!(orchestration);

    let mut connected = true;
    loop {
        tokio::select! {
            outcome = &mut orchestration => {
                if !connected {
                    return None;
                }
                return Some(match outcome {
                    Ok(bundle) => ServerReply::Bundle { bundle },
                    Err(err) => ServerReply::error(err),
                });
            }
            read = lines.next_line(), if connected => match read {
                Ok(Some(line)) => pending.push_back(line),
                Ok(None) | Err(_) => {
                    tracing::info!(
                        target: "server",
                        request_id = %request_id,
                        "client_disconnected_mid_orchestration"
                    );
                    connected = false;
                    cancel.cancel();
                }
            },
        }
    }
}

async fn dispatch(service: &DecisionService, message: ClientMessage) -> ServerReply {
    let outcome = match message {
        ClientMessage::Orchestrate(request) => service
            .orchestrate(request)
            .await
            .map(|bundle| ServerReply::Bundle { bundle }),
        ClientMessage::CheckGate {
            stage,
            request_id,
            correlation_id,
        } => service
            .check_gate(stage, &request_id, &correlation_id)
            .map(|decision| ServerReply::Gate { decision }),
        ClientMessage::RecordStrategy(artifact) => {
            let request_id = artifact.request_id.clone();
            service
                .record_strategy(artifact)
                .map(|()| ServerReply::StrategyRecorded { request_id })
        }
        ClientMessage::Assemble {
            request_id,
            correlation_id,
            options,
        } => service
            .assemble(&request_id, &correlation_id, options)
            .map(|response| ServerReply::Response { response }),
        ClientMessage::Exit => Ok(ServerReply::Bye),
    };
    outcome.unwrap_or_else(ServerReply::error)
}

/// The socket path, owned for the lifetime of the listener.
struct SocketFile {
    path: PathBuf,
}

impl SocketFile {
    /// Creates the parent directory and clears a stale socket left by a
    /// previous run. Anything else sitting at the path is left alone.
    fn claim(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }

        let stale = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata.file_type().is_socket(),
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => {
                return Err(err).with_context(|| format!("unable to inspect {}", path.display()));
            }
        };
        if stale {
            fs::remove_file(path)
                .with_context(|| format!("unable to remove stale socket {}", path.display()))?;
        } else if path.exists() {
            bail!("refusing to replace non-socket file at {}", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn release(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(err).with_context(|| format!("unable to remove {}", self.path.display()))
            }
            _ => Ok(()),
        }
    }
}
