//! Application orchestrator: signaling connection, session and the
//! send/receive loops.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use shareit_signaling::WsSignalingClient;
use shareit_transfer::{
    CHUNK_SIZE, Session, SessionEvent, SpeedCalculator, TransferProgress, format_rate,
    sanitize_file_name,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Command;
use crate::config::Config;

/// Runs one send or receive command to completion.
pub async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    let session_id = match &command {
        Command::Send { session, .. } | Command::Receive { session, .. } => session.clone(),
    };

    let (client, mut server_events) = WsSignalingClient::connect(&config.signaling_url)
        .await
        .with_context(|| format!("connecting to {}", config.signaling_url))?;
    let client = Arc::new(client);

    let (session, events) = Session::new(
        session_id.clone(),
        config.transfer_config(),
        Arc::clone(&client) as Arc<dyn shareit_transfer::SignalingChannel>,
    );
    session.join()?;
    let sweeper = session.spawn_idle_sweeper();

    // -- Signaling -> session --
    let disconnected = CancellationToken::new();
    let pump = {
        let session = session.clone();
        let disconnected = disconnected.clone();
        tokio::spawn(async move {
            while let Some(event) = server_events.recv().await {
                session.handle_server_event(event);
            }
            disconnected.cancel();
        })
    };

    let result = match command {
        Command::Send { files, .. } => send_files(&session, events, &files, &disconnected).await,
        Command::Receive { count, .. } => {
            receive_files(&session, events, &config.download_path(), count, &disconnected).await
        }
    };

    // -- Graceful shutdown --
    tracing::info!("stopping session...");
    session.close_session();
    client.close();
    pump.abort();
    let _ = sweeper.await;

    result
}

/// Reads every file, waits for the peer, sends them all and waits until
/// each one has gone through the send loop.
async fn send_files(
    session: &Session,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    files: &[PathBuf],
    disconnected: &CancellationToken,
) -> anyhow::Result<()> {
    let mut payloads = Vec::with_capacity(files.len());
    for path in files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        payloads.push((name, data));
    }

    tracing::info!(session_id = %session.session_id(), "waiting for the receiving peer");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("SIGINT received, shutting down");
                return Ok(());
            }
            _ = disconnected.cancelled() => bail!("signaling connection lost"),
            event = events.recv() => match event {
                Some(SessionEvent::PeerJoined { .. } | SessionEvent::Signal { .. }) => break,
                Some(_) => {}
                None => bail!("session event stream ended"),
            },
        }
    }

    let mut outstanding = HashMap::new();
    for (name, data) in payloads {
        let size = data.len();
        let file_id = session.send_file(name.clone(), data)?;
        tracing::info!(%file_id, %name, size, "sending");
        outstanding.insert(file_id, name);
    }

    let speed = SpeedCalculator::new(None, None);
    let mut last_done: HashMap<String, u32> = HashMap::new();

    while !outstanding.is_empty() {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("SIGINT received, shutting down");
                return Ok(());
            }
            _ = disconnected.cancelled() => bail!("signaling connection lost"),
            event = events.recv() => match event {
                Some(SessionEvent::Progress(progress)) => {
                    report_progress(&speed, &mut last_done, &progress);
                }
                Some(SessionEvent::SendCompleted { file_id }) => {
                    if let Some(name) = outstanding.remove(&file_id) {
                        tracing::info!(%file_id, %name, "sent");
                    }
                }
                Some(SessionEvent::DirectOpened) => tracing::info!("direct channel open"),
                Some(SessionEvent::DirectClosed) => tracing::info!("direct channel closed"),
                Some(_) => {}
                None => bail!("session event stream ended"),
            },
        }
    }

    tracing::info!("all files sent");
    Ok(())
}

/// Writes every verified file into `download_dir` until `count` files have
/// finished (or forever when `count` is `None`).
async fn receive_files(
    session: &Session,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    download_dir: &Path,
    count: Option<usize>,
    disconnected: &CancellationToken,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(download_dir)
        .await
        .with_context(|| format!("creating {}", download_dir.display()))?;
    tracing::info!(dir = %download_dir.display(), "waiting for files");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let speed = SpeedCalculator::new(None, None);
    let mut last_done: HashMap<String, u32> = HashMap::new();
    let mut finished = 0usize;

    while count.is_none_or(|n| finished < n) {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = disconnected.cancelled() => bail!("signaling connection lost"),
            event = events.recv() => match event {
                Some(SessionEvent::PeerJoined { socket_id }) => {
                    // Lets a sender that started after us know we are here.
                    tracing::debug!(%socket_id, "announcing presence to new peer");
                    session.send_signal(serde_json::json!({ "type": "peer-ready" }))?;
                }
                Some(SessionEvent::Incoming { meta }) => {
                    tracing::info!(file_id = %meta.file_id, name = %meta.name, size = meta.size, "receiving");
                }
                Some(SessionEvent::Progress(progress)) => {
                    report_progress(&speed, &mut last_done, &progress);
                }
                Some(SessionEvent::FileReceived { file_id, name, data }) => {
                    let path = write_received(download_dir, &file_id, &name, &data).await?;
                    tracing::info!(%file_id, path = %path.display(), bytes = data.len(), "saved");
                    finished += 1;
                }
                Some(SessionEvent::ChecksumMismatch { file_id, .. }) => {
                    tracing::error!(%file_id, "file discarded: integrity check failed");
                    finished += 1;
                }
                Some(_) => {}
                None => bail!("session event stream ended"),
            },
        }
    }
    Ok(())
}

fn report_progress(
    speed: &SpeedCalculator,
    last_done: &mut HashMap<String, u32>,
    progress: &TransferProgress,
) {
    let previous = last_done.insert(progress.file_id.clone(), progress.done).unwrap_or(0);
    let new_chunks = progress.done.saturating_sub(previous);
    speed.add_sample(u64::from(new_chunks) * CHUNK_SIZE as u64);

    // One line per ten percent keeps the log readable for large files.
    let step = (progress.total / 10).max(1);
    if progress.done % step == 0 || progress.done == progress.total {
        tracing::info!(
            file_id = %progress.file_id,
            percent = progress.percent(),
            rate = %format_rate(speed.bytes_per_second()),
            "progress"
        );
    }
}

/// Writes `data` under a sanitized version of `name`, never replacing an
/// existing file.
async fn write_received(
    dir: &Path,
    file_id: &str,
    name: &str,
    data: &[u8],
) -> anyhow::Result<PathBuf> {
    let safe = sanitize_file_name(name).unwrap_or_else(|e| {
        tracing::warn!(%file_id, error = %e, "unusable file name, using the file id");
        file_id.to_string()
    });
    let path = unique_path(dir, &safe);
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// `dir/name`, or `dir/stem (n).ext` for the first free `n` when taken.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
