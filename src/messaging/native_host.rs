// Chrome native messaging transport: every message is a 4-byte native-endian
// length followed by that many bytes of UTF-8 JSON, in both directions.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::protocol::{Family, InboundMessage, OutboundFrame};
use super::router::MessageRouter;
use crate::core::auth::TokenProvider;
use crate::core::drive::DriveApi;
use crate::core::transfer::ArtifactFetcher;

pub const MAX_INBOUND_FRAME: usize = 4 * 1024 * 1024;
/// The browser refuses anything larger from a host.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Could not encode frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads one frame. `Ok(None)` means the extension closed the pipe.
///
/// An oversized frame is consumed and discarded so the stream stays in sync.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_ne_bytes(len_buf) as usize;
    if size > MAX_INBOUND_FRAME {
        let mut rest = (&mut *reader).take(size as u64);
        let discarded = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await?;
        if (discarded as usize) < size {
            return Ok(None);
        }
        return Err(FrameError::TooLarge {
            size,
            limit: MAX_INBOUND_FRAME,
        });
    }

    let mut payload = vec![0u8; size];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(Some(payload)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(frame)?;
    if payload.len() > MAX_OUTBOUND_FRAME {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            limit: MAX_OUTBOUND_FRAME,
        });
    }

    writer
        .write_all(&(payload.len() as u32).to_ne_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Runs the host until the extension closes stdin.
///
/// Each message is handled on its own task. Replies and broadcasts go through
/// one channel drained by a single writer, so frames never interleave. On EOF
/// the loop stops reading, lets in-flight handlers finish and flushes their
/// replies before returning.
pub async fn serve<R, W, T, D, F>(
    mut reader: R,
    writer: W,
    router: Arc<MessageRouter<T, D, F>>,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    T: TokenProvider + 'static,
    D: DriveApi + 'static,
    F: ArtifactFetcher + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(frame) = rx.recv().await {
            match write_frame(&mut writer, &frame).await {
                Ok(()) => {}
                Err(FrameError::TooLarge { size, limit }) => {
                    tracing::warn!(size, limit, "Dropping oversized reply");
                }
                Err(e) => {
                    tracing::error!("Could not write to the extension: {}", e);
                    break;
                }
            }
        }
    });

    let mut read_error = None;
    loop {
        let message = match read_frame(&mut reader).await {
            Ok(Some(bytes)) => InboundMessage::from_slice(&bytes),
            Ok(None) => {
                tracing::info!("Extension closed the connection");
                break;
            }
            Err(FrameError::TooLarge { size, limit }) => {
                tracing::warn!(size, limit, "Discarded oversized message");
                InboundMessage::invalid(
                    None,
                    Family::Panel,
                    format!("Message too large ({} bytes, limit {}).", size, limit),
                )
            }
            Err(e) => {
                tracing::error!("Could not read from the extension: {}", e);
                read_error = Some(e);
                break;
            }
        };

        let router = Arc::clone(&router);
        let tx = tx.clone();
        tokio::spawn(async move {
            let reply = router.handle(message, &tx).await;
            let _ = tx.send(reply);
        });
    }

    // The writer drains until every handler has dropped its sender.
    drop(tx);
    if let Err(e) = writer_task.await {
        tracing::error!("Writer task failed: {}", e);
    }

    match read_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
