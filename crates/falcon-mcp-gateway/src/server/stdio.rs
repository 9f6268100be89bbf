//! stdio transport
//!
//! The pipe is one connection, so the whole conversation is one session
//! held by the rmcp service for as long as the pipe stays open.

use anyhow::Context as _;
use rmcp::service::serve_server_with_ct;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::mcp::FalconMcpHandler;

pub(crate) async fn serve<R, W>(
    handler: FalconMcpHandler,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    info!("[Server] Serving MCP over stdio");

    let service = serve_server_with_ct(handler, (reader, writer), shutdown)
        .await
        .context("MCP handshake over stdio failed")?;

    let reason = service
        .waiting()
        .await
        .context("stdio service task failed")?;

    info!(reason = ?reason, "[Server] stdio session closed");
    Ok(())
}
