//! Worker process: one HTTP front plus one Scheduler
//!
//! Every worker binds the same address with `SO_REUSEPORT`, so the kernel
//! spreads incoming connections across the pool. Rate state is local to each
//! worker.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, info};

use crate::config::Config;
use crate::executor::CompletionLog;
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::server::make_router;

const LISTEN_BACKLOG: u32 = 1024;

/// Bind `addr` so that sibling workers can bind it too
pub fn bind_shared(addr: SocketAddr) -> Result<TcpListener> {
    debug!(%addr, "bind_shared: called");
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .context("Failed to create socket")?;

    socket.set_reuseaddr(true).context("Failed to set SO_REUSEADDR")?;
    #[cfg(unix)]
    socket.set_reuseport(true).context("Failed to set SO_REUSEPORT")?;

    socket
        .bind(addr)
        .with_context(|| format!("Failed to bind {}", addr))?;
    socket.listen(LISTEN_BACKLOG).context("Failed to listen")
}

/// Serve task submissions on `listener` until `shutdown` resolves
///
/// Returns the Scheduler's final counters. Tasks still queued at that point
/// are dropped.
pub async fn serve<F>(listener: TcpListener, config: &Config, shutdown: F) -> Result<SchedulerStats>
where
    F: Future<Output = ()> + Send + 'static,
{
    let executor = Arc::new(CompletionLog::new(&config.completion.log_path));
    let scheduler = Scheduler::new(&config.limits, executor);
    let handle = scheduler.handle();
    let scheduler_task = tokio::spawn(scheduler.run());

    let port = listener.local_addr().context("Failed to read local address")?.port();
    info!("Worker {} started on port {}", std::process::id(), port);

    let served = axum::serve(listener, make_router(handle.clone()))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed");

    // Stop the scheduler even when the server failed
    handle.shutdown().await?;
    let stats = scheduler_task.await.context("Scheduler task panicked")?;
    served?;

    info!(?stats, "Worker {} stopped", std::process::id());
    Ok(stats)
}

/// Entry point for `tg worker --slot N`
pub async fn run_worker<F>(config: &Config, slot: usize, shutdown: F) -> Result<SchedulerStats>
where
    F: Future<Output = ()> + Send + 'static,
{
    debug!(slot, "run_worker: called");
    let addr = config.server.socket_addr()?;
    let listener = bind_shared(addr)?;
    serve(listener, config, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::TASK_PATH;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.completion.log_path = dir.path().join("task_logs.txt");
        config
    }

    async fn post_raw(addr: SocketAddr, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            TASK_PATH,
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_bind_shared_allows_second_bind() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let first = bind_shared("127.0.0.1:0".parse().unwrap()).unwrap();
            let addr = first.local_addr().unwrap();
            let second = bind_shared(addr);
            #[cfg(unix)]
            assert!(second.is_ok());
            #[cfg(not(unix))]
            let _ = second;
        });
    }

    #[tokio::test]
    async fn test_serve_accepts_and_records_completion() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let listener = bind_shared(config.server.socket_addr().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server_config = config.clone();
        let server = tokio::spawn(async move {
            serve(listener, &server_config, async move {
                let _ = stop_rx.await;
            })
            .await
        });

        let response = post_raw(addr, r#"{"user_id":"alice"}"#).await;
        assert!(response.starts_with("HTTP/1.1 202"), "{}", response);
        assert!(response.contains("Task accepted and queued for processing"));

        let response = post_raw(addr, r#"{"user_id":""}"#).await;
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);

        // The first task runs immediately; give the append a moment to land
        let log = CompletionLog::new(&config.completion.log_path);
        let mut lines = Vec::new();
        for _ in 0..200 {
            lines = log.tail(10, None).unwrap();
            if !lines.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("alice - task completed at - "));

        stop_tx.send(()).unwrap();
        let stats = server.await.unwrap().unwrap();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.executed, 1);
    }

    #[tokio::test]
    async fn test_run_worker_rejects_bad_host() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.server.host = "not-an-ip".to_string();
        let result = run_worker(&config, 0, std::future::pending()).await;
        assert!(result.is_err());
    }
}
