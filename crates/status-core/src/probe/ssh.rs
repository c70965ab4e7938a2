use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::{duration_ms, CheckResult, CODE_ERROR};

/// Verify that `host:port` accepts a TCP connection within `timeout`.
///
/// No SSH handshake or authentication is attempted. Name resolution counts
/// against the timeout.
pub async fn check_ssh(host: &str, port: u16, timeout: Duration) -> CheckResult {
    let result = classify_connect(TcpStream::connect((host, port)), port, timeout).await;
    if result.is_ok() {
        debug!(host, port, "SSH port reachable");
    } else {
        warn!(host, port, code = result.code, message = %result.message, "SSH check failed");
    }
    result
}

async fn classify_connect<F, T>(connect: F, port: u16, timeout: Duration) -> CheckResult
where
    F: Future<Output = io::Result<T>>,
{
    let timeout_ms = duration_ms(timeout);
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_stream)) => CheckResult::ok("SSH OK"),
        Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => CheckResult::timeout(timeout_ms),
        Ok(Err(e)) => CheckResult::new(CODE_ERROR, format!("Port {} error: {}", port, e)),
        Err(_) => CheckResult::timeout(timeout_ms),
    }
}
