//! Readiness probing for upstream dependencies.
//!
//! Roles are scheduled in no particular order, so every consumer waits for
//! its upstreams itself instead of assuming startup ordering. A probe is one
//! lightweight TCP connect per retry interval against a declared
//! (host, port) pair; the retry budget is always finite.

use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{BootError, BootResult};
use crate::retry::{retry, RetryPolicy};

/// An upstream service the current role must observe as reachable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependency {
    /// Logical service name, for logs and `--explain`
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Dependency {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

/// Blocks until `dep` accepts a TCP connection, or the attempt budget runs out.
///
/// Each attempt is bounded by `connect_timeout`; refused connections fail
/// immediately. Returns [`BootError::DependencyTimeout`] on exhaustion.
pub async fn wait_for_port(
    dep: &Dependency,
    policy: &RetryPolicy,
    connect_timeout: Duration,
) -> BootResult<()> {
    let max_attempts = policy.max_attempts.max(1);

    let result = retry(policy, &dep.name, |attempt| async move {
        info!(
            dependency = %dep.name,
            host = %dep.host,
            port = dep.port,
            attempt,
            max_attempts,
            "probing dependency"
        );

        match timeout(connect_timeout, TcpStream::connect((dep.host.as_str(), dep.port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {connect_timeout:?}"),
            )),
        }
    })
    .await;

    match result {
        Ok(()) => {
            info!(dependency = %dep.name, host = %dep.host, port = dep.port, "dependency reachable");
            Ok(())
        }
        Err(e) => {
            debug!(dependency = %dep.name, error = %e, "last probe error");
            Err(BootError::DependencyTimeout {
                name: dep.name.clone(),
                host: dep.host.clone(),
                port: dep.port,
                attempts: max_attempts,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    fn fast_policy(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(delay_ms))
    }

    #[tokio::test]
    async fn test_reachable_port_succeeds_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local_addr").port();
        let dep = Dependency::new("test-service", "127.0.0.1", port);

        let start = Instant::now();
        let result = wait_for_port(&dep, &fast_policy(3, 500), Duration::from_secs(1)).await;

        assert!(result.is_ok());
        // First attempt connects, no retry delay should have elapsed
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_unreachable_port_times_out_after_max_attempts() {
        // Bind then drop to get a port that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local_addr").port();
        drop(listener);

        let dep = Dependency::new("gone-service", "127.0.0.1", port);
        let start = Instant::now();
        let result = wait_for_port(&dep, &fast_policy(5, 30), Duration::from_secs(1)).await;

        match result {
            Err(BootError::DependencyTimeout { attempts, name, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(name, "gone-service");
            }
            other => panic!("expected DependencyTimeout, got {other:?}"),
        }

        // 4 inter-attempt delays of 30ms; connects to a closed local port are refused instantly
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(120), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_port_becoming_reachable_mid_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        drop(listener);

        // Re-bind the reserved port after a few failed attempts' worth of time
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = TcpListener::bind(addr).await.expect("rebind");
            // Hold the listener long enough for the probe to connect
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        let dep = Dependency::new("slow-service", "127.0.0.1", addr.port());
        let result = wait_for_port(&dep, &fast_policy(20, 50), Duration::from_secs(1)).await;

        assert!(result.is_ok(), "probe should succeed once the port is bound");
    }
}
