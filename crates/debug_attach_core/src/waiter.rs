use crate::ops::{env_port, locate, probe};
use crate::{AttachConfig, WaitOutcome};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Polls for a live debug agent, following the port the server actually bound.
///
/// Each waiter owns its tracked port and descriptor path; concurrent waits for
/// different servers share nothing.
#[derive(Debug, Clone)]
pub struct AttachWaiter {
    config: AttachConfig,
}

/// Whether the descriptor may be read this iteration.
///
/// A clean start (no descriptor when the wait began) trusts the file as soon as it
/// shows up. Otherwise the file may be left over from an earlier run, and only the
/// backup marker proves it was rewritten by the current one. Trust is never withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DescriptorTrust {
    clean_start: bool,
    trusted: bool,
}

impl DescriptorTrust {
    fn new(clean_start: bool) -> Self {
        Self {
            clean_start,
            trusted: false,
        }
    }

    fn update(&mut self, exists: bool, backup_exists: bool) -> bool {
        if !self.trusted {
            self.trusted = backup_exists || (self.clean_start && exists);
        }
        self.trusted
    }
}

impl AttachWaiter {
    pub fn new(config: AttachConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AttachConfig {
        &self.config
    }

    pub async fn wait(
        &self,
        cancel: &CancellationToken,
        initial_port: u16,
        server_dir_hint: &str,
    ) -> WaitOutcome {
        let host = self.config.host.as_str();
        let connect_timeout = self.config.connect_timeout;
        self.wait_with(cancel, initial_port, server_dir_hint, move |port| {
            probe::probe(host, port, connect_timeout)
        })
        .await
    }

    /// The polling loop, with the handshake supplied by the caller.
    ///
    /// The budget is spent one `poll_interval` per attempt no matter how long the
    /// handshake itself took.
    pub(crate) async fn wait_with<P, Fut>(
        &self,
        cancel: &CancellationToken,
        initial_port: u16,
        server_dir_hint: &str,
        mut handshake: P,
    ) -> WaitOutcome
    where
        P: FnMut(u16) -> Fut,
        Fut: Future<Output = bool>,
    {
        let host = self.config.host.as_str();
        let descriptor_path = locate::descriptor_path(server_dir_hint, &self.config);
        let max_attempts = self.config.max_attempts();

        let mut trust = match &descriptor_path {
            Some(path) => {
                let first = locate::observe(path, &self.config).await;
                DescriptorTrust::new(!first.exists_at_poll_start)
            }
            None => DescriptorTrust::new(true),
        };
        let mut tracked_port = initial_port;
        let mut elapsed = Duration::ZERO;

        tracing::info!(
            "Waiting for debug agent on {}:{} (clean start: {}, {} attempts every {:?})",
            host,
            tracked_port,
            trust.clean_start,
            max_attempts,
            self.config.poll_interval
        );

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                tracing::info!("Debugger attach cancelled after {:?}", elapsed);
                return WaitOutcome::Cancelled;
            }

            if let Some(path) = &descriptor_path {
                if let Some(port) = self.authoritative_port(path, &mut trust).await {
                    if port != tracked_port {
                        tracing::info!(
                            "Server reports debug port {} instead of {}",
                            port,
                            tracked_port
                        );
                        tracked_port = port;
                    }
                }
            }

            if handshake(tracked_port).await {
                tracing::info!("Debug agent accepted handshake on {}:{}", host, tracked_port);
                return WaitOutcome::Attached { port: tracked_port };
            }

            tracing::trace!(
                "Attempt {}/{} on {}:{} failed",
                attempt,
                max_attempts,
                host,
                tracked_port
            );

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            elapsed += self.config.poll_interval;
        }

        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }

        tracing::warn!(
            "Timed out after {:?} waiting for debug agent on {}:{}",
            elapsed,
            host,
            tracked_port
        );
        WaitOutcome::TimedOut {
            last_tried_port: tracked_port,
        }
    }

    async fn authoritative_port(&self, path: &Path, trust: &mut DescriptorTrust) -> Option<u16> {
        let seen = locate::observe(path, &self.config).await;
        if !trust.update(seen.exists_at_poll_start, seen.backup_exists) {
            tracing::trace!(
                "Not trusting {} yet (exists: {}, backup: {})",
                path.display(),
                seen.exists_at_poll_start,
                seen.backup_exists
            );
            return None;
        }
        env_port::read_last_port(path, &self.config.debug_port_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::port::allocate_ephemeral_port;
    use tokio::net::TcpListener;

    fn fast_config(timeout: Duration) -> AttachConfig {
        AttachConfig::default()
            .with_host("127.0.0.1")
            .with_poll_interval(Duration::from_millis(50))
            .with_timeout(timeout)
            .with_connect_timeout(Duration::from_millis(500))
    }

    #[test]
    fn test_clean_start_trusts_descriptor_once_it_exists() {
        let mut trust = DescriptorTrust::new(true);
        assert!(!trust.update(false, false));
        assert!(trust.update(true, false));
    }

    #[test]
    fn test_non_clean_start_waits_for_backup_marker() {
        let mut trust = DescriptorTrust::new(false);
        assert!(!trust.update(true, false));
        assert!(!trust.update(true, false));
        assert!(trust.update(true, true));
        // latched even if the marker goes away again
        assert!(trust.update(true, false));
    }

    #[tokio::test]
    async fn test_attaches_to_initial_port_without_descriptor() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiter = AttachWaiter::new(fast_config(Duration::from_secs(2)));

        let outcome = waiter.wait(&CancellationToken::new(), port, "").await;
        assert_eq!(outcome, WaitOutcome::Attached { port });
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_probes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiter = AttachWaiter::new(fast_config(Duration::from_secs(2)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = waiter.wait(&cancel, port, "").await;
        assert_eq!(outcome, WaitOutcome::Cancelled);

        let accepted = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "probe must not connect after cancellation");
    }

    #[tokio::test]
    async fn test_cancel_during_wait() {
        let port = allocate_ephemeral_port().unwrap();
        let waiter = AttachWaiter::new(
            fast_config(Duration::from_secs(60)).with_poll_interval(Duration::from_secs(1)),
        );
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let outcome = waiter.wait(&cancel, port, "").await;
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_budget_counts_attempts_not_wall_clock() {
        // each handshake outlasts the poll interval, so a wall-clock budget would stop early
        let poll = Duration::from_millis(20);
        let slow_handshake = Duration::from_millis(60);
        let timeout = Duration::from_millis(200);
        let waiter = AttachWaiter::new(fast_config(timeout).with_poll_interval(poll));
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));

        let counter = attempts.clone();
        let start = std::time::Instant::now();
        let outcome = waiter
            .wait_with(&CancellationToken::new(), 4321, "", move |_port| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    tokio::time::sleep(slow_handshake).await;
                    false
                }
            })
            .await;

        assert_eq!(outcome, WaitOutcome::TimedOut { last_tried_port: 4321 });
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 10);
        assert!(
            start.elapsed() >= (poll + slow_handshake) * 10,
            "every counted attempt must run: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_handshake_sees_reassigned_port() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.env"), "WLP_DEBUG_ADDRESS=9877\n").unwrap();
        std::fs::write(dir.path().join("server.env.bak"), "").unwrap();
        let waiter = AttachWaiter::new(fast_config(Duration::from_secs(1)));

        let outcome = waiter
            .wait_with(&CancellationToken::new(), 9876, dir.path().to_str().unwrap(), |port| {
                async move { port == 9877 }
            })
            .await;
        assert_eq!(outcome, WaitOutcome::Attached { port: 9877 });
    }

    #[tokio::test]
    async fn test_zero_budget_times_out_with_initial_port() {
        let waiter = AttachWaiter::new(fast_config(Duration::ZERO));
        let outcome = waiter.wait(&CancellationToken::new(), 4321, "").await;
        assert_eq!(outcome, WaitOutcome::TimedOut { last_tried_port: 4321 });
    }

    #[tokio::test]
    async fn test_pre_existing_descriptor_trusted_after_backup_marker() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_port = listener.local_addr().unwrap().port();
        let stale_port = allocate_ephemeral_port().unwrap();

        std::fs::write(
            dir.path().join("server.env"),
            format!("WLP_DEBUG_ADDRESS={stale_port}\n"),
        )
        .unwrap();

        let server_dir = dir.path().to_path_buf();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            std::fs::write(
                server_dir.join("server.env"),
                format!("WLP_DEBUG_ADDRESS={live_port}\n"),
            )
            .unwrap();
            std::fs::write(server_dir.join("server.env.bak"), "").unwrap();
        });

        let waiter = AttachWaiter::new(fast_config(Duration::from_secs(3)));
        let outcome = waiter
            .wait(&CancellationToken::new(), stale_port, dir.path().to_str().unwrap())
            .await;
        assert_eq!(outcome, WaitOutcome::Attached { port: live_port });
    }
}
