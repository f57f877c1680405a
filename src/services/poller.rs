// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cancellable periodic tasks backing the live-sync loops.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A running periodic loop.
///
/// Each tick receives the loop's token; tick bodies check it right before
/// every remote call.
pub struct PollLoop {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollLoop {
    /// Spawn `tick` every `interval`, starting immediately.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // tokio rejects a zero period
        let interval = interval.max(MIN_PERIOD);
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if loop_token.is_cancelled() {
                    break;
                }
                tick(loop_token.clone()).await;
            }
            tracing::debug!(name, "Poll loop exited");
        });

        tracing::debug!(name, interval_ms = interval.as_millis() as u64, "Poll loop started");
        Self {
            name,
            token,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }

    /// Stop the loop. When this returns the loop task has ended, so it will
    /// issue no further calls.
    pub async fn stop(self) {
        self.token.cancel();
        self.handle.abort();
        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::warn!(name = self.name, error = %e, "Poll loop panicked"),
        }
    }
}

/// Stop every loop in `loops`.
pub async fn stop_all(loops: Vec<PollLoop>) {
    for poll_loop in loops {
        poll_loop.stop().await;
    }
}
