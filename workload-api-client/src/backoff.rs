// Copyright (c) Microsoft. All rights reserved.

use std::time::Duration;

/// Reconnect timing for streaming watches: exponential growth from
/// `initial_delay` up to `max_delay`, with an optional attempt cap.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_retries: None,
        }
    }
}

/// Tracks the delay/attempt state of one watch. Advanced by the stream
/// loop on every resubscribe, reset on every successful update.
pub struct RetryHandler {
    config: BackoffConfig,
    delay: Duration,
    retry_count: u32,
}

impl RetryHandler {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        let delay = config.initial_delay;
        RetryHandler {
            config,
            delay,
            retry_count: 0,
        }
    }

    /// The delay to wait before the next attempt, advancing the state, or
    /// `None` once the configured retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_retries) = self.config.max_retries {
            if self.retry_count >= max_retries {
                return None;
            }
        }

        let current = self.delay;
        self.delay = std::cmp::min(
            self.delay.mul_f64(self.config.backoff_multiplier),
            self.config.max_delay,
        );
        self.retry_count += 1;
        Some(current)
    }

    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
        self.retry_count = 0;
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}
