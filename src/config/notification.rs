use super::env_parse;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct NotificationConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_size: 256,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_parse("NOTIFY_WORKERS", defaults.workers).max(1),
            queue_size: env_parse("NOTIFY_QUEUE_SIZE", defaults.queue_size).max(1),
            max_attempts: env_parse("NOTIFY_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            initial_backoff: defaults.initial_backoff,
        }
    }
}
