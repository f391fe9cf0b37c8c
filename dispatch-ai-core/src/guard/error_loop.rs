use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::schema::ErrorGuardConfig;

#[derive(Debug, Clone, Copy)]
struct ErrorCounter {
    count: u32,
    last_error: Instant,
}

/// Counts repeated failures per (actor, command) and reports when a pair is looping.
#[derive(Debug)]
pub struct ErrorLoopGuard {
    counters: Mutex<HashMap<(String, String), ErrorCounter>>,
    config: ErrorGuardConfig,
}

impl ErrorLoopGuard {
    pub fn new(config: ErrorGuardConfig) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), ErrorCounter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.reset_window_secs)
    }

    /// Records one failure and returns `true` once the pair reached the lockout threshold.
    pub fn check_and_record(&self, actor: &str, command: &str) -> bool {
        self.check_and_record_at(actor, command, Instant::now())
    }

    fn check_and_record_at(&self, actor: &str, command: &str, now: Instant) -> bool {
        let window = self.window();
        let mut counters = self.lock();
        let counter = counters
            .entry((actor.to_owned(), command.to_owned()))
            .or_insert(ErrorCounter {
                count: 0,
                last_error: now,
            });

        if counter.count == 0 || now.saturating_duration_since(counter.last_error) > window {
            counter.count = 1;
        } else {
            counter.count = counter.count.saturating_add(1);
        }
        counter.last_error = now;

        let looping = counter.count >= self.config.lockout_threshold;
        if looping {
            tracing::warn!(
                actor,
                command,
                count = counter.count,
                "repeated failures detected"
            );
        }
        looping
    }

    /// Whether the pair has a failure recorded inside the reset window.
    pub fn has_streak(&self, actor: &str, command: &str) -> bool {
        self.has_streak_at(actor, command, Instant::now())
    }

    fn has_streak_at(&self, actor: &str, command: &str, now: Instant) -> bool {
        let window = self.window();
        self.lock()
            .get(&(actor.to_owned(), command.to_owned()))
            .is_some_and(|counter| now.saturating_duration_since(counter.last_error) <= window)
    }

    pub fn clear(&self, actor: &str, command: &str) {
        self.lock().remove(&(actor.to_owned(), command.to_owned()));
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let window = self.window();
        let mut counters = self.lock();
        let before = counters.len();
        counters.retain(|_, counter| now.saturating_duration_since(counter.last_error) <= window);
        before - counters.len()
    }
}
