use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::schema::ConversationCacheConfig;
use crate::conversation::transport::ChatTransport;
use crate::conversation::types::{ConversationId, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// Seeded from live events; not trustworthy as full history.
    Partial,
    /// Produced by a bulk fetch.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Partial,
    Stale,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    turns: Vec<Turn>,
    last_refresh: Instant,
    completeness: Completeness,
}

impl CacheEntry {
    fn state(&self, now: Instant, ttl: Duration) -> EntryState {
        match self.completeness {
            Completeness::Partial => EntryState::Partial,
            Completeness::Full if now.saturating_duration_since(self.last_refresh) > ttl => {
                EntryState::Stale
            }
            Completeness::Full => EntryState::Fresh,
        }
    }
}

type PendingFetch = Shared<BoxFuture<'static, Vec<Turn>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<ConversationId, CacheEntry>,
    in_flight: HashMap<ConversationId, PendingFetch>,
}

struct Inner {
    state: Mutex<CacheState>,
    transport: Arc<dyn ChatTransport>,
    config: ConversationCacheConfig,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_secs)
    }

    fn store_full(&self, conversation_id: &str, mut turns: Vec<Turn>, now: Instant) -> Vec<Turn> {
        normalize(&mut turns, self.config.max_messages);
        let mut state = self.lock();
        if !state.entries.contains_key(conversation_id) {
            evict_if_full(&mut state.entries, self.config.max_conversations);
        }
        state.entries.insert(
            conversation_id.to_owned(),
            CacheEntry {
                turns: turns.clone(),
                last_refresh: now,
                completeness: Completeness::Full,
            },
        );
        turns
    }
}

/// Removes the in-flight marker when the fetch finishes or is abandoned.
struct InFlightToken {
    inner: Arc<Inner>,
    conversation_id: ConversationId,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.inner.lock().in_flight.remove(&self.conversation_id);
    }
}

/// Per-conversation cache of recent turns with TTL, bounded size and fetch dedup.
#[derive(Clone)]
pub struct ConversationCache {
    inner: Arc<Inner>,
}

impl ConversationCache {
    pub fn new(transport: Arc<dyn ChatTransport>, config: ConversationCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                transport,
                config,
            }),
        }
    }

    /// Newest `max_messages` turns, oldest first.
    ///
    /// A failed fetch yields an empty list; callers treat missing context as normal.
    pub async fn get(&self, conversation_id: &str, max_messages: usize) -> Vec<Turn> {
        let pending = {
            let mut state = self.inner.lock();
            if let Some(entry) = state.entries.get(conversation_id) {
                if entry.state(Instant::now(), self.inner.ttl()) == EntryState::Fresh {
                    return tail(&entry.turns, max_messages);
                }
            }

            match state.in_flight.get(conversation_id) {
                Some(pending) => {
                    tracing::debug!(conversation_id, "joining in-flight history fetch");
                    pending.clone()
                }
                None => {
                    let pending = Self::start_fetch(self.inner.clone(), conversation_id.to_owned());
                    state
                        .in_flight
                        .insert(conversation_id.to_owned(), pending.clone());
                    pending
                }
            }
        };

        let turns = pending.await;
        tail(&turns, max_messages)
    }

    fn start_fetch(inner: Arc<Inner>, conversation_id: ConversationId) -> PendingFetch {
        async move {
            let _token = InFlightToken {
                inner: inner.clone(),
                conversation_id: conversation_id.clone(),
            };
            let timeout = Duration::from_secs(inner.config.fetch_timeout_secs.max(1));
            let fetched = tokio::time::timeout(
                timeout,
                inner
                    .transport
                    .fetch_history(&conversation_id, inner.config.max_messages),
            )
            .await;

            match fetched {
                Ok(Ok(turns)) => {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        turns = turns.len(),
                        "refreshed conversation history"
                    );
                    inner.store_full(&conversation_id, turns, Instant::now())
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %err,
                        "history fetch failed; continuing without context"
                    );
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        timeout_secs = timeout.as_secs(),
                        "history fetch timed out; continuing without context"
                    );
                    Vec::new()
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Inserts or replaces one turn by id, keeping the entry's completeness.
    pub fn upsert(&self, conversation_id: &str, turn: Turn) {
        self.upsert_at(conversation_id, turn, Instant::now());
    }

    fn upsert_at(&self, conversation_id: &str, turn: Turn, now: Instant) {
        let mut state = self.inner.lock();
        if !state.entries.contains_key(conversation_id) {
            evict_if_full(&mut state.entries, self.inner.config.max_conversations);
        }

        let entry = state
            .entries
            .entry(conversation_id.to_owned())
            .or_insert_with(|| CacheEntry {
                turns: Vec::new(),
                last_refresh: now,
                completeness: Completeness::Partial,
            });

        match entry.turns.iter_mut().find(|existing| existing.id == turn.id) {
            Some(existing) => *existing = turn,
            None => entry.turns.push(turn),
        }
        normalize(&mut entry.turns, self.inner.config.max_messages);
    }

    pub fn invalidate(&self, conversation_id: &str) {
        if self.inner.lock().entries.remove(conversation_id).is_some() {
            tracing::debug!(conversation_id, "invalidated conversation cache entry");
        }
    }

    pub fn state(&self, conversation_id: &str) -> Option<EntryState> {
        self.state_at(conversation_id, Instant::now())
    }

    fn state_at(&self, conversation_id: &str, now: Instant) -> Option<EntryState> {
        self.inner
            .lock()
            .entries
            .get(conversation_id)
            .map(|entry| entry.state(now, self.inner.ttl()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(turns: &mut Vec<Turn>, limit: usize) {
    turns.sort_by_key(|turn| turn.timestamp);
    if turns.len() > limit {
        turns.drain(..turns.len() - limit);
    }
}

fn tail(turns: &[Turn], max_messages: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(max_messages);
    turns[start..].to_vec()
}

fn evict_if_full(entries: &mut HashMap<ConversationId, CacheEntry>, max_conversations: usize) {
    while entries.len() >= max_conversations.max(1) {
        let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_refresh)
            .map(|(id, _)| id.clone())
        else {
            return;
        };
        entries.remove(&oldest);
        tracing::debug!(conversation_id = %oldest, "evicted least recently refreshed conversation");
    }
}
