use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Ids of messages this bridge wrote, kept so reflected copies (MUC echoes)
/// can be recognised and dropped.
#[derive(Debug)]
pub struct SentMessageLog {
    entries: HashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl SentMessageLog {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    pub fn record(&mut self, id: &str) {
        self.evict_expired();
        if self.entries.len() >= self.max_entries
            && !self.entries.contains_key(id)
            && let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
        self.entries.insert(id.to_string(), Instant::now());
    }

    pub fn contains(&mut self, id: &str) -> bool {
        self.evict_expired();
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let Some(cutoff) = Instant::now().checked_sub(self.ttl) else {
            return;
        };
        self.entries.retain(|_, at| *at > cutoff);
    }
}
