use std::collections::{HashSet, VecDeque};

/// FIFO crawl frontier that never yields the same URL twice.
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    queue: VecDeque<String>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frontier seeded with the start URL.
    pub fn seeded(start: impl Into<String>) -> Self {
        let mut frontier = Self::new();
        frontier.push(start);
        frontier
    }

    /// Queue `url` unless it was queued before. Returns whether it was added.
    pub fn push(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    /// Queue every unseen URL, preserving order. Returns how many were added.
    pub fn extend<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for url in urls {
            if self.push(url) {
                added += 1;
            }
        }
        added
    }

    /// Put a URL back at the head of the queue (retry after re-authentication).
    pub fn requeue_front(&mut self, url: String) {
        self.seen.insert(url.clone());
        self.queue.push_front(url);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs ever queued.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
