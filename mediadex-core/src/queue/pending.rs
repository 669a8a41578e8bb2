use std::collections::{BTreeMap, HashMap};

use mediadex_model::DocumentDescriptor;

/// Ordered, path-unique queue of documents waiting to be scanned.
///
/// Documents keep their insertion position; removal is by path.
#[derive(Clone, Debug, Default)]
pub struct PendingQueue {
    next_seq: u64,
    entries: BTreeMap<u64, DocumentDescriptor>,
    positions: HashMap<String, u64>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a queue from its persisted form, dropping repeated paths.
    pub fn from_documents(documents: Vec<DocumentDescriptor>) -> Self {
        let mut queue = Self::new();
        for document in documents {
            queue.push(document);
        }
        queue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.positions.contains_key(path)
    }

    /// Appends `document`. A path already queued keeps its position and
    /// takes the newer descriptor; returns `false` in that case.
    pub fn push(&mut self, document: DocumentDescriptor) -> bool {
        if let Some(seq) = self.positions.get(&document.path) {
            if let Some(existing) = self.entries.get_mut(seq)
                && document.last_modified_at > existing.last_modified_at
            {
                *existing = document;
            }
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.positions.insert(document.path.clone(), seq);
        self.entries.insert(seq, document);
        true
    }

    pub fn remove(&mut self, path: &str) -> Option<DocumentDescriptor> {
        let seq = self.positions.remove(path)?;
        self.entries.remove(&seq)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentDescriptor> {
        self.entries.values()
    }

    /// Snapshot in queue order, as persisted.
    pub fn documents(&self) -> Vec<DocumentDescriptor> {
        self.entries.values().cloned().collect()
    }
}
