//! In-memory notification collection.

use std::collections::HashSet;

use pulse_protocol::NotificationRecord;

/// Deduplicated notification collection, most recent first.
///
/// Every mutation is a total macro-operation; callers never observe a
/// partially applied change.
#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    records: Vec<NotificationRecord>,
    ids: HashSet<String>,
    latest: Option<NotificationRecord>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection, keeping the supplied order.
    ///
    /// Duplicate ids keep their first occurrence. Clears `latest`.
    pub fn set_all(&mut self, records: Vec<NotificationRecord>) {
        self.records.clear();
        self.ids.clear();
        self.latest = None;

        for record in records {
            if self.ids.insert(record.id.clone()) {
                self.records.push(record);
            }
        }
    }

    /// Insert a record unless its id is already present.
    ///
    /// The record lands before the first entry that is not newer than it
    /// and becomes `latest`. Returns whether it was inserted.
    pub fn add_one(&mut self, record: NotificationRecord) -> bool {
        if self.ids.contains(&record.id) {
            return false;
        }

        let position = self
            .records
            .iter()
            .position(|existing| existing.created_at <= record.created_at)
            .unwrap_or(self.records.len());

        self.ids.insert(record.id.clone());
        self.latest = Some(record.clone());
        self.records.insert(position, record);
        true
    }

    /// Mark one record read. Unknown or already-read ids are no-ops.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) if !record.read => {
                record.read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every record read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for record in self.records.iter_mut().filter(|r| !r.read) {
            record.read = true;
            changed += 1;
        }
        changed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.latest = None;
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.read).count()
    }

    /// Most recently inserted record since the last `set_all`/`clear`.
    pub fn latest(&self) -> Option<&NotificationRecord> {
        self.latest.as_ref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}
