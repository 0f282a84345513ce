use super::documents::DocumentId;

/// Ordered, duplicate-free set of open documents plus the active one.
///
/// Holds ids only; the handles themselves belong to the `DocumentCache`.
#[derive(Debug, Clone, Default)]
pub struct TabSet {
    tabs: Vec<DocumentId>,
    active: Option<DocumentId>,
}

impl TabSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[DocumentId] {
        &self.tabs
    }

    pub fn active(&self) -> Option<DocumentId> {
        self.active
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.tabs.contains(&id)
    }

    /// Append `id` unless already open. Returns true if the set changed.
    pub fn open(&mut self, id: DocumentId) -> bool {
        if self.tabs.contains(&id) {
            return false;
        }
        self.tabs.push(id);
        true
    }

    /// Close `id`, clearing the active pointer if it pointed there.
    pub fn close(&mut self, id: DocumentId) -> bool {
        if self.active == Some(id) {
            self.active = None;
        }
        let before = self.tabs.len();
        self.tabs.retain(|t| *t != id);
        self.tabs.len() != before
    }

    /// Swap `old` for `new` in place, carrying the active pointer along.
    pub fn replace(&mut self, old: DocumentId, new: DocumentId) -> bool {
        if self.active == Some(old) {
            self.active = Some(new);
        }
        match self.tabs.iter().position(|t| *t == old) {
            Some(idx) => {
                if self.tabs.contains(&new) {
                    self.tabs.remove(idx);
                } else {
                    self.tabs[idx] = new;
                }
                true
            }
            None => false,
        }
    }

    /// Make `id` active, opening it first if needed. Returns true if the tab list changed.
    pub fn activate(&mut self, id: DocumentId) -> bool {
        self.active = Some(id);
        self.open(id)
    }

    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Close everything. Returns true if anything was open.
    pub fn clear(&mut self) -> bool {
        self.active = None;
        let had_tabs = !self.tabs.is_empty();
        self.tabs.clear();
        had_tabs
    }
}
