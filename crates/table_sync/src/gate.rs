use dashmap::DashMap;
use dom::NodeId;

/// Whether two form snapshots hold the same multiset of name/value pairs.
pub fn unchanged(prev: &[(String, String)], next: &[(String, String)]) -> bool {
    if prev.len() != next.len() {
        return false;
    }
    let mut prev_sorted: Vec<&(String, String)> = prev.iter().collect();
    let mut next_sorted: Vec<&(String, String)> = next.iter().collect();
    prev_sorted.sort_unstable();
    next_sorted.sort_unstable();
    prev_sorted == next_sorted
}

/// Last accepted snapshot per filter form.
#[derive(Default)]
pub struct ChangeGates {
    accepted: DashMap<NodeId, Vec<(String, String)>>,
}

impl ChangeGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the snapshot a form starts out with.
    pub fn prime(&self, form: NodeId, snapshot: Vec<(String, String)>) {
        self.accepted.insert(form, snapshot);
    }

    /// Accept `snapshot` if it differs from the last accepted one.
    ///
    /// Returns `false` when nothing changed; the stored snapshot is left as is.
    pub fn admit(&self, form: NodeId, snapshot: Vec<(String, String)>) -> bool {
        let mut entry = self.accepted.entry(form).or_default();
        if unchanged(entry.value(), &snapshot) {
            return false;
        }
        *entry.value_mut() = snapshot;
        true
    }
}
