use std::collections::HashMap;

use tracing::warn;

use crate::domain::StrengthSnapshot;

/// Snapshots keyed by `(team_id, round_id)`, newest first within a key.
#[derive(Debug, Clone, Default)]
pub struct StrengthMap {
    entries: HashMap<(String, String), Vec<StrengthSnapshot>>,
}

impl StrengthMap {
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = StrengthSnapshot>) -> Self {
        let mut entries: HashMap<(String, String), Vec<StrengthSnapshot>> = HashMap::new();
        for snapshot in snapshots {
            if snapshot.team_id.is_empty() {
                warn!(round_id = %snapshot.round_id, "skipping strength snapshot without team id");
                continue;
            }
            entries
                .entry((snapshot.team_id.clone(), snapshot.round_id.clone()))
                .or_default()
                .push(snapshot);
        }
        for bucket in entries.values_mut() {
            bucket.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        }
        Self { entries }
    }

    pub fn newest(&self, team_id: &str, round_id: &str) -> Option<&StrengthSnapshot> {
        self.entries
            .get(&(team_id.to_string(), round_id.to_string()))
            .and_then(|bucket| bucket.first())
    }

    pub fn with_snapshot(mut self, snapshot: StrengthSnapshot) -> Self {
        self.entries.insert(
            (snapshot.team_id.clone(), snapshot.round_id.clone()),
            vec![snapshot],
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshots(&self) -> Vec<StrengthSnapshot> {
        let mut keys = self.entries.keys().collect::<Vec<_>>();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| self.entries.get(key))
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }
}
