use std::collections::HashMap;

use crate::domain::{LeagueRound, NIL_ROUND_ID};

#[derive(Debug, Clone, Default)]
pub struct RoundIndex {
    no_by_id: HashMap<String, i64>,
    id_by_no: HashMap<i64, String>,
    prev_by_id: HashMap<String, String>,
}

impl RoundIndex {
    pub fn from_rounds(rounds: &[LeagueRound]) -> Self {
        let mut no_by_id = HashMap::with_capacity(rounds.len());
        let mut id_by_no = HashMap::with_capacity(rounds.len());
        for round in rounds {
            no_by_id.insert(round.id.clone(), round.round);
            id_by_no.insert(round.round, round.id.clone());
        }

        let prev_by_id = no_by_id
            .iter()
            .map(|(id, no)| {
                let prev = id_by_no
                    .get(&(no - 1))
                    .cloned()
                    .unwrap_or_else(|| NIL_ROUND_ID.to_string());
                (id.clone(), prev)
            })
            .collect();

        Self {
            no_by_id,
            id_by_no,
            prev_by_id,
        }
    }

    pub fn round_no(&self, round_id: &str) -> Option<i64> {
        self.no_by_id.get(round_id).copied()
    }

    pub fn round_id(&self, round_no: i64) -> Option<&str> {
        self.id_by_no.get(&round_no).map(String::as_str)
    }

    pub fn prev_round_id(&self, round_id: &str) -> Option<&str> {
        self.prev_by_id.get(round_id).map(String::as_str)
    }

    pub fn prev_round_or_self<'a>(&'a self, round_id: &'a str) -> &'a str {
        self.prev_round_id(round_id).unwrap_or(round_id)
    }

    pub fn is_empty(&self) -> bool {
        self.no_by_id.is_empty()
    }
}
