use tracing::debug;

use crate::domain::{self, MatchRound, Side, StrengthSnapshot};
use crate::error::{EngineError, Result};
use crate::round_index::RoundIndex;
use crate::strength_map::StrengthMap;

/// Finds the best available strength for one side of a match.
///
/// Resolution order: exact `(team, prev_round)` snapshot, the most recent
/// earlier-round snapshot carried forward, then a league-average baseline.
/// The posterior is always re-estimated last.
#[derive(Debug, Clone, Copy)]
pub struct StrengthResolver<'a> {
    index: &'a RoundIndex,
    league_id: &'a str,
    league_avg_strength: f64,
    games_to_reach_trust: i64,
}

impl<'a> StrengthResolver<'a> {
    pub fn new(
        index: &'a RoundIndex,
        league_id: &'a str,
        league_avg_strength: f64,
        games_to_reach_trust: i64,
    ) -> Result<Self> {
        if games_to_reach_trust <= 0 {
            return Err(EngineError::InvalidTrust(games_to_reach_trust));
        }
        Ok(Self {
            index,
            league_id,
            league_avg_strength,
            games_to_reach_trust,
        })
    }

    pub fn index(&self) -> &'a RoundIndex {
        self.index
    }

    pub fn resolve(
        &self,
        map: &StrengthMap,
        played: &MatchRound,
        side: Side,
        prev_round_id: &str,
    ) -> Result<StrengthSnapshot> {
        let team_id = played.team_id(side);
        if team_id.is_empty() {
            return Err(EngineError::MissingTeam {
                match_id: played.id.clone(),
                side: side.label(),
            });
        }

        if let Some(found) = map.newest(team_id, prev_round_id) {
            return found.with_posterior(self.games_to_reach_trust, self.league_avg_strength);
        }

        let stamp = domain::now();
        let seeded = match self.carry_forward(map, team_id, prev_round_id) {
            Some(found) => {
                debug!(team_id, from_round = %found.round_id, to_round = prev_round_id, "carrying strength forward");
                found.with_round_meta(prev_round_id, stamp)
            }
            None => {
                debug!(team_id, round_id = prev_round_id, "no strength history; using league baseline");
                StrengthSnapshot::baseline(
                    team_id,
                    prev_round_id,
                    self.league_id,
                    self.league_avg_strength,
                    stamp,
                )
            }
        };

        let seeded = if played.is_completed() {
            seeded.with_incremented_stats(played, side)?.with_likelihood()?
        } else {
            seeded
        };
        seeded.with_posterior(self.games_to_reach_trust, self.league_avg_strength)
    }

    pub fn apply_outcome(
        &self,
        snapshot: &StrengthSnapshot,
        played: &MatchRound,
        side: Side,
    ) -> Result<StrengthSnapshot> {
        Ok(snapshot
            .with_incremented_stats(played, side)?
            .with_likelihood()?
            .with_posterior(self.games_to_reach_trust, self.league_avg_strength)?
            .with_round_meta(&played.round_id, domain::now()))
    }

    fn carry_forward<'m>(
        &self,
        map: &'m StrengthMap,
        team_id: &str,
        prev_round_id: &str,
    ) -> Option<&'m StrengthSnapshot> {
        let prev_no = self.index.round_no(prev_round_id)?;
        (0..prev_no)
            .rev()
            .filter_map(|no| self.index.round_id(no))
            .find_map(|round_id| map.newest(team_id, round_id))
    }
}
