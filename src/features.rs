use tracing::warn;

use crate::domain::{MatchRound, Side, StrengthSnapshot};
use crate::strength::StrengthResolver;
use crate::strength_map::StrengthMap;

pub const FEATURE_COUNT: usize = 10;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_p_off",
    "home_p_def",
    "home_l_off",
    "home_l_def",
    "away_p_off",
    "away_p_def",
    "away_l_off",
    "away_l_def",
    "diff_post_off",
    "diff_post_def",
];

pub fn feature_schema() -> Vec<String> {
    FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    cells: Vec<(String, f64)>,
}

impl FeatureRow {
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Self {
        let mut row = Self::default();
        for (name, value) in pairs {
            row.set(name, value);
        }
        row
    }

    pub fn set<S: Into<String>>(&mut self, name: S, value: f64) {
        let name = name.into();
        match self.cells.iter_mut().find(|(existing, _)| *existing == name) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.cells
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn conform(&self, schema: &[String]) -> Vec<f64> {
        schema
            .iter()
            .map(|column| self.get(column).unwrap_or(0.0))
            .collect()
    }
}

pub fn feature_row(home: &StrengthSnapshot, away: &StrengthSnapshot) -> FeatureRow {
    let values = [
        home.posterior.offensive,
        home.posterior.defensive,
        home.likelihood.offensive,
        home.likelihood.defensive,
        away.posterior.offensive,
        away.posterior.defensive,
        away.likelihood.offensive,
        away.likelihood.defensive,
        home.posterior.offensive - away.posterior.offensive,
        home.posterior.defensive - away.posterior.defensive,
    ];
    FeatureRow::from_pairs(FEATURE_NAMES.into_iter().zip(values))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRecord {
    pub x_row: FeatureRow,
    pub y_home: u32,
    pub y_away: u32,
    pub prev_round_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn from_rows<'r>(rows: impl IntoIterator<Item = &'r FeatureRow>) -> Self {
        let rows = rows.into_iter().collect::<Vec<_>>();
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for name in row.names() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.to_string());
                }
            }
        }
        let dense = rows.iter().map(|row| row.conform(&columns)).collect();
        Self {
            columns,
            rows: dense,
        }
    }

    pub fn from_records(records: &[TrainingRecord]) -> Self {
        Self::from_rows(records.iter().map(|r| &r.x_row))
    }

    pub fn conform(&self, schema: &[String]) -> Self {
        let positions = schema
            .iter()
            .map(|column| self.columns.iter().position(|c| c == column))
            .collect::<Vec<_>>();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|pos| pos.and_then(|idx| row.get(idx).copied()).unwrap_or(0.0))
                    .collect()
            })
            .collect();
        Self {
            columns: schema.to_vec(),
            rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn build_training_records(
    matches: &[MatchRound],
    map: &StrengthMap,
    resolver: &StrengthResolver<'_>,
) -> Vec<TrainingRecord> {
    let index = resolver.index();
    let mut out = Vec::new();
    for played in matches.iter().filter(|m| m.is_played) {
        let Some((y_home, y_away)) = played.score() else {
            warn!(match_id = %played.id, "played match without a score; skipping");
            continue;
        };
        let prev_round_id = index.prev_round_or_self(&played.round_id);

        let home = match resolver.resolve(map, played, Side::Home, prev_round_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(match_id = %played.id, error = %err, "home strength unresolved; skipping record");
                continue;
            }
        };
        let away = match resolver.resolve(map, played, Side::Away, prev_round_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(match_id = %played.id, error = %err, "away strength unresolved; skipping record");
                continue;
            }
        };

        out.push(TrainingRecord {
            x_row: feature_row(&home, &away),
            y_home,
            y_away,
            prev_round_id: prev_round_id.to_string(),
        });
    }
    out
}
