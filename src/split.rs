use tracing::{info, warn};

use crate::features::TrainingRecord;
use crate::round_index::RoundIndex;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDataset {
    pub train: Vec<TrainingRecord>,
    pub test: Vec<TrainingRecord>,
}

impl TrainingDataset {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.test.is_empty()
    }
}

/// Partitions records by round number rather than record count so no round
/// straddles the boundary.
pub fn split_by_round(
    records: Vec<TrainingRecord>,
    index: &RoundIndex,
    train_until_round_no: Option<i64>,
    train_ratio: f64,
) -> TrainingDataset {
    let total = records.len();
    let mut numbered = records
        .into_iter()
        .filter_map(|record| index.round_no(&record.prev_round_id).map(|no| (no, record)))
        .collect::<Vec<_>>();
    if numbered.len() < total {
        warn!(
            dropped = total - numbered.len(),
            "records with unknown round dropped from the split"
        );
    }
    if numbered.is_empty() {
        warn!("no records left to split");
        return TrainingDataset::default();
    }
    numbered.sort_by_key(|(no, _)| *no);

    let mut distinct = numbered.iter().map(|(no, _)| *no).collect::<Vec<_>>();
    distinct.dedup();

    let cutoff = match train_until_round_no {
        Some(cutoff) => cutoff,
        None => {
            let k = ((distinct.len() as f64 * train_ratio).floor() as usize)
                .max(1)
                .min(distinct.len());
            distinct[k - 1]
        }
    };

    let mut dataset = TrainingDataset::default();
    for (no, record) in numbered {
        if no <= cutoff {
            dataset.train.push(record);
        } else {
            dataset.test.push(record);
        }
    }

    if distinct.len() == 1 {
        warn!(round = distinct[0], "only one distinct round available; split is degenerate");
    }
    if dataset.test.is_empty() {
        warn!(cutoff, "every record landed in train; test set is empty");
    } else if dataset.train.is_empty() {
        warn!(cutoff, "every record landed in test; train set is empty");
    }
    info!(
        cutoff,
        train = dataset.train.len(),
        test = dataset.test.len(),
        "dataset split by round"
    );
    dataset
}
