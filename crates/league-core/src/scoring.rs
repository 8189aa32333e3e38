use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::LeagueError;
use crate::types::TeamId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("team {0} is not ranked in the observed standings")]
    UnrankedTeam(TeamId),

    #[error("ranking sets differ: prediction has {predicted} teams, observed has {observed}")]
    RankingSetMismatch { predicted: usize, observed: usize },
}

impl From<ScoringError> for LeagueError {
    fn from(e: ScoringError) -> Self {
        LeagueError::ValidationFailed(e.to_string())
    }
}

/// A predicted team with its 1-based predicted position and its distance
/// from the observed position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRanking {
    pub id: TeamId,
    pub position: u16,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredPrediction {
    pub rankings: Vec<ScoredRanking>,
    pub total: i64,
}

/// Score `prediction` against `observed`. Both are team ids in table order.
///
/// Each predicted team scores the absolute distance between its predicted
/// and observed positions. Output keeps the prediction's order.
pub fn score_prediction(
    prediction: &[TeamId],
    observed: &[TeamId],
) -> Result<ScoredPrediction, ScoringError> {
    let mismatch = || ScoringError::RankingSetMismatch {
        predicted: prediction.len(),
        observed: observed.len(),
    };

    if prediction.len() != observed.len() {
        return Err(mismatch());
    }

    let observed_pos: HashMap<&TeamId, usize> =
        observed.iter().enumerate().map(|(i, id)| (id, i)).collect();
    if observed_pos.len() != observed.len() {
        return Err(mismatch());
    }

    let mut seen = HashSet::with_capacity(prediction.len());
    let mut rankings = Vec::with_capacity(prediction.len());
    let mut total = 0i64;

    for (i, id) in prediction.iter().enumerate() {
        if !seen.insert(id) {
            return Err(mismatch());
        }
        let Some(&j) = observed_pos.get(id) else {
            return Err(ScoringError::UnrankedTeam(id.clone()));
        };
        let score = (i as i64 - j as i64).abs();
        total += score;
        rankings.push(ScoredRanking {
            id: id.clone(),
            position: (i + 1) as u16,
            score,
        });
    }

    Ok(ScoredPrediction { rankings, total })
}
