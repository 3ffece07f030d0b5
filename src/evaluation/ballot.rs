use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

use crate::prompt::ModelResponse;

use super::error::EvaluationError;
use super::types::{candidates, EvaluationMode, EvaluationResult, EvaluationScore};

pub const DEFAULT_BALLOT_TTL_HOURS: i64 = 24;

/// An anonymised response shown to voters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BallotOption {
    pub index: usize,
    pub text: String,
}

/// What a voter sees: no model ids, options in shuffled order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BallotView {
    pub ballot_id: Uuid,
    pub prompt: String,
    pub options: Vec<BallotOption>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Ballot {
    /// Model ids in candidate order.
    model_ids: Vec<String>,
    /// `option_models[i]` is the model behind option `i`.
    option_models: Vec<String>,
    expires_at: DateTime<Utc>,
}

/// Pending human-vote ballots, kept in memory until voted on or expired.
#[derive(Debug)]
pub struct BallotBox {
    ballots: Mutex<HashMap<Uuid, Ballot>>,
    ttl: Duration,
}

impl Default for BallotBox {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_BALLOT_TTL_HOURS))
    }
}

impl BallotBox {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ballots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Opens a ballot over the scorable responses.
    pub fn create_ballot(
        &self,
        prompt: &str,
        responses: &[ModelResponse],
    ) -> Result<BallotView, EvaluationError> {
        let scorable = candidates(responses);
        if scorable.is_empty() {
            return Err(EvaluationError::NoResponses);
        }

        let mut shuffled = scorable.clone();
        shuffled.shuffle(&mut rand::thread_rng());

        let ballot_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let view = BallotView {
            ballot_id,
            prompt: prompt.to_string(),
            options: shuffled
                .iter()
                .enumerate()
                .map(|(index, c)| BallotOption {
                    index,
                    text: c.text.to_string(),
                })
                .collect(),
            expires_at,
        };
        let ballot = Ballot {
            model_ids: scorable.iter().map(|c| c.model_id.to_string()).collect(),
            option_models: shuffled.iter().map(|c| c.model_id.to_string()).collect(),
            expires_at,
        };

        let mut ballots = self.ballots.lock().unwrap_or_else(|e| e.into_inner());
        ballots.retain(|_, b| b.expires_at > now);
        ballots.insert(ballot_id, ballot);
        log::debug!(
            "ballot opened ballot_id={ballot_id} options={} open={}",
            view.options.len(),
            ballots.len()
        );
        Ok(view)
    }

    /// Resolves a ballot: the chosen model scores 1.0, every other 0.0. The
    /// ballot is consumed unless `option` does not exist.
    pub fn record_vote(
        &self,
        ballot_id: Uuid,
        option: usize,
        reasoning: Option<String>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let mut ballots = self.ballots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(ballot) = ballots.get(&ballot_id) else {
            return Err(EvaluationError::BallotNotFound(ballot_id));
        };
        if ballot.expires_at <= Utc::now() {
            ballots.remove(&ballot_id);
            return Err(EvaluationError::BallotExpired(ballot_id));
        }
        let Some(winner) = ballot.option_models.get(option).cloned() else {
            return Err(EvaluationError::UnknownOption { ballot_id, option });
        };
        let Some(ballot) = ballots.remove(&ballot_id) else {
            return Err(EvaluationError::BallotNotFound(ballot_id));
        };
        drop(ballots);

        log::info!("vote recorded ballot_id={ballot_id} winner={winner}");
        let scores = ballot
            .model_ids
            .iter()
            .map(|id| EvaluationScore::zeroed(id, if *id == winner { 1.0 } else { 0.0 }))
            .collect();
        let ranking = std::iter::once(winner.clone())
            .chain(ballot.model_ids.iter().filter(|id| **id != winner).cloned())
            .collect();
        Ok(EvaluationResult {
            mode: EvaluationMode::HumanVote,
            scores,
            winner: Some(winner),
            is_tie: false,
            ranking,
            awaiting_vote: false,
            reasoning,
        })
    }

    pub fn open_ballots(&self) -> usize {
        let now = Utc::now();
        self.ballots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|b| b.expires_at > now)
            .count()
    }
}
