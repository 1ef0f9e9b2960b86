//! Weighted rank aggregation.
//!
//! Each response is weighted on its own scale: if a participant ranked `m`
//! choices, their rank `r` pick adds `m - r + 1` to that choice's score. Votes
//! for labels the survey does not offer are ignored. Scores saturate at the
//! `i64` bounds instead of overflowing.

use std::cmp::Reverse;
use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;

use crate::db::schema::{Response, Survey};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceStat {
    pub choice: String,
    pub score: i64,
    pub vote_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyStats {
    pub survey: Survey,
    /// One entry per survey choice, in the survey's declared order.
    pub stats: Vec<ChoiceStat>,
    pub total_respondents: usize,
    pub respondents: Vec<String>,
}

/// A [`ChoiceStat`] placed in a by-score ordering, for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedChoice {
    /// 1-based; choices with equal scores share a place.
    pub place: usize,
    pub choice: String,
    pub score: i64,
    pub vote_count: u64,
    /// Score relative to the best score, in `0.0..=1.0` for non-negative scores.
    pub share: f64,
}

pub struct Tally {
    choices: Vec<String>,
    index: HashMap<String, usize>,
    scores: Vec<i64>,
    vote_counts: Vec<u64>,
    respondents: Vec<String>,
}

impl Tally {
    pub fn new(choices: &[String]) -> Self {
        let mut index = HashMap::new();
        for (i, choice) in choices.iter().enumerate() {
            index.entry(choice.clone()).or_insert(i);
        }

        Self {
            choices: choices.to_vec(),
            index,
            scores: vec![0; choices.len()],
            vote_counts: vec![0; choices.len()],
            respondents: Vec::new(),
        }
    }

    pub fn add(&mut self, response: &Response) {
        let m = response.votes.len() as i64;

        for vote in &response.votes {
            let i = match self.index.get(&vote.choice) {
                None => continue,
                Some(v) => *v,
            };

            let weight = m.saturating_sub(vote.rank).saturating_add(1);
            self.scores[i] = self.scores[i].saturating_add(weight);
            self.vote_counts[i] += 1;
        }

        self.respondents.push(response.pseudonym.clone());
    }

    pub fn results(self, survey: Survey) -> SurveyStats {
        let stats = self
            .choices
            .into_iter()
            .zip(self.scores)
            .zip(self.vote_counts)
            .map(|((choice, score), vote_count)| ChoiceStat {
                choice,
                score,
                vote_count,
            })
            .collect();

        SurveyStats {
            survey,
            stats,
            total_respondents: self.respondents.len(),
            respondents: self.respondents,
        }
    }
}

/// Aggregates `responses` against the choices of `survey`.
pub fn tally(survey: Survey, responses: &[Response]) -> SurveyStats {
    let mut t = Tally::new(&survey.choices);
    for response in responses {
        t.add(response);
    }
    t.results(survey)
}

impl SurveyStats {
    pub fn score_of(&self, choice: &str) -> Option<i64> {
        self.stats.iter().find(|v| v.choice == choice).map(|v| v.score)
    }

    /// Stats sorted by descending score; ties keep the declared order.
    pub fn ranked(&self) -> Vec<RankedChoice> {
        let max_score = self.stats.iter().map(|v| v.score).max().unwrap_or(0).max(1);

        let mut result = Vec::with_capacity(self.stats.len());

        let mut last = None;
        let mut curr = 0;
        for (i, stat) in self.stats.iter().sorted_by_key(|v| Reverse(v.score)).enumerate() {
            if last != Some(stat.score) {
                curr = i + 1;
                last = Some(stat.score);
            }

            result.push(RankedChoice {
                place: curr,
                choice: stat.choice.clone(),
                score: stat.score,
                vote_count: stat.vote_count,
                share: stat.score as f64 / max_score as f64,
            });
        }

        result
    }
}
