use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::db::error::StorageError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub token: String,
    pub title: String,
    pub choices: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub survey_token: String,
    pub pseudonym: String,
    pub votes: Vec<Vote>,
    pub created_at: DateTime<Utc>,
}

/// One ranked entry of a ballot. Rank 1 is the participant's favourite.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vote {
    pub choice: String,
    #[serde(deserialize_with = "deserialize_rank")]
    pub rank: i64,
}

/// Accepts integral JSON floats such as `2.0` as well as integers.
fn deserialize_rank<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRank {
        Integer(i64),
        Number(f64),
    }

    match RawRank::deserialize(deserializer)? {
        RawRank::Integer(v) => Ok(v),
        RawRank::Number(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => Ok(v as i64),
        RawRank::Number(v) => Err(D::Error::custom(format!("rank {} is not an integer", v))),
    }
}

impl Vote {
    pub fn new(choice: impl Into<String>, rank: i64) -> Self {
        Self {
            choice: choice.into(),
            rank,
        }
    }
}

pub const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS surveys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token TEXT UNIQUE NOT NULL,
        title TEXT NOT NULL,
        choices TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS responses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        survey_token TEXT NOT NULL REFERENCES surveys(token),
        pseudonym TEXT NOT NULL,
        votes TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(survey_token, pseudonym)
    );",
];

pub const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS surveys (
        id BIGSERIAL PRIMARY KEY,
        token TEXT UNIQUE NOT NULL,
        title TEXT NOT NULL,
        choices TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS responses (
        id BIGSERIAL PRIMARY KEY,
        survey_token TEXT NOT NULL REFERENCES surveys(token),
        pseudonym TEXT NOT NULL,
        votes TEXT NOT NULL,
        created_at TEXT NOT NULL,
        CONSTRAINT unique_response UNIQUE(survey_token, pseudonym)
    );",
];

/// Column names copied when an embedded image is imported, per table.
pub const TABLE_COLUMNS: &[(&str, &str)] = &[
    ("surveys", "id, token, title, choices, created_at"),
    ("responses", "id, survey_token, pseudonym, votes, created_at"),
];

/// Timestamps are stored as fixed-width RFC 3339 text so that ordering by the
/// column is chronological on every backend.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Decode(format!("invalid timestamp '{}': {}", s, e)))
}
