//! Ranked-preference surveys: short-token surveys, one anonymous ballot per
//! participant, and a weighted aggregate ranking.

pub mod commands;
pub mod config;
pub mod db;
pub mod runtime;
pub mod support;
pub mod tally;

pub use config::Config;
pub use db::model::{SurveyError, SurveyResult};
pub use db::schema::{Response, Survey, Vote};
pub use db::DBClient;
pub use tally::{ChoiceStat, SurveyStats};
