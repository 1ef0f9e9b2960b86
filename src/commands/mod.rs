//! Operations exposed to the outer layer (HTTP router, CLI).
//!
//! Requests arrive as loosely-typed JSON bodies, so validation of their shape
//! happens here; everything else is delegated to [`crate::db::model`].

mod survey;

pub use survey::{
    create_survey, get_stats, get_survey, list_surveys, record_response, ChoiceList, CreateSurveyRequest,
    RecordResponseRequest, Success, SurveyView,
};

use crate::db::model::SurveyError;

/// Whether the caller passed the external administrator check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Admin,
    Public,
}

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Survey(#[from] SurveyError),
}

impl CommandError {
    /// HTTP status the outer layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            CommandError::Unauthorized => 401,
            CommandError::Survey(SurveyError::InvalidInput(_)) => 400,
            CommandError::Survey(SurveyError::NotFound(_)) => 404,
            CommandError::Survey(SurveyError::Conflict { .. }) => 409,
            CommandError::Survey(SurveyError::Storage(_)) => 500,
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
