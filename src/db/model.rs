use chrono::{SubsecRound, Utc};
use evlog::meta;

use crate::db::dbclient::DBClient;
use crate::db::error::StorageError;
use crate::db::schema::{format_timestamp, parse_timestamp, Response, Survey, Vote};
use crate::db::value::{Row, Value};
use crate::runtime::get_logger;
use crate::support::choices::normalize_labels;
use crate::support::token::{self, RandomTokens, TokenGenerator};
use crate::tally::{self, SurveyStats};

#[derive(thiserror::Error, Debug)]
pub enum SurveyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("survey '{0}' not found")]
    NotFound(String),

    #[error("'{pseudonym}' has already responded to survey '{token}'")]
    Conflict { token: String, pseudonym: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SurveyResult<T> = Result<T, SurveyError>;

fn survey_from_row(row: &Row) -> Result<Survey, StorageError> {
    Ok(Survey {
        token: row.text("token")?.to_owned(),
        title: row.text("title")?.to_owned(),
        choices: serde_json::from_str(row.text("choices")?)?,
        created_at: parse_timestamp(row.text("created_at")?)?,
    })
}

fn response_from_row(row: &Row) -> Result<Response, StorageError> {
    Ok(Response {
        survey_token: row.text("survey_token")?.to_owned(),
        pseudonym: row.text("pseudonym")?.to_owned(),
        votes: serde_json::from_str(row.text("votes")?)?,
        created_at: parse_timestamp(row.text("created_at")?)?,
    })
}

pub async fn check_token_exists(db: &DBClient, token: &str) -> SurveyResult<bool> {
    let r = db
        .conn()
        .query_one("SELECT id FROM surveys WHERE token = ?", &[token.into()])
        .await?;

    Ok(r.is_some())
}

pub async fn check_has_responded(db: &DBClient, token: &str, pseudonym: &str) -> SurveyResult<bool> {
    let r = db
        .conn()
        .query_one(
            "SELECT id FROM responses WHERE survey_token = ? AND pseudonym = ?",
            &[token::normalize(token).into(), pseudonym.trim().into()],
        )
        .await?;

    Ok(r.is_some())
}

pub async fn create_survey<S: AsRef<str> + Sync>(db: &DBClient, title: &str, choices: &[S]) -> SurveyResult<Survey> {
    create_survey_with(db, &mut RandomTokens, title, choices).await
}

/// Creates a survey with a token drawn from `tokens`, drawing again for as
/// long as the token is already taken.
pub async fn create_survey_with<G, S>(db: &DBClient, tokens: &mut G, title: &str, choices: &[S]) -> SurveyResult<Survey>
where
    G: TokenGenerator + Send + ?Sized,
    S: AsRef<str> + Sync,
{
    let title = title.trim();
    if title.is_empty() {
        return Err(SurveyError::InvalidInput("a title is required".to_owned()));
    }

    let choices = normalize_labels(choices);
    if choices.len() < 2 {
        return Err(SurveyError::InvalidInput("at least 2 distinct choices are required".to_owned()));
    }

    let choices_json = serde_json::to_string(&choices).map_err(StorageError::from)?;

    loop {
        let token = tokens.generate();

        if check_token_exists(db, &token).await? {
            get_logger().debug("Generated survey token already in use; drawing again.", meta! {
                "Token" => &token,
            });
            continue;
        }

        let created_at = Utc::now().trunc_subsecs(6);

        let r = db
            .conn()
            .execute(
                "INSERT INTO surveys (token, title, choices, created_at) VALUES (?, ?, ?, ?)",
                &[
                    token.as_str().into(),
                    title.into(),
                    choices_json.as_str().into(),
                    format_timestamp(&created_at).into(),
                ],
            )
            .await;

        match r {
            Ok(_) => {}
            // Another writer took the token between the check and the insert.
            Err(StorageError::UniqueViolation) => {
                get_logger().debug("Survey token taken concurrently; drawing again.", meta! {
                    "Token" => &token,
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        get_logger().info("Survey created.", meta! {
            "Token" => &token,
            "Choices" => choices.len(),
        });

        return Ok(Survey {
            token,
            title: title.to_owned(),
            choices,
            created_at,
        });
    }
}

/// All surveys, newest first.
pub async fn list_surveys(db: &DBClient) -> SurveyResult<Vec<Survey>> {
    let rows = db
        .conn()
        .query_all(
            "SELECT token, title, choices, created_at FROM surveys ORDER BY created_at DESC, id DESC",
            &[],
        )
        .await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in &rows {
        result.push(survey_from_row(row)?);
    }

    Ok(result)
}

pub async fn get_survey(db: &DBClient, token: &str) -> SurveyResult<Survey> {
    let token = token::normalize(token);
    if !token::is_token(&token) {
        return Err(SurveyError::NotFound(token));
    }

    let r = db
        .conn()
        .query_one(
            "SELECT token, title, choices, created_at FROM surveys WHERE token = ?",
            &[token.as_str().into()],
        )
        .await?;

    match r {
        None => Err(SurveyError::NotFound(token)),
        Some(v) => Ok(survey_from_row(&v)?),
    }
}

/// Records one participant's ballot. A participant may respond to a survey
/// only once; the second attempt is a [`SurveyError::Conflict`].
pub async fn add_response(db: &DBClient, token: &str, pseudonym: &str, votes: &[Vote]) -> SurveyResult<()> {
    let pseudonym = pseudonym.trim();
    if pseudonym.is_empty() {
        return Err(SurveyError::InvalidInput("a pseudonym is required".to_owned()));
    }
    if let Some(v) = votes.iter().find(|v| v.rank < 1) {
        return Err(SurveyError::InvalidInput(format!(
            "rank {} for '{}' is not a positive integer",
            v.rank, v.choice
        )));
    }

    let survey = get_survey(db, token).await?;
    let token = survey.token;

    let conflict = || SurveyError::Conflict {
        token: token.clone(),
        pseudonym: pseudonym.to_owned(),
    };

    if check_has_responded(db, &token, pseudonym).await? {
        get_logger().info("Duplicate response rejected.", meta! {
            "Token" => &token,
            "Pseudonym" => pseudonym,
        });
        return Err(conflict());
    }

    let votes_json = serde_json::to_string(votes).map_err(StorageError::from)?;

    let r = db
        .conn()
        .execute(
            "INSERT INTO responses (survey_token, pseudonym, votes, created_at) VALUES (?, ?, ?, ?)",
            &[
                token.as_str().into(),
                pseudonym.into(),
                votes_json.into(),
                Value::Text(format_timestamp(&Utc::now())),
            ],
        )
        .await;

    match r {
        Ok(_) => {}
        Err(StorageError::UniqueViolation) => {
            get_logger().info("Duplicate response rejected by constraint.", meta! {
                "Token" => &token,
                "Pseudonym" => pseudonym,
            });
            return Err(conflict());
        }
        Err(StorageError::ForeignKeyViolation) => return Err(SurveyError::NotFound(token.clone())),
        Err(e) => return Err(e.into()),
    }

    get_logger().info("Response recorded.", meta! {
        "Token" => &token,
        "Pseudonym" => pseudonym,
        "Votes" => votes.len(),
    });

    Ok(())
}

/// Responses to a survey in the order they were recorded.
pub async fn get_responses(db: &DBClient, token: &str) -> SurveyResult<Vec<Response>> {
    let rows = db
        .conn()
        .query_all(
            "SELECT survey_token, pseudonym, votes, created_at FROM responses WHERE survey_token = ? ORDER BY id",
            &[token::normalize(token).into()],
        )
        .await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in &rows {
        result.push(response_from_row(row)?);
    }

    Ok(result)
}

pub async fn get_stats(db: &DBClient, token: &str) -> SurveyResult<SurveyStats> {
    let survey = get_survey(db, token).await?;
    let responses = get_responses(db, &survey.token).await?;

    let stats = tally::tally(survey, &responses);

    get_logger().debug("Computed survey stats.", meta! {
        "Token" => &stats.survey.token,
        "Respondents" => stats.total_respondents,
    });

    Ok(stats)
}
