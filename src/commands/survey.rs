use evlog::meta;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

use crate::commands::{Access, CommandError, CommandResult};
use crate::db::model::{self, SurveyError};
use crate::db::schema::{Survey, Vote};
use crate::db::DBClient;
use crate::runtime::get_logger;
use crate::support::choices::split_labels;
use crate::tally::SurveyStats;

/// Choices may be sent as one comma-separated string or as a list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChoiceList {
    Text(String),
    List(Vec<String>),
}

impl ChoiceList {
    pub fn labels(&self) -> Vec<String> {
        match self {
            ChoiceList::Text(v) => split_labels(v),
            ChoiceList::List(v) => v.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateSurveyRequest {
    pub title: Option<String>,
    pub choices: Option<ChoiceList>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecordResponseRequest {
    #[serde(alias = "pseudo")]
    pub pseudonym: Option<String>,
    /// Kept untyped so a non-list can be reported as invalid input.
    pub votes: Option<JSValue>,
}

/// What participants see of a survey.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SurveyView {
    pub token: String,
    pub title: String,
    pub choices: Vec<String>,
}

impl From<Survey> for SurveyView {
    fn from(s: Survey) -> Self {
        Self {
            token: s.token,
            title: s.title,
            choices: s.choices,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Success {
    pub success: bool,
}

fn require_admin(access: Access, operation: &str) -> CommandResult<()> {
    if access != Access::Admin {
        get_logger().info("Non-administrator attempted an administrative operation.", meta! {
            "Operation" => operation,
        });
        return Err(CommandError::Unauthorized);
    }
    Ok(())
}

fn invalid(message: &str) -> CommandError {
    SurveyError::InvalidInput(message.to_owned()).into()
}

pub async fn create_survey(db: &DBClient, access: Access, request: CreateSurveyRequest) -> CommandResult<SurveyView> {
    require_admin(access, "create_survey")?;

    let title = request.title.unwrap_or_default();
    let labels = request.choices.map(|v| v.labels()).unwrap_or_default();
    if title.trim().is_empty() || labels.is_empty() {
        return Err(invalid("title and choices are required"));
    }

    let survey = model::create_survey(db, &title, &labels).await?;

    Ok(survey.into())
}

pub async fn list_surveys(db: &DBClient, access: Access) -> CommandResult<Vec<Survey>> {
    require_admin(access, "list_surveys")?;

    Ok(model::list_surveys(db).await?)
}

pub async fn get_survey(db: &DBClient, token: &str) -> CommandResult<SurveyView> {
    Ok(model::get_survey(db, token).await?.into())
}

pub async fn record_response(db: &DBClient, token: &str, request: RecordResponseRequest) -> CommandResult<Success> {
    let pseudonym = request.pseudonym.unwrap_or_default();

    let votes: Vec<Vote> = match request.votes {
        Some(JSValue::Array(v)) => serde_json::from_value(JSValue::Array(v))
            .map_err(|e| invalid(&format!("malformed vote: {}", e)))?,
        _ => return Err(invalid("pseudonym and votes are required")),
    };

    model::add_response(db, token, &pseudonym, &votes).await?;

    Ok(Success { success: true })
}

pub async fn get_stats(db: &DBClient, access: Access, token: &str) -> CommandResult<SurveyStats> {
    require_admin(access, "get_stats")?;

    Ok(model::get_stats(db, token).await?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn create_request(js: JSValue) -> CreateSurveyRequest {
        serde_json::from_value(js).unwrap()
    }

    fn respond_request(js: JSValue) -> RecordResponseRequest {
        serde_json::from_value(js).unwrap()
    }

    #[tokio::test]
    async fn admin_operations_require_admin() {
        let db = DBClient::in_memory().await.unwrap();

        let r = create_survey(&db, Access::Public, create_request(json!({"title": "t", "choices": "a,b"}))).await;
        assert!(matches!(r, Err(CommandError::Unauthorized)));
        assert_eq!(r.unwrap_err().status(), 401);

        assert!(matches!(list_surveys(&db, Access::Public).await, Err(CommandError::Unauthorized)));
        assert!(matches!(get_stats(&db, Access::Public, "ABC123").await, Err(CommandError::Unauthorized)));
    }

    #[tokio::test]
    async fn choices_as_text_or_list() {
        let db = DBClient::in_memory().await.unwrap();

        let a = create_survey(&db, Access::Admin, create_request(json!({"title": "t", "choices": "x, y ,z"})))
            .await
            .unwrap();
        assert_eq!(a.choices, vec!["x", "y", "z"]);

        let b = create_survey(&db, Access::Admin, create_request(json!({"title": "t", "choices": ["x", " y"]})))
            .await
            .unwrap();
        assert_eq!(b.choices, vec!["x", "y"]);

        let missing = create_survey(&db, Access::Admin, create_request(json!({"title": "t"}))).await;
        assert_eq!(missing.unwrap_err().status(), 400);

        let single = create_survey(&db, Access::Admin, create_request(json!({"title": "t", "choices": "x,,x"}))).await;
        assert_eq!(single.unwrap_err().status(), 400);
    }

    #[tokio::test]
    async fn response_payload_validation() {
        let db = DBClient::in_memory().await.unwrap();
        let s = create_survey(&db, Access::Admin, create_request(json!({"title": "t", "choices": "A,B"})))
            .await
            .unwrap();

        let not_a_list = record_response(&db, &s.token, respond_request(json!({"pseudo": "ann", "votes": {"A": 1}}))).await;
        assert_eq!(not_a_list.unwrap_err().status(), 400);

        let no_votes = record_response(&db, &s.token, respond_request(json!({"pseudo": "ann"}))).await;
        assert_eq!(no_votes.unwrap_err().status(), 400);

        let bad_rank = record_response(
            &db,
            &s.token,
            respond_request(json!({"pseudo": "ann", "votes": [{"choice": "A", "rank": "first"}]})),
        )
        .await;
        assert_eq!(bad_rank.unwrap_err().status(), 400);

        let fractional = record_response(
            &db,
            &s.token,
            respond_request(json!({"pseudo": "ann", "votes": [{"choice": "A", "rank": 1.5}]})),
        )
        .await;
        assert_eq!(fractional.unwrap_err().status(), 400);

        let zero = record_response(
            &db,
            &s.token,
            respond_request(json!({"pseudo": "ann", "votes": [{"choice": "A", "rank": 0}]})),
        )
        .await;
        assert_eq!(zero.unwrap_err().status(), 400);

        let ok = record_response(
            &db,
            &s.token,
            respond_request(json!({"pseudonym": "ann", "votes": [{"choice": "B", "rank": 1}, {"choice": "A", "rank": 2.0}]})),
        )
        .await
        .unwrap();
        assert_eq!(ok, Success { success: true });

        let again = record_response(&db, &s.token, respond_request(json!({"pseudo": "ann", "votes": []}))).await;
        assert_eq!(again.unwrap_err().status(), 409);

        let missing = record_response(&db, "QQQQQQ", respond_request(json!({"pseudo": "bob", "votes": []}))).await;
        assert_eq!(missing.unwrap_err().status(), 404);
    }

    #[tokio::test]
    async fn public_view_and_stats() {
        let db = DBClient::in_memory().await.unwrap();
        let s = create_survey(&db, Access::Admin, create_request(json!({"title": "Lunch", "choices": "A,B,C"})))
            .await
            .unwrap();

        let view = get_survey(&db, &s.token.to_lowercase()).await.unwrap();
        assert_eq!(view, s);
        let js = serde_json::to_value(&view).unwrap();
        assert_eq!(js, json!({"token": s.token, "title": "Lunch", "choices": ["A", "B", "C"]}));

        record_response(
            &db,
            &s.token,
            respond_request(json!({"pseudo": "ann", "votes": [{"choice": "B", "rank": 1}, {"choice": "A", "rank": 2}]})),
        )
        .await
        .unwrap();

        let stats = get_stats(&db, Access::Admin, &s.token).await.unwrap();
        assert_eq!(stats.score_of("B"), Some(2));
        assert_eq!(stats.score_of("A"), Some(1));
        assert_eq!(stats.score_of("C"), Some(0));
        assert_eq!(stats.respondents, vec!["ann"]);
    }
}
