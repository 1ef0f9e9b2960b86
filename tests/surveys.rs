use std::collections::HashSet;

use easysurvey::db::model::{self, SurveyError};
use easysurvey::support::token::{is_token, TokenGenerator, TOKEN_ALPHABET, TOKEN_LEN};
use easysurvey::{Config, DBClient, Vote};

/// Hands out every token twice in a row, so each survey after the first
/// collides once before getting a fresh token.
struct CollidingTokens {
    draws: u64,
}

impl TokenGenerator for CollidingTokens {
    fn generate(&mut self) -> String {
        let mut n = self.draws / 2;
        self.draws += 1;

        let base = TOKEN_ALPHABET.len() as u64;
        let mut token = vec![b'A'; TOKEN_LEN];
        for slot in token.iter_mut().rev() {
            *slot = TOKEN_ALPHABET[(n % base) as usize];
            n /= base;
        }
        String::from_utf8(token).unwrap()
    }
}

async fn embedded(dir: &tempfile::TempDir) -> DBClient {
    DBClient::connect(&Config::embedded(dir.path().join("survey.db")))
        .await
        .unwrap()
}

fn votes(v: &[(&str, i64)]) -> Vec<Vote> {
    v.iter().map(|(c, r)| Vote::new(*c, *r)).collect()
}

#[tokio::test]
async fn weighting_example() {
    let dir = tempfile::tempdir().unwrap();
    let db = embedded(&dir).await;

    let s = model::create_survey(&db, "Letters", &["A", "B", "C"]).await.unwrap();

    model::add_response(&db, &s.token, "ann", &votes(&[("A", 1), ("B", 2)])).await.unwrap();
    let first = model::get_stats(&db, &s.token).await.unwrap();
    assert_eq!(first.score_of("A"), Some(2));
    assert_eq!(first.score_of("B"), Some(1));
    assert_eq!(first.score_of("C"), Some(0));

    model::add_response(&db, &s.token, "bob", &votes(&[("C", 1), ("A", 2), ("B", 3)])).await.unwrap();
    let both = model::get_stats(&db, &s.token).await.unwrap();

    let view: Vec<(&str, i64, u64)> = both
        .stats
        .iter()
        .map(|v| (v.choice.as_str(), v.score, v.vote_count))
        .collect();
    assert_eq!(view, vec![("A", 4, 2), ("B", 2, 2), ("C", 3, 1)]);
    assert_eq!(both.total_respondents, 2);
    assert_eq!(both.respondents, vec!["ann", "bob"]);
}

#[tokio::test]
async fn unknown_choice_is_ignored() {
    let db = DBClient::in_memory().await.unwrap();
    let s = model::create_survey(&db, "Letters", &["A", "B"]).await.unwrap();

    model::add_response(&db, &s.token, "ann", &votes(&[("Z", 1)])).await.unwrap();

    let stats = model::get_stats(&db, &s.token).await.unwrap();
    assert!(stats.stats.iter().all(|v| v.score == 0 && v.vote_count == 0));
    assert_eq!(stats.total_respondents, 1);
}

#[tokio::test]
async fn stats_are_deterministic() {
    let db = DBClient::in_memory().await.unwrap();
    let s = model::create_survey(&db, "Letters", &["A", "B", "C", "D"]).await.unwrap();

    for (i, name) in ["ann", "bob", "cat", "dan", "eve"].iter().enumerate() {
        let ballot = match i % 3 {
            0 => votes(&[("D", 1), ("A", 2)]),
            1 => votes(&[("B", 1), ("C", 2), ("D", 3)]),
            _ => votes(&[("A", 1)]),
        };
        model::add_response(&db, &s.token, name, &ballot).await.unwrap();
    }

    let a = model::get_stats(&db, &s.token).await.unwrap();
    let b = model::get_stats(&db, &s.token).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn duplicate_labels_collapse() {
    let db = DBClient::in_memory().await.unwrap();
    let s = model::create_survey(&db, "Dups", &["A", " A", "B"]).await.unwrap();
    assert_eq!(s.choices, vec!["A", "B"]);

    model::add_response(&db, &s.token, "ann", &votes(&[("A", 1), ("B", 2)])).await.unwrap();
    let stats = model::get_stats(&db, &s.token).await.unwrap();
    assert_eq!(stats.stats.len(), 2);
    assert_eq!(stats.score_of("A"), Some(2));
}

#[tokio::test]
async fn lookup_ignores_case() {
    let db = DBClient::in_memory().await.unwrap();

    for i in 0..20 {
        let s = model::create_survey(&db, &format!("Survey {}", i), &["yes", "no"]).await.unwrap();
        assert!(is_token(&s.token));

        let canonical = model::get_survey(&db, &s.token).await.unwrap();
        let lower = model::get_survey(&db, &s.token.to_lowercase()).await.unwrap();
        assert_eq!(canonical, lower);
        assert_eq!(canonical, s);
    }
}

#[tokio::test]
async fn listing_is_newest_first() {
    let db = DBClient::in_memory().await.unwrap();

    for title in ["first", "second", "third"] {
        model::create_survey(&db, title, &["a", "b"]).await.unwrap();
    }

    let listed = model::list_surveys(&db).await.unwrap();
    let titles: Vec<&str> = listed.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
    assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn tokens_stay_unique_under_forced_collisions() {
    let db = DBClient::in_memory().await.unwrap();
    let mut tokens = CollidingTokens { draws: 0 };

    let mut seen = HashSet::new();
    for i in 0..10_000 {
        let s = model::create_survey_with(&db, &mut tokens, &format!("s{}", i), &["a", "b"])
            .await
            .unwrap();
        assert!(is_token(&s.token));
        assert!(seen.insert(s.token), "token handed out twice");
    }

    // Every survey after the first needed a second draw.
    assert_eq!(tokens.draws, 2 * 10_000 - 1);
    assert_eq!(model::list_surveys(&db).await.unwrap().len(), 10_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_response_conflicts_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = embedded(&dir).await;
    let s = model::create_survey(&db, "Race", &["A", "B"]).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        let token = s.token.clone();
        handles.push(tokio::spawn(async move {
            model::add_response(&db, &token, "ann", &[Vote::new("A", 1)]).await
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(SurveyError::Conflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(model::get_responses(&db, &s.token).await.unwrap().len(), 1);
}

#[tokio::test]
async fn data_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (token, before) = {
        let db = embedded(&dir).await;
        let s = model::create_survey(&db, "Durable", &["A", "B", "C"]).await.unwrap();
        model::add_response(&db, &s.token, "ann", &votes(&[("B", 1), ("C", 2)])).await.unwrap();
        model::add_response(&db, &s.token, "bob", &votes(&[("C", 1)])).await.unwrap();
        (s.token.clone(), model::get_stats(&db, &s.token).await.unwrap())
    };

    let db = embedded(&dir).await;
    let after = model::get_stats(&db, &token).await.unwrap();
    assert_eq!(before, after);

    let again = model::add_response(&db, &token, "bob", &votes(&[("A", 1)])).await;
    assert!(matches!(again, Err(SurveyError::Conflict { .. })));
}
