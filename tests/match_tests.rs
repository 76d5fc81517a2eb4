// tests/match_tests.rs
//
// End-to-end coverage of the match generation engine: scoring, replacement
// semantics, exclusion rules, reset and rollback behavior.

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Helper function to spawn the app on a random port for testing.
/// Each test gets its own throwaway SQLite database file.
async fn spawn_app() -> (String, SqlitePool) {
    let db_path = std::env::temp_dir().join(format!("datamatch_test_{}.db", uuid::Uuid::new_v4()));

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let app = datamatch::routes::create_router(pool.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn create_user(client: &reqwest::Client, address: &str, name: &str) -> i64 {
    let response = client
        .post(format!("{}/api/admin/users", address))
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await
        .expect("Failed to create user");

    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    body["id"].as_i64().expect("id missing")
}

/// Seeds `count` questions with three options each and returns
/// (question_ids, option_ids per question), ordered by position.
async fn seed_questions(
    client: &reqwest::Client,
    address: &str,
    count: usize,
) -> (Vec<i64>, Vec<Vec<i64>>) {
    for i in 0..count {
        let response = client
            .post(format!("{}/api/admin/questions", address))
            .json(&serde_json::json!({
                "text": format!("Question {}", i + 1),
                "order_position": i + 1,
                "options": [{ "text": "A" }, { "text": "B" }, { "text": "C" }],
            }))
            .send()
            .await
            .expect("Failed to create question");
        assert_eq!(response.status().as_u16(), 201);
    }

    let questions: serde_json::Value = client
        .get(format!("{}/api/questions", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let mut question_ids = Vec::new();
    let mut option_ids = Vec::new();
    for question in questions.as_array().unwrap() {
        question_ids.push(question["id"].as_i64().unwrap());
        option_ids.push(
            question["options"]
                .as_array()
                .unwrap()
                .iter()
                .map(|o| o["id"].as_i64().unwrap())
                .collect(),
        );
    }

    (question_ids, option_ids)
}

async fn submit_responses(
    client: &reqwest::Client,
    address: &str,
    user_id: i64,
    answers: &[(i64, i64)],
) {
    let responses: Vec<serde_json::Value> = answers
        .iter()
        .map(|(question_id, option_id)| {
            serde_json::json!({ "question_id": question_id, "selected_option_id": option_id })
        })
        .collect();

    let response = client
        .post(format!("{}/api/responses", address))
        .json(&serde_json::json!({ "user_id": user_id, "responses": responses }))
        .send()
        .await
        .expect("Failed to submit responses");

    assert_eq!(response.status().as_u16(), 200);
}

async fn generate(client: &reqwest::Client, address: &str) -> reqwest::Response {
    client
        .post(format!("{}/api/admin/results/generate", address))
        .send()
        .await
        .expect("Failed to call generate")
}

async fn all_results(client: &reqwest::Client, address: &str) -> serde_json::Value {
    client
        .get(format!("{}/api/admin/results", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn results_available(client: &reqwest::Client, address: &str) -> bool {
    let status: serde_json::Value = client
        .get(format!("{}/api/results/status", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    status["available"].as_bool().unwrap()
}

fn find_pair<'a>(
    rows: &'a serde_json::Value,
    user_1: i64,
    user_2: i64,
) -> &'a serde_json::Value {
    rows.as_array()
        .unwrap()
        .iter()
        .find(|row| {
            row["user_id_1"].as_i64() == Some(user_1) && row["user_id_2"].as_i64() == Some(user_2)
        })
        .expect("pair row missing")
}

#[tokio::test]
async fn generate_on_empty_roster_succeeds_with_zero_pairs() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = generate(&client, &address).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["pairs"], 0);

    assert!(!results_available(&client, &address).await);
}

#[tokio::test]
async fn single_completed_participant_yields_no_pairs() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (questions, options) = seed_questions(&client, &address, 2).await;
    let solo = create_user(&client, &address, "Solo Participant").await;
    submit_responses(
        &client,
        &address,
        solo,
        &[(questions[0], options[0][0]), (questions[1], options[1][0])],
    )
    .await;

    let response = generate(&client, &address).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["pairs"], 0);
}

#[tokio::test]
async fn three_participants_score_and_rank_as_expected() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (q, o) = seed_questions(&client, &address, 3).await;

    let alice = create_user(&client, &address, "Alice Ant").await;
    let bob = create_user(&client, &address, "Bob Bee").await;
    let carol = create_user(&client, &address, "Carol Cat").await;

    // Alice and Bob agree on everything; Carol matches them on the first
    // question only.
    submit_responses(
        &client,
        &address,
        alice,
        &[(q[0], o[0][0]), (q[1], o[1][0]), (q[2], o[2][0])],
    )
    .await;
    submit_responses(
        &client,
        &address,
        bob,
        &[(q[0], o[0][0]), (q[1], o[1][0]), (q[2], o[2][0])],
    )
    .await;
    submit_responses(
        &client,
        &address,
        carol,
        &[(q[0], o[0][0]), (q[1], o[1][1]), (q[2], o[2][2])],
    )
    .await;

    assert!(!results_available(&client, &address).await);

    let response = generate(&client, &address).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["pairs"], 3);

    assert!(results_available(&client, &address).await);

    // 3 participants -> 3 unordered pairs, lower id first.
    let rows = all_results(&client, &address).await;
    assert_eq!(rows.as_array().unwrap().len(), 3);

    let ab = find_pair(&rows, alice, bob);
    assert_eq!(ab["common_answers"], 3);
    assert_eq!(ab["total_possible"], 3);
    assert_eq!(ab["match_percentage"].as_f64().unwrap(), 100.0);

    let ac = find_pair(&rows, alice, carol);
    assert_eq!(ac["common_answers"], 1);
    assert_eq!(ac["total_possible"], 3);
    assert!((ac["match_percentage"].as_f64().unwrap() - 33.33).abs() < 0.01);

    let bc = find_pair(&rows, bob, carol);
    assert_eq!(bc["common_answers"], 1);
    assert_eq!(bc["total_possible"], 3);

    // Leaderboard for Alice: Bob first by similarity, Carol first by
    // difference; the orderings are mirror images.
    let alice_results: serde_json::Value = client
        .get(format!("{}/api/results/{}", address, alice))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let most_similar = alice_results["most_similar"].as_array().unwrap();
    assert_eq!(most_similar.len(), 2);
    assert_eq!(most_similar[0]["other_user_id"].as_i64(), Some(bob));
    assert_eq!(most_similar[0]["name"], "Bob Bee");
    assert_eq!(most_similar[0]["match_percentage"].as_f64().unwrap(), 100.0);
    assert_eq!(most_similar[1]["other_user_id"].as_i64(), Some(carol));

    let most_different = alice_results["most_different"].as_array().unwrap();
    assert_eq!(most_different[0]["other_user_id"].as_i64(), Some(carol));
    assert_eq!(most_different[1]["other_user_id"].as_i64(), Some(bob));

    // Question-by-question comparison between Alice and Carol.
    let comparison: serde_json::Value = client
        .get(format!("{}/api/results/compare/{}/{}", address, alice, carol))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let comparison = comparison.as_array().unwrap();
    assert_eq!(comparison.len(), 3);
    assert_eq!(comparison[0]["question_text"], "Question 1");
    assert_eq!(comparison[0]["is_same"], true);
    assert_eq!(comparison[1]["is_same"], false);
    assert_eq!(comparison[2]["is_same"], false);
    assert_eq!(comparison[1]["user1_option_text"], "A");
    assert_eq!(comparison[1]["user2_option_text"], "B");
}

#[tokio::test]
async fn regeneration_is_idempotent() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (q, o) = seed_questions(&client, &address, 3).await;
    let alice = create_user(&client, &address, "Alice Ant").await;
    let bob = create_user(&client, &address, "Bob Bee").await;

    submit_responses(
        &client,
        &address,
        alice,
        &[(q[0], o[0][0]), (q[1], o[1][1]), (q[2], o[2][0])],
    )
    .await;
    submit_responses(
        &client,
        &address,
        bob,
        &[(q[0], o[0][0]), (q[1], o[1][2]), (q[2], o[2][0])],
    )
    .await;

    generate(&client, &address).await;
    let first = all_results(&client, &address).await;

    generate(&client, &address).await;
    let second = all_results(&client, &address).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn total_counts_only_questions_both_answered() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (q, o) = seed_questions(&client, &address, 4).await;
    let alice = create_user(&client, &address, "Alice Ant").await;
    let dave = create_user(&client, &address, "Dave Dog").await;

    // Alice answered {1,2,3}, Dave answered {2,3,4}: comparable universe is
    // {2,3}. They agree on question 2 only.
    submit_responses(
        &client,
        &address,
        alice,
        &[(q[0], o[0][0]), (q[1], o[1][0]), (q[2], o[2][0])],
    )
    .await;
    submit_responses(
        &client,
        &address,
        dave,
        &[(q[1], o[1][0]), (q[2], o[2][1]), (q[3], o[3][0])],
    )
    .await;

    generate(&client, &address).await;

    let rows = all_results(&client, &address).await;
    let pair = find_pair(&rows, alice, dave);
    assert_eq!(pair["total_possible"], 2);
    assert_eq!(pair["common_answers"], 1);
    assert_eq!(pair["match_percentage"].as_f64().unwrap(), 50.0);

    // The comparison view applies the same rule: questions 1 and 4 are
    // omitted, not shown as mismatches.
    let comparison: serde_json::Value = client
        .get(format!("{}/api/results/compare/{}/{}", address, alice, dave))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(comparison.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn incomplete_participants_are_excluded() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (q, o) = seed_questions(&client, &address, 2).await;
    let alice = create_user(&client, &address, "Alice Ant").await;
    let bob = create_user(&client, &address, "Bob Bee").await;
    let eve = create_user(&client, &address, "Eve Incomplete").await;

    submit_responses(
        &client,
        &address,
        alice,
        &[(q[0], o[0][0]), (q[1], o[1][0])],
    )
    .await;
    submit_responses(&client, &address, bob, &[(q[0], o[0][0]), (q[1], o[1][1])])
        .await;

    // Eve has a recorded response but never submitted through the survey,
    // so her completion flag stays false.
    sqlx::query("INSERT INTO survey_responses (user_id, question_id, selected_option_id) VALUES (?, ?, ?)")
        .bind(eve)
        .bind(q[0])
        .bind(o[0][0])
        .execute(&pool)
        .await
        .unwrap();

    generate(&client, &address).await;

    let rows = all_results(&client, &address).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    for row in rows {
        assert_ne!(row["user_id_1"].as_i64(), Some(eve));
        assert_ne!(row["user_id_2"].as_i64(), Some(eve));
    }
}

#[tokio::test]
async fn reset_clears_responses_results_and_flags() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (q, o) = seed_questions(&client, &address, 2).await;
    let alice = create_user(&client, &address, "Alice Ant").await;
    let bob = create_user(&client, &address, "Bob Bee").await;

    submit_responses(
        &client,
        &address,
        alice,
        &[(q[0], o[0][0]), (q[1], o[1][0])],
    )
    .await;
    submit_responses(&client, &address, bob, &[(q[0], o[0][0]), (q[1], o[1][0])])
        .await;

    generate(&client, &address).await;
    assert!(results_available(&client, &address).await);

    let response = client
        .post(format!("{}/api/admin/reset", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    assert!(!results_available(&client, &address).await);

    let saved: serde_json::Value = client
        .get(format!("{}/api/responses/{}", address, alice))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(saved.as_array().unwrap().is_empty());

    let users: serde_json::Value = client
        .get(format!("{}/api/users", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    for user in users.as_array().unwrap() {
        assert_eq!(user["has_completed_survey"], false);
    }

    // Questions survive a reset.
    let questions: serde_json::Value = client
        .get(format!("{}/api/questions", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(questions.as_array().unwrap().len(), 2);

    // Regenerating over the now-empty eligible set succeeds with 0 rows.
    let response = generate(&client, &address).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["pairs"], 0);
}

#[tokio::test]
async fn failed_generation_keeps_previous_results() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (q, o) = seed_questions(&client, &address, 2).await;
    let alice = create_user(&client, &address, "Alice Ant").await;
    let bob = create_user(&client, &address, "Bob Bee").await;

    submit_responses(
        &client,
        &address,
        alice,
        &[(q[0], o[0][0]), (q[1], o[1][0])],
    )
    .await;
    submit_responses(&client, &address, bob, &[(q[0], o[0][0]), (q[1], o[1][1])])
        .await;

    generate(&client, &address).await;
    let before = all_results(&client, &address).await;
    assert_eq!(before.as_array().unwrap().len(), 1);

    // A third participant joins, then a fault is injected: inserting any
    // pair involving them aborts mid-transaction.
    let carol = create_user(&client, &address, "Carol Cat").await;
    submit_responses(
        &client,
        &address,
        carol,
        &[(q[0], o[0][1]), (q[1], o[1][1])],
    )
    .await;

    sqlx::query(&format!(
        "CREATE TRIGGER abort_match_insert BEFORE INSERT ON match_results \
         FOR EACH ROW WHEN NEW.user_id_2 = {} \
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END",
        carol
    ))
    .execute(&pool)
    .await
    .unwrap();

    let response = generate(&client, &address).await;
    assert_eq!(response.status().as_u16(), 500);

    // The table must hold exactly the pre-run rows, not a mixed set.
    let after = all_results(&client, &address).await;
    assert_eq!(before, after);

    // Once the fault is gone the full recomputation goes through.
    sqlx::query("DROP TRIGGER abort_match_insert")
        .execute(&pool)
        .await
        .unwrap();

    let response = generate(&client, &address).await;
    assert_eq!(response.status().as_u16(), 200);
    let rows = all_results(&client, &address).await;
    assert_eq!(rows.as_array().unwrap().len(), 3);
}
