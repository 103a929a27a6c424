//! Crawl loop against a local mock origin

use course_harvest::crawl::{build_client, run, FetchPlan, Substitution};
use course_harvest::session;
use course_harvest::store::{ArtifactStore, DirStore};
use std::time::{Duration, Instant};
use tempfile::tempdir;
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn replace_plan(transcript: &str) -> FetchPlan {
    let template = session::parse(transcript).unwrap();
    FetchPlan::new(
        template,
        Substitution::Replace {
            placeholder: "{id}".to_string(),
        },
        None,
        Duration::ZERO,
    )
    .unwrap()
}

#[tokio::test]
async fn test_failure_isolated_and_resume_skips() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses/3.json"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/courses/\d+\.json$"))
        .and(header("cookie", "session=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"courseOfferings":[]}"#))
        .mount(&server)
        .await;

    let transcript = format!(
        "curl '{}/courses/{{id}}.json' -H 'Accept: application/json' -H 'Cookie: session=xyz'",
        server.uri()
    );
    let plan = replace_plan(&transcript);
    let dir = tempdir().unwrap();
    let store = DirStore::open(dir.path(), "courses", "json").unwrap();
    let client = build_client().unwrap();
    let identifiers = ids(&["1", "2", "3", "4", "5"]);

    let summary = run(&client, &plan, &identifiers, &store).await.unwrap();
    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].identifier, "3");
    assert_eq!(summary.failures[0].status, Some(500));

    for id in ["1", "2", "4", "5"] {
        assert!(dir.path().join(format!("courses_{}.json", id)).exists());
    }
    assert!(!dir.path().join("courses_3.json").exists());
    assert_eq!(server.received_requests().await.unwrap().len(), 5);

    // Second pass only retries the missing artifact
    let summary = run(&client, &plan, &identifiers, &store).await.unwrap();
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_complete_run_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let plan = replace_plan(&format!("curl '{}/teachers/{{id}}'", server.uri()));
    let dir = tempdir().unwrap();
    let store = DirStore::open(dir.path(), "teachers", "json").unwrap();
    let client = build_client().unwrap();
    let identifiers = ids(&["a", "b"]);

    run(&client, &plan, &identifiers, &store).await.unwrap();
    let summary = run(&client, &plan, &identifiers, &store).await.unwrap();

    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delay_separates_attempted_requests_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subjects/2"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let delay = Duration::from_millis(300);
    let template = session::parse(&format!("curl '{}/subjects/{{id}}'", server.uri())).unwrap();
    let plan = FetchPlan::new(
        template,
        Substitution::Replace {
            placeholder: "{id}".to_string(),
        },
        None,
        delay,
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let store = DirStore::open(dir.path(), "courses", "json").unwrap();
    store.write("1", b"{}").unwrap();
    let client = build_client().unwrap();

    // 1 is skipped, 2 fails, 3 succeeds: exactly one pause, between 2 and 3
    let started = Instant::now();
    let summary = run(&client, &plan, &ids(&["1", "2", "3"]), &store).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.fetched, 1);
    assert!(elapsed >= delay, "elapsed {:?}", elapsed);
    assert!(elapsed < delay * 2, "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_query_param_substitution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audit.aspx"))
        .and(query_param("pageid", "audit"))
        .and(query_param("degreeID", "8401"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let template = session::parse(&format!(
        "curl '{}/audit.aspx?pageid=audit&degreeID=0'",
        server.uri()
    ))
    .unwrap();
    let plan = FetchPlan::new(
        template,
        Substitution::QueryParam {
            name: "degreeID".to_string(),
        },
        None,
        Duration::ZERO,
    )
    .unwrap();
    let dir = tempdir().unwrap();
    let store = DirStore::open(dir.path(), "audit", "html").unwrap();
    let client = build_client().unwrap();

    let summary = run(&client, &plan, &ids(&["8401"]), &store).await.unwrap();
    assert_eq!(summary.fetched, 1);
    assert!(dir.path().join("audit_8401.html").exists());
}

#[tokio::test]
async fn test_json_body_substitution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_json(serde_json::json!({
            "query": "search",
            "variables": {"schoolID": "U2Nob29s", "text": "198"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let transcript = format!(
        r#"curl '{}/graphql' -H 'Content-Type: application/json' --data-raw '{{"query":"search","variables":{{"schoolID":"U2Nob29s","text":"{{id}}"}}}}'"#,
        server.uri()
    );
    let plan = replace_plan(&transcript);
    let dir = tempdir().unwrap();
    let store = DirStore::open(dir.path(), "teachers", "json").unwrap();
    let client = build_client().unwrap();

    let summary = run(&client, &plan, &ids(&["198"]), &store).await.unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_transport_error_recorded() {
    // Nothing listens on the discard port
    let plan = replace_plan("curl 'http://127.0.0.1:9/{id}'");
    let dir = tempdir().unwrap();
    let store = DirStore::open(dir.path(), "courses", "json").unwrap();
    let client = build_client().unwrap();

    let summary = run(&client, &plan, &ids(&["1", "2"]), &store).await.unwrap();
    assert_eq!(summary.failed, 2);
    assert!(summary.failures.iter().all(|f| f.status.is_none()));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
