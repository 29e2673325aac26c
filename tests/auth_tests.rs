use chrono::{DateTime, Duration, TimeZone, Utc};
use mockito::{Matcher, Server};
use runboard::auth::{
    authorize_request, caller_clubs, complete_login, ensure_access_token, refresh_expiring,
    RefreshOptions, RefreshOutcome,
};
use runboard::database::Database;
use runboard::session::{SessionSigner, DEFAULT_MAX_AGE_SECS};
use runboard::strava::{StravaClient, StravaCredentials};
use runboard::{AthleteRecord, RunBoardError};

const CLUB_ID: i64 = 4242;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn client(server: &Server) -> StravaClient {
    StravaClient::new(StravaCredentials {
        client_id: "1234".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: String::new(),
    })
    .unwrap()
    .with_api_base(server.url())
    .with_oauth_base(server.url())
}

fn signer() -> SessionSigner {
    SessionSigner::new("test-secret", DEFAULT_MAX_AGE_SECS).unwrap()
}

fn athlete(id: i64, expires_in: Option<Duration>) -> AthleteRecord {
    AthleteRecord {
        firstname: Some("Ada".to_string()),
        lastname: Some("Lovelace".to_string()),
        access_token: Some(format!("access-{}", id)),
        refresh_token: Some(format!("refresh-{}", id)),
        expires_at: expires_in.map(|d| now() + d),
        updated_at: now() - Duration::days(1),
        ..AthleteRecord::new(id)
    }
}

fn token_body(access: &str, refresh: Option<&str>, expires_at: i64) -> String {
    match refresh {
        Some(refresh) => format!(
            r#"{{"access_token": "{}", "refresh_token": "{}", "expires_at": {}}}"#,
            access, refresh, expires_at
        ),
        None => format!(r#"{{"access_token": "{}", "expires_at": {}}}"#, access, expires_at),
    }
}

#[tokio::test]
async fn test_fresh_token_is_reused_without_network() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let stored = athlete(1, Some(Duration::hours(2)));
    db.upsert_athlete(&stored).unwrap();

    let token = ensure_access_token(&db, &client(&server), &stored, now()).await;

    assert_eq!(token.as_deref(), Some("access-1"));
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_old_refresh_token_kept() {
    let mut server = Server::new_async().await;
    let new_expiry = (now() + Duration::hours(6)).timestamp();
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
        .with_status(200)
        .with_body(token_body("new-access", None, new_expiry))
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let stored = athlete(1, Some(Duration::seconds(30)));
    db.upsert_athlete(&stored).unwrap();

    let token = ensure_access_token(&db, &client(&server), &stored, now()).await;
    assert_eq!(token.as_deref(), Some("new-access"));

    let updated = db.get_athlete(1).unwrap().unwrap();
    assert_eq!(updated.access_token.as_deref(), Some("new-access"));
    assert_eq!(updated.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(updated.expires_at.unwrap().timestamp(), new_expiry);
    assert_eq!(updated.updated_at, now());
}

#[tokio::test]
async fn test_failed_refresh_falls_back_to_stored_token() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(500)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let stored = athlete(1, Some(-Duration::hours(1)));
    db.upsert_athlete(&stored).unwrap();

    let token = ensure_access_token(&db, &client(&server), &stored, now()).await;
    assert_eq!(token.as_deref(), Some("access-1"));
    assert_eq!(db.get_athlete(1).unwrap(), Some(stored));
}

#[tokio::test]
async fn test_without_refresh_token_returns_stored_access() {
    let server = Server::new_async().await;
    let db = Database::in_memory().unwrap();

    let mut stored = athlete(1, None);
    stored.refresh_token = None;
    let token = ensure_access_token(&db, &client(&server), &stored, now()).await;
    assert_eq!(token.as_deref(), Some("access-1"));

    stored.access_token = None;
    let token = ensure_access_token(&db, &client(&server), &stored, now()).await;
    assert_eq!(token, None);
}

#[tokio::test]
async fn test_refresh_expiring_selects_candidates() {
    let mut server = Server::new_async().await;
    let expiry = (now() + Duration::hours(6)).timestamp();
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
        .with_status(200)
        .with_body(token_body("a1", Some("r1"), expiry))
        .create_async()
        .await;
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-3".into()))
        .with_status(400)
        .with_body(r#"{"message": "Bad Request"}"#)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    // 1: expires within the buffer, 2: valid for hours, 3: no expiry recorded
    db.upsert_athlete(&athlete(1, Some(Duration::minutes(2)))).unwrap();
    db.upsert_athlete(&athlete(2, Some(Duration::hours(3)))).unwrap();
    db.upsert_athlete(&athlete(3, None)).unwrap();
    let mut no_refresh = athlete(4, None);
    no_refresh.refresh_token = None;
    db.upsert_athlete(&no_refresh).unwrap();

    let report = refresh_expiring(&db, &client(&server), &RefreshOptions::default(), now())
        .await
        .unwrap();

    assert_eq!(report.total_athletes, 4);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.buffer_ms, 300_000);
    assert_eq!(report.refreshed(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 2);

    assert!(matches!(report.results[0].outcome, RefreshOutcome::Refreshed { .. }));
    assert!(matches!(
        report.results[2].outcome,
        RefreshOutcome::Failed { retryable: false, .. }
    ));
    assert_eq!(
        report.results[3].outcome,
        RefreshOutcome::Skipped {
            reason: "no refresh token".to_string()
        }
    );

    let refreshed = db.get_athlete(1).unwrap().unwrap();
    assert_eq!(refreshed.access_token.as_deref(), Some("a1"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_forced_refresh_of_single_athlete() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-2".into()))
        .with_status(200)
        .with_body(token_body("a2", None, (now() + Duration::hours(6)).timestamp()))
        .expect(1)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    db.upsert_athlete(&athlete(1, Some(Duration::hours(3)))).unwrap();
    db.upsert_athlete(&athlete(2, Some(Duration::hours(3)))).unwrap();

    let options = RefreshOptions {
        athlete_id: Some(2),
        force: true,
        ..RefreshOptions::default()
    };
    let report = refresh_expiring(&db, &client(&server), &options, now())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(report.total_athletes, 1);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.buffer_ms, 0);
    assert!(report.force);
    assert_eq!(report.refreshed(), 1);
    assert_eq!(
        db.get_athlete(2).unwrap().unwrap().refresh_token.as_deref(),
        Some("refresh-2")
    );
}

#[tokio::test]
async fn test_refresh_failure_marks_retryable() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    db.upsert_athlete(&athlete(1, Some(Duration::minutes(2)))).unwrap();

    let report = refresh_expiring(&db, &client(&server), &RefreshOptions::default(), now())
        .await
        .unwrap();

    assert_eq!(report.failed(), 1);
    match &report.results[0].outcome {
        RefreshOutcome::Failed { message, retryable } => {
            assert!(retryable);
            assert!(message.contains("503"));
        }
        other => panic!("expected a failed refresh, got {:?}", other),
    }
    let stored = db.get_athlete(1).unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("access-1"));
}

fn login_body(expires_at: i64) -> String {
    format!(
        r#"{{
            "access_token": "login-access",
            "refresh_token": "login-refresh",
            "expires_at": {},
            "athlete": {{"id": 77, "firstname": "Grace", "lastname": "Hopper"}}
        }}"#,
        expires_at
    )
}

#[tokio::test]
async fn test_complete_login_stores_athlete_and_issues_session() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("code".into(), "the-code".into()))
        .with_status(200)
        .with_body(login_body((now() + Duration::hours(6)).timestamp()))
        .create_async()
        .await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer login-access")
        .with_status(200)
        .with_body(format!(r#"[{{"id": {}}}]"#, CLUB_ID))
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let outcome = complete_login(
        &db,
        &client(&server),
        &signer(),
        "the-code",
        Some(CLUB_ID),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.athlete.athlete_id, 77);
    assert_eq!(outcome.athlete.display_name(), "Grace Hopper");

    let claims = signer().verify(&outcome.session_token, now()).unwrap();
    assert_eq!(claims.athlete_id, 77);

    let stored = db.get_athlete(77).unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("login-access"));
    assert_eq!(stored.refresh_token.as_deref(), Some("login-refresh"));
}

#[tokio::test]
async fn test_complete_login_rejects_non_members() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(login_body((now() + Duration::hours(6)).timestamp()))
        .create_async()
        .await;
    server
        .mock("GET", "/athlete/clubs")
        .with_status(200)
        .with_body(r#"[{"id": 1}]"#)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let err = complete_login(&db, &client(&server), &signer(), "code", Some(CLUB_ID), now())
        .await
        .unwrap_err();

    assert!(matches!(err, RunBoardError::NotInClub { club_id: CLUB_ID }));
    assert_eq!(err.status_code(), Some(403));
    assert_eq!(db.athlete_count().unwrap(), 0);
}

#[tokio::test]
async fn test_complete_login_rejects_blank_code() {
    let server = Server::new_async().await;
    let db = Database::in_memory().unwrap();

    let err = complete_login(&db, &client(&server), &signer(), "  ", None, now())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(401));
}

#[tokio::test]
async fn test_authorize_request_outcomes() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer access-1")
        .with_status(200)
        .with_body(format!(r#"[{{"id": {}}}]"#, CLUB_ID))
        .create_async()
        .await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer access-2")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer access-3")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer access-4")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    for id in 1..=4 {
        db.upsert_athlete(&athlete(id, Some(Duration::hours(2)))).unwrap();
    }
    let client = client(&server);
    let signer = signer();

    let ok = authorize_request(&db, &client, &signer, Some(signer.issue(1, now()).as_str()), Some(CLUB_ID), now())
        .await
        .unwrap();
    assert_eq!(ok.athlete.athlete_id, 1);
    assert_eq!(ok.access_token, "access-1");

    let not_member = authorize_request(&db, &client, &signer, Some(signer.issue(2, now()).as_str()), Some(CLUB_ID), now())
        .await
        .unwrap_err();
    assert_eq!(not_member.status_code(), Some(403));

    let club_check_failed = authorize_request(&db, &client, &signer, Some(signer.issue(3, now()).as_str()), Some(CLUB_ID), now())
        .await
        .unwrap_err();
    assert_eq!(club_check_failed.status_code(), Some(401));

    let unreadable_clubs = authorize_request(&db, &client, &signer, Some(signer.issue(4, now()).as_str()), Some(CLUB_ID), now())
        .await
        .unwrap_err();
    assert!(matches!(unreadable_clubs, RunBoardError::Forbidden(_)));
    assert_eq!(unreadable_clubs.status_code(), Some(403));

    let unknown = authorize_request(&db, &client, &signer, Some(signer.issue(99, now()).as_str()), None, now())
        .await
        .unwrap_err();
    assert_eq!(unknown.status_code(), Some(401));

    let no_session = authorize_request(&db, &client, &signer, None, None, now())
        .await
        .unwrap_err();
    assert!(matches!(no_session, RunBoardError::Unauthorized(_)));

    let expired = signer.issue(1, now() - Duration::days(31));
    let err = authorize_request(&db, &client, &signer, Some(expired.as_str()), None, now())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(401));
}

#[tokio::test]
async fn test_caller_clubs_lists_without_membership_check() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer access-1")
        .with_status(200)
        .with_body(r#"[{"id": 7, "name": "Track Tuesdays"}, {"id": 8}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/athlete/clubs")
        .match_header("authorization", "Bearer access-2")
        .with_status(429)
        .with_body("Rate Limit Exceeded")
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    db.upsert_athlete(&athlete(1, Some(Duration::hours(2)))).unwrap();
    db.upsert_athlete(&athlete(2, Some(Duration::hours(2)))).unwrap();
    let client = client(&server);
    let signer = signer();

    let clubs = caller_clubs(&db, &client, &signer, Some(signer.issue(1, now()).as_str()), now())
        .await
        .unwrap();
    let listed: Vec<(i64, Option<&str>)> = clubs.iter().map(|c| (c.id, c.name.as_deref())).collect();
    assert_eq!(listed, vec![(7, Some("Track Tuesdays")), (8, None)]);

    let limited = caller_clubs(&db, &client, &signer, Some(signer.issue(2, now()).as_str()), now())
        .await
        .unwrap_err();
    assert_eq!(limited.status_code(), Some(429));
    assert!(limited.is_retryable());

    let anonymous = caller_clubs(&db, &client, &signer, None, now()).await.unwrap_err();
    assert_eq!(anonymous.status_code(), Some(401));
}
