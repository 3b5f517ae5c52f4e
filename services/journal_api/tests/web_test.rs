//! End-to-end tests of the HTTP surface over a real socket, with stubbed
//! classification and identity services.

use async_trait::async_trait;
use journal_api_lib::web::{build_router, rest::ApiDoc, state::AppState};
use mood_journal_core::{
    AudioClip, AuthSessionMonitor, ClassificationServices, Emotion, Entry, EraSample,
    EraSegmentationService, EraSpan, IdentityError, IdentityResult, IdentityService,
    InMemoryDeviceStore, InsightConfig, Journal, JournalStore, MonitorConfig, MonthKey,
    MonthlyReport, MoodClassificationService, MoodScore, PortResult, ReportGenerationService,
    SpeechToTextService, UserSession,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use utoipa::OpenApi;

struct StubClassifier;

#[async_trait]
impl SpeechToTextService for StubClassifier {
    async fn transcribe_audio(&self, _clip: &AudioClip) -> PortResult<String> {
        Ok("walked by the river".to_string())
    }
}

#[async_trait]
impl MoodClassificationService for StubClassifier {
    async fn classify_mood(&self, _text: &str) -> PortResult<MoodScore> {
        Ok(MoodScore::new(3).unwrap())
    }

    async fn classify_emotion(&self, _text: &str) -> PortResult<Emotion> {
        Ok(Emotion {
            label: "calm".to_string(),
            emoji: "😌".to_string(),
        })
    }
}

#[async_trait]
impl EraSegmentationService for StubClassifier {
    async fn segment_eras(&self, _samples: &[EraSample]) -> PortResult<Vec<EraSpan>> {
        Ok(vec![])
    }
}

#[async_trait]
impl ReportGenerationService for StubClassifier {
    async fn generate_monthly_report(
        &self,
        _month: MonthKey,
        entries: &[Entry],
    ) -> PortResult<MonthlyReport> {
        Ok(MonthlyReport {
            top_triggers: vec![],
            summary: format!("{} entries", entries.len()),
        })
    }
}

#[derive(Default)]
struct StubIdentity {
    verified: AtomicBool,
}

#[async_trait]
impl IdentityService for StubIdentity {
    async fn sign_in(&self, _email: &str, password: &str) -> IdentityResult<UserSession> {
        if password != "correct horse" {
            return Err(IdentityError::InvalidCredential);
        }
        Ok(UserSession {
            user_id: "u1".to_string(),
            email: "sam@example.com".to_string(),
            email_verified: self.verified.load(Ordering::SeqCst),
        })
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> IdentityResult<UserSession> {
        Err(IdentityError::EmailInUse)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        Ok(())
    }

    async fn send_verification_email(&self) -> IdentityResult<()> {
        Ok(())
    }

    async fn reload_user(&self) -> IdentityResult<Option<UserSession>> {
        Err(IdentityError::NetworkFailure("offline".to_string()))
    }

    async fn send_password_reset(&self, _email: &str) -> IdentityResult<()> {
        Err(IdentityError::UserNotFound)
    }

    async fn current_user(&self) -> IdentityResult<Option<UserSession>> {
        Ok(None)
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    identity: Arc<StubIdentity>,
    _online: watch::Sender<bool>,
}

impl TestServer {
    async fn start() -> Self {
        let device = Arc::new(InMemoryDeviceStore::new());
        let store = JournalStore::create(device.clone()).await;
        let stub = Arc::new(StubClassifier);
        let services = ClassificationServices {
            speech: stub.clone(),
            mood: stub.clone(),
            eras: stub.clone(),
            reports: stub,
        };
        let journal = Arc::new(Journal::new(store, services, InsightConfig::default()));

        let identity = Arc::new(StubIdentity::default());
        let (online, connectivity) = watch::channel(true);
        let session = AuthSessionMonitor::create(
            identity.clone(),
            device,
            connectivity,
            MonitorConfig::default(),
        );

        let app = build_router(Arc::new(AppState {
            journal,
            session,
        }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            http: reqwest::Client::new(),
            identity,
            _online: online,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn login(&self, verified: bool) -> reqwest::Response {
        self.identity.verified.store(verified, Ordering::SeqCst);
        self.http
            .post(self.url("/auth/login"))
            .json(&json!({ "email": "sam@example.com", "password": "correct horse" }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn journal_routes_require_a_verified_session() {
    let server = TestServer::start().await;

    let res = server.http.get(server.url("/entries")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = server.login(false).await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["is_verified"], false);
    assert_eq!(body["reconciling"], true);
    let res = server.http.get(server.url("/entries")).send().await.unwrap();
    assert_eq!(res.status(), 403);

    server.login(true).await;
    let res = server.http.get(server.url("/entries")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    server.http.post(server.url("/auth/logout")).send().await.unwrap();
    let res = server.http.get(server.url("/entries")).send().await.unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn identity_failures_map_to_status_codes() {
    let server = TestServer::start().await;

    let res = server
        .http
        .post(server.url("/auth/login"))
        .json(&json!({ "email": "sam@example.com", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = server
        .http
        .post(server.url("/auth/signup"))
        .json(&json!({ "email": "sam@example.com", "password": "whatever" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);

    let res = server.http.get(server.url("/auth/status")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], Value::Null);
}

#[tokio::test]
async fn entry_lifecycle_over_http() {
    let server = TestServer::start().await;
    server.login(true).await;

    let res = server
        .http
        .post(server.url("/entries"))
        .json(&json!({ "kind": "text", "content": "long walk", "tags": ["outside"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let entry: Value = res.json().await.unwrap();
    assert_eq!(entry["mood"], 3);
    assert_eq!(entry["emotion"]["label"], "calm");
    let id = entry["id"].as_str().unwrap().to_string();

    let listed: Vec<Value> = server
        .http
        .get(server.url("/entries?tag=outside&min_mood=3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let listed: Vec<Value> = server
        .http
        .get(server.url("/entries?tag=indoors"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());

    let res = server
        .http
        .get(server.url("/entries?min_mood=9"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let stats: Value = server
        .http
        .get(server.url("/stats?window=week"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["count"], 1);
    assert_eq!(stats["mean"], 3.0);

    let res = server
        .http
        .delete(server.url(&format!("/entries/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
    let res = server
        .http
        .get(server.url(&format!("/entries/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let res = server
        .http
        .delete(server.url(&format!("/entries/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
}

#[tokio::test]
async fn media_entries_need_a_reference() {
    let server = TestServer::start().await;
    server.login(true).await;

    let res = server
        .http
        .post(server.url("/entries"))
        .json(&json!({ "kind": "media", "content": "sunset" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = server
        .http
        .post(server.url("/entries"))
        .json(&json!({ "kind": "media", "content": "sunset", "media_ref": "file:///p/1.jpg", "mood": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let entry: Value = res.json().await.unwrap();
    assert_eq!(entry["kind"]["type"], "media");
    assert_eq!(entry["mood"], 5);
}

#[tokio::test]
async fn settings_patch_is_a_shallow_merge() {
    let server = TestServer::start().await;
    server.login(true).await;

    server
        .http
        .patch(server.url("/settings"))
        .json(&json!({ "theme": "dark" }))
        .send()
        .await
        .unwrap();
    let settings: Value = server
        .http
        .patch(server.url("/settings"))
        .json(&json!({ "reminders_on": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(settings["theme"], "dark");
    assert_eq!(settings["reminders_on"], true);
    assert_eq!(settings["reminder_time"], "20:00");
}

#[tokio::test]
async fn insight_guards_surface_as_client_errors() {
    let server = TestServer::start().await;
    server.login(true).await;

    let res = server.http.post(server.url("/eras/generate")).send().await.unwrap();
    assert_eq!(res.status(), 422);
    let res = server.http.post(server.url("/eras/extend")).send().await.unwrap();
    assert_eq!(res.status(), 409);
    let res = server.http.post(server.url("/eras/0/toggle")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let res = server.http.get(server.url("/reports/1999-01")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let res = server.http.get(server.url("/reports/1999-13")).send().await.unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn mood_samples_can_be_set_per_day() {
    let server = TestServer::start().await;
    server.login(true).await;

    let res = server
        .http
        .put(server.url("/moods/2024-05-01"))
        .json(&json!({ "score": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let moods: Vec<HashMap<String, Value>> = server
        .http
        .get(server.url("/moods"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(moods.len(), 1);
    assert_eq!(moods[0]["date"], "2024-05-01");
    assert_eq!(moods[0]["score"], 2.0);
}

#[test]
fn openapi_document_lists_every_route() {
    let doc = ApiDoc::openapi();
    for path in [
        "/auth/login",
        "/auth/refresh",
        "/entries",
        "/entries/{id}",
        "/entries/voice",
        "/eras/{index}/toggle",
        "/reports/{month}",
        "/notices",
    ] {
        assert!(doc.paths.paths.contains_key(path), "missing {}", path);
    }
}
