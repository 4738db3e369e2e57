//! End-to-end flows against a real server on an ephemeral port.
//!
//! Each test gets its own database in a temp directory, a notifier that
//! records what would have been sent, and a scripted language model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Notify;

use bloodlink::ai::{AiError, LlmClient, Prompt};
use bloodlink::auth::{AuthError, Notifier};
use bloodlink::config::Config;
use bloodlink::db;
use bloodlink::i18n::Language;
use bloodlink::routes;
use bloodlink::state::AppState;

#[derive(Default)]
struct RecordingNotifier {
    otps: Mutex<Vec<(String, String)>>,
    resets: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn last_otp(&self) -> Option<String> {
        self.otps.lock().unwrap().last().map(|(_, code)| code.clone())
    }

    fn last_reset_link(&self) -> Option<String> {
        self.resets.lock().unwrap().last().map(|(_, link)| link.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), AuthError> {
        self.otps
            .lock()
            .unwrap()
            .push((phone.to_string(), code.to_string()));
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), AuthError> {
        self.resets
            .lock()
            .unwrap()
            .push((email.to_string(), link.to_string()));
        Ok(())
    }
}

/// Answers every prompt with the same reply, or fails when there is none.
struct FixedLlm(Option<Value>);

#[async_trait]
impl LlmClient for FixedLlm {
    async fn complete_json(&self, _prompt: &Prompt) -> Result<Value, AiError> {
        self.0.clone().ok_or(AiError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }
}

/// One scripted model reply. A held reply waits until the test releases it.
struct Step {
    reply: Option<Value>,
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl Step {
    fn reply(value: Value) -> Self {
        Self {
            reply: Some(value),
            hold: None,
        }
    }

    fn fail() -> Self {
        Self {
            reply: None,
            hold: None,
        }
    }

    /// Signals `entered` when the call arrives, then waits for `release`.
    fn held(value: Value, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            reply: Some(value),
            hold: Some((entered, release)),
        }
    }
}

/// Replies from a queue in call order; fails once the queue is empty.
struct SequencedLlm(Mutex<VecDeque<Step>>);

impl SequencedLlm {
    fn new(steps: Vec<Step>) -> Self {
        Self(Mutex::new(steps.into()))
    }
}

#[async_trait]
impl LlmClient for SequencedLlm {
    async fn complete_json(&self, _prompt: &Prompt) -> Result<Value, AiError> {
        let step = self.0.lock().unwrap().pop_front().unwrap_or_else(Step::fail);
        if let Some((entered, release)) = step.hold {
            entered.notify_one();
            release.notified().await;
        }
        step.reply.ok_or(AiError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }
}

fn match_reply() -> Value {
    json!({
        "suggestedDonors": [{
            "donorName": "Rahim",
            "donorBloodType": "O-",
            "distanceKm": 2.5,
            "contactInformation": "+8801711000000",
            "suitabilityScore": 95
        }],
        "summary": "One compatible donor nearby."
    })
}

const MATCH_FORM: [(&str, &str); 4] = [
    ("patient_blood_type", "O-"),
    ("patient_city", "Dhaka"),
    ("patient_needs", ""),
    ("search_radius_km", "25"),
];

struct TestServer {
    base: String,
    state: AppState,
    notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

impl TestServer {
    async fn start(llm: impl LlmClient + 'static) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let mut config = Config::default();
        config.i18n.default_language = Language::En;
        config.auth.session_recheck_secs = 1;

        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(pool, config, notifier.clone(), Arc::new(llm));
        state.store.publish().unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = routes::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            state,
            notifier,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn client() -> Client {
        Client::builder().cookie_store(true).build().unwrap()
    }

    async fn sign_up(&self, client: &Client, email: &str, password: &str) -> reqwest::Response {
        client
            .post(self.url("/auth/signup"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .unwrap()
    }

    async fn challenge(&self, client: &Client) -> String {
        let html = client.get(self.url("/")).send().await.unwrap().text().await.unwrap();
        attribute_after(&html, "name=\"challenge\" value=\"").expect("home page has a challenge")
    }
}

fn attribute_after(html: &str, marker: &str) -> Option<String> {
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].to_string())
}

fn valid_profile<'a>(email: &'a str) -> Vec<(&'static str, &'a str)> {
    vec![
        ("name", "Rahim Uddin"),
        ("email", email),
        ("phone", "+8801711000000"),
        ("gender", "male"),
        ("blood_type", "O-"),
        ("last_donation_date", ""),
        ("city", "Dhaka"),
        ("mobile_visibility", "on"),
        ("geolocation", ""),
    ]
}

#[tokio::test]
async fn signup_lands_on_dashboard_with_profile_stub() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();

    let response = server.sign_up(&client, "rahim@example.com", "secret1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.url().path(), "/dashboard");
    let body = response.text().await.unwrap();
    assert!(body.contains("rahim"), "display name from email local part");

    let docs = server.state.store.list().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data["email"], "rahim@example.com");

    // Signed-in visitors skip the auth page
    let home = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(home.url().path(), "/dashboard");
}

#[tokio::test]
async fn duplicate_signup_and_bad_password_are_rejected() {
    let server = TestServer::start(FixedLlm(None)).await;
    server
        .sign_up(&TestServer::client(), "karim@example.com", "secret1")
        .await;

    let again = server
        .sign_up(&TestServer::client(), "karim@example.com", "secret2")
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert!(again.text().await.unwrap().contains("already exists"));

    let wrong = TestServer::client()
        .post(server.url("/auth/login"))
        .form(&[("email", "karim@example.com"), ("password", "nope")])
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.text().await.unwrap(), "Invalid email or password.");

    let short = server
        .sign_up(&TestServer::client(), "new@example.com", "abc")
        .await;
    assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn language_toggle_persists_in_cookie() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();

    let english = client.get(server.url("/")).send().await.unwrap().text().await.unwrap();
    assert!(english.contains("Welcome to BloodLink"));

    let toggled = client
        .post(server.url("/language/toggle"))
        .header(reqwest::header::REFERER, server.url("/"))
        .send()
        .await
        .unwrap();
    assert_eq!(toggled.url().path(), "/");
    let bengali = toggled.text().await.unwrap();
    assert!(bengali.contains("ব্লাডলিংকে স্বাগতম"));
    assert!(bengali.contains("lang=\"bn\""));

    // Still Bengali on the next request
    let again = client.get(server.url("/")).send().await.unwrap().text().await.unwrap();
    assert!(again.contains("ব্লাডলিংকে স্বাগতম"));
}

#[tokio::test]
async fn phone_sign_in_uses_the_delivered_code() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();

    // Challenge is required and single use
    let rejected = client
        .post(server.url("/auth/otp/request"))
        .form(&[("phone", "+8801711000000"), ("challenge", "forged")])
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

    let challenge = server.challenge(&client).await;
    let requested = client
        .post(server.url("/auth/otp/request"))
        .form(&[("phone", "+880 1711-000000"), ("challenge", challenge.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(requested.status(), StatusCode::OK);
    assert!(requested.text().await.unwrap().contains("+8801711000000"));

    let code = server.notifier.last_otp().expect("code was delivered");

    let wrong = client
        .post(server.url("/auth/otp/verify"))
        .form(&[("phone", "+8801711000000"), ("code", "000000x")])
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let verified = client
        .post(server.url("/auth/otp/verify"))
        .form(&[("phone", "+8801711000000"), ("code", code.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(verified.url().path(), "/dashboard");
    assert!(verified.text().await.unwrap().contains("User "));

    let docs = server.state.store.list().unwrap();
    assert_eq!(docs[0].data["phone"], "+8801711000000");
}

#[tokio::test]
async fn password_reset_replaces_the_password() {
    let server = TestServer::start(FixedLlm(None)).await;
    server
        .sign_up(&TestServer::client(), "salma@example.com", "oldpass1")
        .await;

    let client = TestServer::client();
    let unknown = client
        .post(server.url("/auth/password-reset"))
        .form(&[("email", "nobody@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::OK);
    assert!(server.notifier.last_reset_link().is_none());

    let requested = client
        .post(server.url("/auth/password-reset"))
        .form(&[("email", "salma@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(requested.status(), StatusCode::OK);

    let link = server.notifier.last_reset_link().expect("reset link sent");
    let token = link.split("token=").nth(1).unwrap().to_string();

    let page = client
        .get(server.url(&format!("/auth/password-reset?token={}", token)))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);

    let confirmed = client
        .post(server.url("/auth/password-reset/confirm"))
        .form(&[("token", token.as_str()), ("password", "newpass1")])
        .send()
        .await
        .unwrap();
    assert_eq!(confirmed.url().path(), "/");
    assert!(confirmed.text().await.unwrap().contains("Your password has been updated"));

    let login = client
        .post(server.url("/auth/login"))
        .form(&[("email", "salma@example.com"), ("password", "newpass1")])
        .send()
        .await
        .unwrap();
    assert_eq!(login.url().path(), "/dashboard");

    // Tokens are single use
    let reused = client
        .get(server.url(&format!("/auth/password-reset?token={}", token)))
        .send()
        .await
        .unwrap();
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_submit_validates_then_saves() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();
    server.sign_up(&client, "rahim@example.com", "secret1").await;

    let mut invalid = valid_profile("rahim@example.com");
    invalid.retain(|(k, _)| *k != "city");
    let rejected = client
        .post(server.url("/profile"))
        .form(&invalid)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(rejected.text().await.unwrap().contains("City is required."));

    let saved = client
        .post(server.url("/profile"))
        .form(&valid_profile("changed@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(saved.status(), StatusCode::OK);
    assert!(saved
        .text()
        .await
        .unwrap()
        .contains("Your information has been saved successfully."));

    let docs = server.state.store.list().unwrap();
    assert_eq!(docs[0].data["bloodType"], "O-");
    // Email is read-only once stored
    assert_eq!(docs[0].data["email"], "rahim@example.com");
    assert!(docs[0].data.get("lastDonationDate").is_none());
}

#[tokio::test]
async fn location_is_formatted_or_rejected() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();
    server.sign_up(&client, "geo@example.com", "secret1").await;

    let ok = client
        .post(server.url("/profile/location"))
        .form(&[("latitude", "23.810332"), ("longitude", "90.4125181")])
        .send()
        .await
        .unwrap();
    assert_eq!(ok.text().await.unwrap(), "23.8103, 90.4125");

    let denied = client
        .post(server.url("/profile/location"))
        .form(&[("latitude", ""), ("longitude", "")])
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(denied.text().await.unwrap(), "Could not retrieve your location.");
}

#[tokio::test]
async fn graphql_lists_donors_without_contacts() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();
    server.sign_up(&client, "rahim@example.com", "secret1").await;
    client
        .post(server.url("/profile"))
        .form(&valid_profile("rahim@example.com"))
        .send()
        .await
        .unwrap();

    let unauthenticated = TestServer::client()
        .post(server.url("/graphql"))
        .json(&json!({ "query": "{ donors { id } }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let body: Value = client
        .post(server.url("/graphql"))
        .json(&json!({
            "query": r#"{ donors(filter: { bloodType: "O-" }) { name city phoneRevealable } me { email } }"#
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let donors = body["data"]["donors"].as_array().unwrap();
    assert_eq!(donors.len(), 1);
    assert_eq!(donors[0]["name"], "Rahim Uddin");
    assert_eq!(donors[0]["phoneRevealable"], true);
    assert_eq!(body["data"]["me"]["email"], "rahim@example.com");
}

#[tokio::test]
async fn matcher_failure_replaces_earlier_results() {
    let server = TestServer::start(SequencedLlm::new(vec![
        Step::reply(match_reply()),
        Step::fail(),
    ]))
    .await;
    let client = TestServer::client();
    server.sign_up(&client, "doc@example.com", "secret1").await;

    let first = client
        .post(server.url("/ai/match"))
        .form(&MATCH_FORM)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let html = first.text().await.unwrap();
    assert!(html.contains("<tr"));
    assert!(html.contains("Rahim"));

    let second = client
        .post(server.url("/ai/match"))
        .form(&MATCH_FORM)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_GATEWAY);
    let html = second.text().await.unwrap();
    assert!(html.contains("Failed to find donor matches"));
    assert!(!html.contains("<tr"));
    assert!(!html.contains("Rahim"));
    assert!(!html.contains("One compatible donor nearby."));

    let faq = client
        .post(server.url("/ai/faq"))
        .form(&[("query", "Can I donate after a cold?")])
        .send()
        .await
        .unwrap();
    assert_eq!(faq.status(), StatusCode::OK);
    let html = faq.text().await.unwrap();
    assert!(html.contains("Can I donate after a cold?"));
    assert!(html.contains("Sorry, I couldn&#x27;t process your request."));
}

#[tokio::test]
async fn invalid_match_form_supersedes_slow_request() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let server = TestServer::start(SequencedLlm::new(vec![Step::held(
        match_reply(),
        entered.clone(),
        release.clone(),
    )]))
    .await;
    let client = TestServer::client();
    server.sign_up(&client, "doc@example.com", "secret1").await;

    let slow = {
        let client = client.clone();
        let url = server.url("/ai/match");
        tokio::spawn(async move { client.post(url).form(&MATCH_FORM).send().await.unwrap() })
    };
    tokio::time::timeout(Duration::from_secs(5), entered.notified())
        .await
        .expect("first match request reached the model");

    let invalid = client
        .post(server.url("/ai/match"))
        .form(&[("patient_blood_type", "O-"), ("patient_city", "Dhaka"), ("search_radius_km", "-3")])
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    release.notify_one();
    let slow = slow.await.unwrap();
    assert_eq!(slow.status(), StatusCode::NO_CONTENT);
    assert!(slow.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn assistant_relays_model_replies() {
    let reply = json!({
        "answer": "Wait until you have fully recovered.",
        "suggestedDonors": [{
            "donorName": "Rahim",
            "donorBloodType": "O-",
            "distanceKm": 2.5,
            "contactInformation": "+8801711000000",
            "suitabilityScore": 95
        }],
        "summary": "One compatible donor nearby."
    });
    let server = TestServer::start(FixedLlm(Some(reply))).await;
    let client = TestServer::client();
    server.sign_up(&client, "doc@example.com", "secret1").await;

    let matches = client
        .post(server.url("/ai/match"))
        .form(&[("patient_blood_type", "O-"), ("patient_city", "Dhaka")])
        .send()
        .await
        .unwrap();
    assert_eq!(matches.status(), StatusCode::OK);
    let html = matches.text().await.unwrap();
    assert!(html.contains("Rahim"));
    assert!(html.contains("One compatible donor nearby."));

    let invalid = client
        .post(server.url("/ai/match"))
        .form(&[("patient_blood_type", "Z"), ("patient_city", "Dhaka")])
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let faq = client
        .post(server.url("/ai/faq"))
        .form(&[("query", "Can I donate after a cold?")])
        .send()
        .await
        .unwrap();
    assert!(faq
        .text()
        .await
        .unwrap()
        .contains("Wait until you have fully recovered."));
}

/// Read SSE frames until `done` holds for the accumulated text.
async fn read_until(response: &mut reqwest::Response, seen: &mut String, done: impl Fn(&str) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(seen) {
            let chunk = response.chunk().await.unwrap().expect("stream ended early");
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("timed out waiting for event");
}

#[tokio::test]
async fn directory_stream_filters_and_reveals() {
    let server = TestServer::start(FixedLlm(None)).await;

    let donor = TestServer::client();
    server.sign_up(&donor, "rahim@example.com", "secret1").await;
    donor
        .post(server.url("/profile"))
        .form(&valid_profile("rahim@example.com"))
        .send()
        .await
        .unwrap();
    let donor_id = server.state.store.list().unwrap()[0].id.clone();

    let seeker = TestServer::client();
    server.sign_up(&seeker, "seeker@example.com", "secret1").await;

    let mut events = seeker
        .get(server.url("/donors/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(events.status(), StatusCode::OK);

    let mut seen = String::new();
    read_until(&mut events, &mut seen, |s| s.contains("Rahim Uddin")).await;
    assert!(!seen.contains("+8801711000000"));

    let view_id = seen
        .lines()
        .skip_while(|l| *l != "event: view")
        .nth(1)
        .and_then(|l| l.strip_prefix("data: "))
        .expect("view event")
        .to_string();

    // Another user cannot address this view
    let foreign = donor
        .post(server.url(&format!("/donors/views/{}/reveal/{}/phone", view_id, donor_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let revealed = seeker
        .post(server.url(&format!("/donors/views/{}/reveal/{}/phone", view_id, donor_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(revealed.status(), StatusCode::OK);
    assert!(revealed.text().await.unwrap().contains("+8801711000000"));

    let searched = seeker
        .post(server.url(&format!("/donors/views/{}/search", view_id)))
        .form(&[("blood_type", "A+"), ("city", "")])
        .send()
        .await
        .unwrap();
    assert_eq!(searched.status(), StatusCode::NO_CONTENT);

    seen.clear();
    read_until(&mut events, &mut seen, |s| s.contains("No donors found")).await;
    assert!(!seen.contains("Rahim Uddin"));
}

#[tokio::test]
async fn deleting_the_account_removes_profile_and_login() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();
    server.sign_up(&client, "gone@example.com", "secret1").await;

    let mut identity = client.get(server.url("/me/events")).send().await.unwrap();
    assert_eq!(identity.status(), StatusCode::OK);
    let mut seen = String::new();
    read_until(&mut identity, &mut seen, |s| s.contains("\"authenticated\"")).await;

    let deleted = client
        .post(server.url("/profile/delete"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.url().path(), "/");
    assert!(server.state.store.list().unwrap().is_empty());

    // The open dashboard hears about it and its stream closes
    read_until(&mut identity, &mut seen, |s| s.contains("\"anonymous\"")).await;
    let rest = tokio::time::timeout(Duration::from_secs(5), identity.chunk())
        .await
        .expect("identity stream closes");
    assert!(matches!(rest, Ok(None)));

    let login = TestServer::client()
        .post(server.url("/auth/login"))
        .form(&[("email", "gone@example.com"), ("password", "secret1")])
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);

    let dashboard = client.get(server.url("/dashboard")).send().await.unwrap();
    assert_eq!(dashboard.url().path(), "/");
}

#[tokio::test]
async fn identity_stream_ends_after_logout_elsewhere() {
    let server = TestServer::start(FixedLlm(None)).await;
    let client = TestServer::client();
    server.sign_up(&client, "tabs@example.com", "secret1").await;

    let mut identity = client.get(server.url("/me/events")).send().await.unwrap();
    let mut seen = String::new();
    read_until(&mut identity, &mut seen, |s| s.contains("\"authenticated\"")).await;

    // Logging out touches no profile document; the periodic recheck finds it
    let logout = client.post(server.url("/auth/logout")).send().await.unwrap();
    assert_eq!(logout.url().path(), "/");

    read_until(&mut identity, &mut seen, |s| s.contains("\"anonymous\"")).await;
    let rest = tokio::time::timeout(Duration::from_secs(5), identity.chunk())
        .await
        .expect("identity stream closes");
    assert!(matches!(rest, Ok(None)));
}
