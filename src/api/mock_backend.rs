//! In-process fake of the Drishti backend for tests.
//!
//! Serves the same routes as the real backend on `127.0.0.1:0`, keeps all
//! data in memory and counts requests per route.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::stream::ChunkDecoder;

use super::ids::{AnalysisId, AnalysisResultId, MessageId, SessionId, UserId};
use super::types::{
    AuthResponse, BatchAnalysis, BatchAnalysisDetails, BatchResult, CreateAnalysisResponse,
    Message, Role, Session, SessionDetails,
};
use super::{ApiClient, ClientConfig};

/// Bearer token accepted by the fake.
pub const TOKEN: &str = "test-token";
/// Password accepted for every user.
pub const PASSWORD: &str = "secret";
/// Chat requests for this session fail with a non-JSON 500.
pub const BROKEN_SESSION: SessionId = SessionId(500);

const DEFAULT_STREAM: [&[u8]; 3] = [
    b"data: {\"content\":\"Hi\",\"done\":false}\n",
    b"data: {\"content\":\" there\",\"done\":false}\n",
    b"data: {\"content\":\"\",\"done\":true}\n",
];

#[derive(Default)]
struct MockState {
    users: Vec<String>,
    sessions: Vec<SessionDetails>,
    analyses: Vec<BatchAnalysisDetails>,
    next_id: i64,
    stream_body: Vec<Vec<u8>>,
    requests: HashMap<String, usize>,
    last_message_text: Option<String>,
    last_base_url: Option<String>,
}

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, route: &str) {
        *self.requests.entry(route.to_string()).or_default() += 1;
    }
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn check_auth(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if authorized {
        Ok(())
    } else {
        Err(detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }
}

/// Running fake backend.
pub struct MockBackend {
    base_url: String,
    state: Shared,
}

impl MockBackend {
    /// Bind to an ephemeral port and serve in the background.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            stream_body: DEFAULT_STREAM.iter().map(|part| part.to_vec()).collect(),
            ..MockState::default()
        }));

        let router = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/signup", post(signup))
            .route("/sessions", post(create_session).get(list_sessions))
            .route("/sessions/{id}", get(get_session).delete(delete_session))
            .route("/chat/{id}", post(chat))
            .route("/bunch_analyze", post(create_analysis))
            .route("/list_analyses", get(list_analyses))
            .route("/get_analysis/{id}", get(get_analysis))
            .route("/download_analysis/{id}", get(download_analysis))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Base URL of the fake.
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Client pointed at the fake.
    pub fn client(&self) -> ApiClient {
        ApiClient::new(ClientConfig::default().with_base_url(self.base_url.clone())).unwrap()
    }

    /// Raw body parts returned by the next chat requests.
    pub fn set_stream_body(&self, parts: Vec<Vec<u8>>) {
        lock(&self.state).stream_body = parts;
    }

    /// Number of requests seen for a route key such as `"GET /sessions"`.
    pub fn request_count(&self, route: &str) -> usize {
        lock(&self.state).requests.get(route).copied().unwrap_or(0)
    }

    /// Text of the last chat message received.
    pub fn last_message_text(&self) -> Option<String> {
        lock(&self.state).last_message_text.clone()
    }

    /// `base_url` field of the last batch submission.
    pub fn last_base_url(&self) -> Option<String> {
        lock(&self.state).last_base_url.clone()
    }

    /// Insert a session directly, bypassing the API.
    pub fn seed_session(&self, title: &str) -> Session {
        let mut state = lock(&self.state);
        let session = Session {
            id: SessionId(state.next_id()),
            title: title.to_string(),
            created_at: now(),
        };
        state
            .sessions
            .insert(0, SessionDetails::empty(session.clone()));
        session
    }
}

// ===== Auth ==================================================================

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct SignupBody {
    username: String,
    #[allow(dead_code)]
    email: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<LoginBody>) -> Response {
    lock(&state).record("POST /auth/login");
    if body.password != PASSWORD {
        return detail(StatusCode::UNAUTHORIZED, "Incorrect username or password");
    }
    Json(AuthResponse {
        access_token: TOKEN.to_string(),
        user_id: UserId(1),
        username: body.username,
    })
    .into_response()
}

async fn signup(State(state): State<Shared>, Json(body): Json<SignupBody>) -> Response {
    let mut state = lock(&state);
    state.record("POST /auth/signup");
    if body.password.is_empty() || state.users.contains(&body.username) {
        return detail(StatusCode::BAD_REQUEST, "Username already registered");
    }
    state.users.push(body.username.clone());
    let user_id = UserId(i64::try_from(state.users.len()).unwrap_or(i64::MAX));
    Json(AuthResponse {
        access_token: TOKEN.to_string(),
        user_id,
        username: body.username,
    })
    .into_response()
}

// ===== Sessions ==============================================================

#[derive(Deserialize)]
struct CreateSessionBody {
    title: String,
}

async fn create_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Response {
    let mut state = lock(&state);
    state.record("POST /sessions");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    if body.title.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "loc": ["body", "title"], "msg": "field required" }] })),
        )
            .into_response();
    }

    let session = Session {
        id: SessionId(state.next_id()),
        title: body.title,
        created_at: now(),
    };
    state
        .sessions
        .insert(0, SessionDetails::empty(session.clone()));
    Json(session).into_response()
}

async fn list_sessions(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    state.record("GET /sessions");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let sessions: Vec<Session> = state.sessions.iter().map(|d| d.session.clone()).collect();
    Json(sessions).into_response()
}

async fn get_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = lock(&state);
    state.record("GET /sessions/{id}");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    match state.sessions.iter().find(|d| d.session.id == SessionId(id)) {
        Some(details) => Json(details.clone()).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Session not found"),
    }
}

async fn delete_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = lock(&state);
    state.record("DELETE /sessions/{id}");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let before = state.sessions.len();
    state.sessions.retain(|d| d.session.id != SessionId(id));
    if state.sessions.len() == before {
        return detail(StatusCode::NOT_FOUND, "Session not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

// ===== Chat ==================================================================

struct UploadedField {
    name: String,
    file_name: Option<String>,
    text: String,
}

async fn read_fields(mut multipart: Multipart) -> Vec<UploadedField> {
    let mut fields = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let data = field.bytes().await.unwrap_or_default();
        fields.push(UploadedField {
            name,
            file_name,
            text: String::from_utf8_lossy(&data).into_owned(),
        });
    }
    fields
}

fn reply_text(parts: &[Vec<u8>]) -> String {
    let mut decoder = ChunkDecoder::new();
    let mut chunks = Vec::new();
    for part in parts {
        chunks.extend(decoder.push(part));
    }
    chunks.extend(decoder.finish());
    chunks.into_iter().map(|chunk| chunk.content).collect()
}

async fn chat(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Response {
    lock(&state).record("POST /chat");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    if SessionId(id) == BROKEN_SESSION {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }

    let fields = read_fields(multipart).await;
    let text = fields
        .iter()
        .find(|f| f.name == "message_text")
        .map(|f| f.text.clone())
        .unwrap_or_default();
    let files: Vec<String> = fields
        .iter()
        .filter(|f| f.name == "files")
        .filter_map(|f| f.file_name.clone())
        .collect();

    let body = {
        let mut guard = lock(&state);
        let body = guard.stream_body.clone();
        let user_id = guard.next_id();
        let assistant_id = guard.next_id();
        guard.last_message_text = Some(text.clone());

        let Some(session) = guard
            .sessions
            .iter_mut()
            .find(|d| d.session.id == SessionId(id))
        else {
            return detail(StatusCode::NOT_FOUND, "Session not found");
        };

        session.messages.push(Message {
            id: MessageId(user_id),
            content: text,
            role: Role::User,
            file_paths: files.iter().map(|name| format!("uploads/{id}/{name}")).collect(),
            file_urls: files
                .iter()
                .map(|name| format!("/files/{user_id}/{name}"))
                .collect(),
            created_at: now(),
        });
        session.messages.push(Message {
            id: MessageId(assistant_id),
            content: reply_text(&body),
            role: Role::Assistant,
            file_paths: Vec::new(),
            file_urls: Vec::new(),
            created_at: now(),
        });
        body
    };

    let stream = futures::stream::iter(body.into_iter().map(Ok::<_, Infallible>));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

// ===== Batch analysis ========================================================

async fn create_analysis(
    State(state): State<Shared>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    lock(&state).record("POST /bunch_analyze");
    if let Err(response) = check_auth(&headers) {
        return response;
    }

    let fields = read_fields(multipart).await;
    let field = |name: &str| {
        fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.text.clone())
            .unwrap_or_default()
    };
    let title = field("title");
    let prompt = field("prompt");
    let base_url = field("base_url");

    let mut guard = lock(&state);
    guard.last_base_url = Some(base_url);
    let analysis_id = AnalysisId(guard.next_id());
    let mut results = Vec::new();
    for upload in fields.iter().filter(|f| f.name == "files") {
        let name = upload.file_name.clone().unwrap_or_default();
        results.push(BatchResult {
            id: AnalysisResultId(guard.next_id()),
            file_url: format!("/uploads/batch/{analysis_id}/{name}"),
            response: format!("Analysed {name}"),
            created_at: now(),
        });
    }
    guard.analyses.insert(
        0,
        BatchAnalysisDetails {
            id: analysis_id,
            title,
            prompt,
            created_at: now(),
            results,
        },
    );

    Json(CreateAnalysisResponse {
        message: "Analysis completed".to_string(),
        analysis_id,
    })
    .into_response()
}

async fn list_analyses(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    state.record("GET /list_analyses");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let rows: Vec<BatchAnalysis> = state
        .analyses
        .iter()
        .map(|a| BatchAnalysis {
            id: a.id,
            title: a.title.clone(),
            prompt: a.prompt.clone(),
            results_count: u32::try_from(a.results.len()).unwrap_or(u32::MAX),
            created_at: a.created_at.clone(),
        })
        .collect();
    Json(rows).into_response()
}

async fn get_analysis(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = lock(&state);
    state.record("GET /get_analysis/{id}");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    match state.analyses.iter().find(|a| a.id == AnalysisId(id)) {
        Some(analysis) => Json(analysis.clone()).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Analysis not found"),
    }
}

async fn download_analysis(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = lock(&state);
    state.record("GET /download_analysis/{id}");
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let Some(analysis) = state.analyses.iter().find(|a| a.id == AnalysisId(id)) else {
        return detail(StatusCode::NOT_FOUND, "Analysis not found");
    };

    let mut csv = String::from("file_url,response\n");
    for result in &analysis.results {
        csv.push_str(&format!("{},{}\n", result.file_url, result.response));
    }
    ([(header::CONTENT_TYPE, "text/csv")], csv).into_response()
}
