//! School records service client.
//!
//! Every request goes through [`ApiClient::send`], which attaches the
//! session's bearer token when one is present and non-blank, and omits the
//! `Authorization` header entirely otherwise.

use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{normalize_base_url, AppConfig};
use crate::error::{friendly_error, status_error, DeskError, Result};
use crate::models::{
    AttendanceMark, AttendanceRecord, FeeTerms, NewPayment, Student, SubjectMarks, Teacher,
};
use crate::roster::{RosterKind, StudentForm, TeacherForm};
use crate::session::{Credentials, LoginResponse, Session};

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ApiClient {
    base: String,
    client: Client,
    session: Option<Session>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Option<Session>) -> Result<Self> {
        Self::with_timeout(base_url, session, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, session: Option<Session>, timeout: Duration) -> Result<Self> {
        let base = normalize_base_url(base_url);
        if base.is_empty() {
            return Err(DeskError::validation("School server URL is not configured"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeskError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base,
            client,
            session,
        })
    }

    pub fn from_config(cfg: &AppConfig, session: Option<Session>) -> Result<Self> {
        Self::with_timeout(&cfg.api_base_url, session, cfg.request_timeout())
    }

    /// Same client with a different session attached (or none).
    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    // -----------------------------------------------------------------------
    // Generic request
    // -----------------------------------------------------------------------

    /// Perform a request against the records service.
    ///
    /// `path` should include the leading slash, e.g. `/students/me`.
    /// Returns the JSON body, or `Value::Null` for empty responses.
    pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let full_url = format!("{}{path}", self.base);
        let mut req = self.client.request(method.clone(), &full_url);
        if let Some(session) = self.session.as_ref().filter(|s| s.has_token()) {
            req = req.bearer_auth(session.token());
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        debug!(method = %method, path, "school server request");
        let resp = req
            .send()
            .await
            .map_err(|e| DeskError::Transport(friendly_error(&self.base, &e)))?;
        let status = resp.status();

        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|json| {
                    json.get("error")
                        .or_else(|| json.get("message"))
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string())
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| status_error(status));
            warn!(method = %method, path, status = status.as_u16(), %message, "school server rejected request");
            return Err(DeskError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body_text = resp
            .text()
            .await
            .map_err(|e| DeskError::Transport(friendly_error(&self.base, &e)))?;
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| DeskError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.send(Method::GET, path, None).await?;
        serde_json::from_value(value).map_err(|e| DeskError::Decode(e.to_string()))
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let value = self.send(Method::GET, path, None).await?;
        decode_list(value)
    }

    async fn send_body<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<Value> {
        let value = serde_json::to_value(body).map_err(|e| DeskError::Decode(e.to_string()))?;
        self.send(method, path, Some(value)).await
    }

    /// Download raw bytes from an absolute URL (used for the receipt logo).
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DeskError::Transport(friendly_error(url, &e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DeskError::Server {
                status: status.as_u16(),
                message: status_error(status),
            });
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DeskError::Transport(friendly_error(url, &e)))?;
        Ok(bytes.to_vec())
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub(crate) async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        let body = serde_json::json!({
            "email": credentials.email.trim(),
            "password": credentials.password.as_str(),
        });
        let value = self.send(Method::POST, "/auth/login", Some(body)).await?;
        serde_json::from_value(value).map_err(|e| DeskError::Decode(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Rosters
    // -----------------------------------------------------------------------

    pub async fn list_students(&self, path: &str) -> Result<Vec<Student>> {
        self.get_list(path).await
    }

    pub async fn list_teachers(&self) -> Result<Vec<Teacher>> {
        self.get_list("/admins/teachers").await
    }

    pub async fn fetch_student_self(&self) -> Result<Student> {
        self.get_json("/students/me").await
    }

    pub async fn fetch_teacher_self(&self) -> Result<Teacher> {
        self.get_json("/teachers/me").await
    }

    /// The signed-in teacher's own attendance history.
    pub async fn fetch_teacher_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        self.get_list("/teachers/attendance").await
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn put_attendance(&self, kind: RosterKind, id: &str, mark: &AttendanceMark) -> Result<()> {
        let path = format!("{}/{}", kind.attendance_base(), checked_id(id)?);
        self.send_body(Method::PUT, &path, mark).await.map(|_| ())
    }

    pub async fn put_marks(&self, student_id: &str, marks: &[SubjectMarks]) -> Result<()> {
        let path = format!("/marks/{}", checked_id(student_id)?);
        let body = serde_json::json!({ "marks": marks });
        self.send(Method::PUT, &path, Some(body)).await.map(|_| ())
    }

    pub async fn post_payment(&self, student_id: &str, payment: &NewPayment) -> Result<()> {
        let path = format!("/students/{}/fees", checked_id(student_id)?);
        self.send_body(Method::POST, &path, payment).await.map(|_| ())
    }

    pub async fn put_fee_terms(&self, student_id: &str, terms: &FeeTerms) -> Result<()> {
        let path = format!("/students/{}/fees", checked_id(student_id)?);
        self.send_body(Method::PUT, &path, terms).await.map(|_| ())
    }

    pub async fn create_student(&self, form: &StudentForm) -> Result<()> {
        let body = form.create_payload()?;
        self.send(Method::POST, "/students", Some(body)).await.map(|_| ())
    }

    pub async fn update_student(&self, id: &str, form: &StudentForm) -> Result<()> {
        let body = form.update_payload()?;
        let path = format!("/admin-edit/{}", checked_id(id)?);
        self.send(Method::PUT, &path, Some(body)).await.map(|_| ())
    }

    pub async fn delete_student(&self, id: &str) -> Result<()> {
        let path = format!("/students/{}", checked_id(id)?);
        self.send(Method::DELETE, &path, None).await.map(|_| ())
    }

    pub async fn create_teacher(&self, form: &TeacherForm) -> Result<()> {
        let body = form.create_payload()?;
        self.send(Method::POST, "/admins/register", Some(body))
            .await
            .map(|_| ())
    }

    pub async fn update_teacher(&self, id: &str, form: &TeacherForm) -> Result<()> {
        let body = form.update_payload()?;
        let path = format!("/admins/teacher/{}", checked_id(id)?);
        self.send(Method::PUT, &path, Some(body)).await.map(|_| ())
    }

    pub async fn delete_teacher(&self, id: &str) -> Result<()> {
        let path = format!("/teachers/{}", checked_id(id)?);
        self.send(Method::DELETE, &path, None).await.map(|_| ())
    }
}

/// Non-array bodies are treated as an empty list.
fn decode_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| DeskError::Decode(e.to_string())))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Reject ids that would escape their path segment.
fn checked_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(DeskError::validation("Missing record id"));
    }
    if id.contains(['/', '?', '#', '%']) || id.contains("..") {
        return Err(DeskError::validation(format!("Invalid record id: {id}")));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentMode, Role};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    #[tokio::test]
    async fn bearer_header_sent_when_session_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students/me"))
            .and(header("Authorization", "Bearer tok-42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"_id": "s1", "name": "Asha"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), Some(Session::new("tok-42", Role::Student)))
            .expect("client");
        let me = api.fetch_student_self().await.expect("me");
        assert_eq!(me.id, "s1");
    }

    #[tokio::test]
    async fn authorization_header_omitted_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admins/teachers"))
            .respond_with(|req: &Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!([]))
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let teachers = api.list_teachers().await.expect("teachers");
        assert!(teachers.is_empty());
    }

    #[tokio::test]
    async fn blank_session_token_sends_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admins/teachers"))
            .respond_with(|req: &Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!([]))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), Some(Session::new("", Role::Admin)))
            .expect("client");
        assert!(api.list_teachers().await.expect("empty token").is_empty());

        let api = api.with_session(Some(Session::new("   ", Role::Admin)));
        assert!(api.list_teachers().await.expect("blank token").is_empty());
    }

    #[tokio::test]
    async fn roster_with_null_fields_still_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admins/students"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"_id": "s1", "name": "Asha", "class": "5"},
                {
                    "_id": "s2",
                    "name": "Ravi",
                    "class": 5,
                    "demographics": {"dob": null, "gender": null, "address": "Main Rd", "phone": null},
                    "motherDetails": null,
                    "fatherDetails": {"name": null},
                    "attendance": [
                        {"date": "2024-01-01", "present": null},
                        {"date": null, "present": true}
                    ],
                    "marks": [{"subject": null, "assessments": null}]
                }
            ])))
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let students = api.list_students("/admins/students").await.expect("students");
        assert_eq!(students.len(), 2);
        let ravi = &students[1];
        assert_eq!(ravi.demographics.dob, "");
        assert_eq!(ravi.demographics.address, "Main Rd");
        assert_eq!(ravi.mother_details, crate::models::MotherDetails::default());
        assert!(!ravi.attendance[0].present);
        assert_eq!(ravi.attendance[1].date, "");
        assert!(ravi.marks[0].assessments.is_empty());
    }

    #[tokio::test]
    async fn non_array_list_body_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/teachers/students"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let students = api.list_students("/teachers/students").await.expect("students");
        assert!(students.is_empty());
    }

    #[tokio::test]
    async fn server_rejection_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/students/s1/fees"))
            .and(body_json(serde_json::json!({
                "amount": 500.0,
                "date": "2024-02-01T00:00:00Z",
                "mode": "UPI"
            })))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({"message": "Ledger closed"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let err = api
            .post_payment(
                "s1",
                &NewPayment {
                    amount: 500.0,
                    date: "2024-02-01T00:00:00Z".into(),
                    mode: PaymentMode::Upi,
                },
            )
            .await
            .unwrap_err();
        match err {
            DeskError::Server { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Ledger closed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let api = ApiClient::with_timeout("http://127.0.0.1:1", None, Duration::from_secs(2))
            .expect("client");
        let err = api.list_teachers().await.unwrap_err();
        assert!(matches!(err, DeskError::Transport(_)));
    }

    #[test]
    fn ids_with_path_characters_are_rejected() {
        assert!(checked_id("65ab12").is_ok());
        assert!(checked_id(" ").is_err());
        assert!(checked_id("../admins").is_err());
        assert!(checked_id("a/b").is_err());
    }
}
