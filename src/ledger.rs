//! Fee ledger: totals, payment validation and the two fee writes.
//!
//! Payments only ever reflect confirmed server state. A recorded payment is
//! never appended locally; the roster is re-fetched instead. Fee terms are
//! updated locally once the write succeeds.

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::{DeskError, Result};
use crate::models::{day_of, FeeTerms, NewPayment, Payment, PaymentMode, Student};
use crate::roster::RosterView;

pub const INVALID_AMOUNT: &str = "Enter a valid payment amount";
pub const EXCEEDS_DUE: &str = "Payment amount cannot exceed remaining due";
pub const INVALID_TERMS: &str = "Please enter valid total fee and due date";

/// Absorbs binary floating point noise such as `0.1 + 0.2`.
const EPSILON: f64 = 1e-6;

pub fn total_paid(payments: &[Payment]) -> f64 {
    payments.iter().map(|p| p.amount).sum()
}

/// `max(0, total fee - paid)`, recomputed from the current payment list.
pub fn remaining_due(student: &Student) -> f64 {
    (student.total_fee_amount - total_paid(&student.payments)).max(0.0)
}

/// Sum of every student's payments.
pub fn total_earnings(students: &[Student]) -> f64 {
    students.iter().map(|s| total_paid(&s.payments)).sum()
}

/// Whole amounts print without decimals, everything else with two.
pub fn format_amount(value: f64) -> String {
    if (value - value.round()).abs() < EPSILON {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.2}")
    }
}

pub fn format_inr(value: f64) -> String {
    format!("INR {}", format_amount(value))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRow {
    pub id: String,
    pub date: String,
    pub amount: f64,
    pub mode: PaymentMode,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeSummary {
    pub total_fee: f64,
    pub total_paid: f64,
    pub due: f64,
    pub due_date: Option<String>,
    pub payments: Vec<PaymentRow>,
}

impl FeeSummary {
    pub fn for_student(student: &Student) -> Self {
        let payments = student
            .payments
            .iter()
            .map(|p| PaymentRow {
                id: p.id.clone(),
                date: p.date.as_deref().map(day_of).unwrap_or("-").to_string(),
                amount: p.amount,
                mode: p.mode,
                status: p.status_label().to_string(),
            })
            .collect();
        Self {
            total_fee: student.total_fee_amount,
            total_paid: total_paid(&student.payments),
            due: remaining_due(student),
            due_date: student.fee_due_date.as_deref().map(|d| day_of(d).to_string()),
            payments,
        }
    }
}

/// Check `0 < amount <= remaining due`.
pub fn validate_payment(student: &Student, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(DeskError::validation(INVALID_AMOUNT));
    }
    if amount > remaining_due(student) + EPSILON {
        return Err(DeskError::validation(EXCEEDS_DUE));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: f64,
    pub mode: PaymentMode,
    /// RFC 3339 timestamp; the current time when omitted.
    pub date: Option<String>,
}

/// Validate, append the payment on the server, then re-fetch the roster and
/// return the refreshed student.
pub async fn record_payment(
    api: &ApiClient,
    view: &RosterView,
    student: &Student,
    request: &PaymentRequest,
) -> Result<Student> {
    validate_payment(student, request.amount)?;
    let body = NewPayment {
        amount: request.amount,
        date: request
            .date
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        mode: request.mode,
    };
    api.post_payment(&student.id, &body).await?;
    info!(student_id = %student.id, amount = request.amount, mode = %request.mode, "payment recorded");

    let roster = api.list_students(view.list_path()).await?;
    roster
        .into_iter()
        .find(|s| s.id == student.id)
        .ok_or_else(|| {
            warn!(student_id = %student.id, "student missing from refreshed roster");
            DeskError::Decode(format!("Student {} is no longer listed", student.id))
        })
}

fn parse_due_date(raw: &str) -> Option<String> {
    let day = day_of(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Write total fee and due date together; the local copy is updated once
/// the server accepts them.
pub async fn save_fee_terms(
    api: &ApiClient,
    student: &mut Student,
    total_fee_amount: f64,
    due_date: &str,
) -> Result<()> {
    if !total_fee_amount.is_finite() || total_fee_amount < 0.0 {
        return Err(DeskError::validation(INVALID_TERMS));
    }
    let Some(fee_due_date) = parse_due_date(due_date) else {
        return Err(DeskError::validation(INVALID_TERMS));
    };
    let terms = FeeTerms {
        total_fee_amount,
        fee_due_date,
    };
    api.put_fee_terms(&student.id, &terms).await?;
    info!(student_id = %student.id, total = total_fee_amount, due = %terms.fee_due_date, "fee terms saved");
    student.total_fee_amount = terms.total_fee_amount;
    student.fee_due_date = Some(terms.fee_due_date);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::roster::RosterKind;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paid(amount: f64) -> Payment {
        Payment {
            id: format!("p{amount}"),
            amount,
            ..Payment::default()
        }
    }

    fn student_9000() -> Student {
        Student {
            id: "s1".into(),
            name: "Asha".into(),
            total_fee_amount: 9000.0,
            payments: vec![paid(4000.0)],
            ..Student::default()
        }
    }

    #[test]
    fn remaining_due_scenario() {
        let s = student_9000();
        assert_eq!(remaining_due(&s), 5000.0);
        assert_eq!(
            validate_payment(&s, 6000.0).unwrap_err().to_string(),
            EXCEEDS_DUE
        );
        assert!(validate_payment(&s, 5000.0).is_ok());
        assert!(validate_payment(&s, remaining_due(&s) + 1.0).is_err());
    }

    #[test]
    fn non_positive_amounts_rejected_first() {
        let s = student_9000();
        for bad in [0.0, -10.0, f64::NAN] {
            assert_eq!(validate_payment(&s, bad).unwrap_err().to_string(), INVALID_AMOUNT);
        }
    }

    #[test]
    fn remaining_due_is_clamped() {
        let mut s = student_9000();
        s.payments.push(paid(6000.0));
        assert_eq!(remaining_due(&s), 0.0);
        assert!(validate_payment(&s, 1.0).is_err());
    }

    #[test]
    fn summary_and_formatting() {
        let mut s = student_9000();
        s.payments[0].date = Some("2024-02-01T10:00:00Z".into());
        s.fee_due_date = Some("2024-03-31T00:00:00.000Z".into());
        let summary = FeeSummary::for_student(&s);
        assert_eq!(summary.total_paid, 4000.0);
        assert_eq!(summary.due, 5000.0);
        assert_eq!(summary.due_date.as_deref(), Some("2024-03-31"));
        assert_eq!(summary.payments[0].date, "2024-02-01");
        assert_eq!(summary.payments[0].status, "Paid");

        assert_eq!(format_inr(4000.0), "INR 4000");
        assert_eq!(format_amount(1250.5), "1250.50");
        assert_eq!(total_earnings(&[s.clone(), s]), 8000.0);
    }

    #[tokio::test]
    async fn rejected_payment_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let api = ApiClient::new(&server.uri(), None).expect("client");
        let view = RosterView::new(Role::Admin, RosterKind::Students).expect("view");
        let request = PaymentRequest {
            amount: 6000.0,
            mode: PaymentMode::Cash,
            date: None,
        };
        let err = record_payment(&api, &view, &student_9000(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[tokio::test]
    async fn accepted_payment_posts_then_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/students/s1/fees"))
            .and(body_json(serde_json::json!({
                "amount": 5000.0,
                "date": "2024-02-10T09:00:00.000Z",
                "mode": "UPI"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teachers/students"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"_id": "s1", "name": "Asha", "totalFeeAmount": 9000,
                 "payments": [{"_id": "p1", "amount": 4000}, {"_id": "p2", "amount": 5000, "mode": "UPI"}]}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let view = RosterView::new(Role::Teacher, RosterKind::Students).expect("view");
        let request = PaymentRequest {
            amount: 5000.0,
            mode: PaymentMode::Upi,
            date: Some("2024-02-10T09:00:00.000Z".into()),
        };
        let refreshed = record_payment(&api, &view, &student_9000(), &request)
            .await
            .expect("payment");
        assert_eq!(refreshed.payments.len(), 2);
        assert_eq!(remaining_due(&refreshed), 0.0);
    }

    #[tokio::test]
    async fn fee_terms_update_local_copy_after_write() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/students/s1/fees"))
            .and(body_json(serde_json::json!({
                "totalFeeAmount": 12000.0,
                "feeDueDate": "2024-06-30"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let mut s = student_9000();
        assert_eq!(
            save_fee_terms(&api, &mut s, 12000.0, "30-06-2024")
                .await
                .unwrap_err()
                .to_string(),
            INVALID_TERMS
        );
        assert!(save_fee_terms(&api, &mut s, -1.0, "2024-06-30").await.is_err());

        save_fee_terms(&api, &mut s, 12000.0, "2024-06-30")
            .await
            .expect("terms");
        assert_eq!(s.total_fee_amount, 12000.0);
        assert_eq!(s.fee_due_date.as_deref(), Some("2024-06-30"));
        assert_eq!(remaining_due(&s), 8000.0);
    }
}
