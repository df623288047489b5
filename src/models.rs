//! Records exchanged with the school records service.
//!
//! Field names follow the service's camelCase JSON. Every field is
//! defaulted so partially populated documents deserialize; amounts and
//! classes are read leniently because older records store them as strings
//! or numbers interchangeably.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Lenient field readers
// ---------------------------------------------------------------------------

fn de_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn de_lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = de_lenient_string(deserializer)?;
    let trimmed = s.trim();
    Ok(if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    })
}

fn de_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// `null` and unknown shapes read as `false`; `"true"` and non-zero numbers
/// read as `true`.
fn de_lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}

fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// First ten characters of an ISO date or timestamp (`YYYY-MM-DD`).
pub fn day_of(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(10) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AttendanceRecord {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "de_lenient_bool")]
    pub present: bool,
}

impl AttendanceRecord {
    pub fn new(date: impl Into<String>, present: bool) -> Self {
        Self {
            date: date.into(),
            present,
        }
    }

    /// The record's calendar day, truncated from any timestamp.
    pub fn day(&self) -> &str {
        day_of(&self.date)
    }
}

/// Body of one attendance write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceMark {
    pub date: String,
    pub present: bool,
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PaymentMode {
    #[default]
    Cash,
    #[serde(rename = "UPI")]
    Upi,
    Netbanking,
}

impl PaymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Upi => "UPI",
            PaymentMode::Netbanking => "Netbanking",
        }
    }

    /// Lenient parse used for stored records; anything unknown is cash.
    pub fn from_value(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMode::Cash),
            "upi" => Ok(PaymentMode::Upi),
            "netbanking" | "net banking" => Ok(PaymentMode::Netbanking),
            other => Err(format!(
                "Invalid payment mode: {other}. Must be Cash, UPI, or Netbanking"
            )),
        }
    }
}

fn de_payment_mode<'de, D>(deserializer: D) -> Result<PaymentMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(PaymentMode::from_value(raw.as_deref()))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "de_lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de_payment_mode")]
    pub mode: PaymentMode,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_no: Option<String>,
}

impl Payment {
    pub fn status_label(&self) -> &str {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Paid")
    }
}

/// Body of a payment append.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewPayment {
    pub amount: f64,
    pub date: String,
    pub mode: PaymentMode,
}

/// Body of a fee-terms update.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeTerms {
    pub total_fee_amount: f64,
    pub fee_due_date: String,
}

// ---------------------------------------------------------------------------
// Marks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SubjectMarks {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub subject: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub assessments: BTreeMap<String, Option<u16>>,
}

// ---------------------------------------------------------------------------
// Students and teachers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Demographics {
    #[serde(deserialize_with = "de_lenient_string")]
    pub dob: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub gender: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub address: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MotherDetails {
    #[serde(deserialize_with = "de_lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub phone: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub aadhar_number: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub bank_account_type: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub account_number: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub bank_name: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub branch: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub ifsc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FatherDetails {
    #[serde(deserialize_with = "de_lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub phone: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub aadhar_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "de_lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "de_lenient_opt_string")]
    pub admission_number: Option<String>,
    #[serde(rename = "class", default, deserialize_with = "de_lenient_opt_string")]
    pub class: Option<String>,
    #[serde(default)]
    pub date_of_admission: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub demographics: Demographics,
    #[serde(default, deserialize_with = "de_null_default")]
    pub mother_details: MotherDetails,
    #[serde(default, deserialize_with = "de_null_default")]
    pub father_details: FatherDetails,
    #[serde(default, deserialize_with = "de_lenient_vec")]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default, deserialize_with = "de_lenient_vec")]
    pub payments: Vec<Payment>,
    #[serde(default, deserialize_with = "de_lenient_vec")]
    pub marks: Vec<SubjectMarks>,
    #[serde(default, deserialize_with = "de_amount")]
    pub total_fee_amount: f64,
    #[serde(default, alias = "dueDate")]
    pub fee_due_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TeacherDemographics {
    #[serde(deserialize_with = "de_lenient_string")]
    pub dob: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub gender: String,
    #[serde(deserialize_with = "de_lenient_string")]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "de_lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_opt_string")]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_vec")]
    pub classes: Vec<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub demographic_details: TeacherDemographics,
    #[serde(default, deserialize_with = "de_lenient_vec")]
    pub attendance: Vec<AttendanceRecord>,
}

/// Role returned by the login endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_deserializes_with_lenient_fields() {
        let raw = serde_json::json!({
            "_id": "s1",
            "name": "Asha",
            "class": 3,
            "admissionNumber": 1042,
            "attendance": [{"date": "2024-01-01T00:00:00.000Z", "present": true}],
            "payments": [
                {"_id": "p1", "amount": 4000, "mode": "UPI", "date": "2024-02-01T10:00:00Z"},
                {"_id": "p2", "amount": "500", "mode": "cheque"},
                {"_id": "p3", "amount": null}
            ],
            "marks": null,
            "totalFeeAmount": 9000,
            "feeDueDate": "2024-03-31T00:00:00.000Z"
        });
        let student: Student = serde_json::from_value(raw).expect("student");
        assert_eq!(student.class.as_deref(), Some("3"));
        assert_eq!(student.admission_number.as_deref(), Some("1042"));
        assert_eq!(student.attendance[0].day(), "2024-01-01");
        assert_eq!(student.payments[0].mode, PaymentMode::Upi);
        assert_eq!(student.payments[1].amount, 500.0);
        assert_eq!(student.payments[1].mode, PaymentMode::Cash);
        assert_eq!(student.payments[2].amount, 0.0);
        assert!(student.marks.is_empty());
        assert_eq!(student.total_fee_amount, 9000.0);
    }

    #[test]
    fn explicit_nulls_read_as_defaults() {
        let raw = serde_json::json!({
            "_id": null,
            "name": "Ravi",
            "demographics": {"dob": null, "gender": "M", "address": null, "phone": 98765},
            "motherDetails": null,
            "fatherDetails": {"name": "Mohan", "phone": null, "aadharNumber": null},
            "attendance": [
                {"date": "2024-01-01", "present": null},
                {"date": "2024-01-02", "present": "true"},
                {"date": null, "present": 1}
            ]
        });
        let student: Student = serde_json::from_value(raw).expect("student");
        assert_eq!(student.id, "");
        assert_eq!(student.demographics.dob, "");
        assert_eq!(student.demographics.gender, "M");
        assert_eq!(student.demographics.phone, "98765");
        assert_eq!(student.mother_details, MotherDetails::default());
        assert_eq!(student.father_details.name, "Mohan");
        assert_eq!(student.father_details.phone, "");
        let present: Vec<bool> = student.attendance.iter().map(|a| a.present).collect();
        assert_eq!(present, vec![false, true, true]);
        assert_eq!(student.attendance[2].day(), "");

        let teacher: Teacher = serde_json::from_value(serde_json::json!({
            "_id": "t1",
            "demographicDetails": null,
            "attendance": [{"date": "2024-01-01", "present": null}]
        }))
        .expect("teacher");
        assert_eq!(teacher.demographic_details, TeacherDemographics::default());
        assert!(!teacher.attendance[0].present);
    }

    #[test]
    fn teacher_deserializes_minimal_document() {
        let teacher: Teacher =
            serde_json::from_value(serde_json::json!({"_id": "t1", "name": "Ravi"}))
                .expect("teacher");
        assert!(teacher.classes.is_empty());
        assert!(teacher.attendance.is_empty());
    }

    #[test]
    fn payment_mode_parse_and_wire_names() {
        assert_eq!("upi".parse::<PaymentMode>(), Ok(PaymentMode::Upi));
        assert_eq!(" NetBanking ".parse::<PaymentMode>(), Ok(PaymentMode::Netbanking));
        assert!("card".parse::<PaymentMode>().is_err());
        assert_eq!(
            serde_json::to_value(PaymentMode::Upi).expect("ser"),
            serde_json::json!("UPI")
        );
    }

    #[test]
    fn day_of_truncates_timestamps() {
        assert_eq!(day_of("2024-01-02T10:11:12Z"), "2024-01-02");
        assert_eq!(day_of("2024-01-02"), "2024-01-02");
        assert_eq!(day_of(""), "");
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!("Teacher".parse::<Role>(), Ok(Role::Teacher));
        assert!("parent".parse::<Role>().is_err());
    }
}
