//! Rosters of students and teachers: which list a role may see, how it is
//! filtered, and the create/update forms for roster records.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiClient;
use crate::error::{DeskError, Result};
use crate::models::{
    AttendanceRecord, Demographics, FatherDetails, MotherDetails, Role, Student, Teacher,
    TeacherDemographics,
};

pub const TEACHER_ROSTER_DENIED: &str = "You don't have access to view teachers' attendance.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RosterKind {
    Students,
    Teachers,
}

impl RosterKind {
    /// Base path for per-entity attendance writes.
    pub fn attendance_base(self) -> &'static str {
        match self {
            RosterKind::Students => "/students/attendance",
            RosterKind::Teachers => "/teachers/attendance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RosterKind::Students => "students",
            RosterKind::Teachers => "teachers",
        }
    }
}

/// Which roster a role is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterView {
    role: Role,
    kind: RosterKind,
}

impl RosterView {
    pub fn new(role: Role, kind: RosterKind) -> Result<Self> {
        match (role, kind) {
            (Role::Admin, _) | (Role::Teacher, RosterKind::Students) => Ok(Self { role, kind }),
            (Role::Teacher, RosterKind::Teachers) => {
                Err(DeskError::Forbidden(TEACHER_ROSTER_DENIED.to_string()))
            }
            (Role::Student, _) => Err(DeskError::Forbidden(
                "Students cannot view school rosters.".to_string(),
            )),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> RosterKind {
        self.kind
    }

    /// List endpoint for this view.
    pub fn list_path(&self) -> &'static str {
        match (self.role, self.kind) {
            (Role::Admin, RosterKind::Teachers) => "/admins/teachers",
            (Role::Admin, RosterKind::Students) => "/admins/students",
            _ => "/teachers/students",
        }
    }
}

/// A student or teacher flattened to what the attendance table shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub admission_number: Option<String>,
    pub class_label: String,
    /// Class used for filtering; teachers have none.
    pub class: Option<String>,
    pub attendance: Vec<AttendanceRecord>,
}

impl From<&Student> for RosterEntry {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            admission_number: s.admission_number.clone(),
            class_label: s.class.clone().unwrap_or_else(|| "N/A".to_string()),
            class: s.class.clone(),
            attendance: s.attendance.clone(),
        }
    }
}

impl From<&Teacher> for RosterEntry {
    fn from(t: &Teacher) -> Self {
        let class_label = if t.classes.is_empty() {
            "N/A".to_string()
        } else {
            t.classes.join(", ")
        };
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            admission_number: None,
            class_label,
            class: None,
            attendance: t.attendance.clone(),
        }
    }
}

/// Fetch the roster for `view` as attendance entries.
pub async fn load_entries(api: &ApiClient, view: &RosterView) -> Result<Vec<RosterEntry>> {
    match view.kind() {
        RosterKind::Students => {
            let students = api.list_students(view.list_path()).await?;
            Ok(students.iter().map(RosterEntry::from).collect())
        }
        RosterKind::Teachers => {
            let teachers = api.list_teachers().await?;
            Ok(teachers.iter().map(RosterEntry::from).collect())
        }
    }
}

/// Student list endpoint for a staff role.
pub fn student_list_path(role: Role) -> Result<&'static str> {
    RosterView::new(role, RosterKind::Students).map(|v| v.list_path())
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Case-insensitive exact class match; `None`/empty filter matches all.
pub fn matches_class(class: Option<&str>, filter: Option<&str>) -> bool {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        None => true,
        Some(f) => class
            .map(|c| c.trim().eq_ignore_ascii_case(f))
            .unwrap_or(false),
    }
}

/// Case-insensitive substring match on name.
pub fn matches_name(name: &str, filter: Option<&str>) -> bool {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        None => true,
        Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
    }
}

pub fn filter_students<'a>(
    students: &'a [Student],
    class_filter: Option<&str>,
    name_filter: Option<&str>,
) -> Vec<&'a Student> {
    students
        .iter()
        .filter(|s| matches_class(s.class.as_deref(), class_filter))
        .filter(|s| matches_name(&s.name, name_filter))
        .collect()
}

/// Sorted distinct, non-empty classes.
pub fn distinct_classes(students: &[Student]) -> Vec<String> {
    let mut classes: Vec<String> = students
        .iter()
        .filter_map(|s| s.class.as_deref().map(str::trim))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    classes.sort();
    classes.dedup();
    classes
}

// ---------------------------------------------------------------------------
// Dashboard summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub students: usize,
    pub teachers: usize,
    pub students_per_class: BTreeMap<String, usize>,
    pub teachers_per_class: BTreeMap<String, usize>,
    pub earnings: f64,
}

pub fn dashboard_summary(students: &[Student], teachers: &[Teacher]) -> DashboardSummary {
    let mut students_per_class = BTreeMap::new();
    for s in students {
        let class = s.class.clone().unwrap_or_else(|| "N/A".to_string());
        *students_per_class.entry(class).or_insert(0) += 1;
    }
    let mut teachers_per_class = BTreeMap::new();
    for t in teachers {
        for class in &t.classes {
            *teachers_per_class.entry(class.clone()).or_insert(0) += 1;
        }
    }
    let earnings = students
        .iter()
        .map(|s| crate::ledger::total_paid(&s.payments))
        .sum();
    DashboardSummary {
        students: students.len(),
        teachers: teachers.len(),
        students_per_class,
        teachers_per_class,
        earnings,
    }
}

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

fn is_alpha_text(v: &str) -> bool {
    v.chars().all(|c| c.is_ascii_alphabetic() || c == ' ')
}

fn is_digits(v: &str) -> bool {
    v.chars().all(|c| c.is_ascii_digit())
}

fn is_email(v: &str) -> bool {
    if v.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = v.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn is_phone(v: &str) -> bool {
    v.len() == 10 && is_digits(v) && !v.starts_with('0')
}

fn student_password_ok(pwd: &str) -> bool {
    pwd.chars().count() >= 6 && pwd.chars().any(|c| c.is_ascii_digit())
}

const PASSWORD_SPECIALS: &[char] = &['@', '$', '!', '%', '*', '?', '&'];

fn teacher_password_ok(pwd: &str) -> bool {
    pwd.chars().count() >= 6
        && pwd.chars().any(|c| c.is_ascii_uppercase())
        && pwd.chars().any(|c| c.is_ascii_digit())
        && pwd.chars().any(|c| PASSWORD_SPECIALS.contains(&c))
}

/// Valid `YYYY-MM-DD` not in the future.
fn is_past_date(v: &str) -> bool {
    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
        .map(|d| d <= Local::now().date_naive())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudentDetails {
    pub name: String,
    pub admission_number: String,
    pub class: String,
    pub date_of_admission: String,
    pub demographics: Demographics,
    pub mother_details: MotherDetails,
    pub father_details: FatherDetails,
}

impl StudentDetails {
    /// Edit form seeded from an existing record.
    pub fn from_student(s: &Student) -> Self {
        let mut demographics = s.demographics.clone();
        demographics.dob = crate::models::day_of(&demographics.dob).to_string();
        Self {
            name: s.name.clone(),
            admission_number: s.admission_number.clone().unwrap_or_default(),
            class: s.class.clone().unwrap_or_default(),
            date_of_admission: s
                .date_of_admission
                .as_deref()
                .map(crate::models::day_of)
                .unwrap_or_default()
                .to_string(),
            demographics,
            mother_details: s.mother_details.clone(),
            father_details: s.father_details.clone(),
        }
    }
}

/// Student create/edit form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentForm {
    pub email: String,
    pub password: String,
    pub details: StudentDetails,
}

impl StudentForm {
    pub fn validate(&self, creating: bool) -> Result<()> {
        let d = &self.details;
        if !is_alpha_text(&d.name)
            || !is_alpha_text(&d.mother_details.name)
            || !is_alpha_text(&d.father_details.name)
        {
            return Err(DeskError::validation("Names may contain letters and spaces only"));
        }
        let numeric = [
            &d.admission_number,
            &d.demographics.phone,
            &d.mother_details.phone,
            &d.mother_details.aadhar_number,
            &d.mother_details.account_number,
            &d.father_details.phone,
            &d.father_details.aadhar_number,
        ];
        if numeric.iter().any(|v| !is_digits(v)) {
            return Err(DeskError::validation(
                "Admission, phone, Aadhaar and account numbers must be digits only",
            ));
        }
        if creating && !is_email(self.email.trim()) {
            return Err(DeskError::validation("Enter a valid email"));
        }
        if (creating || !self.password.is_empty()) && !student_password_ok(&self.password) {
            return Err(DeskError::validation(
                "Password must be minimum 6 characters and contain a number",
            ));
        }
        Ok(())
    }

    pub(crate) fn create_payload(&self) -> Result<Value> {
        self.validate(true)?;
        Ok(serde_json::json!({
            "email": self.email.trim(),
            "password": self.password,
            "details": self.details,
        }))
    }

    /// Edit payload; an empty password is left out.
    pub(crate) fn update_payload(&self) -> Result<Value> {
        self.validate(false)?;
        let mut body = serde_json::to_value(&self.details)
            .map_err(|e| DeskError::Decode(e.to_string()))?;
        if let Value::Object(map) = &mut body {
            if !self.email.trim().is_empty() {
                map.insert("email".into(), Value::String(self.email.trim().to_string()));
            }
            if !self.password.is_empty() {
                map.insert("password".into(), Value::String(self.password.clone()));
            }
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeacherDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub classes: Vec<String>,
    pub demographic_details: TeacherDemographics,
}

impl TeacherDetails {
    pub fn from_teacher(t: &Teacher) -> Self {
        let mut demographic_details = t.demographic_details.clone();
        demographic_details.dob = crate::models::day_of(&demographic_details.dob).to_string();
        Self {
            name: t.name.clone(),
            email: t.email.clone().unwrap_or_default(),
            phone: t.phone.clone().unwrap_or_default(),
            subject: t.subject.clone().unwrap_or_default(),
            classes: t.classes.clone(),
            demographic_details,
        }
    }

    /// Add the class if missing, remove it otherwise.
    pub fn toggle_class(&mut self, class: &str) {
        if let Some(pos) = self.classes.iter().position(|c| c == class) {
            self.classes.remove(pos);
        } else {
            self.classes.push(class.to_string());
        }
    }
}

/// Teacher create/edit form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeacherForm {
    pub password: String,
    pub details: TeacherDetails,
}

impl TeacherForm {
    pub fn validate(&self, creating: bool) -> Result<()> {
        let t = &self.details;
        let name = t.name.trim();
        if name.is_empty() || !is_alpha_text(name) || name.chars().count() < 3 {
            return Err(DeskError::validation(
                "Name must be alphabets only and at least 3 characters",
            ));
        }
        if creating && !is_email(t.email.trim()) {
            return Err(DeskError::validation("Enter a valid email"));
        }
        if !is_phone(t.phone.trim()) {
            return Err(DeskError::validation(
                "Phone must be 10 digits and cannot start with 0",
            ));
        }
        if t.classes.is_empty() {
            return Err(DeskError::validation("Select at least one class"));
        }
        let d = &t.demographic_details;
        if !is_past_date(&d.dob) {
            return Err(DeskError::validation("Invalid Date of Birth"));
        }
        if d.gender.trim().is_empty() {
            return Err(DeskError::validation("Gender is required"));
        }
        if d.address.trim().chars().count() < 5 {
            return Err(DeskError::validation("Address must be minimum 5 characters"));
        }
        if (creating || !self.password.is_empty()) && !teacher_password_ok(&self.password) {
            return Err(DeskError::validation(
                "Password must be min 6 chars with 1 uppercase, 1 number, 1 special char",
            ));
        }
        Ok(())
    }

    pub(crate) fn create_payload(&self) -> Result<Value> {
        self.validate(true)?;
        Ok(serde_json::json!({
            "email": self.details.email.trim(),
            "password": self.password,
            "role": "teacher",
            "details": self.details,
        }))
    }

    pub(crate) fn update_payload(&self) -> Result<Value> {
        self.validate(false)?;
        let mut body = serde_json::to_value(&self.details)
            .map_err(|e| DeskError::Decode(e.to_string()))?;
        if let Value::Object(map) = &mut body {
            if !self.password.is_empty() {
                map.insert("password".into(), Value::String(self.password.clone()));
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, name: &str, class: Option<&str>) -> Student {
        Student {
            id: id.into(),
            name: name.into(),
            class: class.map(str::to_string),
            ..Student::default()
        }
    }

    fn valid_teacher() -> TeacherForm {
        TeacherForm {
            password: "Secret1!".into(),
            details: TeacherDetails {
                name: "Lakshmi Devi".into(),
                email: "lakshmi@school.test".into(),
                phone: "9876543210".into(),
                subject: "Maths".into(),
                classes: vec!["3".into()],
                demographic_details: TeacherDemographics {
                    dob: "1985-06-01".into(),
                    gender: "Female".into(),
                    address: "Main Road, Vadisaleru".into(),
                },
            },
        }
    }

    #[test]
    fn teacher_cannot_view_teacher_roster() {
        let err = RosterView::new(Role::Teacher, RosterKind::Teachers).unwrap_err();
        match err {
            DeskError::Forbidden(msg) => assert_eq!(msg, TEACHER_ROSTER_DENIED),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(RosterView::new(Role::Student, RosterKind::Students).is_err());
    }

    #[test]
    fn list_paths_follow_role() {
        let admin = RosterView::new(Role::Admin, RosterKind::Students).expect("view");
        assert_eq!(admin.list_path(), "/admins/students");
        let admin_t = RosterView::new(Role::Admin, RosterKind::Teachers).expect("view");
        assert_eq!(admin_t.list_path(), "/admins/teachers");
        let teacher = RosterView::new(Role::Teacher, RosterKind::Students).expect("view");
        assert_eq!(teacher.list_path(), "/teachers/students");
    }

    #[test]
    fn teacher_entry_joins_classes() {
        let t = Teacher {
            id: "t1".into(),
            name: "Ravi".into(),
            classes: vec!["3".into(), "4".into()],
            ..Teacher::default()
        };
        assert_eq!(RosterEntry::from(&t).class_label, "3, 4");
        let none = Teacher::default();
        assert_eq!(RosterEntry::from(&none).class_label, "N/A");
    }

    #[test]
    fn class_and_name_filters() {
        let students = vec![
            student("a", "Asha Rani", Some("3")),
            student("b", "Bala", Some("4")),
            student("c", "Chitra", None),
        ];
        let by_class = filter_students(&students, Some("3"), None);
        assert_eq!(by_class.len(), 1);
        let by_name = filter_students(&students, None, Some("ASHA"));
        assert_eq!(by_name[0].id, "a");
        assert_eq!(filter_students(&students, Some(""), None).len(), 3);
        assert_eq!(distinct_classes(&students), vec!["3", "4"]);
    }

    #[test]
    fn dashboard_counts_and_earnings() {
        let mut s1 = student("a", "Asha", Some("3"));
        s1.payments = vec![crate::models::Payment {
            amount: 1500.0,
            ..Default::default()
        }];
        let s2 = student("b", "Bala", Some("3"));
        let t = Teacher {
            classes: vec!["3".into(), "5".into()],
            ..Teacher::default()
        };
        let summary = dashboard_summary(&[s1, s2], &[t]);
        assert_eq!(summary.students, 2);
        assert_eq!(summary.students_per_class.get("3"), Some(&2));
        assert_eq!(summary.teachers_per_class.get("5"), Some(&1));
        assert_eq!(summary.earnings, 1500.0);
    }

    #[test]
    fn teacher_form_validation_messages() {
        assert!(valid_teacher().validate(true).is_ok());

        let mut short = valid_teacher();
        short.details.name = "Al".into();
        assert!(short.validate(true).is_err());

        let mut phone = valid_teacher();
        phone.details.phone = "0123456789".into();
        let err = phone.validate(true).unwrap_err();
        assert_eq!(err.to_string(), "Phone must be 10 digits and cannot start with 0");

        let mut weak = valid_teacher();
        weak.password = "secret1".into();
        assert!(weak.validate(true).is_err());

        let mut future = valid_teacher();
        future.details.demographic_details.dob = "2999-01-01".into();
        assert_eq!(
            future.validate(true).unwrap_err().to_string(),
            "Invalid Date of Birth"
        );

        let mut edit = valid_teacher();
        edit.password.clear();
        edit.details.email.clear();
        assert!(edit.validate(false).is_ok());
        let body = edit.update_payload().expect("payload");
        assert!(body.get("password").is_none());
    }

    #[test]
    fn student_form_payloads() {
        let form = StudentForm {
            email: " new@school.test ".into(),
            password: "abc123".into(),
            details: StudentDetails {
                name: "Asha".into(),
                admission_number: "1042".into(),
                class: "3".into(),
                ..StudentDetails::default()
            },
        };
        let create = form.create_payload().expect("create");
        assert_eq!(create["email"], "new@school.test");
        assert_eq!(create["details"]["admissionNumber"], "1042");

        let mut edit = form.clone();
        edit.password.clear();
        let update = edit.update_payload().expect("update");
        assert!(update.get("password").is_none());
        assert_eq!(update["class"], "3");

        let mut bad = form.clone();
        bad.password = "abcdef".into();
        assert_eq!(
            bad.validate(true).unwrap_err().to_string(),
            "Password must be minimum 6 characters and contain a number"
        );
    }

    #[test]
    fn toggle_class_adds_and_removes() {
        let mut d = TeacherDetails::default();
        d.toggle_class("3");
        d.toggle_class("4");
        d.toggle_class("3");
        assert_eq!(d.classes, vec!["4"]);
    }
}
