//! Marks entry per student: six subjects by six assessments, each score a
//! whole number 0-100 or blank.

use std::collections::BTreeMap;

use tracing::info;

use crate::api::ApiClient;
use crate::error::{DeskError, Result};
use crate::models::{Student, SubjectMarks};

pub const SUBJECTS: [&str; 6] = ["Telugu", "Hindi", "English", "Maths", "Science", "Social"];
pub const ASSESSMENT_TYPES: [&str; 6] = ["FA1", "FA2", "FA3", "SA1", "SA2", "FE"];
pub const INVALID_MARKS: &str = "Please enter valid marks (0-100).";

const MAX_SCORE: u16 = 100;

fn blank_assessments() -> BTreeMap<String, Option<u16>> {
    ASSESSMENT_TYPES
        .iter()
        .map(|code| (code.to_string(), None))
        .collect()
}

/// One all-blank entry per subject.
pub fn placeholder_marks() -> Vec<SubjectMarks> {
    SUBJECTS
        .iter()
        .map(|subject| SubjectMarks {
            subject: subject.to_string(),
            assessments: blank_assessments(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarksSheet {
    student_id: String,
    marks: Vec<SubjectMarks>,
}

impl MarksSheet {
    /// Start from the student's saved marks, or placeholders if none exist.
    pub fn for_student(student: &Student) -> Self {
        let marks = if student.marks.is_empty() {
            placeholder_marks()
        } else {
            let mut marks = student.marks.clone();
            for entry in &mut marks {
                for code in ASSESSMENT_TYPES {
                    entry.assessments.entry(code.to_string()).or_insert(None);
                }
            }
            marks
        };
        Self {
            student_id: student.id.clone(),
            marks,
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn marks(&self) -> &[SubjectMarks] {
        &self.marks
    }

    pub fn score(&self, subject: &str, code: &str) -> Option<u16> {
        self.marks
            .iter()
            .find(|m| m.subject.eq_ignore_ascii_case(subject))
            .and_then(|m| m.assessments.get(code).copied().flatten())
    }

    /// Set one cell from raw input: empty clears it, otherwise up to three
    /// digits.
    pub fn set_score(&mut self, subject: &str, code: &str, raw: &str) -> Result<()> {
        let code = code.trim().to_ascii_uppercase();
        if !ASSESSMENT_TYPES.contains(&code.as_str()) {
            return Err(DeskError::validation(format!("Unknown assessment: {code}")));
        }
        let raw = raw.trim();
        let value = if raw.is_empty() {
            None
        } else if raw.len() <= 3 && raw.chars().all(|c| c.is_ascii_digit()) {
            raw.parse::<u16>().ok()
        } else {
            return Err(DeskError::validation(INVALID_MARKS));
        };

        let Some(entry) = self
            .marks
            .iter_mut()
            .find(|m| m.subject.trim().eq_ignore_ascii_case(subject.trim()))
        else {
            return Err(DeskError::validation(format!("Unknown subject: {}", subject.trim())));
        };
        entry.assessments.insert(code, value);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let out_of_range = self
            .marks
            .iter()
            .flat_map(|m| m.assessments.values())
            .any(|v| matches!(v, Some(score) if *score > MAX_SCORE));
        if out_of_range {
            return Err(DeskError::validation(INVALID_MARKS));
        }
        Ok(())
    }

    /// Column totals per assessment; blanks count as zero.
    pub fn totals(&self) -> BTreeMap<String, u32> {
        let mut totals: BTreeMap<String, u32> = ASSESSMENT_TYPES
            .iter()
            .map(|code| (code.to_string(), 0))
            .collect();
        for entry in &self.marks {
            for (code, score) in &entry.assessments {
                *totals.entry(code.clone()).or_insert(0) += u32::from(score.unwrap_or(0));
            }
        }
        totals
    }
}

/// Replace the student's marks on the server, then locally.
pub async fn save_marks(api: &ApiClient, student: &mut Student, sheet: &MarksSheet) -> Result<()> {
    if sheet.student_id != student.id {
        return Err(DeskError::validation("Marks sheet belongs to another student"));
    }
    sheet.validate()?;
    api.put_marks(&student.id, &sheet.marks).await?;
    info!(student_id = %student.id, subjects = sheet.marks.len(), "marks saved");
    student.marks = sheet.marks.clone();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn student() -> Student {
        Student {
            id: "s1".into(),
            ..Student::default()
        }
    }

    #[test]
    fn new_students_get_placeholders() {
        let sheet = MarksSheet::for_student(&student());
        assert_eq!(sheet.marks().len(), SUBJECTS.len());
        assert!(sheet
            .marks()
            .iter()
            .all(|m| m.assessments.len() == 6 && m.assessments.values().all(Option::is_none)));
    }

    #[test]
    fn saved_marks_are_kept_and_padded() {
        let mut s = student();
        let mut assessments = BTreeMap::new();
        assessments.insert("FA1".to_string(), Some(18));
        s.marks = vec![SubjectMarks {
            subject: "Maths".into(),
            assessments,
        }];
        let sheet = MarksSheet::for_student(&s);
        assert_eq!(sheet.marks().len(), 1);
        assert_eq!(sheet.score("maths", "FA1"), Some(18));
        assert_eq!(sheet.marks()[0].assessments.len(), 6);
    }

    #[test]
    fn set_score_parses_and_validates() {
        let mut sheet = MarksSheet::for_student(&student());
        sheet.set_score("English", "sa1", "87").expect("set");
        assert_eq!(sheet.score("English", "SA1"), Some(87));
        sheet.set_score("English", "SA1", "").expect("clear");
        assert_eq!(sheet.score("English", "SA1"), None);

        assert_eq!(
            sheet.set_score("English", "SA1", "abc").unwrap_err().to_string(),
            INVALID_MARKS
        );
        assert!(sheet.set_score("English", "SA1", "1000").is_err());
        assert!(sheet.set_score("Latin", "SA1", "10").is_err());
        assert!(sheet.set_score("English", "FA9", "10").is_err());

        sheet.set_score("Maths", "FE", "101").expect("three digits accepted");
        assert_eq!(sheet.validate().unwrap_err().to_string(), INVALID_MARKS);
    }

    #[test]
    fn totals_treat_blanks_as_zero() {
        let mut sheet = MarksSheet::for_student(&student());
        sheet.set_score("Telugu", "FA1", "20").expect("set");
        sheet.set_score("Hindi", "FA1", "15").expect("set");
        let totals = sheet.totals();
        assert_eq!(totals["FA1"], 35);
        assert_eq!(totals["FE"], 0);
    }

    #[tokio::test]
    async fn save_replaces_whole_array() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/marks/s1"))
            .respond_with(|req: &Request| {
                let body: serde_json::Value =
                    serde_json::from_slice(&req.body).unwrap_or_default();
                let count = body["marks"].as_array().map(Vec::len).unwrap_or(0);
                if count == 6 {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({}))
                } else {
                    ResponseTemplate::new(400)
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), None).expect("client");
        let mut s = student();
        let mut sheet = MarksSheet::for_student(&s);
        sheet.set_score("Science", "SA2", "64").expect("set");
        save_marks(&api, &mut s, &sheet).await.expect("save");
        assert_eq!(s.marks.len(), 6);
        assert_eq!(MarksSheet::for_student(&s).score("Science", "SA2"), Some(64));
    }

    #[tokio::test]
    async fn invalid_sheet_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let api = ApiClient::new(&server.uri(), None).expect("client");
        let mut s = student();
        let mut sheet = MarksSheet::for_student(&s);
        sheet.set_score("Social", "FA2", "150").expect("set");
        assert!(save_marks(&api, &mut s, &sheet).await.is_err());
        assert!(s.marks.is_empty());
    }
}
