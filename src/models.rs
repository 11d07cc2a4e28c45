use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Questionnaire submission as posted by the form.
// Every field is optional here so validation can report all missing answers at once.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SurveyForm {
    pub question1: Option<String>,
    pub question2: Option<String>,
    pub question3: Option<String>,
    pub question4: Option<Vec<String>>,
    pub question5: Option<String>,
    pub question6: Option<String>,
    pub question7: Option<String>,
    pub question8: Option<String>,
    pub question9: Option<String>,
    pub question10: Option<String>,
    pub question11: Option<String>,
    pub question12: Option<String>,
    pub question13: Option<String>,
    pub question14: Option<String>,
    pub question15: Option<String>,
    pub question16: Option<String>,
    #[serde(alias = "other-sector")]
    pub other_sector: Option<String>,
    pub browser_fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub screen_resolution: Option<String>,
    pub client_timestamp: Option<String>,
}

// Validated answers, ready to persist
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Answers {
    pub question1: String,
    pub question2: String,
    pub question3: String,
    pub question4: Vec<String>,
    pub question5: String,
    pub question6: String,
    pub question7: String,
    pub question8: String,
    pub question9: String,
    pub question10: String,
    pub question11: String,
    pub question12: String,
    pub question13: String,
    pub question14: String,
    pub question15: Option<String>,
    pub question16: Option<String>,
    pub other_sector: Option<String>,
}

// Client-reported metadata, stored for audit only
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub browser_fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub screen_resolution: Option<String>,
    pub client_timestamp: Option<String>,
}

// Row to insert
#[derive(Clone, Debug)]
pub struct NewSubmission {
    pub answers: Answers,
    pub metadata: ClientMetadata,
    pub user_hash: String,
    pub created_at: DateTime<Utc>,
}

// Persisted submission
#[derive(Serialize, Clone, Debug)]
pub struct Submission {
    pub id: i64,
    #[serde(flatten)]
    pub answers: Answers,
    #[serde(flatten)]
    pub metadata: ClientMetadata,
    #[serde(skip_serializing)]
    pub user_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// Questions that statistics and search can group or filter by.
// question4 is the multi-select: each selected option counts on its own
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CategoryField {
    Question1,
    Question2,
    Question3,
    Question4,
    Question5,
    Question6,
    Question7,
    Question8,
    Question9,
    Question10,
    Question11,
    Question12,
    Question13,
    Question14,
}

impl CategoryField {
    pub const ALL: [CategoryField; 14] = [
        CategoryField::Question1,
        CategoryField::Question2,
        CategoryField::Question3,
        CategoryField::Question4,
        CategoryField::Question5,
        CategoryField::Question6,
        CategoryField::Question7,
        CategoryField::Question8,
        CategoryField::Question9,
        CategoryField::Question10,
        CategoryField::Question11,
        CategoryField::Question12,
        CategoryField::Question13,
        CategoryField::Question14,
    ];

    // Column name; also the wire name
    pub fn column(self) -> &'static str {
        match self {
            CategoryField::Question1 => "question1",
            CategoryField::Question2 => "question2",
            CategoryField::Question3 => "question3",
            CategoryField::Question4 => "question4",
            CategoryField::Question5 => "question5",
            CategoryField::Question6 => "question6",
            CategoryField::Question7 => "question7",
            CategoryField::Question8 => "question8",
            CategoryField::Question9 => "question9",
            CategoryField::Question10 => "question10",
            CategoryField::Question11 => "question11",
            CategoryField::Question12 => "question12",
            CategoryField::Question13 => "question13",
            CategoryField::Question14 => "question14",
        }
    }

    pub fn is_multi_select(self) -> bool {
        self == CategoryField::Question4
    }
}

impl fmt::Display for CategoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for CategoryField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryField::ALL
            .into_iter()
            .find(|field| field.column() == s)
            .ok_or_else(|| format!("unknown category field '{s}'"))
    }
}

// Which submissions a count or listing applies to.
// user_hash and browser_fingerprint are OR-ed when both are set.
#[derive(Clone, Debug, Default)]
pub struct SubmissionFilter {
    pub user_hash: Option<String>,
    pub browser_fingerprint: Option<String>,
    pub categories: Vec<(CategoryField, String)>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl SubmissionFilter {
    pub fn identity_since(
        user_hash: &str,
        browser_fingerprint: Option<&str>,
        since: DateTime<Utc>,
    ) -> Self {
        Self {
            user_hash: Some(user_hash.to_string()),
            browser_fingerprint: browser_fingerprint.map(str::to_string),
            from: Some(since),
            ..Self::default()
        }
    }
}

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    // Clamp out-of-range values instead of rejecting them
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(self) -> i64 {
        i64::from(self.normalized().per_page)
    }

    pub fn offset(self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CategoryCount {
    pub value: String,
    pub count: i64,
}
