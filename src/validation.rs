use crate::error::FieldErrors;
use crate::models::{Answers, ClientMetadata, SurveyForm};

pub const MAX_SHORT_TEXT_CHARS: usize = 255;
pub const MAX_FREE_TEXT_WORDS: usize = 30;
pub const MAX_FINGERPRINT_CHARS: usize = 128;
const MAX_METADATA_CHARS: usize = 512;

// Value of question8 that requires a custom sector
pub const OTHER_SECTOR_CHOICE: &str = "Autre";

pub fn validate(form: SurveyForm) -> Result<(Answers, ClientMetadata), FieldErrors> {
    let mut errors = FieldErrors::new();

    let mut required = |name: &'static str, value: Option<String>| -> String {
        match value.as_deref().map(str::trim) {
            None | Some("") => {
                errors.insert(name, "This field cannot be empty".to_string());
                String::new()
            }
            Some(v) if v.chars().count() > MAX_SHORT_TEXT_CHARS => {
                errors.insert(name, format!("Must be at most {MAX_SHORT_TEXT_CHARS} characters"));
                String::new()
            }
            Some(v) => v.to_string(),
        }
    };

    let question1 = required("question1", form.question1);
    let question2 = required("question2", form.question2);
    let question3 = required("question3", form.question3);
    let question5 = required("question5", form.question5);
    let question6 = required("question6", form.question6);
    let question7 = required("question7", form.question7);
    let question8 = required("question8", form.question8);
    let question9 = required("question9", form.question9);
    let question10 = required("question10", form.question10);
    let question11 = required("question11", form.question11);
    let question12 = required("question12", form.question12);
    let question13 = required("question13", form.question13);
    let question14 = required("question14", form.question14);

    let question4 = match multi_select(form.question4) {
        Ok(choices) => choices,
        Err(reason) => {
            errors.insert("question4", reason);
            Vec::new()
        }
    };

    let question15 = free_text("question15", form.question15, &mut errors);
    let question16 = free_text("question16", form.question16, &mut errors);

    let other_sector = trimmed(form.other_sector);
    if let Some(sector) = &other_sector {
        if sector.chars().count() > MAX_SHORT_TEXT_CHARS {
            errors.insert(
                "other_sector",
                format!("Must be at most {MAX_SHORT_TEXT_CHARS} characters"),
            );
        }
    }

    // "Autre" is replaced by the custom sector, which then becomes mandatory
    let question8 = if question8 == OTHER_SECTOR_CHOICE {
        match &other_sector {
            Some(sector) => sector.clone(),
            None => {
                errors.insert(
                    "other_sector",
                    format!("A custom sector is required when '{OTHER_SECTOR_CHOICE}' is selected for question 8"),
                );
                question8
            }
        }
    } else {
        question8
    };

    let browser_fingerprint = trimmed(form.browser_fingerprint);
    if browser_fingerprint
        .as_ref()
        .is_some_and(|f| f.chars().count() > MAX_FINGERPRINT_CHARS)
    {
        errors.insert(
            "browser_fingerprint",
            format!("Must be at most {MAX_FINGERPRINT_CHARS} characters"),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let answers = Answers {
        question1,
        question2,
        question3,
        question4,
        question5,
        question6,
        question7,
        question8,
        question9,
        question10,
        question11,
        question12,
        question13,
        question14,
        question15,
        question16,
        other_sector,
    };
    let metadata = ClientMetadata {
        browser_fingerprint,
        user_agent: trimmed(form.user_agent).map(truncate_metadata),
        screen_resolution: trimmed(form.screen_resolution).map(truncate_metadata),
        client_timestamp: trimmed(form.client_timestamp).map(truncate_metadata),
    };
    Ok((answers, metadata))
}

// Non-empty list, blanks dropped, duplicates collapsed keeping first occurrence
fn multi_select(values: Option<Vec<String>>) -> Result<Vec<String>, String> {
    let mut choices: Vec<String> = Vec::new();
    for value in values.unwrap_or_default() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if value.chars().count() > MAX_SHORT_TEXT_CHARS {
            return Err(format!("Each selection must be at most {MAX_SHORT_TEXT_CHARS} characters"));
        }
        if !choices.iter().any(|c| c == value) {
            choices.push(value.to_string());
        }
    }

    if choices.is_empty() {
        return Err("At least one selection is required".to_string());
    }
    Ok(choices)
}

fn free_text(name: &'static str, value: Option<String>, errors: &mut FieldErrors) -> Option<String> {
    let text = trimmed(value)?;
    let words = text.split_whitespace().count();
    if words > MAX_FREE_TEXT_WORDS {
        errors.insert(
            name,
            format!("Must be at most {MAX_FREE_TEXT_WORDS} words (got {words})"),
        );
        return None;
    }
    Some(text)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// Audit-only metadata is cut, not rejected
fn truncate_metadata(value: String) -> String {
    value.chars().take(MAX_METADATA_CHARS).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn complete_form() -> SurveyForm {
        SurveyForm {
            question1: Some("18-25".into()),
            question2: Some("Femme".into()),
            question3: Some("Bac+5".into()),
            question4: Some(vec!["Pêche".into(), "Plongée".into()]),
            question5: Some("Oui".into()),
            question6: Some("Souvent".into()),
            question7: Some("30% loisirs et 70% professionnel".into()),
            question8: Some("Tourisme".into()),
            question9: Some("Non".into()),
            question10: Some("Oui".into()),
            question11: Some("Peut-être".into()),
            question12: Some("Oui".into()),
            question13: Some("Moyen".into()),
            question14: Some("Oui".into()),
            ..SurveyForm::default()
        }
    }

    #[test]
    fn accepts_complete_form() {
        let (answers, metadata) = validate(complete_form()).unwrap();
        assert_eq!(answers.question4, vec!["Pêche", "Plongée"]);
        assert_eq!(answers.question8, "Tourisme");
        assert_eq!(answers.question15, None);
        assert_eq!(metadata, ClientMetadata::default());
    }

    #[test]
    fn reports_every_missing_field() {
        let errors = validate(SurveyForm::default()).unwrap_err();
        assert_eq!(errors.len(), 14);
        assert!(errors.contains_key("question1"));
        assert!(errors.contains_key("question4"));
        assert!(errors.contains_key("question14"));
        assert!(!errors.contains_key("question15"));
    }

    #[test]
    fn blank_answers_are_missing() {
        let form = SurveyForm {
            question2: Some("   ".into()),
            question4: Some(vec![" ".into(), "".into()]),
            ..complete_form()
        };
        let errors = validate(form).unwrap_err();
        assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec!["question2", "question4"]);
    }

    #[test]
    fn multi_select_duplicates_collapse() {
        let form = SurveyForm {
            question4: Some(vec!["Voile".into(), "Kayak".into(), "Voile".into(), " Kayak ".into()]),
            ..complete_form()
        };
        let (answers, _) = validate(form).unwrap();
        assert_eq!(answers.question4, vec!["Voile", "Kayak"]);
    }

    #[test]
    fn free_text_is_word_limited() {
        let thirty = vec!["mot"; 30].join(" ");
        let thirty_one = vec!["mot"; 31].join(" ");

        let (answers, _) = validate(SurveyForm {
            question15: Some(thirty.clone()),
            question16: Some("   ".into()),
            ..complete_form()
        })
        .unwrap();
        assert_eq!(answers.question15, Some(thirty));
        assert_eq!(answers.question16, None);

        let errors = validate(SurveyForm {
            question16: Some(thirty_one),
            ..complete_form()
        })
        .unwrap_err();
        assert!(errors["question16"].contains("30 words"));
    }

    #[test]
    fn other_sector_replaces_autre() {
        let form = SurveyForm {
            question8: Some("Autre".into()),
            other_sector: Some(" Aquaculture ".into()),
            ..complete_form()
        };
        let (answers, _) = validate(form).unwrap();
        assert_eq!(answers.question8, "Aquaculture");
        assert_eq!(answers.other_sector.as_deref(), Some("Aquaculture"));

        let errors = validate(SurveyForm {
            question8: Some("Autre".into()),
            ..complete_form()
        })
        .unwrap_err();
        assert!(errors.contains_key("other_sector"));
    }

    #[test]
    fn short_text_length_is_bounded() {
        let errors = validate(SurveyForm {
            question1: Some("x".repeat(MAX_SHORT_TEXT_CHARS + 1)),
            browser_fingerprint: Some("f".repeat(MAX_FINGERPRINT_CHARS + 1)),
            ..complete_form()
        })
        .unwrap_err();
        assert!(errors.contains_key("question1"));
        assert!(errors.contains_key("browser_fingerprint"));
    }

    #[test]
    fn metadata_is_trimmed() {
        let (_, metadata) = validate(SurveyForm {
            browser_fingerprint: Some(" abc123 ".into()),
            screen_resolution: Some("1920x1080".into()),
            user_agent: Some("".into()),
            ..complete_form()
        })
        .unwrap();
        assert_eq!(metadata.browser_fingerprint.as_deref(), Some("abc123"));
        assert_eq!(metadata.screen_resolution.as_deref(), Some("1920x1080"));
        assert_eq!(metadata.user_agent, None);
    }

    #[test]
    fn long_metadata_is_truncated() {
        let (_, metadata) = validate(SurveyForm {
            user_agent: Some("a".repeat(MAX_METADATA_CHARS * 2)),
            ..complete_form()
        })
        .unwrap();
        assert_eq!(metadata.user_agent.map(|ua| ua.len()), Some(MAX_METADATA_CHARS));
    }
}
