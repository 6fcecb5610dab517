use std::sync::OnceLock;

use regex::Regex;

use crate::models::{FieldError, Gender, PatientDetails, PatientDetailsForm};

const MAX_AGE: u32 = 120;

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{10}$").expect("phone pattern is valid"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_pattern().is_match(phone)
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Check every field of the patient form, reporting all problems at once.
pub fn validate_patient_details(form: &PatientDetailsForm) -> Result<PatientDetails, Vec<FieldError>> {
    let mut errors = Vec::new();

    let patient_name = non_blank(form.patient_name.as_ref());
    if patient_name.is_none() {
        errors.push(FieldError::new("patient_name", "Patient name is required"));
    }

    let phone_number = non_blank(form.phone_number.as_ref());
    match phone_number.as_deref() {
        None => errors.push(FieldError::new("phone_number", "Phone number is required")),
        Some(phone) if !is_valid_phone(phone) => {
            errors.push(FieldError::new("phone_number", "Phone number must be exactly 10 digits"))
        }
        Some(_) => {}
    }

    let email = non_blank(form.email.as_ref());
    if let Some(email) = email.as_deref() {
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "Email address is not valid"));
        }
    }

    match form.age {
        None => errors.push(FieldError::new("age", "Age is required")),
        Some(age) if age > MAX_AGE => errors.push(FieldError::new("age", "Age is out of range")),
        Some(_) => {}
    }

    let gender = match non_blank(form.gender.as_ref()) {
        None => {
            errors.push(FieldError::new("gender", "Gender is required"));
            None
        }
        Some(raw) => {
            let parsed = Gender::parse(&raw);
            if parsed.is_none() {
                errors.push(FieldError::new("gender", "Gender must be male, female or other"));
            }
            parsed
        }
    };

    match (patient_name, phone_number, form.age, gender) {
        (Some(patient_name), Some(phone_number), Some(age), Some(gender)) if errors.is_empty() => {
            Ok(PatientDetails {
                patient_name,
                phone_number,
                email,
                age,
                gender,
                reason: non_blank(form.reason.as_ref()),
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> PatientDetailsForm {
        PatientDetailsForm {
            patient_name: Some("Asha Verma".to_string()),
            phone_number: Some("9876543210".to_string()),
            email: Some("asha@example.com".to_string()),
            age: Some(34),
            gender: Some("Female".to_string()),
            reason: Some("  ".to_string()),
        }
    }

    #[test]
    fn accepts_complete_form() {
        let details = validate_patient_details(&complete_form()).unwrap();
        assert_eq!(details.gender, Gender::Female);
        assert_eq!(details.reason, None);
    }

    #[test]
    fn short_phone_rejected() {
        let form = PatientDetailsForm {
            phone_number: Some("12345".to_string()),
            ..complete_form()
        };
        let errors = validate_patient_details(&form).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "phone_number");
    }

    #[test]
    fn phone_with_letters_rejected() {
        assert!(!is_valid_phone("98765a3210"));
        assert!(!is_valid_phone("98765432101"));
        assert!(is_valid_phone("0000000000"));
    }

    #[test]
    fn non_ascii_digits_rejected() {
        assert!(!is_valid_phone("९८७६५४३२१०"));
        assert!(!is_valid_phone("٩٨٧٦٥٤٣٢١٠"));

        let form = PatientDetailsForm {
            phone_number: Some("९८७६५४३२१०".to_string()),
            ..complete_form()
        };
        let errors = validate_patient_details(&form).unwrap_err();
        assert_eq!(errors[0].field, "phone_number");
    }

    #[test]
    fn email_is_optional_but_checked() {
        let form = PatientDetailsForm { email: None, ..complete_form() };
        assert!(validate_patient_details(&form).is_ok());

        let form = PatientDetailsForm { email: Some("not-an-email".to_string()), ..complete_form() };
        let errors = validate_patient_details(&form).unwrap_err();
        assert_eq!(errors[0].field, "email");
    }

    #[test]
    fn reports_every_missing_field() {
        let errors = validate_patient_details(&PatientDetailsForm::default()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["patient_name", "phone_number", "age", "gender"]);
    }
}
