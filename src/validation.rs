//! Form validation for customers, leads and registrations.
//!
//! Every validator collects all field failures for a form instead of
//! stopping at the first one, and returns the trimmed/normalized input on
//! success so handlers store exactly what was checked.

use crate::errors::ValidationErrors;
use crate::models::{CustomerInput, LeadInput, RegisterRequest};
use bigdecimal::num_bigint::Sign;
use bigdecimal::{BigDecimal, Zero};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_000;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Largest lead value; the `NUMERIC(14, 2)` column holds 12 integer digits.
pub const MAX_LEAD_VALUE: &str = "999999999999.99";
const MAX_VALUE_INTEGER_DIGITS: i64 = 12;
/// Longer digit strings are rejected before trailing zeros are stripped.
const MAX_VALUE_DIGITS: u64 = 40;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        // RFC 5322 simplified: local@domain.tld
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .unwrap_or_else(|e| panic!("email regex must compile: {}", e))
    })
}

/// Validate email address shape.
///
/// Requires a local part, an `@`, and a dotted domain. Length is capped at
/// 254 characters.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 254 {
        return false;
    }

    email_regex().is_match(email)
}

/// Validate and normalize a phone number to E.164.
///
/// Numbers without a leading `+` are parsed against `region`.
pub fn normalize_phone(raw: &str, region: CountryId) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Phone is empty".to_string());
    }

    match phonenumber::parse(Some(region), trimmed) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid phone: {} -> {}", raw, formatted);
                Ok(formatted)
            } else {
                Err("Phone number is not valid".to_string())
            }
        }
        Err(e) => {
            tracing::debug!("Failed to parse phone '{}': {:?}", raw, e);
            Err("Phone number could not be parsed".to_string())
        }
    }
}

/// Trims an optional text field, mapping blank to `None`.
fn trim_optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn check_required(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    value: &str,
    max: usize,
) {
    if value.is_empty() {
        errors.add(field, format!("{} is required", label));
    } else if value.chars().count() > max {
        errors.add(field, format!("{} must be at most {} characters", label, max));
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if email.is_empty() {
        errors.add("email", "Email is required");
    } else if !is_valid_email(email) {
        errors.add("email", "Email is not a valid address");
    }
}

/// Validates a customer form and returns its normalized form.
pub fn validate_customer(
    input: &CustomerInput,
    region: CountryId,
) -> Result<CustomerInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = input.name.trim().to_string();
    check_required(&mut errors, "name", "Name", &name, MAX_NAME_LEN);

    let email = input.email.trim().to_lowercase();
    check_email(&mut errors, &email);

    let phone = match trim_optional(&input.phone) {
        Some(raw) => match normalize_phone(&raw, region) {
            Ok(normalized) => Some(normalized),
            Err(message) => {
                errors.add("phone", message);
                None
            }
        },
        None => None,
    };

    let company = trim_optional(&input.company);
    if let Some(ref company) = company {
        if company.chars().count() > MAX_NAME_LEN {
            errors.add(
                "company",
                format!("Company must be at most {} characters", MAX_NAME_LEN),
            );
        }
    }

    errors.into_result(CustomerInput {
        name,
        email,
        phone,
        company,
    })
}

/// Validates a lead form and returns its normalized form.
///
/// Monetary values must be non-negative with at most two fraction digits.
pub fn validate_lead(input: &LeadInput) -> Result<LeadInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let title = input.title.trim().to_string();
    check_required(&mut errors, "title", "Title", &title, MAX_TITLE_LEN);

    let description = trim_optional(&input.description);
    if let Some(ref description) = description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            errors.add(
                "description",
                format!(
                    "Description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                ),
            );
        }
    }

    let value = check_lead_value(&mut errors, &input.value).unwrap_or_default();

    errors.into_result(LeadInput {
        title,
        description,
        status: input.status,
        value,
    })
}

/// Checks a monetary value and rescales it to cents.
///
/// Bounds are checked on the digit count and exponent, so an input like
/// `1e2000000` is rejected without being expanded.
fn check_lead_value(errors: &mut ValidationErrors, value: &BigDecimal) -> Option<BigDecimal> {
    if value.is_zero() {
        return Some(BigDecimal::zero().with_scale(2));
    }
    if value.sign() == Sign::Minus {
        errors.add("value", "Value cannot be negative");
        return None;
    }

    let scale = value.fractional_digit_count();
    let digits = value.digits();
    let integer_digits = i64::try_from(digits)
        .unwrap_or(i64::MAX)
        .saturating_sub(scale);
    if integer_digits > MAX_VALUE_INTEGER_DIGITS {
        errors.add("value", format!("Value cannot exceed {}", MAX_LEAD_VALUE));
        return None;
    }
    if scale > 2 && (digits > MAX_VALUE_DIGITS || value.normalized().fractional_digit_count() > 2)
    {
        errors.add("value", "Value can have at most 2 decimal places");
        return None;
    }

    Some(value.with_scale(2))
}

/// Validates a registration form and returns it with a normalized email.
pub fn validate_registration(input: &RegisterRequest) -> Result<RegisterRequest, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = input.name.trim().to_string();
    check_required(&mut errors, "name", "Name", &name, MAX_NAME_LEN);

    let email = input.email.trim().to_lowercase();
    check_email(&mut errors, &email);

    if input.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }

    errors.into_result(RegisterRequest {
        name,
        email,
        password: input.password.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn customer(name: &str, email: &str, phone: Option<&str>) -> CustomerInput {
        CustomerInput {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.map(str::to_string),
            company: None,
        }
    }

    fn lead(title: &str, value: &str) -> LeadInput {
        LeadInput {
            title: title.to_string(),
            description: None,
            status: None,
            value: BigDecimal::from_str(value).unwrap(),
        }
    }

    #[test]
    fn test_customer_is_normalized() {
        let input = CustomerInput {
            name: "  Ada Lovelace ".to_string(),
            email: " ADA@Example.COM ".to_string(),
            phone: Some("(415) 555-0132".to_string()),
            company: Some("   ".to_string()),
        };
        let valid = validate_customer(&input, CountryId::US).unwrap();
        assert_eq!(valid.name, "Ada Lovelace");
        assert_eq!(valid.email, "ada@example.com");
        assert_eq!(valid.phone.as_deref(), Some("+14155550132"));
        assert_eq!(valid.company, None);
    }

    #[test]
    fn test_customer_collects_every_failure() {
        let errors =
            validate_customer(&customer(" ", "not-an-email", Some("12")), CountryId::US)
                .unwrap_err();
        let fields: Vec<&str> = errors.fields().collect();
        assert_eq!(fields, vec!["email", "name", "phone"]);
    }

    #[test]
    fn test_blank_phone_is_optional() {
        let valid = validate_customer(&customer("Bob", "bob@corp.io", Some("  ")), CountryId::US)
            .unwrap();
        assert_eq!(valid.phone, None);
    }

    #[test]
    fn test_international_phone_ignores_region() {
        let valid = validate_customer(
            &customer("Bea", "bea@corp.io", Some("+44 20 7946 0958")),
            CountryId::US,
        )
        .unwrap();
        assert_eq!(valid.phone.as_deref(), Some("+442079460958"));
    }

    #[test]
    fn test_lead_value_rules() {
        assert!(validate_lead(&lead("Deal", "0")).is_ok());
        assert!(validate_lead(&lead("Deal", "1999.99")).is_ok());
        assert!(validate_lead(&lead("Deal", "10.500")).is_ok());

        let negative = validate_lead(&lead("Deal", "-1")).unwrap_err();
        assert_eq!(negative.get("value"), Some("Value cannot be negative"));

        let precise = validate_lead(&lead("Deal", "1.005")).unwrap_err();
        assert!(precise.get("value").is_some());
    }

    #[test]
    fn test_lead_value_scaled_to_cents() {
        let valid = validate_lead(&lead("Deal", "42")).unwrap();
        assert_eq!(valid.value.to_string(), "42.00");
    }

    #[test]
    fn test_lead_value_upper_bound() {
        let valid = validate_lead(&lead("Deal", MAX_LEAD_VALUE)).unwrap();
        assert_eq!(valid.value.to_string(), MAX_LEAD_VALUE);

        for value in ["1000000000000", "1e15", "999999999999.999"] {
            let errors = validate_lead(&lead("Deal", value)).unwrap_err();
            assert!(errors.get("value").is_some(), "accepted {}", value);
        }
    }

    #[test]
    fn test_huge_exponents_rejected_without_expansion() {
        let started = std::time::Instant::now();
        for value in ["1e2000000", "1e-2000000", "123456789e999999"] {
            let errors = validate_lead(&lead("Deal", value)).unwrap_err();
            assert!(errors.get("value").is_some(), "accepted {}", value);
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        let zero = validate_lead(&lead("Deal", "0e2000000")).unwrap();
        assert!(zero.value.is_zero());
    }

    #[test]
    fn test_lead_title_required() {
        let errors = validate_lead(&lead("   ", "10")).unwrap_err();
        assert_eq!(errors.get("title"), Some("Title is required"));
    }

    #[test]
    fn test_registration_password_length() {
        let request = RegisterRequest {
            name: "Eve".to_string(),
            email: "eve@corp.io".to_string(),
            password: "short".to_string(),
        };
        let errors = validate_registration(&request).unwrap_err();
        assert!(errors.get("password").is_some());
    }
}
