// ✅ Registration Validation - name, email, category, amount
// All-or-nothing: every invalid field is reported, nothing is written

use crate::error::{Field, ValidationError};
use crate::registration::parse_amount;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::OnceLock;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const DEFAULT_MAXIMUM_DONATION: i64 = 1_000_000;
/// Cents at most
pub const AMOUNT_MAX_SCALE: u32 = 2;

// ============================================================================
// INPUT + RULES
// ============================================================================

/// Raw submission, exactly as the user typed it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub category: String,
    pub amount: String,
}

impl RegistrationForm {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        category: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        RegistrationForm {
            name: name.into(),
            email: email.into(),
            category: category.into(),
            amount: amount.into(),
        }
    }
}

/// Startup-time limits a submission is checked against
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRules {
    pub minimum_donation: Decimal,
    /// Upper bound; keeps any realistic column total far from `Decimal::MAX`
    pub maximum_donation: Decimal,
    /// Allowed categories in their canonical spelling
    pub categories: Vec<String>,
}

impl RegistrationRules {
    pub fn new(minimum_donation: Decimal, categories: Vec<String>) -> Self {
        RegistrationRules {
            minimum_donation,
            maximum_donation: Decimal::from(DEFAULT_MAXIMUM_DONATION),
            categories,
        }
    }

    pub fn with_maximum_donation(mut self, maximum_donation: Decimal) -> Self {
        self.maximum_donation = maximum_donation;
        self
    }

    /// Canonical spelling of `input`, if it names a configured category
    pub fn canonical_category(&self, input: &str) -> Option<&str> {
        let input = input.trim();
        self.categories
            .iter()
            .find(|c| c.eq_ignore_ascii_case(input))
            .map(String::as_str)
    }
}

impl Default for RegistrationRules {
    fn default() -> Self {
        RegistrationRules::new(
            Decimal::from(20),
            vec!["Men".to_string(), "Women".to_string()],
        )
    }
}

/// A submission that passed every check, normalized for storage
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub category: String,
    pub amount: Decimal,
}

// ============================================================================
// VALIDATION
// ============================================================================

pub fn validate(
    form: &RegistrationForm,
    rules: &RegistrationRules,
) -> Result<ValidRegistration, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let name = form.name.trim();
    let name_len = name.chars().count();
    if name_len < NAME_MIN_CHARS {
        errors.push(ValidationError::new(
            Field::Name,
            format!("Name must be at least {NAME_MIN_CHARS} characters long"),
        ));
    } else if name_len > NAME_MAX_CHARS {
        errors.push(ValidationError::new(
            Field::Name,
            format!("Name must be at most {NAME_MAX_CHARS} characters long"),
        ));
    }

    let email = form.email.trim();
    if !is_valid_email(email) {
        errors.push(ValidationError::new(
            Field::Email,
            "Please enter a valid email address",
        ));
    }

    let category = rules.canonical_category(&form.category);
    if category.is_none() {
        errors.push(ValidationError::new(
            Field::Category,
            format!("Category must be one of: {}", rules.categories.join(", ")),
        ));
    }

    let amount = match parse_amount(&form.amount) {
        Some(amount) if amount < rules.minimum_donation => {
            errors.push(ValidationError::new(
                Field::Amount,
                format!("Minimum donation is ${}", rules.minimum_donation.normalize()),
            ));
            None
        }
        Some(amount) if amount > rules.maximum_donation => {
            errors.push(ValidationError::new(
                Field::Amount,
                format!("Maximum donation is ${}", rules.maximum_donation.normalize()),
            ));
            None
        }
        Some(amount) if amount.normalize().scale() > AMOUNT_MAX_SCALE => {
            errors.push(ValidationError::new(
                Field::Amount,
                format!("Amount can have at most {AMOUNT_MAX_SCALE} decimal places"),
            ));
            None
        }
        Some(amount) => Some(amount),
        None => {
            errors.push(ValidationError::new(Field::Amount, "Amount must be a number"));
            None
        }
    };

    match (category, amount) {
        (Some(category), Some(amount)) if errors.is_empty() => Ok(ValidRegistration {
            name: name.to_string(),
            email: email.to_string(),
            category: category.to_string(),
            amount,
        }),
        _ => Err(errors),
    }
}

/// Minimal `local@domain.tld` shape with no whitespace
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let pattern = EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("email pattern is valid")
    });
    pattern.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, email: &str, category: &str, amount: &str) -> RegistrationForm {
        RegistrationForm::new(name, email, category, amount)
    }

    fn failed_fields(result: Result<ValidRegistration, Vec<ValidationError>>) -> Vec<Field> {
        result.unwrap_err().into_iter().map(|e| e.field).collect()
    }

    #[test]
    fn test_valid_submission_is_normalized() {
        let rules = RegistrationRules::default();
        let valid = validate(&form("  Alex ", " alex@example.com ", "women", "25"), &rules).unwrap();

        assert_eq!(valid.name, "Alex");
        assert_eq!(valid.email, "alex@example.com");
        assert_eq!(valid.category, "Women");
        assert_eq!(valid.amount, Decimal::from(25));
    }

    #[test]
    fn test_name_length_bounds() {
        let rules = RegistrationRules::default();

        assert_eq!(failed_fields(validate(&form("A", "a@b.co", "Men", "20"), &rules)), vec![Field::Name]);
        assert_eq!(failed_fields(validate(&form("   ", "a@b.co", "Men", "20"), &rules)), vec![Field::Name]);
        assert_eq!(
            failed_fields(validate(&form(&"x".repeat(51), "a@b.co", "Men", "20"), &rules)),
            vec![Field::Name]
        );
        assert!(validate(&form(&"x".repeat(50), "a@b.co", "Men", "20"), &rules).is_ok());
        // Characters, not bytes
        assert!(validate(&form("Zoë", "a@b.co", "Men", "20"), &rules).is_ok());
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("alex@example.com"));
        assert!(is_valid_email("a.b+tag@mail.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("alex.example.com"));
        assert!(!is_valid_email("alex@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alex@example"));
        assert!(!is_valid_email("alex@example."));
        assert!(!is_valid_email("al ex@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let rules = RegistrationRules::default();
        assert_eq!(
            failed_fields(validate(&form("Alex", "alex@example.com", "Kids", "20"), &rules)),
            vec![Field::Category]
        );
    }

    #[test]
    fn test_amount_below_minimum_or_not_numeric() {
        let rules = RegistrationRules::default();

        assert_eq!(
            failed_fields(validate(&form("Alex", "alex@example.com", "Men", "19.99"), &rules)),
            vec![Field::Amount]
        );
        assert_eq!(
            failed_fields(validate(&form("Alex", "alex@example.com", "Men", "lots"), &rules)),
            vec![Field::Amount]
        );
        assert!(validate(&form("Alex", "alex@example.com", "Men", "20"), &rules).is_ok());
        assert!(validate(&form("Alex", "alex@example.com", "Men", "20.50"), &rules).is_ok());
    }

    #[test]
    fn test_amount_above_maximum_or_too_precise() {
        let rules = RegistrationRules::default().with_maximum_donation(Decimal::from(500));

        for amount in ["500.01", "79228162514264337593543950335", "1e30", "20.005"] {
            assert_eq!(
                failed_fields(validate(&form("Alex", "alex@example.com", "Men", amount), &rules)),
                vec![Field::Amount],
                "{amount} should be rejected"
            );
        }
        assert!(validate(&form("Alex", "alex@example.com", "Men", "500"), &rules).is_ok());
        // Trailing zeros are not extra precision
        assert!(validate(&form("Alex", "alex@example.com", "Men", "20.500"), &rules).is_ok());
    }

    #[test]
    fn test_default_maximum() {
        let rules = RegistrationRules::default();
        assert_eq!(rules.maximum_donation, Decimal::from(DEFAULT_MAXIMUM_DONATION));
        assert!(validate(&form("Alex", "alex@example.com", "Men", "1000000"), &rules).is_ok());
        assert!(validate(&form("Alex", "alex@example.com", "Men", "1000000.01"), &rules).is_err());
    }

    #[test]
    fn test_every_invalid_field_reported() {
        let rules = RegistrationRules::default();
        let fields = failed_fields(validate(&form("", "nope", "Other", "5"), &rules));

        assert_eq!(fields, vec![Field::Name, Field::Email, Field::Category, Field::Amount]);
    }
}
