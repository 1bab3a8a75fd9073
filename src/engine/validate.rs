use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{RecordParameters, ValidationError, ValidationProfile, NAME_CAPACITY};

/// A check over one field of a candidate record.
pub trait RecordValidator: Send + Sync {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError>;
}

#[derive(Clone, Copy, Debug)]
enum NameField {
    First,
    Last,
}

impl NameField {
    fn label(self) -> &'static str {
        match self {
            NameField::First => "first name",
            NameField::Last => "last name",
        }
    }

    fn value(self, params: &RecordParameters) -> &str {
        match self {
            NameField::First => &params.first_name,
            NameField::Last => &params.last_name,
        }
    }
}

struct NameLengthValidator {
    field: NameField,
    min: usize,
    max: usize,
}

impl RecordValidator for NameLengthValidator {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError> {
        let value = self.field.value(params);
        if value.trim().is_empty() {
            return Err(ValidationError::BlankName {
                field: self.field.label(),
            });
        }
        let actual = value.chars().count();
        if actual < self.min || actual > self.max {
            return Err(ValidationError::NameLength {
                field: self.field.label(),
                min: self.min,
                max: self.max,
                actual,
            });
        }
        // slots store UTF-8 bytes, so wide characters can overflow within the char bound
        if value.len() > NAME_CAPACITY {
            return Err(ValidationError::NameTooWide {
                field: self.field.label(),
                capacity: NAME_CAPACITY,
                actual: value.len(),
            });
        }
        Ok(())
    }
}

struct DateOfBirthValidator {
    from: NaiveDate,
    to: NaiveDate,
}

impl RecordValidator for DateOfBirthValidator {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError> {
        if params.date_of_birth < self.from || params.date_of_birth > self.to {
            return Err(ValidationError::DateOutOfRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }
}

struct GradeValidator {
    min: i16,
    max: i16,
}

impl RecordValidator for GradeValidator {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError> {
        if !(self.min..=self.max).contains(&params.grade) {
            return Err(ValidationError::GradeOutOfRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

struct HeightValidator {
    min: Decimal,
    max: Decimal,
}

impl RecordValidator for HeightValidator {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError> {
        if params.height < self.min || params.height > self.max {
            return Err(ValidationError::HeightOutOfRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

struct FavouriteSymbolValidator {
    banned: char,
}

impl RecordValidator for FavouriteSymbolValidator {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError> {
        let symbol = params.favourite_symbol;
        // one byte on disk
        if !symbol.is_ascii_graphic() {
            return Err(ValidationError::SymbolNotAscii(symbol));
        }
        if symbol == self.banned {
            return Err(ValidationError::BannedSymbol(symbol));
        }
        Ok(())
    }
}

/// Runs its validators in order and stops at the first violation.
pub struct CompositeValidator {
    validators: Vec<Box<dyn RecordValidator>>,
}

impl CompositeValidator {
    pub fn new(validators: Vec<Box<dyn RecordValidator>>) -> Self {
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl RecordValidator for CompositeValidator {
    fn validate(&self, params: &RecordParameters) -> Result<(), ValidationError> {
        self.validators.iter().try_for_each(|v| v.validate(params))
    }
}

/// Assembles a [`CompositeValidator`] from bound values.
///
/// ```
/// use chrono::NaiveDate;
/// use file_cabinet::engine::ValidatorBuilder;
/// use rust_decimal::Decimal;
///
/// let validator = ValidatorBuilder::new()
///     .validate_first_name(2, 60)
///     .validate_last_name(2, 60)
///     .validate_date_of_birth(
///         NaiveDate::from_ymd_opt(1950, 1, 1).unwrap(),
///         NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
///     )
///     .validate_grade(-10, 10)
///     .validate_height(Decimal::new(3, 1), Decimal::new(25, 1))
///     .validate_favourite_symbol('#')
///     .create();
/// assert_eq!(validator.len(), 6);
/// ```
#[derive(Default)]
pub struct ValidatorBuilder {
    validators: Vec<Box<dyn RecordValidator>>,
}

impl ValidatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with every rule of a profile, in canonical order.
    pub fn from_profile(profile: &ValidationProfile) -> Self {
        Self::new()
            .validate_first_name(profile.first_name.min, profile.first_name.max)
            .validate_last_name(profile.last_name.min, profile.last_name.max)
            .validate_date_of_birth(profile.date_of_birth.from, profile.date_of_birth.upper_bound())
            .validate_grade(profile.grade.min, profile.grade.max)
            .validate_height(profile.height.min, profile.height.max)
            .validate_favourite_symbol(profile.favourite_symbol.banned)
    }

    pub fn validate_first_name(self, min: usize, max: usize) -> Self {
        self.push(NameLengthValidator {
            field: NameField::First,
            min,
            max,
        })
    }

    pub fn validate_last_name(self, min: usize, max: usize) -> Self {
        self.push(NameLengthValidator {
            field: NameField::Last,
            min,
            max,
        })
    }

    pub fn validate_date_of_birth(self, from: NaiveDate, to: NaiveDate) -> Self {
        self.push(DateOfBirthValidator { from, to })
    }

    pub fn validate_grade(self, min: i16, max: i16) -> Self {
        self.push(GradeValidator { min, max })
    }

    pub fn validate_height(self, min: Decimal, max: Decimal) -> Self {
        self.push(HeightValidator { min, max })
    }

    pub fn validate_favourite_symbol(self, banned: char) -> Self {
        self.push(FavouriteSymbolValidator { banned })
    }

    pub fn create(self) -> CompositeValidator {
        CompositeValidator::new(self.validators)
    }

    fn push(mut self, validator: impl RecordValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RulesCatalog, ValidationMode};

    fn params(first_name: &str) -> RecordParameters {
        RecordParameters {
            first_name: first_name.to_string(),
            last_name: "Smith".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 20).unwrap(),
            grade: 4,
            height: Decimal::new(18, 1),
            favourite_symbol: '$',
        }
    }

    fn default_validator() -> CompositeValidator {
        let rules = RulesCatalog::builtin();
        ValidatorBuilder::from_profile(rules.profile(ValidationMode::Default)).create()
    }

    #[test]
    fn first_name_length_boundaries() {
        let v = default_validator();
        assert!(v.validate(&params(&"a".repeat(2))).is_ok());
        assert!(v.validate(&params(&"a".repeat(60))).is_ok());
        assert!(matches!(
            v.validate(&params("a")),
            Err(ValidationError::NameLength { actual: 1, .. })
        ));
        assert!(matches!(
            v.validate(&params(&"a".repeat(61))),
            Err(ValidationError::NameLength { actual: 61, .. })
        ));
    }

    #[test]
    fn wide_names_must_fit_the_slot() {
        let v = default_validator();
        assert!(v.validate(&params(&"ж".repeat(59))).is_ok());
        assert_eq!(
            v.validate(&params(&"ж".repeat(60))),
            Err(ValidationError::NameTooWide {
                field: "first name",
                capacity: NAME_CAPACITY,
                actual: 120,
            })
        );
    }

    #[test]
    fn whitespace_name_is_blank() {
        let v = default_validator();
        assert_eq!(
            v.validate(&params("   ")),
            Err(ValidationError::BlankName { field: "first name" })
        );
    }

    #[test]
    fn fails_fast_on_first_violation() {
        let v = default_validator();
        let mut p = params("J");
        p.grade = 99;
        // first name is checked before grade
        assert!(matches!(v.validate(&p), Err(ValidationError::NameLength { .. })));
    }

    #[test]
    fn banned_and_non_ascii_symbols() {
        let v = default_validator();
        let mut p = params("John");
        p.favourite_symbol = '#';
        assert_eq!(v.validate(&p), Err(ValidationError::BannedSymbol('#')));
        p.favourite_symbol = 'ж';
        assert_eq!(v.validate(&p), Err(ValidationError::SymbolNotAscii('ж')));
    }

    #[test]
    fn custom_profile_uses_its_own_bounds() {
        let rules = RulesCatalog::builtin();
        let custom = ValidatorBuilder::from_profile(rules.profile(ValidationMode::Custom)).create();
        let mut p = params("Jo");
        assert!(matches!(custom.validate(&p), Err(ValidationError::NameLength { .. })));
        p.first_name = "Joe".into();
        p.grade = 0;
        assert!(matches!(custom.validate(&p), Err(ValidationError::GradeOutOfRange { .. })));
        p.grade = 5;
        assert!(custom.validate(&p).is_ok());
    }
}
