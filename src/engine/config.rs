use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr};

use super::{CabinetError, Result, NAME_CAPACITY};

/// Rules file picked up from the working directory when none is given.
pub const DEFAULT_RULES_FILE: &str = "validation-rules.json";

/// Which of the two validation profiles a running service enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Default,
    Custom,
}

impl FromStr for ValidationMode {
    type Err = CabinetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ValidationMode::Default),
            "custom" => Ok(ValidationMode::Custom),
            other => Err(CabinetError::Config(format!(
                "unknown validation rules '{}'; supported: default, custom",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationMode::Default => f.write_str("default"),
            ValidationMode::Custom => f.write_str("custom"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub from: NaiveDate,
    /// Latest accepted date; `None` means "today" at the time validation is assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl DateBounds {
    pub fn upper_bound(&self) -> NaiveDate {
        self.to.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBounds {
    pub min: i16,
    pub max: i16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightBounds {
    pub min: Decimal,
    pub max: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRule {
    pub banned: char,
}

/// Bound values for one validation profile.
///
/// Profiles differ only in data; the validator logic that consumes them is
/// the same for all of them (see [`super::ValidatorBuilder::from_profile`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationProfile {
    pub first_name: LengthBounds,
    pub last_name: LengthBounds,
    pub date_of_birth: DateBounds,
    pub grade: GradeBounds,
    pub height: HeightBounds,
    pub favourite_symbol: SymbolRule,
}

impl ValidationProfile {
    /// Checks that the bounds are ordered and that names fit the binary slot.
    fn check(&self, name: &str) -> Result<()> {
        let fail = |msg: String| -> Result<()> {
            Err(CabinetError::Config(format!("{} profile: {}", name, msg)))
        };
        for (label, bounds) in [("firstName", self.first_name), ("lastName", self.last_name)] {
            if bounds.min == 0 || bounds.min > bounds.max {
                return fail(format!("{} bounds {}..{} are invalid", label, bounds.min, bounds.max));
            }
            // byte width of each value is checked by the name validator
            if bounds.max > NAME_CAPACITY {
                return fail(format!(
                    "{} max length {} exceeds the slot capacity {}",
                    label, bounds.max, NAME_CAPACITY
                ));
            }
        }
        if self.date_of_birth.from > self.date_of_birth.upper_bound() {
            return fail("dateOfBirth 'from' is after 'to'".to_string());
        }
        if self.grade.min > self.grade.max {
            return fail("grade min is above max".to_string());
        }
        if self.height.min > self.height.max {
            return fail("height min is above max".to_string());
        }
        Ok(())
    }
}

/// The default and custom validation profiles.
///
/// ## File Format
/// ```json
/// {
///   "default": {
///     "firstName": { "min": 2, "max": 60 },
///     "lastName": { "min": 2, "max": 60 },
///     "dateOfBirth": { "from": "1950-01-01" },
///     "grade": { "min": -10, "max": 10 },
///     "height": { "min": "0.3", "max": "2.5" },
///     "favouriteSymbol": { "banned": "#" }
///   },
///   "custom": { ... }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesCatalog {
    pub default: ValidationProfile,
    pub custom: ValidationProfile,
}

impl RulesCatalog {
    /// Profiles compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            default: ValidationProfile {
                first_name: LengthBounds { min: 2, max: 60 },
                last_name: LengthBounds { min: 2, max: 60 },
                date_of_birth: DateBounds {
                    from: ymd(1950, 1, 1),
                    to: None,
                },
                grade: GradeBounds { min: -10, max: 10 },
                height: HeightBounds {
                    min: Decimal::new(3, 1),
                    max: Decimal::new(25, 1),
                },
                favourite_symbol: SymbolRule { banned: '#' },
            },
            custom: ValidationProfile {
                first_name: LengthBounds { min: 3, max: 30 },
                last_name: LengthBounds { min: 3, max: 30 },
                date_of_birth: DateBounds {
                    from: ymd(1930, 1, 1),
                    to: Some(ymd(2010, 12, 31)),
                },
                grade: GradeBounds { min: 1, max: 12 },
                height: HeightBounds {
                    min: Decimal::new(5, 1),
                    max: Decimal::new(23, 1),
                },
                favourite_symbol: SymbolRule { banned: '*' },
            },
        }
    }

    /// Loads the rules file at `path`, falling back to the built-in profiles
    /// when the file does not exist.
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "rules file absent, using built-in profiles");
            return Ok(Self::builtin());
        }
        Self::load(path)
    }

    /// Loads the rules file at `path`; a missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            CabinetError::Config(format!("cannot read rules file {}: {}", path.display(), e))
        })?;
        Self::from_json(&bytes)
    }

    /// Loads an explicitly requested rules file, or [`DEFAULT_RULES_FILE`]
    /// when present, or the built-in profiles.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_or_builtin(Path::new(DEFAULT_RULES_FILE)),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let catalog: RulesCatalog = serde_json::from_slice(bytes)
            .map_err(|e| CabinetError::Config(format!("cannot read validation rules: {}", e)))?;
        catalog.default.check("default")?;
        catalog.custom.check("custom")?;
        Ok(catalog)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CabinetError::Config(e.to_string()))
    }

    pub fn profile(&self, mode: ValidationMode) -> &ValidationProfile {
        match mode {
            ValidationMode::Default => &self.default,
            ValidationMode::Custom => &self.custom,
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_pass_their_own_checks() {
        let rules = RulesCatalog::builtin();
        rules.default.check("default").unwrap();
        rules.custom.check("custom").unwrap();
    }

    #[test]
    fn json_round_trip_keeps_profiles() {
        let rules = RulesCatalog::builtin();
        let json = rules.to_json().unwrap();
        assert!(json.contains("\"firstName\""));
        let back = RulesCatalog::from_json(json.as_bytes()).unwrap();
        assert_eq!(back, rules);
    }

    #[test]
    fn rejects_name_bounds_beyond_slot_capacity() {
        let mut rules = RulesCatalog::builtin();
        rules.custom.last_name.max = 500;
        let json = rules.to_json().unwrap();
        let err = RulesCatalog::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(err, CabinetError::Config(msg) if msg.contains("lastName")));
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let rules = RulesCatalog::load_or_builtin(&dir.path().join("absent.json")).unwrap();
        assert_eq!(rules, RulesCatalog::builtin());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = RulesCatalog::resolve(Some(&path)).unwrap_err();
        assert!(matches!(err, CabinetError::Config(msg) if msg.contains("absent.json")));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let mut rules = RulesCatalog::builtin();
        rules.custom.grade.max = 5;
        fs::write(&path, rules.to_json().unwrap()).unwrap();
        assert_eq!(RulesCatalog::resolve(Some(&path)).unwrap(), rules);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Custom".parse::<ValidationMode>().unwrap(), ValidationMode::Custom);
        assert!("strict".parse::<ValidationMode>().is_err());
    }
}
