use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::debug;

use super::{
    parse_date, CabinetError, FileCabinetRecord, QueryCache, RecordService, Result,
    INTERCHANGE_DATE_FORMAT,
};

/// A record field addressable from queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    FirstName,
    LastName,
    DateOfBirth,
    Grade,
    Height,
    FavouriteSymbol,
}

impl Field {
    /// Every field, in record order.
    pub const ALL: [Field; 7] = [
        Field::Id,
        Field::FirstName,
        Field::LastName,
        Field::DateOfBirth,
        Field::Grade,
        Field::Height,
        Field::FavouriteSymbol,
    ];

    /// Lowercase name used in commands.
    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::FirstName => "firstname",
            Field::LastName => "lastname",
            Field::DateOfBirth => "dateofbirth",
            Field::Grade => "grade",
            Field::Height => "height",
            Field::FavouriteSymbol => "favouritesymbol",
        }
    }

    /// Column caption used by printers.
    pub fn title(self) -> &'static str {
        match self {
            Field::Id => "Id",
            Field::FirstName => "FirstName",
            Field::LastName => "LastName",
            Field::DateOfBirth => "DateOfBirth",
            Field::Grade => "Grade",
            Field::Height => "Height",
            Field::FavouriteSymbol => "FavouriteSymbol",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Field::Id | Field::Grade | Field::Height)
    }

    /// Parses a raw command value into this field's type.
    pub fn parse_value(self, raw: &str) -> Result<FieldValue> {
        let raw = raw.trim();
        let bad = |what: &str| CabinetError::Parse(format!("'{}' is not a valid {} for {}", raw, what, self.name()));
        Ok(match self {
            Field::Id => FieldValue::Id(raw.parse().map_err(|_| bad("id"))?),
            Field::FirstName | Field::LastName => FieldValue::Text(raw.to_string()),
            Field::DateOfBirth => FieldValue::Date(parse_date(raw)?),
            Field::Grade => FieldValue::Grade(raw.parse().map_err(|_| bad("grade"))?),
            Field::Height => FieldValue::Height(Decimal::from_str(raw).map_err(|_| bad("decimal"))?),
            Field::FavouriteSymbol => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => FieldValue::Symbol(c),
                    _ => return Err(bad("single character")),
                }
            }
        })
    }

    /// The record's value for this field.
    pub fn value_of(self, record: &FileCabinetRecord) -> FieldValue {
        match self {
            Field::Id => FieldValue::Id(record.id),
            Field::FirstName => FieldValue::Text(record.first_name.clone()),
            Field::LastName => FieldValue::Text(record.last_name.clone()),
            Field::DateOfBirth => FieldValue::Date(record.date_of_birth),
            Field::Grade => FieldValue::Grade(record.grade),
            Field::Height => FieldValue::Height(record.height),
            Field::FavouriteSymbol => FieldValue::Symbol(record.favourite_symbol),
        }
    }
}

impl FromStr for Field {
    type Err = CabinetError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| CabinetError::Argument(format!("unknown field '{}'", s.trim())))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed field value taken from a query or a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Id(u32),
    Text(String),
    Date(NaiveDate),
    Grade(i16),
    Height(Decimal),
    Symbol(char),
}

impl FieldValue {
    /// Equality as queries see it: names compare case-insensitively.
    fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Id(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Date(v) => write!(f, "{}", v.format(INTERCHANGE_DATE_FORMAT)),
            FieldValue::Grade(v) => write!(f, "{}", v),
            FieldValue::Height(v) => write!(f, "{}", v.normalize()),
            FieldValue::Symbol(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

/// WHERE conditions of a select, update or delete.
///
/// Only field equality combined with AND or OR is supported. Parsers build
/// the tree with [`Predicate::combine`], which keeps a single connective kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    Eq(Field, FieldValue),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Folds equality conditions left to right with one connective.
    ///
    /// Returns `None` for an empty condition list.
    pub fn combine(conditions: Vec<(Field, FieldValue)>, connective: Connective) -> Option<Predicate> {
        conditions
            .into_iter()
            .map(|(field, value)| Predicate::Eq(field, value))
            .reduce(|left, right| match connective {
                Connective::And => Predicate::And(Box::new(left), Box::new(right)),
                Connective::Or => Predicate::Or(Box::new(left), Box::new(right)),
            })
    }

    pub fn matches(&self, record: &FileCabinetRecord) -> bool {
        match self {
            Predicate::Eq(field, value) => field.value_of(record).matches(value),
            Predicate::And(l, r) => l.matches(record) && r.matches(record),
            Predicate::Or(l, r) => l.matches(record) || r.matches(record),
        }
    }

    pub fn is_compound(&self) -> bool {
        !matches!(self, Predicate::Eq(..))
    }

    /// Canonical text form; used as the memoization key.
    ///
    /// Field names are lowercase, name values are lowercased (matching is
    /// case-insensitive) and every value is rendered in its normalized form.
    /// Quotes inside values are doubled, so a value never reads as a connective.
    pub fn cache_key(&self) -> String {
        match self {
            Predicate::Eq(field, FieldValue::Text(v)) => {
                format!("{}='{}'", field, v.to_lowercase().replace('\'', "''"))
            }
            Predicate::Eq(field, value) => format!("{}='{}'", field, value.to_string().replace('\'', "''")),
            Predicate::And(l, r) => format!("{} and {}", l.cache_key(), r.cache_key()),
            Predicate::Or(l, r) => format!("{} or {}", l.cache_key(), r.cache_key()),
        }
    }
}

/// One `field = value` pair of an update's SET clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub field: Field,
    pub value: FieldValue,
}

/// Result rows of a select and whether they came from the cache.
#[derive(Clone, Debug)]
pub struct Selection {
    pub records: Arc<Vec<FileCabinetRecord>>,
    pub cached: bool,
}

/// Records matched by `pred`, without touching the cache.
///
/// A lone first/last name or id condition goes through the store's own
/// lookup; anything else filters the full record list.
pub fn matching_records(
    service: &dyn RecordService,
    pred: Option<&Predicate>,
) -> Result<Vec<FileCabinetRecord>> {
    match pred {
        None => service.list(),
        Some(Predicate::Eq(Field::FirstName, FieldValue::Text(name))) => {
            service.find_by_first_name(name)
        }
        Some(Predicate::Eq(Field::LastName, FieldValue::Text(name))) => {
            service.find_by_last_name(name)
        }
        Some(Predicate::Eq(Field::Id, FieldValue::Id(id))) => {
            Ok(service.find_by_id(*id)?.into_iter().collect())
        }
        Some(p) => Ok(service.list()?.into_iter().filter(|r| p.matches(r)).collect()),
    }
}

/// Runs a select, consulting the memoization cache for compound conditions.
pub fn execute_select(
    service: &dyn RecordService,
    cache: &QueryCache,
    pred: Option<&Predicate>,
) -> Result<Selection> {
    let key = pred.filter(|p| p.is_compound()).map(Predicate::cache_key);
    if let Some(key) = &key {
        if let Some(records) = cache.get(key) {
            debug!(%key, "select served from cache");
            return Ok(Selection {
                records,
                cached: true,
            });
        }
    }
    let found = matching_records(service, pred)?;
    let records = match key {
        Some(key) => cache.put(key, found),
        None => Arc::new(found),
    };
    Ok(Selection {
        records,
        cached: false,
    })
}

/// Returns a copy of `record` with the assignments applied over it.
pub fn apply_assignments(
    record: &FileCabinetRecord,
    assignments: &[Assignment],
) -> Result<FileCabinetRecord> {
    let mut updated = record.clone();
    for Assignment { field, value } in assignments {
        match (field, value) {
            (Field::FirstName, FieldValue::Text(v)) => updated.first_name = v.clone(),
            (Field::LastName, FieldValue::Text(v)) => updated.last_name = v.clone(),
            (Field::DateOfBirth, FieldValue::Date(v)) => updated.date_of_birth = *v,
            (Field::Grade, FieldValue::Grade(v)) => updated.grade = *v,
            (Field::Height, FieldValue::Height(v)) => updated.height = *v,
            (Field::FavouriteSymbol, FieldValue::Symbol(v)) => updated.favourite_symbol = *v,
            (Field::Id, _) => {
                return Err(CabinetError::Argument("id cannot be updated".to_string()))
            }
            (field, value) => {
                return Err(CabinetError::Argument(format!(
                    "value '{}' does not fit field {}",
                    value, field
                )))
            }
        }
    }
    Ok(updated)
}

/// Merges the assignments into every matching record and edits it.
///
/// Stops at the first record the store refuses; records edited before it
/// keep their new values.
pub fn execute_update(
    service: &mut dyn RecordService,
    pred: &Predicate,
    assignments: &[Assignment],
) -> Result<Vec<u32>> {
    let targets = matching_records(service, Some(pred))?;
    let mut updated = Vec::with_capacity(targets.len());
    for record in targets {
        let merged = apply_assignments(&record, assignments)?;
        service.edit(&merged)?;
        updated.push(record.id);
    }
    Ok(updated)
}

/// Removes every matching record and returns their ids.
pub fn execute_delete(service: &mut dyn RecordService, pred: &Predicate) -> Result<Vec<u32>> {
    let targets = matching_records(service, Some(pred))?;
    let mut deleted = Vec::with_capacity(targets.len());
    for record in targets {
        service.remove(record.id)?;
        deleted.push(record.id);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        MemoryService, RecordParameters, RulesCatalog, ValidationMode, ValidatorBuilder,
    };

    fn seeded() -> MemoryService {
        let rules = RulesCatalog::builtin();
        let mut s = MemoryService::new(
            ValidatorBuilder::from_profile(rules.profile(ValidationMode::Default)).create(),
        );
        for (first, last, grade) in [("John", "Smith", 4), ("Jane", "Smith", 7), ("John", "Doe", 4)] {
            s.create(&RecordParameters {
                first_name: first.into(),
                last_name: last.into(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 20).unwrap(),
                grade,
                height: Decimal::new(18, 1),
                favourite_symbol: '$',
            })
            .unwrap();
        }
        s
    }

    fn eq(field: Field, raw: &str) -> (Field, FieldValue) {
        (field, field.parse_value(raw).unwrap())
    }

    fn ids(records: &[FileCabinetRecord]) -> Vec<u32> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn parses_values_per_field_type() {
        assert_eq!(Field::Grade.parse_value(" -3 ").unwrap(), FieldValue::Grade(-3));
        assert_eq!(
            Field::DateOfBirth.parse_value("05/20/1990").unwrap(),
            FieldValue::Date(NaiveDate::from_ymd_opt(1990, 5, 20).unwrap())
        );
        assert!(matches!(Field::Id.parse_value("abc"), Err(CabinetError::Parse(_))));
        assert!(matches!(Field::FavouriteSymbol.parse_value("ab"), Err(CabinetError::Parse(_))));
        assert!(matches!("nickname".parse::<Field>(), Err(CabinetError::Argument(_))));
    }

    #[test]
    fn and_or_filters() {
        let s = seeded();
        let and = Predicate::combine(
            vec![eq(Field::FirstName, "john"), eq(Field::LastName, "smith")],
            Connective::And,
        );
        assert_eq!(ids(&matching_records(&s, and.as_ref()).unwrap()), vec![1]);

        let or = Predicate::combine(vec![eq(Field::Id, "2"), eq(Field::LastName, "Doe")], Connective::Or);
        assert_eq!(ids(&matching_records(&s, or.as_ref()).unwrap()), vec![2, 3]);
    }

    #[test]
    fn compound_selects_are_memoized() {
        let s = seeded();
        let cache = QueryCache::default();
        let pred = Predicate::combine(
            vec![eq(Field::FirstName, "John"), eq(Field::LastName, "Smith")],
            Connective::And,
        );
        let first = execute_select(&s, &cache, pred.as_ref()).unwrap();
        assert!(!first.cached);
        let second = execute_select(&s, &cache, pred.as_ref()).unwrap();
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.records, &second.records));

        // single conditions use the store lookup and are not cached
        let single = Predicate::combine(vec![eq(Field::FirstName, "John")], Connective::And);
        execute_select(&s, &cache, single.as_ref()).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_key_is_canonical() {
        let a = Predicate::combine(
            vec![eq(Field::FirstName, "JOHN"), eq(Field::Height, "1.80")],
            Connective::Or,
        )
        .unwrap();
        let b = Predicate::combine(
            vec![eq(Field::FirstName, "john"), eq(Field::Height, "1.8")],
            Connective::Or,
        )
        .unwrap();
        assert_eq!(a.cache_key(), "firstname='john' or height='1.8'");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn quoted_values_do_not_collide_with_longer_chains() {
        let spliced = Predicate::combine(
            vec![eq(Field::FirstName, "a' and lastname='b"), eq(Field::LastName, "c")],
            Connective::And,
        )
        .unwrap();
        let chain = Predicate::combine(
            vec![eq(Field::FirstName, "a"), eq(Field::LastName, "b"), eq(Field::LastName, "c")],
            Connective::And,
        )
        .unwrap();
        assert_eq!(spliced.cache_key(), "firstname='a'' and lastname=''b' and lastname='c'");
        assert_ne!(spliced.cache_key(), chain.cache_key());
    }

    #[test]
    fn update_merges_over_existing_fields() {
        let mut s = seeded();
        let pred = Predicate::combine(vec![eq(Field::FirstName, "John")], Connective::And).unwrap();
        let assignments = vec![Assignment {
            field: Field::Grade,
            value: FieldValue::Grade(9),
        }];
        assert_eq!(execute_update(&mut s, &pred, &assignments).unwrap(), vec![1, 3]);
        let john = s.find_by_id(3).unwrap().unwrap();
        assert_eq!(john.grade, 9);
        assert_eq!(john.last_name, "Doe");
    }

    #[test]
    fn id_cannot_be_assigned() {
        let s = seeded();
        let record = s.find_by_id(1).unwrap().unwrap();
        let err = apply_assignments(
            &record,
            &[Assignment {
                field: Field::Id,
                value: FieldValue::Id(5),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, CabinetError::Argument(_)));
    }

    #[test]
    fn delete_removes_all_matches() {
        let mut s = seeded();
        let pred = Predicate::combine(vec![eq(Field::LastName, "Smith")], Connective::And).unwrap();
        assert_eq!(execute_delete(&mut s, &pred).unwrap(), vec![1, 2]);
        assert_eq!(ids(&s.list().unwrap()), vec![3]);
    }
}
