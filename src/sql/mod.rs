use sqlparser::ast::{self, BinaryOperator, Expr, SelectItem, SetExpr, Statement, UnaryOperator};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::engine::{
    execute_delete, execute_select, execute_update, Assignment, CabinetError, Connective, Field,
    FieldValue, FileCabinetRecord, Predicate, QueryCache, RecordParameters, RecordService, Result,
    Selection,
};

/// Table name the command parameters are rewritten against.
const TABLE: &str = "records";

/// Outcome of one query command.
#[derive(Debug)]
pub enum QueryOutput {
    Inserted(u32),
    Updated(Vec<u32>),
    Deleted(Vec<u32>),
    Selected {
        columns: Vec<Field>,
        selection: Selection,
    },
}

/// Parses the parameters of an `insert`, `update`, `delete` or `select`
/// command and runs it against `service`.
///
/// The parameter text is rewritten into a SQL statement over a single
/// `records` table and parsed with `sqlparser`, so quoting and escaping
/// follow SQL rules (`'O''Brien'`).
///
/// ## Command Forms
/// - `insert (id, firstname, lastname, dateofbirth, grade, height, favouritesymbol) values ('1', 'John', ...)`
///   with `id` optional
/// - `update set field = 'value'[, ...] where <conditions>`
/// - `delete where <conditions>`
/// - `select [field, ...] [where <conditions>]`
///
/// ## Conditions
/// `field = value` terms joined by `and` or by `or`, never both. Values may
/// be quoted or bare numbers and are parsed for the field's type.
///
/// ## Cache
/// Mutating commands clear `cache` before they touch the store; selects
/// with more than one condition are served from and stored into it.
pub fn plan_and_exec(
    service: &mut dyn RecordService,
    cache: &QueryCache,
    command: &str,
    params: &str,
) -> Result<QueryOutput> {
    let sql = rewrite(command, params)?;
    debug!(%sql, "planning query");
    let stmt = parse_single(&sql)?;

    match (command, stmt) {
        ("insert", Statement::Insert { columns, source, .. }) => {
            let query = source.ok_or_else(|| usage("insert"))?;
            let rows = match *query.body {
                SetExpr::Values(values) => values.rows,
                _ => return Err(usage("insert")),
            };
            let [row]: [Vec<Expr>; 1] = rows
                .try_into()
                .map_err(|_| CabinetError::Argument("insert takes exactly one row of values".into()))?;
            if row.len() != columns.len() {
                return Err(CabinetError::Argument(format!(
                    "{} field(s) but {} value(s)",
                    columns.len(),
                    row.len()
                )));
            }
            let mut pairs = Vec::with_capacity(row.len());
            for (column, expr) in columns.iter().zip(row) {
                let field: Field = column.value.parse()?;
                pairs.push((field, field.parse_value(&literal(expr)?)?));
            }
            let (id, params) = record_from_pairs(pairs)?;
            cache.clear();
            let id = match id {
                Some(id) => service.insert(&FileCabinetRecord::from_parameters(id, &params))?,
                None => service.create(&params)?,
            };
            Ok(QueryOutput::Inserted(id))
        }

        ("update", Statement::Update { assignments, selection, .. }) => {
            let pred = parse_where(selection)?.ok_or_else(|| usage("update"))?;
            let assignments = assignments
                .into_iter()
                .map(convert_assignment)
                .collect::<Result<Vec<_>>>()?;
            cache.clear();
            Ok(QueryOutput::Updated(execute_update(service, &pred, &assignments)?))
        }

        ("delete", Statement::Delete { selection, .. }) => {
            let pred = parse_where(selection)?.ok_or_else(|| usage("delete"))?;
            cache.clear();
            Ok(QueryOutput::Deleted(execute_delete(service, &pred)?))
        }

        ("select", Statement::Query(query)) => {
            let select = match *query.body {
                SetExpr::Select(select) => *select,
                _ => return Err(usage("select")),
            };
            let columns = projection(select.projection)?;
            let pred = parse_where(select.selection)?;
            let selection = execute_select(service, cache, pred.as_ref())?;
            Ok(QueryOutput::Selected { columns, selection })
        }

        (command, _) => Err(usage(command)),
    }
}

/// Turns command parameters into SQL text, checking the separators each
/// command requires.
fn rewrite(command: &str, params: &str) -> Result<String> {
    let params = params.trim();
    match command {
        "insert" => {
            if find_keyword(params, "values").is_none() {
                return Err(usage("insert"));
            }
            Ok(format!("INSERT INTO {} {}", TABLE, params))
        }
        "update" => {
            if find_keyword(params, "set") != Some(0) || find_keyword(params, "where").is_none() {
                return Err(usage("update"));
            }
            Ok(format!("UPDATE {} {}", TABLE, params))
        }
        "delete" => {
            if find_keyword(params, "where") != Some(0) {
                return Err(usage("delete"));
            }
            Ok(format!("DELETE FROM {} {}", TABLE, params))
        }
        "select" => {
            let (fields, conditions) = match find_keyword(params, "where") {
                Some(at) => (params[..at].trim(), &params[at..]),
                None => (params, ""),
            };
            let fields = if fields.is_empty() { "*" } else { fields };
            Ok(format!("SELECT {} FROM {} {}", fields, TABLE, conditions))
        }
        other => Err(usage(other)),
    }
}

fn usage(command: &str) -> CabinetError {
    let form = match command {
        "insert" => "insert (field, ...) values ('value', ...)",
        "update" => "update set field = 'value'[, ...] where <conditions>",
        "delete" => "delete where <conditions>",
        "select" => "select [field, ...] [where <conditions>]",
        _ => return CabinetError::Argument(format!("'{}' is not a query command", command)),
    };
    CabinetError::Argument(format!("expected '{}'", form))
}

fn parse_single(sql: &str) -> Result<Statement> {
    let dialect = GenericDialect {};
    let mut ast = Parser::parse_sql(&dialect, sql)
        .map_err(|e| CabinetError::Argument(format!("cannot parse query: {}", e)))?;
    match (ast.pop(), ast.is_empty()) {
        (Some(stmt), true) => Ok(stmt),
        _ => Err(CabinetError::Argument(
            "only one statement at a time is supported".into(),
        )),
    }
}

/// Byte offset of `keyword` as a standalone word outside quoted text.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let word = keyword.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut quoted = false;
    for i in 0..bytes.len() {
        if bytes[i] == b'\'' {
            quoted = !quoted;
            continue;
        }
        if quoted || i + word.len() > bytes.len() {
            continue;
        }
        let starts = i == 0 || !is_word(bytes[i - 1]);
        let ends = bytes.get(i + word.len()).map_or(true, |&b| !is_word(b));
        if starts && ends && bytes[i..i + word.len()].eq_ignore_ascii_case(word) {
            return Some(i);
        }
    }
    None
}

fn projection(items: Vec<SelectItem>) -> Result<Vec<Field>> {
    let mut columns = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard(_) => return Ok(Field::ALL.to_vec()),
            SelectItem::UnnamedExpr(Expr::Identifier(id)) => columns.push(id.value.parse()?),
            other => {
                return Err(CabinetError::Argument(format!(
                    "'{}' is not a field name",
                    other
                )))
            }
        }
    }
    Ok(columns)
}

fn parse_where(selection: Option<Expr>) -> Result<Option<Predicate>> {
    let Some(expr) = selection else {
        return Ok(None);
    };
    let mut connective = None;
    let mut conditions = Vec::new();
    flatten(expr, &mut connective, &mut conditions)?;
    Ok(Predicate::combine(
        conditions,
        connective.unwrap_or(Connective::And),
    ))
}

/// Collects the equality terms of a condition tree, rejecting trees that
/// mix `and` with `or`.
fn flatten(
    expr: Expr,
    connective: &mut Option<Connective>,
    out: &mut Vec<(Field, FieldValue)>,
) -> Result<()> {
    match expr {
        Expr::Nested(inner) => flatten(*inner, connective, out),
        Expr::BinaryOp { left, op, right } => {
            let joined = match op {
                BinaryOperator::Eq => {
                    out.push(equality(*left, *right)?);
                    return Ok(());
                }
                BinaryOperator::And => Connective::And,
                BinaryOperator::Or => Connective::Or,
                other => {
                    return Err(CabinetError::Argument(format!(
                        "operator '{}' is not supported; use =, and, or",
                        other
                    )))
                }
            };
            match connective {
                Some(seen) if *seen != joined => {
                    return Err(CabinetError::Argument(
                        "'and' and 'or' cannot be mixed in one condition".into(),
                    ))
                }
                _ => *connective = Some(joined),
            }
            flatten(*left, connective, out)?;
            flatten(*right, connective, out)
        }
        other => Err(CabinetError::Argument(format!(
            "'{}' is not a field = value condition",
            other
        ))),
    }
}

fn equality(left: Expr, right: Expr) -> Result<(Field, FieldValue)> {
    let field: Field = match left {
        Expr::Identifier(id) => id.value.parse()?,
        other => {
            return Err(CabinetError::Argument(format!(
                "'{}' is not a field name",
                other
            )))
        }
    };
    Ok((field, field.parse_value(&literal(right)?)?))
}

fn convert_assignment(assignment: ast::Assignment) -> Result<Assignment> {
    let name = assignment
        .id
        .last()
        .map(|id| id.value.clone())
        .unwrap_or_default();
    let field: Field = name.parse()?;
    if field == Field::Id {
        return Err(CabinetError::Argument("id cannot be updated".into()));
    }
    let value = field.parse_value(&literal(assignment.value)?)?;
    Ok(Assignment { field, value })
}

/// Raw text of a quoted string or a (possibly negative) number.
fn literal(expr: Expr) -> Result<String> {
    match expr {
        Expr::Value(ast::Value::SingleQuotedString(s)) => Ok(s),
        Expr::Value(ast::Value::Number(n, _)) => Ok(n),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => Ok(format!("-{}", literal(*expr)?)),
        Expr::Nested(inner) => literal(*inner),
        other => Err(CabinetError::Argument(format!(
            "'{}' is not a value; quote text values",
            other
        ))),
    }
}

fn record_from_pairs(pairs: Vec<(Field, FieldValue)>) -> Result<(Option<u32>, RecordParameters)> {
    let mut id = None;
    let mut first_name = None;
    let mut last_name = None;
    let mut date_of_birth = None;
    let mut grade = None;
    let mut height = None;
    let mut favourite_symbol = None;

    for (field, value) in pairs {
        let duplicate = match (field, value) {
            (Field::Id, FieldValue::Id(v)) => id.replace(v).is_some(),
            (Field::FirstName, FieldValue::Text(v)) => first_name.replace(v).is_some(),
            (Field::LastName, FieldValue::Text(v)) => last_name.replace(v).is_some(),
            (Field::DateOfBirth, FieldValue::Date(v)) => date_of_birth.replace(v).is_some(),
            (Field::Grade, FieldValue::Grade(v)) => grade.replace(v).is_some(),
            (Field::Height, FieldValue::Height(v)) => height.replace(v).is_some(),
            (Field::FavouriteSymbol, FieldValue::Symbol(v)) => favourite_symbol.replace(v).is_some(),
            (field, value) => {
                return Err(CabinetError::Argument(format!(
                    "value '{}' does not fit field {}",
                    value, field
                )))
            }
        };
        if duplicate {
            return Err(CabinetError::Argument(format!("field {} is given twice", field)));
        }
    }

    let missing = |field: Field| CabinetError::Argument(format!("field {} is required", field));
    let params = RecordParameters {
        first_name: first_name.ok_or_else(|| missing(Field::FirstName))?,
        last_name: last_name.ok_or_else(|| missing(Field::LastName))?,
        date_of_birth: date_of_birth.ok_or_else(|| missing(Field::DateOfBirth))?,
        grade: grade.ok_or_else(|| missing(Field::Grade))?,
        height: height.ok_or_else(|| missing(Field::Height))?,
        favourite_symbol: favourite_symbol.ok_or_else(|| missing(Field::FavouriteSymbol))?,
    };
    Ok((id, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryService, RulesCatalog, ValidationMode, ValidatorBuilder};
    use std::sync::Arc;

    const JOHN: &str = "(id, firstname, lastname, dateofbirth, grade, height, favouritesymbol) \
                        values ('1', 'John', 'Smith', '05/20/1990', '4', '1.8', '$')";

    fn service() -> MemoryService {
        let rules = RulesCatalog::builtin();
        MemoryService::new(ValidatorBuilder::from_profile(rules.profile(ValidationMode::Default)).create())
    }

    fn run(s: &mut MemoryService, cache: &QueryCache, command: &str, params: &str) -> Result<QueryOutput> {
        plan_and_exec(s, cache, command, params)
    }

    fn selected(out: QueryOutput) -> (Vec<Field>, Selection) {
        match out {
            QueryOutput::Selected { columns, selection } => (columns, selection),
            other => panic!("expected a selection, got {:?}", other),
        }
    }

    #[test]
    fn insert_with_and_without_id() {
        let mut s = service();
        let cache = QueryCache::default();
        assert!(matches!(run(&mut s, &cache, "insert", JOHN).unwrap(), QueryOutput::Inserted(1)));

        let no_id = "(firstname, lastname, dateofbirth, grade, height, favouritesymbol) \
                     values ('Jane', 'Doe', '1985-Jan-02', -3, 1.65, '@')";
        assert!(matches!(run(&mut s, &cache, "insert", no_id).unwrap(), QueryOutput::Inserted(2)));
        let jane = s.find_by_id(2).unwrap().unwrap();
        assert_eq!(jane.grade, -3);
        assert_eq!(jane.height.to_string(), "1.65");
    }

    #[test]
    fn insert_rejects_missing_and_repeated_fields() {
        let mut s = service();
        let cache = QueryCache::default();
        let missing = "(firstname, lastname) values ('John', 'Smith')";
        assert!(matches!(run(&mut s, &cache, "insert", missing), Err(CabinetError::Argument(_))));
        let twice = "(firstname, firstname) values ('John', 'Jim')";
        assert!(matches!(run(&mut s, &cache, "insert", twice), Err(CabinetError::Argument(_))));
        let bad_date = JOHN.replace("05/20/1990", "20.05.1990");
        assert!(matches!(run(&mut s, &cache, "insert", &bad_date), Err(CabinetError::Parse(_))));
    }

    #[test]
    fn compound_select_hits_the_cache() {
        let mut s = service();
        let cache = QueryCache::default();
        run(&mut s, &cache, "insert", JOHN).unwrap();

        let query = "where firstname = 'John' and lastname = 'Smith'";
        let (columns, first) = selected(run(&mut s, &cache, "select", query).unwrap());
        assert_eq!(columns, Field::ALL.to_vec());
        assert_eq!(first.records.len(), 1);
        assert!(!first.cached);

        let (_, second) = selected(run(&mut s, &cache, "select", query).unwrap());
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.records, &second.records));
    }

    #[test]
    fn mutations_clear_the_cache() {
        let mut s = service();
        let cache = QueryCache::default();
        run(&mut s, &cache, "insert", JOHN).unwrap();
        let query = "id, lastname where firstname = 'john' or grade = 7";
        run(&mut s, &cache, "select", query).unwrap();
        assert_eq!(cache.len(), 1);

        let out = run(&mut s, &cache, "update", "set lastname = 'Doe', grade = 7 where id = 1").unwrap();
        assert!(matches!(out, QueryOutput::Updated(ids) if ids == vec![1]));
        assert!(cache.is_empty());

        let (columns, sel) = selected(run(&mut s, &cache, "select", query).unwrap());
        assert_eq!(columns, vec![Field::Id, Field::LastName]);
        assert!(!sel.cached);
        assert_eq!(sel.records[0].last_name, "Doe");
    }

    #[test]
    fn separators_are_required() {
        let mut s = service();
        let cache = QueryCache::default();
        for (command, params) in [
            ("update", "set grade = 3"),
            ("update", "grade = 3 where id = 1"),
            ("delete", "id = 1"),
            ("insert", "(id) ('1')"),
        ] {
            assert!(
                matches!(run(&mut s, &cache, command, params), Err(CabinetError::Argument(_))),
                "{} {}",
                command,
                params
            );
        }
    }

    #[test]
    fn mixed_connectives_are_rejected() {
        let mut s = service();
        let cache = QueryCache::default();
        let err = run(&mut s, &cache, "select", "where id = 1 and grade = 4 or lastname = 'Smith'").unwrap_err();
        assert!(matches!(err, CabinetError::Argument(msg) if msg.contains("mixed")));
    }

    #[test]
    fn delete_removes_matches_and_keyword_in_quotes_is_text() {
        let mut s = service();
        let cache = QueryCache::default();
        run(&mut s, &cache, "insert", JOHN).unwrap();
        let odd = "(firstname, lastname, dateofbirth, grade, height, favouritesymbol) \
                   values ('Where', 'Values', '01/01/1980', 1, 1.7, '!')";
        run(&mut s, &cache, "insert", odd).unwrap();

        let (_, sel) = selected(run(&mut s, &cache, "select", "firstname where lastname = 'values'").unwrap());
        assert_eq!(sel.records[0].first_name, "Where");

        let out = run(&mut s, &cache, "delete", "where lastname = 'Smith'").unwrap();
        assert!(matches!(out, QueryOutput::Deleted(ids) if ids == vec![1]));
        assert_eq!(s.list().unwrap().len(), 1);
    }

    #[test]
    fn id_cannot_be_assigned() {
        let mut s = service();
        let cache = QueryCache::default();
        run(&mut s, &cache, "insert", JOHN).unwrap();
        let err = run(&mut s, &cache, "update", "set id = 5 where id = 1").unwrap_err();
        assert!(matches!(err, CabinetError::Argument(_)));
    }
}
