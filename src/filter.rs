// ABOUTME: Declarative row filters evaluated in memory or pushed down as SQL predicates
// ABOUTME: Both forms share one compiled representation so they always agree

use crate::row::Row;
use crate::utils::quote_ident;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operator of a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
}

impl FilterOperator {
    fn sql_symbol(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            FilterOperator::Range => "BETWEEN",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            FilterOperator::Eq => ordering == Ordering::Equal,
            FilterOperator::Gt => ordering == Ordering::Greater,
            FilterOperator::Gte => ordering != Ordering::Less,
            FilterOperator::Lt => ordering == Ordering::Less,
            FilterOperator::Lte => ordering != Ordering::Greater,
            FilterOperator::Range => false,
        }
    }
}

/// A single declarative row constraint.
///
/// `value` is a scalar for comparison operators and a two-element
/// `[low, high]` array for `range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilterPredicate {
    pub fn new(
        column: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

/// Returns true iff `row` satisfies every predicate. An empty list matches
/// every row.
pub fn matches_all(row: &Row, predicates: &[FilterPredicate]) -> bool {
    CompiledFilter::compile(predicates).matches(row)
}

/// Build a parameterized PostgreSQL predicate with the same semantics as
/// [`matches_all`]. Returns `None` when no predicate constrains anything.
pub fn build_where_clause(predicates: &[FilterPredicate]) -> Option<SqlPredicate> {
    let compiled = CompiledFilter::compile(predicates);
    if compiled.is_empty() {
        None
    } else {
        Some(compiled.to_sql(1))
    }
}

/// A predicate rendered for server-side filtering.
///
/// Every parameter is text; casts happen inside the SQL so parameter types
/// are always inferred as `text`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<String>,
}

/// Operand with its date and numeric interpretations resolved up front.
#[derive(Debug, Clone, PartialEq)]
struct Operand {
    raw: String,
    date: Option<String>,
    number: Option<Numeric>,
}

impl Operand {
    fn resolve(raw: String) -> Self {
        let date = date_prefix(&raw).map(str::to_string);
        let number = parse_number(&raw);
        Self { raw, date, number }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Compare(FilterOperator, Operand),
    Between(Operand, Operand),
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    column: String,
    condition: Condition,
}

/// Predicates after skipping the ones that carry no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    clauses: Vec<Clause>,
}

impl CompiledFilter {
    pub fn compile(predicates: &[FilterPredicate]) -> Self {
        let clauses = predicates.iter().filter_map(compile_predicate).collect();
        Self { clauses }
    }

    /// True when nothing constrains the rows (all predicates were skipped).
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|clause| {
            // NULL or missing never satisfies an active constraint
            let Some(text) = row.get(&clause.column).and_then(|cell| cell.as_text()) else {
                return false;
            };
            match &clause.condition {
                Condition::Compare(FilterOperator::Eq, operand) => {
                    compare(&text, operand) == Ordering::Equal || text == operand.raw
                }
                Condition::Compare(op, operand) => op.accepts(compare(&text, operand)),
                Condition::Between(low, high) => {
                    compare(&text, low) != Ordering::Less
                        && compare(&text, high) != Ordering::Greater
                }
            }
        })
    }

    /// Render as SQL with placeholders numbered from `first_param`.
    pub fn to_sql(&self, first_param: usize) -> SqlPredicate {
        let mut params = Vec::new();
        let mut next = first_param;
        let mut bind = |value: &str| {
            params.push(value.to_string());
            let placeholder = format!("${}::text", next);
            next += 1;
            placeholder
        };

        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|clause| {
                let column = format!("{}::text", quote_ident(&clause.column));
                match &clause.condition {
                    Condition::Compare(FilterOperator::Eq, operand) => {
                        let resolved = resolved_sql(&column, "=", operand, &mut bind);
                        let plain = bind(&operand.raw);
                        format!("(({}) OR {} = {})", resolved, column, plain)
                    }
                    Condition::Compare(op, operand) => {
                        format!("({})", resolved_sql(&column, op.sql_symbol(), operand, &mut bind))
                    }
                    Condition::Between(low, high) => {
                        let lower = resolved_sql(&column, ">=", low, &mut bind);
                        let upper = resolved_sql(&column, "<=", high, &mut bind);
                        format!("(({}) AND ({}))", lower, upper)
                    }
                }
            })
            .collect();

        SqlPredicate {
            sql: parts.join(" AND "),
            params,
        }
    }
}

const SQL_DATE_PATTERN: &str = "'^[0-9]{4}-[0-9]{2}-[0-9]{2}'";
// Exponents are capped at three digits, the range `numeric` input always accepts
const SQL_NUMBER_PATTERN: &str =
    "'^[[:space:]]*[-+]?([0-9]+[.]?[0-9]*|[.][0-9]+)([eE][-+]?[0-9]{1,3})?[[:space:]]*$'";
const MAX_EXPONENT_DIGITS: usize = 3;

/// One comparison through the date → numeric → string resolver.
fn resolved_sql(
    column: &str,
    symbol: &str,
    operand: &Operand,
    bind: &mut impl FnMut(&str) -> String,
) -> String {
    let mut branches = Vec::new();
    if let Some(date) = &operand.date {
        branches.push(format!(
            "WHEN {col} ~ {pat} THEN left({col}, 10) COLLATE \"C\" {sym} {p}",
            col = column,
            pat = SQL_DATE_PATTERN,
            sym = symbol,
            p = bind(date),
        ));
    }
    if operand.number.is_some() {
        branches.push(format!(
            "WHEN {col} ~ {pat} THEN {col}::numeric {sym} {p}::numeric",
            col = column,
            pat = SQL_NUMBER_PATTERN,
            sym = symbol,
            p = bind(&operand.raw),
        ));
    }
    let fallback = format!(
        "{} COLLATE \"C\" {} {}",
        column,
        symbol,
        bind(&operand.raw)
    );

    if branches.is_empty() {
        fallback
    } else {
        format!("CASE {} ELSE {} END", branches.join(" "), fallback)
    }
}

fn compile_predicate(predicate: &FilterPredicate) -> Option<Clause> {
    let condition = match predicate.operator {
        FilterOperator::Range => {
            let bounds = predicate.value.as_array()?;
            if bounds.len() < 2 {
                return None;
            }
            let low = operand_text(&bounds[0])?;
            let high = operand_text(&bounds[1])?;
            Condition::Between(Operand::resolve(low), Operand::resolve(high))
        }
        op => Condition::Compare(op, Operand::resolve(operand_text(&predicate.value)?)),
    };
    Some(Clause {
        column: predicate.column.clone(),
        condition,
    })
}

/// Scalar operand as text; `None` means "no constraint".
fn operand_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compare(text: &str, operand: &Operand) -> Ordering {
    if let (Some(expected), Some(actual)) = (&operand.date, date_prefix(text)) {
        return actual.cmp(expected.as_str());
    }
    if let (Some(expected), Some(actual)) = (&operand.number, parse_number(text)) {
        return actual.cmp(expected);
    }
    text.as_bytes().cmp(operand.raw.as_bytes())
}

/// The leading `YYYY-MM-DD` of a date-like value.
pub fn date_prefix(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    let shape_ok = bytes[..10].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if shape_ok {
        Some(&value[..10])
    } else {
        None
    }
}

/// An exact decimal value, ordered the way PostgreSQL orders `numeric`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numeric {
    negative: bool,
    /// Significant digits without leading or trailing zeros; empty for zero.
    digits: Vec<u8>,
    /// The value is `0.<digits> * 10^exponent`.
    exponent: i64,
}

impl Numeric {
    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        match (self.digits.is_empty(), other.digits.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .exponent
                .cmp(&other.exponent)
                .then_with(|| self.digits.cmp(&other.digits)),
        }
    }
}

impl Ord for Numeric {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse a plain decimal or scientific number exactly. Accepts the same
/// strings as the SQL number pattern: no `inf`, `NaN` or hex, and at most a
/// three-digit exponent.
pub fn parse_number(value: &str) -> Option<Numeric> {
    let trimmed = value.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    let mut negative = false;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        negative = bytes[i] == b'-';
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_part = &bytes[int_start..i];
    let mut frac_part: &[u8] = &[];
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_part = &bytes[frac_start..i];
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut exponent: i64 = 0;
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        let mut exp_negative = false;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            exp_negative = bytes[i] == b'-';
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            exponent = exponent * 10 + i64::from(bytes[i] - b'0');
            i += 1;
        }
        let exp_digits = i - exp_start;
        if exp_digits == 0 || exp_digits > MAX_EXPONENT_DIGITS {
            return None;
        }
        if exp_negative {
            exponent = -exponent;
        }
    }
    if i != bytes.len() {
        return None;
    }

    let all: Vec<u8> = int_part
        .iter()
        .chain(frac_part)
        .map(|b| b - b'0')
        .collect();
    let leading = all.iter().take_while(|d| **d == 0).count();
    let mut digits = all[leading..].to_vec();
    while digits.last() == Some(&0) {
        digits.pop();
    }
    if digits.is_empty() {
        return Some(Numeric {
            negative: false,
            digits,
            exponent: 0,
        });
    }

    let point = int_part.len() as i64 - leading as i64 + exponent;
    Some(Numeric {
        negative,
        digits,
        exponent: point,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Cell;
    use serde_json::json;

    fn row(pairs: &[(&str, Cell)]) -> Row {
        pairs.iter().cloned().collect()
    }

    fn pred(column: &str, operator: FilterOperator, value: serde_json::Value) -> FilterPredicate {
        FilterPredicate::new(column, operator, value)
    }

    #[test]
    fn test_empty_filter_list_matches_everything() {
        let r = row(&[("id", Cell::Int(1))]);
        assert!(matches_all(&r, &[]));
        assert!(build_where_clause(&[]).is_none());
    }

    #[test]
    fn test_eq_date_ignores_time_of_day() {
        let r = row(&[("created", Cell::from("2024-01-05 10:00:00"))]);
        let filters = vec![pred("created", FilterOperator::Eq, json!("2024-01-05"))];
        assert!(matches_all(&r, &filters));

        let other = row(&[("created", Cell::from("2024-01-06 00:00:00"))]);
        assert!(!matches_all(&other, &filters));
    }

    #[test]
    fn test_range_with_dates_is_inclusive() {
        let filters = vec![pred(
            "day",
            FilterOperator::Range,
            json!(["2024-01-01", "2024-01-31"]),
        )];
        assert!(matches_all(&row(&[("day", Cell::from("2024-01-15"))]), &filters));
        assert!(matches_all(&row(&[("day", Cell::from("2024-01-31 23:59:59"))]), &filters));
        assert!(matches_all(&row(&[("day", Cell::from("2024-01-01"))]), &filters));
        assert!(!matches_all(&row(&[("day", Cell::from("2024-02-01"))]), &filters));
    }

    #[test]
    fn test_numeric_comparison_beats_lexicographic() {
        let r = row(&[("qty", Cell::Int(10))]);
        assert!(matches_all(&r, &[pred("qty", FilterOperator::Gt, json!("9"))]));
        assert!(matches_all(&r, &[pred("qty", FilterOperator::Gte, json!(10))]));
        assert!(!matches_all(&r, &[pred("qty", FilterOperator::Lt, json!(9.5))]));
    }

    #[test]
    fn test_string_fallback_is_byte_order() {
        let r = row(&[("code", Cell::from("b"))]);
        assert!(matches_all(&r, &[pred("code", FilterOperator::Gt, json!("a"))]));
        assert!(matches_all(&r, &[pred("code", FilterOperator::Lt, json!("c"))]));
        // Uppercase sorts before lowercase in byte order
        assert!(matches_all(&r, &[pred("code", FilterOperator::Gt, json!("B"))]));
    }

    #[test]
    fn test_eq_falls_back_to_plain_string_equality() {
        let r = row(&[("name", Cell::from("Alice"))]);
        assert!(matches_all(&r, &[pred("name", FilterOperator::Eq, json!("Alice"))]));
        assert!(!matches_all(&r, &[pred("name", FilterOperator::Eq, json!("alice"))]));
    }

    #[test]
    fn test_eq_numeric_normalizes_representation() {
        let r = row(&[("price", Cell::Decimal("10.50".to_string()))]);
        assert!(matches_all(&r, &[pred("price", FilterOperator::Eq, json!(10.5))]));
    }

    #[test]
    fn test_null_or_empty_value_is_no_constraint() {
        let r = row(&[("id", Cell::Int(1))]);
        assert!(matches_all(&r, &[pred("id", FilterOperator::Eq, json!(null))]));
        assert!(matches_all(&r, &[pred("id", FilterOperator::Gt, json!(""))]));
        assert!(matches_all(&r, &[pred("missing", FilterOperator::Lt, json!(null))]));
    }

    #[test]
    fn test_malformed_range_is_skipped() {
        let r = row(&[("n", Cell::Int(100))]);
        assert!(matches_all(&r, &[pred("n", FilterOperator::Range, json!([1]))]));
        assert!(matches_all(&r, &[pred("n", FilterOperator::Range, json!([1, null]))]));
        assert!(matches_all(&r, &[pred("n", FilterOperator::Range, json!("1"))]));
        assert!(CompiledFilter::compile(&[pred("n", FilterOperator::Range, json!([null, 5]))])
            .is_empty());
    }

    #[test]
    fn test_null_cell_fails_active_predicate() {
        let r = row(&[("deleted_at", Cell::Null)]);
        assert!(!matches_all(
            &r,
            &[pred("deleted_at", FilterOperator::Gte, json!("2024-01-01"))]
        ));
        let missing = row(&[("id", Cell::Int(1))]);
        assert!(!matches_all(&missing, &[pred("other", FilterOperator::Eq, json!(1))]));
    }

    #[test]
    fn test_conjunction_of_predicates() {
        let filters = vec![
            pred("qty", FilterOperator::Gte, json!(5)),
            pred("day", FilterOperator::Lt, json!("2024-03-01")),
        ];
        let both = row(&[("qty", Cell::Int(7)), ("day", Cell::from("2024-02-10"))]);
        let one = row(&[("qty", Cell::Int(7)), ("day", Cell::from("2024-03-10"))]);
        assert!(matches_all(&both, &filters));
        assert!(!matches_all(&one, &filters));
    }

    #[test]
    fn test_date_operand_against_non_date_row_uses_string_order() {
        let r = row(&[("v", Cell::from("zzz"))]);
        assert!(matches_all(&r, &[pred("v", FilterOperator::Gt, json!("2024-01-01"))]));
    }

    fn num(value: &str) -> Numeric {
        parse_number(value).unwrap()
    }

    #[test]
    fn test_parse_number_matches_postgres_numeric_input() {
        assert_eq!(num(" 42 "), num("42.000"));
        assert_eq!(num("-1.5e3"), num("-1500"));
        assert_eq!(num(".5"), num("0.50"));
        assert_eq!(num("5."), num("5"));
        assert_eq!(num("-0"), num("0.0e5"));
        assert_eq!(num("1e400"), num("10e399"));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("0x10"), None);
        assert_eq!(parse_number("1e"), None);
        assert_eq!(parse_number("1e1000"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("2024-01-01"), None);
    }

    #[test]
    fn test_numeric_order_is_exact() {
        assert!(num("1790000000000000001") > num("1790000000000000000"));
        assert!(num("9007199254740993") > num("9007199254740992"));
        assert!(num("0.1") < num("0.10000000000000000001"));
        assert!(num("-2") < num("-1.999"));
        assert!(num("-0.001") < num("0"));
        assert!(num("1e400") > num("9e399"));
        assert!(num("1e-5") < num("0.0001"));
        assert!(num("100") > num("99.9999"));
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Branch {
        Date,
        Number,
        Text,
    }

    /// Expected results follow PostgreSQL: `date` slices and `COLLATE "C"`
    /// for dates, exact `numeric` for numbers, byte order otherwise.
    #[test]
    fn test_memory_and_sql_forms_agree() {
        let cases: Vec<(Cell, FilterOperator, serde_json::Value, Branch, bool)> = vec![
            (Cell::Int(1790000000000000001), FilterOperator::Eq, json!("1790000000000000000"), Branch::Number, false),
            (Cell::Int(1790000000000000001), FilterOperator::Gt, json!("1790000000000000000"), Branch::Number, true),
            (Cell::Int(9007199254740993), FilterOperator::Lte, json!(9007199254740992_i64), Branch::Number, false),
            (Cell::Decimal("10.50".into()), FilterOperator::Eq, json!(10.5), Branch::Number, true),
            (Cell::Decimal("-0".into()), FilterOperator::Eq, json!("0"), Branch::Number, true),
            (Cell::from("1e400"), FilterOperator::Gt, json!("1e399"), Branch::Number, true),
            (Cell::from("2.5E+3"), FilterOperator::Eq, json!("2500"), Branch::Number, true),
            (Cell::from("1e1000"), FilterOperator::Gt, json!("5"), Branch::Number, false),
            (Cell::from("abc"), FilterOperator::Gt, json!("5"), Branch::Number, true),
            (Cell::from("2024-01-05 23:59:59"), FilterOperator::Lte, json!("2024-01-05"), Branch::Date, true),
            (Cell::from("2024-01-06"), FilterOperator::Gt, json!("2024-01-05T12:00:00"), Branch::Date, true),
            (Cell::from("zzz"), FilterOperator::Lt, json!("2024-01-05"), Branch::Date, false),
            (Cell::from("Zeta"), FilterOperator::Lt, json!("alpha"), Branch::Text, true),
            (Cell::from("alpha"), FilterOperator::Eq, json!("alpha"), Branch::Text, true),
        ];

        for (cell, op, value, branch, expected) in cases {
            let filters = vec![pred("v", op, value.clone())];
            let r = row(&[("v", cell.clone())]);
            assert_eq!(
                matches_all(&r, &filters),
                expected,
                "{:?} {:?} {}",
                cell,
                op,
                value
            );

            let sql = build_where_clause(&filters).unwrap().sql;
            assert_eq!(sql.contains("left("), branch == Branch::Date, "{}", sql);
            assert_eq!(sql.contains("::numeric"), branch == Branch::Number, "{}", sql);
        }
    }

    #[test]
    fn test_date_prefix_detection() {
        assert_eq!(date_prefix("2024-01-05 10:00:00"), Some("2024-01-05"));
        assert_eq!(date_prefix("2024-01-05"), Some("2024-01-05"));
        assert_eq!(date_prefix("2024-1-05"), None);
        assert_eq!(date_prefix("20240105"), None);
    }

    #[test]
    fn test_sql_for_plain_string_comparison() {
        let sql = build_where_clause(&[pred("name", FilterOperator::Gt, json!("m"))]).unwrap();
        assert_eq!(sql.sql, "(\"name\"::text COLLATE \"C\" > $1::text)");
        assert_eq!(sql.params, vec!["m".to_string()]);
    }

    #[test]
    fn test_sql_for_date_operand_has_date_branch() {
        let sql =
            build_where_clause(&[pred("created", FilterOperator::Eq, json!("2024-01-05"))])
                .unwrap();
        assert!(sql.sql.contains("WHEN \"created\"::text ~ '^[0-9]{4}-[0-9]{2}-[0-9]{2}'"));
        assert!(sql.sql.contains("left(\"created\"::text, 10) COLLATE \"C\" = $1::text"));
        assert!(sql.sql.contains("OR \"created\"::text = $3::text"));
        assert_eq!(
            sql.params,
            vec![
                "2024-01-05".to_string(),
                "2024-01-05".to_string(),
                "2024-01-05".to_string()
            ]
        );
    }

    #[test]
    fn test_sql_for_numeric_range_numbers_params_sequentially() {
        let compiled = CompiledFilter::compile(&[
            pred("qty", FilterOperator::Range, json!([1, 10])),
            pred("flag", FilterOperator::Eq, json!(null)),
        ]);
        let sql = compiled.to_sql(3);
        assert!(sql.sql.contains("\"qty\"::text::numeric >= $3::text::numeric"));
        assert!(sql.sql.contains("\"qty\"::text::numeric <= $5::text::numeric"));
        assert!(!sql.sql.contains("flag"));
        assert_eq!(sql.params, vec!["1", "1", "10", "10"]);
    }

    #[test]
    fn test_sql_and_memory_forms_skip_the_same_predicates() {
        let filters = vec![
            pred("a", FilterOperator::Eq, json!("")),
            pred("b", FilterOperator::Range, json!(["2024-01-01"])),
            pred("c", FilterOperator::Lte, json!(null)),
        ];
        let compiled = CompiledFilter::compile(&filters);
        assert!(compiled.is_empty());
        assert!(build_where_clause(&filters).is_none());
        assert!(matches_all(&Row::new(), &filters));
    }

    #[test]
    fn test_sql_clause_count_tracks_active_predicates() {
        let filters = vec![
            pred("a", FilterOperator::Gt, json!("x")),
            pred("b", FilterOperator::Lt, json!("y")),
        ];
        let sql = build_where_clause(&filters).unwrap();
        assert_eq!(sql.sql.matches(" AND ").count(), 1);
        assert_eq!(sql.params.len(), 2);
    }

    #[test]
    fn test_predicate_deserializes_from_stored_json() {
        let stored = r#"[{"column":"day","operator":"range","value":["2024-01-01","2024-01-31"]},
                          {"column":"qty","operator":"gte","value":3}]"#;
        let filters: Vec<FilterPredicate> = serde_json::from_str(stored).unwrap();
        assert_eq!(filters[0].operator, FilterOperator::Range);
        assert_eq!(filters[1].value, json!(3));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let stored = r#"{"column":"a","operator":"like","value":"x"}"#;
        assert!(serde_json::from_str::<FilterPredicate>(stored).is_err());
    }
}
