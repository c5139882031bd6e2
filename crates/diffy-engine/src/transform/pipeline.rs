//! Built-in transformation language
//!
//! A pipeline is a `|`-separated list of steps, each written `name` or
//! `name(arg, ...)` with JSON-literal arguments:
//!
//! ```text
//! trim | lower | replace("[0-9]+", "#") | truncate(16)
//! ```
//!
//! | step | input | output |
//! |------|-------|--------|
//! | `trim`, `lower`, `upper` | string | string |
//! | `replace("re", "with")` | string | string, every match replaced |
//! | `truncate(n)` | string or array | first `n` chars / elements |
//! | `const(json)` | any | the literal |
//! | `drop` | any | null |
//! | `round(digits)` | number | number |
//! | `to_string` | any | string (containers as compact JSON) |
//! | `to_number` | string, number, bool | number |
//! | `date("fmt")` | RFC 3339 / ISO string, epoch millis | string in strftime `fmt` |
//! | `sort` | array | array in value order |
//! | `hash` | any | short BLAKE3 hex of the canonical JSON |
//!
//! Null passes through every step except `const`, `drop` and `hash`.

use crate::error::TransformError;
use crate::transform::runtime::{CompiledTransform, TransformRuntime};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::{Regex, RegexBuilder};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt::Write as _;

/// Most steps a pipeline may have
pub const MAX_STEPS: usize = 32;

/// Longest string a step may produce, in bytes
pub const MAX_STRING_LEN: usize = 64 * 1024;

const REGEX_SIZE_LIMIT: usize = 1 << 20;
const MAX_ROUND_DIGITS: u64 = 15;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Runtime for the built-in pipeline language
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRuntime;

impl PipelineRuntime {
    /// Create runtime
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TransformRuntime for PipelineRuntime {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTransform>, TransformError> {
        Ok(Box::new(Pipeline::parse(source)?))
    }
}

/// Compiled pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    source: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
enum Step {
    Trim,
    Lower,
    Upper,
    Replace { pattern: Regex, replacement: String },
    Truncate(usize),
    Const(Value),
    Drop,
    Round(i32),
    ToString,
    ToNumber,
    Date(String),
    Sort,
    Hash,
}

impl Pipeline {
    /// Parse pipeline source
    ///
    /// # Errors
    /// Returns [`TransformError::Compile`] for unknown steps, bad arguments,
    /// invalid regexes or date formats, and pipelines over [`MAX_STEPS`]
    pub fn parse(source: &str) -> Result<Self, TransformError> {
        let parts = split_top_level(source, '|')?;
        if parts.len() > MAX_STEPS {
            return Err(TransformError::compile(format!(
                "pipeline has {} steps (max: {MAX_STEPS})",
                parts.len()
            )));
        }
        let steps = parts
            .into_iter()
            .map(parse_step)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: source.trim().to_string(),
            steps,
        })
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a parsed pipeline
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl CompiledTransform for Pipeline {
    fn apply(&self, value: &Value) -> Result<Value, TransformError> {
        let mut current = value.clone();
        for step in &self.steps {
            current = step.apply(current)?;
            if let Value::String(s) = &current {
                if s.len() > MAX_STRING_LEN {
                    return Err(TransformError::runtime(format!(
                        "string of {} bytes exceeds the {MAX_STRING_LEN} byte limit",
                        s.len()
                    )));
                }
            }
        }
        Ok(current)
    }

    fn describe(&self) -> String {
        self.source.clone()
    }
}

fn split_top_level(s: &str, sep: char) -> Result<Vec<&str>, TransformError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    TransformError::compile(format!("unbalanced '{c}' at offset {i}"))
                })?;
            }
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if in_string {
        return Err(TransformError::compile("unterminated string literal"));
    }
    if depth != 0 {
        return Err(TransformError::compile("unbalanced brackets"));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn parse_args(inner: &str) -> Result<Vec<Value>, TransformError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner, ',')?
        .into_iter()
        .map(|arg| {
            let arg = arg.trim();
            serde_json::from_str(arg)
                .map_err(|e| TransformError::compile(format!("invalid argument '{arg}': {e}")))
        })
        .collect()
}

fn parse_step(text: &str) -> Result<Step, TransformError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TransformError::compile("empty step"));
    }
    let (name, args) = match text.find('(') {
        None => (text, Vec::new()),
        Some(open) => {
            let inner = text[open + 1..].strip_suffix(')').ok_or_else(|| {
                TransformError::compile(format!("step '{text}' is missing a closing ')'"))
            })?;
            (text[..open].trim(), parse_args(inner)?)
        }
    };

    let step = match (name, args.as_slice()) {
        ("trim", []) => Step::Trim,
        ("lower", []) => Step::Lower,
        ("upper", []) => Step::Upper,
        ("replace", [Value::String(pattern), Value::String(replacement)]) => Step::Replace {
            pattern: RegexBuilder::new(pattern)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|e| TransformError::compile(format!("invalid regex: {e}")))?,
            replacement: replacement.clone(),
        },
        ("truncate", [n]) => Step::Truncate(
            n.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| TransformError::compile("truncate expects a non-negative integer"))?,
        ),
        ("const", [literal]) => Step::Const(literal.clone()),
        ("drop", []) => Step::Drop,
        ("round", []) => Step::Round(0),
        ("round", [digits]) => match digits.as_u64() {
            Some(d) if d <= MAX_ROUND_DIGITS => Step::Round(i32::try_from(d).unwrap_or(0)),
            _ => {
                return Err(TransformError::compile(format!(
                    "round expects 0..={MAX_ROUND_DIGITS} digits"
                )))
            }
        },
        ("to_string", []) => Step::ToString,
        ("to_number", []) => Step::ToNumber,
        ("date", [Value::String(format)]) => {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(TransformError::compile(format!(
                    "invalid date format '{format}'"
                )));
            }
            Step::Date(format.clone())
        }
        ("sort", []) => Step::Sort,
        ("hash", []) => Step::Hash,
        (
            known @ ("trim" | "lower" | "upper" | "replace" | "truncate" | "const" | "drop"
            | "round" | "to_string" | "to_number" | "date" | "sort" | "hash"),
            _,
        ) => {
            return Err(TransformError::compile(format!(
                "wrong arguments for '{known}'"
            )))
        }
        (other, _) => return Err(TransformError::compile(format!("unknown step '{other}'"))),
    };
    Ok(step)
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Self::Trim => "trim",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Replace { .. } => "replace",
            Self::Truncate(_) => "truncate",
            Self::Const(_) => "const",
            Self::Drop => "drop",
            Self::Round(_) => "round",
            Self::ToString => "to_string",
            Self::ToNumber => "to_number",
            Self::Date(_) => "date",
            Self::Sort => "sort",
            Self::Hash => "hash",
        }
    }

    fn apply(&self, value: Value) -> Result<Value, TransformError> {
        if value.is_null() && !matches!(self, Self::Const(_) | Self::Drop | Self::Hash) {
            return Ok(Value::Null);
        }
        match self {
            Self::Trim => self.on_string(value, |s| s.trim().to_string()),
            Self::Lower => self.on_string(value, |s| s.to_lowercase()),
            Self::Upper => self.on_string(value, |s| s.to_uppercase()),
            Self::Replace {
                pattern,
                replacement,
            } => self.on_string(value, |s| {
                pattern.replace_all(&s, replacement.as_str()).into_owned()
            }),
            Self::Truncate(n) => match value {
                Value::String(s) => Ok(Value::String(s.chars().take(*n).collect())),
                Value::Array(mut items) => {
                    items.truncate(*n);
                    Ok(Value::Array(items))
                }
                other => Err(self.type_error("a string or array", &other)),
            },
            Self::Const(literal) => Ok(literal.clone()),
            Self::Drop => Ok(Value::Null),
            Self::Round(digits) => match value {
                Value::Number(n) if n.is_f64() => round(n.as_f64().unwrap_or(0.0), *digits),
                Value::Number(_) => Ok(value),
                other => Err(self.type_error("a number", &other)),
            },
            Self::ToString => Ok(match value {
                Value::String(_) => value,
                other => Value::String(other.to_string()),
            }),
            Self::ToNumber => match value {
                Value::Number(_) => Ok(value),
                Value::Bool(b) => Ok(Value::from(u8::from(b))),
                Value::String(s) => parse_number(s.trim()),
                other => Err(self.type_error("a string, number or boolean", &other)),
            },
            Self::Date(format) => format_date(&value, format),
            Self::Sort => match value {
                Value::Array(mut items) => {
                    items.sort_by(value_order);
                    Ok(Value::Array(items))
                }
                other => Err(self.type_error("an array", &other)),
            },
            Self::Hash => Ok(Value::String(short_hash(&value))),
        }
    }

    fn on_string(
        &self,
        value: Value,
        f: impl FnOnce(String) -> String,
    ) -> Result<Value, TransformError> {
        match value {
            Value::String(s) => Ok(Value::String(f(s))),
            other => Err(self.type_error("a string", &other)),
        }
    }

    fn type_error(&self, expected: &str, found: &Value) -> TransformError {
        TransformError::runtime(format!(
            "{} expects {expected}, found {}",
            self.name(),
            crate::differ::type_name(found)
        ))
    }
}

fn round(x: f64, digits: i32) -> Result<Value, TransformError> {
    let factor = 10f64.powi(digits);
    let rounded = (x * factor).round() / factor;
    Number::from_f64(rounded)
        .map(Value::Number)
        .ok_or_else(|| TransformError::runtime("round produced a non-finite number"))
}

fn parse_number(s: &str) -> Result<Value, TransformError> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| TransformError::runtime(format!("'{s}' is not a number")))
}

fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

fn format_date(value: &Value, format: &str) -> Result<Value, TransformError> {
    let parsed = match value {
        Value::String(s) => parse_datetime(s.trim())
            .ok_or_else(|| TransformError::runtime(format!("unrecognized date '{s}'")))?,
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.fixed_offset())
            .ok_or_else(|| TransformError::runtime(format!("{n} is not an epoch timestamp")))?,
        other => {
            return Err(TransformError::runtime(format!(
                "date expects a string or number, found {}",
                crate::differ::type_name(other)
            )))
        }
    };
    let mut out = String::new();
    write!(out, "{}", parsed.format(format))
        .map_err(|_| TransformError::runtime(format!("cannot format date with '{format}'")))?;
    Ok(Value::String(out))
}

fn value_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn short_hash(value: &Value) -> String {
    let canonical = value.to_string();
    let digest = blake3::hash(canonical.as_bytes());
    hex::encode(&digest.as_bytes()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(source: &str, input: Value) -> Result<Value, TransformError> {
        Pipeline::parse(source)?.apply(&input)
    }

    #[test]
    fn pipeline_string_steps() {
        assert_eq!(run("trim | upper", json!("  ab ")).unwrap(), json!("AB"));
        assert_eq!(run("lower", json!("AbC")).unwrap(), json!("abc"));
        assert_eq!(
            run(r##"replace("[0-9]+", "#")"##, json!("id-123-x-4")).unwrap(),
            json!("id-#-x-#")
        );
        assert_eq!(run("truncate(3)", json!("abcdef")).unwrap(), json!("abc"));
    }

    #[test]
    fn pipeline_separator_inside_literal() {
        let out = run(r#"replace("a|b", "|") | const("x|y") | upper"#, json!("a")).unwrap();
        assert_eq!(out, json!("X|Y"));
    }

    #[test]
    fn pipeline_const_and_drop() {
        assert_eq!(run(r#"const({"a": [1, 2]})"#, json!({})).unwrap(), json!({"a": [1, 2]}));
        assert_eq!(run("drop", json!([1, 2])).unwrap(), Value::Null);
    }

    #[test]
    fn pipeline_numbers() {
        assert_eq!(run("round(2)", json!(3.14159)).unwrap(), json!(3.14));
        assert_eq!(run("round", json!(2.5)).unwrap(), json!(3.0));
        assert_eq!(run("round(2)", json!(7)).unwrap(), json!(7));
        assert_eq!(run("to_number", json!(" 42 ")).unwrap(), json!(42));
        assert_eq!(run("to_number", json!("1.5")).unwrap(), json!(1.5));
        assert_eq!(run("to_string", json!(42)).unwrap(), json!("42"));
        assert!(run("to_number", json!("abc")).is_err());
    }

    #[test]
    fn pipeline_dates() {
        assert_eq!(
            run(r#"date("%Y-%m-%d")"#, json!("2024-03-05T10:11:12+02:00")).unwrap(),
            json!("2024-03-05")
        );
        assert_eq!(
            run(r#"date("%H:%M")"#, json!("2024-03-05 10:11:12.5")).unwrap(),
            json!("10:11")
        );
        assert_eq!(
            run(r#"date("%Y")"#, json!(1_700_000_000_000_i64)).unwrap(),
            json!("2023")
        );
        assert!(run(r#"date("%Y")"#, json!("yesterday")).is_err());
    }

    #[test]
    fn pipeline_sort_and_hash() {
        assert_eq!(run("sort", json!([10, 9, 1])).unwrap(), json!([1, 9, 10]));
        assert_eq!(
            run("sort", json!(["b", 2, null, "a"])).unwrap(),
            json!([null, 2, "a", "b"])
        );
        let a = run("hash", json!({"x": 1, "y": 2})).unwrap();
        let b = run("hash", json!({"y": 2, "x": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().map(str::len), Some(16));
    }

    #[test]
    fn pipeline_null_passes_through() {
        assert_eq!(run("trim | lower | round(1)", Value::Null).unwrap(), Value::Null);
        assert_eq!(run("const(1)", Value::Null).unwrap(), json!(1));
    }

    #[test]
    fn pipeline_type_errors_are_runtime_errors() {
        let err = run("trim", json!(5)).unwrap_err();
        assert_eq!(
            err,
            TransformError::runtime("trim expects a string, found number")
        );
    }

    #[test]
    fn pipeline_compile_errors() {
        for source in [
            "",
            "trim |",
            "explode",
            "truncate",
            "truncate(-1)",
            "round(99)",
            r#"replace("(", "x")"#,
            r#"date("%")"#,
            "const(",
            r#"const("unterminated)"#,
        ] {
            assert!(
                matches!(Pipeline::parse(source), Err(TransformError::Compile(_))),
                "expected compile error for {source:?}"
            );
        }
    }

    #[test]
    fn pipeline_step_limit() {
        let source = vec!["trim"; MAX_STEPS + 1].join(" | ");
        assert!(Pipeline::parse(&source).is_err());
        let ok = vec!["trim"; MAX_STEPS].join(" | ");
        assert_eq!(Pipeline::parse(&ok).unwrap().len(), MAX_STEPS);
    }

    #[test]
    fn pipeline_string_limit() {
        let big = "x".repeat(MAX_STRING_LEN + 1);
        assert!(run("trim", json!(big)).is_err());
    }

    #[test]
    fn pipeline_runtime_compiles() {
        let compiled = PipelineRuntime::new().compile("lower").unwrap();
        assert_eq!(compiled.describe(), "lower");
        assert_eq!(compiled.apply(&json!("A")).unwrap(), json!("a"));
    }
}
