//! Datatype registry
//!
//! Builds a parser from a normalized datatype description (`base`, `format`,
//! length/value constraints) and applies it to raw cell strings. Parsing
//! failures never panic the pipeline: the value reverts to its raw string
//! with base type `string` and the error is reported alongside.

pub mod datetime;
pub mod numeric;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::errors::{Result, TabularError, Warning};
use datetime::{DateTimeFormat, DurationKind, GregorianKind, TemporalKind};
use numeric::NumberPattern;

/// The built-in base types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    AnyAtomicType,
    AnyUri,
    Base64Binary,
    Boolean,
    Date,
    DateTime,
    DateTimeStamp,
    DayTimeDuration,
    Decimal,
    Double,
    Duration,
    Float,
    GDay,
    GMonth,
    GMonthDay,
    GYear,
    GYearMonth,
    HexBinary,
    Html,
    Int,
    Integer,
    Json,
    Language,
    Long,
    Name,
    NmToken,
    NegativeInteger,
    NonNegativeInteger,
    NonPositiveInteger,
    NormalizedString,
    PositiveInteger,
    QName,
    Short,
    String,
    Time,
    Token,
    UnsignedByte,
    UnsignedInt,
    UnsignedLong,
    UnsignedShort,
    Byte,
    Xml,
}

static BASE_TYPE_NAMES: Lazy<HashMap<&'static str, BaseType>> = Lazy::new(|| {
    use BaseType::*;
    let mut m = HashMap::new();
    for (name, base) in [
        ("anyAtomicType", AnyAtomicType),
        ("anyURI", AnyUri),
        ("base64Binary", Base64Binary),
        ("boolean", Boolean),
        ("date", Date),
        ("dateTime", DateTime),
        ("dateTimeStamp", DateTimeStamp),
        ("dayTimeDuration", DayTimeDuration),
        ("decimal", Decimal),
        ("double", Double),
        ("duration", Duration),
        ("float", Float),
        ("gDay", GDay),
        ("gMonth", GMonth),
        ("gMonthDay", GMonthDay),
        ("gYear", GYear),
        ("gYearMonth", GYearMonth),
        ("hexBinary", HexBinary),
        ("html", Html),
        ("int", Int),
        ("integer", Integer),
        ("json", Json),
        ("language", Language),
        ("long", Long),
        ("Name", Name),
        ("NMTOKEN", NmToken),
        ("negativeInteger", NegativeInteger),
        ("nonNegativeInteger", NonNegativeInteger),
        ("nonPositiveInteger", NonPositiveInteger),
        ("normalizedString", NormalizedString),
        ("positiveInteger", PositiveInteger),
        ("QName", QName),
        ("short", Short),
        ("string", String),
        ("time", Time),
        ("token", Token),
        ("unsignedByte", UnsignedByte),
        ("unsignedInt", UnsignedInt),
        ("unsignedLong", UnsignedLong),
        ("unsignedShort", UnsignedShort),
        ("byte", Byte),
        ("xml", Xml),
        // aliases
        ("number", Double),
        ("binary", Base64Binary),
        ("datetime", DateTime),
        ("any", AnyAtomicType),
        ("yearMonthDuration", Duration),
    ] {
        m.insert(name, base);
    }
    m
});

impl BaseType {
    pub fn from_name(name: &str) -> Option<Self> {
        BASE_TYPE_NAMES.get(name).copied()
    }

    /// Canonical datatype URI used in cell value wire shapes
    pub fn uri(self) -> &'static str {
        use BaseType::*;
        match self {
            AnyAtomicType => concat!("http://www.w3.org/2001/XMLSchema#", "anyAtomicType"),
            AnyUri => concat!("http://www.w3.org/2001/XMLSchema#", "anyURI"),
            Base64Binary => concat!("http://www.w3.org/2001/XMLSchema#", "base64Binary"),
            Boolean => concat!("http://www.w3.org/2001/XMLSchema#", "boolean"),
            Date => concat!("http://www.w3.org/2001/XMLSchema#", "date"),
            DateTime => concat!("http://www.w3.org/2001/XMLSchema#", "dateTime"),
            DateTimeStamp => concat!("http://www.w3.org/2001/XMLSchema#", "dateTimeStamp"),
            DayTimeDuration => concat!("http://www.w3.org/2001/XMLSchema#", "dayTimeDuration"),
            Decimal => concat!("http://www.w3.org/2001/XMLSchema#", "decimal"),
            Double => concat!("http://www.w3.org/2001/XMLSchema#", "double"),
            Duration => concat!("http://www.w3.org/2001/XMLSchema#", "duration"),
            Float => concat!("http://www.w3.org/2001/XMLSchema#", "float"),
            GDay => concat!("http://www.w3.org/2001/XMLSchema#", "gDay"),
            GMonth => concat!("http://www.w3.org/2001/XMLSchema#", "gMonth"),
            GMonthDay => concat!("http://www.w3.org/2001/XMLSchema#", "gMonthDay"),
            GYear => concat!("http://www.w3.org/2001/XMLSchema#", "gYear"),
            GYearMonth => concat!("http://www.w3.org/2001/XMLSchema#", "gYearMonth"),
            HexBinary => concat!("http://www.w3.org/2001/XMLSchema#", "hexBinary"),
            Html => concat!("http://www.w3.org/1999/02/22-rdf-syntax-ns#", "HTML"),
            Int => concat!("http://www.w3.org/2001/XMLSchema#", "int"),
            Integer => concat!("http://www.w3.org/2001/XMLSchema#", "integer"),
            Json => concat!("http://www.w3.org/ns/csvw#", "JSON"),
            Language => concat!("http://www.w3.org/2001/XMLSchema#", "language"),
            Long => concat!("http://www.w3.org/2001/XMLSchema#", "long"),
            Name => concat!("http://www.w3.org/2001/XMLSchema#", "Name"),
            NmToken => concat!("http://www.w3.org/2001/XMLSchema#", "NMTOKEN"),
            NegativeInteger => concat!("http://www.w3.org/2001/XMLSchema#", "negativeInteger"),
            NonNegativeInteger => {
                concat!("http://www.w3.org/2001/XMLSchema#", "nonNegativeInteger")
            }
            NonPositiveInteger => {
                concat!("http://www.w3.org/2001/XMLSchema#", "nonPositiveInteger")
            }
            NormalizedString => concat!("http://www.w3.org/2001/XMLSchema#", "normalizedString"),
            PositiveInteger => concat!("http://www.w3.org/2001/XMLSchema#", "positiveInteger"),
            QName => concat!("http://www.w3.org/2001/XMLSchema#", "QName"),
            Short => concat!("http://www.w3.org/2001/XMLSchema#", "short"),
            String => concat!("http://www.w3.org/2001/XMLSchema#", "string"),
            Time => concat!("http://www.w3.org/2001/XMLSchema#", "time"),
            Token => concat!("http://www.w3.org/2001/XMLSchema#", "token"),
            UnsignedByte => concat!("http://www.w3.org/2001/XMLSchema#", "unsignedByte"),
            UnsignedInt => concat!("http://www.w3.org/2001/XMLSchema#", "unsignedInt"),
            UnsignedLong => concat!("http://www.w3.org/2001/XMLSchema#", "unsignedLong"),
            UnsignedShort => concat!("http://www.w3.org/2001/XMLSchema#", "unsignedShort"),
            Byte => concat!("http://www.w3.org/2001/XMLSchema#", "byte"),
            Xml => concat!("http://www.w3.org/1999/02/22-rdf-syntax-ns#", "XMLLiteral"),
        }
    }

    pub fn is_numeric(self) -> bool {
        use BaseType::*;
        matches!(self, Decimal | Double | Float) || self.is_integer()
    }

    pub fn is_integer(self) -> bool {
        use BaseType::*;
        matches!(
            self,
            Integer
                | Long
                | Int
                | Short
                | Byte
                | NonNegativeInteger
                | PositiveInteger
                | NonPositiveInteger
                | NegativeInteger
                | UnsignedLong
                | UnsignedInt
                | UnsignedShort
                | UnsignedByte
        )
    }

    pub fn is_temporal(self) -> bool {
        use BaseType::*;
        matches!(self, Date | DateTime | DateTimeStamp | Time)
    }

    pub fn is_duration(self) -> bool {
        matches!(self, BaseType::Duration | BaseType::DayTimeDuration)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, BaseType::Base64Binary | BaseType::HexBinary)
    }

    /// Range of the integer value space, when bounded
    fn integer_range(self) -> Option<(i64, i64)> {
        use BaseType::*;
        Some(match self {
            Long => (i64::MIN, i64::MAX),
            Int => (i32::MIN as i64, i32::MAX as i64),
            Short => (i16::MIN as i64, i16::MAX as i64),
            Byte => (i8::MIN as i64, i8::MAX as i64),
            NonNegativeInteger => (0, i64::MAX),
            PositiveInteger => (1, i64::MAX),
            NonPositiveInteger => (i64::MIN, 0),
            NegativeInteger => (i64::MIN, -1),
            UnsignedLong => (0, i64::MAX),
            UnsignedInt => (0, u32::MAX as i64),
            UnsignedShort => (0, u16::MAX as i64),
            UnsignedByte => (0, u8::MAX as i64),
            _ => return None,
        })
    }
}

/// Compiled `format` for a datatype
#[derive(Debug, Clone)]
pub enum CompiledFormat {
    Regex(Regex),
    Number(NumberPattern),
    Boolean {
        true_values: Vec<String>,
        false_values: Vec<String>,
    },
    DateTime(DateTimeFormat),
}

/// An immutable datatype descriptor, shared by reference across all cells
/// of a column
#[derive(Debug, Clone, Default)]
pub struct Datatype {
    pub base: BaseType,
    pub format: Option<CompiledFormat>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub min_exclusive: Option<Value>,
    pub max_exclusive: Option<Value>,
    pub id: Option<String>,
    /// The `yearMonthDuration` name maps onto [`BaseType::Duration`]; this
    /// flag preserves its narrower grammar.
    year_month: bool,
}

impl Default for BaseType {
    fn default() -> Self {
        BaseType::String
    }
}

/// One parsed cell value with its resolved base type
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub value: Value,
    pub base: BaseType,
    pub errors: Vec<String>,
}

impl ParsedValue {
    fn ok(value: Value, base: BaseType) -> Self {
        Self {
            value,
            base,
            errors: Vec::new(),
        }
    }

    fn failed(raw: &str, message: String) -> Self {
        Self {
            value: Value::String(raw.to_string()),
            base: BaseType::String,
            errors: vec![message],
        }
    }
}

impl Datatype {
    pub fn string() -> Self {
        Self::default()
    }

    /// Build a descriptor from a normalized datatype description (either a
    /// base-type name string or an object).
    pub fn from_value(
        desc: &Value,
        path: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        let desc = match desc {
            Value::String(name) => {
                let base = BaseType::from_name(name).ok_or_else(|| {
                    TabularError::Schema(format!("{path}: unknown datatype '{name}'"))
                })?;
                return Ok(Self {
                    base,
                    year_month: name == "yearMonthDuration",
                    ..Self::default()
                });
            }
            Value::Object(map) => map,
            other => {
                return Err(TabularError::Schema(format!(
                    "{path}: datatype must be a name or description object, found {other}"
                )))
            }
        };

        let base_name = match desc.get("base") {
            Some(Value::String(s)) => s.as_str(),
            None => "string",
            Some(other) => {
                return Err(TabularError::Schema(format!(
                    "{path}.base must be a datatype name, found {other}"
                )))
            }
        };
        let base = BaseType::from_name(base_name)
            .ok_or_else(|| TabularError::Schema(format!("{path}: unknown datatype '{base_name}'")))?;

        let mut datatype = Datatype {
            base,
            year_month: base_name == "yearMonthDuration",
            id: desc
                .get("@id")
                .and_then(Value::as_str)
                .map(str::to_string),
            length: usize_prop(desc, "length"),
            min_length: usize_prop(desc, "minLength"),
            max_length: usize_prop(desc, "maxLength"),
            minimum: desc.get("minimum").or(desc.get("minInclusive")).cloned(),
            maximum: desc.get("maximum").or(desc.get("maxInclusive")).cloned(),
            min_exclusive: desc.get("minExclusive").cloned(),
            max_exclusive: desc.get("maxExclusive").cloned(),
            ..Self::default()
        };
        datatype.validate_constraint_applicability(path)?;
        datatype.format = compile_format(desc.get("format"), base, path, warnings);
        Ok(datatype)
    }

    /// Length constraints only apply to string-like and binary bases; value
    /// bounds only to numeric, temporal and duration bases.
    fn validate_constraint_applicability(&self, path: &str) -> Result<()> {
        let has_length =
            self.length.is_some() || self.min_length.is_some() || self.max_length.is_some();
        let length_ok = matches!(
            self.base,
            BaseType::String
                | BaseType::NormalizedString
                | BaseType::Token
                | BaseType::Language
                | BaseType::Name
                | BaseType::NmToken
                | BaseType::AnyUri
                | BaseType::QName
                | BaseType::Xml
                | BaseType::Html
                | BaseType::Json
        ) || self.base.is_binary();
        if has_length && !length_ok {
            return Err(TabularError::Schema(format!(
                "{path}: length constraints do not apply to this base type"
            )));
        }
        let has_bounds = self.minimum.is_some()
            || self.maximum.is_some()
            || self.min_exclusive.is_some()
            || self.max_exclusive.is_some();
        let bounds_ok = self.base.is_numeric() || self.base.is_temporal() || self.base.is_duration();
        if has_bounds && !bounds_ok {
            return Err(TabularError::Schema(format!(
                "{path}: value constraints do not apply to this base type"
            )));
        }
        Ok(())
    }

    /// Parse one raw cell string into `(value, resolved base, errors)`.
    pub fn parse(&self, raw: &str) -> ParsedValue {
        let parsed = self.parse_base(raw);
        if !parsed.errors.is_empty() {
            return parsed;
        }
        match self.check_constraints(raw, &parsed.value) {
            Ok(()) => parsed,
            Err(message) => ParsedValue::failed(raw, message),
        }
    }

    fn parse_base(&self, raw: &str) -> ParsedValue {
        use BaseType::*;
        match self.base {
            Boolean => self.parse_boolean(raw),
            b if b.is_numeric() => self.parse_number(raw),
            Date => self.parse_temporal(raw, TemporalKind::Date, false),
            Time => self.parse_temporal(raw, TemporalKind::Time, false),
            DateTime => self.parse_temporal(raw, TemporalKind::DateTime, false),
            DateTimeStamp => self.parse_temporal(raw, TemporalKind::DateTime, true),
            Duration | DayTimeDuration => {
                let kind = if self.year_month {
                    DurationKind::YearMonth
                } else if self.base == DayTimeDuration {
                    DurationKind::DayTime
                } else {
                    DurationKind::Full
                };
                match datetime::validate_duration(raw, kind) {
                    Ok(()) => ParsedValue::ok(Value::String(raw.to_string()), self.base),
                    Err(e) => ParsedValue::failed(raw, e),
                }
            }
            GYear => self.parse_gregorian(raw, GregorianKind::Year),
            GYearMonth => self.parse_gregorian(raw, GregorianKind::YearMonth),
            GMonth => self.parse_gregorian(raw, GregorianKind::Month),
            GMonthDay => self.parse_gregorian(raw, GregorianKind::MonthDay),
            GDay => self.parse_gregorian(raw, GregorianKind::Day),
            _ => self.parse_other(raw),
        }
    }

    fn parse_boolean(&self, raw: &str) -> ParsedValue {
        let (true_values, false_values): (&[String], &[String]) =
            match &self.format {
                Some(CompiledFormat::Boolean {
                    true_values,
                    false_values,
                }) => (true_values, false_values),
                _ => {
                    static DEFAULT_TRUE: Lazy<Vec<String>> =
                        Lazy::new(|| vec!["true".into(), "1".into()]);
                    static DEFAULT_FALSE: Lazy<Vec<String>> =
                        Lazy::new(|| vec!["false".into(), "0".into()]);
                    (&DEFAULT_TRUE, &DEFAULT_FALSE)
                }
            };
        if true_values.iter().any(|v| v == raw) {
            ParsedValue::ok(Value::Bool(true), BaseType::Boolean)
        } else if false_values.iter().any(|v| v == raw) {
            ParsedValue::ok(Value::Bool(false), BaseType::Boolean)
        } else {
            ParsedValue::failed(raw, format!("'{raw}' is not a recognized boolean token"))
        }
    }

    fn parse_number(&self, raw: &str) -> ParsedValue {
        use BaseType::*;
        // special tokens bypass the grammar entirely
        if matches!(raw, "NaN" | "INF" | "-INF") {
            return if matches!(self.base, Double | Float) {
                ParsedValue::ok(Value::String(raw.to_string()), self.base)
            } else {
                ParsedValue::failed(
                    raw,
                    format!("'{raw}' is not valid for the {:?} value space", self.base),
                )
            };
        }

        let (normalized, scale, has_point, has_exponent) = match &self.format {
            Some(CompiledFormat::Number(pattern)) => match pattern.normalize(raw) {
                Ok(n) => {
                    let has_point = n.contains('.');
                    (n, pattern.scale(), has_point, false)
                }
                Err(e) => return ParsedValue::failed(raw, e),
            },
            _ => match numeric::parse_default(raw) {
                Ok(d) => (d.normalized, d.scale, d.has_decimal_point, d.has_exponent),
                Err(e) => return ParsedValue::failed(raw, e),
            },
        };

        if self.base.is_integer() && (has_point || has_exponent) {
            return ParsedValue::failed(
                raw,
                format!("'{raw}' is not a valid {:?}", self.base),
            );
        }
        if self.base == Decimal && has_exponent {
            return ParsedValue::failed(raw, format!("'{raw}' has an exponent, decimal forbids it"));
        }

        let Ok(mut number) = normalized.parse::<f64>() else {
            return ParsedValue::failed(raw, format!("'{raw}' does not parse as a number"));
        };
        number /= scale;

        if self.base.is_integer() {
            if number.fract() != 0.0 {
                return ParsedValue::failed(raw, format!("'{raw}' is not integral"));
            }
            // parse unscaled integers from the digits directly so large
            // values are not rounded through the f64 path
            let int_value = if scale == 1.0 {
                match normalized.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => {
                        return ParsedValue::failed(
                            raw,
                            format!("'{raw}' is outside the supported integer range"),
                        )
                    }
                }
            } else {
                number as i64
            };
            if let Some((lo, hi)) = self.base.integer_range() {
                if int_value < lo || int_value > hi {
                    return ParsedValue::failed(
                        raw,
                        format!("{int_value} is outside the {:?} value space", self.base),
                    );
                }
            }
            return ParsedValue::ok(Value::Number(int_value.into()), self.base);
        }

        match Number::from_f64(number) {
            Some(n) => ParsedValue::ok(Value::Number(n), self.base),
            None => ParsedValue::failed(raw, format!("'{raw}' is not representable")),
        }
    }

    fn parse_temporal(&self, raw: &str, kind: TemporalKind, require_tz: bool) -> ParsedValue {
        let format = match &self.format {
            Some(CompiledFormat::DateTime(f)) => Some(f),
            _ => None,
        };
        match datetime::parse_temporal(raw, kind, format, require_tz) {
            Ok(canonical) => ParsedValue::ok(Value::String(canonical), self.base),
            Err(e) => ParsedValue::failed(raw, e),
        }
    }

    fn parse_gregorian(&self, raw: &str, kind: GregorianKind) -> ParsedValue {
        match datetime::validate_gregorian(raw, kind) {
            Ok(canonical) => ParsedValue::ok(Value::String(canonical), self.base),
            Err(e) => ParsedValue::failed(raw, e),
        }
    }

    fn parse_other(&self, raw: &str) -> ParsedValue {
        use BaseType::*;
        // html, xml and json are never regex-checked
        let regex_exempt = matches!(self.base, Html | Xml | Json);
        if !regex_exempt {
            if let Some(CompiledFormat::Regex(re)) = &self.format {
                if !re.is_match(raw) {
                    return ParsedValue::failed(
                        raw,
                        format!("'{raw}' does not match the format pattern"),
                    );
                }
            }
        }
        if self.base == Language && !crate::properties::is_language_tag(raw) {
            return ParsedValue::failed(raw, format!("'{raw}' is not a language tag"));
        }
        ParsedValue::ok(Value::String(raw.to_string()), self.base)
    }

    fn check_constraints(&self, raw: &str, value: &Value) -> std::result::Result<(), String> {
        if self.length.is_some() || self.min_length.is_some() || self.max_length.is_some() {
            let measured = self.measure_length(raw);
            if let Some(length) = self.length {
                if measured != length {
                    return Err(format!("length {measured} does not equal required {length}"));
                }
            }
            if let Some(min) = self.min_length {
                if measured < min {
                    return Err(format!("length {measured} below minimum {min}"));
                }
            }
            if let Some(max) = self.max_length {
                if measured > max {
                    return Err(format!("length {measured} above maximum {max}"));
                }
            }
        }

        if let Some(bound) = &self.minimum {
            if compare(value, bound)? == std::cmp::Ordering::Less {
                return Err(format!("value below minimum {bound}"));
            }
        }
        if let Some(bound) = &self.maximum {
            if compare(value, bound)? == std::cmp::Ordering::Greater {
                return Err(format!("value above maximum {bound}"));
            }
        }
        if let Some(bound) = &self.min_exclusive {
            if compare(value, bound)? != std::cmp::Ordering::Greater {
                return Err(format!("value not above exclusive minimum {bound}"));
            }
        }
        if let Some(bound) = &self.max_exclusive {
            if compare(value, bound)? != std::cmp::Ordering::Less {
                return Err(format!("value not below exclusive maximum {bound}"));
            }
        }
        Ok(())
    }

    /// Character count for strings, byte count for binary bases (computed
    /// from the lexical form without decoding).
    fn measure_length(&self, raw: &str) -> usize {
        match self.base {
            BaseType::Base64Binary => {
                let trimmed = raw.trim_end_matches('=');
                let padding = raw.len() - trimmed.len();
                // truncated lexical forms measure 0 rather than underflow
                ((raw.len() / 4) * 3).saturating_sub(padding)
            }
            BaseType::HexBinary => raw.len() / 2,
            _ => raw.chars().count(),
        }
    }
}

/// Order a parsed value against a constraint bound. Numbers compare
/// numerically; canonical temporal strings compare lexicographically.
fn compare(value: &Value, bound: &Value) -> std::result::Result<std::cmp::Ordering, String> {
    match (value, bound) {
        (Value::Number(v), Value::Number(b)) => {
            let v = v.as_f64().ok_or("unrepresentable number")?;
            let b = b.as_f64().ok_or("unrepresentable bound")?;
            v.partial_cmp(&b).ok_or_else(|| "incomparable values".to_string())
        }
        (Value::Number(v), Value::String(b)) => {
            let v = v.as_f64().ok_or("unrepresentable number")?;
            let b: f64 = b.parse().map_err(|_| format!("bound '{b}' is not numeric"))?;
            v.partial_cmp(&b).ok_or_else(|| "incomparable values".to_string())
        }
        (Value::String(v), Value::String(b)) => Ok(v.as_str().cmp(b.as_str())),
        _ => Err("value and bound are not comparable".to_string()),
    }
}

fn usize_prop(desc: &Map<String, Value>, name: &str) -> Option<usize> {
    desc.get(name).and_then(Value::as_u64).map(|n| n as usize)
}

/// Compile the `format` property for a base type. A malformed format is a
/// warning, not an error: it is ignored and values fall back to the default
/// grammar for the base.
fn compile_format(
    format: Option<&Value>,
    base: BaseType,
    path: &str,
    warnings: &mut Vec<Warning>,
) -> Option<CompiledFormat> {
    let format = format?;
    let mut warn = |message: String| {
        tracing::warn!(path, "{message}");
        warnings.push(Warning::new(format!("{path}.format"), message));
    };

    if base.is_numeric() {
        let (pattern, decimal_char, group_char) = match format {
            Value::String(p) => (Some(p.as_str()), None, None),
            Value::Object(o) => (
                o.get("pattern").and_then(Value::as_str),
                o.get("decimalChar")
                    .and_then(Value::as_str)
                    .and_then(|s| s.chars().next()),
                o.get("groupChar")
                    .and_then(Value::as_str)
                    .and_then(|s| s.chars().next()),
            ),
            other => {
                warn(format!("number format must be a string or object, found {other}"));
                return None;
            }
        };
        return match pattern {
            Some(p) => match NumberPattern::parse(p, decimal_char, group_char) {
                Ok(compiled) => Some(CompiledFormat::Number(compiled)),
                Err(e) => {
                    warn(format!("invalid number pattern '{p}': {e}"));
                    None
                }
            },
            // decimalChar/groupChar without a pattern still shape the grammar
            None if decimal_char.is_some() || group_char.is_some() => {
                match NumberPattern::parse("#,##0.###", decimal_char, group_char) {
                    Ok(compiled) => Some(CompiledFormat::Number(compiled)),
                    Err(_) => None,
                }
            }
            None => None,
        };
    }

    let Value::String(pattern) = format else {
        warn(format!("format must be a string, found {format}"));
        return None;
    };

    if base == BaseType::Boolean {
        let Some((true_part, false_part)) = pattern.split_once('|') else {
            warn(format!("boolean format '{pattern}' must be 'true|false' syntax"));
            return None;
        };
        if true_part.is_empty() || false_part.is_empty() {
            warn(format!("boolean format '{pattern}' has an empty token"));
            return None;
        }
        return Some(CompiledFormat::Boolean {
            true_values: vec![true_part.to_string()],
            false_values: vec![false_part.to_string()],
        });
    }

    if base.is_temporal() {
        let kind = match base {
            BaseType::Date => TemporalKind::Date,
            BaseType::Time => TemporalKind::Time,
            _ => TemporalKind::DateTime,
        };
        return match DateTimeFormat::new(pattern, kind) {
            Ok(compiled) => Some(CompiledFormat::DateTime(compiled)),
            Err(e) => {
                warn(format!("invalid date/time format '{pattern}': {e}"));
                None
            }
        };
    }

    if matches!(base, BaseType::Html | BaseType::Xml | BaseType::Json) {
        return None;
    }

    match Regex::new(pattern) {
        Ok(re) => Some(CompiledFormat::Regex(re)),
        Err(e) => {
            warn(format!("invalid regular expression '{pattern}': {e}"));
            None
        }
    }
}
