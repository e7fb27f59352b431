use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use url::Url;

use crate::schema::ScalarType;
use crate::value::Scalar;

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+$").unwrap());
static FLOAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

const TRUE_TOKENS: &[&str] = &["true", "1", "yes"];
const FALSE_TOKENS: &[&str] = &["false", "0", "no"];

/// Settings coercion depends on, passed in per run instead of living in
/// globals so unrelated extractions never share state.
#[derive(Debug, Clone, Default)]
pub struct CoercionContext {
    /// Base for relative `url` values.
    pub base_url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailed {
    pub raw: String,
    pub target: ScalarType,
}

/// Convert raw node content into `target`. Never panics; every rejection is
/// a [`CoercionFailed`] carrying the offending text.
pub fn coerce(raw: &str, target: ScalarType, ctx: &CoercionContext) -> Result<Scalar, CoercionFailed> {
    let fail = || CoercionFailed {
        raw: raw.to_string(),
        target,
    };
    let trimmed = raw.trim();

    match target {
        ScalarType::String => Ok(Scalar::String(raw.to_string())),
        ScalarType::Integer => {
            if !INTEGER_RE.is_match(trimmed) {
                return Err(fail());
            }
            trimmed.parse::<i64>().map(Scalar::Integer).map_err(|_| fail())
        }
        ScalarType::Float => {
            if !FLOAT_RE.is_match(trimmed) {
                return Err(fail());
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(Scalar::Float(n)),
                _ => Err(fail()),
            }
        }
        ScalarType::Boolean => {
            let lower = trimmed.to_ascii_lowercase();
            if TRUE_TOKENS.contains(&lower.as_str()) {
                Ok(Scalar::Boolean(true))
            } else if FALSE_TOKENS.contains(&lower.as_str()) {
                Ok(Scalar::Boolean(false))
            } else {
                Err(fail())
            }
        }
        ScalarType::Date => {
            if !DATE_RE.is_match(trimmed) {
                return Err(fail());
            }
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Scalar::Date)
                .map_err(|_| fail())
        }
        ScalarType::Url => {
            if trimmed.is_empty() {
                return Err(fail());
            }
            match Url::parse(trimmed) {
                Ok(url) => Ok(Scalar::Url(url)),
                Err(url::ParseError::RelativeUrlWithoutBase) => ctx
                    .base_url
                    .as_ref()
                    .and_then(|base| base.join(trimmed).ok())
                    .map(Scalar::Url)
                    .ok_or_else(fail),
                Err(_) => Err(fail()),
            }
        }
    }
}
