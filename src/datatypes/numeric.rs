//! Numeric cell parsing
//!
//! With a custom format, numbers are validated against an LDML-subset
//! pattern (group/decimal characters, percent and per-mille markers,
//! grouping sizes). Without one, a default grammar accepts an optional
//! sign, comma-grouped digits, a decimal point, an exponent, a percent or
//! per-mille suffix, or the literal tokens `NaN` / `INF` / `-INF`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Analyzed LDML-subset number pattern
#[derive(Debug, Clone, PartialEq)]
pub struct NumberPattern {
    pub decimal_char: char,
    pub group_char: char,
    pub percent: bool,
    pub per_mille: bool,
    /// Digits in the rightmost integer group; 0 means no grouping declared
    pub primary_group_size: usize,
    /// Digits in groups left of the primary group
    pub secondary_group_size: usize,
    pub min_integer_digits: usize,
    pub max_fraction_digits: usize,
}

impl NumberPattern {
    /// Analyze a pattern such as `#,##0.00` or `#,##,##0%`.
    ///
    /// Only the positive subpattern (before any `;`) is analyzed; the
    /// negative subpattern adds nothing we consume.
    pub fn parse(
        pattern: &str,
        decimal_char: Option<char>,
        group_char: Option<char>,
    ) -> Result<Self, String> {
        let decimal_char = decimal_char.unwrap_or('.');
        let group_char = group_char.unwrap_or(',');
        let positive = pattern.split(';').next().unwrap_or("");
        if positive.is_empty() {
            return Err("empty number pattern".to_string());
        }

        let mut percent = false;
        let mut per_mille = false;
        let mut integer_groups: Vec<usize> = vec![0];
        let mut in_fraction = false;
        let mut min_integer_digits = 0;
        let mut max_fraction_digits = 0;

        // the pattern text always writes '.' and ',' symbolically; custom
        // decimal and group characters apply to raw values in normalize only
        for c in positive.chars() {
            if c == '.' {
                if in_fraction {
                    return Err("more than one decimal separator in pattern".to_string());
                }
                in_fraction = true;
            } else if c == ',' {
                if in_fraction {
                    return Err("group separator after decimal separator".to_string());
                }
                integer_groups.push(0);
            } else {
                match c {
                    '#' | '0' => {
                        if in_fraction {
                            max_fraction_digits += 1;
                        } else {
                            *integer_groups.last_mut().expect("non-empty") += 1;
                            if c == '0' {
                                min_integer_digits += 1;
                            }
                        }
                    }
                    '%' => percent = true,
                    '\u{2030}' => per_mille = true,
                    '+' | '-' | 'E' => {}
                    other => return Err(format!("unsupported pattern character '{other}'")),
                }
            }
        }

        // secondary grouping (e.g. Indian lakh notation) needs two
        // separators in the pattern; with one, all groups share a size
        let (primary, secondary) = if integer_groups.len() > 1 {
            let primary = *integer_groups.last().expect("non-empty");
            let secondary = if integer_groups.len() > 2 {
                integer_groups[integer_groups.len() - 2]
            } else {
                primary
            };
            (primary, if secondary == 0 { primary } else { secondary })
        } else {
            (0, 0)
        };

        Ok(Self {
            decimal_char,
            group_char,
            percent,
            per_mille,
            primary_group_size: primary,
            secondary_group_size: secondary,
            min_integer_digits,
            max_fraction_digits,
        })
    }

    /// Validate `raw` against the pattern and return a plain numeric string
    /// (`-`? digits `.`? digits) with group separators removed and the
    /// decimal character normalized to `.`. Scaling for percent/per-mille is
    /// the caller's concern via [`scale`](NumberPattern::scale).
    pub fn normalize(&self, raw: &str) -> Result<String, String> {
        let mut s = raw;
        let mut sign = "";
        if let Some(rest) = s.strip_prefix('-') {
            sign = "-";
            s = rest;
        } else if let Some(rest) = s.strip_prefix('+') {
            s = rest;
        }
        if self.percent {
            s = s
                .strip_suffix('%')
                .ok_or_else(|| "expected '%' suffix".to_string())?;
        }
        if self.per_mille {
            s = s
                .strip_suffix('\u{2030}')
                .ok_or_else(|| "expected per-mille suffix".to_string())?;
        }

        let (int_part, frac_part) = match s.split_once(self.decimal_char) {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };

        let mut digits = String::new();
        if self.primary_group_size == 0 {
            if int_part.contains(self.group_char) {
                return Err(format!(
                    "group separator '{}' not allowed by pattern",
                    self.group_char
                ));
            }
            digits.push_str(int_part);
        } else {
            let groups: Vec<&str> = int_part.split(self.group_char).collect();
            for (i, group) in groups.iter().enumerate() {
                if group.is_empty() {
                    return Err("consecutive group separators".to_string());
                }
                let expected = if i + 1 == groups.len() {
                    self.primary_group_size
                } else {
                    self.secondary_group_size
                };
                let first = i == 0;
                if i + 1 == groups.len() && groups.len() == 1 {
                    // ungrouped numbers below the grouping threshold are fine
                } else if first {
                    if group.len() > expected {
                        return Err(format!("leading group too long: '{group}'"));
                    }
                } else if group.len() != expected {
                    return Err(format!("group '{group}' does not match grouping size"));
                }
                digits.push_str(group);
            }
        }

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid integer digits in '{raw}'"));
        }
        if digits.len() < self.min_integer_digits {
            return Err("fewer integer digits than the pattern requires".to_string());
        }

        let mut out = format!("{sign}{digits}");
        if let Some(frac) = frac_part {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("invalid fraction digits in '{raw}'"));
            }
            if self.max_fraction_digits == 0 {
                return Err("fraction digits not allowed by pattern".to_string());
            }
            if frac.len() > self.max_fraction_digits {
                return Err("more fraction digits than the pattern allows".to_string());
            }
            out.push('.');
            out.push_str(frac);
        }
        Ok(out)
    }

    /// Scale divisor implied by the pattern's percent/per-mille marker.
    pub fn scale(&self) -> f64 {
        if self.percent {
            100.0
        } else if self.per_mille {
            1000.0
        } else {
            1.0
        }
    }
}

static DEFAULT_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d{1,3}(,\d{3})+|\d+)?(\.\d+)?([Ee][+-]?\d+)?[%\u{2030}]?$")
        .expect("valid regex")
});

/// Outcome of default-grammar analysis
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultNumber {
    /// Plain numeric string with grouping removed, without suffix
    pub normalized: String,
    pub has_decimal_point: bool,
    pub has_exponent: bool,
    /// Scale divisor from a percent/per-mille suffix
    pub scale: f64,
}

/// Validate `raw` against the default numeric grammar.
/// `NaN`, `INF` and `-INF` are handled by the caller before this point.
pub fn parse_default(raw: &str) -> Result<DefaultNumber, String> {
    if raw.is_empty() || !DEFAULT_NUMBER.is_match(raw) {
        return Err(format!("'{raw}' is not a valid number"));
    }
    let mut s = raw;
    let mut scale = 1.0;
    if let Some(rest) = s.strip_suffix('%') {
        scale = 100.0;
        s = rest;
    } else if let Some(rest) = s.strip_suffix('\u{2030}') {
        scale = 1000.0;
        s = rest;
    }
    let normalized: String = s.chars().filter(|c| *c != ',').collect();
    if !normalized.bytes().any(|b| b.is_ascii_digit()) {
        return Err(format!("'{raw}' has no digits"));
    }
    Ok(DefaultNumber {
        has_decimal_point: normalized.contains('.'),
        has_exponent: normalized.contains(['e', 'E']),
        normalized,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_analysis() {
        let p = NumberPattern::parse("#,##0", None, None).unwrap();
        assert_eq!(p.primary_group_size, 3);
        assert_eq!(p.secondary_group_size, 3);
        assert_eq!(p.min_integer_digits, 1);

        let p = NumberPattern::parse("#,##,##0", None, None).unwrap();
        assert_eq!(p.primary_group_size, 3);
        assert_eq!(p.secondary_group_size, 2);

        let p = NumberPattern::parse("0.00%", None, None).unwrap();
        assert!(p.percent);
        assert_eq!(p.max_fraction_digits, 2);
        assert_eq!(p.primary_group_size, 0);
    }

    #[test]
    fn test_pattern_normalize_grouped() {
        let p = NumberPattern::parse("#,##0", None, None).unwrap();
        assert_eq!(p.normalize("12,345").unwrap(), "12345");
        assert_eq!(p.normalize("345").unwrap(), "345");
        assert!(p.normalize("12,,345").is_err());
        assert!(p.normalize("1,23,456").is_err());

        let p = NumberPattern::parse("#,##,##0", None, None).unwrap();
        assert_eq!(p.normalize("1,23,456").unwrap(), "123456");
    }

    #[test]
    fn test_pattern_custom_separators() {
        let p = NumberPattern::parse("#,##0.00", Some(','), Some('.')).unwrap();
        assert_eq!(p.decimal_char, ',');
        assert_eq!(p.group_char, '.');
        assert_eq!(p.primary_group_size, 3);
        assert_eq!(p.max_fraction_digits, 2);
        assert_eq!(p.normalize("1.234,56").unwrap(), "1234.56");
        assert!(p.normalize("1,234.56").is_err());
    }

    #[test]
    fn test_pattern_percent_requires_suffix() {
        let p = NumberPattern::parse("0%", None, None).unwrap();
        assert_eq!(p.normalize("42%").unwrap(), "42");
        assert_eq!(p.scale(), 100.0);
        assert!(p.normalize("42").is_err());
    }

    #[test]
    fn test_default_grammar() {
        assert_eq!(parse_default("12,345").unwrap().normalized, "12345");
        assert_eq!(parse_default("-1.5e3").unwrap().normalized, "-1.5e3");
        assert_eq!(parse_default("85%").unwrap().scale, 100.0);
        assert!(parse_default("12,,345").is_err());
        assert!(parse_default("abc").is_err());
        assert!(parse_default("").is_err());
    }
}
