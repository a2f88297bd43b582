use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    InvalidAssignment(String),

    #[error("Invalid value for '{key}': '{value}' is not {expected}.")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error(
        "Invalid delimiter '{0}'. Expected 'space', 'tab', 'comma' or a single ASCII character."
    )]
    InvalidDelimiter(String),
}

/// Splits a `-S KEY=VALUE` argument. Whitespace around the key and value is
/// ignored; the value itself may contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidAssignment(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::InvalidAssignment(raw.to_string()));
    }
    Ok((key, value.trim()))
}

pub fn parse_float(key: &str, value: &str) -> Result<f64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a number",
    })
}

pub fn parse_integer<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

pub fn parse_bool(key: &str, value: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ParseError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}

/// Accepts a named delimiter or a single ASCII character.
pub fn parse_delimiter(raw: &str) -> Result<u8, ParseError> {
    match raw {
        "space" | " " => Ok(b' '),
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" => Ok(b','),
        _ => {
            let mut bytes = raw.bytes();
            match (bytes.next(), bytes.next()) {
                (Some(b), None) if b.is_ascii() => Ok(b),
                _ => Err(ParseError::InvalidDelimiter(raw.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_splits_on_first_equals_sign() {
        assert_eq!(
            parse_assignment("evaluation.results-suffix=a=b").unwrap(),
            ("evaluation.results-suffix", "a=b")
        );
        assert_eq!(parse_assignment(" name = hts ").unwrap(), ("name", "hts"));
    }

    #[test]
    fn assignment_without_key_or_equals_is_rejected() {
        assert!(matches!(
            parse_assignment("workers"),
            Err(ParseError::InvalidAssignment(_))
        ));
        assert!(matches!(
            parse_assignment("=4"),
            Err(ParseError::InvalidAssignment(_))
        ));
    }

    #[test]
    fn typed_values_report_the_offending_key() {
        assert_eq!(parse_float("k", "-1.5").unwrap(), -1.5);
        assert_eq!(parse_integer::<usize>("k", "12").unwrap(), 12);
        assert!(parse_bool("k", "Yes").unwrap());
        let err = parse_integer::<usize>("selection.workers", "-3").unwrap_err();
        assert!(err.to_string().contains("selection.workers"));
    }

    #[test]
    fn delimiters_accept_names_and_single_characters() {
        assert_eq!(parse_delimiter("space").unwrap(), b' ');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("é").is_err());
    }
}
