//! Input checks shared by the article and comment command handlers.

use thiserror::Error;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_FEEDBACK_CHARS: usize = 2000;
pub const MAX_COMMENT_CHARS: usize = 5000;

/// Malformed command input.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("{field} is {actual} characters long, the limit is {max}")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// Non-blank text of at most `max` characters.
pub(crate) fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    required(field, value)?;
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

pub(crate) fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_blank() {
        assert_eq!(
            required("title", " \n\t"),
            Err(ValidationError::Blank { field: "title" })
        );
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let accents = "é".repeat(MAX_TITLE_CHARS);
        assert!(bounded("title", &accents, MAX_TITLE_CHARS).is_ok());

        let err = bounded("title", &format!("{accents}é"), MAX_TITLE_CHARS).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLong {
                field: "title",
                max: 200,
                actual: 201
            }
        );
        assert_eq!(
            err.to_string(),
            "title is 201 characters long, the limit is 200"
        );
    }
}
