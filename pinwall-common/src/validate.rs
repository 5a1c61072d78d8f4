//! Checks applied to client supplied post data before anything is stored.

use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const DEFAULT_TITLE_MIN_LEN: usize = 5;
pub const DEFAULT_CONTENT_MIN_LEN: usize = 5;

/// Minimum trimmed lengths, in characters.
///
/// Create and update carry separate title thresholds. Both default to
/// [`DEFAULT_TITLE_MIN_LEN`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ValidationRules {
    pub create_title_min_len: usize,
    pub update_title_min_len: usize,
    pub content_min_len: usize,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Field {
    Title,
    Content,
    Image,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FailureReason {
    TooShort { min_len: usize },
    /// No image payload on create.
    NoImageProvided,
    /// Neither a fresh upload nor an existing reference on update.
    NoImagePicked,
    /// The supplied reference is not the one stored for the post.
    ForeignImageRef,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct FieldFailure {
    pub field: Field,
    pub reason: FailureReason,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Validation failed, entered data is incorrect: {}", DisplayFailures(.failures))]
pub struct ValidationError {
    pub failures: Vec<FieldFailure>,
}

struct DisplayFailures<'a>(&'a [FieldFailure]);

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            create_title_min_len: DEFAULT_TITLE_MIN_LEN,
            update_title_min_len: DEFAULT_TITLE_MIN_LEN,
            content_min_len: DEFAULT_CONTENT_MIN_LEN,
        }
    }
}

impl ValidationRules {
    pub fn validate_create(
        &self,
        title: &str,
        content: &str,
        image_supplied: bool,
    ) -> Result<(), ValidationError> {
        let mut failures = self.text_failures(title, self.create_title_min_len, content);
        if !image_supplied {
            failures.push(FieldFailure::no_image_provided());
        }

        ValidationError::check(failures)
    }

    pub fn validate_update(
        &self,
        title: &str,
        content: &str,
        image_resolvable: bool,
    ) -> Result<(), ValidationError> {
        let mut failures = self.text_failures(title, self.update_title_min_len, content);
        if !image_resolvable {
            failures.push(FieldFailure::no_image_picked());
        }

        ValidationError::check(failures)
    }

    fn text_failures(&self, title: &str, title_min_len: usize, content: &str) -> Vec<FieldFailure> {
        [
            (Field::Title, title, title_min_len),
            (Field::Content, content, self.content_min_len),
        ]
        .into_iter()
        .filter(|(_, value, min_len)| value.trim().chars().count() < *min_len)
        .map(|(field, _, min_len)| FieldFailure {
            field,
            reason: FailureReason::TooShort { min_len },
        })
        .collect()
    }
}

impl FieldFailure {
    #[must_use]
    pub fn no_image_provided() -> Self {
        Self {
            field: Field::Image,
            reason: FailureReason::NoImageProvided,
        }
    }

    #[must_use]
    pub fn no_image_picked() -> Self {
        Self {
            field: Field::Image,
            reason: FailureReason::NoImagePicked,
        }
    }

    #[must_use]
    pub fn foreign_image_ref() -> Self {
        Self {
            field: Field::Image,
            reason: FailureReason::ForeignImageRef,
        }
    }
}

impl ValidationError {
    fn check(failures: Vec<FieldFailure>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }

    #[must_use]
    pub fn single(failure: FieldFailure) -> Self {
        Self {
            failures: vec![failure],
        }
    }

    #[must_use]
    pub fn fails(&self, field: Field) -> bool {
        self.failures.iter().any(|failure| failure.field == field)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Field::Title => "title",
            Field::Content => "content",
            Field::Image => "image",
        })
    }
}

impl Display for FieldFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            FailureReason::TooShort { min_len } => {
                write!(f, "{} must be at least {min_len} characters long", self.field)
            }
            FailureReason::NoImageProvided => f.write_str("No image provided"),
            FailureReason::NoImagePicked => f.write_str("No file picked"),
            FailureReason::ForeignImageRef => {
                f.write_str("The image reference does not belong to this post")
            }
        }
    }
}

impl Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            Display::fmt(failure, f)?;
        }
        Ok(())
    }
}
