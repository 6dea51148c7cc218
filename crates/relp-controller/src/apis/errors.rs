use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldErrorKind {
    Required,
    Invalid,
    NotSupported,
    NotFound,
    Forbidden,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Required => "Required value",
            Self::Invalid => "Invalid value",
            Self::NotSupported => "Unsupported value",
            Self::NotFound => "Not found",
            Self::Forbidden => "Forbidden",
        };
        f.write_str(text)
    }
}

/// A single validation failure anchored at a field path such as `tls.permittedPeer[1]`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{field}: {kind}: {detail}")]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub field: String,
    pub detail: String,
    /// Set when the failure concerns a referenced Secret or ConfigMap rather than the document
    #[serde(default)]
    pub reference: bool,
}

impl FieldError {
    fn new(kind: FieldErrorKind, field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            detail: detail.into(),
            reference: false,
        }
    }

    pub fn required(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Required, field, detail)
    }

    pub fn invalid(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Invalid, field, detail)
    }

    pub fn not_supported(field: impl Into<String>, value: &str, allowed: &[&str]) -> Self {
        let quoted: Vec<String> = allowed.iter().map(|v| format!("\"{v}\"")).collect();
        Self::new(
            FieldErrorKind::NotSupported,
            field,
            format!("\"{value}\": supported values: {}", quoted.join(", ")),
        )
    }

    pub fn not_found(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::NotFound, field, detail)
    }

    pub fn forbidden(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorKind::Forbidden, field, detail)
    }

    /// Marks the error as concerning a referenced object.
    #[must_use]
    pub fn on_reference(mut self) -> Self {
        self.reference = true;
        self
    }
}

/// Ordered list of validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// True when every failure stems from a referenced object.
    #[must_use]
    pub fn only_references(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|e| e.reference)
    }

    /// Field path of the first failure, used for status reporting.
    #[must_use]
    pub fn first_field(&self) -> Option<&str> {
        self.0.first().map(|e| e.field.as_str())
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", messages.join(", "))
    }
}

impl std::error::Error for FieldErrors {}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<FieldError> for FieldErrors {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_kind_and_detail() {
        let error = FieldError::invalid("port", "port cannot be less than 0");
        assert_eq!(
            error.to_string(),
            "port: Invalid value: port cannot be less than 0"
        );
    }

    #[test]
    fn not_supported_lists_allowed_values() {
        let error = FieldError::not_supported("tls.authMode", "foo", &["name", "fingerprint"]);
        assert_eq!(error.kind, FieldErrorKind::NotSupported);
        assert!(error.detail.contains("\"name\", \"fingerprint\""));
    }

    #[test]
    fn only_references_requires_all_reference_errors() {
        let mut errors = FieldErrors::default();
        assert!(!errors.only_references());
        errors.push(FieldError::not_found("tls.secretReferenceName", "missing").on_reference());
        assert!(errors.only_references());
        errors.push(FieldError::required("target", "target must not be empty"));
        assert!(!errors.only_references());
    }
}
