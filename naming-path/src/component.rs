use std::fmt::{self, Display};

use crate::PathError;

/// A single validated path component: everything that can sit between two
/// `/` separators.
///
/// Disallows the empty string, `/` (the separator), and `:` (reserved for
/// a future drive-letter style prefix).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PathComponent(String);

impl PathComponent {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn validate(name: &str) -> Result<(), PathError> {
    if name.is_empty() || name.contains('/') || name.contains(':') {
        return Err(PathError::InvalidPath(format!(
            "invalid path component: {:?}",
            name
        )));
    }
    Ok(())
}

impl TryFrom<&str> for PathComponent {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate(value)?;
        Ok(PathComponent(value.to_owned()))
    }
}

impl TryFrom<String> for PathComponent {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(PathComponent(value))
    }
}

impl AsRef<str> for PathComponent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
