//! Opaque codec identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The serializable identity of a value codec.
///
/// The bridge never encodes or decodes with it. A codec spec travels with
/// the tag it was declared for so the receiving side can rebuild the
/// matching coder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecSpec {
    /// Codec URN, e.g. `beam:coder:varint:v1`.
    pub urn: String,
    /// Component codecs for composite codecs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<CodecSpec>,
}

impl CodecSpec {
    /// Creates a codec spec without components.
    #[must_use]
    pub fn new(urn: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            components: Vec::new(),
        }
    }

    /// Creates a composite codec spec.
    #[must_use]
    pub fn composite(urn: impl Into<String>, components: Vec<CodecSpec>) -> Self {
        Self {
            urn: urn.into(),
            components,
        }
    }

    /// Variable-length integer codec.
    #[must_use]
    pub fn varint() -> Self {
        Self::new("beam:coder:varint:v1")
    }

    /// Codec for values that carry no data.
    #[must_use]
    pub fn void() -> Self {
        Self::new("beam:coder:void:v1")
    }

    /// UTF-8 string codec.
    #[must_use]
    pub fn string_utf8() -> Self {
        Self::new("beam:coder:string_utf8:v1")
    }

    /// Windowed-value codec that carries only the value.
    #[must_use]
    pub fn value_only(value: CodecSpec) -> Self {
        Self::composite("beam:coder:param_windowed_value:v1", vec![value])
    }

    /// Returns true if this spec and all its components name a codec.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.urn.trim().is_empty() && self.components.iter().all(Self::is_well_formed)
    }
}

impl fmt::Display for CodecSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn)?;
        if !self.components.is_empty() {
            let parts: Vec<String> = self.components.iter().map(ToString::to_string).collect();
            write!(f, "<{}>", parts.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_composite() {
        let codec = CodecSpec::value_only(CodecSpec::varint());
        assert_eq!(
            codec.to_string(),
            "beam:coder:param_windowed_value:v1<beam:coder:varint:v1>"
        );
    }

    #[test]
    fn test_well_formed() {
        assert!(CodecSpec::value_only(CodecSpec::varint()).is_well_formed());
        assert!(!CodecSpec::new("  ").is_well_formed());
        assert!(!CodecSpec::value_only(CodecSpec::new("")).is_well_formed());
    }
}
