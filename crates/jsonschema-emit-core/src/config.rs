//! Configuration for schema-graph conversion.

use serde::{Deserialize, Serialize};

/// JSON Schema dialect to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Target {
    /// JSON Schema Draft 2020-12 (`$defs`, `prefixItems`).
    #[default]
    #[serde(rename = "draft-2020-12")]
    Draft202012,
    /// JSON Schema Draft 7 (`definitions`, array-form `items`). Keywords next to `$ref` are ignored.
    #[serde(rename = "draft-7")]
    Draft7,
}

impl Target {
    /// Value of the `$schema` keyword for this dialect.
    pub fn schema_uri(self) -> &'static str {
        match self {
            Target::Draft202012 => "https://json-schema.org/draft/2020-12/schema",
            Target::Draft7 => "http://json-schema.org/draft-07/schema#",
        }
    }

    /// Keyword holding the definitions table.
    pub fn defs_keyword(self) -> &'static str {
        match self {
            Target::Draft202012 => "$defs",
            Target::Draft7 => "definitions",
        }
    }
}

/// How to handle node variants with no JSON Schema equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnrepresentablePolicy {
    /// Fail the conversion with [`crate::ConvertError::Unrepresentable`].
    #[default]
    Throw,
    /// Degrade to an unconstrained `{}` fragment.
    Any,
}

/// Which side of transform-like nodes is described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Io {
    /// The type produced after parsing.
    #[default]
    Output,
    /// The type accepted before parsing.
    Input,
}

/// How to handle cyclic schema graphs at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CyclePolicy {
    /// Break cycles by hoisting the cycle entry into the definitions table.
    #[default]
    Ref,
    /// Fail with [`crate::ConvertError::Cycle`].
    Throw,
}

/// How to handle nodes reached more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReusePolicy {
    /// Inline a copy at every occurrence.
    #[default]
    Inline,
    /// Hoist into the definitions table and reference it.
    Ref,
}

/// Options for schema-graph conversion.
///
/// ## Serialization Format
///
/// Fields are serialized in `kebab-case`; enum values use the same strings
/// as the CLI flags (`draft-2020-12`, `throw`, `output`, `ref`, `inline`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConvertOptions {
    /// Output dialect. Default: draft 2020-12.
    pub target: Target,
    /// Unrepresentable variants. Default: throw.
    pub unrepresentable: UnrepresentablePolicy,
    /// Input or output side. Default: output.
    pub io: Io,
    /// Cycle handling at emission. Default: ref.
    pub cycles: CyclePolicy,
    /// Reuse handling at emission. Default: inline.
    pub reused: ReusePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_options_serde_round_trip() {
        let opts = ConvertOptions {
            target: Target::Draft7,
            unrepresentable: UnrepresentablePolicy::Any,
            io: Io::Input,
            cycles: CyclePolicy::Throw,
            reused: ReusePolicy::Ref,
        };

        let json = serde_json::to_string(&opts).unwrap();

        assert!(json.contains("\"draft-7\""));
        assert!(json.contains("\"unrepresentable\":\"any\""));
        assert!(json.contains("\"io\":\"input\""));
        assert!(json.contains("\"cycles\":\"throw\""));
        assert!(json.contains("\"reused\":\"ref\""));

        let deserialized: ConvertOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, opts);
    }

    #[test]
    fn test_partial_options_fill_defaults() {
        let opts: ConvertOptions = serde_json::from_str(r#"{"io": "input"}"#).unwrap();
        assert_eq!(opts.io, Io::Input);
        assert_eq!(opts.target, Target::Draft202012);
        assert_eq!(opts.unrepresentable, UnrepresentablePolicy::Throw);
        assert_eq!(opts.cycles, CyclePolicy::Ref);
        assert_eq!(opts.reused, ReusePolicy::Inline);
    }

    #[test]
    fn test_dialect_keywords() {
        assert_eq!(Target::Draft202012.defs_keyword(), "$defs");
        assert_eq!(Target::Draft7.defs_keyword(), "definitions");
        assert_eq!(
            Target::Draft7.schema_uri(),
            "http://json-schema.org/draft-07/schema#"
        );
    }
}
