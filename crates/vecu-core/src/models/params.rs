//! Typed test parameters
//!
//! Tests declare [`ParameterSpec`]s and callers supply [`ParamValue`]s by
//! name. Missing, unknown or mistyped input is caught at the manager
//! boundary instead of deep inside an executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value types a test parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Text,
    Integer,
    Decimal,
    Flag,
    Bytes,
}

/// Declared parameter of a diagnostic test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A supplied parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Flag(bool),
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// The declared type this value satisfies.
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Text(_) => ParamType::Text,
            ParamValue::Integer(_) => ParamType::Integer,
            ParamValue::Decimal(_) => ParamType::Decimal,
            ParamValue::Flag(_) => ParamType::Flag,
            ParamValue::Bytes(_) => ParamType::Bytes,
        }
    }
}

/// Parameter values supplied for one test invocation, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestParameters(pub BTreeMap<String, ParamValue>);

impl TestParameters {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check supplied values against the declared specs.
    ///
    /// Rejects a missing required parameter, a name no spec declares, and a
    /// value whose type does not match its spec.
    pub fn validate(&self, specs: &[ParameterSpec]) -> Result<(), ParameterError> {
        for spec in specs {
            match self.0.get(&spec.name) {
                None if spec.required => {
                    return Err(ParameterError::MissingRequired {
                        name: spec.name.clone(),
                    });
                }
                Some(value) if value.param_type() != spec.param_type => {
                    return Err(ParameterError::TypeMismatch {
                        name: spec.name.clone(),
                        expected: spec.param_type,
                        got: value.param_type(),
                    });
                }
                _ => {}
            }
        }
        if let Some(unknown) = self
            .0
            .keys()
            .find(|name| !specs.iter().any(|s| &s.name == *name))
        {
            return Err(ParameterError::Unknown {
                name: unknown.clone(),
            });
        }
        Ok(())
    }

    /// Encode the supplied values into request payload bytes, in spec order.
    ///
    /// Each present value contributes a type tag followed by a fixed
    /// encoding (length-prefixed for text and bytes). Absent optional
    /// parameters contribute nothing.
    pub fn encode(&self, specs: &[ParameterSpec]) -> Vec<u8> {
        let mut out = Vec::new();
        for spec in specs {
            let Some(value) = self.0.get(&spec.name) else {
                continue;
            };
            match value {
                ParamValue::Text(s) => {
                    out.push(0x01);
                    out.push(s.len().min(u8::MAX as usize) as u8);
                    out.extend_from_slice(&s.as_bytes()[..s.len().min(u8::MAX as usize)]);
                }
                ParamValue::Integer(i) => {
                    out.push(0x02);
                    out.extend_from_slice(&i.to_be_bytes());
                }
                ParamValue::Decimal(d) => {
                    out.push(0x03);
                    out.extend_from_slice(&d.to_be_bytes());
                }
                ParamValue::Flag(b) => {
                    out.push(0x04);
                    out.push(u8::from(*b));
                }
                ParamValue::Bytes(bytes) => {
                    out.push(0x05);
                    out.push(bytes.len().min(u8::MAX as usize) as u8);
                    out.extend_from_slice(&bytes[..bytes.len().min(u8::MAX as usize)]);
                }
            }
        }
        out
    }
}

/// Parameter validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("Missing required parameter '{name}'")]
    MissingRequired { name: String },

    #[error("Unknown parameter '{name}'")]
    Unknown { name: String },

    #[error("Parameter '{name}' expects {expected:?}, got {got:?}")]
    TypeMismatch {
        name: String,
        expected: ParamType,
        got: ParamType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec {
                name: "grade".to_string(),
                param_type: ParamType::Text,
                required: true,
                description: None,
            },
            ParameterSpec {
                name: "interval_km".to_string(),
                param_type: ParamType::Integer,
                required: false,
                description: None,
            },
        ]
    }

    #[test]
    fn validate_accepts_full_set() {
        let params = TestParameters::empty()
            .with("grade", ParamValue::Text("5W-30".to_string()))
            .with("interval_km", ParamValue::Integer(15_000));
        assert!(params.validate(&specs()).is_ok());
    }

    #[test]
    fn validate_accepts_absent_optional() {
        let params = TestParameters::empty().with("grade", ParamValue::Text("5W-30".to_string()));
        assert!(params.validate(&specs()).is_ok());
    }

    #[test]
    fn validate_rejects_missing_required() {
        let params = TestParameters::empty().with("interval_km", ParamValue::Integer(15_000));
        assert_eq!(
            params.validate(&specs()),
            Err(ParameterError::MissingRequired {
                name: "grade".to_string()
            })
        );
    }

    #[test]
    fn validate_rejects_unknown_name() {
        let params = TestParameters::empty()
            .with("grade", ParamValue::Text("5W-30".to_string()))
            .with("bogus", ParamValue::Flag(true));
        assert_eq!(
            params.validate(&specs()),
            Err(ParameterError::Unknown {
                name: "bogus".to_string()
            })
        );
    }

    #[test]
    fn validate_rejects_type_mismatch() {
        let params = TestParameters::empty().with("grade", ParamValue::Integer(5));
        assert_eq!(
            params.validate(&specs()),
            Err(ParameterError::TypeMismatch {
                name: "grade".to_string(),
                expected: ParamType::Text,
                got: ParamType::Integer,
            })
        );
    }

    #[test]
    fn encode_follows_spec_order() {
        // BTreeMap iterates alphabetically; encode must follow spec order
        // instead so the wire payload is stable.
        let params = TestParameters::empty()
            .with("interval_km", ParamValue::Integer(2))
            .with("grade", ParamValue::Text("A".to_string()));
        let encoded = params.encode(&specs());
        assert_eq!(encoded[0], 0x01); // grade first, per spec order
        assert_eq!(encoded[1], 1);
        assert_eq!(encoded[2], b'A');
        assert_eq!(encoded[3], 0x02);
        assert_eq!(&encoded[4..12], &2i64.to_be_bytes());
    }

    #[test]
    fn encode_skips_absent_values() {
        let params = TestParameters::empty().with("grade", ParamValue::Text("A".to_string()));
        assert_eq!(params.encode(&specs()).len(), 3);
    }
}
