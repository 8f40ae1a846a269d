//! Typed literal values for node inputs.
//!
//! Library documents store every literal as a string (`"0.5, 0.5, 0.5"`), the
//! same way the material standard does. The string is parsed against the
//! declared port type when a shading graph is built.

use thiserror::Error;

/// Port types whose values are references to shading closures. They never carry
/// a literal; the only valid literal form is the empty string.
pub const REFERENCE_TYPES: &[&str] = &[
    "surfaceshader",
    "displacementshader",
    "volumeshader",
    "lightshader",
    "material",
    "BSDF",
    "EDF",
    "VDF",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f32),
    Integer(i32),
    Boolean(bool),
    /// Fixed-size aggregates: colors, vectors and matrices.
    Floats(Vec<f32>),
    String(String),
    /// Placeholder for a closure-typed input that is not wired to anything.
    EmptyReference,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot parse `{text}` as {type_name}")]
    Malformed { type_name: String, text: String },
    #[error("{type_name} expects {expected} components, got {got} in `{text}`")]
    ComponentCount {
        type_name: String,
        expected: usize,
        got: usize,
        text: String,
    },
    #[error("{type_name} inputs cannot carry a literal value (got `{text}`)")]
    ReferenceLiteral { type_name: String, text: String },
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),
}

pub fn is_reference_type(type_name: &str) -> bool {
    REFERENCE_TYPES.contains(&type_name)
}

/// Number of float components stored by an aggregate type.
pub fn component_count(type_name: &str) -> Option<usize> {
    match type_name {
        "vector2" => Some(2),
        "color3" | "vector3" => Some(3),
        "color4" | "vector4" => Some(4),
        "matrix33" => Some(9),
        "matrix44" => Some(16),
        _ => None,
    }
}

impl Value {
    pub fn parse(type_name: &str, text: &str) -> Result<Value, ValueError> {
        let malformed = || ValueError::Malformed {
            type_name: type_name.to_string(),
            text: text.to_string(),
        };

        if is_reference_type(type_name) {
            if text.trim().is_empty() {
                return Ok(Value::EmptyReference);
            }
            return Err(ValueError::ReferenceLiteral {
                type_name: type_name.to_string(),
                text: text.to_string(),
            });
        }

        if let Some(expected) = component_count(type_name) {
            let parts: Vec<&str> = text.split(',').map(str::trim).collect();
            if parts.len() != expected {
                return Err(ValueError::ComponentCount {
                    type_name: type_name.to_string(),
                    expected,
                    got: parts.len(),
                    text: text.to_string(),
                });
            }
            let floats = parts
                .iter()
                .map(|p| p.parse::<f32>().map_err(|_| malformed()))
                .collect::<Result<Vec<f32>, ValueError>>()?;
            return Ok(Value::Floats(floats));
        }

        match type_name {
            "float" => text.trim().parse().map(Value::Float).map_err(|_| malformed()),
            "integer" => text.trim().parse().map(Value::Integer).map_err(|_| malformed()),
            "boolean" => match text.trim() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(malformed()),
            },
            "string" | "filename" => Ok(Value::String(text.to_string())),
            other => Err(ValueError::UnsupportedType(other.to_string())),
        }
    }

    /// The empty literal of a reference type. Never emitted as a parameter.
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self, Value::EmptyReference)
    }
}
