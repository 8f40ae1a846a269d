//! Target-language spelling of types, values and identifiers.

use crate::value::{Value, is_reference_type};

/// Inputs whose defaults are not pruned upstream; emitting them would bind a
/// closure parameter to a literal.
pub const EXCLUDED_INPUTS: &[&str] = &["backsurfaceshader", "displacementshader"];

const RESERVED_WORDS: &[&str] = &[
    "and", "break", "closure", "color", "continue", "do", "else", "emit", "float", "for", "if",
    "illuminance", "illuminate", "int", "matrix", "normal", "not", "or", "output", "point",
    "public", "return", "string", "struct", "vector", "void", "while",
    // Reserved for future use.
    "bool", "case", "catch", "char", "class", "const", "delete", "default", "double", "enum",
    "extern", "false", "friend", "goto", "inline", "long", "new", "operator", "private",
    "protected", "short", "signed", "sizeof", "static", "switch", "template", "this", "throw",
    "true", "try", "typedef", "uniform", "union", "unsigned", "varying", "virtual", "volatile",
];

/// Fixed notation keeps generated text stable across platforms.
const FLOAT_DECIMALS: usize = 6;

pub fn type_name(port_type: &str) -> &str {
    match port_type {
        "float" => "float",
        "integer" | "boolean" => "int",
        "color3" => "color",
        "vector3" => "vector",
        "matrix44" => "matrix",
        "string" | "filename" => "string",
        "color4" | "vector2" | "vector4" | "matrix33" => port_type,
        t if is_reference_type(t) => "closure color",
        other => other,
    }
}

fn format_float(v: f32) -> String {
    format!("{:.*}", FLOAT_DECIMALS, v)
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Float(v) => format_float(*v),
        Value::Integer(v) => v.to_string(),
        Value::Boolean(v) => String::from(if *v { "1" } else { "0" }),
        Value::Floats(vs) => vs
            .iter()
            .map(|v| format_float(*v))
            .collect::<Vec<_>>()
            .join(" "),
        Value::String(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('"');
            for ch in s.chars() {
                if ch == '"' || ch == '\\' {
                    out.push('\\');
                }
                out.push(ch);
            }
            out.push('"');
            out
        }
        Value::EmptyReference => String::new(),
    }
}

/// Turn `name` into an identifier the target language accepts.
pub fn make_valid_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if RESERVED_WORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_type_names() {
        assert_eq!(type_name("color3"), "color");
        assert_eq!(type_name("boolean"), "int");
        assert_eq!(type_name("vector2"), "vector2");
        assert_eq!(type_name("surfaceshader"), "closure color");
        assert_eq!(type_name("customtype"), "customtype");
    }

    #[test]
    fn formats_values_in_fixed_notation() {
        assert_eq!(format_value(&Value::Float(0.5)), "0.500000");
        assert_eq!(format_value(&Value::Float(1e-7)), "0.000000");
        assert_eq!(format_value(&Value::Boolean(true)), "1");
        assert_eq!(
            format_value(&Value::Floats(vec![1.0, 0.25, 0.0])),
            "1.000000 0.250000 0.000000"
        );
        assert_eq!(
            format_value(&Value::String(r#"a "b"\c"#.to_string())),
            r#""a \"b\"\\c""#
        );
    }

    #[test]
    fn sanitizes_identifiers() {
        assert_eq!(make_valid_name("in1"), "in1");
        assert_eq!(make_valid_name("my-input.x"), "my_input_x");
        assert_eq!(make_valid_name("2d"), "_2d");
        assert_eq!(make_valid_name("color"), "color_");
        for word in ["default", "true", "false", "bool", "uniform", "const", "switch"] {
            assert_eq!(make_valid_name(word), format!("{word}_"));
        }
        assert_eq!(make_valid_name(""), "_");
    }
}
