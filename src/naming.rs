//! Instance and file naming for generated units.

use std::path::{Path, PathBuf};

pub const NODEDEF_PREFIX: &str = "ND_";
pub const SOURCE_EXTENSION: &str = "osl";
pub const OBJECT_EXTENSION: &str = "oso";

/// `ND_mix_float` -> `mix_float`. Names that are only the prefix are kept.
pub fn strip_nodedef_prefix(name: &str) -> &str {
    match name.strip_prefix(NODEDEF_PREFIX) {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    }
}

/// Name of the unit generated for a definition: prefix stripped, then the
/// configured prefix (if any) prepended with an underscore.
pub fn instance_name(nodedef: &str, prefix: Option<&str>) -> String {
    let base = strip_nodedef_prefix(nodedef);
    match prefix.filter(|p| !p.is_empty()) {
        Some(p) => format!("{p}_{base}"),
        None => base.to_string(),
    }
}

pub fn source_path(output_dir: &Path, instance: &str) -> PathBuf {
    output_dir.join(format!("{instance}.{SOURCE_EXTENSION}"))
}

pub fn object_path(output_dir: &Path, instance: &str) -> PathBuf {
    output_dir.join(format!("{instance}.{OBJECT_EXTENSION}"))
}
