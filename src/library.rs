//! In-memory node definition library.
//!
//! A library is a set of JSON documents. Each holds node definitions, their
//! per-target implementations, and (optionally) node instances. Documents are
//! merged into a single [`LibraryDocument`] in a stable order so that batch
//! output is reproducible.

use std::{
    collections::HashSet,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::search_path::FileSearchPath;

/// Compilation target handled by this crate.
pub const OSL_TARGET: &str = "genosl";

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct LibraryDocument {
    #[serde(default)]
    pub nodedefs: Vec<NodeDef>,
    #[serde(default)]
    pub implementations: Vec<Implementation>,
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDef {
    pub name: String,
    /// Node category, e.g. `mix`.
    pub node: String,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortDef {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Geometric default bound by the renderer (`UV0`, `Nworld`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaultgeomprop: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Implementation {
    pub name: String,
    pub nodedef: String,
    /// `None` applies to every target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub function: String,
    pub file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeInstance {
    pub name: String,
    pub nodedef: String,
    #[serde(default)]
    pub inputs: Vec<InstanceInput>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstanceInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Compiled entry point for a definition on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint<'a> {
    pub function: &'a str,
    pub file: &'a str,
}

impl LibraryDocument {
    pub fn nodedef(&self, name: &str) -> Option<&NodeDef> {
        self.nodedefs.iter().find(|d| d.name == name)
    }

    pub fn node_instance(&self, name: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Definition names in stored (load) order.
    pub fn nodedef_names(&self) -> Vec<String> {
        self.nodedefs.iter().map(|d| d.name.clone()).collect()
    }

    /// Look up the implementation of `nodedef` for `target`.
    ///
    /// An implementation declared for exactly this target wins over a
    /// target-less one.
    pub fn resolve_implementation(&self, nodedef: &str, target: &str) -> Option<EntryPoint<'_>> {
        let candidates = self.implementations.iter().filter(|i| i.nodedef == nodedef);
        let mut fallback = None;
        for imp in candidates {
            match imp.target.as_deref() {
                Some(t) if t == target => {
                    return Some(EntryPoint {
                        function: &imp.function,
                        file: &imp.file,
                    });
                }
                None if fallback.is_none() => fallback = Some(imp),
                _ => {}
            }
        }
        fallback.map(|imp| EntryPoint {
            function: &imp.function,
            file: &imp.file,
        })
    }

    /// Add an instance of `nodedef` named `instance_name` with no input overrides.
    pub fn add_node_instance(&mut self, nodedef: &str, instance_name: &str) -> Result<()> {
        if self.nodedef(nodedef).is_none() {
            bail!("node definition not found: {nodedef}");
        }
        if self.node_instance(instance_name).is_some() {
            bail!("a node named {instance_name} already exists in the document");
        }
        self.nodes.push(NodeInstance {
            name: instance_name.to_string(),
            nodedef: nodedef.to_string(),
            inputs: Vec::new(),
        });
        Ok(())
    }

    pub fn remove_node_instance(&mut self, name: &str) -> Option<NodeInstance> {
        let idx = self.nodes.iter().position(|n| n.name == name)?;
        Some(self.nodes.remove(idx))
    }

    /// Append the contents of `other`. Definitions and implementations whose name
    /// is already present are dropped; the first loaded one wins.
    pub fn merge(&mut self, other: LibraryDocument) {
        for def in other.nodedefs {
            if self.nodedef(&def.name).is_some() {
                log::warn!("[library] duplicate node definition {} ignored", def.name);
                continue;
            }
            self.nodedefs.push(def);
        }
        for imp in other.implementations {
            if self.implementations.iter().any(|i| i.name == imp.name) {
                log::warn!("[library] duplicate implementation {} ignored", imp.name);
                continue;
            }
            self.implementations.push(imp);
        }
        for node in other.nodes {
            if self.node_instance(&node.name).is_some() {
                log::warn!("[library] duplicate node instance {} ignored", node.name);
                continue;
            }
            self.nodes.push(node);
        }
    }
}

/// A node instance that lives in the document only while this guard does.
///
/// Generation works on instantiated graphs, so the driver inserts a throwaway
/// instance per definition. Dropping the guard removes it again on every exit
/// path.
pub struct TransientInstance<'a> {
    doc: &'a mut LibraryDocument,
    name: String,
}

impl<'a> TransientInstance<'a> {
    pub fn insert(doc: &'a mut LibraryDocument, nodedef: &str, instance_name: &str) -> Result<Self> {
        doc.add_node_instance(nodedef, instance_name)?;
        Ok(Self {
            doc,
            name: instance_name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Deref for TransientInstance<'_> {
    type Target = LibraryDocument;

    fn deref(&self) -> &LibraryDocument {
        &*self.doc
    }
}

impl Drop for TransientInstance<'_> {
    fn drop(&mut self) {
        self.doc.remove_node_instance(&self.name);
    }
}

pub fn load_document_from_path(path: impl AsRef<Path>) -> Result<LibraryDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read library document at {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse library document {}", path.display()))
}

/// Library folders to load: everything, or `targets` plus the requested subset.
pub fn library_folders(libraries: &[String]) -> Vec<PathBuf> {
    let root = PathBuf::from("libraries");
    if libraries.is_empty() {
        return vec![root];
    }
    let mut folders = vec![root.join("targets")];
    for lib in libraries {
        let folder = root.join(lib);
        if !folders.contains(&folder) {
            folders.push(folder);
        }
    }
    folders
}

/// Load every `*.json` document below `folders` into one document.
///
/// Folders are visited in the given order and files within a folder in sorted
/// path order, which fixes the iteration order of node definitions.
pub fn load_libraries(folders: &[PathBuf], search_path: &FileSearchPath) -> Result<LibraryDocument> {
    let mut doc = LibraryDocument::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for folder in folders {
        let Some(dir) = search_path.find(folder) else {
            log::warn!(
                "[library] folder {} not found in search path {:?}",
                folder.display(),
                search_path.roots()
            );
            continue;
        };

        let mut files = Vec::new();
        collect_json_files(&dir, &mut files)?;
        files.sort();

        for file in files {
            if !seen.insert(file.clone()) {
                continue;
            }
            let part = load_document_from_path(&file)?;
            log::debug!(
                "[library] loaded {} ({} definitions)",
                file.display(),
                part.nodedefs.len()
            );
            doc.merge(part);
        }
    }

    Ok(doc)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let rd = std::fs::read_dir(dir)
        .map_err(|e| anyhow!("failed to read library folder {}: {e}", dir.display()))?;
    for entry in rd.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            out.push(path);
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    fn doc() -> LibraryDocument {
        LibraryDocument {
            nodedefs: vec![
                nodedef("ND_add_float", vec![port("in1", "float", Some("0.0"))], "float"),
                nodedef("ND_dot_float", vec![], "float"),
            ],
            implementations: vec![
                implementation("ND_add_float", None, "mx_add_any", "any/mx_add.osl"),
                implementation("ND_add_float", Some("genglsl"), "mx_add_glsl", "glsl/mx_add.glsl"),
                implementation("ND_add_float", Some(OSL_TARGET), "mx_add_float", "osl/mx_add.osl"),
            ],
            nodes: Vec::new(),
        }
    }

    #[test]
    fn exact_target_wins_over_fallback() {
        let d = doc();
        let ep = d.resolve_implementation("ND_add_float", OSL_TARGET).unwrap();
        assert_eq!(ep.function, "mx_add_float");
        let ep = d.resolve_implementation("ND_add_float", "genmsl").unwrap();
        assert_eq!(ep.function, "mx_add_any");
    }

    #[test]
    fn missing_implementation_is_none() {
        assert!(doc().resolve_implementation("ND_dot_float", OSL_TARGET).is_none());
    }

    #[test]
    fn transient_instance_is_removed_on_drop() {
        let mut d = doc();
        {
            let inst = TransientInstance::insert(&mut d, "ND_add_float", "add_float").unwrap();
            assert_eq!(inst.name(), "add_float");
            assert!(inst.node_instance("add_float").is_some());
        }
        assert!(d.node_instance("add_float").is_none());
    }

    #[test]
    fn transient_instance_rejects_collisions() {
        let mut d = doc();
        d.add_node_instance("ND_dot_float", "taken").unwrap();
        assert!(TransientInstance::insert(&mut d, "ND_add_float", "taken").is_err());
        assert_eq!(d.nodes.len(), 1);
    }

    #[test]
    fn merge_keeps_first_definition() {
        let mut d = doc();
        let mut other = LibraryDocument::default();
        other
            .nodedefs
            .push(nodedef("ND_add_float", vec![], "color3"));
        other.nodedefs.push(nodedef("ND_new", vec![], "float"));
        d.merge(other);
        assert_eq!(d.nodedef_names(), vec!["ND_add_float", "ND_dot_float", "ND_new"]);
        assert_eq!(d.nodedef("ND_add_float").unwrap().outputs[0].port_type, "float");
    }

    #[test]
    fn library_folders_subset_includes_targets() {
        assert_eq!(library_folders(&[]), vec![PathBuf::from("libraries")]);
        assert_eq!(
            library_folders(&["stdlib".to_string(), "pbrlib".to_string()]),
            vec![
                PathBuf::from("libraries/targets"),
                PathBuf::from("libraries/stdlib"),
                PathBuf::from("libraries/pbrlib"),
            ]
        );
    }

    #[test]
    fn parses_document_json() {
        let json = r#"{
            "nodedefs": [{
                "name": "ND_image_color3",
                "node": "image",
                "inputs": [
                    {"name": "file", "type": "filename", "value": ""},
                    {"name": "texcoord", "type": "vector2", "defaultgeomprop": "UV0"}
                ],
                "outputs": [{"name": "out", "type": "color3"}]
            }],
            "implementations": [{
                "name": "IM_image_color3_genosl",
                "nodedef": "ND_image_color3",
                "target": "genosl",
                "function": "mx_image_color3",
                "file": "stdlib/genosl/mx_image_color3.osl"
            }]
        }"#;
        let d: LibraryDocument = serde_json::from_str(json).unwrap();
        assert_eq!(d.nodedefs[0].inputs[1].defaultgeomprop.as_deref(), Some("UV0"));
        assert!(d.nodes.is_empty());
        assert!(d.resolve_implementation("ND_image_color3", OSL_TARGET).is_some());
    }
}
