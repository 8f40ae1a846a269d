//! Shading graph to shader-group text.
//!
//! The generated unit is a flat list of `param`, `shader` and `connect`
//! statements. Nodes are emitted in the graph's stored order; connections are
//! held back until every node has been declared, so a `connect` can never
//! reference a node that has not been declared yet. No dependency sort is done.

pub mod syntax;

use std::{collections::BTreeSet, path::PathBuf};

use thiserror::Error;

use crate::{
    graph::{Connection, NodeId, ShadingGraph},
    library::{EntryPoint, LibraryDocument},
    search_path::FileSearchPath,
};
use syntax::{EXCLUDED_INPUTS, format_value, make_valid_name, type_name};

/// Sink shader appended in wrapper mode.
pub const WRAPPER_SHADER: &str = "setCi";
pub const WRAPPER_NODE: &str = "root";

/// Per-target lookup of compiled entry points.
pub trait ImplementationResolver {
    fn resolve(&self, nodedef: &str, target: &str) -> Option<EntryPoint<'_>>;
}

impl ImplementationResolver for LibraryDocument {
    fn resolve(&self, nodedef: &str, target: &str) -> Option<EntryPoint<'_>> {
        self.resolve_implementation(nodedef, target)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodegenOptions {
    /// Append a `setCi` sink wired to the last declared node. Only conformance
    /// harnesses need this.
    pub wrapper_mode: bool,
    /// Roots used to turn implementation files into absolute paths.
    pub object_search_path: FileSearchPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("node {node} ({nodedef}) has no implementation for target {target}")]
    MissingImplementation {
        node: String,
        nodedef: String,
        target: String,
    },
    #[error("input {node}.{input} is connected to an output that is not in the graph")]
    DanglingConnection { node: String, input: String },
    #[error("wrapper mode needs a declared node with an output; graph {graph} has none")]
    NoRootOutput { graph: String },
}

impl CodegenError {
    /// Graph node the failure is attributed to, when there is one.
    pub fn node(&self) -> Option<&str> {
        match self {
            CodegenError::MissingImplementation { node, .. }
            | CodegenError::DanglingConnection { node, .. } => Some(node),
            CodegenError::NoRootOutput { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub name: String,
    pub source: String,
    /// Implementation files referenced by the unit, as declared in the library.
    pub object_paths: BTreeSet<String>,
    /// Comma-joined absolute forms of `object_paths`.
    pub search_path: String,
}

impl GeneratedUnit {
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.source.lines()
    }
}

#[derive(Default)]
struct CompilationUnit {
    statements: Vec<String>,
    deferred: Vec<String>,
    object_paths: BTreeSet<String>,
    last_declared: Option<NodeId>,
}

pub fn generate<R>(
    graph: &ShadingGraph,
    registry: &R,
    target: &str,
    options: &CodegenOptions,
) -> Result<GeneratedUnit, CodegenError>
where
    R: ImplementationResolver + ?Sized,
{
    let mut unit = CompilationUnit::default();

    for (id, node) in graph.nodes().iter().enumerate() {
        let node_name = make_valid_name(&node.name);

        for input in node.inputs.iter().filter(|i| !i.is_default) {
            let input_name = make_valid_name(&input.name);

            match input.connection.as_ref() {
                None | Some(Connection::Boundary) => {
                    if EXCLUDED_INPUTS.contains(&input.name.as_str()) {
                        continue;
                    }
                    let Some(value) = input.value.as_ref().filter(|v| !v.is_empty_sentinel()) else {
                        continue;
                    };
                    unit.statements.push(format!(
                        "param {} {} {} ;",
                        type_name(&input.port_type),
                        input_name,
                        format_value(value)
                    ));
                }
                Some(conn) => {
                    let src = graph.source_output(conn).ok_or_else(|| {
                        CodegenError::DanglingConnection {
                            node: node.name.clone(),
                            input: input.name.clone(),
                        }
                    })?;
                    unit.deferred.push(format!(
                        "connect {}.{} {}.{} ;",
                        make_valid_name(&graph.node(src.node).name),
                        make_valid_name(&src.name),
                        node_name,
                        input_name
                    ));
                }
            }
        }

        let entry = registry.resolve(&node.nodedef, target).ok_or_else(|| {
            CodegenError::MissingImplementation {
                node: node.name.clone(),
                nodedef: node.nodedef.clone(),
                target: target.to_string(),
            }
        })?;

        unit.statements
            .push(format!("shader {} {} ;", entry.function, node_name));
        unit.last_declared = Some(id);
        unit.object_paths.insert(entry.file.to_string());
    }

    let CompilationUnit {
        mut statements,
        deferred,
        object_paths,
        last_declared,
    } = unit;

    statements.extend(deferred);

    if options.wrapper_mode {
        let root = last_declared
            .map(|id| graph.node(id))
            .and_then(|n| n.outputs.first().map(|o| (n, o)))
            .ok_or_else(|| CodegenError::NoRootOutput {
                graph: graph.name.clone(),
            })?;
        let (node, output) = root;
        statements.push(format!("shader {WRAPPER_SHADER} {WRAPPER_NODE} ;"));
        statements.push(format!(
            "connect {}.{} {WRAPPER_NODE}.{}_input ;",
            make_valid_name(&node.name),
            make_valid_name(&output.name),
            make_valid_name(&output.port_type)
        ));
    }

    let resolved: BTreeSet<PathBuf> = object_paths
        .iter()
        .map(|p| options.object_search_path.resolve(p))
        .collect();
    let search_path = resolved
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut source = statements.join("\n");
    if !source.is_empty() {
        source.push('\n');
    }

    Ok(GeneratedUnit {
        name: graph.name.clone(),
        source,
        object_paths,
        search_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::ShaderInput,
        library::{OSL_TARGET, test_utils::*},
        value::Value,
    };
    use proptest::prelude::*;

    fn registry() -> LibraryDocument {
        LibraryDocument {
            nodedefs: Vec::new(),
            implementations: vec![
                implementation("ND_mix_float", Some(OSL_TARGET), "mx_mix_float", "stdlib/mx_mix_float.osl"),
                implementation("ND_add_float", Some(OSL_TARGET), "mx_add_float", "stdlib/mx_math.osl"),
                implementation("ND_sub_float", Some(OSL_TARGET), "mx_sub_float", "stdlib/mx_math.osl"),
                implementation("ND_surface", Some(OSL_TARGET), "mx_surface", "pbrlib/mx_surface.osl"),
                implementation("ND_glsl_only", Some("genglsl"), "mx_glsl_only", "glsl/x.glsl"),
            ],
            nodes: Vec::new(),
        }
    }

    fn options() -> CodegenOptions {
        CodegenOptions {
            wrapper_mode: false,
            object_search_path: FileSearchPath::from_roots(["/libs"]),
        }
    }

    fn float_node(g: &mut ShadingGraph, name: &str, nodedef: &str) -> NodeId {
        let id = g.add_node(name, nodedef).unwrap();
        g.add_input(id, ShaderInput::published("in1", "float", Some(Value::Float(1.0))));
        g.add_input(id, ShaderInput::published("in2", "float", Some(Value::Float(0.5))));
        g.add_output(id, "out", "float");
        id
    }

    fn line_index(unit: &GeneratedUnit, prefix: &str) -> Vec<usize> {
        unit.statements()
            .enumerate()
            .filter(|(_, l)| l.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn single_node_emits_params_then_declaration() {
        let mut g = ShadingGraph::new("lib_mix_float");
        let id = g.add_node("lib_mix_float", "ND_mix_float").unwrap();
        g.add_input(id, ShaderInput::published("fg", "float", Some(Value::Float(0.0))));
        g.add_input(id, ShaderInput::published("bg", "color3", Some(Value::Floats(vec![1.0, 0.5, 0.25]))));
        g.add_output(id, "out", "float");

        let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        assert_eq!(
            unit.source,
            "param float fg 0.000000 ;\n\
             param color bg 1.000000 0.500000 0.250000 ;\n\
             shader mx_mix_float lib_mix_float ;\n"
        );
        assert_eq!(unit.search_path, "/libs/stdlib/mx_mix_float.osl");
    }

    #[test]
    fn connections_are_deferred_past_all_declarations() {
        let mut g = ShadingGraph::new("chain");
        // Consumer first: its connect must still come after the producer's shader line.
        let add = float_node(&mut g, "add1", "ND_add_float");
        let sub = float_node(&mut g, "sub1", "ND_sub_float");
        g.connect(sub, "out", add, "in1").unwrap();

        let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        let lines: Vec<&str> = unit.statements().collect();
        assert_eq!(
            lines,
            vec![
                "param float in2 0.500000 ;",
                "shader mx_add_float add1 ;",
                "param float in1 1.000000 ;",
                "param float in2 0.500000 ;",
                "shader mx_sub_float sub1 ;",
                "connect sub1.out add1.in1 ;",
            ]
        );
    }

    #[test]
    fn missing_implementation_fails_whole_unit() {
        let mut g = ShadingGraph::new("g");
        float_node(&mut g, "add1", "ND_add_float");
        float_node(&mut g, "glsl1", "ND_glsl_only");

        let err = generate(&g, &registry(), OSL_TARGET, &options()).unwrap_err();
        assert_eq!(err.node(), Some("glsl1"));
        assert!(matches!(err, CodegenError::MissingImplementation { ref target, .. } if target == OSL_TARGET));
    }

    #[test]
    fn excluded_and_empty_inputs_are_not_params() {
        let mut g = ShadingGraph::new("surf");
        let id = g.add_node("surf", "ND_surface").unwrap();
        g.add_input(id, ShaderInput::published("bsdf", "BSDF", Some(Value::EmptyReference)));
        g.add_input(id, ShaderInput::published("backsurfaceshader", "float", Some(Value::Float(2.0))));
        g.add_input(id, ShaderInput::published("displacementshader", "float", Some(Value::Float(3.0))));
        g.add_input(id, ShaderInput::literal("opacity", "float", None));
        g.add_input(id, ShaderInput::literal("thin", "boolean", Some(Value::Boolean(true))));
        g.add_output(id, "out", "surfaceshader");

        let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        assert_eq!(unit.source, "param int thin 1 ;\nshader mx_surface surf ;\n");
    }

    #[test]
    fn default_flagged_inputs_are_skipped() {
        let mut g = ShadingGraph::new("g");
        let id = g.add_node("g", "ND_mix_float").unwrap();
        let mut texcoord = ShaderInput::published("texcoord", "vector2", Some(Value::Floats(vec![0.0, 0.0])));
        texcoord.is_default = true;
        g.add_input(id, texcoord);
        g.add_output(id, "out", "float");

        let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        assert_eq!(unit.source, "shader mx_mix_float g ;\n");
    }

    #[test]
    fn identifiers_are_sanitized() {
        let mut g = ShadingGraph::new("g");
        let a = g.add_node("node-a", "ND_add_float").unwrap();
        g.add_output(a, "out.x", "float");
        let b = g.add_node("b", "ND_sub_float").unwrap();
        g.add_input(b, ShaderInput::published("in 1", "float", Some(Value::Float(1.0))));
        g.add_input(b, ShaderInput::published("color", "float", None));
        g.connect(a, "out.x", b, "color").unwrap();

        let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        assert!(unit.source.contains("param float in_1 1.000000 ;"));
        assert!(unit.source.contains("shader mx_add_float node_a ;"));
        assert!(unit.source.contains("connect node_a.out_x b.color_ ;"));
    }

    #[test]
    fn shared_object_paths_collapse() {
        let mut g = ShadingGraph::new("g");
        float_node(&mut g, "add1", "ND_add_float");
        float_node(&mut g, "sub1", "ND_sub_float");
        float_node(&mut g, "mix1", "ND_mix_float");

        let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        assert_eq!(unit.object_paths.len(), 2);
        assert_eq!(
            unit.search_path,
            "/libs/stdlib/mx_math.osl,/libs/stdlib/mx_mix_float.osl"
        );
        assert_eq!(unit.search_path.matches("mx_math.osl").count(), 1);
    }

    #[test]
    fn wrapper_mode_appends_sink() {
        let mut g = ShadingGraph::new("g");
        let add = float_node(&mut g, "add1", "ND_add_float");
        let sub = float_node(&mut g, "sub1", "ND_sub_float");
        g.connect(add, "out", sub, "in2").unwrap();

        let opts = CodegenOptions {
            wrapper_mode: true,
            ..options()
        };
        let unit = generate(&g, &registry(), OSL_TARGET, &opts).unwrap();
        let lines: Vec<&str> = unit.statements().collect();
        assert_eq!(
            &lines[lines.len() - 3..],
            &[
                "connect add1.out sub1.in2 ;",
                "shader setCi root ;",
                "connect sub1.out root.float_input ;",
            ]
        );
    }

    #[test]
    fn wrapper_mode_needs_an_output() {
        let mut g = ShadingGraph::new("g");
        g.add_node("sink", "ND_mix_float").unwrap();
        let opts = CodegenOptions {
            wrapper_mode: true,
            ..options()
        };
        assert_eq!(
            generate(&g, &registry(), OSL_TARGET, &opts).unwrap_err(),
            CodegenError::NoRootOutput {
                graph: "g".to_string()
            }
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let mut g = ShadingGraph::new("g");
        let a = float_node(&mut g, "mix1", "ND_mix_float");
        let b = float_node(&mut g, "add1", "ND_add_float");
        g.connect(b, "out", a, "in2").unwrap();

        let first = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        let second = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn connects_never_precede_declarations(
            n in 1usize..8,
            edges in proptest::collection::vec((0usize..8, 0usize..8, 0usize..2), 0..16),
        ) {
            let mut g = ShadingGraph::new("random");
            for i in 0..n {
                float_node(&mut g, &format!("n{i}"), "ND_add_float");
            }
            for (from, to, slot) in edges {
                let (from, to) = (from % n, to % n);
                if from == to {
                    continue;
                }
                let input = if slot == 0 { "in1" } else { "in2" };
                let _ = g.connect(from, "out", to, input);
            }

            let unit = generate(&g, &registry(), OSL_TARGET, &options()).unwrap();
            let last_shader = *line_index(&unit, "shader ").last().unwrap();
            for idx in line_index(&unit, "connect ") {
                prop_assert!(idx > last_shader);
            }
            prop_assert_eq!(line_index(&unit, "shader ").len(), n);
        }
    }
}
