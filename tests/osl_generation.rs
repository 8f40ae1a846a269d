use std::path::{Path, PathBuf};

use osl_nodes_codegen::{
    codegen::{self, CodegenOptions},
    driver::{DriverConfig, LibraryCodegenDriver},
    graph::{GraphOptions, ShadingGraph},
    library::{self, LibraryDocument, OSL_TARGET},
    oslc::{CompileError, ShaderCompiler},
    search_path::FileSearchPath,
};

struct NoCompiler;

impl ShaderCompiler for NoCompiler {
    fn compile(&self, source: &Path, _search_path: &str) -> Result<PathBuf, CompileError> {
        Ok(source.with_extension("oso"))
    }
}

fn cases_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("cases")
}

fn golden_dir() -> PathBuf {
    cases_root().join("osl_generation")
}

fn load_fixture_library() -> LibraryDocument {
    let search_path = FileSearchPath::from_roots([cases_root().join("mtlx_root")]);
    library::load_libraries(&library::library_folders(&[]), &search_path)
        .unwrap_or_else(|e| panic!("load fixture libraries: {e:#}"))
}

fn check_golden(name: &str, actual: &str, update_goldens: bool) {
    let path = golden_dir().join(format!("{name}.osl"));
    if update_goldens {
        std::fs::write(&path, actual).unwrap_or_else(|e| panic!("write {:?}: {e}", path));
        return;
    }
    let expected =
        std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {:?}: {e}", path));
    assert_eq!(actual, expected, "{name}: golden mismatch");
}

#[test]
fn library_definitions_match_golden_osl() {
    let update_goldens = std::env::var("UPDATE_GOLDENS").is_ok_and(|v| v != "0");
    let mut doc = load_fixture_library();

    let config = DriverConfig {
        prefix: Some("mx".to_string()),
        ..DriverConfig::new(std::env::temp_dir())
    };
    let driver = LibraryCodegenDriver::new(&config, &NoCompiler);

    let mut generated = Vec::new();
    for nodedef in doc.nodedef_names() {
        if doc.resolve_implementation(&nodedef, OSL_TARGET).is_none() {
            continue;
        }
        let instance = osl_nodes_codegen::naming::instance_name(&nodedef, Some("mx"));
        let unit = driver
            .generate_unit(&mut doc, &nodedef, &instance)
            .unwrap_or_else(|f| panic!("{nodedef}: {}", f.message));

        assert_eq!(unit.name, instance);
        check_golden(&instance, &unit.source, update_goldens);
        generated.push(instance);
    }

    assert_eq!(
        generated,
        vec![
            "mx_surface",
            "mx_surfacematerial",
            "mx_standard_surface_surfaceshader",
            "mx_mix_float",
            "mx_image_color3",
            "mx_add_color3",
        ]
    );
    assert!(doc.nodes.is_empty());
}

#[test]
fn wired_instances_defer_connections() {
    let update_goldens = std::env::var("UPDATE_GOLDENS").is_ok_and(|v| v != "0");
    let mut doc = load_fixture_library();
    doc.merge(
        library::load_document_from_path(golden_dir().join("wired_graph.json"))
            .expect("load wired graph"),
    );

    let opts = GraphOptions {
        add_upstream_dependencies: true,
    };
    let graph = ShadingGraph::from_instance(&doc, "add1", &opts).expect("build graph");
    let codegen_opts = CodegenOptions {
        wrapper_mode: false,
        object_search_path: FileSearchPath::from_roots([cases_root().join("mtlx_root/libraries")]),
    };
    let unit = codegen::generate(&graph, &doc, OSL_TARGET, &codegen_opts).expect("generate");
    check_golden("wired_graph", &unit.source, update_goldens);

    let resolved: Vec<&str> = unit.search_path.split(',').collect();
    assert_eq!(resolved.len(), 2);
    assert!(resolved[0].ends_with("stdlib/genosl/mx_add.osl"));
    assert!(resolved[1].ends_with("stdlib/genosl/mx_image_color3.osl"));
    assert!(resolved.iter().all(|p| Path::new(p).is_absolute()));

    let wrapped = codegen::generate(
        &graph,
        &doc,
        OSL_TARGET,
        &CodegenOptions {
            wrapper_mode: true,
            ..codegen_opts
        },
    )
    .expect("generate wrapped");
    let lines: Vec<&str> = wrapped.statements().collect();
    assert_eq!(lines[lines.len() - 2], "shader setCi root ;");
    assert_eq!(lines[lines.len() - 1], "connect image1.out root.color3_input ;");
}

#[test]
fn missing_target_fails_without_text() {
    let mut doc = load_fixture_library();
    doc.add_node_instance("ND_dot_float", "dot1").unwrap();

    let graph =
        ShadingGraph::from_instance(&doc, "dot1", &GraphOptions::default()).expect("build graph");
    let err = codegen::generate(&graph, &doc, OSL_TARGET, &CodegenOptions::default()).unwrap_err();
    assert_eq!(err.node(), Some("dot1"));

    // The same definition resolves for the target it was written for.
    assert!(codegen::generate(&graph, &doc, "genglsl", &CodegenOptions::default()).is_ok());
}
