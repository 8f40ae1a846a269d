//! Shading graphs built from node instances.
//!
//! Nodes live in an arena (`Vec<ShaderNode>`) and refer to each other by index.
//! The stored order is the order nodes were added, which is *not* a dependency
//! order: an instance is added before the upstream instances it pulls in.

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow, bail};

use crate::{library::LibraryDocument, value::Value};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Published on the graph interface rather than wired inside the graph.
    Boundary,
    /// Output `output` of node `node`.
    Node { node: NodeId, output: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderInput {
    pub name: String,
    pub port_type: String,
    pub value: Option<Value>,
    /// The input keeps the value the definition binds by default.
    pub is_default: bool,
    pub connection: Option<Connection>,
}

impl ShaderInput {
    /// Unconnected input carrying `value`.
    pub fn literal(name: &str, port_type: &str, value: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            port_type: port_type.to_string(),
            value,
            is_default: false,
            connection: None,
        }
    }

    /// Input published on the graph interface.
    pub fn published(name: &str, port_type: &str, value: Option<Value>) -> Self {
        Self {
            connection: Some(Connection::Boundary),
            ..Self::literal(name, port_type, value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderOutput {
    pub name: String,
    pub port_type: String,
    /// Owning node.
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderNode {
    pub name: String,
    pub nodedef: String,
    pub inputs: Vec<ShaderInput>,
    pub outputs: Vec<ShaderOutput>,
}

impl ShaderNode {
    pub fn input(&self, name: &str) -> Option<&ShaderInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    /// Pull in the instances wired into the root through `nodename`. When off,
    /// such inputs are published on the graph interface instead.
    pub add_upstream_dependencies: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadingGraph {
    pub name: String,
    nodes: Vec<ShaderNode>,
}

impl ShadingGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[ShaderNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &ShaderNode {
        &self.nodes[id]
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn add_node(&mut self, name: &str, nodedef: &str) -> Result<NodeId> {
        if self.find(name).is_some() {
            bail!("duplicate node name in graph {}: {name}", self.name);
        }
        self.nodes.push(ShaderNode {
            name: name.to_string(),
            nodedef: nodedef.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn add_input(&mut self, node: NodeId, input: ShaderInput) {
        self.nodes[node].inputs.push(input);
    }

    pub fn add_output(&mut self, node: NodeId, name: &str, port_type: &str) {
        self.nodes[node].outputs.push(ShaderOutput {
            name: name.to_string(),
            port_type: port_type.to_string(),
            node,
        });
    }

    /// Resolve a connection to the output it refers to. `None` for boundary
    /// connections.
    pub fn source_output(&self, connection: &Connection) -> Option<&ShaderOutput> {
        match connection {
            Connection::Boundary => None,
            Connection::Node { node, output } => self.nodes.get(*node)?.outputs.get(*output),
        }
    }

    /// Wire `from.output` into `to.input`, replacing any boundary binding.
    pub fn connect(&mut self, from: NodeId, output: &str, to: NodeId, input: &str) -> Result<()> {
        let out_idx = self
            .nodes
            .get(from)
            .and_then(|n| n.output_index(output))
            .ok_or_else(|| anyhow!("no output {output} on node #{from} in graph {}", self.name))?;
        let graph_name = self.name.clone();
        let dst = self
            .nodes
            .get_mut(to)
            .ok_or_else(|| anyhow!("no node #{to} in graph {graph_name}"))?;
        let dst_name = dst.name.clone();
        let slot = dst
            .inputs
            .iter_mut()
            .find(|i| i.name == input)
            .ok_or_else(|| anyhow!("no input {input} on node {dst_name}"))?;
        if let Some(Connection::Node { .. }) = slot.connection {
            bail!("input {dst_name}.{input} is already connected");
        }
        slot.connection = Some(Connection::Node {
            node: from,
            output: out_idx,
        });
        Ok(())
    }

    /// Build the graph rooted at the document instance `instance_name`.
    pub fn from_instance(
        doc: &LibraryDocument,
        instance_name: &str,
        options: &GraphOptions,
    ) -> Result<ShadingGraph> {
        let mut graph = ShadingGraph::new(instance_name);
        let mut visiting: HashSet<String> = HashSet::new();
        graph.add_instance(doc, instance_name, options, &mut visiting)?;
        Ok(graph)
    }

    fn add_instance(
        &mut self,
        doc: &LibraryDocument,
        name: &str,
        options: &GraphOptions,
        visiting: &mut HashSet<String>,
    ) -> Result<NodeId> {
        if visiting.contains(name) {
            bail!("cycle detected while instantiating node {name}");
        }
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        visiting.insert(name.to_string());

        let instance = doc
            .node_instance(name)
            .ok_or_else(|| anyhow!("node not found: {name}"))?;
        let nodedef = doc
            .nodedef(&instance.nodedef)
            .ok_or_else(|| anyhow!("node {name} references missing definition {}", instance.nodedef))?;

        let id = self.add_node(name, &nodedef.name)?;
        for out in &nodedef.outputs {
            self.add_output(id, &out.name, &out.port_type);
        }

        for unknown in instance
            .inputs
            .iter()
            .filter(|i| !nodedef.inputs.iter().any(|p| p.name == i.name))
        {
            log::warn!(
                "[graph] node {name} sets input {} unknown to {}; ignored",
                unknown.name,
                nodedef.name
            );
        }

        for port in &nodedef.inputs {
            let binding = instance.inputs.iter().find(|i| i.name == port.name);

            if let Some(upstream) = binding
                .and_then(|b| b.nodename.as_deref())
                .filter(|_| options.add_upstream_dependencies)
            {
                let up = self.add_instance(doc, upstream, options, visiting)?;
                let requested = binding.and_then(|b| b.output.as_deref());
                let up_node = &self.nodes[up];
                let output = match requested {
                    Some(o) => up_node
                        .output_index(o)
                        .ok_or_else(|| anyhow!("node {upstream} has no output {o}"))?,
                    None if !up_node.outputs.is_empty() => 0,
                    None => bail!("node {upstream} has no outputs to connect to {name}.{}", port.name),
                };
                self.add_input(
                    id,
                    ShaderInput {
                        name: port.name.clone(),
                        port_type: port.port_type.clone(),
                        value: None,
                        is_default: false,
                        connection: Some(Connection::Node { node: up, output }),
                    },
                );
                continue;
            }

            let override_text = binding.and_then(|b| b.value.as_deref());
            let text = override_text.or(port.value.as_deref());
            let value = text
                .map(|t| Value::parse(&port.port_type, t))
                .transpose()
                .with_context(|| format!("invalid value for input {name}.{}", port.name))?;

            self.add_input(
                id,
                ShaderInput {
                    name: port.name.clone(),
                    port_type: port.port_type.clone(),
                    value,
                    is_default: override_text.is_none() && port.defaultgeomprop.is_some(),
                    connection: Some(Connection::Boundary),
                },
            );
        }

        visiting.remove(name);
        Ok(id)
    }
}
