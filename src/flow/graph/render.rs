// SPDX-License-Identifier: MIT

//! Read-only text renderings of a step registry (Mermaid and Graphviz DOT).
//!
//! Start steps, listeners and routers get distinct node shapes. Plain
//! SINGLE edges are solid; AND/OR edges and router-label edges are dashed and
//! labelled. DOT output pins steps of equal depth to the same rank.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::step_registry::{StepRegistry, TriggerEdge};
use super::types::{Condition, StepKind};

/// A producer -> consumer edge resolved to concrete steps
struct RenderEdge<'a> {
    from: &'a str,
    to: &'a str,
    label: Option<String>,
}

fn resolve_edges<'a>(registry: &'a StepRegistry, edges: &'a [TriggerEdge]) -> Vec<RenderEdge<'a>> {
    let mut out = Vec::new();
    for edge in edges {
        let condition = match edge.condition {
            Condition::Single => None,
            other => Some(other.to_string()),
        };

        if registry.is_label(&edge.producer) {
            for router in registry.routers_for_label(&edge.producer) {
                let label = match &condition {
                    Some(c) => format!("{} {}", edge.producer, c),
                    None => edge.producer.clone(),
                };
                out.push(RenderEdge {
                    from: router,
                    to: &edge.consumer,
                    label: Some(label),
                });
            }
        } else {
            out.push(RenderEdge {
                from: &edge.producer,
                to: &edge.consumer,
                label: condition,
            });
        }
    }
    out
}

/// Mermaid node id: the sanitised name suffixed with the declaration index,
/// so names differing only in punctuation stay distinct nodes
fn node_id(registry: &StepRegistry, name: &str) -> String {
    let base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    match registry.index_of(name) {
        Some(index) => format!("{}_{}", base, index),
        None => base,
    }
}

fn escape(text: &str) -> String {
    text.replace('"', "'")
}

/// Render as a Mermaid flowchart
pub fn to_mermaid(registry: &StepRegistry) -> String {
    let mut out = String::from("flowchart TD\n");

    for step in registry.steps() {
        let id = node_id(registry, &step.name);
        let label = escape(&step.name);
        let _ = match step.kind {
            StepKind::Start => writeln!(out, "    {id}([\"{label}\"])"),
            StepKind::Listener => writeln!(out, "    {id}[\"{label}\"]"),
            StepKind::Router => writeln!(out, "    {id}{{{{\"{label}\"}}}}"),
        };
    }

    let edges = registry.edges();
    for edge in resolve_edges(registry, &edges) {
        let from = node_id(registry, edge.from);
        let to = node_id(registry, edge.to);
        let _ = match edge.label {
            Some(label) => writeln!(out, "    {from} -. \"{}\" .-> {to}", escape(&label)),
            None => writeln!(out, "    {from} --> {to}"),
        };
    }

    out
}

/// Render as a Graphviz digraph
pub fn to_dot(registry: &StepRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(registry.name()));
    out.push_str("    rankdir=TB;\n");

    for step in registry.steps() {
        let shape = match step.kind {
            StepKind::Start => "diamond",
            StepKind::Listener => "box",
            StepKind::Router => "hexagon",
        };
        let _ = writeln!(out, "    \"{}\" [shape={}];", escape(&step.name), shape);
    }

    let levels = registry.levels();
    let mut ranks: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for step in registry.steps() {
        if let Some(&level) = levels.get(&step.name) {
            ranks.entry(level).or_default().push(&step.name);
        }
    }
    for group in ranks.values().filter(|g| g.len() > 1) {
        let members: Vec<String> = group.iter().map(|n| format!("\"{}\";", escape(n))).collect();
        let _ = writeln!(out, "    {{ rank=same; {} }}", members.join(" "));
    }

    let edges = registry.edges();
    for edge in resolve_edges(registry, &edges) {
        let _ = match edge.label {
            Some(label) => writeln!(
                out,
                "    \"{}\" -> \"{}\" [style=dashed, label=\"{}\"];",
                escape(edge.from),
                escape(edge.to),
                escape(&label)
            ),
            None => writeln!(
                out,
                "    \"{}\" -> \"{}\";",
                escape(edge.from),
                escape(edge.to)
            ),
        };
    }

    out.push_str("}\n");
    out
}
