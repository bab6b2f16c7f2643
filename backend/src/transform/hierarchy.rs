//! Hierarchy shaper for the sunburst chart.
//!
//! Two levels: procedures, then (procedure, product) pairs. Leaves carry
//! the average margin percentage; a procedure's value is the sum of its
//! leaves.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::ProcedureRecord;

/// Separator between procedure and product in leaf ids.
pub const ID_SEPARATOR: char = '/';

/// Node id for a procedure, or for a product under it.
///
/// Each name has `\` and the separator backslash-escaped, so
/// `("Facial/Botox", "Dysport")` and `("Facial", "Botox/Dysport")` get
/// distinct ids. Names without either character are used as is.
pub fn node_id(procedure: &str, product: Option<&str>) -> String {
    let mut id = escape_id_part(procedure);
    if let Some(product) = product {
        id.push(ID_SEPARATOR);
        id.push_str(&escape_id_part(product));
    }
    id
}

fn escape_id_part(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\\' || c == ID_SEPARATOR {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// How a parent's value is derived from its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyAggregation {
    #[default]
    Sum,
}

/// One slice of the sunburst.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SunburstNode {
    /// [`node_id`] of the procedure, or of the (procedure, product) pair
    pub id: String,
    pub label: String,
    /// Parent id; `None` for procedures
    pub parent: Option<String>,
    pub value: f64,
    /// 1 for procedures, 2 for products
    pub depth: u8,
    /// Text drawn on the slice
    pub text: String,
}

/// Input for the sunburst chart: every procedure node followed by its leaves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SunburstTree {
    pub aggregation: HierarchyAggregation,
    pub nodes: Vec<SunburstNode>,
}

impl SunburstTree {
    pub fn roots(&self) -> impl Iterator<Item = &SunburstNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a SunburstNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent.as_deref() == Some(id))
    }

    pub fn get(&self, id: &str) -> Option<&SunburstNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Leaf for a (procedure, product) pair.
    pub fn leaf(&self, procedure: &str, product: &str) -> Option<&SunburstNode> {
        self.get(&node_id(procedure, Some(product)))
    }
}

/// Slice text: procedures show their label, products add the percentage.
pub fn node_text(label: &str, value: f64, depth: u8) -> String {
    if depth <= 1 {
        label.to_string()
    } else {
        format!("{}\n{:.2}%", label, value)
    }
}

/// Build the procedure → product tree.
///
/// Rows repeating a (procedure, product) pair are summed into one leaf.
/// Order follows first appearance in the view.
pub fn shape_hierarchy<S>(view: &S) -> SunburstTree
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    let mut procedures: Vec<(String, Vec<(String, f64)>)> = Vec::new();
    let mut proc_index: HashMap<&str, usize> = HashMap::new();
    let mut leaf_index: HashMap<(&str, &str), usize> = HashMap::new();

    for record in view.as_ref() {
        let p = *proc_index
            .entry(record.procedure.as_str())
            .or_insert_with(|| {
                procedures.push((record.procedure.clone(), Vec::new()));
                procedures.len() - 1
            });

        let leaves = &mut procedures[p].1;
        let key = (record.procedure.as_str(), record.product.as_str());
        match leaf_index.get(&key) {
            Some(&l) => leaves[l].1 += record.avg_margin_pct,
            None => {
                leaf_index.insert(key, leaves.len());
                leaves.push((record.product.clone(), record.avg_margin_pct));
            }
        }
    }

    let mut nodes = Vec::new();
    for (procedure, leaves) in procedures {
        let total: f64 = leaves.iter().map(|(_, v)| v).sum();
        let parent_id = node_id(&procedure, None);
        nodes.push(SunburstNode {
            id: parent_id.clone(),
            text: node_text(&procedure, total, 1),
            label: procedure.clone(),
            parent: None,
            value: total,
            depth: 1,
        });

        for (product, value) in leaves {
            nodes.push(SunburstNode {
                id: node_id(&procedure, Some(&product)),
                text: node_text(&product, value, 2),
                label: product,
                parent: Some(parent_id.clone()),
                value,
                depth: 2,
            });
        }
    }

    SunburstTree {
        aggregation: HierarchyAggregation::Sum,
        nodes,
    }
}
