// SPDX-License-Identifier: MIT

//! Deterministic graph layout
//!
//! Nodes go into columns by their shortest distance from an entry node, are
//! stacked near the average height of their predecessors, and are nudged down
//! until no two boxes overlap. Edge handles are then inferred from the final
//! geometry. There is no randomness; every tie is broken by node id.

use super::types::{Edge, NodeKind, Position, WorkflowDefinition, HANDLE_FALSE, HANDLE_TRUE};
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const NODE_WIDTH: f64 = 240.0;
pub const NODE_HEIGHT: f64 = 120.0;
pub const COLUMN_SPACING: f64 = 320.0;
pub const ROW_HEIGHT: f64 = 160.0;
pub const GRID: f64 = 40.0;
pub const COLLISION_STEP: f64 = 40.0;
pub const MAX_COLLISION_RETRIES: usize = 200;

pub const HANDLE_LEFT: &str = "left";
pub const HANDLE_RIGHT: &str = "right";
pub const HANDLE_TOP: &str = "top";
pub const HANDLE_BOTTOM: &str = "bottom";

/// Shortest edge count from any entry node; unreached nodes get 0
pub fn compute_depths(def: &WorkflowDefinition) -> HashMap<String, usize> {
    let mut depths: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    let mut entries: Vec<&str> = def.entry_nodes().iter().map(|n| n.id.as_str()).collect();
    entries.sort_unstable();
    for id in entries {
        depths.insert(id.to_string(), 0);
        queue.push_back(id.to_string());
    }

    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &def.edges {
        successors
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }
    for targets in successors.values_mut() {
        targets.sort_unstable();
        targets.dedup();
    }

    while let Some(current) = queue.pop_front() {
        let next_depth = depths[&current] + 1;
        let Some(targets) = successors.get(current.as_str()) else {
            continue;
        };
        for target in targets {
            if def.node(target).is_none() {
                continue;
            }
            let improved = depths.get(*target).map_or(true, |d| next_depth < *d);
            if improved {
                depths.insert(target.to_string(), next_depth);
                queue.push_back(target.to_string());
            }
        }
    }

    for node in &def.nodes {
        depths.entry(node.id.clone()).or_insert(0);
    }
    depths
}

/// An edge is a back edge when it does not move to a deeper column
pub fn is_back_edge(edge: &Edge, depths: &HashMap<String, usize>) -> bool {
    let source = depths.get(&edge.source).copied().unwrap_or(0);
    let target = depths.get(&edge.target).copied().unwrap_or(0);
    target <= source
}

fn snap(value: f64) -> f64 {
    (value / GRID).round() * GRID
}

fn overlaps(a: &Position, b: &Position) -> bool {
    a.x < b.x + NODE_WIDTH
        && b.x < a.x + NODE_WIDTH
        && a.y < b.y + NODE_HEIGHT
        && b.y < a.y + NODE_HEIGHT
}

/// Vertical nudge applied to the target of a condition branch
fn branch_offset(def: &WorkflowDefinition, edge: &Edge) -> f64 {
    let from_condition = def
        .node(&edge.source)
        .is_some_and(|n| n.kind == NodeKind::Condition);
    if !from_condition {
        return 0.0;
    }
    match edge.source_handle.as_deref() {
        Some(HANDLE_TRUE) => -ROW_HEIGHT / 2.0,
        Some(HANDLE_FALSE) => ROW_HEIGHT / 2.0,
        _ => 0.0,
    }
}

/// Re-lay-out every node and recompute every non-routing handle
pub fn layout_workflow(def: &mut WorkflowDefinition) {
    let depths = compute_depths(def);

    let mut columns: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for node in &def.nodes {
        columns.entry(depths[&node.id]).or_default().push(node.id.clone());
    }

    let mut desired: HashMap<String, f64> = HashMap::new();
    let mut placed: HashMap<String, Position> = HashMap::new();

    for (depth, ids) in columns.iter_mut() {
        ids.sort();
        let x = *depth as f64 * COLUMN_SPACING;

        for (index, id) in ids.iter().enumerate() {
            let ys: Vec<f64> = def
                .incoming(id)
                .filter(|e| depths.get(&e.source).is_some_and(|d| d < depth))
                .filter_map(|e| placed.get(&e.source).map(|p| p.y + branch_offset(def, e)))
                .collect();
            let y = if ys.is_empty() {
                index as f64 * ROW_HEIGHT
            } else {
                ys.iter().sum::<f64>() / ys.len() as f64
            };
            desired.insert(id.clone(), snap(y));
        }

        let mut order: Vec<&String> = ids.iter().collect();
        order.sort_by(|a, b| {
            desired[*a]
                .total_cmp(&desired[*b])
                .then_with(|| a.cmp(b))
        });

        for id in order {
            let position = place(x, desired[id], &placed);
            placed.insert(id.clone(), position);
        }
    }

    for node in def.nodes.iter_mut() {
        if let Some(position) = placed.get(&node.id) {
            node.position = *position;
        }
    }

    assign_handles(def, &depths, true);
}

/// Slide a box down the grid until it no longer overlaps anything placed
fn place(x: f64, desired_y: f64, placed: &HashMap<String, Position>) -> Position {
    let mut candidate = Position::new(x, desired_y);
    for _ in 0..MAX_COLLISION_RETRIES {
        if !placed.values().any(|p| overlaps(&candidate, p)) {
            return candidate;
        }
        candidate.y += COLLISION_STEP;
    }
    if !placed.values().any(|p| overlaps(&candidate, p)) {
        return candidate;
    }

    let lowest = placed
        .values()
        .filter(|p| (p.x - x).abs() < NODE_WIDTH)
        .map(|p| p.y)
        .fold(f64::NEG_INFINITY, f64::max);
    Position::new(x, snap(lowest + ROW_HEIGHT))
}

fn forward_handles(source: &Position, target: &Position) -> (&'static str, &'static str) {
    let dx = target.x - source.x;
    let dy = target.y - source.y;
    if dx.abs() >= dy.abs() {
        if dx >= 0.0 {
            (HANDLE_RIGHT, HANDLE_LEFT)
        } else {
            (HANDLE_LEFT, HANDLE_RIGHT)
        }
    } else if dy >= 0.0 {
        (HANDLE_BOTTOM, HANDLE_TOP)
    } else {
        (HANDLE_TOP, HANDLE_BOTTOM)
    }
}

/// Fill edge handles from geometry. With `overwrite` false only missing
/// handles are set. Condition routing handles are never touched.
fn assign_handles(def: &mut WorkflowDefinition, depths: &HashMap<String, usize>, overwrite: bool) {
    let positions: HashMap<String, (Position, NodeKind)> = def
        .nodes
        .iter()
        .map(|n| (n.id.clone(), (n.position, n.kind)))
        .collect();

    for edge in def.edges.iter_mut() {
        let (Some((source_pos, source_kind)), Some((target_pos, _))) =
            (positions.get(&edge.source), positions.get(&edge.target))
        else {
            continue;
        };

        let (source_handle, target_handle) = if is_back_edge(edge, depths) {
            (HANDLE_BOTTOM, HANDLE_BOTTOM)
        } else {
            forward_handles(source_pos, target_pos)
        };

        if *source_kind != NodeKind::Condition && (overwrite || edge.source_handle.is_none()) {
            edge.source_handle = Some(source_handle.to_string());
        }
        if overwrite || edge.target_handle.is_none() {
            edge.target_handle = Some(target_handle.to_string());
        }
    }
}

/// Whether positions are unusable: non-finite or overlapping boxes
pub fn needs_layout(def: &WorkflowDefinition) -> bool {
    if def.nodes.iter().any(|n| !n.position.is_finite()) {
        return true;
    }
    def.nodes.iter().enumerate().any(|(i, a)| {
        def.nodes[i + 1..]
            .iter()
            .any(|b| overlaps(&a.position, &b.position))
    })
}

/// Lay out only when needed; otherwise backfill missing handles.
/// Returns true when nodes were moved.
pub fn ensure_layout(def: &mut WorkflowDefinition) -> bool {
    if needs_layout(def) {
        log::debug!("Workflow '{}' needs layout", def.id);
        layout_workflow(def);
        return true;
    }
    let depths = compute_depths(def);
    assign_handles(def, &depths, false);
    false
}
