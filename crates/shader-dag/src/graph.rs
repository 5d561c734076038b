//! Emission order of a shader graph.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};

use crate::error::{Result, ShaderError};
use crate::ops::{Node, OpKind};
use crate::pin::OpId;

fn node(nodes: &[Node], id: OpId) -> Result<&Node> {
    match nodes.get(id.index()) {
        Some(node) if !node.removed => Ok(node),
        Some(_) => Err(ShaderError::InvalidGraph(format!("{id} was removed"))),
        None => Err(ShaderError::InvalidGraph(format!("{id} does not exist"))),
    }
}

/// Operations `root` depends on, itself included. Shared producers are visited once.
pub(crate) fn upstream_reachable(nodes: &[Node], root: OpId) -> Result<HashSet<OpId>> {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        stack.extend(node(nodes, id)?.dependencies());
    }
    Ok(visited)
}

/// Producers-first order of every operation reachable from `root`.
///
/// Ties are broken by operation id, so equal graphs always emit identically.
pub(crate) fn sorted_operations(nodes: &[Node], root: OpId) -> Result<Vec<OpId>> {
    let reachable = upstream_reachable(nodes, root)?;

    let mut indeg: HashMap<OpId, usize> = reachable.iter().map(|&id| (id, 0)).collect();
    let mut outgoing: HashMap<OpId, Vec<OpId>> = HashMap::new();
    for &consumer in &reachable {
        let producers: BTreeSet<OpId> = nodes[consumer.index()].dependencies().collect();
        for producer in producers {
            if let Some(d) = indeg.get_mut(&consumer) {
                *d += 1;
            }
            outgoing.entry(producer).or_default().push(consumer);
        }
    }

    let mut ready: BTreeSet<OpId> = indeg
        .iter()
        .filter_map(|(&id, &d)| (d == 0).then_some(id))
        .collect();
    let mut order = Vec::with_capacity(reachable.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for next in outgoing.get(&id).into_iter().flatten() {
            if let Some(d) = indeg.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    if order.len() != reachable.len() {
        return Err(ShaderError::InvalidGraph(
            "cycle detected in shader graph".into(),
        ));
    }
    Ok(order)
}

/// Checks that every closed loop is paired both ways and that values computed inside a loop
/// leave it only through its end.
///
/// An operation reading loop values, directly or through other loop operations, must feed the
/// loop end. Reading them anywhere else would depend on whether the scheduler places the reader
/// before or after the loop.
pub(crate) fn check_loop_scopes(nodes: &[Node]) -> Result<()> {
    let mut consumers: HashMap<OpId, Vec<OpId>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if node.removed {
            continue;
        }
        let consumer = OpId(index as u32);
        let producers: BTreeSet<OpId> = node.dependencies().collect();
        for producer in producers {
            consumers.entry(producer).or_default().push(consumer);
        }
    }

    for (index, end_node) in nodes.iter().enumerate() {
        let Some(begin) = end_node.kind.closed_loop() else {
            continue;
        };
        if end_node.removed {
            continue;
        }
        let end = OpId(index as u32);
        let begin_kind = &node(nodes, begin)?.kind;
        if begin_kind.opened_loop() != Some(Some(end)) || !begin_kind.is_closed_by(&end_node.kind) {
            return Err(ShaderError::InvalidGraph(format!(
                "{end} closes {begin}, which is not its loop"
            )));
        }
    }

    for (index, begin_node) in nodes.iter().enumerate() {
        let Some(Some(end)) = begin_node.kind.opened_loop() else {
            continue;
        };
        if begin_node.removed {
            continue;
        }
        let begin = OpId(index as u32);
        let end_kind = &node(nodes, end)?.kind;
        if end_kind.closed_loop() != Some(begin) || !begin_node.kind.is_closed_by(end_kind) {
            return Err(ShaderError::InvalidGraph(format!(
                "{end} does not close the loop opened by {begin}"
            )));
        }

        let body = upstream_reachable(nodes, end)?;
        let mut visited = HashSet::new();
        let mut stack = vec![begin];
        while let Some(id) = stack.pop() {
            if id == end || !visited.insert(id) {
                continue;
            }
            if id != begin && !body.contains(&id) {
                return Err(ShaderError::InvalidGraph(format!(
                    "{} {id} reads values of the loop opened by {begin} without feeding {end}; \
                     use the results of the loop instead",
                    node(nodes, id)?.kind.name()
                )));
            }
            stack.extend(consumers.get(&id).into_iter().flatten().copied());
        }
    }
    Ok(())
}
