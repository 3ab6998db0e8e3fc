//! Liveness of the stable set, without talking the memo protocol.

use std::collections::HashSet;

use futures::FutureExt;

use crate::error::OperationError;
use crate::suite::{check, BehaviorSuite, ClientView, Operation, SuiteRequirements};

/// Checks that every stable node answers and that the stable set is a
/// well-formed slice of one cluster. Runs against any launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReachabilitySuite;

impl BehaviorSuite for ReachabilitySuite {
    fn name(&self) -> &str {
        "reachability"
    }

    fn requirements(&self) -> SuiteRequirements {
        SuiteRequirements::stable_nodes(1)
    }

    fn operations(&self) -> Vec<Operation> {
        vec![
            Operation::new("stable_nodes_answer", |view| stable_nodes_answer(view).boxed()),
            Operation::new("stable_set_well_formed", |view| {
                async move { stable_set_well_formed(view) }.boxed()
            }),
        ]
    }
}

async fn stable_nodes_answer(view: &ClientView) -> Result<(), OperationError> {
    for node in view.stable_nodes() {
        check::ensure(
            view.probe(node).await,
            format!("stable node {} at {} unreachable", node.id, node.address),
        )?;
    }
    Ok(())
}

fn stable_set_well_formed(view: &ClientView) -> Result<(), OperationError> {
    let nodes = view.stable_nodes().nodes();
    check::ensure(!nodes.is_empty(), "stable set is empty")?;

    for node in nodes {
        check::ensure_eq(node.id.cluster, view.cluster_id(), "node belongs to cluster")?;
    }
    check::ensure(
        nodes.windows(2).all(|pair| pair[0].id < pair[1].id),
        "stable set ordered by ascending id",
    )?;

    let mut seen = HashSet::new();
    for node in nodes {
        check::ensure(
            seen.insert(node.address.as_str()),
            format!("address {} shared by two stable nodes", node.address),
        )?;
    }
    Ok(())
}
