//! User-facing memo behavior: what a client of the service can observe.

use futures::FutureExt;
use memocheck_core::{MemoClient, NodeInfo};

use crate::error::OperationError;
use crate::suite::{check, BehaviorSuite, ClientView, Operation, SuiteRequirements};

/// Record and look up memoized values, through the same node and through
/// different stable nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserSuite;

impl BehaviorSuite for UserSuite {
    fn name(&self) -> &str {
        "user"
    }

    fn requirements(&self) -> SuiteRequirements {
        SuiteRequirements::stable_nodes(1).with_client()
    }

    fn operations(&self) -> Vec<Operation> {
        vec![
            Operation::new("put_then_get_same_node", |view| {
                put_then_get_same_node(view).boxed()
            }),
            Operation::new("put_then_get_other_node", |view| {
                put_then_get_other_node(view).boxed()
            }),
            Operation::new("overwrite_latest_wins", |view| {
                overwrite_latest_wins(view).boxed()
            }),
            Operation::new("missing_key_absent", |view| missing_key_absent(view).boxed()),
            Operation::new("all_stable_nodes_converge", |view| {
                all_stable_nodes_converge(view).boxed()
            }),
        ]
    }
}

fn key(view: &ClientView, name: &str) -> String {
    format!("user/{}/{}", view.cluster_id(), name)
}

fn first(view: &ClientView) -> Result<&NodeInfo, OperationError> {
    view.stable_nodes()
        .get(0)
        .ok_or_else(|| OperationError::unexpected("empty stable node set"))
}

async fn put(
    view: &ClientView,
    client: &dyn MemoClient,
    key: &str,
    value: &[u8],
) -> Result<(), OperationError> {
    view.retry(move |_| async move {
        client
            .put(key, value.to_vec())
            .await
            .map_err(OperationError::from)
    })
    .await
}

async fn read_back(
    view: &ClientView,
    client: &dyn MemoClient,
    key: &str,
    expected: &[u8],
    superseded: &[Vec<u8>],
) -> Result<(), OperationError> {
    let what = format!("value of {key} at {}", client.address());
    let what = what.as_str();
    view.retry(move |_| async move {
        let actual = client.get(key).await?;
        check::eventually_latest(actual, &expected.to_vec(), superseded, what)
    })
    .await
}

async fn put_then_get_same_node(view: &ClientView) -> Result<(), OperationError> {
    let node = first(view)?;
    let client = view.client(node)?;
    let key = key(view, "same_node");

    put(view, client.as_ref(), &key, b"memo-1").await?;
    read_back(view, client.as_ref(), &key, b"memo-1", &[]).await
}

async fn put_then_get_other_node(view: &ClientView) -> Result<(), OperationError> {
    let writer_node = first(view)?;
    let reader_node = view
        .stable_nodes()
        .other_than(&writer_node.id)
        .unwrap_or(writer_node);
    let writer = view.client(writer_node)?;
    let reader = view.client(reader_node)?;
    let key = key(view, "other_node");

    put(view, writer.as_ref(), &key, b"memo-2").await?;
    read_back(view, reader.as_ref(), &key, b"memo-2", &[]).await
}

async fn overwrite_latest_wins(view: &ClientView) -> Result<(), OperationError> {
    let writer_node = first(view)?;
    let writer = view.client(writer_node)?;
    let key = key(view, "overwrite");

    put(view, writer.as_ref(), &key, b"old").await?;
    put(view, writer.as_ref(), &key, b"new").await?;

    let superseded = [b"old".to_vec()];
    for node in view.stable_nodes() {
        let reader = view.client(node)?;
        read_back(view, reader.as_ref(), &key, b"new", &superseded).await?;
    }
    Ok(())
}

async fn missing_key_absent(view: &ClientView) -> Result<(), OperationError> {
    let key = key(view, "never_written");
    for node in view.stable_nodes() {
        let client = view.client(node)?;
        let key = key.as_str();
        let client = client.as_ref();
        let value = view
            .retry(move |_| async move { client.get(key).await.map_err(OperationError::from) })
            .await?;
        check::ensure_eq(value, None, format!("{key} at {}", node.address))?;
    }
    Ok(())
}

async fn all_stable_nodes_converge(view: &ClientView) -> Result<(), OperationError> {
    let writer_node = first(view)?;
    let writer = view.client(writer_node)?;
    let key = key(view, "converge");

    put(view, writer.as_ref(), &key, b"memo-3").await?;
    for node in view.stable_nodes() {
        let reader = view.client(node)?;
        read_back(view, reader.as_ref(), &key, b"memo-3", &[]).await?;
    }
    Ok(())
}
