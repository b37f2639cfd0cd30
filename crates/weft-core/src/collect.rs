//! Collection combinators: fan many nodes into one.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{BuildError, EvalResult};
use crate::node::{EdgeKind, JoinEdge, Node, NodeRef, Parts, Payload};
use crate::slot::DEFAULT_SLOTS;

/// Collect a list of nodes into a node of the list, order preserved. Fails if
/// any element fails; a vacant element is a missing input naming its
/// position.
pub fn collect<T: Payload>(nodes: Vec<Node<T>>) -> Node<Vec<T>> {
    let join = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| JoinEdge {
            label: format!("e{i}"),
            kind: EdgeKind::Required,
            node: node.to_ref(),
        })
        .collect();
    let mut parts = Parts::new(
        format!("collect[{}]", nodes.len()),
        Box::new(move || {
            let out = nodes
                .iter()
                .enumerate()
                .map(|(i, node)| node.settled_required(&format!("e{i}")))
                .collect::<EvalResult<Vec<T>>>()
                .map(Some);
            Box::pin(std::future::ready(out))
        }),
    );
    parts.join = join;
    Node::from_parts(parts)
}

/// Collect a map of nodes into a node of the map with identical keys.
pub fn collect_map<K, V>(nodes: HashMap<K, Node<V>>) -> Node<HashMap<K, V>>
where
    K: Payload + Eq + Hash,
    V: Payload,
{
    let entries: Vec<(K, Node<V>)> = nodes.into_iter().collect();
    let join = entries
        .iter()
        .enumerate()
        .map(|(i, (_, node))| JoinEdge {
            label: format!("k{i}"),
            kind: EdgeKind::Required,
            node: node.to_ref(),
        })
        .collect();
    let mut parts = Parts::new(
        format!("collectMap[{}]", entries.len()),
        Box::new(move || {
            let out = entries
                .iter()
                .enumerate()
                .map(|(i, (key, node))| {
                    node.settled_required(&format!("k{i}"))
                        .map(|value| (key.clone(), value))
                })
                .collect::<EvalResult<HashMap<K, V>>>()
                .map(Some);
            Box::pin(std::future::ready(out))
        }),
    );
    parts.join = join;
    Node::from_parts(parts)
}

/// Apply `f` to each element of the settled list, collecting the per-element
/// node results into an output list that preserves order.
pub fn split_and_collect<A, B, F>(list: &Node<Vec<A>>, name: impl Into<String>, f: F) -> Node<Vec<B>>
where
    A: Payload,
    B: Payload,
    F: Fn(&A) -> Node<B> + Send + 'static,
{
    list.flat_map(name, move |items: &Vec<A>| {
        let parts: Vec<Node<B>> = items.iter().map(&f).collect();
        let gathered = collect(parts);
        async move {
            gathered
                .apply()
                .await
                .map(|value| value.unwrap_or_default())
        }
    })
}

impl<T: Payload> Node<T> {
    /// A node equal to this one, except that it does not settle until every
    /// node in `extras` has also settled. Failures in `extras` do not
    /// propagate.
    pub fn wait_on(
        &self,
        extras: impl IntoIterator<Item = NodeRef>,
    ) -> Result<Node<T>, BuildError> {
        let extras: Vec<NodeRef> = extras.into_iter().collect();
        if extras.len() > DEFAULT_SLOTS.len() {
            return Err(BuildError::TooManyDependencies {
                name: format!("{}_waited", self.name()),
                limit: DEFAULT_SLOTS.len(),
                supplied: extras.len(),
            });
        }

        let mut join = vec![JoinEdge {
            label: "target".into(),
            kind: EdgeKind::Tolerant,
            node: self.to_ref(),
        }];
        join.extend(extras.into_iter().enumerate().map(|(i, node)| JoinEdge {
            label: format!("dep{i}"),
            kind: EdgeKind::Shielded,
            node,
        }));

        let target = self.clone();
        let mut parts = Parts::new(
            format!("{}_waited", self.name()),
            Box::new(move || {
                let settled = target.settled_value();
                Box::pin(std::future::ready(settled))
            }),
        );
        parts.can_emit_null = true;
        parts.join = join;
        Ok(Node::from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::EvalError;
    use crate::value::{fail, value, value_from_supplier};

    #[tokio::test]
    async fn collect_preserves_order() {
        let node = collect(vec![value(1), value(2), value(3)]);
        assert_eq!(node.apply().await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn collect_fails_with_any_element() {
        let err = EvalError::new("element two down");
        let node = collect(vec![value(1), fail::<i32>(err.clone()), value(3)]);
        assert_eq!(node.apply().await, Err(err));
    }

    #[tokio::test]
    async fn collect_map_keeps_keys() {
        let mut input = HashMap::new();
        input.insert("a".to_string(), value(1));
        input.insert("b".to_string(), value(2));
        let node = collect_map(input);
        let out = node.apply().await.unwrap().unwrap();
        assert_eq!(out.get("a"), Some(&1));
        assert_eq!(out.get("b"), Some(&2));
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn split_and_collect_maps_each_element() {
        let list = value(vec![1, 2, 3]);
        let node = split_and_collect(&list, "tenfold", |item: &i32| {
            let item = *item;
            value_from_supplier("tenfold_item", move || item * 10)
        });
        assert_eq!(node.apply().await.unwrap(), Some(vec![10, 20, 30]));
    }

    #[tokio::test]
    async fn wait_on_waits_for_extras_and_ignores_their_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mark = |tag: &'static str| {
            let log = log.clone();
            value_from_supplier(tag, move || {
                log.lock().unwrap().push(tag);
                tag
            })
        };
        let m1 = mark("m1");
        let m2 = mark("m2");
        let broken = fail::<i32>(EvalError::new("extra down"));

        let target_log = log.clone();
        let target = value(999).map("append", move |v: &i32| {
            target_log.lock().unwrap().push("target");
            *v
        });

        let node = target
            .wait_on([m1.to_ref(), m2.to_ref(), broken.to_ref()])
            .unwrap();
        assert_eq!(node.apply().await.unwrap(), Some(999));
        assert_eq!(node.emit().unwrap(), Some(999));

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 3, "all marks and the target ran: {seen:?}");
        assert!(seen.contains(&"m1") && seen.contains(&"m2") && seen.contains(&"target"));
    }

    #[tokio::test]
    async fn wait_on_rejects_too_many_extras() {
        let target = value(1);
        let extras: Vec<_> = (0..17).map(|_| value(0).to_ref()).collect();
        assert!(matches!(
            target.wait_on(extras),
            Err(BuildError::TooManyDependencies { supplied: 17, .. })
        ));
    }
}
