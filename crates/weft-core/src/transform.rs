//! Single- and multi-input transforms: `map`, `flat_map`, and friends.

use futures::future::BoxFuture;

use crate::decider::Decider;
use crate::error::EvalResult;
use crate::node::{EdgeKind, JoinEdge, Node, Parts, Payload, Settled};

impl<T: Payload> Node<T> {
    /// Internal transform scaffold: one source edge, body sees the source's
    /// full settlement.
    fn transform_node<U, Op>(&self, name: String, kind: EdgeKind, decider: Option<Decider>, op: Op) -> Node<U>
    where
        U: Payload,
        Op: FnOnce(Settled<T>) -> BoxFuture<'static, Settled<U>> + Send + 'static,
    {
        let source = self.clone();
        let mut parts = Parts::new(
            name,
            Box::new(move || op(source.settled_value())),
        );
        parts.can_emit_null = true;
        parts.join = vec![JoinEdge {
            label: "source".into(),
            kind,
            node: self.to_ref(),
        }];
        parts.decider = decider;
        Node::from_parts(parts)
    }

    /// Map this node's value through `f`. On failure of this node, the result
    /// node fails with the same error; a vacant source yields a vacant result
    /// without invoking `f`.
    pub fn map<U, F>(&self, name: impl Into<String>, f: F) -> Node<U>
    where
        U: Payload,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.map_gated(None, name, f)
    }

    /// Like [`map`](Node::map), with a decider gate: when the decider is off
    /// the result is vacant and `f` is not invoked.
    pub fn map_gated<U, F>(&self, decider: impl Into<Option<Decider>>, name: impl Into<String>, f: F) -> Node<U>
    where
        U: Payload,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.transform_node(name.into(), EdgeKind::Tolerant, decider.into(), move |settled| {
            Box::pin(std::future::ready(
                settled.map(|opt| opt.map(|v| f(&v))),
            ))
        })
    }

    /// Like [`map`](Node::map), but `f` returns a deferred value that becomes
    /// the result. Failures of the returned future propagate untouched.
    pub fn flat_map<U, F, Fut>(&self, name: impl Into<String>, f: F) -> Node<U>
    where
        U: Payload,
        F: FnOnce(&T) -> Fut + Send + 'static,
        Fut: Future<Output = EvalResult<U>> + Send + 'static,
    {
        self.flat_map_gated(None, name, f)
    }

    /// [`flat_map`](Node::flat_map) behind a decider gate.
    pub fn flat_map_gated<U, F, Fut>(
        &self,
        decider: impl Into<Option<Decider>>,
        name: impl Into<String>,
        f: F,
    ) -> Node<U>
    where
        U: Payload,
        F: FnOnce(&T) -> Fut + Send + 'static,
        Fut: Future<Output = EvalResult<U>> + Send + 'static,
    {
        self.transform_node(name.into(), EdgeKind::Tolerant, decider.into(), move |settled| {
            Box::pin(async move {
                match settled {
                    Ok(Some(v)) => f(&v).await.map(Some),
                    Ok(None) => Ok(None),
                    Err(err) => Err(err),
                }
            })
        })
    }

    /// Map only when this node succeeded with a value: failures and vacant
    /// results are absorbed into a vacant result and `f` is not invoked.
    pub fn map_on_success<U, F>(&self, name: impl Into<String>, f: F) -> Node<U>
    where
        U: Payload,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.transform_node(name.into(), EdgeKind::Shielded, None, move |settled| {
            Box::pin(std::future::ready(match settled {
                Ok(Some(v)) => Ok(Some(f(&v))),
                _ => Ok(None),
            }))
        })
    }

    /// Turn this node into a boolean by testing its settled value. The
    /// predicate observes vacancy as `None`; failure of this node propagates.
    pub fn predicate<F>(&self, name: impl Into<String>, predicate: F) -> Node<bool>
    where
        F: FnOnce(Option<&T>) -> bool + Send + 'static,
    {
        self.transform_node(name.into(), EdgeKind::Tolerant, None, move |settled| {
            Box::pin(std::future::ready(
                settled.map(|opt| Some(predicate(opt.as_ref()))),
            ))
        })
    }

    /// True when this node settles vacant.
    pub fn is_null(&self) -> Node<bool> {
        self.predicate(format!("{}_isNull", self.name()), |v| v.is_none())
    }

    /// True when this node settles with a value.
    pub fn is_not_null(&self) -> Node<bool> {
        self.predicate(format!("{}_isNotNull", self.name()), |v| v.is_some())
    }
}

macro_rules! nary_maps {
    ($map_fn:ident, $flat_fn:ident, $(($ty:ident, $var:ident, $slot:literal)),+) => {
        /// N-ary map: a dedicated node over anonymous slots that applies the
        /// function once every input has settled with a value. Any input
        /// failure propagates.
        pub fn $map_fn<Out, $($ty,)+ F>(
            name: impl Into<String>,
            $($var: &Node<$ty>,)+
            f: F,
        ) -> Node<Out>
        where
            Out: Payload,
            $($ty: Payload,)+
            F: FnOnce($($ty,)+) -> Out + Send + 'static,
        {
            let name: String = name.into();
            $(let $var = $var.clone();)+
            let join = vec![$(JoinEdge {
                label: $slot.into(),
                kind: EdgeKind::Required,
                node: $var.to_ref(),
            },)+];
            let mut parts = Parts::new(
                name,
                Box::new(move || {
                    Box::pin(async move {
                        $(let $var = $var.settled_required($slot)?;)+
                        Ok(Some(f($($var,)+)))
                    })
                }),
            );
            parts.can_emit_null = true;
            parts.join = join;
            Node::from_parts(parts)
        }

        /// N-ary flat-map: like the map form, but the function returns a
        /// deferred value that becomes the result.
        pub fn $flat_fn<Out, $($ty,)+ F, Fut>(
            name: impl Into<String>,
            $($var: &Node<$ty>,)+
            f: F,
        ) -> Node<Out>
        where
            Out: Payload,
            $($ty: Payload,)+
            F: FnOnce($($ty,)+) -> Fut + Send + 'static,
            Fut: Future<Output = EvalResult<Out>> + Send + 'static,
        {
            let name: String = name.into();
            $(let $var = $var.clone();)+
            let join = vec![$(JoinEdge {
                label: $slot.into(),
                kind: EdgeKind::Required,
                node: $var.to_ref(),
            },)+];
            let mut parts = Parts::new(
                name,
                Box::new(move || {
                    Box::pin(async move {
                        $(let $var = $var.settled_required($slot)?;)+
                        f($($var,)+).await.map(Some)
                    })
                }),
            );
            parts.can_emit_null = true;
            parts.join = join;
            Node::from_parts(parts)
        }
    };
}

nary_maps!(map2, flat_map2, (A, a, "dep0"), (B, b, "dep1"));
nary_maps!(map3, flat_map3, (A, a, "dep0"), (B, b, "dep1"), (C, c, "dep2"));
nary_maps!(
    map4,
    flat_map4,
    (A, a, "dep0"),
    (B, b, "dep1"),
    (C, c, "dep2"),
    (D, d, "dep3")
);
nary_maps!(
    map5,
    flat_map5,
    (A, a, "dep0"),
    (B, b, "dep1"),
    (C, c, "dep2"),
    (D, d, "dep3"),
    (E, e, "dep4")
);
nary_maps!(
    map6,
    flat_map6,
    (A, a, "dep0"),
    (B, b, "dep1"),
    (C, c, "dep2"),
    (D, d, "dep3"),
    (E, e, "dep4"),
    (F2, g, "dep5")
);
nary_maps!(
    map7,
    flat_map7,
    (A, a, "dep0"),
    (B, b, "dep1"),
    (C, c, "dep2"),
    (D, d, "dep3"),
    (E, e, "dep4"),
    (F2, g, "dep5"),
    (G2, h, "dep6")
);
nary_maps!(
    map8,
    flat_map8,
    (A, a, "dep0"),
    (B, b, "dep1"),
    (C, c, "dep2"),
    (D, d, "dep3"),
    (E, e, "dep4"),
    (F2, g, "dep5"),
    (G2, h, "dep6"),
    (H2, i, "dep7")
);
