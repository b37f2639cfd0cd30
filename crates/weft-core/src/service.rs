//! Remote-service call adapter: any asynchronous callable as a node.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EvalResult;
use crate::kind::short_type_name;
use crate::node::{EdgeKind, JoinEdge, Node, Parts, Payload};

/// An asynchronous request/response callable. The engine treats the call like
/// any other node body: its failure settles the node's promise.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    type Req: Payload;
    type Resp: Payload;

    /// Service name used in node display names.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    async fn call(&self, request: Self::Req) -> EvalResult<Self::Resp>;
}

/// Build a node that invokes `service` with the settled request.
///
/// The node is null-admissible: a vacant request declines the call and the
/// node settles vacant, which lets request construction double as a gate.
pub fn call_service<S: Service>(service: Arc<S>, request: &Node<S::Req>) -> Node<S::Resp> {
    let name = format!("Service[{}]", service.name());
    let display_name = name.clone();
    let source = request.clone();
    let mut parts = Parts::new(
        name,
        Box::new(move || {
            Box::pin(async move {
                match source.settled_value()? {
                    Some(req) => service.call(req).await.map(Some),
                    None => {
                        debug!(node = %display_name, "no request built; declining service call");
                        Ok(None)
                    }
                }
            })
        }),
    );
    parts.can_emit_null = true;
    parts.join = vec![JoinEdge {
        label: "request".into(),
        kind: EdgeKind::Tolerant,
        node: request.to_ref(),
    }];
    Node::from_parts(parts)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::EvalError;
    use crate::value::{fail, no_value, value};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Service for Echo {
        type Req = String;
        type Resp = String;

        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, request: String) -> EvalResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request == "boom" {
                return Err(EvalError::new("echo exploded"));
            }
            Ok(format!("echo:{request}"))
        }
    }

    #[tokio::test]
    async fn calls_with_the_settled_request() {
        let service = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let node = call_service(service.clone(), &value("hi".to_string()));
        assert_eq!(node.apply().await.unwrap().as_deref(), Some("echo:hi"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(node.name().starts_with("Service[echo]"));
    }

    #[tokio::test]
    async fn vacant_request_declines_the_call() {
        let service = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let node = call_service(service.clone(), &no_value::<String>());
        assert_eq!(node.apply().await.unwrap(), None);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn service_and_request_failures_propagate() {
        let service = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let node = call_service(service.clone(), &value("boom".to_string()));
        assert_eq!(node.apply().await, Err(EvalError::new("echo exploded")));

        let err = EvalError::new("request build failed");
        let node = call_service(service, &fail::<String>(err.clone()));
        assert_eq!(node.apply().await, Err(err));
    }
}
