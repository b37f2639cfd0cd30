//! A mock search pipeline: query the index, hydrate the hits, blend in a
//! per-user score, and assemble a response. Exercises required and optional
//! slots, conditional selection, a service call, and subgraph exposure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use weft_core::{
    Builder, EvalResult, Inputs, Node, NodeKind, NodeRef, Service, Slot, Subgraph, call_service,
    if_then_else, value, value_named,
};

#[derive(Debug, Clone)]
struct SearchRequest {
    query: String,
    user_id: Option<u64>,
    num_results: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct SearchResponse {
    results: Vec<String>,
    user_score: f64,
}

/// Mock user-score lookup, standing in for a remote scoring backend.
struct UserScoreService;

#[async_trait]
impl Service for UserScoreService {
    type Req = u64;
    type Resp = f64;

    fn name(&self) -> &str {
        "user_score"
    }

    async fn call(&self, user_id: u64) -> EvalResult<f64> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok((user_id % 100) as f64 / 100.0)
    }
}

/// Queries the mock index: result ids derived from the query text.
#[derive(Default)]
struct SearchIndex;

const SEARCH_INDEX_SLOTS: &[Slot] = &[Slot::required("query"), Slot::required("num_results")];

#[async_trait]
impl NodeKind for SearchIndex {
    type Output = Vec<u64>;

    fn name(&self) -> &str {
        "SearchIndex"
    }

    fn slots(&self) -> &'static [Slot] {
        SEARCH_INDEX_SLOTS
    }

    async fn evaluate(&self, inputs: &Inputs) -> EvalResult<Option<Vec<u64>>> {
        let query: String = inputs.required("query")?;
        let num_results: usize = inputs.required("num_results")?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let seed = query.bytes().map(u64::from).sum::<u64>();
        Ok(Some((0..num_results as u64).map(|i| seed + i).collect()))
    }
}

/// Hydrates ids into display strings; the prefix is optional.
#[derive(Default)]
struct Hydration;

const HYDRATION_SLOTS: &[Slot] = &[Slot::required("id_list"), Slot::optional("prefix")];

#[async_trait]
impl NodeKind for Hydration {
    type Output = HashMap<u64, String>;

    fn name(&self) -> &str {
        "Hydration"
    }

    fn slots(&self) -> &'static [Slot] {
        HYDRATION_SLOTS
    }

    async fn evaluate(&self, inputs: &Inputs) -> EvalResult<Option<HashMap<u64, String>>> {
        let ids: Vec<u64> = inputs.required("id_list")?;
        let prefix = inputs.optional_or("prefix", "item".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let map = ids
            .into_iter()
            .filter(|id| id % 3 != 0)
            .map(|id| (id, format!("{prefix}:{id}")))
            .collect();
        Ok(Some(map))
    }
}

/// Assembles the final response from ids, hydration, and the user score.
#[derive(Default)]
struct BuildResponse;

const BUILD_RESPONSE_SLOTS: &[Slot] = &[
    Slot::required("user_score"),
    Slot::required("result_ids"),
    Slot::required("hydration_map"),
];

#[async_trait]
impl NodeKind for BuildResponse {
    type Output = SearchResponse;

    fn name(&self) -> &str {
        "BuildResponse"
    }

    fn slots(&self) -> &'static [Slot] {
        BUILD_RESPONSE_SLOTS
    }

    async fn evaluate(&self, inputs: &Inputs) -> EvalResult<Option<SearchResponse>> {
        let user_score: f64 = inputs.required("user_score")?;
        let ids: Vec<u64> = inputs.required("result_ids")?;
        let hydration: HashMap<u64, String> = inputs.required("hydration_map")?;
        let results = ids
            .iter()
            .filter_map(|id| hydration.get(id).cloned())
            .collect();
        Ok(Some(SearchResponse {
            results,
            user_score,
        }))
    }
}

/// The wired pipeline, exposing its response node.
struct SearchGraph {
    pub response: Node<SearchResponse>,
}

impl SearchGraph {
    fn new(request: &Node<SearchRequest>) -> anyhow::Result<Self> {
        // User score lookup is independent of the search itself; users
        // without an id get a fixed default score.
        let user_id = request.map("user_id", |r: &SearchRequest| r.user_id.unwrap_or(0));
        let user_score = if_then_else(
            &request.map("has_user_id", |r: &SearchRequest| r.user_id.is_some()),
            &call_service(Arc::new(UserScoreService), &user_id),
            &value_named(0.0, "default_user_score"),
        );

        let result_ids = Builder::<SearchIndex>::of()
            .depends_on("query", &request.map("query", |r: &SearchRequest| r.query.clone()))
            .depends_on(
                "num_results",
                &request.map("num_results", |r: &SearchRequest| {
                    if r.num_results > 0 { r.num_results } else { 10 }
                }),
            )
            .build()?;

        let hydration_map = Builder::<Hydration>::of()
            .depends_on("id_list", &result_ids)
            .depends_on("prefix", &value_named("cool".to_string(), "prefix"))
            .build()?;

        let response = Builder::<BuildResponse>::of()
            .depends_on("user_score", &user_score)
            .depends_on("result_ids", &result_ids)
            .depends_on("hydration_map", &hydration_map)
            .build()?
            .when(&request.map("has_query", |r: &SearchRequest| !r.query.is_empty()));

        let graph = SearchGraph { response };
        graph.mark_exposed()?;
        Ok(graph)
    }
}

impl Subgraph for SearchGraph {
    fn name(&self) -> &str {
        "SearchGraph"
    }

    fn exposed_nodes(&self) -> Vec<NodeRef> {
        vec![self.response.to_ref()]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let request = value(SearchRequest {
        query: "weft".to_string(),
        user_id: Some(42),
        num_results: 6,
    });
    let graph = SearchGraph::new(&request)?;

    println!("{}", weft_dot::to_dot(&[graph.response.to_ref()]));

    match graph.response.apply().await {
        Ok(Some(response)) => {
            info!(score = response.user_score, "pipeline settled");
            for line in &response.results {
                println!("result: {line}");
            }
        }
        Ok(None) => println!("no response (empty query)"),
        Err(err) => eprintln!("pipeline failed: {err}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str, user_id: Option<u64>) -> Node<SearchRequest> {
        value(SearchRequest {
            query: query.to_string(),
            user_id,
            num_results: 6,
        })
    }

    #[tokio::test]
    async fn full_pipeline_produces_results() {
        let graph = SearchGraph::new(&request("weft", Some(42))).unwrap();
        let response = graph.response.apply().await.unwrap().unwrap();
        assert!(!response.results.is_empty());
        assert!((response.user_score - 0.42).abs() < f64::EPSILON);
        assert!(response.results.iter().all(|r| r.starts_with("cool:")));
    }

    #[tokio::test]
    async fn missing_user_takes_the_default_score_branch() {
        let graph = SearchGraph::new(&request("weft", None)).unwrap();
        let response = graph.response.apply().await.unwrap().unwrap();
        assert_eq!(response.user_score, 0.0);
    }

    #[tokio::test]
    async fn empty_query_suppresses_the_response() {
        let graph = SearchGraph::new(&request("", Some(1))).unwrap();
        assert_eq!(graph.response.apply().await.unwrap(), None);
    }
}
