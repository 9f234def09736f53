//! End-to-end runner tests against a scripted capability: layering,
//! routing overrides, partial-failure semantics, starvation, and output
//! serialization.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use boardflow_core::config::{ModelConfig, RunConfig};
use boardflow_core::traits::LlmClient;
use boardflow_core::types::ResultKind;
use boardflow_graph::{Board, GraphRunner, Router, RunReport, StreamPrinter, Workers};
use boardflow_test_utils::{CannedResponse, ScriptedClient, SharedBuf};

fn model(id: &str) -> ModelConfig {
    ModelConfig {
        provider: "scripted".into(),
        model_id: id.into(),
        api_key: None,
        base_url: None,
        max_tokens: 512,
        temperature: 0.0,
        retry: None,
    }
}

fn runner_for(
    board_json: &str,
    client: &Arc<ScriptedClient>,
    buf: &SharedBuf,
    run_config: RunConfig,
) -> GraphRunner {
    let board = Board::from_json(board_json).expect("test board parses");
    let dyn_client: Arc<dyn LlmClient> = client.clone();
    let router = Router::new(dyn_client.clone(), model("router"));
    let workers = Workers {
        text: (dyn_client.clone(), model("text")),
        vision: (dyn_client, model("vision")),
    };
    let printer = StreamPrinter::new(Box::new(buf.clone()), 120);
    GraphRunner::new(board, router, workers, printer, run_config)
}

async fn run(board_json: &str, client: &Arc<ScriptedClient>, buf: &SharedBuf) -> RunReport {
    runner_for(board_json, client, buf, RunConfig::default())
        .run(CancellationToken::new())
        .await
        .expect("run yields a report")
}

/// Queue `n` identical text routing decisions.
fn route_text(client: &ScriptedClient, n: usize) {
    for _ in 0..n {
        client.push("router", CannedResponse::text(r#"{"used":"text"}"#));
    }
}

#[tokio::test]
async fn diamond_executes_in_dependency_order() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    route_text(&client, 3);
    client.push("text", CannedResponse::text("A findings").with_usage(10, 5));
    client.push("text", CannedResponse::text("B findings").with_usage(12, 6));
    client.push("text", CannedResponse::text("final summary").with_usage(20, 8));

    let report = run(
        r#"{
            "nodes": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "edges": [{"from": "a", "to": "c"}, {"from": "b", "to": "c"}]
        }"#,
        &client,
        &buf,
    )
    .await;

    assert_eq!(report.results.len(), 3);
    assert!(report.unreachable.is_empty());

    // c ran last: its worker prompt lists exactly a and b as predecessors
    let text_calls = client.calls_for("text");
    assert_eq!(text_calls.len(), 3);
    let c_prompt = ScriptedClient::user_prompt(&text_calls[2]);
    assert!(c_prompt.contains("- a (text):"));
    assert!(c_prompt.contains("- b (text):"));
    assert!(c_prompt.contains("A findings") && c_prompt.contains("B findings"));

    // c is terminal: final-summary framing plus the serialized full board
    assert!(c_prompt.contains("final-node summary agent"));
    assert!(c_prompt.contains("# Full board (JSON)"));

    // a and b are sources: payload-only framing
    let a_prompt = ScriptedClient::user_prompt(&text_calls[0]);
    assert!(a_prompt.contains("first-node analysis agent"));
    assert!(a_prompt.contains("# Predecessor outputs\nnone"));

    // usage flows through both stages
    assert_eq!(report.usage_summary.worker_total_tokens, 15 + 18 + 28);
    assert!(report.results["c"].total_tokens > 0);
}

#[tokio::test]
async fn single_node_is_terminal_and_text_despite_router() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    // the router's vision vote is advisory; the terminal rule wins
    client.push("router", CannedResponse::text(r#"{"used":"vision"}"#));
    client.push("text", CannedResponse::text("only node output"));

    let report = run(r#"{"nodes": [{"id": "solo"}], "edges": []}"#, &client, &buf).await;

    assert_eq!(report.results.len(), 1);
    let solo = &report.results["solo"];
    assert_eq!(solo.kind, ResultKind::Text);
    assert_eq!(solo.output, "only node output");
    assert!(client.calls_for("vision").is_empty());
}

#[tokio::test]
async fn image_payload_forces_vision_on_non_terminal_node() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    // router says text for both nodes; the image rule overrides for "pic"
    route_text(&client, 2);
    client.push("vision", CannedResponse::text("a cat on a keyboard"));
    client.push("text", CannedResponse::text("wrap-up"));

    let report = run(
        r#"{
            "nodes": [
                {"id": "pic", "payload": {"imageUrl": "https://x/cat.png"}},
                {"id": "end"}
            ],
            "edges": [{"from": "pic", "to": "end"}]
        }"#,
        &client,
        &buf,
    )
    .await;

    assert_eq!(report.results["pic"].kind, ResultKind::Vision);
    let vision_calls = client.calls_for("vision");
    assert_eq!(vision_calls.len(), 1);
    let pic_prompt = ScriptedClient::user_prompt(&vision_calls[0]);
    assert!(pic_prompt.contains("# Image link\nURL: https://x/cat.png"));
}

#[tokio::test]
async fn router_failure_degrades_one_node_only() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    client.push("router", CannedResponse::request_error("router down"));
    client.push("router", CannedResponse::text(r#"{"used":"text"}"#));
    client.push("text", CannedResponse::text("made it anyway"));

    let report = run(
        r#"{
            "nodes": [{"id": "x"}, {"id": "y"}],
            "edges": [{"from": "x", "to": "y"}]
        }"#,
        &client,
        &buf,
    )
    .await;

    let x = &report.results["x"];
    assert_eq!(x.kind, ResultKind::RoutedError);
    assert_eq!(x.output, "");
    assert!(x.error.as_deref().unwrap_or("").contains("router down"));

    // y still executed and saw x as an empty-output entry, not a missing one
    let y = &report.results["y"];
    assert_eq!(y.output, "made it anyway");
    let y_prompt = ScriptedClient::user_prompt(&client.calls_for("text")[0]);
    assert!(y_prompt.contains("- x (routed-error):"));
}

#[tokio::test]
async fn unparseable_router_decision_is_a_routing_error() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    client.push("router", CannedResponse::text("I refuse to answer"));

    let report = run(r#"{"nodes": [{"id": "n"}], "edges": []}"#, &client, &buf).await;

    assert_eq!(report.results["n"].kind, ResultKind::RoutedError);
    assert!(report.results["n"].error.is_some());
}

#[tokio::test]
async fn worker_failure_records_error_and_descendants_proceed() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    route_text(&client, 2);
    client.push("text", CannedResponse::stream_error("stream reset"));
    client.push("text", CannedResponse::text("downstream fine"));

    let report = run(
        r#"{
            "nodes": [{"id": "broken"}, {"id": "after"}],
            "edges": [{"from": "broken", "to": "after"}]
        }"#,
        &client,
        &buf,
    )
    .await;

    let broken = &report.results["broken"];
    assert_eq!(broken.kind, ResultKind::Text);
    assert_eq!(broken.output, "");
    assert!(broken.error.as_deref().unwrap_or("").contains("stream reset"));

    assert_eq!(report.results["after"].output, "downstream fine");
}

#[tokio::test]
async fn cycle_members_starve_silently_while_rest_completes() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    route_text(&client, 1);
    client.push("text", CannedResponse::text("independent"));

    let report = run(
        r#"{
            "nodes": [{"id": "free"}, {"id": "b"}, {"id": "c"}],
            "edges": [{"from": "b", "to": "c"}, {"from": "c", "to": "b"}]
        }"#,
        &client,
        &buf,
    )
    .await;

    // no crash, no hang; only the reachable node has a result
    assert_eq!(report.results.len(), 1);
    assert!(report.results.contains_key("free"));
    assert_eq!(report.unreachable, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn empty_board_is_a_successful_no_op() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();

    let report = run(r#"{"nodes": [], "edges": []}"#, &client, &buf).await;

    assert!(report.results.is_empty());
    assert!(report.unreachable.is_empty());
    assert_eq!(report.usage_summary.total_tokens, 0);
}

#[tokio::test]
async fn wide_layer_never_loses_or_duplicates_results() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    route_text(&client, 8);

    // 8 independent nodes, all terminal, bounded to 3 concurrent pipelines
    let board = r#"{
        "nodes": [
            {"id": "n0"}, {"id": "n1"}, {"id": "n2"}, {"id": "n3"},
            {"id": "n4"}, {"id": "n5"}, {"id": "n6"}, {"id": "n7"}
        ],
        "edges": []
    }"#;
    let run_config = RunConfig {
        max_concurrency: 3,
        ..RunConfig::default()
    };
    let report = runner_for(board, &client, &buf, run_config)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 8);
    for i in 0..8 {
        assert!(report.results.contains_key(&format!("n{}", i)));
    }
}

#[tokio::test]
async fn concurrent_streams_never_interleave_on_the_sink() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    route_text(&client, 4);
    for _ in 0..4 {
        client.push(
            "text",
            CannedResponse::chunked(&["alpha ", "beta ", "gamma ", "delta"]),
        );
    }

    let report = run(
        r#"{
            "nodes": [{"id": "w"}, {"id": "x"}, {"id": "y"}, {"id": "z"}],
            "edges": []
        }"#,
        &client,
        &buf,
    )
    .await;
    assert_eq!(report.results.len(), 4);

    // four contiguous blocks: between a block's header and its closing
    // blank line no other node's header may appear
    let out = buf.contents();
    let blocks: Vec<&str> = out.split("\n\n").filter(|b| b.contains("=== node=")).collect();
    assert_eq!(blocks.len(), 4);
    for block in blocks {
        assert_eq!(block.matches("=== node=").count(), 1);
        assert!(block.contains("alpha beta gamma delta"));
    }
}

#[tokio::test]
async fn pre_cancelled_run_dispatches_nothing() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = runner_for(
        r#"{"nodes": [{"id": "a"}], "edges": []}"#,
        &client,
        &buf,
        RunConfig::default(),
    )
    .run(cancel)
    .await
    .unwrap();

    assert!(report.results.is_empty());
    assert!(client.calls_for("router").is_empty());
    // cancelled runs report partial results, not starvation
    assert!(report.unreachable.is_empty());
}

#[tokio::test]
async fn mid_layer_cancellation_joins_pipelines_and_stops_dispatch() {
    let client = Arc::new(ScriptedClient::new());
    let buf = SharedBuf::new();
    route_text(&client, 2);
    // both layer-0 workers stream a chunk and then hang until cancelled
    client.push("text", CannedResponse::stalled(&["partial "]));
    client.push("text", CannedResponse::stalled(&["partial "]));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let report = runner_for(
        r#"{
            "nodes": [{"id": "a"}, {"id": "b"}, {"id": "join"}],
            "edges": [{"from": "a", "to": "join"}, {"from": "b", "to": "join"}]
        }"#,
        &client,
        &buf,
        RunConfig::default(),
    )
    .run(cancel)
    .await
    .unwrap();

    // the barrier joined both in-flight pipelines; each carries a
    // node-local cancelled error instead of hanging or vanishing
    assert_eq!(report.results.len(), 2);
    for id in ["a", "b"] {
        let r = &report.results[id];
        assert_eq!(r.output, "");
        assert!(r.error.as_deref().unwrap_or("").contains("cancelled"));
    }

    // the successor layer never formed: only a and b were ever routed
    assert_eq!(client.calls_for("router").len(), 2);
    assert!(!report.results.contains_key("join"));
    // cancelled runs report partial results, not starvation
    assert!(report.unreachable.is_empty());
}
