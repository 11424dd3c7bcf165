//! End-to-end scenarios: file passthrough, socket handoff across workers,
//! and an iterative application driven by a decider.

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use tideflow::config::{EngineConfig, IoFailurePolicy};
use tideflow::extensions::{AggregatorMap, Decider, FileRotation, IterationDecision};
use tideflow::graph::ApplicationGraph;
use tideflow::orchestrator::{Orchestrator, OrchestratorApi};
use tideflow::record::Record;
use tideflow::types::CommunicationMode;
use tideflow::worker::Worker;

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.multiplexer_poll = std::time::Duration::from_millis(10);
    config.address_poll = std::time::Duration::from_millis(10);
    config
}

/// Scenario A: a single node copies a three-record input file to its
/// output file, order preserved.
#[tokio::test]
async fn single_node_file_passthrough_preserves_order() {
    let orchestrator = Orchestrator::new(fast_config());
    Worker::new(orchestrator.clone(), fast_config())
        .register()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.dat");
    let output = dir.path().join("a.out");
    let records = vec![
        Record::new(json!({"seq": 1})),
        Record::new(json!({"seq": 2})),
        Record::new(json!({"seq": 3})),
    ];
    write_records_file(&input, &records).await;

    let mut graph = ApplicationGraph::new("passthrough", dir.path());
    let only = graph.insert_node(Forward);
    graph.add_source(&only, &input).unwrap();
    graph.add_sink(&only, &output).unwrap();

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);
    wait_for_completion(&orchestrator, "passthrough").await;

    assert_eq!(read_records_file(&output).await, records);
}

/// Scenario B: producer and consumer connected by a socket edge, pinned
/// to different workers by slot budgets. The consumer side's address is
/// resolved by polling, so either worker may wire first.
#[tokio::test]
async fn socket_edge_across_two_workers() {
    let orchestrator = Orchestrator::new(fast_config());
    for _ in 0..2 {
        Worker::new(orchestrator.clone(), fast_config().with_worker_slots(1))
            .register()
            .await
            .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.dat");
    let output = dir.path().join("out.dat");
    let records: Vec<Record> = (0..10).map(|i| Record::new(json!(i))).collect();
    write_records_file(&input, &records).await;

    let mut graph = ApplicationGraph::new("socket-hop", dir.path());
    let producer = graph.insert_node(Forward);
    let consumer = graph.insert_node(Forward);
    graph
        .insert_edge(&producer, &consumer, CommunicationMode::Socket)
        .unwrap();
    graph.add_source(&producer, &input).unwrap();
    graph.add_sink(&consumer, &output).unwrap();

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);
    wait_for_completion(&orchestrator, "socket-hop").await;

    assert_eq!(read_records_file(&output).await, records);
}

/// A file edge between two computation nodes releases the consumer stage
/// only after the producer group reported, through the generated
/// intermediate file.
#[tokio::test]
async fn file_edge_orders_two_waves() {
    let orchestrator = Orchestrator::new(fast_config());
    Worker::new(orchestrator.clone(), fast_config())
        .register()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.dat");
    let output = dir.path().join("out.dat");
    let records = vec![Record::text("wave-one"), Record::text("wave-two")];
    write_records_file(&input, &records).await;

    let mut graph = ApplicationGraph::new("two-waves", dir.path());
    let head = graph.insert_node(Forward);
    let tail = graph.insert_node(Forward);
    graph
        .insert_edge(&head, &tail, CommunicationMode::File)
        .unwrap();
    graph.add_source(&head, &input).unwrap();
    graph.add_sink(&tail, &output).unwrap();

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);
    wait_for_completion(&orchestrator, "two-waves").await;

    assert_eq!(read_records_file(&output).await, records);
}

/// Requests two further iterations, rotating the output file back onto
/// the input path each time.
struct RotatingDecider {
    remaining: AtomicI32,
    rotation: FileRotation,
}

impl Decider for RotatingDecider {
    fn decide(&self, _aggregators: &AggregatorMap) -> IterationDecision {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            self.rotation.rotate().expect("rotate iteration files");
            IterationDecision::RunAgain
        } else {
            IterationDecision::Finished
        }
    }
}

/// Scenario C: a three-iteration application. The decider requests two
/// re-iterations, so the node program runs exactly three times and the
/// intermediate outputs feed back as inputs.
#[tokio::test]
async fn decider_drives_three_iterations() {
    let orchestrator = Orchestrator::new(fast_config());
    Worker::new(orchestrator.clone(), fast_config())
        .register()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ranks.dat");
    let output = dir.path().join("ranks.out");
    let records = vec![Record::new(json!({"vertex": 0, "rank": 1.0}))];
    write_records_file(&input, &records).await;

    let runs = Arc::new(AtomicUsize::new(0));
    let mut graph = ApplicationGraph::new("pagerank-ish", dir.path());
    let only = graph.insert_node(CountingForward::new(runs.clone()));
    graph.add_source(&only, &input).unwrap();
    graph.add_sink(&only, &output).unwrap();
    graph.set_decider(RotatingDecider {
        remaining: AtomicI32::new(2),
        rotation: FileRotation::default().with_move(&output, &input),
    });

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);
    wait_for_completion(&orchestrator, "pagerank-ish").await;

    assert_eq!(runs.load(Ordering::SeqCst), 3, "one run per iteration");
    assert_eq!(read_records_file(&output).await, records);
}

#[tokio::test]
async fn aggregators_and_controllers_are_reachable_while_running() {
    use tideflow::extensions::{Aggregator, Controller};

    struct SumAggregator {
        total: std::sync::atomic::AtomicI64,
    }

    struct EchoController;

    impl Controller for EchoController {
        fn handle(&self, origin: &str, request: serde_json::Value) -> serde_json::Value {
            json!({"origin": origin, "request": request})
        }
    }

    impl Aggregator for SumAggregator {
        fn update(&self, value: serde_json::Value) {
            if let Some(n) = value.as_i64() {
                self.total.fetch_add(n, Ordering::SeqCst);
            }
        }

        fn aggregate(&self) -> serde_json::Value {
            json!(self.total.load(Ordering::SeqCst))
        }
    }

    let orchestrator = Orchestrator::new(fast_config());
    Worker::new(orchestrator.clone(), fast_config())
        .register()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.dat");
    write_records_file(&input, &[Record::text("x")]).await;

    let release = Arc::new(tokio::sync::Notify::new());
    let mut graph = ApplicationGraph::new("aggregated", dir.path());
    let only = graph.insert_node(ParkUntilReleased::new(release.clone()));
    graph.add_source(&only, &input).unwrap();
    graph.add_sink(&only, dir.path().join("out.dat")).unwrap();
    graph.register_aggregator(
        "sum",
        SumAggregator {
            total: std::sync::atomic::AtomicI64::new(0),
        },
    );
    graph.register_controller("echo", EchoController);

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);

    let aggregator = orchestrator
        .obtain_aggregator("aggregated", "sum")
        .await
        .unwrap();
    aggregator.update(json!(4));
    aggregator.update(json!(5));
    assert_eq!(aggregator.aggregate(), json!(9));

    assert!(orchestrator.obtain_aggregator("aggregated", "missing").await.is_err());

    let controller = orchestrator
        .obtain_controller("aggregated", "echo")
        .await
        .unwrap();
    let reply = controller.handle("node-0", json!({"ping": true}));
    assert_eq!(reply["origin"], "node-0");

    release.notify_one();
    wait_for_completion(&orchestrator, "aggregated").await;
}

#[tokio::test]
async fn escalate_policy_turns_program_errors_into_application_abort() {
    let orchestrator = Orchestrator::new(fast_config());
    let worker_config = fast_config().with_io_failure_policy(IoFailurePolicy::Escalate);
    Worker::new(orchestrator.clone(), worker_config)
        .register()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.dat");
    write_records_file(&input, &[Record::text("x")]).await;

    let mut graph = ApplicationGraph::new("doomed", dir.path());
    let only = graph.insert_node(AlwaysFails);
    graph.add_source(&only, &input).unwrap();
    graph.add_sink(&only, dir.path().join("out.dat")).unwrap();

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);

    // The failure summary tears the application down.
    wait_for_completion(&orchestrator, "doomed").await;
}

#[tokio::test]
async fn lenient_policy_lets_program_errors_pass() {
    let orchestrator = Orchestrator::new(fast_config());
    Worker::new(orchestrator.clone(), fast_config())
        .register()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.dat");
    let output = dir.path().join("out.dat");
    write_records_file(&input, &[Record::text("x")]).await;

    let mut graph = ApplicationGraph::new("shrugged", dir.path());
    let only = graph.insert_node(AlwaysFails);
    graph.add_source(&only, &input).unwrap();
    graph.add_sink(&only, &output).unwrap();

    let accepted = orchestrator
        .register_application(graph.finalize().unwrap())
        .await
        .unwrap();
    assert!(accepted);
    wait_for_completion(&orchestrator, "shrugged").await;

    // The sink file exists (opened at wiring time) even though the
    // program under-delivered.
    assert!(output.exists());
}
