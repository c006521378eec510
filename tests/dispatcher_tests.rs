use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use routefan::application::Dispatcher;
use routefan::domains::routing::{
    aggregate, encode_query, DiagnosticKind, EngineDescriptor, EngineFailure, EngineInvoker,
    EngineResult, InvocationError, RawEngineOutput, RoadGraph, RouteQuery, PALETTE,
};

#[derive(Clone)]
enum Behavior {
    Answer { stdout: &'static str, stderr: &'static str, delay: Duration },
    Exit(i32),
    /// Honours the deadline like a real backend would.
    Slow,
    /// Never returns; only the dispatcher backstop ends it.
    Hang,
}

struct MockEngine {
    descriptor: EngineDescriptor,
    behavior: Behavior,
    started: Arc<AtomicUsize>,
}

fn engine(name: &str, behavior: Behavior, started: &Arc<AtomicUsize>) -> Arc<dyn EngineInvoker> {
    Arc::new(MockEngine {
        descriptor: EngineDescriptor {
            name: name.to_string(),
            path: format!("/engines/{}", name).into(),
        },
        behavior,
        started: Arc::clone(started),
    })
}

#[async_trait]
impl EngineInvoker for MockEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: Arc<[u8]>, deadline: Instant) -> Result<RawEngineOutput, InvocationError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        assert!(input.starts_with(b"3 2 "));
        match &self.behavior {
            Behavior::Answer { stdout, stderr, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(RawEngineOutput {
                    success: true,
                    exit_code: Some(0),
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: stderr.as_bytes().to_vec(),
                })
            }
            Behavior::Exit(code) => Ok(RawEngineOutput {
                success: false,
                exit_code: Some(*code),
                stdout: Vec::new(),
                stderr: b"no graph for you\n".to_vec(),
            }),
            Behavior::Slow => {
                tokio::time::sleep_until(deadline).await;
                Err(InvocationError::TimedOut)
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn query() -> RouteQuery {
    let mut b = RoadGraph::builder();
    b.add_node(1, 10.0, 50.0).unwrap();
    b.add_node(2, 10.1, 50.1).unwrap();
    b.add_node(3, 10.2, 50.2).unwrap();
    b.add_edge(1, 2).unwrap();
    b.add_edge(2, 3).unwrap();
    RouteQuery::new(Arc::new(b.build()), 1, 3, Duration::from_millis(300)).unwrap()
}

fn answer(stdout: &'static str) -> Behavior {
    Behavior::Answer {
        stdout,
        stderr: "",
        delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn failing_engines_become_diagnostics_without_shifting_colors() {
    let started = Arc::new(AtomicUsize::new(0));
    let q = query();
    let engines = vec![
        engine("a_star", answer("1 2 3"), &started),
        engine("broken", Behavior::Exit(2), &started),
        engine("slow", Behavior::Slow, &started),
        engine("bfs", answer("1 2 3\n"), &started),
        engine("empty", answer(""), &started),
    ];

    let outcomes = Dispatcher::new().run(&encode_query(&q), engines, q.time_budget).await;
    assert_eq!(started.load(Ordering::SeqCst), 5);
    let names: Vec<_> = outcomes.iter().map(|o| o.engine.name.as_str()).collect();
    assert_eq!(names, ["a_star", "broken", "slow", "bfs", "empty"]);
    assert_eq!(outcomes[2].result, EngineResult::TimedOut);

    let aggregation = aggregate(&q.graph, &outcomes);
    assert_eq!(aggregation.routes.len(), 3);
    assert_eq!(aggregation.diagnostics.len(), 2);

    let colors: Vec<_> = aggregation.routes.iter().map(|r| r.color.as_str()).collect();
    assert_eq!(colors, &PALETTE[..3]);
    assert_eq!(aggregation.routes[1].engine, "bfs");
    assert!(aggregation.routes[2].coordinates.is_empty());

    assert_eq!(aggregation.diagnostics[0].engine, "broken");
    assert_eq!(aggregation.diagnostics[0].kind, DiagnosticKind::Failure);
    assert!(aggregation.diagnostics[0].message.contains("no graph for you"));
    assert_eq!(aggregation.diagnostics[1].kind, DiagnosticKind::TimedOut);
}

#[tokio::test]
async fn engines_run_concurrently() {
    let started = Arc::new(AtomicUsize::new(0));
    let q = query();
    let slow_answer = Behavior::Answer {
        stdout: "1 3",
        stderr: "",
        delay: Duration::from_millis(200),
    };
    let engines = (0..4)
        .map(|i| engine(&format!("e{}", i), slow_answer.clone(), &started))
        .collect();

    let begin = Instant::now();
    let outcomes = Dispatcher::new().run(&encode_query(&q), engines, Duration::from_secs(5)).await;
    assert!(begin.elapsed() < Duration::from_millis(700));
    assert!(outcomes
        .iter()
        .all(|o| matches!(&o.result, EngineResult::Success { path, .. } if path == &vec![1, 3])));
}

#[tokio::test]
async fn backstop_abandons_engine_that_ignores_its_deadline() {
    let started = Arc::new(AtomicUsize::new(0));
    let q = query();
    let engines = vec![
        engine("hang", Behavior::Hang, &started),
        engine("ok", answer("1 2"), &started),
    ];

    let dispatcher = Dispatcher::new().with_kill_grace(Duration::from_millis(50));
    let outcomes = dispatcher
        .run(&encode_query(&q), engines, Duration::from_millis(100))
        .await;

    assert_eq!(outcomes[0].result, EngineResult::TimedOut);
    assert!(outcomes[0].elapsed >= Duration::from_millis(100));
    assert!(matches!(outcomes[1].result, EngineResult::Success { .. }));
}

#[tokio::test]
async fn foreign_node_ids_drop_only_that_route() {
    let started = Arc::new(AtomicUsize::new(0));
    let q = query();
    let engines = vec![
        engine("liar", answer("1 99 3"), &started),
        engine("honest", answer("1 2 3"), &started),
        engine("garbled", answer("1 two"), &started),
    ];

    let outcomes = Dispatcher::new().run(&encode_query(&q), engines, q.time_budget).await;
    assert!(matches!(
        outcomes[2].result,
        EngineResult::Failure(EngineFailure::Protocol(_))
    ));

    let aggregation = aggregate(&q.graph, &outcomes);
    assert_eq!(aggregation.routes.len(), 1);
    assert_eq!(aggregation.routes[0].engine, "honest");
    assert_eq!(aggregation.routes[0].color, PALETTE[0]);
    let kinds: Vec<_> = aggregation.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, [DiagnosticKind::Protocol, DiagnosticKind::Protocol]);
}

#[tokio::test]
async fn stderr_on_success_is_kept_as_notes() {
    let started = Arc::new(AtomicUsize::new(0));
    let q = query();
    let engines = vec![engine(
        "chatty",
        Behavior::Answer {
            stdout: "1 2 3",
            stderr: "  visited 3 nodes\n",
            delay: Duration::ZERO,
        },
        &started,
    )];

    let outcomes = Dispatcher::new().run(&encode_query(&q), engines, q.time_budget).await;
    let aggregation = aggregate(&q.graph, &outcomes);
    assert_eq!(aggregation.routes[0].notes, "visited 3 nodes");
}
