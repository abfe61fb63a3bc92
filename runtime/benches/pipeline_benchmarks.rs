//! Request pipeline benchmarks
//!
//! - Bounded queue push/pop
//! - Command draining for responses of increasing size
//! - Wire encoding of a prepared request
//! - End-to-end `Client::execute` over an in-memory transport
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use jxn_core::environment::{Clock, Transport};
use jxn_core::{
    BoundedQueue, CallTarget, CommandSpec, DataBags, RequestContext, RequestHandle, RequestMode,
    RequestSpec, TransportError, WireRequest, WireResponse, json,
};
use jxn_runtime::{Client, ClientConfig, CommandHandlerRegistry, CommandProcessor, Environment, params};
use jxn_testing::{RecordingHost, payload_body, test_clock};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Answers every request with the same body.
struct EchoTransport {
    body: String,
}

impl Transport for EchoTransport {
    fn send(
        &self,
        _request: WireRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WireResponse, TransportError>> + Send + '_>> {
        let response = WireResponse::ok(self.body.clone());
        Box::pin(async move { Ok(response) })
    }
}

fn commands(count: usize) -> Vec<CommandSpec> {
    (0..count)
        .map(|n| CommandSpec::new("node.assign", json!({"id": format!("n{n}"), "value": n})))
        .collect()
}

fn responded(body: &str) -> RequestHandle {
    let mut ctx = RequestContext::new(
        CallTarget::Func {
            name: "bench".to_string(),
        },
        RequestMode::Asynchronous,
        1,
        "/ajax".to_string(),
    );
    ctx.response = Some(WireResponse::ok(body));
    RequestHandle::new(ctx)
}

fn benchmark_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_queue");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("push_pop_1000", |b| {
        let mut queue = BoundedQueue::new(1000);
        b.iter(|| {
            for n in 0..1000u32 {
                queue.push(black_box(n)).expect("capacity");
            }
            while let Some(n) = queue.pop() {
                black_box(n);
            }
        });
    });

    group.finish();
}

fn benchmark_command_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_drain");

    for count in [1usize, 10, 100] {
        let handlers = Arc::new(CommandHandlerRegistry::new());
        handlers.register_fn("node.assign", |args, _ctx| {
            black_box(args);
            Ok(true)
        });
        handlers.register_fn(jxn_core::COMPLETE_COMMAND, |_, _| Ok(true));
        let processor = Arc::new(CommandProcessor::new(handlers, Arc::new(RecordingHost::new()), 1000));
        let body = payload_body(commands(count));

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &body, |b, body| {
            b.iter(|| {
                let request = responded(body);
                processor.process_commands(&request).expect("fits");
            });
        });
    }

    group.finish();
}

fn benchmark_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let config = ClientConfig::default();
    let bags = DataBags::new();
    let now = test_clock().now();

    group.bench_function("post_form", |b| {
        let mut ctx = RequestContext::new(
            CallTarget::Func {
                name: "bench".to_string(),
            },
            RequestMode::Asynchronous,
            1,
            "/ajax".to_string(),
        );
        ctx.args = vec![json!({"user": {"id": 7, "tags": ["a", "b", "c"]}}), json!("text")];
        b.iter(|| params::encode(black_box(&ctx), &config, &bags, now).expect("encodes"));
    });

    group.finish();
}

fn benchmark_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_execute");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("ten_commands", |b| {
        let transport = Arc::new(EchoTransport {
            body: payload_body(commands(10)),
        });
        let client = Client::new(
            ClientConfig::default().with_request_uri("/ajax"),
            Environment::new(transport),
        );
        client.register("node.assign", |_, _| Ok(true));

        b.to_async(&runtime).iter(|| async {
            let _ = client.execute(black_box(RequestSpec::function("bench"))).await;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_queue,
    benchmark_command_drain,
    benchmark_encoding,
    benchmark_execute,
);
criterion_main!(benches);
