//! Benchmarks for the element path.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use stagebridge::prelude::*;
use stagebridge::testing::{CollectingOutput, OperatorFixture, StaticEnvironment};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn operator(max_bundle_size: u64) -> ExecutionOperator<u64, u64> {
    let environment = Arc::new(StaticEnvironment::from_fn(|| -> Box<dyn StageBundleFactory<u64, u64>> {
        Box::new(InProcessBundleFactory::new(|wv: WindowedValue<u64>| {
            Ok(vec![(Tag::new("main"), wv.map(|v| v + 1))])
        }))
    }));
    let spec = OperatorFixture::new("main")
        .with_config(OperatorConfig::new().with_max_bundle_size(max_bundle_size))
        .spec()
        .unwrap();
    ExecutionOperator::new(spec, environment, Arc::new(CollectingOutput::<u64>::new())).unwrap()
}

fn bundle_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();

    for size in [1_u64, 100, 1000] {
        c.bench_function(&format!("process_1000_elements_bundle_{size}"), |b| {
            b.iter_batched(
                || operator(size),
                |mut op| {
                    runtime.block_on(async {
                        for v in 0..1000 {
                            op.process_element(WindowedValue::in_global_window(black_box(v)))
                                .await
                                .unwrap();
                        }
                        op.dispose().await.unwrap();
                    });
                },
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(benches, bundle_benchmark);
criterion_main!(benches);
