use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use jobflow_core::{Job, JobEvent, JobStatus, JobType};
use jobflow_infra::jobs::{InMemoryJobStore, JobStore, JobUpdate};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build runtime")
}

fn seeded_store(rt: &tokio::runtime::Runtime, count: usize, status: JobStatus) -> (InMemoryJobStore, Vec<Job>) {
    let store = InMemoryJobStore::new();
    let jobs: Vec<Job> = (0..count)
        .map(|i| {
            let mut job = Job::new(format!("bench-{i}"), JobType::Process, None);
            job.status = status;
            job
        })
        .collect();
    rt.block_on(async {
        for job in &jobs {
            store.create(job).await.expect("create");
        }
    });
    (store, jobs)
}

/// Guarded write whose guard matches (claim then release, so it stays repeatable).
fn bench_guarded_write_hit(c: &mut Criterion) {
    let rt = runtime();
    let (store, jobs) = seeded_store(&rt, 1, JobStatus::Pending);
    let id = jobs[0].id;

    c.bench_function("guarded_write_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let claim = JobEvent::WorkerClaims;
                let claimed = store
                    .conditional_update_status(id, claim.sources(), claim.target(), JobUpdate::none())
                    .await
                    .expect("claim");
                let released = store
                    .conditional_update_status(id, &[JobStatus::Processing], JobStatus::Pending, JobUpdate::none())
                    .await
                    .expect("release");
                black_box(claimed + released)
            })
        })
    });
}

/// Guarded write rejected by the guard (the duplicate-delivery path).
fn bench_guarded_write_miss(c: &mut Criterion) {
    let rt = runtime();
    let (store, jobs) = seeded_store(&rt, 1, JobStatus::Completed);
    let id = jobs[0].id;
    let cancel = JobEvent::CancelConfirmed;

    c.bench_function("guarded_write_miss", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    store
                        .conditional_update_status(id, cancel.sources(), cancel.target(), JobUpdate::none())
                        .await
                        .expect("write"),
                )
            })
        })
    });
}

fn bench_list_first_page(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("list_first_page");

    for count in [100usize, 1_000, 10_000] {
        let (store, _) = seeded_store(&rt, count, JobStatus::Pending);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| rt.block_on(async { black_box(store.list(1, 10).await.expect("list")) }))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_guarded_write_hit,
    bench_guarded_write_miss,
    bench_list_first_page
);
criterion_main!(benches);
