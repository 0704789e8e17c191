use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array3, ArrayD};
use rand::prelude::*;
use rand::rng;
use rust_ctc_lib::{ctc_loss, CtcOptions};

// Helper function to create a random activation batch
fn create_random_acts(t: usize, n: usize, a: usize) -> ArrayD<f32> {
    let mut rng_instance = rng();
    let data: Vec<f32> = (0..t * n * a)
        .map(|_| rng_instance.random::<f32>() * 4.0 - 2.0)
        .collect();
    Array3::from_shape_vec((t, n, a), data).unwrap().into_dyn()
}

fn create_random_labels(batch: usize, label_len: usize, alphabet: usize) -> (Vec<i32>, Vec<i32>) {
    let mut rng_instance = rng();
    let labels: Vec<i32> = (0..batch * label_len)
        .map(|_| rng_instance.random_range(1..alphabet as i32))
        .collect();
    let lens = vec![label_len as i32; batch];
    (labels, lens)
}

fn bench_ctc_loss(c: &mut Criterion) {
    let cases = [
        (50, 4, 20, 10, "T50_N4_A20_L10"),
        (150, 16, 50, 40, "T150_N16_A50_L40"),
    ];

    let mut group = c.benchmark_group("ctc_loss");
    for (t, n, a, l, name) in cases.iter() {
        let acts = create_random_acts(*t, *n, *a);
        let (labels, ys) = create_random_labels(*n, *l, *a);
        let xs = vec![*t as i32; *n];
        let opts = CtcOptions::default();
        group.bench_function(*name, |bencher| {
            bencher.iter(|| {
                let out = ctc_loss(
                    black_box(acts.view()),
                    black_box(&labels),
                    black_box(&xs),
                    black_box(&ys),
                    &opts,
                )
                .unwrap();
                black_box(out)
            })
        });
    }
    group.finish();
}

fn bench_ctc_loss_single_thread(c: &mut Criterion) {
    let acts = create_random_acts(150, 16, 50);
    let (labels, ys) = create_random_labels(16, 40, 50);
    let xs = vec![150; 16];
    let opts = CtcOptions {
        num_threads: Some(1),
        ..CtcOptions::default()
    };
    c.bench_function("ctc_loss_single_thread_T150_N16_A50_L40", |bencher| {
        bencher.iter(|| {
            let out = ctc_loss(
                black_box(acts.view()),
                black_box(&labels),
                black_box(&xs),
                black_box(&ys),
                &opts,
            )
            .unwrap();
            black_box(out)
        })
    });
}

criterion_group!(benches, bench_ctc_loss, bench_ctc_loss_single_thread);
criterion_main!(benches);
