//! Benchmarks for loading, serializing and the Flate filter

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use pdf_engine::{Dictionary, Document, Filter, PageCoordinator, PageTask, SaveOptions};

/// Content that compresses about as well as real page text
fn page_content(page: usize) -> Vec<u8> {
    let mut content = Vec::new();
    for line in 0..60 {
        content.extend_from_slice(
            format!("BT /F1 10 Tf 72 {} Td (Page {} line {} of sample text) Tj ET\n", 760 - line * 12, page, line)
                .as_bytes(),
        );
    }
    content
}

fn build_document(pages: usize) -> Document {
    let mut document = Document::new();
    for i in 0..pages {
        if document.add_page(Dictionary::new()).is_err() || document.set_page_contents(i, page_content(i)).is_err() {
            break;
        }
    }
    document
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    for pages in [10, 100] {
        let Ok(data) = build_document(pages).save(&SaveOptions::default().with_compression(true)) else {
            continue;
        };
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("pages", pages), &data, |b, data| {
            b.iter(|| {
                let document = Document::load(black_box(data)).ok()?;
                let last = document.page_count().ok()?.checked_sub(1)?;
                let contents = document.get_page(last).and_then(|page| page.contents()).ok();
                contents
            })
        });
    }
    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let document = build_document(50);
    let mut group = c.benchmark_group("save");
    group.bench_function("plain", |b| b.iter(|| document.save(black_box(&SaveOptions::default()))));
    group.bench_function("compressed_object_streams", |b| {
        let options = SaveOptions::default().with_compression(true).with_object_streams(true);
        b.iter(|| document.save(black_box(&options)))
    });
    group.finish();
}

fn bench_flate(c: &mut Criterion) {
    let mut group = c.benchmark_group("flate");
    for size in [4 * 1024, 256 * 1024] {
        let data: Vec<u8> = page_content(0).into_iter().cycle().take(size).collect();
        let Ok(encoded) = Filter::FlateDecode.encode(&data, None) else {
            continue;
        };
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &data, |b, data| {
            b.iter(|| Filter::FlateDecode.encode(black_box(data), None))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| Filter::FlateDecode.decode(black_box(encoded), None))
        });
    }
    group.finish();
}

fn bench_workers(c: &mut Criterion) {
    let document = build_document(64);
    let Ok(snapshots) = PageCoordinator::new(1).snapshots(&document) else {
        return;
    };
    let mut group = c.benchmark_group("page_compress");
    for workers in [1, 4] {
        let coordinator = PageCoordinator::new(workers);
        group.bench_with_input(BenchmarkId::new("workers", workers), &snapshots, |b, snapshots| {
            b.iter(|| coordinator.run(snapshots.clone(), PageTask::CompressContents))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_load, bench_save, bench_flate, bench_workers);
criterion_main!(benches);
