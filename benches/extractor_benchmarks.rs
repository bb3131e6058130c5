use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use pics_sync_service::extractor;
use serde_json::json;

fn sample_record() -> serde_json::Value {
    json!({
        "appinfo": {
            "common": {
                "name": "Example Game",
                "type": "game",
                "developer": "Example Studio",
                "publisher": "Example Publisher",
                "steam_release_date": "1700000000",
                "releasestate": "released",
                "review_score": "8",
                "review_percentage": "86",
                "store_tags": {"0": "1663", "1": "3843", "2": "492"},
                "genres": {"0": "1", "1": "25"},
                "primary_genre": "1",
                "category": {"category_2": "1", "category_22": "1"},
                "oslist": "windows,linux",
                "steam_deck_compatibility": {"category": "3", "test_timestamp": "1700000000"},
                "associations": [{"type": "franchise", "name": "Example Series"}],
                "workshop_visible": "1",
                "isfreeapp": "0"
            },
            "extended": {
                "developer": "Example Studio",
                "publisher": "Example Publisher",
                "listofdlc": "1001,1002,1003"
            },
            "config": {},
            "depots": {
                "branches": {
                    "public": {"timeupdated": "1700000000", "buildid": "9001"}
                }
            }
        }
    })
}

fn benchmark_extract_single(c: &mut Criterion) {
    let record = sample_record();
    let bytes = serde_json::to_vec(&record).unwrap();

    let mut group = c.benchmark_group("extractor");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("extract_one_app", |b| {
        b.iter(|| extractor::extract(std::hint::black_box(730), std::hint::black_box(&record)));
    });

    group.finish();
}

fn benchmark_extract_batch(c: &mut Criterion) {
    let record = sample_record();
    let appids: Vec<u32> = (1..=200).collect();

    c.bench_function("extract_batch_of_200", |b| {
        b.iter(|| {
            for appid in &appids {
                std::hint::black_box(extractor::extract(*appid, &record));
            }
        });
    });
}

criterion_group!(benches, benchmark_extract_single, benchmark_extract_batch);
criterion_main!(benches);
