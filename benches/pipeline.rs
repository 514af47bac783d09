use criterion::{criterion_group, criterion_main, Criterion};

use mailscrub::address::DomainRewriter;
use mailscrub::config::Config;
use mailscrub::pipeline::{Collaborators, Identity, Pipeline};
use mailscrub::record::{Record, RecordType};

fn collaborators() -> Collaborators {
    Collaborators {
        rewriter: Box::new(DomainRewriter::new("example.com")),
        canonical_map: None,
        sender_canonical_map: None,
        recipient_canonical_map: None,
        virtual_alias_map: None,
        header_checks: None,
        body_checks: None,
    }
}

fn message(recipients: usize, body_lines: usize) -> Vec<Record> {
    let mut records = vec![
        Record::new(RecordType::Time, &b"1700000000"[..]),
        Record::new(RecordType::Sender, &b"alice@example.com"[..]),
    ];
    for i in 0..recipients {
        records.push(Record::new(
            RecordType::Recipient,
            format!("user{i}@example.com").into_bytes(),
        ));
    }
    records.push(Record::new(RecordType::MessageStart, Vec::new()));
    records.push(Record::new(
        RecordType::Normal,
        &b"Subject: benchmark message"[..],
    ));
    records.push(Record::new(RecordType::Normal, Vec::new()));
    for i in 0..body_lines {
        records.push(Record::new(
            RecordType::Normal,
            format!("body line {i} with some typical width of prose text").into_bytes(),
        ));
    }
    records.push(Record::new(RecordType::ExtractedStart, Vec::new()));
    records.push(Record::new(RecordType::End, Vec::new()));
    records
}

fn bench_pipeline(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let records = message(10, 1000);

    c.bench_function("process_10r_1000l", |b| {
        b.iter(|| {
            let output = dir.path().join("queue");
            let mut pipeline = Pipeline::new(
                Config::default(),
                collaborators(),
                Identity {
                    hostname: "mx.example.com".to_string(),
                    queue_id: "BENCHQID".to_string(),
                },
                &output,
            )
            .unwrap();
            for record in &records {
                pipeline.process(record);
            }
            pipeline.finish().unwrap()
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
