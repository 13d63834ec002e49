use criterion::{criterion_group, criterion_main, Criterion};
use std::fmt::Write;

use maildir_restore::config::Filters;
use maildir_restore::index::MetadataIndex;
use maildir_restore::parser::listing::ListingFormat;

/// A detail listing with `users` users, four mailboxes each.
fn synthetic_listing(users: usize, files_per_mailbox: usize) -> String {
    let mut text = String::new();
    for u in 0..users {
        for folder in ["", ".Sent/", ".Trash/", ".Lists.rust/"] {
            for f in 0..files_per_mailbox {
                let _ = writeln!(
                    text,
                    "-rw------- 1 user{u} users {} Jan 15 03:00 ./user{u}/Maildir/{folder}cur/17368{f:05}.M{f}P{u}.mail:2,S",
                    1000 + f
                );
            }
        }
    }
    text
}

fn bench_index_build(c: &mut Criterion) {
    let text = synthetic_listing(20, 500);
    let filters = Filters::match_all();

    c.bench_function("build_index_40k_lines", |b| {
        b.iter(|| {
            MetadataIndex::from_lines("2025-01-15.mail", &text, ListingFormat::Details, &filters)
                .unwrap()
        })
    });
}

fn bench_plan(c: &mut Criterion) {
    let text = synthetic_listing(20, 500);
    let index = MetadataIndex::from_lines(
        "2025-01-15.mail",
        &text,
        ListingFormat::Details,
        &Filters::match_all(),
    )
    .unwrap();

    c.bench_function("plan_40k_files", |b| {
        b.iter(|| maildir_restore::planner::plan(&index, 32767).unwrap())
    });
}

criterion_group!(benches, bench_index_build, bench_plan);
criterion_main!(benches);
