//! Schema pipeline benchmarks
//!
//! Run with: cargo bench --package semitexa-core

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use semitexa_core::resource::{FieldBlueprint, RelationBlueprint, RelationTarget, TableBlueprint};
use semitexa_core::schema::state::DbSchemaState;
use semitexa_core::schema::{compare, MySqlType, PkStrategy, RelationKind, SchemaCollector, SyncEngine};
use semitexa_core::value::SourceKind;

fn varchar(property: &str) -> FieldBlueprint {
    FieldBlueprint {
        property: property.into(),
        column: property.into(),
        sql_type: MySqlType::Varchar,
        source_type: "String".into(),
        source_kind: SourceKind::Text,
        nullable: false,
        length: Some(255),
        precision: None,
        scale: None,
        default: None,
        primary_key: None,
        filterable: Some(property.into()),
        deprecated: false,
    }
}

fn pk() -> FieldBlueprint {
    FieldBlueprint {
        property: "id".into(),
        column: "id".into(),
        sql_type: MySqlType::Int,
        source_type: "i64".into(),
        source_kind: SourceKind::Integer,
        nullable: false,
        length: None,
        precision: None,
        scale: None,
        default: None,
        primary_key: Some(PkStrategy::Auto),
        filterable: None,
        deprecated: false,
    }
}

/// A chain of `tables` tables, each pointing at the previous one, each
/// with `columns` filterable varchar columns.
fn collector(tables: usize, columns: usize) -> SchemaCollector {
    let mut collector = SchemaCollector::new();
    for i in 0..tables {
        let name = format!("table_{i}");
        let mut bp = TableBlueprint::new(&name);
        bp.fields.push(pk());
        for c in 0..columns {
            bp.fields.push(varchar(&format!("col_{c}")));
        }
        if i > 0 {
            let parent = format!("table_{}", i - 1);
            bp.fields.push(FieldBlueprint {
                property: "parent_id".into(),
                column: "parent_id".into(),
                sql_type: MySqlType::Int,
                source_type: "i64".into(),
                source_kind: SourceKind::Integer,
                nullable: true,
                length: None,
                precision: None,
                scale: None,
                default: None,
                primary_key: None,
                filterable: None,
                deprecated: false,
            });
            bp.relations.push(RelationBlueprint {
                property: "parent".into(),
                kind: RelationKind::BelongsTo,
                target: RelationTarget::Named { table: parent, pk: "id".into() },
                foreign_key: "parent_id".into(),
                pivot_table: None,
                related_key: None,
                on_delete: None,
                on_update: None,
            });
        }
        collector = collector.register_blueprint(bp);
    }
    collector
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");
    for size in [10usize, 50, 200] {
        let collector = collector(size, 12);
        group.bench_with_input(BenchmarkId::from_parameter(size), &collector, |b, collector| {
            b.iter(|| black_box(collector.collect()));
        });
    }
    group.finish();
}

fn bench_diff_and_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_and_plan");
    for size in [10usize, 50, 200] {
        let declared = collector(size, 12).collect().into_result().unwrap();
        let empty = DbSchemaState::default();
        let ignore = HashSet::new();
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &declared,
            |b, declared| {
                b.iter(|| {
                    let diff = compare(declared, &empty, &ignore);
                    black_box(SyncEngine::build_plan(declared, &diff))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_collect, bench_diff_and_plan);
criterion_main!(benches);
