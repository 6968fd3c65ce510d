use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use fnpack::{
    import_handling::{ImportClassifier, ImportParser},
    markers::{MarkerScanner, MarkerSyntax},
    stdlib_detection::StdlibRegistry,
};

/// A function module with `blocks` transfer blocks after a mixed import section
fn synthetic_module(blocks: usize) -> String {
    let mut source = String::from(
        "# IMPORT_BLOCK_START\n\
         from __future__ import annotations\n\
         import os\n\
         import json, logging as log\n\
         from typing import Any, Optional as Opt\n\
         import boto3\n\
         from requests import Session\n\
         from .shared_configuration import helper\n\
         # DEV_ONLY_BLOCK_START\n\
         import pytest\n\
         # DEV_ONLY_BLOCK_END\n\
         # IMPORT_BLOCK_END\n\n",
    );
    for index in 0..blocks {
        source.push_str(&format!(
            "# BLOCK_{index}_BLOCK_START transfer\n\
             PREFIX_{index} = \"fn_{index}_\"\n\
             def cached_{index}(key: str) -> Any:\n    \
                 return f\"{{PREFIX_{index}}}{{key}}\"\n\
             # BLOCK_{index}_BLOCK_END\n\n"
        ));
    }
    source.push_str("def handler(event, context):\n    return helper()\n");
    source
}

fn benchmark_marker_scanning(c: &mut Criterion) {
    let source = synthetic_module(200);
    let relaxed = MarkerScanner::new(MarkerSyntax::default());
    let strict = MarkerScanner::new(MarkerSyntax::default()).with_orphan_checking(true, false);

    let mut group = c.benchmark_group("marker_scanning");
    group.bench_function("relaxed", |b| {
        b.iter(|| relaxed.scan(black_box(&source)));
    });
    group.bench_function("strict_orphans", |b| {
        b.iter(|| strict.scan(black_box(&source)));
    });
    group.finish();
}

fn benchmark_import_parsing(c: &mut Criterion) {
    let source = synthetic_module(10);
    let parser = ImportParser::new(
        ImportClassifier::new(StdlibRegistry::for_python_version(12)),
        MarkerSyntax::default(),
    );

    c.bench_function("import_parsing", |b| {
        b.iter(|| parser.parse(black_box(&source)));
    });
}

criterion_group!(benches, benchmark_marker_scanning, benchmark_import_parsing);
criterion_main!(benches);
