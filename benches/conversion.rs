//! Benchmarks for the conversion pipeline.
//!
//! Run with: cargo bench

use std::fs;
use std::path::{Path, PathBuf};

use criterion::{Criterion, criterion_group, criterion_main};

use ebconv::dom::Query;
use ebconv::toc::from_headings;
use ebconv::{Book, Pipeline, PluginRegistry, UserOptions};

const CHAPTERS: usize = 40;

fn chapter(n: usize) -> String {
    let mut body = format!("<h1>Chapter {n}</h1>");
    for s in 0..5 {
        body.push_str(&format!("<h2>Section {n}.{s}</h2>"));
        for p in 0..20 {
            body.push_str(&format!(
                "<p>Paragraph {p} of section {s}, with <a href=\"ch{n}.xhtml\">a link</a> and <u>emphasis</u>.</p>"
            ));
        }
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{n}</title></head><body>{body}</body></html>"
    )
}

/// An unpacked package of `CHAPTERS` files; returns the package document.
fn synthetic_package(dir: &Path) -> PathBuf {
    let text = dir.join("text");
    fs::create_dir_all(&text).unwrap();
    let mut manifest = String::new();
    let mut spine = String::new();
    for n in 0..CHAPTERS {
        fs::write(text.join(format!("ch{n}.xhtml")), chapter(n)).unwrap();
        manifest.push_str(&format!(
            "<item id=\"ch{n}\" href=\"text/ch{n}.xhtml\" media-type=\"application/xhtml+xml\"/>"
        ));
        spine.push_str(&format!("<itemref idref=\"ch{n}\"/>"));
    }
    let opf = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Bench</dc:title><dc:identifier id="id">bench</dc:identifier></metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
    );
    let path = dir.join("book.opf");
    fs::write(&path, opf).unwrap();
    path
}

fn synthetic_book() -> Book {
    let mut book = Book::new();
    for n in 0..CHAPTERS {
        let id = book
            .add_file(&format!("ch{n}"), &format!("text/ch{n}.xhtml"), chapter(n).into_bytes())
            .unwrap();
        book.spine_append(&id, true).unwrap();
    }
    book
}

fn bench_heading_toc(c: &mut Criterion) {
    let queries: Vec<Query> = ["h1", "h2", "h3"]
        .iter()
        .map(|q| Query::parse(q).unwrap())
        .collect();
    let book = synthetic_book();

    c.bench_function("toc_from_headings", |b| {
        b.iter(|| {
            let mut book = book.clone();
            from_headings(&mut book, &queries).unwrap()
        });
    });
}

fn bench_opf_to_epub(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let opf = synthetic_package(dir.path());
    let output = dir.path().join("out.epub");
    let registry = PluginRegistry::builtin();
    let options = UserOptions::default();

    c.bench_function("opf_to_epub", |b| {
        b.iter(|| {
            Pipeline::new(&registry)
                .run(&opf, &output, &options)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_heading_toc, bench_opf_to_epub);
criterion_main!(benches);
