//! Book model invariants: manifest uniqueness, reference purging, guide.

use std::collections::HashSet;

use proptest::prelude::*;

use ebconv::href::Reference;
use ebconv::{Book, GuideRole, Manifest};

fn chapter(body: &str) -> Vec<u8> {
    format!("<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{body}</body></html>")
        .into_bytes()
}

proptest! {
    #[test]
    fn manifest_ids_and_paths_stay_unique(
        hints in prop::collection::vec(("[a-c]{1,2}", "(text/)?[a-c]{1,2}\\.xhtml"), 1..30)
    ) {
        let mut manifest = Manifest::new();
        for (id, path) in &hints {
            manifest.add(id, path, "application/xhtml+xml", Vec::new()).unwrap();
        }
        let ids: HashSet<_> = manifest.iter().map(|i| i.id().to_string()).collect();
        let paths: HashSet<_> = manifest.iter().map(|i| i.href().to_string()).collect();
        prop_assert_eq!(ids.len(), hints.len());
        prop_assert_eq!(paths.len(), hints.len());
        for item in manifest.iter() {
            prop_assert_eq!(manifest.by_path(item.href()).map(|i| i.id()), Some(item.id()));
        }
    }
}

#[test]
fn remove_item_leaves_no_dangling_references() {
    let mut book = Book::new();
    let a = book.add_file("a", "text/a.xhtml", chapter("<p>a</p>")).unwrap();
    let b = book.add_file("b", "text/b.xhtml", chapter("<p>b</p>")).unwrap();
    book.spine_append(&a, true).unwrap();
    book.spine_append(&b, true).unwrap();
    book.guide.set(GuideRole::Text, "Start", Reference::file("text/b.xhtml"));
    let root = book.toc.root();
    book.toc.add(root, "B", &Reference::file("text/b.xhtml"));

    assert!(book.remove_item(&b).is_some());
    book.check_consistency().unwrap();
    assert_eq!(book.spine().len(), 1);
    assert!(book.guide.get(GuideRole::Text).is_none());
    assert!(book.toc.is_empty());
}

#[test]
fn removing_cover_of_missing_item_is_a_no_op() {
    let mut book = Book::new();
    let text = book.add_file("a", "a.xhtml", chapter("<p>a</p>")).unwrap();
    book.spine_append(&text, true).unwrap();
    let cover = book.add_file("cover", "cover.jpg", vec![0xFF, 0xD8, 0xFF]).unwrap();
    book.guide.set(GuideRole::Cover, "Cover", Reference::file("cover.jpg"));

    book.remove_item(&cover);
    assert!(book.guide.remove(GuideRole::Cover).is_none());
    assert!(book.remove_item(&cover).is_none());
    book.check_consistency().unwrap();
    assert_eq!(book.spine().len(), 1);
}

#[test]
fn spine_only_takes_manifest_items_once() {
    let mut book = Book::new();
    let id = book.add_file("a", "a.xhtml", chapter("")).unwrap();
    book.spine_append(&id, true).unwrap();
    assert!(book.spine_append(&id, true).is_err());
    assert!(book.spine_append("missing", true).is_err());
}
