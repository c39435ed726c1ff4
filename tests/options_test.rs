//! Option precedence across sources.

use ebconv::options::OptionKind;
use ebconv::{Level, OptionMerger, OptionSpec, OptionValue, Recommendation};

fn merger() -> OptionMerger {
    let mut merger = OptionMerger::new([OptionSpec::int("quality", 1, "Output quality.")]);
    merger
        .merge("input", &[Recommendation::new("quality", 2i64, Level::Medium)])
        .unwrap();
    merger
        .merge("output", &[Recommendation::new("quality", 3i64, Level::High)])
        .unwrap();
    merger
}

#[test]
fn output_recommendation_wins_without_user_value() {
    let merger = merger();
    assert_eq!(merger.resolve().int("quality"), Some(3));
    assert_eq!(merger.source_of("quality"), Some("output"));
}

#[test]
fn user_value_wins_at_the_same_level() {
    let mut merger = merger();
    merger.user("quality", "5").unwrap();
    assert_eq!(merger.resolve().int("quality"), Some(5));
    assert_eq!(merger.source_of("quality"), Some("user"));
}

#[test]
fn lower_level_never_overrides() {
    let mut merger = OptionMerger::new([OptionSpec::flag("insert_cover", false, "")]);
    merger
        .merge("input", &[Recommendation::new("insert_cover", true, Level::High)])
        .unwrap();
    merger
        .merge("output", &[Recommendation::new("insert_cover", false, Level::Medium)])
        .unwrap();
    assert_eq!(
        merger.resolve().get("insert_cover"),
        Some(&OptionValue::Bool(true))
    );
}

#[test]
fn choices_are_checked() {
    let mut merger = OptionMerger::new([OptionSpec::choice(
        "epub_version",
        &["2", "3"],
        "2",
        "",
    )]);
    assert!(merger.user("epub_version", "4").is_err());
    merger.user("epub_version", "3").unwrap();
    assert_eq!(merger.resolve().text("epub_version"), Some("3"));
    assert!(merger.spec("epub_version").is_some_and(|s| s.kind == OptionKind::Choice(&["2", "3"])));
}
