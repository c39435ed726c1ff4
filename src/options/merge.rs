use std::collections::BTreeMap;

use super::{Level, OptionSet, OptionSpec, OptionValue, Recommendation, check_value};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Candidate {
    value: OptionValue,
    level: Level,
    source: String,
}

/// Collects recommendations in source order and resolves them.
///
/// Sources are merged as defaults, input plugin, output plugin, then user.
/// The value with the strictly highest level wins; a later source wins ties.
#[derive(Debug, Clone, Default)]
pub struct OptionMerger {
    specs: BTreeMap<&'static str, OptionSpec>,
    candidates: BTreeMap<&'static str, Candidate>,
}

impl OptionMerger {
    /// Start from the declared defaults, all at [`Level::Low`].
    pub fn new(specs: impl IntoIterator<Item = OptionSpec>) -> Self {
        let mut merger = Self::default();
        for spec in specs {
            merger.declare(spec);
        }
        merger
    }

    /// Add a declaration. An already declared option keeps its first
    /// declaration.
    pub fn declare(&mut self, spec: OptionSpec) {
        if self.specs.contains_key(spec.name) {
            return;
        }
        self.candidates.insert(
            spec.name,
            Candidate {
                value: spec.default.clone(),
                level: Level::Low,
                source: "defaults".into(),
            },
        );
        self.specs.insert(spec.name, spec);
    }

    pub fn spec(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.get(name)
    }

    /// Merge the recommendations of one source.
    ///
    /// Recommendations for options nobody declared are ignored; values of
    /// the wrong type are an error.
    pub fn merge(&mut self, source: &str, recommendations: &[Recommendation]) -> Result<()> {
        for rec in recommendations {
            let Some((&name, spec)) = self.specs.get_key_value(rec.name.as_str()) else {
                log::debug!("options: {source} recommends undeclared {}", rec.name);
                continue;
            };
            check_value(spec, &rec.value)?;
            self.offer(name, rec.value.clone(), rec.level, source);
        }
        Ok(())
    }

    fn offer(&mut self, name: &'static str, value: OptionValue, level: Level, source: &str) {
        let replace = self
            .candidates
            .get(name)
            .is_none_or(|current| level >= current.level);
        if replace {
            log::trace!("options: {name} = {value} ({level:?}, {source})");
            self.candidates.insert(
                name,
                Candidate {
                    value,
                    level,
                    source: source.to_string(),
                },
            );
        }
    }

    /// A user value from the command line, always [`Level::High`].
    pub fn user(&mut self, name: &str, raw: &str) -> Result<()> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| Error::invalid_option(name, "no such option"))?;
        let value = OptionValue::parse(spec.kind, raw).ok_or_else(|| {
            Error::invalid_option(name, format!("{raw:?} is not a valid {:?} value", spec.kind))
        })?;
        let name = spec.name;
        self.offer(name, value, Level::High, "user");
        Ok(())
    }

    /// User values from a JSON object, always [`Level::High`].
    pub fn user_json(&mut self, values: &serde_json::Value) -> Result<()> {
        let object = values
            .as_object()
            .ok_or_else(|| Error::invalid_option("options file", "expected a JSON object"))?;
        for (name, json) in object {
            let spec = self
                .specs
                .get(name.as_str())
                .ok_or_else(|| Error::invalid_option(name.as_str(), "no such option"))?;
            let value = OptionValue::from_json(spec.kind, json).ok_or_else(|| {
                Error::invalid_option(
                    name.as_str(),
                    format!("{json} is not a valid {:?} value", spec.kind),
                )
            })?;
            let name = spec.name;
            self.offer(name, value, Level::High, "user");
        }
        Ok(())
    }

    /// Source that supplied the current value of `name`.
    pub fn source_of(&self, name: &str) -> Option<&str> {
        self.candidates.get(name).map(|c| c.source.as_str())
    }

    pub fn resolve(&self) -> OptionSet {
        let mut set = OptionSet::default();
        for (name, candidate) in &self.candidates {
            set.insert(*name, candidate.value.clone());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::pipeline_options;

    fn merger() -> OptionMerger {
        OptionMerger::new([
            OptionSpec::int("flow_size", 0, ""),
            OptionSpec::flag("insert_cover", false, ""),
        ])
    }

    #[test]
    fn test_higher_level_wins_and_ties_go_to_later_source() {
        let mut m = merger();
        m.merge("input", &[Recommendation::new("flow_size", 3i64, Level::Medium)])
            .unwrap();
        m.merge("output", &[Recommendation::new("flow_size", 1i64, Level::Low)])
            .unwrap();
        assert_eq!(m.resolve().int("flow_size"), Some(3));
        assert_eq!(m.source_of("flow_size"), Some("input"));

        m.merge("output", &[Recommendation::new("flow_size", 4i64, Level::Medium)])
            .unwrap();
        assert_eq!(m.resolve().int("flow_size"), Some(4));

        m.user("flow_size", "5").unwrap();
        assert_eq!(m.resolve().int("flow_size"), Some(5));
        assert_eq!(m.source_of("flow_size"), Some("user"));
    }

    #[test]
    fn test_type_errors_and_unknown_user_options() {
        let mut m = merger();
        let err = m
            .merge("input", &[Recommendation::new("flow_size", true, Level::High)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
        assert!(matches!(m.user("nope", "1"), Err(Error::InvalidOption { .. })));
        assert!(matches!(m.user("flow_size", "big"), Err(Error::InvalidOption { .. })));

        // Unknown plugin recommendations are not an error.
        m.merge("input", &[Recommendation::new("other", true, Level::High)])
            .unwrap();
    }

    #[test]
    fn test_user_json() {
        let mut m = OptionMerger::new(pipeline_options());
        m.user_json(&serde_json::json!({"insert_cover": true, "level1_toc": "h1.chapter"}))
            .unwrap();
        let set = m.resolve();
        assert!(set.flag("insert_cover"));
        assert_eq!(set.text("level1_toc"), Some("h1.chapter"));
        assert_eq!(set.text("page_breaks_before"), Some("h1, h2"));
        assert!(m.user_json(&serde_json::json!([1])).is_err());
    }
}
