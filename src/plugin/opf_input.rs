//! Input from an unpacked package: the package document is used as is.

use std::path::Path;

use super::{InputOutcome, InputPlugin};
use crate::error::{Error, Result};
use crate::options::OptionSet;
use crate::pipeline::JobContext;

pub struct OpfInput;

impl InputPlugin for OpfInput {
    fn name(&self) -> &'static str {
        "opf"
    }

    fn file_types(&self) -> &'static [&'static str] {
        &["opf"]
    }

    fn convert(
        &self,
        source: &Path,
        _options: &OptionSet,
        _detected_ext: &str,
        _ctx: &mut JobContext,
    ) -> Result<InputOutcome> {
        if !source.is_file() {
            return Err(Error::format(
                "OPF",
                format!("{} is not a file", source.display()),
            ));
        }
        let path = source.canonicalize()?;
        log::info!("opf: reading package {}", path.display());
        Ok(InputOutcome::descriptor(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::BookSource;

    #[test]
    fn test_descriptor_is_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let opf = dir.path().join("book.opf");
        std::fs::write(&opf, "<package/>").unwrap();
        let mut ctx = JobContext::new().unwrap();
        let outcome = OpfInput
            .convert(&opf, &OptionSet::default(), "opf", &mut ctx)
            .unwrap();
        let BookSource::Descriptor(path) = outcome.source else {
            panic!("expected a descriptor");
        };
        assert_eq!(path, opf.canonicalize().unwrap());

        let missing = dir.path().join("missing.opf");
        assert!(OpfInput
            .convert(&missing, &OptionSet::default(), "opf", &mut ctx)
            .is_err());
    }
}
