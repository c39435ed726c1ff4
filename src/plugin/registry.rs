//! Plugin lookup by file extension.

use super::{EpubInput, EpubOutput, InputPlugin, OebOutput, OpfInput, OutputPlugin, TxtInput};
use crate::error::{Error, Result};

/// The input and output plugins available to a pipeline.
#[derive(Default)]
pub struct PluginRegistry {
    inputs: Vec<Box<dyn InputPlugin>>,
    outputs: Vec<Box<dyn OutputPlugin>>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every plugin shipped with the crate.
    pub fn builtin() -> Self {
        Self::empty()
            .with_input(EpubInput)
            .with_input(OpfInput)
            .with_input(TxtInput)
            .with_output(EpubOutput::new())
            .with_output(OebOutput)
    }

    /// Register an input plugin. Later registrations win for shared
    /// extensions.
    pub fn with_input(mut self, plugin: impl InputPlugin + 'static) -> Self {
        self.inputs.insert(0, Box::new(plugin));
        self
    }

    pub fn with_output(mut self, plugin: impl OutputPlugin + 'static) -> Self {
        self.outputs.insert(0, Box::new(plugin));
        self
    }

    pub fn input_for(&self, ext: &str) -> Result<&dyn InputPlugin> {
        let ext = ext.to_ascii_lowercase();
        self.inputs
            .iter()
            .find(|p| p.file_types().contains(&ext.as_str()))
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::UnsupportedFormat(format!("no input plugin for .{ext}")))
    }

    pub fn output_for(&self, ext: &str) -> Result<&dyn OutputPlugin> {
        let ext = ext.to_ascii_lowercase();
        self.outputs
            .iter()
            .find(|p| p.file_type() == ext)
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::UnsupportedFormat(format!("no output plugin for .{ext}")))
    }

    /// Extensions accepted as input, sorted.
    pub fn input_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self
            .inputs
            .iter()
            .flat_map(|p| p.file_types().iter().copied())
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    pub fn output_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.outputs.iter().map(|p| p.file_type()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = PluginRegistry::builtin();
        assert_eq!(registry.input_for("EPUB").unwrap().name(), "epub");
        assert_eq!(registry.output_for("oeb").unwrap().name(), "oeb");
        assert!(matches!(
            registry.input_for("docx"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert_eq!(registry.input_types(), ["epub", "opf", "txt"]);
        assert_eq!(registry.output_types(), ["epub", "oeb"]);
    }
}
