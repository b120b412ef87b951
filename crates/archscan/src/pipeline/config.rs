use crate::config::{Config, ScannerConfig, UnpackConfig};

/// The slice of [`Config`] a pipeline run needs.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub scanner: ScannerConfig,
    pub unpack: UnpackConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scanner: config.scanner.clone(),
            unpack: config.unpack.clone(),
        }
    }
}
