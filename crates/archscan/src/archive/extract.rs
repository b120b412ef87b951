use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::archive::ArchiveKind;
use crate::config::UnpackConfig;
use crate::error::ExtractError;
use crate::process::{CommandSpec, ProcessRunner};

/// Unpacks archives with the system `unzip`/`tar` utilities.
pub struct Extractor {
    runner: Arc<dyn ProcessRunner>,
    config: UnpackConfig,
}

impl Extractor {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: UnpackConfig) -> Self {
        Self { runner, config }
    }

    /// Unpacks `source` into `target`, creating `target` and its parents first.
    ///
    /// `source` is left in place; removing it is the caller's job.
    pub fn extract(
        &self,
        source: &Path,
        kind: ArchiveKind,
        target: &Path,
    ) -> Result<(), ExtractError> {
        std::fs::create_dir_all(target).map_err(|e| ExtractError::CreateDirectory {
            path: target.to_path_buf(),
            source: e,
        })?;

        let command = self.command_for(source, kind, target);
        debug!("Unpacking with: {}", command.display());

        let output = self
            .runner
            .run(&command)
            .map_err(|e| ExtractError::Process { kind, source: e })?;

        if !output.success {
            return Err(ExtractError::NonZeroExit {
                kind,
                detail: output.failure_detail(),
            });
        }

        Ok(())
    }

    pub fn command_for(&self, source: &Path, kind: ArchiveKind, target: &Path) -> CommandSpec {
        let source = source.to_string_lossy().into_owned();
        let target = target.to_string_lossy().into_owned();

        match kind {
            ArchiveKind::Zip => CommandSpec::new(&self.config.unzip_binary)
                .args(["-q", "-o"])
                .arg(source)
                .arg("-d")
                .arg(target),
            ArchiveKind::Tar | ArchiveKind::GzipTar | ArchiveKind::Bzip2Tar => {
                let flags = match kind {
                    ArchiveKind::GzipTar => "-xzf",
                    ArchiveKind::Bzip2Tar => "-xjf",
                    _ => "-xf",
                };
                CommandSpec::new(&self.config.tar_binary)
                    .arg(flags)
                    .arg(source)
                    .arg("--directory")
                    .arg(target)
            }
        }
    }
}
