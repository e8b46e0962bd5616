//! Filesystem transitions that move a source file into the public tree.
//!
//! Everything here is blocking and meant to run on `spawn_blocking`.
//!
//! - **Link**: the source is renamed into the public tree, never over an
//!   existing file, and a symlink is left at its old path. Only possible when
//!   both live on one device.
//! - **Copy**: the source is streamed into a staging file next to the
//!   destination, hashed on the way, fsynced and then persisted without
//!   clobbering. The source is untouched.
//!
//! Either way a failure leaves no partial artifact at the destination and the
//! source as it was found.

use crate::config::{DiskSpaceConfig, StrategyMode};
use crate::error::PublishError;
use crate::utils::{self, IO_BUFFER_SIZE};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::fs::symlink;
use std::path::Path;

/// How a worker publishes one file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishStrategy {
    /// Rename into place and leave a symlink at the source path
    Link,
    /// Stream-copy into place, leaving the source untouched
    Copy,
}

/// Size and digest of a published artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedFile {
    /// Size in bytes
    pub size: u64,
    /// Lowercase hex MD5
    pub hash: String,
}

impl PublishStrategy {
    /// Pick a strategy for publishing `source` into `dest_dir`
    ///
    /// In `Auto` mode the device ids of the source file and the destination
    /// directory decide.
    pub fn select(mode: StrategyMode, source: &Path, dest_dir: &Path) -> Result<Self, PublishError> {
        match mode {
            StrategyMode::Link => Ok(Self::Link),
            StrategyMode::Copy => Ok(Self::Copy),
            StrategyMode::Auto => {
                let same = utils::same_device(source, dest_dir)
                    .map_err(|e| PublishError::fs("stat", source, e))?;
                Ok(if same { Self::Link } else { Self::Copy })
            }
        }
    }

    /// Lowercase name used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Copy => "copy",
        }
    }

    /// Publish `source` at `dest`
    pub fn publish(
        &self,
        source: &Path,
        dest: &Path,
        disk_space: &DiskSpaceConfig,
    ) -> Result<PublishedFile, PublishError> {
        check_source(source)?;
        if dest_occupied(dest) {
            return Err(PublishError::DestinationExists {
                path: dest.to_path_buf(),
            });
        }

        match self {
            Self::Link => publish_link(source, dest),
            Self::Copy => publish_copy(source, dest, disk_space),
        }
    }
}

impl std::fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect a publish of `source` to `dest` that already happened, fully or in part
///
/// Returns the published artifact when the work can be resumed:
/// - the source is a symlink to `dest` (link finished, finalize did not)
/// - on redelivery, `dest` exists and the source is gone (crash between
///   rename and symlink); the symlink is created now
/// - on redelivery, `dest` is a byte-identical copy of the source (copy
///   finished, finalize did not)
pub fn resume(source: &Path, dest: &Path, redelivered: bool) -> Result<Option<PublishedFile>, PublishError> {
    let dest_is_file = fs::symlink_metadata(dest).is_ok_and(|m| m.is_file());
    if !dest_is_file {
        return Ok(None);
    }

    match fs::symlink_metadata(source) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(source).is_ok_and(|target| target == dest) {
                return hash_artifact(dest).map(Some);
            }
            Ok(None)
        }
        Ok(meta) if meta.is_file() && redelivered => {
            if meta.len() != fs::metadata(dest).map(|m| m.len()).unwrap_or(u64::MAX) {
                return Ok(None);
            }
            let published = hash_artifact(dest)?;
            let (_, source_hash) =
                utils::hash_file(source).map_err(|e| PublishError::fs("read", source, e))?;
            Ok((source_hash == published.hash).then_some(published))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && redelivered => {
            symlink(dest, source).map_err(|e| PublishError::fs("symlink", source, e))?;
            hash_artifact(dest).map(Some)
        }
        _ => Ok(None),
    }
}

pub(crate) fn check_source(source: &Path) -> Result<(), PublishError> {
    match fs::symlink_metadata(source) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(PublishError::SourceNotRegular {
            path: source.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PublishError::SourceMissing {
            path: source.to_path_buf(),
        }),
        Err(e) => Err(PublishError::fs("stat", source, e)),
    }
}

fn dest_occupied(dest: &Path) -> bool {
    fs::symlink_metadata(dest).is_ok()
}

fn hash_artifact(path: &Path) -> Result<PublishedFile, PublishError> {
    let (size, hash) = utils::hash_file(path).map_err(|e| PublishError::fs("hash", path, e))?;
    Ok(PublishedFile { size, hash })
}

fn publish_link(source: &Path, dest: &Path) -> Result<PublishedFile, PublishError> {
    utils::rename_noclobber(source, dest).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            PublishError::DestinationExists {
                path: dest.to_path_buf(),
            }
        } else {
            PublishError::fs("rename", source, e)
        }
    })?;

    if let Err(e) = symlink(dest, source) {
        restore_source(source, dest);
        return Err(PublishError::fs("symlink", source, e));
    }

    match hash_artifact(dest) {
        Ok(published) => Ok(published),
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(source) {
                tracing::error!(
                    path = %source.display(),
                    error = %remove_err,
                    "Failed to remove symlink while undoing link publish"
                );
            } else {
                restore_source(source, dest);
            }
            Err(e)
        }
    }
}

/// Move a linked artifact back to where the source was
fn restore_source(source: &Path, dest: &Path) {
    if let Err(e) = fs::rename(dest, source) {
        tracing::error!(
            source = %source.display(),
            dest = %dest.display(),
            error = %e,
            "Failed to restore source after link publish failure"
        );
    }
}

fn publish_copy(
    source: &Path,
    dest: &Path,
    disk_space: &DiskSpaceConfig,
) -> Result<PublishedFile, PublishError> {
    let dest_dir = dest
        .parent()
        .ok_or_else(|| PublishError::fs("resolve parent of", dest, io::ErrorKind::InvalidInput.into()))?;

    let mut input = File::open(source).map_err(|e| PublishError::fs("open", source, e))?;
    let source_meta = input
        .metadata()
        .map_err(|e| PublishError::fs("stat", source, e))?;
    let expected = source_meta.len();

    if disk_space.enabled {
        check_free_space(dest_dir, expected, disk_space)?;
    }

    let mut staging = tempfile::Builder::new()
        .prefix(".publish-")
        .tempfile_in(dest_dir)
        .map_err(|e| PublishError::fs("create staging file in", dest_dir, e))?;

    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; IO_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PublishError::fs("read", source, e)),
        };
        staging
            .write_all(&buffer[..n])
            .map_err(|e| PublishError::fs("write", staging.path(), e))?;
        context.consume(&buffer[..n]);
        written += n as u64;
    }

    staging
        .as_file()
        .sync_all()
        .map_err(|e| PublishError::fs("sync", staging.path(), e))?;

    if written != expected {
        return Err(PublishError::IncompleteCopy {
            source_path: source.to_path_buf(),
            expected,
            written,
        });
    }

    // Staging files are created owner-only; published files keep the source's mode
    fs::set_permissions(staging.path(), source_meta.permissions())
        .map_err(|e| PublishError::fs("set permissions on", staging.path(), e))?;

    staging.persist_noclobber(dest).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            PublishError::DestinationExists {
                path: dest.to_path_buf(),
            }
        } else {
            PublishError::fs("persist", dest, e.error)
        }
    })?;

    if let Err(e) = File::open(dest_dir).and_then(|dir| dir.sync_all()) {
        tracing::warn!(path = %dest_dir.display(), error = %e, "Failed to sync public directory");
    }

    Ok(PublishedFile {
        size: written,
        hash: format!("{:x}", context.compute()),
    })
}

fn check_free_space(dest_dir: &Path, size: u64, config: &DiskSpaceConfig) -> Result<(), PublishError> {
    let required = (size as f64 * config.size_multiplier) as u64 + config.min_free_space;
    let available = utils::get_available_space(dest_dir)
        .map_err(|e| PublishError::fs("check free space on", dest_dir, e))?;

    if available < required {
        return Err(PublishError::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const CONTENT: &[u8] = b"quarterly numbers, final\n";

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("report.txt");
        fs::write(&source, CONTENT).unwrap();
        let public = temp_dir.path().join("public");
        fs::create_dir(&public).unwrap();
        let dest = public.join("report_v1.txt");
        (temp_dir, source, dest)
    }

    fn expected() -> PublishedFile {
        PublishedFile {
            size: CONTENT.len() as u64,
            hash: format!("{:x}", md5::compute(CONTENT)),
        }
    }

    #[test]
    fn auto_selects_link_on_one_device() {
        let (_dir, source, dest) = setup();
        let strategy =
            PublishStrategy::select(StrategyMode::Auto, &source, dest.parent().unwrap()).unwrap();
        assert_eq!(strategy, PublishStrategy::Link);

        let forced =
            PublishStrategy::select(StrategyMode::Copy, &source, dest.parent().unwrap()).unwrap();
        assert_eq!(forced, PublishStrategy::Copy);
    }

    #[test]
    fn link_moves_file_and_leaves_symlink() {
        let (_dir, source, dest) = setup();

        let published = PublishStrategy::Link
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap();

        assert_eq!(published, expected());
        assert!(fs::symlink_metadata(&source).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&source).unwrap(), dest);
        assert_eq!(fs::read(&dest).unwrap(), CONTENT);
        // Reading through the symlink still yields the content
        assert_eq!(fs::read(&source).unwrap(), CONTENT);
    }

    #[test]
    fn copy_leaves_source_untouched() {
        let (_dir, source, dest) = setup();

        let published = PublishStrategy::Copy
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap();

        assert_eq!(published, expected());
        assert!(fs::symlink_metadata(&source).unwrap().is_file());
        assert_eq!(fs::read(&dest).unwrap(), CONTENT);
        assert_eq!(utils::hash_file(&source).unwrap().1, published.hash);
    }

    #[test]
    fn copy_leaves_no_staging_files() {
        let (_dir, source, dest) = setup();

        PublishStrategy::Copy
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap();

        let names: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("report_v1.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn copy_keeps_source_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, source, dest) = setup();
        fs::set_permissions(&source, fs::Permissions::from_mode(0o644)).unwrap();

        PublishStrategy::Copy
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap();

        let mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn occupied_destination_is_refused_for_both_strategies() {
        for strategy in [PublishStrategy::Link, PublishStrategy::Copy] {
            let (_dir, source, dest) = setup();
            fs::write(&dest, b"someone else").unwrap();

            let err = strategy
                .publish(&source, &dest, &DiskSpaceConfig::default())
                .unwrap_err();

            assert!(matches!(err, PublishError::DestinationExists { .. }), "{:?}", err);
            assert_eq!(fs::read(&source).unwrap(), CONTENT);
            assert!(fs::symlink_metadata(&source).unwrap().is_file());
            assert_eq!(fs::read(&dest).unwrap(), b"someone else");
        }
    }

    #[test]
    fn link_never_replaces_a_destination_that_appears_late() {
        let (_dir, source, dest) = setup();
        // Created after the occupancy check would have run
        fs::write(&dest, b"someone else").unwrap();

        let err = publish_link(&source, &dest).unwrap_err();

        assert!(matches!(err, PublishError::DestinationExists { .. }), "{:?}", err);
        assert!(fs::symlink_metadata(&source).unwrap().is_file());
        assert_eq!(fs::read(&source).unwrap(), CONTENT);
        assert_eq!(fs::read(&dest).unwrap(), b"someone else");
    }

    #[test]
    fn missing_source_is_reported() {
        let (_dir, source, dest) = setup();
        fs::remove_file(&source).unwrap();

        let err = PublishStrategy::Link
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("File not found at path {}", source.display())
        );
        assert!(!dest.exists());
    }

    #[test]
    fn link_failure_restores_source() {
        let (dir, source, _) = setup();
        // Destination directory does not exist, so the rename fails
        let dest = dir.path().join("missing").join("report_v1.txt");

        let err = PublishStrategy::Link
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap_err();

        assert!(matches!(err, PublishError::Filesystem { operation: "rename", .. }));
        assert!(fs::symlink_metadata(&source).unwrap().is_file());
        assert_eq!(fs::read(&source).unwrap(), CONTENT);
    }

    #[test]
    fn insufficient_space_fails_before_staging() {
        let (_dir, source, dest) = setup();
        let config = DiskSpaceConfig {
            enabled: true,
            min_free_space: u64::MAX / 2,
            size_multiplier: 1.0,
        };

        let err = PublishStrategy::Copy
            .publish(&source, &dest, &config)
            .unwrap_err();

        assert!(matches!(err, PublishError::InsufficientSpace { .. }));
        assert_eq!(fs::read_dir(dest.parent().unwrap()).unwrap().count(), 0);
    }

    #[test]
    fn resume_finished_link() {
        let (_dir, source, dest) = setup();
        PublishStrategy::Link
            .publish(&source, &dest, &DiskSpaceConfig::default())
            .unwrap();

        assert_eq!(resume(&source, &dest, false).unwrap(), Some(expected()));
    }

    #[test]
    fn resume_link_interrupted_before_symlink() {
        let (_dir, source, dest) = setup();
        fs::rename(&source, &dest).unwrap();

        // A first delivery never guesses
        assert_eq!(resume(&source, &dest, false).unwrap(), None);

        assert_eq!(resume(&source, &dest, true).unwrap(), Some(expected()));
        assert_eq!(fs::read_link(&source).unwrap(), dest);
    }

    #[test]
    fn resume_finished_copy_only_when_identical() {
        let (_dir, source, dest) = setup();
        fs::copy(&source, &dest).unwrap();
        assert_eq!(resume(&source, &dest, true).unwrap(), Some(expected()));

        fs::write(&dest, b"quarterly numbers, draft\n").unwrap();
        assert_eq!(resume(&source, &dest, true).unwrap(), None);
    }

    #[test]
    fn nothing_to_resume_without_destination() {
        let (_dir, source, dest) = setup();
        assert_eq!(resume(&source, &dest, true).unwrap(), None);
    }
}
