pub mod adapter;
pub mod error;
pub mod ipc;
pub mod restart;
pub mod seamless;

pub use adapter::PlayerAdapter;
pub use error::{PlayerError, Result};
pub use restart::RestartAdapter;
pub use seamless::SeamlessAdapter;

use std::path::Path;

/// Probes for the preferred ("seamless") executable first, falling back to
/// the restart back-end; a fatal configuration error if neither is present.
/// Grounded on the teacher's preference-ordered backend probing at startup.
pub fn select_adapter(
    seamless_executable: &Path,
    restart_executable: &Path,
) -> Result<Box<dyn PlayerAdapter>> {
    if seamless_executable.is_file() {
        return Ok(Box::new(SeamlessAdapter::new(seamless_executable)));
    }
    if restart_executable.is_file() {
        return Ok(Box::new(RestartAdapter::new(restart_executable)));
    }
    Err(PlayerError::BackendUnavailable(format!(
        "neither {} nor {} is available",
        seamless_executable.display(),
        restart_executable.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_adapter_is_fatal_when_both_executables_are_missing() {
        let err = select_adapter(Path::new("/nonexistent/seamless"), Path::new("/nonexistent/restart")).unwrap_err();
        assert!(matches!(err, PlayerError::BackendUnavailable(_)));
    }

    #[test]
    fn select_adapter_prefers_seamless_when_both_present() {
        let dir = tempfile::tempdir().unwrap();
        let seamless = dir.path().join("seamless-bin");
        let restart = dir.path().join("restart-bin");
        std::fs::write(&seamless, b"").unwrap();
        std::fs::write(&restart, b"").unwrap();
        let adapter = select_adapter(&seamless, &restart).unwrap();
        assert_eq!(adapter.name(), "primary");
    }
}
