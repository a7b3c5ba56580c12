//! Limits command implementation.

use batchsync_protocol::ServerLimits;
use std::path::Path;

/// Reads limits from an `info/configuration` document, or the defaults.
pub fn load(file: Option<&Path>) -> Result<ServerLimits, Box<dyn std::error::Error>> {
    match file {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            Ok(ServerLimits::parse(&bytes)?)
        }
        None => Ok(ServerLimits::default()),
    }
}

/// Runs the limits command.
pub fn run(file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let limits = load(file)?;
    println!("{}", serde_json::to_string_pretty(&limits)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        assert_eq!(load(None).unwrap(), ServerLimits::default());
    }

    #[test]
    fn parses_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_post_records": 3, "max_total_bytes": 4096}}"#).unwrap();

        let limits = load(Some(file.path())).unwrap();
        assert_eq!(limits.max_post_records, 3);
        assert_eq!(limits.max_total_bytes, 4096);
        assert_eq!(limits.max_post_bytes, ServerLimits::default().max_post_bytes);
    }

    #[test]
    fn rejects_malformed_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(load(Some(file.path())).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
