//! Flat replay list of discovered listing ids, one per line.

use std::path::Path;

use housing_shared::{DatahubError, ListingId, Result};
use tracing::debug;

/// Read a saved id list. `None` when the file does not exist.
pub fn load(path: &Path) -> Result<Option<Vec<ListingId>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DatahubError::io(path, e)),
    };

    let ids: Vec<ListingId> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ListingId::from)
        .collect();
    debug!(path = %path.display(), count = ids.len(), "loaded listing id list");
    Ok(Some(ids))
}

/// Write the id list through a sibling temp file and rename it into place.
pub fn save(path: &Path, ids: &[ListingId]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatahubError::io(parent, e))?;
    }

    let mut content = String::with_capacity(ids.len() * 12);
    for id in ids {
        content.push_str(id.as_str());
        content.push('\n');
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(|e| DatahubError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| DatahubError::io(path, e))?;
    debug!(path = %path.display(), count = ids.len(), "saved listing id list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("housing-idlist-{}", uuid::Uuid::now_v7()))
            .join(name)
    }

    #[test]
    fn missing_file_is_none() {
        let path = temp_path("estate_ids.txt");
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("estate_ids.txt");
        let ids = vec![ListingId::new("E1"), ListingId::new("E2")];
        save(&path, &ids).unwrap();

        assert_eq!(load(&path).unwrap(), Some(ids));
        assert!(!path.with_extension("tmp").exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn blank_lines_ignored() {
        let path = temp_path("estate_ids.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "E1\n\n  \nE2\r\n").unwrap();

        let ids = load(&path).unwrap().unwrap();
        assert_eq!(ids, vec![ListingId::new("E1"), ListingId::new("E2")]);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
