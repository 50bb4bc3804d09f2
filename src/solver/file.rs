//! file.rs
//! Reading and atomically replacing the image file.
use super::error::SolverError;
use crate::compiler::RelationalImage;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes next to `path` and renames over it, so a reader sees the old file or the new one.
pub fn write_image(path: &Path, image: &RelationalImage) -> Result<(), SolverError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_err = |action, source| SolverError::File { action, path: path.to_path_buf(), source };
    fs::create_dir_all(dir).map_err(|e| file_err("create directory for", e))?;

    let tmp = NamedTempFile::new_in(dir).map_err(|e| file_err("create temporary file for", e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, image)
            .map_err(|e| SolverError::Output { path: path.to_path_buf(), reason: e.to_string() })?;
        writer.flush().map_err(|e| file_err("write", e))?;
    }
    tmp.persist(path).map_err(|e| file_err("replace", e.error))?;
    Ok(())
}

pub fn read_image(path: &Path) -> Result<RelationalImage, SolverError> {
    let bytes = fs::read(path).map_err(|source| SolverError::File { action: "read", path: path.to_path_buf(), source })?;
    serde_json::from_slice(&bytes).map_err(|e| SolverError::Output { path: path.to_path_buf(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tables::OptionRow;

    #[test]
    fn test_write_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("image.json");
        let mut image = RelationalImage::default();
        write_image(&path, &image).unwrap();

        image.option.push(OptionRow { option_id: 0, option_name: "parent_node_id".into(), option_value: "0".into() });
        write_image(&path, &image).unwrap();
        assert_eq!(read_image(&path).unwrap(), image);
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_garbage_is_unusable_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(read_image(&path), Err(SolverError::Output { .. })));
    }
}
