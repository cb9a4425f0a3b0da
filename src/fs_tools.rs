use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

/// Move `src` into `dir`, keeping its file name. Refuses to overwrite. Falls
/// back to copy + remove when a plain rename is not possible (e.g. across
/// filesystems).
pub fn move_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .with_context(|| format!("{} has no file name", src.display()))?;
    let dst = dir.join(name);
    if dst.exists() {
        bail!("destination {} already exists", dst.display());
    }

    if let Err(err) = fs::rename(src, &dst) {
        log::debug!("rename {} failed ({}), copying", src.display(), err);
        fs::copy(src, &dst)
            .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
        fs::remove_file(src).with_context(|| format!("removing {}", src.display()))?;
    }
    Ok(dst)
}

/// `"IMG_1.jpg"` → `("IMG_1", ".jpg")`. The extension keeps its dot and is
/// empty when the name has none.
pub fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name(Path::new("a/IMG_1.jpg")),
            ("IMG_1".to_string(), ".jpg".to_string())
        );
        assert_eq!(
            split_name(Path::new("a/archive.tar.gz")),
            ("archive.tar".to_string(), ".gz".to_string())
        );
        assert_eq!(split_name(Path::new("README")), ("README".to_string(), String::new()));
    }

    #[test]
    fn test_move_into_refuses_overwrite() -> Result<()> {
        let root = std::env::temp_dir().join(format!("facesort-mv-{}", uuid::Uuid::new_v4()));
        let dst_dir = root.join("dst");
        ensure_dir(&dst_dir)?;
        let src = root.join("photo.jpg");
        fs::write(&src, b"1")?;

        let moved = move_into(&src, &dst_dir)?;
        assert_eq!(moved, dst_dir.join("photo.jpg"));
        assert!(!src.exists());
        assert_eq!(fs::read(&moved)?, b"1");

        fs::write(&src, b"2")?;
        assert!(move_into(&src, &dst_dir).is_err());
        assert!(src.exists());
        assert_eq!(fs::read(&moved)?, b"1");

        fs::remove_dir_all(&root)?;
        Ok(())
    }
}
