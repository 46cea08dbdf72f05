//! 원자적 파일 교체.
//!
//! 같은 디렉토리의 `.tmp` 파일에 기록하고 `fsync` 한 뒤 `rename`으로 교체합니다.
//! 교체 도중 프로세스가 강제 종료되어도 다음 읽기는 이전 내용이나 새 내용 중
//! 하나만 관찰합니다.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// `path`의 임시 파일 경로 (`checkpoint.json` → `checkpoint.json.tmp`).
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 바이트 내용을 원자적으로 기록합니다.
pub fn write_atomic(path: &Path, contents: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    let result = write_and_sync(&tmp, contents).and_then(|_| {
        fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))
    });

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
        return result;
    }

    sync_parent_dir(path);
    Ok(())
}

/// 값을 보기 좋은 JSON으로 직렬화해 원자적으로 기록합니다.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| CoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

fn write_and_sync(path: &Path, contents: &[u8]) -> CoreResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| CoreError::io(path, e))?;
    file.write_all(contents).map_err(|e| CoreError::io(path, e))?;
    file.sync_all().map_err(|e| CoreError::io(path, e))
}

/// rename 결과를 디스크에 반영합니다. 디렉토리를 열 수 없는 플랫폼에서는 무시합니다.
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_appends_suffix() {
        let p = Path::new("/data/checkpoint.json");
        assert_eq!(temp_path(p), PathBuf::from("/data/checkpoint.json.tmp"));
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp_path(&path).exists(), "임시 파일이 남아있으면 안 됨");
    }

    #[test]
    fn test_leftover_temp_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        // 이전 프로세스가 기록 도중 죽은 상황
        fs::write(temp_path(&path), b"{\"partial\":").unwrap();
        write_atomic(&path, b"{}").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }
}
