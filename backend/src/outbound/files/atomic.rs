//! Staged file replacement inside a capability directory.

use std::io;
use std::path::Path;

use cap_std::{ambient_authority, fs::Dir};
use uuid::Uuid;

/// Create `path` (and parents) and open it as a capability root.
pub(super) fn open_root(path: &Path) -> io::Result<Dir> {
    Dir::create_ambient_dir_all(path, ambient_authority())?;
    Dir::open_ambient_dir(path, ambient_authority())
}

/// Write `content` to `name` in `dir`, replacing any existing file.
pub(super) fn write_replacing(dir: &Dir, name: &str, content: &[u8]) -> io::Result<()> {
    let staging = format!(".tmp-{}", Uuid::new_v4().simple());
    if let Err(error) = dir.write(&staging, content) {
        let _cleanup = dir.remove_file(&staging);
        return Err(error);
    }
    dir.rename(&staging, dir, name).inspect_err(|_| {
        let _cleanup = dir.remove_file(&staging);
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn replacement_leaves_no_staging_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = open_root(&temp.path().join("nested")).expect("root");

        write_replacing(&dir, "list.csv", b"first").expect("first write");
        write_replacing(&dir, "list.csv", b"second").expect("second write");

        assert_eq!(dir.read("list.csv").expect("read"), b"second");
        let names: Vec<String> = dir
            .entries()
            .expect("entries")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["list.csv"]);
    }
}
