//! Saving and loading list definitions as text files
//!
//! A saved file has one `name=expression;` line per binding.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use norn_list::{evaluate, Environment, EvalError, SharedEnvironment};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("could not read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("could not write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("{}:{line}: improperly formatted line '{text}': {source}", .path.display())]
    BadLine {
        path: PathBuf,
        line: usize,
        text: String,
        source: EvalError,
    },
}

/// Text form of every binding, ordered by name
pub fn render_bindings(env: &Environment) -> String {
    let mut out = String::new();
    for (name, value) in env.sorted() {
        out.push_str(name);
        out.push('=');
        out.push_str(&value.render());
        out.push_str(";\n");
    }
    out
}

/// Write every binding to `path`. Returns the number of bindings written.
pub fn save(shared: &SharedEnvironment, path: &Path) -> Result<usize, StoreError> {
    let (text, count) = shared.with(|env| (render_bindings(env), env.len()));
    fs::write(path, text).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), count, "saved lists");
    Ok(count)
}

/// Evaluate each line of `path` in order, holding the lock for the whole file.
/// Stops at the first bad line; lines before it keep their effect.
pub fn load(shared: &SharedEnvironment, path: &Path) -> Result<usize, StoreError> {
    let text = read(path)?;
    let count = shared.with(|env| load_into(env, path, &text))?;
    info!(path = %path.display(), lines = count, "loaded lists");
    Ok(count)
}

fn load_into(env: &mut Environment, path: &Path, text: &str) -> Result<usize, StoreError> {
    let mut count = 0;
    for (index, line) in text.lines().enumerate() {
        evaluate(line, env).map_err(|source| StoreError::BadLine {
            path: path.to_path_buf(),
            line: index + 1,
            text: line.to_string(),
            source,
        })?;
        debug!(line = index + 1, "evaluated");
        count += 1;
    }
    Ok(count)
}

pub fn read(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
        _ => StoreError::Read {
            path: path.to_path_buf(),
            source,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use norn_list::Expression;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_bindings() {
        let shared = SharedEnvironment::new();
        shared.evaluate("c = a, b; a = a@b; b = ()").unwrap();
        let text = shared.with(|env| render_bindings(env));
        assert_eq!(text, "a=a@b;\nb=;\nc=a , b;\n");
    }

    #[test]
    fn test_save_then_load_reproduces_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.txt");

        let saved = SharedEnvironment::new();
        saved
            .evaluate("a=akuang@mit.edu; b=xinyic@mit.edu; c=a,b; d=(c ! a) * b; e=()")
            .unwrap();
        assert_eq!(save(&saved, &path).unwrap(), 5);

        let restored = SharedEnvironment::new();
        assert_eq!(load(&restored, &path).unwrap(), 5);
        assert_eq!(restored.snapshot(), saved.snapshot());
        assert_eq!(restored.evaluate("c").unwrap().recipients.len(), 2);
    }

    #[test]
    fn test_long_list_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");

        let members: Vec<String> = (0..10_000).map(|i| format!("m{}@x.org", i)).collect();
        let saved = SharedEnvironment::new();
        saved.evaluate(&format!("big = {}", members.join(", "))).unwrap();
        save(&saved, &path).unwrap();

        let restored = SharedEnvironment::new();
        assert_eq!(load(&restored, &path).unwrap(), 1);
        assert_eq!(restored.evaluate("big").unwrap().recipients.len(), 10_000);
    }

    #[test]
    fn test_load_overrides_existing_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.txt");
        fs::write(&path, "a=akuang@mit.edu;\n").unwrap();

        let shared = SharedEnvironment::new();
        shared.evaluate("a=initial@b.com; c=etc@o.com").unwrap();
        load(&shared, &path).unwrap();

        let a = shared.with(|env| env.get("a").cloned());
        assert_eq!(a, Some(Expression::single("akuang@mit.edu").unwrap()));
        assert_eq!(shared.snapshot().len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&SharedEnvironment::new(), &dir.path().join("hello.txt")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_load_stops_at_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "a=x@y;\nb={};\nc=z@y;\n").unwrap();

        let shared = SharedEnvironment::new();
        let err = load(&shared, &path).unwrap_err();
        assert!(matches!(err, StoreError::BadLine { line: 2, .. }));

        let names: Vec<_> = shared.snapshot().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_save_to_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = save(&SharedEnvironment::new(), &dir.path().join("no/such/dir.txt")).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
