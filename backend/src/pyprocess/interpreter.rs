use std::env;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const DEFAULT_CANDIDATES: [&str; 3] = ["python", "python3", "py"];
pub const DEFAULT_FALLBACK: &str = "python";

/// Finds the interpreter used to run the classifier script.
///
/// The first candidate found on `PATH` is cached until [`invalidate`] is
/// called. The fallback name is returned when nothing resolves and is never
/// cached, so a later probe can still pick up a freshly installed
/// interpreter.
///
/// [`invalidate`]: InterpreterResolver::invalidate
#[derive(Debug)]
pub struct InterpreterResolver {
    candidates: Vec<String>,
    fallback: String,
    resolved: RwLock<Option<PathBuf>>,
}

impl Default for InterpreterResolver {
    fn default() -> Self {
        Self::new(
            DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            DEFAULT_FALLBACK.to_string(),
        )
    }
}

impl InterpreterResolver {
    pub fn new(candidates: Vec<String>, fallback: String) -> Self {
        Self {
            candidates,
            fallback,
            resolved: RwLock::new(None),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Ok(guard) = self.resolved.read() {
            if let Some(path) = guard.as_ref() {
                return path.clone();
            }
        }

        match self.probe() {
            Some(path) => {
                log::info!("Resolved classifier interpreter: {}", path.display());
                if let Ok(mut guard) = self.resolved.write() {
                    *guard = Some(path.clone());
                }
                path
            }
            None => {
                log::warn!(
                    "None of {:?} found on PATH, falling back to '{}'",
                    self.candidates,
                    self.fallback
                );
                PathBuf::from(&self.fallback)
            }
        }
    }

    pub fn cached(&self) -> Option<PathBuf> {
        self.resolved.read().ok().and_then(|guard| guard.clone())
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.resolved.write() {
            if let Some(previous) = guard.take() {
                log::info!("Dropped cached interpreter {}", previous.display());
            }
        }
    }

    fn probe(&self) -> Option<PathBuf> {
        self.candidates.iter().find_map(|candidate| {
            let found = locate(candidate);
            log::debug!("Probing interpreter '{}': {:?}", candidate, found);
            found
        })
    }
}

fn locate(candidate: &str) -> Option<PathBuf> {
    let direct = Path::new(candidate);
    if direct.components().count() > 1 || direct.is_absolute() {
        return direct.is_file().then(|| direct.to_path_buf());
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path).find_map(|dir| {
        let plain = dir.join(candidate);
        if plain.is_file() {
            return Some(plain);
        }
        let suffixed = dir.join(format!("{}{}", candidate, env::consts::EXE_SUFFIX));
        suffixed.is_file().then_some(suffixed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn resolves_first_candidate_on_path_and_caches_it() {
        let resolver = InterpreterResolver::new(
            vec!["definitely-not-an-interpreter-1f3a".into(), "sh".into()],
            "python".into(),
        );

        let resolved = resolver.resolve();
        assert!(resolved.ends_with("sh"));
        assert!(resolved.is_absolute());
        assert_eq!(resolver.cached(), Some(resolved.clone()));
        assert_eq!(resolver.resolve(), resolved);
    }

    #[test]
    fn falls_back_without_caching() {
        let resolver = InterpreterResolver::new(
            vec!["definitely-not-an-interpreter-1f3a".into()],
            "python-fallback".into(),
        );

        assert_eq!(resolver.resolve(), PathBuf::from("python-fallback"));
        assert_eq!(resolver.cached(), None);
    }

    #[test]
    fn explicit_paths_are_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = dir.path().join("my-python");
        std::fs::write(&interpreter, b"").unwrap();

        let resolver = InterpreterResolver::new(
            vec![interpreter.to_string_lossy().into_owned()],
            "python".into(),
        );
        assert_eq!(resolver.resolve(), interpreter);

        resolver.invalidate();
        assert_eq!(resolver.cached(), None);
        std::fs::remove_file(&interpreter).unwrap();
        assert_eq!(resolver.resolve(), PathBuf::from("python"));
    }
}
