// FILE: src/classify/bouncer.rs
//! The Bouncer: decides which directories the scanner never enters.
//!
//! A directory is turned away when:
//! 1. Its name is hidden (starts with .)
//! 2. It is a known build output, dependency store, VCS or bytecode cache

const IGNORED_DIRS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Dependencies / build output
    "node_modules",
    "target",
    "build",
    "dist",
    // Bytecode caches
    "__pycache__",
];

pub struct Bouncer;

impl Bouncer {
    /// True when a directory with this name must not be descended into.
    pub fn skip_dir(name: &str) -> bool {
        if name.starts_with('.') {
            return true;
        }

        IGNORED_DIRS.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_dirs_are_skipped() {
        assert!(Bouncer::skip_dir(".cache"));
        assert!(Bouncer::skip_dir(".git"));
    }

    #[test]
    fn test_build_and_cache_dirs_are_skipped() {
        for name in ["node_modules", "target", "build", "dist", "__pycache__"] {
            assert!(Bouncer::skip_dir(name), "{name} should be skipped");
        }
    }

    #[test]
    fn test_regular_dirs_pass() {
        assert!(!Bouncer::skip_dir("Documents"));
        assert!(!Bouncer::skip_dir("builder"));
        assert!(!Bouncer::skip_dir("my.project"));
    }
}
