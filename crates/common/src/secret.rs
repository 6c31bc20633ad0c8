//! Secret wrapper for sensitive values (bot tokens, api hashes)

use std::fmt;
use std::io;
use std::path::Path;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Read a secret from a file, trimming surrounding whitespace.
    ///
    /// Secret files conventionally end with a newline; the trim keeps that
    /// newline out of the credential.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::new(contents.trim().to_owned()))
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacts_debug() {
        let secret = Secret::new(String::from("123456:bot-token"));
        let debug = format!("{:?}", secret);
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("bot-token"));
    }

    #[test]
    fn test_secret_exposes_value() {
        let secret = Secret::new(String::from("0123456789abcdef"));
        assert_eq!(secret.expose(), "0123456789abcdef");
    }

    #[test]
    fn test_from_file_trims_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_token");
        std::fs::write(&path, "123456:file-token\n").unwrap();

        let secret = Secret::from_file(&path).unwrap();
        assert_eq!(secret.expose(), "123456:file-token");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
    }

    #[test]
    fn test_from_file_missing_is_error() {
        assert!(Secret::from_file(Path::new("/nonexistent/token")).is_err());
    }
}
