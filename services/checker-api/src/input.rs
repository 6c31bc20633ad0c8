//! Batch input file loading
//!
//! Supported formats, selected by file extension:
//! - .txt: one identifier per line, `#` comments skipped
//! - .csv: first column of every row
//! - .json: bare string array, or an object with an "identifiers" array
//!
//! Identifiers are trimmed and deduplicated, keeping first-seen order.

use std::collections::HashSet;
use std::path::Path;

use common::{Error, Result};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Bare(Vec<String>),
    Object { identifiers: Vec<String> },
}

pub fn load_identifiers(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "json" => match serde_json::from_str::<JsonInput>(&contents)? {
            JsonInput::Bare(ids) => ids,
            JsonInput::Object { identifiers } => identifiers,
        },
        "csv" => contents
            .lines()
            .filter_map(|line| line.split(',').next())
            .map(str::to_owned)
            .collect(),
        "txt" | "" => contents
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .map(str::to_owned)
            .collect(),
        other => {
            return Err(Error::Config(format!(
                "unsupported input extension .{other}, expected .txt, .csv or .json"
            )));
        }
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in raw {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_owned()) {
            out.push(id.to_owned());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_named(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).expect("create input file");
        f.write_all(contents.as_bytes()).expect("write input file");
        path
    }

    #[test]
    fn txt_one_per_line_with_comments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_named(
            &dir,
            "ids.txt",
            "+15550001111\n# comment\n\n  @alice  \n+15550001111\n",
        );
        let ids = load_identifiers(&path).expect("load");
        assert_eq!(ids, vec!["+15550001111", "@alice"]);
    }

    #[test]
    fn csv_takes_first_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_named(
            &dir,
            "ids.csv",
            "+15550001111,Alice,note\n+15550002222,Bob,\n",
        );
        let ids = load_identifiers(&path).expect("load");
        assert_eq!(ids, vec!["+15550001111", "+15550002222"]);
    }

    #[test]
    fn json_bare_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_named(&dir, "ids.json", r#"["@alice", "@bob", "@alice"]"#);
        let ids = load_identifiers(&path).expect("load");
        assert_eq!(ids, vec!["@alice", "@bob"]);
    }

    #[test]
    fn json_identifiers_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_named(
            &dir,
            "ids.json",
            r#"{"identifiers": ["+15550001111", "@alice"]}"#,
        );
        let ids = load_identifiers(&path).expect("load");
        assert_eq!(ids, vec!["+15550001111", "@alice"]);
    }

    #[test]
    fn json_malformed_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_named(&dir, "ids.json", r#"{"rows": []}"#);
        assert!(load_identifiers(&path).is_err());
    }

    #[test]
    fn unknown_extension_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_named(&dir, "ids.xlsx", "whatever");
        let err = load_identifiers(&path).expect_err("must reject");
        assert!(format!("{err}").contains("unsupported input extension"));
    }

    #[test]
    fn missing_file_is_error() {
        assert!(load_identifiers(Path::new("/nonexistent/ids.txt")).is_err());
    }
}
