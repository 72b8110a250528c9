//! Version stamping of JSON side files (`package.json` and the like).
//!
//! Each [`Modification`] sets one value addressed by a small path language:
//! `$.a.b[0].c`, `a.b`, or `$['key with.dots']`. The value `NewPomVersion` is
//! replaced by the root module's resulting version.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BgavError, Result};
use crate::walk::ReconciliationOutcome;

/// Placeholder value standing for the root module's resulting version.
pub const NEW_VERSION_TOKEN: &str = "NewPomVersion";

/// One `[[modify]]` entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Modification {
    /// JSON file, relative to the project directory.
    pub file: PathBuf,
    /// Path expression of the value to set.
    pub path: String,
    /// Value to write; [`NEW_VERSION_TOKEN`] is substituted.
    #[serde(default = "default_value")]
    pub value: String,
}

fn default_value() -> String {
    NEW_VERSION_TOKEN.to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(expression: &str) -> std::result::Result<Vec<Segment>, String> {
    let rest = expression.trim();
    let mut rest = rest.strip_prefix('$').unwrap_or(rest);
    let mut segments = Vec::new();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or("unclosed `[`")?;
            let inner = after[..close].trim();
            rest = &after[close + 1..];
            let quoted = inner
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
            segments.push(match quoted {
                Some(key) => Segment::Key(key.to_owned()),
                None => Segment::Index(
                    inner
                        .parse()
                        .map_err(|_| format!("`[{inner}]` is neither an index nor a quoted key"))?,
                ),
            });
            continue;
        }
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        segments.push(Segment::Key(rest[..end].to_owned()));
        rest = &rest[end..];
    }

    if segments.is_empty() {
        return Err("path selects the document root".to_owned());
    }
    Ok(segments)
}

/// Set the value at `segments` in `document`. Intermediate containers must
/// exist; a missing final object key is created.
fn set(document: &mut Value, segments: &[Segment], value: Value) -> std::result::Result<(), String> {
    let Some((last, parents)) = segments.split_last() else {
        return Err("empty path".to_owned());
    };
    let mut node = document;
    for segment in parents {
        node = match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => map
                .get_mut(key)
                .ok_or_else(|| format!("no member `{key}`"))?,
            (Segment::Index(i), Value::Array(items)) => {
                let len = items.len();
                items
                    .get_mut(*i)
                    .ok_or_else(|| format!("index {i} out of range ({len} elements)"))?
            }
            (segment, _) => return Err(format!("cannot descend into {segment:?}")),
        };
    }
    match (last, node) {
        (Segment::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Segment::Index(i), Value::Array(items)) => {
            let len = items.len();
            let slot = items
                .get_mut(*i)
                .ok_or_else(|| format!("index {i} out of range ({len} elements)"))?;
            *slot = value;
            Ok(())
        }
        (segment, _) => Err(format!("cannot set {segment:?} on a non-container")),
    }
}

/// Apply every modification under `project_dir`.
///
/// Files whose content does not change are left untouched and not reported.
///
/// # Errors
/// [`BgavError::Modify`] for malformed JSON or a path that cannot be set;
/// I/O errors reading or writing the files.
pub fn apply_all(
    project_dir: &Path,
    modifications: &[Modification],
    new_version: Option<&str>,
) -> Result<ReconciliationOutcome> {
    let mut outcome = ReconciliationOutcome::default();

    let mut by_file: BTreeMap<PathBuf, Vec<&Modification>> = BTreeMap::new();
    for m in modifications {
        by_file.entry(project_dir.join(&m.file)).or_default().push(m);
    }

    for (file, entries) in by_file {
        let text = std::fs::read_to_string(&file).map_err(|e| BgavError::io(&file, e))?;
        let original: Value = serde_json::from_str(&text).map_err(|e| BgavError::Modify {
            file: file.clone(),
            expression: String::new(),
            message: format!("invalid JSON: {e}"),
        })?;
        let mut document = original.clone();

        for entry in entries {
            let modify_error = |message: String| BgavError::Modify {
                file: file.clone(),
                expression: entry.path.clone(),
                message,
            };
            let value = if entry.value == NEW_VERSION_TOKEN {
                new_version
                    .ok_or_else(|| modify_error("the root module has no version".to_owned()))?
                    .to_owned()
            } else {
                entry.value.clone()
            };
            let segments = parse_path(&entry.path).map_err(modify_error)?;
            set(&mut document, &segments, Value::String(value)).map_err(modify_error)?;
        }

        if document == original {
            tracing::debug!(file = %file.display(), "side file already up to date");
            continue;
        }
        let mut rendered = serde_json::to_string_pretty(&document).map_err(|e| BgavError::Modify {
            file: file.clone(),
            expression: String::new(),
            message: e.to_string(),
        })?;
        if text.ends_with('\n') {
            rendered.push('\n');
        }
        crate::pom::write_atomic(&file, rendered.as_bytes())?;
        tracing::info!(file = %file.display(), "side file updated");

        let name = file
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        outcome.record(&file, &name);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn entry(file: &str, path: &str, value: &str) -> Modification {
        Modification {
            file: PathBuf::from(file),
            path: path.to_owned(),
            value: value.to_owned(),
        }
    }

    #[test]
    fn path_syntax() {
        assert_eq!(
            parse_path("$.a.b[2].c").unwrap(),
            vec![
                Segment::Key("a".to_owned()),
                Segment::Key("b".to_owned()),
                Segment::Index(2),
                Segment::Key("c".to_owned()),
            ]
        );
        assert_eq!(
            parse_path("$['x.y']").unwrap(),
            vec![Segment::Key("x.y".to_owned())]
        );
        assert_eq!(parse_path("version").unwrap(), vec![Segment::Key("version".to_owned())]);
        assert!(parse_path("$").is_err());
        assert!(parse_path("$.a[b]").is_err());
        assert!(parse_path("$.a[1").is_err());
    }

    #[test]
    fn set_requires_existing_parents() {
        let mut doc = json!({"a": {"list": [{"v": 1}]}});
        set(&mut doc, &parse_path("$.a.list[0].v").unwrap(), json!("2")).unwrap();
        set(&mut doc, &parse_path("$.a.new").unwrap(), json!("n")).unwrap();
        assert_eq!(doc, json!({"a": {"list": [{"v": "2"}], "new": "n"}}));
        assert!(set(&mut doc, &parse_path("$.missing.v").unwrap(), json!(1)).is_err());
        assert!(set(&mut doc, &parse_path("$.a.list[3]").unwrap(), json!(1)).is_err());
    }

    #[test]
    fn stamps_new_version_and_preserves_key_order() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("package.json");
        fs::write(&file, "{\n  \"name\": \"shop\",\n  \"version\": \"1.0.0\",\n  \"private\": true\n}\n").unwrap();

        let mods = [entry("package.json", "$.version", NEW_VERSION_TOKEN)];
        let outcome = apply_all(dir.path(), &mods, Some("1.0.0-NCX-9-SNAPSHOT")).unwrap();
        assert!(outcome.needs_persistence);
        assert!(outcome.touched_files.contains(&file));
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "{\n  \"name\": \"shop\",\n  \"version\": \"1.0.0-NCX-9-SNAPSHOT\",\n  \"private\": true\n}\n"
        );

        let again = apply_all(dir.path(), &mods, Some("1.0.0-NCX-9-SNAPSHOT")).unwrap();
        assert_eq!(again, ReconciliationOutcome::default());
    }

    #[test]
    fn literal_values_and_no_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"k": "old"}"#).unwrap();
        apply_all(dir.path(), &[entry("a.json", "k", "new")], None).unwrap();
        let doc: Value = serde_json::from_str(&fs::read_to_string(dir.path().join("a.json")).unwrap()).unwrap();
        assert_eq!(doc, json!({"k": "new"}));

        assert_eq!(
            apply_all(dir.path(), &[], Some("1")).unwrap(),
            ReconciliationOutcome::default()
        );
    }

    #[test]
    fn unsettable_path_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"k": 1}"#).unwrap();
        let err = apply_all(dir.path(), &[entry("a.json", "$.k.deeper", "x")], None).unwrap_err();
        assert!(matches!(err, BgavError::Modify { .. }), "{err}");
    }
}
