//! In-place patching of single version values in a descriptor.
//!
//! The file is scanned with a pull parser to find the byte span of the
//! target element's content; only that span is replaced. Formatting,
//! comments, and ordering elsewhere in the file survive byte-for-byte.
//! An empty element (`<version/>`) is expanded to `<version>v</version>`.

use std::fmt;
use std::ops::Range;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{BgavError, Result};

/// Where in a descriptor a version value lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    /// `project/version`
    ProjectVersion,
    /// `project/parent/version`
    ParentVersion,
    /// `project/dependencies/dependency[groupId, artifactId]/version`; every
    /// matching dependency is patched.
    DependencyVersion {
        group_id: String,
        artifact_id: String,
    },
    /// `project/properties/<key>`
    Property { key: String },
}

impl Location {
    fn matches(&self, path: &[String]) -> bool {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        match self {
            Self::ProjectVersion => path == ["project", "version"],
            Self::ParentVersion => path == ["project", "parent", "version"],
            Self::DependencyVersion { .. } => {
                path == ["project", "dependencies", "dependency", "version"]
            }
            Self::Property { key } => {
                path.len() == 3 && path[..2] == ["project", "properties"] && path[2] == key.as_str()
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectVersion => write!(f, "project version"),
            Self::ParentVersion => write!(f, "parent version"),
            Self::DependencyVersion {
                group_id,
                artifact_id,
            } => write!(f, "version of dependency {group_id}:{artifact_id}"),
            Self::Property { key } => write!(f, "property {key}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
enum Span {
    /// Text between `<x>` and `</x>`.
    Content(Range<usize>),
    /// A whole `<x/>` element, with its qualified name.
    Empty { range: Range<usize>, name: String },
}

impl Span {
    const fn start(&self) -> usize {
        match self {
            Self::Content(r) | Self::Empty { range: r, .. } => r.start,
        }
    }

    fn current<'t>(&self, text: &'t str) -> std::borrow::Cow<'t, str> {
        match self {
            Self::Content(r) => {
                let raw = &text[r.clone()];
                quick_xml::escape::unescape(raw.trim())
                    .unwrap_or(std::borrow::Cow::Borrowed(raw.trim()))
            }
            Self::Empty { .. } => std::borrow::Cow::Borrowed(""),
        }
    }
}

/// State for the dependency element currently open.
#[derive(Default)]
struct OpenDependency {
    group_id: Option<String>,
    artifact_id: Option<String>,
    versions: Vec<Span>,
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn local_name(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    raw.rsplit(':').next().unwrap_or_default().to_owned()
}

fn locate(text: &str, location: &Location) -> std::result::Result<Vec<Span>, quick_xml::Error> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<(String, usize)> = Vec::new();
    let mut dependency: Option<OpenDependency> = None;
    let mut found = Vec::new();

    let dependency_path = ["project", "dependencies", "dependency"];

    loop {
        let before = position(&reader);
        let event = reader.read_event()?;
        let after = position(&reader);
        match event {
            Event::Start(e) => {
                stack.push((local_name(e.name().as_ref()), after));
                if names(&stack) == dependency_path {
                    dependency = Some(OpenDependency::default());
                }
            }
            Event::Empty(e) => {
                let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut path = names(&stack);
                path.push(local_name(e.name().as_ref()));
                let span = Span::Empty {
                    range: before..after,
                    name: qname,
                };
                record(location, &path, span, text, &mut dependency, &mut found);
            }
            Event::End(_) => {
                let path = names(&stack);
                let Some((_, content_start)) = stack.pop() else {
                    continue;
                };
                if path == dependency_path {
                    if let (
                        Location::DependencyVersion {
                            group_id,
                            artifact_id,
                        },
                        Some(open),
                    ) = (location, dependency.take())
                        && open.group_id.as_deref().unwrap_or_default() == group_id.as_str()
                        && open.artifact_id.as_deref() == Some(artifact_id.as_str())
                    {
                        found.extend(open.versions);
                    }
                    continue;
                }
                let span = Span::Content(content_start..before);
                record(location, &path, span, text, &mut dependency, &mut found);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    found.sort_by_key(Span::start);
    Ok(found)
}

fn names(stack: &[(String, usize)]) -> Vec<String> {
    stack.iter().map(|(name, _)| name.clone()).collect()
}

fn record(
    location: &Location,
    path: &[String],
    span: Span,
    text: &str,
    dependency: &mut Option<OpenDependency>,
    found: &mut Vec<Span>,
) {
    if let Some(open) = dependency.as_mut()
        && path.len() == 4
        && path[..3] == ["project", "dependencies", "dependency"]
    {
        match path[3].as_str() {
            "groupId" => open.group_id = Some(span.current(text).into_owned()),
            "artifactId" => open.artifact_id = Some(span.current(text).into_owned()),
            "version" if location.matches(path) => open.versions.push(span),
            _ => {}
        }
        return;
    }
    if !matches!(location, Location::DependencyVersion { .. }) && location.matches(path) {
        found.push(span);
    }
}

fn scan(path: &Path, location: &Location) -> Result<(String, Vec<Span>)> {
    let text = std::fs::read_to_string(path).map_err(|e| BgavError::io(path, e))?;
    let spans = locate(&text, location).map_err(|e| BgavError::Descriptor {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if spans.is_empty() {
        return Err(BgavError::TargetMissing {
            path: path.to_path_buf(),
            location: location.to_string(),
        });
    }
    Ok((text, spans))
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

/// Read the current value at `location` (the first occurrence).
///
/// # Errors
/// [`BgavError::TargetMissing`] if the element does not exist.
pub fn read_value(path: &Path, location: &Location) -> Result<String> {
    let (text, spans) = scan(path, location)?;
    Ok(spans[0].current(&text).into_owned())
}

/// Set the value at `location` to `value`.
///
/// Returns `false` without touching the file when every occurrence already
/// holds `value`.
///
/// # Errors
/// [`BgavError::TargetMissing`] if the element does not exist; I/O errors
/// from the atomic write.
pub fn write_value_if_changed(path: &Path, location: &Location, value: &str) -> Result<bool> {
    let (text, spans) = scan(path, location)?;
    if spans.iter().all(|s| s.current(&text) == value) {
        tracing::trace!(path = %path.display(), %location, value, "already up to date");
        return Ok(false);
    }

    let escaped = quick_xml::escape::escape(value);
    let mut patched = text.clone();
    for span in spans.iter().rev() {
        match span {
            Span::Content(range) => patched.replace_range(range.clone(), &escaped),
            Span::Empty { range, name } => {
                patched.replace_range(range.clone(), &format!("<{name}>{escaped}</{name}>"));
            }
        }
    }

    super::write_atomic(path, patched.as_bytes())?;
    tracing::debug!(path = %path.display(), %location, value, "patched descriptor");
    Ok(true)
}
