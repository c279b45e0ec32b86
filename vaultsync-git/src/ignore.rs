//! `.gitignore` rendering from configured pattern groups.
//!
//! Known categories render first in a fixed order with descriptive headers;
//! any other category follows in name order, headed by its own name. Empty
//! categories are omitted.

use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};
use vaultsync_core::IgnoreGroups;

use crate::error::{io_err, GitError};

pub const IGNORE_FILE: &str = ".gitignore";

const TEMPLATE_NAME: &str = "gitignore.tera";
const TEMPLATE: &str = include_str!("templates/gitignore.tera");

const KNOWN_SECTIONS: &[(&str, &str)] = &[
    ("obsidian", "Obsidian workspace (user-specific)"),
    ("system", "System files"),
    ("directories", "Directories"),
    ("custom", "Custom patterns"),
];

/// Result of [`write_ignore_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreWrite {
    Written,
    /// Existing file was byte-identical; nothing was touched.
    Unchanged,
}

#[derive(Debug, Serialize)]
struct Section<'a> {
    header: &'a str,
    patterns: &'a [String],
}

fn sections(groups: &IgnoreGroups) -> Vec<Section<'_>> {
    let known = KNOWN_SECTIONS.iter().filter_map(|&(key, header)| {
        groups.get(key).map(|patterns| Section {
            header,
            patterns,
        })
    });
    let extra = groups
        .iter()
        .filter(|(key, _)| !KNOWN_SECTIONS.iter().any(|(k, _)| *k == key.as_str()))
        .map(|(key, patterns)| Section {
            header: key,
            patterns,
        });
    known
        .chain(extra)
        .filter(|s| !s.patterns.is_empty())
        .collect()
}

/// Render the ignore file contents.
pub fn render_ignore(groups: &IgnoreGroups) -> Result<String, GitError> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;

    let mut ctx = Context::new();
    ctx.insert("sections", &sections(groups));
    Ok(tera.render(TEMPLATE_NAME, &ctx)?)
}

/// Write `<vault>/.gitignore` unless the existing file already matches.
pub fn write_ignore_file(vault: &Path, groups: &IgnoreGroups) -> Result<IgnoreWrite, GitError> {
    let path = vault.join(IGNORE_FILE);
    let rendered = render_ignore(groups)?;

    if path.exists() {
        let existing = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        if existing == rendered {
            tracing::debug!(path = %path.display(), "ignore file already up to date");
            return Ok(IgnoreWrite::Unchanged);
        }
    }

    std::fs::write(&path, rendered).map_err(|e| io_err(&path, e))?;
    tracing::debug!(
        path = %path.display(),
        sections = ?groups.iter().filter(|(_, v)| !v.is_empty()).map(|(k, _)| k).collect::<Vec<_>>(),
        "ignore file written",
    );
    Ok(IgnoreWrite::Written)
}
