//! Reading declared dependencies out of a binary artifact.
//!
//! A wheel is a zip container holding a `<dist>-<version>.dist-info/METADATA`
//! member, an email-style header block. The `Requires-Dist` headers are the
//! raw dependency declarations; headers end at the first blank line and the
//! body that follows is free text we never look at.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Failure reading metadata out of one wheel. Soft at the call site: the
/// caller tries the next artifact.
#[derive(Debug, Error)]
pub enum WheelError {
    #[error("no dist-info metadata member in `{0}`")]
    MissingMetadata(String),

    #[error("unreadable wheel container: {0}")]
    Container(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extract the raw `Requires-Dist` declarations from a wheel.
pub fn read_requires_dist(wheel: &Path) -> Result<Vec<String>, WheelError> {
    let metadata = read_metadata(wheel)?;
    Ok(parse_header_values(&metadata, "Requires-Dist"))
}

/// Read the `*.dist-info/METADATA` member of a wheel as text.
pub fn read_metadata(wheel: &Path) -> Result<String, WheelError> {
    let file = std::fs::File::open(wheel)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let member_name = archive
        .file_names()
        .find(|name| is_metadata_member(name))
        .map(str::to_string)
        .ok_or_else(|| WheelError::MissingMetadata(wheel.display().to_string()))?;

    let mut member = archive.by_name(&member_name)?;
    let mut contents = String::new();
    member.read_to_string(&mut contents)?;
    Ok(contents)
}

/// `<anything>.dist-info/METADATA`, exactly one directory deep.
fn is_metadata_member(name: &str) -> bool {
    match name.split_once('/') {
        Some((dir, "METADATA")) => dir.ends_with(".dist-info"),
        _ => false,
    }
}

/// Collect every value of a header from an email-style header block.
fn parse_header_values(metadata: &str, header: &str) -> Vec<String> {
    let mut values = Vec::new();

    for line in metadata.lines() {
        // Headers end at the first blank line; below it is the description.
        if line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(header) {
            values.push(value.trim().to_string());
        }
    }

    values
}
