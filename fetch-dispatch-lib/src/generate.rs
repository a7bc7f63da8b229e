//! Resource list generation.
//!
//! Helpers that produce the ordered resource list handed to the dispatcher:
//! URL templates filled with ids, id list parsing, random ids, and resource
//! files. None of this is used by the dispatcher itself.
//!
//! # Template Syntax
//!
//! Every `{id}` in the template is replaced with the id. Any other text is
//! kept as-is.
//!
//! # Examples
//!
//! ```
//! use fetch_dispatch_lib::generate::{expand_template, parse_id_list};
//!
//! let ids = parse_id_list("7,10-12").unwrap();
//! assert_eq!(ids, vec![7, 10, 11, 12]);
//!
//! let urls = expand_template("https://api.example.org/movie/{id}", &ids).unwrap();
//! assert_eq!(urls[0], "https://api.example.org/movie/7");
//! assert_eq!(urls.len(), 4);
//! ```

use crate::error::DispatchError;
use rand::Rng;
use std::ops::RangeInclusive;
use std::path::Path;

/// Placeholder substituted by [`expand_template`].
pub const ID_PLACEHOLDER: &str = "{id}";

/// Maximum number of ids a single list or random draw may produce.
pub const MAX_GENERATED: usize = 100_000;

/// Default range for random ids: six-digit numbers.
pub const DEFAULT_ID_RANGE: RangeInclusive<u64> = 100_000..=999_999;

/// Fill `template` once per id, preserving id order.
pub fn expand_template(template: &str, ids: &[u64]) -> Result<Vec<String>, DispatchError> {
    if !template.contains(ID_PLACEHOLDER) {
        return Err(DispatchError::invalid_input(
            template,
            format!("template must contain {}", ID_PLACEHOLDER),
        ));
    }

    Ok(ids
        .iter()
        .map(|id| template.replace(ID_PLACEHOLDER, &id.to_string()))
        .collect())
}

/// Parse a comma-separated list of ids and inclusive ranges.
///
/// `"1,5,10-12"` yields `[1, 5, 10, 11, 12]`. Whitespace around parts is
/// ignored; empty parts are skipped. Order and duplicates are preserved.
pub fn parse_id_list(list: &str) -> Result<Vec<u64>, DispatchError> {
    let mut ids = Vec::new();

    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_id(list, start)?;
                let end = parse_id(list, end)?;
                if start > end {
                    return Err(DispatchError::invalid_input(
                        list,
                        format!("range {}-{} is reversed", start, end),
                    ));
                }
                let span = usize::try_from(end - start).unwrap_or(usize::MAX);
                if span >= MAX_GENERATED - ids.len() {
                    return Err(too_many(list));
                }
                ids.extend(start..=end);
            }
            None => {
                if ids.len() >= MAX_GENERATED {
                    return Err(too_many(list));
                }
                ids.push(parse_id(list, part)?);
            }
        }
    }

    if ids.is_empty() {
        return Err(DispatchError::invalid_input(list, "no ids given"));
    }

    Ok(ids)
}

fn parse_id(list: &str, raw: &str) -> Result<u64, DispatchError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| DispatchError::invalid_input(list, format!("'{}' is not a valid id", raw.trim())))
}

fn too_many(list: &str) -> DispatchError {
    DispatchError::invalid_input(list, format!("expands to more than {} ids", MAX_GENERATED))
}

/// Draw `count` uniformly random ids from `range`.
///
/// Ids may repeat; repeated ids become independent work items.
pub fn random_ids(count: usize, range: RangeInclusive<u64>) -> Result<Vec<u64>, DispatchError> {
    if count > MAX_GENERATED {
        return Err(DispatchError::invalid_input(
            count.to_string(),
            format!("cannot generate more than {} ids", MAX_GENERATED),
        ));
    }
    if range.is_empty() {
        return Err(DispatchError::invalid_input(
            format!("{}-{}", range.start(), range.end()),
            "id range is empty",
        ));
    }

    let mut rng = rand::thread_rng();
    Ok((0..count).map(|_| rng.gen_range(range.clone())).collect())
}

/// Extract resources from text with one resource per line.
///
/// Blank lines and `#` comments are skipped. A trailing comment must be
/// preceded by whitespace, so URL fragments like `app#/route` are kept.
pub fn parse_resource_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let resource = strip_comment(line.trim()).trim_end();
            (!resource.is_empty()).then(|| resource.to_string())
        })
        .collect()
}

fn strip_comment(line: &str) -> &str {
    if line.starts_with('#') {
        return "";
    }
    line.char_indices()
        .find(|&(i, c)| c == '#' && line[..i].ends_with(char::is_whitespace))
        .map_or(line, |(i, _)| &line[..i])
}

/// Read a resource file.
///
/// # Errors
///
/// Fails if the file cannot be read or contains no resources.
pub fn read_resources_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, DispatchError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        DispatchError::file_error(path.to_string_lossy(), format!("Failed to read file: {}", e))
    })?;

    let resources = parse_resource_lines(&content);
    if resources.is_empty() {
        return Err(DispatchError::file_error(
            path.to_string_lossy(),
            "No resources found in the file",
        ));
    }

    Ok(resources)
}
