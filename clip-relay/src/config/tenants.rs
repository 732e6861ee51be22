//! Profiles file parsing.
//!
//! One tenant per line: `profileId|apiKey|channelId1,channelId2,...`.
//! Blank lines and `#` comments are ignored. Lines with fewer than three
//! fields are skipped with a warning; a bad line never fails the whole file.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::Result;
use crate::domain::Tenant;

/// A line that could not be turned into a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line_no: usize,
    pub reason: String,
}

/// Result of parsing a profiles file.
#[derive(Debug, Clone, Default)]
pub struct TenantFile {
    pub tenants: Vec<Tenant>,
    pub skipped: Vec<SkippedLine>,
}

/// Parse profiles file content.
pub fn parse_tenants(content: &str) -> TenantFile {
    let mut file = TenantFile::default();
    let mut seen = HashSet::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 3 {
            let reason = format!("expected 3 '|'-separated fields, found {}", parts.len());
            warn!(line = line_no, "Skipping malformed profile line: {}", reason);
            file.skipped.push(SkippedLine { line_no, reason });
            continue;
        }

        let id = parts[0];
        if id.is_empty() {
            let reason = "empty profile id".to_string();
            warn!(line = line_no, "Skipping malformed profile line: {}", reason);
            file.skipped.push(SkippedLine { line_no, reason });
            continue;
        }

        if !seen.insert(id.to_string()) {
            let reason = format!("duplicate profile id '{}'", id);
            warn!(line = line_no, "Skipping profile line: {}", reason);
            file.skipped.push(SkippedLine { line_no, reason });
            continue;
        }

        let sources = parts[2]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        file.tenants.push(Tenant {
            id: id.to_string(),
            credential: parts[1].to_string(),
            sources,
        });
    }

    file
}

/// Read and parse a profiles file.
pub async fn load_tenants_file(path: &Path) -> Result<TenantFile> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        crate::Error::config(format!(
            "cannot read profiles file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse_tenants(&content))
}
