use std::path::Path;

use anyhow::Context;

use crate::domains::Dependencies;
use crate::ingest::import::{parse_netscape, parse_pocket_csv, parse_pocket_html};
use crate::ingest::{ImportReport, ParsedImport, export_netscape};
use crate::types::GetBookmarksOptions;

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_report(report: &ImportReport) {
    for skipped in &report.skipped {
        eprintln!("Skip {}: {}", skipped.url, skipped.reason);
    }
    println!(
        "Imported {} bookmark(s), skipped {}",
        report.imported.len(),
        report.skipped.len()
    );
}

/// Imports a Netscape bookmark file.
pub async fn run_import(
    deps: &Dependencies,
    file: &Path,
    generate_tag: bool,
    online: bool,
) -> anyhow::Result<()> {
    let html = read_file(file)?;
    let parsed = parse_netscape(&html, generate_tag)?;
    let report = deps.ingest().import(parsed, online).await?;
    print_report(&report);
    Ok(())
}

/// Imports a Pocket export, either the CSV or the older HTML format.
pub async fn run_pocket(deps: &Dependencies, file: &Path) -> anyhow::Result<()> {
    let data = read_file(file)?;
    let parsed: ParsedImport = if data.trim_start().starts_with('<') {
        parse_pocket_html(&data)?
    } else {
        parse_pocket_csv(&data)?
    };
    let report = deps.ingest().import(parsed, false).await?;
    print_report(&report);
    Ok(())
}

/// Writes every bookmark to a Netscape bookmark file.
pub async fn run_export(deps: &Dependencies, file: &Path) -> anyhow::Result<()> {
    let bookmarks = deps
        .bookmarks()
        .find(&GetBookmarksOptions::default())
        .await?;
    if bookmarks.is_empty() {
        anyhow::bail!("No bookmarks to export");
    }

    if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(file, export_netscape(&bookmarks))
        .with_context(|| format!("Failed to write {}", file.display()))?;

    println!("Exported {} bookmark(s) to {}", bookmarks.len(), file.display());
    Ok(())
}
