//! Portfolio archive export

use crate::models::{PortfolioItem, User};
use anyhow::Result;
use serde::Serialize;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Serialize)]
struct PortfolioManifest<'a> {
    owner: &'a str,
    exported_at: i64,
    item_count: usize,
    items: &'a [PortfolioItem],
}

/// Lowercase ASCII slug, at most 48 chars, `item` when nothing is left
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 48 {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

fn item_markdown(item: &PortfolioItem) -> String {
    let mut md = format!("# {}\n\n", item.title);
    if !item.tags.is_empty() {
        md.push_str(&format!("Tags: {}\n\n", item.tags.join(", ")));
    }
    if let Some(ref submission) = item.submission_id {
        md.push_str(&format!("Submission: {}\n\n", submission));
    }
    md.push_str(&item.description);
    md.push('\n');
    md
}

/// Build a ZIP with `portfolio.json` and one Markdown file per item
pub fn build_portfolio_archive(
    owner: &User,
    items: &[PortfolioItem],
    exported_at: i64,
) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = PortfolioManifest {
        owner: &owner.name,
        exported_at,
        item_count: items.len(),
        items,
    };
    zip.start_file("portfolio.json", options)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

    for (i, item) in items.iter().enumerate() {
        let name = format!("items/{:02}-{}.md", i + 1, slugify(&item.title));
        zip.start_file(name, options)?;
        zip.write_all(item_markdown(item).as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}
