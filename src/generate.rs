use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::DateParseError;
use crate::images::IMAGES_DIR;
use crate::types::{ArchiveItem, LocalImage, Like, MetadataSnapshot, ObservationSection};

pub const INDEX_FILE: &str = "index.html";
pub const POSTS_ONLY_FILE: &str = "posts-only.html";

const OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const DATE_FORMAT: &str = "%B %d, %Y at %I:%M %p";
const EXPORT_DATE_FORMAT: &str = "%B %d, %Y";
const DEFAULT_SENDER: &str = "Unknown";
const DEFAULT_LIKER: &str = "Someone";
const DEFAULT_REACTION: &str = "❤️";

/// A rendered page of the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Every item, observations included
    All,
    /// Items not tagged as observations
    PostsOnly,
}

impl View {
    pub const EVERY: [View; 2] = [View::All, View::PostsOnly];

    pub fn file_name(self) -> &'static str {
        match self {
            View::All => INDEX_FILE,
            View::PostsOnly => POSTS_ONLY_FILE,
        }
    }

    fn title(self) -> &'static str {
        match self {
            View::All => "Famly Feed Archive",
            View::PostsOnly => "Famly Feed Archive - Posts Only",
        }
    }

    fn nav_label(self) -> &'static str {
        match self {
            View::All => "All Posts &amp; Observations",
            View::PostsOnly => "Posts Only",
        }
    }

    fn count_label(self) -> &'static str {
        match self {
            View::All => "Total Items",
            View::PostsOnly => "Posts",
        }
    }

    /// Filters on the persisted embed tag, so an observation embed that
    /// never resolved is still kept out of the posts-only page.
    pub fn includes(self, item: &ArchiveItem) -> bool {
        match self {
            View::All => true,
            View::PostsOnly => !item.is_observation_embed(),
        }
    }
}

/// Both documents of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSite {
    pub all: String,
    pub posts_only: String,
}

/// Items of the snapshot that belong on a view, in snapshot order
pub fn view_items(snapshot: &MetadataSnapshot, view: View) -> Vec<&ArchiveItem> {
    snapshot
        .processed_items
        .iter()
        .filter(|item| view.includes(item))
        .collect()
}

/// Parse an ISO-8601 timestamp into the wall-clock time it was written in
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, DateParseError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, OFFSET_FORMAT) {
        return Ok(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(DateParseError {
        raw: raw.to_string(),
    })
}

/// Parse a timestamp into an absolute instant for ordering.
/// Values without an offset are taken as UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let trimmed = raw.trim();
    match DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, OFFSET_FORMAT))
    {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => parse_timestamp(trimmed).map(|naive| naive.and_utc()),
    }
}

fn format_with(raw: &str, format: &str) -> String {
    match parse_timestamp(raw) {
        Ok(dt) => dt.format(format).to_string(),
        Err(e) => {
            debug!(error = %e, "showing timestamp as-is");
            raw.to_string()
        }
    }
}

/// Long human-readable date, or the raw string when it cannot be parsed
pub fn format_date(raw: &str) -> String {
    format_with(raw, DATE_FORMAT)
}

// HTML generation helpers
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Rich text is trusted markup; only the plain fallback is escaped.
fn body_html(rich_text: &str, plain: &str) -> String {
    if !rich_text.is_empty() {
        rich_text.to_string()
    } else {
        html_escape(plain).replace('\n', "<br>")
    }
}

/// CSS styles for the site
fn css_styles() -> &'static str {
    r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    max-width: 800px;
    margin: 0 auto;
    padding: 20px;
    background-color: #f5f5f5;
}

.navigation { text-align: center; margin-bottom: 20px; }
.nav-link {
    display: inline-block;
    padding: 8px 16px;
    margin: 0 8px;
    background: #007bff;
    color: white;
    text-decoration: none;
    border-radius: 6px;
}
.nav-link:hover { background: #0056b3; }
.nav-link.current { background: #28a745; }

.archive-header {
    text-align: center;
    margin-bottom: 40px;
    padding: 20px;
    background: white;
    border-radius: 12px;
}
.stats { display: flex; justify-content: center; gap: 40px; margin-top: 16px; }
.stat { text-align: center; }
.stat-number { font-size: 24px; font-weight: 600; color: #333; }
.stat-label { color: #666; font-size: 14px; }

.feed-item {
    background: white;
    border-radius: 12px;
    margin-bottom: 24px;
    padding: 20px;
    box-shadow: 0 2px 8px rgba(0,0,0,0.1);
}
.sender { display: flex; align-items: center; margin-bottom: 12px; }
.sender-image {
    width: 40px;
    height: 40px;
    border-radius: 50%;
    margin-right: 12px;
    background-color: #ddd;
}
.sender-info { flex: 1; }
.sender-name { font-weight: 600; color: #333; }
.post-date, .receivers { color: #666; font-size: 14px; }
.receivers { margin-bottom: 12px; }
.post-body { margin-bottom: 16px; line-height: 1.5; }

.images-grid {
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
    gap: 12px;
    margin-bottom: 16px;
}
.image-container img { width: 100%; height: auto; border-radius: 8px; cursor: pointer; }

.likes { display: flex; align-items: center; gap: 8px; color: #666; font-size: 14px; }
.like { display: flex; align-items: center; gap: 4px; }

.observation {
    background: #f8f9fa;
    border-left: 4px solid #007bff;
    padding: 16px;
    margin: 16px 0;
    border-radius: 4px;
}
.observation h4 { margin: 0 0 12px 0; color: #007bff; }
.observation-text { margin: 12px 0; line-height: 1.5; }
.development-areas { margin: 12px 0; }
.area-tag {
    display: inline-block;
    background: #e9ecef;
    padding: 4px 8px;
    margin: 2px 4px 2px 0;
    border-radius: 12px;
    font-size: 12px;
    color: #495057;
}
"#
}

/// Generate page header HTML, including navigation between the views
fn page_header(view: View) -> String {
    let nav_html: String = View::EVERY
        .iter()
        .map(|v| {
            let class = if *v == view { "nav-link current" } else { "nav-link" };
            format!(
                r#"<a href="{}" class="{}">{}</a>"#,
                v.file_name(),
                class,
                v.nav_label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>{}</style>
</head>
<body>
    <div class="navigation">
        {}
    </div>
"#,
        view.title(),
        css_styles(),
        nav_html
    )
}

fn page_footer() -> &'static str {
    "\n</body>\n</html>\n"
}

fn archive_header(view: View, item_count: usize, photo_count: usize, export_date: Option<&str>) -> String {
    let exported = export_date
        .map(|d| format!("\n        <p>Exported on {}</p>", html_escape(&format_with(d, EXPORT_DATE_FORMAT))))
        .unwrap_or_default();

    format!(
        r#"
    <div class="archive-header">
        <h1>{}</h1>{}
        <div class="stats">
            <div class="stat">
                <div class="stat-number">{}</div>
                <div class="stat-label">{}</div>
            </div>
            <div class="stat">
                <div class="stat-number">{}</div>
                <div class="stat-label">Photos</div>
            </div>
        </div>
    </div>
"#,
        view.title(),
        exported,
        item_count,
        view.count_label(),
        photo_count
    )
}

fn images_grid(images: &[LocalImage], alt: &str, indent: &str) -> String {
    if images.is_empty() {
        return String::new();
    }

    let mut html = format!("{}<div class=\"images-grid\">\n", indent);
    for image in images {
        html.push_str(&format!(
            "{indent}    <div class=\"image-container\"><img src=\"{}/{}\" alt=\"{}\" loading=\"lazy\"></div>\n",
            IMAGES_DIR,
            html_escape(&image.filename),
            alt,
        ));
    }
    html.push_str(&format!("{}</div>\n", indent));
    html
}

fn observation_html(section: &ObservationSection, images: &[LocalImage]) -> String {
    let mut html = String::from("        <div class=\"observation\">\n            <h4>Observation</h4>\n");

    if let Some(author) = &section.author {
        html.push_str(&format!(
            "            <p><strong>Observer:</strong> {}</p>\n",
            html_escape(author)
        ));
    }

    let remark = body_html(&section.remark_rich_text_body, &section.remark_body);
    if !remark.is_empty() {
        html.push_str(&format!("            <div class=\"observation-text\">{}</div>\n", remark));
    }

    if !section.areas.is_empty() {
        html.push_str("            <div class=\"development-areas\">\n");
        html.push_str("                <strong>Development Areas:</strong>\n");
        for tag in &section.areas {
            html.push_str(&format!(
                "                <span class=\"area-tag\">{} ({})</span>\n",
                html_escape(&tag.area.title),
                html_escape(tag.refinement.as_deref().unwrap_or_default())
            ));
        }
        html.push_str("            </div>\n");
    }

    html.push_str(&images_grid(images, "Observation Photo", "            "));
    html.push_str("        </div>\n");
    html
}

fn likes_html(likes: &[Like]) -> String {
    if likes.is_empty() {
        return String::new();
    }

    let mut html = String::from("        <div class=\"likes\">\n");
    for like in likes {
        html.push_str(&format!(
            "            <div class=\"like\">{} {}</div>\n",
            html_escape(like.reaction.as_deref().unwrap_or(DEFAULT_REACTION)),
            html_escape(like.name.as_deref().unwrap_or(DEFAULT_LIKER))
        ));
    }
    html.push_str("        </div>\n");
    html
}

/// Render one feed item card
fn item_html(item: &ArchiveItem) -> String {
    let sender_name = item.sender.name.as_deref().unwrap_or(DEFAULT_SENDER);

    let mut html = format!(
        r#"
    <div class="feed-item">
        <div class="sender">
            <div class="sender-image"></div>
            <div class="sender-info">
                <div class="sender-name">{}</div>
                <div class="post-date">{}</div>
            </div>
        </div>
"#,
        html_escape(sender_name),
        html_escape(&format_date(&item.created_date))
    );

    if !item.receivers.is_empty() {
        html.push_str(&format!(
            "        <div class=\"receivers\">To: {}</div>\n",
            html_escape(&item.receivers.join(", "))
        ));
    }

    let body = body_html(&item.rich_text_body, &item.body);
    if !body.is_empty() {
        html.push_str(&format!("        <div class=\"post-body\">{}</div>\n", body));
    }

    html.push_str(&images_grid(&item.images, "Photo", "        "));

    if let Some(section) = &item.observation {
        html.push_str(&observation_html(section, &item.observation_images));
    }

    html.push_str(&likes_html(&item.likes));
    html.push_str("    </div>\n");
    html
}

/// Render a single view of the snapshot
pub fn render_view(snapshot: &MetadataSnapshot, view: View) -> String {
    let items = view_items(snapshot, view);
    let photos: usize = items.iter().map(|item| item.photo_count()).sum();

    let mut html = page_header(view);
    html.push_str(&archive_header(
        view,
        items.len(),
        photos,
        snapshot.export_date.as_deref(),
    ));
    for item in &items {
        html.push_str(&item_html(item));
    }
    html.push_str(page_footer());
    html
}

/// Render every view. Pure: the same snapshot always gives the same bytes.
pub fn render(snapshot: &MetadataSnapshot) -> RenderedSite {
    RenderedSite {
        all: render_view(snapshot, View::All),
        posts_only: render_view(snapshot, View::PostsOnly),
    }
}

/// Write both documents into `output_dir`
pub fn write_site(snapshot: &MetadataSnapshot, output_dir: &Path) -> Result<()> {
    let site = render(snapshot);
    for (view, html) in [(View::All, &site.all), (View::PostsOnly, &site.posts_only)] {
        let path = output_dir.join(view.file_name());
        fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Main generation function: render the archive next to its metadata file
pub fn run_generate(metadata_path: &Path, quiet: bool) -> Result<()> {
    let snapshot = MetadataSnapshot::load(metadata_path)?;
    let output_dir = metadata_path.parent().unwrap_or_else(|| Path::new(""));

    if !quiet {
        println!("Generating HTML archive from {}", metadata_path.display());
    }
    write_site(&snapshot, output_dir)?;

    let posts = view_items(&snapshot, View::PostsOnly).len();
    let total = snapshot.processed_items.len();
    let photos: usize = snapshot.processed_items.iter().map(|i| i.photo_count()).sum();

    if !quiet {
        println!("\nDone! Generated archive in {}", output_dir.display());
        println!("  Main archive: {}", output_dir.join(INDEX_FILE).display());
        println!("  Posts only:   {}", output_dir.join(POSTS_ONLY_FILE).display());
        println!(
            "  {} total items ({} posts, {} observations), {} photos archived",
            total,
            posts,
            total - posts,
            photos
        );
    }
    info!(total, posts, photos, "generated archive");

    Ok(())
}
