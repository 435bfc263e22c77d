//! Reading and rewriting the economy core manifest (`cfgeconomycore.xml`).
//!
//! Reading is a full XML parse. Rewriting is line-oriented so everything the
//! tool does not own (comments, other elements, formatting) is preserved:
//!
//! - lines inside `<!-- ... -->` regions are copied verbatim, including
//!   comments that open in the middle of a line;
//! - a `<ce folder="...">` block for the export folder is replaced with a
//!   fresh block listing the exported files, sorted;
//! - any other live `<ce>` block is wrapped in a comment;
//! - if no block for the folder existed, one is inserted before the closing
//!   root tag, one indent level deeper than that tag.
//!
//! Rewriting the output again with the same inputs yields the same text.

use quick_xml::escape::escape;

use crate::error::Error;
use crate::xml::{parse_document, XML_DECLARATION};

const INDENT: &str = "    ";

/// One `<file>` entry of a `<ce>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub folder: String,
    pub name: String,
    pub kind: Option<String>,
}

/// Backslashes become `/`, leading and trailing slashes are dropped.
pub fn normalize_folder(folder: &str) -> String {
    folder.replace('\\', "/").trim_matches('/').to_string()
}

/// List every file declared in the manifest, in document order.
pub fn read_manifest(xml: &str) -> Result<Vec<ManifestFile>, Error> {
    let root = parse_document(xml)?;
    let mut out = Vec::new();
    for ce in root.descendants().into_iter().filter(|n| n.tag == "ce") {
        let Some(folder) = ce.attr("folder") else {
            continue;
        };
        let folder = normalize_folder(folder);
        for file in ce.children.iter().filter(|c| c.tag == "file") {
            let Some(name) = file.attr("name") else {
                continue;
            };
            out.push(ManifestFile {
                folder: folder.clone(),
                name: name.to_string(),
                kind: file.attr("type").map(str::to_string),
            });
        }
    }
    Ok(out)
}

/// Rewrite manifest text so exactly one live block lists `files` under
/// `folder`. `existing` is `None` (or blank) when the manifest does not exist.
pub fn sync_manifest(existing: Option<&str>, folder: &str, files: &[String]) -> String {
    let folder = normalize_folder(folder);
    let mut files: Vec<&str> = files.iter().map(String::as_str).collect();
    files.sort_unstable();
    files.dedup();

    let existing = match existing {
        Some(text) if !text.trim().is_empty() => text,
        _ => return fresh_manifest(&folder, &files),
    };

    let newline = if existing.contains("\r\n") { "\r\n" } else { "\n" };
    let lines: Vec<&str> = existing.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + files.len() + 2);
    let mut replaced = false;
    let mut in_comment = false;
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim_start();

        if in_comment || trimmed.starts_with("<!--") {
            in_comment = comment_open_after(lines[i], in_comment);
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        if is_block_open(trimmed) {
            let end = block_end(&lines, i);
            let indent = leading_ws(lines[i]);
            let block_folder = attr_value(trimmed, "folder").map(|f| normalize_folder(&f));
            if block_folder.as_deref() == Some(folder.as_str()) {
                if !replaced {
                    out.extend(render_block(indent, &folder, &files));
                    replaced = true;
                }
            } else {
                out.push(format!("{}<!--", indent));
                for line in &lines[i..=end] {
                    out.push(line.replace("--", "- -"));
                }
                out.push(format!("{}-->", indent));
            }
            i = end + 1;
            continue;
        }

        in_comment = comment_open_after(lines[i], false);
        out.push(lines[i].to_string());
        i += 1;
    }

    if !replaced {
        match out.iter().rposition(|l| is_root_close(l)) {
            Some(pos) => {
                let indent = format!("{}{}", leading_ws(&out[pos]), INDENT);
                let block = render_block(&indent, &folder, &files);
                out.splice(pos..pos, block);
            }
            None => return fresh_manifest(&folder, &files),
        }
    }

    let mut text = out.join(newline);
    if existing.ends_with('\n') {
        text.push_str(newline);
    }
    text
}

fn fresh_manifest(folder: &str, files: &[&str]) -> String {
    let mut lines = vec![XML_DECLARATION.to_string(), "<economy>".to_string()];
    lines.extend(render_block(INDENT, folder, files));
    lines.push("</economy>".to_string());
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn render_block(indent: &str, folder: &str, files: &[&str]) -> Vec<String> {
    let mut block = Vec::with_capacity(files.len() + 2);
    block.push(format!("{}<ce folder=\"{}\">", indent, escape(folder)));
    for file in files {
        block.push(format!(
            "{}{}<file name=\"{}\" type=\"types\" />",
            indent,
            INDENT,
            escape(*file)
        ));
    }
    block.push(format!("{}</ce>", indent));
    block
}

/// Whether a comment is still open at the end of `line`, given whether one
/// was open at its start.
fn comment_open_after(line: &str, mut inside: bool) -> bool {
    let mut rest = line;
    loop {
        let (marker, next) = if inside { ("-->", false) } else { ("<!--", true) };
        match rest.find(marker) {
            Some(pos) => {
                rest = &rest[pos + marker.len()..];
                inside = next;
            }
            None => return inside,
        }
    }
}

fn is_block_open(trimmed: &str) -> bool {
    trimmed
        .strip_prefix("<ce")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
}

/// Index of the line closing the block opened at `start`.
fn block_end(lines: &[&str], start: usize) -> usize {
    let opening = lines[start].trim_end();
    if opening.contains("</ce>") || (opening.ends_with("/>") && !opening.contains("<file")) {
        return start;
    }
    (start + 1..lines.len())
        .find(|&j| lines[j].contains("</ce>"))
        .unwrap_or(lines.len() - 1)
}

fn is_root_close(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("</") && !trimmed.starts_with("</ce>")
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn attr_value(tag_text: &str, attr: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let needle = format!("{}={}", attr, quote);
        if let Some(start) = tag_text.find(&needle) {
            let rest = &tag_text[start + needle.len()..];
            let end = rest.find(quote)?;
            return Some(rest[..end].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<economycore>
    <!-- custom loot
         keep this -->
    <classes>
        <rootclass name="DefaultWeapon" />
    </classes>
    <ce folder="db">
        <file name="types.xml" type="types" />
    </ce>
    <ce folder="exported-types">
        <file name="old.xml" type="types" />
    </ce>
</economycore>
"#;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replaces_target_block_and_disables_others() {
        let out = sync_manifest(
            Some(MANIFEST),
            "exported-types",
            &files(&["weapons.xml", "misc.xml"]),
        );
        let expected = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<economycore>
    <!-- custom loot
         keep this -->
    <classes>
        <rootclass name="DefaultWeapon" />
    </classes>
    <!--
    <ce folder="db">
        <file name="types.xml" type="types" />
    </ce>
    -->
    <ce folder="exported-types">
        <file name="misc.xml" type="types" />
        <file name="weapons.xml" type="types" />
    </ce>
</economycore>
"#;
        assert_eq!(out, expected);
    }

    #[test]
    fn sync_is_idempotent() {
        let once = sync_manifest(Some(MANIFEST), "exported-types", &files(&["a.xml"]));
        let twice = sync_manifest(Some(&once), "exported-types", &files(&["a.xml"]));
        assert_eq!(once, twice);
    }

    #[test]
    fn comments_are_preserved_verbatim() {
        let out = sync_manifest(Some(MANIFEST), "new", &files(&["a.xml"]));
        assert!(out.contains("    <!-- custom loot\n         keep this -->\n"));
    }

    #[test]
    fn inserts_block_before_closing_root() {
        let manifest = "<economycore>\n    <classes/>\n</economycore>\n";
        let out = sync_manifest(Some(manifest), "exported-types", &files(&["misc.xml"]));
        assert_eq!(
            out,
            "<economycore>\n    <classes/>\n    <ce folder=\"exported-types\">\n        <file name=\"misc.xml\" type=\"types\" />\n    </ce>\n</economycore>\n"
        );
    }

    #[test]
    fn creates_manifest_when_missing() {
        let out = sync_manifest(None, "exported-types", &files(&["misc.xml"]));
        assert!(out.starts_with(XML_DECLARATION));
        let entries = read_manifest(&out).unwrap();
        assert_eq!(
            entries,
            vec![ManifestFile {
                folder: "exported-types".to_string(),
                name: "misc.xml".to_string(),
                kind: Some("types".to_string()),
            }]
        );
    }

    #[test]
    fn folder_match_is_normalized_and_duplicates_dropped() {
        let manifest = "<economycore>\n  <ce folder=\"\\exported-types\\\">\n    <file name=\"x.xml\" type=\"types\" />\n  </ce>\n  <ce folder=\"exported-types/\">\n  </ce>\n</economycore>";
        let out = sync_manifest(Some(manifest), "exported-types", &files(&["y.xml"]));
        assert_eq!(out.matches("<ce folder=").count(), 1);
        assert!(out.contains("  <ce folder=\"exported-types\">"));
        assert!(!out.ends_with('\n'));
    }

    #[test]
    fn preserves_crlf_line_endings() {
        let manifest = "<economycore>\r\n    <ce folder=\"db\">\r\n    </ce>\r\n</economycore>\r\n";
        let out = sync_manifest(Some(manifest), "db", &files(&["types.xml"]));
        assert!(out.contains("\r\n        <file name=\"types.xml\" type=\"types\" />\r\n"));
        assert!(!out.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn disabled_block_with_inline_comment_stays_well_formed() {
        let manifest = "<economycore>\n    <ce folder=\"db\"> <!-- main -->\n        <file name=\"types.xml\" type=\"types\" />\n    </ce>\n</economycore>\n";
        let out = sync_manifest(Some(manifest), "exported-types", &files(&["a.xml"]));
        let entries = read_manifest(&out).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].folder, "exported-types");
    }

    #[test]
    fn comment_opened_mid_line_is_left_alone() {
        let manifest = "<economycore>\n    <classes/> <!-- old setup\n    <ce folder=\"legacy\">\n        <file name=\"old.xml\" type=\"types\" />\n    </ce>\n    -->\n</economycore>\n";
        let out = sync_manifest(Some(manifest), "exported-types", &files(&["a.xml"]));
        assert!(out.starts_with(
            "<economycore>\n    <classes/> <!-- old setup\n    <ce folder=\"legacy\">\n        <file name=\"old.xml\" type=\"types\" />\n    </ce>\n    -->\n    <ce folder=\"exported-types\">"
        ));
        assert_eq!(out.matches("<!--").count(), 1);
        let entries = read_manifest(&out).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].folder, "exported-types");
    }

    #[test]
    fn comment_open_state_spans_lines() {
        assert!(comment_open_after("<a/> <!-- x", false));
        assert!(!comment_open_after("<!-- x --> <b/>", false));
        assert!(comment_open_after("still inside", true));
        assert!(!comment_open_after("done --> <c/>", true));
        assert!(comment_open_after("done --> <!-- again", true));
    }

    #[test]
    fn reads_files_with_normalized_folders() {
        let entries = read_manifest(MANIFEST).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].folder, "db");
        assert_eq!(entries[1].name, "old.xml");
    }
}
