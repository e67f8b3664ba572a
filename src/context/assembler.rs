// ABOUTME: Context assembler: joins the selected notebook pages into one system instruction.
// ABOUTME: Drops each page's three-line header, sorts by path, and skips unreadable files.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::set::ContextSet;

/// Number of header lines (content type, wiki format, creation date) at the top of a page.
pub const PAGE_HEADER_LINES: usize = 3;

/// Separator between the prefix and each page body.
const SEPARATOR: &str = "\n\n";

/// The assembled instruction plus the pages that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    pub text: String,
    pub included: Vec<String>,
    pub skipped: Vec<PathBuf>,
}

/// Build the system instruction text from the selected pages.
pub fn assemble(set: &ContextSet, root: &Path, prefix: &str) -> String {
    assemble_with_report(set, root, prefix).text
}

/// Like [`assemble`], also reporting which pages were used and which were skipped.
pub fn assemble_with_report(set: &ContextSet, root: &Path, prefix: &str) -> AssembledContext {
    let mut pages: Vec<&str> = set
        .selected()
        .map(|(_, entry)| entry.relative_path.as_str())
        .collect();
    pages.sort_unstable();

    let mut text = prefix.to_string();
    let mut included = Vec::new();
    let mut skipped = Vec::new();

    for relative_path in pages {
        let path = root.join(relative_path);
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                text.push_str(SEPARATOR);
                text.push_str(&page_body(&raw));
                included.push(relative_path.to_string());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable page");
                skipped.push(path);
            }
        }
    }

    debug!(
        included = included.len(),
        skipped = skipped.len(),
        bytes = text.len(),
        "assembled context"
    );

    AssembledContext {
        text,
        included,
        skipped,
    }
}

/// Page content without its header lines or trailing line breaks.
fn page_body(raw: &str) -> String {
    let body: String = raw.split_inclusive('\n').skip(PAGE_HEADER_LINES).collect();
    body.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Content-Type: text/x-zim-wiki\nWiki-Format: zim 0.6\nCreation-Date: 2024-01-01T10:00:00+00:00\n";

    fn write_page(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{HEADER}{body}")).unwrap();
    }

    #[test]
    fn page_body_drops_header_lines() {
        assert_eq!(page_body(&format!("{HEADER}Hello\nWorld\n")), "Hello\nWorld");
        assert_eq!(page_body("only\ntwo\n"), "");
        assert_eq!(page_body(""), "");
    }

    #[test]
    fn two_selected_pages_sorted_by_path() {
        let tmp = tempfile::tempdir().unwrap();
        write_page(tmp.path(), "a.txt", "Hello\n");
        write_page(tmp.path(), "b.txt", "World\n");

        let mut set = ContextSet::default();
        set.insert("2", "b.txt");
        set.insert("1", "a.txt");
        set.set_selected("1", true);
        set.set_selected("2", true);

        assert_eq!(assemble(&set, tmp.path(), "SYS:"), "SYS:\n\nHello\n\nWorld");
    }

    #[test]
    fn order_follows_path_not_key() {
        let tmp = tempfile::tempdir().unwrap();
        write_page(tmp.path(), "a.txt", "first");
        write_page(tmp.path(), "z.txt", "last");

        let mut set = ContextSet::default();
        set.insert("1", "z.txt");
        set.insert("9", "a.txt");
        set.set_selected("1", true);
        set.set_selected("9", true);

        assert_eq!(assemble(&set, tmp.path(), "P"), "P\n\nfirst\n\nlast");
    }

    #[test]
    fn unselected_pages_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        write_page(tmp.path(), "a.txt", "Hello");
        write_page(tmp.path(), "b.txt", "Secret");

        let mut set = ContextSet::default();
        set.insert("1", "a.txt");
        set.insert("2", "b.txt");
        set.set_selected("1", true);

        assert_eq!(assemble(&set, tmp.path(), "SYS:"), "SYS:\n\nHello");
    }

    #[test]
    fn nothing_selected_yields_prefix_only() {
        let tmp = tempfile::tempdir().unwrap();
        let set = ContextSet::default();
        assert_eq!(assemble(&set, tmp.path(), "SYS:"), "SYS:");
    }

    #[test]
    fn unreadable_page_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_page(tmp.path(), "Notes/b.txt", "World");

        let mut set = ContextSet::default();
        set.insert("1", "a.txt");
        set.insert("2", "Notes/b.txt");
        set.set_selected("1", true);
        set.set_selected("2", true);

        let report = assemble_with_report(&set, tmp.path(), "SYS:");
        assert_eq!(report.text, "SYS:\n\nWorld");
        assert_eq!(report.included, vec!["Notes/b.txt".to_string()]);
        assert_eq!(report.skipped, vec![tmp.path().join("a.txt")]);
    }
}
