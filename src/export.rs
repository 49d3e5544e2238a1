use pageanchor_contract::{AnchorDescriptor, AnchorKind, descriptors_to_json};
use std::fmt::Write;

fn quote_block(out: &mut String, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        out.push_str(">\n");
        return;
    }
    for line in trimmed.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            out.push_str(">\n");
        } else {
            let _ = writeln!(out, "> {line}");
        }
    }
}

/// Markdown digest of a page's annotations, oldest first.
pub fn export_markdown(page_title: &str, url: &str, descriptors: &[AnchorDescriptor]) -> String {
    let mut ordered: Vec<&AnchorDescriptor> = descriptors.iter().filter(|d| d.url == url).collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let title = if page_title.trim().is_empty() {
        url
    } else {
        page_title.trim()
    };
    let mut out = String::new();
    let _ = writeln!(out, "# {title}");
    out.push('\n');
    let _ = writeln!(out, "<{url}>");

    let notes = ordered.iter().filter(|d| d.kind == AnchorKind::Note).count();
    out.push('\n');
    let _ = writeln!(
        out,
        "{} annotation(s): {} highlight(s), {} note(s)",
        ordered.len(),
        ordered.len() - notes,
        notes
    );

    for descriptor in ordered {
        out.push('\n');
        let _ = writeln!(
            out,
            "## {} ({})",
            match descriptor.kind {
                AnchorKind::Highlight => "Highlight",
                AnchorKind::Note => "Note",
            },
            descriptor.color.name()
        );
        out.push('\n');
        quote_block(&mut out, &descriptor.captured_text);
        if let Some(comment) = descriptor.comment.as_deref().filter(|c| !c.trim().is_empty()) {
            out.push('\n');
            for line in comment.trim().lines() {
                let _ = writeln!(out, "{}", line.trim_end());
            }
        }
    }
    out
}

pub fn export_json(descriptors: &[AnchorDescriptor]) -> Result<String, serde_json::Error> {
    descriptors_to_json(descriptors)
}
