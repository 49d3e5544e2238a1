use crate::dom::{
    is_engine_node, logical_parent, resolve_split, structural_children, structural_parent,
    tag_name,
};
use kuchiki::NodeRef;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    Malformed { address: String, reason: &'static str },
    /// Evaluated against something other than a document node.
    Detached,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Malformed { address, reason } => {
                write!(f, "malformed address {:?}: {}", address, reason)
            }
            AddressError::Detached => write!(f, "address evaluated outside a document"),
        }
    }
}

impl std::error::Error for AddressError {}

/// Structural address of `node`, e.g. `/html/body/div[2]/p`.
///
/// Same-tag siblings get a 1-based `[n]`; a lone tag stays bare. The document
/// itself is `/`. Returns an empty string when the node is not attached to a
/// document. Engine-rendered wrappers are skipped and do not count as siblings;
/// an element cut in two by a marker is addressed as the element it was.
pub fn locate(node: &NodeRef) -> String {
    if node.as_document().is_some() {
        return "/".to_string();
    }
    let mut segments: Vec<String> = Vec::new();
    let mut current = resolve_split(node);
    loop {
        if current.as_document().is_some() {
            break;
        }
        let Some(tag) = tag_name(&current) else {
            return String::new();
        };
        if !is_engine_node(&current) {
            let Some(parent) = structural_parent(&current) else {
                return String::new();
            };
            segments.push(segment(&current, &tag, &parent));
        }
        match logical_parent(&current) {
            Some(parent) => current = parent,
            None => return String::new(),
        }
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

fn segment(node: &NodeRef, tag: &str, parent: &NodeRef) -> String {
    let same_tag: Vec<NodeRef> = structural_children(parent)
        .into_iter()
        .filter(|sibling| tag_name(sibling).as_deref() == Some(tag))
        .collect();
    if same_tag.len() < 2 {
        return tag.to_string();
    }
    let index = same_tag
        .iter()
        .position(|sibling| sibling == node)
        .map(|idx| idx + 1)
        .unwrap_or(1);
    format!("{tag}[{index}]")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    tag: String,
    index: Option<usize>,
}

fn parse_address(address: &str) -> Result<Vec<Step>, AddressError> {
    let malformed = |reason: &'static str| AddressError::Malformed {
        address: address.to_string(),
        reason,
    };
    let Some(rest) = address.strip_prefix('/') else {
        return Err(malformed("must start with '/'"));
    };
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let mut steps = Vec::new();
    for raw in rest.split('/') {
        if raw.is_empty() {
            return Err(malformed("empty step"));
        }
        let (tag, index) = match raw.find('[') {
            Some(open) => {
                let Some(inner) = raw[open + 1..].strip_suffix(']') else {
                    return Err(malformed("unterminated index"));
                };
                let index: usize = inner.parse().map_err(|_| malformed("index is not a number"))?;
                if index == 0 {
                    return Err(malformed("indices are 1-based"));
                }
                (&raw[..open], Some(index))
            }
            None => (raw, None),
        };
        let valid_tag = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));
        if !valid_tag {
            return Err(malformed("invalid tag name"));
        }
        steps.push(Step {
            tag: tag.to_ascii_lowercase(),
            index,
        });
    }
    Ok(steps)
}

/// First node matched by `address` in `document`.
///
/// Every step is applied to every node matched so far, so the result is the
/// first match in document order.
pub fn evaluate_address(document: &NodeRef, address: &str) -> Result<Option<NodeRef>, AddressError> {
    if document.as_document().is_none() {
        return Err(AddressError::Detached);
    }
    let steps = parse_address(address)?;
    let mut matched = vec![document.clone()];
    for step in &steps {
        let mut next = Vec::new();
        for context in &matched {
            let candidates = structural_children(context)
                .into_iter()
                .filter(|child| tag_name(child).as_deref() == Some(step.tag.as_str()));
            match step.index {
                Some(index) => next.extend(candidates.skip(index - 1).take(1)),
                None => next.extend(candidates),
            }
        }
        if next.is_empty() {
            return Ok(None);
        }
        matched = next;
    }
    Ok(matched.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    const PAGE: &str = r#"<html><body>
        <div><p id="intro">intro</p></div>
        <div>
          <p id="first">one</p>
          <span>x</span>
          <p id="second">two <b id="bold">bold</b></p>
        </div>
    </body></html>"#;

    #[test]
    fn locate_indexes_only_same_tag_siblings() {
        let doc = kuchiki::parse_html().one(PAGE);
        let second = doc.select_first("#second").expect("second");
        assert_eq!(locate(second.as_node()), "/html/body/div[2]/p[2]");
        let intro = doc.select_first("#intro").expect("intro");
        assert_eq!(locate(intro.as_node()), "/html/body/div[1]/p");
        let bold = doc.select_first("#bold").expect("bold");
        assert_eq!(locate(bold.as_node()), "/html/body/div[2]/p[2]/b");
        assert_eq!(locate(&doc), "/");
    }

    #[test]
    fn locate_is_deterministic() {
        let doc = kuchiki::parse_html().one(PAGE);
        let first = doc.select_first("#first").expect("first");
        assert_eq!(locate(first.as_node()), locate(first.as_node()));
    }

    #[test]
    fn locate_fails_for_detached_nodes() {
        let doc = kuchiki::parse_html().one(PAGE);
        let first = doc.select_first("#first").expect("first").as_node().clone();
        first.detach();
        assert_eq!(locate(&first), "");
        let text = first.first_child().expect("text");
        assert_eq!(locate(&text), "");
    }

    #[test]
    fn evaluate_finds_what_locate_emits() {
        let doc = kuchiki::parse_html().one(PAGE);
        for id in ["intro", "first", "second", "bold"] {
            let node = doc
                .select_first(&format!("#{id}"))
                .expect("fixture node")
                .as_node()
                .clone();
            let address = locate(&node);
            let found = evaluate_address(&doc, &address)
                .expect("valid address")
                .expect("node found");
            assert!(found == node, "address {address} resolved to another node");
        }
    }

    #[test]
    fn evaluate_returns_first_match_for_unindexed_steps() {
        let doc = kuchiki::parse_html().one(PAGE);
        let found = evaluate_address(&doc, "/html/body/div/p")
            .expect("valid")
            .expect("found");
        let intro = doc.select_first("#intro").expect("intro");
        assert!(found == *intro.as_node());
    }

    #[test]
    fn evaluate_reports_malformed_and_missing() {
        let doc = kuchiki::parse_html().one(PAGE);
        assert!(matches!(
            evaluate_address(&doc, "html/body"),
            Err(AddressError::Malformed { .. })
        ));
        assert!(matches!(
            evaluate_address(&doc, "/html//p"),
            Err(AddressError::Malformed { .. })
        ));
        assert!(matches!(
            evaluate_address(&doc, "/html/body/div[0]"),
            Err(AddressError::Malformed { .. })
        ));
        assert_eq!(evaluate_address(&doc, "/html/body/div[3]"), Ok(None));
        let body = doc.select_first("body").expect("body").as_node().clone();
        assert_eq!(evaluate_address(&body, "/html"), Err(AddressError::Detached));
    }

    #[test]
    fn markers_do_not_shift_addresses() {
        let doc = kuchiki::parse_html().one(
            r#"<html><body><p>a</p><mark class="pageanchor-highlight"><p id="inner">b</p></mark><div class="pageanchor-fallback"></div><p id="last">c</p></body></html>"#,
        );
        let inner = doc.select_first("#inner").expect("inner");
        assert_eq!(locate(inner.as_node()), "/html/body/p[2]");
        let last = doc.select_first("#last").expect("last");
        assert_eq!(locate(last.as_node()), "/html/body/p[3]");
        let found = evaluate_address(&doc, "/html/body/p[2]")
            .expect("valid")
            .expect("found");
        assert!(found == *inner.as_node());
    }
}
