//! A small element tree over quick-xml.
//!
//! SBML documents are small enough to hold in memory, and both the model
//! loader and the structural checker need random access plus source
//! positions, so the stream is folded into [`Element`]s once.

use crate::core::error::XmlError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Deepest element nesting [`parse_document`] accepts. Dropping and walking
/// an [`Element`] recurses per level.
pub const MAX_DEPTH: usize = 256;

/// One XML element with its source position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Qualified tag name as written, e.g. `fbc:fluxObjective`.
    pub name: String,
    /// Attributes in document order, keys as written.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Concatenated text content (trimmed).
    pub text: String,
    /// Byte offset of the opening `<`.
    pub offset: usize,
}

fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

impl Element {
    /// Tag name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Attribute by exact (possibly prefixed) key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute by local key, ignoring any namespace prefix.
    ///
    /// Unprefixed keys win over prefixed ones.
    pub fn attr_local(&self, key: &str) -> Option<&str> {
        self.attr(key).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.contains(':') && !k.starts_with("xmlns") && local(k) == key)
                .map(|(_, v)| v.as_str())
        })
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.local_name() == name)
    }

    /// Children of the first `list` child that are named `item`,
    /// e.g. `listOfSpecies` / `species`.
    pub fn list_items<'a>(&'a self, list: &str, item: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child(list)
            .into_iter()
            .flat_map(move |l| l.children_named(item))
    }

    /// Depth-first iterator over this element and all descendants.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            out.push(element);
            stack.extend(element.children.iter().rev());
        }
        out
    }
}

/// Maps byte offsets to 1-based line and column numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of a source buffer.
    pub fn new(source: &[u8]) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Line and column (both 1-based) of a byte offset.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}

/// A parsed document plus the index needed to report positions.
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element.
    pub root: Element,
    /// Offset to line/column mapping for the source.
    pub lines: LineIndex,
}

impl Document {
    /// Line and column of an element's opening tag.
    pub fn position_of(&self, element: &Element) -> (usize, usize) {
        self.lines.position(element.offset)
    }
}

fn start_element(e: &BytesStart<'_>, offset: usize) -> Result<Element, String> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| format!("invalid tag name: {e}"))?
        .to_string();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("attribute error: {e}"))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| format!("attribute key error: {e}"))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("attribute value error: {e}"))?
            .to_string();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        offset,
        ..Element::default()
    })
}

/// Parse a complete document.
pub fn parse_document(source: &[u8]) -> Result<Document, XmlError> {
    let lines = LineIndex::new(source);
    let fail = |message: String, offset: usize| {
        let (line, column) = lines.position(offset.min(source.len()));
        XmlError {
            message,
            offset,
            line,
            column,
        }
    };

    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event_into(&mut buf);
        let end = reader.buffer_position() as usize;
        // The opening '<' of the tag just read; '<' cannot occur inside a tag.
        let tag_start = source[..end.min(source.len())]
            .iter()
            .rposition(|b| *b == b'<')
            .unwrap_or(0);

        match event {
            Ok(Event::Start(ref e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(fail(
                        format!("elements nested deeper than {MAX_DEPTH} levels"),
                        tag_start,
                    ));
                }
                let element = start_element(e, tag_start).map_err(|m| fail(m, tag_start))?;
                stack.push(element);
            }
            Ok(Event::Empty(ref e)) => {
                let element = start_element(e, tag_start).map_err(|m| fail(m, tag_start))?;
                attach(&mut stack, &mut root, element).map_err(|m| fail(m, tag_start))?;
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element).map_err(|m| fail(m, tag_start))?;
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| fail(format!("text error: {err}"), end))?;
                if let Some(current) = stack.last_mut() {
                    push_text(&mut current.text, &text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    push_text(&mut current.text, &String::from_utf8_lossy(e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                let position = reader.error_position() as usize;
                return Err(fail(e.to_string(), position));
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(fail(
            format!("unexpected end of document: <{}> is not closed", open.name),
            source.len(),
        ));
    }
    let root = root.ok_or_else(|| fail("document has no root element".to_string(), 0))?;
    Ok(Document { root, lines })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(format!("unexpected second root element <{}>", element.name)),
    }
}

fn push_text(target: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<?xml version=\"1.0\"?>\n<sbml level=\"3\">\n  <model id=\"m\">\n    <fbc:thing fbc:id=\"x\"/>\n    <notes><p>GENE_ASSOCIATION: a &amp; b</p></notes>\n  </model>\n</sbml>\n";

    #[test]
    fn test_parse_tree() {
        let doc = parse_document(DOC.as_bytes()).unwrap();
        assert_eq!(doc.root.local_name(), "sbml");
        assert_eq!(doc.root.attr("level"), Some("3"));

        let model = doc.root.child("model").unwrap();
        assert_eq!(model.attr("id"), Some("m"));
        let thing = model.child("thing").unwrap();
        assert_eq!(thing.name, "fbc:thing");
        assert_eq!(thing.attr_local("id"), Some("x"));
        let notes = model.child("notes").unwrap();
        assert_eq!(notes.child("p").unwrap().text, "GENE_ASSOCIATION: a & b");
    }

    #[test]
    fn test_positions() {
        let doc = parse_document(DOC.as_bytes()).unwrap();
        assert_eq!(doc.position_of(&doc.root), (2, 1));
        let model = doc.root.child("model").unwrap();
        assert_eq!(doc.position_of(model), (3, 3));
        assert_eq!(doc.position_of(model.child("thing").unwrap()), (4, 5));
    }

    #[test]
    fn test_malformed() {
        let err = parse_document(b"<sbml>\n<model></sbml>").unwrap_err();
        assert!(err.line >= 1);
        assert!(err.to_string().starts_with("XML parse error at line"));

        let err = parse_document(b"<sbml><model>").unwrap_err();
        assert!(err.message.contains("not closed"));

        assert!(parse_document(b"").is_err());
        assert!(parse_document(b"<a/><b/>").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| {
            format!("{}<leaf/>{}", "<a>".repeat(depth), "</a>".repeat(depth)).into_bytes()
        };

        let doc = parse_document(&nested(MAX_DEPTH)).unwrap();
        assert_eq!(doc.root.descendants().len(), MAX_DEPTH + 1);

        let err = parse_document(&nested(200_000)).unwrap_err();
        assert_eq!(err.message, format!("elements nested deeper than {MAX_DEPTH} levels"));
        assert_eq!(err.offset, MAX_DEPTH * 3);
        assert_eq!((err.line, err.column), (1, MAX_DEPTH * 3 + 1));
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new(b"ab\ncd\n\nef");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(4), (2, 2));
        assert_eq!(index.position(7), (4, 1));
    }
}
