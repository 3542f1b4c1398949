//! Streaming extraction of region shapes and label markers from SVG markup.
//!
//! Every search is done twice: once for elements in the SVG namespace and
//! once for unqualified elements. The unqualified results are only used when
//! the namespaced search found nothing, so drawings with and without an
//! `xmlns` declaration give the same records.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use log::trace;
use quick_xml::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use regex::Regex;

use crate::error::Error;

/// The standard SVG namespace URI.
pub const SVG_NAMESPACE: &[u8] = b"http://www.w3.org/2000/svg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Svg,
    Unqualified,
    /// Bound to some other namespace. Never matched.
    Foreign,
}

impl Scope {
    fn resolve(ns: &ResolveResult, entities: &Entities) -> Result<Self, Error> {
        match ns {
            ResolveResult::Bound(Namespace(uri)) => {
                // Namespace URIs are resolved from the raw attribute value
                let uri = std::str::from_utf8(uri).map_err(|e| {
                    Error::MalformedSource(format!("Invalid namespace URI: {}", e))
                })?;
                if entities.expand(uri)?.as_bytes() == SVG_NAMESPACE {
                    Ok(Scope::Svg)
                } else {
                    Ok(Scope::Foreign)
                }
            }
            ResolveResult::Unbound => Ok(Scope::Unqualified),
            ResolveResult::Unknown(prefix) => Err(Error::MalformedSource(format!(
                "Unbound namespace prefix {:?}",
                String::from_utf8_lossy(prefix)
            ))),
        }
    }
}

/// Internal entities declared in the document type declaration.
///
/// Drawing tools such as Illustrator declare namespace URIs this way, e.g.
/// `<!ENTITY ns_svg "http://www.w3.org/2000/svg">` and `xmlns="&ns_svg;"`.
#[derive(Debug, Default)]
struct Entities(HashMap<String, String>);

impl Entities {
    /// Collect the general entity declarations of a `<!DOCTYPE ...>` body.
    /// Parameter and external entities are ignored.
    fn from_doctype(doctype: &str) -> Self {
        static DECLARATION: OnceLock<Regex> = OnceLock::new();
        let declaration = DECLARATION.get_or_init(|| {
            Regex::new(r#"<!ENTITY\s+([^\s%"'>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)
                .expect("entity declaration regex must compile")
        });
        let mut entities = HashMap::new();
        for caps in declaration.captures_iter(doctype) {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            let value = escape::unescape(value).map_or_else(|_| value.to_string(), Cow::into_owned);
            // The first declaration of an entity is binding
            entities.entry(caps[1].to_string()).or_insert(value);
        }
        trace!("extract: Declared entities {:?}", entities.keys());
        Self(entities)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Replace character and entity references in `raw`.
    fn expand<'a>(&self, raw: &'a str) -> Result<Cow<'a, str>, Error> {
        escape::unescape_with(raw, |name| self.get(name))
            .map_err(|e| Error::MalformedSource(format!("Invalid reference in {:?}: {}", raw, e)))
    }
}

/// Matches of one search, split by namespace.
#[derive(Debug)]
struct Candidates<T> {
    svg: Vec<T>,
    unqualified: Vec<T>,
}

impl<T> Candidates<T> {
    fn new() -> Self {
        Self {
            svg: Vec::new(),
            unqualified: Vec::new(),
        }
    }

    /// Store a match, returning its index within its scope.
    fn push(&mut self, scope: Scope, item: T) -> Option<usize> {
        let list = match scope {
            Scope::Svg => &mut self.svg,
            Scope::Unqualified => &mut self.unqualified,
            Scope::Foreign => return None,
        };
        list.push(item);
        Some(list.len() - 1)
    }

    fn get_mut(&mut self, scope: Scope, index: usize) -> Option<&mut T> {
        match scope {
            Scope::Svg => self.svg.get_mut(index),
            Scope::Unqualified => self.unqualified.get_mut(index),
            Scope::Foreign => None,
        }
    }

    /// Namespaced matches if there are any, the unqualified ones otherwise.
    fn into_preferred(self) -> Vec<T> {
        if self.svg.is_empty() {
            self.unqualified
        } else {
            self.svg
        }
    }
}

/// Unescaped attributes of a single element, in document order.
#[derive(Debug)]
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn read(element: &BytesStart, entities: &Entities) -> Result<Self, Error> {
        let mut attrs = Vec::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::MalformedSource(format!("Invalid attribute: {}", e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value_with(|name| entities.get(name))
                .map_err(|e| Error::MalformedSource(format!("Invalid value of {:?}: {}", key, e)))?;
            attrs.push((key, value.into_owned()));
        }
        Ok(Self(attrs))
    }

    /// Take the value of an attribute without namespace prefix.
    fn take(&mut self, name: &str) -> Option<String> {
        let pos = self.0.iter().position(|(key, _)| key == name)?;
        Some(self.0.swap_remove(pos).1)
    }
}

/// A region shape element as found in the markup. Any attribute may be
/// missing or empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawShape {
    pub id: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
}

/// A label marker element as found in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawMarker {
    pub id: Option<String>,
    pub cx: Option<String>,
    pub cy: Option<String>,
}

#[derive(Debug)]
struct LabelGroup {
    markers: Candidates<RawMarker>,
}

#[derive(Debug)]
struct OpenElement {
    name: String,
    /// Set if this element is a label group; points into the group candidates.
    label_group: Option<(Scope, usize)>,
}

/// Everything extracted from a single document.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Shape elements in document order.
    pub shapes: Vec<RawShape>,
    /// Whether a label group was found at all.
    pub label_group_found: bool,
    /// Direct marker children of the first label group.
    pub markers: Vec<RawMarker>,
}

fn malformed(e: quick_xml::Error) -> Error {
    Error::MalformedSource(e.to_string())
}

/// Parse an SVG string and collect shapes and the markers of the label group
/// whose `id` equals `label_group_id`.
///
/// Only descendants of the root element are searched. The document must be
/// well-formed XML.
pub fn extract(svg: &str, label_group_id: &str) -> Result<Extraction, Error> {
    trace!("extract");

    let mut reader = NsReader::from_str(svg);

    let mut shapes: Candidates<RawShape> = Candidates::new();
    let mut groups: Candidates<LabelGroup> = Candidates::new();
    let mut open: Vec<OpenElement> = Vec::new();
    let mut seen_root = false;
    let mut entities = Entities::default();

    loop {
        let (scope, event) = match reader.read_resolved_event() {
            Ok((ns, event)) => (Scope::resolve(&ns, &entities), event),
            Err(e) => return Err(malformed(e)),
        };
        let (element, is_start) = match event {
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            Event::End(_) => {
                open.pop();
                continue;
            }
            Event::Text(ref t) if open.is_empty() => {
                if t.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Err(Error::MalformedSource(
                    "Text outside of the root element".into(),
                ));
            }
            Event::DocType(ref t) => {
                entities = Entities::from_doctype(&String::from_utf8_lossy(t));
                continue;
            }
            Event::Eof => {
                trace!("extract: EOF");
                break;
            }
            _ => continue,
        };
        let scope = scope?;

        if open.is_empty() {
            if seen_root {
                return Err(Error::MalformedSource(
                    "Junk after the root element".into(),
                ));
            }
            seen_root = true;
        }

        let mut attrs = Attributes::read(&element, &entities)?;
        let mut label_group = None;

        // The root element itself never matches a search.
        if !open.is_empty() {
            match element.local_name().as_ref() {
                b"path" => {
                    trace!("extract: Found path element ({:?})", scope);
                    let shape = RawShape {
                        id: attrs.take("id"),
                        name: attrs.take("name"),
                        path: attrs.take("d"),
                    };
                    shapes.push(scope, shape);
                }
                b"g" => {
                    if attrs.take("id").as_deref() == Some(label_group_id) {
                        trace!("extract: Found label group ({:?})", scope);
                        let group = LabelGroup {
                            markers: Candidates::new(),
                        };
                        label_group = groups.push(scope, group).map(|index| (scope, index));
                    }
                }
                b"circle" => {
                    let parent = open.last().and_then(|parent| parent.label_group);
                    if let Some((group_scope, index)) = parent {
                        if let Some(group) = groups.get_mut(group_scope, index) {
                            trace!("extract: Found label marker ({:?})", scope);
                            let marker = RawMarker {
                                id: attrs.take("id"),
                                cx: attrs.take("cx"),
                                cy: attrs.take("cy"),
                            };
                            group.markers.push(scope, marker);
                        }
                    }
                }
                _ => {}
            }
        }

        if is_start {
            open.push(OpenElement {
                name: String::from_utf8_lossy(element.name().as_ref()).into_owned(),
                label_group,
            });
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(Error::MalformedSource(format!(
            "Unexpected end of document, <{}> is not closed",
            unclosed.name
        )));
    }
    if !seen_root {
        return Err(Error::MalformedSource("No root element found".into()));
    }

    let first_group = groups.into_preferred().into_iter().next();
    let extraction = Extraction {
        shapes: shapes.into_preferred(),
        label_group_found: first_group.is_some(),
        markers: first_group
            .map(|group| group.markers.into_preferred())
            .unwrap_or_default(),
    };
    trace!(
        "extract: Return {} shapes and {} markers",
        extraction.shapes.len(),
        extraction.markers.len()
    );
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(id: &str, name: &str, path: &str) -> RawShape {
        RawShape {
            id: Some(id.into()),
            name: Some(name.into()),
            path: Some(path.into()),
        }
    }

    fn marker(id: &str, cx: &str, cy: &str) -> RawMarker {
        RawMarker {
            id: Some(id.into()),
            cx: Some(cx.into()),
            cy: Some(cy.into()),
        }
    }

    #[test]
    fn test_extract_namespaced() {
        let _ = env_logger::try_init();
        let input = r#"
            <?xml version="1.0" encoding="UTF-8" standalone="no"?>
            <svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1000 812">
                <g id="states">
                    <path id="LA" name="Lagos" d="M 10,10 L 20,20 Z" />
                    <path id="KN" name=" Kano " d="M 30,30 h 10" />
                </g>
                <g id="label_points">
                    <circle id="LA" cx="512.5" cy="300.0" r="2" />
                </g>
            </svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(
            result.shapes,
            vec![
                shape("LA", "Lagos", "M 10,10 L 20,20 Z"),
                shape("KN", " Kano ", "M 30,30 h 10"),
            ]
        );
        assert!(result.label_group_found);
        assert_eq!(result.markers, vec![marker("LA", "512.5", "300.0")]);
    }

    #[test]
    fn test_extract_unqualified() {
        let _ = env_logger::try_init();
        let input = r#"
            <svg>
                <path id="LA" name="Lagos" d="M 10,10" />
                <g id="label_points">
                    <circle id="LA" cx="1" cy="2" />
                </g>
            </svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.shapes, vec![shape("LA", "Lagos", "M 10,10")]);
        assert_eq!(result.markers, vec![marker("LA", "1", "2")]);
    }

    #[test]
    fn test_extract_prefixed_namespace() {
        let input = r#"
            <svg:svg xmlns:svg="http://www.w3.org/2000/svg">
                <svg:path id="LA" name="Lagos" d="M 10,10" />
            </svg:svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.shapes, vec![shape("LA", "Lagos", "M 10,10")]);
    }

    /// Unqualified elements are ignored as soon as the namespaced search
    /// found anything.
    #[test]
    fn test_extract_prefers_namespaced() {
        let input = r#"
            <root xmlns:svg="http://www.w3.org/2000/svg">
                <path id="A" name="Plain" d="M 1,1" />
                <svg:path id="B" name="Qualified" d="M 2,2" />
            </root>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.shapes, vec![shape("B", "Qualified", "M 2,2")]);
    }

    /// A namespaced path without usable attributes still counts as a match.
    #[test]
    fn test_extract_fallback_counts_elements() {
        let input = r#"
            <root xmlns:svg="http://www.w3.org/2000/svg">
                <path id="A" name="Plain" d="M 1,1" />
                <svg:path id="B" />
            </root>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(
            result.shapes,
            vec![RawShape {
                id: Some("B".into()),
                name: None,
                path: None,
            }]
        );
    }

    #[test]
    fn test_extract_ignores_foreign_namespace() {
        let input = r#"
            <svg xmlns="http://www.w3.org/2000/svg" xmlns:ink="http://www.inkscape.org/namespaces/inkscape">
                <ink:path id="X" name="Other" d="M 0,0" />
                <path id="LA" name="Lagos" d="M 10,10" />
            </svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.shapes, vec![shape("LA", "Lagos", "M 10,10")]);
    }

    #[test]
    fn test_extract_root_is_not_searched() {
        let input = r#"<path id="LA" name="Lagos" d="M 10,10"></path>"#;
        let result = extract(input, "label_points").unwrap();
        assert!(result.shapes.is_empty());
    }

    #[test]
    fn test_extract_without_label_group() {
        let input = r#"
            <svg xmlns="http://www.w3.org/2000/svg">
                <path id="LA" name="Lagos" d="M 10,10" />
                <circle id="LA" cx="1" cy="2" />
            </svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert!(!result.label_group_found);
        assert!(result.markers.is_empty());
    }

    #[test]
    fn test_extract_first_label_group_wins() {
        let input = r#"
            <svg xmlns="http://www.w3.org/2000/svg">
                <g id="label_points"><circle id="A" cx="1" cy="1" /></g>
                <g id="label_points"><circle id="B" cx="2" cy="2" /></g>
            </svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.markers, vec![marker("A", "1", "1")]);
    }

    /// Only direct children of the label group are markers.
    #[test]
    fn test_extract_markers_are_direct_children() {
        let input = r#"
            <svg xmlns="http://www.w3.org/2000/svg">
                <g id="label_points">
                    <circle id="A" cx="1" cy="1" />
                    <g><circle id="B" cx="2" cy="2" /></g>
                    <circle id="C" cx="3" cy="3"></circle>
                </g>
            </svg>
        "#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(
            result.markers,
            vec![marker("A", "1", "1"), marker("C", "3", "3")]
        );
    }

    #[test]
    fn test_extract_custom_label_group_id() {
        let input = r#"
            <svg>
                <g id="label_points"><circle id="A" cx="1" cy="1" /></g>
                <g id="labels"><circle id="B" cx="2" cy="2" /></g>
            </svg>
        "#;
        let result = extract(input, "labels").unwrap();
        assert_eq!(result.markers, vec![marker("B", "2", "2")]);
    }

    #[test]
    fn test_extract_unescapes_attributes() {
        let input = r#"<svg><path id="A&amp;B" name="Akwa &#x49;bom" d="M 0,0" /></svg>"#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.shapes, vec![shape("A&B", "Akwa Ibom", "M 0,0")]);
    }

    /// Illustrator exports declare the namespace through internal entities.
    #[test]
    fn test_extract_entity_declared_namespace() {
        let _ = env_logger::try_init();
        let input = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- Generator: Adobe Illustrator 24.0.0, SVG Export Plug-In . SVG Version: 6.00 Build 0)  -->
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd" [
	<!ENTITY ns_extend "http://ns.adobe.com/Extensibility/1.0/">
	<!ENTITY ns_svg "http://www.w3.org/2000/svg">
	<!ENTITY ns_xlink "http://www.w3.org/1999/xlink">
]>
<svg version="1.1" xmlns:x="&ns_extend;" xmlns="&ns_svg;" xmlns:xlink="&ns_xlink;" viewBox="0 0 1000 812">
    <path id="LA" name="Lagos" d="M 10,10 L 20,20 Z" />
    <g id="label_points">
        <circle id="LA" cx="512.5" cy="300.0" r="2" />
    </g>
</svg>
"#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(result.shapes, vec![shape("LA", "Lagos", "M 10,10 L 20,20 Z")]);
        assert!(result.label_group_found);
        assert_eq!(result.markers, vec![marker("LA", "512.5", "300.0")]);
    }

    #[test]
    fn test_extract_entity_in_attribute_value() {
        let input = r#"<!DOCTYPE svg [
    <!ENTITY region 'Cross River'>
    <!ENTITY amp_name "Akwa &#x49;bom">
]>
<svg><path id="CR" name="&region;" d="M 0,0" /><path id="AK" name="&amp_name;" d="M 1,1" /></svg>"#;
        let result = extract(input, "label_points").unwrap();
        assert_eq!(
            result.shapes,
            vec![
                shape("CR", "Cross River", "M 0,0"),
                shape("AK", "Akwa Ibom", "M 1,1"),
            ]
        );
    }

    #[test]
    fn test_extract_undeclared_entity() {
        let input = r#"<svg><path id="A" name="&nowhere;" d="M 0,0" /></svg>"#;
        match extract(input, "label_points") {
            Err(Error::MalformedSource(msg)) => assert!(msg.contains("nowhere"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_entities_from_doctype() {
        let entities = Entities::from_doctype(
            r#"svg [ <!ENTITY a "one"> <!ENTITY % param "skipped"> <!ENTITY ext SYSTEM "x.ent"> <!ENTITY a "two"> ]"#,
        );
        assert_eq!(entities.get("a"), Some("one"));
        assert_eq!(entities.get("param"), None);
        assert_eq!(entities.get("ext"), None);
        assert_eq!(entities.expand("&a;&lt;").unwrap(), "one<");
    }

    #[test]
    fn test_extract_mismatched_end() {
        let _ = env_logger::try_init();
        let input = r#"
            <svg xmlns="http://www.w3.org/2000/svg" version="1.1">
                <path d="M 20,30" />
            </baa>
        "#;
        match extract(input, "label_points") {
            Err(Error::MalformedSource(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_unclosed_root() {
        let input = r#"<svg><path id="A" name="A" d="M 0,0" />"#;
        match extract(input, "label_points") {
            Err(Error::MalformedSource(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_empty_document() {
        for input in &["", "   \n", "<?xml version=\"1.0\"?>"] {
            match extract(input, "label_points") {
                Err(Error::MalformedSource(_)) => {}
                other => panic!("unexpected result for {:?}: {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_extract_text_outside_root() {
        let input = "not an svg at all";
        match extract(input, "label_points") {
            Err(Error::MalformedSource(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_two_roots() {
        let input = "<svg></svg><svg></svg>";
        match extract(input, "label_points") {
            Err(Error::MalformedSource(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_duplicate_attribute() {
        let input = r#"<svg><path id="A" id="B" name="A" d="M 0,0" /></svg>"#;
        match extract(input, "label_points") {
            Err(Error::MalformedSource(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_unknown_prefix() {
        let input = r#"<svg><foo:path id="A" name="A" d="M 0,0" /></svg>"#;
        match extract(input, "label_points") {
            Err(Error::MalformedSource(msg)) => assert!(msg.contains("foo"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
