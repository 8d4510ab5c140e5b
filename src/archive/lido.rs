//! LIDO payload parsing.
//!
//! Only the handful of element paths the enrichment needs are extracted. All
//! of them are descendant searches, so the parser keeps a stack of open LIDO
//! elements and checks each element against the paths when it closes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;
use tracing::debug;

use crate::models::Record;

pub const LIDO_NS: &[u8] = b"http://www.lido-schema.org";

const DEFAULT_TITLE: &str = "Ohne Titel";
const DEFAULT_ID: &str = "Unbekannt";

#[derive(Debug, Error)]
pub enum LidoError {
    #[error("malformed LIDO payload: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed LIDO attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
}

/// An open element. `name` is empty for elements outside the LIDO namespace.
#[derive(Debug, Default)]
struct Frame {
    name: String,
    kind: Option<String>,
    text: String,
}

impl Frame {
    fn is(&self, name: &str) -> bool {
        self.name == name
    }

    fn is_typed(&self, name: &str, kind: &str) -> bool {
        self.name == name && self.kind.as_deref() == Some(kind)
    }
}

/// Ancestors of `subject[@type='imagePlace']/.../appellationValue`, outermost first
const IMAGE_PLACE_PATH: [(&str, Option<&str>); 5] = [
    ("subjectSet", None),
    ("subject", Some("imagePlace")),
    ("subjectPlace", None),
    ("place", None),
    ("namePlaceSet", None),
];

#[derive(Default)]
struct Fields {
    decor: Vec<String>,
    object_type: Option<String>,
    title: Option<String>,
    id: Option<String>,
    earliest: Option<String>,
    latest: Option<String>,
    places: Vec<String>,
}

impl Fields {
    fn collect(&mut self, frame: &Frame, ancestors: &[Frame]) {
        let text = frame.text.trim();
        if text.is_empty() {
            return;
        }
        let parent = ancestors.last();

        match frame.name.as_str() {
            "term" => match parent {
                Some(p) if p.is_typed("termMaterialsTech", "decor") => {
                    self.decor.push(text.to_string())
                }
                Some(p) if p.is("objectWorkType") => {
                    self.object_type.get_or_insert_with(|| text.to_string());
                }
                _ => {}
            },
            "appellationValue" => {
                if parent.map_or(false, |p| p.is("titleSet")) {
                    self.title.get_or_insert_with(|| text.to_string());
                } else if is_image_place(ancestors) && !self.places.iter().any(|p| p == text) {
                    self.places.push(text.to_string());
                }
            }
            "lidoRecID" => {
                self.id.get_or_insert_with(|| text.to_string());
            }
            "earliestDate" if frame.kind.as_deref() == Some("timeCoverageFrom") => {
                self.earliest.get_or_insert_with(|| text.to_string());
            }
            "latestDate" if frame.kind.as_deref() == Some("timeCoverageTo") => {
                self.latest.get_or_insert_with(|| text.to_string());
            }
            _ => {}
        }
    }

    fn into_record(self) -> Record {
        Record {
            id: self.id.unwrap_or_else(|| DEFAULT_ID.to_string()),
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            object_type: self.object_type,
            decor: self.decor,
            earliest_date: parse_year(self.earliest.as_deref()),
            latest_date: parse_year(self.latest.as_deref()),
            places: self.places,
        }
    }
}

fn is_image_place(ancestors: &[Frame]) -> bool {
    if ancestors.len() < IMAGE_PLACE_PATH.len() {
        return false;
    }
    let tail = &ancestors[ancestors.len() - IMAGE_PLACE_PATH.len()..];
    tail.iter()
        .zip(IMAGE_PLACE_PATH.iter())
        .all(|(frame, (name, kind))| match kind {
            Some(kind) => frame.is_typed(name, kind),
            None => frame.is(name),
        })
}

fn parse_year(text: Option<&str>) -> Option<i32> {
    let text = text?;
    match text.parse() {
        Ok(year) => Some(year),
        Err(_) => {
            debug!("Ignoring non-numeric date {:?}", text);
            None
        }
    }
}

fn open_frame<R>(
    reader: &NsReader<R>,
    lido: bool,
    e: &BytesStart<'_>,
) -> Result<Frame, LidoError> {
    if !lido {
        return Ok(Frame::default());
    }

    let mut kind = None;
    for attr in e.attributes() {
        let attr = attr?;
        let (attr_ns, local) = reader.resolve_attribute(attr.key);
        let in_scope = is_lido(&attr_ns) || matches!(attr_ns, ResolveResult::Unbound);
        if in_scope && local.as_ref() == b"type" {
            kind = Some(attr.unescape_value()?.into_owned());
        }
    }

    Ok(Frame {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        kind,
        text: String::new(),
    })
}

fn is_lido(ns: &ResolveResult) -> bool {
    matches!(ns, ResolveResult::Bound(n) if n.as_ref() == LIDO_NS)
}

/// Parse one LIDO payload into a [`Record`]
pub fn parse_record(xml: &[u8]) -> Result<Record, LidoError> {
    let mut reader = NsReader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut fields = Fields::default();

    loop {
        match reader.read_resolved_event_into(&mut buf)? {
            (_, Event::Eof) => break,
            (ns, Event::Start(e)) => {
                let lido = is_lido(&ns);
                let frame = open_frame(&reader, lido, &e)?;
                stack.push(frame);
            }
            (_, Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            (_, Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            (_, Event::End(_)) => {
                if let Some(frame) = stack.pop() {
                    fields.collect(&frame, &stack);
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(fields.into_record())
}
