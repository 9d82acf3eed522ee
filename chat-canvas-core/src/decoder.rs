//! Directive decoder - turns scanned spans into directives.
//!
//! One [`Decoder`] belongs to one session. It owns the counter behind
//! synthesized ids and remembers the id of a `::canvas::` block that is still
//! streaming, so repeated decodes of that growing block refresh one component
//! instead of creating new ones.
//!
//! Synthesized ids never reuse an id the decoder has already seen, whether it
//! came from a payload or from the counter.

use std::collections::HashSet;

use serde_json::Value;

use crate::component::{
    ComponentId, ComponentRecord, ComponentType, Position, Props, Size, DEFAULT_HEIGHT,
    DEFAULT_WIDTH,
};
use crate::directive::Directive;
use crate::error::{DecodeError, Diagnostic, ScanError};
use crate::scanner::{scan, PendingKind, RawSpan};
use crate::schema::ComponentPayload;
use crate::tag::TagName;

const LAYOUT_DEFAULT_TYPE: &str = "flex";
const LAYOUT_DEFAULT_DIRECTION: &str = "row";
const LAYOUT_DEFAULT_GAP: u64 = 20;

/// Session-scoped span decoder.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    /// Last sequence number handed out for a synthesized id.
    seq: u64,
    /// Every id handed out or read from a payload so far.
    taken: HashSet<ComponentId>,
    /// Start offset and id of the canvas block still streaming.
    open_canvas: Option<(usize, ComponentId)>,
    /// Errors absorbed while decoding nested layout children.
    diagnostics: Vec<Diagnostic>,
}

impl Decoder {
    /// Create a decoder with a fresh id counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one span.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidPayload`] when the payload is not a JSON
    /// object and [`DecodeError::SchemaViolation`] when it does not match the
    /// tag's schema. The caller drops the span in both cases.
    pub fn decode(&mut self, span: &RawSpan<'_>) -> Result<Directive, DecodeError> {
        match span.tag {
            TagName::Clear => Ok(Directive::ClearCanvas),
            TagName::Canvas => Ok(self.decode_canvas(span)),
            TagName::Layout => Ok(Directive::RenderComponent(self.decode_layout(span))),
            tag => self
                .decode_component(tag, span.inner)
                .map(Directive::RenderComponent),
        }
    }

    /// Decode a `canvas` span as if its closing tag had arrived.
    ///
    /// Used at end of stream so consumers see `complete = true` for the same
    /// id the partial updates used.
    #[must_use]
    pub fn decode_finished(&mut self, span: &RawSpan<'_>) -> Directive {
        let closed = RawSpan {
            terminated: true,
            ..span.clone()
        };
        self.decode_canvas(&closed)
    }

    /// Drain errors absorbed while decoding layout children.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Id of the canvas block still streaming, if any.
    #[must_use]
    pub fn open_canvas_id(&self) -> Option<&ComponentId> {
        self.open_canvas.as_ref().map(|(_, id)| id)
    }

    /// Record an id that arrived from outside the text stream so the
    /// counter skips it.
    pub fn reserve(&mut self, id: &ComponentId) {
        if !self.taken.contains(id) {
            self.taken.insert(id.clone());
        }
    }

    /// Forget the streaming canvas block. Ids stay reserved.
    pub fn end_message(&mut self) {
        self.open_canvas = None;
    }

    fn next_id(&mut self, tag: TagName) -> ComponentId {
        loop {
            self.seq += 1;
            let id = ComponentId::synthesized(tag, self.seq);
            if self.taken.insert(id.clone()) {
                return id;
            }
            tracing::debug!(id = %id, "Skipping synthesized id already in use");
        }
    }

    fn payload_id(&mut self, id: ComponentId) -> ComponentId {
        self.reserve(&id);
        id
    }

    fn decode_canvas(&mut self, span: &RawSpan<'_>) -> Directive {
        let id = match self.open_canvas.take() {
            Some((start, id)) if start == span.start => id,
            _ => self.next_id(TagName::Canvas),
        };
        if !span.terminated {
            self.open_canvas = Some((span.start, id.clone()));
        }

        Directive::RenderRawMarkup {
            id,
            html: span.inner.to_string(),
            complete: span.terminated,
        }
    }

    fn decode_component(&mut self, tag: TagName, inner: &str) -> Result<ComponentRecord, DecodeError> {
        let invalid = |reason: String| DecodeError::InvalidPayload { tag, reason };

        let value: Value = serde_json::from_str(inner.trim()).map_err(|e| invalid(e.to_string()))?;
        let Value::Object(mut props) = value else {
            return Err(invalid("expected a JSON object".to_string()));
        };

        ComponentPayload::from_props(tag, &props)?;

        let id = match take_id(&mut props) {
            Some(id) => self.payload_id(id),
            None => self.next_id(tag),
        };
        let style = props.remove("style");
        let (position, size, z_index) = placement(style.as_ref());
        let component_type = tag
            .component_type()
            .ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))?;

        Ok(ComponentRecord::new(id, component_type)
            .with_position(position)
            .with_size(size)
            .with_z_index(z_index)
            .with_props(props))
    }

    fn decode_layout(&mut self, span: &RawSpan<'_>) -> ComponentRecord {
        let attr = |name: &str| span.attributes.get(name).map(String::as_str);
        let number = |name: &str, default: u64| attr(name).and_then(leading_number).unwrap_or(default);

        let id = match attr("id").filter(|id| !id.is_empty()) {
            Some(id) => self.payload_id(ComponentId::new(id)),
            None => self.next_id(TagName::Layout),
        };

        let children = self.decode_children(span);
        tracing::debug!(layout = %id, children = children.len(), "Decoded layout");

        let mut props = Props::new();
        props.insert(
            "type".to_string(),
            Value::from(attr("type").unwrap_or(LAYOUT_DEFAULT_TYPE)),
        );
        props.insert("cols".to_string(), Value::from(number("cols", 1)));
        props.insert("rows".to_string(), Value::from(number("rows", 1)));
        props.insert("gap".to_string(), Value::from(number("gap", LAYOUT_DEFAULT_GAP)));
        props.insert(
            "direction".to_string(),
            Value::from(attr("direction").unwrap_or(LAYOUT_DEFAULT_DIRECTION)),
        );
        props.insert(
            "children".to_string(),
            serde_json::to_value(&children).unwrap_or_else(|_| Value::Array(Vec::new())),
        );

        ComponentRecord::new(id, ComponentType::Layout)
            .with_size(Size::new(0, 0))
            .with_props(props)
    }

    /// Decode the blocks nested in a layout. Failures are recorded, never
    /// propagated, so one bad child does not discard its siblings.
    fn decode_children(&mut self, span: &RawSpan<'_>) -> Vec<ComponentRecord> {
        let offset = span.inner_start;
        let output = scan(span.inner);
        let mut children = Vec::new();

        for rejected in &output.rejected {
            self.diagnostics.push(Diagnostic::scan(
                &rejected.error,
                offset + rejected.start,
                offset + rejected.end,
            ));
        }
        if let Some(pending) = output.pending {
            if let PendingKind::OpenTag(tag) = pending.kind {
                self.diagnostics.push(Diagnostic::scan(
                    &ScanError::Unterminated(tag),
                    offset + pending.start,
                    offset + span.inner.len(),
                ));
            }
        }

        for child in &output.spans {
            // Nested canvas blocks are static markup and never touch the
            // top-level streaming canvas.
            if child.tag == TagName::Canvas {
                let mut props = Props::new();
                props.insert("html".to_string(), Value::String(child.inner.to_string()));
                props.insert("complete".to_string(), Value::Bool(true));
                children.push(
                    ComponentRecord::new(self.next_id(TagName::Canvas), ComponentType::RawMarkup)
                        .with_props(props),
                );
                continue;
            }
            match self.decode(child) {
                Ok(Directive::RenderComponent(record)) => children.push(record),
                Ok(other) => {
                    tracing::debug!(directive = ?other, "Ignoring non-component directive inside layout");
                }
                Err(e) => self.diagnostics.push(Diagnostic::decode(
                    &e,
                    offset + child.start,
                    offset + child.end,
                )),
            }
        }

        children
    }
}

/// Pull a usable id out of the payload.
fn take_id(props: &mut Props) -> Option<ComponentId> {
    match props.remove("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(ComponentId::new(id)),
        Value::Number(n) => Some(ComponentId::new(n.to_string())),
        _ => None,
    }
}

/// Resolve position, size and z-index from an optional `style` object.
#[allow(clippy::cast_possible_truncation)]
fn placement(style: Option<&Value>) -> (Position, Size, Option<i32>) {
    let field = |name: &str| style.and_then(|s| s.get(name));

    let dimension = |name: &str, default: u32| {
        field(name)
            .and_then(dimension_value)
            .filter(|&v| v > 0)
            .unwrap_or(default)
    };
    let size = Size::new(
        dimension("width", DEFAULT_WIDTH),
        dimension("height", DEFAULT_HEIGHT),
    );

    let position = field("position")
        .and_then(|p| serde_json::from_value::<Position>(p.clone()).ok())
        .unwrap_or_default();

    let z_index = field("zIndex")
        .and_then(Value::as_f64)
        .map(|z| z.round() as i32);

    (position, size, z_index)
}

/// Read a pixel dimension given as a number or a string like `"400px"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            let number = n.as_f64()?;
            (number.is_finite() && number >= 0.0).then(|| number.round() as u32)
        }
        Value::String(s) => leading_number(s).and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

/// Parse the leading integer of a string such as `"400px"`.
fn leading_number(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    text[..digits].parse().ok()
}
