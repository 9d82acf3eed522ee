//! Canvas components - the records a renderer paints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tag::TagName;

/// Key-value props handed to the renderer untouched.
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Default component width in pixels.
pub const DEFAULT_WIDTH: u32 = 500;
/// Default component height in pixels.
pub const DEFAULT_HEIGHT: u32 = 300;

/// Opaque identifier for a component, unique within one canvas state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Wrap an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a synthesized id scoped to the tag, e.g. `table-3`.
    #[must_use]
    pub fn synthesized(tag: TagName, seq: u64) -> Self {
        Self(format!("{tag}-{seq}"))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The widget a renderer should paint for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    /// Tabular data with optional highlighted rows.
    DataTable,
    /// Checklist of tasks with statuses.
    TaskWindow,
    /// Single KPI with optional trend.
    MetricCard,
    /// Line or bar chart.
    Chart,
    /// Free text.
    TextPanel,
    /// Side-by-side comparison.
    ComparisonCard,
    /// Progress indicator.
    ProgressBar,
    /// Container of child components.
    Layout,
    /// Raw HTML streamed from a `::canvas::` block.
    RawMarkup,
}

impl ComponentType {
    /// Wire name of the component type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataTable => "DataTable",
            Self::TaskWindow => "TaskWindow",
            Self::MetricCard => "MetricCard",
            Self::Chart => "Chart",
            Self::TextPanel => "TextPanel",
            Self::ComparisonCard => "ComparisonCard",
            Self::ProgressBar => "ProgressBar",
            Self::Layout => "Layout",
            Self::RawMarkup => "RawMarkup",
        }
    }

    /// Resolve a component type from either its wire name (`"MetricCard"`)
    /// or the short tag that produces it (`"metric"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [ComponentType; 9] = [
            ComponentType::DataTable,
            ComponentType::TaskWindow,
            ComponentType::MetricCard,
            ComponentType::Chart,
            ComponentType::TextPanel,
            ComponentType::ComparisonCard,
            ComponentType::ProgressBar,
            ComponentType::Layout,
            ComponentType::RawMarkup,
        ];
        ALL.into_iter()
            .find(|ty| ty.as_str() == name)
            .or_else(|| {
                name.parse::<TagName>()
                    .ok()
                    .and_then(TagName::component_type)
            })
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a component sits on the canvas.
///
/// Serialized as the string `"auto"` or an `{"x": .., "y": ..}` object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PositionRepr", into = "PositionWire")]
pub enum Position {
    /// Flow placement in insertion order.
    #[default]
    Auto,
    /// Absolute placement in pixels.
    At {
        /// Pixels from the left edge.
        x: i32,
        /// Pixels from the top edge.
        y: i32,
    },
}

impl Position {
    /// Whether the renderer chooses the placement.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

/// Accepted input. Fractional pixels are rounded.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PositionRepr {
    Keyword(String),
    Point { x: f64, y: f64 },
}

/// Emitted output in whole pixels.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum PositionWire {
    Keyword(&'static str),
    Point { x: i32, y: i32 },
}

impl TryFrom<PositionRepr> for Position {
    type Error = String;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(repr: PositionRepr) -> Result<Self, Self::Error> {
        match repr {
            PositionRepr::Keyword(word) if word == "auto" => Ok(Self::Auto),
            PositionRepr::Keyword(word) => Err(format!("unknown position keyword: {word}")),
            PositionRepr::Point { x, y } => Ok(Self::At {
                x: x.round() as i32,
                y: y.round() as i32,
            }),
        }
    }
}

impl From<Position> for PositionWire {
    fn from(position: Position) -> Self {
        match position {
            Position::Auto => Self::Keyword("auto"),
            Position::At { x, y } => Self::Point { x, y },
        }
    }
}

/// Component dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

/// A live component on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    /// Unique identifier.
    pub id: ComponentId,
    /// Widget to paint.
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    /// Placement.
    #[serde(default)]
    pub position: Position,
    /// Dimensions.
    #[serde(default)]
    pub size: Size,
    /// Optional stacking order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    /// Widget-specific props.
    #[serde(default)]
    pub props: Props,
}

impl ComponentRecord {
    /// Create a record with default placement and no props.
    #[must_use]
    pub fn new(id: ComponentId, component_type: ComponentType) -> Self {
        Self {
            id,
            component_type,
            position: Position::Auto,
            size: Size::default(),
            z_index: None,
            props: Props::new(),
        }
    }

    /// Set the position.
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Set the size.
    #[must_use]
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    /// Set the stacking order.
    #[must_use]
    pub fn with_z_index(mut self, z_index: Option<i32>) -> Self {
        self.z_index = z_index;
        self
    }

    /// Set the props.
    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// The markup of a raw-markup record.
    #[must_use]
    pub fn html(&self) -> Option<&str> {
        self.props.get("html").and_then(serde_json::Value::as_str)
    }

    /// Whether a raw-markup record has seen its closing tag.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.props
            .get("complete")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true)
    }
}
