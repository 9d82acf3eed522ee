//! Tag names recognized by the inline markup grammar.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::component::ComponentType;
use crate::error::DecodeError;

/// A whitelisted tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagName {
    /// The `::clear::` sentinel. Never has a payload or close marker.
    Clear,
    /// Data table.
    Table,
    /// Task list.
    Tasks,
    /// Single metric card.
    Metric,
    /// Line or bar chart.
    Chart,
    /// Free text panel.
    Panel,
    /// Side-by-side comparison card.
    Compare,
    /// Progress bar.
    Progress,
    /// Container whose payload is more markup.
    Layout,
    /// Raw markup block; may stream unterminated.
    Canvas,
}

impl TagName {
    /// Tags that open a block closed by `::/tag::`.
    pub const BLOCKS: [TagName; 9] = [
        TagName::Table,
        TagName::Tasks,
        TagName::Metric,
        TagName::Chart,
        TagName::Panel,
        TagName::Compare,
        TagName::Progress,
        TagName::Layout,
        TagName::Canvas,
    ];

    /// The tag as written on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Table => "table",
            Self::Tasks => "tasks",
            Self::Metric => "metric",
            Self::Chart => "chart",
            Self::Panel => "panel",
            Self::Compare => "compare",
            Self::Progress => "progress",
            Self::Layout => "layout",
            Self::Canvas => "canvas",
        }
    }

    /// Component type rendered for a block tag.
    ///
    /// `clear` has no component; `canvas` renders as raw markup.
    #[must_use]
    pub const fn component_type(self) -> Option<ComponentType> {
        match self {
            Self::Clear => None,
            Self::Table => Some(ComponentType::DataTable),
            Self::Tasks => Some(ComponentType::TaskWindow),
            Self::Metric => Some(ComponentType::MetricCard),
            Self::Chart => Some(ComponentType::Chart),
            Self::Panel => Some(ComponentType::TextPanel),
            Self::Compare => Some(ComponentType::ComparisonCard),
            Self::Progress => Some(ComponentType::ProgressBar),
            Self::Layout => Some(ComponentType::Layout),
            Self::Canvas => Some(ComponentType::RawMarkup),
        }
    }

    /// Whether the block's inner text is JSON.
    #[must_use]
    pub const fn has_json_payload(self) -> bool {
        !matches!(self, Self::Clear | Self::Layout | Self::Canvas)
    }

    /// Whether the block only closes on its own close marker.
    ///
    /// `layout` contains other blocks and `canvas` carries arbitrary markup,
    /// so neither may be cut short by another tag's close marker.
    #[must_use]
    pub const fn closes_exclusively(self) -> bool {
        matches!(self, Self::Layout | Self::Canvas)
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagName {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clear" => Ok(Self::Clear),
            "table" => Ok(Self::Table),
            "tasks" => Ok(Self::Tasks),
            "metric" => Ok(Self::Metric),
            "chart" => Ok(Self::Chart),
            "panel" => Ok(Self::Panel),
            "compare" => Ok(Self::Compare),
            "progress" => Ok(Self::Progress),
            "layout" => Ok(Self::Layout),
            "canvas" => Ok(Self::Canvas),
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }
}
