//! Typed payload schemas for each component tag.
//!
//! The wire props stay an untyped map so renderers receive exactly what the
//! model wrote, but every payload must first parse into its schema here.
//! Unknown keys are allowed; known keys must have the documented types.

use serde::{Deserialize, Serialize};

use crate::component::Props;
use crate::error::DecodeError;
use crate::tag::TagName;

/// `::table::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    /// Optional heading.
    #[serde(default)]
    pub title: Option<String>,
    /// Column names, in display order.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Row objects keyed by column name.
    #[serde(default)]
    pub rows: Option<Vec<serde_json::Value>>,
    /// Indices of rows to highlight.
    #[serde(default)]
    pub highlight: Option<Vec<usize>>,
    /// Whether the renderer may sort columns.
    #[serde(default)]
    pub sortable: Option<bool>,
}

/// Status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Under way.
    InProgress,
    /// Done.
    Completed,
}

/// One entry of a task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Task identifier within the list.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// Task description.
    pub text: String,
    /// Current status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// `::tasks::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksPayload {
    /// Optional heading.
    #[serde(default)]
    pub title: Option<String>,
    /// The tasks.
    pub tasks: Vec<TaskItem>,
}

/// A metric value is displayed verbatim, so both strings and numbers work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Preformatted value such as `"3.45%"`.
    Text(String),
    /// Raw number.
    Number(f64),
}

/// `::metric::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPayload {
    /// Metric name.
    pub title: String,
    /// Metric value.
    pub value: MetricValue,
    /// Percentage change.
    #[serde(default)]
    pub trend: Option<f64>,
    /// Caption for the trend.
    #[serde(default)]
    pub trend_label: Option<String>,
    /// Accent color name.
    #[serde(default)]
    pub color: Option<String>,
}

/// Chart kinds a renderer knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Line chart.
    Line,
    /// Bar chart.
    Bar,
}

/// `::chart::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPayload {
    /// Optional heading.
    #[serde(default)]
    pub title: Option<String>,
    /// Chart kind.
    #[serde(default, rename = "type")]
    pub chart_type: Option<ChartKind>,
    /// Data points.
    pub data: Vec<serde_json::Value>,
    /// Key of the X axis in each data point.
    #[serde(default)]
    pub x_key: Option<String>,
    /// Key of the Y axis in each data point.
    #[serde(default)]
    pub y_key: Option<String>,
    /// Series color.
    #[serde(default)]
    pub color: Option<String>,
}

/// `::panel::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelPayload {
    /// Optional heading.
    #[serde(default)]
    pub title: Option<String>,
    /// Body text.
    #[serde(default)]
    pub content: Option<String>,
}

/// `::compare::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparePayload {
    /// Optional heading.
    #[serde(default)]
    pub title: Option<String>,
    /// Entries compared side by side.
    #[serde(default)]
    pub items: Option<Vec<serde_json::Value>>,
}

/// `::progress::` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Optional caption.
    #[serde(default)]
    pub label: Option<String>,
    /// Current value.
    pub value: f64,
    /// Upper bound, 100 when absent.
    #[serde(default)]
    pub max: Option<f64>,
}

/// A payload validated against its tag's schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentPayload {
    /// Data table.
    Table(TablePayload),
    /// Task list.
    Tasks(TasksPayload),
    /// Metric card.
    Metric(MetricPayload),
    /// Chart.
    Chart(ChartPayload),
    /// Text panel.
    Panel(PanelPayload),
    /// Comparison card.
    Compare(ComparePayload),
    /// Progress bar.
    Progress(ProgressPayload),
}

impl ComponentPayload {
    /// Validate props against the schema for `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::SchemaViolation`] when a required field is
    /// missing or a known field has the wrong type, and
    /// [`DecodeError::UnknownTag`] for tags without a JSON payload.
    pub fn from_props(tag: TagName, props: &Props) -> Result<Self, DecodeError> {
        let value = serde_json::Value::Object(props.clone());
        let violation = |e: serde_json::Error| DecodeError::SchemaViolation {
            tag,
            reason: e.to_string(),
        };

        let parsed = match tag {
            TagName::Table => serde_json::from_value(value).map(Self::Table),
            TagName::Tasks => serde_json::from_value(value).map(Self::Tasks),
            TagName::Metric => serde_json::from_value(value).map(Self::Metric),
            TagName::Chart => serde_json::from_value(value).map(Self::Chart),
            TagName::Panel => serde_json::from_value(value).map(Self::Panel),
            TagName::Compare => serde_json::from_value(value).map(Self::Compare),
            TagName::Progress => serde_json::from_value(value).map(Self::Progress),
            TagName::Clear | TagName::Layout | TagName::Canvas => {
                return Err(DecodeError::UnknownTag(tag.to_string()));
            }
        };
        parsed.map_err(violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Props {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_metric_requires_title_and_value() {
        let ok = ComponentPayload::from_props(
            TagName::Metric,
            &props(json!({"title": "CTR", "value": "3.4%", "trend": 12.5})),
        )
        .expect("should validate");
        match ok {
            ComponentPayload::Metric(metric) => {
                assert_eq!(metric.value, MetricValue::Text("3.4%".to_string()));
                assert_eq!(metric.trend, Some(12.5));
            }
            other => panic!("Expected Metric payload, got {other:?}"),
        }

        let err = ComponentPayload::from_props(TagName::Metric, &props(json!({"title": "CTR"})))
            .expect_err("value is required");
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn test_numeric_metric_value() {
        let payload =
            ComponentPayload::from_props(TagName::Metric, &props(json!({"title": "Clicks", "value": 120})))
                .expect("should validate");
        assert!(matches!(
            payload,
            ComponentPayload::Metric(MetricPayload {
                value: MetricValue::Number(_),
                ..
            })
        ));
    }

    #[test]
    fn test_table_fields_are_optional_but_typed() {
        assert!(ComponentPayload::from_props(TagName::Table, &props(json!({"a": 1}))).is_ok());
        assert!(ComponentPayload::from_props(
            TagName::Table,
            &props(json!({"columns": ["A", "B"], "rows": [{"A": 1}], "highlight": [0]}))
        )
        .is_ok());

        let err = ComponentPayload::from_props(TagName::Table, &props(json!({"columns": "A,B"})))
            .expect_err("columns must be an array");
        assert!(matches!(err, DecodeError::SchemaViolation { tag: TagName::Table, .. }));
    }

    #[test]
    fn test_tasks_schema() {
        let payload = ComponentPayload::from_props(
            TagName::Tasks,
            &props(json!({"tasks": [{"id": "1", "text": "Analyze", "status": "in_progress"}]})),
        )
        .expect("should validate");
        match payload {
            ComponentPayload::Tasks(tasks) => {
                assert_eq!(tasks.tasks[0].status, Some(TaskStatus::InProgress));
            }
            other => panic!("Expected Tasks payload, got {other:?}"),
        }

        assert!(ComponentPayload::from_props(TagName::Tasks, &props(json!({"title": "Plan"}))).is_err());
        assert!(ComponentPayload::from_props(
            TagName::Tasks,
            &props(json!({"tasks": [{"text": "x", "status": "blocked"}]}))
        )
        .is_err());
    }

    #[test]
    fn test_chart_and_progress_required_fields() {
        assert!(ComponentPayload::from_props(
            TagName::Chart,
            &props(json!({"type": "line", "data": [], "xKey": "day", "yKey": "clicks"}))
        )
        .is_ok());
        assert!(ComponentPayload::from_props(TagName::Chart, &props(json!({"type": "line"}))).is_err());
        assert!(ComponentPayload::from_props(TagName::Progress, &props(json!({"value": 40}))).is_ok());
        assert!(ComponentPayload::from_props(TagName::Progress, &props(json!({"value": "40%"}))).is_err());
    }

    #[test]
    fn test_non_json_tags_have_no_schema() {
        assert!(matches!(
            ComponentPayload::from_props(TagName::Canvas, &Props::new()),
            Err(DecodeError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_chart_kind_is_checked() {
        let payload = ComponentPayload::from_props(
            TagName::Chart,
            &props(json!({"type": "bar", "data": [{"x": 1, "y": 2}], "xKey": "x"})),
        )
        .expect("should validate");
        assert!(matches!(
            payload,
            ComponentPayload::Chart(ChartPayload {
                chart_type: Some(ChartKind::Bar),
                ..
            })
        ));

        assert!(ComponentPayload::from_props(
            TagName::Chart,
            &props(json!({"type": "pie", "data": []}))
        )
        .is_err());
    }
}
