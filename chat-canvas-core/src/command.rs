//! Display commands from the secondary model pass.
//!
//! A display command is a single JSON object keyed by `action`:
//!
//! ```json
//! {"action": "render", "componentId": "campaigns-1", "type": "DataTable",
//!  "position": "auto", "size": {"width": 500, "height": 300}, "props": {}}
//! ```
//!
//! Output that is not JSON at all means "no action".

use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, ComponentRecord, ComponentType, Position, Props, Size};
use crate::directive::Directive;
use crate::error::{DecodeError, Diagnostic};

/// A decoded display command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DisplayCommand {
    /// Create or replace a component.
    #[serde(rename_all = "camelCase")]
    Render {
        /// Target component.
        component_id: String,
        /// Component type name, e.g. `DataTable`.
        #[serde(rename = "type")]
        component_type: String,
        /// Placement, `auto` when absent.
        #[serde(default)]
        position: Option<Position>,
        /// Dimensions, 500x300 when absent.
        #[serde(default)]
        size: Option<Size>,
        /// Stacking order.
        #[serde(default)]
        z_index: Option<i32>,
        /// Widget props.
        #[serde(default)]
        props: Props,
    },
    /// Patch an existing component.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Target component.
        component_id: String,
        /// Props to shallow-merge.
        #[serde(default)]
        props: Props,
        /// Replacement position.
        #[serde(default)]
        position: Option<Position>,
        /// Replacement size.
        #[serde(default)]
        size: Option<Size>,
        /// Replacement stacking order.
        #[serde(default)]
        z_index: Option<i32>,
    },
    /// Remove a component.
    #[serde(rename_all = "camelCase")]
    Destroy {
        /// Target component.
        component_id: String,
    },
    /// Nothing to show.
    None,
}

/// Result of decoding a display command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// The directive to apply, absent for `none`.
    pub directive: Option<Directive>,
    /// Absorbed problems, such as an unknown component type.
    pub diagnostics: Vec<Diagnostic>,
}

/// Decode raw display-model output.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidCommand`] when the text is JSON but not a
/// well-formed command, or a command targets an empty id.
pub fn parse_display_command(text: &str) -> Result<CommandOutcome, DecodeError> {
    let body = strip_code_fence(text);
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Display output is not JSON, treating as none");
            return Ok(CommandOutcome::default());
        }
    };
    let command: DisplayCommand =
        serde_json::from_value(value).map_err(|e| DecodeError::InvalidCommand(e.to_string()))?;
    command.into_outcome(body.len())
}

impl DisplayCommand {
    fn into_outcome(self, len: usize) -> Result<CommandOutcome, DecodeError> {
        let mut outcome = CommandOutcome::default();
        let directive = match self {
            Self::None => None,
            Self::Render {
                component_id,
                component_type,
                position,
                size,
                z_index,
                props,
            } => {
                let ty = ComponentType::from_name(&component_type).unwrap_or_else(|| {
                    let error = DecodeError::UnknownTag(component_type.clone());
                    let diagnostic = Diagnostic::decode(&error, 0, len);
                    diagnostic.report();
                    outcome.diagnostics.push(diagnostic);
                    ComponentType::DataTable
                });
                Some(Directive::RenderComponent(
                    ComponentRecord::new(target(component_id)?, ty)
                        .with_position(position.unwrap_or_default())
                        .with_size(size.unwrap_or_default())
                        .with_z_index(z_index)
                        .with_props(props),
                ))
            }
            Self::Update {
                component_id,
                props,
                position,
                size,
                z_index,
            } => Some(Directive::UpdateComponent {
                id: target(component_id)?,
                props_patch: props,
                position,
                size,
                z_index,
            }),
            Self::Destroy { component_id } => Some(Directive::DestroyComponent {
                id: target(component_id)?,
            }),
        };
        outcome.directive = directive;
        Ok(outcome)
    }
}

fn target(component_id: String) -> Result<ComponentId, DecodeError> {
    if component_id.trim().is_empty() {
        return Err(DecodeError::InvalidCommand("componentId must not be empty".to_string()));
    }
    Ok(ComponentId::new(component_id))
}

/// Models sometimes wrap JSON in a Markdown code fence.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
