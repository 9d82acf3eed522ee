//! Directives - decoded canvas instructions.

use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, ComponentRecord, Position, Props, Size};
use crate::error::Diagnostic;

/// One decoded instruction for the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// Create a component, replacing any record with the same id.
    RenderComponent(ComponentRecord),

    /// Shallow-merge props into an existing component.
    UpdateComponent {
        /// Target component.
        id: ComponentId,
        /// Keys to add or overwrite.
        props_patch: Props,
        /// Replacement position.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
        /// Replacement size.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<Size>,
        /// Replacement stacking order.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        z_index: Option<i32>,
    },

    /// Remove a component.
    DestroyComponent {
        /// Target component.
        id: ComponentId,
    },

    /// Remove every component.
    ClearCanvas,

    /// Insert or refresh a raw-markup component.
    RenderRawMarkup {
        /// Component id, stable for one canvas block.
        id: ComponentId,
        /// Markup accumulated so far.
        html: String,
        /// Whether the block's closing tag has been seen.
        complete: bool,
    },
}

impl Directive {
    /// Build a props-only update.
    #[must_use]
    pub fn update(id: ComponentId, props_patch: Props) -> Self {
        Self::UpdateComponent {
            id,
            props_patch,
            position: None,
            size: None,
            z_index: None,
        }
    }

    /// The component this directive targets, if any.
    #[must_use]
    pub fn target(&self) -> Option<&ComponentId> {
        match self {
            Self::RenderComponent(record) => Some(&record.id),
            Self::UpdateComponent { id, .. }
            | Self::DestroyComponent { id }
            | Self::RenderRawMarkup { id, .. } => Some(id),
            Self::ClearCanvas => None,
        }
    }
}

/// Output of one pure scan/decode/extract pass over a buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Visible text with all markup removed.
    pub residual_text: String,
    /// Decoded directives in scan order.
    pub directives: Vec<Directive>,
    /// Absorbed scan and decode errors.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}
