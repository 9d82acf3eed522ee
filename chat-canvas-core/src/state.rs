//! Canvas state and the reducer that evolves it.
//!
//! [`CanvasState`] is an ordered mapping from id to [`ComponentRecord`].
//! Insertion order is paint order for auto-positioned components, and
//! replacing a record keeps its slot. [`apply`] is pure and total: every
//! directive produces a new state, and directives that target missing ids
//! are no-ops.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, ComponentRecord, ComponentType, Props};
use crate::directive::Directive;
use crate::{CanvasError, CanvasResult};

/// The live set of components for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ComponentRecord>", into = "Vec<ComponentRecord>")]
pub struct CanvasState {
    /// All components, indexed by id.
    components: HashMap<ComponentId, ComponentRecord>,
    /// Ids in insertion order.
    order: Vec<ComponentId>,
}

impl CanvasState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one directive, returning the next state.
    #[must_use]
    pub fn apply(self, directive: &Directive) -> Self {
        apply(self, directive)
    }

    /// Apply directives in order.
    #[must_use]
    pub fn apply_all<'a>(self, directives: impl IntoIterator<Item = &'a Directive>) -> Self {
        directives.into_iter().fold(self, apply)
    }

    /// Get a component by id.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> Option<&ComponentRecord> {
        self.components.get(id)
    }

    /// Whether a component with this id exists.
    #[must_use]
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.components.contains_key(id)
    }

    /// Components in paint order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.order.iter().filter_map(|id| self.components.get(id))
    }

    /// Ids in paint order.
    #[must_use]
    pub fn ids(&self) -> &[ComponentId] {
        &self.order
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the canvas is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Serialize the state to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        serde_json::to_string(self).map_err(CanvasError::Serialization)
    }

    /// Deserialize a state from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        serde_json::from_str(json).map_err(CanvasError::Serialization)
    }

    fn upsert(&mut self, record: ComponentRecord) {
        if !self.components.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        self.components.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &ComponentId) {
        if self.components.remove(id).is_some() {
            self.order.retain(|existing| existing != id);
        }
    }
}

impl From<Vec<ComponentRecord>> for CanvasState {
    fn from(records: Vec<ComponentRecord>) -> Self {
        let mut state = Self::new();
        for record in records {
            state.upsert(record);
        }
        state
    }
}

impl From<CanvasState> for Vec<ComponentRecord> {
    fn from(mut state: CanvasState) -> Self {
        state
            .order
            .iter()
            .filter_map(|id| state.components.remove(id))
            .collect()
    }
}

/// Apply one directive to a state.
#[must_use]
pub fn apply(mut state: CanvasState, directive: &Directive) -> CanvasState {
    match directive {
        Directive::RenderComponent(record) => state.upsert(record.clone()),
        Directive::UpdateComponent {
            id,
            props_patch,
            position,
            size,
            z_index,
        } => match state.components.get_mut(id) {
            Some(record) => {
                merge_props(&mut record.props, props_patch);
                if let Some(position) = position {
                    record.position = *position;
                }
                if let Some(size) = size {
                    record.size = *size;
                }
                if z_index.is_some() {
                    record.z_index = *z_index;
                }
            }
            None => tracing::debug!(component = %id, "Update for unknown component ignored"),
        },
        Directive::DestroyComponent { id } => state.remove(id),
        Directive::ClearCanvas => state = CanvasState::new(),
        Directive::RenderRawMarkup { id, html, complete } => {
            if let Some(record) = state.components.get_mut(id) {
                record
                    .props
                    .insert("html".to_string(), serde_json::Value::String(html.clone()));
                record
                    .props
                    .insert("complete".to_string(), serde_json::Value::Bool(*complete));
            } else {
                let mut props = Props::new();
                props.insert("html".to_string(), serde_json::Value::String(html.clone()));
                props.insert("complete".to_string(), serde_json::Value::Bool(*complete));
                state.upsert(ComponentRecord::new(id.clone(), ComponentType::RawMarkup).with_props(props));
            }
        }
    }
    state
}

/// Shallow merge: top-level keys of `patch` overwrite those in `props`.
fn merge_props(props: &mut Props, patch: &Props) {
    for (key, value) in patch {
        props.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Position, Size};
    use serde_json::json;

    fn props(value: serde_json::Value) -> Props {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn render(id: &str, value: serde_json::Value) -> Directive {
        Directive::RenderComponent(
            ComponentRecord::new(id.into(), ComponentType::DataTable).with_props(props(value)),
        )
    }

    #[test]
    fn test_render_then_update_merges_props() {
        let state = CanvasState::new()
            .apply(&render("x", json!({"a": 1})))
            .apply(&Directive::update("x".into(), props(json!({"b": 2}))));

        let record = state.get(&"x".into()).expect("x should exist");
        assert_eq!(serde_json::Value::Object(record.props.clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_update_replaces_placement() {
        let state = CanvasState::new().apply(&render("x", json!({}))).apply(
            &Directive::UpdateComponent {
                id: "x".into(),
                props_patch: Props::new(),
                position: Some(Position::At { x: 5, y: 6 }),
                size: Some(Size::new(100, 50)),
                z_index: Some(2),
            },
        );

        let record = state.get(&"x".into()).expect("x should exist");
        assert_eq!(record.position, Position::At { x: 5, y: 6 });
        assert_eq!(record.size, Size::new(100, 50));
        assert_eq!(record.z_index, Some(2));
    }

    #[test]
    fn test_replace_keeps_slot() {
        let state = CanvasState::new().apply_all(&[
            render("a", json!({"v": 1})),
            render("b", json!({})),
            render("a", json!({"v": 2})),
        ]);

        let ids: Vec<&str> = state.ids().iter().map(ComponentId::as_str).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(state.get(&"a".into()).map(|r| r.props["v"].clone()), Some(json!(2)));
    }

    #[test]
    fn test_clear_then_update_or_destroy_is_noop() {
        let cleared = CanvasState::new().apply_all(&[render("a", json!({})), Directive::ClearCanvas]);
        assert!(cleared.is_empty());

        let after = cleared
            .clone()
            .apply(&Directive::update("a".into(), props(json!({"b": 1}))))
            .apply(&Directive::DestroyComponent { id: "a".into() });
        assert_eq!(after, cleared);
    }

    #[test]
    fn test_destroy() {
        let state = CanvasState::new()
            .apply_all(&[render("a", json!({})), render("b", json!({}))])
            .apply(&Directive::DestroyComponent { id: "a".into() });
        assert_eq!(state.len(), 1);
        assert!(!state.contains(&"a".into()));
    }

    #[test]
    fn test_raw_markup_progressive_reveal() {
        let id = ComponentId::new("canvas-1");
        let state = CanvasState::new().apply(&Directive::RenderRawMarkup {
            id: id.clone(),
            html: "<div>".to_string(),
            complete: false,
        });
        let record = state.get(&id).expect("record should exist");
        assert_eq!(record.component_type, ComponentType::RawMarkup);
        assert_eq!(record.html(), Some("<div>"));
        assert!(!record.is_complete());

        let state = state.apply(&Directive::RenderRawMarkup {
            id: id.clone(),
            html: "<div>done</div>".to_string(),
            complete: true,
        });
        assert_eq!(state.len(), 1);
        let record = state.get(&id).expect("record should exist");
        assert_eq!(record.html(), Some("<div>done</div>"));
        assert!(record.is_complete());
    }

    #[test]
    fn test_state_json_roundtrip_preserves_order() {
        let state = CanvasState::new().apply_all(&[
            render("z", json!({})),
            render("a", json!({})),
            render("m", json!({})),
        ]);
        let json = state.to_json().expect("should serialize");
        assert!(json.starts_with('['));

        let restored = CanvasState::from_json(&json).expect("should deserialize");
        assert_eq!(restored, state);
    }
}
