use std::collections::BTreeMap;
use std::rc::Rc;

use scribe_model::Item;
use scribe_view::{parse_styles, ViewNodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DowncastHelpers, ViewElementDefinition};
use crate::consumable::ConsumableKey;
use crate::conversion_api::{AttributeData, ConversionApi};
use crate::emitter::{EventInfo, Priority};
use crate::error::{ConversionError, ConversionResult};

pub type AttributeElementCreator = Rc<dyn Fn(&Value, &mut ConversionApi<'_>) -> Option<ViewNodeId>>;

pub type AttributeCreator = Rc<dyn Fn(&Value, &mut ConversionApi<'_>) -> Option<ViewAttribute>>;

/// Model attribute a converter handles, optionally only on one element name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeModel {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<&str> for AttributeModel {
    fn from(key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: None,
        }
    }
}

impl AttributeModel {
    pub fn on(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn event(&self) -> String {
        match &self.name {
            Some(name) => format!("attribute:{}:{name}", self.key),
            None => format!("attribute:{}", self.key),
        }
    }
}

/// Model values are looked up by their string form.
fn value_key(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone)]
pub enum AttributeElementView {
    Definition(ViewElementDefinition),
    PerValue(BTreeMap<String, ViewElementDefinition>),
    Creator(AttributeElementCreator),
}

impl AttributeElementView {
    pub fn creator(creator: impl Fn(&Value, &mut ConversionApi<'_>) -> Option<ViewNodeId> + 'static) -> Self {
        AttributeElementView::Creator(Rc::new(creator))
    }

    fn into_creator(self) -> AttributeElementCreator {
        match self {
            AttributeElementView::Creator(creator) => creator,
            AttributeElementView::Definition(definition) => {
                Rc::new(move |_, api| Some(definition.create_attribute(&mut api.writer)))
            }
            AttributeElementView::PerValue(definitions) => Rc::new(move |value, api| {
                definitions
                    .get(&value_key(value))
                    .map(|definition| definition.create_attribute(&mut api.writer))
            }),
        }
    }
}

impl From<&str> for AttributeElementView {
    fn from(name: &str) -> Self {
        AttributeElementView::Definition(name.into())
    }
}

impl From<ViewElementDefinition> for AttributeElementView {
    fn from(definition: ViewElementDefinition) -> Self {
        AttributeElementView::Definition(definition)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewAttributeValue {
    Text(String),
    Classes(Vec<String>),
    Styles(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAttribute {
    pub key: String,
    pub value: ViewAttributeValue,
}

impl ViewAttribute {
    /// `class` and `style` values are split into their parts.
    pub fn parse(key: &str, value: &str) -> Self {
        let value = match key {
            "class" => ViewAttributeValue::Classes(value.split_whitespace().map(str::to_string).collect()),
            "style" => ViewAttributeValue::Styles(parse_styles(value)),
            _ => ViewAttributeValue::Text(value.to_string()),
        };
        Self {
            key: key.to_string(),
            value,
        }
    }
}

#[derive(Clone)]
pub enum AttributeView {
    /// View attribute key; the model value is copied as is.
    Key(String),
    PerValue(BTreeMap<String, ViewAttribute>),
    Creator(AttributeCreator),
}

impl AttributeView {
    pub fn creator(creator: impl Fn(&Value, &mut ConversionApi<'_>) -> Option<ViewAttribute> + 'static) -> Self {
        AttributeView::Creator(Rc::new(creator))
    }

    fn into_creator(self) -> AttributeCreator {
        match self {
            AttributeView::Creator(creator) => creator,
            AttributeView::Key(key) => Rc::new(move |value, _| Some(ViewAttribute::parse(&key, &value_key(value)))),
            AttributeView::PerValue(attributes) => Rc::new(move |value, _| attributes.get(&value_key(value)).cloned()),
        }
    }
}

impl From<&str> for AttributeView {
    fn from(key: &str) -> Self {
        AttributeView::Key(key.to_string())
    }
}

pub struct AttributeToElement {
    pub model: AttributeModel,
    pub view: AttributeElementView,
    pub priority: Priority,
}

impl AttributeToElement {
    pub fn new(model: impl Into<AttributeModel>, view: impl Into<AttributeElementView>) -> Self {
        Self {
            model: model.into(),
            view: view.into(),
            priority: Priority::NORMAL,
        }
    }
}

pub struct AttributeToAttribute {
    pub model: AttributeModel,
    pub view: AttributeView,
    pub priority: Priority,
}

impl AttributeToAttribute {
    pub fn new(model: impl Into<AttributeModel>, view: impl Into<AttributeView>) -> Self {
        Self {
            model: model.into(),
            view: view.into(),
            priority: Priority::NORMAL,
        }
    }
}

/// Wraps the converted range, or the view selection, in an attribute
/// element. The element for the old value is unwrapped first.
pub fn wrap(creator: AttributeElementCreator) -> impl Fn(&mut EventInfo, &AttributeData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |_, data, api| {
        let old = data.attribute_old_value.as_ref().and_then(|value| creator(value, api));
        let new = data.attribute_new_value.as_ref().and_then(|value| creator(value, api));
        if old.is_none() && new.is_none() {
            return Ok(());
        }
        let key = ConsumableKey::attribute(data.attribute_key.as_str());
        if !api.consumable.consume(&data.item, &key) {
            return Ok(());
        }

        if data.item.is_selection() {
            let first = api.writer.document().selection().ranges.first().copied();
            if let (Some(range), Some(new)) = (first, new) {
                api.writer.wrap(range, new)?;
            }
            return Ok(());
        }

        let mut range = api.to_view_range(&data.range)?;
        if let Some(old) = old {
            range = api.writer.unwrap(range, old)?;
        }
        if let Some(new) = new {
            api.writer.wrap(range, new)?;
        }
        Ok(())
    }
}

fn apply(api: &mut ConversionApi<'_>, attribute: &ViewAttribute, view: ViewNodeId) {
    match &attribute.value {
        ViewAttributeValue::Text(value) => api.writer.set_attribute(&attribute.key, value, view),
        ViewAttributeValue::Classes(classes) => {
            let classes: Vec<&str> = classes.iter().map(String::as_str).collect();
            api.writer.add_class(&classes, view);
        }
        ViewAttributeValue::Styles(styles) => {
            for (key, value) in styles {
                api.writer.set_style(key, value, view);
            }
        }
    }
}

fn retract(api: &mut ConversionApi<'_>, attribute: &ViewAttribute, view: ViewNodeId) {
    match &attribute.value {
        ViewAttributeValue::Text(_) => api.writer.remove_attribute(&attribute.key, view),
        ViewAttributeValue::Classes(classes) => {
            let classes: Vec<&str> = classes.iter().map(String::as_str).collect();
            api.writer.remove_class(&classes, view);
        }
        ViewAttributeValue::Styles(styles) => {
            for key in styles.keys() {
                api.writer.remove_style(key, view);
            }
        }
    }
}

/// Sets a view attribute, class or style on the view of a model element.
pub fn change_attribute(
    creator: AttributeCreator,
) -> impl Fn(&mut EventInfo, &AttributeData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |_, data, api| {
        let old = data.attribute_old_value.as_ref().and_then(|value| creator(value, api));
        let new = data.attribute_new_value.as_ref().and_then(|value| creator(value, api));
        if old.is_none() && new.is_none() {
            return Ok(());
        }
        let key = ConsumableKey::attribute(data.attribute_key.as_str());
        if !api.consumable.consume(&data.item, &key) {
            return Ok(());
        }
        let Some(item) = data.item.as_item() else {
            return Ok(());
        };
        let view = item.element_id().and_then(|id| api.mapper.to_view_element(id));
        let Some(view) = view else {
            return Err(match item {
                Item::Text { .. } => ConversionError::AttributeToAttributeOnText {
                    key: data.attribute_key.clone(),
                },
                Item::Element { name, .. } => ConversionError::MissingViewElement(name.clone()),
            });
        };

        if let Some(old) = &old {
            retract(api, old, view);
        }
        if let Some(new) = &new {
            apply(api, new, view);
        }
        Ok(())
    }
}

impl DowncastHelpers<'_> {
    pub fn attribute_to_element(&mut self, config: AttributeToElement) -> &mut Self {
        let event = config.model.event();
        self.dispatcher
            .on_attribute(event, config.priority, wrap(config.view.into_creator()));
        self
    }

    pub fn attribute_to_attribute(&mut self, config: AttributeToAttribute) -> &mut Self {
        let event = config.model.event();
        self.dispatcher
            .on_attribute(event, config.priority, change_attribute(config.view.into_creator()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_class_and_style_values_are_split() {
        assert_eq!(
            ViewAttribute::parse("class", "todo  done"),
            ViewAttribute {
                key: "class".to_string(),
                value: ViewAttributeValue::Classes(vec!["todo".to_string(), "done".to_string()]),
            }
        );
        let style = ViewAttribute::parse("style", "text-align:right");
        assert!(matches!(
            style.value,
            ViewAttributeValue::Styles(styles) if styles.get("text-align").map(String::as_str) == Some("right")
        ));
        assert_eq!(
            ViewAttribute::parse("href", "a.html").value,
            ViewAttributeValue::Text("a.html".to_string())
        );
    }

    #[test]
    fn test_events_follow_element_restriction() {
        assert_eq!(AttributeModel::from("bold").event(), "attribute:bold");
        assert_eq!(AttributeModel::from("level").on("heading").event(), "attribute:level:heading");
        assert_eq!(value_key(&json!("big")), "big");
        assert_eq!(value_key(&json!(2)), "2");
    }
}
