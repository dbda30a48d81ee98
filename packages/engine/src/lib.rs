//! # Scribe Engine
//!
//! Downcast conversion: keeps the view in sync with the model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: document + differ (buffered changes) │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ engine: dispatcher fires named events       │
//! │  - insert / remove / attribute              │
//! │  - addMarker / removeMarker / selection     │
//! │  - converters consume and write the view    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ view: element tree + selection              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scribe_engine::{DowncastContext, DowncastDispatcher, DowncastHelpers, ElementToElement, Mapper};
//!
//! let mut dispatcher = DowncastDispatcher::new();
//! scribe_engine::register_default_converters(&mut dispatcher);
//! DowncastHelpers::new(&mut dispatcher).element_to_element(ElementToElement::new("paragraph", "p"));
//!
//! let mut cx = DowncastContext::new(document, schema, &mut mapper, &mut view);
//! dispatcher.convert_changes(&mut cx)?;
//! dispatcher.convert_selection(&mut cx)?;
//! ```

pub mod consumable;
pub mod conversion_api;
pub mod dispatcher;
pub mod emitter;
pub mod error;
pub mod helpers;
pub mod mapper;
pub mod selection;

pub use consumable::{ConsumableItem, ConsumableKey, Consumables};
pub use conversion_api::{
    AttributeData, ConversionApi, ConversionItem, EventData, InsertData, MarkerData, RemoveData,
    SelectionData,
};
pub use dispatcher::{CanReuseView, DowncastContext, DowncastDispatcher, Listener};
pub use emitter::{Emitter, EventInfo, Priority};
pub use error::{ConversionError, ConversionResult};
pub use helpers::{
    create_slot, register_default_converters, AttributeElementView, AttributeModel,
    AttributeToAttribute, AttributeToElement, AttributeView, DowncastHelpers, ElementToElement,
    ElementToStructure, ElementView, HighlightView, MarkerDataView, MarkerToData, MarkerToElement,
    MarkerToHighlight, ModelConfig, Slot, SlotFilter, Structure, ViewAttribute, ViewAttributeValue,
    ViewElementDefinition,
};
pub use mapper::Mapper;
