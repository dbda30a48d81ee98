//! # Editor
//!
//! Owns one model, its view and everything that keeps them in sync.
//!
//! ## Lifecycle of a change
//!
//! ```text
//! change block → batch → undo routing → downcast → view
//!      ↓           ↓          ↓             ↓
//!   Writer     operations  stacks      convert_changes + convert_selection
//! ```

use scribe_engine::{register_default_converters, DowncastContext, DowncastDispatcher, DowncastHelpers, Mapper};
use scribe_model::{BatchId, BatchType, Model, ModelResult, Node, Position, Schema, Writer};
use scribe_undo::UndoEditing;
use scribe_view::{stringify, ViewDocument};
use tracing::{debug, instrument};

use crate::{EditorConfig, EditorError, EditorResult};

pub const UNDO: &str = "undo";
pub const REDO: &str = "redo";

pub struct Editor {
    config: EditorConfig,
    model: Model,
    view: ViewDocument,
    mapper: Mapper,
    dispatcher: DowncastDispatcher,
    undo: UndoEditing,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("config", &self.config)
            .field("model", &self.model)
            .finish()
    }
}

impl Editor {
    /// Creates the configured roots in the model and the view, bound to
    /// each other, with the default converters registered.
    pub fn new(config: EditorConfig) -> EditorResult<Self> {
        let model = Model::new(&config.roots);
        let mut view = ViewDocument::new();
        let mut mapper = Mapper::new();
        for name in &config.roots {
            let root = view.create_root(name, "div");
            mapper.bind_elements(model.document().root(name)?.id, root);
        }

        let mut dispatcher = DowncastDispatcher::new();
        register_default_converters(&mut dispatcher);
        let undo = UndoEditing::with_step_limit(config.undo.step_limit);

        Ok(Self {
            config,
            model,
            view,
            mapper,
            dispatcher,
            undo,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn view(&self) -> &ViewDocument {
        &self.view
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        self.model.schema_mut()
    }

    /// Converter registration, using the configured highlight priority.
    pub fn conversion(&mut self) -> DowncastHelpers<'_> {
        DowncastHelpers::new(&mut self.dispatcher)
            .with_highlight_priority(self.config.conversion.marker_highlight_priority)
    }

    /// Runs an undoable change block and renders the result.
    pub fn change<R>(&mut self, block: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>) -> EditorResult<R> {
        self.change_with(BatchType::DEFAULT, block)
    }

    pub fn change_with<R>(
        &mut self,
        batch_type: BatchType,
        block: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>,
    ) -> EditorResult<R> {
        let result = self.model.change(batch_type, block);
        // Whatever was applied before a failure still has to reach undo and the view.
        self.undo.handle_applied(&mut self.model);
        self.render()?;
        Ok(result?)
    }

    /// Replaces the content of `root` with the nodes `build` returns. The
    /// replacement is not undoable and clears both stacks.
    #[instrument(skip(self, build))]
    pub fn set_data(
        &mut self,
        root: &str,
        build: impl FnOnce(&mut Writer<'_>) -> ModelResult<Vec<Node>>,
    ) -> EditorResult<()> {
        let root_id = self.model.document().root(root)?.id;
        self.change_with(BatchType::TRANSPARENT, |writer| {
            if let Some(content) = writer.document().range_in(root_id) {
                if !content.is_collapsed() {
                    writer.remove(&content)?;
                }
            }
            let nodes = build(writer)?;
            writer.insert(&Position::new(root, vec![0]), nodes)
        })?;
        self.undo.clear();
        Ok(())
    }

    pub fn is_enabled(&self, command: &str) -> bool {
        match command {
            UNDO => self.undo.undo.is_enabled(),
            REDO => self.undo.redo.is_enabled(),
            _ => false,
        }
    }

    /// Runs `undo` or `redo`, optionally for a specific batch.
    #[instrument(skip(self))]
    pub fn execute(&mut self, command: &str, batch: Option<BatchId>) -> EditorResult<()> {
        if command != UNDO && command != REDO {
            return Err(EditorError::UnknownCommand(command.to_string()));
        }
        if !self.is_enabled(command) {
            return Err(EditorError::CommandDisabled(command.to_string()));
        }
        let executed = if command == UNDO {
            self.undo.undo(&mut self.model, batch).map(|_| ())
        } else {
            self.undo.redo(&mut self.model, batch).map(|_| ())
        };
        self.render()?;
        Ok(executed?)
    }

    /// Rendered view of a root.
    pub fn get_data(&self, root: &str) -> EditorResult<String> {
        Ok(stringify(&self.view, self.view.root(root)?))
    }

    fn render(&mut self) -> EditorResult<()> {
        let mut cx = DowncastContext::new(
            self.model.document(),
            self.model.schema(),
            &mut self.mapper,
            &mut self.view,
        );
        let converted = self
            .dispatcher
            .convert_changes(&mut cx)
            .and_then(|_| self.dispatcher.convert_selection(&mut cx));
        self.model.document_mut().reset_differ();
        debug!(converted = converted.is_ok(), "Rendered changes");
        Ok(converted?)
    }
}
