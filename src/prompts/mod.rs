//! Prompt construction for each task kind.
//!
//! - [`content`] holds the per-kind system prompts and user templates
//! - [`builder`] resolves task inputs, renders the template and appends the
//!   schema's output contract
//!
//! ```no_run
//! use std::sync::Arc;
//! use content_forge::pipeline::TaskSpec;
//! use content_forge::prompts::PromptBuilder;
//! use content_forge::schema::{SchemaRegistry, TaskKind};
//!
//! let registry = Arc::new(SchemaRegistry::builtin().expect("builtin schemas"));
//! let builder = PromptBuilder::new(registry);
//! let task = TaskSpec::new(TaskKind::BackgroundDiscovery).with_input("topic", "Tidal energy");
//! let payload = builder.build(&task).expect("valid task");
//! println!("{}", payload.user);
//! ```

pub mod builder;
pub mod content;

pub use builder::{PromptBuilder, PromptPayload};
pub use content::{template_for, PromptTemplate};
