//! Context resolution engine: decides which instructions, skills, prompts and agent personas
//! apply to a request, in what order, with which parameters and tools.

pub mod bundle;
pub mod capabilities;
pub mod config;
pub mod directives;
pub mod engine;
pub mod error;
pub mod primitives;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod snapshot;
pub mod template;
pub mod trigger;
pub mod workspace;

pub use bundle::{ContextBundle, Layer, LayerRef, ToolScope, Warning};
pub use engine::Engine;
pub use error::{BindingError, LoadError, RefreshError, ResolveError};
pub use resolver::{CancelToken, PromptInvocation, ResolutionRequest, Resolver, SkillSelection};
