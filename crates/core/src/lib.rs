//! Core library for the Phonoscope phonetic visualiser.
//!
//! A word is spelled out letter by letter into successive phonetic layers
//! and handed to one of several visualization styles. The crate owns the
//! framework those styles plug into: a headless document and canvas host, a
//! deterministic frame and timer scheduler, keyed per-style state, the
//! registry that mounts surfaces, and the orchestrator that routes selection
//! and zoom/pan input to the live style.

pub mod audio;
pub mod caption;
pub mod config;
pub mod dom;
pub mod error;
pub mod instance;
pub mod orchestrator;
pub mod phonetics;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod state;
pub mod timeline;
pub mod transform;
pub mod visualizers;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, AudioConfig};
pub use error::{PhonoscopeError, Result};
pub use instance::{RenderHandle, VisualizationInstance};
pub use orchestrator::{Orchestrator, PointerButton};
pub use phonetics::{generate_layers, LayerGenerator, Layers, PhoneticTable};
pub use registry::VisualizationRegistry;
pub use runtime::Runtime;
pub use scene::{LoopControl, RenderPlan, RenderScene, Visualization, VisualizationDescriptor};
pub use state::{StateRecord, StateStore, StateTemplate};
pub use timeline::Scheduler;
pub use transform::{Transform, TransformReader};
