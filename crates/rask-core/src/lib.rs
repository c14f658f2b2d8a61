#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod error;
pub mod graph;
pub mod hmr;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod prebundle;
pub mod resolver;
pub mod rewrite;
pub mod scan;
pub mod transpile;
pub mod urls;

pub use error::Error;
pub use graph::{BoundaryWalk, HmrBoundary, ModuleGraph, ModuleNode, TransformResult};
pub use hmr::{
    ClientMessage, HmrSender, ServerMessage, UpdateKind, UpdatePayload, CLIENT_PUBLIC_PATH,
    CLIENT_RUNTIME, HMR_PATH,
};
pub use pipeline::RequestPipeline;
pub use plugin::{Plugin, PluginContainer, ServerContext};
pub use plugins::{default_plugins, with_transpiler};
pub use prebundle::{PreBundler, PRE_BUNDLE_DIR};
pub use scan::{scan_imports, ImportSpan};
pub use transpile::{PassthroughTranspiler, Transpiler};
