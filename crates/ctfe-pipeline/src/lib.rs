//! Pass orchestration: discovery, call-site analysis, evaluation and
//! synthesis wired together behind the host interfaces.

pub mod cancel;
pub mod error;
pub mod host;
pub mod pass;
pub mod plugins;

pub use cancel::CancellationToken;
pub use error::{PipelineError, Result};
pub use host::FsHost;
pub use pass::{Analysis, GeneratorPass};
pub use plugins::PluginRegistry;
