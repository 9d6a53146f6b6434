pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, FlowError, Result};
pub use event::{EventBus, GraphEvent};
pub use traits::{BreakdownRequest, BreakdownSource, GraphStore, GraphTx};
pub use types::*;
