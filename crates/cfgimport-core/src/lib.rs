pub mod error;
pub mod io;
pub mod kv;
pub mod paths;
pub mod pipeline;
pub mod settings;
pub mod stage;
pub mod update;
pub mod values;

pub use error::{ImportError, Result};
