//! Turns a topic into a narrated short video with burned-in captions and a
//! matching thumbnail.

pub mod ai;
pub mod config;
pub mod error;
pub mod factory;
pub mod footage;
pub mod http;
pub mod probe;
pub mod script;
pub mod style;
pub mod text;
pub mod thumbnail;
pub mod video;
pub mod voice;

pub use config::{Config, TextProvider};
pub use error::{Error, Result, Stage, StageError};
pub use factory::{Capabilities, Factory, FactoryOutput, LogProgress, ProgressReporter, Request};
pub use style::{Dimensions, Mode, Orientation, Vibe, VibeLexicon};
