//! HTTP request handlers.

pub mod announcements;
pub mod certificates;
pub mod common;
pub mod content;
pub mod duty;
pub mod health;
pub mod jobs;
pub mod sessions;

pub use announcements::*;
pub use certificates::*;
pub use content::*;
pub use duty::*;
pub use health::*;
pub use jobs::*;
pub use sessions::*;
