//! The façade an editing surface talks to: one open document, its edit
//! history, searches over it and notifications about what changed.
pub mod change;
pub mod search;
pub mod session;

pub use change::{ChangeKind, ContentChange};
pub use search::SearchTask;
pub use session::{ContentSession, SessionState};
