//! Thought data model.
//!
//! A session is an append-only sequence of [`ThoughtRecord`]s. Revisions and
//! branches are new records that point backward by thought number; nothing
//! is ever edited in place.

mod record;
mod stage;


pub use record::{ThoughtInput, ThoughtRecord};
pub use stage::ThoughtStage;
