pub mod descriptor;
pub mod translate;

pub use descriptor::{Direction, FieldDescriptor, FieldKind};
pub use translate::{has_legacy_markers, translate};
