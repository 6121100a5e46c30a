pub mod pass;

pub use pass::MigrationPass;
