pub mod find;
pub mod run;

// Re-export command functions for convenience
pub use find::find;
pub use run::run;
