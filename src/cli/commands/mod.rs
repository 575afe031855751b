pub mod bundle;
pub mod clues;
pub mod reset;
pub mod status;
pub mod submit;
