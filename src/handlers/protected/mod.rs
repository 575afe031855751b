// handlers/protected/mod.rs - Handlers behind identity_middleware
//
// Every handler here receives the caller's UserIdentity as an Extension.
pub mod challenge;
