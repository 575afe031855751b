// handlers/mod.rs - Two-tier handler layout
//
// Public (no identity) → Protected (identity headers required)
pub mod public; // Discovery endpoints the injected clues call (/api/challenge/*)
pub mod protected; // Challenge state and submissions (/api/challenges/*)
