// handlers/public/mod.rs - Public handlers (no identity required)
//
// These endpoints exist so a student watching the network tab sees real
// traffic. They are called by the clue beacon and by the student by hand, so
// every input is untrusted.
pub mod discovery;
