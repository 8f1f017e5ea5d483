// handlers/mod.rs - Two handler tiers
//
// Public (no session) → Protected (session cookie resolved to an Identity)
pub mod protected;
pub mod public;
