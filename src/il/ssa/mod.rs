//! SSA construction and reduction
//!
//! [`SsaBuilder`] converts a lowered function to minimal SSA: φ nodes are
//! inserted at dominance frontiers of definition sites and variable operands
//! are renamed to versioned ids. [`SsaReducer`] later erases the φ nodes and
//! coalesces temp storage, yielding a conventional register form for code
//! generation. Temp variables are single-assignment by construction and pass
//! through the builder untouched.

pub mod builder;
pub mod reducer;

pub use builder::SsaBuilder;
pub use reducer::SsaReducer;
