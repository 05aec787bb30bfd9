//! Utility Module
//!
//! - [`interner`]: String interning for define names and shader ids
//!
//! Interned strings ([`Symbol`]s) compare in O(1):
//!
//! ```rust,ignore
//! use myth_variants::utils::interner;
//!
//! let a = interner::intern("REFLECTION");
//! let b = interner::intern("REFLECTION");
//! assert_eq!(a, b);
//! ```

pub mod interner;

pub use interner::Symbol;
