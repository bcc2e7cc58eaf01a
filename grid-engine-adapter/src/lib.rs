//! Adapter utilities for the `grid-engine` crate.
//!
//! The `grid-engine` crate is UI-agnostic and focuses on the data pipeline and state. This crate
//! provides small, framework-neutral helpers commonly needed by adapters:
//!
//! - Debounced filter input (apply the filter model once typing pauses)
//! - Scroll anchoring (keep the rows under the viewport in place across re-sorts and updates)
//!
//! Time is always supplied by the adapter as milliseconds; this crate never reads a clock.
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod anchor;
mod controller;
mod debounce;


pub use anchor::{RowAnchor, apply_anchor, capture_first_visible_anchor};
pub use controller::GridController;
pub use debounce::DebouncedFilter;
