//! pan-core: Shared types and reactive primitives for Panorama
//!
//! This crate provides the foundation consumed by the rendering crates:
//! - FFT frame value type and the non-blocking frame channel
//! - Coalescing draw scheduler (at most one pending draw per task)
//! - Edge-triggered change notifier (listen once, re-subscribe per draw)
//! - Runtime configuration cells
//! - Frequency/level view geometry contract

mod cell;
mod frame;
mod notify;
mod sched;
mod view;

pub use cell::*;
pub use frame::*;
pub use notify::*;
pub use sched::*;
pub use view::*;
