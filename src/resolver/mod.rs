//! Turning place-name sets into a single point.
//!
//! Each name is resolved to candidate geometry by [`TieredResolver`]; the
//! candidates are buffered and intersected by [`locate`], growing the buffer
//! along a [`BufferSchedule`] until they overlap.

mod intersect;
mod schedule;
mod tiers;

pub use intersect::{locate, Outcome};
pub use schedule::{BufferSchedule, BufferStrategy};
pub use tiers::{buffer_union, Candidate, PlaceResolver, Tier, TieredResolver};

#[cfg(test)]
pub(crate) use tiers::tests as test_support;
