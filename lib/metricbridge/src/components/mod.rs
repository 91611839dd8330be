//! Component basics.

pub mod destinations;
