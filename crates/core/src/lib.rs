//! Caatuu Core
//!
//! Transport-agnostic building blocks shared by the tutor client: the wire
//! protocol, the challenge model, pinyin alignment, the correction diff and
//! the content-keyed request correlator.

pub mod challenge;
pub mod correlator;
pub mod diff;
pub mod pinyin;
pub mod protocol;
