//! Capture-and-storage engine: fetch, admit, hash, dedup, encode, persist,
//! and the read-side render decision.

pub mod compression;
pub mod error;
pub mod fetcher;
pub mod hasher;
pub mod policy;
pub mod render;
pub mod sniff;
pub mod snapshot_service;
pub mod snapshot_store;
