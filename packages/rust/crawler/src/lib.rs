//! HTTP access to the agency listings API and the wiki API.
//!
//! This crate provides:
//! - [`FetchClient`]: one cookie-carrying session with bounded, flat-delay retry
//! - [`AgencyApi`]: listing, estate detail, and secondary aggregate endpoints
//! - [`WikiApi`]: per-section wikitext, fetched concurrently per page
//! - [`models`]: response shapes of the agency API

pub mod agency;
pub mod client;
pub mod models;
pub mod wiki;

pub use agency::AgencyApi;
pub use client::FetchClient;
pub use wiki::{SectionInfo, WikiApi};
