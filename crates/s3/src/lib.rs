//! upsync-s3: S3 backend for upsync
//!
//! Implements the [`upsync_core::ObjectStore`] trait on top of aws-sdk-s3,
//! with optional HTTP cache purging for a CDN in front of the bucket.

mod client;
mod purge;

pub use client::S3Client;
pub use purge::HttpPurger;
