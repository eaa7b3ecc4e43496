//! Integration tests for Sumi-Audit
//!
//! These tests run whole crawls against wiremock servers through the real
//! HTTP fetcher and an on-disk database.

mod crawl_tests;
