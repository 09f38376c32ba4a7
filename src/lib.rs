//! Newsdesk - A role-based news publishing service
//!
//! Publishers, journalists and editors move articles through an editorial
//! approval workflow. Readers follow publishers or journalists and are
//! notified by email when new work is published.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
