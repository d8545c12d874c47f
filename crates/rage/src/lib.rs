//! Command line tooling for RPF7 archives and RSC7 resources.

pub mod commands;
