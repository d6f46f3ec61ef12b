//! Integration tests for stores, contracts, configuration, and the CLI

mod contract_cache;
mod contract_coalescing;
