pub mod engine;
#[cfg(test)]
pub(crate) mod fake;
pub mod ledger;
pub mod paths;
pub mod remote;
pub mod retry;
pub mod transfer;
