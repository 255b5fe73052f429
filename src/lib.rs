//! Two-party secure function evaluation with Yao's garbled circuits.

/// Authenticated symmetric encryption of wire labels
pub mod cipher;
/// Circuit specification, JSON loading, and plain evaluation
pub mod circuit;
/// Error taxonomy shared across the protocol
pub mod error;
/// Garbled circuit evaluation
pub mod evaluate;
/// Garbled circuit construction with point-and-permute
pub mod garble;
/// Prime-order cyclic group for the oblivious transfer
pub mod group;
/// 1-out-of-2 oblivious transfer
pub mod ot;
/// Garbler and evaluator orchestration
pub mod party;
/// Framed TCP transport and the protocol messages
pub mod transport;
