//! Transaction building and signing
//!
//! The action pipeline turns payment requests into broadcast transactions in
//! three phases (build, sign, internalize). The codec, fee model and sighash
//! live in their own modules and have no access to wallet state.

pub mod actions;
pub mod fee;
pub mod pipeline;
pub mod sighash;
pub mod tx;

pub use actions::{
    ActionOutput, BuiltAction, ConfirmationReport, CreateActionOptions, InternalizeResult,
    OutputTarget, PendingChange, SignedAction,
};
pub use fee::FeeModel;
pub use pipeline::ActionPipeline;
pub use sighash::{sign_p2pkh_inputs, sighash_digest, verify_p2pkh_input, PrevOut, SIGHASH_ALL_FORKID};
pub use tx::{Transaction, TxIn, TxOut};
