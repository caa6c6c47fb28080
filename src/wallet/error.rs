use super::*;

/// Failures surfaced to wallet clients. Each maps onto a distinct RPC error
/// code.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
  #[snafu(display("invalid address `{input}`: {reason}"))]
  InvalidAddress { input: String, reason: String },
  #[snafu(display("address {address} is not controlled by this wallet"))]
  UnknownAddress { address: Address },
  #[snafu(display("chain server unavailable: {reason}"))]
  ChainUnavailable { reason: String },
  #[snafu(display("no eligible pay-to-pubkey-hash output for address {address}"))]
  NoEligibleOutputForAddress { address: Address },
  #[snafu(display(
    "insufficient funds: have {} sat, need {} sat plus {} sat fee",
    have.to_sat(),
    needed.to_sat(),
    fee.to_sat()
  ))]
  InsufficientFunds {
    have: Amount,
    needed: Amount,
    fee: Amount,
  },
  #[snafu(display("signed transaction failed script validation at input {input}"))]
  ScriptValidationFailed { input: usize },
  #[snafu(display("failed to sign input {input}: {reason}"))]
  SigningFailed { input: usize, reason: String },
  #[snafu(display("method `{method}` is not supported in the current wallet state"))]
  Unsupported { method: String },
  #[snafu(display("passphrase must be at least {MIN_PASSPHRASE_LEN} bytes, got {length}"))]
  PassphraseTooShort { length: usize },
  #[snafu(display("wallet store failure: {reason}"))]
  InternalStoreFailure { reason: String },
  #[snafu(display("invalid bulletin: {source}"))]
  InvalidBulletin { source: bulletin::Error },
}

impl Error {
  pub(crate) fn store(err: impl Display) -> Self {
    Self::InternalStoreFailure {
      reason: err.to_string(),
    }
  }
}
