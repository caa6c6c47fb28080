use {
  super::*,
  axum_jrpc::error::{JsonRpcError, JsonRpcErrorReason},
  serde_json::Value,
};

pub(crate) const WALLET_ERROR: i32 = -4;
pub(crate) const INVALID_ADDRESS_OR_KEY: i32 = -5;
pub(crate) const WALLET_INSUFFICIENT_FUNDS: i32 = -6;
pub(crate) const INVALID_PARAMETER: i32 = -8;
pub(crate) const CLIENT_NOT_CONNECTED: i32 = -9;
pub(crate) const VERIFY_ERROR: i32 = -25;
pub(crate) const INVALID_REQUEST: i32 = -32600;
pub(crate) const METHOD_NOT_FOUND: i32 = -32601;
pub(crate) const INTERNAL_ERROR: i32 = -32603;
pub(crate) const PARSE_ERROR: i32 = -32700;

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RpcError {
  pub(crate) code: i32,
  pub(crate) message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub(crate) data: Option<Value>,
}

pub(crate) type RpcResult<T = Value> = Result<T, RpcError>;

impl RpcError {
  fn new(code: i32, message: impl Display) -> Self {
    Self {
      code,
      message: message.to_string(),
      data: None,
    }
  }

  pub(crate) fn invalid_params(err: impl Display) -> Self {
    Self::new(INVALID_PARAMETER, format!("invalid parameters: {err}"))
  }

  pub(crate) fn internal(err: impl Display) -> Self {
    Self::new(INTERNAL_ERROR, err)
  }

  pub(crate) fn broadcast_rejected(err: impl Display) -> Self {
    Self::new(VERIFY_ERROR, format!("broadcast rejected: {err}"))
  }

  pub(crate) fn broadcast_unrecorded(txid: Txid, err: impl Display) -> Self {
    Self {
      data: Some(serde_json::json!({ "txid": txid })),
      ..Self::new(
        WALLET_ERROR,
        format!("transaction {txid} was broadcast but could not be recorded: {err}"),
      )
    }
  }
}

impl From<wallet::Error> for RpcError {
  fn from(err: wallet::Error) -> Self {
    use wallet::Error;

    let code = match &err {
      Error::InvalidBulletin { .. } | Error::PassphraseTooShort { .. } => INVALID_PARAMETER,
      Error::InvalidAddress { .. } | Error::UnknownAddress { .. } => INVALID_ADDRESS_OR_KEY,
      Error::InsufficientFunds { .. } | Error::NoEligibleOutputForAddress { .. } => {
        WALLET_INSUFFICIENT_FUNDS
      }
      Error::ChainUnavailable { .. } => CLIENT_NOT_CONNECTED,
      Error::Unsupported { .. } => METHOD_NOT_FOUND,
      Error::ScriptValidationFailed { .. }
      | Error::SigningFailed { .. }
      | Error::InternalStoreFailure { .. } => INTERNAL_ERROR,
    };

    let data = match &err {
      Error::InsufficientFunds { have, needed, fee } => Some(serde_json::json!({
        "have": have.to_sat(),
        "needed": needed.to_sat(),
        "fee": fee.to_sat(),
      })),
      _ => None,
    };

    Self {
      code,
      message: err.to_string(),
      data,
    }
  }
}

impl From<RpcError> for JsonRpcError {
  fn from(err: RpcError) -> Self {
    let reason = match err.code {
      PARSE_ERROR => JsonRpcErrorReason::ParseError,
      INVALID_REQUEST => JsonRpcErrorReason::InvalidRequest,
      METHOD_NOT_FOUND => JsonRpcErrorReason::MethodNotFound,
      INTERNAL_ERROR => JsonRpcErrorReason::InternalError,
      code => JsonRpcErrorReason::ApplicationError(code),
    };

    JsonRpcError::new(reason, err.message, err.data.unwrap_or_default())
  }
}
