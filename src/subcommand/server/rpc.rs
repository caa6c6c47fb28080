use {
  super::*,
  axum::{extract::State, routing::post, Router},
  axum_jrpc::{error::JsonRpcError, JrpcResult, JsonRpcExtractor, JsonRpcResponse},
  serde::de::DeserializeOwned,
  serde_json::{Map, Value},
};

/// Named access to request params, which clients may send either as an
/// object or as a positional array matched to `names` in order.
pub(crate) trait Params {
  fn params<T: DeserializeOwned>(&self, names: &[&str]) -> RpcResult<T>;
}

impl Params for JsonRpcExtractor {
  fn params<T: DeserializeOwned>(&self, names: &[&str]) -> RpcResult<T> {
    let object = match &self.parsed {
      Value::Null => Map::new(),
      Value::Object(object) => object.clone(),
      Value::Array(array) => {
        if array.len() > names.len() {
          return Err(RpcError::invalid_params(format!(
            "expected at most {} positional parameters, got {}",
            names.len(),
            array.len()
          )));
        }

        names
          .iter()
          .map(|name| name.to_string())
          .zip(array.iter().cloned())
          .collect()
      }
      other => {
        return Err(RpcError::invalid_params(format!(
          "params must be an array or object, got {other}"
        )))
      }
    };

    serde_json::from_value(Value::Object(object)).map_err(RpcError::invalid_params)
  }
}

/// A JSON-RPC method table. Calls run on the blocking thread pool.
pub(crate) trait Handler: Send + Sync + 'static {
  fn call(&self, request: &JsonRpcExtractor) -> RpcResult;
}

pub(crate) fn router(handler: Arc<dyn Handler>) -> Router {
  Router::new().route("/", post(rpc)).with_state(handler)
}

pub(crate) async fn rpc(
  State(handler): State<Arc<dyn Handler>>,
  request: JsonRpcExtractor,
) -> JrpcResult {
  let id = request.get_answer_id();
  let method = request.method.clone();

  log::debug!("RPC {method}");

  let result = match task::spawn_blocking(move || handler.call(&request)).await {
    Ok(result) => result,
    Err(err) => Err(RpcError::internal(err)),
  };

  match result {
    Ok(value) => Ok(JsonRpcResponse::success(id, value)),
    Err(err) => {
      log::info!("RPC {method} failed with code {}: {}", err.code, err.message);
      Err(JsonRpcResponse::error(id, JsonRpcError::from(err)))
    }
  }
}
